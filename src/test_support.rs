//! Scripted stand-ins for the driver, resources, and message sink.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::context::GlContext;
use crate::message::{DebugMessage, MessageSink};
use crate::surface::{EntryPoint, HardwareSurface};
use crate::types::{GlResource, SharedResource};

/// Route `log` output to the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

static SYMBOL: u8 = 0;

enum Symbols {
    Only(FxHashSet<String>),
    AllExcept(FxHashSet<String>),
}

/// A driver whose answers are set up front.
///
/// Integer queries for parameters that were never set return 0 and raise
/// `GL_INVALID_ENUM`, like a driver that does not know the enum.
pub struct FakeSurface {
    current: bool,
    integers: FxHashMap<u32, Vec<i32>>,
    strings: FxHashMap<u32, String>,
    indexed: Vec<String>,
    symbols: Symbols,
    errors: RefCell<VecDeque<u32>>,
    stuck_error: Option<u32>,
    draw_buffers: Rc<RefCell<Vec<u32>>>,
    debug_sink: Rc<RefCell<Option<Arc<dyn MessageSink>>>>,
}

impl FakeSurface {
    pub fn new() -> Self {
        init_logging();
        Self {
            current: true,
            integers: FxHashMap::default(),
            strings: FxHashMap::default(),
            indexed: Vec::new(),
            symbols: Symbols::Only(FxHashSet::default()),
            errors: RefCell::new(VecDeque::new()),
            stuck_error: None,
            draw_buffers: Rc::default(),
            debug_sink: Rc::default(),
        }
    }

    pub fn not_current(mut self) -> Self {
        self.current = false;
        self
    }

    pub fn with_integer(self, pname: u32, value: i32) -> Self {
        self.with_integers(pname, &[value])
    }

    pub fn with_integers(mut self, pname: u32, values: &[i32]) -> Self {
        self.integers.insert(pname, values.to_vec());
        self
    }

    pub fn with_string(mut self, pname: u32, value: &str) -> Self {
        self.strings.insert(pname, value.to_owned());
        self
    }

    pub fn with_indexed_extensions(mut self, names: &[&str]) -> Self {
        self.indexed = names.iter().map(|&n| n.to_owned()).collect();
        let count = i32::try_from(self.indexed.len()).unwrap_or(i32::MAX);
        self.with_integer(glow::NUM_EXTENSIONS, count)
    }

    pub fn with_symbols(mut self, names: &[&str]) -> Self {
        self.symbols = Symbols::Only(names.iter().map(|&n| n.to_owned()).collect());
        self
    }

    pub fn with_all_symbols(self) -> Self {
        self.with_all_symbols_except(&[])
    }

    pub fn with_all_symbols_except(mut self, missing: &[&str]) -> Self {
        self.symbols = Symbols::AllExcept(missing.iter().map(|&n| n.to_owned()).collect());
        self
    }

    pub fn with_pending_errors(self, errors: &[u32]) -> Self {
        self.errors.borrow_mut().extend(errors);
        self
    }

    pub fn with_stuck_error(mut self, error: u32) -> Self {
        self.stuck_error = Some(error);
        self
    }

    pub fn pending_errors(&self) -> usize {
        self.errors.borrow().len()
    }

    /// Every value passed to `set_draw_buffer`, in order.
    pub fn draw_buffer_log(&self) -> Rc<RefCell<Vec<u32>>> {
        Rc::clone(&self.draw_buffers)
    }

    /// The sink handed to `install_debug_callback`, if any.
    pub fn debug_sink(&self) -> Rc<RefCell<Option<Arc<dyn MessageSink>>>> {
        Rc::clone(&self.debug_sink)
    }
}

impl HardwareSurface for FakeSurface {
    fn is_current(&self) -> bool {
        self.current
    }

    fn get_integer(&self, pname: u32) -> i32 {
        let mut value = [0];
        self.get_integers(pname, &mut value);
        value[0]
    }

    fn get_integers(&self, pname: u32, out: &mut [i32]) {
        match self.integers.get(&pname) {
            Some(values) => {
                for (slot, value) in out.iter_mut().zip(values) {
                    *slot = *value;
                }
            }
            None => self.errors.borrow_mut().push_back(glow::INVALID_ENUM),
        }
    }

    fn get_string(&self, pname: u32) -> Option<String> {
        self.strings.get(&pname).filter(|s| !s.is_empty()).cloned()
    }

    fn get_string_indexed(&self, pname: u32, index: u32) -> Option<String> {
        if pname != glow::EXTENSIONS {
            return None;
        }
        self.indexed.get(usize::try_from(index).ok()?).cloned()
    }

    fn get_error(&self) -> u32 {
        if let Some(error) = self.stuck_error {
            return error;
        }
        self.errors.borrow_mut().pop_front().unwrap_or(glow::NO_ERROR)
    }

    fn proc_address(&self, name: &str) -> Option<EntryPoint> {
        let resolves = match &self.symbols {
            Symbols::Only(names) => names.contains(name),
            Symbols::AllExcept(missing) => !missing.contains(name),
        };
        if resolves {
            EntryPoint::new(std::ptr::from_ref(&SYMBOL).cast())
        } else {
            None
        }
    }

    fn set_draw_buffer(&self, buffer: u32) {
        self.draw_buffers.borrow_mut().push(buffer);
    }

    fn install_debug_callback(&mut self, sink: Arc<dyn MessageSink>, _synchronous: bool) -> bool {
        *self.debug_sink.borrow_mut() = Some(sink);
        true
    }
}

/// A resource that counts its releases and optionally logs them by name.
pub struct CountingResource {
    releases: Rc<Cell<u32>>,
    name: String,
    log: Option<Rc<RefCell<Vec<String>>>>,
}

impl CountingResource {
    pub fn new() -> (SharedResource, Rc<Cell<u32>>) {
        let releases = Rc::new(Cell::new(0));
        let resource = Rc::new(Self {
            releases: Rc::clone(&releases),
            name: String::new(),
            log: None,
        });
        (resource, releases)
    }

    pub fn logged(name: &str, log: &Rc<RefCell<Vec<String>>>) -> SharedResource {
        Rc::new(Self {
            releases: Rc::new(Cell::new(0)),
            name: name.to_owned(),
            log: Some(Rc::clone(log)),
        })
    }
}

impl GlResource for CountingResource {
    fn release(&self, _ctx: &GlContext) {
        self.releases.set(self.releases.get() + 1);
        if let Some(log) = &self.log {
            log.borrow_mut().push(self.name.clone());
        }
    }
}

/// A sink that keeps everything it receives.
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<DebugMessage>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<DebugMessage> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl MessageSink for RecordingSink {
    fn send(&self, message: &DebugMessage) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.clone());
        }
    }
}
