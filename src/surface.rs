//! The hardware query surface the capability probe reads from.
//!
//! [`HardwareSurface`] is the narrow read oracle the rest of the crate talks
//! to: integer and string queries, symbol resolution, and the error flag.
//! [`GlowSurface`] implements it on top of a [`glow::Context`] and the same
//! symbol loader the glow context was built from.

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;
use std::sync::{Arc, OnceLock};

use glow::HasContext;

use crate::message::{DebugMessage, MessageSink};

/// A resolved, non-null driver entry point.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EntryPoint(NonNull<c_void>);

impl EntryPoint {
    /// Wrap a raw address returned by a symbol loader. Null yields `None`.
    #[must_use]
    pub fn new(ptr: *const c_void) -> Option<Self> {
        NonNull::new(ptr.cast_mut()).map(Self)
    }

    /// The raw address.
    #[must_use]
    pub fn as_ptr(self) -> *const c_void {
        self.0.as_ptr().cast_const()
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryPoint({:p})", self.0)
    }
}

/// Read access to the driver behind a context.
///
/// Every query is expected to be issued from the thread the context is
/// current on. Implementations never panic on a missing value: absent
/// strings are `None`, failed integer queries report through
/// [`get_error`](Self::get_error).
pub trait HardwareSurface {
    /// Whether a hardware context is current on the calling thread.
    fn is_current(&self) -> bool;

    /// `glGetIntegerv` for a single value.
    fn get_integer(&self, pname: u32) -> i32;

    /// `glGetIntegerv` for parameters that write several values.
    fn get_integers(&self, pname: u32, out: &mut [i32]) {
        if let Some(first) = out.first_mut() {
            *first = self.get_integer(pname);
        }
    }

    /// `glGetString`. Empty or null strings are `None`.
    fn get_string(&self, pname: u32) -> Option<String>;

    /// `glGetStringi`. Empty or null strings are `None`.
    fn get_string_indexed(&self, pname: u32, index: u32) -> Option<String>;

    /// `glGetError`; pops one pending error flag.
    fn get_error(&self) -> u32;

    /// Resolve a driver entry point by name.
    fn proc_address(&self, name: &str) -> Option<EntryPoint>;

    /// `glDrawBuffer`.
    fn set_draw_buffer(&self, buffer: u32);

    /// The glow context, for resources that delete GL objects on release.
    fn gl(&self) -> Option<&glow::Context> {
        None
    }

    /// Route driver debug output to `sink`. Returns whether a callback was
    /// installed.
    fn install_debug_callback(&mut self, sink: Arc<dyn MessageSink>, synchronous: bool) -> bool {
        let _ = (sink, synchronous);
        false
    }
}

/// Symbol loader, typically the window system's `get_proc_address`.
pub type ProcLoader = Box<dyn Fn(&str) -> *const c_void>;

/// Forwards driver debug messages to a sink attached after the fact.
///
/// The driver callback has to be registered while the glow context is still
/// exclusively owned; the sink is only known once the context initializes.
/// Messages arriving before a sink is attached are dropped.
#[derive(Default)]
struct DebugForwarder {
    sink: OnceLock<Arc<dyn MessageSink>>,
}

impl DebugForwarder {
    /// Returns `false` when a sink was already attached; the first one stays.
    fn attach(&self, sink: Arc<dyn MessageSink>) -> bool {
        self.sink.set(sink).is_ok()
    }

    fn forward(&self, source: u32, kind: u32, id: u32, severity: u32, text: &str) {
        if let Some(sink) = self.sink.get() {
            sink.send(&DebugMessage::from_gl(source, kind, id, severity, text));
        }
    }
}

/// Whether glow can register a debug callback on this context: core 4.3,
/// ES 3.2, or `GL_KHR_debug`.
fn supports_debug_callback(gl: &glow::Context) -> bool {
    let version = gl.version();
    let core = if version.is_embedded { (3, 2) } else { (4, 3) };
    (version.major, version.minor) >= core || gl.supported_extensions().contains("GL_KHR_debug")
}

/// [`HardwareSurface`] backed by [`glow`].
pub struct GlowSurface {
    gl: Arc<glow::Context>,
    loader: ProcLoader,
    current: Box<dyn Fn() -> bool>,
    /// Set when the driver callback was registered at construction.
    debug: Option<Arc<DebugForwarder>>,
}

impl GlowSurface {
    /// Take over a glow context and the loader it was created with.
    ///
    /// When the driver can report debug output, a callback is registered
    /// here, while the context is still exclusively owned. It stays silent
    /// until [`HardwareSurface::install_debug_callback`] attaches a sink, so
    /// the context may be shared through [`context`](Self::context) freely.
    ///
    /// Without [`with_current_check`](Self::with_current_check) the context
    /// is assumed to be current whenever it is queried.
    ///
    /// # Safety
    ///
    /// `gl` must stay valid for the lifetime of the surface, and `loader`
    /// must resolve symbols for the same driver `gl` was loaded from. The
    /// context must be current on the calling thread.
    pub unsafe fn new(mut gl: glow::Context, loader: ProcLoader) -> Self {
        let debug = if supports_debug_callback(&gl) {
            let forwarder = Arc::new(DebugForwarder::default());
            let target = Arc::clone(&forwarder);
            unsafe {
                gl.debug_message_callback(move |source, kind, id, severity, text| {
                    target.forward(source, kind, id, severity, text);
                });
            }
            Some(forwarder)
        } else {
            log::debug!("driver has no debug callback entry point; debug output unavailable");
            None
        };
        Self {
            gl: Arc::new(gl),
            loader,
            current: Box::new(|| true),
            debug,
        }
    }

    /// Supply the window system's "is this context current" test.
    #[must_use]
    pub fn with_current_check(mut self, check: impl Fn() -> bool + 'static) -> Self {
        self.current = Box::new(check);
        self
    }

    /// Shared handle to the underlying glow context.
    #[must_use]
    pub fn context(&self) -> &Arc<glow::Context> {
        &self.gl
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

impl HardwareSurface for GlowSurface {
    fn is_current(&self) -> bool {
        (self.current)()
    }

    fn get_integer(&self, pname: u32) -> i32 {
        unsafe { self.gl.get_parameter_i32(pname) }
    }

    fn get_integers(&self, pname: u32, out: &mut [i32]) {
        unsafe { self.gl.get_parameter_i32_slice(pname, out) };
    }

    fn get_string(&self, pname: u32) -> Option<String> {
        non_empty(unsafe { self.gl.get_parameter_string(pname) })
    }

    fn get_string_indexed(&self, pname: u32, index: u32) -> Option<String> {
        non_empty(unsafe { self.gl.get_parameter_indexed_string(pname, index) })
    }

    fn get_error(&self) -> u32 {
        unsafe { self.gl.get_error() }
    }

    fn proc_address(&self, name: &str) -> Option<EntryPoint> {
        EntryPoint::new((self.loader)(name))
    }

    fn set_draw_buffer(&self, buffer: u32) {
        unsafe { self.gl.draw_buffer(buffer) };
    }

    fn gl(&self) -> Option<&glow::Context> {
        Some(&self.gl)
    }

    fn install_debug_callback(&mut self, sink: Arc<dyn MessageSink>, synchronous: bool) -> bool {
        let Some(debug) = &self.debug else {
            return false;
        };
        if !debug.attach(sink) {
            log::debug!("driver debug output already routed; keeping the first sink");
        }
        if synchronous {
            unsafe { self.gl.enable(glow::DEBUG_OUTPUT_SYNCHRONOUS) };
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::DebugSource;
    use crate::test_support::RecordingSink;

    #[test]
    fn forwarder_attaches_while_shared() {
        let forwarder = Arc::new(DebugForwarder::default());
        // The driver callback holds its own handle.
        let callback = Arc::clone(&forwarder);
        callback.forward(
            glow::DEBUG_SOURCE_API,
            glow::DEBUG_TYPE_ERROR,
            7,
            glow::DEBUG_SEVERITY_HIGH,
            "dropped",
        );

        let sink = Arc::new(RecordingSink::default());
        assert!(forwarder.attach(sink.clone()));
        callback.forward(
            glow::DEBUG_SOURCE_SHADER_COMPILER,
            glow::DEBUG_TYPE_ERROR,
            8,
            glow::DEBUG_SEVERITY_MEDIUM,
            "kept",
        );

        let messages = sink.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, 8);
        assert_eq!(messages[0].source, DebugSource::ShaderCompiler);
        assert_eq!(messages[0].text, "kept");
    }

    #[test]
    fn forwarder_keeps_first_sink() {
        let forwarder = DebugForwarder::default();
        let first = Arc::new(RecordingSink::default());
        let second = Arc::new(RecordingSink::default());
        assert!(forwarder.attach(first.clone()));
        assert!(!forwarder.attach(second.clone()));
        forwarder.forward(
            glow::DEBUG_SOURCE_APPLICATION,
            glow::DEBUG_TYPE_OTHER,
            1,
            glow::DEBUG_SEVERITY_LOW,
            "hello",
        );
        assert_eq!(first.messages().len(), 1);
        assert!(second.messages().is_empty());
    }

    #[test]
    fn null_entry_point_is_unresolved() {
        assert!(EntryPoint::new(std::ptr::null()).is_none());
    }

    #[test]
    fn entry_point_keeps_address() {
        let value = 5u8;
        let ptr = std::ptr::from_ref(&value).cast::<c_void>();
        let entry = EntryPoint::new(ptr);
        assert_eq!(entry.map(EntryPoint::as_ptr), Some(ptr));
    }
}
