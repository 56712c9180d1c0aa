//! The context: owns the hardware surface and capability table, and fronts
//! the resource registry it shares with other contexts.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::capabilities::{self, CapabilityTable, FeatureGroup, GroupState};
use crate::caps::ContextCaps;
use crate::error::{ContextError, RegistryError};
use crate::message::{DebugKind, DebugMessage, DebugSource, LogSink, MessageSink, Severity};
use crate::registry::{Anomaly, SharedResources};
use crate::surface::{GlowSurface, HardwareSurface, ProcLoader};
use crate::types::SharedResource;
use crate::version::GlVersion;

/// `GL_VBO_FREE_MEMORY_ATI`: four values in KiB (total free, largest free
/// block, total auxiliary free, largest auxiliary free block).
const VBO_FREE_MEMORY_ATI: u32 = 0x87FB;
/// `GL_GPU_MEMORY_INFO_DEDICATED_VIDMEM_NVX`, in KiB.
const GPU_MEMORY_INFO_DEDICATED_VIDMEM_NVX: u32 = 0x9047;
/// `GL_GPU_MEMORY_INFO_TOTAL_AVAILABLE_MEMORY_NVX`, in KiB.
const GPU_MEMORY_INFO_TOTAL_AVAILABLE_MEMORY_NVX: u32 = 0x9048;
/// `GL_GPU_MEMORY_INFO_CURRENT_AVAILABLE_VIDMEM_NVX`, in KiB.
const GPU_MEMORY_INFO_CURRENT_AVAILABLE_VIDMEM_NVX: u32 = 0x9049;

/// Message id for a deferred key that vanished from the registry.
pub const ANOMALY_DEFERRED_MISSING: u32 = 1;
/// Message id for a deferred resource that was acquired again.
pub const ANOMALY_DEFERRED_REACQUIRED: u32 = 2;

/// Draw buffer targeting the left eye, for the stereo-aware buffer `current`.
fn left_buffer(current: u32) -> Option<u32> {
    match current {
        glow::BACK_RIGHT | glow::BACK => Some(glow::BACK_LEFT),
        glow::FRONT_RIGHT | glow::FRONT => Some(glow::FRONT_LEFT),
        glow::FRONT_AND_BACK | glow::RIGHT => Some(glow::LEFT),
        _ => None,
    }
}

fn right_buffer(current: u32) -> Option<u32> {
    match current {
        glow::BACK_LEFT | glow::BACK => Some(glow::BACK_RIGHT),
        glow::FRONT_LEFT | glow::FRONT => Some(glow::FRONT_RIGHT),
        glow::FRONT_AND_BACK | glow::LEFT => Some(glow::RIGHT),
        _ => None,
    }
}

fn mono_buffer(current: u32) -> Option<u32> {
    match current {
        glow::BACK_LEFT | glow::BACK_RIGHT => Some(glow::BACK),
        glow::FRONT_LEFT | glow::FRONT_RIGHT => Some(glow::FRONT),
        glow::LEFT | glow::RIGHT => Some(glow::FRONT_AND_BACK),
        _ => None,
    }
}

fn kib_to_bytes(kib: i32) -> usize {
    usize::try_from(kib).unwrap_or(0).saturating_mul(1024)
}

/// One OpenGL context as seen by the rest of the renderer.
///
/// A context probes the driver once in [`initialize`](Self::initialize) and
/// keeps the resulting [`CapabilityTable`] until it is dropped. Named GPU
/// resources live in a registry that can be shared with other contexts on
/// the same device through [`share`](Self::share).
///
/// Contexts are single-threaded: every call must come from the thread the
/// underlying hardware context is current on. Members of a sharing group are
/// expected to serialize their frames externally.
///
/// # Example
///
/// ```
/// # use glow_context::{GlContext, GlResource};
/// # use std::rc::Rc;
/// struct Lut;
/// impl GlResource for Lut {
///     fn release(&self, _ctx: &GlContext) {}
/// }
///
/// # fn frame(ctx: &GlContext) {
/// if ctx.get_resource("lut").is_none() {
///     ctx.share_resource("lut", Rc::new(Lut)).ok();
/// }
/// // ...draw...
/// ctx.release_resource("lut", true);
/// ctx.release_delayed();
/// # }
/// ```
pub struct GlContext {
    /// Driver access.
    surface: Box<dyn HardwareSurface>,

    /// Switches chosen by the application.
    caps: ContextCaps,

    /// Receiver for driver debug output and lifecycle anomalies.
    sink: Arc<dyn MessageSink>,

    /// Filled by [`initialize`](Self::initialize), default until then.
    capabilities: CapabilityTable,

    initialized: bool,

    /// Registry and release queues, shared with every context this one
    /// joined or that joined it.
    shared: Rc<RefCell<SharedResources>>,

    /// Cached `GL_DRAW_BUFFER`; 0 until [`fetch_state`](Self::fetch_state).
    draw_buffer: u32,
}

impl GlContext {
    /// Create an uninitialized context over `surface` with its own, unshared
    /// registry. Diagnostics go to [`LogSink`] until
    /// [`with_sink`](Self::with_sink) replaces it.
    pub fn new(surface: impl HardwareSurface + 'static, caps: ContextCaps) -> Self {
        Self {
            surface: Box::new(surface),
            caps,
            sink: Arc::new(LogSink),
            capabilities: CapabilityTable::default(),
            initialized: false,
            shared: Rc::default(),
            draw_buffer: 0,
        }
    }

    /// Create a context directly over a glow context.
    ///
    /// # Safety
    ///
    /// Same contract as [`GlowSurface::new`]: `gl` must stay valid for the
    /// lifetime of the context, `loader` must resolve symbols for the driver
    /// `gl` was loaded from, and the context must be current.
    pub unsafe fn from_glow(gl: glow::Context, loader: ProcLoader, caps: ContextCaps) -> Self {
        Self::new(unsafe { GlowSurface::new(gl, loader) }, caps)
    }

    /// Replace the diagnostics sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Probe the driver and fill the capability table.
    ///
    /// Calling this again on an initialized context does nothing. When
    /// [`ContextCaps::context_debug`] is set and `GL_ARB_debug_output`
    /// resolved, driver debug output is routed to the sink.
    ///
    /// # Errors
    ///
    /// [`ContextError::NoCurrentContext`] when the hardware context is not
    /// current. Nothing is changed in that case.
    pub fn initialize(&mut self) -> Result<(), ContextError> {
        if self.initialized {
            return Ok(());
        }
        if !self.surface.is_current() {
            return Err(ContextError::NoCurrentContext);
        }

        self.capabilities = CapabilityTable::negotiate(self.surface.as_ref());
        self.initialized = true;

        if self.caps.context_debug {
            if self.capabilities.has_group(FeatureGroup::DebugOutput) {
                let sink = Arc::clone(&self.sink);
                if !self
                    .surface
                    .install_debug_callback(sink, self.caps.debug_synchronous)
                {
                    log::warn!("driver debug output requested but could not be installed");
                }
            } else {
                log::warn!("driver debug output requested but GL_ARB_debug_output is unavailable");
            }
        }

        self.fetch_state();
        Ok(())
    }

    /// Whether [`initialize`](Self::initialize) has succeeded.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The capability table. All-unavailable before initialization.
    #[must_use]
    pub fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    /// The options this context was created with.
    #[must_use]
    pub fn caps(&self) -> &ContextCaps {
        &self.caps
    }

    /// Effective OpenGL version.
    #[must_use]
    pub fn version(&self) -> GlVersion {
        self.capabilities.version()
    }

    /// Whether the effective version is at least `major.minor`.
    #[must_use]
    pub fn is_gl_greater_equal(&self, major: u32, minor: u32) -> bool {
        self.capabilities.is_gl_greater_equal(major, minor)
    }

    /// Exact-name extension check.
    #[must_use]
    pub fn check_extension(&self, name: &str) -> bool {
        self.capabilities.has_extension(name)
    }

    /// Whether a feature group resolved completely.
    #[must_use]
    pub fn has_group(&self, group: FeatureGroup) -> bool {
        self.capabilities.has_group(group)
    }

    /// State of a feature group, with its entry points when available.
    #[must_use]
    pub fn group(&self, group: FeatureGroup) -> &GroupState {
        self.capabilities.group(group)
    }

    /// Largest texture dimension.
    #[must_use]
    pub fn max_texture_size(&self) -> i32 {
        self.capabilities.limits().max_texture_size
    }

    /// Number of user clip planes.
    #[must_use]
    pub fn max_clip_planes(&self) -> i32 {
        self.capabilities.limits().max_clip_planes
    }

    /// Maximum anisotropic filtering degree; 1 without the extension.
    #[must_use]
    pub fn max_degree_of_anisotropy(&self) -> i32 {
        self.capabilities.limits().max_anisotropy
    }

    /// Whether the default framebuffer is stereo.
    #[must_use]
    pub fn has_stereo_buffers(&self) -> bool {
        self.capabilities.limits().stereo
    }

    /// The hardware surface.
    #[must_use]
    pub fn surface(&self) -> &dyn HardwareSurface {
        self.surface.as_ref()
    }

    /// The glow context, when the surface is glow-backed.
    #[must_use]
    pub fn gl(&self) -> Option<&glow::Context> {
        self.surface.gl()
    }

    /// Send a diagnostic to this context's sink.
    pub fn push_message(&self, message: &DebugMessage) {
        self.sink.send(message);
    }

    // ------------------------------------------------------------------
    // Shared resources
    // ------------------------------------------------------------------

    /// Look up a shared resource. The returned handle counts as a holder, so
    /// drop it before asking for the key to be released.
    #[must_use]
    pub fn get_resource(&self, key: &str) -> Option<SharedResource> {
        self.shared.borrow().get(key)
    }

    /// Register a resource under `key`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::EmptyKey`] for an empty key and
    /// [`RegistryError::AlreadyBound`] when the key is taken. The registry is
    /// unchanged on error.
    pub fn share_resource(&self, key: &str, resource: SharedResource) -> Result<(), RegistryError> {
        self.shared.borrow_mut().bind(key, resource)
    }

    /// Give up the registry's resource under `key`.
    ///
    /// Does nothing when the key is unbound or someone else still holds the
    /// resource. Otherwise the resource is released and unbound now, or, with
    /// `deferred`, queued for release once
    /// [`DEFERRED_GRACE_FRAMES`](crate::DEFERRED_GRACE_FRAMES) advances have
    /// passed without it being requested again.
    pub fn release_resource(&self, key: &str, deferred: bool) {
        let released = self.shared.borrow_mut().release(key, deferred);
        if let Some(resource) = released {
            resource.release(self);
        }
    }

    /// Queue a resource for unconditional release at the next
    /// [`release_delayed`](Self::release_delayed) or at teardown.
    pub fn delayed_release(&self, resource: SharedResource) {
        self.shared.borrow_mut().push_immediate(resource);
    }

    /// Frame boundary: drain the immediate queue, then age deferred
    /// releases and retire the ones whose grace period ran out.
    pub fn release_delayed(&self) {
        self.drain_immediate();

        let sweep = self.shared.borrow_mut().sweep_deferred();
        for anomaly in sweep.anomalies {
            self.report_anomaly(anomaly);
        }
        for (key, resource) in sweep.released {
            log::debug!("releasing shared resource `{key}` after grace period");
            resource.release(self);
        }
    }

    fn drain_immediate(&self) {
        loop {
            let next = self.shared.borrow_mut().pop_immediate();
            let Some(resource) = next else {
                break;
            };
            resource.release(self);
        }
    }

    fn report_anomaly(&self, anomaly: Anomaly) {
        let (id, text) = match anomaly {
            Anomaly::Missing(key) => (
                ANOMALY_DEFERRED_MISSING,
                format!(
                    "deferred release of `{key}` expired but the key is no longer registered; \
                     mixed deferred and immediate release?"
                ),
            ),
            Anomaly::Reacquired { key, holders } => (
                ANOMALY_DEFERRED_REACQUIRED,
                format!("deferred release of `{key}` skipped: resource re-acquired ({holders} holders)"),
            ),
        };
        self.push_message(&DebugMessage {
            source: DebugSource::Application,
            kind: DebugKind::Other,
            id,
            severity: Severity::Low,
            text,
        });
    }

    /// Whether `key` is registered.
    #[must_use]
    pub fn is_registered(&self, key: &str) -> bool {
        self.shared.borrow().contains(key)
    }

    /// Number of registered resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.shared.borrow().len()
    }

    /// Advances elapsed since `key` was queued for deferred release.
    #[must_use]
    pub fn deferred_age(&self, key: &str) -> Option<u32> {
        self.shared.borrow().deferred_age(key)
    }

    /// Resources waiting in the immediate release queue.
    #[must_use]
    pub fn pending_immediate(&self) -> usize {
        self.shared.borrow().immediate_len()
    }

    // ------------------------------------------------------------------
    // Sharing groups
    // ------------------------------------------------------------------

    /// Join `other`'s sharing group: from now on both contexts see the same
    /// registry and release queues.
    ///
    /// Call this before registering anything through `self`. Resources
    /// already in this context's previous registry are only reachable
    /// through other members of that group; if there are none they are
    /// leaked without being released.
    pub fn share(&mut self, other: &GlContext) {
        if Rc::ptr_eq(&self.shared, &other.shared) {
            return;
        }
        if self.resource_count() > 0 {
            log::warn!(
                "joining a sharing group with {} resources already registered",
                self.resource_count()
            );
        }
        self.shared = Rc::clone(&other.shared);
    }

    /// Whether both contexts use the same registry.
    #[must_use]
    pub fn is_sharing_with(&self, other: &GlContext) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    /// Number of contexts holding this context's shared state.
    #[must_use]
    pub fn shared_holders(&self) -> usize {
        Rc::strong_count(&self.shared)
    }

    // ------------------------------------------------------------------
    // Draw buffer and memory state
    // ------------------------------------------------------------------

    /// Re-read the draw buffer from the driver.
    pub fn fetch_state(&mut self) {
        let value = self.surface.get_integer(glow::DRAW_BUFFER);
        if self.surface.get_error() == glow::NO_ERROR {
            self.draw_buffer = u32::try_from(value).unwrap_or(0);
        } else {
            capabilities::reset_errors(self.surface.as_ref());
        }
    }

    /// The cached draw buffer.
    #[must_use]
    pub fn draw_buffer(&self) -> u32 {
        self.draw_buffer
    }

    /// Switch the draw buffer to its left-eye counterpart.
    pub fn set_draw_buffer_left(&mut self) {
        self.switch_draw_buffer(left_buffer);
    }

    /// Switch the draw buffer to its right-eye counterpart.
    pub fn set_draw_buffer_right(&mut self) {
        self.switch_draw_buffer(right_buffer);
    }

    /// Switch the draw buffer back to both eyes.
    pub fn set_draw_buffer_mono(&mut self) {
        self.switch_draw_buffer(mono_buffer);
    }

    fn switch_draw_buffer(&mut self, target: fn(u32) -> Option<u32>) {
        if let Some(buffer) = target(self.draw_buffer) {
            self.surface.set_draw_buffer(buffer);
            self.draw_buffer = buffer;
        }
    }

    /// Free GPU memory in bytes, or 0 when the driver does not say.
    ///
    /// ATI reports the free memory of the buffer-object pool, which is shared
    /// with other pools closely enough to serve as an estimate.
    #[must_use]
    pub fn available_memory(&self) -> usize {
        match self.gpu_memory() {
            GpuMemory::Ati(values) => kib_to_bytes(values[0]),
            GpuMemory::Nvx { free, .. } => kib_to_bytes(free),
            GpuMemory::Unknown => 0,
        }
    }

    /// Human-readable GPU memory report; empty when the driver does not say.
    #[must_use]
    pub fn memory_info(&self) -> String {
        self.gpu_memory().to_string()
    }

    fn gpu_memory(&self) -> GpuMemory {
        let flags = self.capabilities.flags();
        if flags.ati_meminfo {
            let mut values = [0i32; 4];
            self.surface.get_integers(VBO_FREE_MEMORY_ATI, &mut values);
            GpuMemory::Ati(values)
        } else if flags.nvx_gpu_memory_info {
            GpuMemory::Nvx {
                free: self
                    .surface
                    .get_integer(GPU_MEMORY_INFO_CURRENT_AVAILABLE_VIDMEM_NVX),
                dedicated: self.surface.get_integer(GPU_MEMORY_INFO_DEDICATED_VIDMEM_NVX),
                total: self
                    .surface
                    .get_integer(GPU_MEMORY_INFO_TOTAL_AVAILABLE_MEMORY_NVX),
            }
        } else {
            GpuMemory::Unknown
        }
    }
}

/// Vendor memory counters, all in KiB.
enum GpuMemory {
    /// Free total, largest free block, free auxiliary, largest auxiliary block.
    Ati([i32; 4]),
    Nvx { free: i32, dedicated: i32, total: i32 },
    Unknown,
}

impl fmt::Display for GpuMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Ati([free, largest, aux_free, _]) => {
                writeln!(f, "  GPU free memory:    {} MiB", free / 1024)?;
                writeln!(f, "  Largest free block: {} MiB", largest / 1024)?;
                if aux_free != free {
                    writeln!(f, "  Free memory:        {} MiB", aux_free / 1024)?;
                }
            }
            Self::Nvx {
                free,
                dedicated,
                total,
            } => {
                writeln!(f, "  GPU free memory:    {} MiB", free / 1024)?;
                writeln!(f, "  GPU memory:         {} MiB", dedicated / 1024)?;
                if total != dedicated {
                    writeln!(f, "  Total memory:       {} MiB", total / 1024)?;
                }
            }
            Self::Unknown => {}
        }
        Ok(())
    }
}

impl Drop for GlContext {
    /// Drain the immediate queue. The last holder of the shared state also
    /// releases every resource still registered.
    fn drop(&mut self) {
        self.drain_immediate();
        if Rc::strong_count(&self.shared) > 1 {
            return;
        }
        // A release may register or queue more work; repeat until both the
        // registry and the immediate queue stay empty.
        loop {
            let remaining = self.shared.borrow_mut().take_all();
            if remaining.is_empty() {
                break;
            }
            for (key, resource) in remaining {
                log::debug!("releasing shared resource `{key}` at context teardown");
                resource.release(self);
            }
            self.drain_immediate();
        }
    }
}
