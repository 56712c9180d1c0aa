//! Per-context switches chosen by the application before initialization.

/// Options controlling how a [`GlContext`](crate::GlContext) sets itself up.
///
/// ```
/// # use glow_context::ContextCaps;
/// let caps = ContextCaps::default().with_context_debug(true);
/// assert!(caps.context_debug);
/// assert!(!caps.debug_synchronous);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextCaps {
    /// Install a driver debug callback when `GL_ARB_debug_output` is usable.
    ///
    /// Messages reported by the driver are forwarded to the context's
    /// [`MessageSink`](crate::MessageSink).
    pub context_debug: bool,

    /// Request synchronous debug output, so messages arrive inside the call
    /// that caused them. Has no effect without [`context_debug`](Self::context_debug).
    pub debug_synchronous: bool,
}

impl ContextCaps {
    /// Enable or disable the driver debug callback.
    #[must_use]
    pub fn with_context_debug(mut self, enabled: bool) -> Self {
        self.context_debug = enabled;
        self
    }

    /// Enable or disable synchronous debug output.
    #[must_use]
    pub fn with_debug_synchronous(mut self, enabled: bool) -> Self {
        self.debug_synchronous = enabled;
        self
    }
}
