//! OpenGL context plumbing on top of [glow].
//!
//! This crate provides [`GlContext`], which sits between a renderer and the
//! driver. It probes the driver once for what it actually supports and keeps
//! track of GPU resources that several contexts on the same device share.
//!
//! # Features
//!
//! - **Capability negotiation**: the reported version is clamped to the
//!   highest core tier whose entry points all resolve, so a driver that
//!   claims 3.0 but lacks a 1.3 function is treated as 1.2.
//! - **All-or-nothing feature groups**: an extension counts as usable only
//!   when every one of its entry points resolves.
//! - **Shared resource registry**: named resources are reference counted
//!   across a sharing group and released immediately, after a short grace
//!   period, or at the end of the frame.
//! - **Driver debug output** routed to a [`MessageSink`], which logs through
//!   [log] by default.
//!
//! # Safety
//!
//! Creating a glow-backed context requires a valid OpenGL context that stays
//! alive as long as the [`GlContext`]. Every call must be made on the thread
//! that context is current on.
//!
//! [glow]: https://docs.rs/glow
//! [log]: https://docs.rs/log

mod capabilities;
mod caps;
mod context;
mod error;
mod extensions;
mod message;
mod registry;
mod surface;
#[cfg(test)]
mod test_support;
mod types;
mod version;

pub use capabilities::{
    CapabilityTable, CoreTier, ExtensionFlags, FeatureGroup, GroupState, Limits, ResolvedGroup,
};
pub use caps::ContextCaps;
pub use context::{GlContext, ANOMALY_DEFERRED_MISSING, ANOMALY_DEFERRED_REACQUIRED};
pub use error::{ContextError, RegistryError};
pub use extensions::{contains_token, ExtensionSet};
pub use message::{DebugKind, DebugMessage, DebugSource, LogSink, MessageSink, Severity};
pub use registry::DEFERRED_GRACE_FRAMES;
pub use surface::{EntryPoint, GlowSurface, HardwareSurface, ProcLoader};
pub use types::{GlBuffer, GlProgram, GlResource, GlTexture, SharedResource};
pub use version::GlVersion;
