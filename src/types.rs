//! Shared resource types.
//!
//! Anything the registry tracks implements [`GlResource`]. The three glow
//! object wrappers here cover the common cases; callers can implement the
//! trait for their own compound resources.

use std::cell::Cell;
use std::rc::Rc;

use glow::HasContext;

use crate::context::GlContext;

/// A GPU-side object owned by the shared registry.
///
/// The registry calls [`release`](Self::release) exactly once for every
/// resource it owns, on whichever member of the sharing group happens to
/// retire it. Calling it a second time is outside the registry's contract.
pub trait GlResource {
    /// Free the GPU object using `ctx`.
    fn release(&self, ctx: &GlContext);
}

/// Shared handle to a registered resource. The registry's own handle counts
/// towards [`Rc::strong_count`].
pub type SharedResource = Rc<dyn GlResource>;

macro_rules! glow_resource {
    ($(#[$meta:meta])* $name:ident, $handle:ty, $delete:ident) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub struct $name {
            handle: Cell<Option<$handle>>,
        }

        impl $name {
            /// Take ownership of a GL object name.
            #[must_use]
            pub fn new(handle: $handle) -> Self {
                Self {
                    handle: Cell::new(Some(handle)),
                }
            }

            /// The GL object name, or `None` once released.
            #[must_use]
            pub fn handle(&self) -> Option<$handle> {
                self.handle.get()
            }
        }

        impl GlResource for $name {
            fn release(&self, ctx: &GlContext) {
                let Some(handle) = self.handle.take() else {
                    return;
                };
                match ctx.gl() {
                    Some(gl) => unsafe { gl.$delete(handle) },
                    None => log::warn!(
                        concat!(stringify!($name), " released without a glow context; GL object leaked")
                    ),
                }
            }
        }
    };
}

glow_resource!(
    /// A buffer object.
    GlBuffer,
    glow::Buffer,
    delete_buffer
);

glow_resource!(
    /// A texture object.
    GlTexture,
    glow::Texture,
    delete_texture
);

glow_resource!(
    /// A linked shader program.
    GlProgram,
    glow::Program,
    delete_program
);
