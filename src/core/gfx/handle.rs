//! Opaque identities for GPU objects.
//!
//! A handle is valid between a successful `create_*` call and the matching
//! `delete_*` call. "No resource" is spelled `Option::None`; the delete calls
//! take `&mut Option<_>` and reset it, so deleting twice is a no-op.

use std::fmt;
use std::num::NonZeroU32;

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident, $tag:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(NonZeroU32);

        impl $name {
            #[inline(always)]
            pub const fn new(raw: NonZeroU32) -> Self {
                Self(raw)
            }

            /// Returns `None` for the raw value 0, which no backend hands out.
            #[inline(always)]
            pub const fn from_raw(raw: u32) -> Option<Self> {
                match NonZeroU32::new(raw) {
                    Some(v) => Some(Self(v)),
                    None => None,
                }
            }

            #[inline(always)]
            pub const fn raw(self) -> u32 {
                self.0.get()
            }

            #[inline(always)]
            pub const fn get(self) -> NonZeroU32 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($tag, "#{}"), self.0)
            }
        }
    };
}

resource_id!(
    /// A texture living in GPU (or staging) memory.
    TextureId,
    "tex"
);
resource_id!(
    /// A vertex buffer, static or dynamic.
    VertexBufferId,
    "vb"
);
resource_id!(
    /// A 16-bit index buffer.
    IndexBufferId,
    "ib"
);

#[cfg(test)]
mod tests {
    use super::{IndexBufferId, TextureId, VertexBufferId};

    #[test]
    fn zero_is_never_a_valid_handle() {
        assert!(TextureId::from_raw(0).is_none());
        assert!(VertexBufferId::from_raw(0).is_none());
        assert_eq!(IndexBufferId::from_raw(7).map(IndexBufferId::raw), Some(7));
    }

    #[test]
    fn debug_names_the_resource_kind() {
        let id = TextureId::from_raw(3).unwrap();
        assert_eq!(format!("{id:?}"), "tex#3");
    }
}
