use core::fmt;

use super::{PAGE_MASK, PAGE_SIZE};

macro_rules! define_address {
    ($(#[$outer:meta])* $name:ident) => {
        $(#[$outer])*
        #[repr(transparent)]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(usize);

        impl $name {
            pub const fn from_value(value: usize) -> Self {
                Self(value)
            }

            pub const fn value(self) -> usize {
                self.0
            }

            pub const fn add_bytes(self, bytes: usize) -> Self {
                Self(self.0 + bytes)
            }

            pub const fn add_pages(self, pages: usize) -> Self {
                Self(self.0 + pages * PAGE_SIZE)
            }

            pub const fn checked_add(self, bytes: usize) -> Option<Self> {
                match self.0.checked_add(bytes) {
                    Some(v) => Some(Self(v)),
                    None => None,
                }
            }

            /// `align` must be a power of two.
            pub const fn is_aligned(self, align: usize) -> bool {
                self.0 & (align - 1) == 0
            }

            pub const fn is_page_aligned(self) -> bool {
                self.0 & PAGE_MASK == 0
            }

            /// Rounds down to `align`, which must be a power of two.
            pub const fn align(self, align: usize) -> Self {
                Self(self.0 & !(align - 1))
            }

            pub const fn page_aligned(self) -> Self {
                self.align(PAGE_SIZE)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{:016x}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({self})", stringify!($name))
            }
        }
    };
}

define_address!(
    /// A physical (output) address.
    PA
);

define_address!(
    /// A virtual (input) address.
    VA
);

impl PA {
    /// The identity mapping of this address, valid while the MMU is off or
    /// for identity-mapped regions.
    pub const fn to_va(self) -> VA {
        VA(self.0)
    }
}
