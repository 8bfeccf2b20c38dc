use thiserror::Error;

use crate::arch::arm64::memory::pg_tables::Level;
use crate::memory::address::{PA, VA};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    #[error("physical address {0} is not page aligned")]
    PhysNotAligned(PA),

    #[error("virtual address {0} is not page aligned")]
    VirtNotAligned(VA),

    #[error("mapping size 0x{0:x} is not a multiple of the page size")]
    SizeNotAligned(usize),

    #[error("virtual range {start} + 0x{size:x} exceeds the {va_bits}-bit input address space")]
    VirtOutOfRange { start: VA, size: usize, va_bits: u32 },

    #[error("physical range {start} + 0x{size:x} exceeds the {pa_bits}-bit output address space")]
    PhysOutOfRange { start: PA, size: usize, pa_bits: u32 },

    #[error("translation table pool exhausted ({capacity} tables)")]
    OutOfTables { capacity: usize },

    #[error("mapping would descend past the last translation level")]
    WalkDepthExceeded,

    #[error("table walk blocked at level {level}")]
    WalkBlocked { level: Level },
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0}-bit virtual addresses are not supported with a 4K granule")]
    UnsupportedVaBits(u32),

    #[error("{0}-bit physical addresses have no PS encoding")]
    UnsupportedPaBits(u32),

    #[error("table storage has no room for a root table")]
    NoRootTable,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ActivationError {
    #[error("root table {0} is not page aligned")]
    RootMisaligned(PA),

    #[error("root table {0} lies outside the configured physical address range")]
    RootOutsidePhysRange(PA),

    #[error("translation is already enabled")]
    AlreadyEnabled,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    #[error("mapping failed: {0}")]
    Map(#[from] MapError),

    #[error("invalid translation configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("MMU activation failed: {0}")]
    Activation(#[from] ActivationError),
}

pub type Result<T> = core::result::Result<T, KernelError>;
