#![cfg_attr(not(test), no_std)]

//! Boot-time memory translation support.
//!
//! Everything in here runs before any memory manager exists: the translation
//! tables live in caller-provided storage and are built on a single core with
//! the MMU still off.

pub mod arch;
pub mod error;
pub mod memory;
