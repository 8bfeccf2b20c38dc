//! EL2 boot stage for AArch64: brings up the PL011 console, identity maps the
//! image and the UART with [`libkernel`]'s translation table builder and turns
//! the MMU on.

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod console;
pub mod drivers;
