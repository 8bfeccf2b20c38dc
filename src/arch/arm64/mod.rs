pub mod boot;
pub mod exceptions;

/// Stops this core for good.
pub fn park_cpu() -> ! {
    loop {
        #[cfg(all(feature = "arch-aarch64", target_arch = "aarch64"))]
        aarch64_cpu::asm::wfe();

        #[cfg(not(all(feature = "arch-aarch64", target_arch = "aarch64")))]
        core::hint::spin_loop();
    }
}
