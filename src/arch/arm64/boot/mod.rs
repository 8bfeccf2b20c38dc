pub mod paging_bootstrap;

#[cfg(all(feature = "arch-aarch64", target_arch = "aarch64", target_os = "none"))]
mod entry {
    use libkernel::arch::arm64::memory::{
        mmu::{ActiveTables, El2Registers},
        pg_tables::PgTableArray,
    };
    use libkernel::error::Result;
    use libkernel::memory::address::PA;
    use libkernel::memory::region::PhysMemoryRegion;
    use log::{error, info};
    use static_cell::{ConstStaticCell, StaticCell};

    use super::paging_bootstrap::{
        MAX_XLAT_TABLES, UART_BASE, boot_config, do_paging_bootstrap, uart_region,
    };
    use crate::arch::arm64::park_cpu;
    use crate::console;
    use crate::drivers::uart::pl011::{DEFAULT_BAUD, PL011_CLOCK_HZ, Pl011};

    unsafe extern "C" {
        static _image_start: u8;
        static _image_end: u8;
    }

    static XLAT_TABLES: ConstStaticCell<[PgTableArray; MAX_XLAT_TABLES + 1]> =
        ConstStaticCell::new([const { PgTableArray::new() }; MAX_XLAT_TABLES + 1]);

    static ACTIVE_TABLES: StaticCell<ActiveTables<'static>> = StaticCell::new();

    fn paging_bootstrap() -> Result<()> {
        let start = PA::from_value(unsafe { &raw const _image_start } as usize);
        let end = PA::from_value(unsafe { &raw const _image_end } as usize);
        let image = PhysMemoryRegion::from_bounds(start, end)
            .unwrap_or(PhysMemoryRegion::new(start, 0));

        let Some(storage) = XLAT_TABLES.try_take() else {
            error!("Boot translation tables already in use");
            park_cpu()
        };

        // The MMU is still off, so the tables' link address is physical.
        let tables_pa = PA::from_value(storage.as_ptr() as usize);

        let active = do_paging_bootstrap(
            storage,
            tables_pa,
            boot_config()?,
            image,
            uart_region(),
            &mut El2Registers,
        )?;

        ACTIVE_TABLES.init(active);
        Ok(())
    }

    /// Called from the boot assembly on the primary core at EL2, MMU off,
    /// with a stack and zeroed .bss.
    #[unsafe(no_mangle)]
    pub extern "C" fn early_init() {
        let uart = unsafe { Pl011::new(UART_BASE.to_va()) };
        uart.init(PL011_CLOCK_HZ, DEFAULT_BAUD);

        if console::init(uart).is_err() {
            park_cpu()
        }

        match paging_bootstrap() {
            Ok(()) => info!("Paging bootstrap complete"),
            Err(e) => {
                error!("Paging bootstrap failed: {e}");
                park_cpu()
            }
        }
    }
}
