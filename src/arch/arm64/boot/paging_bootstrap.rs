use libkernel::arch::arm64::memory::{
    mmu::{ActiveTables, MmuRegisters},
    pg_tables::{PgTableArray, TranslationRegime, TranslationTableSet, XlatConfig},
};
use libkernel::error::{ConfigError, Result};
use libkernel::memory::PAGE_SIZE;
use libkernel::memory::address::PA;
use libkernel::memory::attributes::{Execute, RegionAttributes};
use libkernel::memory::region::PhysMemoryRegion;
use log::info;

/// Subtables reserved for the boot mappings, not counting the root.
pub const MAX_XLAT_TABLES: usize = 32;

pub const BOOT_VA_BITS: u32 = 48;
pub const BOOT_PA_BITS: u32 = 40;

/// PL011 on the QEMU `virt` board.
pub const UART_BASE: PA = PA::from_value(0x0900_0000);

pub fn boot_config() -> core::result::Result<XlatConfig, ConfigError> {
    XlatConfig::new(BOOT_VA_BITS, BOOT_PA_BITS, TranslationRegime::El2)
}

/// The image holds code, data and the translation tables themselves.
pub const fn image_attributes() -> RegionAttributes {
    RegionAttributes::normal_rw()
        .non_secure()
        .with_execute(Execute::PRIVILEGED)
}

pub const fn uart_attributes() -> RegionAttributes {
    RegionAttributes::device_rw().non_secure()
}

pub fn uart_region() -> PhysMemoryRegion {
    PhysMemoryRegion::new(UART_BASE, PAGE_SIZE)
}

/// Identity maps `image` and `uart` into `storage` and turns the MMU on.
///
/// `storage[0]` becomes the root table; the rest is the subtable pool.
pub fn do_paging_bootstrap<'a, R>(
    storage: &'a mut [PgTableArray],
    tables_pa: PA,
    config: XlatConfig,
    image: PhysMemoryRegion,
    uart: PhysMemoryRegion,
    regs: &mut R,
) -> Result<ActiveTables<'a>>
where
    R: MmuRegisters + ?Sized,
{
    let mut tables = TranslationTableSet::with_phys_base(config, storage, tables_pa)?;

    let image = image.page_align_outwards();
    info!(
        "img start {} end {}",
        image.start_address(),
        image.end_address()
    );

    tables.add_mapping(
        "image",
        image.start_address(),
        image.start_address().to_va(),
        image.size(),
        image_attributes(),
    )?;

    let uart = uart.page_align_outwards();
    tables.add_mapping(
        "uart",
        uart.start_address(),
        uart.start_address().to_va(),
        uart.size(),
        uart_attributes(),
    )?;

    info!(
        "{} of {} translation tables used",
        tables.tables_used(),
        tables.capacity()
    );

    Ok(tables.enable(regs)?)
}
