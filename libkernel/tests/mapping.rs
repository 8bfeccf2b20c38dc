use libkernel::{
    arch::arm64::memory::{
        mmu::{MEMORY_ATTRIBUTES, MmuRegisters, SCTLR_C, SCTLR_M},
        pg_descriptors::{DescriptorAttrs, DescriptorKind},
        pg_tables::{Level, PgTableArray, TableId, TranslationRegime, TranslationTableSet, XlatConfig},
        pg_walk::{locate_slot, translate},
    },
    error::MapError,
    memory::{
        PAGE_SIZE,
        address::{PA, VA},
        attributes::{AccessPermission, Execute, MemoryType, RegionAttributes},
    },
};
use rand::{Rng, SeedableRng, rngs::SmallRng};

const MIB: usize = 1024 * 1024;
const GIB: usize = 1024 * MIB;
const TABLES_PA: usize = 0x4800_0000;

fn storage(tables: usize) -> Vec<PgTableArray> {
    vec![PgTableArray::new(); tables]
}

fn config() -> XlatConfig {
    XlatConfig::new(39, 40, TranslationRegime::El2).unwrap()
}

fn table_set(backing: &mut [PgTableArray]) -> TranslationTableSet<'_> {
    TranslationTableSet::with_phys_base(config(), backing, PA::from_value(TABLES_PA)).unwrap()
}

fn map_2m_ram(tables: &mut TranslationTableSet) {
    tables
        .add_mapping(
            "ram",
            PA::from_value(0x4000_0000),
            VA::from_value(0x4000_0000),
            2 * MIB,
            RegionAttributes::normal_rw(),
        )
        .unwrap();
}

fn map_uart(tables: &mut TranslationTableSet) -> Result<(), MapError> {
    tables.add_mapping(
        "uart",
        PA::from_value(0x0900_0000),
        VA::from_value(0x0900_0000),
        PAGE_SIZE,
        RegionAttributes::device_rw().non_secure(),
    )
}

#[test]
fn ram_block_is_a_single_descriptor() {
    let mut backing = storage(4);
    let mut tables = table_set(&mut backing);

    map_2m_ram(&mut tables);

    // The root covers 1G per entry, so the 2M block sits one level down.
    assert_eq!(tables.tables_used(), 1);
    let t = translate(&tables, VA::from_value(0x4000_0000)).unwrap();
    assert_eq!(t.level, Level::L2);
    assert_eq!(t.descriptor.kind(Level::L2), DescriptorKind::Block);
    assert_eq!(t.pa, PA::from_value(0x4000_0000));

    let valid = tables
        .table(TableId::ROOT)
        .entries()
        .iter()
        .filter(|d| d.is_valid())
        .count();
    assert_eq!(valid, 1);

    // A full 1G entry needs no subtable at all.
    let mut backing = storage(4);
    let mut tables = table_set(&mut backing);
    tables
        .add_mapping(
            "gig",
            PA::from_value(0x4000_0000),
            VA::from_value(0x4000_0000),
            GIB,
            RegionAttributes::normal_rw(),
        )
        .unwrap();
    assert_eq!(tables.tables_used(), 0);
    assert_eq!(translate(&tables, VA::from_value(0x7fff_f000)).unwrap().level, Level::L1);
}

#[test]
fn device_page_needs_tables_down_to_l3() {
    let mut backing = storage(4);
    let mut tables = table_set(&mut backing);

    map_2m_ram(&mut tables);
    let before = tables.tables_used();

    map_uart(&mut tables).unwrap();
    assert_eq!(tables.tables_used(), before + 2);

    let va = VA::from_value(0x0900_0000);
    let l1 = locate_slot(&tables, va, Level::L1).unwrap();
    let l2 = locate_slot(&tables, va, Level::L2).unwrap();
    assert_eq!(tables.descriptor(l1).kind(Level::L1), DescriptorKind::Table);
    assert_eq!(tables.descriptor(l2).kind(Level::L2), DescriptorKind::Table);

    let uart = translate(&tables, va).unwrap();
    let ram = translate(&tables, VA::from_value(0x4000_0000)).unwrap();
    assert_eq!(uart.level, Level::L3);
    assert_eq!(uart.descriptor.kind(Level::L3), DescriptorKind::Page);

    let attrs = uart.descriptor.attrs();
    assert_eq!(attrs.mem_type_index(), MemoryType::DeviceNGnRnE.mair_index());
    assert!(attrs.is_execute_never(TranslationRegime::El2));
    // PXN is RES0 in the EL2 regime.
    assert_eq!(uart.descriptor.as_raw() & (1 << 53), 0);
    assert!(attrs.is_non_secure());
    assert_ne!(attrs, ram.descriptor.attrs());
}

#[test]
fn misaligned_size_allocates_nothing() {
    let mut backing = storage(4);
    let mut tables = table_set(&mut backing);
    map_2m_ram(&mut tables);
    let used = tables.tables_used();

    let err = tables.add_mapping(
        "odd",
        PA::from_value(0x5000_0000),
        VA::from_value(0x5000_0000),
        PAGE_SIZE + 0x10,
        RegionAttributes::normal_rw(),
    );

    assert_eq!(err, Err(MapError::SizeNotAligned(PAGE_SIZE + 0x10)));
    assert_eq!(tables.tables_used(), used);
}

#[test]
fn page_with_new_attributes_splits_the_block() {
    let mut backing = storage(4);
    let mut tables = table_set(&mut backing);
    map_2m_ram(&mut tables);

    let block_slot = locate_slot(&tables, VA::from_value(0x4000_0000), Level::L2).unwrap();
    let old_attrs = tables.descriptor(block_slot).attrs();
    let new = RegionAttributes::normal_rx();

    tables
        .add_mapping(
            "text",
            PA::from_value(0x4008_0000),
            VA::from_value(0x4008_0000),
            PAGE_SIZE,
            new,
        )
        .unwrap();

    let split = tables.descriptor(block_slot);
    assert_eq!(split.kind(Level::L2), DescriptorKind::Table);

    let child = tables.table_id(split.output_address()).unwrap();
    let entries = tables.table(child).entries();
    let changed = Level::L3.index(VA::from_value(0x4008_0000));

    for (i, d) in entries.iter().enumerate() {
        assert_eq!(d.kind(Level::L3), DescriptorKind::Page);
        assert_eq!(d.output_address(), PA::from_value(0x4000_0000 + i * PAGE_SIZE));
        if i == changed {
            assert_eq!(d.attrs(), DescriptorAttrs::new(new, TranslationRegime::El2));
        } else {
            assert_eq!(d.attrs(), old_attrs);
        }
    }
}

#[test]
fn pool_capacity_is_exact() {
    let mut backing = storage(3);
    let mut tables = table_set(&mut backing);
    map_uart(&mut tables).unwrap();
    assert_eq!(tables.tables_used(), tables.capacity());

    let mut backing = storage(2);
    let mut tables = table_set(&mut backing);
    assert_eq!(map_uart(&mut tables), Err(MapError::OutOfTables { capacity: 1 }));
    assert_eq!(tables.tables_used(), 1);
}

#[test]
fn repeated_mapping_changes_nothing() {
    let mut backing = storage(8);
    let mut tables = table_set(&mut backing);

    fn map(t: &mut TranslationTableSet) -> Result<(), MapError> {
        t.add_mapping(
            "image",
            PA::from_value(0x4000_1000),
            VA::from_value(0x4000_1000),
            3 * MIB,
            RegionAttributes::normal_rw().non_secure(),
        )
    }

    map(&mut tables).unwrap();
    let used = tables.tables_used();
    let snapshot: Vec<PgTableArray> = (0..=used)
        .map(|i| tables.table(id(&tables, i)).clone())
        .collect();

    map(&mut tables).unwrap();
    assert_eq!(tables.tables_used(), used);
    for (i, before) in snapshot.iter().enumerate() {
        assert_eq!(tables.table(id(&tables, i)).entries(), before.entries());
    }
}

fn id(tables: &TranslationTableSet, index: usize) -> TableId {
    tables
        .table_id(tables.root_pa().add_pages(index))
        .unwrap()
}

#[test]
fn neighbours_are_left_alone() {
    let mut backing = storage(8);
    let mut tables = table_set(&mut backing);

    map_2m_ram(&mut tables);
    tables
        .add_mapping(
            "mmio",
            PA::from_value(0x0a00_0000),
            VA::from_value(0x4020_0000),
            16 * PAGE_SIZE,
            RegionAttributes::device_rw(),
        )
        .unwrap();
    map_uart(&mut tables).unwrap();

    for off in (0..2 * MIB).step_by(64 * 1024) {
        let t = translate(&tables, VA::from_value(0x4000_0000 + off)).unwrap();
        assert_eq!(t.pa, PA::from_value(0x4000_0000 + off));
        assert_eq!(t.descriptor.attrs(), DescriptorAttrs::new(RegionAttributes::normal_rw(), TranslationRegime::El2));
    }

    let t = translate(&tables, VA::from_value(0x4020_f000)).unwrap();
    assert_eq!(t.pa, PA::from_value(0x0a00_f000));
    assert_eq!(translate(&tables, VA::from_value(0x4021_0000)), None);
    assert_eq!(translate(&tables, VA::from_value(0x0900_1000)), None);
}

fn random_attrs(rng: &mut SmallRng) -> RegionAttributes {
    const TYPES: [MemoryType; 6] = [
        MemoryType::DeviceNGnRnE,
        MemoryType::DeviceNGnRE,
        MemoryType::DeviceGRE,
        MemoryType::NormalNonCacheable,
        MemoryType::Normal,
        MemoryType::NormalWriteThrough,
    ];

    let access = if rng.random() {
        AccessPermission::ReadWrite
    } else {
        AccessPermission::ReadOnly
    };

    let mut attrs = RegionAttributes::new(TYPES[rng.random_range(0..TYPES.len())], access)
        .with_execute(Execute::from_bits_truncate(rng.random_range(0..4)));

    if rng.random() {
        attrs = attrs.non_secure();
    }

    attrs
}

#[test]
fn random_regions_translate_exactly() {
    let mut rng = SmallRng::seed_from_u64(0x5eed_0f_7ab1e5);
    let mut backing = storage(512);
    let mut tables = table_set(&mut backing);

    // One region per 1G window so no two requests overlap.
    let mut regions = Vec::new();
    for window in 0..64usize {
        let pages_in_window = GIB / PAGE_SIZE;
        let start = rng.random_range(0..pages_in_window - 1);
        let len = rng.random_range(1..=(pages_in_window - start).min(1024));

        let virt = VA::from_value(window * GIB + start * PAGE_SIZE);
        let size = len * PAGE_SIZE;

        // Keep the output offset within 2M equal to the input one on half the
        // regions so block descriptors get exercised too.
        let phys = if rng.random() {
            PA::from_value(rng.random_range(0..256usize) * GIB + (virt.value() % GIB))
        } else {
            PA::from_value(rng.random_range(0..(1usize << 27)) * PAGE_SIZE)
        };

        let attrs = random_attrs(&mut rng);
        tables.add_mapping("rand", phys, virt, size, attrs).unwrap();
        regions.push((virt, phys, size, attrs));
    }

    for (virt, phys, size, attrs) in regions {
        for _ in 0..16 {
            let off = rng.random_range(0..size);
            let t = translate(&tables, VA::from_value(virt.value() + off)).unwrap();
            assert_eq!(t.pa, phys.add_bytes(off));
            assert_eq!(t.descriptor.attrs(), DescriptorAttrs::new(attrs, TranslationRegime::El2));
        }

        if virt.value() % GIB != 0 {
            assert_eq!(translate(&tables, VA::from_value(virt.value() - PAGE_SIZE)), None);
        }
        if (virt.value() + size) % GIB != 0 {
            assert_eq!(translate(&tables, virt.add_bytes(size)), None);
        }
    }

    assert!(tables.tables_used() <= tables.capacity());
}

#[derive(Default)]
struct FakeCpu {
    mair: u64,
    tcr: u64,
    ttbr0: u64,
    sctlr: u64,
    barriers: usize,
}

impl MmuRegisters for FakeCpu {
    fn write_mair(&mut self, value: u64) {
        self.mair = value;
    }

    fn write_tcr(&mut self, value: u64) {
        self.tcr = value;
    }

    fn write_ttbr0(&mut self, value: u64) {
        self.ttbr0 = value;
    }

    fn read_sctlr(&mut self) -> u64 {
        self.sctlr
    }

    fn write_sctlr(&mut self, value: u64) {
        self.sctlr = value;
    }

    fn dsb(&mut self) {
        self.barriers += 1;
    }

    fn isb(&mut self) {
        self.barriers += 1;
    }
}

#[test]
fn boot_mappings_then_enable() {
    let mut backing = storage(8);
    let mut tables = table_set(&mut backing);

    map_2m_ram(&mut tables);
    map_uart(&mut tables).unwrap();

    let mut cpu = FakeCpu::default();
    let active = tables.enable(&mut cpu).unwrap();

    assert_eq!(cpu.mair, MEMORY_ATTRIBUTES);
    assert_eq!(cpu.ttbr0, TABLES_PA as u64);
    assert_eq!(cpu.tcr & 0x3f, 25);
    assert_eq!(cpu.sctlr, SCTLR_M | SCTLR_C);
    assert_eq!(cpu.barriers, 3);

    assert_eq!(
        active.translate(VA::from_value(0x0900_0000)).unwrap().pa,
        PA::from_value(0x0900_0000)
    );
}
