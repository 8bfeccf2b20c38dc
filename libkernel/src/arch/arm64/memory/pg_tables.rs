use core::fmt;

use super::pg_descriptors::Descriptor;
use crate::error::{ConfigError, MapError};
use crate::memory::address::{PA, VA};
use crate::memory::{PAGE_SHIFT, PAGE_SIZE};

/// Number of translation levels with a 4K granule (L0 - L3).
pub const XLAT_LEVELS: usize = 4;

/// Widest input address a 4K granule can translate.
pub const VA_BITS_MAX: u32 = 48;

/// Narrowest input address space (T0SZ = 39).
pub const VA_BITS_MIN: u32 = 25;

/// VA bits resolved by each table (9 with a 4K granule).
pub const LEVEL_INDEX_BITS: usize = (VA_BITS_MAX as usize - PAGE_SHIFT) / XLAT_LEVELS;

pub const DESCRIPTORS_PER_TABLE: usize = 1 << LEVEL_INDEX_BITS;

const LEVEL_INDEX_MASK: usize = DESCRIPTORS_PER_TABLE - 1;

/// A depth in the table hierarchy. Level 0 maps the largest span per entry,
/// level 3 a single page.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Level(u8);

impl Level {
    pub const L0: Self = Self(0);
    pub const L1: Self = Self(1);
    pub const L2: Self = Self(2);
    pub const L3: Self = Self(3);

    pub const LAST: Self = Self::L3;

    pub const fn new(level: u8) -> Option<Self> {
        if level as usize >= XLAT_LEVELS {
            None
        } else {
            Some(Self(level))
        }
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    /// Lowest VA bit resolved by this level.
    pub const fn shift(self) -> usize {
        PAGE_SHIFT + LEVEL_INDEX_BITS * (Self::LAST.0 - self.0) as usize
    }

    /// Bytes covered by a single entry at this level.
    pub const fn span(self) -> usize {
        1 << self.shift()
    }

    pub const fn index(self, va: VA) -> usize {
        (va.value() >> self.shift()) & LEVEL_INDEX_MASK
    }

    /// Block descriptors exist at L1 and L2 (pages at L3). An L0 entry can
    /// only point at a table with a 4K granule.
    pub const fn supports_block(self) -> bool {
        self.0 >= Self::L1.0
    }

    pub const fn is_last(self) -> bool {
        self.0 == Self::LAST.0
    }

    pub const fn next(self) -> Option<Self> {
        Self::new(self.0 + 1)
    }

    /// The level the walk starts at for an input address of `va_bits`.
    pub const fn base_for_va_bits(va_bits: u32) -> Self {
        let va_bits = va_bits as usize;
        if va_bits > Self::L0.shift() {
            Self::L0
        } else if va_bits > Self::L1.shift() {
            Self::L1
        } else if va_bits > Self::L2.shift() {
            Self::L2
        } else {
            Self::L3
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// The exception level whose stage 1 regime the tables are built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TranslationRegime {
    El1,
    #[default]
    El2,
}

/// Physical address size, encoded as TCR.{PS,IPS}.
#[repr(u64)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhysAddrSize {
    Bits32 = 0b000,
    Bits36 = 0b001,
    Bits40 = 0b010,
    Bits42 = 0b011,
    Bits44 = 0b100,
    Bits48 = 0b101,
}

impl PhysAddrSize {
    pub const fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            32 => Some(Self::Bits32),
            36 => Some(Self::Bits36),
            40 => Some(Self::Bits40),
            42 => Some(Self::Bits42),
            44 => Some(Self::Bits44),
            48 => Some(Self::Bits48),
            _ => None,
        }
    }

    pub const fn bits(self) -> u32 {
        match self {
            Self::Bits32 => 32,
            Self::Bits36 => 36,
            Self::Bits40 => 40,
            Self::Bits42 => 42,
            Self::Bits44 => 44,
            Self::Bits48 => 48,
        }
    }

    pub const fn encoding(self) -> u64 {
        self as u64
    }
}

/// Validated translation parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct XlatConfig {
    va_bits: u32,
    pa_size: PhysAddrSize,
    regime: TranslationRegime,
    base_level: Level,
}

impl XlatConfig {
    pub const fn new(
        va_bits: u32,
        pa_bits: u32,
        regime: TranslationRegime,
    ) -> Result<Self, ConfigError> {
        if va_bits > VA_BITS_MAX || va_bits < VA_BITS_MIN {
            return Err(ConfigError::UnsupportedVaBits(va_bits));
        }

        let pa_size = match PhysAddrSize::from_bits(pa_bits) {
            Some(s) => s,
            None => return Err(ConfigError::UnsupportedPaBits(pa_bits)),
        };

        Ok(Self {
            va_bits,
            pa_size,
            regime,
            base_level: Level::base_for_va_bits(va_bits),
        })
    }

    pub const fn va_bits(&self) -> u32 {
        self.va_bits
    }

    pub const fn pa_bits(&self) -> u32 {
        self.pa_size.bits()
    }

    pub const fn pa_size(&self) -> PhysAddrSize {
        self.pa_size
    }

    pub const fn regime(&self) -> TranslationRegime {
        self.regime
    }

    pub const fn base_level(&self) -> Level {
        self.base_level
    }

    /// One past the highest translatable input address.
    pub const fn va_limit(&self) -> usize {
        1 << self.va_bits
    }

    /// One past the highest addressable output address.
    pub const fn pa_limit(&self) -> usize {
        1 << self.pa_size.bits()
    }

}

/// One 4K translation table.
#[derive(Clone)]
#[repr(C, align(4096))]
pub struct PgTableArray {
    entries: [Descriptor; DESCRIPTORS_PER_TABLE],
}

const _: () = assert!(core::mem::size_of::<PgTableArray>() == PAGE_SIZE);

impl PgTableArray {
    pub const fn new() -> Self {
        Self {
            entries: [Descriptor::invalid(); DESCRIPTORS_PER_TABLE],
        }
    }

    pub fn get(&self, idx: usize) -> Descriptor {
        self.entries[idx]
    }

    pub fn entries(&self) -> &[Descriptor] {
        &self.entries
    }

    fn set(&mut self, idx: usize, desc: Descriptor) {
        self.entries[idx] = desc;
    }

    fn clear(&mut self) {
        self.entries.fill(Descriptor::invalid());
    }
}

impl Default for PgTableArray {
    fn default() -> Self {
        Self::new()
    }
}

/// Index of a table inside a [`TranslationTableSet`]'s arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableId(usize);

impl TableId {
    pub const ROOT: Self = Self(0);

    pub const fn value(self) -> usize {
        self.0
    }
}

/// A descriptor slot: which table, which entry, and the level of that table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotRef {
    pub table: TableId,
    pub index: usize,
    pub level: Level,
}

/// The root table plus a bump-allocated pool of subtables for one regime.
///
/// The first table of the backing storage is the root; the rest form the
/// pool. Tables are handed out in order and never freed, so every table
/// descriptor points at a distinct child.
pub struct TranslationTableSet<'a> {
    config: XlatConfig,
    tables: &'a mut [PgTableArray],
    phys_base: PA,
    next_free: usize,
}

impl<'a> TranslationTableSet<'a> {
    /// Builds a table set over `storage`, which must be identity mapped (true
    /// while the MMU is off).
    pub fn new(
        config: XlatConfig,
        storage: &'a mut [PgTableArray],
    ) -> Result<Self, ConfigError> {
        let phys_base = PA::from_value(storage.as_ptr() as usize);
        Self::with_phys_base(config, storage, phys_base)
    }

    /// Builds a table set over `storage` located at physical address
    /// `phys_base`.
    pub fn with_phys_base(
        config: XlatConfig,
        storage: &'a mut [PgTableArray],
        phys_base: PA,
    ) -> Result<Self, ConfigError> {
        let root = storage.first_mut().ok_or(ConfigError::NoRootTable)?;
        root.clear();

        Ok(Self {
            config,
            tables: storage,
            phys_base,
            next_free: 1,
        })
    }

    pub fn config(&self) -> &XlatConfig {
        &self.config
    }

    /// Maximum number of subtables the pool can hand out.
    pub fn capacity(&self) -> usize {
        self.tables.len() - 1
    }

    /// Number of subtables handed out so far.
    pub fn tables_used(&self) -> usize {
        self.next_free - 1
    }

    pub fn root_pa(&self) -> PA {
        self.table_pa(TableId::ROOT)
    }

    pub fn table_pa(&self, id: TableId) -> PA {
        self.phys_base.add_pages(id.0)
    }

    /// Maps a table address found in a descriptor back to the arena. Returns
    /// `None` for addresses this set never handed out.
    pub fn table_id(&self, pa: PA) -> Option<TableId> {
        let offset = pa.value().checked_sub(self.phys_base.value())?;
        if offset % PAGE_SIZE != 0 {
            return None;
        }

        let idx = offset / PAGE_SIZE;
        (idx < self.next_free).then_some(TableId(idx))
    }

    pub fn table(&self, id: TableId) -> &PgTableArray {
        &self.tables[id.0]
    }

    pub fn descriptor(&self, slot: SlotRef) -> Descriptor {
        self.tables[slot.table.0].get(slot.index)
    }

    pub(super) fn write_descriptor(&mut self, slot: SlotRef, desc: Descriptor) {
        self.tables[slot.table.0].set(slot.index, desc);
    }

    /// Hands out the next zeroed table from the pool.
    pub fn allocate_table(&mut self) -> Result<TableId, MapError> {
        let capacity = self.capacity();
        let table = self
            .tables
            .get_mut(self.next_free)
            .ok_or(MapError::OutOfTables { capacity })?;

        table.clear();

        let id = TableId(self.next_free);
        self.next_free += 1;

        Ok(id)
    }
}
