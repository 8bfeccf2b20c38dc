use core::fmt;

use tock_registers::interfaces::{ReadWriteable, Readable};
use tock_registers::{register_bitfields, registers::InMemoryRegister};

use super::pg_tables::{Level, TranslationRegime};
use crate::memory::PAGE_SHIFT;
use crate::memory::address::PA;
use crate::memory::attributes::{
    AccessPermission, Execute, MemoryType, RegionAttributes, SecurityState,
};

// VMSAv8-64 stage 1 descriptor, 4K granule, 48-bit output address.
register_bitfields![u64,
    DescriptorFields [
        TYPE        OFFSET(0)  NUMBITS(2) [
            Invalid = 0b00,
            Block = 0b01,
            TableOrPage = 0b11,
        ],
        ATTR_INDX   OFFSET(2)  NUMBITS(3) [],
        NS          OFFSET(5)  NUMBITS(1) [],
        AP          OFFSET(6)  NUMBITS(2) [
            RwHigherEl = 0b00,
            RwAllEl = 0b01,
            RoHigherEl = 0b10,
            RoAllEl = 0b11,
        ],
        SH          OFFSET(8)  NUMBITS(2) [
            NonShareable = 0b00,
            OuterShareable = 0b10,
            InnerShareable = 0b11,
        ],
        AF          OFFSET(10) NUMBITS(1) [],
        NG          OFFSET(11) NUMBITS(1) [],
        OUTPUT_ADDR OFFSET(12) NUMBITS(36) [],
        // RES0 in the EL2 regime.
        PXN         OFFSET(53) NUMBITS(1) [],
        // XN in the EL2 regime.
        UXN         OFFSET(54) NUMBITS(1) [],
    ]
];

type DescReg = InMemoryRegister<u64, DescriptorFields::Register>;

/// Upper (63:51) and lower (11:2) attribute fields of a block/page descriptor.
const DESC_ATTRS_UPPER_MASK: u64 = !((1 << 51) - 1);
const DESC_ATTRS_LOWER_MASK: u64 = ((1 << 12) - 1) & !0b11;
const DESC_ATTRS_MASK: u64 = DESC_ATTRS_UPPER_MASK | DESC_ATTRS_LOWER_MASK;

const TYPE_MASK: u64 = 0b11;
const TYPE_BLOCK: u64 = 0b01;
const TYPE_TABLE_OR_PAGE: u64 = 0b11;

/// What a descriptor means at a given level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptorKind {
    Invalid,
    Table,
    Block,
    Page,
}

impl DescriptorKind {
    /// Block and page descriptors both terminate the walk.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Block | Self::Page)
    }
}

/// The attribute bits of a terminal descriptor, with no type code or output
/// address.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct DescriptorAttrs(u64);

impl DescriptorAttrs {
    pub const fn from_raw(v: u64) -> Self {
        Self(v & DESC_ATTRS_MASK)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }

    fn reg(self) -> DescReg {
        DescReg::new(self.0)
    }

    pub fn mem_type_index(self) -> u64 {
        self.reg().read(DescriptorFields::ATTR_INDX)
    }

    pub fn is_writable(self) -> bool {
        // AP[2] clear means read-write.
        self.reg().read(DescriptorFields::AP) & 0b10 == 0
    }

    pub fn is_non_secure(self) -> bool {
        self.reg().is_set(DescriptorFields::NS)
    }

    pub fn is_privileged_execute_never(self) -> bool {
        self.reg().is_set(DescriptorFields::PXN)
    }

    pub fn is_unprivileged_execute_never(self) -> bool {
        self.reg().is_set(DescriptorFields::UXN)
    }

    /// Encodes `attrs` for the stage 1 regime of `regime`.
    pub fn new(attrs: RegionAttributes, regime: TranslationRegime) -> Self {
        let reg = DescReg::new(0);

        // Every mapping is created as already accessed so the core never
        // raises an access flag fault for it.
        reg.modify(
            DescriptorFields::AF::SET
                + DescriptorFields::ATTR_INDX.val(attrs.mem_type.mair_index()),
        );

        if attrs.security == SecurityState::NonSecure {
            reg.modify(DescriptorFields::NS::SET);
        }

        reg.modify(match (attrs.access, attrs.el0_access) {
            (AccessPermission::ReadWrite, false) => DescriptorFields::AP::RwHigherEl,
            (AccessPermission::ReadWrite, true) => DescriptorFields::AP::RwAllEl,
            (AccessPermission::ReadOnly, false) => DescriptorFields::AP::RoHigherEl,
            (AccessPermission::ReadOnly, true) => DescriptorFields::AP::RoAllEl,
        });

        let device = attrs.mem_type.is_device();

        match regime {
            TranslationRegime::El1 => {
                if device || !attrs.execute.contains(Execute::PRIVILEGED) {
                    reg.modify(DescriptorFields::PXN::SET);
                }
                if device || !attrs.execute.contains(Execute::UNPRIVILEGED) {
                    reg.modify(DescriptorFields::UXN::SET);
                }
            }
            // Only one exception level translates through this regime, and
            // it is privileged.
            TranslationRegime::El2 => {
                if device || !attrs.execute.contains(Execute::PRIVILEGED) {
                    reg.modify(DescriptorFields::UXN::SET);
                }
            }
        }

        reg.modify(match attrs.mem_type {
            MemoryType::DeviceNGnRnE
            | MemoryType::DeviceNGnRE
            | MemoryType::DeviceGRE
            | MemoryType::NormalNonCacheable => DescriptorFields::SH::OuterShareable,
            MemoryType::Normal | MemoryType::NormalWriteThrough => {
                DescriptorFields::SH::InnerShareable
            }
        });

        Self(reg.get())
    }

    /// Whether code at the regime's executing level may not fetch from here.
    pub fn is_execute_never(self, regime: TranslationRegime) -> bool {
        match regime {
            TranslationRegime::El1 => self.is_privileged_execute_never(),
            TranslationRegime::El2 => self.is_unprivileged_execute_never(),
        }
    }

    pub fn display(self, regime: TranslationRegime) -> AttrsDisplay {
        AttrsDisplay {
            attrs: self,
            regime,
        }
    }
}

/// Short form of a [`DescriptorAttrs`] as seen by one regime, e.g.
/// `DEV-RW-NS-XN`.
pub struct AttrsDisplay {
    attrs: DescriptorAttrs,
    regime: TranslationRegime,
}

impl fmt::Display for AttrsDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attrs = self.attrs;
        let kind = match attrs.mem_type_index() {
            i if i == MemoryType::Normal.mair_index() => "MEM",
            i if i == MemoryType::NormalWriteThrough.mair_index() => "WT",
            i if i == MemoryType::NormalNonCacheable.mair_index() => "NC",
            _ => "DEV",
        };

        write!(
            f,
            "{kind}-{}-{}-{}",
            if attrs.is_writable() { "RW" } else { "RO" },
            if attrs.is_non_secure() { "NS" } else { "S" },
            if attrs.is_execute_never(self.regime) { "XN" } else { "EXEC" },
        )
    }
}

impl fmt::Debug for DescriptorAttrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DescriptorAttrs({:#x})", self.0)
    }
}

/// A single 64-bit translation table entry.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Descriptor(u64);

impl Descriptor {
    pub const fn invalid() -> Self {
        Self(0)
    }

    pub const fn from_raw(v: u64) -> Self {
        Self(v)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// Builds a descriptor pointing at a next-level table.
    pub fn new_table(table: PA) -> Self {
        let reg = DescReg::new(0);
        reg.modify(
            DescriptorFields::TYPE::TableOrPage
                + DescriptorFields::OUTPUT_ADDR.val((table.value() >> PAGE_SHIFT) as u64),
        );
        Self(reg.get())
    }

    /// Builds a terminal descriptor: a page at the last level, a block above
    /// it.
    pub fn new_terminal(pa: PA, attrs: DescriptorAttrs, level: Level) -> Self {
        let reg = DescReg::new(attrs.as_raw());
        reg.modify(DescriptorFields::OUTPUT_ADDR.val((pa.value() >> PAGE_SHIFT) as u64));
        reg.modify(if level.is_last() {
            DescriptorFields::TYPE::TableOrPage
        } else {
            DescriptorFields::TYPE::Block
        });
        Self(reg.get())
    }

    pub fn encode_block(
        pa: PA,
        attrs: RegionAttributes,
        level: Level,
        regime: TranslationRegime,
    ) -> Self {
        Self::new_terminal(pa, DescriptorAttrs::new(attrs, regime), level)
    }

    /// Type code of the descriptor. `0b11` is a table above the last level
    /// and a page at it; `0b01` is reserved at the last level.
    pub fn kind(self, level: Level) -> DescriptorKind {
        match (self.0 & TYPE_MASK, level.is_last()) {
            (TYPE_BLOCK, false) => DescriptorKind::Block,
            (TYPE_TABLE_OR_PAGE, false) => DescriptorKind::Table,
            (TYPE_TABLE_OR_PAGE, true) => DescriptorKind::Page,
            _ => DescriptorKind::Invalid,
        }
    }

    pub fn is_valid(self) -> bool {
        self.0 & 1 != 0
    }

    pub fn output_address(self) -> PA {
        let reg = DescReg::new(self.0);
        PA::from_value((reg.read(DescriptorFields::OUTPUT_ADDR) as usize) << PAGE_SHIFT)
    }

    pub fn next_table_address(self, level: Level) -> Option<PA> {
        (self.kind(level) == DescriptorKind::Table).then(|| self.output_address())
    }

    pub fn mapped_address(self, level: Level) -> Option<PA> {
        self.kind(level)
            .is_terminal()
            .then(|| self.output_address())
    }

    pub const fn attrs(self) -> DescriptorAttrs {
        DescriptorAttrs::from_raw(self.0)
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Descriptor({:#018x})", self.0)
    }
}

/// Whether two terminal descriptors carry the same attributes, regardless of
/// where they point.
pub fn region_attrs_equal(a: Descriptor, b: Descriptor) -> bool {
    a.attrs() == b.attrs()
}
