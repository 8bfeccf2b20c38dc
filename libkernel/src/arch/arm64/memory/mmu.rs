//! Committing a [`TranslationTableSet`] to the hardware.
//!
//! Register values are derived here and handed to an [`MmuRegisters`]
//! implementation, which is the only code that touches system registers.

use log::info;
use tock_registers::interfaces::{ReadWriteable, Readable};
use tock_registers::{register_bitfields, registers::InMemoryRegister};

use super::{
    pg_tables::{TranslationRegime, TranslationTableSet, XlatConfig},
    pg_walk::{Translation, translate},
};
use crate::error::ActivationError;
use crate::memory::address::VA;
use crate::memory::attributes::MemoryType;

const fn mair_attr(mem_type: MemoryType, encoding: u64) -> u64 {
    encoding << (mem_type.mair_index() * 8)
}

/// MAIR encoding, one byte per [`MemoryType`]. Slots 6 and 7 are unused.
pub const MEMORY_ATTRIBUTES: u64 = mair_attr(MemoryType::DeviceNGnRnE, 0x00)
    | mair_attr(MemoryType::DeviceNGnRE, 0x04)
    | mair_attr(MemoryType::DeviceGRE, 0x0c)
    | mair_attr(MemoryType::NormalNonCacheable, 0x44)
    | mair_attr(MemoryType::Normal, 0xff)
    | mair_attr(MemoryType::NormalWriteThrough, 0xbb);

register_bitfields![u64,
    TCR [
        T0SZ  OFFSET(0)  NUMBITS(6) [],
        IRGN0 OFFSET(8)  NUMBITS(2) [
            NonCacheable = 0b00,
            WriteBackWriteAllocate = 0b01,
            WriteThrough = 0b10,
            WriteBackNoWriteAllocate = 0b11,
        ],
        ORGN0 OFFSET(10) NUMBITS(2) [
            NonCacheable = 0b00,
            WriteBackWriteAllocate = 0b01,
            WriteThrough = 0b10,
            WriteBackNoWriteAllocate = 0b11,
        ],
        SH0   OFFSET(12) NUMBITS(2) [
            NonShareable = 0b00,
            OuterShareable = 0b10,
            InnerShareable = 0b11,
        ],
        TG0   OFFSET(14) NUMBITS(2) [
            Granule4KiB = 0b00,
            Granule64KiB = 0b01,
            Granule16KiB = 0b10,
        ],
        // TCR_EL2 (non-VHE) only.
        PS    OFFSET(16) NUMBITS(3) [],
        // EPD1 in TCR_EL1, RES1 in TCR_EL2.
        EPD1  OFFSET(23) NUMBITS(1) [],
        // RES1 in TCR_EL2.
        RES1_31 OFFSET(31) NUMBITS(1) [],
        // TCR_EL1 only.
        IPS   OFFSET(32) NUMBITS(3) [],
    ]
];

pub const SCTLR_M: u64 = 1 << 0;
pub const SCTLR_C: u64 = 1 << 2;

/// Translation control value for `config`.
pub fn tcr_value(config: &XlatConfig) -> u64 {
    let tcr = InMemoryRegister::<u64, TCR::Register>::new(0);

    tcr.modify(
        TCR::T0SZ.val(64 - config.va_bits() as u64)
            + TCR::TG0::Granule4KiB
            + TCR::SH0::InnerShareable
            + TCR::ORGN0::WriteBackWriteAllocate
            + TCR::IRGN0::WriteBackWriteAllocate,
    );

    match config.regime() {
        TranslationRegime::El1 => {
            // Nothing is ever loaded into TTBR1_EL1; never walk through it.
            tcr.modify(TCR::IPS.val(config.pa_size().encoding()) + TCR::EPD1::SET);
        }
        TranslationRegime::El2 => {
            tcr.modify(
                TCR::PS.val(config.pa_size().encoding()) + TCR::EPD1::SET + TCR::RES1_31::SET,
            );
        }
    }

    tcr.get()
}

/// SCTLR with translation and data caching switched on.
pub const fn sctlr_enable(current: u64) -> u64 {
    current | SCTLR_M | SCTLR_C
}

/// Access to the system registers of one translation regime.
pub trait MmuRegisters {
    fn write_mair(&mut self, value: u64);
    fn write_tcr(&mut self, value: u64);
    fn write_ttbr0(&mut self, value: u64);
    fn read_sctlr(&mut self) -> u64;
    fn write_sctlr(&mut self, value: u64);

    /// Completes outstanding table stores before the walker can see them.
    fn dsb(&mut self);
    fn isb(&mut self);
}

/// A table set that has been committed to the hardware. It can no longer be
/// modified or activated again.
pub struct ActiveTables<'a> {
    tables: TranslationTableSet<'a>,
}

impl<'a> ActiveTables<'a> {
    pub fn tables(&self) -> &TranslationTableSet<'a> {
        &self.tables
    }

    pub fn translate(&self, va: VA) -> Option<Translation> {
        translate(&self.tables, va)
    }
}

impl<'a> TranslationTableSet<'a> {
    /// Programs MAIR, TCR and TTBR0 with this set and turns on the MMU and
    /// the data cache.
    pub fn enable<R>(self, regs: &mut R) -> Result<ActiveTables<'a>, ActivationError>
    where
        R: MmuRegisters + ?Sized,
    {
        let root = self.root_pa();

        if !root.is_page_aligned() {
            return Err(ActivationError::RootMisaligned(root));
        }

        if root.value() >= self.config().pa_limit() {
            return Err(ActivationError::RootOutsidePhysRange(root));
        }

        let sctlr = regs.read_sctlr();
        if sctlr & SCTLR_M != 0 {
            return Err(ActivationError::AlreadyEnabled);
        }

        regs.dsb();

        regs.write_mair(MEMORY_ATTRIBUTES);
        regs.write_tcr(tcr_value(self.config()));
        regs.write_ttbr0(root.value() as u64);

        // The three writes above must be in effect before translation is.
        regs.isb();

        let sctlr = regs.read_sctlr();
        regs.write_sctlr(sctlr_enable(sctlr));

        // The next instruction is fetched with translation on.
        regs.isb();

        info!(
            "MMU enabled with dcache: root {} ({} tables)",
            root,
            self.tables_used() + 1
        );

        Ok(ActiveTables { tables: self })
    }
}

#[cfg(feature = "arch-aarch64")]
mod hw {
    use aarch64_cpu::asm::barrier;
    use aarch64_cpu::registers::*;
    use tock_registers::interfaces::{Readable, Writeable};

    use super::MmuRegisters;

    /// The EL2 translation regime registers.
    pub struct El2Registers;

    impl MmuRegisters for El2Registers {
        fn write_mair(&mut self, value: u64) {
            MAIR_EL2.set(value);
        }

        fn write_tcr(&mut self, value: u64) {
            TCR_EL2.set(value);
        }

        fn write_ttbr0(&mut self, value: u64) {
            TTBR0_EL2.set(value);
        }

        fn read_sctlr(&mut self) -> u64 {
            SCTLR_EL2.get()
        }

        fn write_sctlr(&mut self, value: u64) {
            SCTLR_EL2.set(value);
        }

        fn dsb(&mut self) {
            barrier::dsb(barrier::ISHST);
        }

        fn isb(&mut self) {
            barrier::isb(barrier::SY);
        }
    }

    /// The EL1&0 translation regime registers.
    pub struct El1Registers;

    impl MmuRegisters for El1Registers {
        fn write_mair(&mut self, value: u64) {
            MAIR_EL1.set(value);
        }

        fn write_tcr(&mut self, value: u64) {
            TCR_EL1.set(value);
        }

        fn write_ttbr0(&mut self, value: u64) {
            TTBR0_EL1.set(value);
        }

        fn read_sctlr(&mut self) -> u64 {
            SCTLR_EL1.get()
        }

        fn write_sctlr(&mut self, value: u64) {
            SCTLR_EL1.set(value);
        }

        fn dsb(&mut self) {
            barrier::dsb(barrier::ISHST);
        }

        fn isb(&mut self) {
            barrier::isb(barrier::SY);
        }
    }
}

#[cfg(feature = "arch-aarch64")]
pub use hw::{El1Registers, El2Registers};

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::arch::arm64::memory::pg_tables::tests::storage;
    use crate::memory::address::PA;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum RegOp {
        Mair(u64),
        Tcr(u64),
        Ttbr0(u64),
        ReadSctlr,
        Sctlr(u64),
        Dsb,
        Isb,
    }

    #[derive(Default)]
    pub struct RecordingRegs {
        pub sctlr: u64,
        pub ops: Vec<RegOp>,
    }

    impl MmuRegisters for RecordingRegs {
        fn write_mair(&mut self, value: u64) {
            self.ops.push(RegOp::Mair(value));
        }

        fn write_tcr(&mut self, value: u64) {
            self.ops.push(RegOp::Tcr(value));
        }

        fn write_ttbr0(&mut self, value: u64) {
            self.ops.push(RegOp::Ttbr0(value));
        }

        fn read_sctlr(&mut self) -> u64 {
            self.ops.push(RegOp::ReadSctlr);
            self.sctlr
        }

        fn write_sctlr(&mut self, value: u64) {
            self.sctlr = value;
            self.ops.push(RegOp::Sctlr(value));
        }

        fn dsb(&mut self) {
            self.ops.push(RegOp::Dsb);
        }

        fn isb(&mut self) {
            self.ops.push(RegOp::Isb);
        }
    }

    #[test]
    fn mair_encoding() {
        assert_eq!(MEMORY_ATTRIBUTES, 0x0000_bbff_440c_0400);
    }

    #[test]
    fn tcr_for_el2() {
        let cfg = XlatConfig::new(48, 40, TranslationRegime::El2).unwrap();
        let expected: u64 = 16 | (0b01 << 8) | (0b01 << 10) | (0b11 << 12) | (0b010 << 16) | (1 << 23) | (1 << 31);
        assert_eq!(tcr_value(&cfg), expected);
    }

    #[test]
    fn tcr_for_el1() {
        let cfg = XlatConfig::new(39, 48, TranslationRegime::El1).unwrap();
        let expected: u64 = 25 | (0b01 << 8) | (0b01 << 10) | (0b11 << 12) | (1 << 23) | (0b101 << 32);
        assert_eq!(tcr_value(&cfg), expected);
    }

    #[test]
    fn enable_sequence() {
        let cfg = XlatConfig::new(39, 40, TranslationRegime::El2).unwrap();
        let mut backing = storage(2);
        let tables =
            TranslationTableSet::with_phys_base(cfg, &mut backing, PA::from_value(0x4100_0000)).unwrap();

        let mut regs = RecordingRegs {
            sctlr: 0x30c5_0830,
            ..Default::default()
        };

        let active = tables.enable(&mut regs).unwrap();

        assert_eq!(
            regs.ops,
            [
                RegOp::ReadSctlr,
                RegOp::Dsb,
                RegOp::Mair(MEMORY_ATTRIBUTES),
                RegOp::Tcr(tcr_value(&cfg)),
                RegOp::Ttbr0(0x4100_0000),
                RegOp::Isb,
                RegOp::ReadSctlr,
                RegOp::Sctlr(0x30c5_0830 | SCTLR_M | SCTLR_C),
                RegOp::Isb,
            ]
        );
        assert_eq!(active.tables().root_pa(), PA::from_value(0x4100_0000));
    }

    #[test]
    fn enable_refuses_running_mmu() {
        let cfg = XlatConfig::new(39, 40, TranslationRegime::El2).unwrap();
        let mut backing = storage(2);
        let tables =
            TranslationTableSet::with_phys_base(cfg, &mut backing, PA::from_value(0x4100_0000)).unwrap();
        let mut regs = RecordingRegs {
            sctlr: SCTLR_M,
            ..Default::default()
        };

        assert!(matches!(
            tables.enable(&mut regs),
            Err(ActivationError::AlreadyEnabled)
        ));
        assert_eq!(regs.ops, [RegOp::ReadSctlr]);
    }

    #[test]
    fn enable_checks_root_address() {
        let cfg = XlatConfig::new(39, 32, TranslationRegime::El2).unwrap();

        let mut backing = storage(2);
        let tables =
            TranslationTableSet::with_phys_base(cfg, &mut backing, PA::from_value(1 << 32)).unwrap();
        assert!(matches!(
            tables.enable(&mut RecordingRegs::default()),
            Err(ActivationError::RootOutsidePhysRange(_))
        ));

        let mut backing = storage(2);
        let tables =
            TranslationTableSet::with_phys_base(cfg, &mut backing, PA::from_value(0x4000_0800)).unwrap();
        let mut regs = RecordingRegs::default();
        assert!(matches!(
            tables.enable(&mut regs),
            Err(ActivationError::RootMisaligned(_))
        ));
        assert!(regs.ops.is_empty());
    }
}
