use core::hint::spin_loop;

use libkernel::memory::address::VA;
use tock_registers::{
    interfaces::{Readable, Writeable},
    register_bitfields, register_structs,
    registers::{ReadOnly, ReadWrite, WriteOnly},
};

use super::ConsoleSink;

register_bitfields![
    u32,
    /// Flag Register
    FR [
        BUSY OFFSET(3) NUMBITS(1) [],
        RXFE OFFSET(4) NUMBITS(1) [],
        TXFF OFFSET(5) NUMBITS(1) [],
    ],
    /// Integer Baud Rate Divisor
    IBRD [
        DIVINT OFFSET(0) NUMBITS(16) []
    ],
    /// Fractional Baud Rate Divisor
    FBRD [
        DIVFRAC OFFSET(0) NUMBITS(6) []
    ],
    /// Line Control Register
    LCR_H [
        FEN OFFSET(4) NUMBITS(1) [],
        WLEN OFFSET(5) NUMBITS(2) [
            FiveBit = 0b00,
            SixBit = 0b01,
            SevenBit = 0b10,
            EightBit = 0b11,
        ],
    ],
    /// Control Register
    CR [
        UARTEN OFFSET(0) NUMBITS(1) [],
        TXE OFFSET(8) NUMBITS(1) [],
        RXE OFFSET(9) NUMBITS(1) [],
    ],
    /// Interrupt Clear Register
    ICR [
        ALL OFFSET(0) NUMBITS(11) []
    ],
];

register_structs! {
    #[allow(non_snake_case)]
    pub Pl011Regs {
        (0x00 => pub dr: ReadWrite<u32>),
        (0x04 => _reserved0),
        (0x18 => pub fr: ReadOnly<u32, FR::Register>),
        (0x1c => _reserved1),
        (0x24 => pub ibrd: ReadWrite<u32, IBRD::Register>),
        (0x28 => pub fbrd: ReadWrite<u32, FBRD::Register>),
        (0x2c => pub lcr_h: ReadWrite<u32, LCR_H::Register>),
        (0x30 => pub cr: ReadWrite<u32, CR::Register>),
        (0x34 => pub ifls: ReadWrite<u32>),
        (0x38 => pub imsc: ReadWrite<u32>),
        (0x3c => pub ris: ReadOnly<u32>),
        (0x40 => pub mis: ReadOnly<u32>),
        (0x44 => pub icr: WriteOnly<u32, ICR::Register>),
        (0x48 => @END),
    }
}

/// Reference clock of the QEMU `virt` PL011.
pub const PL011_CLOCK_HZ: u32 = 24_000_000;

pub const DEFAULT_BAUD: u32 = 115_200;

/// Integer and fractional divisor for `baud`, in 1/64ths.
pub const fn baud_divisors(clock_hz: u32, baud: u32) -> (u32, u32) {
    let div = (clock_hz as u64 * 4 / baud as u64) as u32;
    (div >> 6, div & 0x3f)
}

pub struct Pl011 {
    regs: &'static Pl011Regs,
}

// The early console is only ever driven from the boot core.
unsafe impl Send for Pl011 {}
unsafe impl Sync for Pl011 {}

impl Pl011 {
    /// # Safety
    /// `base` must address the PL011 register block, mapped as device memory
    /// (or identity mapped with the MMU off).
    pub unsafe fn new(base: VA) -> Self {
        let regs = unsafe { &*(base.value() as *const Pl011Regs) };
        Self::from_regs(regs)
    }

    pub fn from_regs(regs: &'static Pl011Regs) -> Self {
        Self { regs }
    }

    /// Programs 8N1 with FIFOs at `baud` and enables TX and RX.
    pub fn init(&self, clock_hz: u32, baud: u32) {
        self.regs.cr.set(0);

        while self.regs.fr.is_set(FR::BUSY) {
            spin_loop();
        }

        let (int, frac) = baud_divisors(clock_hz, baud);
        self.regs.ibrd.write(IBRD::DIVINT.val(int));
        self.regs.fbrd.write(FBRD::DIVFRAC.val(frac));
        self.regs.lcr_h.write(LCR_H::WLEN::EightBit + LCR_H::FEN::SET);

        self.regs.imsc.set(0);
        self.regs.icr.write(ICR::ALL::SET);

        self.regs.cr.write(CR::UARTEN::SET + CR::TXE::SET + CR::RXE::SET);
    }

    fn putc(&self, c: u8) {
        while self.regs.fr.is_set(FR::TXFF) {
            spin_loop();
        }
        self.regs.dr.set(c as u32);
    }
}

impl ConsoleSink for Pl011 {
    fn write_bytes(&self, bytes: &[u8]) {
        for &b in bytes {
            if b == b'\n' {
                self.putc(b'\r');
            }
            self.putc(b);
        }
    }
}
