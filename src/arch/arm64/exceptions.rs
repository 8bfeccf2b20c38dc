use core::fmt;

use log::error;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use tock_registers::interfaces::Readable;
use tock_registers::{register_bitfields, registers::InMemoryRegister};

register_bitfields![u64,
    ESR [
        ISS OFFSET(0)  NUMBITS(25) [],
        IL  OFFSET(25) NUMBITS(1) [],
        EC  OFFSET(26) NUMBITS(6) [],
    ]
];

/// ESR.EC values the boot code knows how to name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum ExceptionClass {
    Unknown = 0x00,
    TrappedWfx = 0x01,
    TrappedMcrMrcCp15 = 0x03,
    TrappedMcrrMrrcCp15 = 0x04,
    TrappedMcrMrcCp14 = 0x05,
    TrappedLdcStc = 0x06,
    TrappedFpSimd = 0x07,
    TrappedMrrcCp14 = 0x0c,
    BranchTarget = 0x0d,
    IllegalExecutionState = 0x0e,
    SvcAarch32 = 0x11,
    TrappedMsrMrs = 0x18,
    TrappedSve = 0x19,
    InstrAbortLowerEl = 0x20,
    InstrAbortSameEl = 0x21,
    PcAlignment = 0x22,
    DataAbortLowerEl = 0x24,
    DataAbortSameEl = 0x25,
    SpAlignment = 0x26,
    TrappedFpAarch32 = 0x28,
    TrappedFpAarch64 = 0x2c,
    SError = 0x2f,
    BreakpointLowerEl = 0x30,
    BreakpointSameEl = 0x31,
    SoftwareStepLowerEl = 0x32,
    SoftwareStepSameEl = 0x33,
    WatchpointLowerEl = 0x34,
    WatchpointSameEl = 0x35,
    BkptAarch32 = 0x38,
    BrkAarch64 = 0x3c,
}

impl ExceptionClass {
    pub fn description(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown reason",
            Self::TrappedWfx => "Trapped WFI or WFE instruction execution",
            Self::TrappedMcrMrcCp15 => "Trapped MCR or MRC access with (coproc==0b1111)",
            Self::TrappedMcrrMrrcCp15 => "Trapped MCRR or MRRC access with (coproc==0b1111)",
            Self::TrappedMcrMrcCp14 => "Trapped MCR or MRC access with (coproc==0b1110)",
            Self::TrappedLdcStc => "Trapped LDC or STC access",
            Self::TrappedFpSimd => {
                "Trapped access to SVE, Advanced SIMD, or floating-point functionality"
            }
            Self::TrappedMrrcCp14 => "Trapped MRRC access with (coproc==0b1110)",
            Self::BranchTarget => "Branch Target Exception",
            Self::IllegalExecutionState => "Illegal Execution state",
            Self::SvcAarch32 => "SVC instruction execution in AArch32 state",
            Self::TrappedMsrMrs => {
                "Trapped MSR, MRS or System instruction execution in AArch64 state"
            }
            Self::TrappedSve => "Trapped access to SVE functionality",
            Self::InstrAbortLowerEl => "Instruction Abort from a lower Exception level",
            Self::InstrAbortSameEl => "Instruction Abort taken without a change in Exception level",
            Self::PcAlignment => "PC alignment fault exception",
            Self::DataAbortLowerEl => "Data Abort from a lower Exception level",
            Self::DataAbortSameEl => "Data Abort taken without a change in Exception level",
            Self::SpAlignment => "SP alignment fault exception",
            Self::TrappedFpAarch32 => "Trapped floating-point exception taken from AArch32 state",
            Self::TrappedFpAarch64 => "Trapped floating-point exception taken from AArch64 state",
            Self::SError => "SError interrupt",
            Self::BreakpointLowerEl => "Breakpoint exception from a lower Exception level",
            Self::BreakpointSameEl => {
                "Breakpoint exception taken without a change in Exception level"
            }
            Self::SoftwareStepLowerEl => "Software Step exception from a lower Exception level",
            Self::SoftwareStepSameEl => {
                "Software Step exception taken without a change in Exception level"
            }
            Self::WatchpointLowerEl => "Watchpoint exception from a lower Exception level",
            Self::WatchpointSameEl => {
                "Watchpoint exception taken without a change in Exception level"
            }
            Self::BkptAarch32 => "BKPT instruction execution in AArch32 state",
            Self::BrkAarch64 => "BRK instruction execution in AArch64 state",
        }
    }
}

/// A decoded exception syndrome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExceptionReport {
    pub esr: u64,
    pub elr: u64,
    pub ec: u8,
    pub il: bool,
    pub iss: u32,
    /// `None` for classes with no name.
    pub class: Option<ExceptionClass>,
}

impl ExceptionReport {
    pub fn decode(esr: u64, elr: u64) -> Self {
        let reg = InMemoryRegister::<u64, ESR::Register>::new(esr);
        let ec = reg.read(ESR::EC) as u8;

        Self {
            esr,
            elr,
            ec,
            il: reg.is_set(ESR::IL),
            iss: reg.read(ESR::ISS) as u32,
            class: ExceptionClass::from_u8(ec),
        }
    }

    pub fn description(&self) -> &'static str {
        self.class.map_or("Unknown", ExceptionClass::description)
    }
}

impl fmt::Display for ExceptionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ESR: 0x{:016x} EC: 0x{:x} IL: {} ISS: 0x{:x} ELR: 0x{:x}: {}",
            self.esr,
            self.ec,
            self.il as u8,
            self.iss,
            self.elr,
            self.description()
        )
    }
}

/// Decodes and logs an unexpected synchronous exception.
pub fn report_exception(esr: u64, elr: u64) -> ExceptionReport {
    let report = ExceptionReport::decode(esr, elr);
    error!("Unhandled exception: {}", report);
    report
}

/// Entry from the EL2 vector table. Nothing taken at this stage is
/// recoverable.
#[cfg(all(feature = "arch-aarch64", target_arch = "aarch64", target_os = "none"))]
#[unsafe(no_mangle)]
pub extern "C" fn exception_handle() -> ! {
    use aarch64_cpu::registers::{ELR_EL2, ESR_EL2};

    report_exception(ESR_EL2.get(), ELR_EL2.get());
    super::park_cpu()
}
