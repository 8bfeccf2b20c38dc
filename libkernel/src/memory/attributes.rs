use bitflags::bitflags;

/// Memory types, numbered by their slot in the MAIR encoding.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryType {
    DeviceNGnRnE = 0,
    DeviceNGnRE = 1,
    DeviceGRE = 2,
    NormalNonCacheable = 3,
    Normal = 4,
    NormalWriteThrough = 5,
}

impl MemoryType {
    pub const fn mair_index(self) -> u64 {
        self as u64
    }

    pub const fn is_device(self) -> bool {
        matches!(
            self,
            Self::DeviceNGnRnE | Self::DeviceNGnRE | Self::DeviceGRE
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessPermission {
    ReadOnly,
    ReadWrite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SecurityState {
    Secure,
    NonSecure,
}

bitflags! {
    /// Privilege levels allowed to execute from a region.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Execute: u8 {
        const PRIVILEGED = 1 << 0;
        const UNPRIVILEGED = 1 << 1;
    }
}

/// The attribute bundle attached to a mapping request.
///
/// Converted to descriptor bits only by the descriptor codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegionAttributes {
    pub mem_type: MemoryType,
    pub access: AccessPermission,
    pub security: SecurityState,
    pub execute: Execute,
    /// Mirror the access permission to EL0 (AP[1]).
    pub el0_access: bool,
}

impl RegionAttributes {
    pub const fn new(mem_type: MemoryType, access: AccessPermission) -> Self {
        Self {
            mem_type,
            access,
            security: SecurityState::Secure,
            execute: Execute::empty(),
            el0_access: false,
        }
    }

    /// Normal cacheable read-write data, not executable.
    pub const fn normal_rw() -> Self {
        Self::new(MemoryType::Normal, AccessPermission::ReadWrite)
    }

    /// Normal cacheable read-only code executable at the privileged level.
    pub const fn normal_rx() -> Self {
        Self::new(MemoryType::Normal, AccessPermission::ReadOnly)
            .with_execute(Execute::PRIVILEGED)
    }

    /// Strongly-ordered device registers.
    pub const fn device_rw() -> Self {
        Self::new(MemoryType::DeviceNGnRnE, AccessPermission::ReadWrite)
    }

    pub const fn non_secure(mut self) -> Self {
        self.security = SecurityState::NonSecure;
        self
    }

    pub const fn with_execute(mut self, execute: Execute) -> Self {
        self.execute = execute;
        self
    }

    pub const fn with_el0_access(mut self) -> Self {
        self.el0_access = true;
        self
    }

    pub const fn is_writable(&self) -> bool {
        matches!(self.access, AccessPermission::ReadWrite)
    }
}

impl Default for RegionAttributes {
    fn default() -> Self {
        Self::normal_rw()
    }
}
