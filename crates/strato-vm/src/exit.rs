//! Trap records and the vCPU run contract.

use thiserror::Error;

/// Direction of a port I/O trap, from the guest's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoDirection {
    /// Guest `in`: the device supplies data to the guest.
    In,
    /// Guest `out`: the guest supplies data to the device.
    Out,
}

/// A decoded VM exit.
///
/// For I/O and MMIO traps the `data` view aliases the run structure shared
/// with the hypervisor API; whatever the dispatcher writes there is visible
/// to the guest on the next resume. The view's length is `size * count` for
/// port I/O.
#[derive(Debug)]
pub enum VmExit<'run> {
    /// The guest executed a halt; its result is in the result register.
    Hlt,
    Io {
        port: u16,
        size: u8,
        count: u32,
        direction: IoDirection,
        data: &'run mut [u8],
    },
    Mmio {
        phys_addr: u64,
        data: &'run mut [u8],
        is_write: bool,
    },
    /// Triple fault.
    Shutdown,
    FailEntry {
        hardware_reason: u64,
    },
    InternalError {
        suberror: u32,
    },
    /// Exit reason this dispatcher does not recognize.
    Unknown {
        reason: u32,
    },
}

/// General-purpose and control registers fetched for diagnostics and for the
/// guest's halt result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuestRegisters {
    pub rax: u64,
    pub rip: u64,
    pub rsp: u64,
    pub cr0: u64,
    pub cr2: u64,
    pub cr3: u64,
}

/// Failures of the hypervisor-API primitives themselves. Always fatal: with
/// a single vCPU and no migration there is no redo path.
#[derive(Debug, Error)]
pub enum VcpuError {
    #[error("vcpu run failed: {0}")]
    Run(#[source] std::io::Error),
    #[error("register fetch failed: {0}")]
    GetRegisters(#[source] std::io::Error),
}

/// Blocking run primitive provided by the hypervisor-API layer.
pub trait Vcpu {
    /// Resumes the guest and blocks until the next trap.
    fn run(&mut self) -> Result<VmExit<'_>, VcpuError>;

    /// Fetches the guest's current register state.
    fn registers(&mut self) -> Result<GuestRegisters, VcpuError>;
}
