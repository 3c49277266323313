//! VM-exit dispatch for a single-vCPU trap-and-emulate hypervisor.
//!
//! The hypervisor-API layer (KVM or a test double) is kept behind the
//! [`Vcpu`] trait: it resumes the guest, blocks until a trap, and hands back
//! a [`VmExit`] record describing the trap. [`dispatch::ExitDispatcher`]
//! owns the port-device registry and drives the resume/trap/route loop until
//! a terminal exit.
//!
//! Guest-physical memory is modeled as an owned byte arena
//! ([`memory::GuestMemory`]) with bounds-checked views; no device or
//! dispatcher code does raw pointer arithmetic into trap structures.

pub mod dispatch;
pub mod exit;
pub mod memory;

pub use dispatch::{DebugPort, DispatchStats, ExitDispatcher, VmError};
pub use exit::{GuestRegisters, IoDirection, Vcpu, VcpuError, VmExit};
pub use memory::{GuestMemory, GuestMemoryError};
