//! Emulated port-mapped I/O peripherals.
//!
//! Every peripheral implements [`PortIoDevice`]; the VM-exit dispatcher owns
//! an [`IoPortBus`] mapping port ranges to device instances, built once at
//! startup and immutable while the guest runs.
//!
//! Device models here are driven exclusively from the VM-loop thread, with
//! one exception: [`display::DisplayController`] is also read by a
//! presentation thread and synchronizes internally.

pub mod bus;
pub mod disk;
pub mod display;
pub mod pci;

pub use bus::{IoPortBus, PortIoDevice};
