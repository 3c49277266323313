//! The VM run loop: resume, inspect the exit reason, route the trap.

use strato_devices::{IoPortBus, PortIoDevice};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::exit::{GuestRegisters, IoDirection, Vcpu, VcpuError, VmExit};

/// Terminal failures of the run loop.
///
/// Guest protocol misuse (unmapped ports, malformed trap records, stray MMIO)
/// never appears here: a VMM must not crash because of guest behavior. These
/// variants cover VM faults and hypervisor-API failures, for which a single
/// vCPU has no meaningful redo path.
#[derive(Debug, Error)]
pub enum VmError {
    #[error(transparent)]
    Vcpu(#[from] VcpuError),
    #[error("guest triple fault, shutting down")]
    Shutdown,
    #[error("vm entry failed: hardware reason {hardware_reason}")]
    FailEntry { hardware_reason: u64 },
    #[error("hypervisor internal error: suberror {suberror}")]
    InternalError { suberror: u32 },
    #[error("unrecognized vm exit reason {reason}")]
    UnrecognizedExit { reason: u32 },
}

/// Counters for soft failures absorbed by the loop. Exposed so embedders and
/// tests can observe guest misbehavior that is deliberately non-fatal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// I/O traps no registered device claimed (or with malformed records).
    pub unhandled_io: u64,
    /// MMIO traps; no MMIO device model is currently registered.
    pub unhandled_mmio: u64,
    /// Diagnostic register dumps emitted.
    pub diagnostic_dumps: u64,
}

enum Step {
    Continue,
    DumpAndContinue,
    Halt,
    Fatal(VmError),
}

/// Routes each VM exit to the matching device until a terminal exit.
///
/// The device registry is taken at construction and never changes while the
/// loop runs.
pub struct ExitDispatcher {
    bus: IoPortBus,
    stats: DispatchStats,
}

impl ExitDispatcher {
    pub fn new(bus: IoPortBus) -> Self {
        Self {
            bus,
            stats: DispatchStats::default(),
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Drives the guest until it halts (returning the guest's result
    /// register) or a terminal exit occurs.
    pub fn run<V: Vcpu>(&mut self, vcpu: &mut V) -> Result<u64, VmError> {
        loop {
            let step = match vcpu.run()? {
                VmExit::Hlt => Step::Halt,
                VmExit::Io {
                    port,
                    size,
                    count,
                    direction,
                    data,
                } => {
                    self.handle_io(port, size, count, direction, data);
                    Step::Continue
                }
                VmExit::Mmio {
                    phys_addr,
                    data,
                    is_write,
                } => {
                    self.stats.unhandled_mmio += 1;
                    warn!(
                        phys_addr = format_args!("{phys_addr:#x}"),
                        len = data.len(),
                        is_write,
                        data = ?&data[..data.len().min(8)],
                        "unhandled MMIO trap"
                    );
                    Step::DumpAndContinue
                }
                VmExit::Shutdown => Step::Fatal(VmError::Shutdown),
                VmExit::FailEntry { hardware_reason } => {
                    Step::Fatal(VmError::FailEntry { hardware_reason })
                }
                VmExit::InternalError { suberror } => {
                    Step::Fatal(VmError::InternalError { suberror })
                }
                VmExit::Unknown { reason } => Step::Fatal(VmError::UnrecognizedExit { reason }),
            };

            match step {
                Step::Continue => {}
                Step::DumpAndContinue => self.dump_guest_state(vcpu),
                Step::Halt => {
                    let regs = vcpu.registers()?;
                    info!(result = regs.rax, "guest halted");
                    return Ok(regs.rax);
                }
                Step::Fatal(err) => {
                    error!(%err, "terminal vm exit");
                    self.dump_guest_state(vcpu);
                    return Err(err);
                }
            }
        }
    }

    fn handle_io(&mut self, port: u16, size: u8, count: u32, direction: IoDirection, data: &mut [u8]) {
        let chunk = usize::from(size);
        let expected = chunk * count as usize;
        if chunk == 0 || data.len() < expected {
            self.stats.unhandled_io += 1;
            warn!(port = format_args!("{port:#x}"), size, count, data_len = data.len(),
                  "malformed I/O trap record");
            return;
        }

        for view in data[..expected].chunks_exact_mut(chunk) {
            let handled = match direction {
                IoDirection::Out => {
                    let value = match *view {
                        [b0] => u32::from(b0),
                        [b0, b1] => u32::from(u16::from_le_bytes([b0, b1])),
                        [b0, b1, b2, b3] => u32::from_le_bytes([b0, b1, b2, b3]),
                        _ => break,
                    };
                    self.bus.write(port, size, value)
                }
                IoDirection::In => match self.bus.read(port, size) {
                    Some(value) => {
                        view.copy_from_slice(&value.to_le_bytes()[..chunk]);
                        true
                    }
                    None => false,
                },
            };

            if !handled {
                // One event per trap, not per repetition: guests probing
                // undiscovered hardware must not flood the log.
                self.stats.unhandled_io += 1;
                warn!(
                    port = format_args!("{port:#x}"),
                    size,
                    count,
                    direction = ?direction,
                    "unhandled guest I/O"
                );
                return;
            }
        }
    }

    fn dump_guest_state<V: Vcpu>(&mut self, vcpu: &mut V) {
        self.stats.diagnostic_dumps += 1;
        match vcpu.registers() {
            Ok(GuestRegisters {
                rip,
                rsp,
                cr0,
                cr2,
                cr3,
                ..
            }) => error!(
                rip = format_args!("{rip:#x}"),
                rsp = format_args!("{rsp:#x}"),
                cr0 = format_args!("{cr0:#x}"),
                cr2 = format_args!("{cr2:#x}"),
                cr3 = format_args!("{cr3:#x}"),
                "guest register dump"
            ),
            Err(err) => error!(%err, "guest register dump unavailable"),
        }
    }
}

/// Byte sink the guest can poke for printf-style debugging; every value
/// written to its port is logged verbatim.
pub struct DebugPort;

impl PortIoDevice for DebugPort {
    fn read(&mut self, _port: u16, _size: u8) -> u32 {
        0
    }

    fn write(&mut self, port: u16, _size: u8, value: u32) {
        info!(
            port = format_args!("{port:#x}"),
            value = format_args!("{value:#x}"),
            "guest debug port"
        );
    }
}
