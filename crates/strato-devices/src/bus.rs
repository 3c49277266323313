/// Register-level contract implemented by every emulated peripheral.
///
/// `size` is the access width in bytes (1 or 2). Devices must tolerate any
/// guest-supplied port/value combination: unmapped register addresses are
/// no-ops on write and read as zero, matching bus behavior where unmapped
/// reads float to an implementation-defined value (chosen here as zero).
pub trait PortIoDevice {
    fn read(&mut self, port: u16, size: u8) -> u32;
    fn write(&mut self, port: u16, size: u8, value: u32);

    /// Reset the device back to its power-on state.
    fn reset(&mut self) {}
}

struct RangeDevice {
    start: u16,
    len: u16,
    dev: Box<dyn PortIoDevice>,
}

impl RangeDevice {
    fn end_exclusive(&self) -> u32 {
        u32::from(self.start) + u32::from(self.len)
    }

    fn contains(&self, port: u16) -> bool {
        let p = u32::from(port);
        p >= u32::from(self.start) && p < self.end_exclusive()
    }
}

/// Port-range to device registry.
///
/// Ranges are kept sorted and non-overlapping so dispatch in the hot exit
/// loop is a binary search with no allocation. The table is built before the
/// run loop starts; nothing is registered afterwards.
///
/// Lookup failure is surfaced to the caller ([`IoPortBus::read`] returns
/// `None`, [`IoPortBus::write`] returns `false`) rather than absorbed here:
/// the dispatcher decides how to report a guest probing undiscovered
/// hardware.
pub struct IoPortBus {
    ranges: Vec<RangeDevice>,
}

impl IoPortBus {
    pub fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    /// Registers a device over a contiguous I/O port range.
    ///
    /// Panics on a zero-length range, a range wrapping past `0xFFFF`, or one
    /// overlapping an existing registration. These are wiring bugs in the
    /// embedder, not guest-triggerable conditions.
    pub fn register(&mut self, start: u16, len: u16, dev: Box<dyn PortIoDevice>) {
        assert!(len != 0, "I/O port range length must be non-zero");

        let end_exclusive = u32::from(start) + u32::from(len);
        assert!(
            end_exclusive <= 0x1_0000,
            "I/O port range wraps past 0xFFFF: start={start:#x} len={len:#x}"
        );

        let idx = self
            .ranges
            .partition_point(|r| u32::from(r.start) < u32::from(start));

        if let Some(prev) = self.ranges.get(idx.wrapping_sub(1)) {
            assert!(
                u32::from(start) >= prev.end_exclusive(),
                "overlapping I/O port ranges: new=[{start:#x}..{end_exclusive:#x}) prev=[{:#x}..{:#x})",
                prev.start,
                prev.end_exclusive()
            );
        }
        if let Some(next) = self.ranges.get(idx) {
            assert!(
                end_exclusive <= u32::from(next.start),
                "overlapping I/O port ranges: new=[{start:#x}..{end_exclusive:#x}) next=[{:#x}..{:#x})",
                next.start,
                next.end_exclusive()
            );
        }

        self.ranges.insert(idx, RangeDevice { start, len, dev });
    }

    fn find(&mut self, port: u16) -> Option<&mut RangeDevice> {
        let idx = self.ranges.partition_point(|r| r.start <= port);
        if idx == 0 {
            return None;
        }
        let cand = &mut self.ranges[idx - 1];
        cand.contains(port).then_some(cand)
    }

    /// Dispatches a guest port read. `None` means no device claims the port
    /// (or the access width is not one the modeled bus supports).
    pub fn read(&mut self, port: u16, size: u8) -> Option<u32> {
        if !matches!(size, 1 | 2) {
            return None;
        }
        let dev = self.find(port)?;
        Some(dev.dev.read(port, size))
    }

    /// Dispatches a guest port write, returning whether a device claimed it.
    pub fn write(&mut self, port: u16, size: u8, value: u32) -> bool {
        if !matches!(size, 1 | 2) {
            return false;
        }
        match self.find(port) {
            Some(dev) => {
                dev.dev.write(port, size, value);
                true
            }
            None => false,
        }
    }

    pub fn reset(&mut self) {
        for dev in self.ranges.iter_mut() {
            dev.dev.reset();
        }
    }
}

impl Default for IoPortBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Debug)]
    struct EchoRange {
        base: u16,
        last_write: u32,
    }

    impl PortIoDevice for EchoRange {
        fn read(&mut self, port: u16, _size: u8) -> u32 {
            0xAA00 | u32::from(port.wrapping_sub(self.base))
        }

        fn write(&mut self, _port: u16, _size: u8, value: u32) {
            self.last_write = value;
        }
    }

    #[test]
    fn dispatch_routes_by_range() {
        let mut bus = IoPortBus::new();
        bus.register(
            0x1F0,
            8,
            Box::new(EchoRange {
                base: 0x1F0,
                last_write: 0,
            }),
        );
        bus.register(
            0x3D4,
            2,
            Box::new(EchoRange {
                base: 0x3D4,
                last_write: 0,
            }),
        );

        assert_eq!(bus.read(0x1F0, 1), Some(0xAA00));
        assert_eq!(bus.read(0x1F7, 1), Some(0xAA07));
        assert_eq!(bus.read(0x3D5, 1), Some(0xAA01));
        assert!(bus.write(0x3D4, 1, 0x0E));
    }

    #[test]
    fn unmatched_port_is_reported_to_the_caller() {
        let mut bus = IoPortBus::new();
        bus.register(
            0x1F0,
            8,
            Box::new(EchoRange {
                base: 0x1F0,
                last_write: 0,
            }),
        );

        assert_eq!(bus.read(0x1F8, 1), None);
        assert_eq!(bus.read(0x60, 1), None);
        assert!(!bus.write(0x2F8, 1, 0x41));
    }

    #[test]
    fn unsupported_access_widths_are_not_dispatched() {
        #[derive(Debug)]
        struct Spy {
            hits: Rc<Cell<u32>>,
        }

        impl PortIoDevice for Spy {
            fn read(&mut self, _port: u16, _size: u8) -> u32 {
                self.hits.set(self.hits.get() + 1);
                0
            }

            fn write(&mut self, _port: u16, _size: u8, _value: u32) {
                self.hits.set(self.hits.get() + 1);
            }
        }

        let hits = Rc::new(Cell::new(0));
        let mut bus = IoPortBus::new();
        bus.register(0x1F0, 1, Box::new(Spy { hits: hits.clone() }));

        assert_eq!(bus.read(0x1F0, 0), None);
        assert_eq!(bus.read(0x1F0, 4), None);
        assert!(!bus.write(0x1F0, 3, 0));
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn register_panics_on_overlap_and_wrap() {
        #[derive(Debug)]
        struct Noop;

        impl PortIoDevice for Noop {
            fn read(&mut self, _port: u16, _size: u8) -> u32 {
                0
            }

            fn write(&mut self, _port: u16, _size: u8, _value: u32) {}
        }

        let overlap = std::panic::catch_unwind(|| {
            let mut bus = IoPortBus::new();
            bus.register(0x1000, 4, Box::new(Noop));
            bus.register(0x1002, 4, Box::new(Noop));
        });
        assert!(overlap.is_err());

        let wrap = std::panic::catch_unwind(|| {
            let mut bus = IoPortBus::new();
            bus.register(0xFFFE, 4, Box::new(Noop));
        });
        assert!(wrap.is_err());

        // Adjacent ranges are fine.
        let adjacent = std::panic::catch_unwind(|| {
            let mut bus = IoPortBus::new();
            bus.register(0x2000, 4, Box::new(Noop));
            bus.register(0x2004, 4, Box::new(Noop));
        });
        assert!(adjacent.is_ok());
    }
}
