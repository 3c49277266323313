//! End-to-end exercise of the run loop against a full device registry: a
//! guest writes two disk blocks over the PIO word handshake, reads them
//! back, repositions the text cursor, and halts.

use std::sync::{Arc, Mutex};

use strato_devices::disk::{AtaDisk, CMD_BASE, CMD_READ_SECTORS, CMD_WRITE_SECTORS};
use strato_devices::display::{DisplayController, CRTC_DATA_PORT, CRTC_INDEX_PORT};
use strato_devices::IoPortBus;
use strato_storage::{BlockStore, MemStore, BLOCK_SIZE};
use strato_vm::{
    DebugPort, ExitDispatcher, GuestRegisters, IoDirection, Vcpu, VcpuError, VmExit,
};

/// Handle to a [`MemStore`] that stays inspectable after the disk controller
/// takes ownership of its `Box<dyn BlockStore>`.
#[derive(Clone)]
struct SharedStore(Arc<Mutex<MemStore>>);

impl BlockStore for SharedStore {
    fn block_count(&self) -> u64 {
        self.0.lock().unwrap().block_count()
    }

    fn read_block(&mut self, block: u64, buf: &mut [u8; BLOCK_SIZE]) -> strato_storage::Result<()> {
        self.0.lock().unwrap().read_block(block, buf)
    }

    fn write_block(&mut self, block: u64, buf: &[u8; BLOCK_SIZE]) -> strato_storage::Result<()> {
        self.0.lock().unwrap().write_block(block, buf)
    }
}

enum Script {
    Hlt,
    Io {
        port: u16,
        size: u8,
        count: u32,
        direction: IoDirection,
        data: Vec<u8>,
    },
}

struct ScriptedVcpu {
    script: Vec<Script>,
    pos: usize,
    regs: GuestRegisters,
}

impl ScriptedVcpu {
    fn new(script: Vec<Script>) -> Self {
        Self {
            script,
            pos: 0,
            regs: GuestRegisters::default(),
        }
    }

    fn io_data(&self, index: usize) -> &[u8] {
        match &self.script[index] {
            Script::Io { data, .. } => data,
            Script::Hlt => panic!("script entry {index} is not an I/O trap"),
        }
    }
}

impl Vcpu for ScriptedVcpu {
    fn run(&mut self) -> Result<VmExit<'_>, VcpuError> {
        let idx = self.pos;
        self.pos += 1;
        match self.script.get_mut(idx) {
            None => Err(VcpuError::Run(std::io::Error::other("script exhausted"))),
            Some(Script::Hlt) => Ok(VmExit::Hlt),
            Some(Script::Io {
                port,
                size,
                count,
                direction,
                data,
            }) => Ok(VmExit::Io {
                port: *port,
                size: *size,
                count: *count,
                direction: *direction,
                data,
            }),
        }
    }

    fn registers(&mut self) -> Result<GuestRegisters, VcpuError> {
        Ok(self.regs)
    }
}

fn out_byte(port: u16, value: u8) -> Script {
    Script::Io {
        port,
        size: 1,
        count: 1,
        direction: IoDirection::Out,
        data: vec![value],
    }
}

/// Programs the addressing registers for `lba` (28-bit) and `sectors`.
fn program_transfer(script: &mut Vec<Script>, lba: u32, sectors: u8, command: u8) {
    script.push(out_byte(CMD_BASE + 2, sectors));
    script.push(out_byte(CMD_BASE + 3, lba as u8));
    script.push(out_byte(CMD_BASE + 4, (lba >> 8) as u8));
    script.push(out_byte(CMD_BASE + 5, (lba >> 16) as u8));
    script.push(out_byte(CMD_BASE + 6, (lba >> 24) as u8));
    script.push(out_byte(CMD_BASE + 7, command));
}

fn sector_pattern(sector: usize) -> Vec<u8> {
    (0..BLOCK_SIZE)
        .map(|i| (sector * 7 + i * 3) as u8)
        .collect()
}

#[test]
fn guest_writes_and_reads_back_disk_blocks() {
    let store = SharedStore(Arc::new(Mutex::new(MemStore::new(64))));
    let display = Arc::new(DisplayController::new());

    let mut bus = IoPortBus::new();
    bus.register(CMD_BASE, 8, Box::new(AtaDisk::new(Box::new(store.clone()))));
    bus.register(CRTC_INDEX_PORT, 2, Box::new(display.clone()));
    bus.register(0x2F8, 1, Box::new(DebugPort));

    let base_lba = 5;
    let mut script = Vec::new();

    // Write blocks 5 and 6 with one REP OUTSW trap per block.
    program_transfer(&mut script, base_lba, 2, CMD_WRITE_SECTORS);
    for sector in 0..2 {
        script.push(Script::Io {
            port: CMD_BASE,
            size: 2,
            count: (BLOCK_SIZE / 2) as u32,
            direction: IoDirection::Out,
            data: sector_pattern(sector),
        });
    }

    // Read them back.
    program_transfer(&mut script, base_lba, 2, CMD_READ_SECTORS);
    let read_trap_base = script.len();
    for _ in 0..2 {
        script.push(Script::Io {
            port: CMD_BASE,
            size: 2,
            count: (BLOCK_SIZE / 2) as u32,
            direction: IoDirection::In,
            data: vec![0; BLOCK_SIZE],
        });
    }

    // Move the text cursor to 0x0123 via the CRTC index/data pair.
    script.push(out_byte(CRTC_INDEX_PORT, 0x0E));
    script.push(out_byte(CRTC_DATA_PORT, 0x01));
    script.push(out_byte(CRTC_INDEX_PORT, 0x0F));
    script.push(out_byte(CRTC_DATA_PORT, 0x23));

    // A debug byte, then halt with a result code.
    script.push(out_byte(0x2F8, 0x55));
    script.push(Script::Hlt);

    let mut vcpu = ScriptedVcpu::new(script);
    vcpu.regs.rax = 0xC0DE;

    let mut dispatcher = ExitDispatcher::new(bus);
    assert_eq!(dispatcher.run(&mut vcpu).unwrap(), 0xC0DE);
    assert_eq!(dispatcher.stats().unhandled_io, 0);

    // The store holds both blocks at the programmed LBAs.
    let inner = store.0.lock().unwrap();
    for sector in 0..2 {
        assert_eq!(
            inner.block(base_lba as u64 + sector as u64),
            &sector_pattern(sector)[..]
        );
    }
    drop(inner);

    // The read traps were filled with the same bytes.
    for sector in 0..2 {
        assert_eq!(
            vcpu.io_data(read_trap_base + sector),
            &sector_pattern(sector)[..]
        );
    }

    assert_eq!(display.cursor_position(), 0x0123);
}

#[test]
fn probe_of_an_unpopulated_port_is_survivable() {
    let mut bus = IoPortBus::new();
    bus.register(
        CMD_BASE,
        8,
        Box::new(AtaDisk::new(Box::new(SharedStore(Arc::new(Mutex::new(
            MemStore::new(8),
        )))))),
    );

    let mut vcpu = ScriptedVcpu::new(vec![
        Script::Io {
            port: 0x64,
            size: 1,
            count: 1,
            direction: IoDirection::In,
            data: vec![0xFF],
        },
        Script::Hlt,
    ]);

    let mut dispatcher = ExitDispatcher::new(bus);
    assert!(dispatcher.run(&mut vcpu).is_ok());
    assert_eq!(dispatcher.stats().unhandled_io, 1);
    // The guest's buffer is left untouched when nothing answers.
    assert_eq!(vcpu.io_data(0), &[0xFF]);
}
