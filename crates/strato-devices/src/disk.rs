//! ATA-like disk controller (PIO, READ/WRITE SECTORS only).
//!
//! The guest drives the controller through the legacy primary-channel port
//! layout: a command block at `0x1F0..=0x1F7` and a control block at
//! `0x3F6..=0x3F7`. Addressing registers are plain latches; a command-register
//! write latches the 28-bit LBA and sector count and arms the data-register
//! word handshake. One block is staged at a time; crossing the 256-word block
//! boundary flushes (write) or prefetches (read) through the [`BlockStore`]
//! backend.
//!
//! Guest protocol misuse is never fatal: unrecognized commands are ignored,
//! writes to read-only registers are dropped, and stray data-register
//! accesses outside a command just cycle stale buffer bytes. Backend I/O
//! failures (including guest-programmed LBAs beyond the disk) abort the
//! command with ERR/ABRT so the guest observes a device error instead of the
//! VMM crashing.

use strato_storage::{BlockStore, BLOCK_SIZE};

use crate::bus::PortIoDevice;

/// Legacy primary-channel port assignments.
pub const CMD_BASE: u16 = 0x1F0;
pub const CTRL_BASE: u16 = 0x3F6;

const REG_DATA: u16 = 0;
const REG_ERROR: u16 = 1;
const REG_SECTOR_COUNT: u16 = 2;
const REG_SECTOR_NUMBER: u16 = 3;
const REG_CYL_LOW: u16 = 4;
const REG_CYL_HIGH: u16 = 5;
const REG_DRIVE_HEAD: u16 = 6;
const REG_STATUS_COMMAND: u16 = 7;

const CTRL_REG_ALT_STATUS_DEVICE_CTRL: u16 = 0;
const CTRL_REG_DRIVE_ADDRESS: u16 = 1;

pub const STATUS_BSY: u8 = 0x80;
pub const STATUS_DRQ: u8 = 0x08;
pub const STATUS_ERR: u8 = 0x01;

pub const ERROR_ABRT: u8 = 0x04;

pub const CMD_READ_SECTORS: u8 = 0x20;
pub const CMD_WRITE_SECTORS: u8 = 0x30;

const WORDS_PER_BLOCK: usize = BLOCK_SIZE / 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActiveCommand {
    ReadSectors,
    WriteSectors,
}

/// Emulated ATA-like disk controller over a [`BlockStore`] backend.
pub struct AtaDisk {
    store: Box<dyn BlockStore>,

    // Guest-visible registers. All reset to zero at construction.
    sector_count: u8,
    sector_number: u8,
    cyl_low: u8,
    cyl_high: u8,
    drive_head: u8,
    error: u8,
    status: u8,
    control: u8,
    drive_address: u8,

    // Transfer state, latched at command-register write time.
    active: Option<ActiveCommand>,
    lba: u32,
    sector_total: u32,
    sectors_done: u32,
    buf: [u8; BLOCK_SIZE],
    cursor: usize,
}

/// Composes a 28-bit LBA from the four addressing registers.
pub fn compose_lba(head: u8, cyl_high: u8, cyl_low: u8, sector_number: u8) -> u32 {
    let lba = (u32::from(head) << 24)
        | (u32::from(cyl_high) << 16)
        | (u32::from(cyl_low) << 8)
        | u32::from(sector_number);
    lba & 0x0FFF_FFFF
}

impl AtaDisk {
    pub fn new(store: Box<dyn BlockStore>) -> Self {
        Self {
            store,
            sector_count: 0,
            sector_number: 0,
            cyl_low: 0,
            cyl_high: 0,
            drive_head: 0,
            error: 0,
            status: 0,
            control: 0,
            drive_address: 0,
            active: None,
            lba: 0,
            sector_total: 0,
            sectors_done: 0,
            buf: [0; BLOCK_SIZE],
            cursor: 0,
        }
    }

    pub fn status(&self) -> u8 {
        self.status
    }

    pub fn error(&self) -> u8 {
        self.error
    }

    fn latched_lba(&self) -> u32 {
        compose_lba(
            self.drive_head,
            self.cyl_high,
            self.cyl_low,
            self.sector_number,
        )
    }

    fn abort(&mut self) {
        self.active = None;
        self.cursor = 0;
        self.error |= ERROR_ABRT;
        self.status &= !(STATUS_BSY | STATUS_DRQ);
        self.status |= STATUS_ERR;
    }

    fn exec_command(&mut self, cmd: u8) {
        match cmd {
            CMD_READ_SECTORS | CMD_WRITE_SECTORS => {
                // A command consumes the currently-staged addressing
                // registers; later latch writes have no effect on it.
                self.lba = self.latched_lba();
                self.sector_total = u32::from(self.sector_count);
                self.sectors_done = 0;
                self.cursor = 0;
                self.error = 0;
                self.status &= !(STATUS_BSY | STATUS_ERR);

                if self.sector_total == 0 {
                    // Degenerate transfer: complete before any backend I/O.
                    self.active = None;
                    self.status &= !STATUS_DRQ;
                    return;
                }

                if cmd == CMD_READ_SECTORS {
                    // The word handshake is synchronous, so the first block
                    // must be staged before the guest's first data read.
                    if self.store.read_block(u64::from(self.lba), &mut self.buf).is_err() {
                        self.abort();
                        return;
                    }
                    self.active = Some(ActiveCommand::ReadSectors);
                } else {
                    self.active = Some(ActiveCommand::WriteSectors);
                }
                self.status |= STATUS_DRQ;
            }
            // Lenient policy: unrecognized commands are ignored outright,
            // leaving BUSY/DATA-READY untouched.
            _ => {}
        }
    }

    fn write_data_word(&mut self, val: u16) {
        // BUSY while a word is in flight, never together with DATA-READY.
        self.status = (self.status | STATUS_BSY) & !STATUS_DRQ;
        self.buf[self.cursor..self.cursor + 2].copy_from_slice(&val.to_le_bytes());
        self.cursor += 2;
        if self.cursor < BLOCK_SIZE {
            return;
        }
        self.cursor = 0;
        self.status &= !STATUS_BSY;

        // A full block is staged. Outside a write command this was a stray
        // access sequence; the buffer simply wraps with no backend I/O.
        if self.active != Some(ActiveCommand::WriteSectors) {
            return;
        }

        let block = u64::from(self.lba) + u64::from(self.sectors_done);
        if self.store.write_block(block, &self.buf).is_err() {
            self.abort();
            return;
        }
        self.status |= STATUS_DRQ;
        self.sectors_done += 1;
        if self.sectors_done == self.sector_total {
            self.active = None;
            self.status &= !STATUS_DRQ;
        }
    }

    fn read_data_word(&mut self) -> u16 {
        self.status = (self.status | STATUS_BSY) & !STATUS_DRQ;
        let val = u16::from_le_bytes([self.buf[self.cursor], self.buf[self.cursor + 1]]);
        self.cursor += 2;
        if self.cursor == BLOCK_SIZE {
            self.cursor = 0;
            self.status &= !STATUS_BSY;

            if self.active == Some(ActiveCommand::ReadSectors) {
                self.status |= STATUS_DRQ;
                self.sectors_done += 1;
                if self.sectors_done == self.sector_total {
                    self.active = None;
                    self.status &= !STATUS_DRQ;
                } else {
                    let block = u64::from(self.lba) + u64::from(self.sectors_done);
                    if self.store.read_block(block, &mut self.buf).is_err() {
                        self.abort();
                    }
                }
            }
        }
        val
    }

    fn read_reg_byte(&mut self, reg: u16) -> u8 {
        match reg {
            REG_ERROR => self.error,
            REG_SECTOR_COUNT => self.sector_count,
            REG_SECTOR_NUMBER => self.sector_number,
            REG_CYL_LOW => self.cyl_low,
            REG_CYL_HIGH => self.cyl_high,
            REG_STATUS_COMMAND => self.status,
            _ => 0,
        }
    }

    fn write_reg_byte(&mut self, reg: u16, val: u8) {
        match reg {
            REG_SECTOR_COUNT => self.sector_count = val,
            REG_SECTOR_NUMBER => self.sector_number = val,
            REG_CYL_LOW => self.cyl_low = val,
            REG_CYL_HIGH => self.cyl_high = val,
            REG_DRIVE_HEAD => self.drive_head = val,
            REG_STATUS_COMMAND => self.exec_command(val),
            // Error/status/data-available are read-only from the guest's
            // perspective; writes to them are protocol violations and are
            // dropped.
            _ => {}
        }
    }

    fn read_ctrl_byte(&mut self, reg: u16) -> u8 {
        match reg {
            CTRL_REG_ALT_STATUS_DEVICE_CTRL => self.status,
            CTRL_REG_DRIVE_ADDRESS => self.drive_address,
            _ => 0,
        }
    }

    fn write_ctrl_byte(&mut self, reg: u16, val: u8) {
        // Device control is a plain latch; no interrupt model is wired here.
        if reg == CTRL_REG_ALT_STATUS_DEVICE_CTRL {
            self.control = val;
        }
    }
}

impl PortIoDevice for AtaDisk {
    fn read(&mut self, port: u16, size: u8) -> u32 {
        let off = port.wrapping_sub(CMD_BASE);
        if off < 8 {
            return match (off, size) {
                (REG_DATA, 2) => u32::from(self.read_data_word()),
                (REG_DATA, _) => 0,
                (reg, 1) => u32::from(self.read_reg_byte(reg)),
                _ => 0,
            };
        }
        let off = port.wrapping_sub(CTRL_BASE);
        if off < 2 && size == 1 {
            return u32::from(self.read_ctrl_byte(off));
        }
        0
    }

    fn write(&mut self, port: u16, size: u8, value: u32) {
        let off = port.wrapping_sub(CMD_BASE);
        if off < 8 {
            match (off, size) {
                (REG_DATA, 2) => self.write_data_word(value as u16),
                (REG_DATA, _) => {}
                (reg, 1) => self.write_reg_byte(reg, value as u8),
                _ => {}
            }
            return;
        }
        let off = port.wrapping_sub(CTRL_BASE);
        if off < 2 && size == 1 {
            self.write_ctrl_byte(off, value as u8);
        }
    }

    fn reset(&mut self) {
        let store = std::mem::replace(&mut self.store, Box::new(NullStore));
        *self = AtaDisk::new(store);
    }
}

/// Placeholder backend used only while swapping stores during reset.
struct NullStore;

impl BlockStore for NullStore {
    fn block_count(&self) -> u64 {
        0
    }

    fn read_block(
        &mut self,
        block: u64,
        _buf: &mut [u8; BLOCK_SIZE],
    ) -> strato_storage::Result<()> {
        Err(strato_storage::StoreError::OutOfBounds {
            block,
            block_count: 0,
        })
    }

    fn write_block(&mut self, block: u64, _buf: &[u8; BLOCK_SIZE]) -> strato_storage::Result<()> {
        Err(strato_storage::StoreError::OutOfBounds {
            block,
            block_count: 0,
        })
    }
}
