//! CRT controller slice of a text-mode display adapter.
//!
//! Only the cursor-location sub-registers are modeled: the guest writes a
//! sub-register index to `0x3D4` and the value to `0x3D5`, in the classic
//! CRTC index/data two-step. The composed cursor offset is read by a
//! presentation thread (out of scope here) to render the cursor glyph into
//! the shared text buffer, which is why register state sits behind a mutex.

use std::sync::{Arc, Mutex};

use crate::bus::PortIoDevice;

pub const CRTC_INDEX_PORT: u16 = 0x3D4;
pub const CRTC_DATA_PORT: u16 = 0x3D5;

const CURSOR_HIGH_INDEX: u8 = 0x0E;
const CURSOR_LOW_INDEX: u8 = 0x0F;

/// Shared text-mode video buffer, one u16 cell (attribute | glyph) per
/// character. Owned by the presentation layer, never by the controller.
pub type TextBuffer = Arc<Mutex<Vec<u16>>>;

#[derive(Debug, Default)]
struct CrtcState {
    index: u8,
    cursor_high: u8,
    cursor_low: u8,
}

/// Index/data register pair manipulating the text-mode cursor position.
#[derive(Debug, Default)]
pub struct DisplayController {
    state: Mutex<CrtcState>,
    text_buffer: Mutex<Option<TextBuffer>>,
}

impl DisplayController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches the shared video buffer the presentation layer renders from.
    pub fn attach_text_buffer(&self, buffer: TextBuffer) {
        *self.text_buffer.lock().unwrap() = Some(buffer);
    }

    pub fn text_buffer(&self) -> Option<TextBuffer> {
        self.text_buffer.lock().unwrap().clone()
    }

    /// Linear cursor offset into the text buffer (`high * 256 + low`).
    pub fn cursor_position(&self) -> u16 {
        let state = self.state.lock().unwrap();
        u16::from(state.cursor_high) << 8 | u16::from(state.cursor_low)
    }

    fn write_reg_byte(&self, port: u16, val: u8) {
        let mut state = self.state.lock().unwrap();
        match port {
            CRTC_INDEX_PORT => state.index = val,
            CRTC_DATA_PORT => match state.index {
                CURSOR_HIGH_INDEX => state.cursor_high = val,
                CURSOR_LOW_INDEX => state.cursor_low = val,
                // Unknown sub-register selections are writes-ignored.
                _ => {}
            },
            _ => {}
        }
    }

    fn read_reg_byte(&self, port: u16) -> u8 {
        let state = self.state.lock().unwrap();
        match port {
            CRTC_INDEX_PORT => state.index,
            CRTC_DATA_PORT => match state.index {
                CURSOR_HIGH_INDEX => state.cursor_high,
                CURSOR_LOW_INDEX => state.cursor_low,
                _ => 0,
            },
            _ => 0,
        }
    }
}

impl PortIoDevice for DisplayController {
    fn read(&mut self, port: u16, size: u8) -> u32 {
        if size != 1 {
            return 0;
        }
        u32::from(self.read_reg_byte(port))
    }

    fn write(&mut self, port: u16, size: u8, value: u32) {
        if size != 1 {
            return;
        }
        self.write_reg_byte(port, value as u8);
    }

    fn reset(&mut self) {
        *self.state.lock().unwrap() = CrtcState::default();
    }
}

/// The controller is registered on the bus through a shared handle so a
/// presentation thread can keep reading [`DisplayController::cursor_position`]
/// while the VM loop drives the registers.
impl PortIoDevice for Arc<DisplayController> {
    fn read(&mut self, port: u16, size: u8) -> u32 {
        if size != 1 {
            return 0;
        }
        u32::from(self.read_reg_byte(port))
    }

    fn write(&mut self, port: u16, size: u8, value: u32) {
        if size != 1 {
            return;
        }
        self.write_reg_byte(port, value as u8);
    }

    fn reset(&mut self) {
        *self.state.lock().unwrap() = CrtcState::default();
    }
}
