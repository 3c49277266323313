//! Static PCI configuration state for an emulated endpoint.
//!
//! Purely descriptive: vendor/device/class identifiers plus six base-address
//! register slots, consumed by an enumeration layer to advertise device
//! presence. There is no config-space cycle decoding here.

use thiserror::Error;

/// Number of base-address-register slots in a Type 0 header.
pub const BAR_SLOTS: u8 = 6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PciConfigError {
    #[error("BAR index {index} out of range (expected 0..{BAR_SLOTS})")]
    BarIndexOutOfRange { index: u8 },
}

#[derive(Debug, Clone)]
pub struct PciConfigDevice {
    vendor_id: u16,
    device_id: u16,
    class_code: u32,
    bars: [u16; BAR_SLOTS as usize],
}

impl PciConfigDevice {
    pub fn new(vendor_id: u16, device_id: u16) -> Self {
        Self {
            vendor_id,
            device_id,
            class_code: 0,
            bars: [0; BAR_SLOTS as usize],
        }
    }

    pub fn with_class_code(vendor_id: u16, device_id: u16, class_code: u32) -> Self {
        Self {
            class_code,
            ..Self::new(vendor_id, device_id)
        }
    }

    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    pub fn device_id(&self) -> u16 {
        self.device_id
    }

    pub fn class_code(&self) -> u32 {
        self.class_code
    }

    pub fn bar(&self, index: u8) -> Result<u16, PciConfigError> {
        self.bars
            .get(usize::from(index))
            .copied()
            .ok_or(PciConfigError::BarIndexOutOfRange { index })
    }

    pub fn set_bar(&mut self, index: u8, value: u16) -> Result<(), PciConfigError> {
        match self.bars.get_mut(usize::from(index)) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(PciConfigError::BarIndexOutOfRange { index }),
        }
    }
}
