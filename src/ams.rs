//! AMS/SAMS paged memory expansion.
//!
//! The 64 KiB CPU space is split into sixteen 4 KiB windows, indexed by the
//! top nibble of the address. Each window is backed by a physical page of a
//! larger store. In transparent mode the 32K RAM windows map onto fixed pages
//! (the card behaves like a plain 32K expansion); in mapping mode the sixteen
//! page registers decide.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};

pub const AMS_PAGE_SIZE: usize = 0x1000;
pub const AMS_REGISTERS: usize = 16;

const TRANSPARENT_MAP: [Option<u16>; AMS_REGISTERS] = [
    None,
    None,
    Some(2),
    Some(3),
    None,
    None,
    None,
    None,
    None,
    None,
    Some(10),
    Some(11),
    Some(12),
    Some(13),
    Some(14),
    Some(15),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AmsMode {
    #[default]
    Transparent,
    Mapping,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ams {
    data: Vec<u8>,
    pages: usize,
    registers: [u16; AMS_REGISTERS],
    mode: AmsMode,
    register_access: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmsState {
    pub registers: [u16; AMS_REGISTERS],
    pub mode: AmsMode,
    pub register_access: bool,
    pub data: Vec<u8>,
}

impl Ams {
    /// Creates a card of `size` bytes. The page count is rounded up to a
    /// power of two so page numbers can always be masked into range.
    pub fn new(size: usize) -> Self {
        let requested = (size / AMS_PAGE_SIZE).max(1);
        let pages = requested.next_power_of_two();
        if pages != requested {
            tracing::warn!(
                "[AMS] {} pages requested, rounding up to {}",
                requested,
                pages
            );
        }

        Self {
            data: vec![0; pages * AMS_PAGE_SIZE],
            pages,
            registers: [0; AMS_REGISTERS],
            mode: AmsMode::Transparent,
            register_access: false,
        }
    }

    pub fn reset(&mut self) {
        self.data.fill(0);
        self.registers = [0; AMS_REGISTERS];
        self.mode = AmsMode::Transparent;
        self.register_access = false;
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn mode(&self) -> AmsMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: AmsMode) {
        if self.mode != mode {
            tracing::debug!("[AMS] Mode {:?}", mode);
        }
        self.mode = mode;
    }

    pub fn is_register_access_enabled(&self) -> bool {
        self.register_access
    }

    pub fn set_register_access(&mut self, enabled: bool) {
        self.register_access = enabled;
    }

    /// Reads page register `index`. Returns 0 while register access is off.
    pub fn read_register(&self, index: usize) -> u16 {
        if !self.register_access {
            return 0;
        }
        self.registers[index & (AMS_REGISTERS - 1)]
    }

    /// Writes page register `index`. Ignored while register access is off.
    pub fn write_register(&mut self, index: usize, page: u16) {
        if !self.register_access {
            tracing::trace!(
                "[AMS] Register {:X} write {:04X} ignored, access disabled",
                index,
                page
            );
            return;
        }
        self.registers[index & (AMS_REGISTERS - 1)] = page;
    }

    fn translate(&self, address: u16) -> Option<usize> {
        let window = (address >> 12) as usize;
        let page = match self.mode {
            AmsMode::Transparent => TRANSPARENT_MAP[window]?,
            AmsMode::Mapping => self.registers[window],
        };
        Some(((page as usize & (self.pages - 1)) << 12) | (address as usize & 0x0FFF))
    }

    pub fn get_byte(&self, address: u16) -> u8 {
        self.translate(address).map_or(0, |a| self.data[a])
    }

    pub fn set_byte(&mut self, address: u16, value: u8) {
        if let Some(a) = self.translate(address) {
            self.data[a] = value;
        }
    }

    pub fn read_word(&self, address: u16) -> u16 {
        let address = address & 0xFFFE;
        (self.get_byte(address) as u16) << 8 | self.get_byte(address + 1) as u16
    }

    pub fn write_word(&mut self, address: u16, value: u16) {
        let address = address & 0xFFFE;
        self.set_byte(address, (value >> 8) as u8);
        self.set_byte(address + 1, value as u8);
    }

    pub fn get_state(&self) -> AmsState {
        AmsState {
            registers: self.registers,
            mode: self.mode,
            register_access: self.register_access,
            data: self.data.clone(),
        }
    }

    pub(crate) fn validate_state(&self, state: &AmsState) -> Result<()> {
        if state.data.len() != self.data.len() {
            return Err(MemoryError::snapshot_len(
                "ams.data",
                self.data.len(),
                state.data.len(),
            ));
        }
        Ok(())
    }

    pub fn restore_state(&mut self, state: AmsState) -> Result<()> {
        self.validate_state(&state)?;
        self.registers = state.registers;
        self.mode = state.mode;
        self.register_access = state.register_access;
        self.data = state.data;
        Ok(())
    }
}

impl fmt::Display for Ams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AMS {:?}{} [",
            self.mode,
            if self.register_access { " (regs)" } else { "" }
        )?;
        for (i, page) in self.registers.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02X}", page)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparent_mapping() {
        let mut ams = Ams::new(0x20000);
        ams.set_byte(0x2010, 0x12);
        ams.set_byte(0xA010, 0x34);
        assert_eq!(ams.get_byte(0x2010), 0x12);
        assert_eq!(ams.get_byte(0xA010), 0x34);

        // windows outside the 32K areas are not backed
        ams.set_byte(0x6000, 0x56);
        assert_eq!(ams.get_byte(0x6000), 0);
    }

    #[test]
    fn test_register_interlock() {
        let mut ams = Ams::new(0x20000);
        ams.write_register(2, 0x10);
        assert_eq!(ams.read_register(2), 0);

        ams.set_register_access(true);
        ams.write_register(2, 0x10);
        assert_eq!(ams.read_register(2), 0x10);

        ams.set_register_access(false);
        assert_eq!(ams.read_register(2), 0);
    }

    #[test]
    fn test_mapping_mode_redirects_window() {
        let mut ams = Ams::new(0x20000);
        ams.set_register_access(true);
        ams.write_register(2, 0x05);
        ams.write_register(3, 0x05);
        ams.set_mode(AmsMode::Mapping);

        ams.write_word(0x2100, 0xBEEF);
        assert_eq!(ams.read_word(0x3100), 0xBEEF);

        ams.set_mode(AmsMode::Transparent);
        assert_eq!(ams.read_word(0x2100), 0);
    }

    #[test]
    fn test_page_numbers_wrap() {
        let mut ams = Ams::new(0x20000); // 32 pages
        ams.set_register_access(true);
        ams.write_register(0xA, 0x21);
        ams.write_register(0xB, 0x01);
        ams.set_mode(AmsMode::Mapping);

        ams.set_byte(0xA000, 0x77);
        assert_eq!(ams.get_byte(0xB000), 0x77);
    }

    #[test]
    fn test_odd_size_rounds_up() {
        let ams = Ams::new(3 * AMS_PAGE_SIZE);
        assert_eq!(ams.pages(), 4);
        assert_eq!(ams.size(), 4 * AMS_PAGE_SIZE);
    }

    #[test]
    fn test_restore_rejects_wrong_size() {
        let mut ams = Ams::new(0x20000);
        let mut state = ams.get_state();
        state.data.truncate(0x1000);
        assert!(ams.restore_state(state).is_err());
    }
}
