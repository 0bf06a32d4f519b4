//! GROM subsystem: up to sixteen 64 KiB bases behind one auto-incrementing
//! address cursor.
//!
//! Every GROM chip on the bus watches the same address writes, so all bases
//! share a cursor and each one keeps its own prefetch latch. A data read
//! hands out the byte latched by the previous access and then refills every
//! latch from the cursor.

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};

pub const GROM_BASES: usize = 16;
pub const GROM_SIZE: usize = 0x10000;

/// Console GROMs 0-2 live here and survive a reset.
pub const CONSOLE_GROM_END: usize = 0x6000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grom {
    bases: Vec<Vec<u8>>,
    address: u16,
    access: u8,
    prefetch: [u8; GROM_BASES],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GromState {
    pub bases: Vec<Vec<u8>>,
    pub address: u16,
    pub access: u8,
    pub prefetch: [u8; GROM_BASES],
}

impl Default for Grom {
    fn default() -> Self {
        Self::new()
    }
}

impl Grom {
    pub fn new() -> Self {
        Self {
            bases: vec![vec![0; GROM_SIZE]],
            address: 0,
            access: 2,
            prefetch: [0; GROM_BASES],
        }
    }

    /// Clears everything but the console GROMs. A cold reset also forgets
    /// cartridge bases beyond base 0.
    pub fn reset(&mut self, cold: bool) {
        if cold {
            self.bases.truncate(1);
        }
        for (i, base) in self.bases.iter_mut().enumerate() {
            let start = if i == 0 { CONSOLE_GROM_END } else { 0 };
            base[start..].fill(0);
        }
        self.address = 0;
        self.access = 2;
        self.prefetch = [0; GROM_BASES];
    }

    pub fn load(&mut self, data: &[u8], address: usize, base: usize) -> Result<()> {
        if data.is_empty() {
            return Err(MemoryError::EmptyImage("GROM"));
        }
        if base >= GROM_BASES {
            return Err(MemoryError::InvalidGromBase(base));
        }
        if address + data.len() > GROM_SIZE {
            return Err(MemoryError::ImageTooLarge {
                what: "GROM",
                addr: address,
                len: data.len(),
                capacity: GROM_SIZE,
            });
        }

        while self.bases.len() <= base {
            self.bases.push(vec![0; GROM_SIZE]);
        }
        self.bases[base][address..address + data.len()].copy_from_slice(data);
        tracing::debug!(
            "[GROM] Loaded {:#X} bytes at {:04X} into base {}",
            data.len(),
            address,
            base
        );
        Ok(())
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn base_count(&self) -> usize {
        self.bases.len()
    }

    pub fn prefetch(&self, base: usize) -> u8 {
        self.prefetch.get(base).copied().unwrap_or(0)
    }

    /// Base selected by a port address. Only meaningful once more than one
    /// base is populated; the port pairs repeat every 4 bytes.
    pub fn select_base(&self, port: u16) -> usize {
        if self.bases.len() > 1 {
            ((port & 0x003C) >> 2) as usize
        } else {
            0
        }
    }

    pub fn peek(&self, base: usize, address: u16) -> u8 {
        self.bases
            .get(base)
            .map_or(0, |data| data[address as usize])
    }

    fn refill(&mut self) {
        let address = self.address as usize;
        for (latch, data) in self.prefetch.iter_mut().zip(&self.bases) {
            *latch = data[address];
        }
        self.address = self.address.wrapping_add(1);
    }

    pub fn read_data(&mut self, port: u16) -> u8 {
        let value = self.prefetch(self.select_base(port));
        self.refill();
        self.access = 2;
        value
    }

    pub fn read_address(&mut self) -> u8 {
        let value = (self.address >> 8) as u8;
        self.address = (self.address << 8) | (self.address & 0x00FF);
        self.access = 2;
        value
    }

    pub fn write_address(&mut self, value: u8) {
        self.address = (self.address << 8) | value as u16;
        self.access -= 1;
        if self.access == 0 {
            self.access = 2;
            self.refill();
            tracing::trace!("[GROM] Address set to {:04X}", self.address.wrapping_sub(1));
        }
    }

    /// GRAM write. The cursor already points one past the latched byte, so
    /// the byte lands at `address - 1`.
    pub fn write_data(&mut self, port: u16, value: u8) {
        let base = self.select_base(port);
        let target = self.address.wrapping_sub(1) as usize;
        if let Some(data) = self.bases.get_mut(base) {
            data[target] = value;
        }
        self.refill();
        self.access = 2;
    }

    pub fn get_state(&self) -> GromState {
        GromState {
            bases: self.bases.clone(),
            address: self.address,
            access: self.access,
            prefetch: self.prefetch,
        }
    }

    pub(crate) fn validate_state(state: &GromState) -> Result<()> {
        if state.bases.is_empty() || state.bases.len() > GROM_BASES {
            return Err(MemoryError::InvalidSnapshot(format!(
                "grom has {} bases",
                state.bases.len()
            )));
        }
        if let Some(base) = state.bases.iter().find(|b| b.len() != GROM_SIZE) {
            return Err(MemoryError::snapshot_len("grom.bases", GROM_SIZE, base.len()));
        }
        if !(1..=2).contains(&state.access) {
            return Err(MemoryError::InvalidSnapshot(format!(
                "grom access counter {}",
                state.access
            )));
        }
        Ok(())
    }

    pub fn restore_state(&mut self, state: GromState) -> Result<()> {
        Self::validate_state(&state)?;
        self.bases = state.bases;
        self.address = state.address;
        self.access = state.access;
        self.prefetch = state.prefetch;
        Ok(())
    }
}
