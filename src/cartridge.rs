use std::{
    fmt::{self, Debug},
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};

pub const CART_BANK_SIZE: usize = 0x2000;
pub const CART_RAM_BANK_SIZE: usize = 0x1000;

/// Writes at or above this address select the RAM bank on cartridges with
/// paged RAM; lower addresses select the ROM bank.
pub const CART_RAM_BANK_SELECT: u16 = 0x6800;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartridgeOptions {
    /// Bank numbers count down from the last bank (379/"inverted" carts).
    pub inverted: bool,
    pub ram_at_6000: bool,
    pub ram_at_7000: bool,
    /// RAM at 0x7000 is paged out of the cartridge image in 4 KiB banks.
    pub ram_paged: bool,
}

/// A cartridge image plus its banking registers.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cartridge {
    pub path: Option<PathBuf>,
    pub options: CartridgeOptions,
    data: Vec<u8>,
    bank: usize,
    ram_bank: usize,
}

impl fmt::Display for Cartridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bank {}/{}", self.bank, self.bank_count())?;
        if self.options.ram_paged {
            write!(f, " RAM bank {}/{}", self.ram_bank, self.ram_bank_count())?;
        }
        Ok(())
    }
}

impl Cartridge {
    /// Pads `image` with zeros up to a whole number of 8 KiB banks.
    pub fn new(image: &[u8], options: CartridgeOptions) -> Result<Self> {
        if image.is_empty() {
            return Err(MemoryError::EmptyImage("cartridge"));
        }

        let banks = image.len().div_ceil(CART_BANK_SIZE);
        let mut data = vec![0; banks * CART_BANK_SIZE];
        data[..image.len()].copy_from_slice(image);

        Ok(Cartridge {
            path: None,
            options,
            data,
            bank: 0,
            ram_bank: 0,
        })
    }

    pub fn load(path: impl AsRef<Path>, options: CartridgeOptions) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;

        let mut cartridge = Self::new(&buffer, options)?;
        cartridge.path = Some(path.to_path_buf());

        Ok(cartridge)
    }

    pub fn bank_count(&self) -> usize {
        self.data.len() / CART_BANK_SIZE
    }

    pub fn ram_bank_count(&self) -> usize {
        self.data.len() / CART_RAM_BANK_SIZE
    }

    pub fn bank(&self) -> usize {
        self.bank
    }

    pub fn ram_bank(&self) -> usize {
        self.ram_bank
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn reset_banks(&mut self) {
        self.bank = 0;
        self.ram_bank = 0;
    }

    fn rom_offset(&self) -> usize {
        self.bank * CART_BANK_SIZE
    }

    fn ram_offset(&self) -> usize {
        self.ram_bank * CART_RAM_BANK_SIZE
    }

    /// Bank-select write into the ROM window. The written value, not the
    /// data bus store, picks the bank.
    pub fn select_bank(&mut self, address: u16, value: u16) {
        if self.options.ram_paged && address >= CART_RAM_BANK_SELECT {
            self.ram_bank = (value as usize >> 1) & (self.ram_bank_count() - 1);
            tracing::trace!("[CART] RAM bank {}", self.ram_bank);
            return;
        }

        let count = self.bank_count();
        let mut bank = (value as usize >> 1) & (count - 1);
        if self.options.inverted {
            bank = count - 1 - bank;
        }
        self.bank = bank;
        tracing::trace!("[CART] ROM bank {} ({:04X} <- {:04X})", bank, address, value);
    }

    pub fn read_rom(&self, address: u16) -> u8 {
        self.data[self.rom_offset() + (address as usize - 0x6000)]
    }

    pub fn read_ram(&self, address: u16) -> u8 {
        self.data[self.ram_offset() + (address as usize & 0x0FFF)]
    }

    pub fn write_ram(&mut self, address: u16, value: u8) {
        let offset = self.ram_offset() + (address as usize & 0x0FFF);
        self.data[offset] = value;
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.data.is_empty() || self.data.len() % CART_BANK_SIZE != 0 {
            return Err(MemoryError::InvalidSnapshot(format!(
                "cartridge image of {:#X} bytes is not a whole number of banks",
                self.data.len()
            )));
        }
        if self.bank >= self.bank_count() || self.ram_bank >= self.ram_bank_count() {
            return Err(MemoryError::InvalidSnapshot(format!(
                "cartridge bank {}/{} out of range",
                self.bank, self.ram_bank
            )));
        }
        Ok(())
    }
}
