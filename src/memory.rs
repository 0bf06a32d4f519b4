//! CPU address-space dispatcher.
//!
//! Every even address resolves to a read/write handler pair through a
//! precomputed `MemoryMap`. Timed accesses charge wait states to the CPU that
//! issued them; the `get_*` accessors are untimed and free of side effects.

use std::collections::BTreeMap;

use derivative::Derivative;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::{
    ams::{Ams, AmsMode, AmsState},
    cartridge::{Cartridge, CartridgeOptions},
    cru::DsrControl,
    error::{MemoryError, Result},
    grom::{Grom, GromState},
    io::{Cpu, NullDevice, SoundPort, SpeechPort, VideoPort},
    memory_map::{MemoryMap, MemorySegment, ReadHandler, Region, WriteHandler},
    settings::Settings,
    state::{SaveState, Snapshot},
    utils::hexdump,
};

pub const ROM_SIZE: usize = 0x2000;
pub const RAM_SIZE: usize = 0x10000;
pub const PERIPHERAL_ROM_SIZE: usize = 0x2000;
pub const PERIPHERAL_ROM_SLOTS: u8 = 16;

/// Bits OR-ed into every scratchpad address: only 256 bytes are decoded.
pub const SCRATCHPAD_MIRROR: u16 = 0x0300;

/// Wait states for an access through the 8-bit multiplexer.
pub const BUS_WAIT_STATES: u32 = 4;
pub const GROM_WRITE_WAIT_STATES: u32 = 23;

fn read_wait_states(handler: ReadHandler) -> u32 {
    match handler {
        // 16-bit console bus
        ReadHandler::Rom | ReadHandler::Scratchpad => 0,
        _ => BUS_WAIT_STATES,
    }
}

fn write_wait_states(handler: WriteHandler) -> u32 {
    match handler {
        WriteHandler::Rom | WriteHandler::Scratchpad => 0,
        WriteHandler::Grom => GROM_WRITE_WAIT_STATES,
        _ => BUS_WAIT_STATES,
    }
}

fn word(data: &[u8], address: usize) -> u16 {
    (data[address] as u16) << 8 | data[address + 1] as u16
}

fn set_word(data: &mut [u8], address: usize, value: u16) {
    data[address] = (value >> 8) as u8;
    data[address + 1] = value as u8;
}

fn swap_bytes(value: u16) -> u16 {
    (value & 0x00FF) << 8 | value >> 8
}

fn is_expansion_ram(address: u16) -> bool {
    (0x2000..0x4000).contains(&address) || address >= 0xA000
}

/// Devices reached through the memory-mapped ports.
pub struct Devices {
    pub vdp: Box<dyn VideoPort>,
    pub sound: Box<dyn SoundPort>,
    pub speech: Box<dyn SpeechPort>,
}

impl Default for Devices {
    fn default() -> Self {
        Self {
            vdp: Box::new(NullDevice),
            sound: Box::new(NullDevice),
            speech: Box::new(NullDevice),
        }
    }
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Memory {
    #[derivative(Debug = "ignore")]
    devices: Devices,
    settings: Settings,
    #[derivative(Debug = "ignore")]
    rom: Vec<u8>,
    #[derivative(Debug = "ignore")]
    ram: Vec<u8>,
    #[derivative(Debug = "ignore")]
    grom: Grom,
    #[derivative(Debug = "ignore")]
    cartridge: Option<Cartridge>,
    #[derivative(Debug = "ignore")]
    peripheral_roms: BTreeMap<u8, Vec<u8>>,
    peripheral_rom_enabled: bool,
    peripheral_rom_number: u8,
    #[derivative(Debug = "ignore")]
    ams: Ams,
    map: MemoryMap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryState {
    pub settings: Settings,
    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
    pub grom: GromState,
    pub cartridge: Option<Cartridge>,
    pub peripheral_roms: BTreeMap<u8, Vec<u8>>,
    pub peripheral_rom_enabled: bool,
    pub peripheral_rom_number: u8,
    pub ams: AmsState,
}

impl Snapshot for MemoryState {}

impl Default for Memory {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl Memory {
    pub fn new(settings: Settings) -> Self {
        Self::with_devices(settings, Devices::default())
    }

    pub fn with_devices(settings: Settings, devices: Devices) -> Self {
        Memory {
            devices,
            settings,
            rom: vec![0; ROM_SIZE],
            ram: vec![0; RAM_SIZE],
            grom: Grom::new(),
            cartridge: None,
            peripheral_roms: BTreeMap::new(),
            peripheral_rom_enabled: false,
            peripheral_rom_number: 0,
            ams: Ams::new(settings.ams_size),
            map: MemoryMap::new(false, false),
        }
    }

    /// Clears RAM, cartridge GROM, banking and the GROM cursor. A cold reset
    /// (`keep_cartridge == false`) also removes the cartridge and disables
    /// the peripheral ROM.
    pub fn reset(&mut self, keep_cartridge: bool) {
        info!(
            "[MEM] {} reset",
            if keep_cartridge { "Warm" } else { "Cold" }
        );
        self.ram.fill(0);
        self.grom.reset(!keep_cartridge);
        self.ams.reset();
        if keep_cartridge {
            if let Some(cartridge) = &mut self.cartridge {
                cartridge.reset_banks();
            }
        } else {
            self.cartridge = None;
            self.peripheral_rom_enabled = false;
            self.peripheral_rom_number = 0;
        }
        self.build_memory_map();
    }

    pub fn build_memory_map(&mut self) {
        let (ram_at_6000, ram_at_7000) = self
            .cartridge
            .as_ref()
            .map_or((false, false), |c| (c.options.ram_at_6000, c.options.ram_at_7000));
        self.map = MemoryMap::new(ram_at_6000, ram_at_7000);
        debug!(
            "[MEM] Memory map rebuilt (RAM at 6000: {}, RAM at 7000: {})",
            ram_at_6000, ram_at_7000
        );
    }

    pub fn memory_segments(&self) -> &[MemorySegment] {
        self.map.segments()
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn set_32k_ram_enabled(&mut self, enabled: bool) {
        self.settings.enable_32k_ram = enabled;
    }

    pub fn set_ams_enabled(&mut self, enabled: bool) {
        self.settings.enable_ams = enabled;
    }

    pub fn is_ams_enabled(&self) -> bool {
        self.settings.enable_ams
    }

    pub fn set_gram_enabled(&mut self, enabled: bool) {
        self.settings.enable_gram = enabled;
    }

    pub fn ams(&self) -> &Ams {
        &self.ams
    }

    pub fn ams_mut(&mut self) -> &mut Ams {
        &mut self.ams
    }

    pub fn grom(&self) -> &Grom {
        &self.grom
    }

    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.cartridge.as_ref()
    }

    pub fn devices_mut(&mut self) -> &mut Devices {
        &mut self.devices
    }

    pub fn peripheral_rom(&self) -> Option<u8> {
        self.peripheral_rom_enabled
            .then_some(self.peripheral_rom_number)
    }

    // Loaders

    pub fn load_rom(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(MemoryError::EmptyImage("console ROM"));
        }
        if data.len() > ROM_SIZE {
            return Err(MemoryError::ImageTooLarge {
                what: "console ROM",
                addr: 0,
                len: data.len(),
                capacity: ROM_SIZE,
            });
        }
        self.rom.fill(0);
        self.rom[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Copies `data` into RAM at `address`, following the same routing as
    /// CPU writes: AMS for the expansion windows when AMS is on, the
    /// cartridge for paged cartridge RAM, flat RAM otherwise.
    pub fn load_ram(&mut self, address: u16, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(MemoryError::EmptyImage("RAM"));
        }
        if address as usize + data.len() > RAM_SIZE {
            return Err(MemoryError::ImageTooLarge {
                what: "RAM",
                addr: address as usize,
                len: data.len(),
                capacity: RAM_SIZE,
            });
        }

        for (i, &byte) in data.iter().enumerate() {
            let a = address + i as u16;
            if self.settings.enable_ams && is_expansion_ram(a) {
                self.ams.set_byte(a, byte);
                continue;
            }
            match (self.map.region(a), &mut self.cartridge) {
                (Region::CartridgeRam, Some(cart)) if cart.options.ram_paged && a >= 0x7000 => {
                    cart.write_ram(a, byte)
                }
                (Region::Scratchpad, _) => self.ram[(a | SCRATCHPAD_MIRROR) as usize] = byte,
                _ => self.ram[a as usize] = byte,
            }
        }
        Ok(())
    }

    pub fn load_grom(&mut self, data: &[u8], address: u16, base: usize) -> Result<()> {
        self.grom.load(data, address as usize, base)
    }

    pub fn set_cartridge_image(&mut self, image: &[u8], options: CartridgeOptions) -> Result<()> {
        let cartridge = Cartridge::new(image, options)?;
        self.set_cartridge(cartridge);
        Ok(())
    }

    pub fn set_cartridge(&mut self, mut cartridge: Cartridge) {
        cartridge.reset_banks();
        debug!(
            "[MEM] Cartridge installed: {} banks {:?}",
            cartridge.bank_count(),
            cartridge.options
        );
        self.cartridge = Some(cartridge);
        self.build_memory_map();
    }

    pub fn remove_cartridge(&mut self) -> Option<Cartridge> {
        let cartridge = self.cartridge.take();
        self.build_memory_map();
        cartridge
    }

    pub fn load_peripheral_rom(&mut self, number: u8, data: &[u8]) -> Result<()> {
        if number == 0 || number >= PERIPHERAL_ROM_SLOTS {
            return Err(MemoryError::InvalidPeripheralRom(number));
        }
        if data.is_empty() {
            return Err(MemoryError::EmptyImage("peripheral ROM"));
        }
        if data.len() > PERIPHERAL_ROM_SIZE {
            return Err(MemoryError::ImageTooLarge {
                what: "peripheral ROM",
                addr: 0x4000,
                len: data.len(),
                capacity: PERIPHERAL_ROM_SIZE,
            });
        }
        let mut rom = vec![0; PERIPHERAL_ROM_SIZE];
        rom[..data.len()].copy_from_slice(data);
        self.peripheral_roms.insert(number, rom);
        Ok(())
    }

    // Timed accesses

    pub fn read_word(&mut self, address: u16, cpu: &mut dyn Cpu) -> u16 {
        let address = address & 0xFFFE;
        let (handler, _) = self.map.handlers(address);
        cpu.add_cycles(read_wait_states(handler));
        match handler {
            ReadHandler::Vdp => {
                let value = if address & 0x0002 == 0 {
                    self.devices.vdp.read_data()
                } else {
                    self.devices.vdp.read_status()
                };
                (value as u16) << 8
            }
            ReadHandler::Speech => (self.devices.speech.read_speech_data() as u16) << 8,
            ReadHandler::Grom => {
                let value = if address & 0x0002 == 0 {
                    self.grom.read_data(address)
                } else {
                    self.grom.read_address()
                };
                (value as u16) << 8
            }
            _ => self.get_word(address),
        }
    }

    pub fn write_word(&mut self, address: u16, value: u16, cpu: &mut dyn Cpu) {
        let address = address & 0xFFFE;
        let (_, handler) = self.map.handlers(address);
        cpu.add_cycles(write_wait_states(handler));
        match handler {
            WriteHandler::Rom => {
                trace!("[MEM] Write to console ROM {:04X} = {:04X} ignored", address, value);
            }
            WriteHandler::Ram => self.write_ram(address, value),
            WriteHandler::PeripheralRom => self.write_peripheral_rom(address, value),
            WriteHandler::CartridgeRom => {
                if let Some(cartridge) = &mut self.cartridge {
                    cartridge.select_bank(address, value);
                }
            }
            WriteHandler::CartridgeRam => self.write_cartridge_ram(address, value),
            WriteHandler::Scratchpad => {
                set_word(&mut self.ram, (address | SCRATCHPAD_MIRROR) as usize, value)
            }
            WriteHandler::Sound => self.devices.sound.write_data((value >> 8) as u8),
            WriteHandler::Vdp => {
                if address & 0x0002 == 0 {
                    self.devices.vdp.write_data((value >> 8) as u8);
                } else {
                    self.devices.vdp.write_address((value >> 8) as u8);
                }
            }
            WriteHandler::Speech => self.devices.speech.write_speech_data((value >> 8) as u8),
            WriteHandler::Grom => {
                if address & 0x0002 != 0 {
                    self.grom.write_address((value >> 8) as u8);
                } else if self.settings.enable_gram {
                    self.grom.write_data(address, (value >> 8) as u8);
                } else {
                    warn!(
                        "[GROM] Data write {:02X} at {:04X} ignored, GRAM disabled",
                        value >> 8,
                        self.grom.address()
                    );
                }
            }
            WriteHandler::Null => {}
        }
    }

    // Untimed accesses

    /// Word as the CPU would see it, without wait states or port side
    /// effects. Device ports read as 0.
    pub fn get_word(&self, address: u16) -> u16 {
        let address = address & 0xFFFE;
        match self.map.handlers(address).0 {
            ReadHandler::Rom => word(&self.rom, address as usize),
            ReadHandler::Ram => self.read_ram(address),
            ReadHandler::PeripheralRom => self.read_peripheral_rom(address),
            ReadHandler::CartridgeRom => self.read_cartridge_rom(address),
            ReadHandler::CartridgeRam => self.read_cartridge_ram(address),
            ReadHandler::Scratchpad => word(&self.ram, (address | SCRATCHPAD_MIRROR) as usize),
            ReadHandler::Vdp | ReadHandler::Speech | ReadHandler::Grom | ReadHandler::Null => 0,
        }
    }

    pub fn get_byte(&self, address: u16) -> u8 {
        let value = self.get_word(address);
        if address & 1 == 0 {
            (value >> 8) as u8
        } else {
            value as u8
        }
    }

    pub fn hexdump(&self, start: u16, end: u16) -> String {
        hexdump(|a| self.get_byte(a), start, end)
    }

    pub fn status(&self) -> String {
        let cartridge = self
            .cartridge
            .as_ref()
            .map_or("no cartridge".to_string(), |c| format!("cartridge {}", c));
        let dsr = self
            .peripheral_rom()
            .map_or("DSR off".to_string(), |n| format!("DSR {:X}", n));
        format!(
            "GROM {:04X} ({} bases), {}, {}, {}",
            self.grom.address(),
            self.grom.base_count(),
            cartridge,
            dsr,
            self.ams
        )
    }

    // Region handlers

    fn read_ram(&self, address: u16) -> u16 {
        if self.settings.enable_ams {
            self.ams.read_word(address)
        } else if self.settings.enable_32k_ram {
            word(&self.ram, address as usize)
        } else {
            0
        }
    }

    fn write_ram(&mut self, address: u16, value: u16) {
        if self.settings.enable_ams {
            self.ams.write_word(address, value);
        } else if self.settings.enable_32k_ram {
            set_word(&mut self.ram, address as usize, value);
        }
    }

    fn ams_registers_mapped(&self) -> bool {
        self.settings.enable_ams && self.ams.is_register_access_enabled()
    }

    fn read_peripheral_rom(&self, address: u16) -> u16 {
        if self.ams_registers_mapped() {
            let page = self.ams.read_register(((address & 0x001F) >> 1) as usize);
            return swap_bytes(page);
        }
        if !self.peripheral_rom_enabled {
            return 0;
        }
        self.peripheral_roms
            .get(&self.peripheral_rom_number)
            .map_or(0, |rom| word(rom, (address - 0x4000) as usize))
    }

    fn write_peripheral_rom(&mut self, address: u16, value: u16) {
        if self.ams_registers_mapped() {
            let index = ((address & 0x001F) >> 1) as usize;
            self.ams.write_register(index, swap_bytes(value));
            trace!("[AMS] Register {:X} = {:04X}", index, swap_bytes(value));
        } else {
            trace!("[MEM] Write to DSR ROM {:04X} = {:04X} ignored", address, value);
        }
    }

    fn read_cartridge_rom(&self, address: u16) -> u16 {
        self.cartridge.as_ref().map_or(0, |cart| {
            (cart.read_rom(address) as u16) << 8 | cart.read_rom(address + 1) as u16
        })
    }

    fn paged_cartridge_ram(&self, address: u16) -> Option<&Cartridge> {
        self.cartridge
            .as_ref()
            .filter(|cart| cart.options.ram_paged && address >= 0x7000)
    }

    fn read_cartridge_ram(&self, address: u16) -> u16 {
        match self.paged_cartridge_ram(address) {
            Some(cart) => (cart.read_ram(address) as u16) << 8 | cart.read_ram(address + 1) as u16,
            None => word(&self.ram, address as usize),
        }
    }

    fn write_cartridge_ram(&mut self, address: u16, value: u16) {
        if self.paged_cartridge_ram(address).is_some() {
            if let Some(cart) = &mut self.cartridge {
                cart.write_ram(address, (value >> 8) as u8);
                cart.write_ram(address + 1, value as u8);
            }
        } else {
            set_word(&mut self.ram, address as usize, value);
        }
    }
}

impl DsrControl for Memory {
    fn set_peripheral_rom(&mut self, number: u8, enabled: bool) {
        if enabled {
            trace!("[MEM] DSR {:X} on", number);
            self.peripheral_rom_enabled = true;
            self.peripheral_rom_number = number;
        } else if self.peripheral_rom_number == number {
            trace!("[MEM] DSR {:X} off", number);
            self.peripheral_rom_enabled = false;
        }
    }

    fn is_ams_enabled(&self) -> bool {
        self.settings.enable_ams
    }

    fn set_ams_register_access(&mut self, enabled: bool) {
        self.ams.set_register_access(enabled);
    }

    fn set_ams_mode(&mut self, mode: AmsMode) {
        self.ams.set_mode(mode);
    }
}

impl Memory {
    /// Checks a snapshot against the shapes this memory can install and
    /// builds the AMS it describes. Nothing in `self` is touched.
    fn prepare_state(state: &MemoryState) -> Result<Ams> {
        if state.rom.len() != ROM_SIZE {
            return Err(MemoryError::snapshot_len("rom", ROM_SIZE, state.rom.len()));
        }
        if state.ram.len() != RAM_SIZE {
            return Err(MemoryError::snapshot_len("ram", RAM_SIZE, state.ram.len()));
        }
        Grom::validate_state(&state.grom)?;
        if let Some(cartridge) = &state.cartridge {
            cartridge.validate()?;
        }
        for (&number, rom) in &state.peripheral_roms {
            if number >= PERIPHERAL_ROM_SLOTS {
                return Err(MemoryError::InvalidPeripheralRom(number));
            }
            if rom.len() != PERIPHERAL_ROM_SIZE {
                return Err(MemoryError::snapshot_len(
                    "peripheral_roms",
                    PERIPHERAL_ROM_SIZE,
                    rom.len(),
                ));
            }
        }

        let ams = Ams::new(state.ams.data.len());
        ams.validate_state(&state.ams)?;
        Ok(ams)
    }

    pub(crate) fn validate_state(state: &MemoryState) -> Result<()> {
        Self::prepare_state(state).map(|_| ())
    }
}

impl SaveState for Memory {
    type State = MemoryState;

    fn get_state(&self) -> MemoryState {
        MemoryState {
            settings: self.settings,
            rom: self.rom.clone(),
            ram: self.ram.clone(),
            grom: self.grom.get_state(),
            cartridge: self.cartridge.clone(),
            peripheral_roms: self.peripheral_roms.clone(),
            peripheral_rom_enabled: self.peripheral_rom_enabled,
            peripheral_rom_number: self.peripheral_rom_number,
            ams: self.ams.get_state(),
        }
    }

    fn restore_state(&mut self, state: MemoryState) -> Result<()> {
        let mut ams = Self::prepare_state(&state)?;
        let mut grom = Grom::new();
        grom.restore_state(state.grom)?;
        ams.restore_state(state.ams)?;

        self.settings = state.settings;
        self.settings.ams_size = ams.size();
        self.rom = state.rom;
        self.ram = state.ram;
        self.grom = grom;
        self.cartridge = state.cartridge;
        self.peripheral_roms = state.peripheral_roms;
        self.peripheral_rom_enabled = state.peripheral_rom_enabled;
        self.peripheral_rom_number = state.peripheral_rom_number;
        self.ams = ams;
        self.build_memory_map();
        info!("[MEM] State restored");
        Ok(())
    }
}
