use serde::{Deserialize, Serialize};

use crate::{
    cartridge::Cartridge,
    cru::{CruState, Tms9901},
    error::Result,
    io::{Cpu, TapeLine},
    memory::{Devices, Memory, MemoryState},
    settings::Settings,
    state::{SaveState, Snapshot},
};

/// Memory plus the 9901, wired together so CRU writes in peripheral space
/// reach the memory.
#[derive(Debug)]
pub struct Console {
    pub memory: Memory,
    pub cru: Tms9901,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleState {
    pub memory: MemoryState,
    pub cru: CruState,
}

impl Snapshot for ConsoleState {}

impl Default for Console {
    fn default() -> Self {
        Self::new(Memory::default(), Tms9901::new())
    }
}

impl Console {
    pub fn new(memory: Memory, cru: Tms9901) -> Self {
        Self { memory, cru }
    }

    pub fn read_word(&mut self, address: u16, cpu: &mut dyn Cpu) -> u16 {
        self.memory.read_word(address, cpu)
    }

    pub fn write_word(&mut self, address: u16, value: u16, cpu: &mut dyn Cpu) {
        self.memory.write_word(address, value, cpu)
    }

    pub fn read_cru_bit(&mut self, address: u16) -> bool {
        self.cru.read_bit(address)
    }

    pub fn write_cru_bit(&mut self, address: u16, value: bool) {
        self.cru.write_bit(address, value, &mut self.memory);
    }

    pub fn decrement_timer(&mut self, cycles: u32) {
        self.cru.decrement_timer(cycles);
    }

    pub fn set_vdp_interrupt(&mut self, value: bool) {
        self.cru.set_vdp_interrupt(value);
    }

    pub fn is_vdp_interrupt(&self) -> bool {
        self.cru.is_vdp_interrupt()
    }

    pub fn is_timer_interrupt(&self) -> bool {
        self.cru.is_timer_interrupt()
    }

    /// Level 1 interrupt line as seen by the CPU.
    pub fn is_interrupt_pending(&self) -> bool {
        self.is_vdp_interrupt() || self.is_timer_interrupt()
    }

    pub fn key_down(&mut self, key: &str) {
        self.cru.keyboard_mut().key_down(key);
    }

    pub fn key_up(&mut self, key: &str) {
        self.cru.keyboard_mut().key_up(key);
    }

    pub fn reset(&mut self, keep_cartridge: bool) {
        self.memory.reset(keep_cartridge);
        self.cru.reset();
    }

    pub fn status(&self) -> String {
        format!(
            "{}, timer {}/{:04X}",
            self.memory.status(),
            self.cru.decrementer(),
            self.cru.clock_register()
        )
    }
}

impl SaveState for Console {
    type State = ConsoleState;

    fn get_state(&self) -> ConsoleState {
        ConsoleState {
            memory: self.memory.get_state(),
            cru: self.cru.get_state(),
        }
    }

    fn restore_state(&mut self, state: ConsoleState) -> Result<()> {
        Memory::validate_state(&state.memory)?;
        Tms9901::validate_state(&state.cru)?;
        self.memory.restore_state(state.memory)?;
        self.cru.restore_state(state.cru)
    }
}

#[derive(Default)]
pub struct ConsoleBuilder {
    settings: Settings,
    rom: Option<Vec<u8>>,
    groms: Vec<(Vec<u8>, u16, usize)>,
    cartridge: Option<Cartridge>,
    peripheral_roms: Vec<(u8, Vec<u8>)>,
    devices: Option<Devices>,
    tape: Option<Box<dyn TapeLine>>,
}

impl ConsoleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settings(&mut self, settings: Settings) -> &mut Self {
        self.settings = settings;
        self
    }

    pub fn rom(&mut self, data: &[u8]) -> &mut Self {
        self.rom = Some(data.to_vec());
        self
    }

    pub fn grom(&mut self, data: &[u8], address: u16, base: usize) -> &mut Self {
        self.groms.push((data.to_vec(), address, base));
        self
    }

    pub fn cartridge(&mut self, cartridge: Cartridge) -> &mut Self {
        self.cartridge = Some(cartridge);
        self
    }

    pub fn peripheral_rom(&mut self, number: u8, data: &[u8]) -> &mut Self {
        self.peripheral_roms.push((number, data.to_vec()));
        self
    }

    pub fn devices(&mut self, devices: Devices) -> &mut Self {
        self.devices = Some(devices);
        self
    }

    pub fn tape(&mut self, tape: Box<dyn TapeLine>) -> &mut Self {
        self.tape = Some(tape);
        self
    }

    /// Devices and tape are moved into the console; building twice gives
    /// the second console null devices.
    pub fn build(&mut self) -> anyhow::Result<Console> {
        tracing::info!("Initializing console with {:?}", self.settings);
        let mut memory = Memory::with_devices(self.settings, self.devices.take().unwrap_or_default());
        if let Some(rom) = &self.rom {
            memory.load_rom(rom)?;
        }
        for (data, address, base) in &self.groms {
            memory.load_grom(data, *address, *base)?;
        }
        for (number, data) in &self.peripheral_roms {
            memory.load_peripheral_rom(*number, data)?;
        }
        if let Some(cartridge) = &self.cartridge {
            memory.set_cartridge(cartridge.clone());
        }

        let cru = match self.tape.take() {
            Some(tape) => Tms9901::with_tape(tape),
            None => Tms9901::new(),
        };

        Ok(Console::new(memory, cru))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::CycleCounter;

    #[test]
    fn test_builder_loads_images() {
        let console = ConsoleBuilder::new()
            .rom(&[0x83, 0xE0])
            .grom(&[0xAA], 0x0000, 0)
            .peripheral_rom(1, &[0xAA, 0x55])
            .build()
            .unwrap();
        assert_eq!(console.memory.get_word(0x0000), 0x83E0);
        assert_eq!(console.memory.grom().peek(0, 0), 0xAA);
    }

    #[test]
    fn test_builder_reports_bad_image() {
        assert!(ConsoleBuilder::new().rom(&[]).build().is_err());
    }

    #[test]
    fn test_cru_selects_dsr_in_memory() {
        let mut console = ConsoleBuilder::new()
            .peripheral_rom(1, &[0xAA, 0x55])
            .build()
            .unwrap();
        let mut cpu = CycleCounter::new();
        assert_eq!(console.read_word(0x4000, &mut cpu), 0);
        console.write_cru_bit(0x0880, true);
        assert_eq!(console.read_word(0x4000, &mut cpu), 0xAA55);
    }

    #[test]
    fn test_interrupt_pending() {
        let mut console = Console::default();
        console.set_vdp_interrupt(true);
        assert!(!console.is_interrupt_pending());
        console.write_cru_bit(2, true);
        assert!(console.is_interrupt_pending());
    }
}
