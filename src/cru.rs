//! TMS9901 programmable systems interface on the CRU bus.
//!
//! CRU bits below 0x800 belong to the 9901: interrupt masks, keyboard
//! scanning, cassette lines and the interval timer. Bits from 0x800 up
//! address the peripheral cards and are forwarded to the memory through
//! `DsrControl`.
//!
//! | Bit   | Normal mode read        | Normal mode write        |
//! |-------|-------------------------|--------------------------|
//! | 0     | mode                    | 1 = enter timer mode     |
//! | 2     | VDP interrupt (low)     | VDP interrupt mask       |
//! | 3     | keyboard line 0         | timer mask / acknowledge |
//! | 3-10  | keyboard lines 0-7      |                          |
//! | 18-20 |                         | keyboard column select   |
//! | 21    |                         | alpha lock select (low)  |
//! | 22    |                         | cassette motor           |
//! | 25    |                         | cassette output          |
//! | 27    | cassette input          |                          |
//!
//! In timer mode bits 1-14 are the clock register and bit 15 is the timer
//! interrupt status.

use derivative::Derivative;
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;
use tracing::{trace, warn};

use crate::{
    ams::AmsMode,
    error::{MemoryError, Result},
    io::{NullDevice, TapeLine},
    keyboard::Keyboard,
    state::{SaveState, Snapshot},
};

pub const CRU_BITS: usize = 0x1000;

/// First CRU bit of the peripheral card space.
pub const DSR_SPACE: u16 = 0x0800;

const CLOCK_MASK: u16 = 0x3FFF;

/// The parts of the memory that peripheral-card CRU bits switch.
pub trait DsrControl {
    fn set_peripheral_rom(&mut self, number: u8, enabled: bool);
    fn is_ams_enabled(&self) -> bool;
    fn set_ams_register_access(&mut self, enabled: bool);
    fn set_ams_mode(&mut self, mode: AmsMode);
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Tms9901 {
    #[derivative(Debug = "ignore")]
    bits: [bool; CRU_BITS],
    timer_mode: bool,
    clock_register: u16,
    read_register: u16,
    decrementer: i32,
    timer_interrupt: bool,
    vdp_interrupt: bool,
    elapsed: u64,
    #[derivative(Debug = "ignore")]
    keyboard: Keyboard,
    #[derivative(Debug = "ignore")]
    tape: Box<dyn TapeLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CruState {
    #[serde(with = "BigArray")]
    pub bits: [bool; CRU_BITS],
    pub timer_mode: bool,
    pub clock_register: u16,
    pub read_register: u16,
    pub decrementer: i32,
    pub timer_interrupt: bool,
    pub vdp_interrupt: bool,
    pub elapsed: u64,
}

impl Snapshot for CruState {}

impl Default for Tms9901 {
    fn default() -> Self {
        Self::new()
    }
}

impl Tms9901 {
    pub fn new() -> Self {
        Self::with_tape(Box::new(NullDevice))
    }

    pub fn with_tape(tape: Box<dyn TapeLine>) -> Self {
        Tms9901 {
            bits: [false; CRU_BITS],
            timer_mode: false,
            clock_register: 0,
            read_register: 0,
            decrementer: 0,
            timer_interrupt: false,
            vdp_interrupt: false,
            elapsed: 0,
            keyboard: Keyboard::new(),
            tape,
        }
    }

    pub fn reset(&mut self) {
        self.bits = [false; CRU_BITS];
        self.timer_mode = false;
        self.clock_register = 0;
        self.read_register = 0;
        self.decrementer = 0;
        self.timer_interrupt = false;
        self.vdp_interrupt = false;
        self.elapsed = 0;
        self.keyboard.release_all();
    }

    pub fn keyboard(&self) -> &Keyboard {
        &self.keyboard
    }

    pub fn keyboard_mut(&mut self) -> &mut Keyboard {
        &mut self.keyboard
    }

    pub fn is_timer_mode(&self) -> bool {
        self.timer_mode
    }

    pub fn clock_register(&self) -> u16 {
        self.clock_register
    }

    pub fn decrementer(&self) -> i32 {
        self.decrementer
    }

    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    fn keyboard_column(&self) -> u8 {
        self.bits[18] as u8 | (self.bits[19] as u8) << 1 | (self.bits[20] as u8) << 2
    }

    pub fn read_bit(&mut self, addr: u16) -> bool {
        let addr = addr as usize & (CRU_BITS - 1);
        if self.timer_mode {
            match addr {
                0 => return true,
                1..=14 => return self.read_register & (1 << (addr - 1)) != 0,
                15 => return self.timer_interrupt,
                _ => {}
            }
        } else {
            match addr {
                2 => return !self.vdp_interrupt,
                3..=10 => {
                    let line = (addr - 3) as u8;
                    let alpha_lock =
                        addr == 7 && !self.bits[21] && self.keyboard.is_alpha_lock_down();
                    let down = alpha_lock || self.keyboard.is_key_down(self.keyboard_column(), line);
                    return !down;
                }
                27 => return self.tape.read(self.elapsed),
                _ => {}
            }
        }
        self.bits[addr]
    }

    pub fn write_bit(&mut self, addr: u16, value: bool, dsr: &mut dyn DsrControl) {
        let addr = addr & (CRU_BITS as u16 - 1);
        if addr >= DSR_SPACE {
            self.write_dsr_bit(addr, value, dsr);
            self.bits[addr as usize] = value;
            return;
        }

        if addr == 0 {
            self.timer_mode = value;
            if value {
                self.read_register = self.decrementer as u16 & CLOCK_MASK;
            }
        } else if self.timer_mode {
            match addr {
                1..=14 => {
                    let mask = 1 << (addr - 1);
                    if value {
                        self.clock_register |= mask;
                    } else {
                        self.clock_register &= !mask;
                    }
                    // the live decrementer follows every clock register write
                    if self.clock_register != 0 {
                        self.decrementer = self.clock_register as i32;
                    }
                    trace!("[CRU] Clock register {:04X}", self.clock_register);
                    return;
                }
                15 => {
                    if !value {
                        warn!("[CRU] Soft reset requested, ignored");
                    }
                    return;
                }
                _ => {
                    self.timer_mode = false;
                }
            }
        } else {
            match addr {
                3 => self.timer_interrupt = false,
                22 => self.tape.set_motor_on(value),
                25 => self.tape.write(value, self.elapsed),
                _ => {}
            }
        }
        self.bits[addr as usize] = value;
    }

    fn write_dsr_bit(&mut self, addr: u16, value: bool, dsr: &mut dyn DsrControl) {
        let addr = addr << 1;
        if addr & 0x00FF == 0 {
            let number = ((addr & 0x0F00) >> 8) as u8;
            trace!("[CRU] DSR {:X} {}", number, if value { "on" } else { "off" });
            dsr.set_peripheral_rom(number, value);
        }
        if addr & 0xFF00 == 0x1E00 && dsr.is_ams_enabled() {
            match (addr & 0x000E) >> 1 {
                0 => dsr.set_ams_register_access(value),
                1 => dsr.set_ams_mode(if value {
                    AmsMode::Mapping
                } else {
                    AmsMode::Transparent
                }),
                _ => {}
            }
        }
    }

    /// Counts the timer down by `cycles`. Called by the frame driver, usually
    /// once per scanline.
    pub fn decrement_timer(&mut self, cycles: u32) {
        if self.clock_register != 0 {
            let delta = i32::try_from(cycles).unwrap_or(i32::MAX);
            self.decrementer = self.decrementer.saturating_sub(delta);
            if self.decrementer <= 0 {
                self.decrementer = self.clock_register as i32;
                self.timer_interrupt = true;
            }
        }
        self.elapsed += cycles as u64;
    }

    pub fn set_vdp_interrupt(&mut self, value: bool) {
        self.vdp_interrupt = value;
    }

    pub fn is_vdp_interrupt(&self) -> bool {
        self.vdp_interrupt && self.bits[2]
    }

    pub fn is_timer_interrupt(&self) -> bool {
        self.timer_interrupt && self.bits[3]
    }
}

impl SaveState for Tms9901 {
    type State = CruState;

    fn get_state(&self) -> CruState {
        CruState {
            bits: self.bits,
            timer_mode: self.timer_mode,
            clock_register: self.clock_register,
            read_register: self.read_register,
            decrementer: self.decrementer,
            timer_interrupt: self.timer_interrupt,
            vdp_interrupt: self.vdp_interrupt,
            elapsed: self.elapsed,
        }
    }

    fn restore_state(&mut self, state: CruState) -> Result<()> {
        Self::validate_state(&state)?;
        self.bits = state.bits;
        self.timer_mode = state.timer_mode;
        self.clock_register = state.clock_register;
        self.read_register = state.read_register;
        self.decrementer = state.decrementer;
        self.timer_interrupt = state.timer_interrupt;
        self.vdp_interrupt = state.vdp_interrupt;
        self.elapsed = state.elapsed;
        Ok(())
    }
}

impl Tms9901 {
    pub(crate) fn validate_state(state: &CruState) -> Result<()> {
        if state.clock_register > CLOCK_MASK {
            return Err(MemoryError::InvalidSnapshot(format!(
                "clock register {:04X} wider than 14 bits",
                state.clock_register
            )));
        }
        Ok(())
    }
}
