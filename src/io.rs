// Capabilities consumed from the devices that live outside the memory fabric.
//
// The dispatcher never owns a CPU; the CPU passes itself in on every timed
// access so wait states land on the right cycle counter.

/// Wait-state sink. Every timed bus access charges its region cost here.
pub trait Cpu {
    fn add_cycles(&mut self, cycles: u32);
}

/// TMS9918A-style video chip, reached through 0x8800-0x8FFF.
pub trait VideoPort {
    fn read_data(&mut self) -> u8;
    fn read_status(&mut self) -> u8;
    fn write_data(&mut self, value: u8);
    fn write_address(&mut self, value: u8);
}

/// Sound chip, write only, reached through 0x8400-0x85FF.
pub trait SoundPort {
    fn write_data(&mut self, value: u8);
}

/// Speech synthesizer, reached through 0x9000-0x97FF.
pub trait SpeechPort {
    fn read_speech_data(&mut self) -> u8;
    fn write_speech_data(&mut self, value: u8);
}

/// Cassette interface driven by CRU bits 22, 25 and 27.
///
/// `elapsed` is the running CPU-cycle count maintained by the timer, which
/// lets a tape implementation turn bit reads into a waveform position.
pub trait TapeLine {
    fn read(&mut self, elapsed: u64) -> bool;
    fn set_motor_on(&mut self, on: bool);
    fn write(&mut self, value: bool, elapsed: u64);
}

/// Stand-in for any device that is not attached. Reads return 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDevice;

impl VideoPort for NullDevice {
    fn read_data(&mut self) -> u8 {
        0
    }

    fn read_status(&mut self) -> u8 {
        0
    }

    fn write_data(&mut self, _value: u8) {}

    fn write_address(&mut self, _value: u8) {}
}

impl SoundPort for NullDevice {
    fn write_data(&mut self, _value: u8) {}
}

impl SpeechPort for NullDevice {
    fn read_speech_data(&mut self) -> u8 {
        0
    }

    fn write_speech_data(&mut self, _value: u8) {}
}

impl TapeLine for NullDevice {
    fn read(&mut self, _elapsed: u64) -> bool {
        false
    }

    fn set_motor_on(&mut self, _on: bool) {}

    fn write(&mut self, _value: bool, _elapsed: u64) {}
}

/// Plain cycle accumulator, handy for debuggers and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleCounter {
    pub cycles: u64,
}

impl CycleCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cycles counted so far and starts over from zero.
    pub fn take(&mut self) -> u64 {
        std::mem::take(&mut self.cycles)
    }
}

impl Cpu for CycleCounter {
    fn add_cycles(&mut self, cycles: u32) {
        self.cycles += cycles as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_counter_take() {
        let mut cpu = CycleCounter::new();
        cpu.add_cycles(4);
        cpu.add_cycles(23);
        assert_eq!(cpu.take(), 27);
        assert_eq!(cpu.cycles, 0);
    }
}
