use std::{cell::RefCell, rc::Rc};

use tracing_subscriber::fmt;
use ti99mem::{
    AmsMode, CartridgeOptions, Console, ConsoleBuilder, ConsoleState, CycleCounter, MemoryError,
    SaveState, Settings, Snapshot, TapeLine,
};

#[cfg(test)]
#[ctor::ctor]
fn init() {
    let fmt_subscriber = fmt::Subscriber::builder()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(fmt_subscriber)
        .expect("Unable to set global tracing subscriber");
}

/// CRU bits for the AMS card: register access and mapping mode.
const AMS_ACCESS_BIT: u16 = 0x0F00;
const AMS_MODE_BIT: u16 = 0x0F01;

#[derive(Debug, Default)]
struct TapeLog {
    motor: Vec<bool>,
    writes: Vec<(bool, u64)>,
    reads: Vec<u64>,
}

/// Cassette that records every line change; the input goes high once 100
/// cycles have elapsed.
struct RecordingTape(Rc<RefCell<TapeLog>>);

impl TapeLine for RecordingTape {
    fn read(&mut self, elapsed: u64) -> bool {
        self.0.borrow_mut().reads.push(elapsed);
        elapsed >= 100
    }

    fn set_motor_on(&mut self, on: bool) {
        self.0.borrow_mut().motor.push(on);
    }

    fn write(&mut self, value: bool, elapsed: u64) {
        self.0.borrow_mut().writes.push((value, elapsed));
    }
}

fn ams_console() -> Console {
    let settings = Settings {
        enable_ams: true,
        ams_size: 0x10000,
        ..Default::default()
    };
    ConsoleBuilder::new().settings(settings).build().unwrap()
}

fn small_console() -> Console {
    let settings = Settings {
        ams_size: 0x10000,
        ..Default::default()
    };
    ConsoleBuilder::new()
        .settings(settings)
        .rom(&[0x83, 0xE0, 0x00, 0x24])
        .grom(&[0xAA, 0x01, 0x02, 0x03], 0x0000, 0)
        .peripheral_rom(1, &[0xAA, 0x55])
        .build()
        .unwrap()
}

#[test]
fn test_ams_register_interlock() {
    let mut console = ams_console();
    let mut cpu = CycleCounter::new();

    // register access off: writes are dropped and the window reads as DSR space
    console.write_word(0x4004, 0x0500, &mut cpu);
    assert_eq!(console.read_word(0x4004, &mut cpu), 0);

    console.write_cru_bit(AMS_ACCESS_BIT, true);
    assert!(console.memory.ams().is_register_access_enabled());
    console.write_word(0x4004, 0x0500, &mut cpu);
    assert_eq!(console.read_word(0x4004, &mut cpu), 0x0500);
    // the card sees the bus bytes swapped
    console.write_cru_bit(AMS_ACCESS_BIT, false);
    console.write_cru_bit(AMS_ACCESS_BIT, true);
    console.write_word(0x4006, 0x0600, &mut cpu);
    assert_eq!(console.memory.ams().read_register(2), 0x0005);
    assert_eq!(console.memory.ams().read_register(3), 0x0006);
    console.write_cru_bit(AMS_ACCESS_BIT, false);
    assert_eq!(console.read_word(0x4004, &mut cpu), 0);

    console.write_cru_bit(AMS_MODE_BIT, true);
    assert_eq!(console.memory.ams().mode(), AmsMode::Mapping);
    console.write_word(0x2000, 0x1234, &mut cpu);
    // window 3 maps page 6, not the page behind 0x2000
    assert_eq!(console.read_word(0x3000, &mut cpu), 0);

    console.write_cru_bit(AMS_MODE_BIT, false);
    assert_eq!(console.read_word(0x2000, &mut cpu), 0);

    console.write_cru_bit(AMS_MODE_BIT, true);
    assert_eq!(console.read_word(0x2000, &mut cpu), 0x1234);
}

#[test]
fn test_ams_transparent_mode_is_plain_32k() {
    let mut console = ams_console();
    let mut cpu = CycleCounter::new();
    console.write_word(0x2000, 0x1111, &mut cpu);
    console.write_word(0xA000, 0x2222, &mut cpu);
    assert_eq!(console.read_word(0x2000, &mut cpu), 0x1111);
    assert_eq!(console.read_word(0xA000, &mut cpu), 0x2222);
    assert_eq!(console.memory.ams().mode(), AmsMode::Transparent);
}

#[test]
fn test_ams_bits_ignored_without_card() {
    let mut console = small_console();
    console.write_cru_bit(AMS_ACCESS_BIT, true);
    console.write_cru_bit(AMS_MODE_BIT, true);
    assert!(!console.memory.ams().is_register_access_enabled());
    assert_eq!(console.memory.ams().mode(), AmsMode::Transparent);
}

#[test]
fn test_peripheral_rom_select() {
    let mut console = small_console();
    let mut cpu = CycleCounter::new();
    assert_eq!(console.read_word(0x4000, &mut cpu), 0);
    console.write_cru_bit(0x0880, true);
    assert_eq!(console.memory.peripheral_rom(), Some(1));
    assert_eq!(console.read_word(0x4000, &mut cpu), 0xAA55);
    console.write_cru_bit(0x0880, false);
    assert_eq!(console.memory.peripheral_rom(), None);
}

#[test]
fn test_timer_reloads_on_clock_write() {
    let mut console = Console::default();
    console.write_cru_bit(0, true);
    console.write_cru_bit(5, true); // clock register = 0x10
    console.write_cru_bit(0, false);
    assert_eq!(console.cru.clock_register(), 0x10);
    assert_eq!(console.cru.decrementer(), 0x10);

    console.decrement_timer(4);
    assert_eq!(console.cru.decrementer(), 0x0C);

    // any nonzero clock value written reloads the live decrementer
    console.write_cru_bit(0, true);
    console.write_cru_bit(1, true);
    assert_eq!(console.cru.clock_register(), 0x11);
    assert_eq!(console.cru.decrementer(), 0x11);

    // clearing the register leaves the decrementer alone
    console.write_cru_bit(1, false);
    console.write_cru_bit(5, false);
    assert_eq!(console.cru.clock_register(), 0);
    assert_eq!(console.cru.decrementer(), 0x10);
}

#[test]
fn test_timer_read_register_latches_on_entry() {
    let mut console = Console::default();
    console.write_cru_bit(0, true);
    console.write_cru_bit(4, true); // clock register = 8
    console.write_cru_bit(0, false);
    console.decrement_timer(3);

    // entering timer mode latches the decrementer (5)
    console.write_cru_bit(0, true);
    assert!(console.read_cru_bit(0));
    assert!(console.read_cru_bit(1));
    assert!(!console.read_cru_bit(2));
    assert!(console.read_cru_bit(3));

    console.decrement_timer(1);
    assert!(console.read_cru_bit(3));
}

#[test]
fn test_timer_interrupt() {
    let mut console = Console::default();
    console.write_cru_bit(0, true);
    console.write_cru_bit(2, true); // clock register = 2
    console.write_cru_bit(0, false);
    console.write_cru_bit(3, true);
    assert!(!console.is_interrupt_pending());

    console.decrement_timer(2);
    assert!(console.is_timer_interrupt());
    assert!(console.is_interrupt_pending());

    // writing bit 3 acknowledges
    console.write_cru_bit(3, true);
    assert!(!console.is_timer_interrupt());
}

#[test]
fn test_tape_lines_follow_cru_bits() {
    let log = Rc::new(RefCell::new(TapeLog::default()));
    let mut console = ConsoleBuilder::new()
        .tape(Box::new(RecordingTape(log.clone())))
        .build()
        .unwrap();

    console.write_cru_bit(22, true);
    console.decrement_timer(40);
    console.write_cru_bit(25, true);
    assert!(!console.read_cru_bit(27));
    console.decrement_timer(60);
    console.write_cru_bit(25, false);
    assert!(console.read_cru_bit(27));
    console.write_cru_bit(22, false);

    let log = log.borrow();
    assert_eq!(log.motor, vec![true, false]);
    assert_eq!(log.writes, vec![(true, 40), (false, 100)]);
    assert_eq!(log.reads, vec![40, 100]);
}

#[test]
fn test_tape_lines_idle_in_timer_mode() {
    let log = Rc::new(RefCell::new(TapeLog::default()));
    let mut console = ConsoleBuilder::new()
        .tape(Box::new(RecordingTape(log.clone())))
        .build()
        .unwrap();

    // bit 22 in timer mode only drops back to normal mode
    console.write_cru_bit(0, true);
    console.write_cru_bit(22, true);
    assert!(!console.cru.is_timer_mode());
    assert!(log.borrow().motor.is_empty());
}

#[test]
fn test_keyboard_through_console() {
    let mut console = Console::default();
    console.key_down("Digit1");
    let down = (0..8u16)
        .flat_map(|column| (0..8u16).map(move |line| (column, line)))
        .filter(|&(column, line)| {
            console.write_cru_bit(18, column & 1 != 0);
            console.write_cru_bit(19, column & 2 != 0);
            console.write_cru_bit(20, column & 4 != 0);
            console.write_cru_bit(21, true);
            !console.read_cru_bit(3 + line)
        })
        .count();
    assert_eq!(down, 1);

    console.key_up("Digit1");
    assert!(console.read_cru_bit(3));
}

#[test]
fn test_state_round_trip() {
    let mut console = small_console();
    let mut cpu = CycleCounter::new();
    let mut image = vec![0; 0x4000];
    image[0x2000] = 0xCD;
    console
        .memory
        .set_cartridge_image(&image, CartridgeOptions::default())
        .unwrap();
    console.write_word(0x6000, 0x0002, &mut cpu);
    console.write_word(0xA000, 0x1234, &mut cpu);
    console.write_word(0x8300, 0xFEED, &mut cpu);
    console.write_word(0x9C02, 0x0000, &mut cpu);
    console.write_word(0x9C02, 0x0100, &mut cpu);
    console.write_cru_bit(0x0880, true);
    console.write_cru_bit(0, true);
    console.write_cru_bit(3, true);
    console.write_cru_bit(0, false);

    let json = console.get_state().to_json().unwrap();
    let state = ConsoleState::from_json(&json).unwrap();
    assert_eq!(state, console.get_state());

    let mut restored = Console::default();
    restored.restore_state(state).unwrap();
    assert_eq!(restored.status(), console.status());
    for address in [0x0000, 0x4000, 0x6000, 0x8300, 0xA000] {
        assert_eq!(
            restored.memory.get_word(address),
            console.memory.get_word(address),
            "{:04X}",
            address
        );
    }
    assert_eq!(restored.memory.cartridge().unwrap().bank(), 1);
    assert_eq!(restored.cru.clock_register(), console.cru.clock_register());

    // the GROM pipeline carries on where it left off
    assert_eq!(
        restored.read_word(0x9800, &mut cpu),
        console.read_word(0x9800, &mut cpu)
    );
}

#[test]
fn test_state_round_trip_covers_whole_address_space() {
    let settings = Settings {
        enable_ams: true,
        ams_size: 0x10000,
        ..Default::default()
    };
    let mut image = vec![0; 0x4000];
    for (i, byte) in image.iter_mut().enumerate() {
        *byte = (i * 7) as u8;
    }
    let mut console = ConsoleBuilder::new()
        .settings(settings)
        .rom(&[0x83, 0xE0, 0x00, 0x24])
        .build()
        .unwrap();
    let options = CartridgeOptions {
        ram_at_7000: true,
        ram_paged: true,
        ..Default::default()
    };
    console.memory.set_cartridge_image(&image, options).unwrap();
    let mut cpu = CycleCounter::new();

    console.write_cru_bit(AMS_ACCESS_BIT, true);
    console.write_word(0x4004, 0x0500, &mut cpu);
    console.write_word(0x4014, 0x0700, &mut cpu);
    console.write_cru_bit(AMS_MODE_BIT, true);
    console.write_word(0x2000, 0x1234, &mut cpu);
    console.write_word(0xA000, 0x5678, &mut cpu);
    console.write_word(0x6800, 0x0002, &mut cpu);
    console.write_word(0x7000, 0x9ABC, &mut cpu);
    console.write_word(0x8300, 0xFEED, &mut cpu);

    let json = console.get_state().to_json().unwrap();
    let mut restored = Console::default();
    restored
        .restore_state(ConsoleState::from_json(&json).unwrap())
        .unwrap();

    assert_eq!(restored.status(), console.status());
    assert_eq!(restored.memory.ams().mode(), AmsMode::Mapping);
    assert_eq!(restored.memory.cartridge().unwrap().ram_bank(), 1);
    for address in 0..=0xFFFFu16 {
        assert_eq!(
            restored.memory.get_byte(address),
            console.memory.get_byte(address),
            "{:04X}",
            address
        );
    }
    assert_eq!(restored.memory.get_word(0x2000), 0x1234);
    assert_eq!(restored.memory.get_word(0x7000), 0x9ABC);
}

#[test]
fn test_restore_rejects_bad_memory_state() {
    let mut console = small_console();
    let mut cpu = CycleCounter::new();
    console.write_word(0xA000, 0x1234, &mut cpu);
    let status = console.status();

    let mut state = console.get_state();
    state.memory.ram.truncate(0x100);
    state.memory.rom[0] = 0xFF;
    assert!(matches!(
        console.restore_state(state),
        Err(MemoryError::InvalidSnapshot(_))
    ));
    assert_eq!(console.status(), status);
    assert_eq!(console.memory.get_word(0xA000), 0x1234);
    assert_eq!(console.memory.get_word(0x0000), 0x83E0);
}

#[test]
fn test_restore_rejects_bad_cru_without_touching_memory() {
    let mut console = small_console();
    let mut cpu = CycleCounter::new();
    let mut state = console.get_state();
    state.memory.ram[0xA000] = 0x99;
    state.cru.clock_register = 0xFFFF;

    console.write_word(0xA000, 0x1234, &mut cpu);
    assert!(console.restore_state(state).is_err());
    assert_eq!(console.memory.get_word(0xA000), 0x1234);
}

#[test]
fn test_malformed_snapshot_json() {
    assert!(matches!(
        ConsoleState::from_json("{\"memory\": {}}"),
        Err(MemoryError::InvalidSnapshot(_))
    ));
    assert!(matches!(
        ConsoleState::from_json("not json"),
        Err(MemoryError::InvalidSnapshot(_))
    ));
}

#[test]
fn test_console_reset() {
    let mut console = small_console();
    let mut cpu = CycleCounter::new();
    console
        .memory
        .set_cartridge_image(&[0xAB], CartridgeOptions::default())
        .unwrap();
    console.write_cru_bit(0x0880, true);
    console.write_cru_bit(2, true);
    console.write_word(0xA000, 0x1234, &mut cpu);

    console.reset(true);
    assert!(console.memory.cartridge().is_some());
    assert_eq!(console.memory.peripheral_rom(), Some(1));
    assert_eq!(console.memory.get_word(0xA000), 0);
    console.set_vdp_interrupt(true);
    assert!(!console.is_vdp_interrupt());

    console.reset(false);
    assert!(console.memory.cartridge().is_none());
    assert_eq!(console.memory.peripheral_rom(), None);
    assert_eq!(console.memory.get_word(0x0000), 0x83E0);
}
