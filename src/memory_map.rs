// +-----------------+---------------------------------------------------+
// | Range           | Description                                       |
// +-----------------+---------------------------------------------------+
// | 0x0000 - 0x1FFF | Console ROM                                       |
// | 0x2000 - 0x3FFF | Low memory expansion (32K RAM / AMS)              |
// | 0x4000 - 0x5FFF | Peripheral DSR ROM / AMS page registers           |
// | 0x6000 - 0x6FFF | Cartridge ROM (or RAM)                            |
// | 0x7000 - 0x7FFF | Cartridge ROM (or RAM, possibly paged)            |
// | 0x8000 - 0x83FF | Scratchpad RAM, 256 bytes mirrored 4 times        |
// | 0x8400 - 0x85FF | Sound chip                                        |
// | 0x8600 - 0x87FF | Unused                                            |
// | 0x8800 - 0x8BFF | VDP read data / status                            |
// | 0x8C00 - 0x8FFF | VDP write data / address                          |
// | 0x9000 - 0x93FF | Speech read                                       |
// | 0x9400 - 0x97FF | Speech write                                      |
// | 0x9800 - 0x9BFF | GROM read data / address                          |
// | 0x9C00 - 0x9FFF | GROM write data / address                         |
// | 0xA000 - 0xFFFF | High memory expansion (32K RAM / AMS)             |
// +-----------------+---------------------------------------------------+
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    Rom,
    Ram,
    PeripheralRom,
    CartridgeRom,
    CartridgeRam,
    Scratchpad,
    Sound,
    Unmapped,
    VdpRead,
    VdpWrite,
    SpeechRead,
    SpeechWrite,
    GromRead,
    GromWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadHandler {
    Rom,
    Ram,
    PeripheralRom,
    CartridgeRom,
    CartridgeRam,
    Scratchpad,
    Vdp,
    Speech,
    Grom,
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteHandler {
    Rom,
    Ram,
    PeripheralRom,
    CartridgeRom,
    CartridgeRam,
    Scratchpad,
    Sound,
    Vdp,
    Speech,
    Grom,
    Null,
}

impl Region {
    pub fn handlers(self) -> (ReadHandler, WriteHandler) {
        match self {
            Region::Rom => (ReadHandler::Rom, WriteHandler::Rom),
            Region::Ram => (ReadHandler::Ram, WriteHandler::Ram),
            Region::PeripheralRom => (ReadHandler::PeripheralRom, WriteHandler::PeripheralRom),
            Region::CartridgeRom => (ReadHandler::CartridgeRom, WriteHandler::CartridgeRom),
            Region::CartridgeRam => (ReadHandler::CartridgeRam, WriteHandler::CartridgeRam),
            Region::Scratchpad => (ReadHandler::Scratchpad, WriteHandler::Scratchpad),
            Region::Sound => (ReadHandler::Null, WriteHandler::Sound),
            Region::Unmapped => (ReadHandler::Null, WriteHandler::Null),
            Region::VdpRead => (ReadHandler::Vdp, WriteHandler::Null),
            Region::VdpWrite => (ReadHandler::Null, WriteHandler::Vdp),
            Region::SpeechRead => (ReadHandler::Speech, WriteHandler::Null),
            Region::SpeechWrite => (ReadHandler::Null, WriteHandler::Speech),
            Region::GromRead => (ReadHandler::Grom, WriteHandler::Null),
            Region::GromWrite => (ReadHandler::Null, WriteHandler::Grom),
        }
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct MemorySegment {
    pub start: u16,
    pub end: u16,
    pub region: Region,
}

impl MemorySegment {
    const fn new(start: u16, end: u16, region: Region) -> Self {
        Self { start, end, region }
    }

    pub fn contains(&self, address: u16) -> bool {
        (self.start..=self.end).contains(&address)
    }
}

impl fmt::Display for MemorySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X} - 0x{:04X} - {:?}", self.start, self.end, self.region)
    }
}

/// The region layout for the given cartridge RAM placement. Segments are
/// sorted and cover 0x0000-0xFFFF without gaps.
pub fn memory_segments(ram_at_6000: bool, ram_at_7000: bool) -> Vec<MemorySegment> {
    let cart = |ram: bool| {
        if ram {
            Region::CartridgeRam
        } else {
            Region::CartridgeRom
        }
    };

    vec![
        MemorySegment::new(0x0000, 0x1FFF, Region::Rom),
        MemorySegment::new(0x2000, 0x3FFF, Region::Ram),
        MemorySegment::new(0x4000, 0x5FFF, Region::PeripheralRom),
        MemorySegment::new(0x6000, 0x6FFF, cart(ram_at_6000)),
        MemorySegment::new(0x7000, 0x7FFF, cart(ram_at_7000)),
        MemorySegment::new(0x8000, 0x83FF, Region::Scratchpad),
        MemorySegment::new(0x8400, 0x85FF, Region::Sound),
        MemorySegment::new(0x8600, 0x87FF, Region::Unmapped),
        MemorySegment::new(0x8800, 0x8BFF, Region::VdpRead),
        MemorySegment::new(0x8C00, 0x8FFF, Region::VdpWrite),
        MemorySegment::new(0x9000, 0x93FF, Region::SpeechRead),
        MemorySegment::new(0x9400, 0x97FF, Region::SpeechWrite),
        MemorySegment::new(0x9800, 0x9BFF, Region::GromRead),
        MemorySegment::new(0x9C00, 0x9FFF, Region::GromWrite),
        MemorySegment::new(0xA000, 0xFFFF, Region::Ram),
    ]
}

/// One handler pair per word address.
#[derive(Clone)]
pub struct MemoryMap {
    entries: Box<[(ReadHandler, WriteHandler)]>,
    segments: Vec<MemorySegment>,
}

impl fmt::Debug for MemoryMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryMap")
            .field("segments", &self.segments)
            .finish()
    }
}

impl MemoryMap {
    pub fn new(ram_at_6000: bool, ram_at_7000: bool) -> Self {
        let segments = memory_segments(ram_at_6000, ram_at_7000);
        let mut entries = vec![(ReadHandler::Null, WriteHandler::Null); 0x8000];
        for segment in &segments {
            let handlers = segment.region.handlers();
            let start = segment.start as usize >> 1;
            let end = segment.end as usize >> 1;
            entries[start..=end].fill(handlers);
        }

        Self {
            entries: entries.into_boxed_slice(),
            segments,
        }
    }

    pub fn handlers(&self, address: u16) -> (ReadHandler, WriteHandler) {
        self.entries[address as usize >> 1]
    }

    pub fn segments(&self) -> &[MemorySegment] {
        &self.segments
    }

    pub fn region(&self, address: u16) -> Region {
        self.segments
            .iter()
            .find(|s| s.contains(address))
            .map_or(Region::Unmapped, |s| s.region)
    }
}
