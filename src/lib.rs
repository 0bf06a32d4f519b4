pub mod ams;
pub mod cartridge;
pub mod console;
pub mod cru;
pub mod error;
pub mod grom;
pub mod io;
pub mod keyboard;
pub mod memory;
pub mod memory_map;
pub mod settings;
pub mod state;
pub mod utils;

pub use ams::{Ams, AmsMode};
pub use cartridge::{Cartridge, CartridgeOptions};
pub use console::{Console, ConsoleBuilder, ConsoleState};
pub use cru::{DsrControl, Tms9901};
pub use error::MemoryError;
pub use io::{Cpu, CycleCounter, NullDevice, SoundPort, SpeechPort, TapeLine, VideoPort};
pub use memory::{Devices, Memory, MemoryState};
pub use settings::Settings;
pub use state::{SaveState, Snapshot};
pub use utils::hexdump;

use tracing_subscriber::EnvFilter;
use wasm_bindgen::prelude::*;

/// Installs a `fmt` subscriber for native embedders, e.g.
/// `init_tracing("ti99mem=debug")`.
pub fn init_tracing(directives: &str) -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directives))
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn js_error(e: impl std::fmt::Display) -> JsError {
    JsError::new(&e.to_string())
}

#[wasm_bindgen(js_name = Console)]
pub struct JsConsole {
    console: Console,
    cpu: CycleCounter,
}

#[wasm_bindgen(js_class = Console)]
impl JsConsole {
    #[wasm_bindgen(constructor)]
    pub fn new(rom: &[u8], grom: &[u8], settings: &str) -> Result<JsConsole, JsError> {
        console_error_panic_hook::set_once();
        let _ = tracing_wasm::try_set_as_global_default();

        let settings = if settings.is_empty() {
            Settings::default()
        } else {
            Settings::from_json(settings).map_err(js_error)?
        };
        let console = ConsoleBuilder::new()
            .settings(settings)
            .rom(rom)
            .grom(grom, 0x0000, 0)
            .build()
            .map_err(js_error)?;

        Ok(Self {
            console,
            cpu: CycleCounter::new(),
        })
    }

    #[wasm_bindgen(js_name = loadCartridge)]
    pub fn load_cartridge(
        &mut self,
        image: &[u8],
        inverted: bool,
        ram_at_6000: bool,
        ram_at_7000: bool,
        ram_paged: bool,
    ) -> Result<(), JsError> {
        let options = CartridgeOptions {
            inverted,
            ram_at_6000,
            ram_at_7000,
            ram_paged,
        };
        self.console
            .memory
            .set_cartridge_image(image, options)
            .map_err(js_error)
    }

    #[wasm_bindgen(js_name = loadCartridgeGrom)]
    pub fn load_cartridge_grom(&mut self, data: &[u8], base: usize) -> Result<(), JsError> {
        self.console
            .memory
            .load_grom(data, 0x6000, base)
            .map_err(js_error)
    }

    pub fn reset(&mut self, keep_cartridge: bool) {
        self.console.reset(keep_cartridge);
    }

    #[wasm_bindgen(js_name = readWord)]
    pub fn read_word(&mut self, address: u16) -> u16 {
        self.console.read_word(address, &mut self.cpu)
    }

    #[wasm_bindgen(js_name = writeWord)]
    pub fn write_word(&mut self, address: u16, value: u16) {
        self.console.write_word(address, value, &mut self.cpu)
    }

    /// Wait states charged since the last call.
    #[wasm_bindgen(js_name = takeCycles)]
    pub fn take_cycles(&mut self) -> u32 {
        self.cpu.take() as u32
    }

    #[wasm_bindgen(js_name = peekByte)]
    pub fn peek_byte(&self, address: u16) -> u8 {
        self.console.memory.get_byte(address)
    }

    #[wasm_bindgen(js_name = keyDown)]
    pub fn key_down(&mut self, key: String) {
        self.console.key_down(&key);
    }

    #[wasm_bindgen(js_name = keyUp)]
    pub fn key_up(&mut self, key: String) {
        self.console.key_up(&key);
    }

    pub fn hexdump(&self, start: u16, end: u16) -> String {
        self.console.memory.hexdump(start, end)
    }

    #[wasm_bindgen(getter)]
    pub fn status(&self) -> String {
        self.console.status()
    }

    #[wasm_bindgen(js_name = saveState)]
    pub fn save_state(&self) -> Result<String, JsError> {
        self.console.get_state().to_json().map_err(js_error)
    }

    #[wasm_bindgen(js_name = restoreState)]
    pub fn restore_state(&mut self, json: &str) -> Result<(), JsError> {
        let state = ConsoleState::from_json(json).map_err(js_error)?;
        self.console.restore_state(state).map_err(js_error)
    }
}
