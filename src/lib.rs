//! Cycle-accurate NES emulator core.
//!
//! The [`Nes`] facade wires together the 6502 interpreter, the PPU dot
//! pipeline, the five-channel APU, the cartridge/mapper layer and the
//! bus that clocks them at the NTSC 3:1 PPU/CPU ratio. Frontends feed
//! in controller state and pull out RGB frames and audio samples.

pub mod apu;
pub mod bus;
pub mod cart;
pub mod controller;
pub mod cpu;
pub mod mapper;
pub mod memory;
pub mod nes;
pub mod opcodes;
pub mod ppu;

pub use cart::{Cartridge, Mirroring, RomError};
pub use controller::Button;
pub use nes::Nes;
