use crate::bus::Bus;
use crate::cart::{Cartridge, RomError};
use crate::cpu::Cpu;

/// The whole console. This is the surface a frontend drives: load a
/// ROM, push controller state in, pull frames and audio samples out.
pub struct Nes {
    pub cpu: Cpu,
    pub bus: Bus,
}

impl Nes {
    pub fn new() -> Self {
        Nes {
            cpu: Cpu::new(),
            bus: Bus::new(),
        }
    }

    /// Parse an iNES / NES 2.0 image, install it and reset the machine.
    pub fn load_rom(&mut self, bytes: &[u8]) -> Result<(), RomError> {
        let cart = Cartridge::new(bytes)?;
        self.bus.insert_cartridge(cart);
        self.reset();
        Ok(())
    }

    pub fn reset(&mut self) {
        self.bus.reset();
        self.cpu.reset(&mut self.bus);
    }

    /// One system (PPU) clock. Returns true when the tick finished a
    /// frame.
    pub fn clock(&mut self) -> bool {
        self.bus.tick(&mut self.cpu);
        self.bus.ppu.take_frame_ready()
    }

    /// Run until the PPU reports a completed frame.
    pub fn step_frame(&mut self) {
        while !self.clock() {}
    }

    /// 256x240 packed RGB, row-major from the top left.
    pub fn framebuffer(&self) -> &[u8] {
        self.bus.ppu.framebuffer()
    }

    /// Instantaneous APU mix.
    pub fn sample(&self) -> f32 {
        self.bus.apu.sample()
    }

    /// `state` packs the buttons A, B, Select, Start, Up, Down, Left,
    /// Right into bits 7..0.
    pub fn set_controller(&mut self, index: usize, state: u8) {
        self.bus.set_controller_state(index, state);
    }
}

impl Default for Nes {
    fn default() -> Self {
        Nes::new()
    }
}
