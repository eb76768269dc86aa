use crate::apu::Apu;
use crate::cart::Cartridge;
use crate::controller::Controller;
use crate::cpu::Cpu;
use crate::memory::Memory;
use crate::ppu::Ppu;

#[derive(Default)]
struct OamDma {
    active: bool,
    page: u8,
    addr: u8,
    data: u8,
    dummy: bool,
}

/// The system interconnect: 2 KiB of work RAM, the PPU and APU
/// register windows, both controllers, OAM DMA and the 3:1 PPU/CPU
/// clock ratio all live here.
pub struct Bus {
    pub ppu: Ppu,
    pub apu: Apu,
    pub cart: Cartridge,
    ram: [u8; 2048],
    controllers: [Controller; 2],
    system_clock: u64,
    dma: OamDma,
}

impl Bus {
    pub fn new() -> Self {
        Bus {
            ppu: Ppu::new(),
            apu: Apu::new(),
            cart: Cartridge::empty(),
            ram: [0; 2048],
            controllers: [Controller::new(), Controller::new()],
            system_clock: 0,
            dma: OamDma {
                dummy: true,
                ..OamDma::default()
            },
        }
    }

    pub fn insert_cartridge(&mut self, cart: Cartridge) {
        self.cart = cart;
    }

    pub fn reset(&mut self) {
        self.ppu.reset();
        self.apu.reset();
        self.cart.reset();
        self.system_clock = 0;
        self.dma = OamDma {
            dummy: true,
            ..OamDma::default()
        };
    }

    pub fn system_clock(&self) -> u64 {
        self.system_clock
    }

    pub fn dma_in_progress(&self) -> bool {
        self.dma.active
    }

    pub fn set_controller_state(&mut self, index: usize, state: u8) {
        if let Some(controller) = self.controllers.get_mut(index) {
            controller.set_state(state);
        }
    }

    pub fn cpu_read(&mut self, addr: u16) -> u8 {
        // The cartridge sees every address first; PRG RAM and ROM
        // claims short-circuit the rest of the map.
        if let Some(data) = self.cart.cpu_read(addr) {
            return data;
        }

        match addr {
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize],
            0x2000..=0x3FFF => self.ppu.cpu_read(&mut self.cart, addr),
            0x4015 => self.apu.read_status(),
            0x4016 => self.controllers[0].read(),
            0x4017 => self.controllers[1].read(),
            _ => 0,
        }
    }

    pub fn cpu_write(&mut self, addr: u16, data: u8) {
        if self.cart.cpu_write(addr, data) {
            return;
        }

        match addr {
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize] = data,
            0x2000..=0x3FFF => self.ppu.cpu_write(&mut self.cart, addr, data),
            0x4000..=0x4013 | 0x4015 | 0x4017 => self.apu.write_register(addr, data),
            0x4014 => {
                self.dma.page = data;
                self.dma.addr = 0;
                self.dma.active = true;
            }
            0x4016 => {
                self.controllers[0].write(data);
                self.controllers[1].write(data);
            }
            _ => {}
        }
    }

    /// One system step: the PPU always advances, the CPU and APU every
    /// third step, and interrupt lines are sampled at the end.
    pub fn tick(&mut self, cpu: &mut Cpu) {
        self.ppu.tick(&mut self.cart);

        if self.system_clock % 3 == 0 {
            if self.dma.active {
                self.dma_step();
            } else {
                cpu.tick(self);
            }

            if let Some(addr) = self.apu.tick() {
                let sample = self.cpu_read(addr);
                self.apu.provide_dmc_sample(sample);
            }
        }

        if self.ppu.take_nmi() {
            cpu.nmi(self);
        }

        if self.cart.irq_state() {
            self.cart.irq_clear();
            cpu.irq(self);
        }

        self.system_clock += 1;
    }

    /// OAM DMA burns CPU slots: an alignment cycle (two if the
    /// transfer starts on an even slot), then alternating read/write
    /// cycles until all 256 bytes have landed in OAM.
    fn dma_step(&mut self) {
        if self.dma.dummy {
            if self.system_clock % 2 == 1 {
                self.dma.dummy = false;
            }
        } else if self.system_clock % 2 == 0 {
            let addr = ((self.dma.page as u16) << 8) | self.dma.addr as u16;
            self.dma.data = self.cpu_read(addr);
        } else {
            self.ppu.cpu_write(&mut self.cart, 0x2004, self.dma.data);
            self.dma.addr = self.dma.addr.wrapping_add(1);
            if self.dma.addr == 0 {
                self.dma.active = false;
                self.dma.dummy = true;
            }
        }
    }
}

impl Memory for Bus {
    fn read(&mut self, addr: u16) -> u8 {
        self.cpu_read(addr)
    }

    fn write(&mut self, addr: u16, data: u8) {
        self.cpu_write(addr, data)
    }
}

impl Default for Bus {
    fn default() -> Self {
        Bus::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ram_mirrors_every_2k() {
        let mut bus = Bus::new();
        bus.cpu_write(0x0000, 0x42);
        assert_eq!(bus.cpu_read(0x0800), 0x42);
        assert_eq!(bus.cpu_read(0x1000), 0x42);
        assert_eq!(bus.cpu_read(0x1800), 0x42);
    }

    #[test]
    fn ppu_registers_mirror_every_8_bytes() {
        let mut bus = Bus::new();
        bus.cpu_write(0x2003, 0x20);
        bus.cpu_write(0x2004, 0x55);
        // $200C aliases $2004.
        bus.cpu_write(0x2003, 0x20);
        assert_eq!(bus.cpu_read(0x200C), 0x55);
    }

    #[test]
    fn controller_strobe_and_shift() {
        let mut bus = Bus::new();
        bus.set_controller_state(0, 0b1010_0000);
        bus.cpu_write(0x4016, 1);
        bus.cpu_write(0x4016, 0);
        assert_eq!(bus.cpu_read(0x4016), 1);
        assert_eq!(bus.cpu_read(0x4016), 0);
        assert_eq!(bus.cpu_read(0x4016), 1);
    }

    #[test]
    fn open_bus_reads_zero() {
        let mut bus = Bus::new();
        assert_eq!(bus.cpu_read(0x5000), 0);
        assert_eq!(bus.cpu_read(0x4018), 0);
    }

    #[test]
    fn writing_4014_starts_dma() {
        let mut bus = Bus::new();
        bus.cpu_write(0x4014, 0x02);
        assert!(bus.dma_in_progress());
    }
}
