pub mod axrom;
pub mod camerica;
pub mod cnrom;
pub mod color_dreams;
pub mod gxrom;
pub mod mmc1;
pub mod mmc2;
pub mod mmc3;
pub mod mmc4;
pub mod namco108;
pub mod nrom;
pub mod uxrom;

use crate::cart::Mirroring;

use axrom::AxromMapper;
use camerica::CamericaMapper;
use cnrom::CnromMapper;
use color_dreams::ColorDreamsMapper;
use gxrom::GxromMapper;
use mmc1::Mmc1Mapper;
use mmc2::Mmc2Mapper;
use mmc3::Mmc3Mapper;
use mmc4::Mmc4Mapper;
use namco108::Namco108Mapper;
use nrom::NromMapper;
use uxrom::UxromMapper;

/// Bank-switching policy for one cartridge board.
///
/// The cartridge owns the PRG and CHR buffers and hands them in on each
/// access; the mapper holds only its banking registers. A `None` / `false`
/// return means the address is not the cartridge's business and the bus
/// (or PPU) applies its default behavior.
pub trait Mapper {
    fn cpu_read(&self, addr: u16, prg_rom: &[u8]) -> Option<u8>;

    fn cpu_write(&mut self, addr: u16, data: u8) -> bool;

    /// Takes `&mut self` because some boards (MMC2/MMC4) switch banks as
    /// a side effect of pattern-table reads.
    fn ppu_read(&mut self, addr: u16, chr: &[u8]) -> Option<u8>;

    fn ppu_write(&mut self, addr: u16, data: u8, chr: &mut [u8]) -> bool;

    fn reset(&mut self);

    /// Mapper-controlled mirroring; `None` defers to the header wiring.
    fn mirroring(&self) -> Option<Mirroring> {
        None
    }

    fn irq_state(&self) -> bool {
        false
    }

    fn irq_clear(&mut self) {}

    /// Called once per rendered scanline while rendering is enabled.
    fn scanline(&mut self) {}

    fn prg_ram(&self) -> Option<&[u8]> {
        None
    }

    fn prg_ram_mut(&mut self) -> Option<&mut [u8]> {
        None
    }
}

/// Build the mapper for an iNES mapper id. Unknown ids fall back to
/// NROM so a misdetected ROM still boots instead of failing the load.
pub fn create(mapper_id: u16, prg_banks: usize, chr_banks: usize) -> Box<dyn Mapper> {
    match mapper_id {
        0 => Box::new(NromMapper::new(prg_banks, chr_banks)),
        1 => Box::new(Mmc1Mapper::new(prg_banks, chr_banks)),
        2 => Box::new(UxromMapper::new(prg_banks)),
        3 => Box::new(CnromMapper::new(prg_banks, chr_banks)),
        4 => Box::new(Mmc3Mapper::new(prg_banks, chr_banks)),
        7 => Box::new(AxromMapper::new(prg_banks)),
        9 => Box::new(Mmc2Mapper::new(prg_banks)),
        10 => Box::new(Mmc4Mapper::new(prg_banks)),
        11 => Box::new(ColorDreamsMapper::new(prg_banks, chr_banks)),
        66 => Box::new(GxromMapper::new(prg_banks, chr_banks)),
        71 => Box::new(CamericaMapper::new(prg_banks)),
        206 => Box::new(Namco108Mapper::new(prg_banks, chr_banks)),
        _ => {
            log::warn!("unsupported mapper {mapper_id}, falling back to NROM");
            Box::new(NromMapper::new(prg_banks, chr_banks))
        }
    }
}
