use core::fmt;

use crate::mapper::{self, Mapper};

const NES_TAG: [u8; 4] = [0x4E, 0x45, 0x53, 0x1A];
const PRG_ROM_PAGE_SIZE: usize = 16384;
const CHR_ROM_PAGE_SIZE: usize = 8192;
const PRG_RAM_SIZE: usize = 8192;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Mirroring {
    Vertical,
    Horizontal,
    FourScreen,
    SingleScreenLower,
    SingleScreenUpper,
}

/// Load-time failures. Steady-state emulation never fails; everything
/// that can go wrong goes wrong while parsing the ROM image.
#[derive(Debug, PartialEq, Eq)]
pub enum RomError {
    /// Missing `NES\x1A` magic or a file shorter than the header.
    InvalidHeader,
    /// The header declares more PRG ROM than the file contains.
    Truncated { expected: usize, actual: usize },
}

impl fmt::Display for RomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RomError::InvalidHeader => write!(f, "not an iNES / NES 2.0 image"),
            RomError::Truncated { expected, actual } => {
                write!(
                    f,
                    "ROM truncated: header declares {expected} bytes of PRG ROM, file has {actual}"
                )
            }
        }
    }
}

impl std::error::Error for RomError {}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RomFormat {
    INes,
    Nes2,
}

fn nes2_prg_banks(lsb: u8, msb_nibble: u8) -> usize {
    if msb_nibble == 0x0F {
        // Exponent-multiplier notation.
        let multiplier = (lsb & 0x03) as usize * 2 + 1;
        let exponent = (lsb >> 2) & 0x3F;
        ((1usize << exponent) * multiplier) / PRG_ROM_PAGE_SIZE
    } else {
        ((msb_nibble as usize) << 8) | lsb as usize
    }
}

fn nes2_chr_banks(lsb: u8, msb_nibble: u8) -> usize {
    if msb_nibble == 0x0F {
        let multiplier = (lsb & 0x03) as usize * 2 + 1;
        let exponent = (lsb >> 2) & 0x3F;
        ((1usize << exponent) * multiplier) / CHR_ROM_PAGE_SIZE
    } else {
        ((msb_nibble as usize) << 8) | lsb as usize
    }
}

/// A parsed cartridge: PRG ROM, CHR ROM or RAM, and the mapper that
/// decides how the address space maps onto them.
pub struct Cartridge {
    mapper: Box<dyn Mapper>,
    prg_rom: Vec<u8>,
    chr: Vec<u8>,
    mapper_id: u16,
    format: RomFormat,
    header_mirroring: Mirroring,
    battery_backed: bool,
}

impl Cartridge {
    pub fn new(raw: &[u8]) -> Result<Cartridge, RomError> {
        if raw.len() < 16 || raw[0..4] != NES_TAG {
            return Err(RomError::InvalidHeader);
        }

        let format = if (raw[7] & 0x0C) == 0x08 {
            RomFormat::Nes2
        } else {
            RomFormat::INes
        };

        // Bytes 12-15 nonzero means a dirty iNES header ("DiskDude!");
        // the upper mapper nibble is garbage in that case.
        let dirty_header =
            format == RomFormat::INes && raw[12..16].iter().any(|&b| b != 0);

        let (prg_banks, chr_banks, mapper_id) = match format {
            RomFormat::INes => {
                let hi = if dirty_header { 0 } else { raw[7] >> 4 };
                let id = ((hi as u16) << 4) | (raw[6] >> 4) as u16;
                (raw[4] as usize, raw[5] as usize, id)
            }
            RomFormat::Nes2 => {
                let id = ((raw[8] as u16 & 0x0F) << 8)
                    | ((raw[7] as u16 & 0xF0))
                    | (raw[6] >> 4) as u16;
                (
                    nes2_prg_banks(raw[4], raw[9] & 0x0F),
                    nes2_chr_banks(raw[5], raw[9] >> 4),
                    id,
                )
            }
        };

        let header_mirroring = if raw[6] & 0x08 != 0 {
            Mirroring::FourScreen
        } else if raw[6] & 0x01 != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };
        let battery_backed = raw[6] & 0x02 != 0;
        let has_trainer = raw[6] & 0x04 != 0;

        let prg_start = 16 + if has_trainer { 512 } else { 0 };
        let prg_size = prg_banks * PRG_ROM_PAGE_SIZE;
        if prg_start + prg_size > raw.len() {
            return Err(RomError::Truncated {
                expected: prg_size,
                actual: raw.len().saturating_sub(prg_start),
            });
        }
        let prg_rom = raw[prg_start..prg_start + prg_size].to_vec();

        let chr_start = prg_start + prg_size;
        let chr = if chr_banks == 0 {
            // No CHR ROM on the board: 8 KiB of CHR RAM instead.
            vec![0; CHR_ROM_PAGE_SIZE]
        } else {
            let chr_size = chr_banks * CHR_ROM_PAGE_SIZE;
            let available = raw.len().saturating_sub(chr_start).min(chr_size);
            if available < chr_size {
                log::warn!(
                    "CHR ROM truncated: expected {chr_size} bytes, got {available}; zero-filling"
                );
            }
            let mut chr = raw[chr_start..chr_start + available].to_vec();
            chr.resize(chr_size, 0);
            chr
        };

        log::info!(
            "loaded ROM: mapper {mapper_id}, PRG {}K, CHR {}{}K, {:?} mirroring",
            prg_banks * 16,
            if chr_banks == 0 { "RAM " } else { "" },
            if chr_banks == 0 { 8 } else { chr_banks * 8 },
            header_mirroring,
        );

        let mapper = mapper::create(mapper_id, prg_banks, chr_banks);

        Ok(Cartridge {
            mapper,
            prg_rom,
            chr,
            mapper_id,
            format,
            header_mirroring,
            battery_backed,
        })
    }

    /// Cartridge slot with nothing in it: every access falls through to
    /// the bus default.
    pub fn empty() -> Cartridge {
        Cartridge {
            mapper: mapper::create(0, 0, 0),
            prg_rom: Vec::new(),
            chr: Vec::new(),
            mapper_id: 0,
            format: RomFormat::INes,
            header_mirroring: Mirroring::Horizontal,
            battery_backed: false,
        }
    }

    pub fn cpu_read(&self, addr: u16) -> Option<u8> {
        self.mapper.cpu_read(addr, &self.prg_rom)
    }

    pub fn cpu_write(&mut self, addr: u16, data: u8) -> bool {
        self.mapper.cpu_write(addr, data)
    }

    pub fn ppu_read(&mut self, addr: u16) -> Option<u8> {
        self.mapper.ppu_read(addr, &self.chr)
    }

    pub fn ppu_write(&mut self, addr: u16, data: u8) -> bool {
        self.mapper.ppu_write(addr, data, &mut self.chr)
    }

    pub fn mirroring(&self) -> Mirroring {
        self.mapper.mirroring().unwrap_or(self.header_mirroring)
    }

    pub fn irq_state(&self) -> bool {
        self.mapper.irq_state()
    }

    pub fn irq_clear(&mut self) {
        self.mapper.irq_clear();
    }

    /// Rendering-driven scanline pulse, forwarded to mappers with a
    /// scanline counter (MMC3).
    pub fn scanline(&mut self) {
        self.mapper.scanline();
    }

    pub fn reset(&mut self) {
        self.mapper.reset();
    }

    pub fn mapper_id(&self) -> u16 {
        self.mapper_id
    }

    pub fn format(&self) -> RomFormat {
        self.format
    }

    pub fn battery_backed(&self) -> bool {
        self.battery_backed
    }

    /// Battery persistence hook: the host reads/writes this buffer at
    /// rest, the core never touches disk.
    pub fn prg_ram(&self) -> Option<&[u8]> {
        self.mapper.prg_ram()
    }

    pub fn prg_ram_mut(&mut self) -> Option<&mut [u8]> {
        self.mapper.prg_ram_mut()
    }
}

#[cfg(test)]
pub mod test {
    use super::*;

    pub struct TestRom {
        pub mapper_id: u8,
        pub mirroring_flags: u8,
        pub prg_banks: u8,
        pub chr_banks: u8,
        pub prg: Vec<u8>,
        pub chr: Vec<u8>,
    }

    impl Default for TestRom {
        fn default() -> Self {
            TestRom {
                mapper_id: 0,
                mirroring_flags: 0,
                prg_banks: 2,
                chr_banks: 0,
                prg: Vec::new(),
                chr: Vec::new(),
            }
        }
    }

    pub fn build_rom(rom: TestRom) -> Vec<u8> {
        let mut prg = rom.prg;
        prg.resize(rom.prg_banks as usize * PRG_ROM_PAGE_SIZE, 0);
        let mut chr = rom.chr;
        chr.resize(rom.chr_banks as usize * CHR_ROM_PAGE_SIZE, 0);

        let mut raw = vec![
            0x4E,
            0x45,
            0x53,
            0x1A,
            rom.prg_banks,
            rom.chr_banks,
            (rom.mapper_id << 4) | rom.mirroring_flags,
            rom.mapper_id & 0xF0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
        ];
        raw.extend(prg);
        raw.extend(chr);
        raw
    }

    /// 32 KiB NROM cartridge with CHR RAM and the reset vector at $8000.
    pub fn nrom_cart() -> Cartridge {
        let mut rom = TestRom::default();
        rom.prg = vec![0xEA; 2 * PRG_ROM_PAGE_SIZE];
        rom.prg[0x7FFC] = 0x00;
        rom.prg[0x7FFD] = 0x80;
        Cartridge::new(&build_rom(rom)).unwrap()
    }

    #[test]
    fn rejects_bad_magic() {
        let err = Cartridge::new(&[0u8; 32]).err().unwrap();
        assert_eq!(err, RomError::InvalidHeader);
    }

    #[test]
    fn rejects_short_file() {
        let err = Cartridge::new(&[0x4E, 0x45, 0x53]).err().unwrap();
        assert_eq!(err, RomError::InvalidHeader);
    }

    #[test]
    fn rejects_truncated_prg() {
        let mut raw = build_rom(TestRom::default());
        raw.truncate(16 + 1000);
        match Cartridge::new(&raw) {
            Err(RomError::Truncated { expected, actual }) => {
                assert_eq!(expected, 2 * PRG_ROM_PAGE_SIZE);
                assert_eq!(actual, 1000);
            }
            other => panic!("expected truncation error, got {:?}", other.is_ok()),
        }
    }

    #[test]
    fn parses_header_mirroring() {
        let cart = Cartridge::new(&build_rom(TestRom {
            mirroring_flags: 0x01,
            ..Default::default()
        }))
        .unwrap();
        assert_eq!(cart.mirroring(), Mirroring::Vertical);

        let cart = Cartridge::new(&build_rom(TestRom::default())).unwrap();
        assert_eq!(cart.mirroring(), Mirroring::Horizontal);

        let cart = Cartridge::new(&build_rom(TestRom {
            mirroring_flags: 0x08,
            ..Default::default()
        }))
        .unwrap();
        assert_eq!(cart.mirroring(), Mirroring::FourScreen);
    }

    #[test]
    fn dirty_header_ignores_upper_mapper_nibble() {
        let mut raw = build_rom(TestRom::default());
        raw[7] = 0xD0; // would decode as mapper 208
        raw[12] = b'D'; // garbage tail marks the header dirty
        let cart = Cartridge::new(&raw).unwrap();
        assert_eq!(cart.mapper_id(), 0);
    }

    #[test]
    fn nes2_format_detected() {
        let mut raw = build_rom(TestRom {
            prg_banks: 1,
            chr_banks: 1,
            ..Default::default()
        });
        raw[7] = 0x08;
        let cart = Cartridge::new(&raw).unwrap();
        assert_eq!(cart.format(), RomFormat::Nes2);
    }

    #[test]
    fn chr_ram_when_no_chr_banks() {
        let mut cart = Cartridge::new(&build_rom(TestRom::default())).unwrap();
        assert!(cart.ppu_write(0x0123, 0xAB));
        assert_eq!(cart.ppu_read(0x0123), Some(0xAB));
    }

    #[test]
    fn unknown_mapper_falls_back_to_nrom() {
        let mut rom = TestRom {
            mapper_id: 13,
            ..Default::default()
        };
        rom.prg = vec![0x42; 2 * PRG_ROM_PAGE_SIZE];
        let cart = Cartridge::new(&build_rom(rom)).unwrap();
        assert_eq!(cart.cpu_read(0x8000), Some(0x42));
    }

    #[test]
    fn empty_cart_reads_nothing() {
        let cart = Cartridge::empty();
        assert_eq!(cart.cpu_read(0x8000), None);
    }
}
