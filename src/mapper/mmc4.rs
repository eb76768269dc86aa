use crate::cart::Mirroring;
use crate::mapper::Mapper;

/// Mapper 10 (MMC4): the same $FD/$FE CHR latch scheme as MMC2 but with
/// a 16 KiB switchable PRG bank and the last 16 KiB fixed.
pub struct Mmc4Mapper {
    prg_banks: usize,
    prg_bank: u8,
    chr_bank_0_fd: u8,
    chr_bank_0_fe: u8,
    chr_bank_1_fd: u8,
    chr_bank_1_fe: u8,
    latch_0: u8,
    latch_1: u8,
    mirroring: Mirroring,
}

impl Mmc4Mapper {
    pub fn new(prg_banks: usize) -> Self {
        Mmc4Mapper {
            prg_banks,
            prg_bank: 0,
            chr_bank_0_fd: 0,
            chr_bank_0_fe: 0,
            chr_bank_1_fd: 0,
            chr_bank_1_fe: 0,
            latch_0: 0xFE,
            latch_1: 0xFE,
            mirroring: Mirroring::Vertical,
        }
    }
}

impl Mapper for Mmc4Mapper {
    fn cpu_read(&self, addr: u16, prg_rom: &[u8]) -> Option<u8> {
        match addr {
            0x8000..=0xBFFF => {
                let mapped = self.prg_bank as usize * 0x4000 + (addr & 0x3FFF) as usize;
                prg_rom.get(mapped).copied()
            }
            0xC000..=0xFFFF => {
                let mapped =
                    self.prg_banks.saturating_sub(1) * 0x4000 + (addr & 0x3FFF) as usize;
                prg_rom.get(mapped).copied()
            }
            _ => None,
        }
    }

    fn cpu_write(&mut self, addr: u16, data: u8) -> bool {
        match addr {
            0xA000..=0xAFFF => {
                self.prg_bank = data & 0x0F;
                true
            }
            0xB000..=0xBFFF => {
                self.chr_bank_0_fd = data & 0x1F;
                true
            }
            0xC000..=0xCFFF => {
                self.chr_bank_0_fe = data & 0x1F;
                true
            }
            0xD000..=0xDFFF => {
                self.chr_bank_1_fd = data & 0x1F;
                true
            }
            0xE000..=0xEFFF => {
                self.chr_bank_1_fe = data & 0x1F;
                true
            }
            0xF000..=0xFFFF => {
                self.mirroring = if data & 0x01 != 0 {
                    Mirroring::Horizontal
                } else {
                    Mirroring::Vertical
                };
                true
            }
            _ => false,
        }
    }

    fn ppu_read(&mut self, addr: u16, chr: &[u8]) -> Option<u8> {
        match addr {
            0x0000..=0x0FFF => {
                if addr == 0x0FD8 {
                    self.latch_0 = 0xFD;
                } else if addr == 0x0FE8 {
                    self.latch_0 = 0xFE;
                }
                let bank = if self.latch_0 == 0xFD {
                    self.chr_bank_0_fd
                } else {
                    self.chr_bank_0_fe
                };
                chr.get(bank as usize * 0x1000 + (addr & 0x0FFF) as usize).copied()
            }
            0x1000..=0x1FFF => {
                if (0x1FD8..=0x1FDF).contains(&addr) {
                    self.latch_1 = 0xFD;
                } else if (0x1FE8..=0x1FEF).contains(&addr) {
                    self.latch_1 = 0xFE;
                }
                let bank = if self.latch_1 == 0xFD {
                    self.chr_bank_1_fd
                } else {
                    self.chr_bank_1_fe
                };
                chr.get(bank as usize * 0x1000 + (addr & 0x0FFF) as usize).copied()
            }
            _ => None,
        }
    }

    fn ppu_write(&mut self, _addr: u16, _data: u8, _chr: &mut [u8]) -> bool {
        false
    }

    fn reset(&mut self) {
        self.prg_bank = 0;
        self.chr_bank_0_fd = 0;
        self.chr_bank_0_fe = 0;
        self.chr_bank_1_fd = 0;
        self.chr_bank_1_fe = 0;
        self.latch_0 = 0xFE;
        self.latch_1 = 0xFE;
        self.mirroring = Mirroring::Vertical;
    }

    fn mirroring(&self) -> Option<Mirroring> {
        Some(self.mirroring)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn high_half_latch_uses_address_ranges() {
        let mut mapper = Mmc4Mapper::new(8);
        let mut chr = vec![0; 4 * 0x1000];
        chr[2 * 0x1000 + 0x200] = 0xFD;
        chr[3 * 0x1000 + 0x200] = 0xFE;
        mapper.cpu_write(0xD000, 2);
        mapper.cpu_write(0xE000, 3);

        assert_eq!(mapper.ppu_read(0x1200, &chr), Some(0xFE));
        mapper.ppu_read(0x1FDC, &chr);
        assert_eq!(mapper.ppu_read(0x1200, &chr), Some(0xFD));
        mapper.ppu_read(0x1FEC, &chr);
        assert_eq!(mapper.ppu_read(0x1200, &chr), Some(0xFE));
    }

    #[test]
    fn prg_last_bank_fixed() {
        let mut mapper = Mmc4Mapper::new(8);
        let mut prg = vec![0; 8 * 0x4000];
        prg[2 * 0x4000] = 0x22;
        prg[7 * 0x4000] = 0x77;
        mapper.cpu_write(0xA000, 2);
        assert_eq!(mapper.cpu_read(0x8000, &prg), Some(0x22));
        assert_eq!(mapper.cpu_read(0xC000, &prg), Some(0x77));
    }
}
