use anyhow::{Result, bail};

use super::cartridge::Cartridge;

/// Internal nametable RAM, sized for four-screen boards.
pub const VRAM_SIZE: usize = 0x1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mirroring {
    #[default]
    Horizontal,
    Vertical,
    OneScreenLower,
    OneScreenUpper,
    FourScreen,
}

impl Mirroring {
    /// Maps a nametable address ($2000-$3EFF) to an index into internal VRAM.
    pub fn vram_index(self, addr: u16) -> usize {
        let index = ((addr - 0x2000) % 0x1000) as usize;
        let table = index / 0x400;
        let offset = index % 0x400;

        let mapped_table = match self {
            Mirroring::Horizontal => table / 2,
            Mirroring::Vertical => table & 1,
            Mirroring::OneScreenLower => 0,
            Mirroring::OneScreenUpper => 1,
            Mirroring::FourScreen => table & 3,
        };

        mapped_table * 0x400 + offset
    }
}

/// Cartridge hardware as seen from the console.
///
/// Only the CPU/PPU data paths and mirroring are required. The remaining hooks have
/// pass-through defaults and exist for boards that count scanlines, extend nametables
/// or attribute data, or need to know which pattern fetches belong to sprites.
pub trait Mapper {
    fn name(&self) -> &'static str;

    /// CPU access to $4020-$FFFF. `None` leaves the data bus floating.
    fn cpu_read(&mut self, addr: u16) -> Option<u8>;
    fn cpu_write(&mut self, addr: u16, value: u8);

    /// Pattern table access, $0000-$1FFF.
    fn chr_read(&mut self, addr: u16) -> u8;
    fn chr_write(&mut self, addr: u16, value: u8);

    fn mirroring(&self) -> Mirroring;

    /// Level of the cartridge IRQ output.
    fn irq_pending(&self) -> bool {
        false
    }

    fn set_sprite_size(&mut self, _tall: bool) {}

    /// Raised while the PPU fetches sprite patterns (cycles 257-320).
    fn set_sprite_fetch(&mut self, _active: bool) {}

    fn read_nametable(&mut self, _addr: u16, _vram: &[u8; VRAM_SIZE]) -> Option<u8> {
        None
    }

    /// Returns true when the write was consumed by the cartridge.
    fn write_nametable(&mut self, _addr: u16, _value: u8, _vram: &mut [u8; VRAM_SIZE]) -> bool {
        false
    }

    fn enhance_tile_index(&mut self, _addr: u16, index: u8) -> u8 {
        index
    }

    fn enhance_tile_attributes(&mut self, _addr: u16, attributes: u8) -> u8 {
        attributes
    }

    /// Called once per PPU cycle with the position just rendered.
    fn step_video(&mut self, _scanline: u16, _cycle: u16, _show_background: bool, _show_sprites: bool) {}

    fn describe(&self) -> String {
        self.name().to_string()
    }
}

pub fn mapper_name(mapper_id: u16) -> &'static str {
    match mapper_id {
        0 => "NROM",
        1 => "MMC1",
        2 => "UxROM",
        3 => "CNROM",
        4 => "MMC3",
        7 => "AxROM",
        _ => "Unsupported",
    }
}

pub fn create_mapper(cart: Cartridge) -> Result<Box<dyn Mapper>> {
    let mapper: Box<dyn Mapper> = match cart.mapper_id {
        0 => Box::new(Nrom::new(cart)),
        1 => Box::new(Mmc1::new(cart)),
        2 => Box::new(Uxrom::new(cart)),
        3 => Box::new(Cnrom::new(cart)),
        4 => Box::new(Mmc3::new(cart)),
        7 => Box::new(Axrom::new(cart)),
        id => bail!("mapper {id} is not supported (NROM, MMC1, UxROM, CNROM, MMC3 and AxROM are)"),
    };
    log::info!("created mapper {}", mapper.name());
    Ok(mapper)
}

/// Placeholder board used before a cartridge is inserted: 8 KiB of CHR RAM and no PRG.
pub struct Unloaded {
    chr: Vec<u8>,
}

impl Default for Unloaded {
    fn default() -> Self {
        Self {
            chr: vec![0; 0x2000],
        }
    }
}

impl Mapper for Unloaded {
    fn name(&self) -> &'static str {
        "none"
    }

    fn cpu_read(&mut self, _addr: u16) -> Option<u8> {
        None
    }

    fn cpu_write(&mut self, _addr: u16, _value: u8) {}

    fn chr_read(&mut self, addr: u16) -> u8 {
        self.chr[addr as usize & 0x1FFF]
    }

    fn chr_write(&mut self, addr: u16, value: u8) {
        self.chr[addr as usize & 0x1FFF] = value;
    }

    fn mirroring(&self) -> Mirroring {
        Mirroring::Horizontal
    }
}

/// ROM, CHR and work RAM shared by every board.
struct Board {
    prg_rom: Vec<u8>,
    chr: Vec<u8>,
    chr_is_ram: bool,
    prg_ram: Vec<u8>,
}

impl Board {
    fn new(cart: &mut Cartridge) -> Self {
        Self {
            prg_rom: std::mem::take(&mut cart.prg_rom),
            chr: std::mem::take(&mut cart.chr_data),
            chr_is_ram: cart.chr_is_ram,
            prg_ram: vec![0; cart.prg_ram_size.max(0x2000)],
        }
    }

    fn prg_banks(&self, size: usize) -> usize {
        (self.prg_rom.len() / size).max(1)
    }

    fn chr_banks(&self, size: usize) -> usize {
        (self.chr.len() / size).max(1)
    }

    fn read_prg(&self, bank: usize, size: usize, offset: usize) -> u8 {
        let bank = bank % self.prg_banks(size);
        self.prg_rom[(bank * size + offset) % self.prg_rom.len()]
    }

    fn read_chr(&self, index: usize) -> u8 {
        self.chr[index % self.chr.len()]
    }

    fn write_chr(&mut self, index: usize, value: u8) {
        if self.chr_is_ram {
            let len = self.chr.len();
            self.chr[index % len] = value;
        }
    }

    /// Work RAM at $6000-$7FFF.
    fn read_ram(&self, addr: u16) -> Option<u8> {
        (0x6000..=0x7FFF)
            .contains(&addr)
            .then(|| self.prg_ram[(addr as usize - 0x6000) % self.prg_ram.len()])
    }

    fn write_ram(&mut self, addr: u16, value: u8) -> bool {
        if !(0x6000..=0x7FFF).contains(&addr) {
            return false;
        }
        let len = self.prg_ram.len();
        self.prg_ram[(addr as usize - 0x6000) % len] = value;
        true
    }
}

struct Nrom {
    board: Board,
    mirroring: Mirroring,
}

impl Nrom {
    fn new(mut cart: Cartridge) -> Self {
        Self {
            board: Board::new(&mut cart),
            mirroring: cart.mirroring,
        }
    }
}

impl Mapper for Nrom {
    fn name(&self) -> &'static str {
        "NROM"
    }

    fn cpu_read(&mut self, addr: u16) -> Option<u8> {
        match addr {
            0x8000..=0xFFFF => Some(self.board.read_prg(0, 0x8000, addr as usize - 0x8000)),
            _ => self.board.read_ram(addr),
        }
    }

    fn cpu_write(&mut self, addr: u16, value: u8) {
        self.board.write_ram(addr, value);
    }

    fn chr_read(&mut self, addr: u16) -> u8 {
        self.board.read_chr(addr as usize)
    }

    fn chr_write(&mut self, addr: u16, value: u8) {
        self.board.write_chr(addr as usize, value);
    }

    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }
}

struct Mmc1 {
    board: Board,
    shift_register: u8,
    control: u8,
    chr_bank0: u8,
    chr_bank1: u8,
    prg_bank: u8,
}

impl Mmc1 {
    fn new(mut cart: Cartridge) -> Self {
        Self {
            board: Board::new(&mut cart),
            shift_register: 0x10,
            control: 0x0C,
            chr_bank0: 0,
            chr_bank1: 0,
            prg_bank: 0,
        }
    }

    fn write_shift_register(&mut self, addr: u16, value: u8) {
        if value & 0x80 != 0 {
            self.shift_register = 0x10;
            self.control |= 0x0C;
            return;
        }

        // The marker bit reaching bit 0 means this is the fifth write.
        let complete = self.shift_register & 0x01 != 0;
        self.shift_register = (self.shift_register >> 1) | ((value & 0x01) << 4);
        if !complete {
            return;
        }

        let data = self.shift_register;
        match addr {
            0x8000..=0x9FFF => self.control = data,
            0xA000..=0xBFFF => self.chr_bank0 = data,
            0xC000..=0xDFFF => self.chr_bank1 = data,
            _ => self.prg_bank = data & 0x0F,
        }
        self.shift_register = 0x10;
    }

    fn chr_index(&self, addr: u16) -> usize {
        let addr = addr as usize & 0x1FFF;
        if self.control & 0x10 == 0 {
            let bank = (self.chr_bank0 as usize >> 1) % self.board.chr_banks(0x2000);
            bank * 0x2000 + addr
        } else {
            let register = if addr < 0x1000 { self.chr_bank0 } else { self.chr_bank1 };
            let bank = register as usize % self.board.chr_banks(0x1000);
            bank * 0x1000 + (addr & 0x0FFF)
        }
    }
}

impl Mapper for Mmc1 {
    fn name(&self) -> &'static str {
        "MMC1"
    }

    fn cpu_read(&mut self, addr: u16) -> Option<u8> {
        if addr < 0x8000 {
            return self.board.read_ram(addr);
        }

        let bank = self.prg_bank as usize;
        let offset = addr as usize & 0x3FFF;
        let value = match (self.control >> 2) & 0x03 {
            0 | 1 => self.board.read_prg(bank >> 1, 0x8000, addr as usize - 0x8000),
            2 if addr < 0xC000 => self.board.read_prg(0, 0x4000, offset),
            2 => self.board.read_prg(bank, 0x4000, offset),
            _ if addr < 0xC000 => self.board.read_prg(bank, 0x4000, offset),
            _ => {
                let last = self.board.prg_banks(0x4000) - 1;
                self.board.read_prg(last, 0x4000, offset)
            }
        };
        Some(value)
    }

    fn cpu_write(&mut self, addr: u16, value: u8) {
        if addr >= 0x8000 {
            self.write_shift_register(addr, value);
        } else {
            self.board.write_ram(addr, value);
        }
    }

    fn chr_read(&mut self, addr: u16) -> u8 {
        self.board.read_chr(self.chr_index(addr))
    }

    fn chr_write(&mut self, addr: u16, value: u8) {
        let index = self.chr_index(addr);
        self.board.write_chr(index, value);
    }

    fn mirroring(&self) -> Mirroring {
        match self.control & 0x03 {
            0 => Mirroring::OneScreenLower,
            1 => Mirroring::OneScreenUpper,
            2 => Mirroring::Vertical,
            _ => Mirroring::Horizontal,
        }
    }

    fn describe(&self) -> String {
        format!(
            "MMC1 control=${:02X} prg=${:02X} chr0=${:02X} chr1=${:02X}",
            self.control, self.prg_bank, self.chr_bank0, self.chr_bank1
        )
    }
}

struct Uxrom {
    board: Board,
    bank_select: u8,
    mirroring: Mirroring,
}

impl Uxrom {
    fn new(mut cart: Cartridge) -> Self {
        Self {
            board: Board::new(&mut cart),
            bank_select: 0,
            mirroring: cart.mirroring,
        }
    }
}

impl Mapper for Uxrom {
    fn name(&self) -> &'static str {
        "UxROM"
    }

    fn cpu_read(&mut self, addr: u16) -> Option<u8> {
        let offset = addr as usize & 0x3FFF;
        match addr {
            0x8000..=0xBFFF => Some(self.board.read_prg(self.bank_select as usize, 0x4000, offset)),
            0xC000..=0xFFFF => {
                let last = self.board.prg_banks(0x4000) - 1;
                Some(self.board.read_prg(last, 0x4000, offset))
            }
            _ => self.board.read_ram(addr),
        }
    }

    fn cpu_write(&mut self, addr: u16, value: u8) {
        if addr >= 0x8000 {
            self.bank_select = value & 0x0F;
        } else {
            self.board.write_ram(addr, value);
        }
    }

    fn chr_read(&mut self, addr: u16) -> u8 {
        self.board.read_chr(addr as usize)
    }

    fn chr_write(&mut self, addr: u16, value: u8) {
        self.board.write_chr(addr as usize, value);
    }

    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }
}

struct Cnrom {
    board: Board,
    chr_bank: u8,
    mirroring: Mirroring,
}

impl Cnrom {
    fn new(mut cart: Cartridge) -> Self {
        Self {
            board: Board::new(&mut cart),
            chr_bank: 0,
            mirroring: cart.mirroring,
        }
    }

    fn chr_index(&self, addr: u16) -> usize {
        let bank = self.chr_bank as usize % self.board.chr_banks(0x2000);
        bank * 0x2000 + (addr as usize & 0x1FFF)
    }
}

impl Mapper for Cnrom {
    fn name(&self) -> &'static str {
        "CNROM"
    }

    fn cpu_read(&mut self, addr: u16) -> Option<u8> {
        match addr {
            0x8000..=0xFFFF => Some(self.board.read_prg(0, 0x8000, addr as usize - 0x8000)),
            _ => self.board.read_ram(addr),
        }
    }

    fn cpu_write(&mut self, addr: u16, value: u8) {
        if addr >= 0x8000 {
            self.chr_bank = value;
        } else {
            self.board.write_ram(addr, value);
        }
    }

    fn chr_read(&mut self, addr: u16) -> u8 {
        self.board.read_chr(self.chr_index(addr))
    }

    fn chr_write(&mut self, addr: u16, value: u8) {
        let index = self.chr_index(addr);
        self.board.write_chr(index, value);
    }

    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }
}

struct Mmc3 {
    board: Board,
    bank_select: u8,
    bank_regs: [u8; 8],
    mirroring: Mirroring,
    four_screen: bool,

    irq_latch: u8,
    irq_counter: u8,
    irq_reload: bool,
    irq_enabled: bool,
    irq_pending: bool,
}

impl Mmc3 {
    fn new(mut cart: Cartridge) -> Self {
        Self {
            board: Board::new(&mut cart),
            bank_select: 0,
            bank_regs: [0; 8],
            mirroring: cart.mirroring,
            four_screen: cart.four_screen,
            irq_latch: 0,
            irq_counter: 0,
            irq_reload: false,
            irq_enabled: false,
            irq_pending: false,
        }
    }

    fn prg_bank_for(&self, addr: u16) -> usize {
        let last = self.board.prg_banks(0x2000) - 1;
        let second_last = last.saturating_sub(1);
        let swapped = self.bank_select & 0x40 != 0;
        match addr {
            0x8000..=0x9FFF if swapped => second_last,
            0x8000..=0x9FFF => self.bank_regs[6] as usize,
            0xA000..=0xBFFF => self.bank_regs[7] as usize,
            0xC000..=0xDFFF if swapped => self.bank_regs[6] as usize,
            0xC000..=0xDFFF => second_last,
            _ => last,
        }
    }

    fn chr_index(&self, addr: u16) -> usize {
        let [r0, r1, r2, r3, r4, r5, ..] = self.bank_regs;
        let (r0, r1) = (r0 & 0xFE, r1 & 0xFE);
        let two_k = [r0, r0 | 1, r1, r1 | 1];
        let one_k = [r2, r3, r4, r5];

        let slot = (addr as usize & 0x1FFF) / 0x400;
        let inverted = self.bank_select & 0x80 != 0;
        let bank = match (inverted, slot) {
            (false, 0..=3) => two_k[slot],
            (false, _) => one_k[slot - 4],
            (true, 0..=3) => one_k[slot],
            (true, _) => two_k[slot - 4],
        };
        let bank = bank as usize % self.board.chr_banks(0x400);
        bank * 0x400 + (addr as usize & 0x03FF)
    }

    fn clock_irq_counter(&mut self) {
        if self.irq_counter == 0 || self.irq_reload {
            self.irq_counter = self.irq_latch;
            self.irq_reload = false;
        } else {
            self.irq_counter -= 1;
        }

        if self.irq_counter == 0 && self.irq_enabled {
            self.irq_pending = true;
        }
    }
}

impl Mapper for Mmc3 {
    fn name(&self) -> &'static str {
        "MMC3"
    }

    fn cpu_read(&mut self, addr: u16) -> Option<u8> {
        if addr < 0x8000 {
            return self.board.read_ram(addr);
        }
        let bank = self.prg_bank_for(addr);
        Some(self.board.read_prg(bank, 0x2000, addr as usize & 0x1FFF))
    }

    fn cpu_write(&mut self, addr: u16, value: u8) {
        let even = addr & 1 == 0;
        match addr {
            0x8000..=0x9FFF if even => self.bank_select = value,
            0x8000..=0x9FFF => {
                let target = (self.bank_select & 0x07) as usize;
                self.bank_regs[target] = value;
            }
            0xA000..=0xBFFF if even && !self.four_screen => {
                self.mirroring = if value & 1 == 0 {
                    Mirroring::Vertical
                } else {
                    Mirroring::Horizontal
                };
            }
            0xA000..=0xBFFF => {}
            0xC000..=0xDFFF if even => self.irq_latch = value,
            0xC000..=0xDFFF => {
                self.irq_counter = 0;
                self.irq_reload = true;
            }
            0xE000..=0xFFFF if even => {
                self.irq_enabled = false;
                self.irq_pending = false;
            }
            0xE000..=0xFFFF => self.irq_enabled = true,
            _ => {
                self.board.write_ram(addr, value);
            }
        }
    }

    fn chr_read(&mut self, addr: u16) -> u8 {
        self.board.read_chr(self.chr_index(addr))
    }

    fn chr_write(&mut self, addr: u16, value: u8) {
        let index = self.chr_index(addr);
        self.board.write_chr(index, value);
    }

    fn mirroring(&self) -> Mirroring {
        if self.four_screen {
            Mirroring::FourScreen
        } else {
            self.mirroring
        }
    }

    fn irq_pending(&self) -> bool {
        self.irq_pending
    }

    // One counter clock per rendered line, at the point where sprite fetches raise A12.
    fn step_video(&mut self, scanline: u16, cycle: u16, show_background: bool, show_sprites: bool) {
        if cycle == 260 && (show_background || show_sprites) && (scanline < 240 || scanline == 261)
        {
            self.clock_irq_counter();
        }
    }

    fn describe(&self) -> String {
        format!(
            "MMC3 select=${:02X} banks={:02X?} irq latch={} counter={} enabled={} pending={}",
            self.bank_select,
            self.bank_regs,
            self.irq_latch,
            self.irq_counter,
            self.irq_enabled,
            self.irq_pending
        )
    }
}

struct Axrom {
    board: Board,
    prg_bank: u8,
    mirroring: Mirroring,
}

impl Axrom {
    fn new(mut cart: Cartridge) -> Self {
        Self {
            board: Board::new(&mut cart),
            prg_bank: 0,
            mirroring: Mirroring::OneScreenLower,
        }
    }
}

impl Mapper for Axrom {
    fn name(&self) -> &'static str {
        "AxROM"
    }

    fn cpu_read(&mut self, addr: u16) -> Option<u8> {
        match addr {
            0x8000..=0xFFFF => Some(self.board.read_prg(
                self.prg_bank as usize,
                0x8000,
                addr as usize & 0x7FFF,
            )),
            _ => self.board.read_ram(addr),
        }
    }

    fn cpu_write(&mut self, addr: u16, value: u8) {
        if addr < 0x8000 {
            self.board.write_ram(addr, value);
            return;
        }
        self.prg_bank = value & 0x07;
        self.mirroring = if value & 0x10 != 0 {
            Mirroring::OneScreenUpper
        } else {
            Mirroring::OneScreenLower
        };
    }

    fn chr_read(&mut self, addr: u16) -> u8 {
        self.board.read_chr(addr as usize)
    }

    fn chr_write(&mut self, addr: u16, value: u8) {
        self.board.write_chr(addr as usize, value);
    }

    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterned_banks(total_size: usize, bank_size: usize) -> Vec<u8> {
        let mut data = vec![0u8; total_size];
        for (bank, chunk) in data.chunks_mut(bank_size).enumerate() {
            chunk.fill((bank as u8).wrapping_add(1));
        }
        data
    }

    fn make_cart(mapper_id: u16, prg_rom: Vec<u8>, chr_data: Vec<u8>, chr_is_ram: bool) -> Cartridge {
        Cartridge {
            mapper_id,
            submapper_id: 0,
            mirroring: Mirroring::Horizontal,
            four_screen: false,
            has_battery_backed_ram: false,
            prg_rom,
            chr_data,
            chr_is_ram,
            prg_ram_size: 0x2000,
        }
    }

    #[test]
    fn mirroring_maps_nametables_to_vram() {
        assert_eq!(Mirroring::Horizontal.vram_index(0x2400), 0x000);
        assert_eq!(Mirroring::Horizontal.vram_index(0x2800), 0x400);
        assert_eq!(Mirroring::Vertical.vram_index(0x2800), 0x000);
        assert_eq!(Mirroring::Vertical.vram_index(0x2C10), 0x410);
        assert_eq!(Mirroring::OneScreenUpper.vram_index(0x2000), 0x400);
        assert_eq!(Mirroring::FourScreen.vram_index(0x2C00), 0xC00);
        assert_eq!(Mirroring::Vertical.vram_index(0x3400), 0x400);
    }

    #[test]
    fn nrom_mirrors_a_single_16k_bank() {
        let prg = patterned_banks(0x4000, 0x4000);
        let mut mapper = create_mapper(make_cart(0, prg, vec![0; 0x2000], false)).unwrap();
        assert_eq!(mapper.cpu_read(0x8000), Some(1));
        assert_eq!(mapper.cpu_read(0xC000), Some(1));
        assert_eq!(mapper.cpu_read(0x5000), None);

        mapper.cpu_write(0x6001, 0x77);
        assert_eq!(mapper.cpu_read(0x6001), Some(0x77));
    }

    #[test]
    fn uxrom_keeps_last_bank_fixed() {
        let prg = patterned_banks(3 * 0x4000, 0x4000);
        let mut mapper = Uxrom::new(make_cart(2, prg, vec![0; 0x2000], false));

        mapper.cpu_write(0x8000, 1);
        assert_eq!(mapper.cpu_read(0x8000), Some(2));
        assert_eq!(mapper.cpu_read(0xC000), Some(3));
    }

    #[test]
    fn cnrom_switches_chr_bank() {
        let prg = patterned_banks(0x8000, 0x4000);
        let chr = patterned_banks(2 * 0x2000, 0x2000);
        let mut mapper = Cnrom::new(make_cart(3, prg, chr, false));

        mapper.cpu_write(0x8000, 1);
        assert_eq!(mapper.chr_read(0x0000), 2);
    }

    #[test]
    fn chr_rom_ignores_writes_and_chr_ram_accepts_them() {
        let prg = patterned_banks(0x8000, 0x4000);
        let mut rom = Cnrom::new(make_cart(3, prg.clone(), patterned_banks(0x2000, 0x2000), false));
        rom.chr_write(0x0010, 0xAB);
        assert_eq!(rom.chr_read(0x0010), 1);

        let mut ram = Cnrom::new(make_cart(3, prg, vec![0; 2 * 0x2000], true));
        ram.cpu_write(0x8000, 1);
        ram.chr_write(0x0010, 0xAB);
        assert_eq!(ram.chr_read(0x0010), 0xAB);
    }

    #[test]
    fn mmc1_commits_on_fifth_write() {
        let prg = patterned_banks(4 * 0x4000, 0x4000);
        let mut mapper = Mmc1::new(make_cart(1, prg, vec![0; 0x2000], true));

        // Select bank 2 serially through $E000.
        for bit in [0, 1, 0, 0] {
            mapper.cpu_write(0xE000, bit);
            assert_eq!(mapper.cpu_read(0x8000), Some(1));
        }
        mapper.cpu_write(0xE000, 0);
        assert_eq!(mapper.cpu_read(0x8000), Some(3));
        assert_eq!(mapper.cpu_read(0xC000), Some(4));

        // Control = 2 (vertical mirroring), 32K mode.
        for bit in [0, 1, 0, 0, 0] {
            mapper.cpu_write(0x8000, bit);
        }
        assert_eq!(mapper.mirroring(), Mirroring::Vertical);
    }

    #[test]
    fn mmc1_reset_bit_restores_fixed_last_bank() {
        let prg = patterned_banks(4 * 0x4000, 0x4000);
        let mut mapper = Mmc1::new(make_cart(1, prg, vec![0; 0x2000], true));
        mapper.cpu_write(0x8000, 1);
        mapper.cpu_write(0x8000, 0x80);
        assert_eq!(mapper.cpu_read(0xC000), Some(4));
    }

    #[test]
    fn mmc3_counts_rendered_scanlines() {
        let prg = patterned_banks(4 * 0x2000, 0x2000);
        let chr = patterned_banks(8 * 0x0400, 0x0400);
        let mut mapper = Mmc3::new(make_cart(4, prg, chr, false));

        mapper.cpu_write(0xC000, 2);
        mapper.cpu_write(0xC001, 0);
        mapper.cpu_write(0xE001, 0);

        for scanline in 0..2 {
            for cycle in 0..341 {
                mapper.step_video(scanline, cycle, true, false);
            }
        }
        assert!(!mapper.irq_pending());

        for cycle in 0..341 {
            mapper.step_video(2, cycle, true, false);
        }
        assert!(mapper.irq_pending());

        mapper.cpu_write(0xE000, 0);
        assert!(!mapper.irq_pending());
    }

    #[test]
    fn mmc3_ignores_lines_with_rendering_off() {
        let prg = patterned_banks(4 * 0x2000, 0x2000);
        let mut mapper = Mmc3::new(make_cart(4, prg, vec![0; 0x2000], true));
        mapper.cpu_write(0xC000, 0);
        mapper.cpu_write(0xE001, 0);
        mapper.step_video(10, 260, false, false);
        mapper.step_video(245, 260, true, true);
        assert!(!mapper.irq_pending());
    }

    #[test]
    fn mmc3_banks_prg_and_chr() {
        let prg = patterned_banks(8 * 0x2000, 0x2000);
        let chr = patterned_banks(16 * 0x0400, 0x0400);
        let mut mapper = Mmc3::new(make_cart(4, prg, chr, false));

        mapper.cpu_write(0x8000, 6);
        mapper.cpu_write(0x8001, 3);
        assert_eq!(mapper.cpu_read(0x8000), Some(4));
        assert_eq!(mapper.cpu_read(0xE000), Some(8));

        mapper.cpu_write(0x8000, 0x46);
        assert_eq!(mapper.cpu_read(0x8000), Some(7));
        assert_eq!(mapper.cpu_read(0xC000), Some(4));

        mapper.cpu_write(0x8000, 2);
        mapper.cpu_write(0x8001, 9);
        assert_eq!(mapper.chr_read(0x1000), 10);

        mapper.cpu_write(0xA000, 0);
        assert_eq!(mapper.mirroring(), Mirroring::Vertical);
    }

    #[test]
    fn axrom_selects_single_screen() {
        let prg = patterned_banks(2 * 0x8000, 0x8000);
        let mut mapper = Axrom::new(make_cart(7, prg, vec![0; 0x2000], true));
        mapper.cpu_write(0x8000, 0x11);
        assert_eq!(mapper.cpu_read(0x8000), Some(2));
        assert_eq!(mapper.mirroring(), Mirroring::OneScreenUpper);
    }

    #[test]
    fn unknown_mapper_is_rejected() {
        let cart = make_cart(99, vec![0; 0x4000], vec![0; 0x2000], true);
        assert!(create_mapper(cart).is_err());
    }
}
