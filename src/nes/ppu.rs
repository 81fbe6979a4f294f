use super::mapper::{Mapper, Mirroring, VRAM_SIZE};
use super::palette;

pub const FRAME_WIDTH: usize = 256;
pub const FRAME_HEIGHT: usize = 240;

pub const CYCLES_PER_LINE: u16 = 341;
pub const LINES_PER_FRAME: u16 = 262;
pub const VBLANK_LINE: u16 = 241;
pub const PRE_RENDER_LINE: u16 = 261;

const CTRL_NMI_ENABLE: u8 = 0x80;
const CTRL_SPRITE_SIZE_16: u8 = 0x20;
const CTRL_BG_TABLE: u8 = 0x10;
const CTRL_SPRITE_TABLE: u8 = 0x08;
const CTRL_VRAM_INC_32: u8 = 0x04;

const MASK_SHOW_BG_LEFT: u8 = 0x02;
const MASK_SHOW_SPRITE_LEFT: u8 = 0x04;
const MASK_SHOW_BG: u8 = 0x08;
const MASK_SHOW_SPRITES: u8 = 0x10;

const STATUS_SPRITE_OVERFLOW: u8 = 0x20;
const STATUS_SPRITE_ZERO_HIT: u8 = 0x40;
const STATUS_VBLANK: u8 = 0x80;

const MAX_SPRITES_PER_LINE: usize = 8;

pub struct Ppu {
    ctrl: u8,
    mask: u8,
    status: u8,

    oam_addr: u8,
    oam: [u8; 256],
    vram: [u8; VRAM_SIZE],
    palette_ram: [u8; 32],
    mirroring: Mirroring,

    v: u16,
    t: u16,
    fine_x: u8,
    write_toggle: bool,
    read_buffer: u8,
    open_bus: u8,

    scanline: u16,
    cycle: u16,
    odd_frame: bool,
    odd_frame_skip: bool,
    frame_complete: bool,
    vblank_suppress: bool,

    nmi_line: bool,
    nmi_delay_cycles: u8,
    nmi_countdown: u8,
    nmi_pending: bool,

    next_tile_id: u8,
    next_tile_attr: u8,
    next_tile_lsb: u8,
    next_tile_msb: u8,
    bg_shift_pattern_lo: u16,
    bg_shift_pattern_hi: u16,
    bg_shift_attr_lo: u16,
    bg_shift_attr_hi: u16,

    sprite_count: usize,
    /// Eight 4-bit pixels per sprite: palette bits above colour bits, leftmost pixel on top.
    sprite_patterns: [u32; MAX_SPRITES_PER_LINE],
    sprite_positions: [u8; MAX_SPRITES_PER_LINE],
    sprite_priorities: [u8; MAX_SPRITES_PER_LINE],
    sprite_indexes: [u8; MAX_SPRITES_PER_LINE],

    frame_buffer: Vec<u8>,
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

impl Ppu {
    pub fn new() -> Self {
        Self {
            ctrl: 0,
            mask: 0,
            status: 0,
            oam_addr: 0,
            oam: [0; 256],
            vram: [0; VRAM_SIZE],
            palette_ram: [0x0F; 32],
            mirroring: Mirroring::Horizontal,
            v: 0,
            t: 0,
            fine_x: 0,
            write_toggle: false,
            read_buffer: 0,
            open_bus: 0,
            scanline: PRE_RENDER_LINE,
            cycle: 0,
            odd_frame: false,
            odd_frame_skip: true,
            frame_complete: false,
            vblank_suppress: false,
            nmi_line: false,
            nmi_delay_cycles: 15,
            nmi_countdown: 0,
            nmi_pending: false,
            next_tile_id: 0,
            next_tile_attr: 0,
            next_tile_lsb: 0,
            next_tile_msb: 0,
            bg_shift_pattern_lo: 0,
            bg_shift_pattern_hi: 0,
            bg_shift_attr_lo: 0,
            bg_shift_attr_hi: 0,
            sprite_count: 0,
            sprite_patterns: [0; MAX_SPRITES_PER_LINE],
            sprite_positions: [0; MAX_SPRITES_PER_LINE],
            sprite_priorities: [0; MAX_SPRITES_PER_LINE],
            sprite_indexes: [0; MAX_SPRITES_PER_LINE],
            frame_buffer: vec![0; FRAME_WIDTH * FRAME_HEIGHT * 4],
        }
    }

    /// Applies timing parameters from the console configuration.
    pub fn configure(&mut self, nmi_delay_cycles: u8, odd_frame_skip: bool) {
        self.nmi_delay_cycles = nmi_delay_cycles;
        self.odd_frame_skip = odd_frame_skip;
    }

    /// Register and timing reset. Nametable, palette and OAM contents survive.
    pub fn reset(&mut self) {
        self.ctrl = 0;
        self.mask = 0;
        self.status = 0;
        self.oam_addr = 0;
        self.v = 0;
        self.t = 0;
        self.fine_x = 0;
        self.write_toggle = false;
        self.read_buffer = 0;
        self.open_bus = 0;
        self.scanline = PRE_RENDER_LINE;
        self.cycle = 0;
        self.odd_frame = false;
        self.frame_complete = false;
        self.vblank_suppress = false;
        self.nmi_line = false;
        self.nmi_countdown = 0;
        self.nmi_pending = false;
        self.sprite_count = 0;
        self.bg_shift_pattern_lo = 0;
        self.bg_shift_pattern_hi = 0;
        self.bg_shift_attr_lo = 0;
        self.bg_shift_attr_hi = 0;
    }

    pub fn set_mirroring(&mut self, mirroring: Mirroring) {
        self.mirroring = mirroring;
    }

    pub fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    pub fn frame_buffer(&self) -> &[u8] {
        &self.frame_buffer
    }

    pub fn scanline(&self) -> u16 {
        self.scanline
    }

    pub fn cycle(&self) -> u16 {
        self.cycle
    }

    pub fn ctrl(&self) -> u8 {
        self.ctrl
    }

    pub fn mask(&self) -> u8 {
        self.mask
    }

    pub fn status(&self) -> u8 {
        self.status
    }

    /// `(v, t, fine_x, w)`
    pub fn scroll_registers(&self) -> (u16, u16, u8, bool) {
        (self.v, self.t, self.fine_x, self.write_toggle)
    }

    pub fn sprite_count(&self) -> usize {
        self.sprite_count
    }

    pub fn show_background(&self) -> bool {
        self.mask & MASK_SHOW_BG != 0
    }

    pub fn show_sprites(&self) -> bool {
        self.mask & MASK_SHOW_SPRITES != 0
    }

    pub fn peek_oam(&self, index: u8) -> u8 {
        self.oam[index as usize]
    }

    pub fn peek_palette(&self, index: usize) -> u8 {
        self.palette_ram[index % self.palette_ram.len()]
    }

    pub fn take_frame_complete(&mut self) -> bool {
        std::mem::take(&mut self.frame_complete)
    }

    pub fn take_nmi(&mut self) -> bool {
        std::mem::take(&mut self.nmi_pending)
    }

    /// Samples the rendered frame around `(x, y)` the way a light gun photodiode would.
    pub fn light_sensed(&self, x: i16, y: i16) -> bool {
        if x < 0 || y < 0 || x >= FRAME_WIDTH as i16 || y >= FRAME_HEIGHT as i16 {
            return false;
        }

        let mut brightest = 0u16;
        for dy in -1..=1 {
            for dx in -1..=1 {
                let sx = (x + dx).clamp(0, FRAME_WIDTH as i16 - 1) as usize;
                let sy = (y + dy).clamp(0, FRAME_HEIGHT as i16 - 1) as usize;
                let idx = (sy * FRAME_WIDTH + sx) * 4;
                let luma = self.frame_buffer[idx..idx + 3]
                    .iter()
                    .map(|&c| c as u16)
                    .sum();
                brightest = brightest.max(luma);
            }
        }

        brightest >= 620
    }

    pub fn read_register(&mut self, addr: u16, mapper: &mut dyn Mapper) -> u8 {
        let value = match addr & 0x0007 {
            2 => {
                // A read just before VBlank starts hides the flag and its NMI for a frame.
                if self.scanline == VBLANK_LINE && self.cycle == 0 {
                    self.vblank_suppress = true;
                }

                let value = (self.status & 0xE0) | (self.open_bus & 0x1F);
                self.status &= !STATUS_VBLANK;
                self.write_toggle = false;
                self.update_nmi_line();
                value
            }
            4 => self.oam[self.oam_addr as usize],
            7 => {
                let addr = self.v & 0x3FFF;
                let value = self.vram_read(addr, mapper);
                let result = if addr >= 0x3F00 {
                    self.read_buffer = self.vram_read(addr - 0x1000, mapper);
                    value
                } else {
                    std::mem::replace(&mut self.read_buffer, value)
                };
                self.increment_vram_addr_cpu_access();
                result
            }
            _ => self.open_bus,
        };
        self.open_bus = value;
        value
    }

    pub fn write_register(&mut self, addr: u16, value: u8, mapper: &mut dyn Mapper) {
        self.open_bus = value;
        match addr & 0x0007 {
            0 => {
                self.ctrl = value;
                self.t = (self.t & !0x0C00) | (((value as u16) & 0x03) << 10);
                mapper.set_sprite_size(value & CTRL_SPRITE_SIZE_16 != 0);
                self.update_nmi_line();
            }
            1 => self.mask = value,
            3 => self.oam_addr = value,
            4 => {
                self.oam[self.oam_addr as usize] = value;
                self.oam_addr = self.oam_addr.wrapping_add(1);
            }
            5 => {
                if !self.write_toggle {
                    self.fine_x = value & 0x07;
                    self.t = (self.t & !0x001F) | ((value as u16) >> 3);
                } else {
                    self.t = (self.t & !0x73E0)
                        | (((value as u16) & 0x07) << 12)
                        | (((value as u16) >> 3) << 5);
                }
                self.write_toggle = !self.write_toggle;
            }
            6 => {
                if !self.write_toggle {
                    self.t = (self.t & 0x00FF) | (((value as u16) & 0x3F) << 8);
                } else {
                    self.t = (self.t & 0x7F00) | value as u16;
                    self.v = self.t;
                }
                self.write_toggle = !self.write_toggle;
            }
            7 => {
                self.vram_write(self.v & 0x3FFF, value, mapper);
                self.increment_vram_addr_cpu_access();
            }
            _ => {}
        }
    }

    pub fn write_oam_dma(&mut self, bytes: &[u8; 256]) {
        for &byte in bytes {
            self.oam[self.oam_addr as usize] = byte;
            self.oam_addr = self.oam_addr.wrapping_add(1);
        }
    }

    /// Advances one PPU cycle.
    pub fn step(&mut self, mapper: &mut dyn Mapper) {
        if self.nmi_countdown > 0 {
            self.nmi_countdown -= 1;
            if self.nmi_countdown == 0 && self.nmi_line {
                self.nmi_pending = true;
            }
        }

        let visible_line = self.scanline < 240;
        let pre_render = self.scanline == PRE_RENDER_LINE;
        let render_line = visible_line || pre_render;
        let rendering_enabled = self.rendering_enabled();

        if render_line && rendering_enabled {
            self.step_background(pre_render, mapper);
        }

        if visible_line && (1..=256).contains(&self.cycle) {
            self.render_pixel();
        }

        if render_line && rendering_enabled && self.cycle == 257 {
            if visible_line {
                self.evaluate_sprites(mapper);
            } else {
                self.sprite_count = 0;
            }
        }

        if self.scanline == VBLANK_LINE && self.cycle == 1 {
            self.frame_complete = true;
            if !self.vblank_suppress {
                self.status |= STATUS_VBLANK;
            }
            self.vblank_suppress = false;
            self.update_nmi_line();
        }

        if pre_render && self.cycle == 1 {
            self.status &= !(STATUS_VBLANK | STATUS_SPRITE_ZERO_HIT | STATUS_SPRITE_OVERFLOW);
            self.update_nmi_line();
        }

        mapper.step_video(
            self.scanline,
            self.cycle,
            self.show_background(),
            self.show_sprites(),
        );

        self.advance(pre_render && rendering_enabled);
    }

    fn advance(&mut self, rendering_pre_render: bool) {
        if rendering_pre_render && self.odd_frame && self.odd_frame_skip && self.cycle == 339 {
            self.cycle = 0;
            self.scanline = 0;
            self.odd_frame = false;
            return;
        }

        self.cycle += 1;
        if self.cycle == CYCLES_PER_LINE {
            self.cycle = 0;
            self.scanline += 1;
            if self.scanline == LINES_PER_FRAME {
                self.scanline = 0;
                self.odd_frame = !self.odd_frame;
            }
        }
    }

    fn step_background(&mut self, pre_render: bool, mapper: &mut dyn Mapper) {
        let cycle = self.cycle;
        // Shifters run one dot behind the fetches: the tiles loaded at 329 and 337 sit
        // in the high byte by cycle 1 of the next line.
        if (2..=257).contains(&cycle) || (322..=337).contains(&cycle) {
            self.shift_background_registers();
        }
        if ((9..=257).contains(&cycle) || (329..=337).contains(&cycle)) && (cycle - 1) & 0x07 == 0 {
            self.load_background_shifters();
        }

        if (1..=256).contains(&cycle) || (321..=336).contains(&cycle) {
            match (cycle - 1) & 0x07 {
                0 => {
                    let addr = 0x2000 | (self.v & 0x0FFF);
                    let tile = self.vram_read(addr, mapper);
                    self.next_tile_id = mapper.enhance_tile_index(addr, tile);
                }
                2 => {
                    let addr = 0x23C0
                        | (self.v & 0x0C00)
                        | ((self.v >> 4) & 0x0038)
                        | ((self.v >> 2) & 0x0007);
                    let shift = ((self.v >> 4) & 0x04) | (self.v & 0x02);
                    let palette = (self.vram_read(addr, mapper) >> shift) & 0x03;
                    self.next_tile_attr = mapper.enhance_tile_attributes(addr, palette) & 0x03;
                }
                4 => self.next_tile_lsb = self.vram_read(self.background_pattern_addr(), mapper),
                6 => {
                    let addr = self.background_pattern_addr() + 8;
                    self.next_tile_msb = self.vram_read(addr, mapper);
                }
                7 => self.increment_coarse_x(),
                _ => {}
            }
        }

        match cycle {
            256 => self.increment_y(),
            257 => self.copy_horizontal_bits(),
            280..=304 if pre_render => self.copy_vertical_bits(),
            338 | 340 => {
                self.next_tile_id = self.vram_read(0x2000 | (self.v & 0x0FFF), mapper);
            }
            _ => {}
        }
    }

    fn background_pattern_addr(&self) -> u16 {
        let table = if self.ctrl & CTRL_BG_TABLE != 0 { 0x1000 } else { 0 };
        let fine_y = (self.v >> 12) & 0x07;
        table + (self.next_tile_id as u16) * 16 + fine_y
    }

    fn rendering_enabled(&self) -> bool {
        self.mask & (MASK_SHOW_BG | MASK_SHOW_SPRITES) != 0
    }

    fn update_nmi_line(&mut self) {
        let line = self.ctrl & CTRL_NMI_ENABLE != 0 && self.status & STATUS_VBLANK != 0;
        if line && !self.nmi_line {
            if self.nmi_delay_cycles == 0 {
                self.nmi_pending = true;
            } else {
                self.nmi_countdown = self.nmi_delay_cycles;
            }
        } else if !line {
            self.nmi_countdown = 0;
        }
        self.nmi_line = line;
    }

    fn render_pixel(&mut self) {
        let x = (self.cycle - 1) as usize;
        let y = self.scanline as usize;

        let mut background = self.background_pixel();
        let (slot, mut sprite) = self.sprite_pixel(x);
        if x < 8 && self.mask & MASK_SHOW_BG_LEFT == 0 {
            background = 0;
        }
        if x < 8 && self.mask & MASK_SHOW_SPRITE_LEFT == 0 {
            sprite = 0;
        }

        let bg_opaque = background & 0x03 != 0;
        let sprite_opaque = sprite & 0x03 != 0;
        let color = match (bg_opaque, sprite_opaque) {
            (false, false) => 0,
            (false, true) => 0x10 | sprite,
            (true, false) => background,
            (true, true) => {
                if self.sprite_indexes[slot] == 0 && x < 255 {
                    self.status |= STATUS_SPRITE_ZERO_HIT;
                }
                if self.sprite_priorities[slot] == 0 {
                    0x10 | sprite
                } else {
                    background
                }
            }
        };

        let rgba = palette::rgba(self.palette_ram[Self::palette_index(color as u16)]);
        let pixel = (y * FRAME_WIDTH + x) * 4;
        self.frame_buffer[pixel..pixel + 4].copy_from_slice(&rgba);
    }

    fn background_pixel(&self) -> u8 {
        if !self.show_background() {
            return 0;
        }
        let bit = 0x8000u16 >> self.fine_x;
        let plane = |register: u16, shift: u8| ((register & bit != 0) as u8) << shift;

        plane(self.bg_shift_attr_hi, 3)
            | plane(self.bg_shift_attr_lo, 2)
            | plane(self.bg_shift_pattern_hi, 1)
            | plane(self.bg_shift_pattern_lo, 0)
    }

    /// Front-most opaque sprite pixel at `x`, as `(slot, palette << 2 | color)`.
    fn sprite_pixel(&self, x: usize) -> (usize, u8) {
        if !self.show_sprites() {
            return (0, 0);
        }
        for slot in 0..self.sprite_count {
            let offset = x as i32 - self.sprite_positions[slot] as i32;
            if !(0..8).contains(&offset) {
                continue;
            }
            let color = ((self.sprite_patterns[slot] >> ((7 - offset) * 4)) & 0x0F) as u8;
            if color & 0x03 == 0 {
                continue;
            }
            return (slot, color);
        }
        (0, 0)
    }

    fn evaluate_sprites(&mut self, mapper: &mut dyn Mapper) {
        let height: i32 = if self.ctrl & CTRL_SPRITE_SIZE_16 != 0 { 16 } else { 8 };
        let mut count = 0;

        mapper.set_sprite_fetch(true);
        for index in 0..64 {
            let base = index * 4;
            let y = self.oam[base];
            let row = self.scanline as i32 - y as i32;
            if !(0..height).contains(&row) {
                continue;
            }
            if count == MAX_SPRITES_PER_LINE {
                self.status |= STATUS_SPRITE_OVERFLOW;
                break;
            }

            let tile = self.oam[base + 1];
            let attributes = self.oam[base + 2];
            let pattern = self.fetch_sprite_pattern(tile, attributes, row, height, mapper);
            self.sprite_patterns[count] = pattern;
            self.sprite_positions[count] = self.oam[base + 3];
            self.sprite_priorities[count] = (attributes >> 5) & 0x01;
            self.sprite_indexes[count] = index as u8;
            count += 1;
        }
        mapper.set_sprite_fetch(false);

        self.sprite_count = count;
    }

    fn fetch_sprite_pattern(
        &mut self,
        tile: u8,
        attributes: u8,
        row: i32,
        height: i32,
        mapper: &mut dyn Mapper,
    ) -> u32 {
        let mut row = row as u16;
        if attributes & 0x80 != 0 {
            row = height as u16 - 1 - row;
        }

        let addr = if height == 8 {
            let table = if self.ctrl & CTRL_SPRITE_TABLE != 0 { 0x1000 } else { 0 };
            table + tile as u16 * 16 + row
        } else {
            // 8x16 sprites pick their pattern table from bit 0 of the tile number.
            let table = 0x1000 * (tile & 0x01) as u16;
            let mut tile = (tile & 0xFE) as u16;
            if row > 7 {
                tile += 1;
                row -= 8;
            }
            table + tile * 16 + row
        };

        let mut low = self.vram_read(addr, mapper);
        let mut high = self.vram_read(addr + 8, mapper);
        if attributes & 0x40 != 0 {
            low = low.reverse_bits();
            high = high.reverse_bits();
        }

        let palette = ((attributes & 0x03) << 2) as u32;
        let mut data = 0u32;
        for _ in 0..8 {
            let color = ((high >> 6) & 0x02) | (low >> 7);
            data = (data << 4) | palette | color as u32;
            low <<= 1;
            high <<= 1;
        }
        data
    }

    fn shift_background_registers(&mut self) {
        self.bg_shift_pattern_lo <<= 1;
        self.bg_shift_pattern_hi <<= 1;
        self.bg_shift_attr_lo <<= 1;
        self.bg_shift_attr_hi <<= 1;
    }

    fn load_background_shifters(&mut self) {
        let fill = |bit: u8| if self.next_tile_attr & bit != 0 { 0xFF } else { 0x00 };
        let attr_lo = fill(0x01);
        let attr_hi = fill(0x02);

        self.bg_shift_pattern_lo = (self.bg_shift_pattern_lo & 0xFF00) | self.next_tile_lsb as u16;
        self.bg_shift_pattern_hi = (self.bg_shift_pattern_hi & 0xFF00) | self.next_tile_msb as u16;
        self.bg_shift_attr_lo = (self.bg_shift_attr_lo & 0xFF00) | attr_lo;
        self.bg_shift_attr_hi = (self.bg_shift_attr_hi & 0xFF00) | attr_hi;
    }

    fn increment_coarse_x(&mut self) {
        if self.v & 0x001F == 31 {
            self.v &= !0x001F;
            self.v ^= 0x0400;
        } else {
            self.v += 1;
        }
    }

    fn increment_y(&mut self) {
        if self.v & 0x7000 != 0x7000 {
            self.v += 0x1000;
            return;
        }

        self.v &= !0x7000;
        let mut y = (self.v & 0x03E0) >> 5;
        match y {
            29 => {
                y = 0;
                self.v ^= 0x0800;
            }
            31 => y = 0,
            _ => y += 1,
        }
        self.v = (self.v & !0x03E0) | (y << 5);
    }

    fn copy_horizontal_bits(&mut self) {
        self.v = (self.v & !0x041F) | (self.t & 0x041F);
    }

    fn copy_vertical_bits(&mut self) {
        self.v = (self.v & !0x7BE0) | (self.t & 0x7BE0);
    }

    fn increment_vram_addr_cpu_access(&mut self) {
        // $2007 accesses while rendering glitch both scroll counters instead.
        if self.rendering_enabled() && (self.scanline < 240 || self.scanline == PRE_RENDER_LINE) {
            self.increment_coarse_x();
            self.increment_y();
        } else {
            let step = if self.ctrl & CTRL_VRAM_INC_32 != 0 { 32 } else { 1 };
            self.v = self.v.wrapping_add(step) & 0x7FFF;
        }
    }

    fn vram_read(&mut self, addr: u16, mapper: &mut dyn Mapper) -> u8 {
        let addr = addr & 0x3FFF;
        match addr {
            0x0000..=0x1FFF => mapper.chr_read(addr),
            0x2000..=0x3EFF => {
                let addr = 0x2000 | (addr & 0x0FFF);
                match mapper.read_nametable(addr, &self.vram) {
                    Some(value) => value,
                    None => self.vram[self.mirroring.vram_index(addr)],
                }
            }
            _ => self.palette_ram[Self::palette_index(addr)],
        }
    }

    fn vram_write(&mut self, addr: u16, value: u8, mapper: &mut dyn Mapper) {
        let addr = addr & 0x3FFF;
        match addr {
            0x0000..=0x1FFF => mapper.chr_write(addr, value),
            0x2000..=0x3EFF => {
                let addr = 0x2000 | (addr & 0x0FFF);
                if !mapper.write_nametable(addr, value, &mut self.vram) {
                    self.vram[self.mirroring.vram_index(addr)] = value;
                }
            }
            _ => self.palette_ram[Self::palette_index(addr)] = value & 0x3F,
        }
    }

    /// Sprite backdrop entries $3F10/$14/$18/$1C alias the background ones.
    fn palette_index(addr: u16) -> usize {
        let index = (addr & 0x1F) as usize;
        if index >= 16 && index & 0x03 == 0 {
            index - 16
        } else {
            index
        }
    }
}
