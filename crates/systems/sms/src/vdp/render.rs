//! Scanline renderer: Mode 4 and the TMS9918 legacy modes.

use emu_core::ppu::{IndexedPalette, Planar4BppDecoder, TMS9918_PALETTE};

use super::{Vdp, SCREEN_WIDTH, STATUS_COLLISION, STATUS_OVERFLOW};

const WIDTH: usize = SCREEN_WIDTH as usize;
/// Phaser sensitivity: lines above/below the aim point that still register.
const PHASER_RANGE: i32 = 4;

fn vram_planes(vram: &[u8], addr: usize) -> [u8; 4] {
    [
        vram[addr & 0x3FFF],
        vram[(addr + 1) & 0x3FFF],
        vram[(addr + 2) & 0x3FFF],
        vram[(addr + 3) & 0x3FFF],
    ]
}

impl Vdp {
    pub(super) fn render_line(&mut self, line: u32) {
        let mut row = [self.backdrop_color(); WIDTH];
        if self.display_enabled() {
            if self.mode4() {
                self.render_mode4(line as usize, &mut row);
            } else {
                self.render_tms(line as usize, &mut row);
            }
        }
        self.sense_light(line as i32, &row);

        let start = line as usize * WIDTH;
        self.frame.pixels[start..start + WIDTH].copy_from_slice(&row);
    }

    /// Light phaser: the photodiode fires while the beam draws a bright
    /// pixel close to where the gun is aimed.
    fn sense_light(&mut self, line: i32, row: &[u32; WIDTH]) {
        let Some((x, y)) = self.phaser_target else {
            return;
        };
        if (line - y).abs() > PHASER_RANGE || !(0..WIDTH as i32).contains(&x) {
            return;
        }
        let lo = (x - 2).max(0) as usize;
        let hi = (x + 2).min(WIDTH as i32 - 1) as usize;
        let lit = row[lo..=hi].iter().any(|&rgb| {
            let (r, g, b) = ((rgb >> 16) & 0xFF, (rgb >> 8) & 0xFF, rgb & 0xFF);
            r.max(g).max(b) >= 0xAA
        });
        if lit {
            self.light_detected = true;
            self.h_latch = ((x + 40) / 2) as u8;
        }
    }

    // ---- Mode 4 ----

    fn name_table_base(&self) -> usize {
        if self.active_height() > 192 {
            (((self.regs[2] & 0x0C) as usize) << 10) | 0x700
        } else {
            ((self.regs[2] & 0x0E) as usize) << 10
        }
    }

    fn render_mode4(&mut self, line: usize, row: &mut [u32; WIDTH]) {
        let mut bg = [0u8; WIDTH];
        self.mode4_background(line, &mut bg);
        let mut sprites = [0u8; WIDTH];
        self.mode4_sprites(line, &mut sprites);

        let mask_column = self.regs[0] & 0x20 != 0;
        for x in 0..WIDTH {
            if mask_column && x < 8 {
                continue;
            }
            let pixel = bg[x];
            let index = if sprites[x] != 0 && pixel & 0x20 == 0 {
                sprites[x]
            } else {
                pixel & 0x1F
            };
            row[x] = self.palette.get_color(index as usize);
        }
    }

    /// Background palette indices for one line; bit 5 marks opaque pixels
    /// of priority tiles, which are drawn over sprites.
    fn mode4_background(&self, line: usize, out: &mut [u8; WIDTH]) {
        let rows = if self.active_height() > 192 { 32 } else { 28 };
        let hscroll = if self.regs[0] & 0x40 != 0 && line < 16 {
            0
        } else {
            self.regs[8] as usize
        };
        let name_base = self.name_table_base();

        let mut cached: Option<(usize, [u8; 8], u16)> = None;
        for (x, px) in out.iter_mut().enumerate() {
            let vscroll = if self.regs[0] & 0x80 != 0 && x >= 192 {
                0
            } else {
                self.vscroll as usize
            };
            let src_x = x.wrapping_sub(hscroll) & 0xFF;
            let src_y = (line + vscroll) % (rows * 8);
            let entry_addr = name_base + ((src_y / 8) * 32 + src_x / 8) * 2;

            let (pixels, entry) = match cached {
                Some((addr, pixels, entry)) if addr == entry_addr => (pixels, entry),
                _ => {
                    let entry = u16::from_le_bytes([
                        self.vram[entry_addr & 0x3FFF],
                        self.vram[(entry_addr + 1) & 0x3FFF],
                    ]);
                    let mut fine_y = src_y & 7;
                    if entry & 0x0400 != 0 {
                        fine_y = 7 - fine_y;
                    }
                    let pattern = (entry & 0x01FF) as usize;
                    let pixels = Planar4BppDecoder::row_from_planes(vram_planes(
                        &self.vram,
                        pattern * 32 + fine_y * 4,
                    ));
                    cached = Some((entry_addr, pixels, entry));
                    (pixels, entry)
                }
            };

            let mut col = src_x & 7;
            if entry & 0x0200 != 0 {
                col = 7 - col;
            }
            let color = pixels[col];
            let palette = if entry & 0x0800 != 0 { 0x10 } else { 0 };
            let priority = if entry & 0x1000 != 0 && color != 0 { 0x20 } else { 0 };
            *px = color | palette | priority;
        }
    }

    fn mode4_sprites(&mut self, line: usize, out: &mut [u8; WIDTH]) {
        let sat = ((self.regs[5] & 0x7E) as usize) << 7;
        let tall = self.regs[1] & 0x02 != 0;
        let zoom = if self.regs[1] & 0x01 != 0 { 2 } else { 1 };
        let height = (if tall { 16 } else { 8 }) * zoom;
        let pattern_base = if self.regs[6] & 0x04 != 0 { 256 } else { 0 };
        let shift = if self.regs[0] & 0x08 != 0 { 8 } else { 0 };
        let terminator = self.active_height() == 192;

        let line = line as i32;
        let mut drawn = 0;
        for i in 0..64 {
            let y = self.vram[sat + i];
            if terminator && y == 0xD0 {
                break;
            }
            let mut top = y as i32 + 1;
            if top > 240 {
                top -= 256;
            }
            if line < top || line >= top + height {
                continue;
            }
            drawn += 1;
            if drawn > 8 {
                self.status |= STATUS_OVERFLOW;
                break;
            }

            let x = self.vram[sat + 0x80 + i * 2] as i32 - shift;
            let mut pattern = self.vram[sat + 0x81 + i * 2] as usize;
            if tall {
                pattern &= 0xFE;
            }
            let sprite_row = ((line - top) / zoom) as usize;
            let tile = pattern_base + pattern + sprite_row / 8;
            let pixels = Planar4BppDecoder::row_from_planes(vram_planes(
                &self.vram,
                tile * 32 + (sprite_row & 7) * 4,
            ));

            for px in 0..(8 * zoom) {
                let sx = x + px;
                if !(0..WIDTH as i32).contains(&sx) {
                    continue;
                }
                let color = pixels[(px / zoom) as usize];
                if color == 0 {
                    continue;
                }
                let slot = &mut out[sx as usize];
                if *slot != 0 {
                    self.status |= STATUS_COLLISION;
                } else {
                    *slot = 0x10 | color;
                }
            }
        }
    }

    // ---- TMS9918 modes ----

    fn tms_color(&self, index: u8) -> u32 {
        if index == 0 {
            self.backdrop_color()
        } else {
            TMS9918_PALETTE[index as usize & 0x0F]
        }
    }

    fn render_tms(&mut self, line: usize, row: &mut [u32; WIDTH]) {
        let m1 = self.regs[1] & 0x10 != 0;
        let m2 = self.regs[0] & 0x02 != 0;
        let m3 = self.regs[1] & 0x08 != 0;

        if m1 {
            self.tms_text(line, row);
            return;
        }
        if m3 {
            self.tms_multicolor(line, row);
        } else if m2 {
            self.tms_graphics2(line, row);
        } else {
            self.tms_graphics1(line, row);
        }
        self.tms_sprites(line, row);
    }

    fn tms_name_base(&self) -> usize {
        ((self.regs[2] & 0x0F) as usize) << 10
    }

    fn tms_draw_pattern(&self, row: &mut [u32], pattern: u8, color: u8) {
        let fg = self.tms_color(color >> 4);
        let bg = self.tms_color(color & 0x0F);
        for (x, px) in row.iter_mut().enumerate().take(8) {
            *px = if pattern & (0x80 >> x) != 0 { fg } else { bg };
        }
    }

    fn tms_graphics1(&self, line: usize, row: &mut [u32; WIDTH]) {
        let names = self.tms_name_base() + (line / 8) * 32;
        let patterns = ((self.regs[4] & 0x07) as usize) << 11;
        let colors = (self.regs[3] as usize) << 6;
        for column in 0..32 {
            let name = self.vram[(names + column) & 0x3FFF] as usize;
            let pattern = self.vram[(patterns + name * 8 + (line & 7)) & 0x3FFF];
            let color = self.vram[(colors + name / 8) & 0x3FFF];
            self.tms_draw_pattern(&mut row[column * 8..column * 8 + 8], pattern, color);
        }
    }

    fn tms_graphics2(&self, line: usize, row: &mut [u32; WIDTH]) {
        let names = self.tms_name_base() + (line / 8) * 32;
        let pattern_base = ((self.regs[4] & 0x04) as usize) << 11;
        let pattern_mask = (((self.regs[4] & 0x03) as usize) << 11) | 0x7FF;
        let color_base = ((self.regs[3] & 0x80) as usize) << 6;
        let color_mask = (((self.regs[3] & 0x7F) as usize) << 6) | 0x3F;
        let third = (line / 64) * 256;
        for column in 0..32 {
            let name = self.vram[(names + column) & 0x3FFF] as usize;
            let offset = (third + name) * 8 + (line & 7);
            let pattern = self.vram[(pattern_base | (offset & pattern_mask)) & 0x3FFF];
            let color = self.vram[(color_base | (offset & color_mask)) & 0x3FFF];
            self.tms_draw_pattern(&mut row[column * 8..column * 8 + 8], pattern, color);
        }
    }

    fn tms_multicolor(&self, line: usize, row: &mut [u32; WIDTH]) {
        let names = self.tms_name_base() + (line / 8) * 32;
        let patterns = ((self.regs[4] & 0x07) as usize) << 11;
        for column in 0..32 {
            let name = self.vram[(names + column) & 0x3FFF] as usize;
            let offset = name * 8 + ((line / 8) & 3) * 2 + ((line / 4) & 1);
            let color = self.vram[(patterns + offset) & 0x3FFF];
            let (left, right) = (self.tms_color(color >> 4), self.tms_color(color & 0x0F));
            let cells = &mut row[column * 8..column * 8 + 8];
            cells[..4].fill(left);
            cells[4..].fill(right);
        }
    }

    /// 40 columns of 6-pixel characters inside an 8-pixel border.
    fn tms_text(&self, line: usize, row: &mut [u32; WIDTH]) {
        let names = self.tms_name_base() + (line / 8) * 40;
        let patterns = ((self.regs[4] & 0x07) as usize) << 11;
        let fg = self.tms_color(self.regs[7] >> 4);
        let bg = self.tms_color(self.regs[7] & 0x0F);
        for column in 0..40 {
            let name = self.vram[(names + column) & 0x3FFF] as usize;
            let pattern = self.vram[(patterns + name * 8 + (line & 7)) & 0x3FFF];
            for bit in 0..6 {
                let lit = pattern & (0x80 >> bit) != 0;
                row[8 + column * 6 + bit] = if lit { fg } else { bg };
            }
        }
    }

    fn tms_sprites(&mut self, line: usize, row: &mut [u32; WIDTH]) {
        let sat = ((self.regs[5] & 0x7F) as usize) << 7;
        let generator = ((self.regs[6] & 0x07) as usize) << 11;
        let large = self.regs[1] & 0x02 != 0;
        let mag = if self.regs[1] & 0x01 != 0 { 2 } else { 1 };
        let size = if large { 16 } else { 8 };
        let height = size * mag;

        let line = line as i32;
        let mut drawn = 0;
        let mut occupied = [false; WIDTH];
        for i in 0..32 {
            let entry = sat + i * 4;
            let y = self.vram[entry];
            if y == 0xD0 {
                break;
            }
            let mut top = y as i32 + 1;
            if top > 0xE0 {
                top -= 256;
            }
            if line < top || line >= top + height {
                continue;
            }
            drawn += 1;
            if drawn > 4 {
                if self.status & STATUS_OVERFLOW == 0 {
                    self.status = (self.status & 0xE0) | STATUS_OVERFLOW | i as u8;
                }
                break;
            }

            let attr = self.vram[entry + 3];
            let x = self.vram[entry + 1] as i32 - if attr & 0x80 != 0 { 32 } else { 0 };
            let mut pattern = self.vram[entry + 2] as usize;
            if large {
                pattern &= 0xFC;
            }
            let sprite_row = ((line - top) / mag) as usize;
            let color = self.tms_color(attr & 0x0F);
            let transparent = attr & 0x0F == 0;

            for px in 0..(size * mag) {
                let sx = x + px;
                if !(0..WIDTH as i32).contains(&sx) {
                    continue;
                }
                let col = (px / mag) as usize;
                // 16x16 sprites are four 8x8 quadrants, left column first.
                let addr = generator + pattern * 8 + (col / 8) * 16 + sprite_row;
                if self.vram[addr & 0x3FFF] & (0x80 >> (col & 7)) == 0 {
                    continue;
                }
                let sx = sx as usize;
                if occupied[sx] {
                    self.status |= STATUS_COLLISION;
                    continue;
                }
                occupied[sx] = true;
                if !transparent {
                    row[sx] = color;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::VdpModel;
    use super::*;
    use emu_core::apu::{TimingMode, CYCLES_PER_LINE};

    fn set_reg(vdp: &mut Vdp, reg: u8, value: u8) {
        vdp.write_control(value);
        vdp.write_control(0x80 | reg);
    }

    fn poke(vdp: &mut Vdp, addr: u16, data: &[u8]) {
        vdp.write_control(addr as u8);
        vdp.write_control(0x40 | (addr >> 8) as u8);
        for &b in data {
            vdp.write_data(b);
        }
    }

    fn poke_cram(vdp: &mut Vdp, index: u8, colors: &[u8]) {
        vdp.write_control(index);
        vdp.write_control(0xC0);
        for &c in colors {
            vdp.write_data(c);
        }
    }

    fn run_frame(vdp: &mut Vdp) {
        while !vdp.advance(CYCLES_PER_LINE) {}
    }

    /// Mode 4, display on, name table at 0x3800, SAT at 0x3F00.
    fn mode4_vdp() -> Vdp {
        let mut vdp = Vdp::new(VdpModel::Sms, TimingMode::Ntsc);
        set_reg(&mut vdp, 0, 0x04);
        set_reg(&mut vdp, 1, 0x40);
        set_reg(&mut vdp, 2, 0xFF);
        set_reg(&mut vdp, 5, 0xFF);
        set_reg(&mut vdp, 6, 0xFB);
        // Empty sprite table
        poke(&mut vdp, 0x3F00, &[0xD0]);
        vdp
    }

    #[test]
    fn test_mode4_tile_colors() {
        let mut vdp = mode4_vdp();
        // Tile 1: row 0 uses colour 1 on the left half, colour 2 on the right.
        poke(&mut vdp, 0x0020, &[0xF0, 0x0F, 0x00, 0x00]);
        poke(&mut vdp, 0x3800, &[0x01, 0x00]);
        poke_cram(&mut vdp, 1, &[0x03, 0x0C]);
        run_frame(&mut vdp);
        let pixels = &vdp.display().pixels;
        assert_eq!(pixels[0], 0xFF0000);
        assert_eq!(pixels[4], 0x00FF00);
        // Tile 0 everywhere else: colour 0 of the background palette.
        assert_eq!(pixels[8], 0x000000);
    }

    #[test]
    fn test_mode4_hflip_and_palette() {
        let mut vdp = mode4_vdp();
        poke(&mut vdp, 0x0020, &[0x80, 0x00, 0x00, 0x00]);
        // Tile 1, horizontal flip, sprite palette
        poke(&mut vdp, 0x3800, &[0x01, 0x0A]);
        poke_cram(&mut vdp, 0x11, &[0x30]);
        run_frame(&mut vdp);
        let pixels = &vdp.display().pixels;
        assert_eq!(pixels[7], 0x0000FF);
        assert_eq!(pixels[0], 0x000000);
    }

    #[test]
    fn test_mode4_hscroll() {
        let mut vdp = mode4_vdp();
        poke(&mut vdp, 0x0020, &[0x80, 0x00, 0x00, 0x00]);
        poke(&mut vdp, 0x3800, &[0x01, 0x00]);
        poke_cram(&mut vdp, 1, &[0x03]);
        set_reg(&mut vdp, 8, 3);
        run_frame(&mut vdp);
        assert_eq!(vdp.display().pixels[3], 0xFF0000);
        assert_eq!(vdp.display().pixels[0], 0x000000);
    }

    #[test]
    fn test_mode4_sprite_and_collision() {
        let mut vdp = mode4_vdp();
        // Sprite tile 0x100 (pattern base at 0x2000 via reg6), solid colour 1 row
        poke(&mut vdp, 0x2000, &[0xFF, 0x00, 0x00, 0x00]);
        poke_cram(&mut vdp, 0x11, &[0x3F]);
        // Two overlapping sprites on line 10, then the terminator
        poke(&mut vdp, 0x3F00, &[9, 9, 0xD0]);
        poke(&mut vdp, 0x3F80, &[16, 0, 20, 0]);
        set_reg(&mut vdp, 6, 0xFF);
        run_frame(&mut vdp);
        let pixels = &vdp.display().pixels;
        assert_eq!(pixels[10 * 256 + 16], 0xFFFFFF);
        assert_eq!(pixels[10 * 256 + 27], 0xFFFFFF);
        assert_eq!(pixels[11 * 256 + 16], 0x000000);
        assert_ne!(vdp.read_status() & STATUS_COLLISION, 0);
    }

    #[test]
    fn test_mode4_sprite_overflow() {
        let mut vdp = mode4_vdp();
        poke(&mut vdp, 0x3F00, &[50; 9]);
        poke(&mut vdp, 0x3F09, &[0xD0]);
        run_frame(&mut vdp);
        assert_ne!(vdp.read_status() & STATUS_OVERFLOW, 0);
    }

    #[test]
    fn test_column_mask_shows_backdrop() {
        let mut vdp = mode4_vdp();
        set_reg(&mut vdp, 0, 0x24);
        set_reg(&mut vdp, 7, 0x02);
        poke_cram(&mut vdp, 0x12, &[0x0C]);
        run_frame(&mut vdp);
        assert_eq!(vdp.display().pixels[0], 0x00FF00);
        assert_eq!(vdp.display().pixels[8], 0x000000);
        assert!(vdp.left_column_masked());
    }

    #[test]
    fn test_graphics1_pattern() {
        let mut vdp = Vdp::new(VdpModel::Tms9918, TimingMode::Ntsc);
        set_reg(&mut vdp, 1, 0x40);
        set_reg(&mut vdp, 2, 0x0E); // names at 0x3800
        set_reg(&mut vdp, 3, 0x80); // colours at 0x2000
        set_reg(&mut vdp, 4, 0x00); // patterns at 0x0000
        set_reg(&mut vdp, 5, 0x7E); // sprites at 0x3F00
        poke(&mut vdp, 0x3F00, &[0xD0]);
        poke(&mut vdp, 0x0008, &[0xAA]);
        poke(&mut vdp, 0x3800, &[0x01]);
        poke(&mut vdp, 0x2000, &[0xF4]);
        run_frame(&mut vdp);
        let pixels = &vdp.display().pixels;
        assert_eq!(pixels[0], TMS9918_PALETTE[15]);
        assert_eq!(pixels[1], TMS9918_PALETTE[4]);
    }

    #[test]
    fn test_tms_fifth_sprite() {
        let mut vdp = Vdp::new(VdpModel::Tms9918, TimingMode::Ntsc);
        set_reg(&mut vdp, 1, 0x40);
        set_reg(&mut vdp, 5, 0x7E);
        let mut sat = Vec::new();
        for _ in 0..5 {
            sat.extend_from_slice(&[20, 0, 0, 0x0F]);
        }
        sat.push(0xD0);
        poke(&mut vdp, 0x3F00, &sat);
        run_frame(&mut vdp);
        let status = vdp.read_status();
        assert_ne!(status & STATUS_OVERFLOW, 0);
        assert_eq!(status & 0x1F, 4);
    }

    #[test]
    fn test_phaser_sees_bright_pixels() {
        let mut vdp = mode4_vdp();
        set_reg(&mut vdp, 7, 0x00);
        poke_cram(&mut vdp, 0x00, &[0x3F]);
        vdp.set_phaser_target(Some((100, 50)));
        // Run to just after line 50 starts.
        while vdp.line() != 50 {
            vdp.advance(CYCLES_PER_LINE);
        }
        assert!(vdp.light_detected());
        assert_eq!(vdp.h_latch(), 70);
        while vdp.line() != 60 {
            vdp.advance(CYCLES_PER_LINE);
        }
        assert!(!vdp.light_detected());
    }
}
