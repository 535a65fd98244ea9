//! RGB framebuffer used to render mock pages and crop element screenshots.
//!
//! Provides:
//! - `fill()` / `draw_rect()` / `draw_text()` for rendering page content
//! - `crop()` for cutting an element's bounding box out of a page capture
//! - PNG encode/decode through the `image` crate

use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{ImageBuffer, RgbImage};
use std::io::Cursor;

use super::types::{DriverError, DriverResult, ElementRect};

/// Width of a rendered glyph in pixels
pub const GLYPH_WIDTH: u32 = 8;

#[derive(Debug, Clone)]
pub struct Framebuffer {
    width: u32,
    height: u32,
    /// Row-major, 3 bytes per pixel
    buffer: Vec<u8>,
}

impl Framebuffer {
    /// Create a framebuffer initialized to black
    pub fn new(width: u32, height: u32) -> Self {
        let buffer = vec![0u8; (width as usize) * (height as usize) * 3];
        Self { width, height, buffer }
    }

    pub fn with_color(width: u32, height: u32, color: [u8; 3]) -> Self {
        let mut fb = Self::new(width, height);
        fb.fill(color);
        fb
    }

    /// Decode a PNG (or any format `image` understands)
    pub fn from_png_bytes(data: &[u8]) -> DriverResult<Self> {
        let img = image::load_from_memory(data)
            .map_err(|e| DriverError::Render(format!("Failed to decode capture: {}", e)))?;
        let rgb = img.to_rgb8();
        Ok(Self {
            width: rgb.width(),
            height: rgb.height(),
            buffer: rgb.into_raw(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn fill(&mut self, color: [u8; 3]) {
        for chunk in self.buffer.chunks_exact_mut(3) {
            chunk.copy_from_slice(&color);
        }
    }

    /// Draw a filled rectangle; parts outside the buffer are clipped
    pub fn draw_rect(&mut self, x: i64, y: i64, w: u32, h: u32, color: [u8; 3]) {
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = x.saturating_add(i64::from(w)).min(i64::from(self.width));
        let y1 = y.saturating_add(i64::from(h)).min(i64::from(self.height));
        for py in y0..y1 {
            for px in x0..x1 {
                self.set_pixel(px as u32, py as u32, color);
            }
        }
    }

    /// Draw a one-pixel outline
    pub fn draw_outline(&mut self, x: i64, y: i64, w: u32, h: u32, color: [u8; 3]) {
        if w == 0 || h == 0 {
            return;
        }
        self.draw_rect(x, y, w, 1, color);
        self.draw_rect(x, y.saturating_add(i64::from(h) - 1), w, 1, color);
        self.draw_rect(x, y, 1, h, color);
        self.draw_rect(x.saturating_add(i64::from(w) - 1), y, 1, h, color);
    }

    /// Draw text with 8x8 glyphs. Text does not wrap.
    pub fn draw_text(&mut self, x: i64, y: i64, text: &str, fg: [u8; 3]) {
        let mut cursor_x = x;
        for ch in text.chars() {
            if cursor_x >= i64::from(self.width) {
                break;
            }
            self.draw_char(cursor_x, y, ch, fg);
            cursor_x = cursor_x.saturating_add(i64::from(GLYPH_WIDTH));
        }
    }

    fn draw_char(&mut self, x: i64, y: i64, ch: char, fg: [u8; 3]) {
        let glyph = BASIC_FONTS.get(ch).unwrap_or([0u8; 8]);
        for (row_idx, row) in glyph.iter().enumerate() {
            let py = y.saturating_add(row_idx as i64);
            for bit in 0..8i64 {
                // font8x8 stores LSB as leftmost pixel
                if (row >> bit) & 1 == 1 {
                    let px = x.saturating_add(bit);
                    if px >= 0 && py >= 0 {
                        self.set_pixel(px as u32, py as u32, fg);
                    }
                }
            }
        }
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        if x >= self.width || y >= self.height {
            return [0, 0, 0];
        }
        let idx = ((y as usize) * (self.width as usize) + x as usize) * 3;
        [self.buffer[idx], self.buffer[idx + 1], self.buffer[idx + 2]]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = ((y as usize) * (self.width as usize) + x as usize) * 3;
        self.buffer[idx..idx + 3].copy_from_slice(&color);
    }

    /// Cut out a bounding box, clamped to the buffer. Returns `None` when the
    /// box lies entirely outside.
    pub fn crop(&self, rect: &ElementRect) -> Option<Framebuffer> {
        let x0 = rect.x.max(0.0).floor() as u32;
        let y0 = rect.y.max(0.0).floor() as u32;
        let x1 = ((rect.x + rect.width).ceil().max(0.0) as u32).min(self.width);
        let y1 = ((rect.y + rect.height).ceil().max(0.0) as u32).min(self.height);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }

        let mut out = Framebuffer::new(x1 - x0, y1 - y0);
        for y in y0..y1 {
            for x in x0..x1 {
                out.set_pixel(x - x0, y - y0, self.get_pixel(x, y));
            }
        }
        Some(out)
    }

    pub fn to_image(&self) -> DriverResult<RgbImage> {
        ImageBuffer::from_raw(self.width, self.height, self.buffer.clone())
            .ok_or_else(|| DriverError::Render("Buffer size does not match dimensions".to_string()))
    }

    pub fn to_png(&self) -> DriverResult<Vec<u8>> {
        let img = self.to_image()?;
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .map_err(|e| DriverError::Render(format!("Failed to encode PNG: {}", e)))?;
        Ok(bytes)
    }
}
