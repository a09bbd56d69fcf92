use std::convert::Infallible;
use embedded_graphics::{
    mono_font::{ascii::FONT_9X15_BOLD, MonoFont, MonoTextStyleBuilder},
    pixelcolor::{Rgb565, Rgb888},
    prelude::*,
    primitives::{Line, PointsIter, PrimitiveStyle},
    text::{Baseline, Text},
};
use crate::config::DisplayConfig;
use crate::error::MonitorError;
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineStyle {
    Solid,
    /// Two pixels on, one off.
    Dotted,
}
/// RGB565 pixel grid, row-major, matching the panel's native format.
#[derive(Clone, Debug)]
pub struct Framebuffer {
    width: u32,
    height: u32,
    pixels: Vec<Rgb565>,
}
impl Framebuffer {
    pub fn new(width: u32, height: u32) -> Result<Self, MonitorError> {
        let len = width as usize * height as usize;
        let mut pixels = Vec::new();
        pixels.try_reserve_exact(len).map_err(|e| {
            MonitorError::BufferAllocationFailure(format!("{width}x{height} framebuffer: {e}"))
        })?;
        pixels.resize(len, Rgb565::BLACK);
        Ok(Self {
            width,
            height,
            pixels,
        })
    }
    pub fn width(&self) -> u32 {
        self.width
    }
    pub fn height(&self) -> u32 {
        self.height
    }
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb565> {
        if x < self.width && y < self.height {
            Some(self.pixels[(y * self.width + x) as usize])
        } else {
            None
        }
    }
    pub fn pixels(&self) -> &[Rgb565] {
        &self.pixels
    }
    fn set_pixel(&mut self, point: Point, color: Rgb565) {
        if point.x < 0 || point.y < 0 {
            return;
        }
        let (x, y) = (point.x as u32, point.y as u32);
        if x < self.width && y < self.height {
            self.pixels[(y * self.width + x) as usize] = color;
        }
    }
    pub fn fill(&mut self, color: Rgb565) {
        self.pixels.fill(color);
    }
    pub fn line(&mut self, from: Point, to: Point, color: Rgb565, style: LineStyle) {
        let line = Line::new(from, to);
        match style {
            LineStyle::Solid => infallible(
                line.into_styled(PrimitiveStyle::with_stroke(color, 1))
                    .draw(self),
            ),
            LineStyle::Dotted => {
                for (i, point) in line.points().enumerate() {
                    if i % 3 != 2 {
                        self.set_pixel(point, color);
                    }
                }
            }
        }
    }
    pub fn text(
        &mut self,
        position: Point,
        text: &str,
        font: &MonoFont<'_>,
        background: Rgb565,
        foreground: Rgb565,
    ) {
        let style = MonoTextStyleBuilder::new()
            .font(font)
            .text_color(foreground)
            .background_color(background)
            .build();
        infallible(Text::with_baseline(text, position, style, Baseline::Top).draw(self));
    }
    /// Packed 8-bit RGB, row-major.
    pub fn to_rgb888_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixels.len() * 3);
        for &pixel in &self.pixels {
            let c = Rgb888::from(pixel);
            out.extend_from_slice(&[c.r(), c.g(), c.b()]);
        }
        out
    }
}
impl OriginDimensions for Framebuffer {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}
impl DrawTarget for Framebuffer {
    type Color = Rgb565;
    type Error = Infallible;
    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            self.set_pixel(point, color);
        }
        Ok(())
    }
}
fn infallible<T>(result: Result<T, Infallible>) -> T {
    match result {
        Ok(value) => value,
        Err(never) => match never {},
    }
}
#[derive(Clone, Copy, Debug)]
pub struct Palette {
    pub background: Rgb565,
    pub grid: Rgb565,
    pub trace: Rgb565,
    pub text: Rgb565,
}
impl Default for Palette {
    fn default() -> Self {
        Self {
            background: Rgb565::BLACK,
            grid: Rgb565::new(16, 32, 16),
            trace: Rgb565::BLUE,
            text: Rgb565::GREEN,
        }
    }
}
/// Draws grid, trace and heart-rate label into its own framebuffer. Each
/// call overwrites the whole frame.
pub struct Renderer {
    config: DisplayConfig,
    palette: Palette,
    framebuffer: Framebuffer,
}
impl Renderer {
    pub fn new(config: DisplayConfig) -> Result<Self, MonitorError> {
        let framebuffer = Framebuffer::new(config.width, config.height)?;
        Ok(Self {
            config,
            palette: Palette::default(),
            framebuffer,
        })
    }
    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }
    pub fn palette(&self) -> &Palette {
        &self.palette
    }
    /// Screen row for a column value, clamped to the panel.
    pub fn row_for(&self, value: f32) -> i32 {
        let max_row = self.config.height.saturating_sub(1) as f32;
        let row = self.config.vertical_offset as f32 - (value * self.config.amplitude_scale).round();
        // NaN falls through the clamp and casts to row 0.
        row.clamp(0.0, max_row) as i32
    }
    pub fn render(&mut self, columns: &[f32], heart_rate: f32) -> &Framebuffer {
        let palette = self.palette;
        self.framebuffer.fill(palette.background);
        self.draw_grid(palette.grid);
        self.draw_trace(columns, palette.trace);
        let label = heart_rate_label(heart_rate);
        let origin = Point::new(self.config.text_x, self.config.text_y);
        self.framebuffer
            .text(origin, &label, &FONT_9X15_BOLD, palette.background, palette.text);
        &self.framebuffer
    }
    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }
    fn draw_grid(&mut self, color: Rgb565) {
        let spacing = self.config.grid_spacing.max(1) as usize;
        let (w, h) = (self.config.width as i32, self.config.height as i32);
        for x in (0..w).step_by(spacing) {
            self.framebuffer
                .line(Point::new(x, 0), Point::new(x, h - 1), color, LineStyle::Dotted);
        }
        for y in (0..h).step_by(spacing) {
            self.framebuffer
                .line(Point::new(0, y), Point::new(w - 1, y), color, LineStyle::Dotted);
        }
    }
    fn draw_trace(&mut self, columns: &[f32], color: Rgb565) {
        let rows: Vec<i32> = columns
            .iter()
            .take(self.config.width as usize)
            .map(|&c| self.row_for(c))
            .collect();
        for (x, pair) in rows.windows(2).enumerate() {
            let x = x as i32;
            self.framebuffer.line(
                Point::new(x, pair[0]),
                Point::new(x + 1, pair[1]),
                color,
                LineStyle::Solid,
            );
        }
    }
}
pub fn heart_rate_label(heart_rate: f32) -> String {
    format!("HR: {} BPM", heart_rate.round() as i64)
}
