use std::fs;
use std::io::Cursor;
use std::path::PathBuf;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use crate::error::MonitorError;
use crate::render::Framebuffer;
/// Panel boundary: takes a finished frame and shows it.
pub trait Display {
    fn initialize(&mut self) -> Result<(), MonitorError>;
    fn set_backlight(&mut self, level: u8);
    fn present(&mut self, frame: &Framebuffer) -> Result<(), MonitorError>;
}
impl<D: Display + ?Sized> Display for Box<D> {
    fn initialize(&mut self) -> Result<(), MonitorError> {
        (**self).initialize()
    }
    fn set_backlight(&mut self, level: u8) {
        (**self).set_backlight(level)
    }
    fn present(&mut self, frame: &Framebuffer) -> Result<(), MonitorError> {
        (**self).present(frame)
    }
}
/// Writes every presented frame to a PNG file, overwriting the previous one.
pub struct PngDisplay {
    path: PathBuf,
    backlight: u8,
    frames: u64,
}
impl PngDisplay {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backlight: 0,
            frames: 0,
        }
    }
    pub fn frames_presented(&self) -> u64 {
        self.frames
    }
}
impl Display for PngDisplay {
    fn initialize(&mut self) -> Result<(), MonitorError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                MonitorError::HardwareInitFailure(format!(
                    "cannot prepare frame directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        log::debug!("png display writing to {}", self.path.display());
        Ok(())
    }
    fn set_backlight(&mut self, level: u8) {
        self.backlight = level.min(100);
    }
    fn present(&mut self, frame: &Framebuffer) -> Result<(), MonitorError> {
        let png = encode_png(&frame.to_rgb888_bytes(), frame.width(), frame.height())?;
        fs::write(&self.path, png)?;
        self.frames += 1;
        Ok(())
    }
}
/// Keeps the most recent frame in memory.
#[derive(Default)]
pub struct MemoryDisplay {
    pub initialized: bool,
    pub backlight: u8,
    pub presented: u64,
    pub last_frame: Option<Framebuffer>,
}
impl Display for MemoryDisplay {
    fn initialize(&mut self) -> Result<(), MonitorError> {
        self.initialized = true;
        Ok(())
    }
    fn set_backlight(&mut self, level: u8) {
        self.backlight = level.min(100);
    }
    fn present(&mut self, frame: &Framebuffer) -> Result<(), MonitorError> {
        if !self.initialized {
            return Err(MonitorError::Display("present before initialize".into()));
        }
        self.presented += 1;
        self.last_frame = Some(frame.clone());
        Ok(())
    }
}
pub fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, MonitorError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| MonitorError::Display("pixel buffer does not match dimensions".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
