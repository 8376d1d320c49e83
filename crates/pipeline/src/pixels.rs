use std::fs;
use std::path::{Path, PathBuf};

use image::{ImageBuffer, ImageError, Rgb, RgbImage};

use crate::error::{RenderError, RenderResult};

const CHANNELS: usize = 4;

/// Host copy of the output surface: tightly packed RGBA8 rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Zero-filled buffer matching a `width` x `height` surface.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * CHANNELS],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn row_pitch(&self) -> usize {
        self.width as usize * CHANNELS
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y as usize * self.row_pitch() + x as usize * CHANNELS;
        let mut pixel = [0; 4];
        pixel.copy_from_slice(&self.data[offset..offset + CHANNELS]);
        Some(pixel)
    }

    /// Drops the fourth channel; channels 0..3 become R, G, B.
    pub fn to_rgb_image(&self) -> RgbImage {
        let pitch = self.row_pitch();
        ImageBuffer::from_fn(self.width, self.height, |x, y| {
            let offset = y as usize * pitch + x as usize * CHANNELS;
            Rgb([
                self.data[offset],
                self.data[offset + 1],
                self.data[offset + 2],
            ])
        })
    }

    /// Encodes the buffer as an 8-bit RGB PNG at `path`.
    ///
    /// The file only appears once it is completely written; on failure no
    /// file is left behind.
    pub fn write_png(&self, path: &Path) -> RenderResult<()> {
        let partial = partial_path(path);
        let image_write = |source: ImageError| RenderError::ImageWrite {
            path: path.to_path_buf(),
            source,
        };

        let encoded = self
            .to_rgb_image()
            .save_with_format(&partial, image::ImageFormat::Png)
            .and_then(|()| fs::rename(&partial, path).map_err(ImageError::IoError));
        if let Err(err) = encoded {
            if partial.exists() {
                if let Err(cleanup) = fs::remove_file(&partial) {
                    tracing::warn!(path = %partial.display(), %cleanup, "failed to remove partial image");
                }
            }
            return Err(image_write(err));
        }

        tracing::info!(path = %path.display(), width = self.width, height = self.height, "wrote image");
        Ok(())
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "output".into());
    name.push(".partial");
    path.with_file_name(name)
}
