//! Frame type: the RGB pixel buffer handed over by the capture side.

use image::RgbImage;
use std::path::Path;

/// A captured colour frame, packed RGB8 (width * height * 3 bytes).
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl Frame {
    /// Wrap a packed RGB buffer.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        check_len(data.len(), width, height)?;
        Ok(Self { data, width, height })
    }

    /// Wrap a packed BGR buffer (the usual capture-device layout), swapping to RGB.
    pub fn from_bgr(mut data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        check_len(data.len(), width, height)?;
        for px in data.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
        Ok(Self { data, width, height })
    }

    /// Decode an image file into a frame.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FrameError> {
        let img = image::open(path.as_ref())?.to_rgb8();
        Ok(Self::from(img))
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// RGB triple at (x, y). Caller guarantees bounds.
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.width as usize + x) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    pub fn to_image(&self) -> RgbImage {
        // Length was validated on construction.
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }
}

impl From<RgbImage> for Frame {
    fn from(img: RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            data: img.into_raw(),
            width,
            height,
        }
    }
}

fn check_len(actual: usize, width: u32, height: u32) -> Result<(), FrameError> {
    let expected = width as usize * height as usize * 3;
    if actual != expected {
        return Err(FrameError::InvalidLength { expected, actual });
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid RGB buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
}
