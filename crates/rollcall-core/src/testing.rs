//! Deterministic stand-ins for the ONNX pipeline, used by unit tests.

use crate::analyzer::{AnalyzerError, FaceAnalyzer};
use crate::frame::Frame;
use crate::types::{BoundingBox, Embedding};

pub const CELL: u32 = 32;

/// Treats the frame as a row of square cells; every cell that is not dark is
/// a "face" whose embedding is its mean colour scaled to [0, 1].
pub struct ColourCells;

impl ColourCells {
    /// Build a frame with one cell per colour, left to right.
    pub fn frame(cells: &[[u8; 3]]) -> Frame {
        let width = CELL * cells.len() as u32;
        let mut img = image::RgbImage::new(width, CELL);
        for (x, _, px) in img.enumerate_pixels_mut() {
            px.0 = cells[(x / CELL) as usize];
        }
        Frame::from(img)
    }

    fn cell_mean(frame: &Frame, cell: u32) -> [f32; 3] {
        let side = frame.height;
        let mut sum = [0f32; 3];
        for y in 0..side {
            for x in cell * side..(cell + 1) * side {
                let px = frame.pixel(x as usize, y as usize);
                for c in 0..3 {
                    sum[c] += px[c] as f32;
                }
            }
        }
        let n = (side * side) as f32;
        sum.map(|s| s / n)
    }
}

impl FaceAnalyzer for ColourCells {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, AnalyzerError> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }
        let side = frame.height;
        Ok((0..frame.width / side)
            .filter(|&cell| Self::cell_mean(frame, cell).iter().sum::<f32>() / 3.0 >= 48.0)
            .map(|cell| BoundingBox {
                x: (cell * side) as f32,
                y: 0.0,
                width: side as f32,
                height: side as f32,
                confidence: 1.0,
                landmarks: None,
            })
            .collect())
    }

    fn embed(&mut self, frame: &Frame, face: &BoundingBox) -> Result<Embedding, AnalyzerError> {
        let cell = face.x as u32 / frame.height;
        let mean = Self::cell_mean(frame, cell);
        Ok(Embedding::new(mean.iter().map(|v| v / 255.0).collect()))
    }

    fn embedding_dim(&self) -> usize {
        3
    }
}

/// Detects one face in every frame and fails to embed it.
pub struct BrokenEmbedder;

impl FaceAnalyzer for BrokenEmbedder {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, AnalyzerError> {
        Ok(vec![BoundingBox {
            x: 0.0,
            y: 0.0,
            width: frame.width as f32,
            height: frame.height as f32,
            confidence: 1.0,
            landmarks: None,
        }])
    }

    fn embed(&mut self, _frame: &Frame, _face: &BoundingBox) -> Result<Embedding, AnalyzerError> {
        Err(AnalyzerError::Other("corrupt image".into()))
    }

    fn embedding_dim(&self) -> usize {
        3
    }
}
