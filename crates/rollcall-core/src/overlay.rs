//! Labelled bounding-box overlay for recognized faces.

use crate::types::{BoundingBox, Recognition};
pub use ab_glyph::FontVec;
use ab_glyph::PxScale;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const MATCHED_COLOUR: Rgb<u8> = Rgb([0, 255, 0]);
pub const UNKNOWN_COLOUR: Rgb<u8> = Rgb([255, 0, 0]);
const LABEL_TEXT_COLOUR: Rgb<u8> = Rgb([0, 0, 0]);
const LINE_WIDTH: u32 = 2;
const LABEL_SCALE: f32 = 20.0;
const LABEL_PADDING: u32 = 3;

/// Fonts tried, in order, when no label font is configured.
pub const FONT_CANDIDATES: [&str; 4] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
];

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("failed to read font {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("not a usable font file: {0}")]
    InvalidFont(PathBuf),
}

/// First installed font from [`FONT_CANDIDATES`].
pub fn find_font() -> Option<PathBuf> {
    FONT_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
}

/// Load a TrueType/OpenType font for name labels.
pub fn load_font(path: &Path) -> Result<FontVec, OverlayError> {
    let data = std::fs::read(path).map_err(|source| OverlayError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    FontVec::try_from_vec(data).map_err(|_| OverlayError::InvalidFont(path.to_path_buf()))
}

/// Outline every recognized face, green when matched and red when unknown.
/// With a font, the name is drawn on a label just above the box.
pub fn draw_recognitions(img: &mut RgbImage, recognitions: &[Recognition], font: Option<&FontVec>) {
    for rec in recognitions {
        let colour = if rec.result.matched { MATCHED_COLOUR } else { UNKNOWN_COLOUR };
        let Some(rect) = visible_rect(&rec.bbox, img.dimensions()) else {
            continue;
        };
        draw_box(img, rect, colour);
        if let Some(font) = font {
            draw_label(img, rect, &rec.result.name, colour, font);
        }
    }
}

/// The part of `bbox` inside a `width`×`height` image.
fn visible_rect(bbox: &BoundingBox, (width, height): (u32, u32)) -> Option<Rect> {
    let x0 = bbox.x.round().max(0.0);
    let y0 = bbox.y.round().max(0.0);
    let x1 = (bbox.x + bbox.width).round().min(width as f32);
    let y1 = (bbox.y + bbox.height).round().min(height as f32);
    if !(x1 > x0 && y1 > y0) {
        return None;
    }
    Some(Rect::at(x0 as i32, y0 as i32).of_size((x1 - x0) as u32, (y1 - y0) as u32))
}

fn draw_box(img: &mut RgbImage, rect: Rect, colour: Rgb<u8>) {
    for t in 0..LINE_WIDTH {
        let inset = 2 * t;
        if rect.width() <= inset || rect.height() <= inset {
            break;
        }
        let inner = Rect::at(rect.left() + t as i32, rect.top() + t as i32)
            .of_size(rect.width() - inset, rect.height() - inset);
        draw_hollow_rect_mut(img, inner, colour);
    }
}

fn draw_label(img: &mut RgbImage, rect: Rect, name: &str, colour: Rgb<u8>, font: &FontVec) {
    let scale = PxScale::from(LABEL_SCALE);
    let (text_width, text_height) = text_size(scale, font, name);
    let label_width = text_width + 2 * LABEL_PADDING;
    let label_height = text_height + 2 * LABEL_PADDING;

    let top = label_top(rect.top(), label_height);
    draw_filled_rect_mut(img, Rect::at(rect.left(), top).of_size(label_width, label_height), colour);
    draw_text_mut(
        img,
        LABEL_TEXT_COLOUR,
        rect.left() + LABEL_PADDING as i32,
        top + LABEL_PADDING as i32,
        scale,
        font,
        name,
    );
}

/// Above the box when it fits, otherwise inside its top edge.
fn label_top(box_top: i32, label_height: u32) -> i32 {
    let above = box_top - label_height as i32;
    if above >= 0 {
        above
    } else {
        box_top
    }
}
