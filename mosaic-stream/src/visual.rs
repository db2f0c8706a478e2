//! Packet visuals: PNG renderings of frames, activations and voting codes.

use crate::error::{Result, VisualError};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use image::{GrayImage, ImageFormat, Rgb, RgbImage};
use mosaic_ensemble::region::{FrequencyAxis, pitch_to_hz};
use mosaic_ensemble::sdr::Sdr;
use mosaic_ensemble::types::{Image, PitchSet, Region};
use std::io::Cursor;

const REGION_COLOR: Rgb<u8> = Rgb([60, 160, 255]);
const NOTE_COLOR: Rgb<u8> = Rgb([255, 80, 40]);

/// Width of the note markers drawn at the right edge of a frame.
const NOTE_MARK_WIDTH: u32 = 24;

fn gray(image: &Image) -> Result<GrayImage> {
    let (height, width) = image.dim();
    let pixels = image.iter().copied().collect();
    GrayImage::from_raw(width as u32, height as u32, pixels)
        .ok_or_else(|| VisualError::BufferSize { width, height }.into())
}

fn png(encode: impl FnOnce(&mut Cursor<Vec<u8>>) -> image::ImageResult<()>) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    encode(&mut cursor)?;
    Ok(cursor.into_inner())
}

/// PNG bytes of a grayscale image.
pub fn gray_png(image: &Image) -> Result<Vec<u8>> {
    let gray = gray(image)?;
    png(|out| gray.write_to(out, ImageFormat::Png))
}

/// PNG bytes of a color image.
pub fn rgb_png(image: &RgbImage) -> Result<Vec<u8>> {
    png(|out| image.write_to(out, ImageFormat::Png))
}

pub fn to_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

fn outline(canvas: &mut RgbImage, region: &Region, color: Rgb<u8>) {
    let (width, height) = canvas.dimensions();
    let left = region.x as u32;
    let top = region.y as u32;
    let right = (region.right() as u32).saturating_sub(1).min(width.saturating_sub(1));
    let bottom = (region.bottom() as u32).saturating_sub(1).min(height.saturating_sub(1));
    if left >= width || top >= height {
        return;
    }

    for x in left..=right {
        canvas.put_pixel(x, top, color);
        canvas.put_pixel(x, bottom, color);
    }
    for y in top..=bottom {
        canvas.put_pixel(left, y, color);
        canvas.put_pixel(right, y, color);
    }
}

/// Frame image with region outlines and a marker at each predicted pitch's row.
pub fn frame_overlay(image: &Image, regions: &[Region], predicted: &PitchSet) -> Result<RgbImage> {
    let gray = gray(image)?;
    let (width, height) = gray.dimensions();
    let mut canvas = RgbImage::from_fn(width, height, |x, y| {
        let v = gray.get_pixel(x, y).0[0];
        Rgb([v, v, v])
    });

    for region in regions {
        outline(&mut canvas, region, REGION_COLOR);
    }

    let axis = FrequencyAxis::hearing(height as usize);
    for pitch in predicted.iter() {
        let row = axis.hz_to_row(pitch_to_hz(f32::from(pitch))).round();
        if !(0.0..height as f32).contains(&row) {
            continue;
        }
        let row = row as u32;
        for y in row.saturating_sub(1)..=(row + 1).min(height - 1) {
            for x in width.saturating_sub(NOTE_MARK_WIDTH)..width {
                canvas.put_pixel(x, y, NOTE_COLOR);
            }
        }
    }

    Ok(canvas)
}

/// Tile images into a near-square grid with a one-pixel gap.
pub fn tile(images: &[Image]) -> Image {
    if images.is_empty() {
        return Image::zeros((1, 1));
    }

    let cell_h = images.iter().map(|i| i.nrows()).max().unwrap_or(1);
    let cell_w = images.iter().map(|i| i.ncols()).max().unwrap_or(1);
    let cols = (images.len() as f64).sqrt().ceil() as usize;
    let rows = images.len().div_ceil(cols);

    let mut out = Image::zeros((rows * (cell_h + 1) - 1, cols * (cell_w + 1) - 1));
    for (i, image) in images.iter().enumerate() {
        let top = (i / cols) * (cell_h + 1);
        let left = (i % cols) * (cell_w + 1);
        for ((r, c), &v) in image.indexed_iter() {
            out[[top + r, left + c]] = v;
        }
    }
    out
}

/// Rows of `row_width` bits, one pixel per bit.
pub fn code_image(code: &Sdr, row_width: usize) -> Image {
    let row_width = row_width.max(1);
    let rows = code.width().div_ceil(row_width).max(1);
    let mut image = Image::zeros((rows, row_width));
    for &bit in code.active() {
        let bit = bit as usize;
        image[[bit / row_width, bit % row_width]] = 255;
    }
    image
}
