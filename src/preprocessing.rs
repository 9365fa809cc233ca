// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Letterbox preprocessing for YOLO inference.
//!
//! The source image is scaled to fit the model input without changing its
//! aspect ratio, centered, and the remaining border filled with gray. The same
//! [`Letterbox`] maps predicted boxes back onto the source image.

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView};
use ndarray::Array4;

/// Border fill, as an 8-bit channel value.
pub const PAD_VALUE: u8 = 114;

/// Geometry of one letterbox transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Source image size as (height, width).
    pub source: (u32, u32),
    /// Model input size as (height, width).
    pub input: (usize, usize),
    /// Size of the scaled image inside the input, as (width, height).
    pub resized: (u32, u32),
    /// Offset of the scaled image, as (left, top).
    pub offset: (u32, u32),
}

impl Letterbox {
    /// Fit a `width` x `height` image into a model input of `input` (height, width).
    #[must_use]
    pub fn fit(width: u32, height: u32, input: (usize, usize)) -> Self {
        let (in_h, in_w) = input;
        let (src_w, src_h) = (width.max(1), height.max(1));
        let ratio = (in_h as f32 / src_h as f32).min(in_w as f32 / src_w as f32);

        let resized = (
            ((src_w as f32 * ratio).round() as u32).max(1),
            ((src_h as f32 * ratio).round() as u32).max(1),
        );
        let offset = (
            (in_w as u32).saturating_sub(resized.0) / 2,
            (in_h as u32).saturating_sub(resized.1) / 2,
        );

        Self {
            source: (height, width),
            input,
            resized,
            offset,
        }
    }

    /// Horizontal and vertical scale from source to input pixels.
    #[must_use]
    pub fn ratio(&self) -> (f32, f32) {
        let (src_h, src_w) = (self.source.0.max(1) as f32, self.source.1.max(1) as f32);
        (self.resized.0 as f32 / src_w, self.resized.1 as f32 / src_h)
    }

    /// Map an `[x1, y1, x2, y2]` box from input space onto the source image,
    /// clipped to its bounds.
    #[must_use]
    pub fn restore(&self, xyxy: [f32; 4]) -> [f32; 4] {
        let (rx, ry) = self.ratio();
        let (left, top) = (self.offset.0 as f32, self.offset.1 as f32);
        let (max_y, max_x) = (self.source.0 as f32, self.source.1 as f32);

        [
            ((xyxy[0] - left) / rx).clamp(0.0, max_x),
            ((xyxy[1] - top) / ry).clamp(0.0, max_y),
            ((xyxy[2] - left) / rx).clamp(0.0, max_x),
            ((xyxy[3] - top) / ry).clamp(0.0, max_y),
        ]
    }
}

/// A model-ready tensor together with the transform that produced it.
#[derive(Debug, Clone)]
pub struct PreprocessResult {
    /// NCHW tensor, RGB, values in [0, 1].
    pub tensor: Array4<f32>,
    /// Transform used to build `tensor`.
    pub letterbox: Letterbox,
}

/// Letterbox `image` into a `[1, 3, H, W]` tensor for an input of `input_size` (height, width).
#[must_use]
pub fn preprocess_image(image: &DynamicImage, input_size: (usize, usize)) -> PreprocessResult {
    let (width, height) = image.dimensions();
    let letterbox = Letterbox::fit(width, height, input_size);
    let (in_h, in_w) = input_size;

    let scaled = imageops::resize(
        &image.to_rgb8(),
        letterbox.resized.0,
        letterbox.resized.1,
        FilterType::Triangle,
    );

    let mut tensor = Array4::from_elem((1, 3, in_h, in_w), f32::from(PAD_VALUE) / 255.0);
    let (left, top) = letterbox.offset;
    for (x, y, rgb) in scaled.enumerate_pixels() {
        let (col, row) = ((x + left) as usize, (y + top) as usize);
        if col < in_w && row < in_h {
            for (channel, value) in rgb.0.iter().enumerate() {
                tensor[[0, channel, row, col]] = f32::from(*value) / 255.0;
            }
        }
    }

    PreprocessResult { tensor, letterbox }
}
