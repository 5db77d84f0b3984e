//! Monochrome rasterisation and line-frame encoding.
//!
//! A label is uploaded one pixel row at a time. Each row becomes a
//! `printLineData` frame whose payload is:
//!
//! ```text
//! +--------+----------+--------+---------------------------+
//! | y BE16 | 00 00 00 | 01     | ceil(width/8) packed bytes |
//! +--------+----------+--------+---------------------------+
//! ```
//!
//! Pixels are packed most significant bit first, a set bit meaning the
//! printhead burns that dot.

use crate::command::RequestCode;
use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::MAX_PAYLOAD_SIZE;
use bytes::{BufMut, BytesMut};
use image::{GrayImage, Luma, Pixel, RgbaImage};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Bytes preceding the packed row in a line payload.
pub const LINE_PREFIX_SIZE: usize = 6;

/// Widest row that still fits in one frame payload.
pub const MAX_WIDTH: u32 = ((MAX_PAYLOAD_SIZE - LINE_PREFIX_SIZE) * 8) as u32;

/// A grid of pixels that are either on (printed) or off.
pub trait PixelSource {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Returns whether the pixel at `(x, y)` is printed.
    fn is_on(&self, x: u32, y: u32) -> bool;
}

impl<T: PixelSource + ?Sized> PixelSource for &T {
    fn width(&self) -> u32 {
        (**self).width()
    }

    fn height(&self) -> u32 {
        (**self).height()
    }

    fn is_on(&self, x: u32, y: u32) -> bool {
        (**self).is_on(x, y)
    }
}

impl<T: PixelSource + ?Sized> PixelSource for Box<T> {
    fn width(&self) -> u32 {
        (**self).width()
    }

    fn height(&self) -> u32 {
        (**self).height()
    }

    fn is_on(&self, x: u32, y: u32) -> bool {
        (**self).is_on(x, y)
    }
}

/// An owned bit grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonoBitmap {
    width: u32,
    height: u32,
    pixels: Vec<bool>,
}

impl MonoBitmap {
    /// Creates a bitmap with every pixel off.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![false; width as usize * height as usize],
        }
    }

    /// Creates a bitmap from a predicate over pixel coordinates.
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> bool) -> Self {
        let mut bitmap = Self::new(width, height);
        for y in 0..height {
            for x in 0..width {
                bitmap.set(x, y, f(x, y));
            }
        }
        bitmap
    }

    /// Sets a pixel. Coordinates outside the grid are ignored.
    pub fn set(&mut self, x: u32, y: u32, on: bool) {
        if x < self.width && y < self.height {
            let idx = y as usize * self.width as usize + x as usize;
            self.pixels[idx] = on;
        }
    }
}

impl PixelSource for MonoBitmap {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn is_on(&self, x: u32, y: u32) -> bool {
        x < self.width
            && y < self.height
            && self.pixels[y as usize * self.width as usize + x as usize]
    }
}

/// Rule deciding whether an RGBA pixel is printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Threshold {
    /// Printed when alpha > 128.
    #[default]
    Alpha,
    /// Printed when alpha > 128 and luma < 128.
    Luminance,
}

impl FromStr for Threshold {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "alpha" => Ok(Threshold::Alpha),
            "luminance" | "luma" => Ok(Threshold::Luminance),
            _ => Err(format!("unknown threshold '{}'", s)),
        }
    }
}

/// Adapts an RGBA image to a [`PixelSource`].
pub struct RgbaSource {
    image: RgbaImage,
    threshold: Threshold,
}

impl RgbaSource {
    pub fn new(image: RgbaImage) -> Self {
        Self::with_threshold(image, Threshold::default())
    }

    pub fn with_threshold(image: RgbaImage, threshold: Threshold) -> Self {
        Self { image, threshold }
    }
}

impl PixelSource for RgbaSource {
    fn width(&self) -> u32 {
        self.image.width()
    }

    fn height(&self) -> u32 {
        self.image.height()
    }

    fn is_on(&self, x: u32, y: u32) -> bool {
        let Some(pixel) = self.image.get_pixel_checked(x, y) else {
            return false;
        };
        let opaque = pixel.0[3] > 128;
        match self.threshold {
            Threshold::Alpha => opaque,
            Threshold::Luminance => opaque && pixel.to_luma().0[0] < 128,
        }
    }
}

/// Rotates a source 90 degrees clockwise.
pub struct Rotated<S>(pub S);

impl<S: PixelSource> PixelSource for Rotated<S> {
    fn width(&self) -> u32 {
        self.0.height()
    }

    fn height(&self) -> u32 {
        self.0.width()
    }

    fn is_on(&self, x: u32, y: u32) -> bool {
        // Destination (x, y) reads source column y, counted from the bottom row
        self.0.is_on(y, self.0.height() - 1 - x)
    }
}

/// Swaps printed and blank pixels.
pub struct Inverted<S>(pub S);

impl<S: PixelSource> PixelSource for Inverted<S> {
    fn width(&self) -> u32 {
        self.0.width()
    }

    fn height(&self) -> u32 {
        self.0.height()
    }

    fn is_on(&self, x: u32, y: u32) -> bool {
        !self.0.is_on(x, y)
    }
}

/// Packs row `y` of `source` into `ceil(width/8)` bytes, MSB first.
pub fn pack_row<S: PixelSource + ?Sized>(source: &S, y: u32) -> Vec<u8> {
    let width = source.width();
    let mut bytes = vec![0u8; (width as usize).div_ceil(8)];

    for x in 0..width {
        if source.is_on(x, y) {
            let byte_idx = (x / 8) as usize;
            let bit_idx = 7 - (x % 8);
            bytes[byte_idx] |= 1 << bit_idx;
        }
    }

    bytes
}

/// Builds the `printLineData` payload for row `y`.
pub fn line_payload(y: u16, packed: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(LINE_PREFIX_SIZE + packed.len());
    buf.put_u16(y);
    buf.put_slice(&[0x00, 0x00, 0x00]);
    buf.put_u8(0x01);
    buf.put_slice(packed);
    buf
}

/// Checks that `source` can be uploaded.
pub fn validate_dimensions<S: PixelSource + ?Sized>(source: &S) -> Result<(), ProtocolError> {
    let (width, height) = (source.width(), source.height());
    if width == 0 || height == 0 {
        return Err(ProtocolError::Image(format!(
            "empty image ({}x{})",
            width, height
        )));
    }
    if width > MAX_WIDTH {
        return Err(ProtocolError::Image(format!(
            "width {} exceeds {} pixels",
            width, MAX_WIDTH
        )));
    }
    if height > u16::MAX as u32 {
        return Err(ProtocolError::Image(format!(
            "height {} exceeds {} rows",
            height,
            u16::MAX
        )));
    }
    Ok(())
}

/// Encodes every row of `source` as a `printLineData` frame, row 0 first.
pub fn encode_image<S: PixelSource + ?Sized>(source: &S) -> Result<Vec<Frame>, ProtocolError> {
    validate_dimensions(source)?;

    let code = RequestCode::PrintLineData.code();
    let frames = (0..source.height())
        .map(|y| {
            let packed = pack_row(source, y);
            Frame::new(code, line_payload(y as u16, &packed).freeze())
        })
        .collect();
    Ok(frames)
}

/// Renders `source` as a grayscale image, printed pixels black.
pub fn render_preview<S: PixelSource + ?Sized>(source: &S) -> GrayImage {
    let mut img = GrayImage::new(source.width(), source.height());
    for y in 0..source.height() {
        for x in 0..source.width() {
            let color = if source.is_on(x, y) { 0u8 } else { 255u8 };
            img.put_pixel(x, y, Luma([color]));
        }
    }
    img
}
