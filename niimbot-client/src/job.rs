//! Print job parameters.

use crate::error::PrinterError;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Accepted print darkness levels.
pub const DENSITY_RANGE: RangeInclusive<u8> = 1..=5;

/// Accepted label (media) types.
pub const LABEL_TYPE_RANGE: RangeInclusive<u8> = 1..=3;

/// Accepted copy counts; the wire field is 16 bits.
pub const QUANTITY_RANGE: RangeInclusive<u32> = 1..=u16::MAX as u32;

/// Settings for one `print_image` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintJob {
    pub density: u8,
    pub label_type: u8,
    pub quantity: u32,
    /// Turn the image 90 degrees clockwise before printing.
    pub rotate: bool,
    /// Swap printed and blank pixels.
    pub invert: bool,
}

impl Default for PrintJob {
    fn default() -> Self {
        Self {
            density: 3,
            label_type: 1,
            quantity: 1,
            rotate: false,
            invert: false,
        }
    }
}

impl PrintJob {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn density(mut self, density: u8) -> Self {
        self.density = density;
        self
    }

    pub fn label_type(mut self, label_type: u8) -> Self {
        self.label_type = label_type;
        self
    }

    pub fn quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn rotate(mut self, rotate: bool) -> Self {
        self.rotate = rotate;
        self
    }

    pub fn invert(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    /// Range-checks every parameter.
    pub fn validate(&self) -> Result<(), PrinterError> {
        check_density(self.density)?;
        check_label_type(self.label_type)?;
        check_quantity(self.quantity)?;
        Ok(())
    }
}

pub(crate) fn check_density(density: u8) -> Result<(), PrinterError> {
    check_range("density", density, &DENSITY_RANGE)
}

pub(crate) fn check_label_type(label_type: u8) -> Result<(), PrinterError> {
    check_range("label type", label_type, &LABEL_TYPE_RANGE)
}

pub(crate) fn check_quantity(quantity: u32) -> Result<(), PrinterError> {
    check_range("quantity", quantity, &QUANTITY_RANGE)
}

fn check_range<T>(name: &str, value: T, range: &RangeInclusive<T>) -> Result<(), PrinterError>
where
    T: PartialOrd + std::fmt::Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(PrinterError::InvalidArgument(format!(
            "{} {} out of range {}..={}",
            name,
            value,
            range.start(),
            range.end()
        )))
    }
}
