//! Product ID identification.
//!
//! Extracts the information embedded in Landsat and MODIS product IDs and
//! supplies the per-sensor configured values (default pixel sizes, product
//! prefixes) the rest of the system keys off.

mod landsat;
mod modis;

use chrono::NaiveDate;

pub use landsat::parse_landsat;
pub use modis::parse_modis;

/// Which mission family a product ID belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductFamily {
    Landsat,
    Modis,
}

impl ProductFamily {
    /// Filename extension of the input product as delivered.
    pub fn input_extension(&self) -> &'static str {
        match self {
            ProductFamily::Landsat => ".tar.gz",
            ProductFamily::Modis => ".hdf",
        }
    }
}

/// Pixel size units supported for customization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelUnit {
    Meters,
    DecimalDegrees,
}

/// Information extracted from, or configured for, a product ID.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorInfo {
    pub family: ProductFamily,
    /// Prefix used when naming completed products.
    pub product_prefix: String,
    pub date_acquired: NaiveDate,
    /// Short sensor name (L4/L5/L7/L8, Terra, Aqua).
    pub sensor_name: &'static str,
    pub pixel_size_meters: f64,
    pub pixel_size_dd: f64,
    /// Landsat WRS path/row; zero for MODIS.
    pub path: u16,
    pub row: u16,
    /// MODIS tile indices; zero for Landsat.
    pub horizontal: u8,
    pub vertical: u8,
}

impl SensorInfo {
    /// Default pixel size for the requested unit.
    pub fn default_pixel_size(&self, unit: PixelUnit) -> f64 {
        match unit {
            PixelUnit::Meters => self.pixel_size_meters,
            PixelUnit::DecimalDegrees => self.pixel_size_dd,
        }
    }
}

/// Error type for product identification.
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    /// Not a product this system can process at all.
    #[error("[{0}] is not a supported product")]
    NotSupported(String),

    /// Recognized mission but a malformed or unsupported ID format.
    #[error("[{0}] is not a supported product ID format")]
    InvalidFormat(String),
}

// A product ID may arrive as a filename with the ID as its prefix; only
// the ID portion participates in parsing.
const LANDSAT_ID_LENGTH: usize = 40;
const MODIS_ID_LENGTH: usize = 41;

pub fn is_landsat(product_id: &str) -> bool {
    let upper = product_id.to_ascii_uppercase();
    ["LT04", "LT05", "LE07", "LT08", "LC08", "LO08"]
        .iter()
        .any(|code| upper.starts_with(code))
}

pub fn is_modis(product_id: &str) -> bool {
    let upper = product_id.to_ascii_uppercase();
    upper.starts_with("MOD") || upper.starts_with("MYD")
}

/// Identify a product ID (or a filename carrying one as its prefix).
pub fn info(product_id: &str) -> Result<SensorInfo, SensorError> {
    let trimmed = product_id.trim();

    if is_landsat(trimmed) {
        parse_landsat(id_prefix(trimmed, LANDSAT_ID_LENGTH))
    } else if is_modis(trimmed) {
        parse_modis(id_prefix(trimmed, MODIS_ID_LENGTH))
    } else {
        Err(SensorError::NotSupported(trimmed.to_string()))
    }
}

fn id_prefix(value: &str, length: usize) -> &str {
    if value.len() > length && value.is_char_boundary(length) {
        &value[..length]
    } else {
        value
    }
}
