//! Landsat collection product ID parsing.
//!
//! Collection Product ID format:
//! `LT05_L1TP_038038_19950624_20160302_01_T1`

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::{ProductFamily, SensorError, SensorInfo};

static LANDSAT_COLLECTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(lt04|lt05|le07|lc08|lo08)_[a-z0-9]{4}_(\d{3})(\d{3})_(\d{8})_\d{8}_(\d{2})_([a-z0-9]{2})$")
        .unwrap()
});

const PIXEL_SIZE_METERS: f64 = 30.0;
const PIXEL_SIZE_DD: f64 = 0.0002695;

pub fn parse_landsat(product_id: &str) -> Result<SensorInfo, SensorError> {
    let lowered = product_id.to_ascii_lowercase();

    let captures = LANDSAT_COLLECTION_RE
        .captures(&lowered)
        .ok_or_else(|| SensorError::InvalidFormat(product_id.to_string()))?;

    let sensor_code = captures[1].to_ascii_uppercase();
    let path: u16 = captures[2]
        .parse()
        .map_err(|_| SensorError::InvalidFormat(product_id.to_string()))?;
    let row: u16 = captures[3]
        .parse()
        .map_err(|_| SensorError::InvalidFormat(product_id.to_string()))?;
    let date_acq = &captures[4];
    let collection = &captures[5];
    let tier = captures[6].to_ascii_uppercase();

    let date_acquired = NaiveDate::parse_from_str(date_acq, "%Y%m%d")
        .map_err(|_| SensorError::InvalidFormat(product_id.to_string()))?;

    let sensor_name = match sensor_code.as_str() {
        "LT04" => "L4",
        "LT05" => "L5",
        "LE07" => "L7",
        _ => "L8",
    };

    let product_prefix = format!(
        "{sensor_code}{path:03}{row:03}{date_acq}{collection}{tier}"
    );

    Ok(SensorInfo {
        family: ProductFamily::Landsat,
        product_prefix,
        date_acquired,
        sensor_name,
        pixel_size_meters: PIXEL_SIZE_METERS,
        pixel_size_dd: PIXEL_SIZE_DD,
        path,
        row,
        horizontal: 0,
        vertical: 0,
    })
}
