//! MODIS product ID parsing.
//!
//! Product ID format: `MOD09GQ.A2000072.h02v09.005.2008237032813`

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::{ProductFamily, SensorError, SensorInfo};

static MODIS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(m[oy]d)(09a1|09ga|09gq|09q1|11a1|13a1|13a2|13a3|13q1)\.a(\d{4})(\d{3})\.h(\d{2})v(\d{2})\.(00[56])\.\d{13}$",
    )
    .unwrap()
});

/// Default pixel sizes keyed by the product code portion of the short name.
fn pixel_sizes(product_code: &str) -> Option<(f64, f64)> {
    let sizes = match product_code {
        "09A1" | "13A1" => (500.0, 0.00449155),
        "09GA" => (500.0, 0.00449155),
        "09GQ" | "09Q1" | "13Q1" => (250.0, 0.002245775),
        "11A1" | "13A2" | "13A3" => (1000.0, 0.0089831),
        _ => return None,
    };
    Some(sizes)
}

pub fn parse_modis(product_id: &str) -> Result<SensorInfo, SensorError> {
    let lowered = product_id.to_ascii_lowercase();

    let captures = MODIS_RE
        .captures(&lowered)
        .ok_or_else(|| SensorError::InvalidFormat(product_id.to_string()))?;

    let invalid = || SensorError::InvalidFormat(product_id.to_string());

    let platform = captures[1].to_ascii_uppercase();
    let product_code = captures[2].to_ascii_uppercase();
    let year: i32 = captures[3].parse().map_err(|_| invalid())?;
    let doy: u32 = captures[4].parse().map_err(|_| invalid())?;
    let horizontal: u8 = captures[5].parse().map_err(|_| invalid())?;
    let vertical: u8 = captures[6].parse().map_err(|_| invalid())?;
    let collection: u16 = captures[7].parse().map_err(|_| invalid())?;

    let date_acquired = NaiveDate::from_yo_opt(year, doy).ok_or_else(invalid)?;

    let (pixel_size_meters, pixel_size_dd) = pixel_sizes(&product_code).ok_or_else(invalid)?;

    let sensor_name = if platform == "MOD" { "Terra" } else { "Aqua" };

    let short_name = format!("{platform}{product_code}");
    let product_prefix =
        format!("{short_name}h{horizontal:02}v{vertical:02}{year:04}{doy:03}{collection:03}");

    Ok(SensorInfo {
        family: ProductFamily::Modis,
        product_prefix,
        date_acquired,
        sensor_name,
        pixel_size_meters,
        pixel_size_dd,
        path: 0,
        row: 0,
        horizontal,
        vertical,
    })
}
