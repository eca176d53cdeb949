//! Customization parameter validation.
//!
//! Applies defaults and cross-field rules to the reprojection, extents and
//! resize options before a request reaches the warping tools. The web tier
//! validates user input; this is the processing-side backstop.

use tracing::warn;

use crate::sensor::{self, PixelUnit};

use super::types::{ExtentUnit, OrderOptions, ResampleMethod};

pub const VALID_PROJECTIONS: [&str; 5] = ["sinu", "aea", "utm", "ps", "lonlat"];
pub const VALID_DATUMS: [&str; 3] = ["WGS84", "NAD27", "NAD83"];
pub const VALID_NS: [&str; 2] = ["north", "south"];

/// Error type for option validation.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing {0} parameter")]
    MissingParameter(&'static str),

    #[error("Invalid {field} [{value}]: argument must be one of [{expected}]")]
    InvalidChoice {
        field: &'static str,
        value: String,
        expected: String,
    },

    #[error("Invalid {field} [{value}]: {rule}")]
    OutOfRange {
        field: &'static str,
        value: String,
        rule: &'static str,
    },

    #[error(transparent)]
    Sensor(#[from] sensor::SensorError),
}

fn require<T: Copy>(value: Option<T>, name: &'static str) -> Result<T, ValidationError> {
    value.ok_or(ValidationError::MissingParameter(name))
}

/// Validate and default the customization options for a product.
///
/// Mutates `options` the way the processing tools expect: missing defaults
/// are filled in (resample method, pixel size from the sensor's native
/// resolution) and normalized (projection lowercased, datum uppercased).
pub fn validate_customization(
    options: &mut OrderOptions,
    product_id: &str,
) -> Result<(), ValidationError> {
    if options.resample_method.is_none() {
        warn!("resample_method: missing defaulting to near");
        options.resample_method = Some(ResampleMethod::Near);
    }

    if options.reproject {
        let target = options
            .target_projection
            .as_deref()
            .ok_or(ValidationError::MissingParameter("target_projection"))?
            .to_ascii_lowercase();
        options.target_projection = Some(target.clone());

        if !VALID_PROJECTIONS.contains(&target.as_str()) {
            return Err(ValidationError::InvalidChoice {
                field: "target_projection",
                value: target,
                expected: VALID_PROJECTIONS.join(", "),
            });
        }

        match target.as_str() {
            "sinu" => {
                require(options.central_meridian, "central_meridian")?;
                require(options.false_easting, "false_easting")?;
                require(options.false_northing, "false_northing")?;
            }
            "aea" => {
                require(options.std_parallel_1, "std_parallel_1")?;
                require(options.std_parallel_2, "std_parallel_2")?;
                require(options.origin_lat, "origin_lat")?;
                require(options.central_meridian, "central_meridian")?;
                require(options.false_easting, "false_easting")?;
                require(options.false_northing, "false_northing")?;

                // The warping tools require the datum in uppercase.
                let datum = options
                    .datum
                    .as_deref()
                    .ok_or(ValidationError::MissingParameter("datum"))?
                    .to_ascii_uppercase();
                if !VALID_DATUMS.contains(&datum.as_str()) {
                    return Err(ValidationError::InvalidChoice {
                        field: "datum",
                        value: datum,
                        expected: VALID_DATUMS.join(", "),
                    });
                }
                options.datum = Some(datum);
            }
            "utm" => {
                let zone = require(options.utm_zone, "utm_zone")?;
                if !(0..=60).contains(&zone) {
                    return Err(ValidationError::OutOfRange {
                        field: "utm_zone",
                        value: zone.to_string(),
                        rule: "value must be 0-60",
                    });
                }

                let ns = options
                    .utm_north_south
                    .as_deref()
                    .ok_or(ValidationError::MissingParameter("utm_north_south"))?;
                if !VALID_NS.contains(&ns) {
                    return Err(ValidationError::InvalidChoice {
                        field: "utm_north_south",
                        value: ns.to_string(),
                        expected: VALID_NS.join(", "),
                    });
                }
            }
            "ps" => {
                // Must be tested before origin_lat.
                let lat_ts = require(options.latitude_true_scale, "latitude_true_scale")?;
                if !(60.0..=90.0).contains(&lat_ts.abs()) {
                    return Err(ValidationError::OutOfRange {
                        field: "latitude_true_scale",
                        value: lat_ts.to_string(),
                        rule: "value must be between (-60.0 and -90.0) or (60.0 and 90.0)",
                    });
                }

                require(options.longitude_pole, "longitude_pole")?;

                match options.origin_lat {
                    None => {
                        // Default the origin to the pole on the true-scale side.
                        options.origin_lat = Some(if lat_ts < 0.0 { -90.0 } else { 90.0 });
                    }
                    Some(origin) if origin != -90.0 && origin != 90.0 => {
                        return Err(ValidationError::OutOfRange {
                            field: "origin_lat",
                            value: origin.to_string(),
                            rule: "value must be -90.0 or 90.0",
                        });
                    }
                    Some(_) => {}
                }

                require(options.false_easting, "false_easting")?;
                require(options.false_northing, "false_northing")?;
            }
            // Nothing required for lonlat.
            _ => {}
        }
    }

    if options.image_extents {
        require(
            options.image_extents_units.map(|_| ()),
            "image_extents_units",
        )?;
        require(options.minx, "minx")?;
        require(options.miny, "miny")?;
        require(options.maxx, "maxx")?;
        require(options.maxy, "maxy")?;
    } else {
        options.minx = None;
        options.miny = None;
        options.maxx = None;
        options.maxy = None;
        options.image_extents_units = None;
    }

    if options.resize {
        require(options.pixel_size, "pixel_size")?;
        require(options.pixel_size_units.map(|_| ()), "pixel_size_units")?;
    } else {
        options.pixel_size = None;
        options.pixel_size_units = None;
    }

    if (options.reproject || options.image_extents) && !options.resize {
        // Reprojection or extents without an explicit pixel size defaults
        // to the sensor's native resolution.
        let unit = if options.reproject && options.target_projection.as_deref() == Some("lonlat") {
            ExtentUnit::DecimalDegrees
        } else {
            ExtentUnit::Meters
        };

        let info = sensor::info(product_id)?;
        let pixel_unit = match unit {
            ExtentUnit::Meters => PixelUnit::Meters,
            ExtentUnit::DecimalDegrees => PixelUnit::DecimalDegrees,
        };
        let pixel_size = info.default_pixel_size(pixel_unit);

        options.pixel_size = Some(pixel_size);
        options.pixel_size_units = Some(unit);

        warn!(
            "resize: parameter not provided but required for reprojection or image extents \
             (defaulting pixel_size({pixel_size}) and pixel_size_units({}))",
            unit.as_str()
        );
    }

    Ok(())
}
