//! Reprojection command construction.
//!
//! The warping tool takes the target projection as a sub-command followed
//! by its parameter flags; `none` warps nothing but still honors resize
//! and extents.

use crate::request::{OrderOptions, ResampleMethod};

pub const REPROJECTION_TOOL: &str = "espa_reprojection.py";

/// Build the warping tool argument list, or `None` when the options
/// request no customization at all.
pub fn reprojection_args(options: &OrderOptions, xml_filename: &str) -> Option<Vec<String>> {
    if !options.wants_customization() {
        return None;
    }

    let mut cmd: Vec<String> = vec!["--xml".into(), xml_filename.into()];

    let target = if options.reproject {
        options
            .target_projection
            .clone()
            .unwrap_or_else(|| "none".to_string())
    } else {
        "none".to_string()
    };
    cmd.push(target.clone());

    let push_float = |cmd: &mut Vec<String>, flag: &str, value: Option<f64>| {
        if let Some(value) = value {
            cmd.push(flag.to_string());
            cmd.push(value.to_string());
        }
    };

    match target.as_str() {
        "utm" => {
            if let Some(zone) = options.utm_zone {
                cmd.push("--zone".into());
                cmd.push(zone.to_string());
            }
            if let Some(ns) = &options.utm_north_south {
                cmd.push("--north-south".into());
                cmd.push(ns.clone());
            }
        }
        "aea" => {
            if let Some(datum) = &options.datum {
                cmd.push("--datum".into());
                cmd.push(datum.clone());
            }
            push_float(&mut cmd, "--central-meridian", options.central_meridian);
            push_float(&mut cmd, "--origin-latitude", options.origin_lat);
            push_float(&mut cmd, "--std-parallel-1", options.std_parallel_1);
            push_float(&mut cmd, "--std-parallel-2", options.std_parallel_2);
            push_float(&mut cmd, "--false-easting", options.false_easting);
            push_float(&mut cmd, "--false-northing", options.false_northing);
        }
        "ps" => {
            push_float(&mut cmd, "--latitude-true-scale", options.latitude_true_scale);
            push_float(&mut cmd, "--longitude-pole", options.longitude_pole);
            push_float(&mut cmd, "--origin-latitude", options.origin_lat);
            push_float(&mut cmd, "--false-easting", options.false_easting);
            push_float(&mut cmd, "--false-northing", options.false_northing);
        }
        "sinu" => {
            push_float(&mut cmd, "--central-meridian", options.central_meridian);
            push_float(&mut cmd, "--false-easting", options.false_easting);
            push_float(&mut cmd, "--false-northing", options.false_northing);
        }
        // Nothing needed for lonlat or none.
        _ => {}
    }

    cmd.push("--resample-method".into());
    cmd.push(
        options
            .resample_method
            .unwrap_or(ResampleMethod::Near)
            .as_str()
            .to_string(),
    );

    if options.resize || options.reproject || options.image_extents {
        push_float(&mut cmd, "--pixel-size", options.pixel_size);
        if let Some(units) = options.pixel_size_units {
            cmd.push("--pixel-size-units".into());
            cmd.push(units.as_str().to_string());
        }
    }

    if options.image_extents {
        push_float(&mut cmd, "--extent-minx", options.minx);
        push_float(&mut cmd, "--extent-maxx", options.maxx);
        push_float(&mut cmd, "--extent-miny", options.miny);
        push_float(&mut cmd, "--extent-maxy", options.maxy);
        if let Some(units) = options.image_extents_units {
            cmd.push("--extent-units".into());
            cmd.push(units.as_str().to_string());
        }
    }

    // Warping always emits the internal format; the requested output
    // format is produced by the formatting step afterwards.
    cmd.push("--output-format".into());
    cmd.push("envi".into());

    Some(cmd)
}
