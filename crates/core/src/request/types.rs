//! Wire format of a unit of work as emitted by the selector and consumed
//! by the mapper. Field names match the production API's JSON.

use serde::{Deserialize, Serialize};

/// Product type string for plot/statistics requests. Plot processing is a
/// separate tier; these requests are rejected by this system.
pub const PLOT_PRODUCT_TYPE: &str = "plot";

/// Sentinel value for the injected API URL that disables status reporting
/// (developer runs against local files).
pub const SKIP_API_SENTINEL: &str = "skip-api";

/// One product request pulled from the production API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingRequest {
    pub orderid: String,

    /// The scene identifier. Kept for wire compatibility; `product_id`
    /// supersedes it.
    pub scene: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,

    pub product_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,

    /// Injected by the selector so the mapper knows where to report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub espa_api: Option<String>,

    #[serde(default)]
    pub bridge_mode: bool,

    pub options: OrderOptions,
}

impl ProcessingRequest {
    /// The effective product ID (`product_id`, falling back to `scene`).
    pub fn effective_product_id(&self) -> &str {
        self.product_id.as_deref().unwrap_or(&self.scene)
    }

    /// Whether status reporting is disabled for this request.
    pub fn skips_api(&self) -> bool {
        matches!(self.espa_api.as_deref(), None | Some(SKIP_API_SENTINEL))
    }

    /// Clone with credential fields masked, for logging.
    pub fn sanitized(&self) -> ProcessingRequest {
        let mut clone = self.clone();
        let mask = || Some("XXXXXXX".to_string());
        if clone.options.source_username.is_some() {
            clone.options.source_username = mask();
        }
        if clone.options.source_pw.is_some() {
            clone.options.source_pw = mask();
        }
        if clone.options.destination_username.is_some() {
            clone.options.destination_username = mask();
        }
        if clone.options.destination_pw.is_some() {
            clone.options.destination_pw = mask();
        }
        clone
    }
}

/// Output formats the formatting tools can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    #[serde(rename = "envi")]
    Envi,
    #[serde(rename = "gtiff")]
    Gtiff,
    #[serde(rename = "hdf-eos2")]
    HdfEos2,
    #[serde(rename = "netcdf")]
    Netcdf,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Envi => "envi",
            OutputFormat::Gtiff => "gtiff",
            OutputFormat::HdfEos2 => "hdf-eos2",
            OutputFormat::Netcdf => "netcdf",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleMethod {
    Near,
    Bilinear,
    Cubic,
    Cubicspline,
    Lanczos,
}

impl ResampleMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResampleMethod::Near => "near",
            ResampleMethod::Bilinear => "bilinear",
            ResampleMethod::Cubic => "cubic",
            ResampleMethod::Cubicspline => "cubicspline",
            ResampleMethod::Lanczos => "lanczos",
        }
    }
}

/// Units for pixel sizes and image extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtentUnit {
    #[serde(rename = "meters")]
    Meters,
    #[serde(rename = "dd")]
    DecimalDegrees,
}

impl ExtentUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtentUnit::Meters => "meters",
            ExtentUnit::DecimalDegrees => "dd",
        }
    }
}

/// Options attached to a product request.
///
/// The wire format keeps every customization knob flat; validation
/// (`validate_customization`) applies defaults and cross-field rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderOptions {
    // Science product selections
    #[serde(default)]
    pub include_customized_source_data: bool,
    #[serde(default)]
    pub include_source_data: bool,
    #[serde(default)]
    pub include_sr: bool,
    #[serde(default)]
    pub include_sr_toa: bool,
    #[serde(default)]
    pub include_sr_thermal: bool,
    #[serde(default)]
    pub include_pixel_qa: bool,
    #[serde(default)]
    pub include_sr_nbr: bool,
    #[serde(default)]
    pub include_sr_nbr2: bool,
    #[serde(default)]
    pub include_sr_ndvi: bool,
    #[serde(default)]
    pub include_sr_ndmi: bool,
    #[serde(default)]
    pub include_sr_savi: bool,
    #[serde(default)]
    pub include_sr_msavi: bool,
    #[serde(default)]
    pub include_sr_evi: bool,
    #[serde(default)]
    pub include_dswe: bool,
    #[serde(default)]
    pub include_st: bool,
    #[serde(default)]
    pub include_statistics: bool,

    // Output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<OutputFormat>,

    // Customization
    #[serde(default)]
    pub reproject: bool,
    #[serde(default)]
    pub image_extents: bool,
    #[serde(default)]
    pub resize: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_projection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resample_method: Option<ResampleMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_zone: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_north_south: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub central_meridian: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std_parallel_1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std_parallel_2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub false_easting: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub false_northing: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude_true_scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude_pole: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minx: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub miny: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxx: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_extents_units: Option<ExtentUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_size_units: Option<ExtentUnit>,

    // Developer flags
    #[serde(default)]
    pub keep_directory: bool,
    #[serde(default)]
    pub keep_intermediate_data: bool,
    #[serde(default)]
    pub debug: bool,

    // Transfer credentials, injected by the selector. Never logged in
    // clear; see ProcessingRequest::sanitized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_pw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_pw: Option<String>,
}

impl OrderOptions {
    /// Whether any science product was requested at all.
    pub fn has_science_products(&self) -> bool {
        self.include_customized_source_data
            || self.include_sr
            || self.include_sr_toa
            || self.include_sr_thermal
            || self.include_pixel_qa
            || self.include_sr_nbr
            || self.include_sr_nbr2
            || self.include_sr_ndvi
            || self.include_sr_ndmi
            || self.include_sr_savi
            || self.include_sr_msavi
            || self.include_sr_evi
            || self.include_dswe
            || self.include_st
    }

    /// Whether any spectral index was requested.
    pub fn wants_spectral_indices(&self) -> bool {
        self.include_sr_nbr
            || self.include_sr_nbr2
            || self.include_sr_ndvi
            || self.include_sr_ndmi
            || self.include_sr_savi
            || self.include_sr_msavi
            || self.include_sr_evi
    }

    /// Whether any customization (warping) was requested.
    pub fn wants_customization(&self) -> bool {
        self.reproject || self.resize || self.image_extents || self.projection.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> &'static str {
        r#"{
            "orderid": "espa-user@example.com-0101803266655",
            "scene": "LT05_L1TP_038038_19950624_20160302_01_T1",
            "product_type": "landsat",
            "options": {"include_sr": true, "output_format": "gtiff"}
        }"#
    }

    #[test]
    fn test_deserialize_minimal_request() {
        let request: ProcessingRequest = serde_json::from_str(minimal_json()).unwrap();
        assert_eq!(request.orderid, "espa-user@example.com-0101803266655");
        assert_eq!(
            request.effective_product_id(),
            "LT05_L1TP_038038_19950624_20160302_01_T1"
        );
        assert!(request.options.include_sr);
        assert!(!request.options.include_st);
        assert_eq!(request.options.output_format, Some(OutputFormat::Gtiff));
        assert!(request.skips_api());
    }

    #[test]
    fn test_product_id_overrides_scene() {
        let mut request: ProcessingRequest = serde_json::from_str(minimal_json()).unwrap();
        request.product_id = Some("OTHER".to_string());
        assert_eq!(request.effective_product_id(), "OTHER");
    }

    #[test]
    fn test_skip_api_sentinel() {
        let mut request: ProcessingRequest = serde_json::from_str(minimal_json()).unwrap();
        request.espa_api = Some(SKIP_API_SENTINEL.to_string());
        assert!(request.skips_api());
        request.espa_api = Some("http://localhost:4004".to_string());
        assert!(!request.skips_api());
    }

    #[test]
    fn test_sanitized_masks_credentials() {
        let mut request: ProcessingRequest = serde_json::from_str(minimal_json()).unwrap();
        request.options.source_username = Some("user".to_string());
        request.options.source_pw = Some("secret".to_string());

        let sanitized = request.sanitized();
        assert_eq!(sanitized.options.source_username.as_deref(), Some("XXXXXXX"));
        assert_eq!(sanitized.options.source_pw.as_deref(), Some("XXXXXXX"));
        // The original is untouched.
        assert_eq!(request.options.source_pw.as_deref(), Some("secret"));
    }

    #[test]
    fn test_output_format_wire_names() {
        let json = r#""hdf-eos2""#;
        let format: OutputFormat = serde_json::from_str(json).unwrap();
        assert_eq!(format, OutputFormat::HdfEos2);
        assert_eq!(serde_json::to_string(&format).unwrap(), json);
    }

    #[test]
    fn test_has_science_products() {
        let mut options = OrderOptions::default();
        assert!(!options.has_science_products());
        options.include_sr_ndvi = true;
        assert!(options.has_science_products());
        assert!(options.wants_spectral_indices());
    }
}
