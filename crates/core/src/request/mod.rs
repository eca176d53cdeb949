//! Processing request wire types and validation.

mod types;
mod validation;

pub use types::{
    ExtentUnit, OrderOptions, OutputFormat, ProcessingRequest, ResampleMethod, PLOT_PRODUCT_TYPE,
    SKIP_API_SENTINEL,
};
pub use validation::{validate_customization, ValidationError};
