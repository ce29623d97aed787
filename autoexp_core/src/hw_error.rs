//! Maps `Box<dyn Error>` from trait boundaries to typed `ExposureError`.
//!
//! The traits in `autoexp_traits` use `Box<dyn Error + Send + Sync>` for
//! maximum flexibility; this module converts those to our typed error enum,
//! with an optional feature-gated path for `autoexp_hardware::HwError`
//! downcasting.

use crate::error::ExposureError;

/// Map a trait-boundary error to a typed `ExposureError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> ExposureError {
    // Feature-gated: try to downcast to HwError for precise mapping
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<autoexp_hardware::error::HwError>() {
            return match hw {
                autoexp_hardware::error::HwError::Timeout => ExposureError::Timeout,
                other => ExposureError::HardwareFault(other.to_string()),
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        ExposureError::Timeout
    } else {
        ExposureError::Hardware(s)
    }
}
