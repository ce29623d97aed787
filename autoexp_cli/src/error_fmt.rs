//! Human-readable error descriptions and structured JSON error formatting.

/// Map an eyre::Report to a human-readable explanation with likely causes
/// and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use autoexp_core::error::{AbortReason, BuildError, ExposureError};

    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingMeteringSource => {
                "What happened: No metering source was provided to the exposure engine.\nLikely causes: Sensor transport failed to initialize or was not wired into the builder.\nHow to fix: Ensure the metering source is created successfully and passed via with_metering_source(...).".to_string()
            }
            BuildError::MissingRegisterSink => {
                "What happened: No register sink was provided to the exposure engine.\nLikely causes: Sensor transport failed to initialize or was not wired into the builder.\nHow to fix: Ensure the register sink is created successfully and passed via with_register_sink(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(de) = err.downcast_ref::<ExposureError>() {
        // Specific domain cases first
        if matches!(de, ExposureError::Timeout) {
            return "What happened: Metering query timed out.\nLikely causes: Sensor transport not responding, device asleep, or timeout too low.\nHow to fix: Verify the sensor link, and consider increasing timeouts.metering_ms in the config.".to_string();
        }
        if let ExposureError::Abort(reason) = de {
            return match reason {
                AbortReason::Cancelled => "What happened: The convergence session was cancelled.\nLikely causes: Ctrl-C or a host-side abort between cycles.\nHow to fix: Start a new session; the last reported state can seed it.".to_string(),
            };
        }
        // Fallback to generic for other domain errors
        return format!(
            "What happened: {de}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
        );
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("invalid configuration") {
        return "What happened: Configuration is invalid or incomplete.\nLikely causes: Out-of-range [controller]/[white_balance]/[driver] values.\nHow to fix: Edit the TOML config and try again.".to_string();
    }

    // Metering trace CSV header special-case
    if lower.contains("metering csv must have headers") {
        return "Invalid headers in metering trace CSV. Expected 'spot_r,spot_g,spot_b,matrix_r,matrix_g,matrix_b'.".to_string();
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Map AbortReason (if present) to stable exit codes; other errors return 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use autoexp_core::error::{AbortReason, ExposureError};
    if let Some(ExposureError::Abort(reason)) = err.downcast_ref::<ExposureError>() {
        return match reason {
            AbortReason::Cancelled => 2,
        };
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use autoexp_core::error::{AbortReason, ExposureError};
    use serde_json::json;

    if let Some(ExposureError::Abort(reason)) = err.downcast_ref::<ExposureError>() {
        let reason_name = match reason {
            AbortReason::Cancelled => "Cancelled",
        };
        return json!({ "reason": reason_name, "message": humanize(err) }).to_string();
    }
    if matches!(
        err.downcast_ref::<ExposureError>(),
        Some(ExposureError::Timeout)
    ) {
        return json!({ "reason": "Timeout", "message": humanize(err) }).to_string();
    }

    // Generic error JSON
    json!({ "reason": "Error", "message": humanize(err) }).to_string()
}
