//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Turn a failed result into a `ConfigError`, keeping the first error's details.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.len() {
            0 => Ok(self.warnings),
            1 => {
                let err = &self.errors[0];
                Err(ConfigError::InvalidValue {
                    field: err.path.clone(),
                    message: err.message.clone(),
                })
            }
            n => Err(ConfigError::Invalid(n)),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> Result<ValidationResult, ConfigError> {
        let mut result = ValidationResult::default();

        Self::validate_browser(config, &mut result);
        Self::validate_capture(config, &mut result);
        Self::validate_serialize(config, &mut result);
        Self::validate_logging(config, &mut result);

        Ok(result)
    }

    fn validate_browser(config: &Config, result: &mut ValidationResult) {
        let endpoint = config.browser.endpoint.trim();
        if endpoint.is_empty() {
            result.add_error(ValidationError::new(
                "browser.endpoint",
                "Endpoint cannot be empty",
            ));
            return;
        }

        match url::Url::parse(endpoint) {
            Ok(url) => {
                if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
                    result.add_error(ValidationError::new(
                        "browser.endpoint",
                        format!("Unsupported scheme '{}', expected http(s) or ws(s)", url.scheme()),
                    ));
                }
            }
            Err(e) => {
                result.add_error(ValidationError::new(
                    "browser.endpoint",
                    format!("Invalid URL: {}", e),
                ));
            }
        }

        if config.browser.request_timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "browser.request_timeout_secs",
                "request_timeout_secs must be greater than 0",
            ));
        }
    }

    fn validate_capture(config: &Config, result: &mut ValidationResult) {
        let capture = &config.capture;

        if capture.viewport_expansion < -1 {
            result.add_error(ValidationError::new(
                "capture.viewport_expansion",
                "viewport_expansion must be -1 (unlimited) or >= 0",
            ));
        }

        if capture.stability_quiet_ms >= capture.stability_timeout_ms {
            result.add_error(ValidationError::new(
                "capture.stability_quiet_ms",
                "stability_quiet_ms must be less than stability_timeout_ms",
            ));
        }

        if capture.overlay_throttle_ms == 0 {
            result.add_warning(ValidationWarning::new(
                "capture.overlay_throttle_ms",
                "overlay_throttle_ms is 0, overlays reposition on every scroll event",
            ));
        }

        if capture.min_capture_interval_ms < capture.debounce_ms {
            result.add_warning(ValidationWarning::new(
                "capture.min_capture_interval_ms",
                "min_capture_interval_ms is shorter than debounce_ms and has no effect",
            ));
        }
    }

    fn validate_serialize(config: &Config, result: &mut ValidationResult) {
        let include = &config.serialize.include_attributes;
        if include.is_empty() {
            result.add_warning(ValidationWarning::new(
                "serialize.include_attributes",
                "No attributes included, serialized elements show tag and text only",
            ));
        }

        for attr in include {
            if attr.trim().is_empty() || attr.contains(char::is_whitespace) {
                result.add_error(ValidationError::new(
                    "serialize.include_attributes",
                    format!("Invalid attribute name: {:?}", attr),
                ));
            }
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        let level = config.logging.level.to_ascii_lowercase();
        let known = ["trace", "debug", "info", "warn", "error", "off"];
        // Directive strings like "domsnap_engine=debug" are passed to EnvFilter as-is.
        if !known.contains(&level.as_str()) && !level.contains('=') {
            result.add_warning(ValidationWarning::new(
                "logging.level",
                format!("Unknown log level '{}', falling back to info", config.logging.level),
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
