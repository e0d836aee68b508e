//! Job request model and validation.
//!
//! A [`JobRequest`] is the read-only input for one nesting run: one bin
//! descriptor, any number of part descriptors, and the stop-condition
//! configuration. Requests arrive as JSON (camelCase field names) and
//! are validated once, up front, before any phase runs.

use std::time::Duration;

use serde::Deserialize;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Iteration target used when the request does not specify one.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Material utilization target (percent) used when the request does not
/// specify one.
pub const DEFAULT_MATERIAL_UTILIZATION: f64 = 50.0;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Reference to one source SVG blob plus a repeat count.
///
/// Identifies the blob by `{owner_id}/{part_id}.svg` in the asset
/// store. Immutable once constructed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartDescriptor {
    pub owner_id: String,
    /// Opaque identifier of the source blob.
    pub part_id: String,
    /// How many times the sanitized fragment appears in the composed
    /// output. Must be at least 1.
    pub quantity: u32,
}

/// Caller-supplied stop conditions for the nesting run.
///
/// Every field is optional; accessors apply the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    pub max_iterations: Option<u32>,
    /// Material utilization target, in percent.
    pub material_utilization: Option<f64>,
    /// Overall convergence timeout. No timeout when omitted or zero.
    pub timeout_ms: Option<u64>,
}

/// One nesting job: a single bin layout, the parts to nest into it,
/// and the run configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub owner: String,
    pub bin: PartDescriptor,
    pub parts: Vec<PartDescriptor>,
    #[serde(default)]
    pub configuration: JobConfig,
}

// ---------------------------------------------------------------------------
// Accessors
// ---------------------------------------------------------------------------

impl JobConfig {
    /// Iteration target with the default applied.
    pub fn target_iterations(&self) -> u32 {
        self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS)
    }

    /// Efficiency target (percent) with the default applied.
    pub fn efficiency_target(&self) -> f64 {
        self.material_utilization
            .unwrap_or(DEFAULT_MATERIAL_UTILIZATION)
    }

    /// Convergence timeout, if one was requested. Zero means no
    /// timeout, never an instantly-expiring one.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl PartDescriptor {
    fn validate(&self, role: &str) -> Result<(), CoreError> {
        if self.owner_id.is_empty() {
            return Err(CoreError::Validation(format!(
                "{role} descriptor must have a non-empty ownerId"
            )));
        }
        if self.part_id.is_empty() {
            return Err(CoreError::Validation(format!(
                "{role} descriptor must have a non-empty partId"
            )));
        }
        if self.quantity < 1 {
            return Err(CoreError::Validation(format!(
                "{role} descriptor quantity must be at least 1"
            )));
        }
        Ok(())
    }
}

impl JobRequest {
    /// Validate the request invariants.
    ///
    /// Rules:
    /// - The bin descriptor has quantity exactly 1 (a job has exactly
    ///   one bin layout).
    /// - Every part descriptor has a non-empty owner/part id and a
    ///   quantity of at least 1. Repeated part ids are allowed; each
    ///   descriptor is processed independently.
    /// - If set, `maxIterations` must be at least 1 and
    ///   `materialUtilization` must be positive.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.bin.validate("bin")?;
        if self.bin.quantity != 1 {
            return Err(CoreError::Validation(
                "bin descriptor quantity must be exactly 1".to_string(),
            ));
        }
        for part in &self.parts {
            part.validate("part")?;
        }
        if let Some(iterations) = self.configuration.max_iterations {
            if iterations < 1 {
                return Err(CoreError::Validation(
                    "maxIterations must be at least 1".to_string(),
                ));
            }
        }
        if let Some(utilization) = self.configuration.material_utilization {
            if utilization <= 0.0 {
                return Err(CoreError::Validation(
                    "materialUtilization must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(part_id: &str, quantity: u32) -> PartDescriptor {
        PartDescriptor {
            owner_id: "owner-1".to_string(),
            part_id: part_id.to_string(),
            quantity,
        }
    }

    fn request() -> JobRequest {
        JobRequest {
            owner: "owner-1".to_string(),
            bin: descriptor("bin", 1),
            parts: vec![descriptor("part-a", 2), descriptor("part-b", 1)],
            configuration: JobConfig::default(),
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn bin_quantity_other_than_one_rejected() {
        let mut req = request();
        req.bin.quantity = 2;
        assert!(req.validate().is_err());
    }

    #[test]
    fn zero_part_quantity_rejected() {
        let mut req = request();
        req.parts[0].quantity = 0;
        assert!(req.validate().is_err());
    }

    #[test]
    fn empty_part_id_rejected() {
        let mut req = request();
        req.parts[1].part_id.clear();
        assert!(req.validate().is_err());
    }

    #[test]
    fn zero_max_iterations_rejected() {
        let mut req = request();
        req.configuration.max_iterations = Some(0);
        assert!(req.validate().is_err());
    }

    #[test]
    fn non_positive_utilization_rejected() {
        let mut req = request();
        req.configuration.material_utilization = Some(0.0);
        assert!(req.validate().is_err());
    }

    #[test]
    fn repeated_part_ids_are_allowed() {
        let mut req = request();
        req.parts = vec![descriptor("part-a", 1), descriptor("part-a", 3)];
        assert!(req.validate().is_ok());
    }

    #[test]
    fn config_defaults_applied() {
        let config = JobConfig::default();
        assert_eq!(config.target_iterations(), DEFAULT_MAX_ITERATIONS);
        assert_eq!(config.efficiency_target(), DEFAULT_MATERIAL_UTILIZATION);
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn zero_timeout_means_no_timeout() {
        let config = JobConfig {
            timeout_ms: Some(0),
            ..JobConfig::default()
        };
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn request_parses_from_camel_case_json() {
        let json = r#"{
            "owner": "user-7",
            "bin": {"ownerId": "user-7", "partId": "bin-1", "quantity": 1},
            "parts": [
                {"ownerId": "user-7", "partId": "p-1", "quantity": 4}
            ],
            "configuration": {
                "maxIterations": 5,
                "materialUtilization": 62.5,
                "timeoutMs": 30000
            }
        }"#;
        let req: JobRequest = serde_json::from_str(json).expect("request parses");
        assert_eq!(req.parts[0].quantity, 4);
        assert_eq!(req.configuration.target_iterations(), 5);
        assert_eq!(req.configuration.efficiency_target(), 62.5);
        assert_eq!(
            req.configuration.timeout(),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn configuration_is_optional_in_json() {
        let json = r#"{
            "owner": "user-7",
            "bin": {"ownerId": "user-7", "partId": "bin-1", "quantity": 1},
            "parts": []
        }"#;
        let req: JobRequest = serde_json::from_str(json).expect("request parses");
        assert_eq!(req.configuration.target_iterations(), 10);
    }
}
