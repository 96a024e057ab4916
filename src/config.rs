//! Run configuration
//!
//! Every stage keeps its own parameter struct; `PipelineConfig` groups them
//! so a whole run can be described by one JSON document. Missing fields take
//! their defaults.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dispersion::DispersionParams;
use crate::error::{EdgerError, Result};
use crate::filter::FilterParams;
use crate::glm::GlmFitParams;
use crate::normalization::TmmParams;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub filter: FilterParams,
    pub tmm: TmmParams,
    pub dispersion: DispersionParams,
    pub glm: GlmFitParams,
    /// Worker threads for per-gene work (0 = all cores)
    pub threads: usize,
    /// FDR cutoff used for summaries
    pub fdr_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            filter: FilterParams::default(),
            tmm: TmmParams::default(),
            dispersion: DispersionParams::default(),
            glm: GlmFitParams::default(),
            threads: 0,
            fdr_threshold: 0.05,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let config: Self = serde_json::from_reader(reader)?;
        log::debug!("Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    /// Checks that do not depend on the data. Sample-dependent checks run in each stage.
    pub fn validate(&self) -> Result<()> {
        if !(self.fdr_threshold > 0.0 && self.fdr_threshold <= 1.0) {
            return Err(EdgerError::InvalidConfig {
                reason: format!("fdr_threshold must be in (0, 1], got {}", self.fdr_threshold),
            });
        }
        if self.glm.max_iter == 0 || !(self.glm.tol > 0.0) {
            return Err(EdgerError::InvalidConfig {
                reason: "GLM max_iter and tol must be positive".to_string(),
            });
        }
        self.tmm.validate()?;
        self.dispersion.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_json_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"threads": 2, "filter": {{"min_samples": 3}}, "dispersion": {{"grid_points": 21}}}}"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.threads, 2);
        assert_eq!(config.filter.min_samples, 3);
        assert_eq!(config.filter.min_log_cpm, 0.0);
        assert_eq!(config.dispersion.grid_points, 21);
        assert_eq!(config.glm.max_iter, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_threshold_rejected() {
        let config = PipelineConfig {
            fdr_threshold: 0.0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Configuration);
    }

    #[test]
    fn test_malformed_json_is_io_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{ not json").unwrap();
        file.flush().unwrap();
        let err = PipelineConfig::from_json_file(file.path()).unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Io);
    }
}
