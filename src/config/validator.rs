use crate::config::{Config, SCHEMA_VERSION};
use crate::error::{KbError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, reporting every violation at once
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_search(config, &mut errors);
        Self::validate_fusion(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(KbError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.database_path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.database_path",
                "Database path cannot be empty",
            ));
        }

        if config.storage.pool_size == 0 {
            errors.push(ValidationError::new(
                "storage.pool_size",
                "Pool size must be greater than 0",
            ));
        }

        if config.storage.connection_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "storage.connection_timeout_ms",
                "Connection timeout must be greater than 0",
            ));
        }
    }

    fn validate_search(config: &Config, errors: &mut Vec<ValidationError>) {
        let search = &config.search;

        if search.timeout_ms == 0 {
            errors.push(ValidationError::new(
                "search.timeout_ms",
                "Search timeout must be greater than 0",
            ));
        }

        if !(0.0..=1.0).contains(&search.score_threshold) {
            errors.push(ValidationError::new(
                "search.score_threshold",
                format!(
                    "Score threshold must be within [0.0, 1.0], got {}",
                    search.score_threshold
                ),
            ));
        }

        if search.precision_results == 0 {
            errors.push(ValidationError::new(
                "search.precision_results",
                "Result count must be greater than 0",
            ));
        }

        if search.breadth_results == 0 {
            errors.push(ValidationError::new(
                "search.breadth_results",
                "Result count must be greater than 0",
            ));
        }

        if search.max_query_chars == 0 {
            errors.push(ValidationError::new(
                "search.max_query_chars",
                "Maximum query length must be greater than 0",
            ));
        }
    }

    fn validate_fusion(config: &Config, errors: &mut Vec<ValidationError>) {
        let fusion = &config.fusion;

        if fusion.rrf_k <= 0.0 {
            errors.push(ValidationError::new(
                "fusion.rrf_k",
                format!("RRF k must be positive, got {}", fusion.rrf_k),
            ));
        }

        if !(0.0..=1.0).contains(&fusion.semantic_weight) {
            errors.push(ValidationError::new(
                "fusion.semantic_weight",
                format!(
                    "Semantic weight must be within [0.0, 1.0], got {}",
                    fusion.semantic_weight
                ),
            ));
        }

        if fusion.candidate_multiplier == 0 {
            errors.push(ValidationError::new(
                "fusion.candidate_multiplier",
                "Candidate multiplier must be greater than 0",
            ));
        }
    }
}
