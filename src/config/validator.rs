use crate::config::{parse_duration, Config, SCHEMA_VERSION};
use crate::error::{CasefileError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, reporting every problem at once
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_chunking(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_retry(config, &mut errors);
        Self::validate_llm(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CasefileError::ConfigValidation { errors })
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
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }

        if config.storage.store_file.is_empty() {
            errors.push(ValidationError::new(
                "storage.store_file",
                "Store file name cannot be empty",
            ));
        }
    }

    fn validate_chunking(config: &Config, errors: &mut Vec<ValidationError>) {
        let chunking = &config.chunking;
        if chunking.chunk_size == 0 {
            errors.push(ValidationError::new(
                "chunking.chunk_size",
                "Chunk size must be greater than 0",
            ));
        } else if chunking.chunk_size <= chunking.overlap {
            errors.push(ValidationError::new(
                "chunking.overlap",
                format!(
                    "Overlap ({}) must be smaller than chunk_size ({})",
                    chunking.overlap, chunking.chunk_size
                ),
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let provider = &config.embedding.provider;
        if provider != "local" && provider != "remote" {
            errors.push(ValidationError::new(
                "embedding.provider",
                format!("Provider must be 'local' or 'remote', got '{}'", provider),
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if provider == "remote" && config.embedding.base_url.is_empty() {
            errors.push(ValidationError::new(
                "embedding.base_url",
                "Remote embedding requires a base URL",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.retrieval.top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.top_k",
                "top_k must be greater than 0",
            ));
        }
    }

    fn validate_retry(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.retry.max_retries == 0 {
            errors.push(ValidationError::new(
                "retry.max_retries",
                "At least one attempt is required",
            ));
        }

        if parse_duration(&config.retry.base_delay).is_none() {
            errors.push(ValidationError::new(
                "retry.base_delay",
                format!("Invalid duration format: {}", config.retry.base_delay),
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        // The API key is checked when the generator is created, so commands
        // that never generate work without it.
        let temp = config.llm.temperature;
        if !(0.0..=2.0).contains(&temp) {
            errors.push(ValidationError::new(
                "llm.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", temp),
            ));
        }

        let provider = &config.llm.provider;
        let valid_providers = ["gemini"];
        if !valid_providers.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "llm.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, provider
                ),
            ));
        }
    }
}
