use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataflowError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Dataflow spec table not found: {table}")]
    TableNotFoundError { table: String, tried: Vec<String> },

    #[error("mandatory missing keys= {keys:?} for {context}")]
    MissingMandatoryKeysError { context: String, keys: Vec<String> },

    #[error("Unsupported sink format: {format}")]
    UnsupportedSinkFormatError { format: String },

    #[error("Invalid {context} metadata: {message}")]
    MetadataError { context: String, message: String },

    #[error("Secret not found: scope={scope}, key={key}")]
    SecretNotFoundError { scope: String, key: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Pipeline plan has {} problem(s): {}", .problems.len(), .problems.join("; "))]
    PlanValidationError { problems: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Io,
    Configuration,
    Metadata,
    Secret,
    Validation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl DataflowError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn metadata(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MetadataError {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::IoError(_) | Self::TableNotFoundError { .. } => ErrorCategory::Io,
            Self::TomlError(_)
            | Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => ErrorCategory::Configuration,
            Self::SerializationError(_)
            | Self::MissingMandatoryKeysError { .. }
            | Self::UnsupportedSinkFormatError { .. }
            | Self::MetadataError { .. } => ErrorCategory::Metadata,
            Self::SecretNotFoundError { .. } => ErrorCategory::Secret,
            Self::ValidationError { .. } | Self::PlanValidationError { .. } => {
                ErrorCategory::Validation
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Io => ErrorSeverity::Critical,
            ErrorCategory::Secret => ErrorSeverity::Medium,
            ErrorCategory::Configuration
            | ErrorCategory::Metadata
            | ErrorCategory::Validation => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            Self::IoError(_) => "Check that the file exists and is readable".to_string(),
            Self::TableNotFoundError { tried, .. } => {
                format!("Create the table file at one of: {}", tried.join(", "))
            }
            Self::TomlError(_) => "Fix the TOML syntax in the configuration file".to_string(),
            Self::MissingConfigError { field } => {
                format!("Set '{}' in the configuration file or with --set {}=<value>", field, field)
            }
            Self::InvalidConfigValueError { field, .. } => {
                format!("Provide a valid value for '{}'", field)
            }
            Self::ConfigError { .. } | Self::ConfigValidationError { .. } => {
                "Review the pipeline configuration".to_string()
            }
            Self::MissingMandatoryKeysError { keys, .. } => {
                format!("Add the missing keys to the metadata: {}", keys.join(", "))
            }
            Self::UnsupportedSinkFormatError { .. } => {
                "Use one of the supported sink formats: delta, kafka".to_string()
            }
            Self::SerializationError(_) | Self::MetadataError { .. } => {
                "Fix the JSON metadata stored in the dataflow spec table".to_string()
            }
            Self::SecretNotFoundError { scope, key } => format!(
                "Export the secret as {}",
                crate::adapters::secrets::env_var_name(scope, key)
            ),
            Self::ValidationError { .. } | Self::PlanValidationError { .. } => {
                "Correct the dataflow specs listed above".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Io => format!("Could not read input: {}", self),
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Metadata => format!("Invalid dataflow metadata: {}", self),
            ErrorCategory::Secret => format!("Secret lookup failed: {}", self),
            ErrorCategory::Validation => format!("Validation failed: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, DataflowError>;
