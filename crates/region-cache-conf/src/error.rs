use thiserror::Error;

/// Errors raised while loading or validating settings
#[derive(Debug, Error)]
pub enum SettingsError {
	/// Settings file could not be read
	#[error("File error: {0}")]
	FileError(String),

	/// Settings file could not be parsed
	#[error("Parse error: {0}")]
	ParseError(String),

	/// Settings file extension is not supported
	#[error("Unsupported format: {0}")]
	UnsupportedFormat(String),

	/// Environment variable holds an invalid value
	#[error("Environment error: {0}")]
	EnvError(String),

	/// Settings are well-formed but invalid
	#[error("Validation error: {0}")]
	ValidationError(String),
}

/// Result type for settings operations
pub type Result<T> = std::result::Result<T, SettingsError>;
