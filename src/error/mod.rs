//! Error types for cape.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! Errors are categorized into five main categories:
//! - **Credential**: Vault decryption failures and rejected credentials
//! - **Provider**: Unknown providers, upstream API failures, timeouts
//! - **Storage**: Ledger/store failures (potentially fatal for a batch)
//! - **Configuration**: Config file parsing, validation, or missing values
//! - **Internal**: Unexpected errors, bugs, or unclassified issues
//!
//! Each error has a stable error code (e.g., `CAPE-P001`) for programmatic
//! handling. Per-account and per-detector errors are caught at the smallest
//! scope and recorded in outcome error lists; only storage errors are allowed
//! to propagate out of a batch, since they imply no sibling unit can succeed.

use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Credential issues (vault decryption, rejected credentials).
    Credential,
    /// Provider-specific issues (unsupported, upstream errors, timeouts).
    Provider,
    /// Storage issues (ledger unavailable, constraint violations).
    Storage,
    /// Configuration issues (parse errors, invalid values, missing files).
    Configuration,
    /// Internal errors (bugs, unexpected state, unclassified).
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Credential => "Credential error",
            Self::Provider => "Provider error",
            Self::Storage => "Storage error",
            Self::Configuration => "Configuration error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns a short code prefix for this category.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Credential => "A",
            Self::Provider => "P",
            Self::Storage => "S",
            Self::Configuration => "C",
            Self::Internal => "X",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit codes for the CLI driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// Config/parse errors, unknown provider or account
    ConfigError = 2,
    /// Store unavailable or corrupt
    StorageError = 3,
    /// Timeout
    Timeout = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

/// Main error type for cape operations.
///
/// Each variant has:
/// - A stable error code (e.g., `CAPE-P001`)
/// - A category for classification
/// - A retryable flag for batch drivers
#[derive(Error, Debug)]
pub enum CapeError {
    // ==========================================================================
    // Credential errors (Category: Credential)
    // ==========================================================================
    /// Vault failed to decrypt a credential blob (tag mismatch, malformed
    /// input, or key mismatch). Never carries decrypted material.
    #[error("credential decryption failed: {reason}")]
    DecryptionFailure { reason: String },

    /// Provider rejected the decrypted credentials during validation.
    #[error("invalid credentials for {provider}")]
    InvalidCredentials { provider: String },

    // ==========================================================================
    // Provider errors (Category: Provider)
    // ==========================================================================
    /// Account references a provider with no registered adapter.
    #[error("unsupported provider: {provider}")]
    UnsupportedProvider { provider: String },

    /// Upstream provider API failure during cost fetch. Transient.
    #[error("upstream provider {provider} error: {message}")]
    UpstreamProvider { provider: String, message: String },

    /// Adapter fetch exceeded its time budget.
    #[error("provider {provider} timed out after {seconds}s")]
    ProviderTimeout { provider: String, seconds: u64 },

    // ==========================================================================
    // Lookup errors (Category: Configuration)
    // ==========================================================================
    /// Referenced account does not exist.
    #[error("account not found: {account_id}")]
    AccountNotFound { account_id: String },

    /// Account exists but is not eligible for collection/analysis.
    #[error("account {account_id} is inactive")]
    AccountInactive { account_id: String },

    /// Provider name that cannot be parsed.
    #[error("invalid provider name: {0}")]
    InvalidProviderName(String),

    // ==========================================================================
    // Storage errors (Category: Storage)
    // ==========================================================================
    /// Store operation failed. The only error class a batch driver is
    /// expected to propagate, since it implies no further unit can succeed.
    #[error("persistence error: {message}")]
    Persistence { message: String },

    // ==========================================================================
    // Configuration errors (Category: Configuration)
    // ==========================================================================
    /// Configuration file not found at expected path.
    #[error("config file not found: {path}")]
    ConfigNotFound { path: String },

    /// Error parsing configuration file.
    #[error("config parse error at {path}: {message}")]
    ConfigParse { path: String, message: String },

    /// Invalid value in configuration.
    #[error("invalid config value for '{key}': {message}")]
    ConfigInvalid { key: String, message: String },

    // ==========================================================================
    // I/O errors (Category: Internal)
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ==========================================================================
    // Generic wrapper (Category: Internal)
    // ==========================================================================
    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CapeError {
    /// Map error to exit code for the CLI driver.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::AccountNotFound { .. }
            | Self::AccountInactive { .. }
            | Self::InvalidProviderName(_)
            | Self::UnsupportedProvider { .. }
            | Self::ConfigNotFound { .. }
            | Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. } => ExitCode::ConfigError,

            Self::Persistence { .. } => ExitCode::StorageError,

            Self::ProviderTimeout { .. } => ExitCode::Timeout,

            Self::DecryptionFailure { .. }
            | Self::InvalidCredentials { .. }
            | Self::UpstreamProvider { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ExitCode::GeneralError,
        }
    }

    /// Returns the error category for classification and routing.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::DecryptionFailure { .. } | Self::InvalidCredentials { .. } => {
                ErrorCategory::Credential
            }

            Self::UnsupportedProvider { .. }
            | Self::UpstreamProvider { .. }
            | Self::ProviderTimeout { .. } => ErrorCategory::Provider,

            Self::Persistence { .. } => ErrorCategory::Storage,

            Self::AccountNotFound { .. }
            | Self::AccountInactive { .. }
            | Self::InvalidProviderName(_)
            | Self::ConfigNotFound { .. }
            | Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. } => ErrorCategory::Configuration,

            Self::Io(_) | Self::Json(_) | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Returns a stable error code for programmatic handling.
    ///
    /// Format: `CAPE-{category}{number}` where category is:
    /// - A: Credential
    /// - P: Provider
    /// - S: Storage
    /// - C: Configuration
    /// - X: Internal
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            // Credential errors (A001-A099)
            Self::DecryptionFailure { .. } => "CAPE-A001",
            Self::InvalidCredentials { .. } => "CAPE-A002",

            // Provider errors (P001-P099)
            Self::UnsupportedProvider { .. } => "CAPE-P001",
            Self::UpstreamProvider { .. } => "CAPE-P002",
            Self::ProviderTimeout { .. } => "CAPE-P003",

            // Storage errors (S001-S099)
            Self::Persistence { .. } => "CAPE-S001",

            // Configuration errors (C001-C099)
            Self::AccountNotFound { .. } => "CAPE-C001",
            Self::AccountInactive { .. } => "CAPE-C002",
            Self::InvalidProviderName(_) => "CAPE-C003",
            Self::ConfigNotFound { .. } => "CAPE-C010",
            Self::ConfigParse { .. } => "CAPE-C011",
            Self::ConfigInvalid { .. } => "CAPE-C012",

            // Internal errors (X001-X099)
            Self::Io(_) => "CAPE-X001",
            Self::Json(_) => "CAPE-X002",
            Self::Other(_) => "CAPE-X099",
        }
    }

    /// Returns whether the error is potentially recoverable by retrying.
    ///
    /// Only upstream provider failures and timeouts are transient; everything
    /// else needs operator attention before a retry can succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamProvider { .. } | Self::ProviderTimeout { .. }
        )
    }

    /// Whether this error should abort an entire batch rather than just
    /// the unit that produced it.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }

    /// Returns the provider name if this error is provider-specific.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::InvalidCredentials { provider }
            | Self::UnsupportedProvider { provider }
            | Self::UpstreamProvider { provider, .. }
            | Self::ProviderTimeout { provider, .. } => Some(provider),
            _ => None,
        }
    }

    /// Shorthand for a persistence failure wrapping a store-level error.
    pub fn persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence {
            message: err.to_string(),
        }
    }
}

/// Result type alias for cape operations.
pub type Result<T> = std::result::Result<T, CapeError>;

// =============================================================================
// Tests
// =============================================================================
