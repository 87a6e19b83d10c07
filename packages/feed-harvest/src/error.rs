//! Typed errors for the harvest library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. Only [`AuthError`] and
//! [`NavigationError`] ever terminate a run; everything else degrades to
//! partial output.

use thiserror::Error;

/// Terminal error for an extraction run.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Authentication failed; no partial results exist.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Target could not be reached or resolved.
    #[error("navigation failed: {0}")]
    Navigation(#[from] NavigationError),

    /// Run parameters were invalid (raised before any session is opened).
    #[error("invalid configuration: {0}")]
    Config(#[from] ProfileError),
}

impl ExtractionError {
    /// Short category name, useful for CLI exit reporting.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::Navigation(_) => "navigation",
            Self::Config(_) => "config",
        }
    }
}

/// Errors raised while opening an authenticated session.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Neither explicit credentials nor environment variables were provided
    #[error("missing credentials: provide username/password or set LINKEDIN_USERNAME and LINKEDIN_PASSWORD")]
    MissingCredentials,

    /// The site did not accept the credentials within the login timeout
    #[error("login rejected or timed out")]
    Rejected,

    /// The account hit a checkpoint or challenge page
    #[error("account blocked at {url}")]
    Blocked { url: String },

    /// The browser could not be started
    #[error("browser launch failed: {0}")]
    Launch(#[source] DriverError),

    /// The browser failed mid-login
    #[error("browser error during login: {0}")]
    Driver(#[source] DriverError),

    /// The run was cancelled or hit its deadline before login finished
    #[error("login interrupted by cancellation or deadline")]
    Interrupted,
}

/// Errors raised while navigating to a target view.
#[derive(Debug, Error)]
pub enum NavigationError {
    /// Target resource does not exist
    #[error("target not found: {url}")]
    NotFound { url: String },

    /// Target exists but the session may not view it
    #[error("access denied: {url}")]
    AccessDenied { url: String },

    /// Transient failures persisted past the retry budget
    #[error("target unreachable after retries: {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: DriverError,
    },

    /// Target description could not be turned into a URL
    #[error("invalid target: {reason}")]
    InvalidTarget { reason: String },

    /// Non-transient browser failure
    #[error("browser error navigating to {url}: {source}")]
    Driver {
        url: String,
        #[source]
        source: DriverError,
    },
}

/// Errors reported by a browser driver.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    /// An action or wait exceeded its deadline
    #[error("timed out: {0}")]
    Timeout(String),

    /// The page reported the resource missing
    #[error("not found: {0}")]
    NotFound(String),

    /// The page refused access
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Network or protocol failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Page script raised or returned an unexpected shape
    #[error("script error: {0}")]
    Script(String),

    /// The browsing context is gone
    #[error("browser closed")]
    Closed,

    /// The browser process could not be started
    #[error("launch error: {0}")]
    Launch(String),
}

impl DriverError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transport(_))
    }
}

/// Errors from the inference backend.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    /// Network failure talking to the backend
    #[error("inference transport error: {0}")]
    Transport(String),

    /// Backend answered with an error status
    #[error("inference API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Backend is not configured
    #[error("inference not configured: {0}")]
    Config(String),
}

impl InferenceError {
    /// Rate limits, server errors and transport failures are retryable.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Config(_) => false,
        }
    }
}

/// Errors from the structured-data normalizer.
///
/// These never leave a run: the normalizer substitutes a local fallback.
#[derive(Debug, Clone, Error)]
pub enum NormalizationError {
    /// Inference call exceeded its timeout
    #[error("inference timed out")]
    Timeout,

    /// Nothing to normalize, or the backend returned nothing
    #[error("empty input or response")]
    Empty,

    /// Response could not be parsed into structured fields
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Backend call failed
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl NormalizationError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Inference(e) => e.is_transient(),
            Self::Empty | Self::Malformed(_) => false,
        }
    }
}

/// Invalid extraction profile or run parameters.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// A CSS selector failed to parse
    #[error("invalid selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// Some other parameter was unusable
    #[error("invalid parameter: {0}")]
    Invalid(String),
}

/// Result type alias for extraction runs.
pub type HarvestResult<T> = std::result::Result<T, ExtractionError>;

/// Result type alias for driver operations.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Result type alias for normalization.
pub type NormalizeResult<T> = std::result::Result<T, NormalizationError>;
