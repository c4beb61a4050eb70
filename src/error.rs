use std::io;
use thiserror::Error;

/// Custom result type alias for the application
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Errors that can occur while harvesting packages
#[derive(Debug, Error)]
pub enum HarvestError {
    /// I/O errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// HTTP request/response errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Network connectivity errors
    #[error("Network error: {0}")]
    Network(String),

    /// URL parsing errors
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Archive reading errors
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The download page contained none of the known link shapes
    #[error("no download links found on download page")]
    NoDownloadLinks,

    /// The downloaded payload was below the minimum-size floor
    #[error("downloaded file too small ({size_mb:.2} MB), likely an error page")]
    UndersizedArtifact {
        /// Size of the rejected payload in megabytes
        size_mb: f64,
    },

    /// The decompiler finished without producing any source files
    #[error("decompilation produced no source files")]
    EmptyDecompileOutput,

    /// The decompiler exceeded its wall-clock time limit
    #[error("decompiler exceeded the {limit_secs}s time limit")]
    DecompileTimeout {
        /// The configured limit in seconds
        limit_secs: u64,
    },

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// General message errors
    #[error("{0}")]
    Message(String),
}

impl HarvestError {
    /// Creates a new error with the specified message
    pub fn new(message: &str) -> Self {
        Self::Message(message.to_string())
    }

    /// Checks if this error is terminal for one catalog item only.
    ///
    /// Item-scoped errors are captured as a failed outcome for that item and
    /// never abort the run.
    pub fn is_item_scoped(&self) -> bool {
        !matches!(self, Self::Config(_))
    }
}
