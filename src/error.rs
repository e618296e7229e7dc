use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors surfaced directly to administrative callers.
///
/// Per-track and persistence failures (a single bad file during a scan,
/// a failed background save) are logged at their call site instead —
/// they shouldn't fail an entire operation, so they never get
/// constructed as this type.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoder failed: {0}")]
    Encoder(String),

    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("path {path} is outside the music directory")]
    OutsideMusicDir { path: Utf8PathBuf },
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<CoreError> for color_eyre::Report {
    fn from(err: CoreError) -> Self {
        color_eyre::eyre::eyre!(err)
    }
}
