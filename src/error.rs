// Error types for the whole session.
// Every variant states *where* things went wrong.
use std::path::PathBuf;

use crate::types::Point;

/// Top-level error returned by the session and the binary.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Window init error: {0}")]
    WindowInit(String), // Creating the window failed
    #[error("Window update error: {0}")]
    WindowUpdate(String), // Updating the window buffer failed
    #[error(transparent)]
    Camera(#[from] FrameSourceError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised by the frame source and its grabbers.
#[derive(Debug, thiserror::Error)]
pub enum FrameSourceError {
    /// The device or stream could not be opened, or its first read failed.
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),
    /// A single grab failed after the source was opened.
    #[error("Camera frame error: {0}")]
    Frame(String),
    #[error("Capture loop is already running")]
    AlreadyRunning,
    #[error("Capture loop has been stopped")]
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    #[error("Invalid rectangle: top_right {top_right:?} must lie above and right of bottom_left {bottom_left:?}")]
    InvalidRectangle { bottom_left: Point, top_right: Point },
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
