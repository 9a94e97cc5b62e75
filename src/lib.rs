//! Laser graffiti: draw on a projected canvas with a laser pointer seen by a webcam.

pub mod button;
pub mod calibrate;
pub mod camera;
pub mod config;
pub mod display;
pub mod draw;
pub mod error;
pub mod game;
pub mod gamma;
pub mod graffiti;
pub mod stream;
pub mod types;
pub mod vision;

pub use camera::{CameraSource, FrameSource, Grabber};
pub use config::Config;
pub use error::{ConfigError, Error, FrameSourceError, GeometryError};
pub use game::{Command, run_session};
pub use types::{Frame, FrameBuffer, Point, Rectangle};
