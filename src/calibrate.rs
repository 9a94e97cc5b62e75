// One-time screen calibration.
// Visual: the display flashes a solid pattern color; the camera looks for that
// one big blob and remembers where the screen sits in its view.

use std::time::Duration;

use image::RgbImage;
use imageproc::geometry::contour_area;
use log::{debug, info, warn};

use crate::camera::FrameSource;
use crate::config::CalibrationConfig;
use crate::display::Surface;
use crate::error::Error;
use crate::types::{FrameBuffer, Rectangle};
use crate::vision::{ColorFilter, contour_bounds, external_contours};

pub struct ScreenCalibrator {
    filter: ColorFilter,
    min_area: f64,
    attempts: u32,
    settle: Duration,
    pattern_color: u32,
}

impl ScreenCalibrator {
    pub fn new(cfg: &CalibrationConfig) -> Self {
        Self {
            filter: cfg.filter(),
            min_area: cfg.min_area,
            attempts: cfg.attempts,
            settle: Duration::from_millis(cfg.settle_ms),
            pattern_color: cfg.pattern_color,
        }
    }

    /// Find the camera-space rectangle covered by the display.
    ///
    /// Shows the pattern, waits for the camera to catch up, and inspects the
    /// newest frame; repeats up to the configured number of attempts.
    /// `Ok(None)` means every attempt failed.
    pub fn calibrate<S: Surface + ?Sized>(
        &self,
        source: &FrameSource,
        surface: &mut S,
        pattern_size: (usize, usize),
    ) -> Result<Option<Rectangle>, Error> {
        let mut pattern = FrameBuffer::new(pattern_size.0, pattern_size.1);
        pattern.fill(self.pattern_color);

        for attempt in 1..=self.attempts {
            surface.show(&pattern)?;
            surface.settle(self.settle);

            let Some(frame) = source.read() else {
                warn!("calibration attempt {attempt}/{}: no camera frame yet", self.attempts);
                continue;
            };

            match self.find_screen_bounds(&frame.image) {
                Some(bounds) => {
                    info!("screen found at {bounds:?} (attempt {attempt})");
                    return Ok(Some(bounds));
                }
                None => warn!("calibration attempt {attempt}/{} failed", self.attempts),
            }
        }

        Ok(None)
    }

    /// Bounds of the single large pattern-colored blob in `image`.
    /// None when there is no such blob or more than one.
    pub fn find_screen_bounds(&self, image: &RgbImage) -> Option<Rectangle> {
        let mask = self.filter.binary_mask(image);
        let blobs: Vec<_> = external_contours(&mask)
            .into_iter()
            .filter(|c| contour_area(c.as_slice()) > self.min_area)
            .collect();

        if blobs.len() != 1 {
            debug!("{} pattern-sized contours, need exactly one", blobs.len());
            return None;
        }

        contour_bounds(&blobs[0])
    }
}
