// On-canvas buttons the marker can "press".
// Visual: a framed icon at a fixed spot; while the dot sits on it the icon
// shows inverted.

use std::path::Path;

use image::imageops::{self, FilterType};
use log::warn;

use crate::draw::{blit, frame_rect};
use crate::graffiti::DrawController;
use crate::types::{FrameBuffer, Point, Rectangle, WHITE};

/// What a button does when clicked. Runs inline in the tick, so keep it quick.
pub type Callback = Box<dyn Fn(&mut DrawController)>;

const FRAME_THICKNESS: i32 = 2;

pub struct Button {
    position: Rectangle, // canvas space
    callback: Callback,
    icon: FrameBuffer, // exactly position.width() x position.height()
}

impl std::fmt::Debug for Button {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Button")
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl Button {
    /// A button whose icon is a solid swatch of `color`.
    pub fn swatch(position: Rectangle, color: u32, callback: Callback) -> Self {
        let mut icon = FrameBuffer::new(position.width() as usize, position.height() as usize);
        icon.fill(color);
        Self::framed(position, icon, callback)
    }

    /// A button with its icon loaded from `path` and resized to fit.
    /// Falls back to a `fallback` swatch when the image can't be read.
    pub fn from_icon(position: Rectangle, path: &Path, fallback: u32, callback: Callback) -> Self {
        let (w, h) = (position.width() as u32, position.height() as u32);
        match image::open(path) {
            Ok(img) => {
                let resized = imageops::resize(&img.to_rgb8(), w, h, FilterType::Triangle);
                let mut icon = FrameBuffer::new(w as usize, h as usize);
                for (dst, px) in icon.pixels.iter_mut().zip(resized.pixels()) {
                    *dst = ((px[0] as u32) << 16) | ((px[1] as u32) << 8) | px[2] as u32;
                }
                Self::framed(position, icon, callback)
            }
            Err(e) => {
                warn!("button icon {}: {e}", path.display());
                Self::swatch(position, fallback, callback)
            }
        }
    }

    fn framed(position: Rectangle, mut icon: FrameBuffer, callback: Callback) -> Self {
        if let Ok(border) = Rectangle::new(
            Point::new(0, 0),
            Point::new(icon.width as i32, icon.height as i32),
        ) {
            frame_rect(&mut icon, &border, FRAME_THICKNESS, WHITE);
        }
        Self {
            position,
            callback,
            icon,
        }
    }

    pub fn position(&self) -> Rectangle {
        self.position
    }

    /// True when the marker is inside the button (edges excluded).
    pub fn is_pressed(&self, marker: Option<Point>) -> bool {
        marker.is_some_and(|p| self.position.contains(p))
    }

    /// Run the callback once if the marker is on the button.
    pub fn try_click(&self, marker: Option<Point>, target: &mut DrawController) -> bool {
        if !self.is_pressed(marker) {
            return false;
        }
        (self.callback)(target);
        true
    }

    /// Overlay the icon at the button's position; inverted while pressed.
    pub fn draw(&self, canvas: &mut FrameBuffer, marker: Option<Point>) {
        let (x, y) = (self.position.left_x(), self.position.bottom_y());
        if self.is_pressed(marker) {
            let mut inverted = self.icon.clone();
            for p in &mut inverted.pixels {
                *p = !*p & 0x00_FF_FF_FF;
            }
            blit(canvas, x, y, &inverted);
        } else {
            blit(canvas, x, y, &self.icon);
        }
    }
}
