// Core types shared by the camera, vision and drawing code.

use std::time::Instant;

use image::RgbImage;

use crate::error::GeometryError;

/// Stroke palette, packed as 0x00RRGGBB like every other pixel we draw.
pub const WHITE: u32 = 0x00_FF_FF_FF;
pub const BLUE: u32 = 0x00_00_00_FF;
pub const GREEN: u32 = 0x00_00_FF_00;
pub const YELLOW: u32 = 0x00_FF_FF_00;
pub const BLACK: u32 = 0x00_00_00_00;

/// Map a single-character color code (case-insensitive) to a stroke color.
pub fn stroke_color(code: char) -> Option<u32> {
    match code.to_ascii_lowercase() {
        'w' => Some(WHITE),
        'b' => Some(BLUE),
        'g' => Some(GREEN),
        'y' => Some(YELLOW),
        _ => None,
    }
}

/// A 2D integer coordinate, in camera or canvas space depending on context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance; avoids the sqrt on the hot path.
    pub fn dist_sq(self, other: Point) -> i64 {
        let dx = (self.x - other.x) as i64;
        let dy = (self.y - other.y) as i64;
        dx * dx + dy * dy
    }
}

/// Axis-aligned region. "Bottom" is the smaller y (the first image row of the region).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rectangle {
    bottom_left: Point,
    top_right: Point,
}

impl Rectangle {
    /// Build a rectangle; rejects empty or inverted extents.
    pub fn new(bottom_left: Point, top_right: Point) -> Result<Self, GeometryError> {
        if top_right.x <= bottom_left.x || top_right.y <= bottom_left.y {
            return Err(GeometryError::InvalidRectangle {
                bottom_left,
                top_right,
            });
        }
        Ok(Self {
            bottom_left,
            top_right,
        })
    }

    pub fn bottom_left(&self) -> Point {
        self.bottom_left
    }

    pub fn top_right(&self) -> Point {
        self.top_right
    }

    pub fn width(&self) -> i32 {
        self.top_right.x - self.bottom_left.x
    }

    pub fn height(&self) -> i32 {
        self.top_right.y - self.bottom_left.y
    }

    pub fn left_x(&self) -> i32 {
        self.bottom_left.x
    }

    pub fn right_x(&self) -> i32 {
        self.top_right.x
    }

    pub fn bottom_y(&self) -> i32 {
        self.bottom_left.y
    }

    pub fn top_y(&self) -> i32 {
        self.top_right.y
    }

    /// Strict interior test: points on an edge are outside.
    pub fn contains(&self, p: Point) -> bool {
        self.left_x() < p.x && p.x < self.right_x() && self.bottom_y() < p.y && p.y < self.top_y()
    }
}

/// A software raster of 0x00RRGGBB pixels; the canvas and everything minifb shows.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    pub width: usize,     // how wide the buffer is (pixels)
    pub height: usize,    // how tall the buffer is (pixels)
    pub pixels: Vec<u32>, // each entry is 0x00RRGGBB for minifb
}

impl FrameBuffer {
    /// A black buffer of the given size.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![BLACK; width * height],
        }
    }

    /// Fill every pixel with one color.
    pub fn fill(&mut self, color: u32) {
        self.pixels.fill(color);
    }

    pub fn is_blank(&self) -> bool {
        self.pixels.iter().all(|&p| p == BLACK)
    }

    /// Pixel at (x, y), or None outside the buffer.
    pub fn get(&self, x: i32, y: i32) -> Option<u32> {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return None;
        }
        Some(self.pixels[y as usize * self.width + x as usize])
    }
}

/// One captured camera image, tagged with when it was grabbed and the crop applied to it.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub timestamp: Instant,
    pub crop: Option<Rectangle>,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}
