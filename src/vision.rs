// Marker detection: color segmentation + contour geometry.
// Visual expectation: point the laser at the wall and `detect()` hands back
// where its dot sits on the canvas (or None while the dot is hidden).
use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::{BorderType, find_contours};
use imageproc::contrast::{ThresholdType, threshold};
use imageproc::filter::gaussian_blur_f32;
type ContourPoint = imageproc::point::Point<i32>;
use rayon::prelude::*;

use crate::types::{Frame, Point, Rectangle};

/// Largest hue value; hue is stored as degrees / 2 so it fits in a byte.
pub const HUE_MAX: u8 = 179;

/// Convert one RGB pixel to (hue 0..=179, saturation 0..=255, value 0..=255).
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let v = max;
    let s = if max > 0.0 { delta * 255.0 / max } else { 0.0 };

    let mut h = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / delta
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    // Half-degrees, rounded; 360° wraps back onto 0.
    let h = ((h / 2.0).round() as u32 % (HUE_MAX as u32 + 1)) as u8;
    [h, s.round() as u8, v as u8]
}

/// A band of hues plus the minimum saturation/value a pixel needs to count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HueBand {
    pub lower: u8,
    pub upper: u8,
    pub min_saturation: u8,
    pub min_value: u8,
}

impl HueBand {
    /// Hues above `HUE_MAX` are clamped onto it.
    pub fn new(lower: u8, upper: u8, min_saturation: u8, min_value: u8) -> Self {
        Self {
            lower: lower.min(HUE_MAX),
            upper: upper.min(HUE_MAX),
            min_saturation,
            min_value,
        }
    }

    /// Inclusive hue ranges covered by the band.
    /// A band whose upper bound is below its lower bound wraps past `HUE_MAX`
    /// and splits into two ranges.
    pub fn ranges(&self) -> Vec<(u8, u8)> {
        if self.upper < self.lower {
            vec![(self.lower, HUE_MAX), (0, self.upper)]
        } else {
            vec![(self.lower, self.upper)]
        }
    }

    /// True when `hue` falls in the band, wrapping past `HUE_MAX` when needed.
    #[inline]
    fn covers_hue(&self, hue: u8) -> bool {
        if self.upper < self.lower {
            hue >= self.lower || hue <= self.upper
        } else {
            self.lower <= hue && hue <= self.upper
        }
    }

    /// Does one HSV pixel pass the band?
    #[inline]
    pub fn accepts(&self, hsv: [u8; 3]) -> bool {
        let [h, s, v] = hsv;
        s >= self.min_saturation && v >= self.min_value && self.covers_hue(h)
    }

    /// 255 where the pixel falls in the band, 0 elsewhere.
    pub fn mask(&self, image: &RgbImage) -> GrayImage {
        let mut mask = GrayImage::new(image.width(), image.height());
        for (x, y, px) in image.enumerate_pixels() {
            if self.accepts(rgb_to_hsv(px[0], px[1], px[2])) {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        mask
    }
}

/// Full mask pipeline: hue band, Gaussian blur against speckle, then binarize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorFilter {
    pub band: HueBand,
    pub blur_sigma: f32,
    pub threshold: u8,
}

impl ColorFilter {
    pub fn binary_mask(&self, image: &RgbImage) -> GrayImage {
        let mask = self.band.mask(image);
        let blurred = if self.blur_sigma > 0.0 {
            gaussian_blur_f32(&mask, self.blur_sigma)
        } else {
            mask
        };
        threshold(&blurred, self.threshold, ThresholdType::Binary)
    }
}

/// A traced border, in image pixel coordinates.
pub type Contour = Vec<ContourPoint>;

/// Outer borders of the top-level blobs in a binary mask.
pub fn external_contours(mask: &GrayImage) -> Vec<Contour> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| c.points)
        .collect()
}

/// Smallest rectangle holding every pixel of the contour.
/// The far edges sit one past the last pixel, so a blob spanning columns
/// 40..=119 yields a rectangle 80 pixels wide.
pub fn contour_bounds(points: &[ContourPoint]) -> Option<Rectangle> {
    let first = *points.first()?;
    let (mut lo, mut hi) = (first, first);
    for p in &points[1..] {
        lo.x = lo.x.min(p.x);
        lo.y = lo.y.min(p.y);
        hi.x = hi.x.max(p.x);
        hi.y = hi.y.max(p.y);
    }
    Rectangle::new(Point::new(lo.x, lo.y), Point::new(hi.x + 1, hi.y + 1)).ok()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

impl Circle {
    fn at(p: (f32, f32)) -> Self {
        Self { x: p.0, y: p.1, radius: 0.0 }
    }

    fn diameter(a: (f32, f32), b: (f32, f32)) -> Self {
        let (x, y) = ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0);
        let radius = ((a.0 - x).powi(2) + (a.1 - y).powi(2)).sqrt();
        Self { x, y, radius }
    }

    /// Circumcircle; collinear triples fall back to the widest pair.
    fn through(a: (f32, f32), b: (f32, f32), c: (f32, f32)) -> Self {
        let d = 2.0 * (a.0 * (b.1 - c.1) + b.0 * (c.1 - a.1) + c.0 * (a.1 - b.1));
        if d.abs() < 1e-6 {
            let pairs = [Self::diameter(a, b), Self::diameter(a, c), Self::diameter(b, c)];
            return pairs
                .into_iter()
                .fold(Self::at(a), |best, c| if c.radius > best.radius { c } else { best });
        }
        let (a2, b2, c2) = (
            a.0 * a.0 + a.1 * a.1,
            b.0 * b.0 + b.1 * b.1,
            c.0 * c.0 + c.1 * c.1,
        );
        let x = (a2 * (b.1 - c.1) + b2 * (c.1 - a.1) + c2 * (a.1 - b.1)) / d;
        let y = (a2 * (c.0 - b.0) + b2 * (a.0 - c.0) + c2 * (b.0 - a.0)) / d;
        let radius = ((a.0 - x).powi(2) + (a.1 - y).powi(2)).sqrt();
        Self { x, y, radius }
    }

    #[inline]
    fn covers(&self, p: (f32, f32)) -> bool {
        let d = ((p.0 - self.x).powi(2) + (p.1 - self.y).powi(2)).sqrt();
        d <= self.radius * (1.0 + 1e-5) + 1e-3
    }
}

/// Smallest circle containing every point (incremental Welzl).
pub fn min_enclosing_circle(points: &[ContourPoint]) -> Option<Circle> {
    let pts: Vec<(f32, f32)> = points.iter().map(|p| (p.x as f32, p.y as f32)).collect();
    let mut circle = Circle::at(*pts.first()?);

    for i in 1..pts.len() {
        if circle.covers(pts[i]) {
            continue;
        }
        circle = Circle::at(pts[i]);
        for j in 0..i {
            if circle.covers(pts[j]) {
                continue;
            }
            circle = Circle::diameter(pts[i], pts[j]);
            for k in 0..j {
                if !circle.covers(pts[k]) {
                    circle = Circle::through(pts[i], pts[j], pts[k]);
                }
            }
        }
    }
    Some(circle)
}

/// Camera-to-canvas scale, per axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stretch {
    pub x: f32,
    pub y: f32,
}

impl Stretch {
    pub const IDENTITY: Stretch = Stretch { x: 1.0, y: 1.0 };

    /// Scale that maps the calibrated camera region onto a canvas of the given size.
    pub fn between(bounds: &Rectangle, canvas_width: usize, canvas_height: usize) -> Self {
        Self {
            x: canvas_width as f32 / bounds.width() as f32,
            y: canvas_height as f32 / bounds.height() as f32,
        }
    }

    /// Camera pixel (truncated to whole pixels first) to canvas point.
    pub fn apply(&self, x: f32, y: f32) -> Point {
        Point::new(
            ((x as i32) as f32 * self.x) as i32,
            ((y as i32) as f32 * self.y) as i32,
        )
    }
}

/// Pick the candidate to report.
/// Without a prior position the first candidate wins (contour order, not a ranking).
/// With one, the candidate nearest to it wins.
pub fn select_candidate(candidates: &[Point], last: Option<Point>) -> Option<Point> {
    match last {
        None => candidates.first().copied(),
        Some(last) => candidates.iter().copied().min_by_key(|p| p.dist_sq(last)),
    }
}

/// Finds the marker dot in camera frames.
#[derive(Debug, Clone)]
pub struct MarkerDetector {
    filter: ColorFilter,
}

impl MarkerDetector {
    pub fn new(filter: ColorFilter) -> Self {
        Self { filter }
    }

    pub fn filter(&self) -> &ColorFilter {
        &self.filter
    }

    /// Center of every blob's enclosing circle, in canvas space.
    pub fn candidates(&self, image: &RgbImage, stretch: Stretch) -> Vec<Point> {
        debug_assert!(image.width() > 0 && image.height() > 0, "empty frame");
        let mask = self.filter.binary_mask(image);
        external_contours(&mask)
            .iter()
            .filter_map(|c| min_enclosing_circle(c))
            .map(|c| stretch.apply(c.x, c.y))
            .collect()
    }

    /// Marker position for one frame; None means the dot is not visible.
    pub fn detect(&self, frame: &Frame, last: Option<Point>, stretch: Stretch) -> Option<Point> {
        select_candidate(&self.candidates(&frame.image, stretch), last)
    }

    /// Search several frames at once and keep the first hit in slice order.
    /// Same selection rule as `detect`, so one noisy frame doesn't cost a miss.
    pub fn detect_first(
        &self,
        frames: &[Frame],
        last: Option<Point>,
        stretch: Stretch,
    ) -> Option<Point> {
        frames
            .par_iter()
            .find_map_first(|f| self.detect(f, last, stretch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::time::Instant;

    fn red_filter() -> ColorFilter {
        ColorFilter {
            band: HueBand::new(170, 10, 100, 150),
            blur_sigma: 2.0,
            threshold: 60,
        }
    }

    fn disc(image: &mut RgbImage, cx: i32, cy: i32, r: i32, color: [u8; 3]) {
        for y in (cy - r)..=(cy + r) {
            for x in (cx - r)..=(cx + r) {
                if (x - cx).pow(2) + (y - cy).pow(2) <= r * r
                    && x >= 0
                    && y >= 0
                    && (x as u32) < image.width()
                    && (y as u32) < image.height()
                {
                    image.put_pixel(x as u32, y as u32, Rgb(color));
                }
            }
        }
    }

    fn frame(image: RgbImage) -> Frame {
        Frame {
            image,
            timestamp: Instant::now(),
            crop: None,
        }
    }

    #[test]
    fn test_rgb_to_hsv_reference_hues() {
        assert_eq!(rgb_to_hsv(255, 0, 0), [0, 255, 255]);
        assert_eq!(rgb_to_hsv(0, 255, 0)[0], 60);
        assert_eq!(rgb_to_hsv(0, 0, 255)[0], 120);
        assert_eq!(rgb_to_hsv(255, 0, 42)[0], 175);
        assert_eq!(rgb_to_hsv(255, 42, 0)[0], 5);
        assert_eq!(rgb_to_hsv(0, 255, 255)[0], 90);
        assert_eq!(rgb_to_hsv(0, 0, 0), [0, 0, 0]);
        assert_eq!(rgb_to_hsv(128, 128, 128)[1], 0);
    }

    #[test]
    fn test_hue_band_wraps_past_max() {
        let band = HueBand::new(170, 10, 100, 150);
        assert_eq!(band.ranges(), vec![(170, 179), (0, 10)]);

        // hue 175, hue 5, hue 90
        let mut image = RgbImage::new(3, 1);
        image.put_pixel(0, 0, Rgb([255, 0, 42]));
        image.put_pixel(1, 0, Rgb([255, 42, 0]));
        image.put_pixel(2, 0, Rgb([0, 255, 255]));

        let mask = band.mask(&image);
        assert_eq!(mask.get_pixel(0, 0)[0], 255);
        assert_eq!(mask.get_pixel(1, 0)[0], 255);
        assert_eq!(mask.get_pixel(2, 0)[0], 0);
    }

    #[test]
    fn test_hue_band_plain_range() {
        let band = HueBand::new(50, 70, 80, 80);
        assert_eq!(band.ranges(), vec![(50, 70)]);
        assert!(band.accepts([60, 200, 200]));
        assert!(!band.accepts([90, 200, 200]));
    }

    #[test]
    fn test_mask_agrees_with_accepts() {
        let band = HueBand::new(170, 10, 100, 150);
        let mut image = RgbImage::new(16, 16);
        for (x, y, px) in image.enumerate_pixels_mut() {
            *px = Rgb([(x * 17) as u8, (y * 17) as u8, (y * 3) as u8]);
        }
        let mask = band.mask(&image);
        for (x, y, px) in image.enumerate_pixels() {
            let expected = if band.accepts(rgb_to_hsv(px[0], px[1], px[2])) { 255 } else { 0 };
            assert_eq!(mask.get_pixel(x, y)[0], expected, "pixel {x},{y}");
        }
        // The sample holds both accepted and rejected pixels.
        assert!(mask.pixels().any(|p| p[0] == 255));
        assert!(mask.pixels().any(|p| p[0] == 0));
    }

    #[test]
    fn test_hue_band_rejects_washed_out_and_dark() {
        let band = HueBand::new(170, 10, 100, 150);
        assert!(band.accepts([0, 255, 255]));
        assert!(!band.accepts([0, 50, 255])); // washed out
        assert!(!band.accepts([0, 255, 100])); // too dark
    }

    #[test]
    fn test_hue_band_clamps_out_of_range_hue() {
        let band = HueBand::new(200, 250, 0, 0);
        assert_eq!(band.ranges(), vec![(HUE_MAX, HUE_MAX)]);
    }

    #[test]
    fn test_select_candidate_prefers_nearest_to_prior() {
        let candidates = [Point::new(100, 100), Point::new(10, 10)];
        assert_eq!(
            select_candidate(&candidates, Some(Point::new(12, 11))),
            Some(Point::new(10, 10))
        );
        assert_eq!(
            select_candidate(&candidates, Some(Point::new(90, 95))),
            Some(Point::new(100, 100))
        );
    }

    #[test]
    fn test_select_candidate_without_prior_takes_first() {
        let candidates = [Point::new(10, 10), Point::new(100, 100)];
        assert_eq!(select_candidate(&candidates, None), Some(Point::new(10, 10)));
        assert_eq!(select_candidate(&[], None), None);
        assert_eq!(select_candidate(&[], Some(Point::new(1, 1))), None);
    }

    fn pts(coords: &[(i32, i32)]) -> Vec<ContourPoint> {
        coords.iter().map(|&(x, y)| ContourPoint::new(x, y)).collect()
    }

    #[test]
    fn test_min_enclosing_circle_square() {
        let c = min_enclosing_circle(&pts(&[(0, 0), (10, 0), (10, 10), (0, 10), (5, 5)])).unwrap();
        assert!((c.x - 5.0).abs() < 1e-3);
        assert!((c.y - 5.0).abs() < 1e-3);
        assert!((c.radius - 50f32.sqrt()).abs() < 1e-3);
    }

    #[test]
    fn test_min_enclosing_circle_collinear_and_single() {
        let c = min_enclosing_circle(&pts(&[(0, 0), (4, 0), (2, 0)])).unwrap();
        assert!((c.x - 2.0).abs() < 1e-3 && c.y.abs() < 1e-3);
        assert!((c.radius - 2.0).abs() < 1e-3);

        let c = min_enclosing_circle(&pts(&[(7, 3)])).unwrap();
        assert_eq!((c.x, c.y, c.radius), (7.0, 3.0, 0.0));
        assert!(min_enclosing_circle(&[]).is_none());
    }

    #[test]
    fn test_contour_bounds_cover_last_pixel() {
        let square = pts(&[(2, 3), (11, 3), (11, 12), (2, 12)]);
        let bounds = contour_bounds(&square).unwrap();
        assert_eq!(bounds.bottom_left(), Point::new(2, 3));
        assert_eq!(bounds.top_right(), Point::new(12, 13));
        assert_eq!((bounds.width(), bounds.height()), (10, 10));

        // A single pixel is a 1x1 rectangle.
        let dot = contour_bounds(&pts(&[(5, 5)])).unwrap();
        assert_eq!((dot.width(), dot.height()), (1, 1));
        assert_eq!(contour_bounds(&[]), None);
    }

    #[test]
    fn test_traced_blob_bounds_match_painted_pixels() {
        let mut mask = GrayImage::new(30, 20);
        for y in 4..14 {
            for x in 6..26 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let contours = external_contours(&mask);
        assert_eq!(contours.len(), 1);
        let bounds = contour_bounds(&contours[0]).unwrap();
        assert_eq!(bounds.bottom_left(), Point::new(6, 4));
        assert_eq!(bounds.top_right(), Point::new(26, 14));
    }

    #[test]
    fn test_stretch_between_bounds() {
        let bounds = Rectangle::new(Point::new(100, 50), Point::new(420, 290)).unwrap();
        let s = Stretch::between(&bounds, 1280, 720);
        assert_eq!(s, Stretch { x: 4.0, y: 3.0 });
        assert_eq!(s.apply(10.9, 20.2), Point::new(40, 60));
    }

    #[test]
    fn test_detect_single_blob() {
        let mut image = RgbImage::new(80, 60);
        disc(&mut image, 40, 30, 5, [255, 0, 0]);
        let detector = MarkerDetector::new(red_filter());

        let p = detector
            .detect(&frame(image), None, Stretch { x: 2.0, y: 2.0 })
            .expect("marker should be found");
        assert!((p.x - 80).abs() <= 2, "x = {}", p.x);
        assert!((p.y - 60).abs() <= 2, "y = {}", p.y);
    }

    #[test]
    fn test_detect_nothing_is_none() {
        let mut image = RgbImage::new(80, 60);
        disc(&mut image, 40, 30, 5, [0, 255, 0]); // wrong color
        let detector = MarkerDetector::new(red_filter());
        assert_eq!(detector.detect(&frame(image), None, Stretch::IDENTITY), None);
    }

    #[test]
    fn test_detect_picks_blob_nearest_prior() {
        let mut image = RgbImage::new(120, 120);
        disc(&mut image, 10, 10, 4, [255, 0, 0]);
        disc(&mut image, 100, 100, 4, [255, 0, 0]);
        let detector = MarkerDetector::new(red_filter());
        let frame = frame(image);

        assert_eq!(detector.candidates(&frame.image, Stretch::IDENTITY).len(), 2);
        let near_far = detector.detect(&frame, Some(Point::new(95, 98)), Stretch::IDENTITY).unwrap();
        assert!(near_far.dist_sq(Point::new(100, 100)) <= 8);
        let near_origin = detector.detect(&frame, Some(Point::new(12, 11)), Stretch::IDENTITY).unwrap();
        assert!(near_origin.dist_sq(Point::new(10, 10)) <= 8);
    }

    #[test]
    fn test_detect_first_skips_empty_frames() {
        let empty = frame(RgbImage::new(60, 60));
        let mut image = RgbImage::new(60, 60);
        disc(&mut image, 30, 20, 4, [255, 0, 0]);
        let hit = frame(image);
        let detector = MarkerDetector::new(red_filter());

        let frames = vec![empty.clone(), hit, empty];
        let p = detector.detect_first(&frames, None, Stretch::IDENTITY).unwrap();
        assert!(p.dist_sq(Point::new(30, 20)) <= 8);
        assert_eq!(
            detector.detect_first(&frames[..1], None, Stretch::IDENTITY),
            None
        );
    }
}
