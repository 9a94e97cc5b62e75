// Software drawing on FrameBuffers.
// Visual effects provided here:
// 1) Thick anti-aliased strokes that make up the graffiti.
// 2) Rectangle outlines and icon blits for the buttons.
// 3) A crosshair that follows the marker.

use crate::gamma::GammaLut;
use crate::types::{FrameBuffer, Point, Rectangle};

/// Put a pixel on the framebuffer if (x,y) is inside bounds.
#[inline]
pub fn put_pixel(fb: &mut FrameBuffer, x: i32, y: i32, color: u32) {
    if x < 0 || y < 0 {
        return;
    }
    let (x, y) = (x as usize, y as usize);
    if x >= fb.width || y >= fb.height {
        return;
    }
    let idx = y * fb.width + x;
    fb.pixels[idx] = color;
}

/// Draw a thin line between (x0,y0) and (x1,y1) using Bresenham.
fn draw_line(fb: &mut FrameBuffer, x0: i32, y0: i32, x1: i32, y1: i32, color: u32) {
    let (mut x0, mut y0) = (x0, y0);
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        put_pixel(fb, x0, y0, color);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Draw a small crosshair centered at `c`.
/// Visual: a "+" with a tiny gap at the center marks where the dot was seen.
pub fn draw_crosshair(fb: &mut FrameBuffer, c: Point, size: i32, color: u32) {
    draw_line(fb, c.x - size, c.y, c.x - 2, c.y, color);
    draw_line(fb, c.x + 2, c.y, c.x + size, c.y, color);
    draw_line(fb, c.x, c.y - size, c.x, c.y - 2, color);
    draw_line(fb, c.x, c.y + 2, c.x, c.y + size, color);
    put_pixel(fb, c.x, c.y, color);
}

/// Outline `rect` with a border `thickness` pixels wide, drawn inside the rect.
pub fn frame_rect(fb: &mut FrameBuffer, rect: &Rectangle, thickness: i32, color: u32) {
    let (l, r, b, t) = (rect.left_x(), rect.right_x(), rect.bottom_y(), rect.top_y());
    for i in 0..thickness {
        draw_line(fb, l, b + i, r - 1, b + i, color);
        draw_line(fb, l, t - 1 - i, r - 1, t - 1 - i, color);
        draw_line(fb, l + i, b, l + i, t - 1, color);
        draw_line(fb, r - 1 - i, b, r - 1 - i, t - 1, color);
    }
}

/// Copy `src` into `dst` with its top-left corner at (x, y), clipping at the edges.
pub fn blit(dst: &mut FrameBuffer, x: i32, y: i32, src: &FrameBuffer) {
    for sy in 0..src.height {
        let dy = y + sy as i32;
        if dy < 0 || dy as usize >= dst.height {
            continue;
        }
        for sx in 0..src.width {
            let dx = x + sx as i32;
            if dx < 0 || dx as usize >= dst.width {
                continue;
            }
            dst.pixels[dy as usize * dst.width + dx as usize] = src.pixels[sy * src.width + sx];
        }
    }
}

/// Flip left-right in place (mirror mode).
pub fn mirror_horizontal(fb: &mut FrameBuffer) {
    for row in fb.pixels.chunks_exact_mut(fb.width.max(1)) {
        row.reverse();
    }
}

/// Draw a segment from `a` to `b`, `radius` pixels thick, with round caps.
/// Each pixel is covered by how far it sits inside the capsule, so the rim is anti-aliased.
pub fn draw_stroke(
    fb: &mut FrameBuffer,
    a: Point,
    b: Point,
    radius: i32,
    color: u32,
    lut: &GammaLut,
) {
    let r = radius.max(1) as f32;
    let pad = radius.max(1) + 1;

    // Scan just the bounding box of the capsule.
    let x0 = (a.x.min(b.x) - pad).max(0);
    let y0 = (a.y.min(b.y) - pad).max(0);
    let x1 = (a.x.max(b.x) + pad).min(fb.width as i32 - 1);
    let y1 = (a.y.max(b.y) + pad).min(fb.height as i32 - 1);

    let (ax, ay) = (a.x as f32, a.y as f32);
    let (dx, dy) = ((b.x - a.x) as f32, (b.y - a.y) as f32);
    let len2 = dx * dx + dy * dy;

    for y in y0..=y1 {
        for x in x0..=x1 {
            let (px, py) = (x as f32, y as f32);
            // Closest point on the segment.
            let t = if len2 > 0.0 {
                (((px - ax) * dx + (py - ay) * dy) / len2).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let (cx, cy) = (ax + t * dx, ay + t * dy);
            let d = ((px - cx).powi(2) + (py - cy).powi(2)).sqrt();

            let coverage = (r + 0.5 - d).clamp(0.0, 1.0);
            if coverage <= 0.0 {
                continue;
            }
            let idx = y as usize * fb.width + x as usize;
            fb.pixels[idx] = lut.mix(fb.pixels[idx], color, coverage);
        }
    }
}
