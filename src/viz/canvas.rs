//! Minimal raster drawing on `RgbaImage`. Shapes are
//! clipped to the image.

use image::{Rgba, RgbaImage};

pub(crate) fn blank(width: u32, height: u32, background: Rgba<u8>) -> RgbaImage {
    RgbaImage::from_pixel(width.max(1), height.max(1), background)
}

fn put(image: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

/// Filled axis-aligned rectangle covering `[x0, x1) x [y0, y1)`.
pub(crate) fn fill_rect(image: &mut RgbaImage, x0: f64, y0: f64, x1: f64, y1: f64, color: Rgba<u8>) {
    let (x0, x1) = (x0.min(x1).round() as i64, x0.max(x1).round() as i64);
    let (y0, y1) = (y0.min(y1).round() as i64, y0.max(y1).round() as i64);
    for y in y0..y1 {
        for x in x0..x1 {
            put(image, x, y, color);
        }
    }
}

pub(crate) fn stroke_rect(image: &mut RgbaImage, x0: f64, y0: f64, x1: f64, y1: f64, color: Rgba<u8>) {
    line(image, x0, y0, x1, y0, color);
    line(image, x1, y0, x1, y1, color);
    line(image, x1, y1, x0, y1, color);
    line(image, x0, y1, x0, y0, color);
}

/// Bresenham line between two points.
pub(crate) fn line(image: &mut RgbaImage, x1: f64, y1: f64, x2: f64, y2: f64, color: Rgba<u8>) {
    let (x1, y1) = (x1.round() as i64, y1.round() as i64);
    let (x2, y2) = (x2.round() as i64, y2.round() as i64);

    let dx = (x2 - x1).abs();
    let dy = -(y2 - y1).abs();
    let sx = if x1 < x2 { 1 } else { -1 };
    let sy = if y1 < y2 { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (x1, y1);
    loop {
        put(image, x, y, color);
        if x == x2 && y == y2 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

pub(crate) fn dot(image: &mut RgbaImage, cx: f64, cy: f64, radius: f64, color: Rgba<u8>) {
    let r2 = radius * radius;
    let (x0, x1) = ((cx - radius).floor() as i64, (cx + radius).ceil() as i64);
    let (y0, y1) = ((cy - radius).floor() as i64, (cy + radius).ceil() as i64);
    for y in y0..=y1 {
        for x in x0..=x1 {
            let (dx, dy) = (x as f64 - cx, y as f64 - cy);
            if dx * dx + dy * dy <= r2 {
                put(image, x, y, color);
            }
        }
    }
}

/// Copy `src` onto `dst` with its top-left corner at
/// `(x, y)`. Transparent source pixels are skipped.
pub(crate) fn paste(dst: &mut RgbaImage, src: &RgbaImage, x: i64, y: i64) {
    for (sx, sy, px) in src.enumerate_pixels() {
        if px[3] > 0 {
            put(dst, x + sx as i64, y + sy as i64, *px);
        }
    }
}
