//! Corner overlay for display.

use camcal_core::DetectedCorners;
use image::{Rgb, RgbImage};
use nalgebra::Point2;

const ROW_COLORS: [[u8; 3]; 7] = [
    [255, 0, 0],
    [255, 128, 0],
    [200, 200, 0],
    [0, 200, 0],
    [0, 200, 200],
    [0, 0, 255],
    [255, 0, 255],
];

const MARKER_RADIUS: i32 = 4;

fn put(img: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && x < img.width() as i32 && y < img.height() as i32 {
        img.put_pixel(x as u32, y as u32, color);
    }
}

fn line(img: &mut RgbImage, a: Point2<f32>, b: Point2<f32>, color: Rgb<u8>) {
    let (mut x0, mut y0) = (a.x.round() as i32, a.y.round() as i32);
    let (x1, y1) = (b.x.round() as i32, b.y.round() as i32);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        put(img, x0, y0, color);
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

fn circle(img: &mut RgbImage, c: Point2<f32>, radius: i32, color: Rgb<u8>) {
    let (cx, cy) = (c.x.round() as i32, c.y.round() as i32);
    let (mut x, mut y) = (radius, 0);
    let mut err = 1 - radius;
    while x >= y {
        for (px, py) in [(x, y), (y, x), (-y, x), (-x, y), (-x, -y), (-y, -x), (y, -x), (x, -y)] {
            put(img, cx + px, cy + py, color);
        }
        y += 1;
        if err < 0 {
            err += 2 * y + 1;
        } else {
            x -= 1;
            err += 2 * (y - x) + 1;
        }
    }
}

/// Copy of `image` with the detected corners drawn on it.
///
/// Each row gets its own colour; consecutive corners are joined, so the
/// path zig-zags through the board in detection order.
pub fn draw_corners(image: &RgbImage, corners: &DetectedCorners) -> RgbImage {
    let mut out = image.clone();
    let cols = corners.geometry().cols() as usize;
    let points = corners.points();
    let color_of = |k: usize| Rgb(ROW_COLORS[(k / cols) % ROW_COLORS.len()]);

    for (k, pair) in points.windows(2).enumerate() {
        line(&mut out, pair[0], pair[1], color_of(k + 1));
    }
    for (k, p) in points.iter().enumerate() {
        circle(&mut out, *p, MARKER_RADIUS, color_of(k));
    }
    out
}
