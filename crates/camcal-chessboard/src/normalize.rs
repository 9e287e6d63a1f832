use image::GrayImage;

/// Intensity at percentile `pct` (0..=100) of an 8-bit histogram.
fn percentile(hist: &[u32; 256], total: u64, pct: f32) -> u8 {
    let target = ((pct.clamp(0.0, 100.0) / 100.0) as f64 * total as f64).ceil() as u64;
    let mut acc = 0u64;
    for (v, &count) in hist.iter().enumerate() {
        acc += count as u64;
        if acc >= target.max(1) {
            return v as u8;
        }
    }
    255
}

/// Linear contrast stretch mapping the `[low, high]` percentiles to `[0, 255]`.
///
/// Images with (near) constant intensity are returned unchanged.
pub fn stretch_contrast(img: &GrayImage, low_pct: f32, high_pct: f32) -> GrayImage {
    let mut hist = [0u32; 256];
    for &v in img.as_raw() {
        hist[v as usize] += 1;
    }
    let total = img.as_raw().len() as u64;
    if total == 0 {
        return img.clone();
    }

    let lo = percentile(&hist, total, low_pct) as f32;
    let hi = percentile(&hist, total, high_pct) as f32;
    if hi - lo < 2.0 {
        return img.clone();
    }

    let scale = 255.0 / (hi - lo);
    let mut lut = [0u8; 256];
    for (v, out) in lut.iter_mut().enumerate() {
        *out = ((v as f32 - lo) * scale).round().clamp(0.0, 255.0) as u8;
    }

    let mut out = img.clone();
    for px in out.iter_mut() {
        *px = lut[*px as usize];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_contrast_image_is_stretched() {
        let img = GrayImage::from_fn(20, 10, |x, _| image::Luma([if x < 10 { 100 } else { 140 }]));
        let out = stretch_contrast(&img, 1.0, 99.0);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(19, 0).0[0], 255);
    }

    #[test]
    fn flat_image_is_untouched() {
        let img = GrayImage::from_pixel(8, 8, image::Luma([77]));
        let out = stretch_contrast(&img, 1.0, 99.0);
        assert!(out.as_raw().iter().all(|&v| v == 77));
    }
}
