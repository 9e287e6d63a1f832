use camcal_core::{DetectedCorners, GrayImageView, PatternGeometry};
use chess_corners::{find_chess_corners_image, CornerDescriptor};
use image::{DynamicImage, GrayImage};
use log::debug;
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::gridgraph::assemble_grid;
use crate::normalize::stretch_contrast;
use crate::params::ChessboardParams;
use crate::subpix::refine_corners;

/// Locates a checkerboard in one image.
///
/// `None` is a regular negative result. Implementations must not keep
/// state between calls: equal inputs give equal outputs.
pub trait PatternDetector {
    fn detect(&self, image: &DynamicImage, geometry: PatternGeometry) -> Option<DetectedCorners>;
}

impl<D: PatternDetector + ?Sized> PatternDetector for &D {
    fn detect(&self, image: &DynamicImage, geometry: PatternGeometry) -> Option<DetectedCorners> {
        (**self).detect(image, geometry)
    }
}

impl<D: PatternDetector + ?Sized> PatternDetector for Box<D> {
    fn detect(&self, image: &DynamicImage, geometry: PatternGeometry) -> Option<DetectedCorners> {
        (**self).detect(image, geometry)
    }
}

/// Borrow an `image::GrayImage` as a `camcal-core` view.
pub fn gray_view(img: &GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Checkerboard detector: ChESS candidates, grid assembly, subpixel refinement.
#[derive(Clone, Debug, Default)]
pub struct ChessboardDetector {
    pub params: ChessboardParams,
}

impl ChessboardDetector {
    pub fn new(params: ChessboardParams) -> Self {
        Self { params }
    }

    /// ChESS candidates strictly above `min_corner_strength`, strongest first.
    ///
    /// Ties are broken by position so the order never depends on the
    /// detector's internal traversal.
    fn candidates(&self, gray: &GrayImage) -> Vec<CornerDescriptor> {
        let cfg = self.params.chess_config();
        let mut raw: Vec<CornerDescriptor> = find_chess_corners_image(gray, &cfg)
            .into_iter()
            .filter(|c| c.response > self.params.min_corner_strength)
            .filter(|c| c.x.is_finite() && c.y.is_finite())
            .collect();
        raw.sort_by(|a, b| {
            b.response
                .total_cmp(&a.response)
                .then(a.y.total_cmp(&b.y))
                .then(a.x.total_cmp(&b.x))
        });
        raw.truncate(self.params.max_candidates);
        raw
    }

    /// Detect on a single-channel image.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip(self, gray),
            fields(width = gray.width(), height = gray.height(), pattern = %geometry)
        )
    )]
    pub fn detect_gray(
        &self,
        gray: &GrayImage,
        geometry: PatternGeometry,
    ) -> Option<DetectedCorners> {
        let normalized;
        let gray = if self.params.normalize_intensity {
            let [lo, hi] = self.params.normalize_percentiles;
            normalized = stretch_contrast(gray, lo, hi);
            &normalized
        } else {
            gray
        };

        let candidates = self.candidates(gray);
        debug!(
            "{} ChESS candidates for a {} pattern",
            candidates.len(),
            geometry
        );

        let points: Vec<Point2<f32>> = candidates
            .iter()
            .map(|c| Point2::new(c.x, c.y))
            .collect();
        let order = assemble_grid(&points, geometry, &self.params.graph)?;

        let mut ordered: Vec<Point2<f32>> = order.iter().map(|&k| points[k]).collect();
        refine_corners(&gray_view(gray), &mut ordered, &self.params.subpix);

        DetectedCorners::new(geometry, ordered).ok()
    }
}

impl PatternDetector for ChessboardDetector {
    fn detect(&self, image: &DynamicImage, geometry: PatternGeometry) -> Option<DetectedCorners> {
        let gray = image.to_luma8();
        self.detect_gray(&gray, geometry)
    }
}
