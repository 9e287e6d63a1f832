//! Accumulation of per-view 2D/3D correspondences.

use std::sync::Arc;

use log::debug;
use nalgebra::{Point2, Point3};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{DetectedCorners, ImageSize, PatternGeometry};

/// Reasons a view is refused by [`CorrespondenceStore::accept`].
///
/// A refused view leaves the store unchanged.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("view has {got} corners, store expects {expected}")]
    CornerCountMismatch { expected: usize, got: usize },
    #[error("view pattern {got} differs from store pattern {expected}")]
    PatternMismatch {
        expected: PatternGeometry,
        got: PatternGeometry,
    },
    #[error(
        "view is {}x{}, store reference is {}x{}",
        .got.width,
        .got.height,
        .expected.width,
        .expected.height
    )]
    ImageSizeMismatch { expected: ImageSize, got: ImageSize },
}

/// Parallel image-point / object-point sequences, one entry per view.
///
/// Every entry carries exactly `geometry.corner_count()` points. Object
/// points are shared between views since they are the same planar grid.
#[derive(Clone, Debug)]
pub struct CorrespondenceSet {
    geometry: PatternGeometry,
    image_points: Vec<Vec<Point2<f32>>>,
    object_points: Vec<Arc<[Point3<f64>]>>,
}

/// One accepted view: matched pixel and planar board coordinates.
#[derive(Clone, Copy, Debug)]
pub struct View<'a> {
    pub image_points: &'a [Point2<f32>],
    pub object_points: &'a [Point3<f64>],
}

impl CorrespondenceSet {
    fn empty(geometry: PatternGeometry) -> Self {
        Self {
            geometry,
            image_points: Vec::new(),
            object_points: Vec::new(),
        }
    }

    pub fn geometry(&self) -> PatternGeometry {
        self.geometry
    }

    pub fn len(&self) -> usize {
        self.image_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_points.is_empty()
    }

    pub fn view(&self, index: usize) -> Option<View<'_>> {
        Some(View {
            image_points: self.image_points.get(index)?,
            object_points: self.object_points.get(index)?,
        })
    }

    pub fn views(&self) -> impl ExactSizeIterator<Item = View<'_>> + '_ {
        self.image_points
            .iter()
            .zip(self.object_points.iter())
            .map(|(img, obj)| View {
                image_points: img,
                object_points: obj,
            })
    }

    /// Total number of corner observations over all views.
    pub fn point_count(&self) -> usize {
        self.image_points.iter().map(Vec::len).sum()
    }
}

/// Append-only store of accepted views for one pattern geometry.
///
/// Views can only be added through [`accept`](Self::accept), which checks
/// corner count, pattern and image size before touching anything, and
/// removed all at once through [`reset`](Self::reset).
#[derive(Debug)]
pub struct CorrespondenceStore {
    canonical: Arc<[Point3<f64>]>,
    set: CorrespondenceSet,
    image_size: Option<ImageSize>,
    revision: u64,
}

impl CorrespondenceStore {
    pub fn new(geometry: PatternGeometry) -> Self {
        Self {
            canonical: geometry.object_points().into(),
            set: CorrespondenceSet::empty(geometry),
            image_size: None,
            revision: 0,
        }
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, corners), fields(views = self.set.len()))
    )]
    pub fn accept(
        &mut self,
        corners: &DetectedCorners,
        image_size: ImageSize,
    ) -> Result<usize, StoreError> {
        let geometry = self.set.geometry;
        let expected = geometry.corner_count();
        if corners.len() != expected {
            return Err(StoreError::CornerCountMismatch {
                expected,
                got: corners.len(),
            });
        }
        if corners.geometry() != geometry {
            return Err(StoreError::PatternMismatch {
                expected: geometry,
                got: corners.geometry(),
            });
        }
        if let Some(reference) = self.image_size {
            if reference != image_size {
                return Err(StoreError::ImageSizeMismatch {
                    expected: reference,
                    got: image_size,
                });
            }
        }

        self.image_size.get_or_insert(image_size);
        self.set.image_points.push(corners.points().to_vec());
        self.set.object_points.push(Arc::clone(&self.canonical));
        self.revision += 1;

        let count = self.set.len();
        debug!("accepted view {count} ({geometry})");
        Ok(count)
    }

    /// Drop every view and the reference image size.
    pub fn reset(&mut self) {
        if !self.set.is_empty() || self.image_size.is_some() {
            self.revision += 1;
        }
        self.set.image_points.clear();
        self.set.object_points.clear();
        self.image_size = None;
    }

    /// Reset and switch to a new pattern geometry.
    pub fn reset_with(&mut self, geometry: PatternGeometry) {
        self.reset();
        if geometry != self.set.geometry {
            self.canonical = geometry.object_points().into();
            self.set.geometry = geometry;
            self.revision += 1;
        }
    }

    pub fn count(&self) -> usize {
        self.set.len()
    }

    pub fn geometry(&self) -> PatternGeometry {
        self.set.geometry
    }

    pub fn set(&self) -> &CorrespondenceSet {
        &self.set
    }

    /// Size of the first accepted view, shared by all later ones.
    pub fn image_size(&self) -> Option<ImageSize> {
        self.image_size
    }

    /// Bumped on every change to the stored views.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corners(geometry: PatternGeometry, offset: f32) -> DetectedCorners {
        let pts = (0..geometry.rows())
            .flat_map(|r| {
                (0..geometry.cols())
                    .map(move |c| Point2::new(offset + c as f32 * 10.0, offset + r as f32 * 10.0))
            })
            .collect();
        DetectedCorners::new(geometry, pts).expect("full grid")
    }

    fn vga() -> ImageSize {
        ImageSize::new(640, 480)
    }

    #[test]
    fn accept_appends_parallel_views() {
        let g = PatternGeometry::new(9, 6).expect("valid");
        let mut store = CorrespondenceStore::new(g);
        assert_eq!(store.accept(&corners(g, 0.0), vga()), Ok(1));
        assert_eq!(store.accept(&corners(g, 5.0), vga()), Ok(2));

        let set = store.set();
        assert_eq!(set.len(), 2);
        assert_eq!(set.point_count(), 108);
        for view in set.views() {
            assert_eq!(view.image_points.len(), 54);
            assert_eq!(view.object_points.len(), 54);
        }
        let second = set.view(1).expect("second view");
        assert_eq!(second.image_points[0], Point2::new(5.0, 5.0));
        assert_eq!(second.object_points[10], Point3::new(1.0, 1.0, 0.0));
        assert_eq!(store.image_size(), Some(vga()));
    }

    #[test]
    fn mismatched_view_leaves_store_untouched() {
        let g = PatternGeometry::new(9, 6).expect("valid");
        let mut store = CorrespondenceStore::new(g);
        store.accept(&corners(g, 0.0), vga()).expect("first");
        let revision = store.revision();

        let other = PatternGeometry::new(7, 5).expect("valid");
        assert_eq!(
            store.accept(&corners(other, 0.0), vga()),
            Err(StoreError::CornerCountMismatch {
                expected: 54,
                got: 35
            })
        );

        let transposed = PatternGeometry::new(6, 9).expect("valid");
        assert!(matches!(
            store.accept(&corners(transposed, 0.0), vga()),
            Err(StoreError::PatternMismatch { .. })
        ));

        assert!(matches!(
            store.accept(&corners(g, 0.0), ImageSize::new(800, 600)),
            Err(StoreError::ImageSizeMismatch { .. })
        ));

        assert_eq!(store.count(), 1);
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn reset_clears_everything() {
        let g = PatternGeometry::new(4, 4).expect("valid");
        let mut store = CorrespondenceStore::new(g);
        for i in 0..3 {
            store.accept(&corners(g, i as f32), vga()).expect("accept");
        }
        store.reset();
        assert_eq!(store.count(), 0);
        assert!(store.set().is_empty());
        assert_eq!(store.image_size(), None);

        // Size reference is taken afresh after a reset.
        store
            .accept(&corners(g, 0.0), ImageSize::new(320, 240))
            .expect("new reference");
        assert_eq!(store.image_size(), Some(ImageSize::new(320, 240)));
    }

    #[test]
    fn reset_with_switches_geometry() {
        let g = PatternGeometry::new(9, 6).expect("valid");
        let mut store = CorrespondenceStore::new(g);
        store.accept(&corners(g, 0.0), vga()).expect("accept");

        let next = PatternGeometry::new(5, 4).expect("valid");
        store.reset_with(next);
        assert_eq!(store.count(), 0);
        assert_eq!(store.geometry(), next);
        assert_eq!(store.accept(&corners(next, 0.0), vga()), Ok(1));
        assert_eq!(store.set().view(0).map(|v| v.object_points.len()), Some(20));
    }
}
