use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;
use log::debug;

use super::{Frame, SourceError};

/// One image of a batch and the name it is reported under.
#[derive(Clone, Debug)]
pub struct BatchItem {
    pub label: String,
    pub image: Arc<DynamicImage>,
}

/// A finite, ordered set of images consumed front to back.
#[derive(Clone, Debug, Default)]
pub struct ImageBatch {
    items: Vec<BatchItem>,
    cursor: usize,
}

impl ImageBatch {
    pub fn from_items(items: Vec<BatchItem>) -> Self {
        Self { items, cursor: 0 }
    }

    /// In-memory images, labelled `image 1`, `image 2`, ...
    pub fn from_images(images: impl IntoIterator<Item = DynamicImage>) -> Self {
        Self::from_items(
            images
                .into_iter()
                .enumerate()
                .map(|(i, image)| BatchItem {
                    label: format!("image {}", i + 1),
                    image: Arc::new(image),
                })
                .collect(),
        )
    }

    /// Decode every file up front; the first unreadable file fails the load.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self, SourceError> {
        let mut items = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let image = image::open(path).map_err(|source| SourceError::ImageLoad {
                path: path.to_path_buf(),
                source,
            })?;
            debug!("loaded {} ({}x{})", path.display(), image.width(), image.height());
            items.push(BatchItem {
                label: path.display().to_string(),
                image: Arc::new(image),
            });
        }
        Ok(Self::from_items(items))
    }

    /// Hand out the image under the cursor and advance it.
    ///
    /// Returns the zero-based index of the image together with its frame.
    pub fn next_frame(&mut self) -> Result<(usize, &BatchItem, Frame), SourceError> {
        let index = self.cursor;
        let item = self.items.get(index).ok_or(SourceError::BatchExhausted {
            total: self.items.len(),
        })?;
        self.cursor += 1;
        let frame = Frame {
            image: Arc::clone(&item.image),
            sequence: index as u64,
        };
        Ok((index, item, frame))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Index of the next image to hand out.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Images not yet handed out.
    pub fn remaining(&self) -> usize {
        self.items.len().saturating_sub(self.cursor)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}
