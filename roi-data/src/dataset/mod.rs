//! Dataset collaborators supplying raw ROI records.

mod csv;
mod memory;

pub use self::csv::*;
pub use memory::*;

use crate::{common::*, record::RoiRecord};

/// The name of class zero.
pub const BACKGROUND_CLASS: &str = "__background__";

/// The dataset of per-image ROI records.
pub trait RoiDataset
where
    Self: Debug + Send + Sync,
{
    /// The list of class names, with the background class at index zero.
    fn classes(&self) -> &IndexSet<String>;

    /// Get the list of raw ROI records.
    fn records(&self) -> &[RoiRecord];

    /// Get the image path of the nth record.
    fn image_path_at(&self, index: usize) -> Option<&Path>;

    /// Append a horizontally mirrored copy of every record.
    fn append_flipped_images(&mut self) -> Result<()>;

    fn num_classes(&self) -> usize {
        self.classes().len()
    }

    fn num_images(&self) -> usize {
        self.records().len()
    }
}

/// Width and height of an image in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageDims {
    pub width: usize,
    pub height: usize,
}

/// Reads the dimensions of an image file.
pub trait ImageSizeReader
where
    Self: Debug + Send + Sync,
{
    fn image_size(&self, path: &Path) -> Result<ImageDims>;
}

/// Reads image dimensions from the file header without decoding pixels.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderSizeReader;

impl ImageSizeReader for HeaderSizeReader {
    fn image_size(&self, path: &Path) -> Result<ImageDims> {
        let imagesize::ImageSize { width, height } = imagesize::size(path)
            .with_context(|| format!("failed to read image size of '{}'", path.display()))?;
        ensure!(
            width > 0 && height > 0,
            "image '{}' has zero width or height",
            path.display()
        );
        Ok(ImageDims { width, height })
    }
}

/// Build the class list with the background class prepended.
pub fn with_background_class<I, S>(foreground: I) -> Result<IndexSet<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let foreground: Vec<String> = foreground.into_iter().map(Into::into).collect();
    let classes: IndexSet<_> = iter::once(BACKGROUND_CLASS.to_owned())
        .chain(foreground.iter().cloned())
        .collect();
    ensure!(
        classes.len() == foreground.len() + 1,
        "duplicated or reserved class names found"
    );
    Ok(classes)
}
