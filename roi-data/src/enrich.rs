//! Attach image metadata and overlap statistics to raw ROI records.

use crate::{
    common::*,
    dataset::{ImageDims, ImageSizeReader, RoiDataset},
    record::{BboxTarget, ImageRecord, RoiRecord},
};

/// Enrich every record of the dataset.
///
/// Image dimensions are read once per record, in parallel. The records are
/// then densified in order and the first one breaking the background
/// invariant aborts the whole stage.
pub async fn enrich_records(
    dataset: &dyn RoiDataset,
    size_reader: Arc<dyn ImageSizeReader>,
) -> Result<Vec<ImageRecord>> {
    let num_images = dataset.num_images();

    let image_paths: Vec<PathBuf> = (0..num_images)
        .map(|index| {
            dataset
                .image_path_at(index)
                .map(Path::to_owned)
                .ok_or_else(|| format_err!("the dataset has no image path for record {}", index))
        })
        .try_collect()?;

    // read image sizes
    let sizes: Vec<ImageDims> = stream::iter(image_paths.clone())
        .par_map(None, move |path| {
            let size_reader = size_reader.clone();
            move || size_reader.image_size(&path)
        })
        .try_collect()
        .await?;

    let records: Vec<_> = izip!(dataset.records(), image_paths, sizes)
        .enumerate()
        .map(|(index, (record, image_path, size))| enrich_record(index, record, image_path, size))
        .try_collect()?;

    debug!("enriched {} image records", records.len());
    Ok(records)
}

/// Enrich one record and check `max_overlap == 0 <=> max_class == 0`.
pub fn enrich_record(
    index: usize,
    record: &RoiRecord,
    image_path: PathBuf,
    size: ImageDims,
) -> Result<ImageRecord> {
    let RoiRecord {
        ref boxes,
        ref gt_overlaps,
        flipped,
    } = *record;
    let ImageDims { width, height } = size;

    let dense = gt_overlaps.densify(boxes.len()).with_context(|| {
        format!(
            "data integrity fault in record {} ('{}')",
            index,
            image_path.display()
        )
    })?;

    if let Some(roi) = dense.find_background_violation() {
        bail!(
            "data integrity fault in record {} ('{}'): ROI {} has max overlap {} with class {}",
            index,
            image_path.display(),
            roi,
            dense.max_overlaps[roi],
            dense.max_classes[roi]
        );
    }

    Ok(ImageRecord {
        image_path,
        width,
        height,
        flipped,
        boxes: boxes.clone(),
        gt_overlaps: gt_overlaps.clone(),
        max_overlaps: dense.max_overlaps,
        max_classes: dense.max_classes,
        bbox_targets: vec![BboxTarget::ZERO; boxes.len()],
    })
}
