use anyhow::Result;
use roi_data::{
    config::TrainingConfig,
    dataset::{CsvRoiDataset, HeaderSizeReader},
    dispatch::RecordListAssembler,
    preprocess_for_testing, RoiDataLoader,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

fn fixture_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("csv_dataset")
}

async fn load_dataset() -> Result<CsvRoiDataset> {
    let base_dir = fixture_dir();
    CsvRoiDataset::load(
        base_dir.join("images"),
        base_dir.join("label.csv"),
        base_dir.join("classes.txt"),
    )
    .await
}

#[tokio::test]
async fn csv_training_pipeline() -> Result<()> {
    let config = TrainingConfig {
        normalize_targets_precomputed: None,
        seed: Some(0),
        ..Default::default()
    };
    let dataset = load_dataset().await?;
    let mut loader = RoiDataLoader::new(config, Box::new(dataset), RecordListAssembler)?;

    // c.png and its mirror have no fg or bg ROI
    let prepared = loader.preprocess_for_training().await?;
    assert_eq!(prepared.len(), 4);
    assert_eq!(
        prepared
            .iter()
            .map(|record| (record.width, record.height))
            .collect::<Vec<_>>(),
        vec![(64, 48), (80, 60), (64, 48), (80, 60)]
    );

    let first = &prepared[0];
    assert_eq!(first.max_overlaps, vec![1.0, 0.6, 0.0]);
    assert_eq!(first.max_classes, vec![1, 1, 0]);
    assert_eq!(first.bbox_targets[1].class, 1);
    assert!(first.bbox_targets[2].is_zero());

    let stats = loader.normalization_stats().unwrap();
    assert_eq!(stats.num_classes(), 3);
    assert_eq!(stats.means().len(), 12);

    loader.start_sampling()?;
    let batch = loader.next_batch()?;
    assert_eq!(batch.indices.len(), 2);

    Ok(())
}

#[tokio::test]
async fn csv_testing_pipeline() -> Result<()> {
    let dataset = load_dataset().await?;
    let records = preprocess_for_testing(&dataset, Arc::new(HeaderSizeReader)).await?;

    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|record| !record.flipped));
    assert_eq!((records[2].width, records[2].height), (32, 32));

    Ok(())
}
