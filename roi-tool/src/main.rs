use anyhow::{Context, Result};
use futures::stream::{StreamExt as _, TryStreamExt as _};
use log::{debug, info, warn, LevelFilter};
use roi_data::{
    config::{Config, DatasetConfig},
    dataset::CsvRoiDataset,
    dispatch::{Minibatch, RecordListAssembler},
    RoiDataLoader,
};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use structopt::StructOpt;

#[derive(Debug, Clone, StructOpt)]
/// Prepare ROI records for detector training
enum Args {
    /// Prepare records and report the regression target statistics
    Prepare {
        #[structopt(long, default_value = "roi.json5")]
        /// configuration file
        config_file: PathBuf,
        #[structopt(long)]
        /// write the statistics to this JSON file instead of stdout
        output_file: Option<PathBuf>,
    },
    /// Prepare records and draw minibatches from them
    Sample {
        #[structopt(long, default_value = "roi.json5")]
        /// configuration file
        config_file: PathBuf,
        #[structopt(long, default_value = "10")]
        /// number of minibatches to draw
        num_batches: usize,
    },
}

#[tokio::main]
pub async fn main() -> Result<()> {
    // setup logger
    {
        let mut builder = pretty_env_logger::formatted_timed_builder();
        match env::var("RUST_LOG") {
            Ok(filters) => builder.parse_filters(&filters),
            Err(_) => builder.filter_level(LevelFilter::Info),
        };
        builder.init();
    }

    match Args::from_args() {
        Args::Prepare {
            config_file,
            output_file,
        } => prepare(config_file, output_file).await?,
        Args::Sample {
            config_file,
            num_batches,
        } => sample(config_file, num_batches).await?,
    }

    Ok(())
}

async fn prepare(config_file: PathBuf, output_file: Option<PathBuf>) -> Result<()> {
    let loader = load(&config_file).await?;

    let stats = match loader.normalization_stats() {
        Some(stats) => stats,
        None => {
            warn!("bounding-box regression is disabled, no statistics to report");
            return Ok(());
        }
    };
    let text = serde_json::to_string_pretty(stats)?;

    match output_file {
        Some(path) => {
            fs::write(&path, text)
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            info!("saved normalization statistics to '{}'", path.display());
        }
        None => println!("{}", text),
    }

    Ok(())
}

async fn sample(config_file: PathBuf, num_batches: usize) -> Result<()> {
    let mut loader = load(&config_file).await?;
    loader.start_sampling()?;

    loader
        .train_stream()?
        .take(num_batches)
        .enumerate()
        .map(|(step, result)| result.map(|minibatch| (step, minibatch)))
        .try_for_each(|(step, minibatch)| async move {
            let Minibatch { indices, blobs } = minibatch;
            let num_rois: usize = blobs.iter().map(|record| record.num_rois()).sum();
            info!("step {}: records {:?} with {} ROIs", step, indices, num_rois);

            blobs
                .iter()
                .flat_map(|record| &record.bbox_targets)
                .filter(|target| !target.is_zero())
                .for_each(|target| {
                    debug!("target (class, dx, dy, dw, dh) = {:?}", target.to_array());
                });
            Ok(())
        })
        .await?;

    Ok(())
}

async fn load(config_file: &Path) -> Result<RoiDataLoader<RecordListAssembler>> {
    let Config { dataset, training } = Config::open(config_file)
        .with_context(|| format!("failed to load config file '{}'", config_file.display()))?;

    let dataset = match dataset {
        DatasetConfig::Csv {
            image_dir,
            label_file,
            classes_file,
        } => CsvRoiDataset::load(image_dir, label_file, classes_file).await?,
    };
    info!(
        "loaded {} images with {} classes",
        dataset.records.len(),
        dataset.classes.len()
    );

    let mut loader = RoiDataLoader::new(training, Box::new(dataset), RecordListAssembler)?;
    let num_records = loader.preprocess_for_training().await?.len();
    info!("prepared {} records for training", num_records);

    Ok(loader)
}
