use std::path::PathBuf;

use clap::Parser;
use log::info;

use wisdm_har::config::PipelineConfig;
use wisdm_har::dataset::{make_windows, read_sensor_table, select_user_subset};
use wisdm_har::folds::generate_folds;

#[derive(Parser)]
#[command(name = "make-folds")]
#[command(about = "Window the raw sensor table and write stratified k-fold partitions")]
struct Args {
    /// The raw sensor table (user,activity,timestamp,x,y,z; rows)
    #[arg(long, default_value = "data/WISDM_ar_v1.1_raw.txt")]
    raw_file: PathBuf,

    /// Partitions are written under `<out_dir>/train` and `<out_dir>/test`
    #[arg(long, default_value = "data")]
    out_dir: PathBuf,

    #[arg(long, default_value = "5")]
    folds: usize,

    #[arg(long, default_value = "30")]
    window_size: usize,

    #[arg(long, default_value = "30")]
    stride: usize,

    /// Seed for the stratified fold shuffle
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Keep only users seen in the first fraction of raw rows
    #[arg(long)]
    subset_fraction: Option<f32>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = PipelineConfig {
        raw_file: args.raw_file,
        out_dir: args.out_dir,
        fold_count: args.folds,
        window_size: args.window_size,
        stride: args.stride,
        seed: args.seed,
        subset_fraction: args.subset_fraction,
        ..PipelineConfig::default()
    };

    let mut rows = read_sensor_table(&config.raw_file)?;
    if let Some(fraction) = config.subset_fraction {
        rows = select_user_subset(rows, fraction);
    }

    let (x, y) = make_windows(&rows, config.window_size, config.stride)?;
    info!("windowed table into {} samples", x.shape()[0]);

    generate_folds(&x, &y, &config)?;

    println!(
        "wrote {} folds ({} windows) under '{}'",
        config.fold_count,
        y.len(),
        config.out_dir.display()
    );
    Ok(())
}
