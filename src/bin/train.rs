use std::path::PathBuf;

use clap::Parser;
use log::info;

use wisdm_har::common::WINDOW_SIZE;
use wisdm_har::config::TrainingConfig;
use wisdm_har::model::SimpleMlp;
use wisdm_har::partition::load_partition_data;
use wisdm_har::trainer::CentralizedTrainer;

#[derive(Parser)]
#[command(name = "train")]
#[command(about = "Train the MLP classifier centrally on one fold's partitions")]
struct Args {
    /// Directory holding the `train/` and `test/` partition files
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    #[arg(long, default_value = "1")]
    fold: usize,

    #[arg(long, default_value = "300")]
    batch_size: usize,

    #[arg(long, default_value = "0.1")]
    lr: f32,

    #[arg(long, default_value = "0.9")]
    momentum: f32,

    #[arg(long, default_value = "100")]
    epochs: usize,

    /// Seed for parameter initialization and epoch shuffling
    #[arg(long, default_value = "0")]
    seed: u64,

    #[arg(long, default_value = "best_model.json")]
    checkpoint: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    info!("loading fold {} with batch size {}", args.fold, args.batch_size);
    // A missing fold file is fatal: training on a silently empty dataset
    // would corrupt downstream metrics.
    let mut dataset =
        load_partition_data(&args.data_dir, args.batch_size, args.fold, WINDOW_SIZE, args.seed)?;

    println!("clients: {}", dataset.client_num);
    println!(
        "train samples: {}, test samples: {}",
        dataset.train_data_num, dataset.test_data_num
    );
    println!("class_num = {}", dataset.class_num);

    let config = TrainingConfig {
        learning_rate: args.lr,
        momentum: args.momentum,
        epochs: args.epochs,
        batch_size: args.batch_size,
        seed: args.seed,
    };

    let model = SimpleMlp::new(config.seed);
    let mut trainer = CentralizedTrainer::new(model, config, args.checkpoint);
    let best = trainer.train(&mut dataset.train_global, &mut dataset.test_global)?;

    println!("best test accuracy: {:.2}%", best);
    Ok(())
}
