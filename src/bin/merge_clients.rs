use std::path::PathBuf;

use clap::Parser;
use log::info;

use wisdm_har::config::PipelineConfig;
use wisdm_har::merge::{merge_client_files, write_merged_csv};

#[derive(Parser)]
#[command(name = "merge-clients")]
#[command(about = "Merge raw per-client activity logs into one flat labeled CSV")]
struct Args {
    /// Directory holding `Client <i>.txt` files
    #[arg(long, default_value = "data/FL_clients_data")]
    clients_dir: PathBuf,

    #[arg(long, default_value = "9")]
    client_count: usize,

    /// Destination of the merged CSV
    #[arg(long, default_value = "data/FL_clients_data/all_activities_merged.csv")]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = PipelineConfig {
        clients_dir: args.clients_dir,
        client_count: args.client_count,
        merged_out: args.output,
        ..PipelineConfig::default()
    };

    let paths = config.client_files();
    info!("merging {} client files from '{}'", paths.len(), config.clients_dir.display());
    let records = merge_client_files(&paths)?;
    write_merged_csv(&records, &config.merged_out)?;

    println!(
        "merged {} records into '{}'",
        records.len(),
        config.merged_out.display()
    );
    Ok(())
}
