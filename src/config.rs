use std::path::PathBuf;

use crate::common::{WINDOW_SIZE, WINDOW_STRIDE};

/// Everything the data-preparation stages need, passed explicitly instead of
/// relying on hard-coded filenames or process-wide state.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding the per-client raw text files (`Client <i>.txt`).
    pub clients_dir: PathBuf,
    pub client_count: usize,
    /// Destination of the merged flat-record CSV.
    pub merged_out: PathBuf,
    /// The raw sensor table (`user,activity,timestamp,x,y,z;` rows).
    pub raw_file: PathBuf,
    /// Partition files are written under `<out_dir>/train` and `<out_dir>/test`.
    pub out_dir: PathBuf,
    pub fold_count: usize,
    pub window_size: usize,
    pub stride: usize,
    /// Seed for the stratified fold shuffle.
    pub seed: u64,
    /// When set, keep only the rows of users seen in the first `fraction`
    /// of the raw table.
    pub subset_fraction: Option<f32>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            clients_dir: PathBuf::from("data/FL_clients_data"),
            client_count: 9,
            merged_out: PathBuf::from("data/FL_clients_data/all_activities_merged.csv"),
            raw_file: PathBuf::from("data/WISDM_ar_v1.1_raw.txt"),
            out_dir: PathBuf::from("data"),
            fold_count: 5,
            window_size: WINDOW_SIZE,
            stride: WINDOW_STRIDE,
            seed: 42,
            subset_fraction: Some(0.12),
        }
    }
}

impl PipelineConfig {
    /// Paths of the expected per-client files, in client order.
    pub fn client_files(&self) -> Vec<PathBuf> {
        (1..=self.client_count)
            .map(|i| self.clients_dir.join(format!("Client {}.txt", i)))
            .collect()
    }
}

// Training configuration
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub learning_rate: f32,
    pub momentum: f32,
    pub epochs: usize,
    pub batch_size: usize,
    /// Seed for parameter initialization and epoch shuffling.
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            momentum: 0.9,
            epochs: 100,
            batch_size: 300,
            seed: 0,
        }
    }
}
