//! The serialized partition schema and its loader.
//!
//! One JSON document per (fold, split) holds a single synthetic user bucket
//! with all windows' features and labels plus a sample count. The loader
//! rebuilds per-user tensors and batched iterators, and concatenates all
//! users into one global train set and one global test set.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::info;
use ndarray::{concatenate, Array1, Array3, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::common::{NUM_CHANNELS, NUM_CLASSES};
use crate::error::{PipelineError, Result};

/// The single synthetic user bucket all merged windows are filed under.
pub const MERGED_USER: &str = "merged_user";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserData {
    pub x: Vec<Vec<Vec<f32>>>,
    pub y: Vec<i64>,
}

/// On-disk schema of one (fold, split) document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionFile {
    pub users: Vec<String>,
    pub user_data: HashMap<String, UserData>,
    pub num_samples: HashMap<String, usize>,
}

impl PartitionFile {
    /// Builds the single-user document from a windows array and label
    /// vector. The arrays must agree on sample count and carry the fixed
    /// window dimensions.
    pub fn from_arrays(x: &Array3<f32>, y: &Array1<i64>) -> Result<Self> {
        let shape = x.shape();
        if shape[0] != y.len() || shape[2] != NUM_CHANNELS {
            return Err(PipelineError::ShapeMismatch {
                stage: "partition serialization",
                expected: format!("({}, _, {})", y.len(), NUM_CHANNELS),
                actual: format!("{:?}", shape),
            });
        }

        let samples: Vec<Vec<Vec<f32>>> = x
            .outer_iter()
            .map(|window| window.outer_iter().map(|row| row.to_vec()).collect())
            .collect();

        let mut user_data = HashMap::new();
        user_data.insert(
            MERGED_USER.to_string(),
            UserData {
                x: samples,
                y: y.to_vec(),
            },
        );
        let mut num_samples = HashMap::new();
        num_samples.insert(MERGED_USER.to_string(), y.len());

        Ok(Self {
            users: vec![MERGED_USER.to_string()],
            user_data,
            num_samples,
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Reads a partition document. A missing file is fatal: loading must
    /// never fall back to an empty dataset.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::MissingPartition(path.to_path_buf()));
        }
        let file = File::open(path)?;
        let partition = serde_json::from_reader(BufReader::new(file))?;
        Ok(partition)
    }

    /// Rebuilds one user's tensors, validating every sample against the
    /// expected window dimensions.
    fn user_arrays(&self, user: &str, window_size: usize) -> Result<(Array3<f32>, Array1<i64>)> {
        let data = self.user_data.get(user).ok_or_else(|| {
            PipelineError::ShapeMismatch {
                stage: "partition load",
                expected: format!("user bucket '{}'", user),
                actual: "absent".to_string(),
            }
        })?;

        let num = data.x.len();
        let mut flat = Vec::with_capacity(num * window_size * NUM_CHANNELS);
        for window in &data.x {
            if window.len() != window_size || window.iter().any(|row| row.len() != NUM_CHANNELS) {
                return Err(PipelineError::ShapeMismatch {
                    stage: "partition load",
                    expected: format!("({}, {})", window_size, NUM_CHANNELS),
                    actual: format!("({}, ..)", window.len()),
                });
            }
            for row in window {
                flat.extend_from_slice(row);
            }
        }

        if data.y.len() != num {
            return Err(PipelineError::ShapeMismatch {
                stage: "partition load",
                expected: format!("{} labels", num),
                actual: format!("{}", data.y.len()),
            });
        }

        let x = Array3::from_shape_vec((num, window_size, NUM_CHANNELS), flat)?;
        Ok((x, Array1::from_vec(data.y.clone())))
    }
}

/// Mini-batch iterator over one tensor dataset. Train loaders reshuffle
/// every epoch with their own seeded RNG; test loaders keep file order.
/// The final partial batch is kept.
#[derive(Debug, Clone)]
pub struct DataLoader {
    x: Array3<f32>,
    y: Array1<i64>,
    batch_size: usize,
    shuffle: bool,
    rng: StdRng,
}

impl DataLoader {
    pub fn new(x: Array3<f32>, y: Array1<i64>, batch_size: usize, shuffle: bool, seed: u64) -> Self {
        Self {
            x,
            y,
            batch_size,
            shuffle,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Number of samples in the dataset.
    pub fn num_samples(&self) -> usize {
        self.y.len()
    }

    pub fn num_batches(&self) -> usize {
        (self.num_samples() + self.batch_size - 1) / self.batch_size
    }

    /// One epoch's batches.
    pub fn epoch_batches(&mut self) -> Vec<(Array3<f32>, Array1<i64>)> {
        let mut order: Vec<usize> = (0..self.num_samples()).collect();
        if self.shuffle {
            order.shuffle(&mut self.rng);
        }

        order
            .chunks(self.batch_size)
            .map(|chunk| (self.x.select(Axis(0), chunk), self.y.select(Axis(0), chunk)))
            .collect()
    }
}

/// Everything the trainer needs for one fold.
#[derive(Debug)]
pub struct PartitionDataset {
    pub client_num: usize,
    pub train_data_num: usize,
    pub test_data_num: usize,
    pub train_global: DataLoader,
    pub test_global: DataLoader,
    /// Per-client training sample counts, keyed by client position.
    pub local_sample_counts: HashMap<usize, usize>,
    pub train_locals: HashMap<usize, DataLoader>,
    pub test_locals: HashMap<usize, DataLoader>,
    pub class_num: usize,
}

/// Loads both documents of the requested fold from
/// `<data_dir>/train/fold_<k>_train.json` and `<data_dir>/test/fold_<k>_test.json`.
pub fn load_partition_data(
    data_dir: &Path,
    batch_size: usize,
    fold_idx: usize,
    window_size: usize,
    seed: u64,
) -> Result<PartitionDataset> {
    let train_path = data_dir.join("train").join(format!("fold_{}_train.json", fold_idx));
    let test_path = data_dir.join("test").join(format!("fold_{}_test.json", fold_idx));

    let train_file = PartitionFile::read(&train_path)?;
    let test_file = PartitionFile::read(&test_path)?;

    let client_num = train_file.users.len();

    let mut train_locals = HashMap::new();
    let mut test_locals = HashMap::new();
    let mut local_sample_counts = HashMap::new();
    let mut train_parts: Vec<(Array3<f32>, Array1<i64>)> = Vec::new();
    let mut test_parts: Vec<(Array3<f32>, Array1<i64>)> = Vec::new();

    for (i, user) in train_file.users.iter().enumerate() {
        let (x, y) = train_file.user_arrays(user, window_size)?;
        local_sample_counts.insert(i, y.len());
        train_locals.insert(
            i,
            DataLoader::new(x.clone(), y.clone(), batch_size, true, seed.wrapping_add(i as u64)),
        );
        train_parts.push((x, y));
    }

    for (i, user) in test_file.users.iter().enumerate() {
        let (x, y) = test_file.user_arrays(user, window_size)?;
        test_locals.insert(i, DataLoader::new(x.clone(), y.clone(), batch_size, false, 0));
        test_parts.push((x, y));
    }

    let (full_x_train, full_y_train) = concat_parts(&train_parts, window_size)?;
    let (full_x_test, full_y_test) = concat_parts(&test_parts, window_size)?;

    let train_data_num = full_y_train.len();
    let test_data_num = full_y_test.len();
    info!(
        "fold {}: {} clients, {} train / {} test samples",
        fold_idx, client_num, train_data_num, test_data_num
    );

    Ok(PartitionDataset {
        client_num,
        train_data_num,
        test_data_num,
        train_global: DataLoader::new(full_x_train, full_y_train, batch_size, true, seed),
        test_global: DataLoader::new(full_x_test, full_y_test, batch_size, false, 0),
        local_sample_counts,
        train_locals,
        test_locals,
        class_num: NUM_CLASSES,
    })
}

fn concat_parts(
    parts: &[(Array3<f32>, Array1<i64>)],
    window_size: usize,
) -> Result<(Array3<f32>, Array1<i64>)> {
    if parts.is_empty() {
        let x = Array3::from_shape_vec((0, window_size, NUM_CHANNELS), Vec::new())?;
        return Ok((x, Array1::from_vec(Vec::new())));
    }

    let xs: Vec<_> = parts.iter().map(|(x, _)| x.view()).collect();
    let ys: Vec<_> = parts.iter().map(|(_, y)| y.view()).collect();
    let x = concatenate(Axis(0), &xs)?;
    let y = concatenate(Axis(0), &ys)?;
    Ok((x, y))
}
