//! Stratified k-fold splitting, leakage-safe normalization, and partition
//! file generation.

use std::collections::{BTreeMap, HashSet};
use std::fs;

use log::info;
use ndarray::{s, Array1, Array3, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::common::NUM_CHANNELS;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::partition::PartitionFile;

const NORM_EPSILON: f32 = 1e-8;

/// One fold's disjoint train/test index sets, both sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Per-channel normalization statistics fitted on a fold's training windows.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizationStats {
    pub mean: [f32; NUM_CHANNELS],
    pub std: [f32; NUM_CHANNELS],
}

/// Partitions window indices into `k` stratified folds.
///
/// Each class's indices are shuffled with an RNG seeded from `seed`, then
/// dealt into `k` near-equal contiguous chunks (the first `n mod k` chunks
/// get one extra element); chunk `f` becomes fold `f`'s test set. Test sets
/// are therefore pairwise disjoint and collectively cover every index
/// exactly once, with each class's test share close to `1/k` per fold.
/// Deterministic for a fixed seed and input order.
pub fn stratified_folds(labels: &Array1<i64>, k: usize, seed: u64) -> Vec<FoldIndices> {
    let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (idx, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(idx);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut test_sets: Vec<Vec<usize>> = vec![Vec::new(); k];

    for (_, mut indices) in by_class {
        indices.shuffle(&mut rng);
        let base = indices.len() / k;
        let extra = indices.len() % k;

        let mut start = 0;
        for (fold, test_set) in test_sets.iter_mut().enumerate() {
            let take = base + usize::from(fold < extra);
            test_set.extend_from_slice(&indices[start..start + take]);
            start += take;
        }
    }

    test_sets
        .into_iter()
        .map(|mut test| {
            test.sort_unstable();
            let in_test: HashSet<usize> = test.iter().copied().collect();
            let train = (0..labels.len()).filter(|i| !in_test.contains(i)).collect();
            FoldIndices { train, test }
        })
        .collect()
}

/// Rows of `x` and `y` at the given indices, in index order.
pub fn gather(x: &Array3<f32>, y: &Array1<i64>, indices: &[usize]) -> (Array3<f32>, Array1<i64>) {
    (x.select(Axis(0), indices), y.select(Axis(0), indices))
}

/// Fits per-channel mean and population standard deviation across all
/// (sample, timestep) pairs of the training windows.
pub fn fit_stats(x_train: &Array3<f32>) -> NormalizationStats {
    let mut mean = [0.0f32; NUM_CHANNELS];
    let mut std = [0.0f32; NUM_CHANNELS];

    for channel in 0..NUM_CHANNELS {
        let values = x_train.slice(s![.., .., channel]);
        let n = values.len() as f32;
        let m = values.sum() / n;
        let var = values.mapv(|v| (v - m) * (v - m)).sum() / n;
        mean[channel] = m;
        std[channel] = var.sqrt();
    }

    NormalizationStats { mean, std }
}

/// Applies `(x - mean) / (std + epsilon)` per channel with the given stats.
/// Test windows must be transformed with stats fitted on the training
/// windows only.
pub fn apply_stats(x: &Array3<f32>, stats: &NormalizationStats) -> Array3<f32> {
    let mut out = x.clone();
    for channel in 0..NUM_CHANNELS {
        let mean = stats.mean[channel];
        let std = stats.std[channel];
        out.slice_mut(s![.., .., channel])
            .mapv_inplace(|v| (v - mean) / (std + NORM_EPSILON));
    }
    out
}

/// Splits the windows into stratified folds, normalizes each fold with its
/// own train-derived stats, and writes the partition files under
/// `<out_dir>/train` and `<out_dir>/test`. Returns the per-fold stats for
/// inspection.
pub fn generate_folds(
    x: &Array3<f32>,
    y: &Array1<i64>,
    config: &PipelineConfig,
) -> Result<Vec<NormalizationStats>> {
    let shape = x.shape();
    if shape[1] != config.window_size || shape[2] != NUM_CHANNELS {
        return Err(PipelineError::ShapeMismatch {
            stage: "generate_folds",
            expected: format!("(_, {}, {})", config.window_size, NUM_CHANNELS),
            actual: format!("{:?}", shape),
        });
    }

    let train_dir = config.out_dir.join("train");
    let test_dir = config.out_dir.join("test");
    fs::create_dir_all(&train_dir)?;
    fs::create_dir_all(&test_dir)?;

    let folds = stratified_folds(y, config.fold_count, config.seed);
    let mut all_stats = Vec::with_capacity(folds.len());

    for (fold_idx, fold) in folds.iter().enumerate() {
        let fold_num = fold_idx + 1;
        let (x_train, y_train) = gather(x, y, &fold.train);
        let (x_test, y_test) = gather(x, y, &fold.test);

        let stats = fit_stats(&x_train);
        let x_train = apply_stats(&x_train, &stats);
        let x_test = apply_stats(&x_test, &stats);

        info!(
            "fold {}/{}: {} train / {} test samples, mean {:?}, std {:?}",
            fold_num,
            config.fold_count,
            y_train.len(),
            y_test.len(),
            stats.mean,
            stats.std
        );

        let train_path = train_dir.join(format!("fold_{}_train.json", fold_num));
        let test_path = test_dir.join(format!("fold_{}_test.json", fold_num));
        PartitionFile::from_arrays(&x_train, &y_train)?.write(&train_path)?;
        PartitionFile::from_arrays(&x_test, &y_test)?.write(&test_path)?;

        all_stats.push(stats);
    }

    Ok(all_stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::WINDOW_SIZE;
    use ndarray::Array;

    fn labels(counts: &[(i64, usize)]) -> Array1<i64> {
        let mut v = Vec::new();
        for &(label, count) in counts {
            v.extend(std::iter::repeat(label).take(count));
        }
        Array1::from_vec(v)
    }

    #[test]
    fn test_sets_are_disjoint_and_exhaustive() {
        let y = labels(&[(0, 23), (1, 17), (2, 35)]);
        let folds = stratified_folds(&y, 5, 42);
        assert_eq!(folds.len(), 5);

        let mut seen = HashSet::new();
        for fold in &folds {
            for &i in &fold.test {
                assert!(seen.insert(i), "index {} appears in two test sets", i);
            }
        }
        assert_eq!(seen.len(), y.len());
    }

    #[test]
    fn train_is_complement_of_test() {
        let y = labels(&[(0, 10), (1, 10)]);
        for fold in stratified_folds(&y, 5, 42) {
            assert_eq!(fold.train.len() + fold.test.len(), y.len());
            let test: HashSet<usize> = fold.test.iter().copied().collect();
            assert!(fold.train.iter().all(|i| !test.contains(i)));
        }
    }

    #[test]
    fn folds_are_stratified() {
        let y = labels(&[(0, 50), (1, 100)]);
        for fold in stratified_folds(&y, 5, 42) {
            let class0 = fold.test.iter().filter(|&&i| y[i] == 0).count();
            let class1 = fold.test.iter().filter(|&&i| y[i] == 1).count();
            assert_eq!(class0, 10);
            assert_eq!(class1, 20);
        }
    }

    #[test]
    fn splitting_is_deterministic() {
        let y = labels(&[(0, 40), (1, 25), (2, 13)]);
        assert_eq!(stratified_folds(&y, 5, 42), stratified_folds(&y, 5, 42));
        assert_ne!(stratified_folds(&y, 5, 42), stratified_folds(&y, 5, 7));
    }

    #[test]
    fn uneven_classes_spread_the_remainder() {
        // 7 = 5*1 + 2: the first two folds get two test samples of the class.
        let y = labels(&[(0, 7)]);
        let folds = stratified_folds(&y, 5, 42);
        let sizes: Vec<usize> = folds.iter().map(|f| f.test.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1, 1, 1]);
    }

    #[test]
    fn normalized_train_has_zero_mean_unit_std() {
        let x = Array::linspace(0.0f32, 1.0, 4 * WINDOW_SIZE * NUM_CHANNELS)
            .into_shape((4, WINDOW_SIZE, NUM_CHANNELS))
            .unwrap();
        let stats = fit_stats(&x);
        let normalized = apply_stats(&x, &stats);

        let renorm = fit_stats(&normalized);
        for channel in 0..NUM_CHANNELS {
            assert!(renorm.mean[channel].abs() < 1e-5);
            assert!((renorm.std[channel] - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_split_keeps_train_stats() {
        let x_train = Array::from_shape_fn((3, WINDOW_SIZE, NUM_CHANNELS), |(i, t, c)| {
            (i + t + c) as f32 * 0.1
        });
        let x_test = Array::from_shape_fn((2, WINDOW_SIZE, NUM_CHANNELS), |(i, t, c)| {
            (i * t) as f32 - c as f32 + 100.0
        });

        let train_stats = fit_stats(&x_train);
        let test_own_stats = fit_stats(&x_test);
        // The stats actually applied to the test split are the train stats.
        assert_ne!(train_stats, test_own_stats);

        let normalized_test = apply_stats(&x_test, &train_stats);
        let renorm = fit_stats(&normalized_test);
        // Normalizing with foreign stats does not center the test split.
        assert!(renorm.mean.iter().any(|m| m.abs() > 0.1));
    }
}
