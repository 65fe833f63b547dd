//! Momentum-SGD optimizer and the centralized training loop.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use log::info;
use ndarray::{Array1, Array2, Array3};

use crate::common::INPUT_DIM;
use crate::config::TrainingConfig;
use crate::model::{count_correct, cross_entropy_loss, softmax, Gradients, Model, SimpleMlp};
use crate::partition::DataLoader;

/// SGD with momentum over the MLP's parameters.
pub struct SgdMomentum {
    learning_rate: f32,
    momentum: f32,
    velocity: Gradients,
}

impl SgdMomentum {
    pub fn new(model: &SimpleMlp, learning_rate: f32, momentum: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            velocity: Gradients {
                w1: Array2::zeros(model.w1.raw_dim()),
                b1: Array1::zeros(model.b1.raw_dim()),
                w2: Array2::zeros(model.w2.raw_dim()),
                b2: Array1::zeros(model.b2.raw_dim()),
            },
        }
    }

    /// Applies one update: `v = momentum * v + grad; p -= lr * v`.
    pub fn step(&mut self, model: &mut SimpleMlp, grads: &Gradients) {
        self.velocity.w1 = &self.velocity.w1 * self.momentum + &grads.w1;
        self.velocity.b1 = &self.velocity.b1 * self.momentum + &grads.b1;
        self.velocity.w2 = &self.velocity.w2 * self.momentum + &grads.w2;
        self.velocity.b2 = &self.velocity.b2 * self.momentum + &grads.b2;

        model.w1 = &model.w1 - &(&self.velocity.w1 * self.learning_rate);
        model.b1 = &model.b1 - &(&self.velocity.b1 * self.learning_rate);
        model.w2 = &model.w2 - &(&self.velocity.w2 * self.learning_rate);
        model.b2 = &model.b2 - &(&self.velocity.b2 * self.learning_rate);
    }

    /// Clears the accumulated velocity.
    pub fn reset(&mut self) {
        self.velocity.w1.fill(0.0);
        self.velocity.b1.fill(0.0);
        self.velocity.w2.fill(0.0);
        self.velocity.b2.fill(0.0);
    }
}

/// Epoch loop over the global train loader with per-epoch evaluation and a
/// best-test-accuracy checkpoint.
pub struct CentralizedTrainer {
    model: SimpleMlp,
    optimizer: SgdMomentum,
    config: TrainingConfig,
    checkpoint_path: PathBuf,
    best_test_acc: f32,
}

impl CentralizedTrainer {
    pub fn new(model: SimpleMlp, config: TrainingConfig, checkpoint_path: PathBuf) -> Self {
        let optimizer = SgdMomentum::new(&model, config.learning_rate, config.momentum);
        Self {
            model,
            optimizer,
            config,
            checkpoint_path,
            best_test_acc: 0.0,
        }
    }

    /// Trains for the configured number of epochs and returns the best test
    /// accuracy observed.
    pub fn train(
        &mut self,
        train_global: &mut DataLoader,
        test_global: &mut DataLoader,
    ) -> anyhow::Result<f32> {
        for epoch in 0..self.config.epochs {
            self.train_one_epoch(epoch, train_global)?;
            self.eval_and_log(epoch, train_global, test_global)?;
        }
        Ok(self.best_test_acc)
    }

    fn train_one_epoch(&mut self, epoch: usize, loader: &mut DataLoader) -> anyhow::Result<()> {
        let mut correct = 0usize;
        let mut total = 0usize;
        let mut running_loss = 0.0f32;
        let num_batches = loader.num_batches();

        for (batch_x, batch_y) in loader.epoch_batches() {
            let xs = flatten_batch(batch_x)?;
            let (loss, grads) = self.model.loss_and_gradients(&xs, &batch_y)?;
            self.optimizer.step(&mut self.model, &grads);

            running_loss += loss;
            let logits = self.model.forward(&xs)?;
            correct += count_correct(&logits, &batch_y);
            total += batch_y.len();
        }

        let accuracy = 100.0 * correct as f32 / total as f32;
        let avg_loss = running_loss / num_batches as f32;
        info!("[Epoch {}] Train Loss={:.4}, Accuracy={:.2}%", epoch, avg_loss, accuracy);
        Ok(())
    }

    fn eval_and_log(
        &mut self,
        epoch: usize,
        train_global: &mut DataLoader,
        test_global: &mut DataLoader,
    ) -> anyhow::Result<()> {
        let (train_loss, train_acc) = self.compute_metrics(train_global)?;
        let (test_loss, test_acc) = self.compute_metrics(test_global)?;

        info!("[Epoch {}] Train Accuracy={:.2}%, Loss={:.4}", epoch, train_acc, train_loss);
        info!("[Epoch {}] Test Accuracy={:.2}%, Loss={:.4}", epoch, test_acc, test_loss);

        if test_acc > self.best_test_acc {
            self.best_test_acc = test_acc;
            self.save_checkpoint()?;
            info!("New best model saved with Test Accuracy={:.2}%", test_acc);
        }
        Ok(())
    }

    /// Average loss and accuracy (percent) over a full loader pass.
    pub fn compute_metrics(&self, loader: &mut DataLoader) -> anyhow::Result<(f32, f32)> {
        let mut correct = 0usize;
        let mut total = 0usize;
        let mut loss_sum = 0.0f32;
        let num_batches = loader.num_batches();

        for (batch_x, batch_y) in loader.epoch_batches() {
            let xs = flatten_batch(batch_x)?;
            let logits = self.model.forward(&xs)?;
            let probs = softmax(&logits)?;
            loss_sum += cross_entropy_loss(&probs, &batch_y)?;

            correct += count_correct(&logits, &batch_y);
            total += batch_y.len();
        }

        Ok((loss_sum / num_batches as f32, 100.0 * correct as f32 / total as f32))
    }

    pub fn model(&self) -> &SimpleMlp {
        &self.model
    }

    pub fn best_test_accuracy(&self) -> f32 {
        self.best_test_acc
    }

    fn save_checkpoint(&self) -> anyhow::Result<()> {
        let params = self.model.get_parameters()?;
        let file = File::create(&self.checkpoint_path)?;
        serde_json::to_writer(BufWriter::new(file), &params)?;
        Ok(())
    }
}

/// Flattens a (batch, window, channels) batch into (batch, INPUT_DIM) model
/// input.
fn flatten_batch(batch: Array3<f32>) -> anyhow::Result<Array2<f32>> {
    let samples = batch.shape()[0];
    Ok(batch.into_shape((samples, INPUT_DIM))?)
}
