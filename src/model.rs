//! The feed-forward classifier and its numeric helpers.

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::common::{INPUT_DIM, NUM_CLASSES};

pub const HIDDEN_NODES: usize = 40;

/// Flat, serializable snapshot of a model's trainable parameters, one
/// entry per layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParameters {
    pub weights: Vec<Vec<f32>>,
    pub biases: Vec<Vec<f32>>,
    pub weight_shapes: Vec<Vec<i32>>,
    pub bias_shapes: Vec<Vec<i32>>,
}

pub trait Model: Sized {
    fn forward(&self, xs: &Array2<f32>) -> anyhow::Result<Array2<f32>>;
    fn set_parameters(&mut self, params: &ModelParameters) -> anyhow::Result<()>;
    fn get_parameters(&self) -> anyhow::Result<ModelParameters>;
}

/// Per-parameter gradients of one backward pass, already averaged over the
/// batch.
#[derive(Debug, Clone)]
pub struct Gradients {
    pub w1: Array2<f32>,
    pub b1: Array1<f32>,
    pub w2: Array2<f32>,
    pub b2: Array1<f32>,
}

/// Two-layer MLP: 90 inputs, 40 hidden units with ReLU, 6 logits.
#[derive(Debug, Clone)]
pub struct SimpleMlp {
    pub(crate) w1: Array2<f32>, // Shape: [HIDDEN_NODES, INPUT_DIM]
    pub(crate) b1: Array1<f32>, // Shape: [HIDDEN_NODES]
    pub(crate) w2: Array2<f32>, // Shape: [NUM_CLASSES, HIDDEN_NODES]
    pub(crate) b2: Array1<f32>, // Shape: [NUM_CLASSES]
}

impl SimpleMlp {
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        // Uniform weights in [-0.9, 0.9], biases start at zero
        let mut uniform = |_: (usize, usize)| rng.gen::<f32>() * 1.8 - 0.9;
        let w1 = Array2::from_shape_fn((HIDDEN_NODES, INPUT_DIM), &mut uniform);
        let w2 = Array2::from_shape_fn((NUM_CLASSES, HIDDEN_NODES), &mut uniform);

        Self {
            w1,
            b1: Array1::zeros(HIDDEN_NODES),
            w2,
            b2: Array1::zeros(NUM_CLASSES),
        }
    }

    /// Forward pass plus the mean loss and parameter gradients for one
    /// batch. `xs` has shape [batch, INPUT_DIM].
    pub fn loss_and_gradients(
        &self,
        xs: &Array2<f32>,
        ys: &Array1<i64>,
    ) -> anyhow::Result<(f32, Gradients)> {
        let batch_size = xs.shape()[0] as f32;

        let hidden_pre = xs.dot(&self.w1.t()) + &self.b1;
        let hidden = hidden_pre.mapv(|v| v.max(0.0));
        let logits = hidden.dot(&self.w2.t()) + &self.b2;

        let probs = softmax(&logits)?;
        let loss = cross_entropy_loss(&probs, ys)?;

        // Backward pass
        let grad_logits = softmax_cross_entropy_gradient(&probs, ys)?;
        let grad_w2 = grad_logits.t().dot(&hidden) / batch_size;
        let grad_b2 = grad_logits.sum_axis(Axis(0)) / batch_size;

        let grad_hidden = grad_logits.dot(&self.w2);
        let relu_mask = hidden_pre.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
        let grad_hidden_pre = grad_hidden * &relu_mask;
        let grad_w1 = grad_hidden_pre.t().dot(xs) / batch_size;
        let grad_b1 = grad_hidden_pre.sum_axis(Axis(0)) / batch_size;

        Ok((
            loss,
            Gradients {
                w1: grad_w1,
                b1: grad_b1,
                w2: grad_w2,
                b2: grad_b2,
            },
        ))
    }
}

impl Model for SimpleMlp {
    fn forward(&self, xs: &Array2<f32>) -> anyhow::Result<Array2<f32>> {
        // xs shape: [batch_size, INPUT_DIM]
        // result shape: [batch_size, NUM_CLASSES]
        let hidden = (xs.dot(&self.w1.t()) + &self.b1).mapv(|v| v.max(0.0));
        let logits = hidden.dot(&self.w2.t()) + &self.b2;
        Ok(logits)
    }

    fn set_parameters(&mut self, params: &ModelParameters) -> anyhow::Result<()> {
        if params.weights.len() != 2 || params.biases.len() != 2 {
            return Err(anyhow::anyhow!("expected parameters for two layers"));
        }
        if params.weights[0].len() != HIDDEN_NODES * INPUT_DIM
            || params.weights[1].len() != NUM_CLASSES * HIDDEN_NODES
        {
            return Err(anyhow::anyhow!("invalid weight dimensions"));
        }
        if params.biases[0].len() != HIDDEN_NODES || params.biases[1].len() != NUM_CLASSES {
            return Err(anyhow::anyhow!("invalid bias dimensions"));
        }

        self.w1 = Array2::from_shape_vec((HIDDEN_NODES, INPUT_DIM), params.weights[0].clone())?;
        self.b1 = Array1::from_vec(params.biases[0].clone());
        self.w2 = Array2::from_shape_vec((NUM_CLASSES, HIDDEN_NODES), params.weights[1].clone())?;
        self.b2 = Array1::from_vec(params.biases[1].clone());
        Ok(())
    }

    fn get_parameters(&self) -> anyhow::Result<ModelParameters> {
        fn flat(w: &Array2<f32>) -> Vec<f32> {
            if w.is_standard_layout() {
                w.as_slice().unwrap().to_vec()
            } else {
                w.iter().cloned().collect()
            }
        }

        Ok(ModelParameters {
            weights: vec![flat(&self.w1), flat(&self.w2)],
            biases: vec![self.b1.to_vec(), self.b2.to_vec()],
            weight_shapes: vec![
                vec![HIDDEN_NODES as i32, INPUT_DIM as i32],
                vec![NUM_CLASSES as i32, HIDDEN_NODES as i32],
            ],
            bias_shapes: vec![vec![HIDDEN_NODES as i32], vec![NUM_CLASSES as i32]],
        })
    }
}

// Neural network helper functions
pub fn softmax(logits: &Array2<f32>) -> anyhow::Result<Array2<f32>> {
    let mut result = logits.clone();

    for mut row in result.rows_mut() {
        let max_val = row.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
        row.mapv_inplace(|x| (x - max_val).exp());
        let sum = row.sum();
        row.mapv_inplace(|x| x / sum);
    }

    Ok(result)
}

pub fn cross_entropy_loss(softmax_probs: &Array2<f32>, labels: &Array1<i64>) -> anyhow::Result<f32> {
    let batch_size = softmax_probs.shape()[0];
    let mut loss = 0.0;

    for (i, &label) in labels.iter().enumerate() {
        let prob = softmax_probs[[i, label as usize]];
        loss -= prob.max(1e-15).ln(); // Add small epsilon to prevent log(0)
    }

    Ok(loss / batch_size as f32)
}

pub fn softmax_cross_entropy_gradient(
    softmax_probs: &Array2<f32>,
    labels: &Array1<i64>,
) -> anyhow::Result<Array2<f32>> {
    let mut grad = softmax_probs.clone();

    for (i, &label) in labels.iter().enumerate() {
        grad[[i, label as usize]] -= 1.0;
    }

    Ok(grad)
}

/// Number of rows whose argmax logit matches the label.
pub fn count_correct(logits: &Array2<f32>, labels: &Array1<i64>) -> usize {
    let mut correct = 0;

    for (i, &true_label) in labels.iter().enumerate() {
        let predicted_label = logits
            .row(i)
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .unwrap()
            .0 as i64;

        if predicted_label == true_label {
            correct += 1;
        }
    }

    correct
}

pub fn compute_accuracy(logits: &Array2<f32>, labels: &Array1<i64>) -> anyhow::Result<f32> {
    let batch_size = logits.shape()[0];
    Ok(count_correct(logits, labels) as f32 / batch_size as f32)
}

/// Accuracy of a model over a full evaluation set.
pub fn calculate_accuracy<M: Model>(
    model: &M,
    xs: &Array2<f32>,
    labels: &Array1<i64>,
) -> anyhow::Result<f32> {
    let logits = model.forward(xs)?;
    compute_accuracy(&logits, labels)
}
