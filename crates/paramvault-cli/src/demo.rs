//! Train → save → rebuild → restore walkthrough on a toy classifier.

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{Array1, Array2, Axis};
use paramvault::prelude::*;
use paramvault::utils::abbreviate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const FEATURES: usize = 4;
const CLASSES: usize = 3;
const SAMPLES_PER_CLASS: usize = 64;
const LEARNING_RATE: f32 = 0.1;

/// Options for one demo run
pub struct DemoOptions {
    pub epochs: u64,
    pub template: String,
    pub seed: u64,
}

/// Linear softmax classifier: `softmax(x · W + b)`.
#[derive(Clone, Debug)]
pub struct SoftmaxClassifier {
    weight: Array2<f32>,
    bias: Array1<f32>,
}

impl SoftmaxClassifier {
    fn logits(&self, x: &Array2<f32>) -> Array2<f32> {
        x.dot(&self.weight) + &self.bias
    }

    fn probabilities(&self, x: &Array2<f32>) -> Array2<f32> {
        let mut logits = self.logits(x);
        for mut row in logits.rows_mut() {
            let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row /= sum;
        }
        logits
    }

    /// One full-batch gradient step on the cross-entropy loss. Returns the loss.
    fn train_step(&mut self, data: &Dataset, lr: f32) -> f32 {
        let n = data.inputs.nrows() as f32;
        let probs = self.probabilities(&data.inputs);

        let loss = data
            .labels
            .iter()
            .enumerate()
            .map(|(i, &label)| -probs[[i, label]].max(1e-7).ln())
            .sum::<f32>()
            / n;

        let mut grad = probs;
        for (i, &label) in data.labels.iter().enumerate() {
            grad[[i, label]] -= 1.0;
        }
        grad /= n;

        self.weight -= &(data.inputs.t().dot(&grad) * lr);
        self.bias -= &(grad.sum_axis(Axis(0)) * lr);
        loss
    }

    fn accuracy(&self, data: &Dataset) -> f64 {
        let logits = self.logits(&data.inputs);
        let correct = logits
            .rows()
            .into_iter()
            .zip(&data.labels)
            .filter(|(row, label)| argmax(row.iter().copied()) == **label)
            .count();
        correct as f64 / data.labels.len() as f64
    }
}

impl Checkpointable for SoftmaxClassifier {
    fn parameters(&self) -> ParameterMap {
        let mut params = ParameterMap::new();
        params.insert("linear.weight".into(), self.weight.clone().into_dyn());
        params.insert("linear.bias".into(), self.bias.clone().into_dyn());
        params
    }

    fn set_parameters(&mut self, mut params: ParameterMap) -> paramvault::Result<()> {
        let mut take = |key: &str| {
            params.remove(key).ok_or_else(|| StoreError::InvalidParameters {
                reason: format!("missing parameter '{key}'"),
            })
        };
        let weight = take("linear.weight")?;
        let bias = take("linear.bias")?;

        let shape_error = |e: ndarray::ShapeError| StoreError::InvalidParameters {
            reason: e.to_string(),
        };
        self.weight = weight.into_dimensionality().map_err(shape_error)?;
        self.bias = bias.into_dimensionality().map_err(shape_error)?;
        Ok(())
    }
}

/// Build an untrained classifier with small random weights.
pub fn build_model(seed: u64) -> SoftmaxClassifier {
    let mut rng = StdRng::seed_from_u64(seed);
    SoftmaxClassifier {
        weight: Array2::from_shape_fn((FEATURES, CLASSES), |_| rng.gen_range(-0.1..0.1)),
        bias: Array1::zeros(CLASSES),
    }
}

struct Dataset {
    inputs: Array2<f32>,
    labels: Vec<usize>,
}

/// Gaussian-ish blobs around one center per class. Class `c` is pushed
/// out along feature axis `c`.
fn synthetic_clusters(rng: &mut StdRng) -> Dataset {
    let centers = Array2::from_shape_fn((CLASSES, FEATURES), |(class, f)| {
        let offset = if class == f { 4.0 } else { 0.0 };
        offset + rng.gen_range(-1.0f32..1.0)
    });
    let total = CLASSES * SAMPLES_PER_CLASS;

    let mut inputs = Array2::zeros((total, FEATURES));
    let mut labels = Vec::with_capacity(total);
    for i in 0..total {
        let class = i % CLASSES;
        for f in 0..FEATURES {
            let noise: f32 = (0..3).map(|_| rng.gen_range(-0.5f32..0.5)).sum();
            inputs[[i, f]] = centers[[class, f]] + noise;
        }
        labels.push(class);
    }
    Dataset { inputs, labels }
}

fn argmax(values: impl Iterator<Item = f32>) -> usize {
    values
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, v)| {
            if v > best.1 {
                (i, v)
            } else {
                best
            }
        })
        .0
}

pub fn run(store: &mut CheckpointStore, options: &DemoOptions) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(options.seed);
    let data = synthetic_clusters(&mut rng);
    let mut model = build_model(options.seed.wrapping_add(1));

    let num_params: usize = model.parameters().values().map(|p| p.len()).sum();
    tracing::info!(
        params = %abbreviate(num_params as u64),
        samples = data.labels.len(),
        epochs = options.epochs,
        "Starting demo training"
    );

    let pb = ProgressBar::new(options.epochs);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("invalid progress template")?
            .progress_chars("#>-"),
    );

    let samples = data.labels.len() as u64;
    let mut saved = 0usize;
    let mut last_ctx = StepContext::default();
    let mut last_saved = None;
    for epoch in 1..=options.epochs {
        let loss = model.train_step(&data, LEARNING_RATE);
        let accuracy = model.accuracy(&data);

        let ctx = StepContext::new(epoch, epoch * samples).with_metric(accuracy);
        if let Some(snapshot) = store.maybe_save(&model.parameters(), &options.template, &ctx)? {
            pb.println(format!("Saved {} (acc {:.3})", snapshot.name, accuracy));
            saved += 1;
            last_saved = Some(epoch);
        }
        last_ctx = ctx;

        pb.set_position(epoch);
        pb.set_message(format!("loss: {:.4} acc: {:.3}", loss, accuracy));
    }
    pb.finish_with_message("Training complete");

    // Final weights are always checkpointed, even off-interval
    if options.epochs > 0 && last_saved != Some(options.epochs) {
        let snapshot = store.save_model(&model, &options.template, &last_ctx)?;
        println!("Saved final {}", snapshot.name);
        saved += 1;
    }

    let trained_accuracy = model.accuracy(&data);
    println!("Trained accuracy:   {:.3} ({} snapshots saved)", trained_accuracy, saved);

    let mut fresh = build_model(options.seed.wrapping_add(2));
    println!("Untrained accuracy: {:.3}", fresh.accuracy(&data));

    let snapshot = store
        .restore(SnapshotRef::Latest, &mut fresh)
        .context("failed to restore latest snapshot")?;
    let restored_accuracy = fresh.accuracy(&data);
    println!(
        "Restored accuracy:  {:.3} (from {}, epoch {})",
        restored_accuracy, snapshot.name, snapshot.epoch
    );

    if (restored_accuracy - trained_accuracy).abs() > 1e-9 {
        bail!(
            "restored accuracy {:.3} does not match trained accuracy {:.3}",
            restored_accuracy,
            trained_accuracy
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_improves_accuracy() {
        let mut rng = StdRng::seed_from_u64(7);
        let data = synthetic_clusters(&mut rng);
        let mut model = build_model(8);

        for _ in 0..100 {
            model.train_step(&data, LEARNING_RATE);
        }
        assert!(model.accuracy(&data) > 0.9);
    }

    #[test]
    fn test_parameters_round_trip() {
        let source = build_model(1);
        let mut target = build_model(2);
        target.set_parameters(source.parameters()).unwrap();
        assert_eq!(target.weight, source.weight);
        assert_eq!(target.bias, source.bias);
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax([0.1, 0.7, 0.2].into_iter()), 1);
        assert_eq!(argmax([3.0].into_iter()), 0);
    }
}
