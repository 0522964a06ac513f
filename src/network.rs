use std::fs::File;
use std::path::Path;

use failure::ResultExt;
use ndarray::prelude::*;
use ndarray::{Dimension, Zip};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::*;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Activation {
    /// tanh-shaped activation with output in (-1, 1)
    SymmetricSigmoid,
    /// logistic activation with output in (0, 1)
    Sigmoid,
}

impl Activation {
    fn apply(self, x: f32) -> f32 {
        match self {
            Activation::SymmetricSigmoid => x.tanh(),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        }
    }

    /// Derivative expressed in terms of the activation output.
    fn derivative(self, output: f32) -> f32 {
        match self {
            Activation::SymmetricSigmoid => 1.0 - output * output,
            Activation::Sigmoid => output * (1.0 - output),
        }
    }
}

/// Network shape and stopping criterion. Shared between the whole-sentence
/// classifier and the boundary classifiers, which differ only in these
/// numbers.
#[derive(Debug, Clone, Copy)]
pub struct NetConfig {
    pub hidden_size: usize,
    pub hidden_activation: Activation,
    pub output_activation: Activation,
    /// An output counts as a "bit fail" when it differs from its target by
    /// more than this limit; training stops once no bit fails remain.
    pub bit_fail_limit: f32,
    pub max_epochs: usize,
    pub max_restarts: usize,
}

/// Step-size schedule for the sign-based weight updates.
const STEP_INITIAL: f32 = 0.1;
const STEP_INCREASE: f32 = 1.2;
const STEP_DECREASE: f32 = 0.5;
const STEP_MAX: f32 = 50.0;

#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub inputs: Vec<Vec<f32>>,
    pub targets: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NetworkModel {
    hidden_activation: Activation,
    output_activation: Activation,
    hidden_weights: Vec<Vec<f32>>,
    hidden_biases: Vec<f32>,
    output_weights: Vec<Vec<f32>>,
    output_biases: Vec<f32>,
}

/// Minimal dense feed-forward network with one hidden layer, trained with
/// batch resilient backpropagation.
#[derive(Debug, Clone)]
pub struct FeedForwardNet {
    hidden_activation: Activation,
    output_activation: Activation,
    // (hidden, inputs)
    hidden_weights: Array2<f32>,
    hidden_biases: Array1<f32>,
    // (outputs, hidden)
    output_weights: Array2<f32>,
    output_biases: Array1<f32>,
}

impl FeedForwardNet {
    fn random<R: Rng>(config: &NetConfig, num_inputs: usize, num_outputs: usize, rng: &mut R) -> Self {
        let mut init = |rows: usize, cols: usize| {
            Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-0.2..0.2f32))
        };
        let hidden_weights = init(config.hidden_size, num_inputs);
        let output_weights = init(num_outputs, config.hidden_size);
        Self {
            hidden_activation: config.hidden_activation,
            output_activation: config.output_activation,
            hidden_weights,
            hidden_biases: Array1::zeros(config.hidden_size),
            output_weights,
            output_biases: Array1::zeros(num_outputs),
        }
    }

    fn forward(&self, input: &Array1<f32>) -> (Array1<f32>, Array1<f32>) {
        let hidden = (self.hidden_weights.dot(input) + &self.hidden_biases)
            .mapv(|x| self.hidden_activation.apply(x));
        let output = (self.output_weights.dot(&hidden) + &self.output_biases)
            .mapv(|x| self.output_activation.apply(x));
        (hidden, output)
    }

    pub fn run(&self, input: &[f32]) -> Vec<f32> {
        let input = Array1::from(input.to_vec());
        self.forward(&input).1.to_vec()
    }

    /// Error gradients summed over the whole training set.
    fn batch_gradients(&self, data: &[(Array1<f32>, Array1<f32>)]) -> Gradients {
        let mut grads = Gradients {
            hidden_weights: Array2::zeros(self.hidden_weights.raw_dim()),
            hidden_biases: Array1::zeros(self.hidden_biases.raw_dim()),
            output_weights: Array2::zeros(self.output_weights.raw_dim()),
            output_biases: Array1::zeros(self.output_biases.raw_dim()),
        };
        for (input, target) in data {
            let (hidden, output) = self.forward(input);
            let output_delta: Array1<f32> = (&output - target)
                * output.mapv(|o| self.output_activation.derivative(o));
            let hidden_delta: Array1<f32> = self.output_weights.t().dot(&output_delta)
                * hidden.mapv(|h| self.hidden_activation.derivative(h));

            grads.output_weights += &output_delta
                .view()
                .insert_axis(Axis(1))
                .dot(&hidden.view().insert_axis(Axis(0)));
            grads.output_biases += &output_delta;
            grads.hidden_weights += &hidden_delta
                .view()
                .insert_axis(Axis(1))
                .dot(&input.view().insert_axis(Axis(0)));
            grads.hidden_biases += &hidden_delta;
        }
        grads
    }

    fn count_bit_fails(&self, data: &[(Array1<f32>, Array1<f32>)], limit: f32) -> usize {
        data.iter()
            .map(|(input, target)| {
                let (_, output) = self.forward(input);
                output
                    .iter()
                    .zip(target.iter())
                    .filter(|(o, t)| (*o - *t).abs() > limit)
                    .count()
            })
            .sum()
    }

    /// Trains a fresh network on the given set with batch resilient
    /// backpropagation: per-weight step sizes that grow while the gradient
    /// sign holds and shrink when it flips, independent of the gradient
    /// magnitude. Weight initialization is random, so training restarts
    /// from scratch until an attempt reaches zero bit fails; the last
    /// attempt is kept as a best effort otherwise.
    pub fn train(config: &NetConfig, training_set: &TrainingSet) -> Self {
        let num_inputs = training_set.inputs.first().map(|i| i.len()).unwrap_or(0);
        let num_outputs = training_set.targets.first().map(|o| o.len()).unwrap_or(1);
        let data: Vec<(Array1<f32>, Array1<f32>)> = training_set
            .inputs
            .iter()
            .zip(training_set.targets.iter())
            .map(|(input, target)| {
                (
                    Array1::from(input.clone()),
                    Array1::from(target.clone()),
                )
            })
            .collect();

        let mut rng = rand::thread_rng();
        let mut net = Self::random(config, num_inputs, num_outputs, &mut rng);
        for _ in 0..config.max_restarts {
            net = Self::random(config, num_inputs, num_outputs, &mut rng);
            let mut rprop = RpropState::like(&net);
            for _ in 0..config.max_epochs {
                let grads = net.batch_gradients(&data);
                rprop.apply(&mut net, &grads);
                if net.count_bit_fails(&data, config.bit_fail_limit) == 0 {
                    break;
                }
            }
            if net.count_bit_fails(&data, config.bit_fail_limit) == 0 {
                break;
            }
        }
        net
    }

    pub fn save(&self, prefix: &str) -> Result<()> {
        let model = NetworkModel {
            hidden_activation: self.hidden_activation,
            output_activation: self.output_activation,
            hidden_weights: self
                .hidden_weights
                .rows()
                .into_iter()
                .map(|row| row.to_vec())
                .collect(),
            hidden_biases: self.hidden_biases.to_vec(),
            output_weights: self
                .output_weights
                .rows()
                .into_iter()
                .map(|row| row.to_vec())
                .collect(),
            output_biases: self.output_biases.to_vec(),
        };
        let path = format!("{}.net", prefix);
        let file = File::create(&path)
            .with_context(|_| format!("Could not create network file '{}'", path))?;
        serde_json::to_writer(file, &model)
            .with_context(|_| "Could not serialize network")?;
        Ok(())
    }

    pub fn load(prefix: &str) -> Result<Self> {
        let path = format!("{}.net", prefix);
        if !Path::new(&path).is_file() {
            failure::bail!(IntentEngineError::ModelLoad(path));
        }
        let file = File::open(&path)
            .with_context(|_| format!("Could not open network file '{}'", path))?;
        let model: NetworkModel = serde_json::from_reader(file)
            .with_context(|_| format!("Invalid network file '{}'", path))?;

        let to_matrix = |rows: Vec<Vec<f32>>| -> Result<Array2<f32>> {
            let num_rows = rows.len();
            let num_cols = rows.first().map(|r| r.len()).unwrap_or(0);
            let flat: Vec<f32> = rows.into_iter().flatten().collect();
            Ok(Array2::from_shape_vec((num_rows, num_cols), flat)?)
        };

        Ok(Self {
            hidden_activation: model.hidden_activation,
            output_activation: model.output_activation,
            hidden_weights: to_matrix(model.hidden_weights)?,
            hidden_biases: Array1::from(model.hidden_biases),
            output_weights: to_matrix(model.output_weights)?,
            output_biases: Array1::from(model.output_biases),
        })
    }
}

struct Gradients {
    hidden_weights: Array2<f32>,
    hidden_biases: Array1<f32>,
    output_weights: Array2<f32>,
    output_biases: Array1<f32>,
}

struct LayerState<D: Dimension> {
    steps: Array<f32, D>,
    prev_grads: Array<f32, D>,
}

impl<D: Dimension> LayerState<D> {
    fn like(weights: &Array<f32, D>) -> Self {
        Self {
            steps: Array::from_elem(weights.raw_dim(), STEP_INITIAL),
            prev_grads: Array::zeros(weights.raw_dim()),
        }
    }

    /// A weight moves by its own step size in the direction opposing the
    /// gradient; a sign flip halves the step and skips the update for that
    /// weight this epoch.
    fn apply(&mut self, weights: &mut Array<f32, D>, grads: &Array<f32, D>) {
        Zip::from(weights.view_mut())
            .and(self.steps.view_mut())
            .and(self.prev_grads.view_mut())
            .and(grads.view())
            .for_each(|weight, step, prev_grad, &grad| {
                if *prev_grad * grad < 0.0 {
                    *step *= STEP_DECREASE;
                    *prev_grad = 0.0;
                } else {
                    if *prev_grad * grad > 0.0 {
                        *step = (*step * STEP_INCREASE).min(STEP_MAX);
                    }
                    if grad != 0.0 {
                        *weight -= grad.signum() * *step;
                    }
                    *prev_grad = grad;
                }
            });
    }
}

struct RpropState {
    hidden_weights: LayerState<Ix2>,
    hidden_biases: LayerState<Ix1>,
    output_weights: LayerState<Ix2>,
    output_biases: LayerState<Ix1>,
}

impl RpropState {
    fn like(net: &FeedForwardNet) -> Self {
        Self {
            hidden_weights: LayerState::like(&net.hidden_weights),
            hidden_biases: LayerState::like(&net.hidden_biases),
            output_weights: LayerState::like(&net.output_weights),
            output_biases: LayerState::like(&net.output_biases),
        }
    }

    fn apply(&mut self, net: &mut FeedForwardNet, grads: &Gradients) {
        self.hidden_weights
            .apply(&mut net.hidden_weights, &grads.hidden_weights);
        self.hidden_biases
            .apply(&mut net.hidden_biases, &grads.hidden_biases);
        self.output_weights
            .apply(&mut net.output_weights, &grads.output_weights);
        self.output_biases
            .apply(&mut net.output_biases, &grads.output_biases);
    }
}
