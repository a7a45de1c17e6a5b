use rand::Rng;

use super::Dataset;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
  ReLU,
  Identity,
}

impl Activation {
  fn apply(self, x: f32) -> f32 {
    match self {
      Activation::ReLU => x.max(0.0),
      Activation::Identity => x,
    }
  }

  /// Derivative w.r.t. the pre-activation value.
  fn derivative(self, pre: f32) -> f32 {
    match self {
      Activation::ReLU => {
        if pre > 0.0 {
          1.0
        } else {
          0.0
        }
      }
      Activation::Identity => 1.0,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerSpec {
  pub units: usize,
  pub activation: Activation,
}

/// Architecture description; the input width is bound at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
  pub input_width: usize,
  pub layers: Vec<LayerSpec>,
}

impl ModelSpec {
  /// 16 ReLU -> 8 ReLU -> 1 linear.
  pub fn regressor(input_width: usize) -> Self {
    Self {
      input_width,
      layers: vec![
        LayerSpec {
          units: 16,
          activation: Activation::ReLU,
        },
        LayerSpec {
          units: 8,
          activation: Activation::ReLU,
        },
        LayerSpec {
          units: 1,
          activation: Activation::Identity,
        },
      ],
    }
  }

  pub fn output_width(&self) -> usize {
    self.layers.last().map(|l| l.units).unwrap_or(self.input_width)
  }
}

/// Fully connected layer. `weights` is row-major `[outputs][inputs]`.
#[derive(Debug, Clone)]
pub struct Dense {
  pub inputs: usize,
  pub outputs: usize,
  pub weights: Vec<f32>,
  pub bias: Vec<f32>,
  pub activation: Activation,
}

impl Dense {
  /// Glorot-uniform weights, zero bias.
  pub fn initialize<R: Rng>(
    inputs: usize,
    outputs: usize,
    activation: Activation,
    rng: &mut R,
  ) -> Self {
    let limit = (6.0 / (inputs + outputs) as f32).sqrt();
    let weights = (0..inputs * outputs)
      .map(|_| rng.gen_range(-limit..limit))
      .collect();
    Self {
      inputs,
      outputs,
      weights,
      bias: vec![0.0; outputs],
      activation,
    }
  }

  fn forward(&self, x: &[f32], pre: &mut Vec<f32>, out: &mut Vec<f32>) {
    pre.clear();
    out.clear();
    for (row, b) in self.weights.chunks_exact(self.inputs).zip(&self.bias) {
      let z = row.iter().zip(x).map(|(w, v)| w * v).sum::<f32>() + b;
      pre.push(z);
      out.push(self.activation.apply(z));
    }
  }

  fn n_params(&self) -> usize {
    self.weights.len() + self.bias.len()
  }
}

/// Per-feature standardisation fitted on the training rows and applied in front of the first layer.
/// Constant columns are only centred.
#[derive(Debug, Clone, PartialEq)]
pub struct InputScaler {
  mean: Vec<f32>,
  scale: Vec<f32>,
}

impl InputScaler {
  pub fn fit(data: &Dataset) -> Self {
    let n = data.len() as f32;
    let width = data.width();
    let mut mean = vec![0.0f32; width];
    for row in data.rows() {
      for (m, v) in mean.iter_mut().zip(row) {
        *m += v / n;
      }
    }
    let mut var = vec![0.0f32; width];
    for row in data.rows() {
      for ((s, v), m) in var.iter_mut().zip(row).zip(&mean) {
        *s += (v - m) * (v - m) / n;
      }
    }
    let scale = var
      .into_iter()
      .map(|v| {
        let sd = v.sqrt();
        if sd > f32::EPSILON && sd.is_finite() {
          sd
        } else {
          1.0
        }
      })
      .collect();
    Self { mean, scale }
  }

  pub fn transform(&self, row: &[f32]) -> Vec<f32> {
    row
      .iter()
      .zip(self.mean.iter().zip(&self.scale))
      .map(|(v, (m, s))| (v - m) / s)
      .collect()
  }
}

/// Activations recorded during a forward pass, consumed by `Network::backward`.
#[derive(Debug, Default)]
pub struct Trace {
  /// `acts[0]` is the input, `acts[i + 1]` the output of layer `i`.
  acts: Vec<Vec<f32>>,
  pre: Vec<Vec<f32>>,
}

/// Parameter gradients laid out like the network's layers.
#[derive(Debug, Clone)]
pub struct Gradients {
  pub layers: Vec<(Vec<f32>, Vec<f32>)>,
}

impl Gradients {
  pub fn zero(&mut self) {
    for (w, b) in self.layers.iter_mut() {
      w.iter_mut().for_each(|g| *g = 0.0);
      b.iter_mut().for_each(|g| *g = 0.0);
    }
  }

  /// Flat view in the same order as `Network::params_mut`.
  pub fn slices(&self) -> impl Iterator<Item = &[f32]> {
    self
      .layers
      .iter()
      .flat_map(|(w, b)| [w.as_slice(), b.as_slice()])
  }
}

#[derive(Debug, Clone)]
pub struct Network {
  pub spec: ModelSpec,
  scaler: InputScaler,
  layers: Vec<Dense>,
}

impl Network {
  pub fn initialize<R: Rng>(spec: ModelSpec, scaler: InputScaler, rng: &mut R) -> Self {
    let mut inputs = spec.input_width;
    let mut layers = Vec::with_capacity(spec.layers.len());
    for layer in spec.layers.iter() {
      layers.push(Dense::initialize(inputs, layer.units, layer.activation, rng));
      inputs = layer.units;
    }
    Self {
      spec,
      scaler,
      layers,
    }
  }

  pub fn layers(&self) -> &[Dense] {
    &self.layers
  }

  pub fn scaler(&self) -> &InputScaler {
    &self.scaler
  }

  pub fn n_params(&self) -> usize {
    self.layers.iter().map(Dense::n_params).sum()
  }

  pub fn gradients(&self) -> Gradients {
    Gradients {
      layers: self
        .layers
        .iter()
        .map(|l| (vec![0.0; l.weights.len()], vec![0.0; l.bias.len()]))
        .collect(),
    }
  }

  /// Weight then bias buffer of every layer, front to back.
  pub fn params_mut(&mut self) -> impl Iterator<Item = &mut Vec<f32>> {
    self
      .layers
      .iter_mut()
      .flat_map(|l| [&mut l.weights, &mut l.bias])
  }

  pub fn is_finite(&self) -> bool {
    self
      .layers
      .iter()
      .all(|l| l.weights.iter().chain(&l.bias).all(|v| v.is_finite()))
  }

  /// Forward pass over an already scaled input, recording what backward needs.
  /// Returns the single output unit.
  pub fn forward_traced(&self, x: &[f32], trace: &mut Trace) -> f32 {
    let depth = self.layers.len();
    trace.acts.resize_with(depth + 1, Vec::new);
    trace.pre.resize_with(depth, Vec::new);
    trace.acts[0].clear();
    trace.acts[0].extend_from_slice(x);
    for (i, layer) in self.layers.iter().enumerate() {
      let (before, after) = trace.acts.split_at_mut(i + 1);
      layer.forward(&before[i], &mut trace.pre[i], &mut after[0]);
    }
    trace.acts[depth][0]
  }

  /// Accumulates into `grads` the gradient of a loss whose derivative w.r.t. the output is `d_output`.
  pub fn backward(&self, trace: &Trace, d_output: f32, grads: &mut Gradients) {
    let mut delta = vec![d_output];
    for (i, layer) in self.layers.iter().enumerate().rev() {
      for (d, pre) in delta.iter_mut().zip(&trace.pre[i]) {
        *d *= layer.activation.derivative(*pre);
      }
      let input = &trace.acts[i];
      let (gw, gb) = &mut grads.layers[i];
      for (o, d) in delta.iter().enumerate() {
        gb[o] += d;
        let row = &mut gw[o * layer.inputs..(o + 1) * layer.inputs];
        for (g, v) in row.iter_mut().zip(input) {
          *g += d * v;
        }
      }
      if i > 0 {
        let mut next = vec![0.0f32; layer.inputs];
        for (o, d) in delta.iter().enumerate() {
          let row = &layer.weights[o * layer.inputs..(o + 1) * layer.inputs];
          for (n, w) in next.iter_mut().zip(row) {
            *n += d * w;
          }
        }
        delta = next;
      }
    }
  }

  /// Prediction for a raw (unscaled) row.
  pub fn predict_row(&self, row: &[f32]) -> f32 {
    let mut x = self.scaler.transform(row);
    let mut pre = Vec::new();
    let mut out = Vec::new();
    for layer in self.layers.iter() {
      layer.forward(&x, &mut pre, &mut out);
      std::mem::swap(&mut x, &mut out);
    }
    x[0]
  }

  pub fn predict(&self, rows: &[Vec<f32>]) -> Vec<f32> {
    rows.iter().map(|row| self.predict_row(row)).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::{rngs::StdRng, SeedableRng};

  fn tiny_dataset() -> Dataset {
    Dataset::new(
      vec![vec![0.0, 1.0], vec![1.0, 3.0], vec![2.0, 5.0]],
      vec![0.0, 1.0, 2.0],
    )
    .unwrap()
  }

  fn network(seed: u64) -> Network {
    let data = tiny_dataset();
    let mut rng = StdRng::seed_from_u64(seed);
    Network::initialize(ModelSpec::regressor(2), InputScaler::fit(&data), &mut rng)
  }

  #[test]
  fn regressor_layout() {
    let spec = ModelSpec::regressor(5);
    let units: Vec<_> = spec.layers.iter().map(|l| l.units).collect();
    assert_eq!(units, vec![16, 8, 1]);
    assert_eq!(spec.layers[2].activation, Activation::Identity);
    assert_eq!(spec.output_width(), 1);

    let net = network(0);
    let shapes: Vec<_> = net.layers().iter().map(|l| (l.inputs, l.outputs)).collect();
    assert_eq!(shapes, vec![(2, 16), (16, 8), (8, 1)]);
    assert_eq!(net.n_params(), 2 * 16 + 16 + 16 * 8 + 8 + 8 + 1);
  }

  #[test]
  fn scaler_standardises_columns() {
    let scaler = InputScaler::fit(&tiny_dataset());
    let z = scaler.transform(&[1.0, 3.0]);
    assert!(z.iter().all(|v| v.abs() < 1e-6), "{z:?}");
    let z = scaler.transform(&[2.0, 5.0]);
    assert!((z[0] - 1.2247449).abs() < 1e-4, "{z:?}");
  }

  #[test]
  fn scaler_keeps_constant_columns_finite() {
    let data = Dataset::new(vec![vec![4.0], vec![4.0]], vec![0.0, 0.0]).unwrap();
    let scaler = InputScaler::fit(&data);
    assert_eq!(scaler.transform(&[4.0]), vec![0.0]);
    assert_eq!(scaler.transform(&[5.0]), vec![1.0]);
  }

  #[test]
  fn traced_forward_matches_predict() {
    let net = network(3);
    let data = tiny_dataset();
    let mut trace = Trace::default();
    for row in data.rows() {
      let scaled = net.scaler().transform(row);
      assert_eq!(net.forward_traced(&scaled, &mut trace), net.predict_row(row));
    }
  }

  // compares backward against central differences on 0.5 * (y_hat - y)^2
  #[test]
  fn backward_matches_finite_differences() {
    let mut net = network(11);
    let x = net.scaler().transform(&[2.0, 5.0]);
    let y = 0.7f32;
    let mut trace = Trace::default();
    let y_hat = net.forward_traced(&x, &mut trace);
    let mut grads = net.gradients();
    net.backward(&trace, y_hat - y, &mut grads);
    let analytic: Vec<Vec<f32>> = grads.slices().map(|s| s.to_vec()).collect();

    let eps = 1e-3f32;
    let mut numeric = Vec::new();
    let n_buffers = analytic.len();
    for b in 0..n_buffers {
      let len = analytic[b].len();
      let mut buf_grads = Vec::with_capacity(len);
      for k in 0..len {
        let loss_at = |net: &Network| {
          let mut t = Trace::default();
          let out = net.forward_traced(&x, &mut t);
          0.5 * (out - y) * (out - y)
        };
        let original = net.params_mut().nth(b).unwrap()[k];
        net.params_mut().nth(b).unwrap()[k] = original + eps;
        let plus = loss_at(&net);
        net.params_mut().nth(b).unwrap()[k] = original - eps;
        let minus = loss_at(&net);
        net.params_mut().nth(b).unwrap()[k] = original;
        buf_grads.push((plus - minus) / (2.0 * eps));
      }
      numeric.push(buf_grads);
    }

    for (a, n) in analytic.iter().flatten().zip(numeric.iter().flatten()) {
      assert!((a - n).abs() < 1e-2 + 1e-2 * a.abs(), "analytic {a} vs numeric {n}");
    }
  }

  #[test]
  fn gradients_zero_resets_accumulation() {
    let net = network(5);
    let mut grads = net.gradients();
    let mut trace = Trace::default();
    let x = net.scaler().transform(&[0.0, 1.0]);
    net.forward_traced(&x, &mut trace);
    net.backward(&trace, 1.0, &mut grads);
    assert!(grads.slices().flatten().any(|g| *g != 0.0));
    grads.zero();
    assert!(grads.slices().flatten().all(|g| *g == 0.0));
  }
}
