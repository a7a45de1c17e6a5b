use super::network::{Gradients, Network};

/// Adam with bias-corrected moment estimates.
#[derive(Debug, Clone)]
pub struct Adam {
  pub lr: f32,
  pub beta1: f32,
  pub beta2: f32,
  pub epsilon: f32,
  t: i32,
  m: Vec<Vec<f32>>,
  v: Vec<Vec<f32>>,
}

impl Adam {
  pub const LEARNING_RATE: f32 = 1e-2;

  pub fn new(lr: f32) -> Self {
    Adam {
      lr,
      beta1: 0.9,
      beta2: 0.999,
      epsilon: 1e-7,
      t: 0,
      m: Vec::new(),
      v: Vec::new(),
    }
  }

  /// Allocates moment buffers shaped like the network's parameters.
  pub fn attach(&mut self, network: &Network) {
    let shapes: Vec<usize> = network.gradients().slices().map(|s| s.len()).collect();
    self.m = shapes.iter().map(|&n| vec![0.0; n]).collect();
    self.v = shapes.iter().map(|&n| vec![0.0; n]).collect();
    self.t = 0;
  }

  pub fn steps(&self) -> i32 {
    self.t
  }

  pub fn step(&mut self, network: &mut Network, grads: &Gradients) {
    if self.m.is_empty() {
      self.attach(network);
    }
    self.t += 1;
    let bias1 = 1.0 - self.beta1.powi(self.t);
    let bias2 = 1.0 - self.beta2.powi(self.t);
    let params = network.params_mut();
    for (((p, g), m), v) in params
      .zip(grads.slices())
      .zip(self.m.iter_mut())
      .zip(self.v.iter_mut())
    {
      for i in 0..p.len() {
        m[i] = self.beta1 * m[i] + (1.0 - self.beta1) * g[i];
        v[i] = self.beta2 * v[i] + (1.0 - self.beta2) * g[i] * g[i];
        let m_hat = m[i] / bias1;
        let v_hat = v[i] / bias2;
        p[i] -= self.lr * m_hat / (v_hat.sqrt() + self.epsilon);
      }
    }
  }
}

impl Default for Adam {
  fn default() -> Self {
    Adam::new(Adam::LEARNING_RATE)
  }
}
