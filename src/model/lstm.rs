//! LSTM encoder with backpropagation through time.
//!
//! Per step, with gates packed in the order `i, f, g, o`:
//!
//! ```text
//! z = W·x_t + U·h_{t-1} + b
//! i = σ(z_i)   f = σ(z_f)   g = tanh(z_g)   o = σ(z_o)
//! c_t = f ⊙ c_{t-1} + i ⊙ g
//! h_t = o ⊙ tanh(c_t)
//! ```
//!
//! Layers stack: the hidden sequence of layer `l` is the input of layer `l+1`.
//! The encoder output is the final hidden state of the top layer.

use super::{Adam, SequenceEncoder};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

#[inline]
fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// One recurrent layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmLayer {
    input_size: usize,
    hidden_size: usize,
    /// Input weights `[4H × F]`
    w: Array2<f64>,
    /// Recurrent weights `[4H × H]`
    u: Array2<f64>,
    /// Gate biases `[4H]`
    b: Array1<f64>,
}

#[derive(Debug, Clone)]
struct StepCache {
    x: Array1<f64>,
    h_prev: Array1<f64>,
    c_prev: Array1<f64>,
    i: Array1<f64>,
    f: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    tanh_c: Array1<f64>,
}

/// Forward state of one layer over a window.
#[derive(Debug, Clone)]
pub struct LayerCache {
    steps: Vec<StepCache>,
}

/// Gradient accumulator of one layer.
#[derive(Debug, Clone)]
pub struct LayerGradients {
    dw: Array2<f64>,
    du: Array2<f64>,
    db: Array1<f64>,
}

impl LstmLayer {
    /// Create a layer with weights drawn from `U(-1/√H, 1/√H)` and forget-gate
    /// bias 1.
    pub fn new(input_size: usize, hidden_size: usize, rng: &mut StdRng) -> Self {
        let limit = (1.0 / hidden_size as f64).sqrt();
        let dist = Uniform::new_inclusive(-limit, limit);
        let w = Array2::from_shape_fn((4 * hidden_size, input_size), |_| dist.sample(rng));
        let u = Array2::from_shape_fn((4 * hidden_size, hidden_size), |_| dist.sample(rng));
        let mut b = Array1::zeros(4 * hidden_size);
        b.slice_mut(s![hidden_size..2 * hidden_size]).fill(1.0);

        Self {
            input_size,
            hidden_size,
            w,
            u,
            b,
        }
    }

    /// Features consumed per step.
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Hidden width.
    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn gates(
        &self,
        x: ArrayView1<'_, f64>,
        h_prev: &Array1<f64>,
    ) -> (Array1<f64>, Array1<f64>, Array1<f64>, Array1<f64>) {
        let h = self.hidden_size;
        let z = self.w.dot(&x) + self.u.dot(h_prev) + &self.b;
        let i = z.slice(s![0..h]).mapv(sigmoid);
        let f = z.slice(s![h..2 * h]).mapv(sigmoid);
        let g = z.slice(s![2 * h..3 * h]).mapv(f64::tanh);
        let o = z.slice(s![3 * h..4 * h]).mapv(sigmoid);
        (i, f, g, o)
    }

    /// Hidden states for every step, `[T × H]`.
    pub fn forward(&self, input: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut out = Array2::zeros((input.nrows(), self.hidden_size));
        let mut h = Array1::zeros(self.hidden_size);
        let mut c = Array1::zeros(self.hidden_size);
        for (t, x) in input.outer_iter().enumerate() {
            let (i, f, g, o) = self.gates(x, &h);
            c = &f * &c + &i * &g;
            h = &o * &c.mapv(f64::tanh);
            out.row_mut(t).assign(&h);
        }
        out
    }

    fn forward_with_cache(&self, input: ArrayView2<'_, f64>) -> (Array2<f64>, LayerCache) {
        let mut out = Array2::zeros((input.nrows(), self.hidden_size));
        let mut steps = Vec::with_capacity(input.nrows());
        let mut h = Array1::zeros(self.hidden_size);
        let mut c = Array1::zeros(self.hidden_size);

        for (t, x) in input.outer_iter().enumerate() {
            let (i, f, g, o) = self.gates(x, &h);
            let c_next = &f * &c + &i * &g;
            let tanh_c = c_next.mapv(f64::tanh);
            let h_next = &o * &tanh_c;
            out.row_mut(t).assign(&h_next);

            steps.push(StepCache {
                x: x.to_owned(),
                h_prev: h,
                c_prev: c,
                i,
                f,
                g,
                o,
                tanh_c,
            });
            h = h_next;
            c = c_next;
        }
        (out, LayerCache { steps })
    }

    fn zero_gradients(&self) -> LayerGradients {
        LayerGradients {
            dw: Array2::zeros(self.w.raw_dim()),
            du: Array2::zeros(self.u.raw_dim()),
            db: Array1::zeros(self.b.raw_dim()),
        }
    }

    /// Backpropagate `dh_ext` (`[T × H]`, gradient arriving at each hidden
    /// state from above) and return the gradient w.r.t. the input `[T × F]`.
    fn backward(
        &self,
        cache: &LayerCache,
        dh_ext: &Array2<f64>,
        grads: &mut LayerGradients,
    ) -> Array2<f64> {
        let h = self.hidden_size;
        let mut dx = Array2::zeros((cache.steps.len(), self.input_size));
        let mut dh_next = Array1::<f64>::zeros(h);
        let mut dc_next = Array1::<f64>::zeros(h);
        let mut dz = Array1::<f64>::zeros(4 * h);

        for (t, step) in cache.steps.iter().enumerate().rev() {
            let dh = &dh_ext.row(t) + &dh_next;

            let d_o = &dh * &step.tanh_c * &step.o.mapv(|o| o * (1.0 - o));
            let dc = &dh * &step.o * &step.tanh_c.mapv(|tc| 1.0 - tc * tc) + &dc_next;
            let di = &dc * &step.g * &step.i.mapv(|i| i * (1.0 - i));
            let dg = &dc * &step.i * &step.g.mapv(|g| 1.0 - g * g);
            let df = &dc * &step.c_prev * &step.f.mapv(|f| f * (1.0 - f));

            dz.slice_mut(s![0..h]).assign(&di);
            dz.slice_mut(s![h..2 * h]).assign(&df);
            dz.slice_mut(s![2 * h..3 * h]).assign(&dg);
            dz.slice_mut(s![3 * h..4 * h]).assign(&d_o);

            let dz_col = dz.view().insert_axis(Axis(1));
            grads.dw += &dz_col.dot(&step.x.view().insert_axis(Axis(0)));
            grads.du += &dz_col.dot(&step.h_prev.view().insert_axis(Axis(0)));
            grads.db += &dz;

            dx.row_mut(t).assign(&self.w.t().dot(&dz));
            dh_next = self.u.t().dot(&dz);
            dc_next = &dc * &step.f;
        }
        dx
    }

    fn apply(&mut self, grads: &LayerGradients, scale: f64, optimizer: &mut Adam, slot: usize) -> usize {
        optimizer.update(slot, &mut self.w, &grads.dw, scale);
        optimizer.update(slot + 1, &mut self.u, &grads.du, scale);
        optimizer.update(slot + 2, &mut self.b, &grads.db, scale);
        slot + 3
    }

    fn parameter_count(&self) -> usize {
        self.w.len() + self.u.len() + self.b.len()
    }
}

/// Stacked LSTM returning the last hidden state of the top layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmEncoder {
    layers: Vec<LstmLayer>,
}

impl LstmEncoder {
    /// Create `depth` stacked layers of width `hidden_size`.
    ///
    /// `depth` and `hidden_size` of zero are raised to 1.
    pub fn new(input_size: usize, hidden_size: usize, depth: usize, rng: &mut StdRng) -> Self {
        let hidden_size = hidden_size.max(1);
        let layers = (0..depth.max(1))
            .map(|l| {
                let in_size = if l == 0 { input_size } else { hidden_size };
                LstmLayer::new(in_size, hidden_size, rng)
            })
            .collect();
        Self { layers }
    }

    /// Recurrent layers, bottom first.
    pub fn layers(&self) -> &[LstmLayer] {
        &self.layers
    }
}

impl SequenceEncoder for LstmEncoder {
    type Cache = Vec<LayerCache>;
    type Gradients = Vec<LayerGradients>;

    fn input_size(&self) -> usize {
        self.layers.first().map_or(0, LstmLayer::input_size)
    }

    fn output_size(&self) -> usize {
        self.layers.last().map_or(0, LstmLayer::hidden_size)
    }

    fn encode(&self, input: ArrayView2<'_, f64>) -> Array1<f64> {
        let mut seq = input.to_owned();
        for layer in &self.layers {
            seq = layer.forward(seq.view());
        }
        last_row(&seq)
    }

    fn encode_with_cache(&self, input: ArrayView2<'_, f64>) -> (Array1<f64>, Self::Cache) {
        let mut seq = input.to_owned();
        let mut caches = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let (out, cache) = layer.forward_with_cache(seq.view());
            caches.push(cache);
            seq = out;
        }
        (last_row(&seq), caches)
    }

    fn zero_gradients(&self) -> Self::Gradients {
        self.layers.iter().map(LstmLayer::zero_gradients).collect()
    }

    fn backward(
        &self,
        cache: &Self::Cache,
        grad_output: ArrayView1<'_, f64>,
        grads: &mut Self::Gradients,
    ) {
        let steps = cache.first().map_or(0, |c| c.steps.len());
        if steps == 0 {
            return;
        }
        let mut dh = Array2::zeros((steps, self.output_size()));
        dh.row_mut(steps - 1).assign(&grad_output);

        for ((layer, layer_cache), layer_grads) in self
            .layers
            .iter()
            .zip(cache)
            .zip(grads.iter_mut())
            .rev()
        {
            dh = layer.backward(layer_cache, &dh, layer_grads);
        }
    }

    fn apply_gradients(
        &mut self,
        grads: &Self::Gradients,
        scale: f64,
        optimizer: &mut Adam,
        first_slot: usize,
    ) -> usize {
        let mut slot = first_slot;
        for (layer, layer_grads) in self.layers.iter_mut().zip(grads) {
            slot = layer.apply(layer_grads, scale, optimizer, slot);
        }
        slot
    }

    fn parameter_count(&self) -> usize {
        self.layers.iter().map(LstmLayer::parameter_count).sum()
    }
}

fn last_row(seq: &Array2<f64>) -> Array1<f64> {
    match seq.nrows() {
        0 => Array1::zeros(seq.ncols()),
        n => seq.row(n - 1).to_owned(),
    }
}
