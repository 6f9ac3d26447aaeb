//! Network-level reasoner (NLR): owns the layer graph and runs DeepPoly-style
//! symbolic bound propagation ([`deep_poly`]) plus input-space simulation
//! ([`simulation`]) as an additional, cheaper precision source.

pub mod deep_poly;
pub mod simulation;

use crate::equation::Tightening;
use crate::{E, I};

/// The activation/combination kind of a [`Layer`]; determines which
/// propagation rule [`deep_poly::propagate`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Input,
    WeightedSum,
    Relu,
    AbsoluteValue,
    Sign,
    Max,
    LeakyRelu,
    Sigmoid,
    Round,
    Exponential,
    Quadratic,
    Bilinear,
}

/// A symbolic affine form over the input layer's variables:
/// `sum(coeffs[j] * x_j) + constant`.
#[derive(Debug, Clone)]
pub struct AffineForm {
    pub coeffs: Vec<E>,
    pub constant: E,
}

impl AffineForm {
    pub fn constant(value: E, num_inputs: I) -> Self {
        Self {
            coeffs: vec![0.0; num_inputs],
            constant: value,
        }
    }

    pub fn zero(num_inputs: I) -> Self {
        Self::constant(0.0, num_inputs)
    }

    /// Maximises (or, with `minimize = true`, minimises) this form over the
    /// input box `[lb, ub]`: each coefficient's sign picks which endpoint
    /// contributes.
    pub fn evaluate_over_box(&self, lb: &[E], ub: &[E], minimize: bool) -> E {
        let mut total = self.constant;
        for (j, &c) in self.coeffs.iter().enumerate() {
            let use_upper = if minimize { c < 0.0 } else { c > 0.0 };
            total += c * if use_upper { ub[j] } else { lb[j] };
        }
        total
    }

    pub fn scale(&self, factor: E) -> Self {
        Self {
            coeffs: self.coeffs.iter().map(|c| c * factor).collect(),
            constant: self.constant * factor,
        }
    }

    pub fn add(&self, other: &Self) -> Self {
        Self {
            coeffs: self
                .coeffs
                .iter()
                .zip(other.coeffs.iter())
                .map(|(a, b)| a + b)
                .collect(),
            constant: self.constant + other.constant,
        }
    }

    pub fn add_constant(&self, value: E) -> Self {
        Self {
            coeffs: self.coeffs.clone(),
            constant: self.constant + value,
        }
    }

    pub fn negate(&self) -> Self {
        self.scale(-1.0)
    }
}

/// One layer of the network. `WeightedSum` layers carry dense weights keyed
/// by predecessor layer id; other kinds carry, per neuron, an optional
/// "activation source" (the `(layer, neuron)` pair it activates).
#[derive(Debug, Clone)]
pub struct Layer {
    pub kind: LayerKind,
    pub size: I,
    pub predecessors: Vec<I>,
    /// Dense weight matrix (row-major, `size x predecessor.size`) keyed by
    /// predecessor layer id; only populated for `WeightedSum` layers.
    pub weights: std::collections::HashMap<I, Vec<Vec<E>>>,
    pub biases: Vec<E>,
    /// Per-neuron list of `(layer, neuron)` activation sources. Single-input
    /// kinds (ReLU, AbsoluteValue, Sign, LeakyReLU, Round, Sigmoid,
    /// Exponential, Quadratic) use a one-element window; `Bilinear` uses a
    /// two-element window `[x, y]`; `Max` uses the full pooling window.
    pub activation_windows: Vec<Vec<(I, I)>>,
    pub lb: Vec<E>,
    pub ub: Vec<E>,
    pub assignment: Vec<E>,
    pub symbolic_lb: Vec<AffineForm>,
    pub symbolic_ub: Vec<AffineForm>,
    pub tableau_variable: Vec<Option<I>>,
    /// Negative-side slope for `LeakyRelu` layers; unused by other kinds.
    pub leaky_alpha: E,
}

impl Layer {
    pub fn new(kind: LayerKind, size: I, predecessors: Vec<I>) -> Self {
        Self {
            kind,
            size,
            predecessors,
            weights: std::collections::HashMap::new(),
            biases: vec![0.0; size],
            activation_windows: vec![Vec::new(); size],
            lb: vec![E::NEG_INFINITY; size],
            ub: vec![E::INFINITY; size],
            assignment: vec![0.0; size],
            symbolic_lb: Vec::new(),
            symbolic_ub: Vec::new(),
            tableau_variable: vec![None; size],
            leaky_alpha: 0.01,
        }
    }

    pub fn set_weighted_sum(&mut self, predecessor: I, weights: Vec<Vec<E>>, biases: Vec<E>) {
        self.weights.insert(predecessor, weights);
        self.biases = biases;
    }

    pub fn set_activation_window(&mut self, neuron: I, window: Vec<(I, I)>) {
        self.activation_windows[neuron] = window;
    }

    pub fn set_leaky_alpha(&mut self, alpha: E) {
        self.leaky_alpha = alpha;
    }
}

/// A directed acyclic graph of [`Layer`]s, stored in topological order (so
/// propagation is a single forward pass over `layers`).
#[derive(Debug, Clone, Default)]
pub struct LayerGraph {
    pub layers: Vec<Layer>,
    pub input_layer: I,
}

impl LayerGraph {
    pub fn new(input_size: I) -> Self {
        Self {
            layers: vec![Layer::new(LayerKind::Input, input_size, Vec::new())],
            input_layer: 0,
        }
    }

    pub fn add_layer(&mut self, layer: Layer) -> I {
        self.layers.push(layer);
        self.layers.len() - 1
    }

    pub fn input_size(&self) -> I {
        self.layers[self.input_layer].size
    }

    /// Collects every tightening implied by the current per-neuron concrete
    /// bounds (computed by [`deep_poly::DeepPolyPropagator`]) as a flat list ready to
    /// flush into the bound manager, given a map from `(layer, neuron)` to
    /// tableau variable.
    pub fn collect_tightenings(&self) -> Vec<(I, I, E, E)> {
        let mut out = Vec::new();
        for layer in &self.layers {
            for neuron in 0..layer.size {
                if let Some(var) = layer.tableau_variable[neuron] {
                    out.push((var, neuron, layer.lb[neuron], layer.ub[neuron]));
                }
            }
        }
        out
    }

    pub fn tightenings_as_bound_updates(&self) -> Vec<Tightening> {
        self.collect_tightenings()
            .into_iter()
            .flat_map(|(var, _, lb, ub)| [Tightening::lb(var, lb), Tightening::ub(var, ub)])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affine_form_evaluate_picks_correct_endpoint_by_sign() {
        let form = AffineForm {
            coeffs: vec![2.0, -3.0],
            constant: 1.0,
        };
        let lb = [0.0, 0.0];
        let ub = [1.0, 1.0];
        // max: 2*1 + (-3)*0 + 1 = 3
        assert_eq!(form.evaluate_over_box(&lb, &ub, false), 3.0);
        // min: 2*0 + (-3)*1 + 1 = -2
        assert_eq!(form.evaluate_over_box(&lb, &ub, true), -2.0);
    }

    #[test]
    fn test_layer_graph_tracks_topological_order() {
        let mut graph = LayerGraph::new(2);
        let hidden = graph.add_layer(Layer::new(LayerKind::WeightedSum, 3, vec![0]));
        assert_eq!(hidden, 1);
        assert_eq!(graph.layers.len(), 2);
    }
}
