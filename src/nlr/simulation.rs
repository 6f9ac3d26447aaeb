//! Input-space simulation: a cheap, unsound-by-design complement to
//! [`super::deep_poly`]. Uniformly samples concrete points from the input
//! box, propagates them through the layer graph exactly, and reports the
//! observed per-neuron min/max.
//!
//! Observed extrema are real, reachable values, so they are never used to
//! *tighten* a bound — a handful of samples cannot prove no input attains a
//! more extreme value. They instead feed the search core's branching
//! heuristics (as a signal for which neuron's activity is least certain) and
//! provide ready-made concrete witnesses a `Sat` run can check first.

use macros::{explicit_options, use_option};

use crate::nlr::{Layer, LayerGraph, LayerKind};
use crate::{E, I};

/// Per-layer observed concrete extrema from [`Simulator::run`].
#[derive(Debug, Clone)]
pub struct SimulationSummary {
    pub observed_lb: Vec<Vec<E>>,
    pub observed_ub: Vec<Vec<E>>,
    pub samples_run: usize,
}

impl SimulationSummary {
    /// `(layer, neuron)`'s observed range width; `None` if never sampled.
    pub fn observed_width(&self, layer: I, neuron: I) -> Option<E> {
        let lb = *self.observed_lb.get(layer)?.get(neuron)?;
        let ub = *self.observed_ub.get(layer)?.get(neuron)?;
        (lb.is_finite() && ub.is_finite()).then(|| ub - lb)
    }
}

#[explicit_options(name = EngineOptions)]
#[use_option(
    name = "simulation_seed",
    type_ = usize,
    default = "1",
    description = "RNG seed for input-space simulation sampling"
)]
#[use_option(
    name = "simulation_samples",
    type_ = usize,
    default = "100",
    description = "Number of uniform input-box samples drawn per simulation run"
)]
pub struct Simulator {}

impl Simulator {
    pub fn new(options: &crate::EngineOptions) -> Self {
        Self {
            options: options.into(),
        }
    }

    pub fn run(&self, graph: &LayerGraph) -> SimulationSummary {
        use faer::rand::{Rng, SeedableRng, rngs::StdRng};

        let mut rng = StdRng::seed_from_u64(self.options.simulation_seed as u64);
        let input_size = graph.input_size();
        let input_lb = graph.layers[graph.input_layer].lb.clone();
        let input_ub = graph.layers[graph.input_layer].ub.clone();

        let mut observed_lb: Vec<Vec<E>> = graph
            .layers
            .iter()
            .map(|l| vec![E::INFINITY; l.size])
            .collect();
        let mut observed_ub: Vec<Vec<E>> = graph
            .layers
            .iter()
            .map(|l| vec![E::NEG_INFINITY; l.size])
            .collect();

        let num_samples = self.options.simulation_samples;
        for _ in 0..num_samples {
            let input: Vec<E> = (0..input_size)
                .map(|i| {
                    let (lo, hi) = (input_lb[i], input_ub[i]);
                    if hi > lo { rng.gen_range(lo..hi) } else { lo }
                })
                .collect();
            let assignment = propagate_concrete(graph, &input);
            for (layer, values) in assignment.iter().enumerate() {
                for (neuron, &v) in values.iter().enumerate() {
                    observed_lb[layer][neuron] = observed_lb[layer][neuron].min(v);
                    observed_ub[layer][neuron] = observed_ub[layer][neuron].max(v);
                }
            }
        }

        SimulationSummary {
            observed_lb,
            observed_ub,
            samples_run: num_samples,
        }
    }
}

/// Evaluates every layer exactly at one concrete input point, returning each
/// layer's per-neuron value.
fn propagate_concrete(graph: &LayerGraph, input: &[E]) -> Vec<Vec<E>> {
    let mut values: Vec<Vec<E>> = vec![Vec::new(); graph.layers.len()];
    values[graph.input_layer] = input.to_vec();

    for idx in 0..graph.layers.len() {
        if idx == graph.input_layer {
            continue;
        }
        values[idx] = evaluate_layer(&graph.layers[idx], &values);
    }
    values
}

fn evaluate_layer(layer: &Layer, values: &[Vec<E>]) -> Vec<E> {
    match layer.kind {
        LayerKind::Input => unreachable!("input layer is seeded separately"),
        LayerKind::WeightedSum => (0..layer.size)
            .map(|i| {
                let mut total = layer.biases[i];
                for &pred_id in &layer.predecessors {
                    let Some(w) = layer.weights.get(&pred_id) else { continue };
                    for (j, &coeff) in w[i].iter().enumerate() {
                        total += coeff * values[pred_id][j];
                    }
                }
                total
            })
            .collect(),
        LayerKind::Relu => activate(layer, values, |b| b.max(0.0)),
        LayerKind::AbsoluteValue => activate(layer, values, E::abs),
        LayerKind::Sign => activate(layer, values, |b| if b >= 0.0 { 1.0 } else { -1.0 }),
        LayerKind::LeakyRelu => {
            let alpha = layer.leaky_alpha;
            activate(layer, values, move |b| if b >= 0.0 { b } else { alpha * b })
        }
        LayerKind::Round => activate(layer, values, |b| (b + 0.5).floor()),
        LayerKind::Sigmoid => activate(layer, values, |b| 1.0 / (1.0 + (-b).exp())),
        LayerKind::Exponential => activate(layer, values, E::exp),
        LayerKind::Quadratic => activate(layer, values, |b| b * b),
        LayerKind::Max => (0..layer.size)
            .map(|i| {
                layer.activation_windows[i]
                    .iter()
                    .map(|&(l, n)| values[l][n])
                    .fold(E::NEG_INFINITY, E::max)
            })
            .collect(),
        LayerKind::Bilinear => (0..layer.size)
            .map(|i| {
                let (lx, nx) = layer.activation_windows[i][0];
                let (ly, ny) = layer.activation_windows[i][1];
                values[lx][nx] * values[ly][ny]
            })
            .collect(),
    }
}

fn activate(layer: &Layer, values: &[Vec<E>], f: impl Fn(E) -> E) -> Vec<E> {
    (0..layer.size)
        .map(|i| {
            let (src_layer, src_neuron) = layer.activation_windows[i][0];
            f(values[src_layer][src_neuron])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlr::LayerGraph;

    #[test]
    fn test_simulation_observed_range_within_relu_bounds() {
        let mut graph = LayerGraph::new(1);
        graph.layers[0].lb = vec![-2.0];
        graph.layers[0].ub = vec![2.0];
        let mut relu = Layer::new(LayerKind::Relu, 1, vec![0]);
        relu.set_activation_window(0, vec![(0, 0)]);
        graph.add_layer(relu);

        let sim = Simulator::new(&crate::EngineOptions::new());
        let summary = sim.run(&graph);
        assert!(summary.observed_lb[1][0] >= 0.0);
        assert!(summary.observed_ub[1][0] <= 2.0 + 1e-9);
        assert_eq!(summary.samples_run, 100);
    }

    #[test]
    fn test_simulation_is_deterministic_given_same_seed() {
        let mut graph = LayerGraph::new(1);
        graph.layers[0].lb = vec![0.0];
        graph.layers[0].ub = vec![1.0];
        let mut relu = Layer::new(LayerKind::Relu, 1, vec![0]);
        relu.set_activation_window(0, vec![(0, 0)]);
        graph.add_layer(relu);

        let sim = Simulator::new(&crate::EngineOptions::new());
        let a = sim.run(&graph);
        let b = sim.run(&graph);
        assert_eq!(a.observed_lb, b.observed_lb);
        assert_eq!(a.observed_ub, b.observed_ub);
    }
}
