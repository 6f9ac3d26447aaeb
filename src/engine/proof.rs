//! UNSAT proof production: a tree of [`Contradiction`]s and the activation
//! lemmas learned while exploring the split stack, serialised to the JSON
//! document named in the external-interfaces design. Producing this
//! document is in scope; an independent checker that re-verifies it is not.

use serde::{Deserialize, Serialize};

use crate::{E, I};

/// A leaf contradiction: either a single variable whose bounds crossed, or a
/// signed linear combination of the original rows proving infeasibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Contradiction {
    BoundCrossing {
        variable: I,
        /// Sparse row-combination explanation: `(coefficient, row_index)` pairs.
        explanation: Vec<(E, I)>,
    },
    LinearCombination {
        /// `(coefficient, row_index)` pairs, interpreted against the
        /// original constraint matrix and ground bounds.
        combination: Vec<(E, I)>,
    },
}

/// One recorded phase commitment along the path from the root to a leaf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LemmaRecord {
    pub constraint_index: I,
    pub description: String,
}

/// A node in the backtracking tree: either an internal split with child
/// branches, or a leaf contradiction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofNode {
    pub lemma: Option<LemmaRecord>,
    pub children: Vec<ProofNode>,
    pub leaf: Option<Contradiction>,
}

impl ProofNode {
    pub fn leaf(contradiction: Contradiction) -> Self {
        Self {
            lemma: None,
            children: Vec::new(),
            leaf: Some(contradiction),
        }
    }

    pub fn branch(lemma: LemmaRecord, children: Vec<ProofNode>) -> Self {
        Self {
            lemma: Some(lemma),
            children,
            leaf: None,
        }
    }
}

/// The full document: ground bounds, the original constraint matrix (as
/// sparse row triplets), and the recursive proof tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofDocument {
    pub ground_lower_bounds: Vec<E>,
    pub ground_upper_bounds: Vec<E>,
    pub matrix_triplets: Vec<(I, I, E)>,
    pub root: ProofNode,
}

impl ProofDocument {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proof_document_round_trips_through_json() {
        let doc = ProofDocument {
            ground_lower_bounds: vec![0.0, -1.0],
            ground_upper_bounds: vec![1.0, 1.0],
            matrix_triplets: vec![(0, 0, 1.0), (0, 1, -1.0)],
            root: ProofNode::branch(
                LemmaRecord {
                    constraint_index: 0,
                    description: "relu active".to_string(),
                },
                vec![ProofNode::leaf(Contradiction::BoundCrossing {
                    variable: 1,
                    explanation: vec![(1.0, 0)],
                })],
            ),
        };
        let json = doc.to_json().unwrap();
        let parsed = ProofDocument::from_json(&json).unwrap();
        assert_eq!(parsed.ground_lower_bounds, doc.ground_lower_bounds);
        assert_eq!(parsed.root.children.len(), 1);
    }
}
