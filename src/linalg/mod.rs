//! Small, domain-independent dense-column helpers shared by the tableau and
//! the NLR. The basis factorisation itself lives in [`crate::tableau`]: it is
//! specific to the revised-simplex basis (explicit F/V, ETA updates) rather
//! than a general sparse-matrix concern, so it is not duplicated here.

pub mod vector_ops;
