//! Re-exports the option-registration and parameterized-test proc macros used
//! throughout the engine. Kept as a thin facade crate so call sites only need
//! a single `macros::` import path regardless of which proc-macro crate a
//! given attribute actually lives in.

pub use options::{build_option_enum, build_options, explicit_options, use_option};
pub use testing::{matrix_parameterized_test, type_parameterized_test, value_parameterized_test};
