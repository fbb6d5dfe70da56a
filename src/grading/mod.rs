// src/grading/mod.rs

//! Pure grading core: evaluators, type dispatch and score aggregation.
//! Nothing in here performs I/O.

pub mod aggregator;
pub mod dispatcher;
pub mod evaluators;
pub mod text;

pub use aggregator::aggregate;
pub use dispatcher::{Evaluator, dispatch, evaluate};
pub use evaluators::Verdict;
