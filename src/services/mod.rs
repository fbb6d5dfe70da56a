// src/services/mod.rs

pub mod attempt_policy;
pub mod lifecycle;

pub use attempt_policy::AttemptPolicy;
pub use lifecycle::SubmissionLifecycle;
