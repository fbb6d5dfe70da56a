// src/handlers/mod.rs

pub mod assignments;
pub mod exercises;
pub mod students;
pub mod submissions;
pub mod tests;
