// src/models/mod.rs

pub mod assignment;
pub mod exercise;
pub mod score;
pub mod submission;
