//! Core optimizer logic

pub mod area;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod operations;
pub mod optimizer;
pub mod report;
pub mod scheduler;
