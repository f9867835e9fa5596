pub mod classify;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod generate;
pub mod metrics;
pub mod model;
pub mod providers;
pub mod render;
pub mod similarity;
pub mod storage;
pub mod tos;
pub mod validation;
