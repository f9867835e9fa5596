pub mod embedder;
pub mod llm;
