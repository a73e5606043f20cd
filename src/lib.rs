pub mod answer;
pub mod clarify;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod corpus;
pub mod embeddings;
pub mod error;
pub mod eval;
pub mod handlers;
pub mod intent;
pub mod llm;
pub mod reranker;
pub mod retrieval;
pub mod retry;
pub mod storage;
pub mod text;
