pub mod api;
pub mod app_state;
pub mod config;
pub mod crawler;
pub mod enricher;
pub mod entities;
pub mod extractor;
pub mod fetcher;
pub mod health;
pub mod llm;
pub mod repositories;
pub mod retry;
pub mod runtime;
pub mod scheduler;
pub mod seed;
pub mod telemetry;
