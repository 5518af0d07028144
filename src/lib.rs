//! Medical document translation pipeline engine: OCR routing, dynamic step
//! execution with branching, and resilient AI orchestration behind an HTTP API.

pub mod api;
pub mod cache;
pub mod clients;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod feedback;
pub mod jobs;
pub mod models;
pub mod ocr_router;
pub mod pipeline;
pub mod processor;
pub mod queue;
pub mod resilience;

pub use config::Config;
pub use error::AppError;
