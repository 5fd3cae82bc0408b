//! # Palaver API
//!
//! The HTTP surface contracts an embedding transport exposes:
//! `POST /chat`, `POST /chat/stream`, `POST /feedback`, `GET /health`,
//! `GET /skills`. This crate pins the body shapes, stream events and the
//! error envelope; the server itself lives with the embedding
//! application.

mod dto;
mod error;

pub use dto::{FeedbackRequest, HealthResponse, SkillSummary, StreamEvent};
pub use error::{http_status, ErrorBody};

// The chat body and result are the engine's own wire-shaped types.
pub use palaver_core::types::{ChatRequest, ChatResult};
