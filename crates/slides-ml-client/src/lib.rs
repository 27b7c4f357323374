//! Client for the slide classification service.
//!
//! Sends slide images to an OpenAI-compatible vision chat endpoint and turns
//! the answers into [`Verdict`](slides_models::Verdict)s. Supports the hosted
//! service (login token, model looked up at runtime) and custom endpoints.

pub mod client;
pub mod config;
pub mod error;
pub mod prompts;
pub mod rate_limit;
pub mod types;

pub use client::{is_cloudflare_challenge, parse_batch, parse_single, BatchClassifier, ClassificationClient, Endpoint};
pub use config::{ClassifierConfig, ServiceType};
pub use error::{ErrorKind, MlError, MlResult};
pub use prompts::PromptSet;
pub use rate_limit::RateLimiter;
