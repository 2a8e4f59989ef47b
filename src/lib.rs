//! Structured logging with Sentry reporting for axum services.
//!
//! # Architecture Overview
//!
//! ```text
//!   application code                      axum request
//!        │ tracing::error!(...)                │
//!        ▼                                     ▼
//!   ┌───────────────┐                  ┌─────────────────┐
//!   │   logging     │                  │      http       │
//!   │ TextLayer →   │                  │ trace id, scope │
//!   │ Record → line │                  │ recover, errors │
//!   └──────┬────────┘                  └───────┬─────────┘
//!          │ forward (optional)                │ report
//!          ▼                                   ▼
//!   ┌─────────────────────────────────────────────────┐
//!   │                   reporting                     │
//!   │  classify (category, fingerprint) → Reporter    │
//!   │  → sentry::Client with a per-call Scope         │
//!   └─────────────────────────────────────────────────┘
//!
//!   errors: AppError + HTTP responses      config: TOML + hot reload
//!   trace: TraceId + reporting key
//! ```

pub mod config;
pub mod errors;
pub mod http;
pub mod logging;
pub mod reporting;
pub mod trace;

pub use config::RmlogConfig;
pub use errors::{AppError, ErrorKind};
pub use logging::{Level, LogHandle, Record};
pub use reporting::{Reporter, Reporting};
pub use trace::TraceId;
