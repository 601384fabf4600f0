//! JSON view of the counters over HTTP
//!
//! # Endpoints
//!
//! - **`GET /stats`** - every counter plus the mail queue size
//! - **`GET /counter/{name}`** - a single counter
//! - **`POST /reset`** - zero the counters
//! - **`POST /stats_reset`** - counters before zeroing them
//! - **`GET /health`** - liveness and version
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use mlogtail_control::Mailq;
//! use mlogtail_http::{HttpConfig, HttpServer, HttpState};
//! use mlogtail_stats::CounterStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let state = HttpState::new(Arc::new(CounterStore::new()), Arc::new(Mailq::default()));
//! let server = HttpServer::bind(&HttpConfig::new("127.0.0.1:8080"), state).await?;
//! // server.serve(shutdown_receiver).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod server;

pub use config::HttpConfig;
pub use error::HttpError;
pub use server::{HttpServer, HttpState, StatsResponse};
