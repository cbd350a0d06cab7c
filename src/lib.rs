//! # channelsite
//!
//! Backend for a channel's website: serves the static site from disk and
//! proxies a few read-only YouTube Data API calls through an in-memory cache
//! that keeps the site working when the API quota runs out.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use channelsite::Server;
//! use channelsite::api::{self, AppState};
//! use channelsite::config::{Cli, Config};
//! use clap::Parser;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_cli(Cli::parse())?;
//!     let pipeline = Arc::new(api::pipeline(Arc::new(AppState::from_config(&config))));
//!
//!     let server = Server::bind(config.bind.to_string()).await?;
//!     server
//!         .run(move |req| {
//!             let pipeline = Arc::clone(&pipeline);
//!             async move { pipeline.handle(req).await }
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

// ── HTTP plumbing ─────────────────────────────────────────────────────────────
pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod server;

// ── Site features ─────────────────────────────────────────────────────────────
pub mod api;
pub mod background;
pub mod cache;
pub mod config;
pub mod media;
pub mod site;
pub mod youtube;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
