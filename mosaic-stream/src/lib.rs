//! mosaic-stream: live, consumer-paced streaming of ensemble predictions.
//!
//! A [`session::StreamingSession`] runs an audio source through a
//! [`engine::SessionEngine`] one frame at a time and broadcasts a packet per
//! frame to every consumer in the [`registry::ConnectionRegistry`]. The
//! [`server`] module exposes this over HTTP and WebSocket.
//!
//! # Quick Start
//!
//! ```ignore
//! use mosaic_stream::catalog::ModelCatalog;
//! use mosaic_stream::server::{AppState, serve};
//!
//! let mut catalog = ModelCatalog::new("models");
//! let (_, ensemble) = catalog.load_default()?;
//! let state = AppState::new(catalog, ensemble, Default::default(), Default::default());
//! serve("127.0.0.1:8000".parse()?, state).await?;
//! ```

pub mod catalog;
pub mod engine;
pub mod error;
pub mod flag;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod visual;
