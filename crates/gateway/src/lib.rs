//! Model-routing gateway over interchangeable LLM backends.
//!
//! Application code issues a single "generate a completion" or "stream a
//! completion" call and is transparently routed to one of several configured
//! vendors. The gateway normalizes every vendor to one canonical
//! request/response and streaming-chunk shape, retries transient failures
//! with exponential backoff, tracks per-model availability, and fails over
//! across an ordered candidate list until one model succeeds.
//!
//! The moving parts, leaves first:
//!
//! - [`messages`]: vendor-agnostic request/response/chunk shapes.
//! - [`ChatClient`]: one executor per vendor/model pair, owning retry,
//!   backoff and an availability flag.
//! - [`Provider`]: the adapter owning one vendor's executors.
//! - [`Registry`]: directory resolving model names to executors across all
//!   vendors.
//! - [`Failover`]: tries an ordered candidate list until one model yields a
//!   usable response.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use gateway::{ChatMessage, Failover, Registry};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = config::Config::load("switchboard.toml")?;
//! let registry = Arc::new(Registry::from_config(&config.llm));
//!
//! let failover = Failover::new(registry, vec!["gpt-4o-mini".into(), "deepseek-chat".into()]);
//!
//! let reply = failover
//!     .generate(vec![
//!         ChatMessage::system("You are a helpful assistant."),
//!         ChatMessage::user("Hello!"),
//!     ])
//!     .await?;
//!
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod failover;
pub mod messages;
mod provider;
mod registry;
mod retry;
#[cfg(test)]
mod test_support;

pub use client::{ChatClient, ChunkStream, ModelSettings};
pub use error::{GatewayError, Result};
pub use failover::Failover;
pub use messages::{ChatChunk, ChatMessage, CompletionRequest, CompletionResponse, Role};
pub use provider::{Provider, ProviderKind};
pub use registry::Registry;
pub use retry::RetryPolicy;
