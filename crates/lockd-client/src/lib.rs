//! lockd Client - Rust SDK for the lockd named-lock service
//!
//! A lock is held for as long as the connection that acquired it stays open.
//! There is no unlock message: closing or dropping the [`LockClient`] releases
//! every lock it holds.
//!
//! ```no_run
//! # async fn demo() -> lockd_client::error::Result<()> {
//! use lockd_client::LockClient;
//!
//! let mut client = LockClient::connect("127.0.0.1:9527").await?;
//! client.lock("printer").await?;
//! // ... use the printer ...
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;

pub use client::{LockClient, LockClientConfig};
pub use error::{ClientError, Result};
