//! # Outbound HTTP
//!
//! Building, sending, and decoding the HTTP calls made by REST-style actions.
//! Clients are pooled per host by [`HttpClientPool`]; request execution is
//! async and meant to be driven through [`crate::block_on_future`] from the
//! synchronous interpreter.

pub mod client_pool;
pub mod request;

pub use client_pool::HttpClientPool;
pub use request::*;
