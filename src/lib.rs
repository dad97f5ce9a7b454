#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! # relay_http: priority-scheduled HTTP dispatch
//!
//! This crate sits between application code and an HTTP transport. Requests are
//! described with a fluent [`RequestBuilder`], scheduled onto bounded worker
//! pools by [`Priority`], executed against a [`Transport`], and their outcome is
//! delivered exactly once to a callback, or returned directly in synchronous
//! mode.
//!
//! ## Key Features
//!
//! - **Priority pools**: `Immediate` requests run on their own pool and never
//!   queue behind bulk traffic
//! - **Exactly-once delivery**: every accepted request calls its handler once,
//!   whatever races between completion and cancellation
//! - **Tag-based cancellation**: cancel by tag or globally, with a progress
//!   threshold that protects nearly finished transfers unless forced
//! - **Typed results**: text, JSON objects and arrays, parsed caller types,
//!   images, raw responses, downloads to file
//! - **Ordered callbacks**: handlers run on one delivery thread in completion
//!   order, or on any [`Executor`] you supply
//!
//! ## Usage
//!
//! ```no_run
//! use relay_http::{Client, Priority, RequestBuilder};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct Post {
//!     id: u64,
//!     title: String,
//! }
//!
//! let client = Client::new()?;
//!
//! let request = RequestBuilder::get("https://jsonplaceholder.typicode.com/posts/1")
//!     .tag("feed")
//!     .priority(Priority::Immediate)
//!     .build();
//!
//! client.get_as_parsed::<Post, _>(request, |result| match result {
//!     Ok(post) => println!("{}: {}", post.id, post.title),
//!     Err(e) if e.is_cancelled() => println!("cancelled"),
//!     Err(e) => eprintln!("error {}: {:?}", e.code(), e.body()),
//! })?;
//!
//! // Later, e.g. when the screen showing the feed goes away:
//! client.cancel("feed");
//! # Ok::<(), relay_http::DispatchError>(())
//! ```
//!
//! ## Module Structure
//!
//! - **[client]** - The `Client` context object and its builder
//! - **[request]** - Request builder, configuration and lifecycle handle
//! - **[response]** - Response envelope and payloads
//! - **[error]** - Delivered errors and client operation errors
//! - **[executor]** - Worker pools and callback executors
//! - **[transport]** - Transport seam and the `reqwest` transport
//! - **[parser]** - Body parser strategy
//! - **[image]** - Image decoder seam
//! - **[config]** - Client configuration
//! - **[types]** - Priorities, shapes, cache directives, tags

pub mod client;
pub mod config;
mod dispatch;
pub mod error;
pub mod executor;
pub mod image;
pub mod parser;
pub mod request;
pub mod response;
pub mod transport;
pub mod types;

pub use client::{Client, ClientBuilder};
pub use config::ClientConfig;
pub use error::{DispatchError, ErrorDetail, RequestError, Result};
pub use executor::{Executor, Job};
pub use image::{DecodeOptions, Image, ImageDecoder};
pub use parser::{JsonParser, Parser};
pub use request::{RequestBuilder, RequestConfig, RequestHandle};
pub use response::{Payload, Response, ResponseMeta};
pub use transport::{RawResponse, Transport, TransportRequest};
pub use types::{CacheControl, Priority, RequestKind, ResponseShape, Tag};

#[cfg(test)]
mod tests;
