//! Transient HTTP values shared by the pipeline and the origin forwarder.

pub mod responses;
pub mod types;

pub use types::{ProxyRequest, ProxyResponse};
