//! Origin forwarder: replays an inbound request against the single configured
//! origin and buffers the upstream response.

mod error;
mod headers;
mod origin;
mod path;

pub use error::ForwardError;
pub use origin::{Origin, OriginSettings};
