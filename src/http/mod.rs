//! HTTP-facing data model
//!
//! The request context handed through the lifecycle and the response
//! descriptor/writer pair that produces the wire response.

pub mod context;
pub mod response;

// Re-export commonly used types
pub use context::RequestContext;
pub use response::{render, ByteStream, Message, Reply, ResponseBody, ResponseHandle};
