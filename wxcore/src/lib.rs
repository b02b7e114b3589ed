//! Runtime-agnostic core of the web messaging protocol: session data,
//! response decoding, topic routing types and message classification.

pub mod contacts;
pub mod endpoints;
pub mod error;
pub mod message;
pub mod net;
pub mod protocol;
pub mod retry;
pub mod send;
pub mod session;
pub mod topic;

pub use error::DecodeError;
