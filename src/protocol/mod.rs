//! Subset of the Kafka wire protocol needed to observe a cluster.
//!
//! Only the non-flexible (pre tagged-field) versions of each message are
//! implemented.
//!
//! # References
//! - <https://kafka.apache.org/protocol>

pub mod api_key;
pub mod api_version;
pub mod error;
pub mod frame;
pub mod messages;
pub mod primitives;
pub mod traits;
mod vec_builder;
