//! Watches Kafka clusters and keeps consumer group lag at hand.
//!
//! One [`monitor::ClusterFetcher`] session per cluster polls brokers, high-water
//! marks and committed offsets into a [`state::State`], which
//! [`server::router`] exposes as JSON.
#![deny(rustdoc::broken_intra_doc_links, rust_2018_idioms)]
#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro,
    clippy::explicit_iter_loop,
    clippy::future_not_send,
    clippy::todo,
    clippy::use_self
)]

pub mod backoff;
pub mod build_info;
pub mod client;
pub mod config;
pub mod connection;
pub mod lag;
mod messenger;
pub mod monitor;
pub mod protocol;
pub mod server;
pub mod state;
mod throttle;
mod topic;
