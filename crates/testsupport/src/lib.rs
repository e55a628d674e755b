//! Test support utilities shared by integration tests across the workspace.
//!
//! The single entry point is [`server::TestServer`], an in-process TCP
//! server backed by a temporary WAL directory, used by the `client` and
//! `server` crates' integration tests to exercise the real wire protocol
//! without a separately-run binary.

pub mod server;

pub use server::TestServer;
