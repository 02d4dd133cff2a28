//! Common test infrastructure
//!
//! Spawns an isolated vault server per test, backed by in-memory stores and
//! a temporary media directory.

mod server;

pub use server::TestServer;

/// Bearer token every test server accepts.
pub const TEST_TOKEN: &str = "test-api-token";
