//! dgw Test Kit - mock infrastructure for gateway client tests
//!
//! - [`MockApiServer`] - REST mock with quota headers and scripted 429s
//! - [`MockGateway`] - WebSocket server whose every frame is driven by the test
//! - [`fixtures`] - gateway and entity payloads
//! - Tracing configuration for test output
//!
//! # Example
//!
//! ```rust,ignore
//! use dgw_testkit::{fixtures, MockGateway};
//!
//! #[tokio::test]
//! async fn identifies_after_hello() {
//!     dgw_testkit::init_test_tracing();
//!     let gateway = MockGateway::start().await;
//!     // ... point the client at gateway.url() ...
//!     let mut session = gateway.next_session().await;
//!     session.send_json(fixtures::hello(45_000));
//!     let identify = session.expect_op(2).await;
//!     assert_eq!(identify["d"]["token"], "test-token");
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod fixtures;
mod mock_gateway;
mod mock_server;
mod tracing_config;

pub use mock_gateway::*;
pub use mock_server::*;
pub use tracing_config::*;
