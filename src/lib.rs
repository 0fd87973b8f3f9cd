#![forbid(unsafe_code)]
//! A process-supervising JSON-RPC bridge: hosts a fleet of child subprocesses
//! that speak line-delimited JSON-RPC 2.0 over stdio, and exposes their
//! tools, resources, and prompts over HTTP.
//!
//! [`registry::Registry`] owns the fleet; [`rpc::Transport`] frames and
//! correlates requests against one child; [`confirmation::ConfirmationLedger`]
//! gates Medium-risk tool calls behind a second confirming request;
//! [`dispatch::call`] ties the three together and is the one path every HTTP
//! handler in [`http`] goes through.

pub mod confirmation;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod process;
pub mod registry;
pub mod resolver;
pub mod rpc;

pub use config::BridgeConfig;
pub use confirmation::ConfirmationLedger;
pub use error::BridgeError;
pub use registry::Registry;
