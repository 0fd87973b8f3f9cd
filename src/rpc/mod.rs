//! JSON-RPC-over-stdio transport: wire types (§4.3/§6), the line-framed
//! codec, and request/response correlation (§4.4).

pub mod codec;
pub mod correlation;
pub mod protocol;

pub use correlation::{Transport, CALL_TIMEOUT};
pub use protocol::{call_params, InitializeParams, RequestId};
