//! Gateway: the HTTP surface in front of the bridge.
//!
//! One port serves `GET /` (health) and the chat endpoint. The chat endpoint accepts a JSON
//! body on POST, answers CORS preflight, and maps bridge errors onto status codes.

mod protocol;
mod server;

pub use protocol::{parse_chat_request, ChatRequest};
pub use server::{router, run_gateway, GatewayState};
