//! JSON-RPC + WebSocket server (C10, §4.10) and the PoSe HTTP/JSON endpoints
//! (C11, §4.11): the node's external interface surface.

pub mod admin;
pub mod context;
pub mod coc;
pub mod debug;
pub mod encoding;
pub mod error;
pub mod eth;
pub mod net;
pub mod pose_routes;
pub mod server;
pub mod trace;
pub mod txpool;
pub mod types;
pub mod web3;
pub mod websocket;

pub use context::RpcApiContext;
pub use server::{build_router, serve};
