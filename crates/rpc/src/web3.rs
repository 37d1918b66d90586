//! `web3_clientVersion` / `web3_sha3` (§4.10).

use serde_json::{json, Value};

use coc_common::keccak256;

use crate::context::RpcApiContext;
use crate::encoding::{enc_bytes, parse_bytes};
use crate::error::RpcErr;
use crate::types::RpcRequest;

const CLIENT_VERSION: &str = concat!("coc-node/v", env!("CARGO_PKG_VERSION"));

pub fn map_web3_requests(req: &RpcRequest, _ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    match req.method.as_str() {
        "web3_clientVersion" => Ok(json!(CLIENT_VERSION)),
        "web3_sha3" => {
            let data = parse_bytes(req.required_param(0, "data")?)?;
            Ok(enc_bytes(keccak256(&data).as_bytes()))
        }
        other => Err(RpcErr::MethodNotFound(other.to_string())),
    }
}
