//! JSON-RPC 2.0 envelope types (§4.10, §6).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RpcErr;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum RpcRequestId {
    Number(u64),
    String(String),
    Null,
}

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default = "default_id")]
    pub id: RpcRequestId,
    #[serde(default)]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Vec<Value>>,
}

fn default_id() -> RpcRequestId {
    RpcRequestId::Null
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RpcRequestWrapper {
    Single(RpcRequest),
    Multiple(Vec<RpcRequest>),
}

#[derive(Debug, Serialize)]
pub struct RpcSuccessResponse {
    pub id: RpcRequestId,
    pub jsonrpc: &'static str,
    pub result: Value,
}

#[derive(Debug, Serialize)]
pub struct RpcErrorResponse {
    pub id: RpcRequestId,
    pub jsonrpc: &'static str,
    pub error: crate::error::RpcErrorMetadata,
}

pub enum RpcNamespace {
    Eth,
    Net,
    Web3,
    Txpool,
    Debug,
    Trace,
    Admin,
    Coc,
}

impl RpcRequest {
    pub fn namespace(&self) -> Result<RpcNamespace, RpcErr> {
        match self.method.split('_').next() {
            Some("eth") => Ok(RpcNamespace::Eth),
            Some("net") => Ok(RpcNamespace::Net),
            Some("web3") => Ok(RpcNamespace::Web3),
            Some("txpool") => Ok(RpcNamespace::Txpool),
            Some("debug") => Ok(RpcNamespace::Debug),
            Some("trace") => Ok(RpcNamespace::Trace),
            Some("admin") => Ok(RpcNamespace::Admin),
            Some("coc") => Ok(RpcNamespace::Coc),
            _ => Err(RpcErr::MethodNotFound(self.method.clone())),
        }
    }

    pub fn param(&self, index: usize) -> Option<&Value> {
        self.params.as_ref().and_then(|p| p.get(index))
    }

    pub fn required_param(&self, index: usize, name: &str) -> Result<&Value, RpcErr> {
        self.param(index).ok_or_else(|| RpcErr::MissingParam(name.to_string()))
    }
}

pub fn rpc_response(id: RpcRequestId, result: Result<Value, RpcErr>) -> Value {
    match result {
        Ok(result) => serde_json::to_value(RpcSuccessResponse {
            id,
            jsonrpc: "2.0",
            result,
        }),
        Err(error) => serde_json::to_value(RpcErrorResponse {
            id,
            jsonrpc: "2.0",
            error: error.into(),
        }),
    }
    .expect("rpc response always serializes")
}
