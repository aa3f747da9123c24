//! JSON-RPC 2.0 bundler client over HTTP.

use alloy_primitives::{Address, B256, Bytes, U64, U256};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::abi;
use crate::bundler::{Bundler, GasEstimate, GasFees, Sponsorship};
use crate::config::SessionConfig;
use crate::error::BundlerError;
use crate::user_op::{UserOperation, UserOperationReceipt};

#[derive(Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct RpcResponse<R> {
    result: Option<R>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

/// Parse a JSON-RPC response body. `Ok(None)` means a `null` result.
fn parse_response<R: DeserializeOwned>(body: &str) -> Result<Option<R>, BundlerError> {
    let resp: RpcResponse<R> = serde_json::from_str(body)
        .map_err(|e| BundlerError::InvalidResponse(format!("{e}: {body}")))?;
    if let Some(err) = resp.error {
        let message = match err.data {
            Some(serde_json::Value::String(data)) => format!("{} ({data})", err.message),
            _ => err.message,
        };
        return Err(BundlerError::Rpc {
            code: err.code,
            message,
        });
    }
    Ok(resp.result)
}

pub struct JsonRpcBundler {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcBundler {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, BundlerError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BundlerError::Transport(format!("HTTP client build failed: {e}")))?;
        Ok(Self {
            http,
            url: url.to_string(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn from_config(config: &SessionConfig) -> Result<Self, BundlerError> {
        Self::new(&config.bundler_url, config.request_timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<P, R>(&self, method: &str, params: P) -> Result<Option<R>, BundlerError>
    where
        P: Serialize + Send,
        R: DeserializeOwned + Send,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        debug!(method, id, url = %self.url, "Bundler request");

        let resp = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| BundlerError::Transport(format!("{method}: {e}")))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| BundlerError::Transport(format!("{method}: {e}")))?;

        match parse_response(&body) {
            Err(BundlerError::InvalidResponse(_)) if !status.is_success() => Err(
                BundlerError::Transport(format!("{method}: HTTP {status}")),
            ),
            other => other,
        }
    }

    async fn call_required<P, R>(&self, method: &str, params: P) -> Result<R, BundlerError>
    where
        P: Serialize + Send,
        R: DeserializeOwned + Send,
    {
        self.call(method, params)
            .await?
            .ok_or_else(|| BundlerError::InvalidResponse(format!("{method} returned null")))
    }
}

#[async_trait]
impl Bundler for JsonRpcBundler {
    async fn chain_id(&self) -> Result<u64, BundlerError> {
        let id: U64 = self.call_required("eth_chainId", json!([])).await?;
        Ok(id.to::<u64>())
    }

    async fn nonce(&self, entry_point: Address, sender: Address) -> Result<U256, BundlerError> {
        let call = json!({ "to": entry_point, "data": abi::entry_point_get_nonce(sender) });
        let out: Bytes = self.call_required("eth_call", json!([call, "latest"])).await?;
        out.get(..32)
            .map(U256::from_be_slice)
            .ok_or_else(|| BundlerError::InvalidResponse(format!("getNonce returned {out:?}")))
    }

    async fn gas_fees(&self) -> Result<GasFees, BundlerError> {
        let gas_price: U256 = self.call_required("eth_gasPrice", json!([])).await?;
        let priority: U256 = self
            .call_required("eth_maxPriorityFeePerGas", json!([]))
            .await?;
        Ok(GasFees {
            max_fee_per_gas: gas_price.saturating_add(priority),
            max_priority_fee_per_gas: priority,
        })
    }

    async fn estimate_gas(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<GasEstimate, BundlerError> {
        self.call_required("eth_estimateUserOperationGas", json!([op, entry_point]))
            .await
    }

    async fn sponsor(
        &self,
        op: &UserOperation,
        entry_point: Address,
        sponsor_id: &str,
    ) -> Result<Sponsorship, BundlerError> {
        self.call_required(
            "pm_sponsorUserOperation",
            json!([op, entry_point, { "sponsorshipPolicyId": sponsor_id }]),
        )
        .await
    }

    async fn send(&self, op: &UserOperation, entry_point: Address) -> Result<B256, BundlerError> {
        self.call_required("eth_sendUserOperation", json!([op, entry_point]))
            .await
    }

    async fn receipt(&self, hash: B256) -> Result<Option<UserOperationReceipt>, BundlerError> {
        self.call("eth_getUserOperationReceipt", json!([hash])).await
    }
}
