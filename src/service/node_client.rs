//! 节点JSON-RPC客户端
//!
//! 签名流程只需要两个调用：取链上nonce、广播已签名交易。
//! 传输层错误带退避重试；节点明确拒绝的请求立即返回，
//! 重试不会改变结果。

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use serde_json::json;

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY_MS: u64 = 1000;
const REQUEST_TIMEOUT_SECS: u64 = 30;
const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<serde_json::Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

pub struct NodeClient {
    http: reqwest::Client,
    rpc_url: String,
}

impl NodeClient {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            rpc_url: rpc_url.into(),
        }
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let mut last_error: Option<anyhow::Error> = None;
        for attempt in 1..=MAX_RETRIES {
            let sent = self.http.post(&self.rpc_url).json(&payload).send().await;
            match sent {
                Ok(response) => {
                    let parsed: RpcResponse = response
                        .json()
                        .await
                        .with_context(|| format!("malformed rpc response for {}", method))?;
                    if let Some(err) = parsed.error {
                        // 节点侧拒绝，重试无意义
                        bail!("rpc error {} for {}: {}", err.code, method, err.message);
                    }
                    return parsed
                        .result
                        .ok_or_else(|| anyhow!("rpc response for {} has no result", method));
                }
                Err(e) => {
                    tracing::warn!(
                        error = ?e,
                        method = %method,
                        attempt = attempt,
                        "rpc transport attempt failed"
                    );
                    last_error = Some(e.into());
                    if attempt < MAX_RETRIES {
                        tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64))
                            .await;
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow!("rpc call {} failed after {} attempts", method, MAX_RETRIES)))
    }

    /// 取账户链上nonce（含pending）
    pub async fn get_transaction_count(&self, address: &str) -> Result<u64> {
        let value = self
            .call("eth_getTransactionCount", json!([address, "pending"]))
            .await?;
        let hex_str = value
            .as_str()
            .ok_or_else(|| anyhow!("unexpected transaction count response: {}", value))?;
        u64::from_str_radix(hex_str.trim_start_matches("0x"), 16)
            .with_context(|| format!("invalid transaction count hex: {}", hex_str))
    }

    /// 广播已签名交易，返回交易哈希
    pub async fn send_raw_transaction(&self, signed_hex: &str) -> Result<String> {
        if !signed_hex.starts_with("0x") {
            bail!("invalid raw transaction format: must start with 0x");
        }
        if signed_hex.len() < 10 {
            bail!("invalid raw transaction: too short");
        }

        let value = self
            .call("eth_sendRawTransaction", json!([signed_hex]))
            .await?;
        let tx_hash = value
            .as_str()
            .ok_or_else(|| anyhow!("unexpected broadcast response: {}", value))?
            .to_string();

        tracing::info!(tx_hash = %tx_hash, "transaction broadcast accepted");
        Ok(tx_hash)
    }
}
