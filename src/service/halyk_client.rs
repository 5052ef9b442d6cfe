//! 远端钱包服务客户端
//!
//! 全部操作为POST，响应信封统一为 {method, success, data}，
//! data按操作各自类型化解析。解析失败是客户端硬错误(Cast)，
//! 与 success=false 的业务失败(Service)分开上报。

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::json;

use crate::{
    domain::{transfer::TransferEntry, Balance, TransferDirection, TransferRecord},
    error::ClientError,
};

const REQUEST_TIMEOUT_SECS: u64 = 30;
const CONNECT_TIMEOUT_SECS: u64 = 10;
/// /transfer 固定环签名混淆度
const TRANSFER_MIX_IN: u32 = 1;

/// 响应信封
#[derive(Debug, serde::Deserialize)]
struct Envelope {
    #[serde(default)]
    #[allow(dead_code)]
    method: String,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: serde_json::Value,
}

/// `/getTransfers` 的data结构：按方向分组
#[derive(Debug, Default, serde::Deserialize)]
struct TransfersData {
    #[serde(rename = "in", default)]
    incoming: Vec<TransferEntry>,
    #[serde(default)]
    out: Vec<TransferEntry>,
    #[serde(default)]
    pending: Vec<TransferEntry>,
}

impl TransfersData {
    fn flatten(self) -> Vec<TransferRecord> {
        let mut records = Vec::with_capacity(
            self.incoming.len() + self.out.len() + self.pending.len(),
        );
        records.extend(
            self.incoming
                .into_iter()
                .map(|e| e.into_record(TransferDirection::In)),
        );
        records.extend(
            self.out
                .into_iter()
                .map(|e| e.into_record(TransferDirection::Out)),
        );
        records.extend(
            self.pending
                .into_iter()
                .map(|e| e.into_record(TransferDirection::Pending)),
        );
        records
    }
}

/// 解析响应体为指定data类型
fn parse_envelope<T: DeserializeOwned>(method: &str, body: &str) -> Result<T, ClientError> {
    let envelope: Envelope = serde_json::from_str(body).map_err(|_| ClientError::Cast {
        method: method.to_string(),
    })?;
    if !envelope.success {
        return Err(ClientError::Service {
            method: method.to_string(),
        });
    }
    serde_json::from_value(envelope.data).map_err(|_| ClientError::Cast {
        method: method.to_string(),
    })
}

/// 远端钱包服务客户端
pub struct HalykClient {
    http: reqwest::Client,
    base_url: String,
}

impl HalykClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            base_url: base_url.into(),
        }
    }

    async fn post<T: DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(method = %method, url = %url, "sending wallet service request");

        let response = self.http.post(&url).json(&body).send().await?;
        let text = response.text().await?;
        parse_envelope(method, &text)
    }

    /// 申请新钱包，返回不透明id
    pub async fn create_wallet(&self) -> Result<String, ClientError> {
        self.post("createWallet", "/createWallet", json!({})).await
    }

    /// 解析id对应的地址
    pub async fn get_address(&self, id: &str) -> Result<String, ClientError> {
        self.post("getAddress", "/getAddress", json!({ "id": id }))
            .await
    }

    /// 查询余额
    pub async fn get_balance(&self, id: &str) -> Result<Balance, ClientError> {
        self.post("getBalance", "/getBalance", json!({ "id": id }))
            .await
    }

    /// 拉取转账记录（in/out/pending统一为带方向的单一列表）
    pub async fn get_transfers(&self, id: &str) -> Result<Vec<TransferRecord>, ClientError> {
        let data: TransfersData = self
            .post("getTransfers", "/getTransfers", json!({ "id": id }))
            .await?;
        Ok(data.flatten())
    }

    /// 委托转账：远端持有签名能力，本地不产生签名产物
    pub async fn transfer(
        &self,
        id: &str,
        address: &str,
        amount: u64,
        payment_id: &str,
    ) -> Result<serde_json::Map<String, serde_json::Value>, ClientError> {
        self.post(
            "transfer",
            "/transfer",
            json!({
                "id": id,
                "address": address,
                "amount": amount,
                "paymentId": payment_id,
                "mixIn": TRANSFER_MIX_IN,
            }),
        )
        .await
    }
}
