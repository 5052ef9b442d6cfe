//! 转账记录领域模型
//!
//! `/getTransfers` 按方向返回三个数组，本地统一为带方向标记的
//! 单一记录类型。

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// 转账方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    In,
    Out,
    Pending,
}

/// 子地址索引
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubaddrIndex {
    #[serde(default)]
    pub major: u32,
    #[serde(default)]
    pub minor: u32,
}

/// 单条转账记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub amount: u64,
    pub fee: u64,
    pub height: i64,
    pub note: String,
    pub payment_id: String,
    pub subaddr_index: SubaddrIndex,
    pub timestamp: DateTime<Utc>,
    pub txid: String,
    pub direction: TransferDirection,
    pub unlock_time: i64,
}

/// `/getTransfers` 单条目的线上结构（缺失字段按0/空串处理）
#[derive(Debug, Clone, Deserialize)]
pub struct TransferEntry {
    #[serde(default)]
    pub amount: u64,
    #[serde(default)]
    pub fee: u64,
    #[serde(default)]
    pub height: i64,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub payment_id: String,
    #[serde(default)]
    pub subaddr_index: SubaddrIndex,
    /// Unix秒
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub txid: String,
    #[serde(default)]
    pub unlock_time: i64,
}

impl TransferEntry {
    pub fn into_record(self, direction: TransferDirection) -> TransferRecord {
        let timestamp = Utc
            .timestamp_opt(self.timestamp, 0)
            .single()
            .unwrap_or_else(Utc::now);
        TransferRecord {
            amount: self.amount,
            fee: self.fee,
            height: self.height,
            note: self.note,
            payment_id: self.payment_id,
            subaddr_index: self.subaddr_index,
            timestamp,
            txid: self.txid,
            direction,
            unlock_time: self.unlock_time,
        }
    }
}
