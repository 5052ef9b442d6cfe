//! 交易领域模型与RLP编码
//!
//! 签名前后的链上交易结构（EIP-155）。仅在发送流程中瞬时存在，
//! 从不持久化。

use anyhow::{anyhow, Result};
use rlp::RlpStream;
use serde::{Deserialize, Serialize};

use crate::domain::Account;

/// Gas参数
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TransactionSpeed {
    pub gas_price: u128,
    pub gas_limit: u128,
}

impl TransactionSpeed {
    /// 普通转账默认值：20 Gwei / 21000
    pub fn regular() -> Self {
        Self {
            gas_price: 20_000_000_000,
            gas_limit: 21_000,
        }
    }

    /// 合约调用默认值
    pub fn contract_call() -> Self {
        Self {
            gas_price: 20_000_000_000,
            gas_limit: 200_000,
        }
    }
}

impl Default for TransactionSpeed {
    fn default() -> Self {
        Self::regular()
    }
}

/// 待签名交易请求
#[derive(Debug, Clone)]
pub struct SignTransactionRequest {
    pub amount: u128,
    pub account: Account,
    /// 收款地址（0x前缀hex，20字节）
    pub to: String,
    pub nonce: u64,
    pub speed: TransactionSpeed,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

/// 已提交交易
///
/// 委托转账路径下远端服务不返回签名产物，id为空串。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentTransaction {
    pub id: String,
}

impl SignTransactionRequest {
    fn to_bytes(&self) -> Result<Vec<u8>> {
        let raw = self.to.strip_prefix("0x").unwrap_or(&self.to);
        let bytes = hex::decode(raw).map_err(|e| anyhow!("invalid to address hex: {}", e))?;
        if bytes.len() != 20 {
            return Err(anyhow!("to address must be 20 bytes, got {}", bytes.len()));
        }
        Ok(bytes)
    }

    /// EIP-155签名前编码
    /// 格式: [nonce, gasPrice, gasLimit, to, value, data, chainId, 0, 0]
    pub fn encode_unsigned(&self) -> Result<Vec<u8>> {
        let to = self.to_bytes()?;

        let mut stream = RlpStream::new();
        stream.begin_list(9);
        stream.append(&self.nonce);
        stream.append(&self.speed.gas_price);
        stream.append(&self.speed.gas_limit);
        stream.append(&to);
        stream.append(&self.amount);
        stream.append(&self.data);
        stream.append(&self.chain_id);
        stream.append(&0u8);
        stream.append(&0u8);

        Ok(stream.out().to_vec())
    }

    /// 签名后编码
    /// 格式: [nonce, gasPrice, gasLimit, to, value, data, v, r, s]
    pub fn encode_signed(&self, v: u64, r: &[u8], s: &[u8]) -> Result<Vec<u8>> {
        let to = self.to_bytes()?;

        // r/s按RLP规则去掉前导零
        let r_trimmed: Vec<u8> = r.iter().skip_while(|b| **b == 0).copied().collect();
        let s_trimmed: Vec<u8> = s.iter().skip_while(|b| **b == 0).copied().collect();

        let mut stream = RlpStream::new();
        stream.begin_list(9);
        stream.append(&self.nonce);
        stream.append(&self.speed.gas_price);
        stream.append(&self.speed.gas_limit);
        stream.append(&to);
        stream.append(&self.amount);
        stream.append(&self.data);
        stream.append(&v);
        stream.append(&r_trimmed);
        stream.append(&s_trimmed);

        Ok(stream.out().to_vec())
    }
}
