//! 交易签名服务
//!
//! 单次发送的阶段流转：Building -> NonceFetch -> Signing ->
//! Broadcasting -> {Completed, Failed}。委托转账跳过Signing。
//! SendError按阶段划分，调用方可区分"从未广播"与"可能已广播"。

use std::sync::Arc;

use crate::{
    config::ExchangeConfig,
    domain::{Account, SentTransaction, SignTransactionRequest, TransactionSpeed},
    error::{KeystoreError, SendError},
    service::{halyk_client::HalykClient, node_client::NodeClient, vault::Vault},
};

/// 兑换操作的一侧
#[derive(Debug, Clone)]
pub struct ExchangeLeg {
    pub token_address: String,
    pub amount: u128,
    /// 源资产是否为链原生资产（决定交易value字段）
    pub is_native: bool,
}

/// 两步兑换的逐步结果
///
/// approve与trade是链上两笔独立交易，结果独立上报，不合并。
/// approval为None表示源资产无需授权。
#[derive(Debug)]
pub struct TradeOutcome {
    pub approval: Option<Result<SentTransaction, SendError>>,
    pub trade: Result<SentTransaction, SendError>,
}

/// 交易签名服务
pub struct TransactionSigner {
    vault: Arc<Vault>,
    node: Arc<NodeClient>,
    halyk: Arc<HalykClient>,
    chain_id: u64,
    exchange: ExchangeConfig,
}

impl TransactionSigner {
    pub fn new(
        vault: Arc<Vault>,
        node: Arc<NodeClient>,
        halyk: Arc<HalykClient>,
        chain_id: u64,
        exchange: ExchangeConfig,
    ) -> Self {
        Self {
            vault,
            node,
            halyk,
            chain_id,
            exchange,
        }
    }

    /// 发送交易：取nonce（加偏移量）、签名、广播
    ///
    /// nonce_offset用于在同一区块窗口内流水线化依赖交易
    /// （如approve后紧跟trade），不等待前序确认。
    pub async fn send(
        &self,
        account: &Account,
        to: &str,
        value: u128,
        data: Vec<u8>,
        nonce_offset: u64,
        speed: TransactionSpeed,
    ) -> Result<SentTransaction, SendError> {
        tracing::debug!(account = %account.address, "fetching on-chain nonce");
        let count = self
            .node
            .get_transaction_count(&account.address)
            .await
            .map_err(SendError::NonceFetch)?;
        let nonce = count + nonce_offset;

        self.sign_and_broadcast(account, to, nonce, value, data, speed)
            .await
    }

    async fn sign_and_broadcast(
        &self,
        account: &Account,
        to: &str,
        nonce: u64,
        value: u128,
        data: Vec<u8>,
        speed: TransactionSpeed,
    ) -> Result<SentTransaction, SendError> {
        let request = SignTransactionRequest {
            amount: value,
            account: account.clone(),
            to: to.to_string(),
            nonce,
            speed,
            data,
            chain_id: self.chain_id,
        };

        let raw = self
            .vault
            .sign_transaction(&request)
            .await
            .map_err(SendError::Sign)?;
        let signed_hex = format!("0x{}", hex::encode(&raw));
        tracing::info!(account = %account.address, nonce = nonce, "transaction signed, broadcasting");

        let id = self
            .node
            .send_raw_transaction(&signed_hex)
            .await
            .map_err(SendError::Broadcast)?;
        Ok(SentTransaction { id })
    }

    /// ERC20代币转账：payload为transfer(address,uint256)，value为0
    ///
    /// payload构造失败按签名阶段失败上报（交易未离开本机）。
    pub async fn send_token(
        &self,
        account: &Account,
        contract: &str,
        to: &str,
        amount: u128,
        speed: TransactionSpeed,
    ) -> Result<SentTransaction, SendError> {
        let data = abi::erc20_transfer(to, amount)
            .map_err(|_| SendError::Sign(KeystoreError::FailedToSignTransaction))?;
        self.send(account, contract, 0, data, 0, speed).await
    }

    /// 委托转账：远端服务凭不透明id完成转账，跳过本地Signing
    ///
    /// 成功时无签名产物返回，SentTransaction.id为空串。
    pub async fn send_delegated(
        &self,
        account: &Account,
        to: &str,
        payment_id: &str,
        amount: u64,
    ) -> Result<SentTransaction, SendError> {
        self.halyk
            .transfer(&account.id, to, amount, payment_id)
            .await
            .map_err(|e| SendError::Broadcast(e.into()))?;
        Ok(SentTransaction { id: String::new() })
    }

    /// 两步兑换：可选approve + trade
    ///
    /// 乐观排序：trade以nonce偏移（有approve则为1）立即发出，
    /// 不等待approve确认。approve广播后若最终失败，trade会独立
    /// 失败，两个结果都原样带回。
    pub async fn trade(
        &self,
        account: &Account,
        from: &ExchangeLeg,
        to: &ExchangeLeg,
        speed: TransactionSpeed,
    ) -> TradeOutcome {
        let needs_approval = from.token_address != self.exchange.token_address;
        let trade_nonce: u64 = if needs_approval { 1 } else { 0 };

        let approval = if needs_approval {
            match abi::erc20_approve(&self.exchange.contract, from.amount) {
                Ok(data) => Some(
                    self.send(account, &from.token_address, 0, data, 0, speed)
                        .await,
                ),
                Err(_) => Some(Err(SendError::Sign(
                    KeystoreError::FailedToSignTransaction,
                ))),
            }
        } else {
            None
        };

        let ether_value = if from.is_native { from.amount } else { 0 };
        let trade = match abi::exchange_trade(
            &from.token_address,
            from.amount,
            &to.token_address,
            &account.address,
        ) {
            Ok(data) => {
                self.send(
                    account,
                    &self.exchange.contract,
                    ether_value,
                    data,
                    trade_nonce,
                    speed,
                )
                .await
            }
            Err(_) => Err(SendError::Sign(KeystoreError::FailedToSignTransaction)),
        };

        TradeOutcome { approval, trade }
    }
}

/// ABI调用编码
///
/// 选择子在运行时对签名做keccak256，不使用硬编码常量。
mod abi {
    use anyhow::{anyhow, Result};
    use sha3::{Digest, Keccak256};

    fn selector(signature: &str) -> [u8; 4] {
        let digest = Keccak256::digest(signature.as_bytes());
        [digest[0], digest[1], digest[2], digest[3]]
    }

    fn pad_address(address: &str) -> Result<[u8; 32]> {
        let raw = address.strip_prefix("0x").unwrap_or(address);
        let bytes = hex::decode(raw).map_err(|e| anyhow!("invalid address hex: {}", e))?;
        if bytes.len() != 20 {
            return Err(anyhow!("address must be 20 bytes, got {}", bytes.len()));
        }
        let mut out = [0u8; 32];
        out[12..].copy_from_slice(&bytes);
        Ok(out)
    }

    fn pad_u128(value: u128) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[16..].copy_from_slice(&value.to_be_bytes());
        out
    }

    pub fn erc20_transfer(to: &str, amount: u128) -> Result<Vec<u8>> {
        let mut data = selector("transfer(address,uint256)").to_vec();
        data.extend_from_slice(&pad_address(to)?);
        data.extend_from_slice(&pad_u128(amount));
        Ok(data)
    }

    pub fn erc20_approve(spender: &str, amount: u128) -> Result<Vec<u8>> {
        let mut data = selector("approve(address,uint256)").to_vec();
        data.extend_from_slice(&pad_address(spender)?);
        data.extend_from_slice(&pad_u128(amount));
        Ok(data)
    }

    /// trade(src, srcAmount, dest, destAddress, maxDestAmount,
    /// minConversionRate, walletId)
    /// maxDestAmount取uint256最大值（无上限），walletId为零地址。
    pub fn exchange_trade(
        src: &str,
        src_amount: u128,
        dest: &str,
        dest_address: &str,
    ) -> Result<Vec<u8>> {
        let mut data =
            selector("trade(address,uint256,address,address,uint256,uint256,address)").to_vec();
        data.extend_from_slice(&pad_address(src)?);
        data.extend_from_slice(&pad_u128(src_amount));
        data.extend_from_slice(&pad_address(dest)?);
        data.extend_from_slice(&pad_address(dest_address)?);
        data.extend_from_slice(&[0xffu8; 32]); // maxDestAmount
        data.extend_from_slice(&pad_u128(1)); // minConversionRate
        data.extend_from_slice(&[0u8; 32]); // walletId
        Ok(data)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_well_known_selectors() {
            assert_eq!(
                selector("transfer(address,uint256)"),
                [0xa9, 0x05, 0x9c, 0xbb]
            );
            assert_eq!(
                selector("approve(address,uint256)"),
                [0x09, 0x5e, 0xa7, 0xb3]
            );
        }

        #[test]
        fn test_transfer_payload_layout() {
            let to = "0x1234567890123456789012345678901234567890";
            let data = erc20_transfer(to, 1_000).unwrap();
            // selector + 两个32字节参数
            assert_eq!(data.len(), 4 + 32 + 32);
            // 地址左侧补零
            assert_eq!(&data[4..16], &[0u8; 12]);
            assert_eq!(&data[16..36], &hex::decode(&to[2..]).unwrap()[..]);
            // 金额大端在尾部
            assert_eq!(&data[36 + 30..], &1_000u16.to_be_bytes());
        }

        #[test]
        fn test_trade_payload_length() {
            let addr = "0x1234567890123456789012345678901234567890";
            let data = exchange_trade(addr, 5, addr, addr).unwrap();
            assert_eq!(data.len(), 4 + 7 * 32);
        }

        #[test]
        fn test_bad_address_rejected() {
            assert!(erc20_transfer("0x1234", 1).is_err());
            assert!(erc20_transfer("not-hex", 1).is_err());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        infrastructure::{keypair_store::KeypairStore, secret_store::MemorySecretStore},
    };

    fn signer_with_exchange(token_address: &str) -> (tempfile::TempDir, TransactionSigner) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(KeypairStore::new(dir.path().join("keystore"), 2214).unwrap());
        let secrets = Arc::new(MemorySecretStore::new());
        let vault = Arc::new(Vault::new(store, secrets));
        // 端口0：本套测试不触网，网络调用路径不会成功
        let node = Arc::new(NodeClient::new("http://localhost:0"));
        let halyk = Arc::new(HalykClient::new("http://localhost:0"));
        let exchange = ExchangeConfig {
            contract: "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_string(),
            token_address: token_address.to_string(),
        };
        (
            dir,
            TransactionSigner::new(vault, node, halyk, 1, exchange),
        )
    }

    #[tokio::test]
    async fn test_trade_nonce_offset_rules() {
        // 源资产即交易所代币 -> 无approve，trade偏移0
        let native = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
        let (_dir, signer) = signer_with_exchange(native);
        let account = Account::new("0x1111111111111111111111111111111111111111");

        let from = ExchangeLeg {
            token_address: native.to_string(),
            amount: 100,
            is_native: true,
        };
        let to = ExchangeLeg {
            token_address: "0xcccccccccccccccccccccccccccccccccccccccc".to_string(),
            amount: 0,
            is_native: false,
        };
        let outcome = signer.trade(&account, &from, &to, TransactionSpeed::regular()).await;
        assert!(outcome.approval.is_none());
        // 无节点可达 -> trade在NonceFetch阶段失败，且从未广播
        let err = outcome.trade.unwrap_err();
        assert!(!err.signed_locally());
    }

    #[tokio::test]
    async fn test_trade_with_approval_reports_both_steps() {
        let (_dir, signer) =
            signer_with_exchange("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
        let account = Account::new("0x1111111111111111111111111111111111111111");

        let from = ExchangeLeg {
            token_address: "0xdddddddddddddddddddddddddddddddddddddddd".to_string(),
            amount: 100,
            is_native: false,
        };
        let to = ExchangeLeg {
            token_address: "0xcccccccccccccccccccccccccccccccccccccccc".to_string(),
            amount: 0,
            is_native: false,
        };
        let outcome = signer.trade(&account, &from, &to, TransactionSpeed::regular()).await;
        // 两步各自报告结果，不合并
        assert!(outcome.approval.is_some());
        assert!(outcome.approval.unwrap().is_err());
        assert!(outcome.trade.is_err());
    }

    #[tokio::test]
    async fn test_delegated_failure_is_transport_error() {
        let (_dir, signer) =
            signer_with_exchange("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
        let account = Account::with_id("4".repeat(95), "wallet-id");

        let result = signer
            .send_delegated(&account, &"5".repeat(95), "payment-1", 10)
            .await;
        // 委托路径没有Signing阶段，失败只能是传输/服务侧错误
        assert!(matches!(result, Err(SendError::Broadcast(_))));
    }
}
