//! walletcore - 钱包客户端密钥/账户/签名核心
//!
//! 职责：账户生成与导入、每账户密码的安全存储、私钥材料的
//! 加密备份与恢复、产出可直接广播的已签名交易。
//! UI、推送、锁屏等均在外层，不属于本crate。

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod service;
pub mod utils;

// 重新导出常用类型
pub use error::{CipherError, ClientError, KeystoreError, SendError};

// 统一模块导出
pub mod prelude {
    pub use crate::{
        config::Config,
        domain::{Account, Balance, SentTransaction, SignTransactionRequest, TransactionSpeed},
        error::{CipherError, ClientError, KeystoreError, SendError},
        infrastructure::secret_store::SecretStore,
        service::{
            halyk_client::HalykClient, registry::AccountRegistry, signer::TransactionSigner,
            vault::Vault,
        },
    };
}
