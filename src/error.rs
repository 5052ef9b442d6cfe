//! 错误类型定义
//!
//! 公开API返回类型化错误；内部管线使用anyhow并在边界处映射。

use thiserror::Error;

/// 密钥库错误
#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("failed to create wallet")]
    FailedToCreateWallet,

    #[error("failed to import account: {0}")]
    FailedToImport(#[source] anyhow::Error),

    /// 重复导入：注册表中已存在相同地址的账户
    #[error("account already exists")]
    DuplicateAccount,

    #[error("failed to decrypt key")]
    FailedToDecryptKey,

    #[error("failed to delete account")]
    FailedToDeleteAccount,

    #[error("failed to update password")]
    FailedToUpdatePassword,

    #[error("failed to sign transaction")]
    FailedToSignTransaction,

    #[error("failed to import private key")]
    FailedToImportPrivateKey,

    /// 地址在本地密钥库中不存在（调用方假设失效时返回，而非panic）
    #[error("account not found: {0}")]
    AccountNotFound(String),
}

/// 对称加解密错误
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("invalid base64 ciphertext: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// key必须为16/24/32字节，iv必须为16字节
    #[error("invalid key or iv length")]
    InvalidKeyLength,

    #[error("invalid pkcs7 padding")]
    InvalidPadding,

    #[error("decrypted plaintext is not valid utf-8")]
    InvalidUtf8,
}

/// 远端钱包服务客户端错误
///
/// Cast与Service区分：响应无法解析为预期结构是客户端硬错误，
/// 与服务端返回 success=false 的业务失败不同。
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response shape for {method}")]
    Cast { method: String },

    #[error("service reported failure for {method}")]
    Service { method: String },
}

/// 发送交易错误
///
/// 变体按阶段划分：NonceFetch/Sign 阶段失败时交易从未离开本机；
/// Broadcast 失败时本地签名已完成，资金可能已在链上。
#[derive(Debug, Error)]
pub enum SendError {
    #[error("nonce fetch failed: {0}")]
    NonceFetch(#[source] anyhow::Error),

    #[error("signing failed: {0}")]
    Sign(#[from] KeystoreError),

    #[error("broadcast failed after local signing: {0}")]
    Broadcast(#[source] anyhow::Error),
}

impl SendError {
    /// 本地签名是否已经完成（调用方据此判断交易是否可能已广播）
    pub fn signed_locally(&self) -> bool {
        matches!(self, SendError::Broadcast(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_error_phase_split() {
        let e = SendError::NonceFetch(anyhow::anyhow!("rpc down"));
        assert!(!e.signed_locally());

        let e = SendError::Sign(KeystoreError::FailedToSignTransaction);
        assert!(!e.signed_locally());

        let e = SendError::Broadcast(anyhow::anyhow!("timeout"));
        assert!(e.signed_locally());
    }

    #[test]
    fn test_duplicate_account_is_distinct_from_import_failure() {
        // UI需要区分重复导入与一般导入失败
        let dup = KeystoreError::DuplicateAccount;
        let imp = KeystoreError::FailedToImport(anyhow::anyhow!("bad key"));
        assert_ne!(dup.to_string(), imp.to_string());
    }
}
