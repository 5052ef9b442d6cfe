//! 密钥库服务
//!
//! 账户的创建/导入/导出/删除/换口令与交易签名，全部落在本地
//! 密钥对存储之上；每账户密码经SecretStore保管。所有失败以
//! 类型化KeystoreError返回，不在公开边界panic。

use std::sync::Arc;

use sha3::{Digest, Keccak256};
use zeroize::Zeroizing;

use crate::{
    domain::{Account, SignTransactionRequest},
    error::KeystoreError,
    infrastructure::{
        keypair_store::KeypairStore,
        keystore_file::{self, EncryptedKeyFile},
        secret_store::SecretStore,
    },
};

/// 密钥库服务
pub struct Vault {
    store: Arc<KeypairStore>,
    secrets: Arc<dyn SecretStore>,
}

impl Vault {
    pub fn new(store: Arc<KeypairStore>, secrets: Arc<dyn SecretStore>) -> Self {
        Self { store, secrets }
    }

    /// 生成新账户并登记口令
    pub async fn create_account(&self, password: &str) -> Result<Account, KeystoreError> {
        let address = self
            .store
            .new_account(password)
            .await
            .map_err(KeystoreError::FailedToImport)?;

        if !self.secrets.set(&address, password) {
            tracing::error!(address = %address, "failed to persist account password");
        }
        Ok(Account::new(address))
    }

    /// 导入私钥材料
    ///
    /// `raw` 为32字节裸私钥（old_password不参与），或version-3
    /// 密钥文件JSON字节（先用old_password解出）。重复地址不写入
    /// 任何材料，返回DuplicateAccount；绝不静默覆盖已有账户。
    pub async fn import_private_key(
        &self,
        raw: &[u8],
        old_password: &str,
        new_password: &str,
    ) -> Result<Account, KeystoreError> {
        let key_bytes: Zeroizing<Vec<u8>> = if raw.len() == 32 {
            Zeroizing::new(raw.to_vec())
        } else {
            let file: EncryptedKeyFile = serde_json::from_slice(raw)
                .map_err(|e| KeystoreError::FailedToImport(e.into()))?;
            keystore_file::decrypt_key_file(&file, old_password)
                .map_err(|e| KeystoreError::FailedToImport(anyhow::Error::new(e)))?
        };

        let address = KeypairStore::address_for(&key_bytes)
            .map_err(KeystoreError::FailedToImport)?;
        if self.store.contains(&address) {
            tracing::warn!(address = %address, "rejecting duplicate account import");
            return Err(KeystoreError::DuplicateAccount);
        }

        let address = self
            .store
            .import_key(key_bytes, new_password)
            .await
            .map_err(KeystoreError::FailedToImport)?;

        if !self.secrets.set(&address, new_password) {
            tracing::error!(address = %address, "failed to persist account password");
        }
        Ok(Account::new(address))
    }

    /// 导入version-3密钥文件JSON字符串
    pub async fn import_keystore(
        &self,
        json: &str,
        password: &str,
        new_password: &str,
    ) -> Result<Account, KeystoreError> {
        self.import_private_key(json.as_bytes(), password, new_password)
            .await
    }

    /// 将hex私钥转换为可移植的version-3密钥文件
    pub async fn export_keystore_file(
        &self,
        raw_key_hex: &str,
        passphrase: &str,
    ) -> Result<EncryptedKeyFile, KeystoreError> {
        let raw = raw_key_hex.strip_prefix("0x").unwrap_or(raw_key_hex);
        let key_bytes = Zeroizing::new(
            hex::decode(raw).map_err(|_| KeystoreError::FailedToImportPrivateKey)?,
        );

        let passphrase = passphrase.to_string();
        let iterations = self.store.iterations();
        tokio::task::spawn_blocking(move || {
            keystore_file::encrypt_key_material(&key_bytes, &passphrase, iterations)
        })
        .await
        .map_err(|e| KeystoreError::FailedToImport(e.into()))?
        .map_err(|_| KeystoreError::FailedToImportPrivateKey)
    }

    /// 导出账户密钥文件（新口令重加密后的JSON字节）
    pub async fn export_data(
        &self,
        account: &Account,
        password: &str,
        new_password: &str,
    ) -> Result<Vec<u8>, KeystoreError> {
        let file = self
            .store
            .export_key(&account.address, password, new_password)
            .await
            .map_err(|_| KeystoreError::FailedToDecryptKey)?;
        serde_json::to_vec(&file).map_err(|e| KeystoreError::FailedToImport(e.into()))
    }

    /// 明文导出不透明id（托管型账户的备份路径）
    pub fn export_plain(&self, account: &Account) -> Result<String, KeystoreError> {
        Ok(account.id.clone())
    }

    /// 删除账户并清除其口令记录
    pub async fn delete(&self, account: &Account, password: &str) -> Result<(), KeystoreError> {
        self.store
            .delete(&account.address, password)
            .await
            .map_err(|_| KeystoreError::FailedToDeleteAccount)?;
        self.secrets.delete(&account.address);
        Ok(())
    }

    /// 换口令（密钥文件重加密，口令记录同步更新）
    pub async fn update_password(
        &self,
        account: &Account,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), KeystoreError> {
        self.store
            .update(&account.address, old_password, new_password)
            .await
            .map_err(|_| KeystoreError::FailedToUpdatePassword)?;
        self.secrets.set(&account.address, new_password);
        Ok(())
    }

    pub fn get_password(&self, account: &Account) -> Option<String> {
        self.secrets.get(&account.address)
    }

    pub fn set_password(&self, password: &str, account: &Account) -> bool {
        self.secrets.set(&account.address, password)
    }

    /// 签名交易，返回已签名RLP字节
    ///
    /// 解锁/签名/重新上锁整体在每账户锁内完成；口令缺失、
    /// 签名失败一律FailedToSignTransaction。
    pub async fn sign_transaction(
        &self,
        request: &SignTransactionRequest,
    ) -> Result<Vec<u8>, KeystoreError> {
        let password = self
            .get_password(&request.account)
            .ok_or(KeystoreError::FailedToSignTransaction)?;

        if !self.store.contains(&request.account.address) {
            return Err(KeystoreError::AccountNotFound(
                request.account.address.clone(),
            ));
        }

        let preimage = request
            .encode_unsigned()
            .map_err(|_| KeystoreError::FailedToSignTransaction)?;
        let digest: [u8; 32] = Keccak256::digest(&preimage).into();

        let (r, s, recovery_id) = self
            .store
            .sign_digest(&request.account.address, &password, digest)
            .await
            .map_err(|_| KeystoreError::FailedToSignTransaction)?;

        // EIP-155: v = chainId * 2 + 35 + recoveryId
        let v = request.chain_id * 2 + 35 + recovery_id as u64;
        request
            .encode_signed(v, &r, &s)
            .map_err(|_| KeystoreError::FailedToSignTransaction)
    }
}
