//! 账户注册表
//!
//! 枚举本地账户、维护"最近使用账户"指针，并承接远端托管
//! 钱包的创建/导入两步流程。

use std::sync::Arc;

use crate::{
    domain::Account,
    error::KeystoreError,
    infrastructure::{
        keypair_store::KeypairStore,
        secret_store::{SecretStore, CURRENT_ID_KEY, RECENTLY_USED_ADDRESS_KEY},
    },
    service::{halyk_client::HalykClient, vault::Vault},
};

/// 账户注册表
pub struct AccountRegistry {
    store: Arc<KeypairStore>,
    secrets: Arc<dyn SecretStore>,
    client: Arc<HalykClient>,
    vault: Arc<Vault>,
}

impl AccountRegistry {
    pub fn new(
        store: Arc<KeypairStore>,
        secrets: Arc<dyn SecretStore>,
        client: Arc<HalykClient>,
        vault: Arc<Vault>,
    ) -> Self {
        Self {
            store,
            secrets,
            client,
            vault,
        }
    }

    /// 本地密钥库中的全部账户（id恒为空串，托管账户不在其中）
    pub fn accounts(&self) -> Vec<Account> {
        self.store
            .accounts()
            .into_iter()
            .map(Account::new)
            .collect()
    }

    pub fn has_accounts(&self) -> bool {
        !self.accounts().is_empty()
    }

    /// 最近使用账户地址；未设置时返回空串而非None
    pub fn current_address(&self) -> String {
        self.secrets
            .get(RECENTLY_USED_ADDRESS_KEY)
            .unwrap_or_default()
    }

    /// 当前不透明id；未设置时返回空串
    pub fn current_id(&self) -> String {
        self.secrets.get(CURRENT_ID_KEY).unwrap_or_default()
    }

    pub fn has_id(&self) -> bool {
        !self.current_id().is_empty()
    }

    pub fn recently_used_account(&self) -> Account {
        Account::with_id(self.current_address(), self.current_id())
    }

    pub fn set_recently_used_account(&self, account: &Account) {
        self.secrets
            .set(RECENTLY_USED_ADDRESS_KEY, &account.address);
        self.secrets.set(CURRENT_ID_KEY, &account.id);
    }

    /// 创建托管钱包：两步远端流程
    ///
    /// 第一步申请id，第二步解析地址。id在地址确认前即已持久化，
    /// 第二步失败会留下"有id无地址"的部分状态；该id仍可通过
    /// import_wallet重试解析，故不做回滚。
    pub async fn create_wallet(&self) -> Result<Account, KeystoreError> {
        let id = self.client.create_wallet().await.map_err(|e| {
            tracing::warn!(error = %e, "wallet creation request failed");
            KeystoreError::FailedToCreateWallet
        })?;

        self.secrets.set(CURRENT_ID_KEY, &id);
        self.resolve_address(id).await
    }

    /// 导入托管钱包：单步解析已有id的地址
    pub async fn import_wallet(&self, id: &str) -> Result<Account, KeystoreError> {
        self.resolve_address(id.to_string()).await
    }

    async fn resolve_address(&self, id: String) -> Result<Account, KeystoreError> {
        let address = self.client.get_address(&id).await.map_err(|e| {
            tracing::warn!(error = %e, "address resolution failed");
            KeystoreError::FailedToCreateWallet
        })?;

        let account = Account::with_id(address, id);
        self.set_recently_used_account(&account);
        tracing::info!(address = %account.address, "wallet ready");
        Ok(account)
    }

    /// 删除账户：口令取自存储，随后一并清除
    pub async fn delete_account(&self, account: &Account) -> Result<(), KeystoreError> {
        let password = self.secrets.get(&account.address).unwrap_or_default();
        self.vault.delete(account, &password).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::secret_store::MemorySecretStore;

    const ITERATIONS: u32 = 2214;

    fn registry() -> (tempfile::TempDir, AccountRegistry, Arc<Vault>) {
        let dir = tempfile::tempdir().unwrap();
        let store =
            Arc::new(KeypairStore::new(dir.path().join("keystore"), ITERATIONS).unwrap());
        let secrets: Arc<dyn SecretStore> = Arc::new(MemorySecretStore::new());
        let client = Arc::new(HalykClient::new("http://localhost:0"));
        let vault = Arc::new(Vault::new(store.clone(), secrets.clone()));
        (
            dir,
            AccountRegistry::new(store, secrets, client, vault.clone()),
            vault,
        )
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let (_dir, registry, _) = registry();
        assert!(!registry.has_accounts());
        assert!(registry.accounts().is_empty());
        // 未设置时为空串，而非None
        assert_eq!(registry.current_address(), "");
        assert_eq!(registry.current_id(), "");
        assert!(!registry.has_id());
    }

    #[tokio::test]
    async fn test_accounts_enumerates_local_keys() {
        let (_dir, registry, vault) = registry();
        let account = vault.create_account("p1").await.unwrap();

        assert!(registry.has_accounts());
        let listed = registry.accounts();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].address, account.address);
        assert!(listed[0].id.is_empty());
    }

    #[tokio::test]
    async fn test_recently_used_account_roundtrip() {
        let (_dir, registry, _) = registry();
        let account = Account::with_id("4".repeat(95), "wallet-id");
        registry.set_recently_used_account(&account);

        assert_eq!(registry.current_address(), "4".repeat(95));
        assert_eq!(registry.current_id(), "wallet-id");
        assert!(registry.has_id());
        assert_eq!(registry.recently_used_account(), account);
    }

    #[tokio::test]
    async fn test_delete_purges_password() {
        let (_dir, registry, vault) = registry();
        let account = vault.create_account("p1").await.unwrap();
        assert!(vault.get_password(&account).is_some());

        registry.delete_account(&account).await.unwrap();
        assert!(!registry.has_accounts());
        assert!(vault.get_password(&account).is_none());
    }
}
