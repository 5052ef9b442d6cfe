//! 本地密钥对存储
//!
//! 每账户一个version-3 JSON文件，固定目录管理。签名流程为
//! 作用域式解锁：解锁、使用、保证重新上锁（Zeroizing缓冲随
//! 作用域清零），任何退出路径都不留明文密钥。同一账户的
//! 解锁/签名不可重入，以每账户互斥锁串行。

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, bail, Context, Result};
use k256::{ecdsa::SigningKey, elliptic_curve::sec1::ToEncodedPoint};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use tokio::sync::Mutex as AsyncMutex;
use zeroize::Zeroizing;

use crate::infrastructure::keystore_file::{self, EncryptedKeyFile};

/// 磁盘上的账户密钥文件（v3结构外加地址字段）
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredAccountFile {
    address: String,
    #[serde(flatten)]
    key: EncryptedKeyFile,
}

/// 本地密钥对存储
pub struct KeypairStore {
    keydir: PathBuf,
    iterations: u32,
    // 每账户一把签名锁
    sign_locks: AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

fn account_path(keydir: &Path, address: &str) -> PathBuf {
    keydir.join(format!("{}.json", address.trim_start_matches("0x")))
}

/// keccak256(未压缩公钥[1..])[12..]
fn derive_address(key: &SigningKey) -> String {
    let point = key.verifying_key().to_encoded_point(false);
    let digest = Keccak256::digest(&point.as_bytes()[1..]);
    format!("0x{}", hex::encode(&digest[12..]))
}

fn write_account_file(
    keydir: &Path,
    iterations: u32,
    key_bytes: &[u8],
    password: &str,
) -> Result<String> {
    let signing_key =
        SigningKey::from_slice(key_bytes).map_err(|e| anyhow!("invalid private key: {}", e))?;
    let address = derive_address(&signing_key);

    let mut file = keystore_file::encrypt_key_material(key_bytes, password, iterations)?;
    file.id = uuid::Uuid::new_v4().to_string();

    let stored = StoredAccountFile {
        address: address.clone(),
        key: file,
    };
    let path = account_path(keydir, &address);
    let json = serde_json::to_string_pretty(&stored)?;
    std::fs::write(&path, json)
        .with_context(|| format!("failed to write key file: {}", path.display()))?;

    Ok(address)
}

/// 已解锁的密钥（丢弃即清零，等价于重新上锁）
struct UnlockedKey {
    secret: Zeroizing<Vec<u8>>,
}

impl UnlockedKey {
    fn unlock(file: &EncryptedKeyFile, password: &str) -> Result<Self> {
        let secret = keystore_file::decrypt_key_file(file, password).map_err(|e| anyhow!(e))?;
        Ok(Self { secret })
    }

    fn sign_prehash(&self, digest: [u8; 32]) -> Result<(Vec<u8>, Vec<u8>, u8)> {
        let key = SigningKey::from_slice(&self.secret)
            .map_err(|e| anyhow!("invalid key material: {}", e))?;
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| anyhow!("signing failed: {}", e))?;
        let (r, s) = signature.split_bytes();
        Ok((r.to_vec(), s.to_vec(), recovery_id.to_byte()))
    }
}

impl KeypairStore {
    pub fn new(keydir: impl Into<PathBuf>, iterations: u32) -> Result<Self> {
        let keydir = keydir.into();
        std::fs::create_dir_all(&keydir)
            .with_context(|| format!("failed to create keystore dir: {}", keydir.display()))?;
        Ok(Self {
            keydir,
            iterations,
            sign_locks: AsyncMutex::new(HashMap::new()),
        })
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// 从私钥字节推导地址，不触碰磁盘
    pub fn address_for(key_bytes: &[u8]) -> Result<String> {
        let signing_key =
            SigningKey::from_slice(key_bytes).map_err(|e| anyhow!("invalid private key: {}", e))?;
        Ok(derive_address(&signing_key))
    }

    pub fn contains(&self, address: &str) -> bool {
        account_path(&self.keydir, address).exists()
    }

    /// 枚举全部账户地址（无法解析的文件跳过并告警）
    pub fn accounts(&self) -> Vec<String> {
        let mut out = Vec::new();
        let entries = match std::fs::read_dir(&self.keydir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(error = ?e, keydir = %self.keydir.display(), "failed to read keystore dir");
                return out;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|ext| ext == "json").unwrap_or(false) {
                let parsed = std::fs::read_to_string(&path)
                    .ok()
                    .and_then(|s| serde_json::from_str::<StoredAccountFile>(&s).ok());
                match parsed {
                    Some(stored) => out.push(stored.address),
                    None => {
                        tracing::warn!(path = %path.display(), "skipping unreadable key file")
                    }
                }
            }
        }
        out.sort();
        out
    }

    async fn lock_for(&self, address: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.sign_locks.lock().await;
        locks
            .entry(address.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn read_account_file(&self, address: &str) -> Result<StoredAccountFile> {
        let path = account_path(&self.keydir, address);
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("no key file for account: {}", address))?;
        let stored: StoredAccountFile = serde_json::from_str(&json)
            .with_context(|| format!("corrupted key file: {}", path.display()))?;
        Ok(stored)
    }

    /// 生成新密钥对并落盘
    pub async fn new_account(&self, password: &str) -> Result<String> {
        let keydir = self.keydir.clone();
        let iterations = self.iterations;
        let password = password.to_string();

        let address = tokio::task::spawn_blocking(move || {
            let signing_key = SigningKey::random(&mut OsRng);
            let key_bytes = Zeroizing::new(signing_key.to_bytes().to_vec());
            write_account_file(&keydir, iterations, &key_bytes, &password)
        })
        .await
        .context("key generation task panicked")??;

        tracing::info!(address = %address, "created new keypair");
        Ok(address)
    }

    /// 导入私钥字节。目标文件已存在时拒绝写入，防止覆盖。
    pub async fn import_key(
        &self,
        key_bytes: Zeroizing<Vec<u8>>,
        password: &str,
    ) -> Result<String> {
        let keydir = self.keydir.clone();
        let iterations = self.iterations;
        let password = password.to_string();

        let address = tokio::task::spawn_blocking(move || {
            let signing_key = SigningKey::from_slice(&key_bytes)
                .map_err(|e| anyhow!("invalid private key: {}", e))?;
            let address = derive_address(&signing_key);
            if account_path(&keydir, &address).exists() {
                bail!("account file already exists: {}", address);
            }
            write_account_file(&keydir, iterations, &key_bytes, &password)
        })
        .await
        .context("import task panicked")??;

        tracing::info!(address = %address, "imported keypair");
        Ok(address)
    }

    /// 对32字节摘要签名，返回(r, s, recovery_id)
    pub async fn sign_digest(
        &self,
        address: &str,
        password: &str,
        digest: [u8; 32],
    ) -> Result<(Vec<u8>, Vec<u8>, u8)> {
        let lock = self.lock_for(address).await;
        let _guard = lock.lock().await;

        let stored = self.read_account_file(address)?;
        let password = password.to_string();

        tokio::task::spawn_blocking(move || {
            let unlocked = UnlockedKey::unlock(&stored.key, &password)?;
            unlocked.sign_prehash(digest)
            // unlocked在此丢弃，密钥材料清零
        })
        .await
        .context("signing task panicked")?
    }

    /// 删除账户文件（先验证口令能解开密钥）
    pub async fn delete(&self, address: &str, password: &str) -> Result<()> {
        let lock = self.lock_for(address).await;
        let _guard = lock.lock().await;

        let stored = self.read_account_file(address)?;
        let password = password.to_string();
        tokio::task::spawn_blocking(move || {
            keystore_file::decrypt_key_file(&stored.key, &password)
                .map(|_| ())
                .map_err(|e| anyhow!(e))
        })
        .await
        .context("delete task panicked")??;

        let path = account_path(&self.keydir, address);
        std::fs::remove_file(&path)
            .with_context(|| format!("failed to remove key file: {}", path.display()))?;
        tracing::info!(address = %address, "deleted keypair");
        Ok(())
    }

    /// 换口令：旧口令解密，新口令重加密后回写
    pub async fn update(&self, address: &str, old_password: &str, new_password: &str) -> Result<()> {
        let lock = self.lock_for(address).await;
        let _guard = lock.lock().await;

        let stored = self.read_account_file(address)?;
        let keydir = self.keydir.clone();
        let iterations = self.iterations;
        let old_password = old_password.to_string();
        let new_password = new_password.to_string();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let secret =
                keystore_file::decrypt_key_file(&stored.key, &old_password).map_err(|e| anyhow!(e))?;
            let mut new_file =
                keystore_file::encrypt_key_material(&secret, &new_password, iterations)?;
            new_file.id = stored.key.id.clone();

            let rewritten = StoredAccountFile {
                address: stored.address.clone(),
                key: new_file,
            };
            let path = account_path(&keydir, &stored.address);
            let json = serde_json::to_string_pretty(&rewritten)?;
            std::fs::write(&path, json)
                .with_context(|| format!("failed to rewrite key file: {}", path.display()))?;
            Ok(())
        })
        .await
        .context("update task panicked")?
    }

    /// 导出：旧口令解密，新口令重加密，返回可移植v3结构
    pub async fn export_key(
        &self,
        address: &str,
        password: &str,
        new_password: &str,
    ) -> Result<EncryptedKeyFile> {
        let stored = self.read_account_file(address)?;
        let iterations = self.iterations;
        let password = password.to_string();
        let new_password = new_password.to_string();

        tokio::task::spawn_blocking(move || -> Result<EncryptedKeyFile> {
            let secret =
                keystore_file::decrypt_key_file(&stored.key, &password).map_err(|e| anyhow!(e))?;
            let mut file = keystore_file::encrypt_key_material(&secret, &new_password, iterations)?;
            file.id = stored.key.id.clone();
            Ok(file)
        })
        .await
        .context("export task panicked")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITERATIONS: u32 = 2214;

    fn store() -> (tempfile::TempDir, KeypairStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = KeypairStore::new(dir.path().join("keystore"), ITERATIONS).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_new_account_is_listed() {
        let (_dir, store) = store();
        let address = store.new_account("p1").await.unwrap();
        assert!(address.starts_with("0x"));
        assert_eq!(address.len(), 42);
        assert!(store.contains(&address));
        assert_eq!(store.accounts(), vec![address]);
    }

    #[tokio::test]
    async fn test_import_refuses_to_overwrite() {
        let (_dir, store) = store();
        let key = Zeroizing::new(vec![0x42u8; 32]);
        let address = store.import_key(key.clone(), "p2").await.unwrap();
        assert!(store.contains(&address));

        let err = store.import_key(key, "p3").await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(store.accounts().len(), 1);
    }

    #[tokio::test]
    async fn test_sign_digest_roundtrip() {
        let (_dir, store) = store();
        let key = Zeroizing::new(vec![0x42u8; 32]);
        let address = store.import_key(key, "p1").await.unwrap();

        let digest = [0x11u8; 32];
        let (r, s, recid) = store.sign_digest(&address, "p1", digest).await.unwrap();
        assert_eq!(r.len(), 32);
        assert_eq!(s.len(), 32);
        assert!(recid <= 1);

        // 错误口令无法解锁
        assert!(store.sign_digest(&address, "wrong", digest).await.is_err());
    }

    #[tokio::test]
    async fn test_signing_is_deterministic() {
        // RFC6979：同一密钥同一摘要的签名稳定
        let (_dir, store) = store();
        let key = Zeroizing::new(vec![0x42u8; 32]);
        let address = store.import_key(key, "p1").await.unwrap();

        let digest = [0x22u8; 32];
        let a = store.sign_digest(&address, "p1", digest).await.unwrap();
        let b = store.sign_digest(&address, "p1", digest).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_delete_requires_valid_password() {
        let (_dir, store) = store();
        let address = store.new_account("p1").await.unwrap();

        assert!(store.delete(&address, "wrong").await.is_err());
        assert!(store.contains(&address));

        store.delete(&address, "p1").await.unwrap();
        assert!(!store.contains(&address));
        assert!(store.accounts().is_empty());
    }

    #[tokio::test]
    async fn test_update_password_rotates() {
        let (_dir, store) = store();
        let address = store.new_account("old").await.unwrap();
        store.update(&address, "old", "new").await.unwrap();

        let digest = [0x33u8; 32];
        assert!(store.sign_digest(&address, "old", digest).await.is_err());
        assert!(store.sign_digest(&address, "new", digest).await.is_ok());
    }

    #[tokio::test]
    async fn test_export_key_reencrypts() {
        let (_dir, store) = store();
        let key = Zeroizing::new(vec![0x42u8; 32]);
        let address = store.import_key(key, "p1").await.unwrap();

        let exported = store.export_key(&address, "p1", "backup-pw").await.unwrap();
        assert_eq!(exported.version, 3);
        let secret = keystore_file::decrypt_key_file(&exported, "backup-pw").unwrap();
        assert_eq!(&*secret, &[0x42u8; 32]);
    }

    #[test]
    fn test_address_for_known_key() {
        // 私钥0x42..42对应的地址可重复推导
        let a = KeypairStore::address_for(&[0x42u8; 32]).unwrap();
        let b = KeypairStore::address_for(&[0x42u8; 32]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 42);
        assert!(KeypairStore::address_for(&[0u8; 32]).is_err()); // 零私钥非法
    }
}
