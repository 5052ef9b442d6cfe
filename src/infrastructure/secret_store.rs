//! 安全存储模块
//!
//! 每账户密码与"最近使用账户"指针的本地存储。以注入能力
//! （trait对象）建模而非全局单例，便于测试替身。
//! 底层文件以AES-256-GCM整体加密，密钥取自WALLET_ENC_KEY环境
//! 变量。应用重装导致的存储丢失是已接受的数据丢失模式。

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Mutex,
};

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// 保留键：最近使用账户地址
pub const RECENTLY_USED_ADDRESS_KEY: &str = "recentlyUsedAddress";
/// 保留键：当前不透明id
pub const CURRENT_ID_KEY: &str = "id";

/// 安全存储能力
///
/// 读写同步且仅限本机，不跨进程、不联网同步。
pub trait SecretStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> bool;
    fn delete(&self, key: &str) -> bool;
}

/// 加密密钥（Zeroize保护）
#[derive(Zeroize, ZeroizeOnDrop)]
struct EncryptionKey {
    key: [u8; 32],
}

impl EncryptionKey {
    fn as_slice(&self) -> &[u8] {
        &self.key
    }
}

/// 从环境变量获取存储加密密钥
///
/// 支持64位hex、32字节原文，或>=16字节经SHA-256拉伸。
fn encryption_key_from_env() -> Result<EncryptionKey> {
    let key_str = std::env::var("WALLET_ENC_KEY")
        .map_err(|_| anyhow!("WALLET_ENC_KEY environment variable not set"))?;

    let bytes: Vec<u8> = if key_str.len() == 64 {
        hex::decode(&key_str).map_err(|e| anyhow!("invalid hex key: {}", e))?
    } else if key_str.len() == 32 {
        key_str.as_bytes().to_vec()
    } else if key_str.len() >= 16 {
        let mut hasher = Sha256::new();
        hasher.update(key_str.as_bytes());
        hasher.finalize().to_vec()
    } else {
        return Err(anyhow!("WALLET_ENC_KEY too short (min 16)"));
    };

    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(EncryptionKey { key })
}

/// 加密（nonce + ciphertext）
fn encrypt_blob(data: &[u8], key: &EncryptionKey) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.as_slice())
        .map_err(|e| anyhow!("invalid key: {}", e))?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, data)
        .map_err(|e| anyhow!("encryption failed: {}", e))?;

    let mut result = nonce.to_vec();
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// 解密（前12字节为nonce）
fn decrypt_blob(encrypted: &[u8], key: &EncryptionKey) -> Result<Vec<u8>> {
    if encrypted.len() < 12 {
        return Err(anyhow!("encrypted blob too short"));
    }
    let cipher = Aes256Gcm::new_from_slice(key.as_slice())
        .map_err(|e| anyhow!("invalid key: {}", e))?;
    let nonce = Nonce::from_slice(&encrypted[..12]);
    cipher
        .decrypt(nonce, &encrypted[12..])
        .map_err(|e| anyhow!("decryption failed: {}", e))
}

/// 文件型加密安全存储
pub struct EncryptedFileSecretStore {
    path: PathBuf,
    key: EncryptionKey,
    // 串行化并发写入，防止create与import同时写时丢更新
    entries: Mutex<HashMap<String, String>>,
}

impl EncryptedFileSecretStore {
    /// 打开或新建存储
    ///
    /// 失败（密钥缺失/过短、文件损坏）属于致命初始化错误，
    /// 调用方应在启动期处理。
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let key = encryption_key_from_env()?;

        let entries = if path.exists() {
            let blob = std::fs::read(&path)
                .with_context(|| format!("failed to read secret store: {}", path.display()))?;
            let plaintext = decrypt_blob(&blob, &key).context("failed to unseal secret store")?;
            serde_json::from_slice(&plaintext).context("secret store is corrupted")?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            HashMap::new()
        };

        Ok(Self {
            path,
            key,
            entries: Mutex::new(entries),
        })
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<()> {
        let plaintext = serde_json::to_vec(entries)?;
        let blob = encrypt_blob(&plaintext, &self.key)?;
        // 先写临时文件再rename，避免半写状态
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &blob)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SecretStore for EncryptedFileSecretStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> bool {
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };
        entries.insert(key.to_string(), value.to_string());
        match self.persist(&entries) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = ?e, "failed to persist secret store");
                false
            }
        }
    }

    fn delete(&self, key: &str) -> bool {
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };
        let removed = entries.remove(key).is_some();
        if removed {
            if let Err(e) = self.persist(&entries) {
                tracing::error!(error = ?e, "failed to persist secret store");
                return false;
            }
        }
        removed
    }
}

/// 内存存储（测试替身）
#[derive(Default)]
pub struct MemorySecretStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> bool {
        match self.entries.lock() {
            Ok(mut entries) => {
                entries.insert(key.to_string(), value.to_string());
                true
            }
            Err(_) => false,
        }
    }

    fn delete(&self, key: &str) -> bool {
        match self.entries.lock() {
            Ok(mut entries) => entries.remove(key).is_some(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemorySecretStore::new();
        assert!(store.get("0xabc").is_none());
        assert!(store.set("0xabc", "password1"));
        assert_eq!(store.get("0xabc").as_deref(), Some("password1"));
        assert!(store.delete("0xabc"));
        assert!(store.get("0xabc").is_none());
        assert!(!store.delete("0xabc"));
    }

    #[test]
    fn test_blob_encryption_roundtrip() {
        let key = EncryptionKey { key: [7u8; 32] };
        let blob = encrypt_blob(b"hello", &key).unwrap();
        assert_ne!(&blob[12..], b"hello");
        assert_eq!(decrypt_blob(&blob, &key).unwrap(), b"hello");

        let other = EncryptionKey { key: [8u8; 32] };
        assert!(decrypt_blob(&blob, &other).is_err());
    }

    #[test]
    fn test_file_store_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.bin");
        std::env::set_var("WALLET_ENC_KEY", "unit-test-encryption-key-material");

        {
            let store = EncryptedFileSecretStore::open(&path).unwrap();
            assert!(store.set(RECENTLY_USED_ADDRESS_KEY, "0xabc"));
            assert!(store.set("0xabc", "pw"));
        }
        {
            let store = EncryptedFileSecretStore::open(&path).unwrap();
            assert_eq!(
                store.get(RECENTLY_USED_ADDRESS_KEY).as_deref(),
                Some("0xabc")
            );
            assert_eq!(store.get("0xabc").as_deref(), Some("pw"));
        }

        // 文件内容不含明文
        let raw = std::fs::read(&path).unwrap();
        let raw_str = String::from_utf8_lossy(&raw);
        assert!(!raw_str.contains("0xabc"));
        assert!(!raw_str.contains("pw"));
    }
}
