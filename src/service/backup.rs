//! 备份导出
//!
//! 明文导出不透明id到临时目录，供平台分享动作接手。
//! 此路径不加密（导出的是服务端签发的id，不是裸私钥），
//! 与密钥文件导出路径的加密形成有意的不对称。

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::{domain::Account, service::vault::Vault};

pub const BACKUP_FILE_NAME: &str = "walletaccesskey.dat";

/// 写出明文备份文件，返回文件路径
pub fn write_plain_backup(vault: &Vault, account: &Account) -> Result<PathBuf> {
    let value = vault
        .export_plain(account)
        .context("failed to export account id")?;

    let path = std::env::temp_dir().join(BACKUP_FILE_NAME);
    std::fs::write(&path, &value)
        .with_context(|| format!("failed to write backup file: {}", path.display()))?;

    tracing::warn!(
        path = %path.display(),
        "wrote cleartext wallet access id for share hand-off"
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::infrastructure::{
        keypair_store::KeypairStore, secret_store::MemorySecretStore,
    };

    #[test]
    fn test_backup_writes_id_cleartext() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(KeypairStore::new(dir.path().join("keystore"), 2214).unwrap());
        let vault = Vault::new(store, Arc::new(MemorySecretStore::new()));

        let account = Account::with_id("4".repeat(95), "opaque-wallet-id");
        let path = write_plain_backup(&vault, &account).unwrap();

        assert_eq!(path.file_name().unwrap(), BACKUP_FILE_NAME);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "opaque-wallet-id");
        std::fs::remove_file(&path).ok();
    }
}
