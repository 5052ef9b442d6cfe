//! PBKDF2 密钥派生模块
//! 用于从口令派生密钥文件的加密密钥

use anyhow::{anyhow, Result};
use pbkdf2::pbkdf2_hmac;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use zeroize::Zeroizing;

/// PBKDF2 密钥派生参数
pub const DEFAULT_ITERATIONS: u32 = 2214;
pub const SALT_LENGTH: usize = 32; // 32字节盐值
pub const DERIVED_KEY_LENGTH: usize = 32; // 派生密钥长度，前16字节作AES-128密钥
pub const IV_LENGTH: usize = 16; // AES块大小

/// 从口令和盐值派生密钥
pub fn derive_key(passphrase: &[u8], salt: &[u8], iterations: u32) -> Result<Zeroizing<Vec<u8>>> {
    if salt.len() != SALT_LENGTH {
        return Err(anyhow!("salt must be {} bytes", SALT_LENGTH));
    }
    if iterations == 0 {
        return Err(anyhow!("iteration count must be positive"));
    }

    let mut key = Zeroizing::new(vec![0u8; DERIVED_KEY_LENGTH]);
    pbkdf2_hmac::<Sha256>(passphrase, salt, iterations, &mut key);
    Ok(key)
}

/// 生成随机盐值（每次加密必须是新值）
pub fn random_salt() -> Vec<u8> {
    let mut salt = vec![0u8; SALT_LENGTH];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// 生成随机IV（每次加密必须是新值）
pub fn random_iv() -> Vec<u8> {
    let mut iv = vec![0u8; IV_LENGTH];
    OsRng.fill_bytes(&mut iv);
    iv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_is_deterministic_per_salt() {
        let salt = random_salt();
        let key1 = derive_key(b"passphrase", &salt, DEFAULT_ITERATIONS).unwrap();
        let key2 = derive_key(b"passphrase", &salt, DEFAULT_ITERATIONS).unwrap();
        assert_eq!(*key1, *key2);
        assert_eq!(key1.len(), DERIVED_KEY_LENGTH);

        // 不同口令派生出不同密钥
        let key3 = derive_key(b"other", &salt, DEFAULT_ITERATIONS).unwrap();
        assert_ne!(*key1, *key3);
    }

    #[test]
    fn test_salt_and_iv_are_fresh() {
        assert_ne!(random_salt(), random_salt());
        assert_ne!(random_iv(), random_iv());
        assert_eq!(random_salt().len(), SALT_LENGTH);
        assert_eq!(random_iv().len(), IV_LENGTH);
    }

    #[test]
    fn test_bad_salt_length_rejected() {
        assert!(derive_key(b"p", &[0u8; 16], DEFAULT_ITERATIONS).is_err());
    }
}
