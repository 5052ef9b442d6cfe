//! Version-3 JSON密钥文件
//!
//! 可移植的加密私钥表示：PBKDF2-HMAC-SHA256派生，AES-128-CTR
//! 流加密，keccak256消息认证。结构全部类型化，无动态map。

use aes::cipher::{KeyIvInit, StreamCipher};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::{error::KeystoreError, infrastructure::kdf};

pub const VERSION: u32 = 3;
pub const CIPHER_AES_128_CTR: &str = "aes-128-ctr";
pub const KDF_PBKDF2: &str = "pbkdf2";
pub const PRF_HMAC_SHA256: &str = "hmac-sha256";

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

/// 加密密钥文件（version-3）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedKeyFile {
    pub version: u32,
    pub crypto: CryptoParams,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoParams {
    pub cipher: String,
    /// hex编码密文
    pub ciphertext: String,
    pub cipherparams: CipherParams,
    pub kdf: String,
    pub kdfparams: KdfParams,
    /// hex编码keccak256认证码
    pub mac: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CipherParams {
    /// hex编码IV
    pub iv: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KdfParams {
    pub prf: String,
    /// 迭代次数
    pub c: u32,
    /// hex编码盐值
    pub salt: String,
    pub dklen: u32,
}

/// mac = keccak256(derivedKey[16..32] || ciphertext)
fn compute_mac(derived_key: &[u8], ciphertext: &[u8]) -> Vec<u8> {
    let mut hasher = Keccak256::new();
    hasher.update(&derived_key[16..32]);
    hasher.update(ciphertext);
    hasher.finalize().to_vec()
}

/// 加密密钥材料为version-3文件
///
/// 盐值与IV每次加密都从OsRng取新值，重用即泄密。
pub fn encrypt_key_material(
    plaintext: &[u8],
    passphrase: &str,
    iterations: u32,
) -> Result<EncryptedKeyFile> {
    let salt = kdf::random_salt();
    let derived = kdf::derive_key(passphrase.as_bytes(), &salt, iterations)?;
    let iv = kdf::random_iv();

    let mut ciphertext = plaintext.to_vec();
    let mut cipher = Aes128Ctr::new_from_slices(&derived[..16], &iv)
        .map_err(|_| anyhow!("invalid aes-128-ctr key/iv length"))?;
    cipher.apply_keystream(&mut ciphertext);

    let mac = compute_mac(&derived, &ciphertext);

    Ok(EncryptedKeyFile {
        version: VERSION,
        crypto: CryptoParams {
            cipher: CIPHER_AES_128_CTR.to_string(),
            ciphertext: hex::encode(&ciphertext),
            cipherparams: CipherParams {
                iv: hex::encode(&iv),
            },
            kdf: KDF_PBKDF2.to_string(),
            kdfparams: KdfParams {
                prf: PRF_HMAC_SHA256.to_string(),
                c: iterations,
                salt: hex::encode(&salt),
                dklen: kdf::DERIVED_KEY_LENGTH as u32,
            },
            mac: hex::encode(&mac),
        },
        id: String::new(),
    })
}

/// 解密version-3文件，返回密钥材料
///
/// MAC校验失败或口令错误一律返回FailedToDecryptKey，不区分原因。
pub fn decrypt_key_file(
    file: &EncryptedKeyFile,
    passphrase: &str,
) -> Result<Zeroizing<Vec<u8>>, KeystoreError> {
    if file.version != VERSION
        || file.crypto.cipher != CIPHER_AES_128_CTR
        || file.crypto.kdf != KDF_PBKDF2
    {
        return Err(KeystoreError::FailedToDecryptKey);
    }

    let salt = hex::decode(&file.crypto.kdfparams.salt)
        .map_err(|_| KeystoreError::FailedToDecryptKey)?;
    let iv =
        hex::decode(&file.crypto.cipherparams.iv).map_err(|_| KeystoreError::FailedToDecryptKey)?;
    let ciphertext =
        hex::decode(&file.crypto.ciphertext).map_err(|_| KeystoreError::FailedToDecryptKey)?;

    let derived = kdf::derive_key(passphrase.as_bytes(), &salt, file.crypto.kdfparams.c)
        .map_err(|_| KeystoreError::FailedToDecryptKey)?;

    // 常数时间比较MAC
    let expected_mac = compute_mac(&derived, &ciphertext);
    let stored_mac =
        hex::decode(&file.crypto.mac).map_err(|_| KeystoreError::FailedToDecryptKey)?;
    if !bool::from(expected_mac.ct_eq(&stored_mac)) {
        return Err(KeystoreError::FailedToDecryptKey);
    }

    let mut plaintext = Zeroizing::new(ciphertext);
    let mut cipher = Aes128Ctr::new_from_slices(&derived[..16], &iv)
        .map_err(|_| KeystoreError::FailedToDecryptKey)?;
    cipher.apply_keystream(&mut plaintext);

    Ok(plaintext)
}
