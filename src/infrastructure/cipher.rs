//! 字符串对称加解密模块
//! AES-CBC/PKCS#7，输出base64；key与iv直接使用调用方提供的
//! UTF-8字节，不经KDF再派生（密钥文件路径见keystore_file）。

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine;

use crate::error::CipherError;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes192CbcEnc = cbc::Encryptor<aes::Aes192>;
type Aes192CbcDec = cbc::Decryptor<aes::Aes192>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// 加密字符串
///
/// key长度决定AES变体（16/24/32字节），iv固定16字节。
pub fn encrypt(plaintext: &str, key: &str, iv: &str) -> Result<String, CipherError> {
    let key_bytes = key.as_bytes();
    let iv_bytes = iv.as_bytes();

    let ciphertext = match key_bytes.len() {
        16 => Aes128CbcEnc::new_from_slices(key_bytes, iv_bytes)
            .map_err(|_| CipherError::InvalidKeyLength)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes()),
        24 => Aes192CbcEnc::new_from_slices(key_bytes, iv_bytes)
            .map_err(|_| CipherError::InvalidKeyLength)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes()),
        32 => Aes256CbcEnc::new_from_slices(key_bytes, iv_bytes)
            .map_err(|_| CipherError::InvalidKeyLength)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes()),
        _ => return Err(CipherError::InvalidKeyLength),
    };

    Ok(base64::engine::general_purpose::STANDARD.encode(ciphertext))
}

/// 解密base64密文
pub fn decrypt(ciphertext_b64: &str, key: &str, iv: &str) -> Result<String, CipherError> {
    let data = base64::engine::general_purpose::STANDARD.decode(ciphertext_b64)?;
    let key_bytes = key.as_bytes();
    let iv_bytes = iv.as_bytes();

    let plaintext = match key_bytes.len() {
        16 => Aes128CbcDec::new_from_slices(key_bytes, iv_bytes)
            .map_err(|_| CipherError::InvalidKeyLength)?
            .decrypt_padded_vec_mut::<Pkcs7>(&data)
            .map_err(|_| CipherError::InvalidPadding)?,
        24 => Aes192CbcDec::new_from_slices(key_bytes, iv_bytes)
            .map_err(|_| CipherError::InvalidKeyLength)?
            .decrypt_padded_vec_mut::<Pkcs7>(&data)
            .map_err(|_| CipherError::InvalidPadding)?,
        32 => Aes256CbcDec::new_from_slices(key_bytes, iv_bytes)
            .map_err(|_| CipherError::InvalidKeyLength)?
            .decrypt_padded_vec_mut::<Pkcs7>(&data)
            .map_err(|_| CipherError::InvalidPadding)?,
        _ => return Err(CipherError::InvalidKeyLength),
    };

    String::from_utf8(plaintext).map_err(|_| CipherError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0123456789abcdef"; // 16 bytes
    const IV: &str = "gqLOHUioQ0QjhuvI"; // 16 bytes

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let plaintext = "string to encrypt";
        let encrypted = encrypt(plaintext, KEY, IV).unwrap();
        assert_ne!(encrypted, plaintext);

        let decrypted = decrypt(&encrypted, KEY, IV).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_roundtrip_all_key_sizes() {
        for key in [
            "0123456789abcdef",
            "0123456789abcdef01234567",
            "0123456789abcdef0123456789abcdef",
        ] {
            let encrypted = encrypt("секрет-数据-data", key, IV).unwrap();
            assert_eq!(decrypt(&encrypted, key, IV).unwrap(), "секрет-数据-data");
        }
    }

    #[test]
    fn test_invalid_key_length_rejected() {
        assert!(matches!(
            encrypt("x", "short", IV),
            Err(CipherError::InvalidKeyLength)
        ));
        assert!(matches!(
            encrypt("x", KEY, "bad-iv"),
            Err(CipherError::InvalidKeyLength)
        ));
    }

    #[test]
    fn test_invalid_base64_rejected() {
        assert!(matches!(
            decrypt("not@base64!!", KEY, IV),
            Err(CipherError::InvalidBase64(_))
        ));
    }

    #[test]
    fn test_wrong_key_fails_padding_check() {
        let encrypted = encrypt("plaintext", KEY, IV).unwrap();
        let result = decrypt(&encrypted, "fedcba9876543210", IV);
        // 错误密钥几乎必然产生非法padding
        assert!(result.is_err());
    }
}
