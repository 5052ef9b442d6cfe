//! 基础设施层：加密原语、密钥文件、安全存储、日志

pub mod cipher;
pub mod kdf;
pub mod keypair_store;
pub mod keystore_file;
pub mod logging;
pub mod secret_store;
