//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// 应用配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub halyk: HalykConfig,
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub keystore: KeystoreConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 远端钱包服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HalykConfig {
    pub base_url: String,
}

/// 节点RPC配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub rpc_url: String,
    pub chain_id: u64,
}

/// 本地密钥库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeystoreConfig {
    /// 密钥文件目录（每账户一个文件）
    pub keydir: String,
    /// PBKDF2迭代次数
    pub kdf_iterations: u32,
}

/// 交易所合约配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// 交易所合约地址
    pub contract: String,
    /// 交易所原生代币地址（源资产等于它时无需approve）
    pub token_address: String,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
    pub enable_file_logging: bool,
    pub log_file_path: Option<String>,
}

impl Default for HalykConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:18082".to_string(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            chain_id: 1,
        }
    }
}

impl Default for KeystoreConfig {
    fn default() -> Self {
        Self {
            keydir: "./keystore".to_string(),
            kdf_iterations: crate::infrastructure::kdf::DEFAULT_ITERATIONS,
        }
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            contract: String::new(),
            token_address: String::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            enable_file_logging: false,
            log_file_path: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            halyk: HalykConfig::default(),
            node: NodeConfig::default(),
            keystore: KeystoreConfig::default(),
            exchange: ExchangeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = Config::default();

        if let Ok(url) = std::env::var("HALYK_BASE_URL") {
            config.halyk.base_url = url;
        }
        if let Ok(url) = std::env::var("NODE_RPC_URL") {
            config.node.rpc_url = url;
        }
        if let Ok(chain_id) = std::env::var("CHAIN_ID") {
            if let Ok(parsed) = chain_id.parse() {
                config.node.chain_id = parsed;
            }
        }
        if let Ok(dir) = std::env::var("KEYSTORE_DIR") {
            config.keystore.keydir = dir;
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }

        config
    }

    /// 从环境变量和可选配置文件加载（文件值优先于默认值，环境变量优先于文件）
    pub fn from_env_and_file(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(p) if Path::new(p).exists() => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("failed to read config file: {}", p))?;
                toml::from_str(&content)
                    .with_context(|| format!("failed to parse config file: {}", p))?
            }
            _ => Config::default(),
        };

        // 环境变量覆盖
        let env_config = Config::from_env();
        if std::env::var("HALYK_BASE_URL").is_ok() {
            config.halyk.base_url = env_config.halyk.base_url;
        }
        if std::env::var("NODE_RPC_URL").is_ok() {
            config.node.rpc_url = env_config.node.rpc_url;
        }
        if std::env::var("CHAIN_ID").is_ok() {
            config.node.chain_id = env_config.node.chain_id;
        }
        if std::env::var("KEYSTORE_DIR").is_ok() {
            config.keystore.keydir = env_config.keystore.keydir;
        }
        if std::env::var("LOG_LEVEL").is_ok() {
            config.logging.level = env_config.logging.level;
        }

        Ok(config)
    }
}
