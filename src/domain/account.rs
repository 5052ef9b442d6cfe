//! 账户领域模型

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// 钱包账户
///
/// `address` 唯一标识账户；`id` 为远端服务签发的不透明标识，
/// 仅托管型账户持有，本地裸私钥账户恒为空串。
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: String,
    #[serde(default)]
    pub id: String,
}

impl Account {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            id: String::new(),
        }
    }

    pub fn with_id(address: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            id: id.into(),
        }
    }
}

// 相等性仅由地址定义
impl PartialEq for Account {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Hash for Account {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}
