//! 余额领域模型

use serde::{Deserialize, Serialize};

/// 账户余额（`/getBalance` 的 `data` 结构）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    #[serde(default)]
    pub balance: u64,
    #[serde(default)]
    pub unlocked_balance: u64,
}

impl Balance {
    pub fn new(balance: u64, unlocked_balance: u64) -> Self {
        Self {
            balance,
            unlocked_balance,
        }
    }

    /// 零余额判断只看balance，不看unlocked_balance
    pub fn is_zero(&self) -> bool {
        self.balance == 0
    }

    /// 可用余额
    pub fn available(&self) -> u64 {
        self.unlocked_balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_zero_uses_balance_only() {
        assert!(Balance::new(0, 400).is_zero());
        assert!(!Balance::new(500, 0).is_zero());
    }

    #[test]
    fn test_deserialize_with_missing_fields_defaults_to_zero() {
        let balance: Balance = serde_json::from_str("{}").unwrap();
        assert_eq!(balance, Balance::new(0, 0));
    }
}
