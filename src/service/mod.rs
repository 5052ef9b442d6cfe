//! 服务层：账户注册表、密钥库、交易签名与远端客户端

pub mod backup;
pub mod halyk_client;
pub mod node_client;
pub mod registry;
pub mod signer;
pub mod vault;
