//! 领域模型

pub mod account;
pub mod balance;
pub mod transaction;
pub mod transfer;

pub use account::Account;
pub use balance::Balance;
pub use transaction::{SentTransaction, SignTransactionRequest, TransactionSpeed};
pub use transfer::{TransferDirection, TransferRecord};
