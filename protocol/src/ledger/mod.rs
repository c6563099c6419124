//! Fungible ledgers: the balance core, the Share Ledger and the Vault Share.

pub mod balance;
pub mod share;
pub mod vault_share;

pub use balance::BalanceLedger;
pub use share::ShareLedger;
pub use vault_share::VaultShare;
