//! Custody collaborators.
//!
//! External token balances, rate sources, the custody vault and the
//! deposit router. These are deliberately thin: they exist so that the
//! accounting core can be driven end to end, not to model any particular
//! collateral.

pub mod assets;
pub mod rates;
pub mod router;
pub mod vault;

pub use assets::AssetBook;
pub use rates::{AdjustableRate, FixedRate, RateProvider, RateProviderRegistry};
pub use router::{DepositContext, RateConverter, Router, UnderlyingConverter};
pub use vault::{CustodyVault, StrategyRegistry};
