//! Balance and settlement ledger for shared-expense tracking.
//!
//! The ledger consumes plain records (users, friends, transactions, splits,
//! settlements) from an embedded record store and produces plain summaries:
//! per-friend balances, FIFO settlement outcomes and a merged activity feed.
//! How records reached the store and how results are displayed is somebody
//! else's problem.

mod balance;
mod currency;
mod error;
mod feed;
mod ids;
mod ledger;
mod models;
mod rates;
mod settlement;
mod storage;

pub use balance::BalanceSummary;
pub use currency::{convert, Converted, Currency, RateTable, SETTLED_EPSILON};
pub use error::{LedgerError, Result};
pub use feed::{ActivityFeed, FeedItem};
pub use ids::{FriendId, SettlementId, SplitId, TransactionId, UserId};
pub use ledger::{Ledger, NewTransaction, SplitShare};
pub use models::{
    Friend, LineItem, Settlement, SettlementDirection, Split, SplitAllocation, SplitMethod,
    Transaction, User,
};
pub use rates::{CachedRateProvider, RateProvider, RateProviderConfig, StaticRates, FALLBACK_RATES};
pub use settlement::SettlementOutcome;
pub use storage::{SplitPatch, Store};
