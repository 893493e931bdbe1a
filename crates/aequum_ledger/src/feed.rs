//! Activity feed for one friend pair: transactions and settlements merged
//! into a single reverse-chronological sequence, partitioned into "recent"
//! and "older" at the last settlement that left everything before it cleared.
//! Read-only and recomputable on demand.

use chrono::{DateTime, NaiveDate, Utc};

use crate::currency::Currency;
use crate::ids::{SettlementId, TransactionId};
use crate::models::{Settlement, SettlementDirection, Transaction};

#[derive(Clone, Debug, PartialEq)]
pub enum FeedItem {
    Transaction {
        id: TransactionId,
        title: String,
        category: String,
        /// The relevant split's original amount — history shows what was
        /// owed, not the moving remainder.
        amount: f64,
        currency: Currency,
        payer_is_self: bool,
        occurred_on: NaiveDate,
        timestamp: DateTime<Utc>,
        fully_settled: bool,
    },
    Settlement {
        id: SettlementId,
        amount: f64,
        currency: Currency,
        direction: SettlementDirection,
        note: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl FeedItem {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            FeedItem::Transaction { timestamp, .. } => *timestamp,
            FeedItem::Settlement { timestamp, .. } => *timestamp,
        }
    }

    fn is_unsettled_transaction(&self) -> bool {
        matches!(self, FeedItem::Transaction { fully_settled: false, .. })
    }
}

/// One transaction's contribution to a friend-pair feed, pre-joined with its
/// relevant split by the caller.
#[derive(Clone, Debug)]
pub(crate) struct TransactionEntry {
    pub txn: Transaction,
    pub display_amount: f64,
    pub payer_is_self: bool,
    /// Remaining amount within tolerance of zero on both sides.
    pub fully_settled: bool,
}

/// Merged feed, most recent first. `items[..recent_len]` is the "recent"
/// partition; the rest is history.
#[derive(Clone, Debug, PartialEq)]
pub struct ActivityFeed {
    pub items: Vec<FeedItem>,
    pub recent_len: usize,
}

impl ActivityFeed {
    pub fn recent(&self) -> &[FeedItem] {
        &self.items[..self.recent_len]
    }

    pub fn older(&self) -> &[FeedItem] {
        &self.items[self.recent_len..]
    }
}

pub(crate) fn merged_feed(
    entries: Vec<TransactionEntry>,
    settlements: Vec<Settlement>,
) -> ActivityFeed {
    let mut items: Vec<FeedItem> = Vec::with_capacity(entries.len() + settlements.len());
    for entry in entries {
        items.push(FeedItem::Transaction {
            id: entry.txn.id,
            title: entry.txn.title,
            category: entry.txn.category,
            amount: entry.display_amount,
            currency: entry.txn.currency,
            payer_is_self: entry.payer_is_self,
            occurred_on: entry.txn.occurred_on,
            timestamp: entry.txn.created_at,
            fully_settled: entry.fully_settled,
        });
    }
    for settlement in settlements {
        items.push(FeedItem::Settlement {
            id: settlement.id,
            amount: settlement.amount,
            currency: settlement.currency,
            direction: settlement.direction,
            note: settlement.note,
            timestamp: settlement.created_at,
        });
    }
    // stable: ties keep insertion order
    items.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));

    let recent_len = partition_index(&items);
    ActivityFeed { items, recent_len }
}

/// Index of the most recent settlement after which every older
/// transaction-derived item is fully settled; items from that index on are
/// "older". Returns `items.len()` (everything recent) when no settlement
/// qualifies.
fn partition_index(items: &[FeedItem]) -> usize {
    // suffix scan: is every transaction item at index >= i settled?
    let mut suffix_settled = vec![true; items.len() + 1];
    for i in (0..items.len()).rev() {
        suffix_settled[i] = suffix_settled[i + 1] && !items[i].is_unsettled_transaction();
    }
    items
        .iter()
        .enumerate()
        .find(|(i, item)| matches!(item, FeedItem::Settlement { .. }) && suffix_settled[i + 1])
        .map(|(i, _)| i)
        .unwrap_or(items.len())
}
