//! Data models for users, friends, transactions, splits and settlements.
//! Dates and timestamps are typed (chrono); IDs use the newtypes in ids.rs.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::currency::{Currency, RateTable, SETTLED_EPSILON};
use crate::ids::{FriendId, SettlementId, SplitId, TransactionId, UserId};

/// One record per authenticated person. Created on first login; never
/// hard-deleted in normal flow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub default_currency: Currency,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-owner contact record: another real user (linked), a placeholder
/// (dummy), or the owner's own self-reference. Exactly one self friend per
/// owner; dummy -> linked promotion is never reversed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Friend {
    pub id: FriendId,
    pub owner_id: UserId,
    pub linked_user_id: Option<UserId>,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_dummy: bool,
    pub is_self: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How a transaction's total was divided. The ledger preserves the tag but
/// never interprets it; per-participant amounts are already resolved into
/// splits by the time records reach it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMethod {
    Equal,
    Unequal,
    ByShares,
    ByItem,
}

impl SplitMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitMethod::Equal => "equal",
            SplitMethod::Unequal => "unequal",
            SplitMethod::ByShares => "by_shares",
            SplitMethod::ByItem => "by_item",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "equal" => Some(SplitMethod::Equal),
            "unequal" => Some(SplitMethod::Unequal),
            "by_shares" => Some(SplitMethod::ByShares),
            "by_item" => Some(SplitMethod::ByItem),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub amount: f64,
}

/// One shared expense. Immutable after creation except for deletion, which
/// cascades to its splits. The rate snapshot is frozen at creation so
/// historical amounts stay stable under later rate changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub creator_id: UserId,
    pub payer_friend_id: FriendId,
    pub title: String,
    pub category: String,
    pub amount: f64,
    pub currency: Currency,
    pub split_method: SplitMethod,
    pub line_items: Vec<LineItem>,
    pub rate_snapshot: RateTable,
    pub occurred_on: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// One participant's share of one transaction. Settlement progress is
/// versioned: newer records carry a running `settled_amount`; records written
/// under the older schema carry only the `is_settled` flag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub id: SplitId,
    pub transaction_id: TransactionId,
    pub friend_id: FriendId,
    pub amount: f64,
    #[serde(default)]
    pub percent: Option<f64>,
    /// Absent on records written under the older boolean-only schema.
    #[serde(default)]
    pub settled_amount: Option<f64>,
    #[serde(default)]
    pub is_settled: bool,
    #[serde(default)]
    pub settled_at: Option<DateTime<Utc>>,
}

impl Split {
    /// Owed amount minus settlement progress. Fallback rule for legacy
    /// records without `settled_amount`: settled means 0, unsettled means
    /// the full amount.
    pub fn remaining(&self) -> f64 {
        match self.settled_amount {
            Some(s) => (self.amount - s).max(0.0),
            None if self.is_settled => 0.0,
            None => self.amount,
        }
    }

    /// True when the remaining amount is within tolerance of zero.
    pub fn fully_settled(&self) -> bool {
        self.remaining() <= SETTLED_EPSILON
    }
}

/// Who is paying whom. Closed set; unknown strings are rejected, not
/// defaulted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementDirection {
    /// The user pays the friend.
    ToFriend,
    /// The friend pays the user back.
    FromFriend,
}

impl SettlementDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementDirection::ToFriend => "to_friend",
            SettlementDirection::FromFriend => "from_friend",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "to_friend" => Some(SettlementDirection::ToFriend),
            "from_friend" => Some(SettlementDirection::FromFriend),
            _ => None,
        }
    }
}

/// How much of one split a settlement cleared.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitAllocation {
    pub split_id: SplitId,
    pub amount_applied: f64,
    pub fully_settled: bool,
}

/// Audit record of one payment event between the user and one friend.
/// Insert-only; never mutated or deleted in normal flow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: SettlementId,
    pub creator_id: UserId,
    pub friend_id: FriendId,
    pub amount: f64,
    pub currency: Currency,
    pub direction: SettlementDirection,
    pub note: Option<String>,
    /// Aggregate outstanding balance immediately before this payment, for
    /// "paid $X of $Y owed" displays.
    pub balance_before: Option<f64>,
    pub rate_snapshot: Option<RateTable>,
    pub allocations: Vec<SplitAllocation>,
    pub created_at: DateTime<Utc>,
}
