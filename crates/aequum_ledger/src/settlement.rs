//! FIFO settlement allocation. Planning is pure; the ledger commits the plan
//! together with its audit record in one atomic store write.

use chrono::{DateTime, NaiveDate, Utc};

use crate::currency::SETTLED_EPSILON;
use crate::ids::SettlementId;
use crate::models::{Split, SplitAllocation};
use crate::storage::SplitPatch;

/// Result of applying a settlement. `amount_applied` can be less than
/// `amount_requested`; the difference is reported, never silently dropped.
#[derive(Clone, Debug, PartialEq)]
pub struct SettlementOutcome {
    pub settlement_id: SettlementId,
    pub amount_requested: f64,
    pub amount_applied: f64,
    pub unapplied: f64,
    /// Sum of outstanding candidate amounts before any mutation, in the
    /// settlement currency, for "paid $X of $Y owed" displays.
    pub balance_before: f64,
    pub splits_touched: Vec<SplitAllocation>,
}

/// One settlement candidate: an outstanding split, its parent transaction's
/// ordering keys, and its remaining amount expressed in the settlement
/// currency (converted through the parent's frozen snapshot).
#[derive(Clone, Debug)]
pub(crate) struct Candidate {
    pub split: Split,
    pub occurred_on: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub display_remaining: f64,
}

impl Candidate {
    /// Candidate for a split whose currency is the settlement currency.
    #[cfg(test)]
    pub(crate) fn same_currency(split: Split, occurred_on: NaiveDate, created_at: DateTime<Utc>) -> Self {
        let display_remaining = split.remaining();
        Candidate { split, occurred_on, created_at, display_remaining }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct AllocationPlan {
    pub balance_before: f64,
    pub amount_applied: f64,
    pub allocations: Vec<SplitAllocation>,
    pub patches: Vec<SplitPatch>,
}

/// Allocate `amount` across the candidates oldest-debt-first.
///
/// Ordering is by the parent transaction's occurrence date, ties broken by
/// creation timestamp. The FIFO order is a policy choice that decides which
/// debts count as paid off on a partial settlement, so it must stay stable
/// across releases for consistent audit trails.
///
/// Allocation amounts are in the settlement currency; split patches scale the
/// applied amount back into the split's own currency, so fully consuming a
/// candidate lands its settled progress exactly on the owed amount.
pub(crate) fn plan_allocation(
    amount: f64,
    mut candidates: Vec<Candidate>,
    now: DateTime<Utc>,
) -> AllocationPlan {
    candidates.retain(|c| c.display_remaining > SETTLED_EPSILON && c.split.remaining() > 0.0);
    candidates.sort_by(|a, b| {
        a.occurred_on
            .cmp(&b.occurred_on)
            .then(a.created_at.cmp(&b.created_at))
    });

    let balance_before: f64 = candidates.iter().map(|c| c.display_remaining).sum();

    let mut left = amount;
    let mut amount_applied = 0.0;
    let mut allocations = Vec::new();
    let mut patches = Vec::new();

    for candidate in &candidates {
        if left <= 0.0 {
            break;
        }
        let applied = left.min(candidate.display_remaining);
        let split_remaining = candidate.split.remaining();
        // scale back into the split's currency; 1.0 when currencies match
        let applied_in_split = applied / candidate.display_remaining * split_remaining;
        let new_remaining = split_remaining - applied_in_split;
        let fully_settled = candidate.display_remaining - applied <= SETTLED_EPSILON;

        left -= applied;
        amount_applied += applied;
        allocations.push(SplitAllocation {
            split_id: candidate.split.id.clone(),
            amount_applied: applied,
            fully_settled,
        });
        patches.push(SplitPatch {
            split_id: candidate.split.id.clone(),
            settled_amount: candidate.split.amount - new_remaining,
            is_settled: fully_settled,
            settled_at: now,
        });
    }

    AllocationPlan {
        balance_before,
        amount_applied,
        allocations,
        patches,
    }
}
