//! Operation layer: onboarding, friends, transactions, balances, settlement.
//! The store and the rate provider are explicit dependencies so every
//! operation is testable with fakes.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};

use crate::balance::{aggregate, BalanceSummary};
use crate::currency::{convert, Currency, SETTLED_EPSILON};
use crate::error::{LedgerError, Result};
use crate::feed::{merged_feed, ActivityFeed, TransactionEntry};
use crate::ids::{FriendId, SettlementId, SplitId, TransactionId, UserId};
use crate::models::{
    Friend, LineItem, Settlement, SettlementDirection, Split, SplitMethod, Transaction, User,
};
use crate::rates::RateProvider;
use crate::settlement::{plan_allocation, Candidate, SettlementOutcome};
use crate::storage::Store;

/// One participant's resolved share of a new transaction. Amounts are
/// already divided per the split method; the ledger only validates that they
/// add up.
#[derive(Clone, Debug)]
pub struct SplitShare {
    pub friend_id: FriendId,
    pub amount: f64,
    pub percent: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct NewTransaction {
    pub creator_id: UserId,
    pub payer_friend_id: FriendId,
    pub title: String,
    pub category: String,
    pub amount: f64,
    pub currency: Currency,
    pub split_method: SplitMethod,
    pub line_items: Vec<LineItem>,
    pub occurred_on: NaiveDate,
    pub shares: Vec<SplitShare>,
}

pub struct Ledger {
    store: Store,
    rates: Box<dyn RateProvider>,
}

impl Ledger {
    pub fn new(store: Store, rates: Box<dyn RateProvider>) -> Self {
        Ledger { store, rates }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    // --- Users & friends ---

    /// Create a user together with their self friend (exactly one per owner,
    /// created in the same atomic write).
    pub fn create_user(
        &mut self,
        name: impl Into<String>,
        email: Option<String>,
        phone: Option<String>,
        default_currency: Currency,
    ) -> Result<User> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(LedgerError::InvalidInput("user name must not be empty".into()));
        }
        let now = Utc::now();
        let user = User {
            id: UserId::new(),
            name,
            email,
            phone,
            default_currency,
            created_at: now,
            updated_at: now,
        };
        let self_friend = Friend {
            id: FriendId::new(),
            owner_id: user.id.clone(),
            linked_user_id: Some(user.id.clone()),
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            is_dummy: false,
            is_self: true,
            created_at: now,
            updated_at: now,
        };
        self.store.user_create(&user, &self_friend)?;
        tracing::info!(user_id = %user.id, "user created");
        Ok(user)
    }

    pub fn update_user(
        &mut self,
        id: &UserId,
        name: impl Into<String>,
        email: Option<String>,
        phone: Option<String>,
        default_currency: Currency,
    ) -> Result<User> {
        let mut user = self
            .store
            .user_get(id)?
            .ok_or_else(|| LedgerError::not_found("user", id.as_str()))?;
        let name = name.into();
        if name.trim().is_empty() {
            return Err(LedgerError::InvalidInput("user name must not be empty".into()));
        }
        user.name = name;
        user.email = email;
        user.phone = phone;
        user.default_currency = default_currency;
        user.updated_at = Utc::now();
        self.store.user_update(&user)?;
        Ok(user)
    }

    /// Add a placeholder ("dummy") friend for `owner`.
    pub fn add_friend(
        &mut self,
        owner: &UserId,
        name: impl Into<String>,
        email: Option<String>,
        phone: Option<String>,
    ) -> Result<Friend> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(LedgerError::InvalidInput("friend name must not be empty".into()));
        }
        if self.store.user_get(owner)?.is_none() {
            return Err(LedgerError::not_found("user", owner.as_str()));
        }
        let now = Utc::now();
        let friend = Friend {
            id: FriendId::new(),
            owner_id: owner.clone(),
            linked_user_id: None,
            name,
            email,
            phone,
            is_dummy: true,
            is_self: false,
            created_at: now,
            updated_at: now,
        };
        self.store.friend_insert(&friend)?;
        Ok(friend)
    }

    pub fn friends_of(&self, owner: &UserId) -> Result<Vec<Friend>> {
        Ok(self.store.friends_by_owner(owner)?)
    }

    /// Promote a dummy friend to linked. The promotion is never reversed.
    pub fn link_friend(&mut self, friend_id: &FriendId, user_id: &UserId) -> Result<Friend> {
        let friend = self
            .store
            .friend_get(friend_id)?
            .ok_or_else(|| LedgerError::not_found("friend", friend_id.as_str()))?;
        if friend.is_self {
            return Err(LedgerError::InvalidInput("cannot relink a self friend".into()));
        }
        if self.store.user_get(user_id)?.is_none() {
            return Err(LedgerError::not_found("user", user_id.as_str()));
        }
        if !self.store.friend_set_linked_user(friend_id, user_id)? {
            return Err(LedgerError::InvalidInput(
                "friend is already linked to a user".into(),
            ));
        }
        Ok(self
            .store
            .friend_get(friend_id)?
            .ok_or_else(|| LedgerError::not_found("friend", friend_id.as_str()))?)
    }

    /// Delete a friend. Refused for self friends and for friends with split
    /// history.
    pub fn remove_friend(&mut self, friend_id: &FriendId) -> Result<()> {
        let friend = self
            .store
            .friend_get(friend_id)?
            .ok_or_else(|| LedgerError::not_found("friend", friend_id.as_str()))?;
        if friend.is_self {
            return Err(LedgerError::InvalidInput("cannot delete the self friend".into()));
        }
        if self.store.friend_split_count(friend_id)? > 0 {
            return Err(LedgerError::InvalidInput(
                "cannot delete a friend with split history".into(),
            ));
        }
        self.store.friend_delete(friend_id)?;
        Ok(())
    }

    // --- Transactions ---

    /// Record a shared expense with its splits in one atomic write. The rate
    /// snapshot is captured here and frozen for the transaction's lifetime;
    /// the payer's own split is stored fully settled.
    pub fn create_transaction(&mut self, new: NewTransaction) -> Result<Transaction> {
        if !(new.amount.is_finite() && new.amount > 0.0) {
            return Err(LedgerError::InvalidInput(
                "transaction amount must be positive".into(),
            ));
        }
        if new.shares.is_empty() {
            return Err(LedgerError::InvalidInput(
                "transaction needs at least one share".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        let mut share_sum = 0.0;
        for share in &new.shares {
            if !(share.amount.is_finite() && share.amount >= 0.0) {
                return Err(LedgerError::InvalidInput(
                    "share amounts must be non-negative".into(),
                ));
            }
            if !seen.insert(share.friend_id.clone()) {
                return Err(LedgerError::InvalidInput(format!(
                    "duplicate share for friend {}",
                    share.friend_id
                )));
            }
            share_sum += share.amount;
        }
        if (share_sum - new.amount).abs() > SETTLED_EPSILON {
            return Err(LedgerError::InvalidInput(format!(
                "shares sum to {} but the transaction total is {}",
                share_sum, new.amount
            )));
        }

        if self.store.user_get(&new.creator_id)?.is_none() {
            return Err(LedgerError::not_found("user", new.creator_id.as_str()));
        }
        let payer = self
            .store
            .friend_get(&new.payer_friend_id)?
            .ok_or_else(|| LedgerError::not_found("friend", new.payer_friend_id.as_str()))?;
        if payer.owner_id != new.creator_id {
            return Err(LedgerError::InvalidInput(
                "payer is not a friend of the creator".into(),
            ));
        }
        for share in &new.shares {
            let friend = self
                .store
                .friend_get(&share.friend_id)?
                .ok_or_else(|| LedgerError::not_found("friend", share.friend_id.as_str()))?;
            if friend.owner_id != new.creator_id {
                return Err(LedgerError::InvalidInput(format!(
                    "share friend {} is not a friend of the creator",
                    share.friend_id
                )));
            }
        }

        let now = Utc::now();
        let txn = Transaction {
            id: TransactionId::new(),
            creator_id: new.creator_id,
            payer_friend_id: new.payer_friend_id.clone(),
            title: new.title,
            category: new.category,
            amount: new.amount,
            currency: new.currency,
            split_method: new.split_method,
            line_items: new.line_items,
            rate_snapshot: self.rates.current_rates(),
            occurred_on: new.occurred_on,
            created_at: now,
        };
        let splits: Vec<Split> = new
            .shares
            .iter()
            .map(|share| {
                // a payer cannot owe themselves
                let is_payer = share.friend_id == new.payer_friend_id;
                Split {
                    id: SplitId::new(),
                    transaction_id: txn.id.clone(),
                    friend_id: share.friend_id.clone(),
                    amount: share.amount,
                    percent: share.percent,
                    settled_amount: Some(if is_payer { share.amount } else { 0.0 }),
                    is_settled: is_payer,
                    settled_at: is_payer.then_some(now),
                }
            })
            .collect();
        self.store.transaction_create(&txn, &splits)?;
        tracing::info!(transaction_id = %txn.id, amount = txn.amount, "transaction created");
        Ok(txn)
    }

    pub fn delete_transaction(&mut self, id: &TransactionId) -> Result<()> {
        if !self.store.transaction_delete(id)? {
            return Err(LedgerError::not_found("transaction", id.as_str()));
        }
        Ok(())
    }

    // --- Balance ---

    /// Outstanding balance between `user` and one friend, in the user's
    /// default currency. Idempotent and side-effect-free.
    pub fn balance_with(&self, user_id: &UserId, friend_id: &FriendId) -> Result<BalanceSummary> {
        let user = self
            .store
            .user_get(user_id)?
            .ok_or_else(|| LedgerError::not_found("user", user_id.as_str()))?;
        let friend = self.owned_friend(user_id, friend_id)?;
        let Some(self_friend) = self.store.self_friend(user_id)? else {
            // should not occur for a fully onboarded user
            tracing::warn!(user_id = %user_id, "no self friend record, reporting zero balance");
            return Ok(BalanceSummary::zero());
        };

        let friend_splits = self.store.splits_by_friend(&friend.id)?;
        let own_splits = self.store.splits_by_friend(&self_friend.id)?;
        let transactions = self.parents_of(friend_splits.iter().chain(own_splits.iter()))?;

        Ok(aggregate(
            user.default_currency,
            &self_friend.id,
            &friend.id,
            &friend_splits,
            &own_splits,
            &transactions,
        ))
    }

    // --- Settlement ---

    /// Apply a payment between the user and one friend across outstanding
    /// splits, oldest first, and record the audit settlement atomically with
    /// the split updates. Over-payment is reported, never silently dropped.
    pub fn apply_settlement(
        &mut self,
        user_id: &UserId,
        friend_id: &FriendId,
        amount: f64,
        currency: Currency,
        direction: SettlementDirection,
        note: Option<String>,
    ) -> Result<SettlementOutcome> {
        if !(amount.is_finite() && amount > 0.0) {
            return Err(LedgerError::InvalidInput(
                "settlement amount must be positive".into(),
            ));
        }
        if self.store.user_get(user_id)?.is_none() {
            return Err(LedgerError::not_found("user", user_id.as_str()));
        }
        let friend = self.owned_friend(user_id, friend_id)?;
        if friend.is_self {
            return Err(LedgerError::InvalidInput("cannot settle with yourself".into()));
        }
        let self_friend = self
            .store
            .self_friend(user_id)?
            .ok_or_else(|| LedgerError::not_found("self friend", user_id.as_str()))?;

        // from_friend: the friend pays back debts the user fronted;
        // to_friend: the user pays back debts the friend fronted.
        let (debtor, creditor) = match direction {
            SettlementDirection::FromFriend => (&friend, &self_friend),
            SettlementDirection::ToFriend => (&self_friend, &friend),
        };
        let debtor_splits = self.store.splits_by_friend(&debtor.id)?;
        let transactions = self.parents_of(debtor_splits.iter())?;

        let mut candidates = Vec::new();
        let mut newest_snapshot: Option<&Transaction> = None;
        for split in debtor_splits {
            let txn = &transactions[&split.transaction_id];
            if txn.payer_friend_id != creditor.id {
                continue;
            }
            let remaining = split.remaining();
            if remaining <= 0.0 {
                continue;
            }
            let display_remaining =
                convert(remaining, txn.currency, currency, &txn.rate_snapshot).amount;
            if newest_snapshot.map(|t| t.created_at < txn.created_at).unwrap_or(true) {
                newest_snapshot = Some(txn);
            }
            candidates.push(Candidate {
                split,
                occurred_on: txn.occurred_on,
                created_at: txn.created_at,
                display_remaining,
            });
        }

        let rate_snapshot = newest_snapshot.map(|t| t.rate_snapshot.clone());
        let now = Utc::now();
        let plan = plan_allocation(amount, candidates, now);

        let settlement = Settlement {
            id: SettlementId::new(),
            creator_id: user_id.clone(),
            friend_id: friend.id.clone(),
            amount,
            currency,
            direction,
            note,
            balance_before: Some(plan.balance_before),
            rate_snapshot: rate_snapshot.or_else(|| Some(self.rates.current_rates())),
            allocations: plan.allocations.clone(),
            created_at: now,
        };
        self.store.settlement_commit(&settlement, &plan.patches)?;

        let unapplied = amount - plan.amount_applied;
        if unapplied > SETTLED_EPSILON {
            tracing::info!(
                settlement_id = %settlement.id,
                unapplied,
                "settlement exceeded outstanding debt"
            );
        }
        Ok(SettlementOutcome {
            settlement_id: settlement.id,
            amount_requested: amount,
            amount_applied: plan.amount_applied,
            unapplied,
            balance_before: plan.balance_before,
            splits_touched: plan.allocations,
        })
    }

    // --- Activity feed ---

    /// Merged transaction/settlement history for one friend pair, most
    /// recent first, with the recent/older partition. Read-only.
    pub fn activity_feed(&self, user_id: &UserId, friend_id: &FriendId) -> Result<ActivityFeed> {
        if self.store.user_get(user_id)?.is_none() {
            return Err(LedgerError::not_found("user", user_id.as_str()));
        }
        let friend = self.owned_friend(user_id, friend_id)?;
        let Some(self_friend) = self.store.self_friend(user_id)? else {
            tracing::warn!(user_id = %user_id, "no self friend record, reporting empty feed");
            return Ok(merged_feed(Vec::new(), Vec::new()));
        };

        let friend_splits = self.store.splits_by_friend(&friend.id)?;
        let own_splits = self.store.splits_by_friend(&self_friend.id)?;
        let transactions = self.parents_of(friend_splits.iter().chain(own_splits.iter()))?;

        let own_by_txn: HashMap<&TransactionId, &Split> = own_splits
            .iter()
            .map(|s| (&s.transaction_id, s))
            .collect();
        let friend_by_txn: HashMap<&TransactionId, &Split> = friend_splits
            .iter()
            .map(|s| (&s.transaction_id, s))
            .collect();

        let mut entries = Vec::new();
        for (txn_id, txn) in &transactions {
            let (relevant, payer_is_self) = if txn.payer_friend_id == self_friend.id {
                (friend_by_txn.get(txn_id), true)
            } else if txn.payer_friend_id == friend.id {
                (own_by_txn.get(txn_id), false)
            } else {
                continue;
            };
            let Some(relevant) = relevant else { continue };
            let other_side = if payer_is_self {
                own_by_txn.get(txn_id)
            } else {
                friend_by_txn.get(txn_id)
            };
            let fully_settled = relevant.fully_settled()
                && other_side.map(|s| s.fully_settled()).unwrap_or(true);
            entries.push(TransactionEntry {
                txn: (*txn).clone(),
                display_amount: relevant.amount,
                payer_is_self,
                fully_settled,
            });
        }
        // deterministic insertion order for stable timestamp ties
        entries.sort_by(|a, b| a.txn.created_at.cmp(&b.txn.created_at));

        let settlements = self.store.settlements_between(user_id, &friend.id)?;
        Ok(merged_feed(entries, settlements))
    }

    // --- Helpers ---

    fn owned_friend(&self, user_id: &UserId, friend_id: &FriendId) -> Result<Friend> {
        let friend = self
            .store
            .friend_get(friend_id)?
            .ok_or_else(|| LedgerError::not_found("friend", friend_id.as_str()))?;
        if friend.owner_id != *user_id {
            return Err(LedgerError::InvalidInput(format!(
                "friend {} does not belong to user {}",
                friend_id, user_id
            )));
        }
        Ok(friend)
    }

    fn parents_of<'a>(
        &self,
        splits: impl Iterator<Item = &'a Split>,
    ) -> Result<HashMap<TransactionId, Transaction>> {
        let mut transactions = HashMap::new();
        for split in splits {
            if transactions.contains_key(&split.transaction_id) {
                continue;
            }
            let txn = self
                .store
                .transaction_get(&split.transaction_id)?
                .ok_or_else(|| {
                    LedgerError::not_found("transaction", split.transaction_id.as_str())
                })?;
            transactions.insert(split.transaction_id.clone(), txn);
        }
        Ok(transactions)
    }
}
