//! Per-friend balance aggregation: a pure function over fetched records.
//! Repeated calls with unchanged records produce identical results.

use std::collections::{BTreeMap, HashMap};

use crate::currency::{convert, Currency, SETTLED_EPSILON};
use crate::ids::{FriendId, TransactionId};
use crate::models::{Split, Transaction};

/// Two-sided outstanding balance between the user and one friend. Totals are
/// in the user's default currency; the breakdown is keyed by original
/// transaction currency and carries signed raw amounts (positive: the friend
/// owes the user).
#[derive(Clone, Debug, PartialEq)]
pub struct BalanceSummary {
    pub friend_owes_user: f64,
    pub user_owes_friend: f64,
    pub net_balance: f64,
    pub per_currency: BTreeMap<Currency, f64>,
}

impl BalanceSummary {
    pub fn zero() -> Self {
        BalanceSummary {
            friend_owes_user: 0.0,
            user_owes_friend: 0.0,
            net_balance: 0.0,
            per_currency: BTreeMap::new(),
        }
    }

    /// Whether anything is outstanding, absorbing conversion drift.
    pub fn has_outstanding(&self) -> bool {
        self.net_balance.abs() > SETTLED_EPSILON
    }
}

/// Aggregate outstanding splits for one (user, friend) pair.
///
/// `friend_splits` are the friend's splits; `own_splits` are the user's self
/// splits. Each split's parent transaction must be present in `transactions`.
/// Amounts convert through the parent's frozen rate snapshot into
/// `display_currency`, never through live rates.
pub(crate) fn aggregate(
    display_currency: Currency,
    self_friend_id: &FriendId,
    friend_id: &FriendId,
    friend_splits: &[Split],
    own_splits: &[Split],
    transactions: &HashMap<TransactionId, Transaction>,
) -> BalanceSummary {
    let mut summary = BalanceSummary::zero();

    for split in friend_splits {
        let remaining = split.remaining();
        if remaining <= SETTLED_EPSILON {
            continue;
        }
        let Some(txn) = transactions.get(&split.transaction_id) else {
            continue;
        };
        if txn.payer_friend_id != *self_friend_id {
            continue;
        }
        let converted = convert(remaining, txn.currency, display_currency, &txn.rate_snapshot);
        summary.friend_owes_user += converted.amount;
        *summary.per_currency.entry(txn.currency).or_insert(0.0) += remaining;
    }

    for split in own_splits {
        let remaining = split.remaining();
        if remaining <= SETTLED_EPSILON {
            continue;
        }
        let Some(txn) = transactions.get(&split.transaction_id) else {
            continue;
        };
        if txn.payer_friend_id != *friend_id {
            continue;
        }
        let converted = convert(remaining, txn.currency, display_currency, &txn.rate_snapshot);
        summary.user_owes_friend += converted.amount;
        *summary.per_currency.entry(txn.currency).or_insert(0.0) -= remaining;
    }

    summary.net_balance = summary.friend_owes_user - summary.user_owes_friend;
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::RateTable;
    use crate::ids::{SplitId, UserId};
    use crate::models::SplitMethod;
    use chrono::{NaiveDate, Utc};

    fn txn(
        id: &TransactionId,
        payer: &FriendId,
        amount: f64,
        currency: Currency,
        rates: RateTable,
    ) -> Transaction {
        Transaction {
            id: id.clone(),
            creator_id: UserId::new(),
            payer_friend_id: payer.clone(),
            title: "t".to_string(),
            category: "other".to_string(),
            amount,
            currency,
            split_method: SplitMethod::Equal,
            line_items: vec![],
            rate_snapshot: rates,
            occurred_on: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            created_at: Utc::now(),
        }
    }

    fn split(txn_id: &TransactionId, friend: &FriendId, amount: f64, settled: f64) -> Split {
        Split {
            id: SplitId::new(),
            transaction_id: txn_id.clone(),
            friend_id: friend.clone(),
            amount,
            percent: None,
            settled_amount: Some(settled),
            is_settled: settled >= amount,
            settled_at: None,
        }
    }

    #[test]
    fn nets_both_sides_and_breaks_down_by_currency() {
        let me = FriendId::new();
        let them = FriendId::new();
        let usd = RateTable::new(Currency::USD).with_rate(Currency::EUR, 0.92);

        let t1 = TransactionId::new();
        let t2 = TransactionId::new();
        let mut transactions = HashMap::new();
        transactions.insert(t1.clone(), txn(&t1, &me, 60.0, Currency::USD, usd.clone()));
        transactions.insert(t2.clone(), txn(&t2, &them, 46.0, Currency::EUR, usd));

        let friend_splits = vec![split(&t1, &them, 30.0, 0.0)];
        let own_splits = vec![split(&t2, &me, 23.0, 0.0)];

        let summary = aggregate(
            Currency::USD,
            &me,
            &them,
            &friend_splits,
            &own_splits,
            &transactions,
        );
        assert!((summary.friend_owes_user - 30.0).abs() < 1e-9);
        assert!((summary.user_owes_friend - 25.0).abs() < 1e-9);
        assert!((summary.net_balance - 5.0).abs() < 1e-9);
        assert_eq!(summary.per_currency.get(&Currency::USD), Some(&30.0));
        assert_eq!(summary.per_currency.get(&Currency::EUR), Some(&-23.0));
    }

    #[test]
    fn settled_and_near_settled_splits_are_ignored() {
        let me = FriendId::new();
        let them = FriendId::new();
        let t1 = TransactionId::new();
        let mut transactions = HashMap::new();
        transactions.insert(
            t1.clone(),
            txn(&t1, &me, 20.0, Currency::USD, RateTable::new(Currency::USD)),
        );

        let friend_splits = vec![
            split(&t1, &them, 10.0, 10.0),
            split(&t1, &them, 10.0, 9.995),
        ];
        let summary = aggregate(Currency::USD, &me, &them, &friend_splits, &[], &transactions);
        assert_eq!(summary.friend_owes_user, 0.0);
        assert!(!summary.has_outstanding());
    }

    #[test]
    fn splits_paid_by_third_parties_do_not_count() {
        let me = FriendId::new();
        let them = FriendId::new();
        let someone_else = FriendId::new();
        let t1 = TransactionId::new();
        let mut transactions = HashMap::new();
        transactions.insert(
            t1.clone(),
            txn(&t1, &someone_else, 20.0, Currency::USD, RateTable::new(Currency::USD)),
        );

        let friend_splits = vec![split(&t1, &them, 10.0, 0.0)];
        let summary = aggregate(Currency::USD, &me, &them, &friend_splits, &[], &transactions);
        assert_eq!(summary, BalanceSummary::zero());
    }
}
