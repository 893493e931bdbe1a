//! Onboarding, friend lifecycle and transaction creation/deletion rules.

mod common;

use aequum_ledger::{
    Currency, FriendId, LedgerError, LineItem, NewTransaction, SplitMethod, SplitShare,
};
use common::{date, expense, ledger, onboard};

#[test]
fn onboarding_creates_exactly_one_self_friend() {
    let mut ledger = ledger();
    let (user, me) = onboard(&mut ledger, "Avery", Currency::USD);

    assert!(me.is_self);
    assert!(!me.is_dummy);
    assert_eq!(me.linked_user_id.as_ref(), Some(&user.id));

    let self_friends: Vec<_> = ledger
        .friends_of(&user.id)
        .expect("friends_of")
        .into_iter()
        .filter(|f| f.is_self)
        .collect();
    assert_eq!(self_friends.len(), 1);
}

#[test]
fn dummy_friends_promote_once_and_never_revert() {
    let mut ledger = ledger();
    let (avery, _) = onboard(&mut ledger, "Avery", Currency::USD);
    let (blake, _) = onboard(&mut ledger, "Blake", Currency::GBP);

    let placeholder = ledger
        .add_friend(&avery.id, "Blake (pending)", None, None)
        .expect("add_friend");
    assert!(placeholder.is_dummy);
    assert!(placeholder.linked_user_id.is_none());

    let linked = ledger.link_friend(&placeholder.id, &blake.id).expect("link_friend");
    assert!(!linked.is_dummy);
    assert_eq!(linked.linked_user_id.as_ref(), Some(&blake.id));

    // a second link attempt is invalid, not a silent overwrite
    assert!(matches!(
        ledger.link_friend(&placeholder.id, &avery.id),
        Err(LedgerError::InvalidInput(_))
    ));
}

#[test]
fn friends_with_history_or_self_flag_cannot_be_deleted() {
    let mut ledger = ledger();
    let (user, me) = onboard(&mut ledger, "Avery", Currency::USD);
    let blake = ledger.add_friend(&user.id, "Blake", None, None).expect("add_friend");
    let casey = ledger.add_friend(&user.id, "Casey", None, None).expect("add_friend");

    ledger
        .create_transaction(expense(
            &user.id,
            &me.id,
            "Lunch",
            10.0,
            Currency::USD,
            date(2026, 3, 1),
            &[(&blake.id, 10.0)],
        ))
        .expect("create_transaction");

    assert!(matches!(
        ledger.remove_friend(&me.id),
        Err(LedgerError::InvalidInput(_))
    ));
    assert!(matches!(
        ledger.remove_friend(&blake.id),
        Err(LedgerError::InvalidInput(_))
    ));
    // no history: deletion succeeds
    ledger.remove_friend(&casey.id).expect("remove_friend");
    assert!(matches!(
        ledger.remove_friend(&casey.id),
        Err(LedgerError::NotFound { .. })
    ));
}

#[test]
fn transaction_shares_must_cover_the_total() {
    let mut ledger = ledger();
    let (user, me) = onboard(&mut ledger, "Avery", Currency::USD);
    let blake = ledger.add_friend(&user.id, "Blake", None, None).expect("add_friend");

    let mismatched = expense(
        &user.id,
        &me.id,
        "Dinner",
        50.0,
        Currency::USD,
        date(2026, 3, 2),
        &[(&me.id, 20.0), (&blake.id, 20.0)],
    );
    assert!(matches!(
        ledger.create_transaction(mismatched),
        Err(LedgerError::InvalidInput(_))
    ));

    let duplicated = expense(
        &user.id,
        &me.id,
        "Dinner",
        40.0,
        Currency::USD,
        date(2026, 3, 2),
        &[(&blake.id, 20.0), (&blake.id, 20.0)],
    );
    assert!(matches!(
        ledger.create_transaction(duplicated),
        Err(LedgerError::InvalidInput(_))
    ));

    let unknown_payer = expense(
        &user.id,
        &FriendId::new(),
        "Dinner",
        40.0,
        Currency::USD,
        date(2026, 3, 2),
        &[(&blake.id, 40.0)],
    );
    assert!(matches!(
        ledger.create_transaction(unknown_payer),
        Err(LedgerError::NotFound { .. })
    ));

    for bad_total in [0.0, -12.0] {
        let bad = expense(
            &user.id,
            &me.id,
            "Dinner",
            bad_total,
            Currency::USD,
            date(2026, 3, 2),
            &[(&blake.id, bad_total)],
        );
        assert!(matches!(
            ledger.create_transaction(bad),
            Err(LedgerError::InvalidInput(_))
        ));
    }
}

#[test]
fn payer_split_is_settled_at_creation() {
    let mut ledger = ledger();
    let (user, me) = onboard(&mut ledger, "Avery", Currency::USD);
    let blake = ledger.add_friend(&user.id, "Blake", None, None).expect("add_friend");

    let txn = ledger
        .create_transaction(expense(
            &user.id,
            &me.id,
            "Dinner",
            40.0,
            Currency::USD,
            date(2026, 3, 3),
            &[(&me.id, 15.0), (&blake.id, 25.0)],
        ))
        .expect("create_transaction");

    let splits = ledger.store().splits_by_transaction(&txn.id).expect("splits");
    let mine = splits.iter().find(|s| s.friend_id == me.id).expect("payer split");
    let theirs = splits.iter().find(|s| s.friend_id == blake.id).expect("friend split");
    assert!(mine.is_settled);
    assert_eq!(mine.remaining(), 0.0);
    assert!(mine.settled_at.is_some());
    assert!(!theirs.is_settled);
    assert_eq!(theirs.remaining(), 25.0);
}

#[test]
fn split_method_and_line_items_round_trip_untouched() {
    let mut ledger = ledger();
    let (user, me) = onboard(&mut ledger, "Avery", Currency::USD);
    let blake = ledger.add_friend(&user.id, "Blake", None, None).expect("add_friend");

    let txn = ledger
        .create_transaction(NewTransaction {
            creator_id: user.id.clone(),
            payer_friend_id: me.id.clone(),
            title: "Groceries".to_string(),
            category: "cart".to_string(),
            amount: 31.5,
            currency: Currency::CAD,
            split_method: SplitMethod::ByItem,
            line_items: vec![
                LineItem { name: "Milk".to_string(), amount: 4.5 },
                LineItem { name: "Produce".to_string(), amount: 27.0 },
            ],
            occurred_on: date(2026, 3, 4),
            shares: vec![
                SplitShare { friend_id: me.id.clone(), amount: 4.5, percent: None },
                SplitShare { friend_id: blake.id.clone(), amount: 27.0, percent: Some(85.7) },
            ],
        })
        .expect("create_transaction");

    let stored = ledger
        .store()
        .transaction_get(&txn.id)
        .expect("transaction_get")
        .expect("present");
    assert_eq!(stored.split_method, SplitMethod::ByItem);
    assert_eq!(stored.line_items.len(), 2);
    assert_eq!(stored.line_items[0].name, "Milk");
    assert_eq!(stored.currency, Currency::CAD);
    assert_eq!(stored.rate_snapshot, txn.rate_snapshot);
}

#[test]
fn deleting_a_transaction_clears_its_balance() {
    let mut ledger = ledger();
    let (user, me) = onboard(&mut ledger, "Avery", Currency::USD);
    let blake = ledger.add_friend(&user.id, "Blake", None, None).expect("add_friend");

    let txn = ledger
        .create_transaction(expense(
            &user.id,
            &me.id,
            "Lunch",
            18.0,
            Currency::USD,
            date(2026, 3, 5),
            &[(&blake.id, 18.0)],
        ))
        .expect("create_transaction");
    assert!(ledger.balance_with(&user.id, &blake.id).expect("balance").has_outstanding());

    ledger.delete_transaction(&txn.id).expect("delete_transaction");
    let balance = ledger.balance_with(&user.id, &blake.id).expect("balance");
    assert!(!balance.has_outstanding());
    assert!(matches!(
        ledger.delete_transaction(&txn.id),
        Err(LedgerError::NotFound { .. })
    ));
}
