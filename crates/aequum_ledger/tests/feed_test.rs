//! Activity feed: merged ordering, original display amounts, and the
//! recent/older partition after a clearing settlement.

mod common;

use aequum_ledger::{Currency, FeedItem, SettlementDirection};
use common::{date, expense, ledger, onboard};

#[test]
fn settled_history_moves_behind_the_clearing_settlement() {
    let mut ledger = ledger();
    let (user, me) = onboard(&mut ledger, "Avery", Currency::USD);
    let blake = ledger.add_friend(&user.id, "Blake", None, None).expect("add_friend");

    // transactions on day 1, 3 and 5, all cleared by one settlement, then a
    // fresh unsettled expense on day 8
    for (day, amount) in [(1, 10.0), (3, 20.0), (5, 15.0)] {
        ledger
            .create_transaction(expense(
                &user.id,
                &me.id,
                &format!("Day {}", day),
                amount,
                Currency::USD,
                date(2026, 7, day),
                &[(&blake.id, amount)],
            ))
            .expect("create_transaction");
    }
    ledger
        .apply_settlement(
            &user.id,
            &blake.id,
            45.0,
            Currency::USD,
            SettlementDirection::FromFriend,
            None,
        )
        .expect("apply_settlement");
    ledger
        .create_transaction(expense(
            &user.id,
            &me.id,
            "Day 8",
            40.0,
            Currency::USD,
            date(2026, 7, 8),
            &[(&blake.id, 40.0)],
        ))
        .expect("create_transaction");

    let feed = ledger.activity_feed(&user.id, &blake.id).expect("activity_feed");
    assert_eq!(feed.items.len(), 5);

    // only the day-8 expense is recent; the settlement and everything it
    // cleared is history
    assert_eq!(feed.recent_len, 1);
    match &feed.recent()[0] {
        FeedItem::Transaction { title, fully_settled, .. } => {
            assert_eq!(title, "Day 8");
            assert!(!fully_settled);
        }
        other => panic!("expected a transaction item, got {:?}", other),
    }
    assert!(matches!(feed.older()[0], FeedItem::Settlement { .. }));
    assert_eq!(feed.older().len(), 4);
}

#[test]
fn history_shows_original_amounts_not_remainders() {
    let mut ledger = ledger();
    let (user, me) = onboard(&mut ledger, "Avery", Currency::USD);
    let blake = ledger.add_friend(&user.id, "Blake", None, None).expect("add_friend");

    ledger
        .create_transaction(expense(
            &user.id,
            &me.id,
            "Lunch",
            24.0,
            Currency::USD,
            date(2026, 8, 1),
            &[(&me.id, 12.0), (&blake.id, 12.0)],
        ))
        .expect("create_transaction");
    ledger
        .apply_settlement(
            &user.id,
            &blake.id,
            5.0,
            Currency::USD,
            SettlementDirection::FromFriend,
            None,
        )
        .expect("apply_settlement");

    let feed = ledger.activity_feed(&user.id, &blake.id).expect("activity_feed");
    let txn_item = feed
        .items
        .iter()
        .find_map(|item| match item {
            FeedItem::Transaction { amount, payer_is_self, .. } => Some((*amount, *payer_is_self)),
            _ => None,
        })
        .expect("transaction item");
    // the friend's split was 12.00 and stays 12.00 after partial settlement
    assert_eq!(txn_item, (12.0, true));
}

#[test]
fn without_a_clearing_settlement_everything_is_recent() {
    let mut ledger = ledger();
    let (user, me) = onboard(&mut ledger, "Avery", Currency::USD);
    let blake = ledger.add_friend(&user.id, "Blake", None, None).expect("add_friend");

    for (day, amount) in [(1, 10.0), (2, 20.0)] {
        ledger
            .create_transaction(expense(
                &user.id,
                &me.id,
                "Expense",
                amount,
                Currency::USD,
                date(2026, 9, day),
                &[(&blake.id, amount)],
            ))
            .expect("create_transaction");
    }
    // partial settlement leaves the day-1 debt open
    ledger
        .apply_settlement(
            &user.id,
            &blake.id,
            5.0,
            Currency::USD,
            SettlementDirection::FromFriend,
            None,
        )
        .expect("apply_settlement");

    let feed = ledger.activity_feed(&user.id, &blake.id).expect("activity_feed");
    assert_eq!(feed.recent_len, feed.items.len());
    assert!(feed.older().is_empty());
}

#[test]
fn feed_is_ordered_most_recent_first_and_recomputable() {
    let mut ledger = ledger();
    let (user, me) = onboard(&mut ledger, "Avery", Currency::USD);
    let blake = ledger.add_friend(&user.id, "Blake", None, None).expect("add_friend");

    for (day, amount) in [(2, 10.0), (4, 20.0)] {
        ledger
            .create_transaction(expense(
                &user.id,
                &me.id,
                "Expense",
                amount,
                Currency::USD,
                date(2026, 10, day),
                &[(&blake.id, amount)],
            ))
            .expect("create_transaction");
    }
    ledger
        .apply_settlement(
            &user.id,
            &blake.id,
            30.0,
            Currency::USD,
            SettlementDirection::FromFriend,
            None,
        )
        .expect("apply_settlement");

    let feed = ledger.activity_feed(&user.id, &blake.id).expect("activity_feed");
    let timestamps: Vec<_> = feed.items.iter().map(|i| i.timestamp()).collect();
    let mut sorted = timestamps.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(timestamps, sorted);

    // read-only and derived: a second computation is identical
    let again = ledger.activity_feed(&user.id, &blake.id).expect("activity_feed");
    assert_eq!(feed, again);
}
