//! Shared fixtures: in-memory ledger with a static rate table, onboarding
//! helpers and a transaction builder.

#![allow(dead_code)]

use aequum_ledger::{
    Currency, Friend, FriendId, Ledger, NewTransaction, RateTable, SplitMethod, SplitShare,
    StaticRates, Store, User, UserId,
};
use chrono::NaiveDate;

/// USD-based table matching the rates used throughout the scenarios:
/// 1 USD = 0.92 EUR, 147 JPY.
pub fn usd_rates() -> RateTable {
    RateTable::new(Currency::USD)
        .with_rate(Currency::EUR, 0.92)
        .with_rate(Currency::GBP, 0.79)
        .with_rate(Currency::CAD, 1.36)
        .with_rate(Currency::AUD, 1.52)
        .with_rate(Currency::INR, 83.10)
        .with_rate(Currency::JPY, 147.0)
}

pub fn ledger() -> Ledger {
    let store = Store::in_memory().expect("in-memory store");
    Ledger::new(store, Box::new(StaticRates(usd_rates())))
}

pub fn ledger_with(store: Store) -> Ledger {
    Ledger::new(store, Box::new(StaticRates(usd_rates())))
}

/// Create a user and return it together with their self friend record.
pub fn onboard(ledger: &mut Ledger, name: &str, currency: Currency) -> (User, Friend) {
    let user = ledger
        .create_user(name, None, None, currency)
        .expect("create_user");
    let self_friend = ledger
        .friends_of(&user.id)
        .expect("friends_of")
        .into_iter()
        .find(|f| f.is_self)
        .expect("self friend exists");
    (user, self_friend)
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// Expense paid by `payer` and split per `shares` (friend id, owed amount).
pub fn expense(
    creator: &UserId,
    payer: &FriendId,
    title: &str,
    amount: f64,
    currency: Currency,
    occurred_on: NaiveDate,
    shares: &[(&FriendId, f64)],
) -> NewTransaction {
    NewTransaction {
        creator_id: creator.clone(),
        payer_friend_id: payer.clone(),
        title: title.to_string(),
        category: "dining".to_string(),
        amount,
        currency,
        split_method: SplitMethod::Equal,
        line_items: vec![],
        occurred_on,
        shares: shares
            .iter()
            .map(|(friend_id, amount)| SplitShare {
                friend_id: (*friend_id).clone(),
                amount: *amount,
                percent: None,
            })
            .collect(),
    }
}
