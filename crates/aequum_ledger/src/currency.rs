//! Supported currencies and conversion against a base-relative rate table.
//! The UI passes the chosen code (e.g. "EUR"); rates are stored per
//! transaction as a frozen snapshot and never refreshed retroactively.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Remainders below this are treated as fully settled, absorbing
/// floating-point drift from repeated conversions.
pub const SETTLED_EPSILON: f64 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
    INR,
    JPY,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::CAD => "CAD",
            Currency::AUD => "AUD",
            Currency::INR => "INR",
            Currency::JPY => "JPY",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "USD" => Some(Currency::USD),
            "EUR" => Some(Currency::EUR),
            "GBP" => Some(Currency::GBP),
            "CAD" => Some(Currency::CAD),
            "AUD" => Some(Currency::AUD),
            "INR" => Some(Currency::INR),
            "JPY" => Some(Currency::JPY),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::USD | Currency::CAD | Currency::AUD => "$",
            Currency::EUR => "\u{20ac}",
            Currency::GBP => "\u{a3}",
            Currency::INR => "\u{20b9}",
            Currency::JPY => "\u{a5}",
        }
    }

    /// Decimal places of the minor unit. JPY has none.
    pub fn minor_units(&self) -> u32 {
        match self {
            Currency::JPY => 0,
            _ => 2,
        }
    }

    pub fn all() -> &'static [Currency] {
        &[
            Currency::USD,
            Currency::EUR,
            Currency::GBP,
            Currency::CAD,
            Currency::AUD,
            Currency::INR,
            Currency::JPY,
        ]
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Exchange rates relative to one base currency: 1 unit of base equals
/// `rates[code]` units of `code`. The base itself carries a rate of 1.0.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct RateTable {
    pub base: Currency,
    pub rates: BTreeMap<Currency, f64>,
}

impl RateTable {
    pub fn new(base: Currency) -> Self {
        let mut rates = BTreeMap::new();
        rates.insert(base, 1.0);
        RateTable { base, rates }
    }

    pub fn with_rate(mut self, code: Currency, rate: f64) -> Self {
        self.rates.insert(code, rate);
        self
    }

    pub fn get(&self, code: Currency) -> Option<f64> {
        self.rates.get(&code).copied()
    }
}

/// Conversion result. `authoritative` is false when a rate was missing and
/// the amount came back unconverted; callers must treat that as best effort.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Converted {
    pub amount: f64,
    pub authoritative: bool,
}

/// Convert `amount` from one currency to another via the base.
/// Same-currency conversion returns the amount exactly. A missing rate
/// degrades to the unconverted amount (logged, not an error).
pub fn convert(amount: f64, from: Currency, to: Currency, rates: &RateTable) -> Converted {
    if from == to {
        return Converted { amount, authoritative: true };
    }
    match (rates.get(from), rates.get(to)) {
        (Some(from_rate), Some(to_rate)) if from_rate > 0.0 => Converted {
            amount: amount / from_rate * to_rate,
            authoritative: true,
        },
        _ => {
            tracing::warn!(%from, %to, "rate unavailable, returning unconverted amount");
            Converted { amount, authoritative: false }
        }
    }
}
