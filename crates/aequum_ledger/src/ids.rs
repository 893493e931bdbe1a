//! Strongly-typed IDs with UUID validation. Use these instead of raw strings.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::LedgerError;

fn validate_uuid(s: &str) -> Result<String, LedgerError> {
    Uuid::parse_str(s)
        .map_err(|e| LedgerError::InvalidInput(format!("invalid UUID: {}", e)))?;
    Ok(s.to_string())
}

/// User ID (UUID). Validated on construction via `parse`/`from_str`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

/// Friend ID (UUID). Validated on construction via `parse`/`from_str`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FriendId(pub String);

/// Transaction ID (UUID). Validated on construction via `parse`/`from_str`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TransactionId(pub String);

/// Split ID (UUID). Validated on construction via `parse`/`from_str`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SplitId(pub String);

/// Settlement ID (UUID). Validated on construction via `parse`/`from_str`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SettlementId(pub String);

macro_rules! id_serde {
    ($name:ident) => {
        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
                ser.serialize_str(&self.0)
            }
        }
        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
                let s = String::deserialize(de)?;
                Self::from_str(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}
id_serde!(UserId);
id_serde!(FriendId);
id_serde!(TransactionId);
id_serde!(SplitId);
id_serde!(SettlementId);

macro_rules! id_type {
    ($name:ident) => {
        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn parse(s: impl AsRef<str>) -> Result<Self, LedgerError> {
                Self::from_str(s.as_ref())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }
        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
        impl FromStr for $name {
            type Err = LedgerError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(validate_uuid(s)?))
            }
        }
        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}
id_type!(UserId);
id_type!(FriendId);
id_type!(TransactionId);
id_type!(SplitId);
id_type!(SettlementId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_valid_uuid() {
        let id = FriendId::parse("f27978af-e56a-4b45-aede-fb450557699a").expect("parse");
        assert_eq!(id.as_str(), "f27978af-e56a-4b45-aede-fb450557699a");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(UserId::parse("not-a-uuid").is_err());
        assert!(SplitId::parse("").is_err());
    }

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(TransactionId::new(), TransactionId::new());
    }
}
