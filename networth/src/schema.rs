use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const USERS_HEADER: [&str; 2] = ["id", "username"];
pub const ASSETS_HEADER: [&str; 5] = ["id", "username", "asset", "value", "date"];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct User {
    pub id: u64,
    pub username: String,
}

/// One valuation of an asset. Records are never updated, a new valuation is
/// a new row and the one with the latest date counts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AssetRecord {
    pub id: u64,
    pub username: String,
    pub asset: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub value: Decimal,
    pub date: NaiveDate,
}

/// `max + 1` over the given ids, `0` for an empty table.
pub fn next_id(ids: impl Iterator<Item = u64>) -> u64 {
    ids.max().map(|id| id + 1).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::next_id;

    #[test]
    fn next_id_starts_at_zero() {
        assert_eq!(next_id(std::iter::empty()), 0);
    }

    #[test]
    fn next_id_follows_max_not_count() {
        assert_eq!(next_id(vec![0, 7, 3].into_iter()), 8);
    }
}
