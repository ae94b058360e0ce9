extern crate chrono;
extern crate csv;
#[macro_use]
extern crate log;
extern crate rust_decimal;

use chrono::NaiveDate;
use itertools::Itertools;
use rust_decimal::Decimal;
use schema::next_id;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

pub mod commands;
pub mod schema;
pub mod storage;

pub use schema::{AssetRecord, User};
pub use storage::{CsvStorage, MemoryStorage, Storage, StorageError};

/// Owns the users and asset tables and enforces the rules around them. No
/// rows are cached, every operation reloads what it needs from storage.
pub struct Ledger<S, C = SystemClock> {
    storage: S,
    clock: C,
    require_registered_user: bool,
}

#[derive(Debug, Clone)]
pub struct LedgerCfg {
    pub data_dir: PathBuf,
    pub require_registered_user: bool,
}

/// Source of the calendar date stamped on new records and net worth
/// queries.
pub trait Clock {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetWorth {
    pub username: String,
    /// Day the computation ran, not the date of the newest record.
    pub as_of: NaiveDate,
    pub total: Decimal,
    /// Latest record of every asset, ordered by asset name.
    pub holdings: Vec<AssetRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserListing {
    NoUsers,
    Users(Vec<User>),
}

impl Default for LedgerCfg {
    fn default() -> Self {
        LedgerCfg {
            data_dir: PathBuf::from("."),
            require_registered_user: false,
        }
    }
}

impl LedgerCfg {
    /// Reads `NETWORTH_DATA_DIR` and `NETWORTH_REQUIRE_REGISTERED_USER`,
    /// unset variables keep their defaults.
    pub fn from_env() -> Result<LedgerCfg, Error> {
        let mut cfg = LedgerCfg::default();

        if let Ok(dir) = std::env::var("NETWORTH_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }

        if let Ok(flag) = std::env::var("NETWORTH_REQUIRE_REGISTERED_USER") {
            cfg.require_registered_user = parse_flag(&flag).ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "NETWORTH_REQUIRE_REGISTERED_USER must be a boolean, got '{}'",
                    flag
                ))
            })?;
        }

        Ok(cfg)
    }
}

fn parse_flag(flag: &str) -> Option<bool> {
    match flag.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

impl<S: Storage> Ledger<S> {
    pub fn new(storage: S, cfg: &LedgerCfg) -> Ledger<S> {
        Ledger::with_clock(storage, cfg, SystemClock)
    }
}

impl<S: Storage, C: Clock> Ledger<S, C> {
    pub fn with_clock(storage: S, cfg: &LedgerCfg, clock: C) -> Ledger<S, C> {
        Ledger {
            storage,
            clock,
            require_registered_user: cfg.require_registered_user,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    #[cfg(test)]
    fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn register_user(&mut self, username: &str) -> Result<User, Error> {
        check_name(username).ok_or(Error::InvalidUsername)?;

        let mut users = self.storage.load_users()?;
        if users.iter().any(|user| user.username == username) {
            warn!("Refusing to register {} twice", username);
            return Err(Error::DuplicateUser(username.to_string()));
        }

        let user = User {
            id: next_id(users.iter().map(|user| user.id)),
            username: username.to_string(),
        };
        users.push(user.clone());
        self.storage.save_users(&users)?;

        info!("Registered user {} with id {}", user.username, user.id);
        Ok(user)
    }

    /// Appends a valuation of `asset` dated today. `raw_value` accepts plain
    /// and scientific decimal notation within the range of `Decimal`
    /// (about ±7.9e28); digit separators such as `1_000` are rejected.
    pub fn record_asset(
        &mut self,
        username: &str,
        asset: &str,
        raw_value: &str,
    ) -> Result<AssetRecord, Error> {
        check_name(username).ok_or(Error::InvalidUsername)?;
        check_name(asset).ok_or(Error::InvalidAssetName)?;
        let value = parse_value(raw_value)?;

        if self.require_registered_user
            && !self
                .storage
                .load_users()?
                .iter()
                .any(|user| user.username == username)
        {
            warn!("Refusing asset {} for unregistered user {}", asset, username);
            return Err(Error::UnknownUser(username.to_string()));
        }

        let mut assets = self.storage.load_assets()?;
        let record = AssetRecord {
            id: next_id(assets.iter().map(|record| record.id)),
            username: username.to_string(),
            asset: asset.to_string(),
            value,
            date: self.clock.today(),
        };
        assets.push(record.clone());
        self.storage.save_assets(&assets)?;

        info!(
            "Recorded {} = {} for {} (id {})",
            record.asset, record.value, record.username, record.id
        );
        Ok(record)
    }

    /// Sums the latest value of every asset ever recorded for `username`.
    /// Unknown users simply have a net worth of zero.
    pub fn compute_net_worth(&self, username: &str) -> Result<NetWorth, Error> {
        let holdings = latest_per_asset(
            self.storage
                .load_assets()?
                .into_iter()
                .filter(|record| record.username == username),
        );
        let total = holdings
            .iter()
            .try_fold(Decimal::ZERO, |acc, record| acc.checked_add(record.value))
            .ok_or_else(|| Error::Overflow(username.to_string()))?;

        Ok(NetWorth {
            username: username.to_string(),
            as_of: self.clock.today(),
            total,
            holdings,
        })
    }

    pub fn list_users(&self) -> Result<UserListing, Error> {
        let users = self.storage.load_users()?;

        if users.is_empty() {
            Ok(UserListing::NoUsers)
        } else {
            Ok(UserListing::Users(users))
        }
    }
}

/// Picks the newest record per asset name. Records on the same day are
/// ordered by id, so the one recorded last wins.
fn latest_per_asset(records: impl Iterator<Item = AssetRecord>) -> Vec<AssetRecord> {
    records
        .into_group_map_by(|record| record.asset.clone())
        .into_iter()
        .filter_map(|(_, group)| {
            group
                .into_iter()
                .max_by_key(|record| (record.date, record.id))
        })
        .sorted_by(|a, b| a.asset.cmp(&b.asset))
        .collect()
}

fn check_name(name: &str) -> Option<()> {
    if name.trim().is_empty() {
        None
    } else {
        Some(())
    }
}

fn parse_value(raw: &str) -> Result<Decimal, Error> {
    let trimmed = raw.trim();
    if trimmed.contains('_') {
        return Err(Error::InvalidValue(raw.to_string()));
    }

    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| Error::InvalidValue(raw.to_string()))
}

#[derive(Debug)]
pub enum Error {
    DuplicateUser(String),
    UnknownUser(String),
    InvalidUsername,
    InvalidAssetName,
    InvalidValue(String),
    InvalidConfig(String),
    Overflow(String),
    StorageUnavailable(StorageError),
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::DuplicateUser(username) => write!(f, "User {} already exists.", username),
            Error::UnknownUser(username) => write!(f, "User {} is not registered.", username),
            Error::InvalidUsername => write!(f, "Username must not be empty."),
            Error::InvalidAssetName => write!(f, "Asset name must not be empty."),
            Error::InvalidValue(value) => write!(f, "'{}' is not a valid number.", value),
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::Overflow(username) => {
                write!(f, "Net worth of {} is too large to compute.", username)
            }
            Error::StorageUnavailable(e) => write!(f, "Storage unavailable: {}", e),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::StorageUnavailable(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Clone)]
    struct TestClock(Rc<Cell<NaiveDate>>);

    impl TestClock {
        fn new(y: i32, m: u32, d: u32) -> TestClock {
            TestClock(Rc::new(Cell::new(date(y, m, d))))
        }

        fn set(&self, y: i32, m: u32, d: u32) {
            self.0.set(date(y, m, d));
        }
    }

    impl Clock for TestClock {
        fn today(&self) -> NaiveDate {
            self.0.get()
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ledger() -> (Ledger<MemoryStorage, TestClock>, TestClock) {
        let clock = TestClock::new(2024, 1, 5);
        let ledger = Ledger::with_clock(MemoryStorage::new(), &LedgerCfg::default(), clock.clone());
        (ledger, clock)
    }

    #[test]
    fn user_ids_follow_registration_order() {
        let (mut ledger, _) = ledger();

        let ids = ["john", "jane", "jim", "joan"]
            .iter()
            .map(|name| ledger.register_user(name).unwrap().id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![0, 1, 2, 3]);

        match ledger.list_users().unwrap() {
            UserListing::Users(users) => {
                let names = users.iter().map(|u| u.username.as_str()).collect::<Vec<_>>();
                assert_eq!(names, vec!["john", "jane", "jim", "joan"]);
            }
            UserListing::NoUsers => panic!("users were registered"),
        }
    }

    #[test]
    fn duplicate_user_is_rejected() {
        let (mut ledger, _) = ledger();
        ledger.register_user("john").unwrap();

        match ledger.register_user("john") {
            Err(Error::DuplicateUser(name)) => assert_eq!(name, "john"),
            other => panic!("expected duplicate user, got {:?}", other),
        }
        assert_eq!(ledger.storage().load_users().unwrap().len(), 1);
    }

    #[test]
    fn duplicate_user_leaves_table_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CsvStorage::open(dir.path()).unwrap();
        let users_path = storage.users_path();
        let mut ledger = Ledger::new(storage, &LedgerCfg::default());
        ledger.register_user("john").unwrap();
        ledger.register_user("jane").unwrap();

        let before = std::fs::read(&users_path).unwrap();
        assert!(ledger.register_user("john").is_err());
        assert_eq!(std::fs::read(&users_path).unwrap(), before);
    }

    #[test]
    fn empty_username_is_rejected() {
        let (mut ledger, _) = ledger();
        assert!(matches!(ledger.register_user(""), Err(Error::InvalidUsername)));
        assert!(matches!(
            ledger.record_asset("  ", "cash", "1"),
            Err(Error::InvalidUsername)
        ));
        assert!(matches!(
            ledger.record_asset("john", "", "1"),
            Err(Error::InvalidAssetName)
        ));
        assert_eq!(ledger.list_users().unwrap(), UserListing::NoUsers);
    }

    #[test]
    fn asset_ids_ignore_grouping() {
        let (mut ledger, _) = ledger();

        let ids = vec![
            ledger.record_asset("john", "savings", "1").unwrap().id,
            ledger.record_asset("jane", "stocks", "2").unwrap().id,
            ledger.record_asset("john", "savings", "3").unwrap().id,
            ledger.record_asset("jim", "car", "4").unwrap().id,
        ];
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn asset_ids_continue_after_highest_existing() {
        let (mut ledger, _) = ledger();
        let mut existing = ledger.record_asset("john", "savings", "1").unwrap();
        existing.id = 41;
        ledger.storage_mut().save_assets(&[existing]).unwrap();

        assert_eq!(ledger.record_asset("john", "cash", "5").unwrap().id, 42);
    }

    #[test]
    fn record_is_stamped_with_today() {
        let (mut ledger, clock) = ledger();
        clock.set(2023, 12, 31);

        let record = ledger.record_asset("john", "savings", "1000").unwrap();
        assert_eq!(record.date, date(2023, 12, 31));
        assert_eq!(record.value, dec!(1000));
    }

    #[test]
    fn latest_value_supersedes_earlier_ones() {
        let (mut ledger, clock) = ledger();
        ledger.register_user("john").unwrap();
        ledger.record_asset("john", "savings", "1000").unwrap();
        clock.set(2024, 2, 1);
        ledger.record_asset("john", "savings", "1500").unwrap();
        ledger.record_asset("john", "stocks", "200").unwrap();
        ledger.record_asset("jane", "savings", "99999").unwrap();
        clock.set(2024, 3, 1);

        let net_worth = ledger.compute_net_worth("john").unwrap();
        assert_eq!(net_worth.total, dec!(1700));
        assert_eq!(net_worth.as_of, date(2024, 3, 1));

        let held = net_worth
            .holdings
            .iter()
            .map(|r| (r.asset.as_str(), r.value))
            .collect::<Vec<_>>();
        assert_eq!(held, vec![("savings", dec!(1500)), ("stocks", dec!(200))]);
    }

    #[test]
    fn older_record_added_later_does_not_win() {
        let (mut ledger, _) = ledger();
        let mut old = ledger.record_asset("john", "savings", "1500").unwrap();
        old.id = 1;
        old.date = date(2023, 6, 1);
        old.value = dec!(10);
        let mut assets = ledger.storage().load_assets().unwrap();
        assets.push(old);
        ledger.storage_mut().save_assets(&assets).unwrap();

        assert_eq!(ledger.compute_net_worth("john").unwrap().total, dec!(1500));
    }

    #[test]
    fn same_day_tie_goes_to_highest_id() {
        let (mut ledger, _) = ledger();
        ledger.record_asset("john", "savings", "1000").unwrap();
        ledger.record_asset("john", "savings", "1200").unwrap();

        let net_worth = ledger.compute_net_worth("john").unwrap();
        assert_eq!(net_worth.total, dec!(1200));
        assert_eq!(net_worth.holdings[0].id, 1);
    }

    #[test]
    fn unknown_user_is_worth_nothing() {
        let (ledger, _) = ledger();

        let net_worth = ledger.compute_net_worth("unknown_user").unwrap();
        assert_eq!(net_worth.total, Decimal::ZERO);
        assert!(net_worth.holdings.is_empty());
    }

    #[test]
    fn net_worth_is_idempotent() {
        let (mut ledger, _) = ledger();
        ledger.record_asset("john", "savings", "1000.25").unwrap();
        ledger.record_asset("john", "debt", "-250.5").unwrap();

        let first = ledger.compute_net_worth("john").unwrap();
        let second = ledger.compute_net_worth("john").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.total, dec!(749.75));
    }

    #[test]
    fn net_worth_past_decimal_range_is_an_error() {
        let (mut ledger, _) = ledger();
        ledger
            .record_asset("john", "a", "79228162514264337593543950335")
            .unwrap();
        ledger.record_asset("john", "b", "1").unwrap();

        match ledger.compute_net_worth("john") {
            Err(Error::Overflow(name)) => assert_eq!(name, "john"),
            other => panic!("expected overflow, got {:?}", other),
        }
        assert_eq!(
            ledger.compute_net_worth("jane").unwrap().total,
            Decimal::ZERO
        );
    }

    #[test]
    fn invalid_value_appends_nothing() {
        let (mut ledger, _) = ledger();

        for raw in &["abc", "", "inf", "NaN", "12abc", "1_000", "1e30"] {
            match ledger.record_asset("john", "cash", raw) {
                Err(Error::InvalidValue(value)) => assert_eq!(value, *raw),
                other => panic!("expected invalid value for {:?}, got {:?}", raw, other),
            }
        }
        assert!(ledger.storage().load_assets().unwrap().is_empty());
    }

    #[test]
    fn scientific_notation_is_accepted() {
        let (mut ledger, _) = ledger();
        let record = ledger.record_asset("john", "cash", "1e3").unwrap();
        assert_eq!(record.value, dec!(1000));
    }

    #[test]
    fn unregistered_users_allowed_by_default() {
        let (mut ledger, _) = ledger();
        assert!(ledger.record_asset("ghost", "cash", "10").is_ok());
    }

    #[test]
    fn registration_can_be_required() {
        let cfg = LedgerCfg {
            require_registered_user: true,
            ..LedgerCfg::default()
        };
        let mut ledger = Ledger::with_clock(MemoryStorage::new(), &cfg, TestClock::new(2024, 1, 5));

        match ledger.record_asset("ghost", "cash", "10") {
            Err(Error::UnknownUser(name)) => assert_eq!(name, "ghost"),
            other => panic!("expected unknown user, got {:?}", other),
        }
        assert!(ledger.storage().load_assets().unwrap().is_empty());

        ledger.register_user("ghost").unwrap();
        assert!(ledger.record_asset("ghost", "cash", "10").is_ok());
    }

    #[test]
    fn storage_failures_are_surfaced() {
        let (mut ledger, _) = ledger();
        ledger.register_user("john").unwrap();
        ledger.storage_mut().set_unavailable(true);

        assert!(matches!(
            ledger.register_user("jane"),
            Err(Error::StorageUnavailable(_))
        ));
        assert!(matches!(
            ledger.compute_net_worth("john"),
            Err(Error::StorageUnavailable(_))
        ));

        ledger.storage_mut().set_unavailable(false);
        assert_eq!(ledger.storage().load_users().unwrap().len(), 1);
    }

    #[test]
    fn empty_table_reports_no_users() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(CsvStorage::open(dir.path()).unwrap(), &LedgerCfg::default());
        assert_eq!(ledger.list_users().unwrap(), UserListing::NoUsers);
    }

    #[test]
    fn flags_parse_common_spellings() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
