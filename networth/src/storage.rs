use crate::schema::{AssetRecord, User, ASSETS_HEADER, USERS_HEADER};
use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

pub const USERS_FILE: &str = ".users.csv";
pub const ASSETS_FILE: &str = ".assets.csv";

/// Handle to the two persisted tables. Every call works on the whole table:
/// loads return all rows in table order, saves replace the table.
pub trait Storage {
    fn load_users(&self) -> Result<Vec<User>, StorageError>;
    fn save_users(&mut self, users: &[User]) -> Result<(), StorageError>;
    fn load_assets(&self) -> Result<Vec<AssetRecord>, StorageError>;
    fn save_assets(&mut self, assets: &[AssetRecord]) -> Result<(), StorageError>;
}

/// Tables kept as comma separated files with a header row inside one
/// directory.
///
/// There is no locking, two processes writing to the same directory at the
/// same time can lose each other's rows.
#[derive(Debug)]
pub struct CsvStorage {
    dir: PathBuf,
}

impl CsvStorage {
    /// Opens the tables in `dir`, creating the directory and header-only
    /// tables where they don't exist yet.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<CsvStorage, StorageError> {
        let storage = CsvStorage {
            dir: dir.as_ref().to_path_buf(),
        };

        fs::create_dir_all(&storage.dir)?;
        init_table::<User>(&storage.users_path(), &USERS_HEADER)?;
        init_table::<AssetRecord>(&storage.assets_path(), &ASSETS_HEADER)?;

        Ok(storage)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn users_path(&self) -> PathBuf {
        self.dir.join(USERS_FILE)
    }

    pub fn assets_path(&self) -> PathBuf {
        self.dir.join(ASSETS_FILE)
    }

    /// Copies both tables into a new `dest/<YYYYmmdd-HHMMSS>` directory and
    /// returns its path.
    pub fn backup<P: AsRef<Path>>(
        &self,
        dest: P,
        time: NaiveDateTime,
    ) -> Result<PathBuf, StorageError> {
        let target = dest
            .as_ref()
            .join(time.format("%Y%m%d-%H%M%S").to_string());
        fs::create_dir_all(&target)?;

        for file in [USERS_FILE, ASSETS_FILE].iter() {
            fs::copy(self.dir.join(file), target.join(file))?;
        }

        info!("Backed up tables to {}", target.display());
        Ok(target)
    }
}

impl Storage for CsvStorage {
    fn load_users(&self) -> Result<Vec<User>, StorageError> {
        read_table(&self.users_path())
    }

    fn save_users(&mut self, users: &[User]) -> Result<(), StorageError> {
        write_table(&self.users_path(), &USERS_HEADER, users)
    }

    fn load_assets(&self) -> Result<Vec<AssetRecord>, StorageError> {
        read_table(&self.assets_path())
    }

    fn save_assets(&mut self, assets: &[AssetRecord]) -> Result<(), StorageError> {
        write_table(&self.assets_path(), &ASSETS_HEADER, assets)
    }
}

fn init_table<T: Serialize>(path: &Path, header: &[&str]) -> Result<(), StorageError> {
    if path.exists() {
        return Ok(());
    }

    info!("Creating empty table {}", path.display());
    write_table::<T>(path, header, &[])
}

fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StorageError> {
    let rows = csv::Reader::from_path(path)?
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()?;

    debug!("Loaded {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

// The table is written next to the original and renamed over it, a failed
// write never touches the existing file.
fn write_table<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<(), StorageError> {
    let tmp_path = path.with_extension("csv.tmp");

    let written = (|| -> Result<(), StorageError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&tmp_path)?;
        writer.write_record(header)?;
        for row in rows {
            writer.serialize(row)?;
        }

        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    })()
    .and_then(|_| fs::rename(&tmp_path, path).map_err(StorageError::from));

    if written.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    written?;

    debug!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// Tables held in memory, used to run the ledger without touching disk.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    users: Vec<User>,
    assets: Vec<AssetRecord>,
    unavailable: bool,
}

impl MemoryStorage {
    pub fn new() -> MemoryStorage {
        MemoryStorage::default()
    }

    /// While set, every load and save fails like an unreadable file would.
    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable {
            Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "memory storage switched off",
            )))
        } else {
            Ok(())
        }
    }
}

impl Storage for MemoryStorage {
    fn load_users(&self) -> Result<Vec<User>, StorageError> {
        self.check_available()?;
        Ok(self.users.clone())
    }

    fn save_users(&mut self, users: &[User]) -> Result<(), StorageError> {
        self.check_available()?;
        self.users = users.to_vec();
        Ok(())
    }

    fn load_assets(&self) -> Result<Vec<AssetRecord>, StorageError> {
        self.check_available()?;
        Ok(self.assets.clone())
    }

    fn save_assets(&mut self, assets: &[AssetRecord]) -> Result<(), StorageError> {
        self.check_available()?;
        self.assets = assets.to_vec();
        Ok(())
    }
}

#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Csv(csv::Error),
}

impl std::error::Error for StorageError {}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "I/O error: {}", e),
            StorageError::Csv(e) => write!(f, "malformed table: {}", e),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

impl From<csv::Error> for StorageError {
    fn from(e: csv::Error) -> Self {
        StorageError::Csv(e)
    }
}
