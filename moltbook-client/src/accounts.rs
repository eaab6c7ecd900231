use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Account {
    pub name: String,
    pub api_key: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AccountsState {
    #[serde(default)]
    pub accounts: Vec<Account>,

    /// Name of the account requests are made as
    #[serde(default)]
    pub current: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("reading accounts from {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("writing accounts to {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("accounts file {path:?} is not valid")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("no account named {0:?}")]
    Unknown(String),

    #[error("account name must not be empty")]
    EmptyName,

    #[error("api key must not be empty")]
    EmptyKey,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Where the account list is kept between runs
pub trait AccountStorage {
    fn load(&self) -> Result<AccountsState, StorageError>;
    fn save(&mut self, state: &AccountsState) -> Result<(), StorageError>;
}

/// Keeps nothing across runs
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    pub state: AccountsState,
}

impl AccountStorage for MemoryStorage {
    fn load(&self) -> Result<AccountsState, StorageError> {
        Ok(self.state.clone())
    }

    fn save(&mut self, state: &AccountsState) -> Result<(), StorageError> {
        self.state = state.clone();
        Ok(())
    }
}

/// A JSON file. A missing file is an empty account list.
#[derive(Clone, Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> FileStorage {
        FileStorage { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AccountStorage for FileStorage {
    fn load(&self) -> Result<AccountsState, StorageError> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(AccountsState::default()),
            Err(source) => {
                return Err(StorageError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_slice(&data).map_err(|source| StorageError::Format {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&mut self, state: &AccountsState) -> Result<(), StorageError> {
        let write_err = |source| StorageError::Write {
            path: self.path.clone(),
            source,
        };
        let data = serde_json::to_vec_pretty(state).map_err(|source| StorageError::Format {
            path: self.path.clone(),
            source,
        })?;
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(write_err)?;

        // readers see either the old file or the new one, never a partial write
        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        file.write_all(&data).map_err(write_err)?;
        file.as_file().sync_all().map_err(write_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))
                .map_err(write_err)?;
        }
        file.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

/// The accounts this client knows about, and which one is in use.
///
/// Every change is saved before it becomes visible: if saving fails, the store
/// is left as it was.
pub struct AccountStore<S> {
    storage: S,
    state: AccountsState,
}

impl<S: AccountStorage> AccountStore<S> {
    pub fn open(storage: S) -> Result<AccountStore<S>, StorageError> {
        let state = storage.load()?;
        Ok(AccountStore { storage, state })
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn list(&self) -> &[Account] {
        &self.state.accounts
    }

    pub fn current(&self) -> Option<&Account> {
        let name = self.state.current.as_ref()?;
        self.state.accounts.iter().find(|a| a.name == *name)
    }

    pub fn current_api_key(&self) -> Option<&str> {
        self.current().map(|a| &a.api_key as &str)
    }

    /// Remember an account and start using it. An existing account with the
    /// same name gets its key replaced.
    pub fn add(&mut self, name: &str, api_key: &str) -> Result<(), AccountError> {
        let (name, api_key) = (name.trim(), api_key.trim());
        if name.is_empty() {
            return Err(AccountError::EmptyName);
        }
        if api_key.is_empty() {
            return Err(AccountError::EmptyKey);
        }
        let mut next = self.state.clone();
        match next.accounts.iter_mut().find(|a| a.name == name) {
            Some(a) => a.api_key = String::from(api_key),
            None => next.accounts.push(Account {
                name: String::from(name),
                api_key: String::from(api_key),
            }),
        }
        next.current = Some(String::from(name));
        self.commit(next)
    }

    pub fn switch(&mut self, name: &str) -> Result<(), AccountError> {
        let name = name.trim();
        if !self.state.accounts.iter().any(|a| a.name == name) {
            return Err(AccountError::Unknown(String::from(name)));
        }
        let mut next = self.state.clone();
        next.current = Some(String::from(name));
        self.commit(next)
    }

    /// Forget an account. If it was in use, the first remaining one (if any)
    /// takes over.
    pub fn remove(&mut self, name: &str) -> Result<(), AccountError> {
        let name = name.trim();
        let mut next = self.state.clone();
        let before = next.accounts.len();
        next.accounts.retain(|a| a.name != name);
        if next.accounts.len() == before {
            return Err(AccountError::Unknown(String::from(name)));
        }
        if next.current.as_deref() == Some(name) {
            next.current = next.accounts.first().map(|a| a.name.clone());
        }
        self.commit(next)
    }

    fn commit(&mut self, next: AccountsState) -> Result<(), AccountError> {
        self.storage.save(&next)?;
        tracing::debug!(
            num_accounts = next.accounts.len(),
            current = ?next.current,
            "saved accounts"
        );
        self.state = next;
        Ok(())
    }
}
