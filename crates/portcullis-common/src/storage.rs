//! Token storage traits and reference backends.
//!
//! Storage is the only shared mutable resource in the engine. Backends must
//! make each operation atomic per [`TokenKey`]; the services never lock.

use async_trait::async_trait;
use miette::Diagnostic;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use smol_str::SmolStr;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Storage key: provider service name plus a caller-chosen account label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenKey {
    /// Provider service name, e.g. `pinterest`.
    pub service: SmolStr,
    /// Account label, `default` unless the caller picks one.
    pub account: SmolStr,
}

impl TokenKey {
    /// Build a key.
    pub fn new(service: impl Into<SmolStr>, account: impl Into<SmolStr>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }
}

impl fmt::Display for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.account)
    }
}

/// Errors emitted by token storage.
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum StorageError {
    /// No token stored under the key
    #[error("no token stored for {0}")]
    #[diagnostic(
        code(portcullis::storage::not_found),
        help("complete the authorization flow before issuing authorized requests")
    )]
    TokenNotFound(TokenKey),
    /// Filesystem or I/O error
    #[error("I/O error: {0}")]
    #[diagnostic(code(portcullis::storage::io))]
    Io(#[from] std::io::Error),
    /// Serialization error (e.g., JSON)
    #[error("serialization error: {0}")]
    #[diagnostic(code(portcullis::storage::serde))]
    Serde(#[from] serde_json::Error),
    /// Any other error from a backend implementation
    #[error(transparent)]
    #[diagnostic(code(portcullis::storage::other))]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

/// Pluggable storage for the current token of each (service, account).
#[async_trait]
pub trait TokenStorage<T>: Send + Sync
where
    T: Clone + Send + Sync,
{
    /// Whether a token is stored under `key`.
    async fn has_access_token(&self, key: &TokenKey) -> Result<bool, StorageError>;
    /// Fetch the token, [`StorageError::TokenNotFound`] on a miss.
    async fn retrieve_access_token(&self, key: &TokenKey) -> Result<T, StorageError>;
    /// Persist the token, replacing any previous one.
    async fn store_access_token(&self, key: TokenKey, token: T) -> Result<(), StorageError>;
    /// Delete the token under `key`. Deleting a missing token is not an error.
    async fn clear_token(&self, key: &TokenKey) -> Result<(), StorageError>;
    /// Delete every stored token.
    async fn clear_all_tokens(&self) -> Result<(), StorageError>;
}

#[async_trait]
impl<T, S> TokenStorage<T> for Arc<S>
where
    T: Clone + Send + Sync + 'static,
    S: TokenStorage<T> + ?Sized,
{
    async fn has_access_token(&self, key: &TokenKey) -> Result<bool, StorageError> {
        self.as_ref().has_access_token(key).await
    }
    async fn retrieve_access_token(&self, key: &TokenKey) -> Result<T, StorageError> {
        self.as_ref().retrieve_access_token(key).await
    }
    async fn store_access_token(&self, key: TokenKey, token: T) -> Result<(), StorageError> {
        self.as_ref().store_access_token(key, token).await
    }
    async fn clear_token(&self, key: &TokenKey) -> Result<(), StorageError> {
        self.as_ref().clear_token(key).await
    }
    async fn clear_all_tokens(&self) -> Result<(), StorageError> {
        self.as_ref().clear_all_tokens().await
    }
}

/// In-memory token storage suitable for short-lived sessions and tests.
///
/// Tokens are kept as JSON values so one instance can hold both OAuth1 and
/// OAuth2 tokens.
#[derive(Clone, Default)]
pub struct MemoryTokenStorage(Arc<RwLock<HashMap<TokenKey, Value>>>);

impl MemoryTokenStorage {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<T> TokenStorage<T> for MemoryTokenStorage
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn has_access_token(&self, key: &TokenKey) -> Result<bool, StorageError> {
        Ok(self.0.read().await.contains_key(key))
    }
    async fn retrieve_access_token(&self, key: &TokenKey) -> Result<T, StorageError> {
        let guard = self.0.read().await;
        let value = guard
            .get(key)
            .ok_or_else(|| StorageError::TokenNotFound(key.clone()))?;
        Ok(serde_json::from_value(value.clone())?)
    }
    async fn store_access_token(&self, key: TokenKey, token: T) -> Result<(), StorageError> {
        let value = serde_json::to_value(token)?;
        self.0.write().await.insert(key, value);
        Ok(())
    }
    async fn clear_token(&self, key: &TokenKey) -> Result<(), StorageError> {
        self.0.write().await.remove(key);
        Ok(())
    }
    async fn clear_all_tokens(&self) -> Result<(), StorageError> {
        self.0.write().await.clear();
        Ok(())
    }
}

/// File-backed token storage using a single JSON file, laid out as
/// `{"<service>": {"<account>": token}}`.
///
/// NOT secure, only suitable for development. Writers are serialized
/// in-process and every write goes through a temp file plus rename.
///
/// Example
/// ```ignore
/// use portcullis_common::storage::FileTokenStorage;
/// let storage = FileTokenStorage::new("/tmp/portcullis-tokens.json");
/// ```
#[derive(Clone, Debug)]
pub struct FileTokenStorage {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileTokenStorage {
    /// Create a file token storage at the given path. The file is created
    /// lazily on first write.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Map<String, Value>, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Map::new()),
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes)? {
                Value::Object(map) => Ok(map),
                _ => Err(StorageError::Other("token file is not a JSON object".into())),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, store: &Map<String, Value>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let buf = serde_json::to_vec_pretty(store)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &buf).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Tokens live at `store[service][account]`.
fn file_entry<'a>(store: &'a Map<String, Value>, key: &TokenKey) -> Option<&'a Value> {
    store
        .get(key.service.as_str())
        .and_then(|accounts| accounts.get(key.account.as_str()))
}

fn malformed_service(key: &TokenKey) -> StorageError {
    StorageError::Other(format!("token file entry for {} is not a JSON object", key.service).into())
}

#[async_trait]
impl<T> TokenStorage<T> for FileTokenStorage
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn has_access_token(&self, key: &TokenKey) -> Result<bool, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(file_entry(&self.load().await?, key).is_some())
    }
    async fn retrieve_access_token(&self, key: &TokenKey) -> Result<T, StorageError> {
        let _guard = self.lock.lock().await;
        let store = self.load().await?;
        let value = file_entry(&store, key)
            .ok_or_else(|| StorageError::TokenNotFound(key.clone()))?;
        Ok(serde_json::from_value(value.clone())?)
    }
    async fn store_access_token(&self, key: TokenKey, token: T) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut store = self.load().await?;
        let accounts = store
            .entry(key.service.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match accounts {
            Value::Object(accounts) => {
                accounts.insert(key.account.to_string(), serde_json::to_value(token)?);
            }
            _ => return Err(malformed_service(&key)),
        }
        self.save(&store).await
    }
    async fn clear_token(&self, key: &TokenKey) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut store = self.load().await?;
        let Some(Value::Object(accounts)) = store.get_mut(key.service.as_str()) else {
            return Ok(());
        };
        if accounts.remove(key.account.as_str()).is_some() {
            if accounts.is_empty() {
                store.remove(key.service.as_str());
            }
            self.save(&store).await?;
        }
        Ok(())
    }
    async fn clear_all_tokens(&self) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::from(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Tok {
        value: String,
    }

    fn tok(v: &str) -> Tok {
        Tok { value: v.into() }
    }

    #[tokio::test]
    async fn memory_round_trip() {
        let storage = MemoryTokenStorage::new();
        let key = TokenKey::new("svc", "default");
        assert!(!TokenStorage::<Tok>::has_access_token(&storage, &key).await.unwrap());
        let err = TokenStorage::<Tok>::retrieve_access_token(&storage, &key)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::TokenNotFound(k) if k == key));

        storage.store_access_token(key.clone(), tok("a")).await.unwrap();
        storage.store_access_token(key.clone(), tok("b")).await.unwrap();
        let got: Tok = storage.retrieve_access_token(&key).await.unwrap();
        assert_eq!(got, tok("b"));

        TokenStorage::<Tok>::clear_token(&storage, &key).await.unwrap();
        assert!(!TokenStorage::<Tok>::has_access_token(&storage, &key).await.unwrap());
    }

    #[tokio::test]
    async fn memory_keys_are_independent() {
        let storage = Arc::new(MemoryTokenStorage::new());
        let a = TokenKey::new("svc", "alice");
        let b = TokenKey::new("svc", "bob");
        storage.store_access_token(a.clone(), tok("a")).await.unwrap();
        storage.store_access_token(b.clone(), tok("b")).await.unwrap();
        TokenStorage::<Tok>::clear_token(&storage, &a).await.unwrap();
        let got: Tok = storage.retrieve_access_token(&b).await.unwrap();
        assert_eq!(got, tok("b"));
        TokenStorage::<Tok>::clear_all_tokens(&storage).await.unwrap();
        assert!(!TokenStorage::<Tok>::has_access_token(&storage, &b).await.unwrap());
    }

    #[tokio::test]
    async fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileTokenStorage::new(dir.path().join("nested/tokens.json"));
        let key = TokenKey::new("svc", "default");

        assert!(!TokenStorage::<Tok>::has_access_token(&storage, &key).await.unwrap());
        storage.store_access_token(key.clone(), tok("a")).await.unwrap();

        let reopened = FileTokenStorage::new(storage.path());
        let got: Tok = reopened.retrieve_access_token(&key).await.unwrap();
        assert_eq!(got, tok("a"));

        TokenStorage::<Tok>::clear_token(&reopened, &key).await.unwrap();
        let err = TokenStorage::<Tok>::retrieve_access_token(&reopened, &key)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::TokenNotFound(_)));

        TokenStorage::<Tok>::clear_all_tokens(&reopened).await.unwrap();
        assert!(!reopened.path().exists());
    }

    #[tokio::test]
    async fn file_keys_with_slashes_stay_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileTokenStorage::new(dir.path().join("tokens.json"));
        let a = TokenKey::new("a/b", "c");
        let b = TokenKey::new("a", "b/c");
        storage.store_access_token(a.clone(), tok("first")).await.unwrap();
        storage.store_access_token(b.clone(), tok("second")).await.unwrap();

        let got: Tok = storage.retrieve_access_token(&a).await.unwrap();
        assert_eq!(got, tok("first"));
        let got: Tok = storage.retrieve_access_token(&b).await.unwrap();
        assert_eq!(got, tok("second"));

        TokenStorage::<Tok>::clear_token(&storage, &a).await.unwrap();
        assert!(!TokenStorage::<Tok>::has_access_token(&storage, &a).await.unwrap());
        assert!(TokenStorage::<Tok>::has_access_token(&storage, &b).await.unwrap());

        let raw: Value = serde_json::from_slice(&std::fs::read(storage.path()).unwrap()).unwrap();
        assert_eq!(raw["a"]["b/c"]["value"], "second");
        assert!(raw.get("a/b").is_none());
    }

    #[tokio::test]
    async fn file_rejects_non_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, b"[1,2]").unwrap();
        let storage = FileTokenStorage::new(&path);
        let err = TokenStorage::<Tok>::has_access_token(&storage, &TokenKey::new("a", "b"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Other(_)));
    }
}
