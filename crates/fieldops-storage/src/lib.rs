//! Document persistence for FieldOps: an async repository port, a JSON-file
//! store with atomic writes, an in-memory store, and YAML seed import.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use fieldops_core::{Collection, Customer, Document, Employee, Equipment, Job, Task};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "fieldops-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("decoding {collection} documents: {source}")]
    Decode {
        collection: Collection,
        #[source]
        source: serde_json::Error,
    },
    #[error("encoding {collection} documents: {source}")]
    Encode {
        collection: Collection,
        #[source]
        source: serde_json::Error,
    },
    #[error("{collection} document {id} not found")]
    NotFound { collection: Collection, id: Uuid },
    #[error("invalid seed file: {0}")]
    Seed(#[from] serde_yaml::Error),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Outcome of persisting one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCollection {
    pub collection: Collection,
    pub content_hash: String,
    pub document_count: usize,
    pub byte_size: usize,
    /// True when the stored bytes already matched and nothing was rewritten.
    pub unchanged: bool,
}

/// Raw document access per collection. Typed access goes through
/// [`list`], [`get`], [`upsert`] and [`delete`].
#[async_trait]
pub trait Repository: Send + Sync {
    async fn load(&self, collection: Collection) -> Result<Vec<JsonValue>, StoreError>;

    async fn replace(
        &self,
        collection: Collection,
        documents: Vec<JsonValue>,
    ) -> Result<StoredCollection, StoreError>;

    /// Insert or replace the document whose `id` matches, keeping list order.
    async fn upsert_raw(
        &self,
        collection: Collection,
        id: Uuid,
        document: JsonValue,
    ) -> Result<StoredCollection, StoreError>;

    /// Remove the document with `id`; `Ok(false)` when it was not present.
    async fn delete_raw(&self, collection: Collection, id: Uuid) -> Result<bool, StoreError>;
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn document_id(value: &JsonValue) -> Option<Uuid> {
    value
        .get("id")
        .and_then(JsonValue::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

fn encode(collection: Collection, documents: &[JsonValue]) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec_pretty(documents).map_err(|source| StoreError::Encode { collection, source })
}

fn splice(documents: &mut Vec<JsonValue>, id: Uuid, document: JsonValue) {
    match documents.iter_mut().find(|d| document_id(d) == Some(id)) {
        Some(slot) => *slot = document,
        None => documents.push(document),
    }
}

fn remove(documents: &mut Vec<JsonValue>, id: Uuid) -> bool {
    let before = documents.len();
    documents.retain(|d| document_id(d) != Some(id));
    documents.len() != before
}

async fn write_atomically(temp_path: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(temp_path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);
    fs::rename(temp_path, path).await
}

/// One pretty-printed JSON array per collection under `root`.
#[derive(Debug)]
pub struct JsonDocumentStore {
    root: PathBuf,
    locks: Mutex<HashMap<Collection, Arc<Mutex<()>>>>,
}

impl JsonDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn collection_path(&self, collection: Collection) -> PathBuf {
        self.root.join(format!("{}.json", collection.as_str()))
    }

    async fn collection_lock(&self, collection: Collection) -> Arc<Mutex<()>> {
        let mut map = self.locks.lock().await;
        map.entry(collection)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn read_documents(&self, collection: Collection) -> Result<Vec<JsonValue>, StoreError> {
        let path = self.collection_path(collection);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::io(&path, err)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode { collection, source })
    }

    /// Write via temp file + rename so readers never observe a partial file.
    async fn write_documents(
        &self,
        collection: Collection,
        documents: &[JsonValue],
    ) -> Result<StoredCollection, StoreError> {
        let bytes = encode(collection, documents)?;
        let content_hash = sha256_hex(&bytes);
        let path = self.collection_path(collection);

        let span = info_span!("store_write", %collection, path = %path.display());
        async {
            if let Ok(existing) = fs::read(&path).await {
                if sha256_hex(&existing) == content_hash {
                    debug!("collection unchanged; skipping write");
                    return Ok(StoredCollection {
                        collection,
                        content_hash,
                        document_count: documents.len(),
                        byte_size: bytes.len(),
                        unchanged: true,
                    });
                }
            }

            if let Err(err) = fs::create_dir_all(&self.root).await {
                return Err(StoreError::io(&self.root, err));
            }

            let temp_path = self
                .root
                .join(format!(".{}.{}.tmp", collection.as_str(), Uuid::new_v4()));
            if let Err(err) = write_atomically(&temp_path, &path, &bytes).await {
                let _ = fs::remove_file(&temp_path).await;
                return Err(StoreError::io(&path, err));
            }

            debug!(documents = documents.len(), bytes = bytes.len(), "collection written");
            Ok(StoredCollection {
                collection,
                content_hash,
                document_count: documents.len(),
                byte_size: bytes.len(),
                unchanged: false,
            })
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl Repository for JsonDocumentStore {
    async fn load(&self, collection: Collection) -> Result<Vec<JsonValue>, StoreError> {
        self.read_documents(collection).await
    }

    async fn replace(
        &self,
        collection: Collection,
        documents: Vec<JsonValue>,
    ) -> Result<StoredCollection, StoreError> {
        let lock = self.collection_lock(collection).await;
        let _guard = lock.lock().await;
        self.write_documents(collection, &documents).await
    }

    async fn upsert_raw(
        &self,
        collection: Collection,
        id: Uuid,
        document: JsonValue,
    ) -> Result<StoredCollection, StoreError> {
        let lock = self.collection_lock(collection).await;
        let _guard = lock.lock().await;
        let mut documents = self.read_documents(collection).await?;
        splice(&mut documents, id, document);
        self.write_documents(collection, &documents).await
    }

    async fn delete_raw(&self, collection: Collection, id: Uuid) -> Result<bool, StoreError> {
        let lock = self.collection_lock(collection).await;
        let _guard = lock.lock().await;
        let mut documents = self.read_documents(collection).await?;
        if !remove(&mut documents, id) {
            return Ok(false);
        }
        self.write_documents(collection, &documents).await?;
        Ok(true)
    }
}

/// Process-local store, used by tests and the demo server when no data dir is set.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: Mutex<HashMap<Collection, Vec<JsonValue>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn summary(
        collection: Collection,
        documents: &[JsonValue],
        unchanged: bool,
    ) -> Result<StoredCollection, StoreError> {
        let bytes = encode(collection, documents)?;
        Ok(StoredCollection {
            collection,
            content_hash: sha256_hex(&bytes),
            document_count: documents.len(),
            byte_size: bytes.len(),
            unchanged,
        })
    }
}

#[async_trait]
impl Repository for InMemoryStore {
    async fn load(&self, collection: Collection) -> Result<Vec<JsonValue>, StoreError> {
        let map = self.collections.lock().await;
        Ok(map.get(&collection).cloned().unwrap_or_default())
    }

    async fn replace(
        &self,
        collection: Collection,
        documents: Vec<JsonValue>,
    ) -> Result<StoredCollection, StoreError> {
        let mut map = self.collections.lock().await;
        let unchanged = map.get(&collection) == Some(&documents);
        let summary = Self::summary(collection, &documents, unchanged)?;
        map.insert(collection, documents);
        Ok(summary)
    }

    async fn upsert_raw(
        &self,
        collection: Collection,
        id: Uuid,
        document: JsonValue,
    ) -> Result<StoredCollection, StoreError> {
        let mut map = self.collections.lock().await;
        let documents = map.entry(collection).or_default();
        let previous = documents.clone();
        splice(documents, id, document);
        let unchanged = *documents == previous;
        Self::summary(collection, documents, unchanged)
    }

    async fn delete_raw(&self, collection: Collection, id: Uuid) -> Result<bool, StoreError> {
        let mut map = self.collections.lock().await;
        Ok(map
            .get_mut(&collection)
            .map(|documents| remove(documents, id))
            .unwrap_or(false))
    }
}

/// All documents of type `D`, in stored order.
pub async fn list<D: Document>(repo: &dyn Repository) -> Result<Vec<D>, StoreError> {
    let values = repo.load(D::COLLECTION).await?;
    values
        .into_iter()
        .map(|v| {
            serde_json::from_value(v).map_err(|source| StoreError::Decode {
                collection: D::COLLECTION,
                source,
            })
        })
        .collect()
}

/// Documents of type `D`, narrowed to one company when `company_id` is set.
pub async fn list_scoped<D: Document>(
    repo: &dyn Repository,
    company_id: Option<Uuid>,
) -> Result<Vec<D>, StoreError> {
    let mut docs = list::<D>(repo).await?;
    if let Some(company_id) = company_id {
        docs.retain(|d| d.company_id() == company_id);
    }
    Ok(docs)
}

pub async fn get<D: Document>(repo: &dyn Repository, id: Uuid) -> Result<D, StoreError> {
    list::<D>(repo)
        .await?
        .into_iter()
        .find(|d| d.id() == id)
        .ok_or(StoreError::NotFound {
            collection: D::COLLECTION,
            id,
        })
}

pub async fn upsert<D: Document>(
    repo: &dyn Repository,
    document: &D,
) -> Result<StoredCollection, StoreError> {
    let value = serde_json::to_value(document).map_err(|source| StoreError::Encode {
        collection: D::COLLECTION,
        source,
    })?;
    repo.upsert_raw(D::COLLECTION, document.id(), value).await
}

pub async fn delete<D: Document>(repo: &dyn Repository, id: Uuid) -> Result<(), StoreError> {
    if repo.delete_raw(D::COLLECTION, id).await? {
        Ok(())
    } else {
        Err(StoreError::NotFound {
            collection: D::COLLECTION,
            id,
        })
    }
}

/// Initial data set, one list per collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub customers: Vec<Customer>,
    #[serde(default)]
    pub employees: Vec<Employee>,
    #[serde(default)]
    pub equipment: Vec<Equipment>,
    #[serde(default)]
    pub jobs: Vec<Job>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl SeedData {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, StoreError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub async fn from_yaml_file(path: &Path) -> Result<Self, StoreError> {
        let yaml = fs::read_to_string(path)
            .await
            .map_err(|err| StoreError::io(path, err))?;
        Self::from_yaml_str(&yaml)
    }
}

fn to_values<D: Document>(docs: &[D]) -> Result<Vec<JsonValue>, StoreError> {
    docs.iter()
        .map(|d| {
            serde_json::to_value(d).map_err(|source| StoreError::Encode {
                collection: D::COLLECTION,
                source,
            })
        })
        .collect()
}

/// Replace every collection with the seed's contents.
pub async fn import_seed(
    repo: &dyn Repository,
    seed: &SeedData,
) -> Result<Vec<StoredCollection>, StoreError> {
    let batches = [
        (Collection::Customers, to_values(&seed.customers)?),
        (Collection::Employees, to_values(&seed.employees)?),
        (Collection::Equipment, to_values(&seed.equipment)?),
        (Collection::Jobs, to_values(&seed.jobs)?),
        (Collection::Tasks, to_values(&seed.tasks)?),
    ];
    let mut stored = Vec::with_capacity(batches.len());
    for (collection, documents) in batches {
        stored.push(repo.replace(collection, documents).await?);
    }
    Ok(stored)
}
