//! Identity store — append-only enrolled faces with write-through persistence.
//!
//! One [`IdentityStore`] owns both the in-memory sequence and its
//! [`StoreBackend`]; reads never touch the backend after open.

use crate::types::{Embedding, EnrolledIdentity, IdentitySummary, Metadata};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

const ID_PREFIX: &str = "face";
const ID_SUFFIX_LEN: usize = 7;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store file {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },
    #[error("failed to serialize identities: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("embedding has {actual} dimensions, enrolled identities have {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("embedding is empty or contains non-finite values")]
    InvalidEmbedding,
}

/// On-disk record layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityRecord {
    id: String,
    embedding: Vec<f32>,
    metadata: Metadata,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model_version: Option<String>,
}

impl From<&EnrolledIdentity> for IdentityRecord {
    fn from(identity: &EnrolledIdentity) -> Self {
        Self {
            id: identity.id.clone(),
            embedding: identity.embedding.values.clone(),
            metadata: identity.metadata.clone(),
            created_at: identity.created_at,
            model_version: identity.embedding.model_version.clone(),
        }
    }
}

impl From<IdentityRecord> for EnrolledIdentity {
    fn from(record: IdentityRecord) -> Self {
        Self {
            id: record.id,
            embedding: Embedding::new(record.embedding, record.model_version),
            metadata: record.metadata,
            created_at: record.created_at,
        }
    }
}

/// Serialize identities into the persisted layout (ordered JSON array).
pub fn encode_identities(identities: &[EnrolledIdentity]) -> Result<Vec<u8>, StoreError> {
    let records: Vec<IdentityRecord> = identities.iter().map(IdentityRecord::from).collect();
    Ok(serde_json::to_vec_pretty(&records)?)
}

/// Parse the persisted layout, preserving order.
pub fn decode_identities(data: &[u8]) -> Result<Vec<EnrolledIdentity>, serde_json::Error> {
    let records: Vec<IdentityRecord> = serde_json::from_slice(data)?;
    Ok(records.into_iter().map(EnrolledIdentity::from).collect())
}

/// Durable medium behind an [`IdentityStore`].
pub trait StoreBackend: Send {
    fn load(&self) -> Result<Vec<EnrolledIdentity>, StoreError>;
    fn save(&self, identities: &[EnrolledIdentity]) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
    fn describe(&self) -> String;

    /// Whether a successful `save` survives a restart.
    fn is_durable(&self) -> bool {
        true
    }
}

/// JSON file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl StoreBackend for JsonFileBackend {
    fn load(&self) -> Result<Vec<EnrolledIdentity>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = fs::read(&self.path).map_err(|e| self.io_err(e))?;
        decode_identities(&data).map_err(|err| StoreError::Corrupt {
            path: self.path.clone(),
            message: err.to_string(),
        })
    }

    fn save(&self, identities: &[EnrolledIdentity]) -> Result<(), StoreError> {
        let data = encode_identities(identities)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(parent).map_err(|e| self.io_err(e))?;
        tmp.write_all(&data).map_err(|e| self.io_err(e))?;
        tmp.as_file().sync_all().map_err(|e| self.io_err(e))?;
        tmp.persist(&self.path).map_err(|e| self.io_err(e.error))?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_err(e)),
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Keeps nothing beyond the process lifetime.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryBackend;

impl StoreBackend for MemoryBackend {
    fn load(&self) -> Result<Vec<EnrolledIdentity>, StoreError> {
        Ok(Vec::new())
    }

    fn save(&self, _identities: &[EnrolledIdentity]) -> Result<(), StoreError> {
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".into()
    }

    fn is_durable(&self) -> bool {
        false
    }
}

/// Outcome of [`IdentityStore::append`].
#[derive(Debug, Clone, PartialEq)]
pub struct AppendReceipt {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// False when the write reached memory only.
    pub durable: bool,
    pub warning: Option<String>,
}

pub struct IdentityStore {
    identities: Vec<EnrolledIdentity>,
    backend: Box<dyn StoreBackend>,
}

impl IdentityStore {
    /// Load existing identities from `backend`.
    pub fn open(backend: Box<dyn StoreBackend>) -> Result<Self, StoreError> {
        let identities = backend.load()?;
        if let Some(first) = identities.first() {
            let expected = first.embedding.dimension();
            if let Some(bad) = identities.iter().find(|i| i.embedding.dimension() != expected) {
                return Err(StoreError::Corrupt {
                    path: PathBuf::from(backend.describe()),
                    message: format!(
                        "identity {} has {} dimensions, expected {expected}",
                        bad.id,
                        bad.embedding.dimension()
                    ),
                });
            }
        }
        tracing::info!(backend = %backend.describe(), count = identities.len(), "identity store opened");
        Ok(Self { identities, backend })
    }

    pub fn in_memory() -> Self {
        Self {
            identities: Vec::new(),
            backend: Box::new(MemoryBackend),
        }
    }

    /// Enroll a new identity under a freshly generated ID.
    ///
    /// A failed write, or a backend that only lives in memory, keeps the
    /// identity in memory and reports `durable: false` with a warning.
    pub fn append(&mut self, embedding: Embedding, metadata: Metadata) -> Result<AppendReceipt, StoreError> {
        if embedding.values.is_empty() || !embedding.is_finite() {
            return Err(StoreError::InvalidEmbedding);
        }
        if let Some(expected) = self.dimension() {
            if embedding.dimension() != expected {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: embedding.dimension(),
                });
            }
        }

        let created_at = Utc::now();
        let id = self.unique_id(created_at);
        self.identities.push(EnrolledIdentity {
            id: id.clone(),
            embedding,
            metadata,
            created_at,
        });

        let (durable, warning) = match self.backend.save(&self.identities) {
            Ok(()) if self.backend.is_durable() => (true, None),
            Ok(()) => {
                tracing::warn!(id = %id, "identity kept in memory only; it will not survive a restart");
                (false, Some("identity kept in memory only; it will not survive a restart".to_string()))
            }
            Err(err) => {
                tracing::warn!(
                    id = %id,
                    backend = %self.backend.describe(),
                    error = %err,
                    "identity kept in memory only; it will not survive a restart"
                );
                (false, Some(format!("identity not persisted: {err}")))
            }
        };

        tracing::info!(id = %id, count = self.identities.len(), durable, "identity appended");
        Ok(AppendReceipt {
            id,
            created_at,
            durable,
            warning,
        })
    }

    /// All identities in insertion order.
    pub fn list_all(&self) -> &[EnrolledIdentity] {
        &self.identities
    }

    pub fn summaries(&self) -> Vec<IdentitySummary> {
        self.identities.iter().map(IdentitySummary::from).collect()
    }

    pub fn count(&self) -> usize {
        self.identities.len()
    }

    /// Embedding dimension shared by all entries, if any.
    pub fn dimension(&self) -> Option<usize> {
        self.identities.first().map(|i| i.embedding.dimension())
    }

    /// Irreversibly drop every identity, in memory and on the backend.
    ///
    /// Memory is always cleared; a backend error is returned afterwards.
    pub fn clear_all(&mut self) -> Result<(), StoreError> {
        let dropped = self.identities.len();
        self.identities.clear();
        self.backend.clear()?;
        tracing::warn!(dropped, backend = %self.backend.describe(), "identity store cleared");
        Ok(())
    }

    pub fn backend_description(&self) -> String {
        self.backend.describe()
    }

    fn unique_id(&self, now: DateTime<Utc>) -> String {
        loop {
            let id = generate_id(now);
            if !self.identities.iter().any(|i| i.id == id) {
                return id;
            }
        }
    }
}

/// `face-<unix millis>-<7 random base36 chars>`.
fn generate_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{ID_PREFIX}-{}-{suffix}", now.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MetadataValue;
    use std::collections::HashSet;

    fn emb(values: Vec<f32>) -> Embedding {
        Embedding::new(values, Some("test-v1".into()))
    }

    fn meta(applicant: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert("applicantId".into(), MetadataValue::from(applicant));
        m.insert("step".into(), MetadataValue::from(2i64));
        m
    }

    /// Backend whose writes always fail.
    struct BrokenBackend;

    impl StoreBackend for BrokenBackend {
        fn load(&self) -> Result<Vec<EnrolledIdentity>, StoreError> {
            Ok(Vec::new())
        }
        fn save(&self, _identities: &[EnrolledIdentity]) -> Result<(), StoreError> {
            Err(StoreError::Io {
                path: "/broken".into(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            })
        }
        fn clear(&self) -> Result<(), StoreError> {
            Ok(())
        }
        fn describe(&self) -> String {
            "broken".into()
        }
    }

    #[test]
    fn test_generated_id_format() {
        let id = generate_id(Utc::now());
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "face");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), ID_SUFFIX_LEN);
        assert!(parts[2].bytes().all(|b| BASE36.contains(&b)));
    }

    #[test]
    fn test_append_assigns_distinct_ids() {
        let mut store = IdentityStore::in_memory();
        let mut ids = HashSet::new();
        for i in 0..20 {
            ids.insert(store.append(emb(vec![i as f32, 1.0]), meta("A")).unwrap().id);
        }
        assert_eq!(store.count(), 20);
        assert_eq!(ids.len(), 20);
    }

    #[test]
    fn test_list_all_preserves_insertion_order() {
        let mut store = IdentityStore::in_memory();
        let a = store.append(emb(vec![1.0, 0.0]), meta("A")).unwrap().id;
        let b = store.append(emb(vec![0.0, 1.0]), meta("B")).unwrap().id;
        let c = store.append(emb(vec![1.0, 1.0]), meta("C")).unwrap().id;
        let ids: Vec<&str> = store.list_all().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec![a.as_str(), b.as_str(), c.as_str()]);
    }

    #[test]
    fn test_append_rejects_dimension_change() {
        let mut store = IdentityStore::in_memory();
        store.append(emb(vec![1.0, 0.0]), meta("A")).unwrap();
        let err = store.append(emb(vec![1.0, 0.0, 0.0]), meta("B")).unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { expected: 2, actual: 3 }));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_append_rejects_non_finite() {
        let mut store = IdentityStore::in_memory();
        assert!(matches!(
            store.append(emb(vec![f32::NAN]), meta("A")),
            Err(StoreError::InvalidEmbedding)
        ));
        assert!(matches!(
            store.append(emb(vec![]), meta("A")),
            Err(StoreError::InvalidEmbedding)
        ));
    }

    #[test]
    fn test_clear_all_empties_store() {
        let mut store = IdentityStore::in_memory();
        store.append(emb(vec![1.0]), meta("A")).unwrap();
        store.append(emb(vec![2.0]), meta("B")).unwrap();
        store.clear_all().unwrap();
        assert_eq!(store.count(), 0);
        assert!(store.list_all().is_empty());
    }

    #[test]
    fn test_write_failure_degrades_to_memory() {
        let mut store = IdentityStore::open(Box::new(BrokenBackend)).unwrap();
        let receipt = store.append(emb(vec![1.0, 0.0]), meta("A")).unwrap();
        assert!(!receipt.durable);
        assert!(receipt.warning.unwrap().contains("not persisted"));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_memory_backend_reports_non_durable() {
        let mut store = IdentityStore::in_memory();
        let receipt = store.append(emb(vec![1.0, 0.0]), meta("A")).unwrap();
        assert!(!receipt.durable);
        assert!(receipt.warning.unwrap().contains("memory only"));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_file_backend_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("identities.json");

        let first_id = {
            let mut store = IdentityStore::open(Box::new(JsonFileBackend::new(&path))).unwrap();
            let receipt = store.append(emb(vec![0.25, -0.5]), meta("A1")).unwrap();
            assert!(receipt.durable);
            assert!(receipt.warning.is_none());
            receipt.id
        };

        let store = IdentityStore::open(Box::new(JsonFileBackend::new(&path))).unwrap();
        assert_eq!(store.count(), 1);
        let identity = &store.list_all()[0];
        assert_eq!(identity.id, first_id);
        assert_eq!(identity.embedding.values, vec![0.25, -0.5]);
        assert_eq!(identity.embedding.model_version.as_deref(), Some("test-v1"));
        assert_eq!(identity.metadata["applicantId"].as_str(), Some("A1"));
        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_file_backend_clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identities.json");
        let mut store = IdentityStore::open(Box::new(JsonFileBackend::new(&path))).unwrap();
        store.append(emb(vec![1.0]), meta("A")).unwrap();
        assert!(path.exists());

        store.clear_all().unwrap();
        assert!(!path.exists());
        let reopened = IdentityStore::open(Box::new(JsonFileBackend::new(&path))).unwrap();
        assert_eq!(reopened.count(), 0);
    }

    #[test]
    fn test_corrupt_file_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identities.json");
        fs::write(&path, b"{ not json").unwrap();
        let result = IdentityStore::open(Box::new(JsonFileBackend::new(&path)));
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_mixed_dimensions_fail_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identities.json");
        let json = r#"[
            {"id":"face-1-aaaaaaa","embedding":[1.0,0.0],"metadata":{},"createdAt":"2024-05-01T10:00:00Z"},
            {"id":"face-2-bbbbbbb","embedding":[1.0],"metadata":{},"createdAt":"2024-05-01T10:00:01Z"}
        ]"#;
        fs::write(&path, json).unwrap();
        let result = IdentityStore::open(Box::new(JsonFileBackend::new(&path)));
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_persisted_layout_field_names() {
        let mut store = IdentityStore::in_memory();
        store.append(emb(vec![0.5]), meta("A1")).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&encode_identities(store.list_all()).unwrap()).unwrap();
        let record = &json[0];
        assert!(record["id"].as_str().unwrap().starts_with("face-"));
        assert_eq!(record["embedding"], serde_json::json!([0.5]));
        assert_eq!(record["metadata"]["applicantId"], "A1");
        assert!(record["createdAt"].is_string());
        assert_eq!(record["modelVersion"], "test-v1");
    }

    #[test]
    fn test_legacy_records_without_model_version() {
        let json = br#"[{"id":"face-1-abcdefg","embedding":[0.1,0.2],"metadata":{"applicantId":"A9"},"createdAt":"2024-05-01T10:00:00.123Z"}]"#;
        let identities = decode_identities(json).unwrap();
        assert_eq!(identities[0].embedding.model_version, None);
        let encoded = String::from_utf8(encode_identities(&identities).unwrap()).unwrap();
        assert!(!encoded.contains("modelVersion"));
    }

    #[test]
    fn test_round_trip_is_identical() {
        let mut store = IdentityStore::in_memory();
        store.append(emb(vec![0.1, -0.333_333_34, 1e-7]), meta("A1")).unwrap();
        store.append(emb(vec![0.7, 0.0, -1.5]), meta("B2")).unwrap();

        let first = encode_identities(store.list_all()).unwrap();
        let decoded = decode_identities(&first).unwrap();
        let second = encode_identities(&decoded).unwrap();

        assert_eq!(first, second);
        assert_eq!(decoded, store.list_all());
    }
}
