//! Document lifecycle manager
//!
//! The source store holds documents in bucket directories
//! (incoming/processing/processed/library); the physical file move is the
//! durability anchor. A claim is an atomic rename into `processing/` plus a
//! JSON lease sidecar (owner, token, timestamp, attempt count), so a
//! restarted manager reconstructs all in-flight state from the filesystem
//! alone. Expired leases make documents claimable again; a late write from
//! the original claimant is detected by token comparison and rejected.

use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

const LEASE_SUFFIX: &str = ".lease.json";
const META_SUFFIX: &str = ".meta.json";
const FAILED_SUFFIX: &str = ".failed.json";
const SCAN_REQUEST_FILE: &str = ".scan-request";

/// Lifecycle buckets; a document occupies exactly one at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Incoming,
    Processing,
    Processed,
    Library,
}

impl Bucket {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Bucket::Incoming => "incoming",
            Bucket::Processing => "processing",
            Bucket::Processed => "processed",
            Bucket::Library => "library",
        }
    }

    pub const ALL: [Bucket; 4] = [
        Bucket::Incoming,
        Bucket::Processing,
        Bucket::Processed,
        Bucket::Library,
    ];
}

/// Lease sidecar written next to a claimed document in processing/
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    pub owner: String,
    pub token: Uuid,
    pub claimed_at: DateTime<Utc>,
    pub attempts: u32,
}

/// Retry metadata carried with a document while it waits in incoming/
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMeta {
    #[serde(default)]
    pub attempts: u32,
}

/// Dead-letter marker written next to a document in library/
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureMarker {
    pub reason: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

/// A successfully claimed document
#[derive(Debug, Clone)]
pub struct ClaimedDocument {
    pub name: String,
    /// Path inside processing/
    pub path: PathBuf,
    pub token: Uuid,
    pub attempts: u32,
}

/// Outcome of a stale-lease sweep
#[derive(Debug, Clone, Default)]
pub struct ReclaimReport {
    pub requeued: Vec<String>,
    pub dead_lettered: Vec<String>,
}

/// Filesystem-backed source store
#[derive(Debug, Clone)]
pub struct SourceStore {
    root: PathBuf,
    lease_ttl: Duration,
    max_attempts: u32,
}

impl SourceStore {
    /// Open (and create if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>, lease_ttl: Duration, max_attempts: u32) -> Result<Self> {
        let root = root.into();
        for bucket in Bucket::ALL {
            fs::create_dir_all(root.join(bucket.dir_name()))?;
        }
        Ok(Self {
            root,
            lease_ttl,
            max_attempts,
        })
    }

    fn bucket_dir(&self, bucket: Bucket) -> PathBuf {
        self.root.join(bucket.dir_name())
    }

    /// Directory backing a bucket (ingest drop-off, dead-letter inspection)
    pub fn bucket_path(&self, bucket: Bucket) -> PathBuf {
        self.bucket_dir(bucket)
    }

    fn lease_path(&self, name: &str) -> PathBuf {
        self.bucket_dir(Bucket::Processing)
            .join(format!("{}{}", name, LEASE_SUFFIX))
    }

    fn meta_path(&self, name: &str) -> PathBuf {
        self.bucket_dir(Bucket::Incoming)
            .join(format!("{}{}", name, META_SUFFIX))
    }

    fn is_sidecar(name: &str) -> bool {
        name.starts_with('.')
            || name.ends_with(LEASE_SUFFIX)
            || name.ends_with(META_SUFFIX)
            || name.ends_with(FAILED_SUFFIX)
    }

    /// Document names present in a bucket (sidecars excluded), oldest first
    pub fn documents_in(&self, bucket: Bucket) -> Result<Vec<String>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.bucket_dir(bucket))? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if Self::is_sidecar(&name) || !entry.file_type()?.is_file() {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            entries.push((modified, name));
        }
        entries.sort();
        Ok(entries.into_iter().map(|(_, name)| name).collect())
    }

    /// Atomically claim one document from incoming into processing.
    ///
    /// Returns None when incoming is empty. The rename is the atomicity
    /// primitive: two workers racing for the same file see exactly one
    /// rename succeed.
    pub fn claim(&self, owner: &str) -> Result<Option<ClaimedDocument>> {
        for name in self.documents_in(Bucket::Incoming)? {
            let from = self.bucket_dir(Bucket::Incoming).join(&name);
            let to = self.bucket_dir(Bucket::Processing).join(&name);

            if fs::rename(&from, &to).is_err() {
                // Another worker claimed it between listing and rename
                continue;
            }

            let meta = self.read_meta(&name).unwrap_or_default();
            let _ = fs::remove_file(self.meta_path(&name));

            let lease = Lease {
                owner: owner.to_string(),
                token: Uuid::new_v4(),
                claimed_at: Utc::now(),
                attempts: meta.attempts + 1,
            };
            self.write_lease(&name, &lease)?;

            debug!(document = %name, owner = %owner, attempt = lease.attempts, "Document claimed");

            return Ok(Some(ClaimedDocument {
                path: to,
                token: lease.token,
                attempts: lease.attempts,
                name,
            }));
        }

        Ok(None)
    }

    /// Advance a claimed document out of processing.
    ///
    /// Idempotent: if the document already sits in the target bucket the call
    /// is a no-op. A token mismatch means the lease was reclaimed while the
    /// caller was working; the caller must discard its result. A document in
    /// neither bucket is a lifecycle conflict and the caller should trigger
    /// a reconciliation scan.
    pub fn advance(&self, name: &str, token: Uuid, to: Bucket) -> Result<()> {
        let target = self.bucket_dir(to).join(name);
        let source = self.bucket_dir(Bucket::Processing).join(name);

        if target.exists() && !source.exists() {
            debug!(document = %name, bucket = to.dir_name(), "Advance is a no-op, already in target");
            return Ok(());
        }

        if !source.exists() {
            return Err(AppError::Conflict {
                message: format!("Document {} is not in processing", name),
            });
        }

        self.check_token(name, token)?;

        fs::rename(&source, &target)?;
        let _ = fs::remove_file(self.lease_path(name));

        info!(document = %name, bucket = to.dir_name(), "Document advanced");
        Ok(())
    }

    /// Return a claimed document to incoming for another attempt, or
    /// dead-letter it once the retry ceiling is reached.
    pub fn requeue(&self, name: &str, token: Uuid, reason: &str) -> Result<()> {
        let source = self.bucket_dir(Bucket::Processing).join(name);
        if !source.exists() {
            return Err(AppError::Conflict {
                message: format!("Document {} is not in processing", name),
            });
        }

        let lease = self.check_token(name, token)?;

        if lease.attempts >= self.max_attempts {
            return self.dead_letter(name, &lease, reason);
        }

        let target = self.bucket_dir(Bucket::Incoming).join(name);
        fs::rename(&source, &target)?;
        self.write_meta(name, &DocumentMeta { attempts: lease.attempts })?;
        let _ = fs::remove_file(self.lease_path(name));

        warn!(document = %name, attempt = lease.attempts, reason = %reason, "Document requeued");
        Ok(())
    }

    /// Permanent-failure path: straight to the dead-letter marker in library
    pub fn fail(&self, name: &str, token: Uuid, reason: &str) -> Result<()> {
        let source = self.bucket_dir(Bucket::Processing).join(name);
        if !source.exists() {
            return Err(AppError::Conflict {
                message: format!("Document {} is not in processing", name),
            });
        }
        let lease = self.check_token(name, token)?;
        self.dead_letter(name, &lease, reason)
    }

    /// Sweep processing for expired leases: requeue documents below the
    /// retry ceiling, dead-letter the rest. A document without a lease
    /// sidecar means the claim crashed before writing it; it is requeued
    /// immediately.
    pub fn release_stale(&self) -> Result<ReclaimReport> {
        let mut report = ReclaimReport::default();

        for name in self.documents_in(Bucket::Processing)? {
            let lease = match self.read_lease(&name) {
                Some(lease) => lease,
                None => {
                    let target = self.bucket_dir(Bucket::Incoming).join(&name);
                    fs::rename(self.bucket_dir(Bucket::Processing).join(&name), &target)?;
                    warn!(document = %name, "Leaseless document in processing, requeued");
                    report.requeued.push(name);
                    continue;
                }
            };

            let age = Utc::now().signed_duration_since(lease.claimed_at);
            let ttl = chrono::Duration::from_std(self.lease_ttl)
                .unwrap_or_else(|_| chrono::Duration::zero());
            if age <= ttl {
                continue;
            }

            if lease.attempts >= self.max_attempts {
                self.dead_letter(&name, &lease, "lease expired at retry ceiling")?;
                report.dead_lettered.push(name);
            } else {
                let target = self.bucket_dir(Bucket::Incoming).join(&name);
                fs::rename(self.bucket_dir(Bucket::Processing).join(&name), &target)?;
                self.write_meta(&name, &DocumentMeta { attempts: lease.attempts })?;
                let _ = fs::remove_file(self.lease_path(&name));
                info!(document = %name, attempt = lease.attempts, "Expired lease released, document requeued");
                report.requeued.push(name);
            }
        }

        Ok(report)
    }

    /// Confirm a claim is still current. Called at write time so a late
    /// result from a reclaimed document is discarded, never double-written.
    pub fn verify(&self, name: &str, token: Uuid) -> Result<()> {
        self.check_token(name, token).map(|_| ())
    }

    /// SHA-256 of a claimed document's bytes
    pub fn content_hash(&self, name: &str) -> Result<String> {
        let path = self.bucket_dir(Bucket::Processing).join(name);
        let bytes = fs::read(&path)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }

    /// Read a dead-letter marker, if one exists for the document
    pub fn failure_marker(&self, name: &str) -> Option<FailureMarker> {
        let path = self
            .bucket_dir(Bucket::Library)
            .join(format!("{}{}", name, FAILED_SUFFIX));
        let bytes = fs::read(path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Ask the worker pool for an immediate incoming scan (process_existing)
    pub fn request_scan(&self) -> Result<()> {
        fs::write(self.root.join(SCAN_REQUEST_FILE), b"")?;
        Ok(())
    }

    /// Consume a pending scan request, if any
    pub fn take_scan_request(&self) -> bool {
        fs::remove_file(self.root.join(SCAN_REQUEST_FILE)).is_ok()
    }

    fn dead_letter(&self, name: &str, lease: &Lease, reason: &str) -> Result<()> {
        let source = self.bucket_dir(Bucket::Processing).join(name);
        let target = self.bucket_dir(Bucket::Library).join(name);
        fs::rename(&source, &target)?;

        let marker = FailureMarker {
            reason: reason.to_string(),
            attempts: lease.attempts,
            failed_at: Utc::now(),
        };
        let marker_path = self
            .bucket_dir(Bucket::Library)
            .join(format!("{}{}", name, FAILED_SUFFIX));
        fs::write(marker_path, serde_json::to_vec_pretty(&marker)?)?;
        let _ = fs::remove_file(self.lease_path(name));

        warn!(document = %name, attempts = lease.attempts, reason = %reason, "Document dead-lettered");
        Ok(())
    }

    fn check_token(&self, name: &str, token: Uuid) -> Result<Lease> {
        let lease = self.read_lease(name).ok_or_else(|| AppError::Conflict {
            message: format!("No lease for document {}", name),
        })?;
        if lease.token != token {
            return Err(AppError::StaleLease {
                document: name.to_string(),
            });
        }
        Ok(lease)
    }

    fn read_lease(&self, name: &str) -> Option<Lease> {
        let bytes = fs::read(self.lease_path(name)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn write_lease(&self, name: &str, lease: &Lease) -> Result<()> {
        fs::write(self.lease_path(name), serde_json::to_vec_pretty(lease)?)?;
        Ok(())
    }

    fn read_meta(&self, name: &str) -> Option<DocumentMeta> {
        let bytes = fs::read(self.meta_path(name)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn write_meta(&self, name: &str, meta: &DocumentMeta) -> Result<()> {
        fs::write(self.meta_path(name), serde_json::to_vec_pretty(meta)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(lease_ttl: Duration, max_attempts: u32) -> SourceStore {
        let root = std::env::temp_dir().join(format!("docsift-store-{}", Uuid::new_v4()));
        SourceStore::open(root, lease_ttl, max_attempts).unwrap()
    }

    fn drop_document(store: &SourceStore, name: &str) {
        fs::write(store.bucket_dir(Bucket::Incoming).join(name), b"survey text").unwrap();
    }

    /// The document is in exactly one bucket at every step of the cycle
    fn bucket_census(store: &SourceStore, name: &str) -> usize {
        Bucket::ALL
            .iter()
            .filter(|b| store.bucket_dir(**b).join(name).exists())
            .count()
    }

    #[test]
    fn test_claim_moves_to_processing() {
        let store = temp_store(Duration::from_secs(60), 3);
        drop_document(&store, "site-a.txt");

        let claimed = store.claim("worker-1").unwrap().unwrap();
        assert_eq!(claimed.name, "site-a.txt");
        assert_eq!(claimed.attempts, 1);
        assert_eq!(bucket_census(&store, "site-a.txt"), 1);
        assert!(store.bucket_dir(Bucket::Processing).join("site-a.txt").exists());

        // Nothing left to claim
        assert!(store.claim("worker-2").unwrap().is_none());
    }

    #[test]
    fn test_advance_is_idempotent() {
        let store = temp_store(Duration::from_secs(60), 3);
        drop_document(&store, "site-a.txt");

        let claimed = store.claim("worker-1").unwrap().unwrap();
        store.advance("site-a.txt", claimed.token, Bucket::Processed).unwrap();
        // Re-invoking with the same target bucket is a no-op
        store.advance("site-a.txt", claimed.token, Bucket::Processed).unwrap();
        assert_eq!(bucket_census(&store, "site-a.txt"), 1);
    }

    #[test]
    fn test_advance_missing_document_is_conflict() {
        let store = temp_store(Duration::from_secs(60), 3);
        drop_document(&store, "site-a.txt");

        let claimed = store.claim("worker-1").unwrap().unwrap();
        fs::remove_file(store.bucket_dir(Bucket::Processing).join("site-a.txt")).unwrap();

        let err = store
            .advance("site-a.txt", claimed.token, Bucket::Processed)
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
    }

    #[test]
    fn test_expired_lease_reclaim_and_stale_token_discard() {
        let store = temp_store(Duration::ZERO, 3);
        drop_document(&store, "site-a.txt");

        let first = store.claim("worker-1").unwrap().unwrap();

        // TTL is zero, so the lease is immediately stale
        let report = store.release_stale().unwrap();
        assert_eq!(report.requeued, vec!["site-a.txt".to_string()]);
        assert_eq!(bucket_census(&store, "site-a.txt"), 1);

        // Another worker picks it up with a fresh token
        let second = store.claim("worker-2").unwrap().unwrap();
        assert_ne!(first.token, second.token);
        assert_eq!(second.attempts, 2);

        // The original worker's late result is discarded
        let err = store
            .advance("site-a.txt", first.token, Bucket::Processed)
            .unwrap_err();
        assert!(matches!(err, AppError::StaleLease { .. }));

        // The current claimant still advances fine
        store.advance("site-a.txt", second.token, Bucket::Processed).unwrap();
    }

    #[test]
    fn test_retry_ceiling_dead_letters() {
        let store = temp_store(Duration::ZERO, 1);
        drop_document(&store, "site-a.txt");

        store.claim("worker-1").unwrap().unwrap();
        let report = store.release_stale().unwrap();

        assert_eq!(report.dead_lettered, vec!["site-a.txt".to_string()]);
        assert!(store.bucket_dir(Bucket::Library).join("site-a.txt").exists());

        let marker = store.failure_marker("site-a.txt").unwrap();
        assert_eq!(marker.attempts, 1);
        assert!(!marker.reason.is_empty());
    }

    #[test]
    fn test_permanent_failure_path() {
        let store = temp_store(Duration::from_secs(60), 3);
        drop_document(&store, "garbled.pdf");

        let claimed = store.claim("worker-1").unwrap().unwrap();
        store.fail("garbled.pdf", claimed.token, "no extractable text").unwrap();

        assert!(store.bucket_dir(Bucket::Library).join("garbled.pdf").exists());
        let marker = store.failure_marker("garbled.pdf").unwrap();
        assert_eq!(marker.reason, "no extractable text");
    }

    #[test]
    fn test_restart_rederives_state_from_disk() {
        let root = std::env::temp_dir().join(format!("docsift-store-{}", Uuid::new_v4()));
        {
            let store = SourceStore::open(&root, Duration::ZERO, 3).unwrap();
            fs::write(store.bucket_dir(Bucket::Incoming).join("site-a.txt"), b"x").unwrap();
            store.claim("worker-1").unwrap().unwrap();
            // Manager "crashes" here with the document mid-processing
        }

        let restarted = SourceStore::open(&root, Duration::ZERO, 3).unwrap();
        let report = restarted.release_stale().unwrap();
        assert_eq!(report.requeued, vec!["site-a.txt".to_string()]);
        assert!(restarted.claim("worker-2").unwrap().is_some());
    }

    #[test]
    fn test_requeue_then_ceiling() {
        let store = temp_store(Duration::from_secs(60), 2);
        drop_document(&store, "site-a.txt");

        let first = store.claim("worker-1").unwrap().unwrap();
        store.requeue("site-a.txt", first.token, "inference timeout").unwrap();
        assert!(store.bucket_dir(Bucket::Incoming).join("site-a.txt").exists());

        let second = store.claim("worker-1").unwrap().unwrap();
        assert_eq!(second.attempts, 2);

        // Ceiling reached: requeue turns into dead-letter
        store.requeue("site-a.txt", second.token, "inference timeout").unwrap();
        assert!(store.bucket_dir(Bucket::Library).join("site-a.txt").exists());
    }

    #[test]
    fn test_scan_request_roundtrip() {
        let store = temp_store(Duration::from_secs(60), 3);
        assert!(!store.take_scan_request());
        store.request_scan().unwrap();
        assert!(store.take_scan_request());
        assert!(!store.take_scan_request());
    }

    #[test]
    fn test_content_hash_is_stable() {
        let store = temp_store(Duration::from_secs(60), 3);
        drop_document(&store, "site-a.txt");
        store.claim("worker-1").unwrap().unwrap();

        let h1 = store.content_hash("site-a.txt").unwrap();
        let h2 = store.content_hash("site-a.txt").unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }
}
