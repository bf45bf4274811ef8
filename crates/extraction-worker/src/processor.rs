//! Extraction processor
//!
//! Runs the three ordered phases per claimed document:
//! (a) parse into page-addressable chunks, (b) candidate generation via the
//! inference call, (c) packaging into a provenance-stamped submission.
//! Each phase's output is persisted as an artifact before the next phase
//! starts, so a crash resumes from the last completed phase instead of
//! re-running everything.

use crate::errors::ExtractionError;
use crate::parser::{parse_document, PageChunk};
use backoff::{future::retry, Error as BackoffError, ExponentialBackoffBuilder};
use docsift_common::db::models::RecordKind;
use docsift_common::db::{Repository, StagedLink, StagedRecord, StagedSubmission};
use docsift_common::inference::{CandidateExtractor, CandidateFinding};
use docsift_common::lifecycle::{ClaimedDocument, SourceStore};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const PARSED_ARTIFACT: &str = "parsed.json";
const CANDIDATES_ARTIFACT: &str = "candidates.json";

/// Candidate findings for one chunk, with the provenance excerpt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkCandidates {
    pub page: i32,
    pub chunk_index: i32,
    pub excerpt: String,
    pub findings: Vec<CandidateFinding>,
}

/// Result of a completed process call
#[derive(Debug, Clone)]
pub struct StagedOutcome {
    pub submission_id: Uuid,
    pub record_count: usize,
    pub link_count: usize,
}

/// Processor configuration
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Maximum characters per chunk sent to inference
    pub chunk_size: usize,
    /// Maximum characters kept as a provenance excerpt
    pub excerpt_len: usize,
    /// Directory holding per-document phase artifacts
    pub artifacts_dir: PathBuf,
}

/// Extraction processor
pub struct ExtractionProcessor {
    repository: Repository,
    store: SourceStore,
    extractor: Arc<dyn CandidateExtractor>,
    config: ProcessorConfig,
}

impl ExtractionProcessor {
    pub fn new(
        repository: Repository,
        store: SourceStore,
        extractor: Arc<dyn CandidateExtractor>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            repository,
            store,
            extractor,
            config,
        }
    }

    /// Process one claimed document through all three phases
    #[instrument(skip(self, doc), fields(document = %doc.name, model = %model_tag))]
    pub async fn process(
        &self,
        doc: &ClaimedDocument,
        model_tag: &str,
    ) -> Result<StagedOutcome, ExtractionError> {
        info!("Processing document");

        // Phase (a): parse
        let chunks = match self.load_artifact::<Vec<PageChunk>>(&doc.name, PARSED_ARTIFACT)? {
            Some(chunks) => {
                debug!(chunk_count = chunks.len(), "Resuming from parsed artifact");
                chunks
            }
            None => {
                let chunks = parse_document(&doc.path, self.config.chunk_size)?;
                self.save_artifact(&doc.name, PARSED_ARTIFACT, &chunks)?;
                chunks
            }
        };

        // Phase (b): candidate generation
        let candidates =
            match self.load_artifact::<Vec<ChunkCandidates>>(&doc.name, CANDIDATES_ARTIFACT)? {
                Some(candidates) => {
                    debug!(chunk_count = candidates.len(), "Resuming from candidates artifact");
                    candidates
                }
                None => {
                    let candidates = self.generate_candidates(&chunks, model_tag).await?;
                    self.save_artifact(&doc.name, CANDIDATES_ARTIFACT, &candidates)?;
                    candidates
                }
            };

        // Phase (c): package and stage
        let staged = self.package(doc, model_tag, &candidates)?;
        let record_count = staged.records.len();
        let link_count = staged.links.len();

        // Write-time lease check: a reclaimed document's result is discarded
        self.store.verify(&doc.name, doc.token)?;

        // Storage hiccups are retried with bounded backoff before escalating
        let policy = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(std::time::Duration::from_secs(30)))
            .build();
        let submission = retry(policy, || {
            let staged = staged.clone();
            async move {
                self.repository.stage_submission(staged).await.map_err(|e| {
                    if e.is_transient() {
                        BackoffError::transient(e)
                    } else {
                        BackoffError::permanent(e)
                    }
                })
            }
        })
        .await?;

        self.clear_artifacts(&doc.name);

        info!(
            submission_id = %submission.id,
            records = record_count,
            links = link_count,
            "Document staged"
        );

        Ok(StagedOutcome {
            submission_id: submission.id,
            record_count,
            link_count,
        })
    }

    async fn generate_candidates(
        &self,
        chunks: &[PageChunk],
        model_tag: &str,
    ) -> Result<Vec<ChunkCandidates>, ExtractionError> {
        let mut candidates = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let findings = self.extractor.propose(model_tag, &chunk.content).await?;
            debug!(
                page = chunk.page,
                chunk_index = chunk.index,
                findings = findings.len(),
                "Chunk inferred"
            );
            candidates.push(ChunkCandidates {
                page: chunk.page,
                chunk_index: chunk.index,
                excerpt: truncate_chars(&chunk.content, self.config.excerpt_len),
                findings,
            });
        }

        Ok(candidates)
    }

    /// Build the staged submission: provenance from the originating chunk,
    /// and a link from every option to every vulnerability proposed in the
    /// same chunk.
    fn package(
        &self,
        doc: &ClaimedDocument,
        model_tag: &str,
        candidates: &[ChunkCandidates],
    ) -> Result<StagedSubmission, ExtractionError> {
        let content_hash = self.store.content_hash(&doc.name).ok();

        let mut records = Vec::new();
        let mut links = Vec::new();

        for chunk in candidates {
            let first = records.len();
            for finding in &chunk.findings {
                records.push(StagedRecord {
                    kind: finding.kind,
                    title: finding.title.clone(),
                    body: finding.body.clone(),
                    source_file: Some(doc.name.clone()),
                    source_page: Some(chunk.page),
                    source_excerpt: Some(chunk.excerpt.clone()),
                });
            }

            let chunk_range = first..records.len();
            for vuln_idx in chunk_range.clone() {
                if records[vuln_idx].kind != RecordKind::Vulnerability {
                    continue;
                }
                for option_idx in chunk_range.clone() {
                    if records[option_idx].kind == RecordKind::OptionForConsideration {
                        links.push(StagedLink {
                            vulnerability: vuln_idx,
                            option: option_idx,
                        });
                    }
                }
            }
        }

        Ok(StagedSubmission {
            source_file: doc.name.clone(),
            content_hash,
            model_tag: model_tag.to_string(),
            records,
            links,
        })
    }

    fn artifact_dir(&self, document: &str) -> PathBuf {
        self.config.artifacts_dir.join(document)
    }

    fn load_artifact<T: DeserializeOwned>(
        &self,
        document: &str,
        artifact: &str,
    ) -> Result<Option<T>, ExtractionError> {
        let path = self.artifact_dir(document).join(artifact);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ExtractionError::ArtifactError(format!("{}: {}", path.display(), e)))
    }

    fn save_artifact<T: Serialize>(
        &self,
        document: &str,
        artifact: &str,
        value: &T,
    ) -> Result<(), ExtractionError> {
        let dir = self.artifact_dir(document);
        std::fs::create_dir_all(&dir)?;
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| ExtractionError::ArtifactError(e.to_string()))?;
        std::fs::write(dir.join(artifact), bytes)?;
        Ok(())
    }

    fn clear_artifacts(&self, document: &str) {
        let _ = std::fs::remove_dir_all(self.artifact_dir(document));
    }
}

/// Character-boundary-safe prefix
fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsift_common::audit::AuditGateway;
    use docsift_common::db::models::{AuditStatus, ProductionRecordEntity};
    use docsift_common::db::schema::create_schema;
    use docsift_common::db::DbPool;
    use docsift_common::inference::KeywordExtractor;
    use docsift_common::lifecycle::Bucket;
    use docsift_common::policy::UserRole;
    use docsift_common::promotion::PromotionEngine;
    use sea_orm::{Database, EntityTrait};
    use std::time::Duration;

    const SURVEY_TEXT: &str = "\
The perimeter fence on the north side was unsecured at the time of the visit.\n\
Management should consider installing anti-climb fencing along that stretch.\n\
The visitor log is reviewed weekly by the facility manager.\n";

    struct Fixture {
        pool: DbPool,
        repo: Repository,
        store: SourceStore,
        processor: ExtractionProcessor,
    }

    async fn fixture(lease_ttl: Duration) -> Fixture {
        let conn = Database::connect("sqlite::memory:").await.unwrap();
        create_schema(&conn).await.unwrap();
        let pool = DbPool::from_connection(conn);
        let repo = Repository::new(pool.clone());

        let root = std::env::temp_dir().join(format!("docsift-proc-{}", Uuid::new_v4()));
        let store = SourceStore::open(&root, lease_ttl, 3).unwrap();

        let processor = ExtractionProcessor::new(
            repo.clone(),
            store.clone(),
            Arc::new(KeywordExtractor),
            ProcessorConfig {
                chunk_size: 200,
                excerpt_len: 300,
                artifacts_dir: root.join("artifacts"),
            },
        );

        Fixture {
            pool,
            repo,
            store,
            processor,
        }
    }

    fn write_incoming(fx: &Fixture, name: &str, content: &str) {
        let path = fx.store.bucket_path(Bucket::Incoming).join(name);
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_end_to_end_extract_accept_promote() {
        let fx = fixture(Duration::from_secs(60)).await;
        write_incoming(&fx, "north-survey.txt", SURVEY_TEXT);

        let doc = fx.store.claim("worker-1").unwrap().unwrap();
        let outcome = fx.processor.process(&doc, "baseline-v1").await.unwrap();
        assert!(outcome.record_count >= 2);

        // Every staged record carries non-empty provenance
        let records = fx.repo.records_by_submission(outcome.submission_id).await.unwrap();
        assert_eq!(records.len(), outcome.record_count);
        for record in &records {
            assert_eq!(record.source_file.as_deref(), Some("north-survey.txt"));
            assert!(record.source_page.unwrap() >= 1);
            let excerpt = record.source_excerpt.as_deref().unwrap();
            assert!(!excerpt.is_empty());
            assert!(excerpt.chars().count() <= 300);
            assert_eq!(record.status(), AuditStatus::Pending);
        }

        fx.store.advance(&doc.name, doc.token, Bucket::Processed).unwrap();

        // Accept everything and promote
        let gateway = AuditGateway::new(fx.repo.clone());
        for record in &records {
            gateway
                .set_audit_status(record.id, AuditStatus::Accepted, UserRole::Spsa)
                .await
                .unwrap();
        }

        let engine = PromotionEngine::new(fx.pool.clone());
        let report = engine.promote(outcome.submission_id, UserRole::Spsa).await.unwrap();
        assert_eq!(report.created.len(), records.len());

        // All production rows trace back to the source document
        let production = ProductionRecordEntity::find().all(fx.pool.read()).await.unwrap();
        assert_eq!(production.len(), records.len());
        for row in &production {
            assert_eq!(row.source_file.as_deref(), Some("north-survey.txt"));
            assert!(row.source_page.unwrap() >= 1);
        }
    }

    #[tokio::test]
    async fn test_resume_uses_persisted_parse_artifact() {
        let fx = fixture(Duration::from_secs(60)).await;
        write_incoming(&fx, "survey.txt", SURVEY_TEXT);

        let doc = fx.store.claim("worker-1").unwrap().unwrap();

        // A previous attempt completed phase (a) before crashing; its
        // artifact, not the file on disk, must drive this attempt.
        let parsed = vec![PageChunk {
            page: 9,
            index: 0,
            content: "The control room door was unlocked overnight.".to_string(),
        }];
        fx.processor.save_artifact(&doc.name, PARSED_ARTIFACT, &parsed).unwrap();

        let outcome = fx.processor.process(&doc, "baseline-v1").await.unwrap();
        assert_eq!(outcome.record_count, 1);

        let records = fx.repo.records_by_submission(outcome.submission_id).await.unwrap();
        assert_eq!(records[0].source_page, Some(9));
    }

    #[tokio::test]
    async fn test_stale_lease_discards_late_result() {
        let fx = fixture(Duration::ZERO).await;
        write_incoming(&fx, "survey.txt", SURVEY_TEXT);

        let first = fx.store.claim("worker-1").unwrap().unwrap();

        // The lease expires and another worker reclaims the document
        fx.store.release_stale().unwrap();
        let _second = fx.store.claim("worker-2").unwrap().unwrap();

        // The original worker finishes late; its result must be discarded
        let err = fx.processor.process(&first, "baseline-v1").await.unwrap_err();
        assert!(matches!(err, ExtractionError::StaleLease(_)));

        // Nothing was double-written
        let staged = fx.repo.list_records(Default::default()).await.unwrap();
        assert!(staged.is_empty());
    }

    #[tokio::test]
    async fn test_vulnerability_and_option_in_same_chunk_are_linked() {
        let fx = fixture(Duration::from_secs(60)).await;
        write_incoming(
            &fx,
            "linked.txt",
            "The side entrance was unsecured. Staff should consider a badge reader there.",
        );

        let doc = fx.store.claim("worker-1").unwrap().unwrap();
        let outcome = fx.processor.process(&doc, "baseline-v1").await.unwrap();

        assert_eq!(outcome.record_count, 2);
        assert_eq!(outcome.link_count, 1);

        let links = fx.repo.links_by_submission(outcome.submission_id).await.unwrap();
        assert_eq!(links.len(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_document_is_permanent() {
        let fx = fixture(Duration::from_secs(60)).await;
        write_incoming(&fx, "scan.pdf", "not actually pdf bytes");

        let doc = fx.store.claim("worker-1").unwrap().unwrap();
        let err = fx.processor.process(&doc, "baseline-v1").await.unwrap_err();
        assert!(err.is_permanent());
    }
}
