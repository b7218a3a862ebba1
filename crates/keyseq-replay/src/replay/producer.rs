//! Simulated streaming producers.
//!
//! Each producer owns one document and streams it the way a long-running
//! generator would: every edit re-submits the whole body accumulated so far,
//! and the last edit is submitted as the document's final write. All writes
//! go through the shared [`TokioWriteCoordinator`], keyed by document id, so
//! the store sees them one at a time in submission order.

use crate::replay::{
    config::ReplayConfig,
    report::{DocumentReport, ReplayReport},
    store::{Document, DocumentStore},
};
use anyhow::{Context, bail};
use core::time::Duration;
use futures::{
    FutureExt,
    channel::oneshot,
    future::{Shared, join_all},
};
use keyseq::{Error, Submission, TokioWriteCoordinator, WriteCoordinatorTokioExt};
use rand::Rng;
use std::{io, sync::Arc};

/// Streams every configured document concurrently and collects the outcome.
pub async fn run_replay(
    coordinator: TokioWriteCoordinator<String>,
    store: DocumentStore,
    config: Arc<ReplayConfig>,
) -> anyhow::Result<ReplayReport> {
    let producers = (0..config.documents).map(|n| {
        let id = format!("doc-{n}");
        tokio::spawn(run_producer(
            id,
            coordinator.clone(),
            store.clone(),
            Arc::clone(&config),
        ))
    });

    let mut documents = Vec::with_capacity(config.documents);
    for joined in join_all(producers).await {
        documents.push(joined.context("producer task panicked")??);
    }
    Ok(ReplayReport::from_documents(documents))
}

/// Streams one document, waits for it to drain and verifies what landed in
/// the store.
#[tracing::instrument(skip_all, fields(document = %id))]
pub async fn run_producer(
    id: String,
    coordinator: TokioWriteCoordinator<String>,
    store: DocumentStore,
    config: Arc<ReplayConfig>,
) -> anyhow::Result<DocumentReport> {
    let mut report = DocumentReport::new(id.clone());
    let mut body = String::new();
    let mut submissions = Vec::with_capacity(config.edits_per_document as usize + 1);

    let mut release_final = None;

    for edit in 0..config.edits_per_document {
        body.push_str(&format!("[edit {edit}] "));
        let is_final = edit + 1 == config.edits_per_document;
        let inject_failure =
            !is_final && config.fail_every.is_some_and(|every| (edit + 1) % every == 0);
        // The final write is held back until the late write has been
        // submitted, so the document cannot drain and reopen in between.
        let gate = (is_final && config.late_writes).then(|| {
            let (release, gate) = oneshot::channel();
            release_final = Some(release);
            gate.shared()
        });
        let write = Edit {
            document: Document {
                id: id.clone(),
                revision: edit,
                body: body.clone(),
                complete: is_final,
            },
            inject_failure,
            gate,
        };

        let submission = submit_edit(&coordinator, &store, &config, write, &mut report).await;

        // This producer is the only writer for its document, so sequence
        // numbers line up with edit indices.
        if submission.sequence_number() != edit || submission.is_skipped() {
            bail!(
                "edit {edit} of {id} was assigned sequence {} (skipped: {})",
                submission.sequence_number(),
                submission.is_skipped()
            );
        }
        submissions.push(submission);

        if !is_final {
            jitter(config.max_jitter).await;
        }
    }

    if let Some(release) = release_final {
        let late = Edit {
            document: Document {
                id: id.clone(),
                revision: config.edits_per_document,
                body: "late write".to_string(),
                complete: false,
            },
            inject_failure: false,
            gate: None,
        };
        let store = store.clone();
        let submission = coordinator.submit(id.clone(), move || persist(store, late));
        if !submission.is_skipped() {
            bail!("late write for {id} was accepted after the final write");
        }
        submissions.push(submission);
        let _ = release.send(());
    }

    report.drained = match coordinator
        .wait_until_timeout(&id, None, config.wait_timeout)
        .await
    {
        Ok(()) => true,
        Err(Error::TimedOut) => {
            tracing::error!(timeout = ?config.wait_timeout, "document did not drain");
            return Ok(report);
        }
        Err(err) => return Err(err.into()),
    };

    for outcome in join_all(submissions).await {
        match outcome {
            Ok(result) if result.skipped => report.skipped += 1,
            Ok(_) => report.written += 1,
            Err(err) => {
                tracing::warn!(error = %err, "write failed");
                report.failed += 1;
            }
        }
    }

    let persisted = store
        .read(&id)
        .await
        .with_context(|| format!("failed to read back {id}"))?;
    let final_revision = config.edits_per_document - 1;
    report.persisted_revision = persisted.as_ref().map(|document| document.revision);
    report.verified = persisted.is_some_and(|document| {
        document.revision == final_revision && document.complete && document.body == body
    });

    if report.verified {
        tracing::info!(
            written = report.written,
            failed = report.failed,
            skipped = report.skipped,
            "document verified"
        );
    } else {
        tracing::error!(
            expected = final_revision,
            found = ?report.persisted_revision,
            "persisted document does not match the final write"
        );
    }

    Ok(report)
}

type Gate = Shared<oneshot::Receiver<()>>;

/// One revision on its way to the store.
#[derive(Clone)]
struct Edit {
    document: Document,
    inject_failure: bool,
    /// Holds the write back until released. A dropped release also lets it
    /// through.
    gate: Option<Gate>,
}

/// Submits one edit, backing off while the document is at its pending limit.
async fn submit_edit(
    coordinator: &TokioWriteCoordinator<String>,
    store: &DocumentStore,
    config: &ReplayConfig,
    write: Edit,
    report: &mut DocumentReport,
) -> Submission<io::Error> {
    let key = write.document.id.clone();
    let is_final = write.document.complete;

    if config.max_pending.is_none() {
        let store = store.clone();
        return coordinator.submit_with(key, move || persist(store, write), is_final);
    }

    loop {
        let store = store.clone();
        let attempt = write.clone();
        match coordinator.try_submit(key.clone(), move || persist(store, attempt), is_final) {
            Ok(submission) => return submission,
            Err(_saturated) => {
                report.deferred += 1;
                // Wait for the oldest unsettled write before retrying.
                let oldest = coordinator
                    .snapshot(&key)
                    .and_then(|snapshot| snapshot.last_completed)
                    .map_or(0, |last| last + 1);
                tracing::debug!(oldest, "pending limit reached, backing off");
                coordinator.wait_until(&key, Some(oldest)).await;
            }
        }
    }
}

/// The write handed to the coordinator: persists one revision.
async fn persist(store: DocumentStore, write: Edit) -> io::Result<()> {
    if let Some(gate) = write.gate {
        let _ = gate.await;
    }
    if write.inject_failure {
        return Err(io::Error::other(format!(
            "injected failure writing revision {} of {}",
            write.document.revision, write.document.id
        )));
    }
    store.write(&write.document).await
}

async fn jitter(max: Duration) {
    if max.is_zero() {
        return;
    }
    let pause = Duration::from_millis(rand::rng().random_range(0..=max.as_millis() as u64));
    tokio::time::sleep(pause).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::num::NonZeroUsize;
    use keyseq::CoordinatorConfig;
    use std::path::PathBuf;

    fn config(output_dir: PathBuf) -> ReplayConfig {
        ReplayConfig {
            documents: 4,
            edits_per_document: 12,
            output_dir,
            max_jitter: Duration::from_millis(1),
            fail_every: None,
            late_writes: false,
            max_pending: None,
            wait_timeout: Duration::from_secs(10),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn replay_persists_final_revision_of_every_document() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path().to_path_buf());
        let store = DocumentStore::open(&config.output_dir).await.unwrap();
        let coordinator = TokioWriteCoordinator::new();

        let report = run_replay(coordinator.clone(), store.clone(), Arc::new(config))
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.totals.documents, 4);
        assert_eq!(report.totals.written, 4 * 12);
        assert_eq!(report.totals.failed, 0);
        assert_eq!(coordinator.active_keys(), 0);

        let document = store.read("doc-3").await.unwrap().unwrap();
        assert_eq!(document.revision, 11);
        assert!(document.complete);
        assert!(document.body.ends_with("[edit 11] "));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn injected_failures_and_late_writes_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let config = ReplayConfig {
            fail_every: Some(3),
            late_writes: true,
            ..config(dir.path().to_path_buf())
        };
        let store = DocumentStore::open(&config.output_dir).await.unwrap();
        let coordinator = TokioWriteCoordinator::new();

        let report = run_replay(coordinator.clone(), store, Arc::new(config))
            .await
            .unwrap();

        assert!(report.is_success());
        for document in &report.documents {
            // Edits 3, 6 and 9 (1-based) fail; the final edit never does.
            assert_eq!(document.failed, 3);
            assert_eq!(document.written, 9);
            assert_eq!(document.skipped, 1);
            assert_eq!(document.persisted_revision, Some(11));
        }
        assert_eq!(coordinator.active_keys(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn pending_limit_defers_instead_of_reordering() {
        let dir = tempfile::tempdir().unwrap();
        let limit = NonZeroUsize::new(1).unwrap();
        let config = ReplayConfig {
            max_jitter: Duration::ZERO,
            max_pending: Some(limit),
            ..config(dir.path().to_path_buf())
        };
        let store = DocumentStore::open(&config.output_dir).await.unwrap();
        let coordinator = TokioWriteCoordinator::with_tokio_config(
            CoordinatorConfig::new().with_max_pending_per_key(limit),
        );

        let report = run_replay(coordinator, store, Arc::new(config))
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.totals.written, 4 * 12);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn late_write_is_skipped_even_when_edits_are_slow() {
        let dir = tempfile::tempdir().unwrap();
        let config = ReplayConfig {
            documents: 1,
            edits_per_document: 3,
            max_jitter: Duration::from_millis(50),
            late_writes: true,
            ..config(dir.path().to_path_buf())
        };
        let store = DocumentStore::open(&config.output_dir).await.unwrap();
        let coordinator = TokioWriteCoordinator::new();

        for _ in 0..3 {
            let report = run_producer(
                "doc-0".to_string(),
                coordinator.clone(),
                store.clone(),
                Arc::new(config.clone()),
            )
            .await
            .unwrap();

            assert!(report.is_success());
            assert_eq!(report.written, 3);
            assert_eq!(report.skipped, 1);
            assert_eq!(coordinator.active_keys(), 0);
        }

        let document = store.read("doc-0").await.unwrap().unwrap();
        assert_eq!(document.revision, 2);
        assert!(document.complete);
        assert_ne!(document.body, "late write");
    }
}
