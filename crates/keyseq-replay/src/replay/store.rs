//! File-backed document store.
//!
//! Each document lives in `<root>/<id>.json`. A write serializes the whole
//! document to `<id>.json.tmp` and renames it over the live file, so readers
//! only ever see complete revisions. The temporary name is fixed per document:
//! concurrent writes to the same document would trample each other, which is
//! exactly what routing them through the write coordinator prevents.

use serde::{Deserialize, Serialize};
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::fs;

/// One persisted revision of a document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    /// Sequence number of the write that produced this revision.
    pub revision: u64,
    pub body: String,
    /// Set by the document's final write.
    pub complete: bool,
}

#[derive(Clone, Debug)]
pub struct DocumentStore {
    root: Arc<Path>,
}

impl DocumentStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root: PathBuf = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root: root.into() })
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    pub async fn write(&self, document: &Document) -> io::Result<()> {
        let live = self.path_for(&document.id);
        let staged = live.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(document)?;
        fs::write(&staged, bytes).await?;
        fs::rename(&staged, &live).await
    }

    /// Reads the live revision of `id`, or `None` if it was never written.
    pub async fn read(&self, id: &str) -> io::Result<Option<Document>> {
        match fs::read(self.path_for(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}
