use serde::Serialize;

/// Outcome of streaming one document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DocumentReport {
    pub id: String,
    /// Writes that ran and succeeded.
    pub written: u64,
    /// Writes that ran and failed.
    pub failed: u64,
    /// Writes refused because the document was already closed.
    pub skipped: u64,
    /// Submissions retried after the document hit its pending limit.
    pub deferred: u64,
    /// Revision found in the store after the document drained.
    pub persisted_revision: Option<u64>,
    /// The persisted revision is the final write's and carries the full body.
    pub verified: bool,
    /// The document drained within the wait timeout.
    pub drained: bool,
}

impl DocumentReport {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub const fn is_success(&self) -> bool {
        self.verified && self.drained
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub documents: usize,
    pub written: u64,
    pub failed: u64,
    pub skipped: u64,
    pub deferred: u64,
    pub unverified: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub totals: Totals,
    pub documents: Vec<DocumentReport>,
}

impl ReplayReport {
    pub fn from_documents(mut documents: Vec<DocumentReport>) -> Self {
        documents.sort_by(|a, b| a.id.cmp(&b.id));
        let totals = documents.iter().fold(
            Totals {
                documents: documents.len(),
                ..Totals::default()
            },
            |mut totals, document| {
                totals.written += document.written;
                totals.failed += document.failed;
                totals.skipped += document.skipped;
                totals.deferred += document.deferred;
                if !document.is_success() {
                    totals.unverified += 1;
                }
                totals
            },
        );
        Self { totals, documents }
    }

    pub const fn is_success(&self) -> bool {
        self.totals.unverified == 0
    }
}
