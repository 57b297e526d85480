use thiserror::Error;

// ── Error ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ScmBridgeError {
    #[cfg(feature = "rusqlite-errors")]
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("invalid payload: {0}")]
    Validation(String),
    #[error("branch not allowed: {0}")]
    BranchRejected(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, ScmBridgeError>;

// ── Domain types ──────────────────────────────────────────────────────────

/// One changed file inside a commit. Revision markers are opaque strings
/// (CVS revision numbers, svn revs, git blob ids); `None` marks the missing
/// side of an add or delete.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FileChange {
    pub filename: String,
    pub old_version: Option<String>,
    pub new_version: Option<String>,
}

/// Uniform in-memory form of one hook notification, built once by the
/// payload normalizer and passed through the pipeline unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitPayload {
    pub issue_ids: Vec<i64>,
    /// Identifier supplied by the SCM. Absent for CVS, which gets a
    /// synthetic changeset derived from the commit metadata.
    pub commit_id: Option<String>,
    pub scm_name: String,
    pub branch: String,
    pub author_name: String,
    pub author_email: String,
    pub message: String,
    /// Unix seconds.
    pub commit_date: i64,
    pub files: Vec<FileChange>,
}

/// Persisted commit record. `changeset` is unique within `scm_name`;
/// created exactly once and only ever appended to afterwards.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Commit {
    pub scm_name: String,
    pub changeset: String,
    pub branch: String,
    pub author_name: String,
    pub author_email: String,
    pub message: String,
    pub commit_date: i64,
}

impl CommitPayload {
    /// Build the commit record this payload describes, under the given
    /// changeset identifier.
    pub fn to_commit(&self, changeset: &str) -> Commit {
        Commit {
            scm_name: self.scm_name.clone(),
            changeset: changeset.to_string(),
            branch: self.branch.clone(),
            author_name: self.author_name.clone(),
            author_email: self.author_email.clone(),
            message: self.message.clone(),
            commit_date: self.commit_date,
        }
    }
}

/// Per-repository ingestion policy: glob patterns naming the branches that
/// may create new commits. Empty means every branch is allowed.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RepoPolicy {
    pub scm_name: String,
    pub allowed_branches: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IssueDetails {
    pub issue_id: i64,
    pub summary: String,
    pub status_title: String,
}

impl IssueDetails {
    /// Line format the hook scripts relay back to the committer.
    pub fn status_line(&self) -> String {
        format!("#{} - {} ({})", self.issue_id, self.summary, self.status_title)
    }
}

/// What one ingestion call did.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct IngestOutcome {
    pub changeset: String,
    /// True when this call created the commit row; false on the append
    /// path taken by repeated CVS per-directory pings.
    pub created: bool,
    pub files_added: usize,
    pub issues_linked: usize,
    pub status_lines: Vec<String>,
}

/// Full detail of a stored commit, for the `show` surface.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CommitDetail {
    pub commit: Commit,
    pub files: Vec<FileChange>,
    pub issue_ids: Vec<i64>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RepoStats {
    pub scm_name: String,
    pub commit_count: usize,
    pub last_commit_date: Option<i64>,
}

// ── Core traits ───────────────────────────────────────────────────────────

pub trait CommitStore: Send + Sync {
    fn find_by_changeset(&self, scm_name: &str, changeset: &str) -> Result<Option<Commit>>;
    /// Atomic create-if-absent keyed by (scm_name, changeset). Returns true
    /// when this call inserted the row, false when it already existed.
    fn insert_commit(&self, commit: &Commit) -> Result<bool>;
    fn add_file(&self, scm_name: &str, changeset: &str, file: &FileChange) -> Result<()>;
    /// Idempotent: returns true only when the association was newly created.
    fn link_issue(&self, scm_name: &str, changeset: &str, issue_id: i64) -> Result<bool>;
}

pub trait BranchPolicy: Send + Sync {
    fn is_branch_allowed(&self, scm_name: &str, branch: &str) -> Result<bool>;
}

pub trait IssueLookup: Send + Sync {
    fn get_details(&self, issue_id: i64) -> Result<Option<IssueDetails>>;
}

pub trait AuditLog: Send + Sync {
    fn record(&self, issue_id: i64, event_kind: &str, message: &str) -> Result<()>;
}

// ── Tests ─────────────────────────────────────────────────────────────────
