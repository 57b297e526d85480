/// All DDL for the scmbridge SQLite schema.
/// Run in order; all statements are idempotent (IF NOT EXISTS).
pub const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode=WAL;
PRAGMA foreign_keys=ON;

CREATE TABLE IF NOT EXISTS repos (
    scm_name         TEXT PRIMARY KEY,
    allowed_branches TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS commits (
    scm_name     TEXT NOT NULL,
    changeset    TEXT NOT NULL,
    branch       TEXT,
    author_name  TEXT,
    author_email TEXT,
    message      TEXT,
    commit_date  INTEGER,
    PRIMARY KEY (scm_name, changeset)
);

CREATE TABLE IF NOT EXISTS commit_files (
    scm_name    TEXT NOT NULL,
    changeset   TEXT NOT NULL,
    filename    TEXT NOT NULL,
    old_version TEXT,
    new_version TEXT
);

CREATE INDEX IF NOT EXISTS idx_commit_files_changeset
    ON commit_files (scm_name, changeset);

CREATE TABLE IF NOT EXISTS issue_commits (
    scm_name  TEXT NOT NULL,
    changeset TEXT NOT NULL,
    issue_id  INTEGER NOT NULL,
    PRIMARY KEY (scm_name, changeset, issue_id)
);

CREATE INDEX IF NOT EXISTS idx_issue_commits_issue
    ON issue_commits (issue_id);

CREATE TABLE IF NOT EXISTS issues (
    issue_id     INTEGER PRIMARY KEY,
    summary      TEXT NOT NULL,
    status_title TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_trail (
    audit_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    issue_id    INTEGER NOT NULL,
    event_kind  TEXT NOT NULL,
    message     TEXT NOT NULL,
    recorded_at INTEGER NOT NULL
);
"#;
