use rusqlite::{params, OptionalExtension};
use std::time::{SystemTime, UNIX_EPOCH};

use scmbridge_types::{
    AuditLog, BranchPolicy, Commit, CommitDetail, CommitStore, FileChange, IssueDetails,
    IssueLookup, RepoPolicy, RepoStats, Result, ScmBridgeError,
};

use crate::SqliteStore;

// ── Helpers ───────────────────────────────────────────────────────────────

fn parse_branch_patterns(s: Option<String>) -> Vec<String> {
    match s {
        None => vec![],
        Some(j) => serde_json::from_str::<Vec<String>>(&j).unwrap_or_default(),
    }
}

fn row_to_commit(row: &rusqlite::Row<'_>) -> rusqlite::Result<Commit> {
    Ok(Commit {
        scm_name: row.get(0)?,
        changeset: row.get(1)?,
        branch: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        author_name: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        author_email: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        message: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        commit_date: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
    })
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// ── impl CommitStore ──────────────────────────────────────────────────────

impl CommitStore for SqliteStore {
    fn find_by_changeset(&self, scm_name: &str, changeset: &str) -> Result<Option<Commit>> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                "SELECT scm_name, changeset, branch, author_name, author_email, message, commit_date
                 FROM commits WHERE scm_name = ?1 AND changeset = ?2",
                params![scm_name, changeset],
                row_to_commit,
            )
            .optional()?;
        Ok(result)
    }

    fn insert_commit(&self, commit: &Commit) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        // The composite primary key makes this an atomic create-if-absent:
        // of two concurrent creators, exactly one inserts the row.
        let changed = conn.execute(
            "INSERT OR IGNORE INTO commits
                (scm_name, changeset, branch, author_name, author_email, message, commit_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                commit.scm_name,
                commit.changeset,
                commit.branch,
                commit.author_name,
                commit.author_email,
                commit.message,
                commit.commit_date,
            ],
        )?;
        Ok(changed > 0)
    }

    fn add_file(&self, scm_name: &str, changeset: &str, file: &FileChange) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO commit_files (scm_name, changeset, filename, old_version, new_version)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                scm_name,
                changeset,
                file.filename,
                file.old_version,
                file.new_version,
            ],
        )?;
        Ok(())
    }

    fn link_issue(&self, scm_name: &str, changeset: &str, issue_id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO issue_commits (scm_name, changeset, issue_id)
             VALUES (?1, ?2, ?3)",
            params![scm_name, changeset, issue_id],
        )?;
        Ok(changed > 0)
    }
}

// ── impl BranchPolicy ─────────────────────────────────────────────────────

impl BranchPolicy for SqliteStore {
    fn is_branch_allowed(&self, scm_name: &str, branch: &str) -> Result<bool> {
        let patterns = match self.get_repo(scm_name)? {
            None => return Ok(true),
            Some(policy) => policy.allowed_branches,
        };
        // Branch policy is opt-in: a repo without patterns allows everything.
        if patterns.is_empty() {
            return Ok(true);
        }

        let mut builder = globset::GlobSetBuilder::new();
        for pattern in &patterns {
            let glob = globset::Glob::new(pattern).map_err(|e| {
                ScmBridgeError::Validation(format!("bad branch pattern '{}': {}", pattern, e))
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| {
            ScmBridgeError::Validation(format!("branch pattern set for '{}': {}", scm_name, e))
        })?;

        Ok(set.is_match(branch))
    }
}

// ── impl IssueLookup ──────────────────────────────────────────────────────

impl IssueLookup for SqliteStore {
    fn get_details(&self, issue_id: i64) -> Result<Option<IssueDetails>> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                "SELECT issue_id, summary, status_title FROM issues WHERE issue_id = ?1",
                params![issue_id],
                |row| {
                    Ok(IssueDetails {
                        issue_id: row.get(0)?,
                        summary: row.get(1)?,
                        status_title: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(result)
    }
}

// ── impl AuditLog ─────────────────────────────────────────────────────────

impl AuditLog for SqliteStore {
    fn record(&self, issue_id: i64, event_kind: &str, message: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO audit_trail (issue_id, event_kind, message, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![issue_id, event_kind, message, now_unix()],
        )?;
        Ok(())
    }
}

// ── Admin queries ─────────────────────────────────────────────────────────

impl SqliteStore {
    /// Register a repository's branch allow patterns, replacing any
    /// existing policy.
    pub fn upsert_repo(&self, policy: &RepoPolicy) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let patterns_json = serde_json::to_string(&policy.allowed_branches)
            .unwrap_or_else(|_| "[]".to_string());
        conn.execute(
            "INSERT INTO repos (scm_name, allowed_branches) VALUES (?1, ?2)
             ON CONFLICT(scm_name) DO UPDATE SET allowed_branches = excluded.allowed_branches",
            params![policy.scm_name, patterns_json],
        )?;
        Ok(())
    }

    pub fn get_repo(&self, scm_name: &str) -> Result<Option<RepoPolicy>> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                "SELECT scm_name, allowed_branches FROM repos WHERE scm_name = ?1",
                params![scm_name],
                |row| {
                    Ok(RepoPolicy {
                        scm_name: row.get(0)?,
                        allowed_branches: parse_branch_patterns(row.get(1)?),
                    })
                },
            )
            .optional()?;
        Ok(result)
    }

    /// Seed or update a tracker issue used for status-line emission.
    pub fn upsert_issue(&self, details: &IssueDetails) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO issues (issue_id, summary, status_title) VALUES (?1, ?2, ?3)
             ON CONFLICT(issue_id) DO UPDATE SET
                summary = excluded.summary,
                status_title = excluded.status_title",
            params![details.issue_id, details.summary, details.status_title],
        )?;
        Ok(())
    }

    pub fn get_commit_detail(&self, scm_name: &str, changeset: &str) -> Result<Option<CommitDetail>> {
        let commit = match self.find_by_changeset(scm_name, changeset)? {
            None => return Ok(None),
            Some(c) => c,
        };

        let conn = self.conn.lock().unwrap();
        let mut fstmt = conn.prepare(
            "SELECT filename, old_version, new_version FROM commit_files
             WHERE scm_name = ?1 AND changeset = ?2 ORDER BY rowid",
        )?;
        let files: rusqlite::Result<Vec<FileChange>> = fstmt
            .query_map(params![scm_name, changeset], |row| {
                Ok(FileChange {
                    filename: row.get(0)?,
                    old_version: row.get(1)?,
                    new_version: row.get(2)?,
                })
            })?
            .collect();
        let files = files?;

        let mut istmt = conn.prepare(
            "SELECT issue_id FROM issue_commits
             WHERE scm_name = ?1 AND changeset = ?2 ORDER BY issue_id",
        )?;
        let issue_ids: rusqlite::Result<Vec<i64>> = istmt
            .query_map(params![scm_name, changeset], |row| row.get(0))?
            .collect();
        let issue_ids = issue_ids?;

        Ok(Some(CommitDetail {
            commit,
            files,
            issue_ids,
        }))
    }

    /// Commits associated with one issue, newest first.
    pub fn commits_for_issue(&self, issue_id: i64) -> Result<Vec<Commit>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT c.scm_name, c.changeset, c.branch, c.author_name, c.author_email,
                    c.message, c.commit_date
             FROM issue_commits ic
             JOIN commits c ON c.scm_name = ic.scm_name AND c.changeset = ic.changeset
             WHERE ic.issue_id = ?1
             ORDER BY c.commit_date DESC",
        )?;
        let commits: rusqlite::Result<Vec<Commit>> =
            stmt.query_map(params![issue_id], row_to_commit)?.collect();
        Ok(commits?)
    }

    pub fn list_repo_stats(&self) -> Result<Vec<RepoStats>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT r.scm_name, COUNT(c.changeset), MAX(c.commit_date)
             FROM repos r
             LEFT JOIN commits c ON c.scm_name = r.scm_name
             GROUP BY r.scm_name
             ORDER BY r.scm_name",
        )?;
        let rows: rusqlite::Result<Vec<RepoStats>> = stmt
            .query_map([], |row| {
                Ok(RepoStats {
                    scm_name: row.get(0)?,
                    commit_count: row.get::<_, i64>(1)? as usize,
                    last_commit_date: row.get(2)?,
                })
            })?
            .collect();
        Ok(rows?)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SqliteStore;

    fn make_store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("open in-memory store")
    }

    fn make_commit(scm_name: &str, changeset: &str) -> Commit {
        Commit {
            scm_name: scm_name.to_string(),
            changeset: changeset.to_string(),
            branch: "master".to_string(),
            author_name: "Alice".to_string(),
            author_email: "alice@example.com".to_string(),
            message: "fix crash".to_string(),
            commit_date: 1700000000,
        }
    }

    #[test]
    fn test_branch_policy_unknown_repo_allows() {
        let store = make_store();
        assert!(store
            .is_branch_allowed("unregistered", "anything")
            .expect("policy lookup"));
    }

    #[test]
    fn test_branch_policy_empty_patterns_allow() {
        let store = make_store();
        store
            .upsert_repo(&RepoPolicy {
                scm_name: "cvsrepo".into(),
                allowed_branches: vec![],
            })
            .expect("upsert repo");
        assert!(store.is_branch_allowed("cvsrepo", "whatever").expect("policy"));
    }

    #[test]
    fn test_branch_policy_patterns() {
        let store = make_store();
        store
            .upsert_repo(&RepoPolicy {
                scm_name: "gitrepo".into(),
                allowed_branches: vec!["master".into(), "release-*".into()],
            })
            .expect("upsert repo");

        assert!(store.is_branch_allowed("gitrepo", "master").expect("master"));
        assert!(store.is_branch_allowed("gitrepo", "release-1.4").expect("release"));
        assert!(!store.is_branch_allowed("gitrepo", "experimental").expect("experimental"));
    }

    #[test]
    fn test_branch_policy_bad_pattern_is_error() {
        let store = make_store();
        store
            .upsert_repo(&RepoPolicy {
                scm_name: "gitrepo".into(),
                allowed_branches: vec!["release-[".into()],
            })
            .expect("upsert repo");

        // The ingestor treats this Err as deny (fails closed).
        assert!(store.is_branch_allowed("gitrepo", "master").is_err());
    }

    #[test]
    fn test_upsert_repo_replaces_patterns() {
        let store = make_store();
        store
            .upsert_repo(&RepoPolicy {
                scm_name: "gitrepo".into(),
                allowed_branches: vec!["master".into()],
            })
            .expect("first upsert");
        store
            .upsert_repo(&RepoPolicy {
                scm_name: "gitrepo".into(),
                allowed_branches: vec!["main".into()],
            })
            .expect("second upsert");

        let policy = store.get_repo("gitrepo").expect("get").expect("some");
        assert_eq!(policy.allowed_branches, vec!["main"]);
    }

    #[test]
    fn test_link_issue_deduplicates() {
        let store = make_store();
        store.insert_commit(&make_commit("cvsrepo", "deadbeef")).expect("insert");

        assert!(store.link_issue("cvsrepo", "deadbeef", 64).expect("first link"));
        assert!(!store.link_issue("cvsrepo", "deadbeef", 64).expect("second link"));

        let detail = store
            .get_commit_detail("cvsrepo", "deadbeef")
            .expect("detail")
            .expect("some");
        assert_eq!(detail.issue_ids, vec![64]);
    }

    #[test]
    fn test_issue_lookup() {
        let store = make_store();
        store
            .upsert_issue(&IssueDetails {
                issue_id: 64,
                summary: "crash on login".into(),
                status_title: "assigned".into(),
            })
            .expect("upsert issue");

        let details = store.get_details(64).expect("lookup").expect("some");
        assert_eq!(details.status_line(), "#64 - crash on login (assigned)");
        assert!(store.get_details(65).expect("lookup missing").is_none());
    }

    #[test]
    fn test_audit_record() {
        let store = make_store();
        store
            .record(64, "scm_checkin_associated", "changeset deadbeef associated")
            .expect("record");

        let conn = store.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM audit_trail WHERE issue_id = 64",
                [],
                |r| r.get(0),
            )
            .expect("count");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_commits_for_issue_newest_first() {
        let store = make_store();
        let mut older = make_commit("gitrepo", "aaaa0001");
        older.commit_date = 1700000000;
        let mut newer = make_commit("gitrepo", "aaaa0002");
        newer.commit_date = 1700000100;
        store.insert_commit(&older).expect("insert older");
        store.insert_commit(&newer).expect("insert newer");
        store.link_issue("gitrepo", "aaaa0001", 7).expect("link older");
        store.link_issue("gitrepo", "aaaa0002", 7).expect("link newer");

        let commits = store.commits_for_issue(7).expect("commits");
        let changesets: Vec<&str> = commits.iter().map(|c| c.changeset.as_str()).collect();
        assert_eq!(changesets, vec!["aaaa0002", "aaaa0001"]);
    }

    #[test]
    fn test_list_repo_stats() {
        let store = make_store();
        store
            .upsert_repo(&RepoPolicy {
                scm_name: "gitrepo".into(),
                allowed_branches: vec![],
            })
            .expect("upsert repo");
        store.insert_commit(&make_commit("gitrepo", "aaaa0001")).expect("insert");

        let stats = store.list_repo_stats().expect("stats");
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].scm_name, "gitrepo");
        assert_eq!(stats[0].commit_count, 1);
        assert_eq!(stats[0].last_commit_date, Some(1700000000));
    }
}
