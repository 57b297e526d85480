//! Hook payload normalization.
//!
//! A hook ping arrives as urlencoded parameters. [`RawParams`] parses them
//! once into an ordered multimap; everything downstream works from the
//! immutable [`CommitPayload`] an adapter builds from it. Adapter selection
//! is an explicit strategy table over the `scm` discriminant.

use std::time::{SystemTime, UNIX_EPOCH};

use scmbridge_types::{CommitPayload, FileChange, Result, ScmBridgeError};

// ── Raw parameters ────────────────────────────────────────────────────────

/// Ordered multimap of decoded request parameters.
#[derive(Debug, Clone, Default)]
pub struct RawParams {
    pairs: Vec<(String, String)>,
}

impl RawParams {
    /// Parse a urlencoded string (`a=1&b=2&b=3`).
    pub fn parse(query: &str) -> Self {
        let pairs = form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        RawParams { pairs }
    }

    /// Append parameters from another urlencoded string. Used by the
    /// webhook server to merge a form body after the query string.
    pub fn extend_from(&mut self, query: &str) {
        self.pairs
            .extend(form_urlencoded::parse(query.as_bytes()).into_owned());
    }

    /// First value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All values for `key`, in arrival order.
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

// ── Adapters ──────────────────────────────────────────────────────────────

/// One payload shape the bridge understands.
pub trait ScmAdapter: Send + Sync {
    /// Whether this adapter handles the given parameters.
    fn can(&self, params: &RawParams) -> bool;
    /// Parse and validate the parameters into a payload. Shape only; no
    /// ingestion semantics.
    fn normalize(&self, params: &RawParams) -> Result<CommitPayload>;
}

/// Per-file CVS notifications: at most one file per call, commitid
/// optional (older CVS servers don't send one).
pub struct CvsAdapter;

/// Per-commit SVN/Git notifications: explicit commitid, repeated aligned
/// file/old_version/new_version lists.
pub struct StdAdapter;

static ADAPTERS: [&dyn ScmAdapter; 2] = [&CvsAdapter, &StdAdapter];

/// Strategy table: find the adapter claiming these parameters.
pub fn adapter_for(params: &RawParams) -> Option<&'static dyn ScmAdapter> {
    ADAPTERS.iter().copied().find(|a| a.can(params))
}

impl ScmAdapter for CvsAdapter {
    fn can(&self, params: &RawParams) -> bool {
        params.get("scm") == Some("cvs")
    }

    fn normalize(&self, params: &RawParams) -> Result<CommitPayload> {
        let mut payload = parse_common(params)?;
        payload.commit_id = non_empty(params.get("commitid"));
        if let Some(filename) = params.get("file").filter(|f| !f.is_empty()) {
            payload.files.push(FileChange {
                filename: filename.to_string(),
                old_version: non_empty(params.get("old_version")),
                new_version: non_empty(params.get("new_version")),
            });
        }
        Ok(payload)
    }
}

impl ScmAdapter for StdAdapter {
    fn can(&self, params: &RawParams) -> bool {
        matches!(params.get("scm"), Some("svn") | Some("git"))
    }

    fn normalize(&self, params: &RawParams) -> Result<CommitPayload> {
        let mut payload = parse_common(params)?;

        let commit_id = non_empty(params.get("commitid"))
            .ok_or_else(|| ScmBridgeError::Validation("missing commitid".into()))?;
        payload.commit_id = Some(commit_id);

        let files = params.get_all("file");
        let old_versions = params.get_all("old_version");
        let new_versions = params.get_all("new_version");
        for (i, filename) in files.iter().enumerate() {
            if filename.is_empty() {
                continue;
            }
            payload.files.push(FileChange {
                filename: filename.to_string(),
                old_version: non_empty(old_versions.get(i).copied()),
                new_version: non_empty(new_versions.get(i).copied()),
            });
        }
        Ok(payload)
    }
}

// ── Shared parsing ────────────────────────────────────────────────────────

fn parse_common(params: &RawParams) -> Result<CommitPayload> {
    let issue_ids = parse_issue_ids(params)?;

    let scm_name = non_empty(params.get("scm_name"))
        .ok_or_else(|| ScmBridgeError::Validation("missing scm_name".into()))?;
    let branch = non_empty(params.get("branch"))
        .ok_or_else(|| ScmBridgeError::Validation("missing branch".into()))?;

    let commit_date = match params.get("commit_date") {
        None | Some("") => now_unix(),
        Some(raw) => raw.parse::<i64>().map_err(|_| {
            ScmBridgeError::Validation(format!("unparsable commit_date '{}'", raw))
        })?,
    };

    Ok(CommitPayload {
        issue_ids,
        commit_id: None,
        scm_name,
        branch,
        author_name: params.get("author_name").unwrap_or_default().to_string(),
        author_email: params.get("author_email").unwrap_or_default().to_string(),
        message: params.get("commit_msg").unwrap_or_default().to_string(),
        commit_date,
        files: Vec::new(),
    })
}

/// Issue ids arrive as repeated `issue` parameters, each possibly a
/// comma-separated list.
fn parse_issue_ids(params: &RawParams) -> Result<Vec<i64>> {
    let mut issue_ids = Vec::new();
    for value in params.get_all("issue") {
        for part in value.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let id = part.parse::<i64>().map_err(|_| {
                ScmBridgeError::Validation(format!("unparsable issue id '{}'", part))
            })?;
            issue_ids.push(id);
        }
    }
    if issue_ids.is_empty() {
        return Err(ScmBridgeError::Validation("no issues provided".into()));
    }
    Ok(issue_ids)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(|v| v.to_string())
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_params_multimap() {
        let params = RawParams::parse("issue=1&issue=2&scm=cvs&empty=");
        assert_eq!(params.get("scm"), Some("cvs"));
        assert_eq!(params.get_all("issue"), vec!["1", "2"]);
        assert_eq!(params.get("empty"), Some(""));
        assert_eq!(params.get("missing"), None);
    }

    #[test]
    fn test_raw_params_decodes() {
        let params = RawParams::parse("commit_msg=fix%20the%20thing&author_name=Alice+B");
        assert_eq!(params.get("commit_msg"), Some("fix the thing"));
        assert_eq!(params.get("author_name"), Some("Alice B"));
    }

    #[test]
    fn test_extend_from_appends_after_query() {
        let mut params = RawParams::parse("scm=git&issue=1");
        params.extend_from("issue=2&branch=main");
        assert_eq!(params.get_all("issue"), vec!["1", "2"]);
        assert_eq!(params.get("branch"), Some("main"));
    }

    #[test]
    fn test_adapter_selection() {
        assert!(adapter_for(&RawParams::parse("scm=cvs")).is_some());
        assert!(adapter_for(&RawParams::parse("scm=svn")).is_some());
        assert!(adapter_for(&RawParams::parse("scm=git")).is_some());
        assert!(adapter_for(&RawParams::parse("scm=hg")).is_none());
        assert!(adapter_for(&RawParams::parse("issue=1")).is_none());
    }

    #[test]
    fn test_cvs_normalize_single_file_no_commitid() {
        let params = RawParams::parse(
            "scm=cvs&issue=64&scm_name=cvsrepo&branch=master\
             &author_name=Alice&author_email=alice%40example.com\
             &commit_msg=fix&commit_date=1700000000\
             &file=src/main.c&old_version=1.1&new_version=1.2",
        );
        let payload = CvsAdapter.normalize(&params).expect("normalize");
        assert_eq!(payload.issue_ids, vec![64]);
        assert_eq!(payload.commit_id, None);
        assert_eq!(payload.scm_name, "cvsrepo");
        assert_eq!(payload.branch, "master");
        assert_eq!(payload.commit_date, 1700000000);
        assert_eq!(payload.files.len(), 1);
        assert_eq!(payload.files[0].filename, "src/main.c");
        assert_eq!(payload.files[0].old_version.as_deref(), Some("1.1"));
        assert_eq!(payload.files[0].new_version.as_deref(), Some("1.2"));
    }

    #[test]
    fn test_cvs_normalize_keeps_native_commitid() {
        let params = RawParams::parse(
            "scm=cvs&issue=64&scm_name=cvsrepo&branch=master&commitid=4f2ac5030f49b7z0",
        );
        let payload = CvsAdapter.normalize(&params).expect("normalize");
        assert_eq!(payload.commit_id.as_deref(), Some("4f2ac5030f49b7z0"));
        assert!(payload.files.is_empty());
    }

    #[test]
    fn test_std_normalize_multi_file() {
        let params = RawParams::parse(
            "scm=git&issue=64&issue=65&scm_name=gitrepo&branch=main\
             &commitid=3b18e512dba79e4c8300dd08aeb37f8e728b8dad\
             &commit_msg=add+feature&commit_date=1700000000\
             &file=src/lib.rs&old_version=aaa&new_version=bbb\
             &file=README.md&old_version=&new_version=ccc",
        );
        let payload = StdAdapter.normalize(&params).expect("normalize");
        assert_eq!(payload.issue_ids, vec![64, 65]);
        assert_eq!(
            payload.commit_id.as_deref(),
            Some("3b18e512dba79e4c8300dd08aeb37f8e728b8dad")
        );
        assert_eq!(payload.files.len(), 2);
        // Empty revision markers normalize to None (file added).
        assert_eq!(payload.files[1].old_version, None);
        assert_eq!(payload.files[1].new_version.as_deref(), Some("ccc"));
    }

    #[test]
    fn test_std_requires_commitid() {
        let params = RawParams::parse("scm=svn&issue=64&scm_name=svnrepo&branch=trunk");
        let err = StdAdapter.normalize(&params).expect_err("should fail");
        assert!(matches!(err, ScmBridgeError::Validation(_)), "got: {err}");
    }

    #[test]
    fn test_empty_issue_list_rejected() {
        let params = RawParams::parse("scm=cvs&scm_name=cvsrepo&branch=master");
        let err = CvsAdapter.normalize(&params).expect_err("should fail");
        assert!(matches!(err, ScmBridgeError::Validation(_)), "got: {err}");

        let params = RawParams::parse("scm=cvs&issue=&scm_name=cvsrepo&branch=master");
        assert!(CvsAdapter.normalize(&params).is_err());
    }

    #[test]
    fn test_unparsable_issue_id_rejected() {
        let params = RawParams::parse("scm=cvs&issue=abc&scm_name=cvsrepo&branch=master");
        let err = CvsAdapter.normalize(&params).expect_err("should fail");
        assert!(err.to_string().contains("unparsable issue id"));
    }

    #[test]
    fn test_comma_separated_issue_list() {
        let params =
            RawParams::parse("scm=cvs&issue=1,2%2C3&scm_name=cvsrepo&branch=master&issue=4");
        let payload = CvsAdapter.normalize(&params).expect("normalize");
        assert_eq!(payload.issue_ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_missing_branch_rejected() {
        let params = RawParams::parse("scm=git&issue=1&scm_name=gitrepo&commitid=abc");
        let err = StdAdapter.normalize(&params).expect_err("should fail");
        assert!(err.to_string().contains("branch"));
    }

    #[test]
    fn test_missing_commit_date_defaults_to_now() {
        let params = RawParams::parse("scm=cvs&issue=1&scm_name=cvsrepo&branch=master");
        let payload = CvsAdapter.normalize(&params).expect("normalize");
        assert!(payload.commit_date > 0);
    }
}
