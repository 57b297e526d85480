//! The ingestion pipeline: resolve identity, gate new commits on branch
//! policy, persist the commit, append file changes, link issues.

use scmbridge_types::{
    AuditLog, BranchPolicy, CommitPayload, CommitStore, IngestOutcome, IssueLookup, Result,
    ScmBridgeError,
};

use crate::changeset;

pub struct Ingestor<'a> {
    store: &'a dyn CommitStore,
    policy: &'a dyn BranchPolicy,
    issues: &'a dyn IssueLookup,
    audit: &'a dyn AuditLog,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        store: &'a dyn CommitStore,
        policy: &'a dyn BranchPolicy,
        issues: &'a dyn IssueLookup,
        audit: &'a dyn AuditLog,
    ) -> Self {
        Ingestor {
            store,
            policy,
            issues,
            audit,
        }
    }

    /// Run one ingestion call.
    ///
    /// A payload whose changeset is already stored takes the append path:
    /// no creation, no branch check, files and issue links still recorded.
    /// CVS sends files in subdirectories as separate requests, so this
    /// path is routine, not exceptional.
    pub fn ingest(&self, payload: &CommitPayload) -> Result<IngestOutcome> {
        if payload.issue_ids.is_empty() {
            return Err(ScmBridgeError::Validation("no issues provided".into()));
        }

        let resolved = match &payload.commit_id {
            Some(id) => id.clone(),
            None => changeset::synthetic_changeset(payload),
        };

        let existing = self
            .store
            .find_by_changeset(&payload.scm_name, &resolved)?;

        let mut outcome = IngestOutcome {
            changeset: resolved.clone(),
            ..IngestOutcome::default()
        };

        if existing.is_none() {
            if !self.branch_allowed(payload) {
                return Err(ScmBridgeError::BranchRejected(payload.branch.clone()));
            }
            let commit = payload.to_commit(&resolved);
            // A concurrent call may win the insert; the row exists either way.
            outcome.created = self.store.insert_commit(&commit)?;
        }

        for file in &payload.files {
            self.store.add_file(&payload.scm_name, &resolved, file)?;
            outcome.files_added += 1;
        }

        for &issue_id in &payload.issue_ids {
            if self.store.link_issue(&payload.scm_name, &resolved, issue_id)? {
                outcome.issues_linked += 1;
                let note = format!(
                    "changeset {} in {} associated with issue {}",
                    resolved, payload.scm_name, issue_id
                );
                // Fire-and-forget: an audit failure never fails the ingest.
                if let Err(e) = self.audit.record(issue_id, "scm_checkin_associated", &note) {
                    tracing::warn!(issue_id, error = %e, "audit record failed");
                }
            }

            let line = match self.issues.get_details(issue_id)? {
                Some(details) => details.status_line(),
                None => format!("#{}", issue_id),
            };
            outcome.status_lines.push(line);
        }

        Ok(outcome)
    }

    /// Fails closed: a policy lookup error denies the branch.
    fn branch_allowed(&self, payload: &CommitPayload) -> bool {
        match self
            .policy
            .is_branch_allowed(&payload.scm_name, &payload.branch)
        {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::warn!(
                    scm_name = %payload.scm_name,
                    branch = %payload.branch,
                    error = %e,
                    "branch policy lookup failed, denying"
                );
                false
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
