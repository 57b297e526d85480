pub mod changeset;
pub mod ingestor;
pub mod payload;

pub use ingestor::Ingestor;
pub use payload::{adapter_for, CvsAdapter, RawParams, ScmAdapter, StdAdapter};

use scmbridge_types::{
    AuditLog, BranchPolicy, CommitStore, IngestOutcome, IssueLookup, Result, ScmBridgeError,
};

/// Select an adapter for `params`, normalize, and run the ingestion pipeline.
/// This is the single entry point used by both the CLI and the webhook server.
pub fn ingest_params(
    params: &RawParams,
    store: &dyn CommitStore,
    policy: &dyn BranchPolicy,
    issues: &dyn IssueLookup,
    audit: &dyn AuditLog,
) -> Result<IngestOutcome> {
    let adapter = adapter_for(params).ok_or_else(|| {
        ScmBridgeError::Validation("unsupported or missing 'scm' parameter".into())
    })?;
    let payload = adapter.normalize(params)?;
    Ingestor::new(store, policy, issues, audit).ingest(&payload)
}
