//! Synthetic changeset identifiers for SCM systems that don't supply one.
//!
//! CVS notifies per file, so one logical commit arrives as several hook
//! calls with no shared identifier. Hashing the commit metadata with the
//! timestamp coarsened into fixed buckets makes those calls resolve to the
//! same changeset, while commits more than one bucket apart stay distinct.

use scmbridge_types::CommitPayload;
use sha2::{Digest, Sha256};

/// Seconds of timestamp drift allowed between per-file notifications of
/// the same logical commit.
pub const COMMIT_TIME_DRIFT: i64 = 10;

/// Reserved marker separating the synthetic identifier space from native
/// ones. CVS commitids are 16 base62 chars ending in `z0`; svn revisions
/// are decimal and git changesets are 40 hex chars, so nothing native can
/// end in `z1`.
pub const SYNTHETIC_SUFFIX: &str = "z1";

/// Derive a stable changeset identifier from commit metadata.
///
/// Deterministic: identical author, email, and message with timestamps in
/// the same [`COMMIT_TIME_DRIFT`] bucket always produce the same id.
pub fn synthetic_changeset(payload: &CommitPayload) -> String {
    let bucket = payload.commit_date.div_euclid(COMMIT_TIME_DRIFT);

    let mut hasher = Sha256::new();
    hasher.update(bucket.to_string());
    hasher.update(&payload.author_name);
    hasher.update(&payload.author_email);
    hasher.update(&payload.message);
    let checksum = hex::encode(hasher.finalize());

    // Same shape as a native CVS commitid: 14 digest chars from offset 1
    // plus the reserved suffix.
    format!("{}{}", &checksum[1..15], SYNTHETIC_SUFFIX)
}

pub fn is_synthetic(changeset: &str) -> bool {
    changeset.len() == 16 && changeset.ends_with(SYNTHETIC_SUFFIX)
}

// ── Tests ─────────────────────────────────────────────────────────────────
