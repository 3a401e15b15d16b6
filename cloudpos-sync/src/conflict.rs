//! Last-write-wins conflict policy.
//!
//! A remote row replaces the local one only when its `updated_at` is
//! strictly newer than the local `local_updated_at`. A missing local row
//! compares as older than everything; a missing remote timestamp compares as
//! older than everything, so such a row never wins. Ties keep the local row.
//!
//! The comparison uses device wall clocks. A device whose clock runs ahead
//! wins concurrent edits it should have lost.

use cloudpos_types::Timestamp;

/// Outcome of comparing a remote row against its local counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// Write the remote row locally.
    ApplyRemote,
    /// Leave the local row as it is.
    KeepLocal,
}

/// Decides whether the remote version replaces the local one.
#[must_use]
pub fn decide(remote_updated_at: Option<Timestamp>, local_updated_at: Option<Timestamp>) -> MergeDecision {
    match (remote_updated_at, local_updated_at) {
        (None, _) => MergeDecision::KeepLocal,
        (Some(_), None) => MergeDecision::ApplyRemote,
        (Some(remote), Some(local)) if remote > local => MergeDecision::ApplyRemote,
        (Some(_), Some(_)) => MergeDecision::KeepLocal,
    }
}

/// True if the remote version wins.
#[must_use]
pub fn remote_wins(remote_updated_at: Option<Timestamp>, local_updated_at: Option<Timestamp>) -> bool {
    decide(remote_updated_at, local_updated_at) == MergeDecision::ApplyRemote
}
