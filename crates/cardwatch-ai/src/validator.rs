//! Trust gate between the proposer and the patch engine.
//!
//! Only high-confidence proposals that actually change a value survive. A
//! wrong edit silently corrupts public data; a missed one is merely stale.

use cardwatch_core::{values_equal, ChangeProposal, Confidence, RecordChanges};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    LowConfidence(Confidence),
    NoOp,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::LowConfidence(c) => write!(f, "confidence {c} is below high"),
            RejectReason::NoOp => f.write_str("new value equals old value"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub proposal: ChangeProposal,
    pub reason: RejectReason,
}

/// Survivors grouped by record, plus everything that was turned away.
#[derive(Debug, Default, PartialEq)]
pub struct Validation {
    pub accepted: Vec<RecordChanges>,
    pub rejected: Vec<Rejection>,
}

impl Validation {
    pub fn accepted_count(&self) -> usize {
        self.accepted.iter().map(|r| r.changes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }
}

/// Filter proposals and group the survivors by record.
///
/// Records appear in order of their first surviving proposal; within a record
/// the proposal order is preserved.
pub fn validate(proposals: Vec<ChangeProposal>) -> Validation {
    let mut out = Validation::default();
    for proposal in proposals {
        if let Some(reason) = rejection_reason(&proposal) {
            info!(
                record_id = %proposal.record_id,
                field = %proposal.field_path,
                reason = %reason,
                "rejected proposal"
            );
            out.rejected.push(Rejection { proposal, reason });
            continue;
        }
        match out
            .accepted
            .iter_mut()
            .find(|r| r.record_id == proposal.record_id)
        {
            Some(group) => group.changes.push(proposal),
            None => out.accepted.push(RecordChanges {
                record_id: proposal.record_id.clone(),
                changes: vec![proposal],
            }),
        }
    }
    out
}

fn rejection_reason(p: &ChangeProposal) -> Option<RejectReason> {
    if p.confidence != Confidence::High {
        return Some(RejectReason::LowConfidence(p.confidence));
    }
    if values_equal(&p.old_value, &p.new_value) {
        return Some(RejectReason::NoOp);
    }
    None
}
