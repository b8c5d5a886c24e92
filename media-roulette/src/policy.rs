use crate::types::{LabelFilter, LabelScore};

/// Outcome of the acceptance gate for one classified image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    RejectLabel,
    RejectConfidence,
}

/// Two-stage accept/reject gate: label match first, confidence second.
///
/// The wildcard filter accepts unconditionally — wildcard runs display
/// images without classifying them, and the policy mirrors that path. For a
/// named filter, a label mismatch (case-insensitive) dominates; the cutoff
/// is only applied to content that already matched.
pub fn decide(score: &LabelScore, filter: &LabelFilter, cutoff: f32) -> Decision {
    match filter {
        LabelFilter::All => Decision::Accept,
        LabelFilter::Only(wanted) => {
            if !score.label.eq_ignore_ascii_case(wanted) {
                Decision::RejectLabel
            } else if score.confidence < cutoff {
                Decision::RejectConfidence
            } else {
                Decision::Accept
            }
        }
    }
}
