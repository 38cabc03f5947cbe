//! The interface classifier boundary: per-device decision of whether a
//! device belongs to a family and, if so, what role and capabilities it
//! contributes.

use crate::board::{Capability, Role};
use crate::error::CoreError;
use crate::family::ModelDescriptor;

/// A successfully classified interface, ready to be merged into a board by
/// the aggregator.
#[derive(Debug, Clone)]
pub struct ClassifiedInterface {
    pub role: Role,
    pub model: Option<&'static ModelDescriptor>,
    pub capabilities: Capability,
    /// Parsed serial number (already run through `serial::parse_*`), `0` if
    /// the device reported none.
    pub serial: u64,
}

/// The three-way outcome of classification, replacing the C source's
/// overloaded "0/1/error" return with an explicit result variant, per the
/// error-masking design note.
#[derive(Debug)]
pub enum ClassifyOutcome {
    /// The device belongs to this family; here is how.
    Accepted(ClassifiedInterface),
    /// The device does not belong to this family. Not an error — most
    /// enumerated devices will be rejected.
    Rejected,
    /// The device could not be classified because of a transient condition
    /// (e.g. access denied while enumerating). The caller decides whether
    /// to surface this depending on context (initial enumeration vs.
    /// steady-state refresh).
    Transient(CoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_and_transient_are_distinct_from_accepted() {
        let rejected = ClassifyOutcome::Rejected;
        let transient = ClassifyOutcome::Transient(CoreError::Access("denied".into()));
        assert!(matches!(rejected, ClassifyOutcome::Rejected));
        assert!(matches!(transient, ClassifyOutcome::Transient(_)));
    }
}
