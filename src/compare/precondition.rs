use crate::jvm::MethodBody;
use std::fmt;

/// Which kind of equivalence is being checked
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ComparisonMode {
    /// Equivalent modulo constant pool
    Exact,

    /// Equivalent up to code inserted into the new body
    Switchable,
}

/// Outcome of the cheap summary checks done before any code gets decoded
///
/// Only [`Precondition::Compatible`] allows the comparison to go ahead. The other variants say
/// which check failed first, for diagnostics.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Precondition {
    Compatible,
    StackMismatch,
    LocalsMismatch,
    ParamsMismatch,
    LengthMismatch,
}

impl Precondition {
    pub fn is_compatible(self) -> bool {
        self == Precondition::Compatible
    }
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Precondition::Compatible => "compatible",
            Precondition::StackMismatch => "max stack differs",
            Precondition::LocalsMismatch => "max locals differs",
            Precondition::ParamsMismatch => "parameter slots differ",
            Precondition::LengthMismatch => "code length is incompatible",
        };
        f.write_str(reason)
    }
}

/// Check that the frame layouts agree and that the code lengths allow for the mode
///
/// Exact comparisons need equal code lengths. Switchable comparisons only tolerate insertions, so
/// the new code can't be shorter than the old.
pub fn check_preconditions(
    old: &MethodBody,
    new: &MethodBody,
    mode: ComparisonMode,
) -> Precondition {
    if old.max_stack != new.max_stack {
        Precondition::StackMismatch
    } else if old.max_locals != new.max_locals {
        Precondition::LocalsMismatch
    } else if old.parameter_slots != new.parameter_slots {
        Precondition::ParamsMismatch
    } else {
        let lengths_ok = match mode {
            ComparisonMode::Exact => old.code_len() == new.code_len(),
            ComparisonMode::Switchable => old.code_len() <= new.code_len(),
        };
        if lengths_ok {
            Precondition::Compatible
        } else {
            Precondition::LengthMismatch
        }
    }
}
