use std::fmt;

/// Span of code in the new body with no counterpart in the old body
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fragment {
    /// Position of the old instruction that the fragment got inserted in front of
    pub old_bci: usize,

    /// Start of the inserted span (inclusive)
    pub new_start: usize,

    /// End of the inserted span (exclusive), which is where the old instruction at `old_bci` now
    /// lives
    pub new_end: usize,
}

impl Fragment {
    /// Number of bytes inserted
    pub fn len(&self) -> usize {
        self.new_end - self.new_start
    }

    pub fn is_empty(&self) -> bool {
        self.new_end == self.new_start
    }
}

/// Translation of positions in the old body to positions in the new body (and back), built from
/// the fragments inserted into the new body
///
/// A position at or after a fragment's `old_bci` is shifted by the length of the fragment. In
/// particular, a jump to `old_bci` lands after the fragment in the new body, on the relocated old
/// instruction, never on the start of the inserted code.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PositionMap {
    /// Sorted by `old_bci` (and therefore by `new_start`)
    fragments: Vec<Fragment>,
}

impl PositionMap {
    pub fn new() -> PositionMap {
        PositionMap { fragments: vec![] }
    }

    /// Record code inserted in the new body at `new_start..new_end`, in front of the old
    /// instruction at `old_bci`
    ///
    /// Fragments must be recorded in increasing order of `old_bci`.
    pub fn record_fragment(&mut self, old_bci: usize, new_start: usize, new_end: usize) {
        debug_assert!(new_start < new_end, "empty fragment");
        debug_assert!(
            self.fragments.last().map_or(true, |last| {
                last.old_bci < old_bci && last.new_end <= new_start
            }),
            "fragments recorded out of order"
        );
        self.fragments.push(Fragment {
            old_bci,
            new_start,
            new_end,
        });
    }

    /// Position in the new body corresponding to a position in the old body
    pub fn translate(&self, old_bci: usize) -> usize {
        let inserted: usize = self
            .fragments
            .iter()
            .take_while(|fragment| fragment.old_bci <= old_bci)
            .map(Fragment::len)
            .sum();
        old_bci + inserted
    }

    /// Position in the old body corresponding to a position in the new body
    ///
    /// `None` if the new position is inside inserted code.
    pub fn translate_back(&self, new_bci: usize) -> Option<usize> {
        let mut removed = 0;
        for fragment in &self.fragments {
            if new_bci < fragment.new_start {
                break;
            } else if new_bci < fragment.new_end {
                return None;
            }
            removed += fragment.len();
        }
        Some(new_bci - removed)
    }

    /// Do the old and new positions denote the same logical location?
    pub fn same_location(&self, old_bci: usize, new_bci: usize) -> bool {
        self.translate(old_bci) == new_bci
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Total number of bytes inserted
    pub fn inserted_len(&self) -> usize {
        self.fragments.iter().map(Fragment::len).sum()
    }
}

impl fmt::Display for PositionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, fragment) in self.fragments.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(
                f,
                "{} -> {}..{}",
                fragment.old_bci, fragment.new_start, fragment.new_end
            )?;
        }
        f.write_str("]")
    }
}

/// Forward jump targets `(old_target, new_target)` whose agreement can only be checked once all
/// fragments are known
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingJumps {
    jumps: Vec<(usize, usize)>,
}

impl PendingJumps {
    pub fn new() -> PendingJumps {
        PendingJumps { jumps: vec![] }
    }

    pub fn push(&mut self, old_target: usize, new_target: usize) {
        self.jumps.push((old_target, new_target));
    }

    pub fn len(&self) -> usize {
        self.jumps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jumps.is_empty()
    }

    /// Drop every jump pushed after the first `len`
    pub fn truncate(&mut self, len: usize) {
        self.jumps.truncate(len);
    }

    /// First pending jump whose targets do not denote the same location
    pub fn first_miss(&self, positions: &PositionMap) -> Option<(usize, usize)> {
        self.jumps
            .iter()
            .copied()
            .find(|&(old_target, new_target)| !positions.same_location(old_target, new_target))
    }
}
