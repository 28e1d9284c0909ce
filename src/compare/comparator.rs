use super::{
    check_preconditions, ComparisonMode, ConstantPoolOracle, PendingJumps, PositionMap,
    Precondition,
};
use crate::jvm::{BytecodeStream, Error, Instruction, MethodBody};

/// One version of a method: its code, and the constant pool its operands point into
#[derive(Copy, Clone)]
pub struct MethodVersion<'a> {
    pub body: &'a MethodBody,
    pub constants: &'a dyn ConstantPoolOracle,
}

impl<'a> MethodVersion<'a> {
    pub fn new(body: &'a MethodBody, constants: &'a dyn ConstantPoolOracle) -> MethodVersion<'a> {
        MethodVersion { body, constants }
    }
}

/// Outcome of comparing two versions of a method
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Equivalent modulo constant pool
    Emcp,

    /// New code is the old code with insertions, which the map describes
    Switchable(PositionMap),

    /// Neither, along with the outcome of the summary checks (which is
    /// [`Precondition::Compatible`] when only the code itself differs)
    Differs(Precondition),
}

/// Are the two methods equivalent modulo constant pool?
///
/// The code must have the same length and the instructions must match one for one: same opcodes,
/// equivalent constant pool references, identical immediates and jump offsets.
pub fn methods_emcp(old: MethodVersion, new: MethodVersion) -> bool {
    let precondition = check_preconditions(old.body, new.body, ComparisonMode::Exact);
    if !precondition.is_compatible() {
        log::debug!("Methods are not comparable: {}", precondition);
        return false;
    }
    code_emcp(old, new)
}

/// Is the new method the old one with some code inserted?
///
/// If so, the returned map translates positions in the old code into positions in the new code.
/// The map is empty when the methods are equivalent modulo constant pool, or when the only
/// inserted code comes after the last old instruction.
pub fn methods_switchable(old: MethodVersion, new: MethodVersion) -> Option<PositionMap> {
    let precondition = check_preconditions(old.body, new.body, ComparisonMode::Switchable);
    if !precondition.is_compatible() {
        log::debug!("Methods are not switchable: {}", precondition);
        return None;
    }
    code_switchable(old, new)
}

/// Compare two versions of a method, trying the stricter check first
///
/// With [`ComparisonMode::Exact`], only equivalence modulo constant pool is checked. The summary
/// checks run once, for `mode`: their outcome is what ends up in [`Verdict::Differs`].
pub fn compare_methods(old: MethodVersion, new: MethodVersion, mode: ComparisonMode) -> Verdict {
    let precondition = check_preconditions(old.body, new.body, mode);
    if !precondition.is_compatible() {
        log::debug!("Methods are not comparable: {}", precondition);
        return Verdict::Differs(precondition);
    }

    // Frame sizes already agree, so only the lengths stand between here and the exact check
    if old.body.code_len() == new.body.code_len() && code_emcp(old, new) {
        return Verdict::Emcp;
    }
    if mode == ComparisonMode::Switchable {
        if let Some(positions) = code_switchable(old, new) {
            return Verdict::Switchable(positions);
        }
    }
    Verdict::Differs(precondition)
}

/// Exact walk over code that already passed the summary checks
fn code_emcp(old: MethodVersion, new: MethodVersion) -> bool {
    let comparison = Comparison::new(old.constants, new.constants, ComparisonMode::Exact);
    match comparison.compare_exact(old.body.stream(), new.body.stream()) {
        Ok(emcp) => emcp,
        Err(err) => {
            log::debug!("Failed to decode method code: {:?}", err);
            false
        }
    }
}

/// Switchable walk over code that already passed the summary checks
fn code_switchable(old: MethodVersion, new: MethodVersion) -> Option<PositionMap> {
    let comparison = Comparison::new(old.constants, new.constants, ComparisonMode::Switchable);
    match comparison.compare_switchable(old.body.stream(), new.body.stream()) {
        Ok(positions) => positions,
        Err(err) => {
            log::debug!("Failed to decode method code: {:?}", err);
            None
        }
    }
}

/// Fragment being searched for, while the new stream is scanned for a resynchronization point
pub(super) struct Resync {
    pub old_bci: usize,
    pub new_start: usize,
}

/// State of a single comparison between two methods
pub(super) struct Comparison<'a> {
    pub old_constants: &'a dyn ConstantPoolOracle,
    pub new_constants: &'a dyn ConstantPoolOracle,
    pub mode: ComparisonMode,

    /// Fragments found so far (switchable mode only)
    pub positions: PositionMap,

    /// Forward jumps to check once all fragments are known (switchable mode only)
    pub pending: PendingJumps,

    pub resync: Option<Resync>,
}

impl<'a> Comparison<'a> {
    pub fn new(
        old_constants: &'a dyn ConstantPoolOracle,
        new_constants: &'a dyn ConstantPoolOracle,
        mode: ComparisonMode,
    ) -> Comparison<'a> {
        Comparison {
            old_constants,
            new_constants,
            mode,
            positions: PositionMap::new(),
            pending: PendingJumps::new(),
            resync: None,
        }
    }

    /// Do the instructions match? Jumps queued while deciding are kept only if they do.
    fn instructions_match(&mut self, old: &Instruction, new: &Instruction) -> bool {
        let pending_before = self.pending.len();
        let matched = old.opcode() == new.opcode() && self.same_arguments(old, new);
        if !matched {
            self.pending.truncate(pending_before);
        }
        matched
    }

    /// Walk both streams in lockstep, requiring every pair of instructions to match
    fn compare_exact(
        mut self,
        mut old_stream: BytecodeStream,
        mut new_stream: BytecodeStream,
    ) -> Result<bool, Error> {
        loop {
            match (
                old_stream.next().transpose()?,
                new_stream.next().transpose()?,
            ) {
                (None, None) => return Ok(true),
                (Some(old), Some(new)) => {
                    if !self.instructions_match(&old, &new) {
                        log::trace!(
                            "Mismatch at {}: {} vs. {}",
                            old.bci(),
                            old.opcode().mnemonic(),
                            new.opcode().mnemonic()
                        );
                        return Ok(false);
                    }
                }
                _ => return Ok(false),
            }
        }
    }

    /// Walk both streams in lockstep, skipping over code inserted in the new stream
    fn compare_switchable(
        mut self,
        mut old_stream: BytecodeStream,
        mut new_stream: BytecodeStream,
    ) -> Result<Option<PositionMap>, Error> {
        while let Some(old) = old_stream.next().transpose()? {
            let new = match new_stream.next().transpose()? {
                Some(new) => new,
                None => {
                    log::debug!("New code ends before old instruction at {}", old.bci());
                    return Ok(None);
                }
            };
            if self.instructions_match(&old, &new) {
                continue;
            }

            let new_start = new.bci();
            match self.find_resync_point(&old, new_start, &mut new_stream)? {
                Some(new_end) => {
                    log::trace!(
                        "Code inserted before old instruction at {}: {}..{}",
                        old.bci(),
                        new_start,
                        new_end
                    );
                    self.positions.record_fragment(old.bci(), new_start, new_end);
                }
                None => {
                    log::debug!(
                        "No match for old instruction {} at {}",
                        old.opcode().mnemonic(),
                        old.bci()
                    );
                    return Ok(None);
                }
            }
        }

        if let Some((old_target, new_target)) = self.pending.first_miss(&self.positions) {
            log::debug!(
                "Forward jump miss: old target {}, expected new target {}, actual new target {}",
                old_target,
                self.positions.translate(old_target),
                new_target
            );
            return Ok(None);
        }

        Ok(Some(self.positions))
    }

    /// Advance the new stream until an instruction matches `old`, returning its position
    ///
    /// `new_start` is the position of the new instruction that failed to match `old`. Each
    /// candidate gets compared as though the fragment it would end were already recorded.
    fn find_resync_point(
        &mut self,
        old: &Instruction,
        new_start: usize,
        new_stream: &mut BytecodeStream,
    ) -> Result<Option<usize>, Error> {
        self.resync = Some(Resync {
            old_bci: old.bci(),
            new_start,
        });
        let mut found = None;
        for candidate in new_stream {
            let candidate = match candidate {
                Ok(candidate) => candidate,
                Err(err) => {
                    self.resync = None;
                    return Err(err);
                }
            };
            if self.instructions_match(old, &candidate) {
                found = Some(candidate.bci());
                break;
            }
        }
        self.resync = None;
        Ok(found)
    }
}
