use super::{switch_padding, ConstantIndex, Error, Opcode};
use std::convert::TryFrom;
use std::fmt;

/// Opaque jump target handed out by [`CodeBuilder::fresh_label`]
#[derive(Copy, Clone, Hash, Eq, PartialEq)]
pub struct CodeLabel(usize);

impl fmt::Debug for CodeLabel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("l{}", self.0))
    }
}

/// Jump offset that still needs to be filled in once the target label is placed
struct PendingOffset {
    /// Position of the instruction the offset is relative to
    from: usize,

    /// Position in the code array where the offset gets written
    patch_at: usize,

    /// `goto_w`, `jsr_w`, and switch offsets are 4 bytes, the rest are 2
    wide: bool,

    label: CodeLabel,
}

/// Builder for raw method bytecode
///
/// Instructions are appended in order. Jumps refer to labels, which can be placed before or after
/// the jumps referring to them; offsets get patched in by [`CodeBuilder::finish`]. The builder
/// does no verification whatsoever: it will happily produce code that underflows the stack.
pub struct CodeBuilder {
    code: Vec<u8>,
    label_positions: Vec<Option<usize>>,
    pending_offsets: Vec<PendingOffset>,
}

impl CodeBuilder {
    pub fn new() -> CodeBuilder {
        CodeBuilder {
            code: vec![],
            label_positions: vec![],
            pending_offsets: vec![],
        }
    }

    pub fn fresh_label(&mut self) -> CodeLabel {
        self.label_positions.push(None);
        CodeLabel(self.label_positions.len() - 1)
    }

    /// Place a label at the current position (placing a label again moves it)
    pub fn place_label(&mut self, label: CodeLabel) -> &mut Self {
        self.label_positions[label.0] = Some(self.code.len());
        self
    }

    /// Instruction without operands
    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        self.code.push(opcode.to_u8());
        self
    }

    /// Append raw bytes
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.code.extend_from_slice(bytes);
        self
    }

    pub fn bipush(&mut self, value: i8) -> &mut Self {
        self.code.push(Opcode::BiPush.to_u8());
        self.code.push(value as u8);
        self
    }

    pub fn sipush(&mut self, value: i16) -> &mut Self {
        self.code.push(Opcode::SiPush.to_u8());
        self.code.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// `ldc` when the index fits in a byte, `ldc_w` otherwise
    pub fn ldc(&mut self, index: ConstantIndex) -> &mut Self {
        match u8::try_from(index.0) {
            Ok(byte) => {
                self.code.push(Opcode::Ldc.to_u8());
                self.code.push(byte);
                self
            }
            Err(_) => self.constant_op(Opcode::LdcW, index),
        }
    }

    /// Instruction whose only operand is a two byte constant pool index (eg. `new`, `getfield`,
    /// `invokestatic`, `ldc_w`, `ldc2_w`)
    pub fn constant_op(&mut self, opcode: Opcode, index: ConstantIndex) -> &mut Self {
        self.code.push(opcode.to_u8());
        self.code.extend_from_slice(&index.0.to_be_bytes());
        self
    }

    pub fn invokeinterface(&mut self, method: ConstantIndex, count: u8) -> &mut Self {
        self.constant_op(Opcode::InvokeInterface, method);
        self.code.push(count);
        self.code.push(0);
        self
    }

    pub fn invokedynamic(&mut self, call_site: ConstantIndex) -> &mut Self {
        self.constant_op(Opcode::InvokeDynamic, call_site);
        self.code.extend_from_slice(&[0, 0]);
        self
    }

    pub fn multianewarray(&mut self, class: ConstantIndex, dimensions: u8) -> &mut Self {
        self.constant_op(Opcode::MultiANewArray, class);
        self.code.push(dimensions);
        self
    }

    pub fn newarray(&mut self, array_type: u8) -> &mut Self {
        self.code.push(Opcode::NewArray.to_u8());
        self.code.push(array_type);
        self
    }

    /// Load, store, or `ret` with an explicit slot, using `wide` only when the slot needs it
    pub fn local(&mut self, opcode: Opcode, slot: u16) -> &mut Self {
        match u8::try_from(slot) {
            Ok(byte) => {
                self.code.push(opcode.to_u8());
                self.code.push(byte);
                self
            }
            Err(_) => self.wide_local(opcode, slot),
        }
    }

    /// Load, store, or `ret` that always uses the `wide` prefix
    pub fn wide_local(&mut self, opcode: Opcode, slot: u16) -> &mut Self {
        self.code.push(Opcode::Wide.to_u8());
        self.code.push(opcode.to_u8());
        self.code.extend_from_slice(&slot.to_be_bytes());
        self
    }

    /// `iinc`, using `wide` only when the slot or the increment needs it
    pub fn iinc(&mut self, slot: u16, delta: i16) -> &mut Self {
        match (u8::try_from(slot), i8::try_from(delta)) {
            (Ok(slot), Ok(delta)) => {
                self.code.push(Opcode::IInc.to_u8());
                self.code.push(slot);
                self.code.push(delta as u8);
                self
            }
            _ => self.wide_iinc(slot, delta),
        }
    }

    pub fn wide_iinc(&mut self, slot: u16, delta: i16) -> &mut Self {
        self.code.push(Opcode::Wide.to_u8());
        self.code.push(Opcode::IInc.to_u8());
        self.code.extend_from_slice(&slot.to_be_bytes());
        self.code.extend_from_slice(&delta.to_be_bytes());
        self
    }

    /// Jump to a label (the offset width follows from the opcode)
    pub fn branch(&mut self, opcode: Opcode, label: CodeLabel) -> &mut Self {
        let from = self.code.len();
        let wide = matches!(opcode, Opcode::GotoW | Opcode::JsrW);
        self.code.push(opcode.to_u8());
        self.push_offset(from, wide, label);
        self
    }

    /// `tableswitch` with jump targets for `low`, `low + 1`, ...
    pub fn tableswitch(
        &mut self,
        default: CodeLabel,
        low: i32,
        targets: &[CodeLabel],
    ) -> &mut Self {
        let from = self.code.len();
        self.code.push(Opcode::TableSwitch.to_u8());
        self.push_padding(from);
        self.push_offset(from, true, default);
        let high = low + targets.len() as i32 - 1;
        self.code.extend_from_slice(&low.to_be_bytes());
        self.code.extend_from_slice(&high.to_be_bytes());
        for target in targets {
            self.push_offset(from, true, *target);
        }
        self
    }

    /// `lookupswitch` (the pairs are emitted in the order given, so they should be sorted by key)
    pub fn lookupswitch(&mut self, default: CodeLabel, pairs: &[(i32, CodeLabel)]) -> &mut Self {
        let from = self.code.len();
        self.code.push(Opcode::LookupSwitch.to_u8());
        self.push_padding(from);
        self.push_offset(from, true, default);
        self.code
            .extend_from_slice(&(pairs.len() as i32).to_be_bytes());
        for (key, target) in pairs {
            self.code.extend_from_slice(&key.to_be_bytes());
            self.push_offset(from, true, *target);
        }
        self
    }

    fn push_padding(&mut self, from: usize) {
        for _ in 0..switch_padding(from) {
            self.code.push(0);
        }
    }

    fn push_offset(&mut self, from: usize, wide: bool, label: CodeLabel) {
        let patch_at = self.code.len();
        self.code
            .extend_from_slice(if wide { &[0, 0, 0, 0] } else { &[0, 0] });
        self.pending_offsets.push(PendingOffset {
            from,
            patch_at,
            wide,
            label,
        });
    }

    /// Patch in all jump offsets and return the code array
    pub fn finish(mut self) -> Result<Vec<u8>, Error> {
        for pending in &self.pending_offsets {
            let to = self.label_positions[pending.label.0]
                .ok_or(Error::UnplacedLabel(pending.label))?;
            let offset = to as i64 - pending.from as i64;
            let out_of_range = || Error::JumpOutOfRange {
                from: pending.from,
                to,
            };
            if pending.wide {
                let offset = i32::try_from(offset).map_err(|_| out_of_range())?;
                self.code[pending.patch_at..pending.patch_at + 4]
                    .copy_from_slice(&offset.to_be_bytes());
            } else {
                let offset = i16::try_from(offset).map_err(|_| out_of_range())?;
                self.code[pending.patch_at..pending.patch_at + 2]
                    .copy_from_slice(&offset.to_be_bytes());
            }
        }
        Ok(self.code)
    }
}

impl Default for CodeBuilder {
    fn default() -> Self {
        CodeBuilder::new()
    }
}
