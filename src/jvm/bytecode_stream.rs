//! Decoding of method code into a stream of instructions
//!
//! [`BytecodeStream`] walks the code array front to back, producing one [`Instruction`] at a time.
//! Instructions borrow from the code array and are never stored: once the stream moves on, the
//! previous instruction is just a view of some bytes.
//!
//! The `wide` prefix never shows up as its own instruction. It is merged into the load, store,
//! `ret`, or `iinc` instruction it modifies, which then reports `is_wide()` and has the position
//! of the prefix.

use super::{Error, Opcode, OpcodeFamily};
use byteorder::{BigEndian, ByteOrder};
use std::convert::TryFrom;
use std::iter::FusedIterator;

/// Cursor over the instructions in a code array
#[derive(Clone, Debug)]
pub struct BytecodeStream<'a> {
    code: &'a [u8],

    /// Position of the next instruction to decode
    next_bci: usize,
}

impl<'a> BytecodeStream<'a> {
    pub fn new(code: &'a [u8]) -> BytecodeStream<'a> {
        BytecodeStream { code, next_bci: 0 }
    }

    pub fn is_at_end(&self) -> bool {
        self.next_bci >= self.code.len()
    }

    /// Decode the instruction at `bci`
    fn decode(&self, bci: usize) -> Result<Instruction<'a>, Error> {
        let code = self.code;
        let malformed = |reason: &'static str| Error::MalformedCode { bci, reason };
        let u1 = |at: usize| code.get(at).copied().ok_or_else(|| malformed("truncated"));
        let i4 = |at: usize| {
            code.get(at..at + 4)
                .map(BigEndian::read_i32)
                .ok_or_else(|| malformed("truncated"))
        };

        let opcode = Opcode::from_u8(u1(bci)?).ok_or_else(|| malformed("unknown opcode"))?;

        let (opcode, wide, len) = match opcode {
            Opcode::Wide => {
                let modified =
                    Opcode::from_u8(u1(bci + 1)?).ok_or_else(|| malformed("unknown opcode"))?;
                let len = modified
                    .wide_length()
                    .ok_or_else(|| malformed("opcode cannot be widened"))?;
                (modified, true, len)
            }
            Opcode::TableSwitch => {
                let table = bci + 1 + switch_padding(bci);
                let low = i4(table + 4)?;
                let high = i4(table + 8)?;
                if high < low {
                    return Err(malformed("tableswitch bounds are inverted"));
                }
                let entries = (high as i64 - low as i64 + 1) as usize;
                (opcode, false, table - bci + 12 + 4 * entries)
            }
            Opcode::LookupSwitch => {
                let table = bci + 1 + switch_padding(bci);
                let npairs = usize::try_from(i4(table + 4)?)
                    .map_err(|_| malformed("lookupswitch has a negative pair count"))?;
                (opcode, false, table - bci + 8 + 8 * npairs)
            }
            other => match other.fixed_length() {
                Some(len) => (other, false, len),
                None => return Err(malformed("unknown instruction length")),
            },
        };

        let bytes = code
            .get(bci..bci + len)
            .ok_or_else(|| malformed("truncated"))?;
        let operands = Operands::decode(opcode, wide, bci, bytes);
        Ok(Instruction {
            opcode,
            bci,
            wide,
            bytes,
            operands,
        })
    }
}

/// Once decoding fails, the stream yields the error and then ends
impl<'a> Iterator for BytecodeStream<'a> {
    type Item = Result<Instruction<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_at_end() {
            return None;
        }
        match self.decode(self.next_bci) {
            Ok(insn) => {
                self.next_bci = insn.next_bci();
                Some(Ok(insn))
            }
            Err(err) => {
                self.next_bci = self.code.len();
                Some(Err(err))
            }
        }
    }
}

impl<'a> FusedIterator for BytecodeStream<'a> {}

/// `tableswitch` and `lookupswitch` tables start at a multiple of four bytes from the start of the
/// method, so there is 0-3 bytes of padding after the opcode
pub fn switch_padding(bci: usize) -> usize {
    (4 - (bci + 1) % 4) % 4
}

/// One decoded instruction
#[derive(Clone, Debug)]
pub struct Instruction<'a> {
    opcode: Opcode,
    bci: usize,
    wide: bool,

    /// Full encoding (including the `wide` prefix, if any)
    bytes: &'a [u8],

    operands: Operands<'a>,
}

impl<'a> Instruction<'a> {
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn bci(&self) -> usize {
        self.bci
    }

    /// Was the instruction prefixed by `wide`?
    pub fn is_wide(&self) -> bool {
        self.wide
    }

    /// Position of the instruction that follows this one
    pub fn next_bci(&self) -> usize {
        self.bci + self.bytes.len()
    }

    /// Raw encoding of the instruction, opcode and padding included
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn operands(&self) -> &Operands<'a> {
        &self.operands
    }

    /// Constant pool index operand, for the instructions that have one
    pub fn constant_index(&self) -> Option<u16> {
        match self.operands {
            Operands::Constant(index)
            | Operands::MultiANewArray { class: index, .. }
            | Operands::InvokeInterface { method: index, .. } => Some(index),
            _ => None,
        }
    }

    /// Absolute position targeted by a relative offset from this instruction
    ///
    /// `None` if the target would be before the start of the method.
    pub fn target(&self, offset: i32) -> Option<usize> {
        usize::try_from(self.bci as i64 + offset as i64).ok()
    }
}

/// Decoded operands of an instruction
#[derive(Clone, Debug, PartialEq)]
pub enum Operands<'a> {
    None,

    /// Constant pool index (`ldc` has it widened to `u16`)
    Constant(u16),

    MultiANewArray { class: u16, dimensions: u8 },

    /// `count` is the redundant argument-slot count encoded in the instruction
    InvokeInterface { method: u16, count: u8 },

    /// `bipush`
    Byte(i8),

    /// `sipush`
    Short(i16),

    /// `newarray` element type code
    ArrayType(u8),

    /// Local variable slot of loads, stores, and `ret`
    Local(u16),

    Increment { local: u16, delta: i16 },

    /// Signed offset relative to the branch instruction
    Branch(i32),

    TableSwitch(TableSwitch<'a>),
    LookupSwitch(LookupSwitch<'a>),
}

impl<'a> Operands<'a> {
    /// Decode operands from an instruction encoding whose length has already been checked
    fn decode(opcode: Opcode, wide: bool, bci: usize, bytes: &'a [u8]) -> Operands<'a> {
        // Operands start after the opcode (and after `wide` + opcode when widened)
        let ops = if wide { &bytes[2..] } else { &bytes[1..] };

        match opcode.family() {
            OpcodeFamily::LocalVariable if wide => Operands::Local(BigEndian::read_u16(ops)),
            OpcodeFamily::LocalVariable => Operands::Local(ops[0] as u16),
            OpcodeFamily::Increment if wide => Operands::Increment {
                local: BigEndian::read_u16(ops),
                delta: BigEndian::read_i16(&ops[2..]),
            },
            OpcodeFamily::Increment => Operands::Increment {
                local: ops[0] as u16,
                delta: ops[1] as i8 as i16,
            },
            OpcodeFamily::ByteImmediate => Operands::Byte(ops[0] as i8),
            OpcodeFamily::ShortImmediate => Operands::Short(BigEndian::read_i16(ops)),
            OpcodeFamily::LoadConstant if opcode == Opcode::Ldc => {
                Operands::Constant(ops[0] as u16)
            }
            OpcodeFamily::Branch => match opcode {
                Opcode::GotoW | Opcode::JsrW => Operands::Branch(BigEndian::read_i32(ops)),
                _ => Operands::Branch(BigEndian::read_i16(ops) as i32),
            },
            OpcodeFamily::TableSwitch => {
                let table = &ops[switch_padding(bci)..];
                Operands::TableSwitch(TableSwitch {
                    default: BigEndian::read_i32(table),
                    low: BigEndian::read_i32(&table[4..]),
                    high: BigEndian::read_i32(&table[8..]),
                    offsets: &table[12..],
                })
            }
            OpcodeFamily::LookupSwitch => {
                let table = &ops[switch_padding(bci)..];
                Operands::LookupSwitch(LookupSwitch {
                    default: BigEndian::read_i32(table),
                    pairs: &table[8..],
                })
            }
            OpcodeFamily::ClassRef if opcode == Opcode::MultiANewArray => {
                Operands::MultiANewArray {
                    class: BigEndian::read_u16(ops),
                    dimensions: ops[2],
                }
            }
            OpcodeFamily::MemberRef if opcode == Opcode::InvokeInterface => {
                Operands::InvokeInterface {
                    method: BigEndian::read_u16(ops),
                    count: ops[2],
                }
            }
            OpcodeFamily::ClassRef
            | OpcodeFamily::MemberRef
            | OpcodeFamily::LoadConstant
            | OpcodeFamily::LoadWideConstant => Operands::Constant(BigEndian::read_u16(ops)),
            OpcodeFamily::Plain => match opcode {
                Opcode::InvokeDynamic => Operands::Constant(BigEndian::read_u16(ops)),
                Opcode::NewArray => Operands::ArrayType(ops[0]),
                _ => Operands::None,
            },
        }
    }
}

/// Operands of a `tableswitch`
#[derive(Clone, Debug, PartialEq)]
pub struct TableSwitch<'a> {
    pub default: i32,
    pub low: i32,
    pub high: i32,

    /// `high - low + 1` big-endian jump offsets
    offsets: &'a [u8],
}

impl<'a> TableSwitch<'a> {
    /// Jump offsets, in order from `low` to `high`
    pub fn offsets(&self) -> impl Iterator<Item = i32> + 'a {
        self.offsets.chunks_exact(4).map(BigEndian::read_i32)
    }
}

/// Operands of a `lookupswitch`
#[derive(Clone, Debug, PartialEq)]
pub struct LookupSwitch<'a> {
    pub default: i32,

    /// Big-endian `(match, offset)` pairs
    pairs: &'a [u8],
}

impl<'a> LookupSwitch<'a> {
    pub fn len(&self) -> usize {
        self.pairs.len() / 8
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// `(match, offset)` pairs, in encoding order
    pub fn pairs(&self) -> impl Iterator<Item = (i32, i32)> + 'a {
        self.pairs
            .chunks_exact(8)
            .map(|pair| (BigEndian::read_i32(pair), BigEndian::read_i32(&pair[4..])))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn decode_all(code: &[u8]) -> Vec<(usize, Opcode, Operands)> {
        BytecodeStream::new(code)
            .map(|insn| {
                let insn = insn.unwrap();
                (insn.bci(), insn.opcode(), insn.operands().clone())
            })
            .collect()
    }

    #[test]
    fn simple_instructions() {
        // iconst_1; bipush -3; sipush 300; iadd; ireturn
        let code = [0x04, 0x10, 0xfd, 0x11, 0x01, 0x2c, 0x60, 0xac];
        assert_eq!(
            decode_all(&code),
            vec![
                (0, Opcode::IConst1, Operands::None),
                (1, Opcode::BiPush, Operands::Byte(-3)),
                (3, Opcode::SiPush, Operands::Short(300)),
                (6, Opcode::IAdd, Operands::None),
                (7, Opcode::IReturn, Operands::None),
            ]
        );
    }

    #[test]
    fn wide_prefix_is_folded() {
        // wide iload 256; wide iinc 2 -1000; iload 3
        let code = [
            0xc4, 0x15, 0x01, 0x00, 0xc4, 0x84, 0x00, 0x02, 0xfc, 0x18, 0x15, 0x03,
        ];
        let insns: Vec<_> = BytecodeStream::new(&code).map(Result::unwrap).collect();
        assert_eq!(insns.len(), 3);
        assert!(insns[0].is_wide());
        assert_eq!(insns[0].opcode(), Opcode::ILoad);
        assert_eq!(insns[0].operands(), &Operands::Local(256));
        assert_eq!(insns[1].bci(), 4);
        assert_eq!(
            insns[1].operands(),
            &Operands::Increment {
                local: 2,
                delta: -1000
            }
        );
        assert!(!insns[2].is_wide());
        assert_eq!(insns[2].bci(), 10);
        assert_eq!(insns[2].operands(), &Operands::Local(3));
    }

    #[test]
    fn branches_and_targets() {
        // goto +3 at 0; goto_w -3 at 3
        let code = [0xa7, 0x00, 0x03, 0xc8, 0xff, 0xff, 0xff, 0xfd];
        let insns: Vec<_> = BytecodeStream::new(&code).map(Result::unwrap).collect();
        assert_eq!(insns[0].operands(), &Operands::Branch(3));
        assert_eq!(insns[0].target(3), Some(3));
        assert_eq!(insns[1].operands(), &Operands::Branch(-3));
        assert_eq!(insns[1].target(-3), Some(0));
        assert_eq!(insns[1].target(-4), None);
    }

    #[test]
    fn table_switch_padding() {
        // nop; tableswitch (2 bytes padding) default=20 low=1 high=2 offsets=[12, 16]
        let mut code = vec![0x00, 0xaa, 0x00, 0x00];
        for word in &[20i32, 1, 2, 12, 16] {
            code.extend_from_slice(&word.to_be_bytes());
        }
        code.push(0xb1);

        let insns: Vec<_> = BytecodeStream::new(&code).map(Result::unwrap).collect();
        assert_eq!(insns.len(), 3);
        assert_eq!(insns[1].bytes().len(), 23);
        match insns[1].operands() {
            Operands::TableSwitch(table) => {
                assert_eq!((table.default, table.low, table.high), (20, 1, 2));
                assert_eq!(table.offsets().collect::<Vec<_>>(), vec![12, 16]);
            }
            other => panic!("unexpected operands {:?}", other),
        }
        assert_eq!(insns[2].bci(), 24);
    }

    #[test]
    fn lookup_switch_pairs() {
        // lookupswitch at 0 (3 bytes padding) default=28 npairs=1 (5 -> 28)
        let mut code = vec![0xab, 0x00, 0x00, 0x00];
        for word in &[28i32, 1, 5, 28] {
            code.extend_from_slice(&word.to_be_bytes());
        }
        code.push(0xb1);

        let insns: Vec<_> = BytecodeStream::new(&code).map(Result::unwrap).collect();
        match insns[0].operands() {
            Operands::LookupSwitch(lookup) => {
                assert_eq!(lookup.default, 28);
                assert_eq!(lookup.len(), 1);
                assert_eq!(lookup.pairs().collect::<Vec<_>>(), vec![(5, 28)]);
            }
            other => panic!("unexpected operands {:?}", other),
        }
        assert_eq!(insns[1].bci(), 20);
    }

    #[test]
    fn malformed_code_ends_the_stream() {
        // sipush with a missing byte
        let mut stream = BytecodeStream::new(&[0x00, 0x11, 0x01]);
        assert!(stream.next().unwrap().is_ok());
        match stream.next() {
            Some(Err(Error::MalformedCode { bci: 1, .. })) => (),
            other => panic!("unexpected {:?}", other),
        }
        assert!(stream.next().is_none());

        // `wide goto` is not a thing
        let mut stream = BytecodeStream::new(&[0xc4, 0xa7, 0x00, 0x00]);
        assert!(matches!(stream.next(), Some(Err(_))));

        // unassigned opcode
        let mut stream = BytecodeStream::new(&[0xfe]);
        assert!(matches!(stream.next(), Some(Err(_))));
    }
}
