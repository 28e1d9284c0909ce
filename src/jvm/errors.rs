use super::{CodeLabel, ConstantIndex};

#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// Class file does not start with `0xCAFEBABE`
    BadMagic([u8; 4]),

    /// Constant pool entry has a tag we don't know how to read
    BadConstantTag { index: ConstantIndex, tag: u8 },

    /// Index does not point at a usable constant of the expected kind
    BadConstantIndex { index: ConstantIndex, expected: &'static str },

    /// Descriptor string could not be parsed
    BadDescriptor(String),

    /// Method code could not be decoded (unknown opcode, truncated operands)
    MalformedCode { bci: usize, reason: &'static str },

    /// Code was finished but some labels that were jumped to never got placed
    UnplacedLabel(CodeLabel),

    /// Relative jump does not fit the offset width of the branch instruction
    JumpOutOfRange { from: usize, to: usize },

    /// Constant pool has no more room
    ConstantPoolOverflow { offset: usize },
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}
