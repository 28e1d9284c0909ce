mod access_flags;
mod binary_format;
mod bytecode_stream;
mod class_file;
mod code_builder;
mod constants;
mod descriptors;
mod errors;
mod opcodes;

pub use access_flags::*;
pub use binary_format::*;
pub use bytecode_stream::*;
pub use class_file::*;
pub use code_builder::*;
pub use constants::*;
pub use descriptors::*;
pub use errors::*;
pub use opcodes::*;
