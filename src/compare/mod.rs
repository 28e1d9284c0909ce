//! Decide whether a new version of a method can take over from an old one
//!
//! Two questions get asked about a pair of method bodies:
//!
//!   - are they equivalent modulo constant pool ([`methods_emcp`])? Activations running the old
//!     code can then keep running it unchanged.
//!
//!   - is the new code the old code with some code inserted ([`methods_switchable`])? Suspended
//!     activations can then be moved over to the new code using the returned [`PositionMap`].
//!
//! Both compare instructions one at a time, resolving constant pool operands through a
//! [`ConstantPoolOracle`] so that the two bodies can use entirely different pool layouts.
//!
//! ```
//! use methodcmp::compare::{methods_emcp, methods_switchable, MethodVersion};
//! use methodcmp::jvm::{CodeBuilder, ConstantPool, MethodBody, Opcode};
//!
//! # fn main() -> Result<(), methodcmp::jvm::Error> {
//! let pool = ConstantPool::new();
//!
//! let mut code = CodeBuilder::new();
//! code.op(Opcode::IConst1).op(Opcode::IReturn);
//! let old = MethodBody::new(code.finish()?, 1, 0, 0);
//!
//! let mut code = CodeBuilder::new();
//! code.op(Opcode::IConst1).op(Opcode::Nop).op(Opcode::IReturn);
//! let new = MethodBody::new(code.finish()?, 1, 0, 0);
//!
//! let old = MethodVersion::new(&old, &pool);
//! let new = MethodVersion::new(&new, &pool);
//! assert!(!methods_emcp(old, new));
//!
//! let positions = methods_switchable(old, new).expect("only a `nop` was inserted");
//! assert_eq!(positions.translate(0), 0);
//! assert_eq!(positions.translate(1), 2);
//! # Ok(())
//! # }
//! ```

mod comparator;
mod oracle;
mod position_map;
mod precondition;
mod rules;

pub use comparator::*;
pub use oracle::*;
pub use position_map::*;
pub use precondition::*;
