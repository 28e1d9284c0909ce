//! Compare two versions of a JVM method at the bytecode level
//!
//! When a class gets redefined in a running JVM, each method in the new class is checked against
//! its old version: can frames executing the old code keep going, or be moved over to the new
//! code? The [`compare`] module answers that, and [`jvm`] has the class file and bytecode plumbing
//! needed to get method bodies to compare.

pub mod compare;
pub mod jvm;
pub mod util;
