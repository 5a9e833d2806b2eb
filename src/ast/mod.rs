//! The instruction AST: a tagged sum of node variants
//! produced by [`generator::SyntaxTreeGenerator`] out of mnemonics and
//! operand strings, via [`factories::NodeFactories`].

pub mod factories;
pub mod generator;
pub mod node;

pub use factories::NodeFactories;
pub use generator::SyntaxTreeGenerator;
pub use node::{BranchCond, InstructionKind, IntOp, MemWidth, Node, OpWidth};
