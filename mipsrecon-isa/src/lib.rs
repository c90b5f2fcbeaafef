//! Value types and external-primitive contracts for MIPS program reconstruction:
//! addresses, decoded instructions and their arguments, the pseudocode AST, the
//! mnemonic-to-pseudocode lifter, and the HLE (syscall) target model. Nothing in this
//! crate holds engine state -- that lives in `mipsrecon-core`.

pub mod addr;
pub mod argument;
pub mod ast;
pub mod decoder;
pub mod hle;
pub mod instruction;
pub mod lifter;
pub mod symbols;

pub use addr::Addr;
pub use argument::{ArgKind, Argument};
pub use ast::Expr;
pub use decoder::{InstructionInfo, OpcodeDecoder};
pub use hle::{HleFunction, HleRegistry, HleType};
pub use instruction::Instruction;
pub use symbols::SymbolMap;
