//! Stateful MIPS program reconstruction engine: the interval-indexed basic-block map,
//! instruction cache, basic-block manager, branch-delay-slot-aware block scanner,
//! function manager with split/re-parent, call-history and function graph, and the
//! trace-replay state machine that drives them from a recorded execution trace.
//! [`document::Document`] ties all of it together behind one facade.

pub mod basic_block;
pub mod callgraph;
pub mod config;
pub mod document;
pub mod error;
pub mod function;
pub mod instruction_cache;
pub mod interval_map;
pub mod manifest;
pub mod render;
pub mod replay;
pub mod scanner;
pub mod timestamp;
pub mod trace;

pub use basic_block::{BasicBlock, BasicBlockError, BasicBlockManager};
pub use callgraph::{BlockGraph, CallHistory, FunGraph, FunGraphNode};
pub use config::EngineConfig;
pub use document::Document;
pub use error::{DocumentError, TraceError};
pub use function::{Function, FunctionError, FunctionManager};
pub use instruction_cache::InstructionCache;
pub use interval_map::IntervalMap;
pub use manifest::Manifest;
pub use replay::{Replay, StackItem, ThreadState};
pub use timestamp::{Fts, Nts};
pub use trace::{Batch, TraceEvent};
