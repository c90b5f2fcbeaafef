//! Instruction cache: memoizes one decoded-and-argument-parsed
//! [`mipsrecon_isa::Instruction`] per address, keyed by the interval map. Entries
//! are immutable after first insertion.

use mipsrecon_isa::{Addr, Instruction, OpcodeDecoder, SymbolMap};

use crate::interval_map::IntervalMap;

#[derive(Default)]
pub struct InstructionCache {
    entries: IntervalMap<Instruction>,
}

impl InstructionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached instruction at `addr`, decoding and tokenizing it on a
    /// cache miss. `None` if the decoder reports no instruction there.
    pub fn get_or_decode(
        &mut self,
        addr: Addr,
        decoder: &dyn OpcodeDecoder,
        sym_map: &dyn SymbolMap,
    ) -> Option<&Instruction> {
        if !self.entries.contains_key(addr.0) {
            let info = decoder.decode(addr)?;
            let instr = Instruction::new(addr, info, |target| sym_map.get_label_name(target));
            self.entries.insert(addr.0, instr);
        }
        self.entries.get(addr.0)
    }

    #[must_use]
    pub fn peek(&self, addr: Addr) -> Option<&Instruction> {
        self.entries.get(addr.0)
    }
}

// -------------------------------------------------------------------------------------------------
