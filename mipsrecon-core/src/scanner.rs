//! Block scanner: a single forward pass from a seed address that yields basic
//! blocks at MIPS branch-with-delay-slot boundaries.

use mipsrecon_isa::{Addr, OpcodeDecoder, SymbolMap};

use crate::instruction_cache::InstructionCache;

/// One yielded block from a scan pass. `lines` holds every instruction address
/// covered, in execution order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BbAnalState {
    pub bb_addr: u32,
    pub branch_addr: u32,
    pub last_addr: u32,
    pub lines: Vec<u32>,
}

/// Scans forward from `start_addr`, calling `on_each_bb` once per discovered block.
/// `last_addr` bounds the scan (`None` means open-ended); callers that re-enter an
/// existing block's range pass its stored `last_address` here instead of leaving
/// the scan open-ended.
pub fn scan(
    start_addr: u32,
    last_addr: Option<u32>,
    cache: &mut InstructionCache,
    decoder: &dyn OpcodeDecoder,
    sym_map: &dyn SymbolMap,
    mut on_each_bb: impl FnMut(BbAnalState),
) {
    let mut addr = start_addr;
    let mut bb_addr = start_addr;
    let mut branch_addr = 0u32;
    let mut lines: Vec<u32> = Vec::new();
    let mut prev_branch_had_delay_slot = false;
    let mut prev_branch_was_unconditional = false;

    loop {
        let Some(instr) = cache.get_or_decode(Addr(addr), decoder, sym_map) else { break };
        lines.push(addr);
        let info = instr.info.clone();

        let mut yield_now = false;
        let mut stop_after = false;

        if prev_branch_had_delay_slot {
            yield_now = true;
            if last_addr.is_none() && prev_branch_was_unconditional {
                stop_after = true;
            }
        }

        if info.is_branch {
            branch_addr = addr;
            if !info.has_delay_slot {
                yield_now = true;
                if last_addr.is_none() && info.is_conditional {
                    stop_after = true;
                }
            }
            prev_branch_had_delay_slot = info.has_delay_slot;
            prev_branch_was_unconditional = !info.is_conditional;
        } else {
            prev_branch_had_delay_slot = false;
        }

        if let Some(l) = last_addr {
            if addr >= l {
                yield_now = true;
                stop_after = true;
            }
        }

        if yield_now {
            on_each_bb(BbAnalState { bb_addr, branch_addr, last_addr: addr, lines: std::mem::take(&mut lines) });
            if stop_after {
                break;
            }
            bb_addr = addr + 4;
            branch_addr = 0;
        }

        addr = addr.wrapping_add(4);
    }

    if !lines.is_empty() {
        // Exhausted the decoder (ran off mapped memory) mid-block: yield whatever
        // was collected rather than silently dropping it.
        let last = *lines.last().expect("checked non-empty");
        on_each_bb(BbAnalState { bb_addr, branch_addr, last_addr: last, lines });
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use mipsrecon_isa::InstructionInfo;
    use std::collections::HashMap;

    struct ScriptedDecoder(HashMap<u32, InstructionInfo>);
    impl OpcodeDecoder for ScriptedDecoder {
        fn decode(&self, addr: Addr) -> Option<InstructionInfo> {
            self.0.get(&addr.0).cloned()
        }

        fn is_valid_address(&self, addr: Addr) -> bool {
            self.0.contains_key(&addr.0)
        }
    }

    struct NoSymbols;
    impl SymbolMap for NoSymbols {
        fn get_label_name(&self, _addr: Addr) -> Option<String> {
            None
        }
        fn get_function_start(&self, _addr: Addr) -> Option<Addr> {
            None
        }
        fn add_function(&mut self, _name: &str, _address: Addr, _size: u32) {}
        fn set_function_size(&mut self, _address: Addr, _size: u32) {}
        fn add_module(&mut self, _name: &str, _address: Addr, _size: u32) {}
    }

    fn plain(dizz: &str) -> InstructionInfo {
        InstructionInfo::plain(0, dizz)
    }

    fn branch(dizz: &str, conditional: bool, delay_slot: bool, target: Addr) -> InstructionInfo {
        InstructionInfo {
            is_branch: true,
            is_conditional: conditional,
            is_likely_branch: false,
            is_branch_to_register: false,
            has_delay_slot: delay_slot,
            branch_target: target,
            ..plain(dizz)
        }
    }

    #[test]
    fn unconditional_branch_with_delay_slot_yields_one_block_then_stops() {
        let mut words = HashMap::new();
        words.insert(0x1000, plain("addiu\tsp, sp, -0x20"));
        words.insert(0x1004, branch("j\t->$00002000", false, true, Addr(0x2000)));
        words.insert(0x1008, plain("nop\t"));
        words.insert(0x100c, plain("addiu\tv0, zero, 0x1"));
        let decoder = ScriptedDecoder(words);
        let sym = NoSymbols;
        let mut cache = InstructionCache::new();

        let mut blocks = Vec::new();
        scan(0x1000, None, &mut cache, &decoder, &sym, |bb| blocks.push(bb));

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].bb_addr, 0x1000);
        assert_eq!(blocks[0].branch_addr, 0x1004);
        assert_eq!(blocks[0].last_addr, 0x1008);
        assert_eq!(blocks[0].lines, vec![0x1000, 0x1004, 0x1008]);
    }

    #[test]
    fn conditional_branch_continues_into_fallthrough_when_bounded() {
        let mut words = HashMap::new();
        words.insert(0x1000, branch("beq\tt0, zero, ->$00002000", true, true, Addr(0x2000)));
        words.insert(0x1004, plain("nop\t"));
        words.insert(0x1008, plain("addiu\tv0, zero, 0x1"));
        let decoder = ScriptedDecoder(words);
        let sym = NoSymbols;
        let mut cache = InstructionCache::new();

        let mut blocks = Vec::new();
        scan(0x1000, Some(0x1008), &mut cache, &decoder, &sym, |bb| blocks.push(bb));

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].last_addr, 0x1004);
        assert_eq!(blocks[1].bb_addr, 0x1008);
        assert_eq!(blocks[1].last_addr, 0x1008);
    }
}
