//! Print-line rendering: `* _ 0xADDR\tdizz\t; pseudo`, where `*` marks the block's
//! branch instruction and `_` its last. Layers the delay-slot-skip sequencing on top
//! of `mipsrecon_isa::lifter::lift`'s per-instruction pseudo-code, since a branch and
//! its delay slot render as one combined pseudo-line.

use mipsrecon_isa::{lifter::lift, Addr, HleRegistry, Instruction, OpcodeDecoder, SymbolMap};

use crate::instruction_cache::InstructionCache;

/// Lifter return code: `0` ok, `1` the following delay slot was folded into this
/// line and should be skipped, `-1` unimplemented.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LiftCode {
    Ok,
    SkipNext,
    Unimplemented,
}

/// Lifts one instruction to pseudo-code text, folding in its delay slot when it is a
/// branch with one.
#[must_use]
pub fn render_instruction(instr: &Instruction, delay_slot: Option<&Instruction>, hle: &dyn HleRegistry) -> (LiftCode, Option<String>) {
    let own = lift(instr, hle);

    if instr.info.is_branch && instr.info.has_delay_slot {
        if let Some(delay) = delay_slot {
            let delay_pseudo = lift(delay, hle);
            return match (delay_pseudo, own) {
                (Some(d), Some(b)) => (LiftCode::SkipNext, Some(format!("{d}; {b}"))),
                (Some(d), None) => (LiftCode::SkipNext, Some(d.to_string())),
                (None, Some(b)) => (LiftCode::SkipNext, Some(b.to_string())),
                (None, None) => (LiftCode::Unimplemented, None),
            };
        }
    }

    match own {
        Some(expr) => (LiftCode::Ok, Some(expr.to_string())),
        None => (LiftCode::Unimplemented, None),
    }
}

/// Renders one basic block's print lines, given its instruction addresses in
/// execution order plus the block's `branch_address`/`last_address` markers.
pub fn render_block(
    addresses: &[u32],
    branch_addr: u32,
    last_addr: u32,
    cache: &mut InstructionCache,
    decoder: &dyn OpcodeDecoder,
    sym_map: &dyn SymbolMap,
    hle: &dyn HleRegistry,
) -> Vec<String> {
    let mut lines = Vec::with_capacity(addresses.len());
    let mut skip_next = false;

    for (i, &addr) in addresses.iter().enumerate() {
        if skip_next {
            skip_next = false;
            continue;
        }

        let Some(instr) = cache.get_or_decode(Addr(addr), decoder, sym_map).cloned() else {
            continue;
        };
        let next_instr = addresses.get(i + 1).and_then(|&a| cache.get_or_decode(Addr(a), decoder, sym_map)).cloned();
        let (code, pseudo) = render_instruction(&instr, next_instr.as_ref(), hle);

        let branch_marker = if addr == branch_addr { '*' } else { ' ' };
        let last_marker = if addr == last_addr { '_' } else { ' ' };
        let pseudo_text = pseudo.unwrap_or_else(|| "???".to_string());
        lines.push(format!("{branch_marker} {last_marker} {addr:#010x}\t{}\t; {pseudo_text}", instr.info.dizz));

        if code == LiftCode::SkipNext {
            skip_next = true;
        }
    }

    lines
}

// -------------------------------------------------------------------------------------------------
