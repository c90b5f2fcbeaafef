use crate::addr::Addr;

/// Decoded-flags record for one instruction, as produced by the host's MIPS opcode
/// decoder (out of scope for this crate, see [`OpcodeDecoder`]).
#[derive(Clone, Debug, PartialEq)]
pub struct InstructionInfo {
    pub encoded: u32,
    pub is_branch: bool,
    pub is_conditional: bool,
    pub is_likely_branch: bool,
    pub is_branch_to_register: bool,
    pub has_delay_slot: bool,
    pub branch_target: Addr,
    /// Raw disassembly text, e.g. `"addiu\tsp, sp, -0x20"`.
    pub dizz: String,
}

impl InstructionInfo {
    /// A plain non-branching instruction with no delay slot.
    pub fn plain(encoded: u32, dizz: impl Into<String>) -> Self {
        Self {
            encoded,
            is_branch: false,
            is_conditional: false,
            is_likely_branch: false,
            is_branch_to_register: false,
            has_delay_slot: false,
            branch_target: Addr::ZERO,
            dizz: dizz.into(),
        }
    }
}

/// The MIPS opcode decoder is a host-provided primitive: given an address, it returns
/// the decoded instruction's flags and disassembly text. Byte-level disassembly is
/// explicitly out of scope for this crate; callers inject an implementation
/// (typically backed by the memory image and a real MIPS decode table) through this
/// trait.
pub trait OpcodeDecoder {
    fn decode(&self, addr: Addr) -> Option<InstructionInfo>;

    fn is_valid_address(&self, addr: Addr) -> bool;
}
