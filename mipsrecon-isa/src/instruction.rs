use smallvec::SmallVec;

use crate::{addr::Addr, argument::Argument, decoder::InstructionInfo};

// -------------------------------------------------------------------------------------------------

/// An instruction's operand list. Inline-stored up to 4 operands -- no MIPS
/// instruction this lifter handles takes more -- the same small-vector-for-a-
/// bounded-count shape the corpus reaches for instead of a heap-allocating `Vec`.
pub type ArgList = SmallVec<[Argument; 4]>;

/// A fully decoded and argument-parsed instruction. Immutable after first
/// insertion into the instruction cache.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub address: Addr,
    pub encoded: u32,
    pub mnemonic: String,
    pub args: ArgList,
    pub info: InstructionInfo,
}

impl Instruction {
    pub fn new(address: Addr, info: InstructionInfo, label_lookup: impl FnMut(Addr) -> Option<String>) -> Self {
        let (mnemonic, args) = parse_dizz(&info.dizz, label_lookup);
        Self { address, encoded: info.encoded, mnemonic, args, info }
    }

    #[must_use]
    pub fn is_jal_or_jalr(&self) -> bool {
        self.mnemonic == "jal" || self.mnemonic == "jalr"
    }

    #[must_use]
    pub fn is_jr_ra(&self) -> bool {
        self.mnemonic == "jr"
            && matches!(self.args.first().map(|a| &a.kind), Some(crate::argument::ArgKind::Reg { name }) if name == "ra")
    }
}

/// Splits a disassembly line (`"mnemonic\targ, arg, ..."`) into its mnemonic and
/// parsed argument list. `syscall` is special-cased: its single
/// operand names an HLE target (`Module::Func`) rather than a register/immediate/
/// memory operand, so it is kept as one [`Argument::unknown`] rather than tokenized
/// by comma.
pub fn parse_dizz(dizz: &str, mut label_lookup: impl FnMut(Addr) -> Option<String>) -> (String, ArgList) {
    let mut parts = dizz.splitn(2, '\t');
    let mnemonic = parts.next().unwrap_or_default().to_string();
    let rest = parts.next().unwrap_or_default().trim();

    if rest.is_empty() {
        return (mnemonic, ArgList::new());
    }

    if mnemonic == "syscall" {
        let mut args = ArgList::new();
        args.push(Argument::unknown(rest.to_string()));
        return (mnemonic, args);
    }

    let args = rest
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| Argument::parse(token, &mut label_lookup))
        .collect::<ArgList>();

    (mnemonic, args)
}

// -------------------------------------------------------------------------------------------------
