use crate::{
    argument::{ArgKind, Argument},
    ast::Expr,
    hle::{syscall_code, HleRegistry},
    instruction::Instruction,
};

// -------------------------------------------------------------------------------------------------

/// Lifts one decoded instruction to a pseudocode [`Expr`]. Returns `None`
/// for any mnemonic the table below doesn't cover -- callers fall back to printing the
/// raw disassembly line, an "unimplemented lifter case, never fatal" contract that
/// the renderer surfaces as its `-1` return code.
pub fn lift(instr: &Instruction, hle: &dyn HleRegistry) -> Option<Expr> {
    let args = instr.args.as_slice();
    match instr.mnemonic.as_str() {
        "addiu" | "addu" | "add" => Some(lift_assign(args, "+")),
        "subu" | "sub" => Some(lift_assign(args, "-")),
        "li" | "move" => Some(lift_assign(args, "+")),
        "andi" | "and" => Some(lift_assign(args, "&")),
        "ori" | "or" => Some(lift_assign(args, "|")),
        "xori" | "xor" => Some(lift_assign(args, "^")),
        "sll" => Some(lift_assign(args, "<<")),
        "srl" => Some(lift_assign(args, ">>")),
        "sra" => Some(lift_signed_shift(args)),
        "slt" | "slti" => Some(lift_signed_compare(args)),
        "sltu" | "sltiu" => Some(lift_assign(args, "<")),
        "lui" => Some(lift_lui(args)),
        "lw" => Some(lift_load(args, "u32")),
        "lbu" => Some(lift_load(args, "u8")),
        "lhu" => Some(lift_load(args, "u16")),
        "lb" => Some(lift_load(args, "s8")),
        "lh" => Some(lift_load(args, "s16")),
        "sw" => Some(lift_store(args, "u32")),
        "sh" => Some(lift_store(args, "u16")),
        "sb" => Some(lift_store(args, "u8")),
        "jal" | "jalr" | "jr" | "j" | "b" | "beq" | "bne" | "blez" | "bgtz" | "bltz" | "bgez"
        | "beql" | "bnel" | "blezl" | "bgtzl" | "bltzl" | "bgezl" => lift_branch(instr, args),
        "syscall" => lift_syscall(instr, hle),
        _ => None,
    }
}

fn arg_to_expr(arg: &Argument) -> Expr {
    match &arg.kind {
        ArgKind::Reg { name } if name == "zero" => Expr::number(0),
        ArgKind::Reg { name } => Expr::symbol(name.clone()),
        ArgKind::Imm { value: _, label: Some(label) } => Expr::symbol(label.clone()),
        ArgKind::Imm { value, label: None } => Expr::number(i64::from(*value)),
        ArgKind::Mem { reg, offset } => mem_address_expr(reg, *offset),
        ArgKind::Unknown { label } => Expr::symbol(label.clone()),
    }
}

fn mem_address_expr(reg: &str, offset: i32) -> Expr {
    if offset == 0 {
        Expr::symbol(reg)
    } else {
        Expr::binary("+", Expr::symbol(reg), Expr::number(i64::from(offset)))
    }
}

/// Builds `dest = src1 <op> src2`, or plainly `dest = src1` when a third operand is
/// absent or zero (covers both true two-operand mnemonics like `li`/`move` and the
/// "operate against zero" idiom `or a0, a1, zero`).
fn lift_assign(args: &[Argument], op: &str) -> Expr {
    let dest = arg_to_expr(&args[0]);
    let lhs = arg_to_expr(&args[1]);
    let rhs = match args.get(2) {
        Some(src2) if !src2.is_zero() => Expr::binary(op, lhs, arg_to_expr(src2)),
        _ => lhs,
    };
    Expr::assign(dest, rhs)
}

fn lift_signed_shift(args: &[Argument]) -> Expr {
    let dest = arg_to_expr(&args[0]);
    let lhs = Expr::unary("(s32)", arg_to_expr(&args[1]));
    let rhs = Expr::binary(">>", lhs, arg_to_expr(&args[2]));
    Expr::assign(dest, rhs)
}

fn lift_signed_compare(args: &[Argument]) -> Expr {
    let dest = arg_to_expr(&args[0]);
    let lhs = Expr::unary("(s32)", arg_to_expr(&args[1]));
    let rhs = Expr::unary("(s32)", arg_to_expr(&args[2]));
    Expr::assign(dest, Expr::binary("<", lhs, rhs))
}

fn lift_lui(args: &[Argument]) -> Expr {
    let dest = arg_to_expr(&args[0]);
    let rhs = Expr::binary("<<", arg_to_expr(&args[1]), Expr::number(16));
    Expr::assign(dest, rhs)
}

fn lift_load(args: &[Argument], size_tag: &str) -> Expr {
    let dest = arg_to_expr(&args[0]);
    let addr = match &args[1].kind {
        ArgKind::Mem { reg, offset } => mem_address_expr(reg, *offset),
        _ => arg_to_expr(&args[1]),
    };
    Expr::assign(dest, Expr::pointer(size_tag, addr))
}

fn lift_store(args: &[Argument], size_tag: &str) -> Expr {
    let value = arg_to_expr(&args[0]);
    let addr = match &args[1].kind {
        ArgKind::Mem { reg, offset } => mem_address_expr(reg, *offset),
        _ => arg_to_expr(&args[1]),
    };
    Expr::assign(Expr::pointer(size_tag, addr), value)
}

/// All branches and jumps render as a `goto` to their target. Whether the delay
/// slot's own pseudocode line precedes or is folded into this one is a renderer
/// concern, not the per-instruction lift.
fn lift_branch(instr: &Instruction, args: &[Argument]) -> Option<Expr> {
    if instr.is_jr_ra() {
        return Some(Expr::unary("return", Expr::symbol("")));
    }
    let target = args.iter().rev().find(|a| a.is_code_location || matches!(a.kind, ArgKind::Reg { .. }))?;
    Some(Expr::unary("goto", arg_to_expr(target)))
}

/// `syscall` has no operands of its own; its single `Argument::unknown` operand names
/// the resolved HLE target and the real "operands" are whatever the PSP calling
/// convention would have passed in `a0..a3`. Wide (64-bit)
/// types consume two consecutive argument registers.
fn lift_syscall(instr: &Instruction, hle: &dyn HleRegistry) -> Option<Expr> {
    const ARG_REGS: [&str; 4] = ["a0", "a1", "a2", "a3"];

    let code = syscall_code(instr.encoded);
    let target = hle.resolve(code)?;

    let mut reg_cursor = 0usize;
    let mut call_args = Vec::new();
    for ty in target.arg_types() {
        let Some(&reg) = ARG_REGS.get(reg_cursor) else { break };
        call_args.push(Expr::unary(format!("({})", ty.cast_tag()), Expr::symbol(reg)));
        reg_cursor += if ty.is_wide() { 2 } else { 1 };
    }

    let call = Expr::call(Expr::symbol(target.full_name()), call_args);
    match target.ret_types().first() {
        Some(ret) if *ret != crate::hle::HleType::Void => Some(Expr::assign(Expr::symbol("v0"), call)),
        _ => Some(call),
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        addr::Addr,
        decoder::InstructionInfo,
        hle::HleFunction,
    };

    struct NoHle;
    impl HleRegistry for NoHle {
        fn resolve(&self, _syscall_code: u32) -> Option<HleFunction> {
            None
        }
    }

    struct OneHle(HleFunction);
    impl HleRegistry for OneHle {
        fn resolve(&self, _syscall_code: u32) -> Option<HleFunction> {
            Some(self.0.clone())
        }
    }

    fn instr(dizz: &str, encoded: u32) -> Instruction {
        let info = InstructionInfo::plain(encoded, dizz);
        Instruction::new(Addr(0x1000), info, |_| None)
    }

    #[test]
    fn addiu_lifts_to_add_assign() {
        let i = instr("addiu\tsp, sp, -0x20", 0);
        let e = lift(&i, &NoHle).unwrap();
        assert_eq!(e.to_string(), "sp = sp + -0x20");
    }

    #[test]
    fn move_without_third_operand_is_plain_assign() {
        let i = instr("move\tv0, a0", 0);
        let e = lift(&i, &NoHle).unwrap();
        assert_eq!(e.to_string(), "v0 = a0");
    }

    #[test]
    fn or_against_zero_collapses_to_plain_assign() {
        let i = instr("or\tv0, a0, zero", 0);
        let e = lift(&i, &NoHle).unwrap();
        assert_eq!(e.to_string(), "v0 = a0");
    }

    #[test]
    fn lw_lifts_to_pointer_load() {
        let i = instr("lw\tv0, 0x10(sp)", 0);
        let e = lift(&i, &NoHle).unwrap();
        assert_eq!(e.to_string(), "v0 = *(u32*)&mem[sp + 0x10]");
    }

    #[test]
    fn sb_lifts_to_pointer_store() {
        let i = instr("sb\ta0, 0x0(v1)", 0);
        let e = lift(&i, &NoHle).unwrap();
        assert_eq!(e.to_string(), "*(u8*)&mem[v1] = a0");
    }

    #[test]
    fn lui_shifts_immediate_left_sixteen() {
        let i = instr("lui\tat, 0x8004", 0);
        let e = lift(&i, &NoHle).unwrap();
        assert_eq!(e.to_string(), "at = 0x8004 << 0x10");
    }

    #[test]
    fn jr_ra_lifts_to_return() {
        let i = instr("jr\t->ra", 0);
        let e = lift(&i, &NoHle).unwrap();
        assert_eq!(e.to_string(), "return()");
    }

    #[test]
    fn jal_lifts_to_goto_with_label() {
        let i = instr("jal\t->$08a38a70", 0);
        let e = lift(&i, &NoHle).unwrap();
        assert_eq!(e.to_string(), "goto(0x8a38a70)");
    }

    #[test]
    fn unimplemented_mnemonic_returns_none() {
        let i = instr("mfhi\tv0", 0);
        assert!(lift(&i, &NoHle).is_none());
    }

    #[test]
    fn syscall_resolves_through_hle_registry_and_casts_args() {
        let target = HleFunction {
            module: "SysMemUserForUser".into(),
            name: "sceKernelSetCompiledSdkVersion380_390".into(),
            argmask: "x".into(),
            retmask: "i".into(),
        };
        let i = instr("syscall\tSysMemUserForUser::sceKernelSetCompiledSdkVersion380_390", 0x0000_000c);
        let e = lift(&i, &OneHle(target)).unwrap();
        assert_eq!(
            e.to_string(),
            "v0 = SysMemUserForUser::sceKernelSetCompiledSdkVersion380_390((u32)(a0))"
        );
    }

    #[test]
    fn syscall_with_unresolvable_code_yields_none() {
        let i = instr("syscall\tUnknownModule::unknownFunc", 0);
        assert!(lift(&i, &NoHle).is_none());
    }
}
