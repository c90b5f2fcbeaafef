use std::fmt;

use crate::addr::Addr;

// -------------------------------------------------------------------------------------------------

/// One operand of a disassembled instruction. Parsed from a single comma-separated
/// token of a disassembly line; `is_code_location` is tracked alongside
/// the variant rather than folded into it, since tokenization can tag either a
/// register or an immediate as a code reference (`"->ra"` tags a register, `"->$addr"`
/// tags an immediate).
#[derive(Clone, Debug, PartialEq)]
pub struct Argument {
    pub kind: ArgKind,
    pub is_code_location: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ArgKind {
    Reg { name: String },
    Imm { value: i32, label: Option<String> },
    Mem { reg: String, offset: i32 },
    Unknown { label: String },
}

impl Argument {
    pub fn reg(name: impl Into<String>) -> Self {
        Self { kind: ArgKind::Reg { name: name.into() }, is_code_location: false }
    }

    pub fn imm(value: i32) -> Self {
        Self { kind: ArgKind::Imm { value, label: None }, is_code_location: false }
    }

    pub fn unknown(label: impl Into<String>) -> Self {
        Self { kind: ArgKind::Unknown { label: label.into() }, is_code_location: false }
    }

    /// Parses one already-trimmed operand token, following a fixed rule order.
    /// `label_lookup` is only invoked for tokens prefixed with `"->$"`.
    pub fn parse(token: &str, label_lookup: impl FnOnce(Addr) -> Option<String>) -> Self {
        // Rule 1: exactly 2 chars is always a bare register.
        if token.chars().count() == 2 {
            return Self::reg(token);
        }

        // Rules 2/3: "->$" strips to a hex immediate and requests a label lookup;
        // bare "->" just tags whatever follows as a code location.
        if let Some(stripped) = token.strip_prefix("->$") {
            let rest = format!("0x{stripped}");
            return Self::parse_value_or_reg(&rest, true, true, label_lookup);
        }
        if let Some(stripped) = token.strip_prefix("->") {
            return Self::parse_value_or_reg(stripped, true, false, label_lookup);
        }

        Self::parse_value_or_reg(token, false, false, label_lookup)
    }

    fn parse_value_or_reg(
        opr: &str,
        is_code_location: bool,
        request_lookup: bool,
        label_lookup: impl FnOnce(Addr) -> Option<String>,
    ) -> Self {
        // Rule 4: try the "%v(%s)" shape -- an immediate, optionally followed by a
        // parenthesized base register.
        if let Some((value, reg)) = scan_value_paren_string(opr) {
            let kind = match reg {
                Some(reg) => ArgKind::Mem { reg, offset: value },
                None => {
                    let label =
                        if request_lookup { label_lookup(Addr(value as u32)) } else { None };
                    ArgKind::Imm { value, label }
                }
            };
            return Self { kind, is_code_location };
        }

        // Rule 5: fall back to a bare register/unknown token.
        Self { kind: ArgKind::Reg { name: opr.to_string() }, is_code_location }
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        match &self.kind {
            ArgKind::Imm { value, .. } => *value == 0,
            ArgKind::Reg { name } => name == "zero",
            _ => false,
        }
    }

    #[must_use]
    pub fn is_negative(&self) -> bool {
        matches!(&self.kind, ArgKind::Imm { value, .. } if *value < 0)
    }

    #[must_use]
    pub fn is_number(&self) -> bool {
        matches!(&self.kind, ArgKind::Imm { .. })
    }

    /// Renders the argument as the disassembler would.
    #[must_use]
    pub fn display(&self, is_dec: bool) -> String {
        match &self.kind {
            ArgKind::Imm { value, label } => match label {
                Some(label) => label.clone(),
                None => value_str(*value, is_dec),
            },
            ArgKind::Reg { name } => {
                if name == "zero" {
                    "0".to_string()
                } else {
                    name.clone()
                }
            }
            ArgKind::Mem { reg, offset } => {
                if *offset != 0 {
                    format!("[{reg} + {}]", value_str(*offset, is_dec))
                } else {
                    format!("[{reg}]")
                }
            }
            ArgKind::Unknown { .. } => "??".to_string(),
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display(false))
    }
}

fn value_str(value: i32, is_dec: bool) -> String {
    let (sign, magnitude) = if value < 0 { ("-", -(value as i64) as u32) } else { ("", value as u32) };
    if is_dec {
        format!("{sign}{magnitude}")
    } else {
        format!("{sign}0x{magnitude:x}")
    }
}

/// Mimics Go's `fmt.Sscanf(opr, "%v(%s)", &imm, &rs)`: parses a leading signed integer
/// literal (decimal or `0x`-prefixed hex), optionally followed by `(reg)`. Returns
/// `None` if no integer literal could be parsed at all (the "reg" reg fallback case);
/// `Some((value, None))` for a bare immediate; `Some((value, Some(reg)))` when a
/// parenthesized base register followed, with the trailing `)` already stripped.
fn scan_value_paren_string(opr: &str) -> Option<(i32, Option<String>)> {
    let (imm_part, reg_part) = match opr.find('(') {
        Some(idx) => (&opr[..idx], Some(&opr[idx + 1..])),
        None => (opr, None),
    };

    let value = parse_int_literal(imm_part)?;
    let reg = reg_part.map(|s| s.strip_suffix(')').unwrap_or(s).to_string());
    Some((value, reg))
}

fn parse_int_literal(s: &str) -> Option<i32> {
    let (neg, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let magnitude: i64 = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        s.parse().ok()?
    };
    let signed = if neg { -magnitude } else { magnitude };
    i32::try_from(signed).ok()
}

// -------------------------------------------------------------------------------------------------
