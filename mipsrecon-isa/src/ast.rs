use std::fmt;

// -------------------------------------------------------------------------------------------------

/// One pseudo-code expression or statement produced by the lifter. The
/// node set is a closed tagged union, not an open trait hierarchy.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Binary { op: String, left: Box<Expr>, right: Box<Expr> },
    Unary { op: String, expr: Box<Expr> },
    /// A `Binary` specialisation with `op == "="`.
    Assign { left: Box<Expr>, right: Box<Expr> },
    Number { value: i64 },
    SymbolRef { name: String },
    Pointer { size_tag: String, expr: Box<Expr> },
    Call { expr: Box<Expr>, args: Vec<Expr> },
}

impl Expr {
    pub fn binary(op: impl Into<String>, left: Expr, right: Expr) -> Self {
        Expr::Binary { op: op.into(), left: Box::new(left), right: Box::new(right) }
    }

    pub fn unary(op: impl Into<String>, expr: Expr) -> Self {
        Expr::Unary { op: op.into(), expr: Box::new(expr) }
    }

    pub fn assign(left: Expr, right: Expr) -> Self {
        Expr::Assign { left: Box::new(left), right: Box::new(right) }
    }

    pub fn number(value: i64) -> Self {
        Expr::Number { value }
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Expr::SymbolRef { name: name.into() }
    }

    pub fn pointer(size_tag: impl Into<String>, expr: Expr) -> Self {
        Expr::Pointer { size_tag: size_tag.into(), expr: Box::new(expr) }
    }

    pub fn call(expr: Expr, args: Vec<Expr>) -> Self {
        Expr::Call { expr: Box::new(expr), args }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Binary { op, left, right } => write!(f, "{left} {op} {right}"),
            Expr::Unary { op, expr } => write!(f, "{op}({expr})"),
            Expr::Assign { left, right } => write!(f, "{left} = {right}"),
            Expr::Number { value } => {
                if *value < 0 {
                    write!(f, "-{:#x}", -value)
                } else {
                    write!(f, "{value:#x}")
                }
            }
            Expr::SymbolRef { name } => write!(f, "{name}"),
            Expr::Pointer { size_tag, expr } => write!(f, "*({size_tag}*)&mem[{expr}]"),
            Expr::Call { expr, args } => {
                write!(f, "{expr}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_renders_as_infix_equals() {
        let e = Expr::assign(Expr::symbol("a0"), Expr::binary("+", Expr::symbol("sp"), Expr::number(-32)));
        assert_eq!(e.to_string(), "a0 = sp + -0x20");
    }

    #[test]
    fn pointer_renders_mem_cast() {
        let e = Expr::pointer("u32", Expr::symbol("sp"));
        assert_eq!(e.to_string(), "*(u32*)&mem[sp]");
    }

    #[test]
    fn call_renders_comma_joined_args() {
        let e = Expr::call(Expr::symbol("Module::Func"), vec![Expr::symbol("a0"), Expr::number(1)]);
        assert_eq!(e.to_string(), "Module::Func(a0, 0x1)");
    }
}
