//! Typed rule AST and its renderer.
//!
//! The tree is immutable: every rewrite (wildcard substitution, quantile
//! folding, tolerance annotation) builds a new tree.
//!
//! Rendering is precedence aware and always parenthesizes comparisons, so the
//! output of [`fmt::Display`] parses back to a structurally equal tree. The
//! canonical form used for deduplication is the same renderer with commutative
//! operands sorted (see `engine::canonical`).

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
    /// The `empty` marker: a missing value.
    Empty,
}

/// Widening direction of a tolerance annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// `+`: add half a tolerance unit.
    Up,
    /// `-`: subtract half a tolerance unit.
    Down,
}

impl Direction {
    pub fn flip(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    pub(crate) fn sign(self) -> f64 {
        match self {
            Direction::Up => 1.0,
            Direction::Down => -1.0,
        }
    }
}

/// `[+key]` / `[-key]` suffix of a column reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToleranceTag {
    pub direction: Direction,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub name: String,
    pub tolerance: Option<ToleranceTag>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Ge,
    Gt,
    Le,
    Lt,
    Ne,
    Eq,
    In,
    NotIn,
    Between,
    NotBetween,
    Match,
    NotMatch,
    Contains,
    NotContains,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Ge => ">=",
            CompareOp::Gt => ">",
            CompareOp::Le => "<=",
            CompareOp::Lt => "<",
            CompareOp::Ne => "!=",
            CompareOp::Eq => "==",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
            CompareOp::Between => "between",
            CompareOp::NotBetween => "not between",
            CompareOp::Match => "match",
            CompareOp::NotMatch => "not match",
            CompareOp::Contains => "contains",
            CompareOp::NotContains => "not contains",
        }
    }

    /// The positive operator for the `not ...` forms.
    pub(crate) fn positive(self) -> (CompareOp, bool) {
        match self {
            CompareOp::NotIn => (CompareOp::In, true),
            CompareOp::NotBetween => (CompareOp::Between, true),
            CompareOp::NotMatch => (CompareOp::Match, true),
            CompareOp::NotContains => (CompareOp::Contains, true),
            op => (op, false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Compare(CompareOp),
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "**",
            BinaryOp::Compare(op) => op.symbol(),
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
        }
    }
}

macro_rules! functions {
    ($($variant:ident => $name:literal, $min:literal..=$max:literal;)*) => {
        /// Registry of callable functions.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Function {
            $($variant,)*
        }

        impl Function {
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Function::$variant),)*
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(Function::$variant => $name,)*
                }
            }

            /// Inclusive bounds on the argument count.
            pub fn arity(self) -> (usize, usize) {
                match self {
                    $(Function::$variant => ($min, $max),)*
                }
            }

            pub(crate) fn arity_text(self) -> &'static str {
                match self {
                    $(Function::$variant => concat!(stringify!($min), " to ", stringify!($max)),)*
                }
            }
        }
    };
}

functions! {
    Min => "min", 1..=64;
    Max => "max", 1..=64;
    Abs => "abs", 1..=1;
    Quantile => "quantile", 2..=2;
    Sum => "sum", 1..=1;
    Substr => "substr", 2..=3;
    Split => "split", 3..=3;
    Count => "count", 1..=1;
    SumIf => "sumif", 2..=2;
    CountIf => "countif", 1..=2;
    Mean => "mean", 1..=1;
    Std => "std", 1..=1;
    Exact => "exact", 2..=2;
    Corr => "corr", 2..=2;
    Round => "round", 1..=2;
    Floor => "floor", 1..=1;
    Ceil => "ceil", 1..=1;
    Table => "table", 2..=2;
    Year => "year", 1..=1;
    Month => "month", 1..=1;
    Day => "day", 1..=1;
    Hour => "hour", 1..=1;
    Minute => "minute", 1..=1;
    Second => "second", 1..=1;
    Weekday => "weekday", 1..=1;
    DayOfYear => "dayofyear", 1..=1;
    Quarter => "quarter", 1..=1;
}

impl Function {
    /// Order of arguments is irrelevant to the result.
    pub(crate) fn is_commutative(self) -> bool {
        matches!(self, Function::Min | Function::Max)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Column(ColumnRef),
    /// Comprehension variable.
    Var(String),
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Call { func: Function, args: Vec<Expr> },
    List(Vec<Expr>),
    Comprehension { element: Box<Expr>, var: String, source: Box<Expr> },
}

impl Expr {
    pub fn number(v: f64) -> Self {
        Expr::Literal(Literal::Number(v))
    }

    pub fn text(s: impl Into<String>) -> Self {
        Expr::Literal(Literal::Text(s.into()))
    }

    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(ColumnRef { name: name.into(), tolerance: None })
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
    }

    pub fn compare(op: CompareOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Compare(op), lhs, rhs)
    }

    pub fn and(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::And, lhs, rhs)
    }

    pub fn not(operand: Expr) -> Self {
        Expr::Unary { op: UnaryOp::Not, operand: Box::new(operand) }
    }

    pub fn call(func: Function, args: Vec<Expr>) -> Self {
        Expr::Call { func, args }
    }

    /// Direct children, in a stable order used by paths.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Literal(_) | Expr::Column(_) | Expr::Var(_) => Vec::new(),
            Expr::Unary { operand, .. } => vec![operand.as_ref()],
            Expr::Binary { lhs, rhs, .. } => vec![lhs.as_ref(), rhs.as_ref()],
            Expr::Call { args, .. } => args.iter().collect(),
            Expr::List(items) => items.iter().collect(),
            Expr::Comprehension { element, source, .. } => vec![element.as_ref(), source.as_ref()],
        }
    }

    /// Node at `path` (child indices from this node).
    pub fn at(&self, path: &[usize]) -> Option<&Expr> {
        match path.split_first() {
            None => Some(self),
            Some((&i, rest)) => self.children().get(i).and_then(|c| c.at(rest)),
        }
    }

    /// Copy of this tree with the node at `path` replaced by `node`.
    /// An invalid path returns an unchanged copy.
    pub fn replace_at(&self, path: &[usize], node: Expr) -> Expr {
        let Some((&i, rest)) = path.split_first() else { return node };
        let swap = |child: &Expr| child.replace_at(rest, node.clone());
        match self {
            Expr::Unary { op, operand } if i == 0 => Expr::Unary { op: *op, operand: Box::new(swap(operand.as_ref())) },
            Expr::Binary { op, lhs, rhs } if i < 2 => {
                let (lhs, rhs) =
                    if i == 0 { (swap(lhs.as_ref()), (**rhs).clone()) } else { ((**lhs).clone(), swap(rhs.as_ref())) };
                Expr::binary(*op, lhs, rhs)
            }
            Expr::Call { func, args } if i < args.len() => {
                let mut args = args.clone();
                args[i] = swap(&args[i]);
                Expr::Call { func: *func, args }
            }
            Expr::List(items) if i < items.len() => {
                let mut items = items.clone();
                items[i] = swap(&items[i]);
                Expr::List(items)
            }
            Expr::Comprehension { element, var, source } if i < 2 => {
                let (element, source) = if i == 0 {
                    (swap(element.as_ref()), (**source).clone())
                } else {
                    ((**element).clone(), swap(source.as_ref()))
                };
                Expr::Comprehension { element: Box::new(element), var: var.clone(), source: Box::new(source) }
            }
            other => other.clone(),
        }
    }

    /// Bottom-up rewrite: `f` sees each node after its children were rewritten.
    pub fn rewrite(&self, f: &mut impl FnMut(Expr) -> Expr) -> Expr {
        let node = match self {
            Expr::Literal(_) | Expr::Column(_) | Expr::Var(_) => self.clone(),
            Expr::Unary { op, operand } => Expr::Unary { op: *op, operand: Box::new(operand.rewrite(f)) },
            Expr::Binary { op, lhs, rhs } => Expr::binary(*op, lhs.rewrite(f), rhs.rewrite(f)),
            Expr::Call { func, args } => Expr::Call { func: *func, args: args.iter().map(|a| a.rewrite(f)).collect() },
            Expr::List(items) => Expr::List(items.iter().map(|a| a.rewrite(f)).collect()),
            Expr::Comprehension { element, var, source } => Expr::Comprehension {
                element: Box::new(element.rewrite(f)),
                var: var.clone(),
                source: Box::new(source.rewrite(f)),
            },
        };
        f(node)
    }

    /// Every column reference in the tree, in pre-order.
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(e) = stack.pop() {
            if let Expr::Column(c) = e {
                out.push(c);
            }
            stack.extend(e.children().into_iter().rev());
        }
        out
    }

    pub(crate) fn is_literal(&self) -> bool {
        matches!(self, Expr::Literal(_))
    }
}

/// A parsed rule: optional if-part and a then-part.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleAst {
    pub if_part: Option<Expr>,
    pub then_part: Expr,
}

/// Which half of a rule a path starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Part {
    If,
    Then,
}

impl RuleAst {
    pub fn part(&self, part: Part) -> Option<&Expr> {
        match part {
            Part::If => self.if_part.as_ref(),
            Part::Then => Some(&self.then_part),
        }
    }

    pub fn replace_at(&self, part: Part, path: &[usize], node: Expr) -> RuleAst {
        match part {
            Part::If => RuleAst {
                if_part: self.if_part.as_ref().map(|e| e.replace_at(path, node)),
                then_part: self.then_part.clone(),
            },
            Part::Then => RuleAst { if_part: self.if_part.clone(), then_part: self.then_part.replace_at(path, node) },
        }
    }

    pub fn map(&self, mut f: impl FnMut(&Expr) -> Expr) -> RuleAst {
        RuleAst { if_part: self.if_part.as_ref().map(&mut f), then_part: f(&self.then_part) }
    }
}

// --- Rendering -----------------------------------------------------------------

const PREC_OR: u8 = 1;
const PREC_AND: u8 = 2;
const PREC_NOT: u8 = 3;
const PREC_ADD: u8 = 5;
const PREC_MUL: u8 = 6;
const PREC_NEG: u8 = 7;
const PREC_POW: u8 = 8;
const PREC_ATOM: u8 = 9;

fn precedence(e: &Expr) -> u8 {
    match e {
        Expr::Literal(Literal::Number(v)) if v.is_sign_negative() && *v != 0.0 => PREC_NEG,
        Expr::Unary { op: UnaryOp::Neg, .. } => PREC_NEG,
        Expr::Unary { op: UnaryOp::Not, .. } => PREC_NOT,
        Expr::Binary { op, .. } => match op {
            BinaryOp::Or => PREC_OR,
            BinaryOp::And => PREC_AND,
            BinaryOp::Add | BinaryOp::Sub => PREC_ADD,
            BinaryOp::Mul | BinaryOp::Div => PREC_MUL,
            BinaryOp::Pow => PREC_POW,
            BinaryOp::Compare(_) => PREC_ATOM,
        },
        _ => PREC_ATOM,
    }
}

/// Renders expressions, optionally sorting commutative operands.
pub(crate) struct Printer {
    pub(crate) sorted: bool,
}

impl Printer {
    pub(crate) fn rule(&self, rule: &RuleAst) -> String {
        match &rule.if_part {
            Some(cond) => format!("if {} then {}", self.expr(cond), self.expr(&rule.then_part)),
            None => self.expr(&rule.then_part),
        }
    }

    pub(crate) fn expr(&self, e: &Expr) -> String {
        match e {
            Expr::Literal(lit) => render_literal(lit),
            Expr::Column(c) => render_column(c),
            Expr::Var(v) => v.clone(),
            Expr::Unary { op: UnaryOp::Neg, operand } => format!("-{}", self.wrap(operand, PREC_NEG)),
            Expr::Unary { op: UnaryOp::Not, operand } => format!("~{}", self.wrap(operand, PREC_NOT)),
            Expr::Binary { op: BinaryOp::Compare(cmp), lhs, rhs } => {
                format!("({} {} {})", self.expr(lhs), cmp.symbol(), self.expr(rhs))
            }
            Expr::Binary { op, lhs, rhs } => {
                let (l, r) = match op {
                    BinaryOp::Or => (PREC_OR, PREC_AND),
                    BinaryOp::And => (PREC_AND, PREC_NOT),
                    BinaryOp::Add | BinaryOp::Sub => (PREC_ADD, PREC_MUL),
                    BinaryOp::Mul | BinaryOp::Div => (PREC_MUL, PREC_NEG),
                    BinaryOp::Pow => (PREC_ATOM, PREC_NEG),
                    BinaryOp::Compare(_) => unreachable!("comparisons are rendered above"),
                };
                let associative = matches!(op, BinaryOp::Or | BinaryOp::And | BinaryOp::Add | BinaryOp::Mul);
                if self.sorted && associative {
                    let mut parts: Vec<String> = Vec::new();
                    flatten(e, *op, &mut |operand| parts.push(self.wrap(operand, r)));
                    parts.sort();
                    parts.join(&format!(" {} ", op.symbol()))
                } else {
                    format!("{} {} {}", self.wrap(lhs, l), op.symbol(), self.wrap(rhs, r))
                }
            }
            Expr::Call { func, args } => {
                let mut parts: Vec<String> = args.iter().map(|a| self.expr(a)).collect();
                if self.sorted && func.is_commutative() {
                    parts.sort();
                }
                format!("{}({})", func.name(), parts.join(", "))
            }
            Expr::List(items) => {
                format!("[{}]", items.iter().map(|a| self.expr(a)).collect::<Vec<_>>().join(", "))
            }
            Expr::Comprehension { element, var, source } => {
                format!("[{} for {} in {}]", self.expr(element), var, self.expr(source))
            }
        }
    }

    fn wrap(&self, e: &Expr, min: u8) -> String {
        let s = self.expr(e);
        if precedence(e) < min { format!("({})", s) } else { s }
    }
}

/// Visit the operands of a chain of `op` nodes, left to right.
fn flatten<'e>(e: &'e Expr, op: BinaryOp, visit: &mut impl FnMut(&'e Expr)) {
    match e {
        Expr::Binary { op: inner, lhs, rhs } if *inner == op => {
            flatten(lhs, op, visit);
            flatten(rhs, op, visit);
        }
        other => visit(other),
    }
}

fn render_literal(lit: &Literal) -> String {
    match lit {
        Literal::Number(v) if v.is_finite() => format!("{}", v),
        Literal::Number(_) | Literal::Empty => "empty".to_string(),
        Literal::Text(s) => format!("\"{}\"", s.replace('"', "\\\"")),
    }
}

fn render_column(c: &ColumnRef) -> String {
    match &c.tolerance {
        None => format!("{{\"{}\"}}", c.name),
        Some(tag) => {
            let sign = if tag.direction == Direction::Up { '+' } else { '-' };
            if regex!(r"^[A-Za-z_][A-Za-z0-9_]*$").is_match(&tag.key) {
                format!("{{\"{}\"}}[{}{}]", c.name, sign, tag.key)
            } else {
                format!("{{\"{}\"}}[{}\"{}\"]", c.name, sign, tag.key.replace('"', "\\\""))
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&Printer { sorted: false }.expr(self))
    }
}

impl fmt::Display for RuleAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&Printer { sorted: false }.rule(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_with_minimal_parentheses() {
        let e = Expr::binary(
            BinaryOp::Mul,
            Expr::binary(BinaryOp::Add, Expr::column("A"), Expr::number(1.0)),
            Expr::number(2.5),
        );
        assert_eq!(e.to_string(), "({\"A\"} + 1) * 2.5");

        let cmp = Expr::compare(CompareOp::Ge, e, Expr::number(-3.0));
        assert_eq!(cmp.to_string(), "(({\"A\"} + 1) * 2.5 >= -3)");
    }

    #[test]
    fn subtraction_keeps_right_grouping() {
        let e = Expr::binary(
            BinaryOp::Sub,
            Expr::column("A"),
            Expr::binary(BinaryOp::Sub, Expr::column("B"), Expr::column("C")),
        );
        assert_eq!(e.to_string(), "{\"A\"} - ({\"B\"} - {\"C\"})");
    }

    #[test]
    fn replace_at_builds_new_tree() {
        let e = Expr::compare(CompareOp::Eq, Expr::column(".*"), Expr::text("x"));
        let swapped = e.replace_at(&[0], Expr::column("Type"));
        assert_eq!(swapped.to_string(), "({\"Type\"} == \"x\")");
        assert_eq!(e.to_string(), "({\".*\"} == \"x\")");
        assert_eq!(swapped.at(&[1]), Some(&Expr::text("x")));
    }

    #[test]
    fn tolerance_tags_render_after_column() {
        let e = Expr::Column(ColumnRef {
            name: "A".into(),
            tolerance: Some(ToleranceTag { direction: Direction::Down, key: "default".into() }),
        });
        assert_eq!(e.to_string(), "{\"A\"}[-default]");
    }
}
