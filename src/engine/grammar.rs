//! Rule grammar: lexer and packrat parser.
//!
//! ```text
//! rule       := "if" condition "then" condition | condition
//! condition  := and ( ("|" | "or") and )*
//! and        := not ( ("&" | "and") not )*
//! not        := ("~" | "not") not | cond_atom
//! cond_atom  := "(" condition ")" | math compare_op math
//! math       := term ( ("+" | "-") term )*
//! term       := unary ( ("*" | "/") unary )*
//! unary      := "-" unary | atom ( "**" unary )?
//! atom       := column tolerance? | string | number | "empty" | list
//!             | "[" math "for" ident "in" math "]" | function "(" args ")"
//!             | ident | "(" math ")"
//! tolerance  := "[" ("+" | "-") (string | key) "]"   key: adjacent tokens up to "]"
//! ```
//!
//! Parsing functions are pure over token positions (`pos -> Option<(node,
//! next_pos)>`), so results can be memoized per `(production, pos)`.
//! Conditions, condition atoms and math expressions are re-entered from many
//! places (function arguments, parenthesized groups, list elements), and the
//! memo keeps backtracking between a parenthesized condition and a
//! parenthesized math expression linear.
//!
//! On failure the error points at the farthest token reached, together with
//! the token kinds that would have been accepted there.

use crate::error::SyntaxError;
use crate::expr::{BinaryOp, ColumnRef, CompareOp, Direction, Expr, Function, Literal, RuleAst, ToleranceTag, UnaryOp};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Column(String),
    Str(String),
    Num(f64),
    Ident(String),
    Sym(&'static str),
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    start: usize,
    end: usize,
}

const SYMBOLS: &[&str] =
    &[">=", "<=", "!=", "==", "**", ">", "<", "+", "-", "*", "/", "(", ")", "[", "]", ",", "&", "|", "~"];

const KEYWORDS: &[&str] = &["if", "then", "and", "or", "not", "in", "between", "match", "contains", "for", "empty"];

fn lex(src: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut tokens = Vec::new();
    let bytes = src.as_bytes();
    let mut i = 0;

    let fail = |offset: usize, expected: &'static str| SyntaxError {
        offset,
        found: src[offset..].chars().next().map(|c| format!("'{}'", c)).unwrap_or_else(|| "end of input".into()),
        expected: vec![expected],
    };

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;

        if c == b'{' {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            if bytes.get(j) != Some(&b'"') {
                return Err(fail(j.min(src.len()), "'\"' opening a column name"));
            }
            let (name, after) = read_quoted(src, j).ok_or_else(|| fail(j, "closing '\"'"))?;
            let mut k = after;
            while k < bytes.len() && bytes[k].is_ascii_whitespace() {
                k += 1;
            }
            if bytes.get(k) != Some(&b'}') {
                return Err(fail(k.min(src.len()), "'}'"));
            }
            i = k + 1;
            tokens.push(Token { tok: Tok::Column(name), start, end: i });
            continue;
        }

        if c == b'"' || c == b'\'' {
            let (text, after) = read_quoted(src, i).ok_or_else(|| fail(i, "closing quote"))?;
            i = after;
            tokens.push(Token { tok: Tok::Str(text), start, end: i });
            continue;
        }

        let rest = &src[i..];
        if c.is_ascii_digit() || (c == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)) {
            let m = regex!(r"^(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?").find(rest).ok_or_else(|| fail(i, "number"))?;
            let value: f64 = m.as_str().parse().map_err(|_| fail(i, "number"))?;
            i += m.end();
            tokens.push(Token { tok: Tok::Num(value), start, end: i });
            continue;
        }

        if let Some(m) = regex!(r"^[A-Za-z_][A-Za-z0-9_]*").find(rest) {
            i += m.end();
            tokens.push(Token { tok: Tok::Ident(m.as_str().to_string()), start, end: i });
            continue;
        }

        match SYMBOLS.iter().find(|s| rest.starts_with(**s)) {
            Some(sym) => {
                i += sym.len();
                tokens.push(Token { tok: Tok::Sym(*sym), start, end: i });
            }
            None => return Err(fail(i, "operator, literal or column reference")),
        }
    }

    tokens.push(Token { tok: Tok::Eof, start: src.len(), end: src.len() });
    Ok(tokens)
}

/// Read a quoted run starting at `open` (which holds the quote character).
/// A backslash escapes the quote character; other escapes are kept verbatim
/// so regular expressions pass through untouched.
fn read_quoted(src: &str, open: usize) -> Option<(String, usize)> {
    let quote = src[open..].chars().next()?;
    let mut out = String::new();
    let mut chars = src[open + 1..].char_indices();
    while let Some((off, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, n)) if n == quote => out.push(n),
                Some((_, n)) => {
                    out.push('\\');
                    out.push(n);
                }
                None => return None,
            },
            c if c == quote => return Some((out, open + 1 + off + c.len_utf8())),
            c => out.push(c),
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Production {
    Condition,
    CondAtom,
    Math,
}

type Parsed<T> = Option<(T, usize)>;

struct Parser<'s> {
    src: &'s str,
    tokens: Vec<Token>,
    memo: HashMap<(Production, usize), Parsed<Expr>>,
    farthest: usize,
    expected: BTreeSet<&'static str>,
}

impl<'s> Parser<'s> {
    fn new(src: &'s str) -> Result<Self, SyntaxError> {
        Ok(Parser { src, tokens: lex(src)?, memo: HashMap::new(), farthest: 0, expected: BTreeSet::new() })
    }

    fn tok(&self, pos: usize) -> &Tok {
        let last = self.tokens.len() - 1;
        &self.tokens[pos.min(last)].tok
    }

    fn expect(&mut self, pos: usize, what: &'static str) {
        if pos > self.farthest {
            self.farthest = pos;
            self.expected.clear();
        }
        if pos == self.farthest {
            self.expected.insert(what);
        }
    }

    fn error(&self) -> SyntaxError {
        let last = self.tokens.len() - 1;
        let token = &self.tokens[self.farthest.min(last)];
        let found = match token.tok {
            Tok::Eof => "end of input".to_string(),
            _ => format!("'{}'", &self.src[token.start..token.end]),
        };
        SyntaxError { offset: token.start, found, expected: self.expected.iter().copied().collect() }
    }

    fn sym(&mut self, pos: usize, sym: &'static str) -> Option<usize> {
        if *self.tok(pos) == Tok::Sym(sym) {
            Some(pos + 1)
        } else {
            self.expect(pos, sym);
            None
        }
    }

    fn keyword(&mut self, pos: usize, kw: &'static str) -> Option<usize> {
        match self.tok(pos) {
            Tok::Ident(id) if id.eq_ignore_ascii_case(kw) => Some(pos + 1),
            _ => {
                self.expect(pos, kw);
                None
            }
        }
    }

    fn memoized(&mut self, prod: Production, pos: usize, f: fn(&mut Self, usize) -> Parsed<Expr>) -> Parsed<Expr> {
        if let Some(hit) = self.memo.get(&(prod, pos)) {
            return hit.clone();
        }
        let out = f(self, pos);
        self.memo.insert((prod, pos), out.clone());
        out
    }

    // --- rules and conditions ---------------------------------------------------

    fn rule(&mut self) -> Parsed<RuleAst> {
        if let Some(pos) = self.keyword(0, "if") {
            let (if_part, pos) = self.condition(pos)?;
            let pos = self.keyword(pos, "then")?;
            let (then_part, pos) = self.condition(pos)?;
            return Some((RuleAst { if_part: Some(if_part), then_part }, pos));
        }
        let (then_part, pos) = self.condition(0)?;
        Some((RuleAst { if_part: None, then_part }, pos))
    }

    fn condition(&mut self, pos: usize) -> Parsed<Expr> {
        self.memoized(Production::Condition, pos, Self::or_expr)
    }

    fn or_expr(&mut self, pos: usize) -> Parsed<Expr> {
        let (mut lhs, mut pos) = self.and_expr(pos)?;
        loop {
            let Some(next) = self.sym(pos, "|").or_else(|| self.keyword(pos, "or")) else { break };
            let Some((rhs, after)) = self.and_expr(next) else { break };
            lhs = Expr::binary(BinaryOp::Or, lhs, rhs);
            pos = after;
        }
        Some((lhs, pos))
    }

    fn and_expr(&mut self, pos: usize) -> Parsed<Expr> {
        let (mut lhs, mut pos) = self.not_expr(pos)?;
        loop {
            let Some(next) = self.sym(pos, "&").or_else(|| self.keyword(pos, "and")) else { break };
            let Some((rhs, after)) = self.not_expr(next) else { break };
            lhs = Expr::and(lhs, rhs);
            pos = after;
        }
        Some((lhs, pos))
    }

    fn not_expr(&mut self, pos: usize) -> Parsed<Expr> {
        if let Some(next) = self.sym(pos, "~").or_else(|| self.keyword(pos, "not")) {
            let (operand, pos) = self.not_expr(next)?;
            return Some((Expr::not(operand), pos));
        }
        self.memoized(Production::CondAtom, pos, Self::cond_atom)
    }

    fn cond_atom(&mut self, pos: usize) -> Parsed<Expr> {
        if let Some(inner) = self.sym(pos, "(") {
            if let Some((cond, after)) = self.condition(inner) {
                if let Some(after) = self.sym(after, ")") {
                    return Some((cond, after));
                }
            }
        }
        self.comparison(pos)
    }

    fn comparison(&mut self, pos: usize) -> Parsed<Expr> {
        let (lhs, pos) = self.math(pos)?;
        let (op, pos) = self.compare_op(pos)?;
        let (rhs, pos) = self.math(pos)?;
        Some((Expr::compare(op, lhs, rhs), pos))
    }

    fn compare_op(&mut self, pos: usize) -> Parsed<CompareOp> {
        let op = match self.tok(pos) {
            Tok::Sym(">=") => Some(CompareOp::Ge),
            Tok::Sym(">") => Some(CompareOp::Gt),
            Tok::Sym("<=") => Some(CompareOp::Le),
            Tok::Sym("<") => Some(CompareOp::Lt),
            Tok::Sym("!=") => Some(CompareOp::Ne),
            Tok::Sym("==") => Some(CompareOp::Eq),
            _ => None,
        };
        if let Some(op) = op {
            return Some((op, pos + 1));
        }
        let (negated, pos) = match self.keyword(pos, "not") {
            Some(next) => (true, next),
            None => (false, pos),
        };
        let word = match self.tok(pos) {
            Tok::Ident(id) => id.to_ascii_lowercase(),
            _ => String::new(),
        };
        let op = match (word.as_str(), negated) {
            ("in", false) => CompareOp::In,
            ("in", true) => CompareOp::NotIn,
            ("between", false) => CompareOp::Between,
            ("between", true) => CompareOp::NotBetween,
            ("match", false) => CompareOp::Match,
            ("match", true) => CompareOp::NotMatch,
            ("contains", false) => CompareOp::Contains,
            ("contains", true) => CompareOp::NotContains,
            _ => {
                self.expect(pos, "comparison operator");
                return None;
            }
        };
        Some((op, pos + 1))
    }

    // --- math -------------------------------------------------------------------

    fn math(&mut self, pos: usize) -> Parsed<Expr> {
        self.memoized(Production::Math, pos, Self::sum)
    }

    fn sum(&mut self, pos: usize) -> Parsed<Expr> {
        let (mut lhs, mut pos) = self.term(pos)?;
        loop {
            let op = match self.tok(pos) {
                Tok::Sym("+") => BinaryOp::Add,
                Tok::Sym("-") => BinaryOp::Sub,
                _ => {
                    self.expect(pos, "+");
                    self.expect(pos, "-");
                    break;
                }
            };
            let Some((rhs, after)) = self.term(pos + 1) else { break };
            lhs = Expr::binary(op, lhs, rhs);
            pos = after;
        }
        Some((lhs, pos))
    }

    fn term(&mut self, pos: usize) -> Parsed<Expr> {
        let (mut lhs, mut pos) = self.unary(pos)?;
        loop {
            let op = match self.tok(pos) {
                Tok::Sym("*") => BinaryOp::Mul,
                Tok::Sym("/") => BinaryOp::Div,
                _ => {
                    self.expect(pos, "*");
                    self.expect(pos, "/");
                    break;
                }
            };
            let Some((rhs, after)) = self.unary(pos + 1) else { break };
            lhs = Expr::binary(op, lhs, rhs);
            pos = after;
        }
        Some((lhs, pos))
    }

    fn unary(&mut self, pos: usize) -> Parsed<Expr> {
        if *self.tok(pos) == Tok::Sym("-") {
            let (operand, after) = self.unary(pos + 1)?;
            let node = match operand {
                Expr::Literal(Literal::Number(v)) => Expr::number(-v),
                other => Expr::Unary { op: UnaryOp::Neg, operand: Box::new(other) },
            };
            return Some((node, after));
        }
        let (base, pos) = self.atom(pos)?;
        match self.sym(pos, "**") {
            Some(next) => {
                let (exponent, after) = self.unary(next)?;
                Some((Expr::binary(BinaryOp::Pow, base, exponent), after))
            }
            None => Some((base, pos)),
        }
    }

    fn atom(&mut self, pos: usize) -> Parsed<Expr> {
        match self.tok(pos).clone() {
            Tok::Column(name) => {
                let (tolerance, after) = self.tolerance_tag(pos + 1);
                Some((Expr::Column(ColumnRef { name, tolerance }), after))
            }
            Tok::Str(s) => Some((Expr::text(s), pos + 1)),
            Tok::Num(v) => Some((Expr::number(v), pos + 1)),
            Tok::Ident(id) if id.eq_ignore_ascii_case("empty") => Some((Expr::Literal(Literal::Empty), pos + 1)),
            Tok::Ident(id) if *self.tok(pos + 1) == Tok::Sym("(") => self.call(&id, pos),
            Tok::Ident(id) if !KEYWORDS.iter().any(|k| id.eq_ignore_ascii_case(k)) => Some((Expr::Var(id), pos + 1)),
            Tok::Sym("[") => self.list(pos + 1),
            Tok::Sym("(") => {
                let (inner, after) = self.math(pos + 1)?;
                let after = self.sym(after, ")")?;
                Some((inner, after))
            }
            _ => {
                self.expect(pos, "column reference");
                self.expect(pos, "literal");
                self.expect(pos, "function call");
                None
            }
        }
    }

    fn tolerance_tag(&mut self, pos: usize) -> (Option<ToleranceTag>, usize) {
        let parse = |p: &mut Self| -> Parsed<ToleranceTag> {
            let pos = p.sym(pos, "[")?;
            let direction = match p.tok(pos) {
                Tok::Sym("+") => Direction::Up,
                Tok::Sym("-") => Direction::Down,
                _ => {
                    p.expect(pos, "tolerance direction");
                    return None;
                }
            };
            let key = match p.tok(pos + 1) {
                Tok::Str(key) => Some((key.clone(), pos + 2)),
                _ => p.bare_key(pos + 1),
            };
            let Some((key, end)) = key.filter(|(k, _)| !k.is_empty() && !k.contains(char::is_whitespace)) else {
                p.expect(pos + 1, "tolerance key");
                return None;
            };
            let after = p.sym(end, "]")?;
            Some((ToleranceTag { direction, key }, after))
        };
        match parse(self) {
            Some((tag, after)) => (Some(tag), after),
            None => (None, pos),
        }
    }

    /// Unquoted tolerance key: the source text of adjacent tokens before `]`.
    fn bare_key(&self, pos: usize) -> Option<(String, usize)> {
        let mut end = pos;
        while let Some(t) = self.tokens.get(end) {
            let gap = end > pos && t.start != self.tokens[end - 1].end;
            if gap || matches!(t.tok, Tok::Sym("]") | Tok::Eof) {
                break;
            }
            end += 1;
        }
        if end == pos {
            return None;
        }
        Some((self.src[self.tokens[pos].start..self.tokens[end - 1].end].to_string(), end))
    }

    fn call(&mut self, name: &str, pos: usize) -> Parsed<Expr> {
        let Some(func) = Function::from_name(&name.to_ascii_lowercase()) else {
            self.expect(pos, "function name");
            return None;
        };
        let mut pos = pos + 2;
        let mut args = Vec::new();
        if let Some(after) = self.sym(pos, ")") {
            return Some((Expr::call(func, args), after));
        }
        loop {
            let (arg, after) = self.argument(pos)?;
            args.push(arg);
            if let Some(next) = self.sym(after, ",") {
                pos = next;
                continue;
            }
            let after = self.sym(after, ")")?;
            return Some((Expr::call(func, args), after));
        }
    }

    /// Function arguments may be conditions (`countif`, `sumif`) or math.
    fn argument(&mut self, pos: usize) -> Parsed<Expr> {
        let as_condition = self.condition(pos);
        let as_math = self.math(pos);
        match (as_condition, as_math) {
            (Some(c), Some(m)) => Some(if c.1 >= m.1 { c } else { m }),
            (c, m) => c.or(m),
        }
    }

    fn list(&mut self, pos: usize) -> Parsed<Expr> {
        if let Some(after) = self.sym(pos, "]") {
            return Some((Expr::List(Vec::new()), after));
        }
        let (first, after) = self.math(pos)?;
        if let Some(next) = self.keyword(after, "for") {
            let var = match self.tok(next) {
                Tok::Ident(v) if !KEYWORDS.iter().any(|k| v.eq_ignore_ascii_case(k)) => v.clone(),
                _ => {
                    self.expect(next, "variable name");
                    return None;
                }
            };
            let next = self.keyword(next + 1, "in")?;
            let (source, after) = self.math(next)?;
            let after = self.sym(after, "]")?;
            let node = Expr::Comprehension { element: Box::new(first), var, source: Box::new(source) };
            return Some((node, after));
        }
        let mut items = vec![first];
        let mut pos = after;
        loop {
            if let Some(after) = self.sym(pos, "]") {
                return Some((Expr::List(items), after));
            }
            let next = self.sym(pos, ",")?;
            let (item, after) = self.math(next)?;
            items.push(item);
            pos = after;
        }
    }

    fn at_end(&mut self, pos: usize) -> bool {
        if *self.tok(pos) == Tok::Eof {
            true
        } else {
            self.expect(pos, "end of input");
            false
        }
    }
}

/// Parse a rule (`if ... then ...` or a bare condition).
pub fn parse_rule(text: &str) -> Result<RuleAst, SyntaxError> {
    let mut parser = Parser::new(text)?;
    match parser.rule() {
        Some((rule, pos)) if parser.at_end(pos) => Ok(rule),
        _ => Err(parser.error()),
    }
}

/// Parse a single condition.
pub fn parse_condition(text: &str) -> Result<Expr, SyntaxError> {
    let mut parser = Parser::new(text)?;
    match parser.condition(0) {
        Some((cond, pos)) if parser.at_end(pos) => Ok(cond),
        _ => Err(parser.error()),
    }
}
