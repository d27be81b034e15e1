use arrow::array::{
    Array, ArrayRef, BooleanArray, Float32Array, Float64Array, Int16Array, Int32Array, Int64Array,
    Int8Array, UInt16Array, UInt32Array, UInt64Array, UInt8Array,
};
use arrow::record_batch::RecordBatch;
use pmssm_common::{PmssmError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

// --- AST ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryFn { Abs, Exp, Log, Log10, Sqrt }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp { Add, Sub, Mul, Div, Pow, Max, Min }

/// Numeric expression over named columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Const(f64),
    Column(String),
    Neg(Box<Expr>),
    Apply(UnaryFn, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

impl UnaryFn {
    fn apply(self, v: f64) -> f64 {
        match self {
            UnaryFn::Abs => v.abs(),
            UnaryFn::Exp => v.exp(),
            UnaryFn::Log => v.ln(),
            UnaryFn::Log10 => v.log10(),
            UnaryFn::Sqrt => v.sqrt(),
        }
    }
    fn name(self) -> &'static str {
        match self {
            UnaryFn::Abs => "abs",
            UnaryFn::Exp => "exp",
            UnaryFn::Log => "log",
            UnaryFn::Log10 => "log10",
            UnaryFn::Sqrt => "sqrt",
        }
    }
    fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "abs" | "fabs" => Some(UnaryFn::Abs),
            "exp" => Some(UnaryFn::Exp),
            "log" | "ln" => Some(UnaryFn::Log),
            "log10" => Some(UnaryFn::Log10),
            "sqrt" => Some(UnaryFn::Sqrt),
            _ => None,
        }
    }
}

impl BinOp {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
            BinOp::Pow => a.powf(b),
            // NaN propagates instead of being swallowed by f64::max
            BinOp::Max => if a.is_nan() || b.is_nan() { f64::NAN } else { a.max(b) },
            BinOp::Min => if a.is_nan() || b.is_nan() { f64::NAN } else { a.min(b) },
        }
    }
}

impl Expr {
    pub fn col(name: impl Into<String>) -> Self { Expr::Column(name.into()) }
    pub fn lit(v: f64) -> Self { Expr::Const(v) }

    pub fn abs(self) -> Self { Expr::Apply(UnaryFn::Abs, Box::new(self)) }
    pub fn exp(self) -> Self { Expr::Apply(UnaryFn::Exp, Box::new(self)) }
    pub fn sqrt(self) -> Self { Expr::Apply(UnaryFn::Sqrt, Box::new(self)) }
    pub fn powf(self, e: f64) -> Self { Expr::Binary(BinOp::Pow, Box::new(self), Box::new(Expr::Const(e))) }
    pub fn max(self, other: Expr) -> Self { Expr::Binary(BinOp::Max, Box::new(self), Box::new(other)) }
    pub fn min(self, other: Expr) -> Self { Expr::Binary(BinOp::Min, Box::new(self), Box::new(other)) }

    /// Sum of the given terms; an empty list yields 0.
    pub fn sum(terms: impl IntoIterator<Item = Expr>) -> Self {
        terms.into_iter().reduce(|a, b| a + b).unwrap_or(Expr::Const(0.0))
    }

    /// Product of the given factors; an empty list yields 1.
    pub fn product(factors: impl IntoIterator<Item = Expr>) -> Self {
        factors.into_iter().reduce(|a, b| a * b).unwrap_or(Expr::Const(1.0))
    }

    pub fn parse(input: &str) -> Result<Expr> {
        let mut p = Parser::new(input)?;
        let e = p.parse_expr()?;
        p.finish()?;
        Ok(e)
    }

    /// collect all column names referenced in the expression
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Expr::Const(_) => Vec::new(),
            Expr::Column(c) => vec![c.as_str()],
            Expr::Neg(e) | Expr::Apply(_, e) => e.columns(),
            Expr::Binary(_, a, b) => {
                let mut cols = a.columns();
                cols.extend(b.columns());
                cols
            }
        }
    }

    /// Evaluate against a single row; `lookup` resolves column values.
    pub fn eval_with(&self, lookup: &dyn Fn(&str) -> Option<f64>) -> f64 {
        match self {
            Expr::Const(v) => *v,
            Expr::Column(c) => lookup(c).unwrap_or(f64::NAN),
            Expr::Neg(e) => -e.eval_with(lookup),
            Expr::Apply(f, e) => f.apply(e.eval_with(lookup)),
            Expr::Binary(op, a, b) => op.apply(a.eval_with(lookup), b.eval_with(lookup)),
        }
    }

    /// Column-wise evaluation over a record batch. Nulls evaluate to NaN.
    pub fn eval(&self, batch: &RecordBatch) -> Result<Vec<f64>> {
        let n = batch.num_rows();
        match self {
            Expr::Const(v) => Ok(vec![*v; n]),
            Expr::Column(c) => column_values(batch, c),
            Expr::Neg(e) => Ok(e.eval(batch)?.into_iter().map(|v| -v).collect()),
            Expr::Apply(f, e) => Ok(e.eval(batch)?.into_iter().map(|v| f.apply(v)).collect()),
            Expr::Binary(op, a, b) => {
                let va = a.eval(batch)?;
                let vb = b.eval(batch)?;
                Ok(va.into_iter().zip(vb).map(|(x, y)| op.apply(x, y)).collect())
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(v) => write!(f, "{v}"),
            Expr::Column(c) => write!(f, "{c}"),
            Expr::Neg(e) => write!(f, "-({e})"),
            Expr::Apply(func, e) => write!(f, "{}({e})", func.name()),
            Expr::Binary(BinOp::Max, a, b) => write!(f, "max({a},{b})"),
            Expr::Binary(BinOp::Min, a, b) => write!(f, "min({a},{b})"),
            Expr::Binary(op, a, b) => {
                let sym = match op {
                    BinOp::Add => "+",
                    BinOp::Sub => "-",
                    BinOp::Mul => "*",
                    BinOp::Div => "/",
                    _ => "**",
                };
                write!(f, "({a}{sym}{b})")
            }
        }
    }
}

macro_rules! impl_arith {
    ($tr:ident, $method:ident, $op:expr) => {
        impl std::ops::$tr for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr { Expr::Binary($op, Box::new(self), Box::new(rhs)) }
        }
    };
}
impl_arith!(Add, add, BinOp::Add);
impl_arith!(Sub, sub, BinOp::Sub);
impl_arith!(Mul, mul, BinOp::Mul);
impl_arith!(Div, div, BinOp::Div);

impl std::ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr { Expr::Neg(Box::new(self)) }
}

/// A `Y:X` draw string: two derived quantities, y first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub y: Expr,
    pub x: Expr,
}

impl Projection {
    pub fn parse(draw: &str) -> Result<Projection> {
        let mut p = Parser::new(draw)?;
        let y = p.parse_expr()?;
        p.expect(":")?;
        let x = p.parse_expr()?;
        p.finish()?;
        Ok(Projection { y, x })
    }
}

// --- column access ---

fn schema_names(batch: &RecordBatch) -> String {
    batch.schema().fields().iter().map(|f| f.name().as_str()).collect::<Vec<_>>().join(", ")
}

macro_rules! numeric_values {
    ($arr:expr, $n:expr, $($ty:ty),+) => {
        $(
            if let Some(a) = $arr.as_any().downcast_ref::<$ty>() {
                return Ok((0..$n).map(|i| if a.is_null(i) { f64::NAN } else { a.value(i) as f64 }).collect());
            }
        )+
    };
}

/// Read a numeric (or boolean) column as f64, nulls mapped to NaN.
pub fn column_values(batch: &RecordBatch, col: &str) -> Result<Vec<f64>> {
    let idx = batch.schema().index_of(col).map_err(|_| PmssmError::UnknownColumn {
        column: col.to_string(),
        available: schema_names(batch),
    })?;
    let arr: &ArrayRef = batch.column(idx);
    let n = batch.num_rows();
    numeric_values!(arr, n, Float64Array, Float32Array, Int64Array, Int32Array, Int16Array, Int8Array,
        UInt64Array, UInt32Array, UInt16Array, UInt8Array);
    if let Some(a) = arr.as_any().downcast_ref::<BooleanArray>() {
        return Ok((0..n).map(|i| if a.is_null(i) { f64::NAN } else if a.value(i) { 1.0 } else { 0.0 }).collect());
    }
    Err(PmssmError::Expr(format!("column '{col}' has non-numeric type {:?}", arr.data_type())))
}

// --- tokenizer + recursive descent parser ---

pub(crate) fn tokenize(input: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() { chars.next(); continue; }
        // number literal, with optional exponent (1E-5, 2.5e3)
        if c.is_ascii_digit() || c == '.' {
            let mut num = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_ascii_digit() || ch == '.' {
                    num.push(ch);
                    chars.next();
                } else if (ch == 'e' || ch == 'E') && !num.contains(['e', 'E']) {
                    num.push(ch);
                    chars.next();
                    if let Some(&sign) = chars.peek() {
                        if sign == '+' || sign == '-' { num.push(sign); chars.next(); }
                    }
                } else {
                    break;
                }
            }
            tokens.push(num);
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let mut word = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_alphanumeric() || ch == '_' || ch == '.' { word.push(ch); chars.next(); } else { break; }
            }
            tokens.push(word);
            continue;
        }
        chars.next();
        let next = chars.peek().copied();
        let two = match (c, next) {
            ('*', Some('*')) => Some("**"),
            ('<', Some('=')) => Some("<="),
            ('>', Some('=')) => Some(">="),
            ('=', Some('=')) => Some("=="),
            ('!', Some('=')) => Some("!="),
            ('<', Some('>')) => Some("!="),
            ('&', Some('&')) => Some("&&"),
            ('|', Some('|')) => Some("||"),
            _ => None,
        };
        if let Some(op) = two {
            chars.next();
            tokens.push(op.to_string());
            continue;
        }
        match c {
            '+' | '-' | '*' | '/' | '^' | '(' | ')' | ',' | ':' | '<' | '>' | '!' => tokens.push(c.to_string()),
            '=' => tokens.push("==".into()),
            _ => return Err(PmssmError::Expr(format!("unexpected character '{c}' in '{input}'"))),
        }
    }
    Ok(tokens)
}

pub(crate) struct Parser { tokens: Vec<String>, pos: usize }

impl Parser {
    pub(crate) fn new(input: &str) -> Result<Self> {
        Ok(Parser { tokens: tokenize(input)?, pos: 0 })
    }
    pub(crate) fn peek(&self) -> Option<&str> { self.tokens.get(self.pos).map(|s| s.as_str()) }
    pub(crate) fn peek_upper(&self) -> Option<String> { self.peek().map(|s| s.to_uppercase()) }
    pub(crate) fn pos(&self) -> usize { self.pos }
    pub(crate) fn rewind(&mut self, pos: usize) { self.pos = pos; }
    pub(crate) fn consume(&mut self) -> Option<String> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() { self.pos += 1; }
        t
    }
    pub(crate) fn expect(&mut self, s: &str) -> Result<()> {
        match self.consume() {
            Some(t) if t.eq_ignore_ascii_case(s) => Ok(()),
            Some(t) => Err(PmssmError::Expr(format!("expected '{s}', got '{t}'"))),
            None => Err(PmssmError::Expr(format!("expected '{s}', got EOF"))),
        }
    }
    pub(crate) fn finish(&self) -> Result<()> {
        match self.peek() {
            Some(t) => Err(PmssmError::Expr(format!("unexpected token: '{t}'"))),
            None => Ok(()),
        }
    }

    pub(crate) fn parse_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some("+") => BinOp::Add,
                Some("-") => BinOp::Sub,
                _ => break,
            };
            self.consume();
            let right = self.parse_term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }
    fn parse_term(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some("*") => BinOp::Mul,
                Some("/") => BinOp::Div,
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }
    fn parse_unary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some("-") => {
                self.consume();
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            Some("+") => {
                self.consume();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }
    // right associative, binds tighter than unary minus: -a**2 == -(a**2)
    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_primary()?;
        if matches!(self.peek(), Some("**") | Some("^")) {
            self.consume();
            let exp = self.parse_unary()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }
    fn parse_primary(&mut self) -> Result<Expr> {
        let tok = match self.consume() {
            Some(t) => t,
            None => return Err(PmssmError::Expr("expected expression, got EOF".into())),
        };
        if tok == "(" {
            let inner = self.parse_expr()?;
            self.expect(")")?;
            return Ok(inner);
        }
        if tok.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
            return tok.parse::<f64>().map(Expr::Const)
                .map_err(|_| PmssmError::Expr(format!("invalid number '{tok}'")));
        }
        if tok.starts_with(|c: char| c.is_alphabetic() || c == '_') {
            if self.peek() == Some("(") {
                self.consume();
                let mut args = vec![self.parse_expr()?];
                while self.peek() == Some(",") {
                    self.consume();
                    args.push(self.parse_expr()?);
                }
                self.expect(")")?;
                return build_call(&tok, args);
            }
            return Ok(Expr::Column(tok));
        }
        Err(PmssmError::Expr(format!("unexpected token '{tok}'")))
    }
}

fn build_call(name: &str, mut args: Vec<Expr>) -> Result<Expr> {
    if let Some(f) = UnaryFn::from_name(name) {
        if args.len() != 1 {
            return Err(PmssmError::Expr(format!("{name}() takes 1 argument, got {}", args.len())));
        }
        return Ok(Expr::Apply(f, Box::new(args.remove(0))));
    }
    let op = match name.to_ascii_lowercase().as_str() {
        "max" => BinOp::Max,
        "min" => BinOp::Min,
        "pow" => BinOp::Pow,
        _ => return Err(PmssmError::Expr(format!("unknown function '{name}'"))),
    };
    match (args.pop(), args.pop(), args.is_empty()) {
        (Some(b), Some(a), true) => Ok(Expr::Binary(op, Box::new(a), Box::new(b))),
        _ => Err(PmssmError::Expr(format!("{name}() takes 2 arguments"))),
    }
}
