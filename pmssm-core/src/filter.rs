use crate::expr::{Expr, Parser};
use arrow::array::{BooleanArray, BooleanBuilder};
use arrow::record_batch::RecordBatch;
use parquet::file::metadata::RowGroupMetaData;
use parquet::file::statistics::Statistics;
use pmssm_common::{PmssmError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

// --- AST ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp { Eq, Ne, Lt, Le, Gt, Ge }

impl CmpOp {
    fn holds(self, a: f64, b: f64) -> bool {
        if a.is_nan() || b.is_nan() { return false; }
        match self { CmpOp::Eq => a == b, CmpOp::Ne => a != b, CmpOp::Lt => a < b, CmpOp::Le => a <= b, CmpOp::Gt => a > b, CmpOp::Ge => a >= b }
    }
    // `lit op col` rewritten as `col flipped(op) lit`
    fn flipped(self) -> Self {
        match self { CmpOp::Lt => CmpOp::Gt, CmpOp::Le => CmpOp::Ge, CmpOp::Gt => CmpOp::Lt, CmpOp::Ge => CmpOp::Le, other => other }
    }
    fn symbol(self) -> &'static str {
        match self { CmpOp::Eq => "==", CmpOp::Ne => "!=", CmpOp::Lt => "<", CmpOp::Le => "<=", CmpOp::Gt => ">", CmpOp::Ge => ">=" }
    }
}

/// Row selection over derived quantities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    Always,
    Compare { lhs: Expr, op: CmpOp, rhs: Expr },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn compare(lhs: Expr, op: CmpOp, rhs: Expr) -> Self { Predicate::Compare { lhs, op, rhs } }
    pub fn gt(lhs: Expr, v: f64) -> Self { Self::compare(lhs, CmpOp::Gt, Expr::Const(v)) }
    pub fn ge(lhs: Expr, v: f64) -> Self { Self::compare(lhs, CmpOp::Ge, Expr::Const(v)) }
    pub fn lt(lhs: Expr, v: f64) -> Self { Self::compare(lhs, CmpOp::Lt, Expr::Const(v)) }
    pub fn le(lhs: Expr, v: f64) -> Self { Self::compare(lhs, CmpOp::Le, Expr::Const(v)) }
    pub fn eq(lhs: Expr, v: f64) -> Self { Self::compare(lhs, CmpOp::Eq, Expr::Const(v)) }

    pub fn and(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::Always, p) | (p, Predicate::Always) => p,
            (a, b) => Predicate::And(Box::new(a), Box::new(b)),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    /// Conjunction of all given predicates; empty input selects everything.
    pub fn all(preds: impl IntoIterator<Item = Predicate>) -> Self {
        preds.into_iter().fold(Predicate::Always, Predicate::and)
    }

    /// Disjunction of the given predicates; empty input selects nothing.
    pub fn any(preds: impl IntoIterator<Item = Predicate>) -> Self {
        preds.into_iter().reduce(Predicate::or).unwrap_or(!Predicate::Always)
    }

    /// collect all column names referenced in predicate
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Predicate::Always => Vec::new(),
            Predicate::Compare { lhs, rhs, .. } => {
                let mut cols = lhs.columns();
                cols.extend(rhs.columns());
                cols
            }
            Predicate::And(a, b) | Predicate::Or(a, b) => {
                let mut cols = a.columns();
                cols.extend(b.columns());
                cols
            }
            Predicate::Not(inner) => inner.columns(),
        }
    }

    /// Evaluate against a single row; `lookup` resolves column values.
    pub fn eval_with(&self, lookup: &dyn Fn(&str) -> Option<f64>) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::Compare { lhs, op, rhs } => op.holds(lhs.eval_with(lookup), rhs.eval_with(lookup)),
            Predicate::And(a, b) => a.eval_with(lookup) && b.eval_with(lookup),
            Predicate::Or(a, b) => a.eval_with(lookup) || b.eval_with(lookup),
            Predicate::Not(inner) => !inner.eval_with(lookup),
        }
    }
}

impl std::ops::Not for Predicate {
    type Output = Predicate;
    fn not(self) -> Predicate { Predicate::Not(Box::new(self)) }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Always => write!(f, "true"),
            Predicate::Compare { lhs, op, rhs } => write!(f, "{lhs}{}{rhs}", op.symbol()),
            Predicate::And(a, b) => write!(f, "({a} && {b})"),
            Predicate::Or(a, b) => write!(f, "({a} || {b})"),
            Predicate::Not(inner) => write!(f, "!({inner})"),
        }
    }
}

// --- recursive descent parser ---

pub fn parse_predicate(input: &str) -> Result<Predicate> {
    let mut p = Parser::new(input)?;
    let pred = parse_or(&mut p)?;
    p.finish()?;
    Ok(pred)
}

fn parse_or(p: &mut Parser) -> Result<Predicate> {
    let mut left = parse_and(p)?;
    while matches!(p.peek_upper().as_deref(), Some("||") | Some("OR")) {
        p.consume();
        let right = parse_and(p)?;
        left = Predicate::Or(Box::new(left), Box::new(right));
    }
    Ok(left)
}

fn parse_and(p: &mut Parser) -> Result<Predicate> {
    let mut left = parse_not(p)?;
    while matches!(p.peek_upper().as_deref(), Some("&&") | Some("AND")) {
        p.consume();
        let right = parse_not(p)?;
        left = Predicate::And(Box::new(left), Box::new(right));
    }
    Ok(left)
}

fn parse_not(p: &mut Parser) -> Result<Predicate> {
    if matches!(p.peek_upper().as_deref(), Some("!") | Some("NOT")) {
        p.consume();
        let inner = parse_not(p)?;
        return Ok(Predicate::Not(Box::new(inner)));
    }
    parse_atom(p)
}

fn is_operator(tok: Option<&str>) -> bool {
    matches!(tok, Some("+" | "-" | "*" | "/" | "**" | "^" | "==" | "!=" | "<" | "<=" | ">" | ">="))
}

fn parse_atom(p: &mut Parser) -> Result<Predicate> {
    // "(" opens either a nested predicate or an arithmetic group like (a**2+b**2)>0.95;
    // try the predicate first and fall back when an operator follows the closing paren
    if p.peek() == Some("(") {
        let save = p.pos();
        p.consume();
        if let Ok(inner) = parse_or(p) {
            if p.peek() == Some(")") {
                p.consume();
                if !is_operator(p.peek()) {
                    return Ok(inner);
                }
            }
        }
        p.rewind(save);
    }
    let lhs = p.parse_expr()?;
    let op = match p.peek() {
        Some("==") => CmpOp::Eq,
        Some("!=") => CmpOp::Ne,
        Some("<") => CmpOp::Lt,
        Some("<=") => CmpOp::Le,
        Some(">") => CmpOp::Gt,
        Some(">=") => CmpOp::Ge,
        // bare expression: non-zero means selected
        _ => return Ok(Predicate::compare(lhs, CmpOp::Ne, Expr::Const(0.0))),
    };
    p.consume();
    let rhs = p.parse_expr()?;
    Ok(Predicate::Compare { lhs, op, rhs })
}

// --- row group pushdown ---

pub fn can_skip_row_group(pred: &Predicate, rg: &RowGroupMetaData) -> bool {
    match pred {
        Predicate::And(a, b) => can_skip_row_group(a, rg) || can_skip_row_group(b, rg), // skip if EITHER side definitely false
        Predicate::Or(a, b) => can_skip_row_group(a, rg) && can_skip_row_group(b, rg),  // skip only if BOTH sides definitely false
        Predicate::Not(_) | Predicate::Always => false, // conservative: don't skip on NOT
        Predicate::Compare { lhs, op, rhs } => match (lhs, rhs) {
            (Expr::Column(col), Expr::Const(v)) => find_col_stats(col, rg).map(|s| stat_can_skip(s, *op, *v)).unwrap_or(false),
            (Expr::Const(v), Expr::Column(col)) => find_col_stats(col, rg).map(|s| stat_can_skip(s, op.flipped(), *v)).unwrap_or(false),
            _ => false,
        },
    }
}

fn find_col_stats<'a>(col: &str, rg: &'a RowGroupMetaData) -> Option<&'a Statistics> {
    for i in 0..rg.num_columns() {
        let cm = rg.column(i);
        if cm.column_descr().name() == col {
            return cm.statistics();
        }
    }
    None
}

fn stat_min_max(stats: &Statistics) -> Option<(f64, f64)> {
    match stats {
        Statistics::Int32(s) => Some((*s.min_opt()? as f64, *s.max_opt()? as f64)),
        Statistics::Int64(s) => Some((*s.min_opt()? as f64, *s.max_opt()? as f64)),
        Statistics::Float(s) => Some((*s.min_opt()? as f64, *s.max_opt()? as f64)),
        Statistics::Double(s) => Some((*s.min_opt()?, *s.max_opt()?)),
        _ => None,
    }
}

fn stat_can_skip(stats: &Statistics, op: CmpOp, v: f64) -> bool {
    let Some((min, max)) = stat_min_max(stats) else { return false };
    if min.is_nan() || max.is_nan() || v.is_nan() { return false; }
    match op {
        CmpOp::Eq => v < min || v > max,
        CmpOp::Lt => v <= min, // all values >= min, need val > min to have any match
        CmpOp::Le => v < min,
        CmpOp::Gt => v >= max,
        CmpOp::Ge => v > max,
        CmpOp::Ne => false,
    }
}

// --- filter evaluation on RecordBatch ---

pub fn eval_predicate_batch(pred: &Predicate, batch: &RecordBatch) -> Result<BooleanArray> {
    let n = batch.num_rows();
    match pred {
        Predicate::Always => Ok(BooleanArray::from(vec![true; n])),
        Predicate::And(a, b) => {
            let ma = eval_predicate_batch(a, batch)?;
            let mb = eval_predicate_batch(b, batch)?;
            Ok(arrow::compute::and(&ma, &mb)?)
        }
        Predicate::Or(a, b) => {
            let ma = eval_predicate_batch(a, batch)?;
            let mb = eval_predicate_batch(b, batch)?;
            Ok(arrow::compute::or(&ma, &mb)?)
        }
        Predicate::Not(inner) => {
            let m = eval_predicate_batch(inner, batch)?;
            Ok(arrow::compute::not(&m)?)
        }
        Predicate::Compare { lhs, op, rhs } => {
            let va = lhs.eval(batch)?;
            let vb = rhs.eval(batch)?;
            let mut b = BooleanBuilder::with_capacity(n);
            for (x, y) in va.into_iter().zip(vb) {
                b.append_value(op.holds(x, y));
            }
            Ok(b.finish())
        }
    }
}

/// Check that every column the predicate references is in `available`.
pub fn check_columns<'a>(cols: impl IntoIterator<Item = &'a str>, available: &[String]) -> Result<()> {
    for col in cols {
        if !available.iter().any(|n| n == col) {
            return Err(PmssmError::UnknownColumn {
                column: col.to_string(),
                available: available.join(", "),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Float64Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn row<'a>(vars: &'a [(&'a str, f64)]) -> impl Fn(&str) -> Option<f64> + 'a {
        move |c| vars.iter().find(|(n, _)| *n == c).map(|(_, v)| *v)
    }

    fn sel(src: &str, vars: &[(&str, f64)]) -> bool {
        parse_predicate(src).unwrap().eval_with(&row(vars))
    }

    #[test] fn simple_gt() { assert!(sel("x > 1", &[("x", 2.0)])); }
    #[test] fn keyword_and() { assert!(!sel("x > 1 AND y < 0", &[("x", 2.0), ("y", 1.0)])); }
    #[test] fn symbol_or() { assert!(sel("x > 1 || y < 0", &[("x", 0.0), ("y", -1.0)])); }
    #[test] fn nan_never_matches() { assert!(!sel("x != 1", &[("x", f64::NAN)])); }
    #[test] fn bare_expression_is_truthy() { assert!(sel("x", &[("x", 3.0)]) && !sel("x", &[("x", 0.0)])); }

    #[test]
    fn arithmetic_group_before_comparison() {
        let vars = [("Re_N_13", 0.7), ("Re_N_14", 0.7)];
        assert!(sel("(Re_N_13**2+Re_N_14**2)>0.95", &vars));
        assert!(!sel("(Re_N_13**2+Re_N_14**2)>0.99", &vars));
    }

    #[test]
    fn negated_group() {
        let src = "!(xsec_tot_pb>1E3 && Zsig_combined==0)";
        assert!(!sel(src, &[("xsec_tot_pb", 5e3), ("Zsig_combined", 0.0)]));
        assert!(sel(src, &[("xsec_tot_pb", 5e3), ("Zsig_combined", 0.2)]));
    }

    #[test]
    fn relic_density_window() {
        let src = "abs(Omegah2-0.12)<=0.012";
        assert!(sel(src, &[("Omegah2", 0.125)]));
        assert!(!sel(src, &[("Omegah2", 0.2)]));
    }

    #[test]
    fn nested_predicate_groups() {
        assert!(sel("(x > 1 && (y > 1 || z > 1))", &[("x", 2.0), ("y", 0.0), ("z", 2.0)]));
    }

    #[test]
    fn builder_and_skips_always() {
        let p = Predicate::Always.and(Predicate::gt(Expr::col("x"), 0.0));
        assert_eq!(p, Predicate::gt(Expr::col("x"), 0.0));
        assert_eq!(Predicate::all(Vec::new()), Predicate::Always);
    }

    #[test]
    fn any_of_nothing_selects_nothing() {
        assert!(!Predicate::any(Vec::new()).eval_with(&|_| None));
    }

    #[test]
    fn columns_collected() {
        let p = parse_predicate("a > 1 && !(b < c)").unwrap();
        assert_eq!(p.columns(), vec!["a", "b", "c"]);
    }

    #[test]
    fn parse_errors() {
        assert!(parse_predicate("x >").is_err());
        assert!(parse_predicate("(x > 1").is_err());
        assert!(parse_predicate("x > 1 y").is_err());
    }

    #[test]
    fn missing_column_reported() {
        let err = check_columns(["a", "zz"], &["a".to_string(), "b".to_string()]).unwrap_err();
        assert!(matches!(err, PmssmError::UnknownColumn { ref column, .. } if column == "zz"));
    }

    #[test]
    fn batch_mask() {
        let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Float64, true)]));
        let batch = RecordBatch::try_new(schema, vec![
            Arc::new(Float64Array::from(vec![Some(0.5), Some(2.0), None])),
        ]).unwrap();
        let mask = eval_predicate_batch(&parse_predicate("!(x < 1)").unwrap(), &batch).unwrap();
        assert!(!mask.value(0));
        assert!(mask.value(1));
        // NOT of a false-for-null comparison selects the null row
        assert!(mask.value(2));
        assert_eq!(mask.true_count(), 2);
    }
}
