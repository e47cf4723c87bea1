use std::fmt;

use obelisk_num::IntNum;

use crate::bytecode::Location;
use crate::errwarns::CoreError;
use crate::object::Object;
use crate::symbol::{SymbolDef, SymbolRef};

/// Expression operators. `Ident` wraps a single term with no operation and
/// is what constant folding collapses to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Ident,
    Neg,
    Not,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    And,
    Or,
    Xor,
}

#[derive(Debug, Clone)]
pub enum ExprTerm {
    Int(IntNum),
    Float(f64),
    Reg(u32),
    Sym(SymbolRef),
    Loc(Location),
    /// Placeholder left behind by `subst_dist`; filled in by `subst`.
    Subst(u32),
    Expr(Box<Expr>),
}

/// A tree of arithmetic/bitwise operations. `Add` and `Mul` are n-ary; the
/// remaining operators take one or two terms.
#[derive(Debug, Clone)]
pub struct Expr {
    op: Op,
    terms: Vec<ExprTerm>,
}

impl Expr {
    pub fn new(op: Op, terms: Vec<ExprTerm>) -> Self {
        Self { op, terms }
    }

    pub fn int(value: i64) -> Self {
        Self::intnum(IntNum::new(value))
    }

    pub fn intnum(value: IntNum) -> Self {
        Self::new(Op::Ident, vec![ExprTerm::Int(value)])
    }

    pub fn sym(sym: SymbolRef) -> Self {
        Self::new(Op::Ident, vec![ExprTerm::Sym(sym)])
    }

    pub fn loc(loc: Location) -> Self {
        Self::new(Op::Ident, vec![ExprTerm::Loc(loc)])
    }

    pub fn float(value: f64) -> Self {
        Self::new(Op::Ident, vec![ExprTerm::Float(value)])
    }

    pub fn reg(reg: u32) -> Self {
        Self::new(Op::Ident, vec![ExprTerm::Reg(reg)])
    }

    pub fn add(lhs: Expr, rhs: Expr) -> Self {
        Self::new(Op::Add, vec![lhs.into_term(), rhs.into_term()])
    }

    pub fn sub(lhs: Expr, rhs: Expr) -> Self {
        Self::new(Op::Sub, vec![lhs.into_term(), rhs.into_term()])
    }

    pub fn mul(lhs: Expr, rhs: Expr) -> Self {
        Self::new(Op::Mul, vec![lhs.into_term(), rhs.into_term()])
    }

    pub fn neg(inner: Expr) -> Self {
        Self::new(Op::Neg, vec![inner.into_term()])
    }

    fn into_term(self) -> ExprTerm {
        if self.op == Op::Ident && self.terms.len() == 1 {
            self.terms.into_iter().next().expect("ident expr has one term")
        } else {
            ExprTerm::Expr(Box::new(self))
        }
    }

    pub fn op(&self) -> Op {
        self.op
    }

    pub fn terms(&self) -> &[ExprTerm] {
        &self.terms
    }

    /// `Some` iff simplification collapsed the expression to one integer.
    pub fn get_intnum(&self) -> Option<IntNum> {
        match (self.op, self.terms.as_slice()) {
            (Op::Ident, [ExprTerm::Int(value)]) => Some(*value),
            _ => None,
        }
    }

    /// Replace `Subst` placeholders with the given values.
    pub fn subst(&mut self, values: &[i64]) {
        for term in &mut self.terms {
            match term {
                ExprTerm::Subst(index) => {
                    if let Some(&value) = values.get(*index as usize) {
                        *term = ExprTerm::Int(IntNum::new(value));
                    }
                }
                ExprTerm::Expr(inner) => inner.subst(values),
                _ => {}
            }
        }
    }

    /// Expand EQU symbols, optionally resolve labels/locations to their
    /// current section offsets, and fold constants.
    pub fn simplify(&mut self, object: &Object, resolve_locations: bool) {
        self.simplify_at(object, resolve_locations, 0);
    }

    fn simplify_at(&mut self, object: &Object, resolve_locations: bool, depth: u32) {
        // EQU chains deeper than this are left symbolic; callers then see a
        // non-constant expression and report it at their own line.
        const MAX_EQU_DEPTH: u32 = 64;

        for term in &mut self.terms {
            match term {
                ExprTerm::Sym(sym) => match object.sym(*sym).def() {
                    SymbolDef::Equ(equ) if depth < MAX_EQU_DEPTH => {
                        let mut inner = equ.clone();
                        inner.simplify_at(object, resolve_locations, depth + 1);
                        *term = inner.into_term();
                    }
                    SymbolDef::Label(loc) if resolve_locations => {
                        if let Some(offset) = object.location_offset(*loc) {
                            *term = ExprTerm::Int(IntNum::from_u64(offset));
                        }
                    }
                    _ => {}
                },
                ExprTerm::Loc(loc) if resolve_locations => {
                    if let Some(offset) = object.location_offset(*loc) {
                        *term = ExprTerm::Int(IntNum::from_u64(offset));
                    }
                }
                ExprTerm::Expr(inner) => inner.simplify_at(object, resolve_locations, depth),
                _ => {}
            }
        }

        self.fold();
    }

    fn fold(&mut self) {
        // Unwrap trivially-wrapped children so the match arms below see
        // plain terms.
        for term in &mut self.terms {
            if let ExprTerm::Expr(inner) = term
                && inner.op == Op::Ident
                && inner.terms.len() == 1
            {
                let unwrapped = inner.terms.pop().expect("ident expr has one term");
                *term = unwrapped;
            }
        }

        match self.op {
            Op::Ident | Op::Neg | Op::Not => {
                if let [ExprTerm::Int(value)] = self.terms.as_slice() {
                    let folded = match self.op {
                        Op::Ident => Some(*value),
                        Op::Neg => value.checked_neg().ok(),
                        Op::Not => Some(value.bit_not()),
                        _ => unreachable!(),
                    };
                    if let Some(folded) = folded {
                        *self = Expr::intnum(folded);
                    }
                }
            }
            Op::Add => {
                // Flatten nested adds, then gather constants into one term.
                let mut flat = Vec::with_capacity(self.terms.len());
                for term in self.terms.drain(..) {
                    match term {
                        ExprTerm::Expr(inner) if inner.op == Op::Add => flat.extend(inner.terms),
                        other => flat.push(other),
                    }
                }
                let mut sum = IntNum::ZERO;
                let mut rest = Vec::new();
                let mut overflow = false;
                for term in flat {
                    match term {
                        ExprTerm::Int(value) if !overflow => match sum.checked_add(value) {
                            Ok(next) => sum = next,
                            Err(_) => {
                                overflow = true;
                                rest.push(ExprTerm::Int(value));
                            }
                        },
                        other => rest.push(other),
                    }
                }
                if rest.is_empty() {
                    *self = Expr::intnum(sum);
                } else {
                    if !sum.is_zero() {
                        rest.push(ExprTerm::Int(sum));
                    }
                    if rest.len() == 1 {
                        self.op = Op::Ident;
                    }
                    self.terms = rest;
                }
            }
            Op::Sub | Op::Mul | Op::Div | Op::Mod | Op::Shl | Op::Shr | Op::And | Op::Or
            | Op::Xor => {
                if let [ExprTerm::Int(lhs), ExprTerm::Int(rhs)] = self.terms.as_slice() {
                    let folded = match self.op {
                        Op::Sub => lhs.checked_sub(*rhs).ok(),
                        Op::Mul => lhs.checked_mul(*rhs).ok(),
                        Op::Div => lhs.checked_div(*rhs).ok(),
                        Op::Mod => lhs.checked_rem(*rhs).ok(),
                        Op::Shl => lhs.checked_shl(*rhs).ok(),
                        Op::Shr => lhs.checked_shr(*rhs).ok(),
                        Op::And => Some(lhs.bit_and(*rhs)),
                        Op::Or => Some(lhs.bit_or(*rhs)),
                        Op::Xor => Some(lhs.bit_xor(*rhs)),
                        _ => unreachable!(),
                    };
                    if let Some(folded) = folded {
                        *self = Expr::intnum(folded);
                    }
                } else if self.op == Op::Sub
                    && let [_, ExprTerm::Int(rhs)] = self.terms.as_slice()
                    && rhs.is_zero()
                {
                    self.op = Op::Ident;
                    self.terms.truncate(1);
                }
            }
        }
    }

    /// Replace sub-expressions that reduce to a symbol-minus-symbol
    /// distance within one section by `Subst` placeholders, reporting each
    /// as `(index, from, to)` where the distance is `pos(to) - pos(from)`.
    /// Returns the number of substitutions made.
    pub(crate) fn subst_dist(
        &mut self,
        object: &Object,
        report: &mut dyn FnMut(u32, Location, Location),
    ) -> u32 {
        let mut counter = 0;
        self.subst_dist_at(object, report, &mut counter);
        counter
    }

    fn subst_dist_at(
        &mut self,
        object: &Object,
        report: &mut dyn FnMut(u32, Location, Location),
        counter: &mut u32,
    ) {
        if self.op == Op::Sub
            && self.terms.len() == 2
            && let Some(to) = term_location(object, &self.terms[0])
            && let Some(from) = term_location(object, &self.terms[1])
            && from.bc.section == to.bc.section
        {
            let index = *counter;
            *counter += 1;
            report(index, from, to);
            *self = Expr::new(Op::Ident, vec![ExprTerm::Subst(index)]);
            return;
        }

        for term in &mut self.terms {
            if let ExprTerm::Expr(inner) = term {
                inner.subst_dist_at(object, report, counter);
            }
        }
    }

    /// Split a single relocation-worthy symbol out of the top-level
    /// additive structure. Same-section label differences stay behind
    /// (they fold to constants once offsets are final); any other
    /// leftover symbolic reference is too complex to emit.
    pub(crate) fn extract_rel_sym(
        &mut self,
        object: &Object,
    ) -> Result<Option<SymbolRef>, CoreError> {
        match self.op {
            Op::Ident => {
                if let [ExprTerm::Sym(sym)] = self.terms.as_slice()
                    && let Some(rel) = reloc_sym(object, *sym)
                {
                    *self = Expr::int(0);
                    return Ok(Some(rel));
                }
                self.check_no_rel_syms(object)?;
                Ok(None)
            }
            Op::Add => {
                let mut found = None;
                for (index, term) in self.terms.iter().enumerate() {
                    if let ExprTerm::Sym(sym) = term
                        && let Some(rel) = reloc_sym(object, *sym)
                    {
                        if found.is_some() {
                            return Err(CoreError::TooComplex(
                                "multiple external references in one value".into(),
                            ));
                        }
                        found = Some((index, rel));
                    }
                }
                if let Some((index, rel)) = found {
                    self.terms.remove(index);
                    if self.terms.len() == 1 {
                        self.op = Op::Ident;
                    }
                    self.check_no_rel_syms(object)?;
                    return Ok(Some(rel));
                }
                self.check_no_rel_syms(object)?;
                Ok(None)
            }
            Op::Sub if self.terms.len() == 2 => {
                if is_label_pair(object, &self.terms[0], &self.terms[1]) {
                    return Ok(None);
                }
                if let ExprTerm::Sym(sym) = &self.terms[0]
                    && let Some(rel) = reloc_sym(object, *sym)
                {
                    let rhs = self.terms.pop().expect("sub has two terms");
                    *self = Expr::new(Op::Neg, vec![rhs]);
                    self.check_no_rel_syms(object)?;
                    return Ok(Some(rel));
                }
                self.check_no_rel_syms(object)?;
                Ok(None)
            }
            _ => {
                self.check_no_rel_syms(object)?;
                Ok(None)
            }
        }
    }

    /// Reject any remaining relocation-worthy symbol except same-section
    /// label pairs, which are resolvable without a relocation.
    fn check_no_rel_syms(&self, object: &Object) -> Result<(), CoreError> {
        if self.op == Op::Sub
            && self.terms.len() == 2
            && is_label_pair(object, &self.terms[0], &self.terms[1])
        {
            return Ok(());
        }
        for term in &self.terms {
            match term {
                ExprTerm::Sym(sym) => {
                    if let Some(rel) = reloc_sym(object, *sym) {
                        return Err(CoreError::TooComplex(format!(
                            "reference to symbol '{}' in a complex expression",
                            object.sym(rel).name()
                        )));
                    }
                }
                ExprTerm::Expr(inner) => inner.check_no_rel_syms(object)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Whether any term (recursively) is a register reference.
    pub fn contains_reg(&self) -> bool {
        self.terms.iter().any(|term| match term {
            ExprTerm::Reg(_) => true,
            ExprTerm::Expr(inner) => inner.contains_reg(),
            _ => false,
        })
    }
}

fn term_location(object: &Object, term: &ExprTerm) -> Option<Location> {
    match term {
        ExprTerm::Sym(sym) => object.symbol_location(*sym),
        ExprTerm::Loc(loc) => Some(*loc),
        _ => None,
    }
}

/// A symbol that must be carried as a relocation if it survives value
/// finalization: anything not defined by an EQU expression.
fn reloc_sym(object: &Object, sym: SymbolRef) -> Option<SymbolRef> {
    match object.sym(sym).def() {
        SymbolDef::Equ(_) => None,
        _ => Some(sym),
    }
}

fn is_label_pair(object: &Object, lhs: &ExprTerm, rhs: &ExprTerm) -> bool {
    let (Some(to), Some(from)) = (term_location(object, lhs), term_location(object, rhs)) else {
        return false;
    };
    from.bc.section == to.bc.section
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self.op {
            Op::Ident => "",
            Op::Neg => "-",
            Op::Not => "~",
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Mod => "%",
            Op::Shl => "<<",
            Op::Shr => ">>",
            Op::And => "&",
            Op::Or => "|",
            Op::Xor => "^",
        };
        if matches!(self.op, Op::Neg | Op::Not) {
            write!(f, "{symbol}")?;
        }
        write!(f, "(")?;
        for (index, term) in self.terms.iter().enumerate() {
            if index > 0 {
                write!(f, " {symbol} ")?;
            }
            match term {
                ExprTerm::Int(value) => write!(f, "{value}")?,
                ExprTerm::Float(value) => write!(f, "{value}")?,
                ExprTerm::Reg(reg) => write!(f, "reg{reg}")?,
                ExprTerm::Sym(sym) => write!(f, "sym#{}", sym.0)?,
                ExprTerm::Loc(loc) => {
                    write!(f, "loc({}:{}+{})", loc.bc.section, loc.bc.pos, loc.off)?
                }
                ExprTerm::Subst(index) => write!(f, "subst#{index}")?,
                ExprTerm::Expr(inner) => write!(f, "{inner}")?,
            }
        }
        write!(f, ")")
    }
}
