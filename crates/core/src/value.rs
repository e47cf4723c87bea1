use obelisk_num::{IntNum, SizeCheck};

use crate::errwarns::CoreError;
use crate::expr::Expr;
use crate::object::Object;
use crate::symbol::SymbolRef;

/// A dependent-expression descriptor: the deferred operand of a fixup or
/// the distance a span watches. Carries an absolute expression portion and
/// at most one relative (relocation-worthy) symbol, split apart by
/// [`Value::finalize`].
#[derive(Debug, Clone, Default)]
pub struct Value {
    pub abs: Option<Expr>,
    pub rel: Option<SymbolRef>,
    /// Emit the segment of the relative symbol rather than its offset.
    pub seg_of: bool,
    /// The relative portion is resolved against its section base.
    pub section_rel: bool,
    /// Subtract the position of the value's own site before emission.
    pub ip_rel: bool,
    /// The value is a branch target (object formats may treat these
    /// relocations specially).
    pub jump_target: bool,
    /// Suppress truncation warnings on emission.
    pub no_warn: bool,
    /// Warn using the signed rather than unsigned range.
    pub signed: bool,
    /// Size of the emitted field in bits.
    pub size: u32,
    /// Left bit-shift applied on emission.
    pub shift: u32,
}

impl Value {
    pub fn new(size: u32) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    pub fn from_expr(size: u32, expr: Expr) -> Self {
        Self {
            abs: Some(expr),
            ..Self::new(size)
        }
    }

    pub fn from_sym(size: u32, sym: SymbolRef) -> Self {
        Self {
            abs: Some(Expr::sym(sym)),
            ..Self::new(size)
        }
    }

    /// Width in bytes of the field this value patches.
    pub fn field_width(&self) -> u64 {
        u64::from((self.shift + self.size).div_ceil(8))
    }

    pub fn is_relative(&self) -> bool {
        self.rel.is_some()
    }

    pub fn size_check(&self) -> SizeCheck {
        if self.no_warn {
            SizeCheck::None
        } else if self.signed {
            SizeCheck::Signed
        } else {
            SizeCheck::Unsigned
        }
    }

    /// Simplify the absolute portion and split a single relocation-worthy
    /// symbol out into `rel`. Values that reference registers, or more
    /// symbolic state than one relocation can carry, are rejected here so
    /// the error lands on the line that created the value.
    pub fn finalize(&mut self, object: &Object) -> Result<(), CoreError> {
        let Some(abs) = &mut self.abs else {
            return Ok(());
        };

        abs.simplify(object, false);
        if abs.contains_reg() {
            return Err(CoreError::Type("register used in data value".into()));
        }

        let rel = abs.extract_rel_sym(object)?;
        if let Some(rel) = rel {
            if self.rel.is_some() {
                return Err(CoreError::TooComplex(
                    "multiple external references in one value".into(),
                ));
            }
            self.rel = Some(rel);
        }
        if abs.get_intnum().is_some_and(|value| value.is_zero()) && self.rel.is_some() {
            self.abs = None;
        }
        Ok(())
    }

    /// Evaluate the absolute portion. `resolve_locations` resolves label
    /// and location terms against current bytecode offsets (meaningful
    /// only once the optimizer has placed them).
    pub fn get_intnum(&self, object: &Object, resolve_locations: bool) -> Option<IntNum> {
        match &self.abs {
            None => Some(IntNum::ZERO),
            Some(abs) => {
                let mut expr = abs.clone();
                expr.simplify(object, resolve_locations);
                expr.get_intnum()
            }
        }
    }
}
