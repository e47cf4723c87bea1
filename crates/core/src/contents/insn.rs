use obelisk_num::{Bytes, IntNum, SizeCheck};

use crate::bytecode::{BcId, Location};
use crate::contents::{Expansion, SpanRequest};
use crate::errwarns::CoreError;
use crate::expr::{Expr, ExprTerm, Op};
use crate::object::Object;
use crate::output::OutputContext;
use crate::value::Value;

/// A span-dependent instruction: an opcode with a short form whose
/// operand is the IP-relative distance to a target, and a long form to
/// fall back to when the distance leaves the short range. Fixed-form
/// instructions do not need a tail at all; their bytes go in the
/// bytecode head.
///
/// Architecture encoders build these; the core only resolves which form
/// survives.
#[derive(Debug, Clone)]
pub struct InsnContents {
    short_opcode: Vec<u8>,
    short_size: u32,
    neg_thres: i64,
    pos_thres: i64,
    long_opcode: Vec<u8>,
    long_size: u32,
    target: Expr,
    long_form: bool,
}

impl InsnContents {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        short_opcode: Vec<u8>,
        short_size: u32,
        neg_thres: i64,
        pos_thres: i64,
        long_opcode: Vec<u8>,
        long_size: u32,
        target: Expr,
    ) -> Self {
        Self {
            short_opcode,
            short_size,
            neg_thres,
            pos_thres,
            long_opcode,
            long_size,
            target,
            long_form: false,
        }
    }

    pub fn is_long_form(&self) -> bool {
        self.long_form
    }

    pub fn target(&self) -> &Expr {
        &self.target
    }

    fn short_len(&self) -> u64 {
        self.short_opcode.len() as u64 + u64::from(self.short_size / 8)
    }

    fn long_len(&self) -> u64 {
        self.long_opcode.len() as u64 + u64::from(self.long_size / 8)
    }

    pub(crate) fn finalize(&mut self, object: &Object) -> Result<(), CoreError> {
        self.target.simplify(object, false);
        if self.target.contains_reg() {
            return Err(CoreError::Type("register used as a branch target".into()));
        }
        Ok(())
    }

    pub(crate) fn calc_len(
        &mut self,
        object: &Object,
        bc: BcId,
        add_span: &mut dyn FnMut(SpanRequest),
    ) -> Result<u64, CoreError> {
        if self.long_form {
            return Ok(self.long_len());
        }

        // Watch the distance from the start of the instruction (= start
        // of the tail) to the target; the caller's end-relative
        // thresholds shift by the short length accordingly. Anything
        // that does not reduce to a same-section difference forces the
        // long form during the first expansion sweep.
        let here = Location {
            bc,
            off: object.bytecode(bc).fixed_len(),
        };
        let dist = Expr::sub(self.target.clone(), Expr::loc(here));
        let mut value = Value::from_expr(self.short_size, dist);
        value.ip_rel = true;
        value.jump_target = true;
        value.signed = true;
        let short_len = self.short_len() as i64;
        add_span(SpanRequest {
            id: 1,
            value,
            neg_thres: self.neg_thres.saturating_add(short_len),
            pos_thres: self.pos_thres.saturating_add(short_len),
        });
        Ok(self.short_len())
    }

    pub(crate) fn expand(
        &mut self,
        span: i32,
        _old_val: i64,
        _new_val: i64,
    ) -> Result<(u64, Expansion), CoreError> {
        if span != 1 {
            return Err(CoreError::Internal(format!(
                "unexpected span {span} for an instruction bytecode"
            )));
        }
        self.long_form = true;
        Ok((self.long_len(), Expansion::Done))
    }

    pub(crate) fn output(
        &self,
        object: &Object,
        bc: BcId,
        ctx: &mut OutputContext<'_>,
    ) -> Result<(), CoreError> {
        let next_offset = object.bytecode(bc).next_offset();
        let (opcode, operand_size) = if self.long_form {
            (&self.long_opcode, self.long_size)
        } else {
            (&self.short_opcode, self.short_size)
        };
        ctx.write_bytes(opcode)?;

        let mut target = self.target.clone();
        target.simplify(object, true);
        match target.get_intnum() {
            Some(resolved) => {
                let delta = IntNum::from_i128(resolved.as_i128() - i128::from(next_offset));
                if !delta.fits(operand_size, SizeCheck::Signed) {
                    return Err(CoreError::Value("jump target out of range".into()));
                }
                let mut operand = Bytes::new(ctx.big_endian);
                operand.write_intnum(delta, operand_size, SizeCheck::None)?;
                ctx.write_bytes(operand.as_slice())
            }
            None => {
                // Unresolvable target: emit a relocation on the operand
                // field and leave zeros behind.
                if let (Op::Ident, [ExprTerm::Sym(sym)]) = (target.op(), target.terms()) {
                    ctx.add_reloc(*sym);
                    let zeros = vec![0u8; (operand_size / 8) as usize];
                    ctx.write_bytes(&zeros)
                } else {
                    Err(CoreError::NotConstant(
                        "branch target cannot be resolved".into(),
                    ))
                }
            }
        }
    }
}
