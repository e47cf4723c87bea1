use obelisk_num::IntNum;

use crate::errwarns::CoreError;
use crate::expr::Expr;
use crate::object::Object;
use crate::output::OutputContext;

/// LEB128-encoded integer. The encoded width depends on the value, so the
/// value must be constant by the time lengths are calculated.
#[derive(Debug, Clone)]
pub struct Leb128Contents {
    value: Expr,
    signed: bool,
}

impl Leb128Contents {
    pub fn new(value: Expr, signed: bool) -> Self {
        Self { value, signed }
    }

    pub(crate) fn finalize(&mut self, object: &Object) -> Result<(), CoreError> {
        self.value.simplify(object, false);
        Ok(())
    }

    fn eval(&self, object: &Object) -> Result<i128, CoreError> {
        let mut expr = self.value.clone();
        expr.simplify(object, false);
        let value = expr
            .get_intnum()
            .ok_or_else(|| CoreError::NotConstant("LEB128 value must be constant".into()))?;
        if !self.signed && value.is_negative() {
            return Err(CoreError::Value(
                "unsigned LEB128 value cannot be negative".into(),
            ));
        }
        Ok(value.as_i128())
    }

    pub(crate) fn calc_len(&self, object: &Object) -> Result<u64, CoreError> {
        Ok(size_leb128(self.eval(object)?, self.signed))
    }

    pub(crate) fn output(
        &self,
        object: &Object,
        ctx: &mut OutputContext<'_>,
    ) -> Result<(), CoreError> {
        let encoded = encode_leb128(self.eval(object)?, self.signed);
        ctx.write_bytes(&encoded)
    }
}

/// Number of bytes `value` occupies in LEB128 form.
pub fn size_leb128(value: i128, signed: bool) -> u64 {
    encode_leb128(value, signed).len() as u64
}

pub fn encode_leb128(value: i128, signed: bool) -> Vec<u8> {
    let mut out = Vec::new();
    if signed {
        let mut value = value;
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            let sign_clear = byte & 0x40 == 0;
            if (value == 0 && sign_clear) || (value == -1 && !sign_clear) {
                out.push(byte);
                break;
            }
            out.push(byte | 0x80);
        }
    } else {
        let mut value = value as u128;
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                out.push(byte);
                break;
            }
            out.push(byte | 0x80);
        }
    }
    out
}

/// Convenience wrapper for callers holding an [`IntNum`].
pub fn intnum_size_leb128(value: IntNum, signed: bool) -> u64 {
    size_leb128(value.as_i128(), signed)
}
