use crate::bytecode::{BcId, Bytecode};
use crate::contents::{Expansion, SpanRequest};
use crate::errwarns::CoreError;
use crate::expr::Expr;
use crate::object::Object;
use crate::output::OutputContext;
use crate::value::Value;

/// Repetition wrapping an inner bytecode. A constant count multiplies in
/// directly; a count that still depends on layout registers the reserved
/// id-0 span and starts from zero (the shortest-form assumption).
///
/// The inner bytecode must be fixed-length: a tail that would itself
/// register spans cannot be combined with replication.
#[derive(Debug, Clone)]
pub struct MultipleContents {
    count: Expr,
    inner: Box<Bytecode>,
    resolved_count: u64,
}

impl MultipleContents {
    pub fn new(count: Expr, inner: Bytecode) -> Self {
        Self {
            count,
            inner: Box::new(inner),
            resolved_count: 0,
        }
    }

    pub fn count_expr(&self) -> &Expr {
        &self.count
    }

    pub fn inner(&self) -> &Bytecode {
        &self.inner
    }

    pub(crate) fn finalize(&mut self, object: &Object, line: u64) -> Result<(), CoreError> {
        self.count.simplify(object, false);
        if self.count.contains_reg() {
            return Err(CoreError::Type("register used as repeat count".into()));
        }
        if !self.inner.fixups().is_empty() {
            return Err(CoreError::TooComplex(
                "deferred values cannot appear in repeated data".into(),
            ));
        }
        if let Some(contents) = &mut self.inner.contents {
            if matches!(
                contents,
                super::Contents::Align(_)
                    | super::Contents::Org(_)
                    | super::Contents::Multiple(_)
                    | super::Contents::Insn(_)
            ) {
                return Err(CoreError::Value(format!(
                    "{} cannot be combined with repetition",
                    contents.kind_name()
                )));
            }
            contents.finalize(object, line)?;
        }
        Ok(())
    }

    pub(crate) fn calc_len(
        &mut self,
        object: &Object,
        bc: BcId,
        add_span: &mut dyn FnMut(SpanRequest),
    ) -> Result<u64, CoreError> {
        // Size the inner bytecode first; it may not be span-dependent.
        if let Some(contents) = &mut self.inner.contents {
            let mut inner_spans = 0usize;
            let inner_tail = contents.calc_len(object, bc, &mut |_request| inner_spans += 1)?;
            if inner_spans > 0 {
                return Err(CoreError::TooComplex(
                    "span-dependent bytecode cannot be repeated".into(),
                ));
            }
            self.inner.set_tail_len(inner_tail);
        }

        let mut count = self.count.clone();
        count.simplify(object, false);
        match count.get_intnum() {
            Some(value) => {
                let count = value
                    .to_u64()
                    .ok_or_else(|| CoreError::Value("repeat count cannot be negative".into()))?;
                self.resolved_count = count;
                Ok(count * self.inner.total_len())
            }
            None => {
                add_span(SpanRequest {
                    id: 0,
                    value: Value::from_expr(32, self.count.clone()),
                    neg_thres: 0,
                    pos_thres: 0,
                });
                self.resolved_count = 0;
                Ok(0)
            }
        }
    }

    pub(crate) fn expand(
        &mut self,
        span: i32,
        new_val: i64,
    ) -> Result<(u64, Expansion), CoreError> {
        if span != 0 {
            return Err(CoreError::Internal(format!(
                "unexpected span {span} for a repeat bytecode"
            )));
        }
        if new_val < 0 {
            return Err(CoreError::Value("repeat count cannot be negative".into()));
        }
        self.resolved_count = new_val as u64;
        Ok((
            self.resolved_count * self.inner.total_len(),
            Expansion::Dependent {
                neg_thres: i64::MIN,
                pos_thres: i64::MAX,
            },
        ))
    }

    pub(crate) fn output(
        &self,
        object: &Object,
        ctx: &mut OutputContext<'_>,
    ) -> Result<(), CoreError> {
        for _ in 0..self.resolved_count {
            if !self.inner.fixed().is_empty() {
                ctx.write_bytes(self.inner.fixed())?;
            }
            if let Some(contents) = self.inner.contents() {
                contents.output(object, BcId { section: 0, pos: 0 }, ctx)?;
            }
        }
        Ok(())
    }
}
