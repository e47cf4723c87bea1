//! The polymorphic tail of a bytecode, as a closed tagged variant. Each
//! kind implements the same operation bundle; `Contents` dispatches.

mod align;
mod data;
mod gap;
mod incbin;
mod insn;
mod leb128;
mod multiple;
mod org;

pub use align::AlignContents;
pub use data::{DataContents, DataItem};
pub use gap::GapContents;
pub use incbin::{BinaryFS, IncbinContents, StdBinaryFS};
pub use insn::InsnContents;
pub use leb128::{encode_leb128, size_leb128, Leb128Contents};
pub use multiple::MultipleContents;
pub use org::OrgContents;

use crate::bytecode::BcId;
use crate::errwarns::CoreError;
use crate::object::Object;
use crate::output::OutputContext;
use crate::value::Value;

/// Special bytecode classifications. `OffsetSetter` marks bytecodes that
/// move subsequent offsets independently of their own content (align/org)
/// and get dedicated handling in the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialKind {
    None,
    OffsetSetter,
}

/// Result of expanding a bytecode for a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expansion {
    /// The bytecode no longer depends on this span.
    Done,
    /// Still span-dependent, with fresh thresholds.
    Dependent { neg_thres: i64, pos_thres: i64 },
}

/// A span registration emitted by `calc_len`: the bytecode's tail may
/// grow if the signed distance described by `value` leaves
/// `[neg_thres, pos_thres]`. `id > 0` is threshold-triggered; `id <= 0`
/// recomputes on any change, with `id == 0` reserved for repeat counts.
#[derive(Debug, Clone)]
pub struct SpanRequest {
    pub id: i32,
    pub value: Value,
    pub neg_thres: i64,
    pub pos_thres: i64,
}

#[derive(Debug, Clone)]
pub enum Contents {
    Data(DataContents),
    Gap(GapContents),
    Align(AlignContents),
    Org(OrgContents),
    Multiple(MultipleContents),
    Incbin(IncbinContents),
    Leb128(Leb128Contents),
    Insn(InsnContents),
}

impl Contents {
    /// Finalize after parsing: simplify stored expressions and reject
    /// shapes that can never be emitted, so errors land on the defining
    /// line.
    pub fn finalize(&mut self, object: &Object, line: u64) -> Result<(), CoreError> {
        match self {
            Contents::Data(data) => data.finalize(object),
            Contents::Multiple(multiple) => multiple.finalize(object, line),
            Contents::Leb128(leb) => leb.finalize(object),
            Contents::Insn(insn) => insn.finalize(object),
            Contents::Gap(_) | Contents::Align(_) | Contents::Org(_) | Contents::Incbin(_) => {
                Ok(())
            }
        }
    }

    /// Minimum tail length under the shortest-form assumption, registering
    /// spans for anything that could grow.
    pub fn calc_len(
        &mut self,
        object: &Object,
        bc: BcId,
        add_span: &mut dyn FnMut(SpanRequest),
    ) -> Result<u64, CoreError> {
        match self {
            Contents::Data(data) => Ok(data.calc_len()),
            Contents::Gap(gap) => Ok(gap.size()),
            Contents::Align(align) => Ok(align.pad_at(object.bytecode(bc).tail_offset())),
            Contents::Org(org) => org.tail_at(object.bytecode(bc).tail_offset()),
            Contents::Multiple(multiple) => multiple.calc_len(object, bc, add_span),
            Contents::Incbin(incbin) => Ok(incbin.len()),
            Contents::Leb128(leb) => leb.calc_len(object),
            Contents::Insn(insn) => insn.calc_len(object, bc, add_span),
        }
    }

    /// Recompute the tail for a span that left its thresholds (or, for
    /// offset-setters, for a moved offset). Only kinds that register
    /// spans or set offsets may be asked to expand.
    pub fn expand(
        &mut self,
        fixed_len: u64,
        span: i32,
        old_val: i64,
        new_val: i64,
    ) -> Result<(u64, Expansion), CoreError> {
        match self {
            Contents::Align(align) => Ok(align.expand(fixed_len, new_val)),
            Contents::Org(org) => org.expand(fixed_len, new_val),
            Contents::Multiple(multiple) => multiple.expand(span, new_val),
            Contents::Insn(insn) => insn.expand(span, old_val, new_val),
            Contents::Data(_) | Contents::Gap(_) | Contents::Incbin(_) | Contents::Leb128(_) => {
                Err(CoreError::Internal(
                    "expansion requested for a fixed-length bytecode".into(),
                ))
            }
        }
    }

    /// Write the tail bytes, recording relocations for anything still
    /// symbolic. Offsets and lengths are final by the time this runs.
    pub fn output(
        &self,
        object: &Object,
        bc: BcId,
        ctx: &mut OutputContext<'_>,
    ) -> Result<(), CoreError> {
        match self {
            Contents::Data(data) => data.output(object, ctx),
            Contents::Gap(gap) => ctx.write_gap(gap.size()),
            Contents::Align(align) => align.output(object.bytecode(bc).tail_len(), ctx),
            Contents::Org(org) => org.output(object.bytecode(bc).tail_len(), ctx),
            Contents::Multiple(multiple) => multiple.output(object, ctx),
            Contents::Incbin(incbin) => ctx.write_bytes(incbin.data()),
            Contents::Leb128(leb) => leb.output(object, ctx),
            Contents::Insn(insn) => insn.output(object, bc, ctx),
        }
    }

    pub fn special_kind(&self) -> SpecialKind {
        match self {
            Contents::Align(_) | Contents::Org(_) => SpecialKind::OffsetSetter,
            _ => SpecialKind::None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Contents::Data(_) => "data",
            Contents::Gap(_) => "gap",
            Contents::Align(_) => "align",
            Contents::Org(_) => "org",
            Contents::Multiple(_) => "multiple",
            Contents::Incbin(_) => "incbin",
            Contents::Leb128(_) => "leb128",
            Contents::Insn(_) => "insn",
        }
    }

    /// Whether outputting this tail into a reserve-only section would
    /// discard initialized bytes.
    pub fn is_initialized(&self) -> bool {
        !matches!(self, Contents::Gap(_))
    }
}
