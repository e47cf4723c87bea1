pub mod bytecode;
pub mod contents;
pub mod directive;
pub mod dump;
pub mod errwarns;
pub mod expr;
mod itree;
pub mod object;
mod optimize;
pub mod output;
pub mod section;
pub mod symbol;
pub mod value;

pub use bytecode::{BcId, Bytecode, Fixup, Location, UNKNOWN_INDEX, UNKNOWN_OFFSET};
pub use contents::{
    AlignContents, BinaryFS, Contents, DataContents, DataItem, Expansion, GapContents,
    IncbinContents, InsnContents, Leb128Contents, MultipleContents, OrgContents, SpanRequest,
    SpecialKind, StdBinaryFS,
};
pub use directive::{CommonSize, DirArg, DirClass, DirHandler, Directives};
pub use errwarns::{CoreError, Errwarns, WarnKind};
pub use expr::{Expr, ExprTerm, Op};
pub use object::{Arch, Object, SymbolCase};
pub use output::{output_object, output_section, BytecodeSink, OutputContext, VecSink};
pub use section::{Reloc, Section};
pub use symbol::{AssocData, Symbol, SymbolDef, SymbolRef, SymbolStatus, Visibility};
pub use value::Value;

#[cfg(test)]
mod tests;
