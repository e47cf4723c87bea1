use obelisk_num::Bytes;

use crate::contents::Contents;
use crate::symbol::SymbolRef;
use crate::value::Value;

/// Offset sentinel for bytecodes the optimizer has not placed yet.
pub const UNKNOWN_OFFSET: u64 = u64::MAX;

/// Index sentinel for bytecodes the optimizer has not numbered yet.
pub const UNKNOWN_INDEX: u32 = u32::MAX;

/// Address of a bytecode within its section's container:
/// `(section index, position in container)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BcId {
    pub section: u32,
    pub pos: u32,
}

/// A position inside a section, named relative to a bytecode: the
/// bytecode's offset plus `off` bytes into its fixed data.
///
/// `off` never reaches into the tail, so a location stays correct as the
/// tail grows during optimization; fixed data cannot grow once the
/// optimizer starts. Use [`Object::end_location`] to name "here" while
/// building a section — it closes the current bytecode if it already has
/// a tail. The head sentinel bytecode anchors positions at the very start
/// of a section.
///
/// [`Object::end_location`]: crate::object::Object::end_location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub bc: BcId,
    pub off: u64,
}

impl Location {
    pub fn start_of(bc: BcId) -> Self {
        Self { bc, off: 0 }
    }
}

/// Deferred write of an expression-computed value into a bytecode's fixed
/// bytes. Zero placeholders occupy the field until the optimizer settles
/// offsets and the output pass patches them.
#[derive(Debug, Clone)]
pub struct Fixup {
    off: u32,
    value: Value,
}

impl Fixup {
    pub fn new(off: u32, value: Value) -> Self {
        Self { off, value }
    }

    pub fn off(&self) -> u32 {
        self.off
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub(crate) fn value_mut(&mut self) -> &mut Value {
        &mut self.value
    }
}

/// One addressable assembler unit: a fixed-length head of raw bytes plus
/// deferred fixups, and an optional variable-length tail whose behavior
/// lives in [`Contents`].
///
/// Fixed data is mutated only during parsing and finalization; `offset`,
/// `tail_len`, and `index` are the optimizer's to write.
#[derive(Debug, Clone)]
pub struct Bytecode {
    fixed: Bytes,
    fixups: Vec<Fixup>,
    pub(crate) contents: Option<Contents>,
    line: u64,
    offset: u64,
    index: u32,
    tail_len: u64,
    frozen_fixed_len: Option<u64>,
    symbols: Vec<SymbolRef>,
}

impl Bytecode {
    pub fn empty(big_endian: bool, line: u64) -> Self {
        Self {
            fixed: Bytes::new(big_endian),
            fixups: Vec::new(),
            contents: None,
            line,
            offset: UNKNOWN_OFFSET,
            index: UNKNOWN_INDEX,
            tail_len: 0,
            frozen_fixed_len: None,
            symbols: Vec::new(),
        }
    }

    pub fn with_contents(contents: Contents, big_endian: bool, line: u64) -> Self {
        Self {
            contents: Some(contents),
            ..Self::empty(big_endian, line)
        }
    }

    pub fn has_contents(&self) -> bool {
        self.contents.is_some()
    }

    pub fn contents(&self) -> Option<&Contents> {
        self.contents.as_ref()
    }

    /// Give a tailless bytecode a tail.
    pub fn transform(&mut self, contents: Contents) {
        debug_assert!(self.contents.is_none(), "bytecode already has contents");
        self.contents = Some(contents);
    }

    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn set_line(&mut self, line: u64) {
        self.line = line;
    }

    /// Offset within the section. Valid only after optimization; holds
    /// [`UNKNOWN_OFFSET`] before that.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub(crate) fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    /// Unique monotonic index assigned in optimizer step 1a.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub(crate) fn set_index(&mut self, index: u32) {
        self.index = index;
    }

    pub fn fixed(&self) -> &Bytes {
        &self.fixed
    }

    pub(crate) fn fixed_mut(&mut self) -> &mut Bytes {
        &mut self.fixed
    }

    pub fn fixed_len(&self) -> u64 {
        self.fixed.len() as u64
    }

    /// Tail length in bytes. Valid only after optimization.
    pub fn tail_len(&self) -> u64 {
        self.tail_len
    }

    pub(crate) fn set_tail_len(&mut self, tail_len: u64) {
        self.tail_len = tail_len;
    }

    pub fn total_len(&self) -> u64 {
        self.fixed_len() + self.tail_len
    }

    /// Offset of the bytecode that would follow this one.
    pub fn next_offset(&self) -> u64 {
        self.offset + self.total_len()
    }

    /// Offset where the tail starts.
    pub fn tail_offset(&self) -> u64 {
        self.offset + self.fixed_len()
    }

    pub fn append_fixed_bytes(&mut self, bytes: &[u8]) {
        debug_assert!(self.frozen_fixed_len.is_none(), "fixed data frozen by optimizer");
        self.fixed.extend_from_slice(bytes);
    }

    /// Append a deferred value: zero placeholders now, a fixup patched in
    /// after optimization.
    pub fn append_fixed(&mut self, value: Value) {
        debug_assert!(self.frozen_fixed_len.is_none(), "fixed data frozen by optimizer");
        let off = self.fixed.len() as u32;
        let width = value.field_width() as usize;
        self.fixed.resize(self.fixed.len() + width, 0);
        self.fixups.push(Fixup::new(off, value));
    }

    pub fn append_fixed_expr(&mut self, size_bits: u32, expr: crate::expr::Expr) {
        self.append_fixed(Value::from_expr(size_bits, expr));
    }

    pub fn fixups(&self) -> &[Fixup] {
        &self.fixups
    }

    pub(crate) fn fixups_mut(&mut self) -> &mut Vec<Fixup> {
        &mut self.fixups
    }

    /// Record a label symbol pointing at this bytecode.
    pub fn add_symbol(&mut self, sym: SymbolRef) {
        self.symbols.push(sym);
    }

    pub fn symbols(&self) -> &[SymbolRef] {
        &self.symbols
    }

    /// Snapshot the fixed length at optimizer step 1a; later growth of the
    /// fixed portion is a caller bug.
    pub(crate) fn freeze_fixed_len(&mut self) {
        self.frozen_fixed_len = Some(self.fixed_len());
    }

    pub(crate) fn check_fixed_len_frozen(&self) -> bool {
        self.frozen_fixed_len.is_none_or(|frozen| frozen == self.fixed_len())
    }
}
