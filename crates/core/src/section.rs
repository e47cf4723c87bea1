use std::any::Any;

use rustc_hash::FxHashMap;

use crate::bytecode::Bytecode;
use crate::contents::{Contents, GapContents};
use crate::expr::Expr;
use crate::symbol::{AssocData, SymbolRef};

/// A relocation recorded while resolving fixups and tails: the field at
/// `addr` (section-relative) still refers to `sym` and must be patched by
/// the object writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reloc {
    pub addr: u64,
    pub sym: SymbolRef,
}

/// An ordered run of bytecodes plus its placement attributes.
///
/// The container always holds at least one bytecode: an empty head
/// sentinel, so label definitions and neighbour walks never need a null
/// check for "before the first bytecode".
#[derive(Debug)]
pub struct Section {
    name: String,
    start: Expr,
    align: u64,
    code: bool,
    bss: bool,
    default_defined: bool,
    big_endian: bool,
    bcs: Vec<Bytecode>,
    last_gap: bool,
    relocs: Vec<Reloc>,
    assoc: FxHashMap<&'static str, Box<dyn AssocData>>,
}

impl Section {
    /// `align` is a power of two, or zero for no constraint.
    pub fn new(
        name: impl Into<String>,
        start: Option<Expr>,
        align: u64,
        code: bool,
        bss: bool,
        big_endian: bool,
        line: u64,
    ) -> Self {
        debug_assert!(align == 0 || align.is_power_of_two());
        Self {
            name: name.into(),
            start: start.unwrap_or_else(|| Expr::int(0)),
            align,
            code,
            bss,
            default_defined: false,
            big_endian,
            bcs: vec![Bytecode::empty(big_endian, line)],
            last_gap: false,
            relocs: Vec::new(),
            assoc: FxHashMap::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_name(&self, name: &str) -> bool {
        self.name == name
    }

    pub fn start(&self) -> &Expr {
        &self.start
    }

    pub fn set_start(&mut self, start: Expr) {
        self.start = start;
    }

    pub fn align(&self) -> u64 {
        self.align
    }

    pub fn set_align(&mut self, align: u64) {
        debug_assert!(align == 0 || align.is_power_of_two());
        self.align = align;
    }

    pub fn is_code(&self) -> bool {
        self.code
    }

    /// Reserve-only ("nobits") sections carry no initialized data in the
    /// output image.
    pub fn is_bss(&self) -> bool {
        self.bss
    }

    /// Whether the section was created with default attributes and never
    /// explicitly declared.
    pub fn is_default_defined(&self) -> bool {
        self.default_defined
    }

    pub fn set_default_defined(&mut self, default_defined: bool) {
        self.default_defined = default_defined;
    }

    pub fn big_endian(&self) -> bool {
        self.big_endian
    }

    pub fn bytecodes(&self) -> &[Bytecode] {
        &self.bcs
    }

    pub fn bc(&self, pos: u32) -> &Bytecode {
        &self.bcs[pos as usize]
    }

    pub(crate) fn bc_mut(&mut self, pos: u32) -> &mut Bytecode {
        &mut self.bcs[pos as usize]
    }

    /// Position of the last bytecode in the container.
    pub fn last_pos(&self) -> u32 {
        (self.bcs.len() - 1) as u32
    }

    /// Append a fully-formed bytecode, returning its container position.
    pub fn append_bytecode(&mut self, bc: Bytecode) -> u32 {
        self.bcs.push(bc);
        self.last_gap = false;
        self.last_pos()
    }

    /// Append a fresh tailless bytecode and return its position.
    pub fn start_bytecode(&mut self, line: u64) -> u32 {
        self.append_bytecode(Bytecode::empty(self.big_endian, line))
    }

    /// The current bytecode if it can still take fixed bytes (it has no
    /// tail yet), otherwise a newly started one. Keeps appending fixed
    /// data cheap for front-ends.
    pub fn fresh_bytecode(&mut self, line: u64) -> &mut Bytecode {
        if self.bcs.last().expect("container is never empty").has_contents() {
            self.start_bytecode(line);
        }
        self.last_gap = false;
        self.bcs.last_mut().expect("container is never empty")
    }

    /// Append uninitialized space. Adjacent gaps coalesce into one
    /// bytecode.
    pub fn append_gap(&mut self, size: u64, line: u64) {
        if self.last_gap
            && let Some(Contents::Gap(gap)) =
                &mut self.bcs.last_mut().expect("container is never empty").contents
        {
            gap.extend(size);
            return;
        }
        let bc = self.fresh_bytecode(line);
        bc.transform(Contents::Gap(GapContents::new(size)));
        bc.set_line(line);
        self.last_gap = true;
    }

    pub fn relocs(&self) -> &[Reloc] {
        &self.relocs
    }

    pub(crate) fn add_relocs(&mut self, relocs: impl IntoIterator<Item = Reloc>) {
        self.relocs.extend(relocs);
    }

    /// Format-specific side data, keyed the same way as on symbols.
    pub fn set_assoc_data<T: AssocData>(&mut self, key: &'static str, data: T) {
        self.assoc.insert(key, Box::new(data));
    }

    pub fn assoc_data<T: AssocData>(&self, key: &'static str) -> Option<&T> {
        let data = self.assoc.get(key)?;
        (data.as_ref() as &dyn Any).downcast_ref::<T>()
    }
}
