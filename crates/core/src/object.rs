use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::bytecode::{BcId, Bytecode, Location, UNKNOWN_OFFSET};
use crate::contents::{Expansion, SpanRequest, SpecialKind};
use crate::errwarns::{CoreError, Errwarns, WarnKind};
use crate::expr::Expr;
use crate::section::Section;
use crate::symbol::{Symbol, SymbolDef, SymbolRef, SymbolStatus, Visibility};

/// Architecture descriptor. Opaque to the core apart from the byte order
/// it imposes on emitted fields.
#[derive(Debug, Clone)]
pub struct Arch {
    pub keyword: String,
    pub wordsize: u32,
    pub big_endian: bool,
}

impl Arch {
    pub fn new(keyword: impl Into<String>, wordsize: u32, big_endian: bool) -> Self {
        Self {
            keyword: keyword.into(),
            wordsize,
            big_endian,
        }
    }
}

/// Name lookup policy for the symbol table, fixed at object construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolCase {
    Sensitive,
    Insensitive,
}

/// An object being assembled: ordered sections, a symbol arena with two
/// keyed indices, and the architecture the front-end selected.
///
/// Every symbol in the main index is also in the ordered sequence; the
/// special index is disjoint from both. Non-table symbols live in the
/// arena but in no index and no sequence.
#[derive(Debug)]
pub struct Object {
    src_filename: String,
    obj_filename: String,
    arch: Arch,
    sections: Vec<Section>,
    symbols: Vec<Symbol>,
    symbol_order: Vec<SymbolRef>,
    symbol_index: IndexMap<String, SymbolRef>,
    special_index: FxHashMap<String, SymbolRef>,
    case: SymbolCase,
}

impl Object {
    pub fn new(
        src_filename: impl Into<String>,
        obj_filename: impl Into<String>,
        arch: Arch,
        case: SymbolCase,
    ) -> Self {
        Self {
            src_filename: src_filename.into(),
            obj_filename: obj_filename.into(),
            arch,
            sections: Vec::new(),
            symbols: Vec::new(),
            symbol_order: Vec::new(),
            symbol_index: IndexMap::new(),
            special_index: FxHashMap::default(),
            case,
        }
    }

    pub fn src_filename(&self) -> &str {
        &self.src_filename
    }

    pub fn obj_filename(&self) -> &str {
        &self.obj_filename
    }

    pub fn set_obj_filename(&mut self, obj_filename: impl Into<String>) {
        self.obj_filename = obj_filename.into();
    }

    pub fn arch(&self) -> &Arch {
        &self.arch
    }

    pub fn symbol_case(&self) -> SymbolCase {
        self.case
    }

    /// Convenience for building sections with the object's byte order.
    pub fn new_section(
        &mut self,
        name: impl Into<String>,
        start: Option<Expr>,
        align: u64,
        code: bool,
        bss: bool,
        line: u64,
    ) -> u32 {
        let big_endian = self.arch.big_endian;
        self.append_section(Section::new(name, start, align, code, bss, big_endian, line))
    }

    pub fn append_section(&mut self, section: Section) -> u32 {
        self.sections.push(section);
        (self.sections.len() - 1) as u32
    }

    pub fn find_section(&self, name: &str) -> Option<u32> {
        self.sections
            .iter()
            .position(|section| section.is_name(name))
            .map(|index| index as u32)
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, index: u32) -> &Section {
        &self.sections[index as usize]
    }

    pub fn section_mut(&mut self, index: u32) -> &mut Section {
        &mut self.sections[index as usize]
    }

    pub fn bytecode(&self, id: BcId) -> &Bytecode {
        self.sections[id.section as usize].bc(id.pos)
    }

    pub(crate) fn bytecode_mut(&mut self, id: BcId) -> &mut Bytecode {
        self.sections[id.section as usize].bc_mut(id.pos)
    }

    fn fold_name(&self, name: &str) -> String {
        match self.case {
            SymbolCase::Sensitive => name.to_string(),
            SymbolCase::Insensitive => name.to_ascii_lowercase(),
        }
    }

    fn alloc_symbol(&mut self, name: impl Into<String>) -> SymbolRef {
        let sym = SymbolRef(self.symbols.len() as u32);
        self.symbols.push(Symbol::new(name));
        sym
    }

    pub fn sym(&self, sym: SymbolRef) -> &Symbol {
        &self.symbols[sym.0 as usize]
    }

    pub fn sym_mut(&mut self, sym: SymbolRef) -> &mut Symbol {
        &mut self.symbols[sym.0 as usize]
    }

    /// Symbols in insertion order (table symbols plus plain appends;
    /// non-table and special symbols are excluded).
    pub fn symbols_ordered(&self) -> impl Iterator<Item = (SymbolRef, &Symbol)> {
        self.symbol_order.iter().map(|&sym| (sym, self.sym(sym)))
    }

    /// Get-or-create a symbol in the main table. Two calls with the same
    /// (case-folded) name return the same reference.
    pub fn get_symbol(&mut self, name: &str) -> SymbolRef {
        let key = self.fold_name(name);
        if let Some(&sym) = self.symbol_index.get(&key) {
            return sym;
        }
        let sym = self.alloc_symbol(name);
        self.symbol_order.push(sym);
        self.symbol_index.insert(key, sym);
        sym
    }

    /// Lookup only; no creation.
    pub fn find_symbol(&self, name: &str) -> Option<SymbolRef> {
        self.symbol_index.get(&self.fold_name(name)).copied()
    }

    /// Unconditional append to the ordered sequence without indexing.
    /// Used for anonymous or duplicate-allowed symbols.
    pub fn append_symbol(&mut self, name: impl Into<String>) -> SymbolRef {
        let sym = self.alloc_symbol(name);
        self.symbol_order.push(sym);
        sym
    }

    /// Allocate a scratch symbol outside every index and sequence.
    pub fn add_non_table_symbol(&mut self, name: impl Into<String>) -> SymbolRef {
        self.alloc_symbol(name)
    }

    /// Register an architecture/object-format builtin symbol in the
    /// special index.
    pub fn add_special_symbol(&mut self, name: impl Into<String>) -> SymbolRef {
        let name = name.into();
        let key = self.fold_name(&name);
        let sym = self.alloc_symbol(name);
        self.special_index.insert(key, sym);
        sym
    }

    pub fn find_special_symbol(&self, name: &str) -> Option<SymbolRef> {
        self.special_index.get(&self.fold_name(name)).copied()
    }

    /// The unnamed symbol bound to `EQU 0`, used as the base of absolute
    /// expressions.
    pub fn absolute_symbol(&mut self) -> SymbolRef {
        let sym = self.get_symbol("");
        if !self.sym(sym).is_defined() {
            self.sym_mut(sym)
                .define_equ(Expr::int(0), 0)
                .expect("fresh absolute symbol accepts a definition");
            self.sym_mut(sym).mark_used(0);
        }
        sym
    }

    /// Where a symbol points, if it is defined as a label.
    pub fn symbol_location(&self, sym: SymbolRef) -> Option<Location> {
        match self.sym(sym).def() {
            SymbolDef::Label(loc) => Some(*loc),
            _ => None,
        }
    }

    /// The current end of a section as a [`Location`], for defining
    /// labels. Closes the current bytecode if it already has a tail, so
    /// the returned anchor can only ever grow *after* the named position.
    pub fn end_location(&mut self, section: u32, line: u64) -> Location {
        let sect = self.section_mut(section);
        if sect.bc(sect.last_pos()).has_contents() {
            sect.start_bytecode(line);
        }
        let pos = sect.last_pos();
        let id = BcId { section, pos };
        Location {
            bc: id,
            off: self.bytecode(id).fixed_len(),
        }
    }

    /// Section-relative position of a location, once its anchor bytecode
    /// has been placed.
    pub fn location_offset(&self, loc: Location) -> Option<u64> {
        let bc = self.bytecode(loc.bc);
        if bc.offset() == UNKNOWN_OFFSET {
            return None;
        }
        Some(bc.offset() + loc.off)
    }

    /// Signed distance from `from` to `to`. Defined only within one
    /// section and once both anchors are placed.
    pub fn calc_dist(&self, from: Location, to: Location) -> Option<i64> {
        if from.bc.section != to.bc.section {
            return None;
        }
        let from = self.location_offset(from)?;
        let to = self.location_offset(to)?;
        Some(to as i64 - from as i64)
    }

    /// Finalize after parsing: simplify and validate every tail and every
    /// fixup value, reporting per line and continuing so the user sees as
    /// many errors as possible.
    pub fn finalize(&mut self, errwarns: &mut Errwarns) {
        for section in 0..self.sections.len() as u32 {
            let count = self.sections[section as usize].bytecodes().len() as u32;
            for pos in 0..count {
                let id = BcId { section, pos };
                let line = self.bytecode(id).line();

                let mut contents = self.bytecode_mut(id).contents.take();
                if let Some(contents) = &mut contents
                    && let Err(err) = contents.finalize(self, line)
                {
                    errwarns.propagate(line, err);
                }
                self.bytecode_mut(id).contents = contents;

                let mut fixups = std::mem::take(self.bytecode_mut(id).fixups_mut());
                for fixup in &mut fixups {
                    if let Err(err) = fixup.value_mut().finalize(self) {
                        errwarns.propagate(line, err);
                    }
                }
                *self.bytecode_mut(id).fixups_mut() = fixups;
            }
        }
    }

    /// Resolve symbol liveness: a used-but-undefined symbol either gets
    /// promoted to extern (`undef_extern`) or is reported once, at its
    /// first use. Declared-but-idle symbols draw a warning.
    pub fn finalize_symbols(&mut self, errwarns: &mut Errwarns, undef_extern: bool) {
        let mut first_undef_line = u64::MAX;

        for index in 0..self.symbols.len() {
            let sym = &self.symbols[index];
            let status = sym.status();
            let undefined = status.contains(SymbolStatus::USED)
                && !status.contains(SymbolStatus::DEFINED)
                && !matches!(sym.visibility(), Visibility::Extern | Visibility::Common);

            if undefined {
                if undef_extern {
                    self.symbols[index].set_visibility(Visibility::Extern);
                } else {
                    let line = sym.use_line();
                    errwarns.propagate(
                        line,
                        CoreError::Value(format!("undefined symbol '{}' (first use)", sym.name())),
                    );
                    first_undef_line = first_undef_line.min(line);
                }
            } else if status == SymbolStatus::DECLARED {
                errwarns.warn(
                    sym.decl_line(),
                    WarnKind::OrphanLabel,
                    format!("symbol '{}' declared but never defined or used", sym.name()),
                );
            }
        }

        if first_undef_line != u64::MAX {
            errwarns.propagate(
                first_undef_line,
                CoreError::Value(" (each undefined symbol is reported only once)".into()),
            );
        }
    }

    /// Run the optimizer: resolve every bytecode's length and offset.
    pub fn optimize(&mut self, errwarns: &mut Errwarns) {
        crate::optimize::optimize(self, errwarns);
    }

    /// Recompute every bytecode's offset from current lengths.
    /// Offset-setters are re-expanded against the offset they land on.
    pub fn update_offsets(&mut self, errwarns: &mut Errwarns) {
        for section in 0..self.sections.len() as u32 {
            let count = self.sections[section as usize].bytecodes().len() as u32;
            let mut offset = 0u64;
            for pos in 0..count {
                let id = BcId { section, pos };
                debug_assert!(
                    self.bytecode(id).check_fixed_len_frozen(),
                    "fixed data grew after optimization started"
                );
                let old_offset = self.bytecode(id).offset();
                self.bytecode_mut(id).set_offset(offset);

                let is_offset_setter = self
                    .bytecode(id)
                    .contents()
                    .is_some_and(|contents| contents.special_kind() == SpecialKind::OffsetSetter);
                if is_offset_setter {
                    let old = if old_offset == UNKNOWN_OFFSET {
                        0
                    } else {
                        old_offset as i64
                    };
                    if let Err(err) = self.expand_bc(id, 1, old, offset as i64) {
                        let line = self.bytecode(id).line();
                        errwarns.propagate(line, err);
                    }
                }

                offset = self.bytecode(id).next_offset();
            }
        }
    }

    /// Run a tail's `calc_len` with the contents temporarily taken out,
    /// so the tail can consult the object it lives in.
    pub(crate) fn calc_bc_len(
        &mut self,
        id: BcId,
        add_span: &mut dyn FnMut(SpanRequest),
    ) -> Result<(), CoreError> {
        let mut contents = self.bytecode_mut(id).contents.take();
        let result = match &mut contents {
            None => Ok(0),
            Some(contents) => contents.calc_len(self, id, add_span),
        };
        let bc = self.bytecode_mut(id);
        bc.contents = contents;
        bc.set_tail_len(result?);
        Ok(())
    }

    /// Re-expand a tail for a span (or, with span 1 on an offset-setter,
    /// for a moved offset), updating the recorded tail length.
    pub(crate) fn expand_bc(
        &mut self,
        id: BcId,
        span: i32,
        old_val: i64,
        new_val: i64,
    ) -> Result<Expansion, CoreError> {
        let fixed_len = self.bytecode(id).fixed_len();
        let mut contents = self.bytecode_mut(id).contents.take();
        let result = match &mut contents {
            None => Err(CoreError::Internal(
                "expansion requested for a bytecode without contents".into(),
            )),
            Some(contents) => contents.expand(fixed_len, span, old_val, new_val),
        };
        let bc = self.bytecode_mut(id);
        bc.contents = contents;
        let (tail_len, expansion) = result?;
        bc.set_tail_len(tail_len);
        Ok(expansion)
    }
}
