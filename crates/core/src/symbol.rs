use std::any::Any;
use std::fmt;

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::bytecode::Location;
use crate::errwarns::CoreError;
use crate::expr::Expr;

/// Index of a symbol in its object's symbol arena. Stable for the
/// object's lifetime; symbols are never removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolRef(pub u32);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SymbolStatus: u8 {
        const DECLARED = 1 << 0;
        const DEFINED = 1 << 1;
        const USED = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Local,
    Global,
    Common,
    Extern,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Visibility::Local => "local",
            Visibility::Global => "global",
            Visibility::Common => "common",
            Visibility::Extern => "extern",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Default)]
pub enum SymbolDef {
    #[default]
    None,
    Equ(Expr),
    Label(Location),
    /// Architecture/object-format builtin; resolved by its owner.
    Special,
}

/// Typed side-data attached to symbols by object-format back-ends. The
/// core stores but never interprets it; retrieval downcasts by key plus
/// concrete type.
pub trait AssocData: Any + fmt::Debug {}

#[derive(Debug)]
pub struct Symbol {
    name: String,
    status: SymbolStatus,
    vis: Visibility,
    def: SymbolDef,
    decl_line: u64,
    def_line: u64,
    use_line: u64,
    assoc: FxHashMap<&'static str, Box<dyn AssocData>>,
}

impl Symbol {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: SymbolStatus::empty(),
            vis: Visibility::Local,
            def: SymbolDef::None,
            decl_line: 0,
            def_line: 0,
            use_line: 0,
            assoc: FxHashMap::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> SymbolStatus {
        self.status
    }

    pub fn visibility(&self) -> Visibility {
        self.vis
    }

    pub fn def(&self) -> &SymbolDef {
        &self.def
    }

    pub fn is_defined(&self) -> bool {
        self.status.contains(SymbolStatus::DEFINED)
    }

    pub fn decl_line(&self) -> u64 {
        self.decl_line
    }

    pub fn def_line(&self) -> u64 {
        self.def_line
    }

    /// Line of the first recorded use.
    pub fn use_line(&self) -> u64 {
        self.use_line
    }

    /// Record a use. Only the first use line is kept; undefined-symbol
    /// reporting points there.
    pub fn mark_used(&mut self, line: u64) {
        if !self.status.contains(SymbolStatus::USED) {
            self.use_line = line;
        }
        self.status |= SymbolStatus::USED;
    }

    /// Declare the symbol with a visibility. Redeclaration with the same
    /// visibility is idempotent; conflicting visibilities are an error and
    /// the first declaration stands.
    pub fn declare(&mut self, vis: Visibility, line: u64) -> Result<(), CoreError> {
        let compatible = vis == self.vis
            || (self.vis == Visibility::Local && !self.status.contains(SymbolStatus::DECLARED));
        if !compatible {
            return Err(CoreError::Value(format!(
                "symbol '{}' redeclared {} (already declared {} at line {})",
                self.name, vis, self.vis, self.decl_line
            )));
        }
        if !self.status.contains(SymbolStatus::DECLARED) {
            self.decl_line = line;
        }
        self.vis = vis;
        self.status |= SymbolStatus::DECLARED;
        Ok(())
    }

    pub fn define_equ(&mut self, expr: Expr, line: u64) -> Result<(), CoreError> {
        self.define(SymbolDef::Equ(expr), line)
    }

    /// Define as a label at a position inside a section; front-ends pass
    /// the object's current end location. The head sentinel stands in
    /// when a label opens a section.
    pub fn define_label(&mut self, loc: Location, line: u64) -> Result<(), CoreError> {
        self.define(SymbolDef::Label(loc), line)
    }

    pub fn define_special(&mut self, vis: Visibility) {
        self.def = SymbolDef::Special;
        self.vis = vis;
        self.status |= SymbolStatus::DEFINED | SymbolStatus::DECLARED;
    }

    fn define(&mut self, def: SymbolDef, line: u64) -> Result<(), CoreError> {
        if self.status.contains(SymbolStatus::DEFINED) {
            return Err(CoreError::Value(format!(
                "redefinition of symbol '{}' (first defined at line {})",
                self.name, self.def_line
            )));
        }
        if self.vis == Visibility::Extern || self.vis == Visibility::Common {
            return Err(CoreError::Value(format!(
                "symbol '{}' declared {} and then defined",
                self.name, self.vis
            )));
        }
        self.def = def;
        self.def_line = line;
        self.status |= SymbolStatus::DEFINED;
        Ok(())
    }

    pub(crate) fn set_visibility(&mut self, vis: Visibility) {
        self.vis = vis;
        self.status |= SymbolStatus::DECLARED;
    }

    pub fn set_assoc_data<T: AssocData>(&mut self, key: &'static str, data: T) {
        self.assoc.insert(key, Box::new(data));
    }

    pub fn assoc_data<T: AssocData>(&self, key: &'static str) -> Option<&T> {
        let data = self.assoc.get(key)?;
        (data.as_ref() as &dyn Any).downcast_ref::<T>()
    }

    pub fn has_assoc_data(&self, key: &'static str) -> bool {
        self.assoc.contains_key(key)
    }
}
