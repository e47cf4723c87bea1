use rustc_hash::FxHashMap;

use crate::errwarns::{CoreError, Errwarns};
use crate::expr::Expr;
use crate::object::Object;
use crate::symbol::{AssocData, Visibility};

/// Argument classes a directive can require of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirClass {
    /// Anything goes, including no arguments.
    Any,
    /// At least one argument.
    ArgRequired,
    /// At least one argument, and the first must be a bare identifier.
    IdRequired,
}

#[derive(Debug, Clone)]
pub enum DirArg {
    Id(String),
    Str(String),
    Expr(Expr),
}

impl DirArg {
    pub fn as_id(&self) -> Option<&str> {
        match self {
            DirArg::Id(id) => Some(id),
            _ => None,
        }
    }
}

pub type DirHandler = fn(&mut Object, &[DirArg], u64, &mut Errwarns);

#[derive(Debug, Clone, Copy)]
struct Directive {
    handler: DirHandler,
    class: DirClass,
}

/// Registry mapping directive names to handlers. Parsers resolve names
/// here; argument-class checking happens before the handler runs.
/// Names are matched case-insensitively, the way every front-end syntax
/// treats directives.
#[derive(Default)]
pub struct Directives {
    map: FxHashMap<String, Directive>,
}

impl Directives {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the builtin symbol directives.
    pub fn with_builtins() -> Self {
        let mut dirs = Self::new();
        dirs.register("extern", dir_extern, DirClass::IdRequired);
        dirs.register("global", dir_global, DirClass::IdRequired);
        dirs.register("common", dir_common, DirClass::IdRequired);
        dirs
    }

    pub fn register(&mut self, name: &str, handler: DirHandler, class: DirClass) {
        self.map
            .insert(name.to_ascii_lowercase(), Directive { handler, class });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(&name.to_ascii_lowercase())
    }

    /// Validate arguments against the directive's class and invoke it.
    pub fn dispatch(
        &self,
        object: &mut Object,
        name: &str,
        args: &[DirArg],
        line: u64,
        errwarns: &mut Errwarns,
    ) -> Result<(), CoreError> {
        let directive = self
            .map
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| CoreError::Syntax(format!("unknown directive '{name}'")))?;

        match directive.class {
            DirClass::Any => {}
            DirClass::ArgRequired => {
                if args.is_empty() {
                    return Err(CoreError::Syntax(format!(
                        "directive '{name}' requires an argument"
                    )));
                }
            }
            DirClass::IdRequired => {
                if args.first().and_then(DirArg::as_id).is_none() {
                    return Err(CoreError::Syntax(format!(
                        "directive '{name}' requires an identifier parameter"
                    )));
                }
            }
        }

        (directive.handler)(object, args, line, errwarns);
        Ok(())
    }
}

/// Size attached to a `common` symbol, consumed by object-format
/// back-ends.
#[derive(Debug, Clone)]
pub struct CommonSize(pub Expr);

impl CommonSize {
    pub const KEY: &'static str = "common-size";
}

impl AssocData for CommonSize {}

fn declare_symbol(
    object: &mut Object,
    args: &[DirArg],
    vis: Visibility,
    line: u64,
    errwarns: &mut Errwarns,
) {
    let name = args[0].as_id().expect("argument class checked by dispatch");
    let sym = object.get_symbol(name);
    if let Err(err) = object.sym_mut(sym).declare(vis, line) {
        errwarns.propagate(line, err);
    }
}

fn dir_extern(object: &mut Object, args: &[DirArg], line: u64, errwarns: &mut Errwarns) {
    declare_symbol(object, args, Visibility::Extern, line, errwarns);
}

fn dir_global(object: &mut Object, args: &[DirArg], line: u64, errwarns: &mut Errwarns) {
    declare_symbol(object, args, Visibility::Global, line, errwarns);
}

fn dir_common(object: &mut Object, args: &[DirArg], line: u64, errwarns: &mut Errwarns) {
    let Some(DirArg::Expr(size)) = args.get(1) else {
        errwarns.propagate(
            line,
            CoreError::Syntax("common symbol requires a size expression".into()),
        );
        return;
    };
    let size = size.clone();
    let name = args[0].as_id().expect("argument class checked by dispatch");
    let sym = object.get_symbol(name);
    if let Err(err) = object.sym_mut(sym).declare(Visibility::Common, line) {
        errwarns.propagate(line, err);
        return;
    }
    object
        .sym_mut(sym)
        .set_assoc_data(CommonSize::KEY, CommonSize(size));
}
