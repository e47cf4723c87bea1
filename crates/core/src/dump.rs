//! Plain-text dump of an object for debugging. Not a diagnostics
//! renderer; just a stable human-readable view of what the core holds.

use std::fmt::Write;

use crate::object::Object;
use crate::symbol::SymbolDef;

pub fn dump_object(object: &Object) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Symbol Table:");
    for (_, sym) in object.symbols_ordered() {
        let def = match sym.def() {
            SymbolDef::None => "undef".to_string(),
            SymbolDef::Equ(expr) => format!("equ {expr}"),
            SymbolDef::Label(loc) => {
                format!("label at {}:{}+{}", loc.bc.section, loc.bc.pos, loc.off)
            }
            SymbolDef::Special => "special".to_string(),
        };
        let _ = writeln!(
            out,
            "  '{}' {} {:?} {}",
            sym.name(),
            sym.visibility(),
            sym.status(),
            def
        );
    }

    for section in object.sections() {
        let _ = writeln!(out, "\n[{}]", section.name());
        let _ = writeln!(
            out,
            "  align={} code={} bss={}",
            section.align(),
            section.is_code(),
            section.is_bss()
        );
        for bc in section.bytecodes() {
            let kind = bc.contents().map_or("fixed", |c| c.kind_name());
            let _ = writeln!(
                out,
                "  {:06X}: len {}+{} {} {}",
                bc.offset(),
                bc.fixed_len(),
                bc.tail_len(),
                kind,
                bc.fixed()
            );
        }
    }

    out
}
