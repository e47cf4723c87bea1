use super::*;

/// Two-byte short jump (opcode + rel8) that falls back to a five-byte
/// long form (opcode + rel32), the classic x86 shape.
const SHORT_JMP_LEN: u64 = 2;
const LONG_JMP_LEN: u64 = 5;

fn test_object() -> Object {
    Object::new(
        "input.asm",
        "output.o",
        Arch::new("test32", 32, false),
        SymbolCase::Sensitive,
    )
}

fn code_section(object: &mut Object) -> u32 {
    object.new_section(".text", None, 0, true, false, 1)
}

/// Append `len` bytes of 0x90 filler to the section's current bytecode.
fn append_filler(object: &mut Object, section: u32, len: usize, line: u64) {
    object
        .section_mut(section)
        .fresh_bytecode(line)
        .append_fixed_bytes(&vec![0x90; len]);
}

/// Define `name` as a label at the section's current end.
fn define_label(object: &mut Object, section: u32, name: &str, line: u64) -> SymbolRef {
    let loc = object.end_location(section, line);
    let sym = object.get_symbol(name);
    object
        .sym_mut(sym)
        .define_label(loc, line)
        .expect("label definition");
    object.bytecode_mut(loc.bc).add_symbol(sym);
    sym
}

/// Append a short/long branch targeting `target`, in its own bytecode.
fn append_jmp(object: &mut Object, section: u32, target: SymbolRef, line: u64) -> BcId {
    object.sym_mut(target).mark_used(line);
    let insn = InsnContents::new(
        vec![0xEB],
        8,
        -128,
        127,
        vec![0xE9],
        32,
        Expr::sym(target),
    );
    let pos = object.section_mut(section).start_bytecode(line);
    let id = BcId { section, pos };
    object.bytecode_mut(id).transform(Contents::Insn(insn));
    id
}

fn append_contents(object: &mut Object, section: u32, contents: Contents, line: u64) -> BcId {
    let pos = object.section_mut(section).start_bytecode(line);
    let id = BcId { section, pos };
    object.bytecode_mut(id).transform(contents);
    id
}

/// Finalize and optimize, expecting a clean run.
fn optimize_ok(object: &mut Object) {
    let mut errwarns = Errwarns::new();
    object.finalize(&mut errwarns);
    assert_eq!(errwarns.num_errors(), 0, "finalize: {:?}", errwarns.entries());
    object.optimize(&mut errwarns);
    assert_eq!(errwarns.num_errors(), 0, "optimize: {:?}", errwarns.entries());
}

/// Finalize and optimize, returning the collected diagnostics.
fn optimize_collect(object: &mut Object) -> Errwarns {
    let mut errwarns = Errwarns::new();
    object.finalize(&mut errwarns);
    if errwarns.num_errors() == 0 {
        object.optimize(&mut errwarns);
    }
    errwarns
}

fn section_end(object: &Object, section: u32) -> u64 {
    let sect = object.section(section);
    sect.bc(sect.last_pos()).next_offset()
}

fn label_offset(object: &Object, sym: SymbolRef) -> u64 {
    let loc = object.symbol_location(sym).expect("label symbol");
    object.location_offset(loc).expect("placed label")
}

mod optimizer;
mod output;
mod symbols;
