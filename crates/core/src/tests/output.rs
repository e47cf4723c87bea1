use super::*;

fn emit(object: &mut Object) -> (Vec<u8>, Errwarns) {
    let mut sink = VecSink::new();
    let mut errwarns = Errwarns::new();
    output_object(object, &mut sink, &mut errwarns).expect("output");
    (sink.data, errwarns)
}

#[test]
fn short_jump_emits_relative_operand() {
    let mut object = test_object();
    let section = code_section(&mut object);
    let target = object.get_symbol("fwd");
    append_jmp(&mut object, section, target, 1);
    append_filler(&mut object, section, 3, 2);
    let loc = object.end_location(section, 3);
    object.sym_mut(target).define_label(loc, 3).expect("label");
    optimize_ok(&mut object);

    let (data, errwarns) = emit(&mut object);
    assert_eq!(errwarns.num_errors(), 0);
    // EB 03, then the three filler bytes.
    assert_eq!(data, vec![0xEB, 0x03, 0x90, 0x90, 0x90]);
}

#[test]
fn expanded_jump_emits_long_operand() {
    let mut object = test_object();
    let section = code_section(&mut object);
    define_label(&mut object, section, "label1", 1);
    append_filler(&mut object, section, 200, 2);
    let target = object.get_symbol("label2");
    append_jmp(&mut object, section, target, 3);
    append_filler(&mut object, section, 200, 4);
    let loc = object.end_location(section, 5);
    object.sym_mut(target).define_label(loc, 5).expect("label");
    optimize_ok(&mut object);

    let (data, _) = emit(&mut object);
    assert_eq!(data.len(), 405);
    // Operand counts from the end of the long form at 205 to 405.
    assert_eq!(&data[200..205], &[0xE9, 0xC8, 0x00, 0x00, 0x00]);
}

#[test]
fn label_fixup_becomes_a_relocation() {
    let mut object = test_object();
    let section = code_section(&mut object);
    append_filler(&mut object, section, 2, 1);
    let target = define_label(&mut object, section, "table", 2);
    object.sym_mut(target).mark_used(3);
    {
        let bc = object.section_mut(section).fresh_bytecode(3);
        bc.append_fixed_bytes(&[0xAD]);
        bc.append_fixed_expr(16, Expr::sym(target));
    }
    optimize_ok(&mut object);

    let (data, errwarns) = emit(&mut object);
    assert_eq!(errwarns.num_errors(), 0);
    // The operand field stays zero; the relocation carries the symbol.
    assert_eq!(data, vec![0x90, 0x90, 0xAD, 0x00, 0x00]);
    let relocs = object.section(section).relocs();
    assert_eq!(relocs.len(), 1);
    assert_eq!(relocs[0].addr, 3);
    assert_eq!(relocs[0].sym, target);
}

#[test]
fn label_difference_folds_without_relocation() {
    let mut object = test_object();
    let section = code_section(&mut object);
    let a = define_label(&mut object, section, "a", 1);
    append_filler(&mut object, section, 5, 2);
    let b = define_label(&mut object, section, "b", 3);
    object.sym_mut(a).mark_used(4);
    object.sym_mut(b).mark_used(4);
    object
        .section_mut(section)
        .fresh_bytecode(4)
        .append_fixed_expr(16, Expr::sub(Expr::sym(b), Expr::sym(a)));
    optimize_ok(&mut object);

    let (data, errwarns) = emit(&mut object);
    assert_eq!(errwarns.num_errors(), 0);
    assert_eq!(&data[5..], &[0x05, 0x00]);
    assert!(object.section(section).relocs().is_empty());
}

#[test]
fn output_is_idempotent() {
    let mut object = test_object();
    let section = code_section(&mut object);
    let a = define_label(&mut object, section, "a", 1);
    append_filler(&mut object, section, 9, 2);
    let b = define_label(&mut object, section, "b", 3);
    object.sym_mut(a).mark_used(4);
    object.sym_mut(b).mark_used(4);
    object
        .section_mut(section)
        .fresh_bytecode(4)
        .append_fixed_expr(32, Expr::sub(Expr::sym(b), Expr::sym(a)));
    optimize_ok(&mut object);

    let (first, _) = emit(&mut object);
    let (second, _) = emit(&mut object);
    assert_eq!(first, second);
}

#[test]
fn reserve_section_degrades_to_gaps_with_a_warning() {
    let mut object = test_object();
    let bss = object.new_section(".bss", None, 0, false, true, 1);
    object.section_mut(bss).append_gap(16, 1);
    append_filler(&mut object, bss, 4, 2);
    optimize_ok(&mut object);

    let (data, errwarns) = emit(&mut object);
    assert_eq!(data, vec![0; 20]);
    let warnings: Vec<WarnKind> = errwarns.warnings().map(|(_, kind, _)| kind).collect();
    assert_eq!(warnings, vec![WarnKind::UninitContents]);
}

#[test]
fn data_items_write_with_section_endianness() {
    let mut object = test_object();
    let section = code_section(&mut object);
    let mut data = DataContents::new();
    data.push_bytes(&[0x01]);
    data.push_expr(16, Expr::int(0x1234));
    data.push_float(1.0, 32).expect("float size");
    append_contents(&mut object, section, Contents::Data(data), 1);
    optimize_ok(&mut object);

    let (bytes, errwarns) = emit(&mut object);
    assert_eq!(errwarns.num_errors(), 0);
    assert_eq!(bytes, vec![0x01, 0x34, 0x12, 0x00, 0x00, 0x80, 0x3F]);
}

#[test]
fn oversized_data_value_warns_and_truncates() {
    let mut object = test_object();
    let section = code_section(&mut object);
    let mut data = DataContents::new();
    data.push_expr(8, Expr::int(0x1FF));
    append_contents(&mut object, section, Contents::Data(data), 7);
    optimize_ok(&mut object);

    let (bytes, errwarns) = emit(&mut object);
    assert_eq!(bytes, vec![0xFF]);
    let warnings: Vec<(u64, WarnKind)> = errwarns
        .warnings()
        .map(|(line, kind, _)| (line, kind))
        .collect();
    assert_eq!(warnings, vec![(7, WarnKind::SizeOverflow)]);
}

#[test]
fn leb128_tail_emits_reference_encoding() {
    let mut object = test_object();
    let section = code_section(&mut object);
    append_contents(
        &mut object,
        section,
        Contents::Leb128(Leb128Contents::new(Expr::int(624485), false)),
        1,
    );
    optimize_ok(&mut object);
    assert_eq!(section_end(&object, section), 3);

    let (bytes, _) = emit(&mut object);
    assert_eq!(bytes, vec![0xE5, 0x8E, 0x26]);
}

#[test]
fn times_replicates_inner_bytes() {
    let mut object = test_object();
    let section = code_section(&mut object);
    let mut inner = Bytecode::empty(false, 1);
    inner.append_fixed_bytes(&[0xCD, 0x20]);
    append_contents(
        &mut object,
        section,
        Contents::Multiple(MultipleContents::new(Expr::int(3), inner)),
        1,
    );
    optimize_ok(&mut object);

    let (bytes, _) = emit(&mut object);
    assert_eq!(bytes, vec![0xCD, 0x20, 0xCD, 0x20, 0xCD, 0x20]);
}

#[test]
fn jump_to_extern_records_a_relocation() {
    let mut object = test_object();
    let section = code_section(&mut object);
    let target = object.get_symbol("puts");
    object
        .sym_mut(target)
        .declare(Visibility::Extern, 1)
        .expect("declare");
    append_jmp(&mut object, section, target, 2);
    optimize_ok(&mut object);

    let (bytes, errwarns) = emit(&mut object);
    assert_eq!(errwarns.num_errors(), 0);
    assert_eq!(bytes, vec![0xE9, 0x00, 0x00, 0x00, 0x00]);
    let relocs = object.section(section).relocs();
    assert_eq!(relocs.len(), 1);
    assert_eq!(relocs[0].addr, 1);
    assert_eq!(relocs[0].sym, target);
}
