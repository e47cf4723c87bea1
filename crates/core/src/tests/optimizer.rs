use super::*;

#[test]
fn near_jump_stays_short() {
    let mut object = test_object();
    let section = code_section(&mut object);
    let target = object.get_symbol("near");
    let jmp = append_jmp(&mut object, section, target, 1);
    append_filler(&mut object, section, 50, 2);
    let loc = object.end_location(section, 3);
    object.sym_mut(target).define_label(loc, 3).expect("label");

    optimize_ok(&mut object);
    assert_eq!(object.bytecode(jmp).total_len(), SHORT_JMP_LEN);
    assert_eq!(section_end(&object, section), SHORT_JMP_LEN + 50);
}

#[test]
fn backward_jump_stays_short_within_range() {
    let mut object = test_object();
    let section = code_section(&mut object);
    let target = define_label(&mut object, section, "top", 1);
    append_filler(&mut object, section, 100, 2);
    let jmp = append_jmp(&mut object, section, target, 3);

    optimize_ok(&mut object);
    // Distance from the end of the short form: -(100 + 2) >= -128.
    assert_eq!(object.bytecode(jmp).total_len(), SHORT_JMP_LEN);
}

#[test]
fn near_jump_expands_to_far_form() {
    let mut object = test_object();
    let section = code_section(&mut object);
    define_label(&mut object, section, "label1", 1);
    append_filler(&mut object, section, 200, 2);
    let target = object.get_symbol("label2");
    let jmp = append_jmp(&mut object, section, target, 3);
    append_filler(&mut object, section, 200, 4);
    let loc = object.end_location(section, 5);
    object.sym_mut(target).define_label(loc, 5).expect("label");

    optimize_ok(&mut object);
    let Some(Contents::Insn(insn)) = object.bytecode(jmp).contents() else {
        panic!("expected an instruction tail");
    };
    assert!(insn.is_long_form());
    assert_eq!(object.bytecode(jmp).total_len(), LONG_JMP_LEN);
    assert_eq!(label_offset(&object, target), 400 + LONG_JMP_LEN);
    assert_eq!(section_end(&object, section), 400 + LONG_JMP_LEN);
}

#[test]
fn backward_jump_expands_when_too_far() {
    let mut object = test_object();
    let section = code_section(&mut object);
    let target = define_label(&mut object, section, "top", 1);
    append_filler(&mut object, section, 300, 2);
    let jmp = append_jmp(&mut object, section, target, 3);

    optimize_ok(&mut object);
    assert_eq!(object.bytecode(jmp).total_len(), LONG_JMP_LEN);
}

#[test]
fn jump_to_extern_forces_long_form() {
    let mut object = test_object();
    let section = code_section(&mut object);
    let target = object.get_symbol("external");
    object
        .sym_mut(target)
        .declare(Visibility::Extern, 1)
        .expect("declare");
    let jmp = append_jmp(&mut object, section, target, 2);

    optimize_ok(&mut object);
    assert_eq!(object.bytecode(jmp).total_len(), LONG_JMP_LEN);
}

#[test]
fn align_absorption() {
    let mut object = test_object();
    let section = code_section(&mut object);
    append_filler(&mut object, section, 7, 1);
    let align = append_contents(
        &mut object,
        section,
        Contents::Align(AlignContents::new(4, Some(0x00), None)),
        2,
    );
    append_filler(&mut object, section, 1, 3);

    optimize_ok(&mut object);
    assert_eq!(object.bytecode(align).tail_len(), 9);
    let sect = object.section(section);
    assert_eq!(sect.bc(sect.last_pos()).offset(), 16);
    assert_eq!(section_end(&object, section), 17);
}

#[test]
fn align_boundary_invariant_holds() {
    let mut object = test_object();
    let section = code_section(&mut object);
    append_filler(&mut object, section, 13, 1);
    let align = append_contents(
        &mut object,
        section,
        Contents::Align(AlignContents::new(5, None, None)),
        2,
    );
    append_filler(&mut object, section, 3, 3);

    optimize_ok(&mut object);
    let bc = object.bytecode(align);
    assert_eq!((bc.offset() + bc.total_len()) % 32, 0);
}

#[test]
fn align_absorbs_a_jump_expansion() {
    let mut object = test_object();
    let section = code_section(&mut object);
    let target = object.get_symbol("after_align");
    let jmp = append_jmp(&mut object, section, target, 1);
    append_filler(&mut object, section, 100, 2);
    let align = append_contents(
        &mut object,
        section,
        Contents::Align(AlignContents::new(8, Some(0x00), None)),
        3,
    );
    let loc = object.end_location(section, 4);
    object.sym_mut(target).define_label(loc, 4).expect("label");
    append_filler(&mut object, section, 1, 5);

    optimize_ok(&mut object);
    // The jump had to go long (256 - 2 > 129), and the align pad shrank
    // by the same three bytes the jump grew.
    assert_eq!(object.bytecode(jmp).total_len(), LONG_JMP_LEN);
    assert_eq!(object.bytecode(align).tail_len(), 256 - 105);
    assert_eq!(label_offset(&object, target), 256);
    assert_eq!(section_end(&object, section), 257);
}

#[test]
fn org_pads_to_its_target() {
    let mut object = test_object();
    let section = code_section(&mut object);
    append_filler(&mut object, section, 7, 1);
    let org = append_contents(
        &mut object,
        section,
        Contents::Org(OrgContents::new(16, 0x00)),
        2,
    );
    append_filler(&mut object, section, 1, 3);

    optimize_ok(&mut object);
    assert_eq!(object.bytecode(org).tail_len(), 9);
    assert_eq!(section_end(&object, section), 17);
}

#[test]
fn org_overlap_is_an_error() {
    let mut object = test_object();
    let section = code_section(&mut object);
    append_filler(&mut object, section, 32, 1);
    append_contents(
        &mut object,
        section,
        Contents::Org(OrgContents::new(16, 0x00)),
        2,
    );

    let errwarns = optimize_collect(&mut object);
    assert_eq!(errwarns.num_errors(), 1);
    let (line, err) = errwarns.errors().next().expect("one error");
    assert_eq!(line, 2);
    assert!(err.to_string().contains("ORG overlaps"));
}

#[test]
fn constant_times_multiplies_its_inner() {
    let mut object = test_object();
    let section = code_section(&mut object);
    let mut inner = Bytecode::empty(false, 1);
    inner.append_fixed_bytes(&[0xAA, 0xBB]);
    append_contents(
        &mut object,
        section,
        Contents::Multiple(MultipleContents::new(Expr::int(5), inner)),
        1,
    );

    optimize_ok(&mut object);
    assert_eq!(section_end(&object, section), 10);
}

#[test]
fn times_count_from_label_distance() {
    let mut object = test_object();
    let section = code_section(&mut object);
    let a = define_label(&mut object, section, "a", 1);
    append_filler(&mut object, section, 3, 2);
    let b = define_label(&mut object, section, "b", 3);
    let mut inner = Bytecode::empty(false, 4);
    inner.append_fixed_bytes(&[0x55]);
    let times = append_contents(
        &mut object,
        section,
        Contents::Multiple(MultipleContents::new(
            Expr::sub(Expr::sym(b), Expr::sym(a)),
            inner,
        )),
        4,
    );

    optimize_ok(&mut object);
    assert_eq!(object.bytecode(times).tail_len(), 3);
    assert_eq!(section_end(&object, section), 6);
}

#[test]
fn circular_times_is_rejected() {
    let mut object = test_object();
    let section = code_section(&mut object);
    let a = define_label(&mut object, section, "a", 1);
    let mut inner = Bytecode::empty(false, 1);
    inner.append_fixed_bytes(&[0x00]);
    let b = object.get_symbol("b");
    append_contents(
        &mut object,
        section,
        Contents::Multiple(MultipleContents::new(
            Expr::sub(Expr::sym(b), Expr::sym(a)),
            inner,
        )),
        1,
    );
    let loc = object.end_location(section, 2);
    object.sym_mut(b).define_label(loc, 2).expect("label");

    let errwarns = optimize_collect(&mut object);
    assert_eq!(errwarns.num_errors(), 1);
    let (_, err) = errwarns.errors().next().expect("one error");
    assert!(err.to_string().contains("circular reference detected"));
}

#[test]
fn times_tracks_a_jump_expansion_across_it() {
    let mut object = test_object();
    let section = code_section(&mut object);
    let b = define_label(&mut object, section, "b", 1);
    let far = object.get_symbol("far");
    let jmp = append_jmp(&mut object, section, far, 2);
    append_filler(&mut object, section, 4, 3);
    let c = define_label(&mut object, section, "c", 4);
    let mut inner = Bytecode::empty(false, 5);
    inner.append_fixed_bytes(&[0xAA]);
    let times = append_contents(
        &mut object,
        section,
        Contents::Multiple(MultipleContents::new(
            Expr::sub(Expr::sym(c), Expr::sym(b)),
            inner,
        )),
        5,
    );
    append_filler(&mut object, section, 118, 6);
    let loc = object.end_location(section, 7);
    object.sym_mut(far).define_label(loc, 7).expect("label");

    optimize_ok(&mut object);
    // The jump expands (its short reach ends at 129 < final target), and
    // the repeat count follows c - b from 6 to 9.
    assert_eq!(object.bytecode(jmp).total_len(), LONG_JMP_LEN);
    assert_eq!(object.bytecode(times).tail_len(), 9);
    assert_eq!(label_offset(&object, far), LONG_JMP_LEN + 4 + 9 + 118);
}

#[test]
fn section_lengths_are_monotone_over_reoptimization() {
    // Re-running the optimizer on a settled object must not change
    // anything: lengths are already at their fixed point.
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
    let first = section_end(&object, section);
    let mut errwarns = Errwarns::new();
    object.optimize(&mut errwarns);
    assert_eq!(errwarns.num_errors(), 0);
    assert_eq!(section_end(&object, section), first);
}

#[test]
fn multiple_sections_optimize_independently() {
    let mut object = test_object();
    let text = code_section(&mut object);
    let data = object.new_section(".data", None, 0, false, false, 1);
    append_filler(&mut object, text, 3, 1);
    append_filler(&mut object, data, 9, 2);

    optimize_ok(&mut object);
    assert_eq!(section_end(&object, text), 3);
    assert_eq!(section_end(&object, data), 9);
}
