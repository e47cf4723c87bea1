use super::*;

#[test]
fn get_symbol_returns_the_same_reference() {
    let mut object = test_object();
    let first = object.get_symbol("loop_top");
    let second = object.get_symbol("loop_top");
    assert_eq!(first, second);
    assert_eq!(object.symbols_ordered().count(), 1);
}

#[test]
fn case_folding_follows_object_configuration() {
    let mut sensitive = test_object();
    let upper = sensitive.get_symbol("Foo");
    let lower = sensitive.get_symbol("foo");
    assert_ne!(upper, lower);

    let mut insensitive = Object::new(
        "input.asm",
        "output.o",
        Arch::new("test32", 32, false),
        SymbolCase::Insensitive,
    );
    let upper = insensitive.get_symbol("Foo");
    let lower = insensitive.get_symbol("FOO");
    assert_eq!(upper, lower);
    assert_eq!(insensitive.sym(upper).name(), "Foo");
}

#[test]
fn find_symbol_never_creates() {
    let mut object = test_object();
    assert!(object.find_symbol("ghost").is_none());
    object.get_symbol("ghost");
    assert!(object.find_symbol("ghost").is_some());
}

#[test]
fn append_symbol_is_not_indexed_but_ordered() {
    let mut object = test_object();
    let anon = object.append_symbol("..anon");
    assert!(object.find_symbol("..anon").is_none());
    let ordered: Vec<SymbolRef> = object.symbols_ordered().map(|(sym, _)| sym).collect();
    assert_eq!(ordered, vec![anon]);

    // A second append with the same name is allowed and distinct.
    let again = object.append_symbol("..anon");
    assert_ne!(anon, again);
}

#[test]
fn non_table_symbols_are_invisible() {
    let mut object = test_object();
    let scratch = object.add_non_table_symbol("scratch");
    assert!(object.find_symbol("scratch").is_none());
    assert_eq!(object.symbols_ordered().count(), 0);
    assert_eq!(object.sym(scratch).name(), "scratch");
}

#[test]
fn special_symbols_live_in_their_own_index() {
    let mut object = test_object();
    let special = object.add_special_symbol("..start");
    object.sym_mut(special).define_special(Visibility::Extern);
    assert_eq!(object.find_special_symbol("..start"), Some(special));
    assert!(object.find_symbol("..start").is_none());
    assert_eq!(object.symbols_ordered().count(), 0);
}

#[test]
fn absolute_symbol_is_equ_zero_and_stable() {
    let mut object = test_object();
    let first = object.absolute_symbol();
    let second = object.absolute_symbol();
    assert_eq!(first, second);
    let SymbolDef::Equ(expr) = object.sym(first).def() else {
        panic!("absolute symbol is an EQU");
    };
    assert_eq!(expr.get_intnum().map(|v| v.as_i128()), Some(0));
}

#[test]
fn conflicting_visibility_redeclaration_is_reported() {
    let mut object = test_object();
    let sym = object.get_symbol("foo");
    object
        .sym_mut(sym)
        .declare(Visibility::Global, 10)
        .expect("first declaration");
    let err = object
        .sym_mut(sym)
        .declare(Visibility::Extern, 20)
        .expect_err("conflicting declaration");
    assert!(err.to_string().contains("redeclared"));
    // The first declaration stands.
    assert_eq!(object.sym(sym).visibility(), Visibility::Global);
    assert_eq!(object.sym(sym).decl_line(), 10);
}

#[test]
fn undefined_symbols_report_once_each_plus_note() {
    let mut object = test_object();
    for (name, line) in [("alpha", 4), ("beta", 2), ("gamma", 9)] {
        let sym = object.get_symbol(name);
        object.sym_mut(sym).mark_used(line);
        // Extra uses at later lines must not add reports.
        object.sym_mut(sym).mark_used(line + 10);
    }

    let mut errwarns = Errwarns::new();
    object.finalize_symbols(&mut errwarns, false);

    let undefined: Vec<u64> = errwarns
        .errors()
        .filter(|(_, err)| err.to_string().contains("undefined symbol"))
        .map(|(line, _)| line)
        .collect();
    assert_eq!(undefined.len(), 3);
    assert!(undefined.contains(&4) && undefined.contains(&2) && undefined.contains(&9));

    let notes: Vec<u64> = errwarns
        .errors()
        .filter(|(_, err)| err.to_string().contains("reported only once"))
        .map(|(line, _)| line)
        .collect();
    // One note, at the smallest first-use line, reported last.
    assert_eq!(notes, vec![2]);
    assert_eq!(errwarns.entries().last().expect("entries").line, 2);
}

#[test]
fn undef_extern_promotes_instead_of_reporting() {
    let mut object = test_object();
    let sym = object.get_symbol("puts");
    object.sym_mut(sym).mark_used(5);

    let mut errwarns = Errwarns::new();
    object.finalize_symbols(&mut errwarns, true);
    assert_eq!(errwarns.num_errors(), 0);
    assert_eq!(object.sym(sym).visibility(), Visibility::Extern);
}

#[test]
fn extern_symbols_may_stay_undefined() {
    let mut object = test_object();
    let sym = object.get_symbol("memcpy");
    object
        .sym_mut(sym)
        .declare(Visibility::Extern, 1)
        .expect("declare");
    object.sym_mut(sym).mark_used(3);

    let mut errwarns = Errwarns::new();
    object.finalize_symbols(&mut errwarns, false);
    assert_eq!(errwarns.num_errors(), 0);
}

#[test]
fn declared_but_idle_symbol_warns() {
    let mut object = test_object();
    let sym = object.get_symbol("unused_global");
    object
        .sym_mut(sym)
        .declare(Visibility::Global, 7)
        .expect("declare");

    let mut errwarns = Errwarns::new();
    object.finalize_symbols(&mut errwarns, false);
    assert_eq!(errwarns.num_errors(), 0);
    let warnings: Vec<(u64, WarnKind)> = errwarns
        .warnings()
        .map(|(line, kind, _)| (line, kind))
        .collect();
    assert_eq!(warnings, vec![(7, WarnKind::OrphanLabel)]);
}

#[test]
fn labels_resolve_after_optimize() {
    let mut object = test_object();
    let section = code_section(&mut object);
    let start = define_label(&mut object, section, "start", 1);
    append_filler(&mut object, section, 12, 2);
    let end = define_label(&mut object, section, "end", 3);
    optimize_ok(&mut object);
    assert_eq!(label_offset(&object, start), 0);
    assert_eq!(label_offset(&object, end), 12);
}
