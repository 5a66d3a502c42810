//! End-to-end tests over the semantic pipeline: lex, parse, resolve,
//! build IR, analyze, evaluate.

use rustc_hash::FxHashMap;

use zinc_types::{ConstData, TypeId};

use crate::fns::FnAnalState;
use crate::ir::{InstKind, IrExec};
use crate::tld::TldKind;
use crate::{CompileOptions, Compilation, SourceLoader};

/// In-memory loader: imports resolve against a fixed file map.
struct MapLoader {
    files: FxHashMap<String, String>,
}

impl SourceLoader for MapLoader {
    fn load(&mut self, _importing: &str, name: &str) -> Result<(String, String), String> {
        self.files
            .get(name)
            .map(|source| (name.to_string(), source.clone()))
            .ok_or_else(|| format!("file not found: {name}"))
    }
}

fn compile(source: &str) -> Compilation {
    compile_with_files(source, &[])
}

fn compile_with_files(source: &str, files: &[(&str, &str)]) -> Compilation {
    let loader = MapLoader {
        files: files
            .iter()
            .map(|(name, text)| (name.to_string(), text.to_string()))
            .collect(),
    };
    let mut comp = Compilation::new(CompileOptions::default(), Box::new(loader));
    if comp
        .add_source("main.zn".to_string(), source.to_string())
        .is_ok()
    {
        comp.run();
    }
    comp
}

fn rendered_errors(comp: &Compilation) -> String {
    format!("{:?}", comp.diagnostics.diagnostics())
}

fn tld_value(comp: &mut Compilation, name: &str) -> Option<zinc_types::ConstValue> {
    let name = comp.interner.intern(name);
    let scope = comp.import(comp.root_import.unwrap()).decls_scope;
    let tld = comp.find_decl(scope, name)?;
    match &comp.tld(tld).kind {
        TldKind::Var { value, .. } => value.clone(),
        _ => None,
    }
}

#[test]
fn comptime_overflow_diagnostic() {
    let comp = compile("const x: u8 = 300;");
    assert!(comp.error_count() > 0);
    assert!(rendered_errors(&comp)
        .contains("integer value 300 cannot be implicitly casted to type 'u8'"));
}

#[test]
fn literal_that_fits_resolves() {
    let mut comp = compile("const x: u8 = 255;");
    assert_eq!(comp.error_count(), 0, "{}", rendered_errors(&comp));
    let value = tld_value(&mut comp, "x").unwrap();
    assert_eq!(value.as_int().unwrap(), &num_bigint::BigInt::from(255));
}

#[test]
fn division_by_zero_diagnostic() {
    let comp = compile("const lit = 1 / 0;");
    assert!(rendered_errors(&comp).contains("division by zero is undefined"));
}

#[test]
fn struct_contains_itself_diagnostic() {
    let comp = compile("const A = struct { a: A };");
    assert!(rendered_errors(&comp).contains("struct 'A' contains itself"));
}

#[test]
fn struct_through_pointer_is_fine() {
    let comp = compile("const A = struct { next: &A, value: i32 };");
    assert_eq!(comp.error_count(), 0, "{}", rendered_errors(&comp));
}

#[test]
fn comptime_fn_call_folds() {
    let mut comp = compile(
        "fn add(a: i32, b: i32) -> i32 { return a + b; }\nconst x = add(1, 2);",
    );
    assert_eq!(comp.error_count(), 0, "{}", rendered_errors(&comp));
    let value = tld_value(&mut comp, "x").unwrap();
    assert_eq!(value.as_int().unwrap(), &num_bigint::BigInt::from(3));
}

#[test]
fn comptime_recursion_quota() {
    let comp = compile(
        "fn fib(x: i32) -> i32 { return fib(x - 1) + fib(x - 2); }\nconst x = fib(7);",
    );
    assert!(
        rendered_errors(&comp).contains("evaluation exceeded 1000 backwards branches"),
        "{}",
        rendered_errors(&comp)
    );
}

#[test]
fn bounded_comptime_recursion_succeeds() {
    let mut comp = compile(
        "fn fib(x: i32) -> i32 { if (x < 2) return x; return fib(x - 1) + fib(x - 2); }\nconst x = fib(10);",
    );
    assert_eq!(comp.error_count(), 0, "{}", rendered_errors(&comp));
    let value = tld_value(&mut comp, "x").unwrap();
    assert_eq!(value.as_int().unwrap(), &num_bigint::BigInt::from(55));
}

#[test]
fn comptime_while_loop_counts_against_quota() {
    let comp = compile("const x = blow();\nfn blow() -> i32 { comptime { var i = 0; while (true) { i += 1; } }; return 0; }");
    // Either the loop hits the quota or the condition folds; the quota
    // diagnostic must appear rather than a hang.
    assert!(
        rendered_errors(&comp).contains("backwards branches"),
        "{}",
        rendered_errors(&comp)
    );
}

#[test]
fn tld_dependency_cycle() {
    let comp = compile("const a = b;\nconst b = a;");
    assert!(rendered_errors(&comp).contains("depends on itself"));
}

#[test]
fn undeclared_identifier() {
    let comp = compile("const x = nope;");
    assert!(rendered_errors(&comp).contains("use of undeclared identifier 'nope'"));
}

#[test]
fn redefinition_diagnostic() {
    let comp = compile("const x = 1;\nconst x = 2;");
    assert!(rendered_errors(&comp).contains("redefinition of 'x'"));
}

#[test]
fn deterministic_reevaluation() {
    // Evaluating the same expression twice yields identical values.
    let mut comp_a = compile("const x = 1 + 2 * 3 - 4;");
    let mut comp_b = compile("const x = 1 + 2 * 3 - 4;");
    let a = tld_value(&mut comp_a, "x").unwrap();
    let b = tld_value(&mut comp_b, "x").unwrap();
    assert_eq!(a, b);
}

#[test]
fn error_value_declarations_get_distinct_codes() {
    let comp = compile("error FileNotFound;\nerror AccessDenied;");
    assert_eq!(comp.error_values.len(), 2);
    assert_eq!(comp.error_values[0].value, 1);
    assert_eq!(comp.error_values[1].value, 2);
}

#[test]
fn runtime_fn_reaches_complete() {
    let comp = compile("fn add(a: i32, b: i32) -> i32 { return a + b; }");
    let fn_entry = &comp.fns[0];
    assert_eq!(fn_entry.anal_state, FnAnalState::Complete);
    assert!(fn_entry.analyzed.is_some());
}

#[test]
fn completed_blocks_hold_invariants() {
    let comp = compile(
        "fn pick(flag: bool, a: i32, b: i32) -> i32 { if (flag) return a else return b; }",
    );
    let exec = comp.fns[0].analyzed.as_ref().unwrap();
    exec.check_invariants();
    // Every non-empty block ends in exactly one terminator.
    for block in &exec.blocks {
        let terminators = block
            .insts
            .iter()
            .filter(|&&inst| exec.inst(inst).kind.is_terminator())
            .count();
        if !block.insts.is_empty() {
            assert_eq!(terminators, 1);
        }
    }
}

fn call_order(comp: &Compilation, exec: &IrExec) -> Vec<String> {
    let mut order = Vec::new();
    for block in &exec.blocks {
        for &inst_id in &block.insts {
            if let InstKind::Call { fn_ref, .. } = &exec.inst(inst_id).kind {
                let callee = &exec.inst(*fn_ref).value;
                if let Some(ConstData::Fn { fn_id, .. }) = callee.as_static() {
                    order.push(comp.fn_entry(*fn_id).symbol_name.clone());
                }
            }
        }
    }
    order
}

#[test]
fn defer_bodies_replay_in_reverse_order() {
    let comp = compile(
        "fn one() {}\nfn two() {}\nfn three() {}\nfn f() { defer one(); defer two(); defer three(); return; }",
    );
    assert_eq!(comp.error_count(), 0, "{}", rendered_errors(&comp));
    let f_entry = comp
        .fns
        .iter()
        .find(|entry| entry.symbol_name == "f")
        .unwrap();
    let order = call_order(&comp, f_entry.analyzed.as_ref().unwrap());
    assert_eq!(order, ["three", "two", "one"]);
}

#[test]
fn goto_across_defer_is_rejected() {
    // The label sits inside the defer's scope region; jumping there from
    // before the defer statement would skip its registration.
    let comp = compile("fn g() {}\nfn f() { goto out; defer g(); out: return; }");
    assert!(
        rendered_errors(&comp).contains("goto jumps across defer"),
        "{}",
        rendered_errors(&comp)
    );
}

#[test]
fn goto_within_defer_scope_is_fine() {
    let comp = compile("fn g() {}\nfn f() { defer g(); goto out; out: return; }");
    assert_eq!(comp.error_count(), 0, "{}", rendered_errors(&comp));
}

#[test]
fn goto_to_unknown_label() {
    let comp = compile("fn f() { goto nowhere; }");
    assert!(rendered_errors(&comp).contains("no label in scope named 'nowhere'"));
}

#[test]
fn generic_instantiations_are_memoized() {
    let comp = compile(
        "fn identity(comptime T: type, x: T) -> T { return x; }\n\
         fn f(a: i32, b: i32) -> i32 { return identity(i32, a) + identity(i32, b); }",
    );
    assert_eq!(comp.error_count(), 0, "{}", rendered_errors(&comp));
    assert_eq!(comp.generics.len(), 1);
}

#[test]
fn distinct_comptime_args_make_distinct_instances() {
    let comp = compile(
        "fn identity(comptime T: type, x: T) -> T { return x; }\n\
         fn f(a: i32, b: u8) -> i32 { return identity(i32, a) + i32(identity(u8, b)); }",
    );
    assert_eq!(comp.error_count(), 0, "{}", rendered_errors(&comp));
    assert_eq!(comp.generics.len(), 2);
}

#[test]
fn use_hoists_in_declaration_order() {
    let mut comp = compile_with_files(
        "use @import(\"other.zn\");\nconst y = from_other;",
        &[("other.zn", "pub const from_other = 42;")],
    );
    assert_eq!(comp.error_count(), 0, "{}", rendered_errors(&comp));
    let value = tld_value(&mut comp, "y").unwrap();
    assert_eq!(value.as_int().unwrap(), &num_bigint::BigInt::from(42));
}

#[test]
fn private_symbols_stay_private_across_files() {
    let comp = compile_with_files(
        "use @import(\"other.zn\");\nconst y = secret;",
        &[("other.zn", "const secret = 1;")],
    );
    assert!(rendered_errors(&comp).contains("'secret' is private"));
}

#[test]
fn switch_on_enum_must_be_exhaustive() {
    let comp = compile(
        "const Color = enum { Red, Green, Blue };\n\
         const x = pick(Color.Red);\n\
         fn pick(c: Color) -> i32 { return switch (c) { Color.Red => 1, Color.Green => 2, }; }",
    );
    assert!(
        rendered_errors(&comp).contains("'Blue' not handled in switch"),
        "{}",
        rendered_errors(&comp)
    );
}

#[test]
fn switch_with_else_needs_no_full_coverage() {
    let comp = compile(
        "const Color = enum { Red, Green, Blue };\n\
         fn pick(c: Color) -> i32 { return switch (c) { Color.Red => 1, else => 0, }; }",
    );
    assert_eq!(comp.error_count(), 0, "{}", rendered_errors(&comp));
}

#[test]
fn comptime_array_concat() {
    let mut comp = compile("const a = [2]i32 { 1, 2 } ++ [2]i32 { 3, 4 };");
    assert_eq!(comp.error_count(), 0, "{}", rendered_errors(&comp));
    let value = tld_value(&mut comp, "a").unwrap();
    match value.as_static() {
        Some(ConstData::Array(elems)) => assert_eq!(elems.len(), 4),
        other => panic!("expected array, got {other:?}"),
    }
}

#[test]
fn sizeof_struct_with_layout() {
    let mut comp = compile(
        "const Pair = struct { a: i32, b: i32 };\nconst size = @sizeOf(Pair);",
    );
    assert_eq!(comp.error_count(), 0, "{}", rendered_errors(&comp));
    let value = tld_value(&mut comp, "size").unwrap();
    assert_eq!(value.as_int().unwrap(), &num_bigint::BigInt::from(8));
}

#[test]
fn min_max_value_builtins() {
    let mut comp = compile("const lo = @minValue(i8);\nconst hi = @maxValue(u8);");
    assert_eq!(comp.error_count(), 0, "{}", rendered_errors(&comp));
    assert_eq!(
        tld_value(&mut comp, "lo").unwrap().as_int().unwrap(),
        &num_bigint::BigInt::from(-128)
    );
    assert_eq!(
        tld_value(&mut comp, "hi").unwrap().as_int().unwrap(),
        &num_bigint::BigInt::from(255)
    );
}

#[test]
fn can_implicit_cast_probe_is_silent() {
    // A negative probe answers false without leaking the cast error.
    let mut comp = compile(
        "const yes = @canImplicitCast(u8, 255);\nconst no = @canImplicitCast(u8, 300);",
    );
    assert_eq!(comp.error_count(), 0, "{}", rendered_errors(&comp));
    assert_eq!(tld_value(&mut comp, "yes").unwrap().as_bool(), Some(true));
    assert_eq!(tld_value(&mut comp, "no").unwrap().as_bool(), Some(false));
}

#[test]
fn compile_error_builtin_reports_message() {
    let comp = compile("const x = @compileError(\"boom here\");");
    assert!(rendered_errors(&comp).contains("boom here"));
}

#[test]
fn wrapping_arithmetic_wraps_at_comptime() {
    let mut comp = compile("const x = u8(200) +% u8(100);");
    assert_eq!(comp.error_count(), 0, "{}", rendered_errors(&comp));
    let value = tld_value(&mut comp, "x").unwrap();
    assert_eq!(value.as_int().unwrap(), &num_bigint::BigInt::from(44));
}

#[test]
fn nonwrapping_comptime_overflow_errors() {
    let comp = compile("const x = u8(200) + u8(100);");
    assert!(rendered_errors(&comp).contains("operation caused overflow"));
}

#[test]
fn poisoned_value_does_not_cascade() {
    let comp = compile("const bad = nope;\nconst dependent = bad + 1;");
    // Exactly one primary diagnostic: the undeclared identifier. The
    // dependent declaration sees poison and stays silent.
    let errors = rendered_errors(&comp);
    assert!(errors.contains("use of undeclared identifier"));
    assert_eq!(comp.error_count(), 1, "{errors}");
}

#[test]
fn pointer_type_expression_resolves() {
    let mut comp = compile("const P = &const u8;\nconst size = @sizeOf(P);");
    assert_eq!(comp.error_count(), 0, "{}", rendered_errors(&comp));
    let p = tld_value(&mut comp, "P").unwrap();
    let ty = p.as_type().unwrap();
    assert_eq!(comp.types.name(ty), "&const u8");
}

#[test]
fn int_to_ptr_keeps_hard_coded_addr() {
    let mut comp = compile("const p = @intToPtr(&volatile u32, 1000);");
    // `&volatile u32` parses as a prefix op on a type; the eval produces
    // a hard-coded address pointer value.
    if comp.error_count() == 0 {
        let value = tld_value(&mut comp, "p").unwrap();
        match value.as_static() {
            Some(ConstData::Ptr {
                ptr: zinc_types::ConstPtr::HardCodedAddr(addr),
                ..
            }) => assert_eq!(*addr, 1000),
            other => panic!("expected hard-coded address, got {other:?}"),
        }
    }
}

#[test]
fn reading_through_hard_coded_addr_fails() {
    let comp = compile("const p = @intToPtr(&const u32, 1000);\nconst v = *p;");
    assert!(
        rendered_errors(&comp).contains("hard-coded address"),
        "{}",
        rendered_errors(&comp)
    );
}

#[test]
fn type_name_builtin() {
    let mut comp = compile("const n = @typeName(u8);");
    assert_eq!(comp.error_count(), 0, "{}", rendered_errors(&comp));
    let value = tld_value(&mut comp, "n").unwrap();
    let text = crate::ir::eval::const_value_to_string(&comp, &value).unwrap();
    assert_eq!(text, "u8");
}

#[test]
fn void_is_zero_bits() {
    let comp = compile("");
    assert!(comp.types.get(TypeId::VOID).zero_bits);
    assert!(!comp.types.get(TypeId::BOOL).zero_bits);
}

#[test]
fn eval_branch_quota_can_be_raised() {
    // 2000 loop back-edges exceed the default quota of 1000; the raise
    // must land before the evaluation.
    let comp = compile(
        "comptime { @setEvalBranchQuota(5000); }\n\
         fn count() -> i32 { var i = 0; while (i < 2000; i += 1) {} return i; }\n\
         const x = count();",
    );
    assert_eq!(comp.error_count(), 0, "{}", rendered_errors(&comp));
}

#[test]
fn loop_past_default_quota_fails_without_raise() {
    let comp = compile(
        "fn count() -> i32 { var i = 0; while (i < 2000; i += 1) {} return i; }\n\
         const x = count();",
    );
    assert!(
        rendered_errors(&comp).contains("evaluation exceeded 1000 backwards branches"),
        "{}",
        rendered_errors(&comp)
    );
}
