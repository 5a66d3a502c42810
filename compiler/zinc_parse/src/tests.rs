//! Parser tests over lexed input.

use zinc_ir::ast::{BinOp, ContainerKind, DeferKind, NodeKind, NumLit, PrefixOp, ReturnKind};
use zinc_ir::StringInterner;

use crate::ParseOutput;

fn parse_source(source: &str) -> (ParseOutput, StringInterner) {
    let interner = StringInterner::new();
    let tokens = zinc_lexer::lex(source, &interner).expect("lex failure");
    let output = crate::parse(&tokens, &interner).expect("parse failure");
    (output, interner)
}

fn root_decls(output: &ParseOutput) -> Vec<zinc_ir::ast::NodeId> {
    match output.arena.kind(output.root) {
        NodeKind::Root { decls } => output.arena.list(*decls).to_vec(),
        other => panic!("expected root, got {other:?}"),
    }
}

#[test]
fn parse_const_decl() {
    let (output, interner) = parse_source("const x: u8 = 300;");
    let decls = root_decls(&output);
    assert_eq!(decls.len(), 1);
    let NodeKind::VarDecl(decl) = output.arena.kind(decls[0]) else {
        panic!("expected var decl");
    };
    assert!(decl.is_const);
    assert_eq!(interner.lookup(decl.name), "x");
    assert!(decl.ty.is_some());
    assert!(decl.init.is_some());
}

#[test]
fn parse_fn_def() {
    let (output, interner) = parse_source("fn add(a: i32, b: i32) -> i32 { return a + b; }");
    let decls = root_decls(&output);
    let NodeKind::FnDef { proto, body } = output.arena.kind(decls[0]) else {
        panic!("expected fn def");
    };
    let NodeKind::FnProto(proto) = output.arena.kind(*proto) else {
        panic!("expected fn proto");
    };
    assert_eq!(interner.lookup(proto.name), "add");
    assert_eq!(output.arena.list(proto.params).len(), 2);
    assert!(proto.return_ty.is_some());
    let NodeKind::Block { stmts } = output.arena.kind(*body) else {
        panic!("expected block body");
    };
    let stmts = output.arena.list(*stmts);
    let NodeKind::Return { kind, expr } = output.arena.kind(stmts[0]) else {
        panic!("expected return");
    };
    assert_eq!(*kind, ReturnKind::Unconditional);
    let NodeKind::BinOp { op, .. } = output.arena.kind(expr.unwrap()) else {
        panic!("expected binop");
    };
    assert_eq!(*op, BinOp::Add);
}

#[test]
fn parse_extern_fn_decl() {
    let (output, _) = parse_source("extern fn puts(s: &const u8) -> c_int;");
    let decls = root_decls(&output);
    let NodeKind::FnDecl { proto } = output.arena.kind(decls[0]) else {
        panic!("expected extern fn decl");
    };
    let NodeKind::FnProto(proto) = output.arena.kind(*proto) else {
        panic!("expected proto");
    };
    assert!(proto.is_extern);
}

#[test]
fn precedence_mul_binds_tighter_than_add() {
    let (output, _) = parse_source("const x = 1 + 2 * 3;");
    let decls = root_decls(&output);
    let NodeKind::VarDecl(decl) = output.arena.kind(decls[0]) else {
        panic!()
    };
    let NodeKind::BinOp { op, rhs, .. } = output.arena.kind(decl.init.unwrap()) else {
        panic!("expected top-level add");
    };
    assert_eq!(*op, BinOp::Add);
    let NodeKind::BinOp { op: rhs_op, .. } = output.arena.kind(*rhs) else {
        panic!("expected mul under add");
    };
    assert_eq!(*rhs_op, BinOp::Mult);
}

#[test]
fn wrapping_ops_parse() {
    let (output, _) = parse_source("const x = a +% b *% c;");
    let decls = root_decls(&output);
    let NodeKind::VarDecl(decl) = output.arena.kind(decls[0]) else {
        panic!()
    };
    let NodeKind::BinOp { op, .. } = output.arena.kind(decl.init.unwrap()) else {
        panic!()
    };
    assert_eq!(*op, BinOp::AddWrap);
}

#[test]
fn container_decl_with_self_reference() {
    let (output, interner) = parse_source("const A = struct { a: A };");
    let decls = root_decls(&output);
    let NodeKind::VarDecl(decl) = output.arena.kind(decls[0]) else {
        panic!()
    };
    let NodeKind::ContainerDecl(container) = output.arena.kind(decl.init.unwrap()) else {
        panic!("expected container decl");
    };
    assert_eq!(container.kind, ContainerKind::Struct);
    let fields = output.arena.list(container.fields);
    assert_eq!(fields.len(), 1);
    let NodeKind::StructField { name, ty } = output.arena.kind(fields[0]) else {
        panic!()
    };
    assert_eq!(interner.lookup(*name), "a");
    assert!(ty.is_some());
}

#[test]
fn defer_kinds() {
    let (output, _) =
        parse_source("fn f() { defer a(); %defer b(); ?defer c(); }");
    let decls = root_decls(&output);
    let NodeKind::FnDef { body, .. } = output.arena.kind(decls[0]) else {
        panic!()
    };
    let NodeKind::Block { stmts } = output.arena.kind(*body) else {
        panic!()
    };
    let kinds: Vec<DeferKind> = output
        .arena
        .list(*stmts)
        .iter()
        .map(|&stmt| match output.arena.kind(stmt) {
            NodeKind::Defer { kind, .. } => *kind,
            other => panic!("expected defer, got {other:?}"),
        })
        .collect();
    assert_eq!(
        kinds,
        [DeferKind::Unconditional, DeferKind::Error, DeferKind::Maybe]
    );
}

#[test]
fn if_var_binding() {
    let (output, interner) = parse_source("fn f() { if (const x ?= maybe()) use_it(x); }");
    let decls = root_decls(&output);
    let NodeKind::FnDef { body, .. } = output.arena.kind(decls[0]) else {
        panic!()
    };
    let NodeKind::Block { stmts } = output.arena.kind(*body) else {
        panic!()
    };
    let NodeKind::IfVar(if_var) = output.arena.kind(output.arena.list(*stmts)[0]) else {
        panic!("expected if-var");
    };
    assert!(if_var.is_const);
    assert_eq!(interner.lookup(if_var.name), "x");
}

#[test]
fn while_with_continue_expr() {
    let (output, _) = parse_source("fn f() { while (i < 10; i += 1) body(); }");
    let decls = root_decls(&output);
    let NodeKind::FnDef { body, .. } = output.arena.kind(decls[0]) else {
        panic!()
    };
    let NodeKind::Block { stmts } = output.arena.kind(*body) else {
        panic!()
    };
    let NodeKind::While {
        continue_expr,
        is_inline,
        ..
    } = output.arena.kind(output.arena.list(*stmts)[0])
    else {
        panic!("expected while");
    };
    assert!(continue_expr.is_some());
    assert!(!is_inline);
}

#[test]
fn inline_for_with_index() {
    let (output, interner) =
        parse_source("fn f() { inline for (items) |item, i| use_it(item, i); }");
    let decls = root_decls(&output);
    let NodeKind::FnDef { body, .. } = output.arena.kind(decls[0]) else {
        panic!()
    };
    let NodeKind::Block { stmts } = output.arena.kind(*body) else {
        panic!()
    };
    let NodeKind::For {
        elem_name,
        index_name,
        is_inline,
        ..
    } = output.arena.kind(output.arena.list(*stmts)[0])
    else {
        panic!("expected for");
    };
    assert!(is_inline);
    assert_eq!(interner.lookup(elem_name.unwrap()), "item");
    assert_eq!(interner.lookup(index_name.unwrap()), "i");
}

#[test]
fn switch_with_ranges_and_else() {
    let (output, _) = parse_source(
        "fn f(x: i32) -> i32 { return switch (x) { 0 => 1, 1, 2 ... 5 => 2, else => 3, }; }",
    );
    let decls = root_decls(&output);
    let NodeKind::FnDef { body, .. } = output.arena.kind(decls[0]) else {
        panic!()
    };
    let NodeKind::Block { stmts } = output.arena.kind(*body) else {
        panic!()
    };
    let NodeKind::Return { expr, .. } = output.arena.kind(output.arena.list(*stmts)[0]) else {
        panic!()
    };
    let NodeKind::Switch { prongs, .. } = output.arena.kind(expr.unwrap()) else {
        panic!("expected switch");
    };
    let prongs = output.arena.list(*prongs).to_vec();
    assert_eq!(prongs.len(), 3);
    // Second prong carries a plain item plus a range item.
    let NodeKind::SwitchProng { items, .. } = output.arena.kind(prongs[1]) else {
        panic!()
    };
    let items = output.arena.list(*items);
    assert_eq!(items.len(), 2);
    assert!(matches!(
        output.arena.kind(items[1]),
        NodeKind::SwitchRange { .. }
    ));
    // Else prong has no items.
    let NodeKind::SwitchProng { items, .. } = output.arena.kind(prongs[2]) else {
        panic!()
    };
    assert!(output.arena.list(*items).is_empty());
}

#[test]
fn goto_and_label() {
    let (output, interner) = parse_source("fn f() { loop_start: work(); goto loop_start; }");
    let decls = root_decls(&output);
    let NodeKind::FnDef { body, .. } = output.arena.kind(decls[0]) else {
        panic!()
    };
    let NodeKind::Block { stmts } = output.arena.kind(*body) else {
        panic!()
    };
    let stmts = output.arena.list(*stmts);
    assert!(matches!(output.arena.kind(stmts[0]), NodeKind::Label { .. }));
    let NodeKind::Goto { name, .. } = output.arena.kind(stmts[2]) else {
        panic!("expected goto");
    };
    assert_eq!(interner.lookup(*name), "loop_start");
}

#[test]
fn builtin_call() {
    let (output, _) = parse_source("const T = @typeOf(x);");
    let decls = root_decls(&output);
    let NodeKind::VarDecl(decl) = output.arena.kind(decls[0]) else {
        panic!()
    };
    let NodeKind::Call { is_builtin, .. } = output.arena.kind(decl.init.unwrap()) else {
        panic!("expected builtin call");
    };
    assert!(is_builtin);
}

#[test]
fn error_union_prefix_type() {
    let (output, _) = parse_source("fn f() -> %void { %return g(); }");
    let decls = root_decls(&output);
    let NodeKind::FnDef { proto, body } = output.arena.kind(decls[0]) else {
        panic!()
    };
    let NodeKind::FnProto(proto) = output.arena.kind(*proto) else {
        panic!()
    };
    let NodeKind::PrefixOp { op, .. } = output.arena.kind(proto.return_ty.unwrap()) else {
        panic!("expected %T return type");
    };
    assert_eq!(*op, PrefixOp::Error);
    let NodeKind::Block { stmts } = output.arena.kind(*body) else {
        panic!()
    };
    let NodeKind::Return { kind, .. } = output.arena.kind(output.arena.list(*stmts)[0]) else {
        panic!()
    };
    assert_eq!(*kind, ReturnKind::Error);
}

#[test]
fn try_with_else_err() {
    let (output, interner) =
        parse_source("fn f() { try (const v = may_fail()) ok(v) else |err| handle(err); }");
    let decls = root_decls(&output);
    let NodeKind::FnDef { body, .. } = output.arena.kind(decls[0]) else {
        panic!()
    };
    let NodeKind::Block { stmts } = output.arena.kind(*body) else {
        panic!()
    };
    let NodeKind::Try(try_expr) = output.arena.kind(output.arena.list(*stmts)[0]) else {
        panic!("expected try");
    };
    assert_eq!(interner.lookup(try_expr.var_name.unwrap()), "v");
    assert_eq!(interner.lookup(try_expr.err_name.unwrap()), "err");
    assert!(try_expr.else_body.is_some());
}

#[test]
fn asm_with_operands() {
    let (output, _) = parse_source(
        r#"fn f() { asm volatile ("syscall %[a] %% done" : [ret] "=r" -> usize : [a] "r" (x) : "rcx"); }"#,
    );
    let decls = root_decls(&output);
    let NodeKind::FnDef { body, .. } = output.arena.kind(decls[0]) else {
        panic!()
    };
    let NodeKind::Block { stmts } = output.arena.kind(*body) else {
        panic!()
    };
    let NodeKind::Asm(asm) = output.arena.kind(output.arena.list(*stmts)[0]) else {
        panic!("expected asm");
    };
    assert!(asm.is_volatile);
    assert_eq!(asm.outputs.len(), 1);
    assert_eq!(asm.inputs.len(), 1);
    assert_eq!(asm.clobbers.len(), 1);
    // Template pieces: literal, operand ref, literal, percent escape, literal.
    use zinc_ir::ast::AsmTemplatePiece;
    assert!(asm
        .parsed_template
        .iter()
        .any(|piece| matches!(piece, AsmTemplatePiece::Operand(_))));
    assert!(asm
        .parsed_template
        .iter()
        .any(|piece| matches!(piece, AsmTemplatePiece::Percent)));
}

#[test]
fn container_init_list_and_fields() {
    let (output, _) = parse_source("const p = Point { .x = 1, .y = 2 }; const a = Arr { 1, 2 };");
    let decls = root_decls(&output);
    let NodeKind::VarDecl(first) = output.arena.kind(decls[0]) else {
        panic!()
    };
    let NodeKind::ContainerInitExpr { is_field_init, .. } =
        output.arena.kind(first.init.unwrap())
    else {
        panic!("expected field init");
    };
    assert!(is_field_init);
    let NodeKind::VarDecl(second) = output.arena.kind(decls[1]) else {
        panic!()
    };
    let NodeKind::ContainerInitExpr { is_field_init, .. } =
        output.arena.kind(second.init.unwrap())
    else {
        panic!("expected list init");
    };
    assert!(!is_field_init);
}

#[test]
fn parse_error_names_token() {
    let interner = StringInterner::new();
    let tokens = zinc_lexer::lex("const = 1;", &interner).unwrap();
    let err = crate::parse(&tokens, &interner).unwrap_err();
    assert!(err.message.contains("expected identifier"));
    assert!(err.message.contains("'='"));
}

#[test]
fn node_ids_follow_source_order() {
    let (output, _) = parse_source("const a = 1; const b = 2;");
    let decls = root_decls(&output);
    assert!(decls[0] < decls[1]);
}
