//! Parser behavior: precedence shapes, disambiguation, and error recovery.

use minicc::ast::{
    BinaryOp, BlockItem, CompUnit, Expr, FuncDef, Stmt, TypeKind, Unit,
};
use minicc::{Diagnostic, Lexer, Parser};

fn parse(src: &str) -> (CompUnit, Vec<Diagnostic>) {
    let mut parser = Parser::new(Lexer::new("test.c", src));
    let unit = parser.parse();
    let diags = parser.diagnostics().to_vec();
    (unit, diags)
}

fn parse_ok(src: &str) -> CompUnit {
    let (unit, diags) = parse(src);
    assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
    unit
}

fn only_func(unit: &CompUnit) -> &FuncDef {
    match &unit.units[..] {
        [Unit::Func(f)] => f,
        other => panic!("expected exactly one function, got {} units", other.len()),
    }
}

/// The expression of the first `return` in the function body.
fn return_expr(func: &FuncDef) -> &Expr {
    for item in &func.body.items {
        if let BlockItem::Stmt(Stmt::Return(Some(expr))) = item {
            return expr;
        }
    }
    panic!("no return statement in {}", func.name);
}

#[test]
fn multiplication_binds_tighter_than_addition() {
    let unit = parse_ok("int f(int a, int b, int c) { return a + b * c; }");
    let Expr::Binary { op, lhs, rhs } = return_expr(only_func(&unit)) else {
        panic!("expected a binary expression");
    };
    assert_eq!(*op, BinaryOp::Add);
    assert!(matches!(**lhs, Expr::LVal(_)));
    assert!(matches!(
        **rhs,
        Expr::Binary {
            op: BinaryOp::Mul,
            ..
        }
    ));

    let unit = parse_ok("int f(int a, int b, int c) { return a * b + c; }");
    let Expr::Binary { op, lhs, rhs } = return_expr(only_func(&unit)) else {
        panic!("expected a binary expression");
    };
    assert_eq!(*op, BinaryOp::Add);
    assert!(matches!(
        **lhs,
        Expr::Binary {
            op: BinaryOp::Mul,
            ..
        }
    ));
    assert!(matches!(**rhs, Expr::LVal(_)));
}

#[test]
fn full_tower_orders_shift_relational_and_logical() {
    // (a << b) < c, not a << (b < c)
    let unit = parse_ok("int f(int a, int b, int c) { return a << b < c; }");
    let Expr::Binary { op, lhs, .. } = return_expr(only_func(&unit)) else {
        panic!("expected a binary expression");
    };
    assert_eq!(*op, BinaryOp::Lt);
    assert!(matches!(
        **lhs,
        Expr::Binary {
            op: BinaryOp::Shl,
            ..
        }
    ));

    // (a | b) && c, not a | (b && c)
    let unit = parse_ok("int f(int a, int b, int c) { return a | b && c; }");
    let Expr::Binary { op, lhs, .. } = return_expr(only_func(&unit)) else {
        panic!("expected a binary expression");
    };
    assert_eq!(*op, BinaryOp::LogAnd);
    assert!(matches!(
        **lhs,
        Expr::Binary {
            op: BinaryOp::BitOr,
            ..
        }
    ));
}

#[test]
fn ternary_is_right_associative() {
    let unit = parse_ok("int f(int a, int b, int c, int d, int e) { return a ? b : c ? d : e; }");
    let Expr::Ternary {
        cond,
        then_expr,
        else_expr,
    } = return_expr(only_func(&unit))
    else {
        panic!("expected a ternary expression");
    };
    assert!(matches!(**cond, Expr::LVal(_)));
    assert!(matches!(**then_expr, Expr::LVal(_)));
    assert!(matches!(**else_expr, Expr::Ternary { .. }));
}

#[test]
fn unary_operators_nest_to_the_right() {
    let unit = parse_ok("int f(int a) { return -~a; }");
    let Expr::Unary { operand, .. } = return_expr(only_func(&unit)) else {
        panic!("expected a unary expression");
    };
    assert!(matches!(**operand, Expr::Unary { .. }));
}

#[test]
fn call_and_subscript_disambiguate_on_lookahead() {
    let unit = parse_ok("int f(int g[]) { return g[1] + f(g); }");
    let Expr::Binary { lhs, rhs, .. } = return_expr(only_func(&unit)) else {
        panic!("expected a binary expression");
    };
    let Expr::LVal(lval) = &**lhs else {
        panic!("expected a subscripted lvalue");
    };
    assert_eq!(lval.indices.len(), 1);
    assert!(matches!(&**rhs, Expr::Call { name, args } if name == "f" && args.len() == 1));
}

#[test]
fn array_parameters_record_inner_dimensions() {
    let unit = parse_ok("int f(int a[], int b[][3]) { return a[0] + b[1][2]; }");
    let func = only_func(&unit);
    assert!(func.params[0].is_array);
    assert!(func.params[0].dims.is_empty());
    assert!(func.params[1].is_array);
    assert_eq!(func.params[1].dims.len(), 1);
    assert!(!func.params[1].ty.is_const);
    assert_eq!(func.params[1].ty.kind, TypeKind::Int);
}

#[test]
fn declarations_share_one_type_keyword() {
    let unit = parse_ok("int a[2][2] = {{1, 2}, {3, 4}}, b = 5, c;");
    let [Unit::Decl(decl)] = &unit.units[..] else {
        panic!("expected one declaration");
    };
    assert_eq!(decl.vars.len(), 3);
    assert_eq!(decl.vars[0].dims.len(), 2);
    let Some(Expr::InitList(rows)) = &decl.vars[0].init else {
        panic!("expected a brace initializer");
    };
    assert!(matches!(rows[0], Expr::InitList(_)));
    assert!(matches!(decl.vars[1].init, Some(Expr::Number(5))));
    assert!(decl.vars[2].init.is_none());
}

#[test]
fn for_accepts_declaration_init_and_empty_clauses() {
    let unit = parse_ok(
        "int f() { for (int i = 0; i < 3; i = i + 1) { ; } for (;;) { break; } return 0; }",
    );
    let func = only_func(&unit);
    let Some(BlockItem::Stmt(Stmt::For { init, cond, step, .. })) = func.body.items.first() else {
        panic!("expected a for statement");
    };
    assert!(matches!(init.as_deref(), Some(BlockItem::Decl(_))));
    assert!(cond.is_some());
    assert!(matches!(step.as_deref(), Some(Stmt::Assign { .. })));

    let Some(BlockItem::Stmt(Stmt::For { init, cond, step, .. })) = func.body.items.get(1) else {
        panic!("expected a second for statement");
    };
    assert!(init.is_none());
    assert!(cond.is_none());
    assert!(step.is_none());
}

#[test]
fn break_and_continue_are_recognized_by_lexeme() {
    let unit = parse_ok("int f() { while (1) { continue; } while (1) { break; } return 0; }");
    let func = only_func(&unit);
    let Some(BlockItem::Stmt(Stmt::While { body, .. })) = func.body.items.first() else {
        panic!("expected a while statement");
    };
    let Stmt::Block(inner) = &**body else {
        panic!("expected a block body");
    };
    assert!(matches!(inner.items[0], BlockItem::Stmt(Stmt::Continue)));

    // a variable named `breakage` must still be an identifier
    parse_ok("int f() { int breakage = 1; return breakage; }");
}

#[test]
fn recovery_from_missing_semicolon_keeps_both_declarations() {
    let (unit, diags) = parse("int x = 1 int y = 2;");
    assert!(!diags.is_empty(), "expected at least one diagnostic");
    assert_eq!(unit.units.len(), 2);
    let names: Vec<_> = unit
        .units
        .iter()
        .map(|u| match u {
            Unit::Decl(d) => d.vars[0].name.clone(),
            Unit::Func(f) => f.name.clone(),
        })
        .collect();
    assert_eq!(names, vec!["x", "y"]);
}

#[test]
fn assignment_to_non_lvalue_is_reported_and_skipped() {
    let (unit, diags) = parse("int f() { 1 = 2; return 0; }");
    assert!(diags.iter().any(|d| d.message.contains("lvalue")));
    // the return statement survives recovery
    let func = only_func(&unit);
    assert!(func
        .body
        .items
        .iter()
        .any(|i| matches!(i, BlockItem::Stmt(Stmt::Return(_)))));
}

#[test]
fn function_without_body_is_rejected() {
    let (unit, diags) = parse("int f();");
    assert!(diags.iter().any(|d| d.message.contains("missing body")));
    assert!(unit.units.is_empty());
}

#[test]
fn missing_array_dimension_in_declaration_is_rejected() {
    let (_, diags) = parse("int a[]; int main() { return 0; }");
    assert!(diags.iter().any(|d| d.message.contains("array size")
        || d.message.contains("Array size")
        || d.message.contains("Expected array size")));
}

#[test]
fn diagnostics_carry_source_locations() {
    let (_, diags) = parse("int f() {\n  return @;\n}");
    assert!(!diags.is_empty());
    assert!(diags.iter().any(|d| d.line == 2));
}

#[test]
fn parser_always_terminates_on_garbage() {
    let (_, diags) = parse("int f() { ) ) ) }");
    assert!(!diags.is_empty());
    let (_, diags) = parse("= = =");
    assert!(!diags.is_empty());
}

#[test]
fn dump_serialization_is_stable() {
    let unit = parse_ok("int f(int a) { return a + 1; }");
    assert_eq!(
        unit.dump(),
        "CompUnit\n  FuncDef int f\n    FuncParam int a\n    Block\n      Return\n        Binary(+)\n          LVal(a)\n          Number(1)\n"
    );
}
