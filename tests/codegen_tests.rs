//! IR generation: end-to-end lowering of small programs, checked against the
//! module's textual IR, plus the semantic error taxonomy.

use inkwell::context::Context;
use minicc::{Codegen, Lexer, Parser};

struct Compiled {
    ir: String,
    ok: bool,
    diags: Vec<String>,
}

fn compile(src: &str) -> Compiled {
    let mut parser = Parser::new(Lexer::new("test.c", src));
    let unit = parser.parse();
    assert!(
        !parser.has_errors(),
        "parse errors: {:?}",
        parser.diagnostics()
    );

    let ctx = Context::create();
    let mut cg = Codegen::new(&ctx, "test", "test.c");
    let verified = cg.emit_unit(&unit);
    assert!(verified.is_ok(), "module verification failed: {verified:?}");
    Compiled {
        ir: cg.ir_string(),
        ok: !cg.has_errors(),
        diags: cg
            .diagnostics()
            .iter()
            .map(|d| d.message.clone())
            .collect(),
    }
}

fn compile_ok(src: &str) -> String {
    let compiled = compile(src);
    assert!(compiled.ok, "semantic errors: {:?}", compiled.diags);
    compiled.ir
}

fn compile_err(src: &str) -> Vec<String> {
    let compiled = compile(src);
    assert!(!compiled.ok, "expected semantic errors, IR:\n{}", compiled.ir);
    compiled.diags
}

/* ------------------------------- lowering -------------------------------- */

#[test]
fn arithmetic_function_spills_and_reloads_arguments() {
    let ir = compile_ok("int add(int a, int b) { return a + b; }");
    assert!(ir.contains("define i32 @add(i32 %a, i32 %b)"), "ir:\n{ir}");
    assert_eq!(ir.matches("alloca i32").count(), 2);
    assert_eq!(ir.matches("load i32").count(), 2);
    assert!(ir.contains("add i32"));
    assert!(ir.contains("ret i32"));
}

#[test]
fn recursion_resolves_before_the_body_is_finished() {
    let ir = compile_ok(
        "int factorial(int n) {\n\
         \x20 if (n <= 1) return 1;\n\
         \x20 return n * factorial(n - 1);\n\
         }",
    );
    assert!(ir.contains("icmp sle i32"));
    assert!(ir.contains("br i1"));
    assert!(ir.contains("ret i32 1"));
    assert!(ir.contains("call i32 @factorial"));
}

#[test]
fn global_array_roundtrip_uses_leading_zero_geps() {
    let ir = compile_ok(
        "int a[3];\n\
         int main() { a[0] = 7; a[1] = 11; a[2] = 13; return a[0] + a[1] + a[2]; }",
    );
    assert!(ir.contains("@a = global [3 x i32] zeroinitializer"), "ir:\n{ir}");
    // three stores plus three loads, each through its own GEP
    assert_eq!(ir.matches("getelementptr").count(), 6);
    assert!(ir.contains("getelementptr [3 x i32], ptr @a, i32 0, i32 2"));
    assert!(ir.contains("store i32 7"));
    assert_eq!(ir.matches("add i32").count(), 2);
}

#[test]
fn logical_and_short_circuits_the_divide() {
    let ir = compile_ok("int f(int x) { return (x != 0) && (100 / x > 1); }");
    assert!(ir.contains("and.rhs:"));
    assert!(ir.contains("and.merge:"));
    assert!(ir.contains("phi i1 [ false, %entry ]"), "ir:\n{ir}");
    // the division must sit in the right-hand block, after its label
    let rhs_at = ir.find("and.rhs:").expect("rhs block");
    let div_at = ir.find("sdiv").expect("division");
    assert!(div_at > rhs_at, "sdiv emitted before the rhs block:\n{ir}");
}

#[test]
fn logical_or_swaps_the_branch_targets() {
    let ir = compile_ok("int f(int x) { return (x == 0) || (100 / x > 1); }");
    assert!(ir.contains("or.rhs:"));
    assert!(ir.contains("phi i1 [ true, %entry ]"), "ir:\n{ir}");
}

#[test]
fn for_loop_with_break_targets_the_exit_block() {
    let ir = compile_ok(
        "int main() {\n\
         \x20 int s = 0;\n\
         \x20 for (int i = 0; i < 10; i = i + 1) { if (i == 5) break; s = s + i; }\n\
         \x20 return s;\n\
         }",
    );
    for label in ["for.cond:", "for.body:", "for.step:", "for.end:"] {
        assert!(ir.contains(label), "missing {label} in:\n{ir}");
    }
    assert!(ir.contains("br label %for.end"));
}

#[test]
fn continue_targets_the_step_block() {
    let ir = compile_ok(
        "int main() {\n\
         \x20 int s = 0;\n\
         \x20 for (int i = 0; i < 10; i = i + 1) { if (i == 5) continue; s = s + i; }\n\
         \x20 return s;\n\
         }",
    );
    assert!(ir.contains("br label %for.step"));
}

#[test]
fn while_loop_reenters_through_the_condition() {
    let ir = compile_ok(
        "int main() { int i = 0; while (i < 3) { i = i + 1; } return i; }",
    );
    for label in ["while.cond:", "while.body:", "while.end:"] {
        assert!(ir.contains(label), "missing {label} in:\n{ir}");
    }
    assert!(ir.contains("br label %while.cond"));
}

#[test]
fn ternary_merges_through_a_phi() {
    let ir = compile_ok("int max(int a, int b) { return a > b ? a : b; }");
    assert!(ir.contains("tern.then:"));
    assert!(ir.contains("tern.else:"));
    assert!(ir.contains("phi i32"));
}

#[test]
fn if_with_both_arms_returning_verifies() {
    let ir = compile_ok("int sign(int x) { if (x < 0) { return 0 - 1; } else { return 1; } }");
    assert_eq!(ir.matches("ret i32").count(), 2);
}

#[test]
fn dead_code_after_return_is_dropped() {
    let ir = compile_ok("int f() { return 1; return 2; }");
    assert!(ir.contains("ret i32 1"));
    assert!(!ir.contains("ret i32 2"));
}

#[test]
fn char_values_widen_on_use() {
    let ir = compile_ok("int main() { char c; c = 'a'; return c; }");
    assert!(ir.contains("alloca i8"));
    assert!(ir.contains("store i8 97"));
    assert!(ir.contains("sext i8"));
}

#[test]
fn string_literal_becomes_a_null_terminated_global() {
    let ir = compile_ok("int main() { \"hi\"; return 0; }");
    assert!(ir.contains("c\"hi\\00\""), "ir:\n{ir}");
}

#[test]
fn local_array_brace_init_is_flattened_row_major() {
    let ir = compile_ok("int main() { int b[2][2] = {{1, 2}, {3}}; return b[1][0]; }");
    // three initializing stores; b[1][1] stays undefined
    assert_eq!(ir.matches("store i32").count(), 3);
    assert!(ir.contains("getelementptr [2 x [2 x i32]], ptr %b, i32 0, i32 1, i32 0"));
}

#[test]
fn scalar_initializer_broadcasts_to_every_element() {
    let ir = compile_ok("int main() { int a[4] = 0; return a[3]; }");
    assert_eq!(ir.matches("store i32 0").count(), 4);
}

#[test]
fn excess_initializers_are_truncated() {
    let ir = compile_ok("int main() { int a[2] = {1, 2, 3, 4}; return a[0]; }");
    assert_eq!(ir.matches("arrayinit").count(), 2);
}

#[test]
fn local_array_argument_decays_to_a_pointer() {
    let ir = compile_ok(
        "int sum(int a[], int n) {\n\
         \x20 int s = 0;\n\
         \x20 for (int i = 0; i < n; i = i + 1) { s = s + a[i]; }\n\
         \x20 return s;\n\
         }\n\
         int main() { int v[3] = {1, 2, 3}; return sum(v, 3); }",
    );
    assert!(ir.contains("define i32 @sum(ptr %a, i32 %n)"), "ir:\n{ir}");
    assert!(ir.contains("arraydecay"));
    // inside sum: load the pointer, then index element-wise
    assert!(ir.contains("getelementptr i32, ptr"));
}

#[test]
fn matrix_parameter_strides_by_the_inner_row_type() {
    let ir = compile_ok("int get(int m[][3], int i, int j) { return m[i][j]; }");
    assert!(ir.contains("define i32 @get(ptr %m, i32 %i, i32 %j)"));
    assert!(ir.contains("getelementptr [3 x i32], ptr"), "ir:\n{ir}");
    assert!(ir.contains("getelementptr i32, ptr"));
}

#[test]
fn void_function_gets_a_synthesized_return() {
    let ir = compile_ok("void noop() { } int main() { noop(); return 0; }");
    assert!(ir.contains("define void @noop()"));
    assert!(ir.contains("ret void"));
    assert!(ir.contains("call void @noop()"));
}

#[test]
fn global_scalar_initializers_are_constant_folded() {
    let ir = compile_ok("int g = 2 + 3 * 4; int main() { return g; }");
    assert!(ir.contains("@g = global i32 14"), "ir:\n{ir}");
}

#[test]
fn const_globals_are_marked_constant() {
    let ir = compile_ok("const int N = 10; int main() { return N; }");
    assert!(ir.contains("@N = constant i32 10"), "ir:\n{ir}");
}

#[test]
fn shadowing_in_nested_scopes_compiles_cleanly() {
    let ir = compile_ok(
        "int main() {\n\
         \x20 int x = 1;\n\
         \x20 { int x = 2; { int x = 3; } }\n\
         \x20 return x;\n\
         }",
    );
    assert_eq!(ir.matches("alloca i32").count(), 3);
}

#[test]
fn sequential_loops_keep_the_loop_stack_balanced() {
    compile_ok(
        "int main() {\n\
         \x20 int s = 0;\n\
         \x20 while (s < 3) { s = s + 1; }\n\
         \x20 for (int i = 0; i < 2; i = i + 1) { while (i) { break; } }\n\
         \x20 while (s) { break; }\n\
         \x20 return s;\n\
         }",
    );
}

/* ----------------------------- error reporting ---------------------------- */

#[test]
fn undeclared_variable_is_reported() {
    let diags = compile_err("int main() { return y; }");
    assert!(diags.iter().any(|m| m.contains("Undeclared variable: y")));
}

#[test]
fn unknown_function_is_reported() {
    let diags = compile_err("int main() { return f(1); }");
    assert!(diags.iter().any(|m| m.contains("Unknown function: f")));
}

#[test]
fn argument_count_mismatch_is_reported() {
    let diags = compile_err(
        "int add(int a, int b) { return a + b; } int main() { return add(1); }",
    );
    assert!(diags
        .iter()
        .any(|m| m.contains("Incorrect number of arguments")));
}

#[test]
fn break_outside_loop_is_reported() {
    let diags = compile_err("int main() { break; return 0; }");
    assert!(diags.iter().any(|m| m.contains("Break statement outside")));
}

#[test]
fn continue_outside_loop_is_reported() {
    let diags = compile_err("int main() { continue; return 0; }");
    assert!(diags
        .iter()
        .any(|m| m.contains("Continue statement outside")));
}

#[test]
fn assignment_to_const_is_rejected() {
    let diags = compile_err("int main() { const int x = 1; x = 2; return x; }");
    assert!(diags
        .iter()
        .any(|m| m.contains("Cannot assign to const variable: x")));
}

#[test]
fn prefix_increment_is_rejected_at_lowering() {
    let diags = compile_err("int main() { int x = 1; return ++x; }");
    assert!(diags
        .iter()
        .any(|m| m.contains("Prefix increment/decrement is not supported")));
}

#[test]
fn void_call_as_a_value_is_rejected() {
    let diags = compile_err("void v() { } int main() { return v(); }");
    assert!(diags.iter().any(|m| m.contains("Void function used as a value")));
}

#[test]
fn initializer_list_outside_initializer_is_rejected() {
    let diags = compile_err("int main() { int x = {{1}}; return x; }");
    assert!(diags
        .iter()
        .any(|m| m.contains("only valid as a variable initializer")));
}

#[test]
fn same_scope_redeclaration_is_rejected() {
    let diags = compile_err("int main() { int x; int x; return 0; }");
    assert!(diags
        .iter()
        .any(|m| m.contains("Redeclaration of variable: x")));
}

#[test]
fn non_constant_global_initializer_is_rejected() {
    let diags = compile_err("int g1 = 1; int g2 = g1; int main() { return 0; }");
    assert!(diags
        .iter()
        .any(|m| m.contains("initializer must be constant")));
}

#[test]
fn non_constant_array_dimension_is_rejected() {
    let diags = compile_err("int main() { int n = 3; int a[n]; return 0; }");
    assert!(diags
        .iter()
        .any(|m| m.contains("Array size must be a constant expression")));
}

#[test]
fn non_positive_array_dimension_is_rejected() {
    let diags = compile_err("int a[0]; int main() { return 0; }");
    assert!(diags.iter().any(|m| m.contains("Array size must be positive")));
}

#[test]
fn void_variable_is_rejected() {
    let diags = compile_err("void x; int main() { return 0; }");
    assert!(diags
        .iter()
        .any(|m| m.contains("Variable declared with void type")));
}

#[test]
fn lowering_continues_past_the_first_error() {
    let diags = compile_err("int main() { break; continue; return y; }");
    assert!(diags.len() >= 3, "expected accumulation, got {diags:?}");
}
