//! Type checker acceptance and rejection matrix.
//!
//! Sources parse through the real parser, then run the checker directly
//! (no file IO); each case asserts acceptance or the key diagnostic.

use truk_base::Interner;
use truk_compile::analysis::check_program;
use truk_language::Parser;

fn check(source: &str) -> Vec<String> {
    let mut interner = Interner::new();
    let parsed = Parser::new(source, &mut interner)
        .parse()
        .unwrap_or_else(|e| panic!("parse failed: {} at {}:{}", e.message, e.line, e.column));
    let (_, errors) = check_program(&parsed.declarations, &parsed.c_imports, &interner);
    errors.into_iter().map(|e| e.message).collect()
}

fn assert_ok(source: &str) {
    let errors = check(source);
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
}

fn assert_err(source: &str, needle: &str) {
    let errors = check(source);
    assert!(
        errors.iter().any(|e| e.contains(needle)),
        "expected an error containing {:?}, got {:?}",
        needle,
        errors
    );
}

// ---------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------

#[test]
fn primitive_declarations() {
    assert_ok(
        "var a: i8 = 1;
         var b: i16 = 2;
         var c: i32 = 3;
         var d: i64 = 4;
         var e: u8 = 1;
         var f: u16 = 2;
         var g: u32 = 3;
         var h: u64 = 4;
         var i: f32 = 1.5;
         var j: f64 = 2.5;
         var k: bool = true;",
    );
}

#[test]
fn pointer_declarations() {
    assert_ok(
        "var a: *i32 = nil;
         var b: **u8 = nil;
         var c: *f64 = nil;",
    );
}

#[test]
fn sized_array_declarations() {
    assert_ok(
        "var a: [10]i32 = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
         var b: [5]f64 = [1.0, 2.0, 3.0, 4.0, 5.0];",
    );
}

#[test]
fn array_literal_length_must_match() {
    assert_err("var a: [5]i32 = [1, 2, 3];", "type mismatch");
}

#[test]
fn constant_declarations() {
    assert_ok(
        "const PI: f64 = 3.14159;
         const MAX: i32 = 100;
         const FLAG: bool = false;",
    );
}

#[test]
fn let_infers_and_is_immutable() {
    assert_ok("fn test(): i32 { let x = 5; return x; }");
    assert_err(
        "fn test(): void { let x = 5; x = 6; }",
        "cannot assign to immutable 'x'",
    );
}

#[test]
fn functions_with_params_and_returns() {
    assert_ok(
        "fn get_value(): i32 { return 42; }
         fn add(a: i32, b: i32): i32 { return a + b; }
         fn print_value(x: i32): void { return; }",
    );
}

#[test]
fn struct_declarations() {
    assert_ok(
        "struct Point { x: i32, y: i32 }
         struct Person { age: i32, height: f64, is_active: bool }
         struct Node { value: i32, next: *Node }",
    );
}

// ---------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------

#[test]
fn arithmetic_operations() {
    assert_ok(
        "fn test(): i32 {
            var a: i32 = 10;
            var b: i32 = 5;
            var sum: i32 = a + b;
            var diff: i32 = a - b;
            var prod: i32 = a * b;
            var quot: i32 = a / b;
            var rem: i32 = a % b;
            return sum;
        }",
    );
}

#[test]
fn comparison_operations() {
    assert_ok(
        "fn test(): bool {
            var a: i32 = 10;
            var b: i32 = 5;
            var eq: bool = a == b;
            var ne: bool = a != b;
            var lt: bool = a < b;
            var le: bool = a <= b;
            var gt: bool = a > b;
            var ge: bool = a >= b;
            return eq;
        }",
    );
}

#[test]
fn logical_operations() {
    assert_ok(
        "fn test(): bool {
            var a: bool = true;
            var b: bool = false;
            var and_result: bool = a && b;
            var or_result: bool = a || b;
            var not_result: bool = !a;
            return and_result;
        }",
    );
}

#[test]
fn bitwise_operations() {
    assert_ok(
        "fn test(): i32 {
            var a: i32 = 10;
            var b: i32 = 5;
            var and_result: i32 = a & b;
            var or_result: i32 = a | b;
            var xor_result: i32 = a ^ b;
            var left: i32 = a << b;
            var right: i32 = a >> b;
            var inverted: i32 = ~a;
            return and_result;
        }",
    );
}

#[test]
fn address_of_and_dereference() {
    assert_ok(
        "fn test(): i32 {
            var a: i32 = 42;
            var ptr: *i32 = &a;
            var val: i32 = *ptr;
            return val;
        }",
    );
}

#[test]
fn address_of_requires_a_place() {
    assert_err(
        "fn test(): void { var p: *i32 = &(1 + 2); }",
        "address of a temporary",
    );
}

#[test]
fn casts_between_primitives_and_pointers() {
    assert_ok(
        "fn test(): void {
            var a: i32 = 300;
            var b: u8 = a as u8;
            var c: f64 = a as f64;
            var p: *i32 = nil;
            var q: *u8 = p as *u8;
        }",
    );
}

#[test]
fn cast_pointer_to_float_rejected() {
    assert_err(
        "fn test(): void { var p: *i32 = nil; var f: f64 = p as f64; }",
        "cannot cast",
    );
}

#[test]
fn void_pointer_absorbs_both_ways() {
    assert_ok(
        "fn test(): void {
            var p: *i32 = nil;
            var v: *void = p;
            var q: *i32 = v;
        }",
    );
}

#[test]
fn string_literal_is_u8_pointer() {
    assert_ok("var s: *u8 = \"hello\";");
    assert_err("var n: i32 = \"hello\";", "type mismatch");
}

// ---------------------------------------------------------------------
// Control flow
// ---------------------------------------------------------------------

#[test]
fn if_else_chains() {
    assert_ok(
        "fn test(x: i32): i32 {
            if x > 0 { return 1; }
            else if x < 0 { return -1; }
            else { return 0; }
        }",
    );
}

#[test]
fn while_and_for_loops() {
    assert_ok(
        "fn test(): i32 {
            var i: i32 = 0;
            while i < 10 { i = i + 1; }
            var sum: i32 = 0;
            for var j: i32 = 0; j < 10; j = j + 1 { sum = sum + j; }
            return sum;
        }",
    );
}

#[test]
fn break_and_continue_inside_loops() {
    assert_ok(
        "fn test(): i32 {
            var i: i32 = 0;
            while true {
                if i >= 10 { break; }
                i = i + 1;
            }
            var sum: i32 = 0;
            while i < 10 {
                i = i + 1;
                if i % 2 == 0 { continue; }
                sum = sum + i;
            }
            return sum;
        }",
    );
}

#[test]
fn nested_scopes_shadow() {
    assert_ok(
        "fn test(): i32 {
            var x: i32 = 10;
            {
                var y: i32 = 20;
                x = y;
            }
            return x;
        }",
    );
}

#[test]
fn parameter_shadows_global_of_same_name() {
    // Scope discipline: the parameter, typed bool, wins over the global
    // i32; using it as an i32 must therefore fail.
    assert_err(
        "var flag: i32 = 1;
         fn test(flag: bool): i32 { return flag; }",
        "type mismatch",
    );
}

#[test]
fn struct_member_chains() {
    assert_ok(
        "struct Inner { value: i32 }
         struct Outer { inner: Inner, count: i32 }
         fn test(): i32 {
            var inner: Inner = Inner{value: 42};
            var outer: Outer = Outer{inner: inner, count: 1};
            return outer.inner.value;
        }",
    );
}

#[test]
fn pointer_to_struct_auto_derefs() {
    assert_ok(
        "struct Point { x: i32, y: i32 }
         fn test(p: *Point): i32 { return p.x; }",
    );
}

#[test]
fn function_calls() {
    assert_ok(
        "fn add(a: i32, b: i32): i32 { return a + b; }
         fn test(): i32 { return add(10, 20); }",
    );
}

#[test]
fn extern_and_variadic_functions() {
    assert_ok(
        "fn printf_like(fmt: *u8, ...): i32;
         fn test(): i32 { return printf_like(\"x\", 1, 2, 3); }",
    );
}

#[test]
fn variadic_requires_named_arguments() {
    assert_err(
        "fn f(a: i32, b: i32, ...): void;
         fn test(): void { f(1); }",
        "at least 2 arguments",
    );
}

// ---------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------

#[test]
fn type_mismatch_in_assignment() {
    assert_err("fn test(): void { var x: i32 = 10; x = true; }", "type mismatch");
}

#[test]
fn type_mismatch_in_initializer() {
    assert_err("var x: i32 = true;", "type mismatch");
}

#[test]
fn undefined_variable() {
    assert_err("fn test(): i32 { return undefined_var; }", "undefined variable");
}

#[test]
fn undefined_type() {
    assert_err("var x: UnknownType = nil;", "undefined type 'UnknownType'");
}

#[test]
fn wrong_return_type() {
    assert_err("fn test(): i32 { return true; }", "type mismatch");
}

#[test]
fn missing_return_value() {
    assert_err("fn test(): i32 { return; }", "missing return value");
}

#[test]
fn return_value_from_void_function() {
    assert_err("fn test(): void { return 1; }", "void function");
}

#[test]
fn missing_return_on_some_path() {
    assert_err(
        "fn test(x: i32): i32 { if x > 0 { return 1; } }",
        "must return a value on all paths",
    );
}

#[test]
fn void_function_without_return_is_fine() {
    assert_ok("fn test(): void { var x: i32 = 1; }");
}

#[test]
fn non_boolean_if_condition() {
    assert_err("fn test(): void { if 42 { } }", "condition must be bool");
}

#[test]
fn non_boolean_while_condition() {
    assert_err("fn test(): void { while 42 { break; } }", "condition must be bool");
}

#[test]
fn arithmetic_on_booleans() {
    assert_err(
        "fn test(): bool { var a: bool = true; var b: bool = false; return a + b; }",
        "numeric operands",
    );
}

#[test]
fn logical_on_integers() {
    assert_err(
        "fn test(): bool { var a: i32 = 10; var b: i32 = 20; return a && b; }",
        "bool operands",
    );
}

#[test]
fn bitwise_on_floats() {
    assert_err(
        "fn test(): f64 { var a: f64 = 1.5; var b: f64 = 2.5; return a & b; }",
        "integer operands",
    );
}

#[test]
fn mixed_concrete_arithmetic_rejected() {
    assert_err(
        "fn test(): void { var a: i32 = 1; var b: i64 = 2; var c: i64 = a + b; }",
        "same type",
    );
}

#[test]
fn call_arity_mismatch() {
    assert_err(
        "fn add(a: i32, b: i32): i32 { return a + b; }
         fn test(): i32 { return add(10); }",
        "expected 2 arguments, got 1",
    );
}

#[test]
fn call_argument_type_mismatch() {
    assert_err(
        "fn add(a: i32, b: i32): i32 { return a + b; }
         fn test(): i32 { return add(10, true); }",
        "type mismatch",
    );
}

#[test]
fn call_non_function() {
    assert_err("fn test(): void { var x: i32 = 10; x(); }", "cannot call non-function");
}

#[test]
fn index_with_non_integer() {
    assert_err(
        "fn test(): i32 { var arr: [5]i32 = [1, 2, 3, 4, 5]; return arr[true]; }",
        "index must be an integer",
    );
}

#[test]
fn index_non_array() {
    assert_err("fn test(): i32 { var x: i32 = 10; return x[0]; }", "cannot index");
}

#[test]
fn member_access_on_non_struct() {
    assert_err(
        "fn test(): i32 { var x: i32 = 10; return x.field; }",
        "member access on non-struct",
    );
}

#[test]
fn undefined_struct_field() {
    assert_err(
        "struct Point { x: i32, y: i32 }
         fn test(): i32 { var p: Point = Point{x: 10, y: 20}; return p.z; }",
        "no field 'z'",
    );
}

#[test]
fn struct_literal_field_type_mismatch() {
    assert_err(
        "struct Point { x: i32, y: i32 }
         fn test(): Point { return Point{x: true, y: 20}; }",
        "type mismatch",
    );
}

#[test]
fn struct_literal_undefined_field() {
    assert_err(
        "struct Point { x: i32, y: i32 }
         fn test(): Point { return Point{x: 10, y: 20, z: 30}; }",
        "no field 'z'",
    );
}

#[test]
fn struct_literal_missing_fields_zero_initialize() {
    assert_ok(
        "struct Point { x: i32, y: i32 }
         fn test(): Point { return Point{x: 10}; }",
    );
}

#[test]
fn break_outside_loop() {
    assert_err("fn test(): void { break; }", "break outside of loop");
}

#[test]
fn continue_outside_loop() {
    assert_err("fn test(): void { continue; }", "continue outside of loop");
}

#[test]
fn dereference_non_pointer() {
    assert_err("fn test(): i32 { var x: i32 = 10; return *x; }", "dereference");
}

#[test]
fn assignment_to_constant() {
    assert_err(
        "fn test(): void { const C: i32 = 1; C = 2; }",
        "cannot assign to immutable 'C'",
    );
}

#[test]
fn generic_functions_rejected() {
    assert_err(
        "fn identity[T](x: i32): i32 { return x; }",
        "generic functions are not supported",
    );
}

// ---------------------------------------------------------------------
// Builtins
// ---------------------------------------------------------------------

#[test]
fn make_returns_pointer() {
    assert_ok("fn test(): void { var ptr: *i32 = make(@i32); }");
}

#[test]
fn make_with_struct_type() {
    assert_ok(
        "struct Point { x: i32, y: i32 }
         fn test(): void { var ptr: *Point = make(@Point); }",
    );
}

#[test]
fn make_with_pointer_type() {
    assert_ok("fn test(): void { var ptr: **i32 = make(@*i32); }");
}

#[test]
fn make_array_returns_slice() {
    assert_ok(
        "fn test(): void {
            var count: u64 = 10;
            var arr: []i32 = make(@i32, count);
        }",
    );
}

#[test]
fn make_array_of_sized_arrays() {
    assert_ok(
        "fn test(): void {
            var count: u64 = 10;
            var arr: [][5]i32 = make(@[5]i32, count);
        }",
    );
}

#[test]
fn make_map() {
    assert_ok(
        "fn test(): void {
            var m: map[*u8, i32] = make(@map[*u8, i32]);
            delete(m);
        }",
    );
}

#[test]
fn make_requires_type_parameter() {
    assert_err(
        "fn test(): void { var ptr: *i32 = make(); }",
        "requires a type parameter",
    );
}

#[test]
fn make_type_parameter_must_be_type() {
    assert_err(
        "fn test(): void { var x: i32 = 5; var ptr: *i32 = make(x); }",
        "type parameter",
    );
}

#[test]
fn delete_accepts_pointer_and_slice() {
    assert_ok(
        "fn test(): void {
            var ptr: *i32 = make(@i32);
            delete(ptr);
            var count: u64 = 10;
            var arr: []i32 = make(@i32, count);
            delete(arr);
        }",
    );
}

#[test]
fn delete_rejects_scalars() {
    assert_err(
        "fn test(): void { var x: i32 = 5; delete(x); }",
        "pointer, array, or map",
    );
}

#[test]
fn len_returns_u64() {
    assert_ok(
        "fn test(): void {
            var count: u64 = 10;
            var arr: []i32 = make(@i32, count);
            var size: u64 = len(arr);
        }",
    );
}

#[test]
fn len_rejects_sized_arrays() {
    assert_err(
        "fn test(): void { var arr: [5]i32 = [1, 2, 3, 4, 5]; var size: u64 = len(arr); }",
        "type mismatch",
    );
}

#[test]
fn sizeof_returns_u64() {
    assert_ok("fn test(): void { var size: u64 = sizeof(@i32); }");
}

#[test]
fn panic_accepts_u8_slice() {
    assert_ok(
        "fn test(): void {
            var count: u64 = 10;
            var msg: []u8 = make(@u8, count);
            panic(msg);
        }",
    );
}

#[test]
fn panic_rejects_other_types() {
    assert_err("fn test(): void { panic(42); }", "[]u8");
}

#[test]
fn map_index_read_yields_value_pointer() {
    assert_ok(
        "fn test(): void {
            var m: map[*u8, i32] = make(@map[*u8, i32]);
            m[\"k\"] = 7;
            var p: *i32 = m[\"k\"];
            delete(m[\"k\"]);
            delete(m);
        }",
    );
}

#[test]
fn map_key_type_mismatch() {
    assert_err(
        "fn test(): void {
            var m: map[*u8, i32] = make(@map[*u8, i32]);
            m[1.5] = 7;
        }",
        "map key",
    );
}

#[test]
fn map_slice_key_uses_data_pointer() {
    assert_ok(
        "fn test(): void {
            var m: map[*u8, i32] = make(@map[*u8, i32]);
            var k: []u8 = make(@u8, 4 as u64);
            m[k] = 1;
            delete(m);
        }",
    );
}

#[test]
fn each_over_slice_with_lambda() {
    assert_ok(
        "fn test(): void {
            var xs: []i32 = make(@i32, 4 as u64);
            var total: i32 = 0;
            each(xs, &total, fn(item: *i32, ctx: *i32): bool { return true; });
        }",
    );
}

#[test]
fn each_callback_must_return_bool() {
    assert_err(
        "fn test(): void {
            var xs: []i32 = make(@i32, 4 as u64);
            var total: i32 = 0;
            each(xs, &total, fn(item: *i32, ctx: *i32): void { });
        }",
        "callback must return bool",
    );
}

#[test]
fn va_arg_only_inside_variadic() {
    assert_err(
        "fn test(): void { var x: i32 = __TRUK_VA_ARG_I32(); }",
        "variadic",
    );
    assert_ok(
        "fn sum(count: i32, ...): i32 {
            var total: i32 = 0;
            for var i: i32 = 0; i < count; i += 1 {
                total = total + __TRUK_VA_ARG_I32();
            }
            return total;
        }",
    );
}

// ---------------------------------------------------------------------
// Enums, match, defer, tuples, generics, shards, cimports
// ---------------------------------------------------------------------

#[test]
fn enum_value_access() {
    assert_ok(
        "enum Color : u8 { Red, Green, Blue }
         fn test(): Color { return Color.Red; }",
    );
    assert_err(
        "enum Color : u8 { Red }
         fn test(): Color { return Color.Purple; }",
        "no variant 'Purple'",
    );
}

#[test]
fn enum_casts_to_integer() {
    assert_ok(
        "enum Color : u8 { Red, Green }
         fn test(): u8 { return Color.Green as u8; }",
    );
}

#[test]
fn match_on_integers_and_enums() {
    assert_ok(
        "enum Color : u8 { Red, Green }
         fn test(c: Color): i32 {
            match c {
                Color.Red => { return 1; },
                else => { return 0; }
            }
         }",
    );
}

#[test]
fn match_pattern_type_mismatch() {
    assert_err(
        "fn test(x: i32): i32 {
            match x {
                true => { return 1; },
                else => { return 0; }
            }
         }",
        "does not match scrutinee",
    );
}

#[test]
fn defer_accepts_cleanup_calls() {
    assert_ok(
        "fn test(): void {
            var p: *i32 = make(@i32);
            defer delete(p);
        }",
    );
}

#[test]
fn defer_rejects_control_flow() {
    assert_err(
        "fn test(): void { defer { return; } }",
        "defer code cannot contain control flow",
    );
}

#[test]
fn tuple_returns() {
    assert_ok(
        "fn divmod(a: i32, b: i32): (i32, i32) { return a / b, a % b; }
         fn test(): i32 {
            let pair = divmod(7, 2);
            return pair[0] + pair[1];
        }",
    );
    assert_err(
        "fn divmod(a: i32, b: i32): (i32, i32) { return a / b; }",
        "expected 2 return values",
    );
}

#[test]
fn generic_struct_instantiation() {
    assert_ok(
        "struct Box[T] { value: T }
         fn test(): i32 {
            var b: Box[i32] = Box{value: 7};
            return b.value;
        }",
    );
}

#[test]
fn generic_member_substitutes_argument() {
    assert_err(
        "struct Box[T] { value: T }
         fn test(): bool {
            var b: Box[i32] = Box{value: 7};
            return b.value;
        }",
        "type mismatch",
    );
}

#[test]
fn non_generic_type_rejects_arguments() {
    assert_err(
        "struct Point { x: i32 }
         var p: Point[i32] = Point{x: 1};",
        "not generic",
    );
}

#[test]
fn shard_contents_are_checked() {
    assert_ok(
        "shard math {
            fn square(x: i32): i32 { return x * x; }
         }
         fn test(): i32 { return square(3); }",
    );
}

#[test]
fn cimport_symbols_are_opaque_externs() {
    assert_ok(
        "cimport \"stdio.h\" { puts }
         fn test(): void { puts(\"hello\"); }",
    );
}

#[test]
fn recursive_functions_check() {
    assert_ok(
        "fn fact(n: i32): i32 {
            if n <= 1 { return 1; }
            return n * fact(n - 1);
        }",
    );
}

#[test]
fn mutually_recursive_structs_check() {
    assert_ok(
        "struct A { b: *B }
         struct B { a: *A }",
    );
}
