//! C emission tests: the end-to-end lowering scenarios, slice/map/defer
//! contracts, lambda lifting, generics and assembly shapes.

use truk_base::Interner;
use truk_compile::analysis::check_program;
use truk_compile::codegen_c::{emit_program, AssemblyKind, EmitResult};
use truk_language::Parser;

fn emit(source: &str) -> (EmitResult, Interner) {
    let mut interner = Interner::new();
    let parsed = Parser::new(source, &mut interner)
        .parse()
        .unwrap_or_else(|e| panic!("parse failed: {} at {}:{}", e.message, e.line, e.column));
    let (registry, errors) =
        check_program(&parsed.declarations, &parsed.c_imports, &interner);
    assert!(errors.is_empty(), "type errors: {:?}", errors);
    let result = emit_program(&parsed.declarations, &parsed.c_imports, &registry, &interner);
    assert!(!result.has_errors(), "emit errors: {:?}", result.errors);
    (result, interner)
}

fn count_occurrences(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

#[test]
fn minimal_function() {
    let (result, _) = emit("fn main(): i32 { return 0; }");
    let code = result.code();

    // The user's main is emitted under the entry name and prototyped.
    assert!(code.contains("__truk_i32 truk_main_0(__truk_void);"));
    assert!(code.contains("__truk_i32 truk_main_0(__truk_void) {"));
    assert!(code.contains("return 0;"));

    assert!(result.metadata.has_main_function);
    assert_eq!(result.metadata.main_function_count, 1);

    let assembly = result.assemble(AssemblyKind::Application, None).expect("assemble");
    assert!(assembly.source.contains("int main(int argc, char **argv)"));
    assert!(assembly.source.contains("__truk_runtime_sxs_start(&app)"));
    assert!(assembly.source.contains(".has_args = false"));
}

#[test]
fn main_with_args_sets_has_args() {
    let (result, _) = emit("fn main(argc: i32, argv: **i8): i32 { return argc; }");
    let assembly = result.assemble(AssemblyKind::Application, None).expect("assemble");
    assert!(assembly.source.contains(".has_args = true"));
}

#[test]
fn application_without_main_is_an_error() {
    let (result, _) = emit("fn helper(): i32 { return 1; }");
    assert!(result.assemble(AssemblyKind::Application, None).is_err());
    assert!(result.metadata.is_library());
}

#[test]
fn struct_and_constructor() {
    let (result, _) = emit(
        "struct Point { x: i32, y: i32 }
         fn mk(): Point { return Point{x: 1, y: 2}; }",
    );
    let code = result.code();

    assert!(code.contains("typedef struct Point Point;"));
    assert!(code.contains("struct Point {"));
    assert!(code.contains("__truk_i32 x;"));
    assert!(code.contains("__truk_i32 y;"));
    assert!(code.contains("Point mk(__truk_void)"));
    assert!(code.contains("(Point){.x = 1, .y = 2}"));
    assert!(result.metadata.defined_structs.contains(&"Point".to_string()));
}

#[test]
fn slice_lowering() {
    let (result, _) = emit(
        "fn main(): void { var a: []i32 = make(@i32, 4 as u64); delete(a); }",
    );
    let code = result.code();

    // Exactly one slice typedef for i32.
    assert_eq!(count_occurrences(&code, "} truk_slice_i32;"), 1);
    assert!(code.contains("__truk_i32* data;"));
    assert!(code.contains("__truk_u64 len;"));
    // make lowers to an allocation + length pair; delete frees the data.
    assert!(code.contains("__truk_runtime_sxs_alloc_array(sizeof(__truk_i32)"));
    assert!(code.contains("__truk_runtime_sxs_free_array((a).data)"));
}

#[test]
fn slice_index_is_bounds_checked() {
    let (result, _) = emit(
        "fn sum(xs: []i32): i32 {
            var total: i32 = 0;
            for var i: u64 = 0 as u64; i < len(xs); i += 1 as u64 {
                total = total + xs[i];
            }
            return total;
        }",
    );
    let code = result.code();
    assert!(code.contains("TRUK_BOUNDS_CHECK(i, (xs).len)"));
    assert!(code.contains("(xs).data[i]"));
    assert!(code.contains("(xs).len"));
}

#[test]
fn slice_index_assignment_checks_bounds_first() {
    let (result, _) = emit(
        "fn fill(xs: []i32): void { xs[0] = 9; }",
    );
    let code = result.code();
    let check_pos = code.find("TRUK_BOUNDS_CHECK(0, (xs).len);").expect("bounds check");
    let store_pos = code.find("(xs).data[0] = 9;").expect("store");
    assert!(check_pos < store_pos);
}

#[test]
fn map_lowering() {
    let (result, _) = emit(
        "fn main(): void {
            var m: map[*u8, i32] = make(@map[*u8, i32]);
            m[\"k\"] = 7;
            var p: *i32 = m[\"k\"];
            delete(m);
        }",
    );
    let code = result.code();

    // One map typedef instantiated with the value type.
    assert_eq!(count_occurrences(&code, "typedef __truk_map_t(__truk_i32) truk_map_ptr_u8_i32;"), 1);
    assert!(code.contains("__truk_map_init_generic"));
    assert!(code.contains("__truk_map_hash_str"));
    assert!(code.contains("__truk_map_cmp_str"));
    assert!(code.contains("__truk_map_set_generic(&(m), &__truk_key_"));
    assert!(code.contains("__truk_map_get_generic(&(m), &__truk_key_"));
    assert!(code.contains("__truk_map_deinit(&(m))"));
}

#[test]
fn map_key_removal() {
    let (result, _) = emit(
        "fn main(): void {
            var m: map[*u8, i32] = make(@map[*u8, i32]);
            m[\"k\"] = 7;
            delete(m[\"k\"]);
            delete(m);
        }",
    );
    let code = result.code();
    assert!(code.contains("__truk_map_remove_generic(&(m), &__truk_key_"));
}

#[test]
fn integer_keyed_map_uses_mem_compare() {
    let (result, _) = emit(
        "fn main(): void {
            var m: map[i64, i32] = make(@map[i64, i32]);
            m[5 as i64] = 1;
            delete(m);
        }",
    );
    let code = result.code();
    assert!(code.contains("__truk_map_hash_i64"));
    assert!(code.contains("__truk_map_cmp_mem"));
    assert!(code.contains("__truk_map_init_generic(&__truk_tmp_0, 8,"));
}

#[test]
fn defer_replays_in_reverse_order() {
    let (result, _) = emit(
        "fn cleanup(x: i32): void { }
         fn test(): void {
            defer cleanup(1);
            defer cleanup(2);
            defer cleanup(3);
         }",
    );
    let code = result.code();
    let p1 = code.find("cleanup(1);").expect("cleanup(1)");
    let p2 = code.find("cleanup(2);").expect("cleanup(2)");
    let p3 = code.find("cleanup(3);").expect("cleanup(3)");
    assert!(p3 < p2 && p2 < p1, "defers must replay LIFO");
}

#[test]
fn early_return_unwinds_enclosing_scopes() {
    let (result, _) = emit(
        "fn cleanup(x: i32): void { }
         fn test(flag: bool): i32 {
            defer cleanup(1);
            {
                defer cleanup(2);
                if flag { return 10; }
            }
            return 0;
         }",
    );
    let code = result.code();

    // Inside the early return both defers replay, inner first, before the
    // return of the saved value.
    let ret_temp = code.find("__truk_ret_0 = 10;").expect("saved return value");
    let inner = code[ret_temp..].find("cleanup(2);").expect("inner defer") + ret_temp;
    let outer = code[inner..].find("cleanup(1);").expect("outer defer") + inner;
    let ret = code[outer..].find("return __truk_ret_0;").expect("return") + outer;
    assert!(ret_temp < inner && inner < outer && outer < ret);
}

#[test]
fn break_unwinds_to_loop_only() {
    let (result, _) = emit(
        "fn cleanup(x: i32): void { }
         fn test(): void {
            defer cleanup(1);
            while true {
                defer cleanup(2);
                break;
            }
         }",
    );
    let code = result.code();
    let break_pos = code.find("break;").expect("break");
    let inner = code.find("cleanup(2);").expect("inner defer");
    assert!(inner < break_pos, "loop defer replays before break");
    // The function-level defer replays only at function exit, after the loop.
    let outer = code.rfind("cleanup(1);").expect("outer defer");
    assert!(outer > break_pos);
}

#[test]
fn lambda_lifts_to_named_function() {
    let (result, _) = emit(
        "fn test(): void {
            var xs: []i32 = make(@i32, 4 as u64);
            var total: i32 = 0;
            each(xs, &total, fn(item: *i32, ctx: *i32): bool { return true; });
        }",
    );
    let code = result.code();
    assert!(code.contains("static __truk_bool __truk_lambda_0(__truk_i32* item, __truk_i32* ctx)"));
    assert!(code.contains("__truk_lambda_0(&(xs).data[__truk_idx], (&total))"));
    assert!(code.contains("if (!__truk_continue) break;"));
}

#[test]
fn enum_lowering() {
    let (result, _) = emit(
        "enum Color : u8 { Red, Green = 5, Blue }
         fn test(): Color { return Color.Green; }",
    );
    let code = result.code();
    assert!(code.contains("typedef __truk_u8 Color;"));
    assert!(code.contains("Color_Red = 0"));
    assert!(code.contains("Color_Green = 5"));
    assert!(code.contains("Color_Blue = 6"));
    assert!(code.contains("return Color_Green;"));
}

#[test]
fn match_lowers_to_if_chain() {
    let (result, _) = emit(
        "fn test(x: i32): i32 {
            match x {
                1 => { return 10; },
                2 => { return 20; },
                else => { return 0; }
            }
        }",
    );
    let code = result.code();
    assert!(code.contains("__truk_i32 __truk_match_0 = x;"));
    assert!(code.contains("if (__truk_match_0 == (1))"));
    assert!(code.contains("else if (__truk_match_0 == (2))"));
    assert!(code.contains("else {"));
}

#[test]
fn generic_struct_instantiates_once_per_mangling() {
    let (result, _) = emit(
        "struct Box[T] { value: T }
         fn test(): i32 {
            var a: Box[i32] = Box{value: 1};
            var b: Box[i32] = Box{value: 2};
            var c: Box[*u8] = Box{value: \"s\"};
            return a.value + b.value;
        }",
    );
    let code = result.code();
    assert_eq!(count_occurrences(&code, "struct Box_i32 {"), 1);
    assert_eq!(count_occurrences(&code, "struct Box_ptr_u8 {"), 1);
    assert!(code.contains("(Box_i32){.value = 1}"));
    assert!(code.contains("(Box_ptr_u8){.value = (__truk_u8*)\"s\"}"));
    // The template itself never emits.
    assert!(!code.contains("struct Box {"));
}

#[test]
fn variadic_function_prologue_and_va_arg() {
    let (result, _) = emit(
        "fn sum(count: i32, ...): i32 {
            var total: i32 = 0;
            for var i: i32 = 0; i < count; i += 1 {
                total = total + __TRUK_VA_ARG_I32();
            }
            return total;
        }",
    );
    let code = result.code();
    assert!(code.contains("__truk_i32 sum(__truk_i32 count, ...)"));
    assert!(code.contains("va_list __truk_va_args;"));
    assert!(code.contains("va_start(__truk_va_args, count);"));
    assert!(code.contains("va_arg(__truk_va_args, __truk_i32)"));
    assert!(code.contains("va_end(__truk_va_args);"));
}

#[test]
fn tuple_return_synthesizes_struct() {
    let (result, _) = emit(
        "fn divmod(a: i32, b: i32): (i32, i32) { return a / b, a % b; }
         fn test(): i32 {
            let pair = divmod(7, 2);
            return pair[0] + pair[1];
        }",
    );
    let code = result.code();
    assert_eq!(count_occurrences(&code, "} truk_tuple_i32_i32;"), 1);
    assert!(code.contains("truk_tuple_i32_i32 divmod"));
    assert!(code.contains("(truk_tuple_i32_i32){._0 = (a / b), ._1 = (a % b)}"));
    assert!(code.contains("pair._0"));
    assert!(code.contains("pair._1"));
}

#[test]
fn panic_lowers_to_runtime_helper() {
    let (result, _) = emit(
        "fn test(msg: []u8): void { panic(msg); }",
    );
    let code = result.code();
    assert!(code.contains("TRUK_PANIC((msg).data, (msg).len)"));
}

#[test]
fn cimport_header_is_included() {
    let (result, _) = emit(
        "cimport \"mylib.h\" { external_fn }
         fn test(): void { external_fn(); }",
    );
    let code = result.code();
    assert!(code.contains("#include \"mylib.h\""));
    assert!(code.contains("external_fn()"));
}

#[test]
fn pointer_member_access_uses_arrow() {
    let (result, _) = emit(
        "struct Point { x: i32, y: i32 }
         fn test(p: *Point): i32 { return p.x; }",
    );
    let code = result.code();
    assert!(code.contains("p->x"));
}

#[test]
fn extern_prototype_only() {
    let (result, _) = emit(
        "fn external(x: i32): i32;
         fn test(): i32 { return external(1); }",
    );
    let code = result.code();
    assert!(code.contains("__truk_i32 external(__truk_i32 x);"));
    assert!(!code.contains("__truk_i32 external(__truk_i32 x) {"));
}

#[test]
fn reserved_c_names_are_escaped() {
    let (result, _) = emit("fn test(): void { var register: i32 = 1; register = 2; }");
    let code = result.code();
    assert!(code.contains("__truk_i32 truk_register = 1;"));
    assert!(code.contains("truk_register = 2;"));
}

#[test]
fn test_functions_recorded_and_runnable() {
    let (result, _) = emit(
        "fn test_setup(): void { }
         fn test_one(): void { }
         fn test_two(): void { }
         fn test_teardown(): void { }",
    );
    assert!(result.metadata.has_test_setup);
    assert!(result.metadata.has_test_teardown);
    // The setup/teardown hooks carry the reserved prefix too.
    assert_eq!(result.metadata.test_functions.len(), 4);
    assert!(result.metadata.has_tests());

    let runner = result.assemble_test_runner();
    assert!(runner.contains("test_one();"));
    assert!(runner.contains("test_two();"));
    assert!(runner.contains("int main(void)"));
}

#[test]
fn library_assembly_produces_header_pair() {
    let (result, _) = emit(
        "struct Vec2 { x: f32, y: f32 }
         fn vec2_add(a: Vec2, b: Vec2): Vec2 {
            return Vec2{x: a.x + b.x, y: a.y + b.y};
         }",
    );
    let assembly = result
        .assemble(AssemblyKind::Library, Some("vecmath"))
        .expect("assemble");
    let header = assembly.header.expect("header");
    assert!(header.contains("#ifndef TRUK_VECMATH_H"));
    assert!(header.contains("Vec2 vec2_add(Vec2 a, Vec2 b);"));
    assert!(assembly.source.contains("#include \"vecmath.h\""));
    assert!(assembly.source.contains("Vec2 vec2_add(Vec2 a, Vec2 b) {"));
    assert_eq!(assembly.header_name.as_deref(), Some("vecmath.h"));
}

#[test]
fn globals_emit_before_functions() {
    let (result, _) = emit(
        "var counter: i32 = 0;
         fn bump(): void { counter = counter + 1; }",
    );
    let code = result.code();
    let global = code.find("__truk_i32 counter = 0;").expect("global");
    let function = code.find("__truk_void bump(__truk_void) {").expect("function");
    assert!(global < function);
}

#[test]
fn string_literals_cast_to_u8_pointer() {
    let (result, _) = emit("fn test(): *u8 { return \"hi\\n\"; }");
    let code = result.code();
    assert!(code.contains("return (__truk_u8*)\"hi\\n\";"));
}

#[test]
fn char_literals_pass_through() {
    let (result, _) = emit("fn test(): u8 { return 'a'; }");
    let code = result.code();
    assert!(code.contains("return 'a';"));
}

#[test]
fn shard_contents_emit_flat() {
    let (result, _) = emit(
        "shard math {
            fn square(x: i32): i32 { return x * x; }
         }
         fn test(): i32 { return square(3); }",
    );
    let code = result.code();
    assert!(code.contains("__truk_i32 square(__truk_i32 x) {"));
    assert!(code.contains("square(3)"));
    assert_eq!(result.metadata.shards, vec!["math".to_string()]);
}
