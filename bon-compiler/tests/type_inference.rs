// End-to-end inference tests driving the full pipeline: parse, scope
// analysis, type analysis, and the code-gen plan.

use bon_compiler::{CodegenPlan, CompileError, CompileOptions, Compiler};
use bon_diagnostics::classes;

fn compiler() -> Compiler {
    let mut compiler = Compiler::new(CompileOptions::default());
    compiler.diags.set_quiet(true);
    compiler
}

fn compile(source: &str) -> (Compiler, Result<CodegenPlan, CompileError>) {
    let mut compiler = compiler();
    let result = compiler.compile_source(source, "test.bon");
    (compiler, result)
}

fn mangled_names(plan: &CodegenPlan) -> Vec<&str> {
    plan.functions
        .iter()
        .map(|f| f.mangled_name.as_str())
        .collect()
}

#[test]
fn test_identity_function_monomorphization() {
    let source = "def id(x): return x\nid(1); id(\"a\")\n";
    let (compiler, result) = compile(source);
    let plan = result.unwrap();
    assert_eq!(compiler.diags.error_count(), 0);

    let names = mangled_names(&plan);
    assert!(
        names.contains(&"id = int -> int"),
        "missing int instance in {:?}",
        names
    );
    assert!(
        names.contains(&"id = string -> string"),
        "missing string instance in {:?}",
        names
    );
}

#[test]
fn test_variant_matching_with_pattern_binding() {
    let source = concat!(
        "type Option<T>\n",
        "  None\n",
        "  Some(T)\n",
        "end\n",
        "def unwrap(o): match o\n",
        "  Some(x) => x\n",
        "  None => 0\n",
        "end\n",
        "unwrap(Some(7))\n",
    );
    let (compiler, result) = compile(source);
    let plan = result.unwrap();
    assert_eq!(compiler.diags.error_count(), 0);

    let unwrap = plan
        .functions
        .iter()
        .find(|f| f.mangled_name.starts_with("unwrap = "))
        .expect("unwrap was not monomorphized");
    // x is inferred int, so unwrap returns int at its call site
    assert!(
        unwrap.type_string.ends_with("-> int"),
        "unexpected type {}",
        unwrap.type_string
    );
    assert!(
        unwrap.type_string.contains("Some int"),
        "argument not instantiated to int: {}",
        unwrap.type_string
    );
}

#[test]
fn test_type_mismatch_reported_once_and_codegen_skipped() {
    let (compiler, result) = compile("1 + \"a\"\n");
    assert!(matches!(result, Err(CompileError::HadErrors { .. })));

    assert_eq!(compiler.diags.error_count(), 1);
    let diag = &compiler.diags.diagnostics()[0];
    assert_eq!(diag.class, classes::TYPE_MISMATCH);
    assert!(diag.message.contains("int"));
    assert!(diag.message.contains("string"));
    // reported at the '+' operator
    assert_eq!(diag.span.line, 0);
    assert_eq!(diag.span.column, 2);
}

#[test]
fn test_indentation_error_is_reported_and_parse_continues() {
    let source = "def f(x):\n    1\n  2\nend\n";
    let (compiler, result) = compile(source);
    assert!(result.is_err());

    let indent_errors: Vec<_> = compiler
        .diags
        .diagnostics()
        .iter()
        .filter(|d| {
            d.message.contains("does not match any outer indentation level") && d.span.line == 2
        })
        .collect();
    assert_eq!(indent_errors.len(), 1);
    assert_eq!(indent_errors[0].class, classes::SYNTAX_ERROR);
}

#[test]
fn test_recursive_type_unification_terminates() {
    let source = concat!(
        "type List<T>\n",
        "  Empty\n",
        "  Cons(T, List<T>)\n",
        "end\n",
        "Cons(1, Cons(2, Empty))\n",
    );
    let (mut compiler, result) = compile(source);
    let plan = result.unwrap();
    assert_eq!(compiler.diags.error_count(), 0);

    // the expression is a list of ints
    let type_var = compiler.state.toplevel_expressions[0].body.type_var;
    let name = compiler.state.types.name_of(type_var);
    assert!(name.contains("Cons"), "unexpected type {}", name);
    assert!(name.contains("int"), "unexpected type {}", name);

    // the variant lays out as tag + constructor fields, built once
    let layout = plan
        .structs
        .iter()
        .find(|s| s.constructors.iter().any(|c| c.name == "Cons"))
        .expect("missing List layout");
    let cons = layout.constructors.iter().find(|c| c.name == "Cons").unwrap();
    let empty = layout.constructors.iter().find(|c| c.name == "Empty").unwrap();
    assert_eq!(cons.tag, 0);
    assert_eq!(cons.fields.len(), 2);
    assert_eq!(empty.tag, 1);
    assert!(empty.fields.is_empty());
}

#[test]
fn test_if_condition_and_arms_unify() {
    let source = "def pick(c): if c then 1 else 2 end\n";
    let (compiler, result) = compile(source);
    let plan = result.unwrap();
    assert_eq!(compiler.diags.error_count(), 0);

    let pick = plan
        .functions
        .iter()
        .find(|f| f.mangled_name == "pick")
        .expect("pick not emitted");
    assert_eq!(pick.type_string, "bool -> int");
}

#[test]
fn test_if_without_else_is_unit() {
    let source = "def maybe(c): if c\n    1\nend\nend\n";
    let (_compiler, result) = compile(source);
    let plan = result.unwrap();
    let maybe = plan
        .functions
        .iter()
        .find(|f| f.mangled_name == "maybe")
        .expect("maybe not emitted");
    assert!(
        maybe.type_string.ends_with("-> ()"),
        "unexpected type {}",
        maybe.type_string
    );
}

#[test]
fn test_while_loop_types() {
    let source = "def spin(c): while c do 1\n";
    let (compiler, result) = compile(source);
    let plan = result.unwrap();
    assert_eq!(compiler.diags.error_count(), 0);

    let spin = plan
        .functions
        .iter()
        .find(|f| f.mangled_name == "spin")
        .expect("spin not emitted");
    assert_eq!(spin.type_string, "bool -> ()");
}

#[test]
fn test_arity_mismatch_is_reported() {
    let source = "def f(x): return x\nf(1, 2)\n";
    let (compiler, result) = compile(source);
    assert!(result.is_err());
    let diag = compiler
        .diags
        .diagnostics()
        .iter()
        .find(|d| d.class == classes::ARITY_MISMATCH)
        .expect("no arity diagnostic");
    assert!(diag.message.contains("takes 1 argument(s), but 2 were given"));
}

#[test]
fn test_undefined_function_suggests_similar_name() {
    let source = "def print_line(s): return s\nprint_lin(\"hello\")\n";
    let (compiler, result) = compile(source);
    assert!(result.is_err());
    let diag = compiler
        .diags
        .diagnostics()
        .iter()
        .find(|d| d.class == classes::UNBOUND_NAME)
        .expect("no unbound-name diagnostic");
    assert!(diag.message.contains("print_lin"));
    assert!(
        diag.message.contains("print_line"),
        "no suggestion in {:?}",
        diag.message
    );
}

#[test]
fn test_field_access_through_named_fields() {
    let source = concat!(
        "type Point\n",
        "  Point(x: int, y: int)\n",
        "end\n",
        "Point(1, 2).x + 1\n",
    );
    let (compiler, result) = compile(source);
    assert!(result.is_ok(), "diagnostics: {:?}", compiler.diags.diagnostics());
    assert_eq!(compiler.diags.error_count(), 0);
}

#[test]
fn test_unknown_field_is_reported() {
    let source = concat!(
        "type Point\n",
        "  Point(x: int, y: int)\n",
        "end\n",
        "Point(1, 2).z\n",
    );
    let (compiler, result) = compile(source);
    assert!(result.is_err());
    let diag = compiler
        .diags
        .diagnostics()
        .iter()
        .find(|d| d.class == classes::UNBOUND_NAME)
        .expect("no unbound-name diagnostic");
    assert!(diag.message.contains("z"));
}

#[test]
fn test_unknown_constructor_is_reported() {
    let (compiler, result) = compile("Bogus(1)\n");
    assert!(result.is_err());
    assert!(compiler
        .diags
        .diagnostics()
        .iter()
        .any(|d| d.class == classes::UNBOUND_NAME && d.message.contains("Bogus")));
}

#[test]
fn test_extern_prototype_calls_unify_and_are_listed() {
    let source = "cdef put_int(x:int)\nput_int(41)\n";
    let (compiler, result) = compile(source);
    let plan = result.unwrap();
    assert_eq!(compiler.diags.error_count(), 0);
    assert!(plan.externs.iter().any(|e| e.name == "put_int"));

    // calling with the wrong type is a mismatch
    let (compiler, result) = compile("cdef put_int(x:int)\nput_int(\"a\")\n");
    assert!(result.is_err());
    assert!(compiler
        .diags
        .diagnostics()
        .iter()
        .any(|d| d.class == classes::TYPE_MISMATCH));
}

#[test]
fn test_scope_analysis_marks_leaves() {
    let mut compiler = compiler();
    compiler
        .parse_source("def f(x):\n    1\n    x + 1\nend\n", "test.bon")
        .unwrap();
    bon_compiler::scope_analysis::run(&mut compiler.state);

    let func = compiler.state.all_functions.get("f").unwrap();
    // the sequence node itself is not a scope end; its final expression is
    assert!(!func.body.ends_scope);
    assert!(func.body.last_in_sequence().ends_scope);
}

#[test]
fn test_sequencing_does_not_unify_neighbors() {
    // a string statement followed by an int result is fine
    let source = "def f(x):\n    \"side effect\"\n    x + 1\nend\nf(1)\n";
    let (compiler, result) = compile(source);
    assert!(result.is_ok(), "diagnostics: {:?}", compiler.diags.diagnostics());
    assert_eq!(compiler.diags.error_count(), 0);
}
