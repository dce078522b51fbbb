// Typeclass resolution: impl selection by structural unification,
// deferral for generic call sites, override ordering, and the
// NoMatchingImpl failure mode.

use bon_compiler::{CodegenPlan, CompileError, CompileOptions, Compiler};
use bon_diagnostics::classes;

fn compile(source: &str) -> (Compiler, Result<CodegenPlan, CompileError>) {
    let mut compiler = Compiler::new(CompileOptions::default());
    compiler.diags.set_quiet(true);
    let result = compiler.compile_source(source, "test.bon");
    (compiler, result)
}

const SHOW_CLASS: &str = concat!(
    "cdef int_to_string(x:int) -> string\n",
    "cdef float_to_string(x:float) -> string\n",
    "class Show<T>\n",
    "  def show(x:T) -> string;\n",
    "end\n",
    "impl Show<int>\n",
    "  def show(x): int_to_string(x)\n",
    "end\n",
    "impl Show<float>\n",
    "  def show(x): float_to_string(x)\n",
    "end\n",
);

#[test]
fn test_resolution_across_two_impls() {
    let source = format!("{}show(1); show(1.0)\n", SHOW_CLASS);
    let (compiler, result) = compile(&source);
    let plan = result.unwrap();
    assert_eq!(compiler.diags.error_count(), 0);

    let shows: Vec<&str> = plan
        .functions
        .iter()
        .filter(|f| f.mangled_name.starts_with("show = "))
        .map(|f| f.mangled_name.as_str())
        .collect();
    assert!(
        shows.contains(&"show = int -> string"),
        "missing int impl in {:?}",
        shows
    );
    assert!(
        shows.contains(&"show = float -> string"),
        "missing float impl in {:?}",
        shows
    );
}

#[test]
fn test_no_matching_impl_is_reported() {
    let source = format!("{}show(true)\n", SHOW_CLASS);
    let (compiler, result) = compile(&source);
    assert!(result.is_err());
    let diag = compiler
        .diags
        .diagnostics()
        .iter()
        .find(|d| d.class == classes::NO_MATCHING_IMPL)
        .expect("no NoMatchingImpl diagnostic");
    assert!(diag.message.contains("show"));
}

#[test]
fn test_generic_call_site_defers_to_method_type() {
    // show(v) inside describe is not concrete yet; it unifies with the
    // class method type and resolves once describe is instantiated
    let source = format!("{}def describe(v): show(v)\ndescribe(7)\n", SHOW_CLASS);
    let (compiler, result) = compile(&source);
    let plan = result.unwrap();
    assert_eq!(compiler.diags.error_count(), 0);

    let describe = plan
        .functions
        .iter()
        .find(|f| f.mangled_name.starts_with("describe = "))
        .expect("describe not monomorphized");
    assert_eq!(describe.mangled_name, "describe = int -> string");
}

#[test]
fn test_method_argument_types_constrain_callers() {
    // show's class signature pins its result to string
    let source = format!("{}def twice(v): show(v) ++ show(v)\ntwice(1)\n", SHOW_CLASS);
    let (compiler, result) = compile(&source);
    assert!(result.is_ok(), "diagnostics: {:?}", compiler.diags.diagnostics());
}

#[test]
fn test_later_impl_overrides_earlier() {
    let source = concat!(
        "cdef int_to_string(x:int) -> string\n",
        "class Show<T>\n",
        "  def show(x:T) -> string;\n",
        "end\n",
        "impl Show<int>\n",
        "  def show(x): int_to_string(x)\n",
        "end\n",
        "impl Show<int>\n",
        "  def show(x): \"overridden\"\n",
        "end\n",
        "show(3)\n",
    );
    let (mut compiler, result) = compile(source);
    assert!(result.is_ok());

    // the override is consulted first
    let int_type = compiler.state.types.int_type;
    let call_type = compiler.state.types.build_function_type(&[int_type], None);
    let sig = compiler.state.impl_method_for("show", call_type).unwrap();
    let typeclass = compiler.state.typeclasses.get("Show").unwrap();
    let first_impl = &typeclass.impls[0];
    let override_method = first_impl.methods.get("show").unwrap();
    assert_eq!(override_method.proto.type_var, sig.type_var);
    assert_eq!(first_impl.id, 1);
}

#[test]
fn test_method_call_sugar_dispatches_through_impls() {
    let source = format!("{}(1).show()\n", SHOW_CLASS);
    // (1).show() becomes show(1)
    let (compiler, result) = compile(&source);
    assert!(result.is_ok(), "diagnostics: {:?}", compiler.diags.diagnostics());
    assert_eq!(compiler.diags.error_count(), 0);
}

#[test]
fn test_operator_method_environments_are_recorded() {
    // '**' may dispatch to a user operator; its call site captures the
    // ambient environment under the operator function name
    let source = "def f(x): return x ** x\nf(2)\n";
    let (compiler, result) = compile(source);
    assert!(result.is_ok());
    assert!(compiler.state.function_envs.contains_key("operator'**'"));
}

#[test]
fn test_unary_environments_are_recorded() {
    let source = "def f(x): return -x\nf(2)\n";
    let (compiler, result) = compile(source);
    assert!(result.is_ok());
    assert!(compiler.state.function_envs.contains_key("unary'-'"));
}
