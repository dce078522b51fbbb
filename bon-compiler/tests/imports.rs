// Import resolution: stdlib-path search, shared module state, the
// prelude, and circular-import termination.

use bon_compiler::{CompileOptions, Compiler};
use std::fs;

fn compiler_with_stdlib(dir: &std::path::Path) -> Compiler {
    let mut compiler = Compiler::new(CompileOptions {
        stdlib_path: Some(dir.to_path_buf()),
        ..CompileOptions::default()
    });
    compiler.diags.set_quiet(true);
    compiler
}

#[test]
fn test_import_from_stdlib_path() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("util.bon"),
        "def double(x): return x + x\n",
    )
    .unwrap();

    let mut compiler = compiler_with_stdlib(dir.path());
    let plan = compiler
        .compile_source("import util\ndouble(4)\n", "main.bon")
        .unwrap();

    assert!(compiler.state.all_functions.contains_key("double"));
    assert!(plan
        .functions
        .iter()
        .any(|f| f.mangled_name == "double = int -> int"));
}

#[test]
fn test_missing_import_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut compiler = compiler_with_stdlib(dir.path());
    let result = compiler.compile_source("import nothing\n", "main.bon");
    assert!(result.is_err());
    assert!(compiler
        .diags
        .diagnostics()
        .iter()
        .any(|d| d.message.contains("'import' file not found")));
}

#[test]
fn test_circular_imports_terminate() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("alpha.bon"),
        "import beta\ndef fa(x): return x\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("beta.bon"),
        "import alpha\ndef fb(x): return x\n",
    )
    .unwrap();

    let mut compiler = compiler_with_stdlib(dir.path());
    compiler
        .compile_source("import alpha\nfa(1); fb(2)\n", "main.bon")
        .unwrap();

    assert!(compiler.state.all_functions.contains_key("fa"));
    assert!(compiler.state.all_functions.contains_key("fb"));
    assert_eq!(compiler.diags.error_count(), 0);
}

#[test]
fn test_prelude_is_parsed_before_user_code() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("prelude.bon"),
        "def twice(x): return x + x\n",
    )
    .unwrap();

    let mut compiler = compiler_with_stdlib(dir.path());
    compiler.load_prelude().unwrap();
    let plan = compiler.compile_source("twice(21)\n", "main.bon").unwrap();

    assert!(plan
        .functions
        .iter()
        .any(|f| f.mangled_name == "twice = int -> int"));
}

#[test]
fn test_imported_types_are_usable() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("option.bon"),
        "type Option<T>\n  None\n  Some(T)\nend\n",
    )
    .unwrap();

    let mut compiler = compiler_with_stdlib(dir.path());
    compiler
        .compile_source("import option\nSome(5)\n", "main.bon")
        .unwrap();
    assert_eq!(compiler.diags.error_count(), 0);
    assert!(compiler.state.types.lookup_type("Option").is_some());
}
