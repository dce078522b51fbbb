// Shared module registry threaded through every pass: functions,
// typeclasses, extern prototypes, per-call-site type environments, and
// the type context itself. The module state owns all AST and type data
// for the duration of a compile.

use crate::ctx::TypeCtx;
use bon_ast::{Function, Prototype, TypeDecl, TypeEnv, Typeclass, TypeclassImpl, TypeVarId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Parse-time summary of a function, kept in a side table so call sites
/// can be typed while the owning `Function` is checked out of the map
/// (e.g. during its own analysis, for recursion).
#[derive(Debug, Clone, Copy)]
pub struct FnSig {
    pub type_var: TypeVarId,
    pub body_type_var: TypeVarId,
    pub arity: usize,
}

/// Stable reference to a function for the ordered emission list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionKey {
    Named(String),
    ImplMethod {
        class: String,
        impl_id: usize,
        method: String,
    },
}

/// Memory layout of a user variant for the back-end: a 32-bit tag
/// followed by the fields of the matched constructor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructLayout {
    pub type_name: String,
    pub constructors: Vec<ConstructorLayout>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstructorLayout {
    pub name: String,
    pub tag: u32,
    pub fields: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ModuleState {
    pub filename: String,
    pub all_functions: HashMap<String, Function>,
    /// function names in definition order
    pub function_names: Vec<String>,
    pub fn_sigs: HashMap<String, FnSig>,
    /// extern (`cdef`) prototypes by link name
    pub function_protos: BTreeMap<String, Prototype>,
    /// all functions (including impl methods) in definition order;
    /// simplifies code generation
    pub ordered_functions: Vec<FunctionKey>,
    pub typeclasses: BTreeMap<String, Typeclass>,
    pub method_to_typeclass: HashMap<String, String>,
    /// user `type` declarations by name
    pub type_decls: BTreeMap<String, TypeDecl>,
    /// callee name -> (mangled call-site name, captured environment)
    pub function_envs: HashMap<String, Vec<(String, TypeEnv)>>,
    pub toplevel_expressions: Vec<Function>,
    pub struct_map: BTreeMap<String, StructLayout>,
    pub imported_modules: HashSet<String>,
    pub types: TypeCtx,
    next_impl_id: usize,
}

impl ModuleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_function(&mut self, func: Function) {
        let name = func.proto.name.clone();
        self.fn_sigs.insert(
            name.clone(),
            FnSig {
                type_var: func.proto.type_var,
                body_type_var: func.body.type_var,
                arity: func.proto.args.len(),
            },
        );
        self.ordered_functions.push(FunctionKey::Named(name.clone()));
        self.function_names.push(name.clone());
        self.all_functions.insert(name, func);
    }

    pub fn register_typeclass(&mut self, typeclass: Typeclass) {
        for method in typeclass.methods.keys() {
            self.method_to_typeclass
                .insert(method.clone(), typeclass.name.clone());
        }
        self.typeclasses.insert(typeclass.name.clone(), typeclass);
    }

    /// Attach an implementation to its typeclass. Overrides are
    /// prepended, so the most recent impl wins at resolution time.
    /// Returns false when the typeclass is unknown.
    pub fn register_impl(&mut self, mut imp: TypeclassImpl) -> bool {
        imp.id = self.next_impl_id;
        self.next_impl_id += 1;
        for method in imp.methods.keys() {
            self.ordered_functions.push(FunctionKey::ImplMethod {
                class: imp.class_name.clone(),
                impl_id: imp.id,
                method: method.clone(),
            });
        }
        match self.typeclasses.get_mut(&imp.class_name) {
            Some(typeclass) => {
                typeclass.impls.insert(0, imp);
                true
            }
            None => false,
        }
    }

    pub fn register_extern(&mut self, proto: Prototype) {
        self.function_protos.insert(proto.name.clone(), proto);
    }

    pub fn record_call_env(&mut self, callee: &str, mangled: String, env: TypeEnv) {
        self.function_envs
            .entry(callee.to_string())
            .or_default()
            .push((mangled, env));
    }

    /// Walk the registered implementations of the typeclass owning
    /// `method` and return the first one whose method type can unify
    /// with the call-site type.
    pub fn impl_method_for(&mut self, method: &str, func_type_var: TypeVarId) -> Option<FnSig> {
        let class_name = self.method_to_typeclass.get(method)?.clone();
        let typeclass = self.typeclasses.get(&class_name)?;
        for imp in &typeclass.impls {
            let Some(candidate) = imp.methods.get(method) else {
                continue;
            };
            let sig = FnSig {
                type_var: candidate.proto.type_var,
                body_type_var: candidate.body.type_var,
                arity: candidate.proto.args.len(),
            };
            let method_env = candidate.type_env.clone();

            self.types.push_env(&method_env);
            let method_root = self.types.resolve(sig.type_var, false);
            let call_root = self.types.resolve(func_type_var, false);
            let compatible = match (self.types.op_of(method_root), self.types.op_of(call_root)) {
                (Some(method_op), Some(call_op)) => self.types.operators_match(method_op, call_op),
                _ => false,
            };
            self.types.pop_env();

            if compatible {
                log::debug!("resolved {} to impl #{} of {}", method, imp.id, class_name);
                return Some(sig);
            }
        }
        None
    }

    /// Look up a method `Function` by its stable key.
    pub fn impl_method(&self, class: &str, impl_id: usize, method: &str) -> Option<&Function> {
        self.typeclasses
            .get(class)?
            .impls
            .iter()
            .find(|imp| imp.id == impl_id)?
            .methods
            .get(method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bon_ast::{Expr, ExprKind};

    fn dummy_function(state: &mut ModuleState, name: &str, arity: usize) -> Function {
        let mut params = Vec::new();
        for _ in 0..arity {
            params.push(state.types.new_var());
        }
        let ret = state.types.new_var();
        let type_var = state.types.build_function_type(&params, Some(ret));
        let body_var = state.types.new_var();
        Function {
            proto: Prototype {
                name: name.to_string(),
                args: (0..arity).map(|i| format!("a{}", i)).collect(),
                arg_owned: vec![false; arity],
                type_var,
                ret_type: ret,
                line: 0,
                column: 0,
            },
            body: Expr::new(ExprKind::Unit, 0, 0, body_var),
            params,
            dependencies: Vec::new(),
            type_env: TypeEnv::new(),
            typeclass: None,
            line: 0,
            column: 0,
        }
    }

    #[test]
    fn test_function_registration_populates_sig_table() {
        let mut state = ModuleState::new();
        let func = dummy_function(&mut state, "f", 2);
        let type_var = func.type_var();
        state.register_function(func);

        let sig = state.fn_sigs.get("f").copied().unwrap();
        assert_eq!(sig.arity, 2);
        assert_eq!(sig.type_var, type_var);
        assert_eq!(
            state.ordered_functions,
            vec![FunctionKey::Named("f".to_string())]
        );
    }

    #[test]
    fn test_impl_registration_prepends() {
        let mut state = ModuleState::new();
        let mut methods = BTreeMap::new();
        methods.insert("show".to_string(), state.types.new_var());
        state.register_typeclass(Typeclass {
            name: "Show".to_string(),
            params: vec!["T".to_string()],
            param_types: TypeEnv::new(),
            methods,
            impls: Vec::new(),
            line: 0,
            column: 0,
        });
        assert_eq!(
            state.method_to_typeclass.get("show").map(String::as_str),
            Some("Show")
        );

        for _ in 0..2 {
            let func = dummy_function(&mut state, "show", 1);
            let mut methods = BTreeMap::new();
            methods.insert("show".to_string(), func);
            assert!(state.register_impl(TypeclassImpl {
                id: 0,
                class_name: "Show".to_string(),
                params: vec!["int".to_string()],
                param_types: TypeEnv::new(),
                methods,
                line: 0,
                column: 0,
            }));
        }

        let impls = &state.typeclasses.get("Show").unwrap().impls;
        assert_eq!(impls.len(), 2);
        // the later impl is first (override semantics) and ids are stable
        assert_eq!(impls[0].id, 1);
        assert_eq!(impls[1].id, 0);
        assert!(state.impl_method("Show", 0, "show").is_some());
    }

    #[test]
    fn test_impl_method_for_picks_matching_signature() {
        let mut state = ModuleState::new();
        let mut methods = BTreeMap::new();
        methods.insert("show".to_string(), state.types.new_var());
        state.register_typeclass(Typeclass {
            name: "Show".to_string(),
            params: vec!["T".to_string()],
            param_types: TypeEnv::new(),
            methods,
            impls: Vec::new(),
            line: 0,
            column: 0,
        });

        // impl over int and impl over float
        for prim in ["int", "float"] {
            let mut func = dummy_function(&mut state, "show", 1);
            let prim_type = match prim {
                "int" => state.types.int_type,
                _ => state.types.float_type,
            };
            let string = state.types.string_type;
            func.proto.type_var = state.types.build_function_type(&[prim_type], Some(string));
            let mut methods = BTreeMap::new();
            methods.insert("show".to_string(), func);
            state.register_impl(TypeclassImpl {
                id: 0,
                class_name: "Show".to_string(),
                params: vec![prim.to_string()],
                param_types: TypeEnv::new(),
                methods,
                line: 0,
                column: 0,
            });
        }

        let float = state.types.float_type;
        let call_type = state.types.build_function_type(&[float], None);
        let sig = state.impl_method_for("show", call_type).unwrap();
        let ret = state.types.function_return_type(sig.type_var).unwrap();
        assert_eq!(state.types.name_of(ret), "string");
        let args = state.types.function_arg_types(sig.type_var);
        assert_eq!(state.types.name_of(args[0]), "float");

        // no impl for bool
        let boolean = state.types.bool_type;
        let call_type = state.types.build_function_type(&[boolean], None);
        assert!(state.impl_method_for("show", call_type).is_none());
    }
}
