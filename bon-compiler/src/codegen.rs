// Code-gen boundary: everything a back-end needs, with no IR attached.
// Monomorphized function instances are produced by replaying each
// call site's captured type environment around the callee's type;
// struct layouts are keyed by the fully-monomorphized type name and
// built exactly once.

use bon_types::{ConstructorLayout, FunctionKey, ModuleState, StructLayout, SUM_CTOR, TUPLE_CTOR};
use std::collections::BTreeSet;
use std::fmt;

/// One emitted function instance. Generic functions appear once per
/// distinct concrete instantiation under a `<name> = <type-string>`
/// mangled name; uncalled or already-concrete functions appear once
/// under their plain name.
#[derive(Debug, Clone)]
pub struct MonoFunction {
    pub source: FunctionKey,
    pub mangled_name: String,
    pub type_string: String,
}

#[derive(Debug, Clone)]
pub struct ExternDecl {
    pub name: String,
    pub type_string: String,
}

/// The ordered emission plan handed to a back-end.
#[derive(Debug, Default)]
pub struct CodegenPlan {
    pub functions: Vec<MonoFunction>,
    pub structs: Vec<StructLayout>,
    pub externs: Vec<ExternDecl>,
}

impl CodegenPlan {
    pub fn build(state: &mut ModuleState) -> CodegenPlan {
        let mut plan = CodegenPlan::default();
        let mut seen = BTreeSet::new();

        for key in state.ordered_functions.clone() {
            let info = match &key {
                FunctionKey::Named(name) => state
                    .fn_sigs
                    .get(name)
                    .map(|sig| (name.clone(), sig.type_var)),
                FunctionKey::ImplMethod {
                    class,
                    impl_id,
                    method,
                } => state
                    .impl_method(class, *impl_id, method)
                    .map(|func| (method.clone(), func.proto.type_var)),
            };
            let Some((name, type_var)) = info else {
                continue;
            };

            let envs = state.function_envs.get(&name).cloned().unwrap_or_default();
            if envs.is_empty() {
                let type_string = state.types.name_of(type_var);
                if seen.insert(name.clone()) {
                    plan.functions.push(MonoFunction {
                        source: key,
                        mangled_name: name,
                        type_string,
                    });
                }
            } else {
                for (_call_site, env) in envs {
                    state.types.push_env(&env);
                    let type_string = state.types.display_name(type_var);
                    state.types.pop_env();
                    let mangled_name = format!("{} = {}", name, type_string);
                    if seen.insert(mangled_name.clone()) {
                        plan.functions.push(MonoFunction {
                            source: key.clone(),
                            mangled_name,
                            type_string,
                        });
                    }
                }
            }
        }

        // struct layouts, one per monomorphized type name
        for (name, type_var) in state.types.registered_types() {
            let type_string = state.types.name_of(type_var);
            if state.struct_map.contains_key(&type_string) {
                continue;
            }
            let layout = build_layout(state, &name, type_var, &type_string);
            state.struct_map.insert(type_string, layout.clone());
            plan.structs.push(layout);
        }

        for (name, proto) in state.function_protos.clone() {
            let type_string = state.types.name_of(proto.type_var);
            plan.externs.push(ExternDecl { name, type_string });
        }

        plan
    }
}

// A variant lays out as a 32-bit tag followed by the fields of the
// matched constructor.
fn build_layout(
    state: &mut ModuleState,
    name: &str,
    type_var: bon_ast::TypeVarId,
    type_string: &str,
) -> StructLayout {
    let mut layout = StructLayout {
        type_name: type_string.to_string(),
        constructors: Vec::new(),
    };
    let root = state.types.resolve(type_var, true);
    let Some(op) = state.types.op_of(root) else {
        return layout;
    };

    let alternatives = if state.types.op_ctor(op) == SUM_CTOR {
        state.types.op_args(op)
    } else {
        vec![root]
    };

    for alt in alternatives {
        let alt_root = state.types.resolve(alt, true);
        let Some(alt_op) = state.types.op_of(alt_root) else {
            continue;
        };
        let ctor = state.types.op_ctor(alt_op).to_string();
        let tag = state.types.constructor_tag(&ctor).unwrap_or(0);
        let mut fields = Vec::new();
        if let Some(payload) = state.types.op_args(alt_op).first().copied() {
            let payload_root = state.types.resolve(payload, true);
            match state.types.op_of(payload_root) {
                Some(payload_op) if state.types.op_ctor(payload_op) == TUPLE_CTOR => {
                    for field in state.types.op_args(payload_op) {
                        fields.push(state.types.name_of(field));
                    }
                }
                _ => fields.push(state.types.name_of(payload_root)),
            }
        }
        layout.constructors.push(ConstructorLayout {
            name: ctor,
            tag,
            fields,
        });
    }

    log::debug!("built struct layout for {} ({})", name, layout.type_name);
    layout
}

impl fmt::Display for CodegenPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; functions")?;
        for func in &self.functions {
            writeln!(f, "define \"{}\" : {}", func.mangled_name, func.type_string)?;
        }
        if !self.structs.is_empty() {
            writeln!(f, "; types")?;
        }
        for layout in &self.structs {
            writeln!(f, "type \"{}\"", layout.type_name)?;
            for ctor in &layout.constructors {
                writeln!(
                    f,
                    "  {} tag={} fields=[{}]",
                    ctor.name,
                    ctor.tag,
                    ctor.fields.join(", ")
                )?;
            }
        }
        if !self.externs.is_empty() {
            writeln!(f, "; externs")?;
        }
        for ext in &self.externs {
            writeln!(f, "declare \"{}\" : {}", ext.name, ext.type_string)?;
        }
        Ok(())
    }
}
