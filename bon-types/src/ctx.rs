// The type store: an arena of type-variable nodes forming a union-find
// forest, plus the registries the inference pass works against (user
// types, variant constructors, the typeclass parameter environment, and
// the scoped environment stack that implements generic instantiation).
//
// A variable is either free (resolvable through its parent pointer, named
// on demand) or bound to a type operator. Operators live in their own
// arena; parent and argument links are indices, which keeps the densely
// cyclic variant graph representable without interior mutability.

use bon_ast::{TypeEnv, TypeVarId};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Function type constructor, arity 2: domain, codomain.
pub const FN_CTOR: &str = " -> ";
/// Tuple/product constructor, arity >= 2.
pub const TUPLE_CTOR: &str = " * ";
/// Sum constructor; one argument per alternative.
pub const SUM_CTOR: &str = " | ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeOpId(u32);

#[derive(Debug, Clone)]
struct VarNode {
    parent: Option<TypeVarId>,
    op: Option<TypeOpId>,
    type_name: Option<String>,
    variant_name: Option<String>,
}

#[derive(Debug, Clone)]
struct OpNode {
    ctor: String,
    args: Vec<TypeVarId>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeError {
    #[error("{lhs} != {rhs}")]
    Mismatch { lhs: String, rhs: String },
    #[error("attempting to unify types of different shape")]
    Shape,
    #[error("unknown type {0} used in type annotation")]
    UnknownType(String),
    #[error("type name already exists")]
    DuplicateType(String),
    #[error("type constructor already exists")]
    DuplicateConstructor(String),
    #[error("unknown constructor {0}")]
    UnknownConstructor(String),
    #[error("unknown constructor field {0}")]
    UnknownField(String),
}

// Generates "'a", "'b", ..., "'z", "'z1", "'a1", ... for free variables.
#[derive(Debug, Default)]
struct TypeNameGenerator {
    count: usize,
}

impl TypeNameGenerator {
    fn next_name(&mut self) -> String {
        let letter = (b'a' + (self.count % 26) as u8) as char;
        self.count += 1;
        let mut name = String::from("'");
        name.push(letter);
        if self.count / 26 > 0 {
            name.push_str(&(self.count / 26).to_string());
        }
        name
    }
}

#[derive(Debug)]
pub struct TypeCtx {
    vars: Vec<VarNode>,
    ops: Vec<OpNode>,
    env: TypeEnv,
    env_stack: Vec<TypeEnv>,
    typeclass_env: TypeEnv,
    // registry of user defined types
    type_registry: TypeEnv,
    // constructor name -> parent variant
    type_constructors: TypeEnv,
    constructor_tags: HashMap<String, u32>,
    // constructor name -> field name -> field index
    constructor_fields: HashMap<String, BTreeMap<String, u32>>,
    name_gen: TypeNameGenerator,

    pub int_type: TypeVarId,
    pub float_type: TypeVarId,
    pub string_type: TypeVarId,
    pub bool_type: TypeVarId,
    pub unit_type: TypeVarId,
}

impl Default for TypeCtx {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeCtx {
    pub fn new() -> Self {
        let mut ctx = Self {
            vars: Vec::new(),
            ops: Vec::new(),
            env: TypeEnv::new(),
            env_stack: Vec::new(),
            typeclass_env: TypeEnv::new(),
            type_registry: TypeEnv::new(),
            type_constructors: TypeEnv::new(),
            constructor_tags: HashMap::new(),
            constructor_fields: HashMap::new(),
            name_gen: TypeNameGenerator::default(),
            int_type: TypeVarId(0),
            float_type: TypeVarId(0),
            string_type: TypeVarId(0),
            bool_type: TypeVarId(0),
            unit_type: TypeVarId(0),
        };
        ctx.int_type = ctx.new_op_var("int", Vec::new());
        ctx.float_type = ctx.new_op_var("float", Vec::new());
        ctx.string_type = ctx.new_op_var("string", Vec::new());
        ctx.bool_type = ctx.new_op_var("bool", Vec::new());
        ctx.unit_type = ctx.new_op_var("()", Vec::new());
        ctx
    }

    // ---------------------------------------------------------------
    // allocation

    pub fn new_var(&mut self) -> TypeVarId {
        let id = TypeVarId(self.vars.len() as u32);
        self.vars.push(VarNode {
            parent: None,
            op: None,
            type_name: None,
            variant_name: None,
        });
        id
    }

    pub fn new_op_var(&mut self, ctor: &str, args: Vec<TypeVarId>) -> TypeVarId {
        let op = TypeOpId(self.ops.len() as u32);
        self.ops.push(OpNode {
            ctor: ctor.to_string(),
            args,
        });
        let id = self.new_var();
        self.var_mut(id).op = Some(op);
        id
    }

    fn var(&self, id: TypeVarId) -> &VarNode {
        &self.vars[id.0 as usize]
    }

    fn var_mut(&mut self, id: TypeVarId) -> &mut VarNode {
        &mut self.vars[id.0 as usize]
    }

    fn op_node(&self, id: TypeOpId) -> &OpNode {
        &self.ops[id.0 as usize]
    }

    pub fn op_of(&self, id: TypeVarId) -> Option<TypeOpId> {
        self.var(id).op
    }

    pub fn op_ctor(&self, id: TypeOpId) -> &str {
        &self.op_node(id).ctor
    }

    pub fn op_args(&self, id: TypeOpId) -> Vec<TypeVarId> {
        self.op_node(id).args.clone()
    }

    pub fn set_type_name(&mut self, id: TypeVarId, name: impl Into<String>) {
        self.var_mut(id).type_name = Some(name.into());
    }

    pub fn type_name_of(&self, id: TypeVarId) -> Option<&str> {
        self.var(id).type_name.as_deref()
    }

    pub fn set_variant_name(&mut self, id: TypeVarId, name: impl Into<String>) {
        self.var_mut(id).variant_name = Some(name.into());
    }

    // ---------------------------------------------------------------
    // environments

    /// Push the current environment and overlay `env` on top of it.
    pub fn push_env(&mut self, env: &TypeEnv) {
        self.env_stack.push(self.env.clone());
        for (name, var) in env {
            self.env.insert(name.clone(), *var);
        }
    }

    /// Restore the previous environment, returning the one being popped.
    pub fn pop_env(&mut self) -> TypeEnv {
        let copy = self.env.clone();
        match self.env_stack.pop() {
            Some(prev) => self.env = prev,
            None => self.env.clear(),
        }
        copy
    }

    pub fn push_typeclass_env(&mut self, env: TypeEnv) {
        self.typeclass_env = env;
    }

    pub fn pop_typeclass_env(&mut self) -> TypeEnv {
        self.typeclass_env.clone()
    }

    // ---------------------------------------------------------------
    // resolution

    pub fn get_root(&self, mut id: TypeVarId) -> TypeVarId {
        while let Some(parent) = self.var(id).parent {
            id = parent;
        }
        id
    }

    /// Resolve a variable to its root inside the current environment.
    /// When the root carries a type name bound in the environment, the
    /// binding is substituted. When the name is absent and
    /// `update_environment` is set, a fresh variable is installed under
    /// the name — this is how generic type parameters are freshened at
    /// each use. Pass `false` when checking rather than inferring.
    pub fn resolve(&mut self, id: TypeVarId, update_environment: bool) -> TypeVarId {
        let root = self.get_root(id);
        if let Some(name) = self.var(root).type_name.clone() {
            if let Some(bound) = self.env.get(&name).copied() {
                return self.get_root(bound);
            }
            if update_environment {
                let fresh = self.new_var();
                self.env.insert(name, fresh);
                return fresh;
            }
        }
        root
    }

    /// Install fresh environment bindings for the named argument
    /// variables of `id`'s operator, so each call site of a polymorphic
    /// function gets independent copies of its free type variables.
    pub fn fresh_function_type(&mut self, id: TypeVarId) {
        let root = self.get_root(id);
        let Some(op) = self.var(root).op else {
            return;
        };
        for arg in self.op_args(op) {
            let arg_root = self.get_root(arg);
            if let Some(name) = self.var(arg_root).type_name.clone() {
                let fresh = self.new_var();
                self.env.insert(name, fresh);
            }
        }
    }

    /// Detached copy of `id` with all union-find roots resolved; the
    /// canonical form stored on persistent nodes once inference is done.
    pub fn flatten(&mut self, id: TypeVarId) -> TypeVarId {
        let mut occurs = HashSet::new();
        let mut remap = HashMap::new();
        self.flatten_inner(id, &mut occurs, &mut remap)
    }

    fn flatten_inner(
        &mut self,
        id: TypeVarId,
        occurs: &mut HashSet<TypeVarId>,
        remap: &mut HashMap<TypeVarId, TypeVarId>,
    ) -> TypeVarId {
        let variant_name = self.var(id).variant_name.clone();
        let result = self.new_var();
        let id = self.resolve(id, true);
        occurs.insert(id);
        remap.insert(id, result);
        if let Some(op) = self.var(id).op {
            let ctor = self.op_node(op).ctor.clone();
            let args = self.op_args(op);
            let mut flattened = Vec::with_capacity(args.len());
            for arg in args {
                let arg_root = self.resolve(arg, true);
                if occurs.contains(&arg_root) {
                    flattened.push(remap.get(&arg_root).copied().unwrap_or(arg_root));
                } else {
                    flattened.push(self.flatten_inner(arg, occurs, remap));
                }
            }
            let new_op = TypeOpId(self.ops.len() as u32);
            self.ops.push(OpNode {
                ctor,
                args: flattened,
            });
            self.var_mut(result).op = Some(new_op);
        } else {
            let name = self.var(id).type_name.clone();
            self.var_mut(result).type_name = name;
        }
        self.var_mut(result).variant_name = variant_name;
        result
    }

    // ---------------------------------------------------------------
    // matching

    fn is_constructor_name(name: &str) -> bool {
        name.chars().next().is_some_and(char::is_uppercase)
    }

    /// Structural compatibility of two operators, used to detect a
    /// mismatch after unification has linked what it can.
    pub fn operators_match(&mut self, lhs: TypeOpId, rhs: TypeOpId) -> bool {
        let mut occurs = HashSet::new();
        self.operators_match_inner(lhs, rhs, &mut occurs)
    }

    fn operators_match_inner(
        &mut self,
        lhs: TypeOpId,
        rhs: TypeOpId,
        occurs: &mut HashSet<TypeOpId>,
    ) -> bool {
        if lhs == rhs {
            return true;
        }
        if occurs.contains(&lhs) && occurs.contains(&rhs) {
            return true;
        }
        occurs.insert(lhs);
        occurs.insert(rhs);

        let lhs_ctor = self.op_node(lhs).ctor.clone();
        let rhs_ctor = self.op_node(rhs).ctor.clone();
        if lhs_ctor != rhs_ctor {
            if lhs_ctor == SUM_CTOR {
                return self.sum_type_matches(lhs, rhs, occurs);
            }
            if rhs_ctor == SUM_CTOR {
                return self.sum_type_matches(rhs, lhs, occurs);
            }
            // a lone constructor matches through its parent variant
            for (ctor_name, other) in [(&lhs_ctor, rhs), (&rhs_ctor, lhs)] {
                if Self::is_constructor_name(ctor_name) {
                    if let Some(variant) = self.get_type_from_constructor(ctor_name) {
                        let variant = self.resolve(variant, true);
                        if let Some(variant_op) = self.var(variant).op {
                            return self.sum_type_matches(variant_op, other, occurs);
                        }
                    }
                    return false;
                }
            }
            return false;
        }

        let lhs_args = self.op_args(lhs);
        let rhs_args = self.op_args(rhs);
        if lhs_args.len() != rhs_args.len() {
            return false;
        }
        for (la, ra) in lhs_args.iter().zip(rhs_args.iter()) {
            let lt = self.resolve(*la, false);
            let rt = self.resolve(*ra, false);
            match (self.var(lt).op, self.var(rt).op) {
                (Some(lo), Some(ro)) => {
                    if !self.operators_match_inner(lo, ro, occurs) {
                        return false;
                    }
                }
                (None, None) => {
                    if lt != rt {
                        return false;
                    }
                }
                // one side bound, one free: a free variable can still
                // unify with anything
                _ => {}
            }
        }
        true
    }

    // Does the sum operator carry an alternative compatible with the
    // given constructor operator (variant subsumption)?
    fn sum_type_matches(
        &mut self,
        variant: TypeOpId,
        constructor: TypeOpId,
        occurs: &mut HashSet<TypeOpId>,
    ) -> bool {
        let ctor_name = self.op_node(constructor).ctor.clone();
        for alt in self.op_args(variant) {
            if let Some(alt_op) = self.var(alt).op {
                if self.op_node(alt_op).ctor == ctor_name {
                    return self.operators_match_inner(alt_op, constructor, occurs);
                }
            }
        }
        false
    }

    // ---------------------------------------------------------------
    // unification

    /// Make two types structurally equal: recursively equate their
    /// operators and bind free variables. The `occurs` set threaded
    /// through the recursion breaks cycles on recursive variant types
    /// rather than rejecting them.
    pub fn unify(&mut self, lhs: TypeVarId, rhs: TypeVarId) -> Result<(), TypeError> {
        let mut occurs = HashSet::new();
        self.unify_inner(lhs, rhs, &mut occurs)
    }

    fn unify_inner(
        &mut self,
        lhs: TypeVarId,
        rhs: TypeVarId,
        occurs: &mut HashSet<TypeOpId>,
    ) -> Result<(), TypeError> {
        let lhs_type = self.resolve(lhs, true);
        let rhs_type = self.resolve(rhs, true);
        if lhs_type == rhs_type {
            return Ok(());
        }

        let lhs_op = self.var(lhs_type).op;
        let rhs_op = self.var(rhs_type).op;

        if let Some(lo) = lhs_op {
            if occurs.contains(&lo) {
                if let Some(ro) = rhs_op {
                    if occurs.contains(&ro) {
                        return Ok(());
                    }
                    occurs.insert(ro);
                }
            } else {
                occurs.insert(lo);
            }
        }

        self.unify_ops(lhs_op, rhs_op, occurs)?;

        let both_typed = lhs_op.is_some() && rhs_op.is_some();
        if let (Some(lo), Some(ro)) = (lhs_op, rhs_op) {
            if !self.operators_match(lo, ro) {
                return Err(TypeError::Mismatch {
                    lhs: self.name_of(lhs_type),
                    rhs: self.name_of(rhs_type),
                });
            }
        }
        if both_typed {
            return Ok(());
        }

        // if one variable has a concrete type, it becomes the root
        if rhs_op.is_some() {
            self.var_mut(lhs_type).parent = Some(rhs_type);
        } else if lhs_op.is_some() {
            self.var_mut(rhs_type).parent = Some(lhs_type);
        } else {
            self.var_mut(lhs_type).parent = Some(rhs_type);
        }
        Ok(())
    }

    fn unify_ops(
        &mut self,
        lhs: Option<TypeOpId>,
        rhs: Option<TypeOpId>,
        occurs: &mut HashSet<TypeOpId>,
    ) -> Result<(), TypeError> {
        let (Some(lhs), Some(rhs)) = (lhs, rhs) else {
            return Ok(());
        };

        let lhs_ctor = self.op_node(lhs).ctor.clone();
        let rhs_ctor = self.op_node(rhs).ctor.clone();
        if lhs_ctor != rhs_ctor {
            if lhs_ctor == SUM_CTOR {
                return self.unify_sum(lhs, rhs, occurs);
            }
            if rhs_ctor == SUM_CTOR {
                return self.unify_sum(rhs, lhs, occurs);
            }
            // retry through the registered parent variant
            for (ctor_name, other) in [(&lhs_ctor, rhs), (&rhs_ctor, lhs)] {
                if Self::is_constructor_name(ctor_name) {
                    if let Some(variant) = self.get_type_from_constructor(ctor_name) {
                        let variant = self.resolve(variant, true);
                        if let Some(variant_op) = self.var(variant).op {
                            if self.op_node(variant_op).ctor == SUM_CTOR {
                                return self.unify_sum(variant_op, other, occurs);
                            }
                        }
                    }
                    // leave the mismatch for the caller's shape check
                    return Ok(());
                }
            }
            return Ok(());
        }

        let lhs_args = self.op_args(lhs);
        let rhs_args = self.op_args(rhs);
        if lhs_args.len() != rhs_args.len() {
            return Err(TypeError::Shape);
        }
        for (la, ra) in lhs_args.iter().zip(rhs_args.iter()) {
            self.unify_inner(*la, *ra, occurs)?;
        }
        Ok(())
    }

    // Unify a constructor operator with the matching alternative of a
    // sum operator.
    fn unify_sum(
        &mut self,
        variant: TypeOpId,
        constructor: TypeOpId,
        occurs: &mut HashSet<TypeOpId>,
    ) -> Result<(), TypeError> {
        let ctor_name = self.op_node(constructor).ctor.clone();
        for alt in self.op_args(variant) {
            if let Some(alt_op) = self.var(alt).op {
                if self.op_node(alt_op).ctor == ctor_name {
                    return self.unify_ops(Some(alt_op), Some(constructor), occurs);
                }
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // type construction

    pub fn build_function_type(
        &mut self,
        param_types: &[TypeVarId],
        ret_type: Option<TypeVarId>,
    ) -> TypeVarId {
        let in_types = if param_types.len() > 1 {
            self.new_op_var(TUPLE_CTOR, param_types.to_vec())
        } else if let Some(first) = param_types.first() {
            *first
        } else {
            self.unit_type
        };
        let out_type = ret_type.unwrap_or_else(|| self.new_var());
        self.new_op_var(FN_CTOR, vec![in_types, out_type])
    }

    pub fn build_tuple_type(&mut self, param_types: &[TypeVarId]) -> Option<TypeVarId> {
        if param_types.len() > 1 {
            Some(self.new_op_var(TUPLE_CTOR, param_types.to_vec()))
        } else {
            param_types.first().copied()
        }
    }

    /// Register a variant's constructors and unify the declaration
    /// variable with the built sum. A single-constructor type unifies
    /// directly with its constructor so fields are accessible without
    /// pattern matching.
    pub fn build_variant_type(
        &mut self,
        v_type: TypeVarId,
        variant_types: &BTreeMap<String, Option<TypeVarId>>,
        fields: &BTreeMap<String, u32>,
    ) -> Result<TypeVarId, TypeError> {
        for name in variant_types.keys() {
            if self.type_constructors.contains_key(name) {
                return Err(TypeError::DuplicateConstructor(name.clone()));
            }
        }

        let mut alternatives = Vec::new();
        for (name, param) in variant_types {
            let ctor_args = match param {
                Some(p) => vec![*p],
                None => Vec::new(),
            };
            let tcon_var = self.new_op_var(name, ctor_args);
            if variant_types.len() == 1 {
                self.unify(v_type, tcon_var)?;
                self.type_constructors.insert(name.clone(), v_type);
                self.constructor_tags.insert(name.clone(), 0);
                self.constructor_fields.insert(name.clone(), fields.clone());
                return Ok(tcon_var);
            }
            alternatives.push(tcon_var);
        }

        let var_type = self.new_op_var(SUM_CTOR, alternatives);
        for (tag, name) in variant_types.keys().enumerate() {
            self.type_constructors.insert(name.clone(), v_type);
            self.constructor_tags.insert(name.clone(), tag as u32);
        }
        self.unify(v_type, var_type)?;
        Ok(var_type)
    }

    pub fn build_from_type_constructor(
        &mut self,
        constructor: &str,
        param_types: Vec<TypeVarId>,
    ) -> TypeVarId {
        self.new_op_var(constructor, param_types)
    }

    pub fn register_type(&mut self, name: &str, var: TypeVarId) -> Result<(), TypeError> {
        if self.type_registry.contains_key(name) {
            return Err(TypeError::DuplicateType(name.to_string()));
        }
        self.type_registry.insert(name.to_string(), var);
        Ok(())
    }

    pub fn lookup_type(&self, name: &str) -> Option<TypeVarId> {
        self.type_registry.get(name).copied()
    }

    pub fn registered_types(&self) -> Vec<(String, TypeVarId)> {
        self.type_registry
            .iter()
            .map(|(name, var)| (name.clone(), *var))
            .collect()
    }

    pub fn get_type_from_constructor(&self, constructor: &str) -> Option<TypeVarId> {
        self.type_constructors.get(constructor).copied()
    }

    pub fn constructor_from_type(&mut self, id: TypeVarId) -> Option<String> {
        let root = self.resolve(id, true);
        self.var(root)
            .op
            .map(|op| self.op_node(op).ctor.clone())
    }

    pub fn constructor_tag(&self, constructor: &str) -> Result<u32, TypeError> {
        self.constructor_tags
            .get(constructor)
            .copied()
            .ok_or_else(|| TypeError::UnknownConstructor(constructor.to_string()))
    }

    pub fn constructor_field_index(
        &self,
        constructor: &str,
        field: &str,
    ) -> Result<u32, TypeError> {
        let fields = self
            .constructor_fields
            .get(constructor)
            .ok_or_else(|| TypeError::UnknownConstructor(constructor.to_string()))?;
        fields
            .get(field)
            .copied()
            .ok_or_else(|| TypeError::UnknownField(field.to_string()))
    }

    pub fn constructor_fields(&self, constructor: &str) -> Option<&BTreeMap<String, u32>> {
        self.constructor_fields.get(constructor)
    }

    // ---------------------------------------------------------------
    // queries

    pub fn is_concrete_type(&mut self, id: TypeVarId) -> bool {
        let mut occurs = HashSet::new();
        self.is_concrete_inner(id, &mut occurs)
    }

    fn is_concrete_inner(&mut self, id: TypeVarId, occurs: &mut HashSet<TypeOpId>) -> bool {
        let root = self.resolve(id, true);
        let Some(op) = self.var(root).op else {
            return false;
        };
        if occurs.contains(&op) {
            return true;
        }
        occurs.insert(op);
        for arg in self.op_args(op) {
            if !self.is_concrete_inner(arg, occurs) {
                return false;
            }
        }
        true
    }

    /// Boxed types are represented behind a pointer at runtime: tuples,
    /// sums, functions, and user constructors.
    pub fn is_boxed_type(&mut self, id: TypeVarId) -> bool {
        let root = self.resolve(id, true);
        let Some(op) = self.var(root).op else {
            return false;
        };
        let ctor = &self.op_node(op).ctor;
        ctor == TUPLE_CTOR || ctor == SUM_CTOR || ctor == FN_CTOR || Self::is_constructor_name(ctor)
    }

    pub fn function_return_type(&mut self, func_type: TypeVarId) -> Option<TypeVarId> {
        let root = self.resolve(func_type, true);
        let op = self.var(root).op?;
        let args = self.op_args(op);
        if args.len() == 2 {
            Some(self.resolve(args[1], true))
        } else {
            None
        }
    }

    pub fn function_arg_types(&mut self, func_type: TypeVarId) -> Vec<TypeVarId> {
        let root = self.resolve(func_type, true);
        let Some(op) = self.var(root).op else {
            return Vec::new();
        };
        let ctor = self.op_node(op).ctor.clone();
        if ctor == SUM_CTOR || Self::is_constructor_name(&ctor) {
            // don't recurse on variants or constructors
            return vec![root];
        }
        let op_args = self.op_args(op);
        let Some(domain) = op_args.first().copied() else {
            return Vec::new();
        };
        let args = self.resolve(domain, true);
        let Some(args_op) = self.var(args).op else {
            return Vec::new();
        };
        let args_ctor = self.op_node(args_op).ctor.clone();
        if args_ctor == SUM_CTOR || Self::is_constructor_name(&args_ctor) {
            return vec![args];
        }
        let inner = self.op_args(args_op);
        if !inner.is_empty() {
            inner
        } else if args != self.unit_type {
            vec![args]
        } else {
            Vec::new()
        }
    }

    /// Resolve a type annotation: primitives, then the user type
    /// registry, then the active typeclass parameters.
    pub fn type_variable_from_identifier(&mut self, name: &str) -> Result<TypeVarId, TypeError> {
        match name {
            "int" => Ok(self.int_type),
            "float" => Ok(self.float_type),
            "string" => Ok(self.string_type),
            "bool" => Ok(self.bool_type),
            "()" => Ok(self.unit_type),
            _ => self
                .type_registry
                .get(name)
                .or_else(|| self.typeclass_env.get(name))
                .copied()
                .ok_or_else(|| TypeError::UnknownType(name.to_string())),
        }
    }

    // ---------------------------------------------------------------
    // printing

    /// Printable name; free variables are assigned generated names that
    /// stick ("'a", "'b", ...).
    pub fn name_of(&mut self, id: TypeVarId) -> String {
        self.name_inner(id, true, HashSet::new())
    }

    /// Printable name that leaves free variables unnamed.
    pub fn display_name(&mut self, id: TypeVarId) -> String {
        self.name_inner(id, false, HashSet::new())
    }

    fn name_inner(&mut self, id: TypeVarId, store: bool, mut occurs: HashSet<TypeVarId>) -> String {
        // break cycles when printing recursive types
        let variant_name = self.var(id).variant_name.clone();
        let in_registry = variant_name
            .as_ref()
            .is_some_and(|name| self.type_registry.contains_key(name));
        if !occurs.is_empty() && in_registry {
            if let Some(name) = variant_name {
                return name;
            }
        }
        if occurs.contains(&id) {
            return self.variant_name_of(id);
        }
        occurs.insert(id);

        let node = self.resolve(id, true);
        if let Some(name) = self.var(node).type_name.clone() {
            return name;
        }
        if let Some(op) = self.var(node).op {
            return self.op_to_string(op, store, &occurs);
        }
        let generated = self.name_gen.next_name();
        if store {
            self.var_mut(node).type_name = Some(generated.clone());
        }
        generated
    }

    fn op_to_string(&mut self, op: TypeOpId, store: bool, occurs: &HashSet<TypeVarId>) -> String {
        let ctor = self.op_node(op).ctor.clone();
        let args = self.op_args(op);
        if args.is_empty() {
            return ctor;
        }
        if args.len() == 1 {
            let arg = self.name_inner(args[0], store, occurs.clone());
            return format!("{} {}", ctor, arg);
        }
        let mut out = self.name_inner(args[0], store, occurs.clone());
        for arg in &args[1..] {
            out.push_str(&ctor);
            out.push_str(&self.name_inner(*arg, store, occurs.clone()));
        }
        out
    }

    // The variant a recursive occurrence belongs to, for cycle breaking.
    fn variant_name_of(&mut self, id: TypeVarId) -> String {
        let root = self.resolve(id, true);
        let Some(op) = self.var(root).op else {
            return String::new();
        };
        let ctor = self.op_node(op).ctor.clone();
        if Self::is_constructor_name(&ctor) {
            return self
                .get_type_from_constructor(&ctor)
                .and_then(|variant| self.var(variant).variant_name.clone())
                .unwrap_or_default();
        }
        for arg in self.op_args(op) {
            let name = self.variant_name_of(arg);
            if !name.is_empty() {
                return name;
            }
        }
        String::new()
    }
}
