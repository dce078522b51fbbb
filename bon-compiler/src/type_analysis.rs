// Type analysis: walks every function body and top-level expression,
// emitting unification constraints, resolving calls (typeclass methods,
// known functions, extern prototypes), and capturing the ambient type
// environment on call and operator nodes for later monomorphization.
//
// The pass is best-effort: mismatches are reported and the walk
// continues, so a compile surfaces as many errors as possible. Only a
// crossed diagnostic ceiling stops it.

use bon_ast::{BinOp, Expr, ExprKind, Function, TypeVarId};
use bon_diagnostics::{classes, fuzzy, DiagnosticEngine, Halt, Span};
use bon_types::{ModuleState, TypeError, SUM_CTOR, TUPLE_CTOR};

pub fn run(state: &mut ModuleState, diags: &mut DiagnosticEngine) -> Result<(), Halt> {
    let mut pass = TypeAnalysis {
        state,
        diags,
        mangle_counter: 0,
    };
    pass.run_all()
}

struct TypeAnalysis<'a> {
    state: &'a mut ModuleState,
    diags: &'a mut DiagnosticEngine,
    mangle_counter: usize,
}

impl<'a> TypeAnalysis<'a> {
    fn run_all(&mut self) -> Result<(), Halt> {
        // typeclass impl methods
        let classes: Vec<String> = self.state.typeclasses.keys().cloned().collect();
        for class in classes {
            let impl_ids: Vec<usize> = self
                .state
                .typeclasses
                .get(&class)
                .map(|tc| tc.impls.iter().map(|imp| imp.id).collect())
                .unwrap_or_default();
            for impl_id in impl_ids {
                let methods: Vec<String> = self
                    .state
                    .typeclasses
                    .get(&class)
                    .and_then(|tc| tc.impls.iter().find(|imp| imp.id == impl_id))
                    .map(|imp| imp.methods.keys().cloned().collect())
                    .unwrap_or_default();
                for method in methods {
                    if let Some(mut func) = self.detach_impl_method(&class, impl_id, &method) {
                        self.process_function(&mut func)?;
                        self.attach_impl_method(&class, impl_id, method, func);
                    }
                }
            }
        }

        // named functions, in definition order
        let names = self.state.function_names.clone();
        for name in names {
            if let Some(mut func) = self.state.all_functions.remove(&name) {
                self.process_function(&mut func)?;
                self.state.all_functions.insert(name, func);
            }
        }

        // top-level expressions
        let mut toplevel = std::mem::take(&mut self.state.toplevel_expressions);
        for func in &mut toplevel {
            self.process_function(func)?;
        }
        self.state.toplevel_expressions = toplevel;
        Ok(())
    }

    fn detach_impl_method(&mut self, class: &str, impl_id: usize, method: &str) -> Option<Function> {
        self.state
            .typeclasses
            .get_mut(class)?
            .impls
            .iter_mut()
            .find(|imp| imp.id == impl_id)?
            .methods
            .remove(method)
    }

    fn attach_impl_method(&mut self, class: &str, impl_id: usize, method: String, func: Function) {
        if let Some(imp) = self
            .state
            .typeclasses
            .get_mut(class)
            .and_then(|tc| tc.impls.iter_mut().find(|imp| imp.id == impl_id))
        {
            imp.methods.insert(method, func);
        }
    }

    fn process_function(&mut self, func: &mut Function) -> Result<(), Halt> {
        let line = func.line;
        let column = func.column;

        // prototype: declared return unifies with the codomain slot
        if let Some(ret) = self.state.types.function_return_type(func.proto.type_var) {
            self.unify_at(func.proto.ret_type, ret, func.proto.line, func.proto.column)?;
        }

        // unify the prototype with a function type over the parameter
        // variables shared with the body
        let func_type = self.state.types.build_function_type(&func.params, None);
        self.unify_at(func.proto.type_var, func_type, line, column)?;

        if let Some(ret) = self.state.types.function_return_type(func.type_var()) {
            let last = func.body.last_in_sequence().type_var;
            self.unify_at(last, ret, line, column)?;
            self.unify_at(func.proto.ret_type, ret, line, column)?;
            self.process_expr(&mut func.body)?;
            self.unify_at(func.body.type_var, ret, line, column)?;
        } else {
            self.process_expr(&mut func.body)?;
        }

        // force generated names for remaining free variables
        let type_var = func.type_var();
        self.state.types.name_of(type_var);
        Ok(())
    }

    fn process_expr(&mut self, expr: &mut Expr) -> Result<(), Halt> {
        let line = expr.line;
        let column = expr.column;
        let node_tv = expr.type_var;

        match &mut expr.kind {
            ExprKind::Float(_)
            | ExprKind::Int(_)
            | ExprKind::Str(_)
            | ExprKind::Bool(_)
            | ExprKind::Unit
            | ExprKind::Variable(_) => Ok(()),

            ExprKind::Constructor {
                name,
                args,
                type_env,
                ..
            } => {
                let name = name.clone();
                self.state.types.push_env(type_env);
                let result = self.process_constructor(&name, args, node_tv, line, column);
                *type_env = self.state.types.pop_env();
                result
            }

            ExprKind::Unary {
                op,
                operand,
                type_env,
            } => {
                let callee = op.function_name();
                self.state.types.push_env(type_env);
                let result = (|| {
                    self.process_expr(operand)?;
                    self.unify_at(operand.type_var, node_tv, line, column)
                })();
                *type_env = self.state.types.pop_env();
                let mangled = self.mangle(&callee, line);
                self.state.record_call_env(&callee, mangled, type_env.clone());
                result
            }

            ExprKind::Binary {
                op,
                lhs,
                rhs,
                inherit_child_type,
                type_env,
                ..
            } => {
                let op = *op;
                let inherit = *inherit_child_type;
                let captures = op.captures_env();
                if captures {
                    self.state.types.push_env(type_env);
                }
                let result = (|| {
                    self.process_expr(lhs)?;
                    self.process_expr(rhs)?;
                    if inherit {
                        self.unify_at(node_tv, rhs.type_var, line, column)?;
                    }
                    // don't unify operands across sequencing, boolean
                    // connectives, or field access
                    if !matches!(op, BinOp::Seq | BinOp::Dot | BinOp::And | BinOp::Or) {
                        self.unify_at(lhs.type_var, rhs.type_var, line, column)?;
                    }
                    if op == BinOp::Dot {
                        self.process_field_access(lhs, rhs, line, column)?;
                    }
                    Ok(())
                })();
                if captures {
                    *type_env = self.state.types.pop_env();
                    let callee = op.function_name();
                    let mangled = self.mangle(&callee, line);
                    self.state.record_call_env(&callee, mangled, type_env.clone());
                }
                result
            }

            ExprKind::If {
                cond,
                then_body,
                else_body,
            } => {
                self.process_expr(cond)?;
                self.process_expr(then_body)?;
                if let Some(else_body) = else_body {
                    self.process_expr(else_body)?;
                }
                let bool_type = self.state.types.bool_type;
                self.unify_at(cond.type_var, bool_type, line, column)?;
                match else_body {
                    Some(else_body) => {
                        self.unify_at(then_body.type_var, else_body.type_var, line, column)?;
                        self.unify_at(node_tv, then_body.type_var, line, column)?;
                    }
                    None => {
                        let unit = self.state.types.unit_type;
                        self.unify_at(node_tv, unit, line, column)?;
                    }
                }
                Ok(())
            }

            ExprKind::While { cond, body } => {
                self.process_expr(cond)?;
                self.process_expr(body)?;
                let bool_type = self.state.types.bool_type;
                self.unify_at(cond.type_var, bool_type, line, column)?;
                let unit = self.state.types.unit_type;
                self.unify_at(node_tv, unit, line, column)?;
                Ok(())
            }

            ExprKind::Match { scrutinee, cases } => {
                self.process_expr(scrutinee)?;
                let mut body_var: Option<TypeVarId> = None;
                for case in cases.iter_mut() {
                    self.process_expr(&mut case.pattern)?;
                    self.process_expr(&mut case.body)?;
                    self.unify_at(case.body.type_var, case.type_var, case.line, case.column)?;

                    // patterns unify with the scrutinee modulo lifting
                    // constructors to their parent variant
                    let pattern_parent = self.parent_type(case.pattern.type_var);
                    let scrutinee_parent = self.parent_type(scrutinee.type_var);
                    self.unify_at(pattern_parent, scrutinee_parent, case.line, case.column)?;

                    let case_body = self.parent_type(case.body.type_var);
                    if let Some(previous) = body_var {
                        let previous = self.parent_type(previous);
                        self.unify_at(previous, case_body, case.line, case.column)?;
                    }
                    body_var = Some(case_body);
                }
                if let Some(last) = body_var {
                    let last = self.parent_type(last);
                    let node_parent = self.parent_type(node_tv);
                    self.unify_at(last, node_parent, line, column)?;
                }
                Ok(())
            }

            ExprKind::Call {
                callee,
                args,
                type_env,
            } => {
                let callee = callee.clone();
                self.state.types.push_env(type_env);
                let result = self.process_call(&callee, args, node_tv, line, column);
                *type_env = self.state.types.pop_env();
                let mangled = self.mangle(&callee, line);
                self.state.record_call_env(&callee, mangled, type_env.clone());
                result
            }

            ExprKind::Sizeof { arg } => {
                self.process_expr(arg)?;
                let int = self.state.types.int_type;
                self.unify_at(node_tv, int, line, column)
            }

            ExprKind::PtrOffset { ptr, offset, .. } => {
                self.process_expr(ptr)?;
                self.process_expr(offset)?;
                let int = self.state.types.int_type;
                self.unify_at(offset.type_var, int, line, column)
            }
        }
    }

    fn process_constructor(
        &mut self,
        name: &str,
        args: &mut [Expr],
        node_tv: TypeVarId,
        line: usize,
        column: usize,
    ) -> Result<(), Halt> {
        let variant = self.state.types.get_type_from_constructor(name);

        let mut param_types = Vec::with_capacity(args.len());
        for arg in args.iter_mut() {
            self.process_expr(arg)?;
            param_types.push(arg.type_var);
        }
        let tuple = self.state.types.build_tuple_type(&param_types);
        let ctor_args = match tuple {
            Some(t) => vec![t],
            None => Vec::new(),
        };
        let ctor_var = self.state.types.build_from_type_constructor(name, ctor_args);

        let Some(variant) = variant else {
            return self.report(
                classes::UNBOUND_NAME,
                format!("unknown constructor {}", name),
                line,
                column,
            );
        };
        self.unify_at(ctor_var, variant, line, column)?;
        self.unify_at(node_tv, ctor_var, line, column)?;
        Ok(())
    }

    // Field access e.f: resolve the constructor of e and unify f with
    // the type at the field's index. Left unconstrained when the
    // receiver's constructor is not yet known.
    fn process_field_access(
        &mut self,
        lhs: &Expr,
        rhs: &Expr,
        line: usize,
        column: usize,
    ) -> Result<(), Halt> {
        let ExprKind::Variable(field) = &rhs.kind else {
            return Ok(());
        };
        let field = field.clone();

        let root = self.state.types.resolve(lhs.type_var, true);
        let Some(op) = self.state.types.op_of(root) else {
            return Ok(());
        };
        let ctor = self.state.types.op_ctor(op).to_string();
        if self.state.types.constructor_fields(&ctor).is_none() {
            return Ok(());
        }
        let index = match self.state.types.constructor_field_index(&ctor, &field) {
            Ok(index) => index as usize,
            Err(err) => {
                return self.report(classes::UNBOUND_NAME, err.to_string(), line, column);
            }
        };

        let args = self.state.types.op_args(op);
        let Some(payload) = args.first().copied() else {
            return Ok(());
        };
        let payload_root = self.state.types.resolve(payload, true);
        let field_tv = match self.state.types.op_of(payload_root) {
            Some(payload_op) if self.state.types.op_ctor(payload_op) == TUPLE_CTOR => {
                match self.state.types.op_args(payload_op).get(index).copied() {
                    Some(tv) => tv,
                    None => return Ok(()),
                }
            }
            _ => payload_root,
        };
        self.unify_at(rhs.type_var, field_tv, line, column)
    }

    fn process_call(
        &mut self,
        callee: &str,
        args: &mut [Expr],
        node_tv: TypeVarId,
        line: usize,
        column: usize,
    ) -> Result<(), Halt> {
        let mut arg_types = Vec::with_capacity(args.len());
        for arg in args.iter_mut() {
            self.process_expr(arg)?;
            arg_types.push(arg.type_var);
        }
        let func_type_var = self.state.types.build_function_type(&arg_types, None);

        // a typeclass method whose argument types are not concrete yet:
        // unify with the generic method type and defer impl resolution
        if let Some(class) = self.state.method_to_typeclass.get(callee).cloned() {
            let domain = self
                .state
                .types
                .op_of(func_type_var)
                .and_then(|op| self.state.types.op_args(op).first().copied());
            let concrete = match domain {
                Some(domain) => self.state.types.is_concrete_type(domain),
                None => false,
            };
            if !concrete {
                let method_tv = self
                    .state
                    .typeclasses
                    .get(&class)
                    .and_then(|tc| tc.methods.get(callee).copied());
                if let Some(method_tv) = method_tv {
                    self.unify_at(func_type_var, method_tv, line, column)?;
                    if let Some(ret) = self.state.types.function_return_type(func_type_var) {
                        self.unify_at(node_tv, ret, line, column)?;
                    }
                    return Ok(());
                }
            }
        }

        // a known function, or a typeclass impl matching the call type
        let sig = match self.state.fn_sigs.get(callee).copied() {
            Some(sig) => Some(sig),
            None => self.state.impl_method_for(callee, func_type_var),
        };

        let Some(sig) = sig else {
            // extern prototypes are looked up last
            let proto = self
                .state
                .function_protos
                .get(callee)
                .map(|proto| (proto.type_var, proto.args.len()));
            if let Some((proto_tv, proto_arity)) = proto {
                if args.len() != proto_arity {
                    return self.report(
                        classes::ARITY_MISMATCH,
                        format!(
                            "function {} takes {} argument(s), but {} were given",
                            callee,
                            proto_arity,
                            args.len()
                        ),
                        line,
                        column,
                    );
                }
                self.unify_at(func_type_var, proto_tv, line, column)?;
                if let Some(ret) = self.state.types.function_return_type(proto_tv) {
                    self.unify_at(node_tv, ret, line, column)?;
                }
                return Ok(());
            }

            if self.state.method_to_typeclass.contains_key(callee) {
                let lhs = self.state.types.display_name(func_type_var);
                return self.report(
                    classes::NO_MATCHING_IMPL,
                    format!("no implementation of {} matches {}", callee, lhs),
                    line,
                    column,
                );
            }

            let mut message = format!("calling undefined function {}", callee);
            let candidates: Vec<String> = self
                .state
                .fn_sigs
                .keys()
                .chain(self.state.function_protos.keys())
                .cloned()
                .collect();
            let suggestions = fuzzy::suggest(callee, candidates.iter());
            if !suggestions.is_empty() {
                message.push_str(&format!(" (did you mean {}?)", suggestions.join(", ")));
            }
            return self.report(classes::UNBOUND_NAME, message, line, column);
        };

        if args.len() != sig.arity {
            return self.report(
                classes::ARITY_MISMATCH,
                format!(
                    "function {} takes {} argument(s), but {} were given",
                    callee,
                    sig.arity,
                    args.len()
                ),
                line,
                column,
            );
        }

        // freshen the callee's free type variables in this call's
        // environment (let-polymorphism), then unify
        self.state.types.fresh_function_type(sig.type_var);
        self.unify_at(func_type_var, sig.type_var, line, column)?;
        self.unify_at(node_tv, sig.body_type_var, line, column)?;
        Ok(())
    }

    // Lift a constructor type to its registered parent variant.
    fn parent_type(&mut self, type_var: TypeVarId) -> TypeVarId {
        let child = self.state.types.resolve(type_var, true);
        if let Some(op) = self.state.types.op_of(child) {
            let ctor = self.state.types.op_ctor(op).to_string();
            if ctor != SUM_CTOR {
                if let Some(variant) = self.state.types.get_type_from_constructor(&ctor) {
                    return self.state.types.resolve(variant, true);
                }
            }
        }
        child
    }

    fn mangle(&mut self, callee: &str, line: usize) -> String {
        self.mangle_counter += 1;
        format!(":{}:{}:{}", line, callee, self.mangle_counter)
    }

    fn unify_at(
        &mut self,
        lhs: TypeVarId,
        rhs: TypeVarId,
        line: usize,
        column: usize,
    ) -> Result<(), Halt> {
        if let Err(err) = self.state.types.unify(lhs, rhs) {
            let class = match err {
                TypeError::Mismatch { .. } | TypeError::Shape => classes::TYPE_MISMATCH,
                _ => classes::TYPE_ERROR,
            };
            self.diags.error(
                class,
                err.to_string(),
                Span::new(&self.state.filename, line, column),
            )?;
        }
        Ok(())
    }

    fn report(
        &mut self,
        class: &str,
        message: String,
        line: usize,
        column: usize,
    ) -> Result<(), Halt> {
        self.diags.error(
            class,
            message,
            Span::new(&self.state.filename, line, column),
        )
    }
}
