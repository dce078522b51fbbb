// Top-level items: function definitions, typeclasses and their impls,
// `type` declarations, extern prototypes, and top-level expressions.

use super::Parser;
use crate::ParseError;
use bon_ast::{
    BinOp, Function, Prototype, TypeDecl, TypeEnv, Typeclass, TypeclassImpl, TypeVarId, UnOp,
};
use bon_diagnostics::classes;
use bon_lexer::Token;
use std::collections::BTreeMap;

impl<'a> Parser<'a> {
    // def name(arg, ...) | def operator<op>(...) | def unary<op>(...)
    pub(crate) fn parse_prototype(&mut self) -> Result<Prototype, ParseError> {
        let name = match self.lexer.peek().clone() {
            Token::Unary => {
                self.lexer.consume();
                let op = match self.lexer.peek() {
                    Token::Minus => UnOp::Neg,
                    Token::Plus => UnOp::Pos,
                    Token::Star => UnOp::Star,
                    _ => {
                        return self.error_here(
                            classes::SYNTAX_ERROR,
                            "expected unary operator in prototype",
                        )
                    }
                };
                self.lexer.consume();
                op.function_name()
            }
            Token::Operator => {
                self.lexer.consume();
                let label = self.lexer.peek().label();
                self.lexer.consume();
                format!("operator{}", label)
            }
            Token::Ident(name) => {
                self.lexer.consume();
                name
            }
            _ => {
                return self
                    .error_here(classes::SYNTAX_ERROR, "expected function name in prototype")
            }
        };

        if self.lexer.peek() != &Token::LParen && self.lexer.peek() != &Token::Unit {
            return self.error_here(
                classes::SYNTAX_ERROR,
                "expected '(' after function name in prototype",
            );
        }
        let expecting_close_paren = self.lexer.peek() != &Token::Unit;

        let mut arg_names = Vec::new();
        let mut arg_owned = Vec::new();
        let mut arg_types = Vec::new();
        // eat '(' or '()'
        self.lexer.consume();
        while matches!(self.lexer.peek(), Token::Ident(_) | Token::Star) {
            if self.lexer.peek() == &Token::Star {
                // '*' marks an ownership-transferring argument
                arg_owned.push(true);
                self.lexer.consume();
                if !matches!(self.lexer.peek(), Token::Ident(_)) {
                    return self.error_here(classes::SYNTAX_ERROR, "expected arg name after '*'");
                }
            } else {
                arg_owned.push(false);
            }
            if let Token::Ident(name) = self.lexer.peek().clone() {
                arg_names.push(name);
            }
            // eat identifier
            self.lexer.consume();

            if self.lexer.peek() == &Token::Colon {
                self.lexer.consume();
                let type_var = self.parse_type_annotation()?;
                arg_types.push(type_var);
            } else {
                arg_types.push(self.new_type_var());
            }

            if self.lexer.peek() != &Token::Comma {
                break;
            }
            // eat ','
            self.lexer.consume();
        }

        if expecting_close_paren {
            if self.lexer.peek() != &Token::RParen {
                return self.error_here(classes::SYNTAX_ERROR, "expected ')' in prototype");
            }
            self.lexer.consume();
        }

        let ret_type = if self.lexer.peek() == &Token::Arrow {
            // eat '->'
            self.lexer.consume();
            self.parse_type_annotation()?
        } else {
            self.new_type_var()
        };

        let (line, column) = self.pos();
        let type_var = self.state.types.build_function_type(&arg_types, Some(ret_type));
        Ok(Prototype {
            name,
            args: arg_names,
            arg_owned,
            type_var,
            ret_type,
            line,
            column,
        })
    }

    // A type annotation: a primitive or registered type name, or an
    // active typeclass parameter.
    fn parse_type_annotation(&mut self) -> Result<TypeVarId, ParseError> {
        let (line, column) = self.pos();
        let name = match self.lexer.peek().clone() {
            Token::Ident(name) | Token::TypeIdent(name) => name,
            Token::Unit => "()".to_string(),
            _ => return self.error_here(classes::SYNTAX_ERROR, "expected type name"),
        };
        match self.state.types.type_variable_from_identifier(&name) {
            Ok(type_var) => {
                // eat type identifier
                self.lexer.consume();
                Ok(type_var)
            }
            Err(err) => {
                self.report_type_error(&err, line, column)?;
                Err(ParseError::Syntax)
            }
        }
    }

    // parse function definition
    pub(crate) fn parse_definition(&mut self) -> Result<Function, ParseError> {
        let line = self.lexer.line_number();
        // eat 'def'
        self.lexer.consume();
        let column = self.lexer.column();
        let proto = self.parse_prototype()?;

        let had_colon = if self.lexer.peek() == &Token::Colon {
            self.lexer.consume();
            true
        } else {
            false
        };

        let started_with_indent = if self.lexer.peek() == &Token::Indent {
            self.lexer.consume();
            true
        } else {
            false
        };
        if !started_with_indent && !had_colon {
            return self.error_here(
                classes::SYNTAX_ERROR,
                "expected ':' after prototype for single-line function",
            );
        }

        let mut expecting_return = self.lexer.peek() == &Token::Return;
        if expecting_return {
            // eat optional 'return'
            self.lexer.consume();
        }

        self.vars_in_scope.clear();
        self.called_functions.clear();

        let mut body = self.parse_expression()?;
        if started_with_indent {
            while self.lexer.peek() != &Token::Dedent {
                // eat optional ';'
                if self.lexer.peek() == &Token::Semicolon {
                    self.lexer.consume();
                    continue;
                }
                if expecting_return {
                    return self
                        .error_here(classes::SYNTAX_ERROR, "expected unindent after 'return'");
                }
                if self.lexer.peek() == &Token::Return {
                    // the function must end after the next expression
                    self.lexer.consume();
                    expecting_return = true;
                }
                let (seq_line, seq_column) = self.pos();
                let next = self.parse_expression()?;
                body = self.make_binary(seq_line, seq_column, BinOp::Seq, body, next);
            }
            // eat unindentation
            self.lexer.consume();
            if self.lexer.peek() != &Token::End {
                return self.error_at(
                    classes::SYNTAX_ERROR,
                    "expected 'end' after function body",
                    line,
                    column,
                );
            }
            self.lexer.consume();
        } else if self.lexer.peek() == &Token::End {
            // eat optional 'end' on a single-line function
            self.lexer.consume();
        }

        let mut params = Vec::new();
        for arg in &proto.args {
            match self.vars_in_scope.get(arg) {
                Some(type_var) => params.push(*type_var),
                None => {
                    // unused parameter still needs a type slot
                    let fresh = self.state.types.new_var();
                    params.push(fresh);
                }
            }
        }
        self.vars_in_scope.clear();

        Ok(Function {
            proto,
            body,
            params,
            dependencies: std::mem::take(&mut self.called_functions),
            type_env: TypeEnv::new(),
            typeclass: None,
            line,
            column,
        })
    }

    // class Name<T, ...> with method prototypes, closed by 'end'
    pub(crate) fn parse_typeclass(&mut self) -> Result<Typeclass, ParseError> {
        let (line, column) = self.pos();
        // eat 'class'
        self.lexer.consume();

        let name = match self.lexer.peek().clone() {
            Token::TypeIdent(name) => {
                self.lexer.consume();
                name
            }
            Token::Ident(_) => {
                return self.error_here(
                    classes::SYNTAX_ERROR,
                    "expected class name after 'class' (must be capitalized)",
                )
            }
            _ => return self.error_here(classes::SYNTAX_ERROR, "expected class name after 'class'"),
        };

        if self.lexer.peek() != &Token::Lt {
            return self.error_here(
                classes::SYNTAX_ERROR,
                format!("expected '<' after 'class {}'", name),
            );
        }
        // eat '<'
        self.lexer.consume();

        let mut params = Vec::new();
        let mut param_types = TypeEnv::new();
        while self.lexer.peek() != &Token::Gt {
            match self.lexer.peek().clone() {
                Token::TypeIdent(param) => {
                    params.push(param.clone());
                    let fresh = self.new_type_var();
                    param_types.insert(param, fresh);
                    self.lexer.consume();
                }
                Token::Ident(_) => {
                    return self.error_here(
                        classes::SYNTAX_ERROR,
                        "expected type variable (must be capitalized)",
                    )
                }
                _ => return self.error_here(classes::SYNTAX_ERROR, "expected type variable"),
            }
            if self.lexer.peek() != &Token::Comma && self.lexer.peek() != &Token::Gt {
                return self
                    .error_here(classes::SYNTAX_ERROR, "expected ',' or '>' in type variable list");
            }
            if self.lexer.peek() == &Token::Comma {
                self.lexer.consume();
            }
        }
        // eat '>'
        self.lexer.consume();

        self.expect(&Token::Indent, "expected indent after class prototype")?;

        // method prototypes see the class parameters as types
        self.state.types.push_typeclass_env(param_types);

        let mut methods = BTreeMap::new();
        while self.lexer.peek() == &Token::Def {
            // eat 'def'
            self.lexer.consume();
            let proto = self.parse_prototype()?;
            if self.lexer.peek() != &Token::Semicolon {
                let (eline, ecolumn) = self.pos();
                self.report_at(
                    classes::SYNTAX_ERROR,
                    "expected ';' after class member declaration",
                    eline,
                    ecolumn,
                )?;
                continue;
            }
            let fresh = self.new_type_var();
            // unifying a fresh variable with the prototype cannot fail
            let _ = self.state.types.unify(fresh, proto.type_var);
            methods.insert(proto.name.clone(), fresh);
            // eat ';'
            self.lexer.consume();
        }

        let param_types = self.state.types.pop_typeclass_env();

        self.expect(&Token::Dedent, "expected unindent after class members")?;
        self.expect(&Token::End, "expected 'end' after class definition")?;

        Ok(Typeclass {
            name,
            params,
            param_types,
            methods,
            impls: Vec::new(),
            line,
            column,
        })
    }

    // impl Name<concrete, ...> with method definitions, closed by 'end'
    pub(crate) fn parse_typeclass_impl(&mut self) -> Result<TypeclassImpl, ParseError> {
        let (line, column) = self.pos();
        // eat 'impl'
        self.lexer.consume();

        let class_name = match self.lexer.peek().clone() {
            Token::TypeIdent(name) => {
                self.lexer.consume();
                name
            }
            Token::Ident(_) => {
                return self.error_here(
                    classes::SYNTAX_ERROR,
                    "expected class name after 'impl' (must be capitalized)",
                )
            }
            _ => return self.error_here(classes::SYNTAX_ERROR, "expected class name after 'impl'"),
        };

        if self.lexer.peek() != &Token::Lt {
            return self.error_here(
                classes::SYNTAX_ERROR,
                format!("expected '<' after 'impl {}'", class_name),
            );
        }
        // eat '<'
        self.lexer.consume();

        let mut params = Vec::new();
        let mut param_types = TypeEnv::new();
        while self.lexer.peek() != &Token::Gt {
            match self.lexer.peek().clone() {
                Token::Ident(param) => {
                    params.push(param.clone());
                    let fresh = self.new_type_var();
                    param_types.insert(param, fresh);
                    self.lexer.consume();
                }
                Token::TypeIdent(param) => {
                    // allow registered user types like Option here; a
                    // bare unknown capital is a type variable by mistake
                    if self.state.types.lookup_type(&param).is_none() {
                        return self.error_here(
                            classes::SYNTAX_ERROR,
                            "expected concrete type (got a type variable instead)",
                        );
                    }
                    params.push(param.clone());
                    let fresh = self.new_type_var();
                    param_types.insert(param, fresh);
                    self.lexer.consume();
                }
                _ => return self.error_here(classes::SYNTAX_ERROR, "expected concrete type name"),
            }
            if self.lexer.peek() != &Token::Comma && self.lexer.peek() != &Token::Gt {
                return self.error_here(classes::SYNTAX_ERROR, "expected ',' or '>' in type list");
            }
            if self.lexer.peek() == &Token::Comma {
                self.lexer.consume();
            }
        }
        // eat '>'
        self.lexer.consume();

        self.expect(&Token::Indent, "expected indent after class prototype")?;

        let mut methods = BTreeMap::new();
        while self.lexer.peek() == &Token::Def {
            let mut func = self.parse_definition()?;
            func.typeclass = Some(class_name.clone());
            methods.insert(func.proto.name.clone(), func);
        }

        self.expect(&Token::Dedent, "expected unindent after class members")?;
        self.expect(&Token::End, "expected 'end' after class impl")?;

        Ok(TypeclassImpl {
            id: 0,
            class_name,
            params,
            param_types,
            methods,
            line,
            column,
        })
    }

    // type Name<T, ...> with one constructor per line, closed by 'end'
    pub(crate) fn parse_type_decl(&mut self) -> Result<TypeDecl, ParseError> {
        let (line, column) = self.pos();
        // eat 'type'
        self.lexer.consume();

        let name = match self.lexer.peek().clone() {
            Token::TypeIdent(name) | Token::Ident(name) => {
                self.lexer.consume();
                name
            }
            _ => return self.error_here(classes::SYNTAX_ERROR, "expected type name"),
        };

        let variant = self.new_type_var();
        self.state.types.set_variant_name(variant, &name);
        // register before parsing the body to allow recursive definitions
        if let Err(err) = self.state.types.register_type(&name, variant) {
            self.report_type_error(&err, line, column)?;
        }

        let mut type_parameters = TypeEnv::new();
        if self.lexer.peek() == &Token::Lt {
            // eat '<'
            self.lexer.consume();
            while self.lexer.peek() != &Token::Gt {
                let param = match self.lexer.peek().clone() {
                    Token::TypeIdent(param) | Token::Ident(param) => {
                        self.lexer.consume();
                        param
                    }
                    _ => return self.error_here(classes::SYNTAX_ERROR, "expected type name"),
                };
                let mangled = format!("{}:{}", name, param);
                let fresh = self.new_type_var();
                self.state.types.set_type_name(fresh, &mangled);
                type_parameters.insert(mangled, fresh);
                if self.lexer.peek() != &Token::Comma && self.lexer.peek() != &Token::Gt {
                    return self.error_here(
                        classes::SYNTAX_ERROR,
                        "expected ',' or '>' in type parameter list",
                    );
                }
                if self.lexer.peek() == &Token::Comma {
                    self.lexer.consume();
                }
            }
            // eat '>'
            self.lexer.consume();
        } else if self.lexer.peek() != &Token::Indent {
            return self.error_here(classes::SYNTAX_ERROR, "expected indent after type declaration");
        }

        self.expect(&Token::Indent, "expected indent after type declaration")?;

        let mut constructors: BTreeMap<String, Option<TypeVarId>> = BTreeMap::new();
        let mut fields: BTreeMap<String, u32> = BTreeMap::new();
        while self.lexer.peek() != &Token::Dedent {
            let ctor_name = match self.lexer.peek().clone() {
                Token::TypeIdent(ctor) => {
                    self.lexer.consume();
                    ctor
                }
                Token::Ident(_) => {
                    return self.error_here(
                        classes::SYNTAX_ERROR,
                        "expected type constructor (first letter must be capitalized)",
                    )
                }
                _ => return self.error_here(classes::SYNTAX_ERROR, "expected type constructor"),
            };

            if self.lexer.peek() != &Token::LParen {
                // simple enum, no params
                constructors.insert(ctor_name, None);
                continue;
            }
            // eat '('
            self.lexer.consume();

            let mut ctor_params = Vec::new();
            // for allowing line breaks
            let mut indented = false;
            while self.lexer.peek() != &Token::RParen {
                let type_var =
                    self.parse_constructor_param(&name, &type_parameters, &mut fields, &ctor_params)?;
                ctor_params.push(type_var);

                if self.lexer.peek() != &Token::Comma && self.lexer.peek() != &Token::RParen {
                    return self.error_here(
                        classes::SYNTAX_ERROR,
                        "expected ',' or ')' in type constructor parameter list",
                    );
                }
                if self.lexer.peek() == &Token::Comma {
                    self.lexer.consume();
                }
                if self.lexer.peek() == &Token::Indent {
                    if indented {
                        let (eline, ecolumn) = self.pos();
                        self.report_at(
                            classes::SYNTAX_ERROR,
                            "misaligned indentation",
                            eline,
                            ecolumn,
                        )?;
                    }
                    indented = true;
                    self.lexer.consume();
                }
            }
            // eat ')'
            self.lexer.consume();
            let tuple = self.state.types.build_tuple_type(&ctor_params);
            constructors.insert(ctor_name, tuple);
            if indented {
                self.expect(&Token::Dedent, "missing expected unindent")?;
            }
        }

        if let Err(err) = self
            .state
            .types
            .build_variant_type(variant, &constructors, &fields)
        {
            self.report_type_error(&err, line, column)?;
        }
        // force building the name to make the type generic
        self.state.types.name_of(variant);

        self.expect(&Token::Dedent, "expected unindent after type body")?;
        self.expect(&Token::End, "expected 'end' after type declaration")?;

        Ok(TypeDecl {
            name,
            type_params: type_parameters.keys().cloned().collect(),
            constructors,
            type_var: variant,
            line,
            column,
        })
    }

    // One constructor parameter: a declared type parameter, a
    // `field: type` pair, or a concrete type name (optionally applied to
    // generic arguments, e.g. List<T>).
    fn parse_constructor_param(
        &mut self,
        type_name: &str,
        type_parameters: &TypeEnv,
        fields: &mut BTreeMap<String, u32>,
        ctor_params: &[TypeVarId],
    ) -> Result<TypeVarId, ParseError> {
        let (line, column) = self.pos();
        let mut param_name = match self.lexer.peek().clone() {
            Token::TypeIdent(name) | Token::Ident(name) => {
                self.lexer.consume();
                name
            }
            _ => return self.error_here(classes::SYNTAX_ERROR, "expected type name"),
        };

        let mangled = format!("{}:{}", type_name, param_name);
        if let Some(type_var) = type_parameters.get(&mangled) {
            return Ok(*type_var);
        }

        if self.lexer.peek() == &Token::Colon {
            // named field: record its index, then read the type
            self.lexer.consume();
            fields.insert(param_name, ctor_params.len() as u32);
            param_name = match self.lexer.peek().clone() {
                Token::TypeIdent(name) | Token::Ident(name) => {
                    self.lexer.consume();
                    name
                }
                _ => return self.error_here(classes::SYNTAX_ERROR, "expected type name"),
            };
            let mangled = format!("{}:{}", type_name, param_name);
            if let Some(type_var) = type_parameters.get(&mangled) {
                return Ok(*type_var);
            }
        }

        // generic application like List<T> refers to the registered
        // variant; its parameters are fixed by the declaration
        let applied = self.lexer.peek() == &Token::Lt;
        let result = match self.state.types.type_variable_from_identifier(&param_name) {
            Ok(type_var) => type_var,
            Err(err) => {
                self.report_type_error(&err, line, column)?;
                // recover with a fresh variable
                self.new_type_var()
            }
        };
        if applied {
            // eat '<'
            self.lexer.consume();
            while self.lexer.peek() != &Token::Gt {
                match self.lexer.peek().clone() {
                    Token::TypeIdent(_) | Token::Ident(_) => {
                        self.lexer.consume();
                    }
                    _ => {
                        return self.error_here(
                            classes::SYNTAX_ERROR,
                            "expected type name in type application",
                        )
                    }
                }
                if self.lexer.peek() == &Token::Comma {
                    self.lexer.consume();
                }
            }
            // eat '>'
            self.lexer.consume();
        }
        Ok(result)
    }

    // 'cdef' prototype: an extern declaration for a runtime helper
    pub(crate) fn parse_extern(&mut self) -> Result<Prototype, ParseError> {
        // eat 'cdef'
        self.lexer.consume();
        let proto = self.parse_prototype()?;
        if let Some(ret) = self.state.types.function_return_type(proto.type_var) {
            let _ = self.state.types.unify(proto.ret_type, ret);
        }
        Ok(proto)
    }

    // a top-level statement becomes an anonymous function
    pub(crate) fn parse_toplevel_expr(&mut self) -> Result<Function, ParseError> {
        self.called_functions.clear();
        let body = self.parse_expression()?;
        let (line, column) = (body.line, body.column);
        let ret_type = self.new_type_var();
        let type_var = self.state.types.build_function_type(&[], Some(ret_type));
        Ok(Function {
            proto: Prototype {
                name: "top-level".to_string(),
                args: Vec::new(),
                arg_owned: Vec::new(),
                type_var,
                ret_type,
                line,
                column,
            },
            body,
            params: Vec::new(),
            dependencies: std::mem::take(&mut self.called_functions),
            type_env: TypeEnv::new(),
            typeclass: None,
            line,
            column,
        })
    }
}
