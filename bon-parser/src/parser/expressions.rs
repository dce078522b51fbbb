// Expression parsing: primaries, unary operators, and binary operators
// via precedence climbing. Syntactic sugar (lists, cons, tuples,
// method-style calls) is lowered here.

use super::Parser;
use crate::ParseError;
use bon_ast::{BinOp, Expr, ExprKind, MatchCase, TypeEnv, UnOp};
use bon_diagnostics::classes;
use bon_lexer::Token;

// Binary operator precedences, low to high. Anything absent is not a
// binary operator.
fn precedence(token: &Token) -> i32 {
    match token {
        Token::Assign => 1,
        Token::Or => 3,
        Token::And => 5,
        Token::Pipe => 7,
        Token::Caret => 8,
        Token::Ampersand => 9,
        Token::Lt | Token::Gt | Token::LtEq | Token::GtEq | Token::EqEq | Token::NotEq => 10,
        Token::Shl | Token::Shr => 15,
        Token::Plus | Token::Minus => 20,
        Token::Star | Token::Slash | Token::Percent | Token::ColonColon => 40,
        Token::StarStar => 50,
        Token::PlusPlus => 60,
        Token::Dot => 70,
        _ => -1,
    }
}

fn binop_from_token(token: &Token) -> Option<BinOp> {
    Some(match token {
        Token::Assign => BinOp::Assign,
        Token::Or => BinOp::Or,
        Token::And => BinOp::And,
        Token::Pipe => BinOp::BitOr,
        Token::Caret => BinOp::BitXor,
        Token::Ampersand => BinOp::BitAnd,
        Token::Lt => BinOp::Lt,
        Token::Gt => BinOp::Gt,
        Token::LtEq => BinOp::LtEq,
        Token::GtEq => BinOp::GtEq,
        Token::EqEq => BinOp::Eq,
        Token::NotEq => BinOp::NotEq,
        Token::Shl => BinOp::Shl,
        Token::Shr => BinOp::Shr,
        Token::Plus => BinOp::Add,
        Token::Minus => BinOp::Sub,
        Token::Star => BinOp::Mul,
        Token::Slash => BinOp::Div,
        Token::Percent => BinOp::Rem,
        Token::StarStar => BinOp::Pow,
        Token::PlusPlus => BinOp::Concat,
        Token::Dot => BinOp::Dot,
        _ => return None,
    })
}

impl<'a> Parser<'a> {
    pub(crate) fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_unary()?;
        self.parse_binop(0, lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.lexer.peek() {
            Token::Minus => Some(UnOp::Neg),
            Token::Plus => Some(UnOp::Pos),
            Token::Star => Some(UnOp::Star),
            _ => None,
        };
        let Some(op) = op else {
            return self.parse_primary();
        };

        let (line, column) = self.pos();
        self.lexer.consume();
        let operand = self.parse_unary()?;
        let type_var = self.new_type_var();
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
                type_env: TypeEnv::new(),
            },
            line,
            column,
            type_var,
        ))
    }

    fn parse_binop(&mut self, left_precedence: i32, mut lhs: Expr) -> Result<Expr, ParseError> {
        loop {
            let mut this_precedence = precedence(self.lexer.peek());
            // if this binds at least as tightly as the current binop,
            // consume it, otherwise we are done
            if this_precedence < left_precedence {
                return Ok(lhs);
            }

            let (line, column) = self.pos();
            let op_token = self.lexer.peek().clone();
            // eat binop
            self.lexer.consume();

            if self.lexer.peek() == &Token::Indent {
                // eat optional indentation
                self.lexer.consume();
                self.lexer.skip_next_dedent();
            }

            let mut rhs = self.parse_unary()?;

            // if the operator binds less tightly with RHS than the
            // operator after RHS, let the pending operator take RHS
            let next_precedence = precedence(self.lexer.peek());
            // '::', '**', and '++' are right associative
            if matches!(
                op_token,
                Token::ColonColon | Token::StarStar | Token::PlusPlus
            ) {
                this_precedence -= 1;
            }
            if this_precedence < next_precedence {
                rhs = self.parse_binop(this_precedence + 1, rhs)?;
            }

            // method-style call sugar: lhs.f(a) becomes f(lhs, a)
            if op_token == Token::Dot {
                if let ExprKind::Call { args, .. } = &mut rhs.kind {
                    args.insert(0, lhs);
                    lhs = rhs;
                    continue;
                }
            }

            // infix '::' builds a Cons cell
            if op_token == Token::ColonColon {
                let type_var = self.new_type_var();
                lhs = Expr::new(
                    ExprKind::Constructor {
                        name: "Cons".to_string(),
                        args: vec![lhs, rhs],
                        heap_alloc: true,
                        type_env: TypeEnv::new(),
                    },
                    line,
                    column,
                    type_var,
                );
                continue;
            }

            let Some(op) = binop_from_token(&op_token) else {
                return self.error_at(
                    classes::INTERNAL_ERROR,
                    format!("token {} has a precedence but no operator", op_token.label()),
                    line,
                    column,
                );
            };
            if op == BinOp::Assign {
                lhs.set_as_lvalue();
            }
            lhs = self.make_binary(line, column, op, lhs, rhs);
        }
    }

    /// Build a binary node. Comparison results are pinned to bool here;
    /// operand unification is left to the type-analysis pass.
    pub(crate) fn make_binary(
        &mut self,
        line: usize,
        column: usize,
        op: BinOp,
        lhs: Expr,
        rhs: Expr,
    ) -> Expr {
        let type_var = self.new_type_var();
        if op.is_comparison() {
            let bool_type = self.state.types.bool_type;
            // unifying a fresh variable cannot fail
            let _ = self.state.types.unify(type_var, bool_type);
        }
        Expr::new(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                inherit_child_type: op.inherits_child_type(),
                is_lvalue: false,
                type_env: TypeEnv::new(),
            },
            line,
            column,
            type_var,
        )
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.lexer.peek() {
            Token::Str(_) => self.parse_string_expr(),
            Token::Bool(_) => self.parse_bool_expr(),
            Token::New | Token::TypeIdent(_) => self.parse_value_constructor_expr(),
            Token::Sizeof => self.parse_sizeof_expr(),
            Token::PtrOffset => self.parse_ptr_offset_expr(),
            Token::Ident(_) => self.parse_identifier_expr(),
            Token::EmptyBrackets => self.parse_empty_vec_expr(),
            Token::Float(_) => self.parse_float_expr(),
            Token::Int(_) => self.parse_int_expr(),
            Token::Unit => self.parse_unit_expr(),
            Token::LParen => self.parse_paren_expr(),
            Token::If => self.parse_if_expr(),
            Token::While => self.parse_while_loop(),
            Token::Match => self.parse_match_expr(),
            Token::LBracket => self.parse_list_constructor(),
            token => {
                let label = token.label();
                self.error_here(
                    classes::SYNTAX_ERROR,
                    format!("unknown token {} when expecting an expression", label),
                )
            }
        }
    }

    fn parse_float_expr(&mut self) -> Result<Expr, ParseError> {
        let (line, column) = self.pos();
        let Token::Float(value) = self.lexer.peek().clone() else {
            return self.error_here(classes::INTERNAL_ERROR, "expected float literal");
        };
        self.lexer.consume();
        let float_type = self.state.types.float_type;
        Ok(Expr::new(ExprKind::Float(value), line, column, float_type))
    }

    fn parse_int_expr(&mut self) -> Result<Expr, ParseError> {
        let (line, column) = self.pos();
        let Token::Int(value) = self.lexer.peek().clone() else {
            return self.error_here(classes::INTERNAL_ERROR, "expected integer literal");
        };
        self.lexer.consume();
        let int_type = self.state.types.int_type;
        Ok(Expr::new(ExprKind::Int(value), line, column, int_type))
    }

    fn parse_string_expr(&mut self) -> Result<Expr, ParseError> {
        let (line, column) = self.pos();
        let Token::Str(value) = self.lexer.peek().clone() else {
            return self.error_here(classes::INTERNAL_ERROR, "expected string literal");
        };
        self.lexer.consume();
        let string_type = self.state.types.string_type;
        Ok(Expr::new(ExprKind::Str(value), line, column, string_type))
    }

    fn parse_bool_expr(&mut self) -> Result<Expr, ParseError> {
        let (line, column) = self.pos();
        let Token::Bool(value) = self.lexer.peek().clone() else {
            return self.error_here(classes::INTERNAL_ERROR, "expected boolean literal");
        };
        self.lexer.consume();
        let bool_type = self.state.types.bool_type;
        Ok(Expr::new(ExprKind::Bool(value), line, column, bool_type))
    }

    fn parse_unit_expr(&mut self) -> Result<Expr, ParseError> {
        let (line, column) = self.pos();
        self.lexer.consume();
        let unit_type = self.state.types.unit_type;
        Ok(Expr::new(ExprKind::Unit, line, column, unit_type))
    }

    // '[]' is sugar for an empty vector: a call of `vec`
    fn parse_empty_vec_expr(&mut self) -> Result<Expr, ParseError> {
        let (line, column) = self.pos();
        self.lexer.consume();
        self.called_functions.push("vec".to_string());
        let type_var = self.new_type_var();
        Ok(Expr::new(
            ExprKind::Call {
                callee: "vec".to_string(),
                args: Vec::new(),
                type_env: TypeEnv::new(),
            },
            line,
            column,
            type_var,
        ))
    }

    // '(' expression ')' | '(' expression ',' ... ')' tuple sugar
    fn parse_paren_expr(&mut self) -> Result<Expr, ParseError> {
        let (line, column) = self.pos();
        // eat '('
        self.lexer.consume();
        let expr = self.parse_expression()?;

        if self.lexer.peek() == &Token::Comma {
            // this is a tuple
            let mut tuple_args = vec![expr];
            while self.lexer.peek() == &Token::Comma {
                // eat ','
                self.lexer.consume();
                tuple_args.push(self.parse_expression()?);
            }
            if self.lexer.peek() != &Token::RParen {
                return self.error_at(classes::SYNTAX_ERROR, "expected matching ')'", line, column);
            }
            // eat ')'
            self.lexer.consume();
            let name = if tuple_args.len() > 2 {
                format!("Tuple{}", tuple_args.len())
            } else {
                "Pair".to_string()
            };
            let type_var = self.new_type_var();
            return Ok(Expr::new(
                ExprKind::Constructor {
                    name,
                    args: tuple_args,
                    heap_alloc: false,
                    type_env: TypeEnv::new(),
                },
                line,
                column,
                type_var,
            ));
        }

        if self.lexer.peek() != &Token::RParen {
            return self.error_at(classes::SYNTAX_ERROR, "expected matching ')'", line, column);
        }
        // eat ')'
        self.lexer.consume();
        Ok(expr)
    }

    // object constructor, e.g. Some(5) or new Cons(x, rest)
    fn parse_value_constructor_expr(&mut self) -> Result<Expr, ParseError> {
        let heap_alloc = if self.lexer.peek() == &Token::New {
            // eat 'new'
            self.lexer.consume();
            true
        } else {
            false
        };

        let (line, column) = self.pos();
        let name = match self.lexer.peek() {
            Token::TypeIdent(name) => name.clone(),
            _ => {
                return self.error_here(
                    classes::SYNTAX_ERROR,
                    "expected type constructor (first letter must be capitalized)",
                )
            }
        };
        // eat constructor name
        self.lexer.consume();

        let is_enum = self.lexer.peek() != &Token::LParen && self.lexer.peek() != &Token::Unit;
        let expecting_args = !is_enum && self.lexer.peek() != &Token::Unit;
        if !is_enum {
            // eat '(' or '()'
            self.lexer.consume();
        }

        let mut args = Vec::new();
        if expecting_args && self.lexer.peek() != &Token::RParen {
            // for allowing line breaks
            let mut indented = false;
            loop {
                args.push(self.parse_expression()?);
                if self.lexer.peek() == &Token::RParen {
                    break;
                }
                if self.lexer.peek() != &Token::Comma {
                    return self
                        .error_here(classes::SYNTAX_ERROR, "expected ')' or ',' in argument list");
                }
                // eat ','
                self.lexer.consume();
                if self.lexer.peek() == &Token::Indent {
                    if indented {
                        self.report_at(
                            classes::SYNTAX_ERROR,
                            "misaligned indentation",
                            self.lexer.line_number(),
                            self.lexer.column(),
                        )?;
                    }
                    indented = true;
                    self.lexer.consume();
                    self.lexer.skip_next_dedent();
                }
            }
        }
        if expecting_args {
            // eat ')'
            self.lexer.consume();
        }

        let type_var = self.new_type_var();
        Ok(Expr::new(
            ExprKind::Constructor {
                name,
                args,
                heap_alloc,
                type_env: TypeEnv::new(),
            },
            line,
            column,
            type_var,
        ))
    }

    // variable reference or function call
    fn parse_identifier_expr(&mut self) -> Result<Expr, ParseError> {
        let (line, column) = self.pos();
        let name = match self.lexer.peek() {
            Token::Ident(name) => name.clone(),
            _ => return self.error_here(classes::INTERNAL_ERROR, "expected identifier"),
        };
        // eat identifier
        self.lexer.consume();

        if self.lexer.peek() != &Token::LParen && self.lexer.peek() != &Token::Unit {
            // variable reference; repeated references share a type var
            let type_var = match self.vars_in_scope.get(&name) {
                Some(existing) => *existing,
                None => {
                    let fresh = self.new_type_var();
                    self.vars_in_scope.insert(name.clone(), fresh);
                    fresh
                }
            };
            return Ok(Expr::new(
                ExprKind::Variable(name),
                line,
                column,
                type_var,
            ));
        }

        // function call
        let expecting_args = self.lexer.peek() != &Token::Unit;
        // eat '(' or '()'
        self.lexer.consume();
        let mut args = Vec::new();
        if expecting_args && self.lexer.peek() != &Token::RParen {
            loop {
                args.push(self.parse_expression()?);
                if self.lexer.peek() == &Token::RParen {
                    break;
                }
                if self.lexer.peek() != &Token::Comma {
                    return self
                        .error_here(classes::SYNTAX_ERROR, "expected ')' or ',' in argument list");
                }
                // eat ','
                self.lexer.consume();
            }
        }
        if expecting_args {
            // eat ')'
            self.lexer.consume();
        }

        self.called_functions.push(name.clone());
        let type_var = self.new_type_var();
        Ok(Expr::new(
            ExprKind::Call {
                callee: name,
                args,
                type_env: TypeEnv::new(),
            },
            line,
            column,
            type_var,
        ))
    }

    fn parse_sizeof_expr(&mut self) -> Result<Expr, ParseError> {
        let (line, column) = self.pos();
        // eat 'sizeof'
        self.lexer.consume();
        self.expect(&Token::LParen, "expected '('")?;
        let arg = self.parse_expression()?;
        self.expect(&Token::RParen, "expected ')'")?;
        let type_var = self.new_type_var();
        Ok(Expr::new(
            ExprKind::Sizeof { arg: Box::new(arg) },
            line,
            column,
            type_var,
        ))
    }

    fn parse_ptr_offset_expr(&mut self) -> Result<Expr, ParseError> {
        let (line, column) = self.pos();
        // eat 'ptr_offset'
        self.lexer.consume();
        self.expect(&Token::LParen, "expected '('")?;
        let ptr = self.parse_expression()?;
        self.expect(&Token::Comma, "expected ')' or ',' in argument list")?;
        let offset = self.parse_expression()?;
        self.expect(&Token::RParen, "expected ')'")?;
        let type_var = self.new_type_var();
        Ok(Expr::new(
            ExprKind::PtrOffset {
                ptr: Box::new(ptr),
                offset: Box::new(offset),
                is_lvalue: false,
            },
            line,
            column,
            type_var,
        ))
    }

    // [e1, e2, ..., eN] becomes vecN(e1, ..., eN)
    fn parse_list_constructor(&mut self) -> Result<Expr, ParseError> {
        // eat '['
        self.lexer.consume();
        let (line, column) = self.pos();

        let mut args = vec![self.parse_expression()?];
        while self.lexer.peek() == &Token::Comma {
            // eat ','
            self.lexer.consume();
            args.push(self.parse_expression()?);
        }
        if self.lexer.peek() != &Token::RBracket {
            return self.error_at(
                classes::SYNTAX_ERROR,
                "expected ']' or ',' in list constructor",
                line,
                self.lexer.column(),
            );
        }
        // eat ']'
        self.lexer.consume();

        let callee = format!("vec{}", args.len());
        self.called_functions.push(callee.clone());
        let type_var = self.new_type_var();
        Ok(Expr::new(
            ExprKind::Call {
                callee,
                args,
                type_env: TypeEnv::new(),
            },
            line,
            column,
            type_var,
        ))
    }

    // Extend `node` with following expressions in the block, building a
    // sequencing chain, until the closing DEDENT (left unconsumed).
    pub(crate) fn parse_block_sequence(&mut self, mut node: Expr) -> Result<Expr, ParseError> {
        while self.lexer.peek() != &Token::Dedent {
            // eat optional ';'
            if self.lexer.peek() == &Token::Semicolon {
                self.lexer.consume();
                continue;
            }
            let (line, column) = self.pos();
            let next = self.parse_expression()?;
            node = self.make_binary(line, column, BinOp::Seq, node, next);
        }
        Ok(node)
    }

    /// `if` expression `then` expression `else` expression, or the
    /// indented multi-line form closed by `end`.
    fn parse_if_expr(&mut self) -> Result<Expr, ParseError> {
        let (line, column) = self.pos();
        // eat 'if'
        self.lexer.consume();

        let cond = self.parse_expression()?;

        // 'then' is optional, unless it's a single-line if expression
        let started_with_then = if self.lexer.peek() == &Token::Then {
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
        if !started_with_indent && !started_with_then {
            return self.error_at(
                classes::SYNTAX_ERROR,
                "expected 'then' after single-line if condition",
                line,
                column,
            );
        }

        let mut then_body = self.parse_expression()?;
        if started_with_indent {
            then_body = self.parse_block_sequence(then_body)?;
            // eat unindentation
            self.lexer.consume();
        }

        let mut else_body = None;
        if self.lexer.peek() == &Token::Else {
            // eat 'else'
            self.lexer.consume();
            if started_with_indent {
                self.expect(&Token::Indent, "expected newline with indent after 'else'")?;
            }
            let mut body = self.parse_expression()?;
            if started_with_indent {
                body = self.parse_block_sequence(body)?;
                // eat unindentation
                self.lexer.consume();
            }
            else_body = Some(Box::new(body));
        }

        if started_with_indent {
            if self.lexer.peek() != &Token::End {
                return self.error_at(
                    classes::SYNTAX_ERROR,
                    "expected 'end' after if expression",
                    line,
                    column,
                );
            }
            self.lexer.consume();
        } else if self.lexer.peek() == &Token::End {
            // eat optional 'end' in one-line if expression
            self.lexer.consume();
        }

        let type_var = self.new_type_var();
        Ok(Expr::new(
            ExprKind::If {
                cond: Box::new(cond),
                then_body: Box::new(then_body),
                else_body,
            },
            line,
            column,
            type_var,
        ))
    }

    fn parse_while_loop(&mut self) -> Result<Expr, ParseError> {
        let (line, column) = self.pos();
        // eat 'while'
        self.lexer.consume();

        let cond = self.parse_expression()?;

        // 'do' is optional, unless it's a single-line while loop
        let started_with_do = if self.lexer.peek() == &Token::Do {
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
        if !started_with_indent && !started_with_do {
            return self.error_at(
                classes::SYNTAX_ERROR,
                "expected 'do' after single-line while loop",
                line,
                column,
            );
        }

        let mut body = self.parse_expression()?;
        if started_with_indent {
            body = self.parse_block_sequence(body)?;
            // eat unindentation
            self.lexer.consume();
            if self.lexer.peek() != &Token::End {
                return self.error_at(
                    classes::SYNTAX_ERROR,
                    "expected 'end' after while expression",
                    line,
                    column,
                );
            }
            self.lexer.consume();
        } else if self.lexer.peek() == &Token::End {
            self.lexer.consume();
        }

        let type_var = self.new_type_var();
        Ok(Expr::new(
            ExprKind::While {
                cond: Box::new(cond),
                body: Box::new(body),
            },
            line,
            column,
            type_var,
        ))
    }

    fn parse_match_expr(&mut self) -> Result<Expr, ParseError> {
        let (line, column) = self.pos();
        // eat 'match'
        self.lexer.consume();

        let scrutinee = self.parse_expression()?;

        if self.lexer.peek() == &Token::Indent {
            self.lexer.consume();
        } else {
            return self.error_at(
                classes::SYNTAX_ERROR,
                "expected indent after match condition",
                line,
                column,
            );
        }

        let mut cases = Vec::new();
        let mut pattern = self.parse_expression()?;
        loop {
            let (case_line, case_column) = (pattern.line, pattern.column);
            if self.lexer.peek() != &Token::DoubleArrow {
                return self.error_at(
                    classes::SYNTAX_ERROR,
                    "expected '=>' after match case",
                    line,
                    column,
                );
            }
            // eat '=>'
            self.lexer.consume();

            let started_with_indent = if self.lexer.peek() == &Token::Indent {
                self.lexer.consume();
                true
            } else {
                false
            };

            let mut body = self.parse_expression()?;
            if started_with_indent {
                body = self.parse_block_sequence(body)?;
                // eat unindentation
                self.lexer.consume();
                if self.lexer.peek() != &Token::End {
                    return self.error_at(
                        classes::SYNTAX_ERROR,
                        "expected 'end' after match case block",
                        line,
                        column,
                    );
                }
                self.lexer.consume();
            }

            let type_var = self.new_type_var();
            cases.push(MatchCase {
                pattern,
                body,
                line: case_line,
                column: case_column,
                type_var,
            });

            // eat optional ';'
            if self.lexer.peek() == &Token::Semicolon {
                self.lexer.consume();
            }
            if self.lexer.peek() == &Token::Dedent {
                break;
            }
            pattern = self.parse_expression()?;
        }

        // eat unindentation
        self.lexer.consume();
        if self.lexer.peek() != &Token::End {
            return self.error_at(
                classes::SYNTAX_ERROR,
                "expected 'end' after match expression",
                line,
                column,
            );
        }
        self.lexer.consume();

        let type_var = self.new_type_var();
        Ok(Expr::new(
            ExprKind::Match {
                scrutinee: Box::new(scrutinee),
                cases,
            },
            line,
            column,
            type_var,
        ))
    }
}
