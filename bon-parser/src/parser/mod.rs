// Recursive-descent parser for Bon. Builds the AST, allocates type
// variables as it goes, and registers functions, typeclasses, user types,
// externs, and imports into the shared module state.

use crate::ParseError;
use bon_ast::TypeVarId;
use bon_diagnostics::{classes, DiagnosticEngine, Span};
use bon_lexer::{Lexer, Token};
use bon_types::{ModuleState, TypeError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

mod expressions;
mod items;

pub struct Parser<'a> {
    pub(crate) lexer: Lexer,
    pub(crate) state: &'a mut ModuleState,
    pub(crate) diags: &'a mut DiagnosticEngine,
    pub(crate) file: String,
    pub(crate) stdlib_path: Option<PathBuf>,
    // variable name -> shared type variable, within the current function
    pub(crate) vars_in_scope: HashMap<String, TypeVarId>,
    // calls made from the function being parsed, for dependency ordering
    pub(crate) called_functions: Vec<String>,
}

impl<'a> Parser<'a> {
    pub fn new(
        source: &str,
        file: &str,
        state: &'a mut ModuleState,
        diags: &'a mut DiagnosticEngine,
        stdlib_path: Option<PathBuf>,
    ) -> Result<Self, ParseError> {
        let lexer = Lexer::new(source, file, diags)?;
        Ok(Self {
            lexer,
            state,
            diags,
            file: file.to_string(),
            stdlib_path,
            vars_in_scope: HashMap::new(),
            called_functions: Vec::new(),
        })
    }

    /// Parse the whole stream into the module state. Syntax errors are
    /// reported and skipped past; only a crossed error ceiling stops the
    /// parse early.
    pub fn parse(&mut self) -> Result<(), ParseError> {
        // prime first token
        self.lexer.consume();

        loop {
            let before = self.lexer.position();
            let result = match self.lexer.peek() {
                Token::Eof => return Ok(()),
                Token::Semicolon => {
                    // eat optional semicolons
                    self.lexer.consume();
                    Ok(())
                }
                Token::Def => self.parse_definition().map(|func| {
                    self.state.register_function(func);
                }),
                Token::Class => self.parse_typeclass().map(|tclass| {
                    self.state.register_typeclass(tclass);
                }),
                Token::Impl => match self.parse_typeclass_impl() {
                    Ok(imp) => {
                        let line = imp.line;
                        let column = imp.column;
                        let class_name = imp.class_name.clone();
                        if self.state.register_impl(imp) {
                            Ok(())
                        } else {
                            self.report_at(
                                classes::UNBOUND_NAME,
                                format!("impl of unknown typeclass {}", class_name),
                                line,
                                column,
                            )
                        }
                    }
                    Err(e) => Err(e),
                },
                Token::Type => self.parse_type_decl().map(|decl| {
                    self.state.type_decls.insert(decl.name.clone(), decl);
                }),
                Token::Cdef => self.parse_extern().map(|proto| {
                    self.state.register_extern(proto);
                }),
                Token::Import => self.parse_import(),
                _ => self.parse_toplevel_expr().map(|func| {
                    self.state.toplevel_expressions.push(func);
                }),
            };

            match result {
                Ok(()) => {}
                Err(ParseError::Halted(halt)) => return Err(ParseError::Halted(halt)),
                Err(ParseError::Syntax) => {
                    // surface further errors: make progress, then sync to
                    // the next top-level item
                    if self.lexer.position() == before {
                        self.lexer.consume();
                    }
                    self.sync_to_toplevel();
                }
            }
        }
    }

    fn sync_to_toplevel(&mut self) {
        loop {
            match self.lexer.peek() {
                Token::Eof
                | Token::Def
                | Token::Class
                | Token::Impl
                | Token::Type
                | Token::Cdef
                | Token::Import
                | Token::Semicolon => return,
                _ => {
                    self.lexer.consume();
                }
            }
        }
    }

    // ==================== Imports ====================

    /// `import <name>` parses `<name>.bon` into the current module state
    /// (searching the current directory, then the stdlib path) and then
    /// continues with the original stream. The module-name set makes
    /// circular imports terminate.
    pub(crate) fn parse_import(&mut self) -> Result<(), ParseError> {
        let line = self.lexer.line_number();
        let column = self.lexer.column();
        // eat 'import'
        self.lexer.consume();

        let module = match self.lexer.peek() {
            Token::Ident(name) => name.clone(),
            _ => {
                return self.error_here(classes::SYNTAX_ERROR, "expected file name after 'import'")
            }
        };
        // eat module name
        self.lexer.consume();

        if !self.state.imported_modules.insert(module.clone()) {
            return Ok(());
        }

        let filename = format!("{}.bon", module);
        let path = if Path::new(&filename).exists() {
            PathBuf::from(&filename)
        } else {
            match self
                .stdlib_path
                .as_ref()
                .map(|dir| dir.join(&filename))
                .filter(|p| p.exists())
            {
                Some(path) => path,
                None => {
                    return self.error_at(
                        classes::SYNTAX_ERROR,
                        format!("'import' file not found: {}", filename),
                        line,
                        column,
                    )
                }
            }
        };

        let source = match std::fs::read_to_string(&path) {
            Ok(source) => source,
            Err(err) => {
                return self.error_at(
                    classes::SYNTAX_ERROR,
                    format!("could not read {}: {}", path.display(), err),
                    line,
                    column,
                )
            }
        };

        log::debug!("importing module {} from {}", module, path.display());
        let display = path.display().to_string();
        let previous_file = std::mem::replace(&mut self.state.filename, display.clone());
        let result = {
            let mut nested = Parser::new(
                &source,
                &display,
                &mut *self.state,
                &mut *self.diags,
                self.stdlib_path.clone(),
            )?;
            nested.parse()
        };
        self.state.filename = previous_file;
        // local parse errors in the imported module were already
        // reported; only a ceiling stops us
        match result {
            Err(ParseError::Halted(halt)) => Err(ParseError::Halted(halt)),
            _ => Ok(()),
        }
    }

    // ==================== Helpers ====================

    pub(crate) fn new_type_var(&mut self) -> TypeVarId {
        self.state.types.new_var()
    }

    pub(crate) fn pos(&self) -> (usize, usize) {
        (self.lexer.line_number(), self.lexer.column())
    }

    /// Report an error at an explicit position without failing the
    /// current production (resilient paths).
    pub(crate) fn report_at(
        &mut self,
        class: &str,
        message: impl Into<String>,
        line: usize,
        column: usize,
    ) -> Result<(), ParseError> {
        self.diags
            .error(class, message, Span::new(&self.file, line, column))?;
        Ok(())
    }

    /// Report an error at an explicit position and fail the production.
    pub(crate) fn error_at<T>(
        &mut self,
        class: &str,
        message: impl Into<String>,
        line: usize,
        column: usize,
    ) -> Result<T, ParseError> {
        self.report_at(class, message, line, column)?;
        Err(ParseError::Syntax)
    }

    /// Report an error at the current token and fail the production.
    pub(crate) fn error_here<T>(
        &mut self,
        class: &str,
        message: impl Into<String>,
    ) -> Result<T, ParseError> {
        let (line, column) = self.pos();
        self.error_at(class, message, line, column)
    }

    pub(crate) fn report_type_error(
        &mut self,
        err: &TypeError,
        line: usize,
        column: usize,
    ) -> Result<(), ParseError> {
        let class = match err {
            TypeError::Mismatch { .. } | TypeError::Shape => classes::TYPE_MISMATCH,
            TypeError::UnknownConstructor(_) | TypeError::UnknownField(_) => classes::UNBOUND_NAME,
            _ => classes::TYPE_ERROR,
        };
        self.diags
            .error(class, err.to_string(), Span::new(&self.file, line, column))?;
        Ok(())
    }

    /// Expect and consume a token, or report `message`.
    pub(crate) fn expect(&mut self, token: &Token, message: &str) -> Result<(), ParseError> {
        if self.lexer.peek() == token {
            self.lexer.consume();
            Ok(())
        } else {
            self.error_here(classes::SYNTAX_ERROR, message)
        }
    }
}
