// Compile driver: parse (prelude, then the user file), run scope
// analysis and type analysis, and build the code-gen plan. Code-gen is
// skipped whenever any errors were recorded; warnings never block it.

pub mod codegen;
pub mod scope_analysis;
pub mod type_analysis;

pub use bon_diagnostics as diagnostics;
pub use codegen::{CodegenPlan, ExternDecl, MonoFunction};

use bon_diagnostics::DiagnosticEngine;
use bon_parser::{ParseError, Parser};
use bon_types::ModuleState;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub verbose: bool,
    pub dump_ir: bool,
    pub opt_level: u8,
    pub stdlib_path: Option<PathBuf>,
    pub max_errors: u32,
    pub max_warnings: u32,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            dump_ir: false,
            opt_level: 2,
            stdlib_path: None,
            max_errors: DiagnosticEngine::DEFAULT_MAX_ERRORS,
            max_warnings: DiagnosticEngine::DEFAULT_MAX_WARNINGS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Halted(#[from] bon_diagnostics::Halt),
    #[error("compilation failed with {errors} error(s) and {warnings} warning(s)")]
    HadErrors { errors: u32, warnings: u32 },
}

pub struct Compiler {
    pub options: CompileOptions,
    pub state: ModuleState,
    pub diags: DiagnosticEngine,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        let mut diags = DiagnosticEngine::new();
        diags.config(options.max_errors, options.max_warnings);
        Self {
            options,
            state: ModuleState::new(),
            diags,
        }
    }

    /// Parse `source` into the module state. Local syntax errors are
    /// reported and collected; they fail the compile at the analysis
    /// gate rather than here.
    pub fn parse_source(&mut self, source: &str, filename: &str) -> Result<(), CompileError> {
        self.state.filename = filename.to_string();
        let mut parser = Parser::new(
            source,
            filename,
            &mut self.state,
            &mut self.diags,
            self.options.stdlib_path.clone(),
        )
        .map_err(Self::lift_parse_error)?;
        match parser.parse() {
            Ok(()) | Err(ParseError::Syntax) => Ok(()),
            Err(ParseError::Halted(halt)) => Err(CompileError::Halted(halt)),
        }
    }

    pub fn parse_file(&mut self, path: &Path) -> Result<(), CompileError> {
        let source = std::fs::read_to_string(path)?;
        self.parse_source(&source, &path.display().to_string())
    }

    /// Parse `prelude.bon` from the stdlib directory, if configured.
    pub fn load_prelude(&mut self) -> Result<(), CompileError> {
        let Some(prelude) = self
            .options
            .stdlib_path
            .as_ref()
            .map(|dir| dir.join("prelude.bon"))
            .filter(|path| path.exists())
        else {
            return Ok(());
        };
        log::debug!("loading prelude from {}", prelude.display());
        self.parse_file(&prelude)
    }

    /// Scope analysis then type analysis, with an error gate after each.
    pub fn analyze(&mut self) -> Result<(), CompileError> {
        scope_analysis::run(&mut self.state);
        self.gate()?;
        type_analysis::run(&mut self.state, &mut self.diags)?;
        self.gate()
    }

    /// Build the code-gen plan; refused when errors were recorded.
    pub fn build_plan(&mut self) -> Result<CodegenPlan, CompileError> {
        self.gate()?;
        Ok(CodegenPlan::build(&mut self.state))
    }

    pub fn compile_file(&mut self, path: &Path) -> Result<CodegenPlan, CompileError> {
        self.parse_file(path)?;
        self.analyze()?;
        self.build_plan()
    }

    pub fn compile_source(
        &mut self,
        source: &str,
        filename: &str,
    ) -> Result<CodegenPlan, CompileError> {
        self.parse_source(source, filename)?;
        self.analyze()?;
        self.build_plan()
    }

    fn gate(&self) -> Result<(), CompileError> {
        if self.diags.had_errors() {
            Err(CompileError::HadErrors {
                errors: self.diags.error_count(),
                warnings: self.diags.warning_count(),
            })
        } else {
            Ok(())
        }
    }

    fn lift_parse_error(err: ParseError) -> CompileError {
        match err {
            ParseError::Halted(halt) => CompileError::Halted(halt),
            ParseError::Syntax => CompileError::HadErrors {
                errors: 1,
                warnings: 0,
            },
        }
    }
}
