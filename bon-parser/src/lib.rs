mod parser;

pub use parser::Parser;

/// Parser failure modes. Local syntax errors have already been reported
/// to the diagnostic engine when this is returned; `Halted` means an
/// error or warning ceiling was crossed and the compile must stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("syntax error")]
    Syntax,
    #[error(transparent)]
    Halted(#[from] bon_diagnostics::Halt),
}
