use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Index of a type variable in the type arena. The arena itself lives in
/// `bon-types`; the AST only carries ids so that nodes stay plain data.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TypeVarId(pub u32);

/// Typing environment: map from type-variable name to type variable.
/// Ordered so that iteration (and therefore generated names and tags) is
/// deterministic.
pub type TypeEnv = BTreeMap<String, TypeVarId>;

/// Binary operators, in source form. `::` never appears here: the parser
/// desugars cons into a `Cons` constructor invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Assign,
    Or,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Eq,
    NotEq,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Concat,
    Dot,
    /// Expression sequencing (';' or line breaks within a block)
    Seq,
}

impl BinOp {
    /// Quoted token label. Operator functions are registered under
    /// "operator" + label, e.g. `operator'+'`.
    pub fn label(&self) -> &'static str {
        match self {
            BinOp::Assign => "'='",
            BinOp::Or => "'or'",
            BinOp::And => "'and'",
            BinOp::BitOr => "'|'",
            BinOp::BitXor => "'^'",
            BinOp::BitAnd => "'&'",
            BinOp::Lt => "'<'",
            BinOp::Gt => "'>'",
            BinOp::LtEq => "'<='",
            BinOp::GtEq => "'>='",
            BinOp::Eq => "'=='",
            BinOp::NotEq => "'!='",
            BinOp::Shl => "'<<'",
            BinOp::Shr => "'>>'",
            BinOp::Add => "'+'",
            BinOp::Sub => "'-'",
            BinOp::Mul => "'*'",
            BinOp::Div => "'/'",
            BinOp::Rem => "'%'",
            BinOp::Pow => "'**'",
            BinOp::Concat => "'++'",
            BinOp::Dot => "'.'",
            BinOp::Seq => "';'",
        }
    }

    /// Name under which a user-defined implementation of this operator is
    /// registered and looked up.
    pub fn function_name(&self) -> String {
        format!("operator{}", self.label())
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Lt | BinOp::Gt | BinOp::LtEq | BinOp::GtEq | BinOp::Eq | BinOp::NotEq
        )
    }

    /// Whether the node's own type is inherited from its RHS child during
    /// type analysis.
    pub fn inherits_child_type(&self) -> bool {
        matches!(
            self,
            BinOp::Add
                | BinOp::Sub
                | BinOp::Mul
                | BinOp::Div
                | BinOp::Assign
                | BinOp::Dot
                | BinOp::Concat
        )
    }

    /// Operators that may dispatch to a typeclass method capture the
    /// ambient type environment at their use site.
    pub fn captures_env(&self) -> bool {
        !matches!(
            self,
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Assign | BinOp::Seq | BinOp::Dot
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Pos,
    Star,
}

impl UnOp {
    pub fn label(&self) -> &'static str {
        match self {
            UnOp::Neg => "'-'",
            UnOp::Pos => "'+'",
            UnOp::Star => "'*'",
        }
    }

    pub fn function_name(&self) -> String {
        format!("unary{}", self.label())
    }
}

/// An expression. Every node carries its source position, the type
/// variable holding its inferred type, and the `ends_scope` hint
/// populated by scope analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: usize,
    pub column: usize,
    pub type_var: TypeVarId,
    pub ends_scope: bool,
}

impl Expr {
    pub fn new(kind: ExprKind, line: usize, column: usize, type_var: TypeVarId) -> Self {
        Self {
            kind,
            line,
            column,
            type_var,
            ends_scope: false,
        }
    }

    /// The final expression of a sequence; for anything that is not a
    /// sequencing binary this is the node itself.
    pub fn last_in_sequence(&self) -> &Expr {
        match &self.kind {
            ExprKind::Binary {
                op: BinOp::Seq,
                rhs,
                ..
            } => rhs.last_in_sequence(),
            _ => self,
        }
    }

    /// Mark an assignment target. Only binaries (field stores) and
    /// pointer offsets track the flag.
    pub fn set_as_lvalue(&mut self) {
        match &mut self.kind {
            ExprKind::Binary { is_lvalue, .. } => *is_lvalue = true,
            ExprKind::PtrOffset { is_lvalue, .. } => *is_lvalue = true,
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    Float(f64),
    Int(i64),
    Str(String),
    Bool(bool),
    Unit,
    /// A variable reference; repeated references to one name within a
    /// function body share a single type variable.
    Variable(String),
    /// Value constructor invocation, e.g. `Some(5)`. `heap_alloc` is set
    /// by the `new` keyword and list sugar.
    Constructor {
        name: String,
        args: Vec<Expr>,
        heap_alloc: bool,
        type_env: TypeEnv,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
        type_env: TypeEnv,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        inherit_child_type: bool,
        is_lvalue: bool,
        type_env: TypeEnv,
    },
    If {
        cond: Box<Expr>,
        then_body: Box<Expr>,
        else_body: Option<Box<Expr>>,
    },
    While {
        cond: Box<Expr>,
        body: Box<Expr>,
    },
    Match {
        scrutinee: Box<Expr>,
        cases: Vec<MatchCase>,
    },
    Call {
        callee: String,
        args: Vec<Expr>,
        type_env: TypeEnv,
    },
    Sizeof {
        arg: Box<Expr>,
    },
    PtrOffset {
        ptr: Box<Expr>,
        offset: Box<Expr>,
        is_lvalue: bool,
    },
}

/// One arm of a `match` expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCase {
    pub pattern: Expr,
    pub body: Expr,
    pub line: usize,
    pub column: usize,
    pub type_var: TypeVarId,
}

/// A function's name, argument names, per-argument ownership flags, and
/// type variables. Also used standalone for `cdef` extern declarations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prototype {
    pub name: String,
    pub args: Vec<String>,
    /// whether args[i] transfers ownership to the function
    pub arg_owned: Vec<bool>,
    pub type_var: TypeVarId,
    pub ret_type: TypeVarId,
    pub line: usize,
    pub column: usize,
}

/// A function definition: prototype, body expression, the per-parameter
/// type variables shared with the body, and the list of callees recorded
/// for dependency ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub proto: Prototype,
    pub body: Expr,
    pub params: Vec<TypeVarId>,
    pub dependencies: Vec<String>,
    pub type_env: TypeEnv,
    /// typeclass this function implements a method of, if any
    pub typeclass: Option<String>,
    pub line: usize,
    pub column: usize,
}

impl Function {
    pub fn type_var(&self) -> TypeVarId {
        self.proto.type_var
    }
}

/// A `type` declaration: a variant with named constructors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDecl {
    pub name: String,
    pub type_params: Vec<String>,
    /// constructor name -> tuple of field types (None for nullary)
    pub constructors: BTreeMap<String, Option<TypeVarId>>,
    pub type_var: TypeVarId,
    pub line: usize,
    pub column: usize,
}

/// A typeclass declaration: `class Show<T>` with method prototypes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Typeclass {
    pub name: String,
    pub params: Vec<String>,
    pub param_types: TypeEnv,
    /// method name -> method type variable
    pub methods: BTreeMap<String, TypeVarId>,
    pub impls: Vec<TypeclassImpl>,
    pub line: usize,
    pub column: usize,
}

/// A typeclass implementation for concrete parameter types. Impls are
/// prepended on registration so a later impl overrides an earlier one;
/// `id` stays stable across reordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeclassImpl {
    pub id: usize,
    pub class_name: String,
    pub params: Vec<String>,
    pub param_types: TypeEnv,
    pub methods: BTreeMap<String, Function>,
    pub line: usize,
    pub column: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(kind: ExprKind) -> Expr {
        Expr::new(kind, 0, 0, TypeVarId(0))
    }

    #[test]
    fn test_last_in_sequence_descends_rhs() {
        let seq = Expr::new(
            ExprKind::Binary {
                op: BinOp::Seq,
                lhs: Box::new(leaf(ExprKind::Int(1))),
                rhs: Box::new(Expr::new(
                    ExprKind::Binary {
                        op: BinOp::Seq,
                        lhs: Box::new(leaf(ExprKind::Int(2))),
                        rhs: Box::new(leaf(ExprKind::Int(3))),
                        inherit_child_type: false,
                        is_lvalue: false,
                        type_env: TypeEnv::new(),
                    },
                    0,
                    0,
                    TypeVarId(2),
                )),
                inherit_child_type: false,
                is_lvalue: false,
                type_env: TypeEnv::new(),
            },
            0,
            0,
            TypeVarId(1),
        );
        assert!(matches!(seq.last_in_sequence().kind, ExprKind::Int(3)));
    }

    #[test]
    fn test_operator_function_names() {
        assert_eq!(BinOp::Add.function_name(), "operator'+'");
        assert_eq!(UnOp::Neg.function_name(), "unary'-'");
    }

    #[test]
    fn test_binop_classification() {
        assert!(BinOp::Eq.is_comparison());
        assert!(BinOp::NotEq.is_comparison());
        assert!(!BinOp::Add.is_comparison());
        assert!(BinOp::Add.inherits_child_type());
        assert!(!BinOp::Seq.inherits_child_type());
        assert!(BinOp::Pow.captures_env());
        assert!(!BinOp::Assign.captures_env());
    }

    #[test]
    fn test_ast_round_trips_through_json() {
        let expr = leaf(ExprKind::Str("hello".into()));
        let json = serde_json::to_string(&expr).unwrap();
        let back: Expr = serde_json::from_str(&json).unwrap();
        assert!(matches!(back.kind, ExprKind::Str(s) if s == "hello"));
    }
}
