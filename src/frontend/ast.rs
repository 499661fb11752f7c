//! Abstract syntax tree produced by the parser. Every node kind is a closed
//! enum or struct, so the analyzer and the IR lowering have to match
//! exhaustively over them.

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub line: usize,
    pub name: Identifier,
    pub body: Body,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub consts: Vec<ConstDecl>,
    pub types: Vec<TypeDecl>,
    pub vars: Vec<VarDecl>,
    pub functions: Vec<FunctionDecl>,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub line: usize,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstDecl {
    pub name: Identifier,
    pub value: Literal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub line: usize,
    pub kind: LiteralKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralKind {
    Integer(i64),
    Real(f64),
    String(String),
}

impl core::fmt::Display for LiteralKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LiteralKind::Integer(value) => write!(f, "{value}"),
            LiteralKind::Real(value) => write!(f, "{value:?}"),
            LiteralKind::String(value) => write!(f, "\"{value}\""),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub name: Identifier,
    pub ty: TypeExpr,
}

/// `a, b, c: integer`, used for variables and record fields
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub names: Vec<Identifier>,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub line: usize,
    pub name: Identifier,
    pub parameters: Vec<Param>,
    pub return_type: TypeExpr,
    pub locals: Vec<VarDecl>,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub names: Vec<Identifier>,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub line: usize,
    pub kind: TypeExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExprKind {
    /// `integer`, `real` or the name of a declared type
    Simple(Identifier),
    Array {
        size: u64,
        element: Box<TypeExpr>,
    },
    Record(Vec<VarDecl>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub line: usize,
    pub kind: StatementKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Assign {
        target: LValue,
        value: Expression,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
    },
    If {
        condition: Expression,
        positive: Vec<Statement>,
        negative: Option<Vec<Statement>>,
    },
    /// The operand may be a string literal
    Write(Expression),
    Read(Identifier),
    Block(Vec<Statement>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LValue {
    pub line: usize,
    pub kind: LValueKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LValueKind {
    Name(Identifier),
    ArrayAccess {
        array: Identifier,
        index: Box<Expression>,
    },
    FieldAccess {
        base: Box<LValue>,
        field: Identifier,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub line: usize,
    pub kind: ExpressionKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    Integer(i64),
    Real(f64),
    String(String),
    Identifier(Identifier),
    Arithmetic {
        operator: ArithmeticOperator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Comparison {
        operator: ComparisonOperator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    ArrayAccess {
        array: Identifier,
        index: Box<Expression>,
    },
    /// The base is either an identifier or an array access expression
    FieldAccess {
        base: Box<Expression>,
        field: Identifier,
    },
    Call {
        function: Identifier,
        arguments: Vec<Expression>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ArithmeticOperator {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ComparisonOperator {
    #[strum(serialize = "=")]
    Equal,
    #[strum(serialize = "<>")]
    NotEqual,
    #[strum(serialize = "<")]
    LessThan,
    #[strum(serialize = "<=")]
    LessThanOrEqualTo,
    #[strum(serialize = ">")]
    GreaterThan,
    #[strum(serialize = ">=")]
    GreaterThanOrEqualTo,
}
