//! Abstract Syntax Tree definitions for Rx

use crate::lexer::Span;
use std::fmt;

/// Identity of a scope-introducing node, assigned by the parser in source order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A complete Rx source file
#[derive(Debug, Clone)]
pub struct Crate {
    pub items: Vec<Item>,
}

/// Top-level (or block-level) declarations
#[derive(Debug, Clone)]
pub enum Item {
    Function(Function),
    Struct(StructDef),
    Enum(EnumDef),
    Const(ConstItem),
    Trait(TraitDef),
    Impl(Implementation),
}

/// `[const] fn name(params) [-> Type] { body }`
///
/// `body` is `None` for signatures inside a trait.
#[derive(Debug, Clone)]
pub struct Function {
    pub id: NodeId,
    pub is_const: bool,
    pub name: String,
    pub params: FunctionParameters,
    pub return_type: Option<TypeExpr>,
    pub body: Option<BlockExpr>,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct FunctionParameters {
    pub self_param: Option<SelfParam>,
    pub params: Vec<FunctionParam>,
}

/// The receiver of a method
#[derive(Debug, Clone)]
pub enum SelfParam {
    /// `self`, `mut self`, `&self`, `&mut self`
    Shorthand { is_ref: bool, is_mut: bool, span: Span },
    /// `self: T`, `mut self: T`
    Typed { is_mut: bool, ty: TypeExpr, span: Span },
}

#[derive(Debug, Clone)]
pub struct FunctionParam {
    pub pattern: Pattern,
    pub ty: TypeExpr,
    pub span: Span,
}

/// Binding patterns
#[derive(Debug, Clone)]
pub enum Pattern {
    /// `[ref] [mut] name`
    Identifier {
        name: String,
        is_ref: bool,
        is_mut: bool,
        span: Span,
    },
    /// `&[mut] pattern`
    Reference {
        is_mut: bool,
        inner: Box<Pattern>,
        span: Span,
    },
}

impl Pattern {
    pub fn span(&self) -> Span {
        match self {
            Pattern::Identifier { span, .. } | Pattern::Reference { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StructField {
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}

/// `struct Name { field: Type, ... }` or `struct Name;`
#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<StructField>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: String,
    pub variants: Vec<String>,
    pub span: Span,
}

/// `const NAME: Type [= value];`
#[derive(Debug, Clone)]
pub struct ConstItem {
    pub name: String,
    pub ty: TypeExpr,
    pub value: Option<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct TraitDef {
    pub id: NodeId,
    pub name: String,
    pub items: Vec<AssociatedItem>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Implementation {
    /// `impl Type { ... }`
    Inherent(InherentImpl),
    /// `impl Trait for Type { ... }`
    Trait(TraitImpl),
}

#[derive(Debug, Clone)]
pub struct InherentImpl {
    pub id: NodeId,
    pub self_ty: String,
    pub items: Vec<AssociatedItem>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct TraitImpl {
    pub id: NodeId,
    pub trait_name: String,
    pub self_ty: String,
    pub items: Vec<AssociatedItem>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum AssociatedItem {
    Const(ConstItem),
    Function(Function),
}

/// Type annotations as written in source
#[derive(Debug, Clone)]
pub enum TypeExpr {
    /// `i32`, `bool`, `Point`, ...
    Path { name: String, span: Span },
    SelfType { span: Span },
    Reference {
        mutable: bool,
        inner: Box<TypeExpr>,
        span: Span,
    },
    /// `[T; N]`
    Array {
        elem: Box<TypeExpr>,
        len: Box<Expression>,
        span: Span,
    },
    Unit { span: Span },
    Never { span: Span },
}

impl TypeExpr {
    pub fn span(&self) -> Span {
        match self {
            TypeExpr::Path { span, .. } => *span,
            TypeExpr::SelfType { span } => *span,
            TypeExpr::Reference { span, .. } => *span,
            TypeExpr::Array { span, .. } => *span,
            TypeExpr::Unit { span } => *span,
            TypeExpr::Never { span } => *span,
        }
    }
}

/// `{ statements; tail }`
#[derive(Debug, Clone)]
pub struct BlockExpr {
    pub id: NodeId,
    pub statements: Vec<Statement>,
    pub tail: Option<Box<Expression>>,
    pub span: Span,
}

/// Statement types
#[derive(Debug, Clone)]
pub enum Statement {
    /// `let pattern [: Type] [= init];`
    Let {
        pattern: Pattern,
        ty: Option<TypeExpr>,
        init: Option<Expression>,
        span: Span,
    },

    /// Expression statement; block-like expressions may omit the semicolon
    Expr {
        expr: Expression,
        has_semi: bool,
        span: Span,
    },

    Item(Box<Item>),

    /// A lone `;`
    Empty { span: Span },
}

/// One segment of a path expression
#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    Ident(String),
    SelfValue,
    SelfType,
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Ident(name) => write!(f, "{}", name),
            PathSegment::SelfValue => write!(f, "self"),
            PathSegment::SelfType => write!(f, "Self"),
        }
    }
}

/// `a` or `A::b`
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    pub first: PathSegment,
    pub second: Option<PathSegment>,
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.second {
            Some(second) => write!(f, "{}::{}", self.first, second),
            None => write!(f, "{}", self.first),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ArrayElements {
    /// `[a, b, c]`
    List(Vec<Expression>),
    /// `[value; len]`
    Repeat {
        value: Box<Expression>,
        len: Box<Expression>,
    },
}

#[derive(Debug, Clone)]
pub struct FieldInit {
    pub name: String,
    pub value: Expression,
    pub span: Span,
}

/// Expression types
#[derive(Debug, Clone)]
pub enum Expression {
    Int {
        value: i64,
        suffix: Option<String>,
        span: Span,
    },
    Bool { value: bool, span: Span },
    Char { value: char, span: Span },
    Str { value: String, span: Span },
    /// `()`
    Unit { span: Span },

    Path { path: PathExpr, span: Span },

    /// `object.field`
    Field {
        object: Box<Expression>,
        field: String,
        span: Span,
    },

    /// `callee(args)`
    Call {
        callee: Box<Expression>,
        args: Vec<Expression>,
        span: Span,
    },

    /// `receiver.method(args)`
    MethodCall {
        receiver: Box<Expression>,
        method: String,
        args: Vec<Expression>,
        span: Span,
    },

    /// `object[index]`
    Index {
        object: Box<Expression>,
        index: Box<Expression>,
        span: Span,
    },

    /// `Name { field: value, ... }`
    StructLit {
        path: PathExpr,
        fields: Vec<FieldInit>,
        span: Span,
    },

    Array { elements: ArrayElements, span: Span },

    Binary {
        left: Box<Expression>,
        operator: BinaryOp,
        right: Box<Expression>,
        span: Span,
    },

    Unary {
        operator: UnaryOp,
        operand: Box<Expression>,
        span: Span,
    },

    /// `&expr`, `&mut expr`, `&&expr`
    Borrow {
        mutable: bool,
        double: bool,
        value: Box<Expression>,
        span: Span,
    },

    /// `*expr`
    Deref { value: Box<Expression>, span: Span },

    Assign {
        target: Box<Expression>,
        value: Box<Expression>,
        span: Span,
    },

    /// `target op= value`
    CompoundAssign {
        target: Box<Expression>,
        operator: BinaryOp,
        value: Box<Expression>,
        span: Span,
    },

    /// `expr as Type`
    Cast {
        value: Box<Expression>,
        ty: TypeExpr,
        span: Span,
    },

    Grouped { inner: Box<Expression>, span: Span },

    Block(BlockExpr),

    If {
        condition: Box<Expression>,
        then_block: BlockExpr,
        /// Either another `If` or a `Block`
        else_branch: Option<Box<Expression>>,
        span: Span,
    },

    Loop { id: NodeId, body: BlockExpr, span: Span },

    While {
        id: NodeId,
        condition: Box<Expression>,
        body: BlockExpr,
        span: Span,
    },

    Break {
        value: Option<Box<Expression>>,
        span: Span,
    },

    Continue { span: Span },

    Return {
        value: Option<Box<Expression>>,
        span: Span,
    },
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::Less
                | BinaryOp::LessEqual
                | BinaryOp::Greater
                | BinaryOp::GreaterEqual
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        f.write_str(s)
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Negate => f.write_str("-"),
            UnaryOp::Not => f.write_str("!"),
        }
    }
}

impl Expression {
    /// Get the span of this expression
    pub fn span(&self) -> Span {
        match self {
            Expression::Int { span, .. } => *span,
            Expression::Bool { span, .. } => *span,
            Expression::Char { span, .. } => *span,
            Expression::Str { span, .. } => *span,
            Expression::Unit { span } => *span,
            Expression::Path { span, .. } => *span,
            Expression::Field { span, .. } => *span,
            Expression::Call { span, .. } => *span,
            Expression::MethodCall { span, .. } => *span,
            Expression::Index { span, .. } => *span,
            Expression::StructLit { span, .. } => *span,
            Expression::Array { span, .. } => *span,
            Expression::Binary { span, .. } => *span,
            Expression::Unary { span, .. } => *span,
            Expression::Borrow { span, .. } => *span,
            Expression::Deref { span, .. } => *span,
            Expression::Assign { span, .. } => *span,
            Expression::CompoundAssign { span, .. } => *span,
            Expression::Cast { span, .. } => *span,
            Expression::Grouped { span, .. } => *span,
            Expression::Block(block) => block.span,
            Expression::If { span, .. } => *span,
            Expression::Loop { span, .. } => *span,
            Expression::While { span, .. } => *span,
            Expression::Break { span, .. } => *span,
            Expression::Continue { span } => *span,
            Expression::Return { span, .. } => *span,
        }
    }

    /// Expressions that end a statement without a trailing `;`
    pub fn is_block_like(&self) -> bool {
        matches!(
            self,
            Expression::Block(_)
                | Expression::If { .. }
                | Expression::Loop { .. }
                | Expression::While { .. }
        )
    }

    /// Whether this expression is a call to the free function `name`.
    pub fn is_call_to(&self, name: &str) -> bool {
        match self {
            Expression::Call { callee, .. } => matches!(
                callee.as_ref(),
                Expression::Path {
                    path: PathExpr {
                        first: PathSegment::Ident(n),
                        second: None,
                    },
                    ..
                } if n == name
            ),
            _ => false,
        }
    }
}

impl Statement {
    pub fn span(&self) -> Span {
        match self {
            Statement::Let { span, .. } => *span,
            Statement::Expr { span, .. } => *span,
            Statement::Item(item) => item.span(),
            Statement::Empty { span } => *span,
        }
    }
}

impl Item {
    pub fn span(&self) -> Span {
        match self {
            Item::Function(f) => f.span,
            Item::Struct(s) => s.span,
            Item::Enum(e) => e.span,
            Item::Const(c) => c.span,
            Item::Trait(t) => t.span,
            Item::Impl(Implementation::Inherent(i)) => i.span,
            Item::Impl(Implementation::Trait(t)) => t.span,
        }
    }
}
