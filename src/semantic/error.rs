//! Semantic error conditions

use thiserror::Error;

use super::types::Ty;
use crate::error::{ErrorKind, RxError, SourceLocation};
use crate::lexer::Span;

/// Every contract the analysis passes can reject.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SemanticError {
    // Name resolution
    #[error("Undefined Name: {0}")]
    UndefinedName(String),
    #[error("Undefined Variable: {0}")]
    UndefinedVariable(String),
    #[error("Undefined Function: {0}")]
    UndefinedFunction(String),
    #[error("Undefined Struct: {0}")]
    UndefinedStruct(String),
    #[error("Undefined Trait: {0}")]
    UndefinedTrait(String),
    #[error("no field `{field}` on type `{ty}`")]
    UnknownField { ty: String, field: String },
    #[error("no method `{method}` found for `{ty}`")]
    UnknownMethod { ty: String, method: String },
    #[error("no associated item `{item}` in `{owner}`")]
    UnknownAssociated { owner: String, item: String },

    // Arity and trait conformance
    #[error("`{name}` takes {expected} argument(s) but {found} were supplied")]
    ArgumentCount {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("struct `{name}` has {expected} field(s) but {found} were initialized")]
    StructFieldCount {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("field `{field}` of `{ty}` is initialized more than once")]
    DuplicateField { ty: String, field: String },
    #[error("missing field `{field}` in initializer of `{ty}`")]
    MissingField { ty: String, field: String },
    #[error("impl of `{trait_name}` for `{ty}` has {found} associated const(s), trait declares {expected}")]
    TraitConstCount {
        trait_name: String,
        ty: String,
        expected: usize,
        found: usize,
    },
    #[error("impl of `{trait_name}` is missing associated const `{name}`")]
    TraitConstMissing { trait_name: String, name: String },
    #[error("impl of `{trait_name}` for `{ty}` has {found} function(s), trait declares {expected}")]
    TraitFunctionCount {
        trait_name: String,
        ty: String,
        expected: usize,
        found: usize,
    },
    #[error("impl of `{trait_name}` is missing function `{name}`")]
    TraitFunctionMissing { trait_name: String, name: String },
    #[error("`{name}` receives `{found}` but trait `{trait_name}` declares `{expected}`")]
    TraitMethodKind {
        trait_name: String,
        name: String,
        expected: String,
        found: String,
    },
    #[error("`{name}` constness differs from its declaration in trait `{trait_name}`")]
    TraitConstness { trait_name: String, name: String },
    #[error("`{name}` returns `{found}` but trait `{trait_name}` declares `{expected}`")]
    TraitReturnType {
        trait_name: String,
        name: String,
        expected: Ty,
        found: Ty,
    },
    #[error("`{name}` has {found} parameter(s) but trait `{trait_name}` declares {expected}")]
    TraitParamCount {
        trait_name: String,
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("parameter {index} of `{name}` is `{found}` but trait `{trait_name}` declares `{expected}`")]
    TraitParamType {
        trait_name: String,
        name: String,
        index: usize,
        expected: Ty,
        found: Ty,
    },

    // Types
    #[error("mismatched types in {context}: expected `{expected}`, found `{found}`")]
    Mismatch {
        context: String,
        expected: Ty,
        found: Ty,
    },
    #[error("cannot apply `{op}` to `{left}` and `{right}`")]
    InvalidOperands { op: String, left: Ty, right: Ty },
    #[error("cannot apply unary `{op}` to `{ty}`")]
    InvalidUnary { op: String, ty: Ty },
    #[error("type `{0}` cannot be dereferenced")]
    DerefNonReference(Ty),
    #[error("cannot cast `{from}` as `{to}`")]
    InvalidCast { from: Ty, to: Ty },
    #[error("`if` and `else` have incompatible types: `{then_ty}` and `{else_ty}`")]
    IncompatibleBranches { then_ty: Ty, else_ty: Ty },
    #[error("`break` value `{found}` does not match earlier `break` of `{expected}`")]
    BreakMismatch { expected: Ty, found: Ty },
    #[error("cannot index into a value of type `{0}`")]
    NotIndexable(Ty),
    #[error("array index must be `usize`, found `{0}`")]
    InvalidIndex(Ty),
    #[error("index {index} is out of bounds for `{name}` of length {len}")]
    IndexOutOfBounds { name: String, index: i64, len: usize },
    #[error("`{0}` is not a struct")]
    NotAStruct(String),
    #[error("`{0}` is a method and must be called with `.`")]
    MethodAsFunction(String),
    #[error("`{0}` is not a method")]
    NotAMethod(String),
    #[error("expression is not callable")]
    NotCallable,
    #[error("array length must be a non-negative integer constant")]
    InvalidArrayLength,
    #[error("attempt to divide by zero in constant expression")]
    ConstDivisionByZero,
    #[error("arithmetic overflow in constant expression")]
    ConstOverflow,
    #[error("invalid left-hand side of assignment")]
    InvalidAssignTarget,
    #[error("type annotations needed for `{0}`")]
    AnnotationNeeded(String),

    // Mutability
    #[error("cannot assign to immutable variable `{0}`")]
    ImmutableAssign(String),
    #[error("cannot assign to a field of an immutable value")]
    ImmutableField,
    #[error("cannot assign to an element of an immutable array")]
    ImmutableIndex,
    #[error("cannot assign through a `&` reference")]
    ImmutableDeref,
    #[error("cannot call `{0}` on an immutable receiver")]
    ImmutableReceiver(String),
    #[error("argument {index} of `{name}` must be a mutable reference")]
    ImmutableArgument { name: String, index: usize },
    #[error("cannot borrow an immutable value as mutable")]
    ImmutableBorrow,
    #[error("cannot assign to constant `{0}`")]
    AssignToConstant(String),

    // Control flow
    #[error("`break` outside of a loop")]
    BreakOutsideLoop,
    #[error("`continue` outside of a loop")]
    ContinueOutsideLoop,
    #[error("`return` outside of a function")]
    ReturnOutsideFunction,
    #[error("`exit` may only be called from `main`")]
    ExitOutsideMain,
    #[error("`exit` is called {0} times; a program has a single exit point")]
    MultipleExit(usize),
    #[error("`main` must return `()`, found `{0}`")]
    MainReturnType(Ty),
    #[error("`main` must end with a call to `exit`")]
    MainMissingExit,

    #[error("scope traversal out of sync at node {node}: expected scope {expected}, cursor at child {cursor}")]
    ScopeOutOfSync {
        node: u32,
        expected: usize,
        cursor: usize,
    },
    #[error("no scope recorded for node #{0}")]
    UnknownScopeNode(u32),
}

impl SemanticError {
    pub fn kind(&self) -> ErrorKind {
        use SemanticError::*;
        match self {
            UndefinedName(_)
            | UndefinedVariable(_)
            | UndefinedFunction(_)
            | UndefinedStruct(_)
            | UndefinedTrait(_)
            | UnknownField { .. }
            | UnknownMethod { .. }
            | UnknownAssociated { .. } => ErrorKind::Name,

            ArgumentCount { .. }
            | StructFieldCount { .. }
            | DuplicateField { .. }
            | MissingField { .. }
            | TraitConstCount { .. }
            | TraitConstMissing { .. }
            | TraitFunctionCount { .. }
            | TraitFunctionMissing { .. }
            | TraitMethodKind { .. }
            | TraitConstness { .. }
            | TraitReturnType { .. }
            | TraitParamCount { .. }
            | TraitParamType { .. } => ErrorKind::Arity,

            ImmutableAssign(_)
            | ImmutableField
            | ImmutableIndex
            | ImmutableDeref
            | ImmutableReceiver(_)
            | ImmutableArgument { .. }
            | ImmutableBorrow
            | AssignToConstant(_) => ErrorKind::Mutability,

            BreakOutsideLoop
            | ContinueOutsideLoop
            | ReturnOutsideFunction
            | ExitOutsideMain
            | MultipleExit(_)
            | MainReturnType(_)
            | MainMissingExit => ErrorKind::ControlFlow,

            ScopeOutOfSync { .. } | UnknownScopeNode(_) => ErrorKind::Internal,

            _ => ErrorKind::Type,
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            SemanticError::ImmutableAssign(name) => {
                Some(format!("consider declaring it as mutable: `let mut {}`", name))
            }
            SemanticError::ImmutableReceiver(_) | SemanticError::ImmutableField => {
                Some("declare the binding with `mut`".to_string())
            }
            SemanticError::MainMissingExit => {
                Some("add `exit(0);` as the last statement of `main`".to_string())
            }
            SemanticError::MethodAsFunction(name) => {
                Some(format!("call it on a value: `value.{}(..)`", name))
            }
            _ => None,
        }
    }

    /// Attach a source position.
    pub fn at(self, span: Span) -> RxError {
        let location = SourceLocation::new("", span.line, span.column);
        let error = RxError::new(self.kind(), &self.to_string(), Some(location));
        match self.suggestion() {
            Some(help) => error.with_suggestion(&help),
            None => error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(SemanticError::UndefinedName("X".into()).kind(), ErrorKind::Name);
        assert_eq!(
            SemanticError::TraitFunctionCount {
                trait_name: "T".into(),
                ty: "P".into(),
                expected: 2,
                found: 1
            }
            .kind(),
            ErrorKind::Arity
        );
        assert_eq!(SemanticError::ImmutableField.kind(), ErrorKind::Mutability);
        assert_eq!(SemanticError::MultipleExit(2).kind(), ErrorKind::ControlFlow);
        assert_eq!(SemanticError::NotCallable.kind(), ErrorKind::Type);
    }

    #[test]
    fn test_at_carries_position_and_help() {
        let err = SemanticError::ImmutableAssign("x".into()).at(Span::new(0, 1, 3, 9));
        let loc = err.location.clone().unwrap();

        assert_eq!((loc.line, loc.column), (3, 9));
        assert_eq!(err.message, "cannot assign to immutable variable `x`");
        assert!(err.suggestion.unwrap().contains("let mut x"));
    }
}
