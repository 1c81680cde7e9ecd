//! Pass 2: constant evaluation
//!
//! Folds constant initializers into [`ConstValue`]s and rewrites every
//! declared type whose array length is a constant expression.

use indexmap::IndexMap;
use log::{debug, trace};

use super::const_value::ConstValue;
use super::error::SemanticError;
use super::scope::{ScopeId, ScopeKind, ScopeTree};
use super::types::Ty;
use super::visit::{self, Visitor};
use crate::error::RxResult;
use crate::lexer::Span;
use crate::parser::ast::*;

/// Fold `expr` in `scope`. `Ok(None)` means the expression has no compile-time value.
pub fn fold(tree: &ScopeTree, scope: ScopeId, expr: &Expression) -> RxResult<Option<ConstValue>> {
    match expr {
        Expression::Int { value, .. } => Ok(i32::try_from(*value).ok().map(ConstValue::Int)),
        Expression::Bool { value, .. } => Ok(Some(ConstValue::Bool(*value))),
        Expression::Char { value, .. } => Ok(Some(ConstValue::Char(*value))),
        Expression::Str { value, .. } => Ok(Some(ConstValue::Str(value.clone()))),
        Expression::Grouped { inner, .. } => fold(tree, scope, inner),
        Expression::Path { path, span } => fold_path(tree, scope, path, *span),

        Expression::Unary {
            operator, operand, ..
        } => {
            let value = match fold(tree, scope, operand)? {
                Some(value) => value,
                None => return Ok(None),
            };
            match (operator, value) {
                (UnaryOp::Negate, ConstValue::Int(n)) => n
                    .checked_neg()
                    .map(|n| Some(ConstValue::Int(n)))
                    .ok_or_else(|| SemanticError::ConstOverflow.at(expr.span())),
                (UnaryOp::Not, ConstValue::Int(n)) => Ok(Some(ConstValue::Int(!n))),
                (UnaryOp::Not, ConstValue::Bool(b)) => Ok(Some(ConstValue::Bool(!b))),
                _ => Ok(None),
            }
        }

        Expression::Binary {
            left,
            operator,
            right,
            span,
        } => {
            let lhs = fold(tree, scope, left)?.and_then(|v| v.as_int());
            let rhs = fold(tree, scope, right)?.and_then(|v| v.as_int());
            match (lhs, rhs) {
                (Some(a), Some(b)) => fold_int_binary(*operator, a, b, *span),
                _ => Ok(None),
            }
        }

        Expression::StructLit { path, fields, .. } => {
            let name = match (&path.first, &path.second) {
                (PathSegment::Ident(name), None) => name.clone(),
                (PathSegment::SelfType, None) => match tree.self_type(scope) {
                    Some(name) => name.to_string(),
                    None => return Ok(None),
                },
                _ => return Ok(None),
            };
            let mut values = IndexMap::new();
            for field in fields {
                match fold(tree, scope, &field.value)? {
                    Some(value) => {
                        values.insert(field.name.clone(), value);
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some(ConstValue::Struct {
                name,
                fields: values,
            }))
        }

        _ => Ok(None),
    }
}

fn fold_int_binary(op: BinaryOp, a: i32, b: i32, span: Span) -> RxResult<Option<ConstValue>> {
    let result = match op {
        BinaryOp::Divide | BinaryOp::Modulo if b == 0 => {
            return Err(SemanticError::ConstDivisionByZero.at(span))
        }
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Subtract => a.checked_sub(b),
        BinaryOp::Multiply => a.checked_mul(b),
        BinaryOp::Divide => a.checked_div(b),
        BinaryOp::Modulo => a.checked_rem(b),
        BinaryOp::BitAnd => Some(a & b),
        BinaryOp::BitOr => Some(a | b),
        BinaryOp::BitXor => Some(a ^ b),
        BinaryOp::Shl => u32::try_from(b).ok().and_then(|b| a.checked_shl(b)),
        BinaryOp::Shr => u32::try_from(b).ok().and_then(|b| a.checked_shr(b)),
        _ => return Ok(None),
    };

    result
        .map(|n| Some(ConstValue::Int(n)))
        .ok_or_else(|| SemanticError::ConstOverflow.at(span))
}

fn fold_path(tree: &ScopeTree, scope: ScopeId, path: &PathExpr, span: Span) -> RxResult<Option<ConstValue>> {
    match (&path.first, &path.second) {
        (PathSegment::Ident(name), None) => {
            if let Some(constant) = tree.find_const(scope, name) {
                return Ok(constant.value.clone());
            }
            if tree.find_variable(scope, name).is_some() {
                return Ok(None);
            }
            Err(SemanticError::UndefinedName(name.clone()).at(span))
        }
        (owner, Some(PathSegment::Ident(item))) => {
            let owner = match owner {
                PathSegment::Ident(name) => name.as_str(),
                PathSegment::SelfType => match tree.self_type(scope) {
                    Some(name) => name,
                    None => return Err(SemanticError::UndefinedName("Self".into()).at(span)),
                },
                PathSegment::SelfValue => return Ok(None),
            };

            if let Some(def) = tree.find_enum(scope, owner) {
                if def.variants.iter().any(|v| v == item) {
                    return Ok(Some(ConstValue::Enum {
                        name: owner.to_string(),
                        variant: item.clone(),
                    }));
                }
            }
            match associated_const(tree, owner, item) {
                Some(value) => Ok(value),
                None => Err(SemanticError::UnknownAssociated {
                    owner: owner.to_string(),
                    item: item.clone(),
                }
                .at(span)),
            }
        }
        _ => Ok(None),
    }
}

/// Value of `owner::item`, declared in any `impl owner` block.
///
/// The outer `Option` is whether the constant exists at all.
fn associated_const(tree: &ScopeTree, owner: &str, item: &str) -> Option<Option<ConstValue>> {
    tree.iter()
        .filter(|(_, s)| s.kind == ScopeKind::Impl && s.self_type.as_deref() == Some(owner))
        .find_map(|(_, s)| s.consts.get(item))
        .map(|c| c.value.clone())
}

/// Resolve a written type. With `fold_lengths` unset, only literal array
/// lengths are honoured and anything else is recorded as length 0.
pub fn lower_type(tree: &ScopeTree, scope: ScopeId, ty: &TypeExpr, fold_lengths: bool) -> RxResult<Ty> {
    match ty {
        TypeExpr::Path { name, .. } => Ok(Ty::Named(name.clone())),
        TypeExpr::SelfType { .. } => {
            let impl_target = tree
                .ancestors(scope)
                .map(|id| tree.get(id))
                .find(|s| matches!(s.kind, ScopeKind::Impl | ScopeKind::Trait))
                .filter(|s| s.kind == ScopeKind::Impl)
                .and_then(|s| s.self_type.clone());
            Ok(Ty::Named(impl_target.unwrap_or_else(|| "Self".to_string())))
        }
        TypeExpr::Reference { mutable, inner, .. } => Ok(Ty::reference(
            *mutable,
            lower_type(tree, scope, inner, fold_lengths)?,
        )),
        TypeExpr::Array { elem, len, .. } => {
            let elem = lower_type(tree, scope, elem, fold_lengths)?;
            let len = if fold_lengths {
                array_length(tree, scope, len)?
            } else {
                match len.as_ref() {
                    Expression::Int { value, .. } => usize::try_from(*value).unwrap_or(0),
                    _ => 0,
                }
            };
            Ok(Ty::array(elem, len))
        }
        TypeExpr::Unit { .. } => Ok(Ty::Unit),
        TypeExpr::Never { .. } => Ok(Ty::Never),
    }
}

/// Fold an array length; it must be a non-negative integer constant.
pub fn array_length(tree: &ScopeTree, scope: ScopeId, len: &Expression) -> RxResult<usize> {
    match fold(tree, scope, len)? {
        Some(ConstValue::Int(n)) if n >= 0 => Ok(n as usize),
        _ => Err(SemanticError::InvalidArrayLength.at(len.span())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Fold constant initializers
    Values,
    /// Re-lower declared types with folded array lengths
    Types,
}

pub struct ConstEvaluator<'t> {
    tree: &'t mut ScopeTree,
    current: ScopeId,
    phase: Phase,
    folded: usize,
}

impl<'t> ConstEvaluator<'t> {
    pub fn new(tree: &'t mut ScopeTree) -> Self {
        Self {
            tree,
            current: ScopeId::ROOT,
            phase: Phase::Values,
            folded: 0,
        }
    }

    pub fn evaluate(mut self, krate: &Crate) -> RxResult<()> {
        debug!("const evaluation: start");

        // Constants may refer to constants declared later; repeat until nothing new folds.
        let mut rounds = 0;
        loop {
            rounds += 1;
            self.folded = 0;
            self.restart(Phase::Values);
            visit::walk_crate(&mut self, krate)?;
            if self.folded == 0 {
                break;
            }
        }

        self.restart(Phase::Types);
        visit::walk_crate(&mut self, krate)?;

        debug!("const evaluation: done after {} value round(s)", rounds);
        Ok(())
    }

    fn restart(&mut self, phase: Phase) {
        self.tree.reset_all_cursors();
        self.current = ScopeId::ROOT;
        self.phase = phase;
    }

    fn lower(&self, ty: &TypeExpr) -> RxResult<Ty> {
        lower_type(self.tree, self.current, ty, true)
    }
}

impl Visitor for ConstEvaluator<'_> {
    fn enter_scope(
        &mut self,
        node: NodeId,
        _kind: ScopeKind,
        _self_type: Option<&str>,
        span: Span,
    ) -> RxResult<ScopeId> {
        let outer = self.current;
        self.current = self.tree.enter(outer, node).map_err(|e| e.at(span))?;
        Ok(outer)
    }

    fn leave_scope(&mut self, outer: ScopeId) {
        self.current = outer;
    }

    fn visit_const(&mut self, item: &ConstItem) -> RxResult<()> {
        match self.phase {
            Phase::Values => {
                let pending = self
                    .tree
                    .get(self.current)
                    .consts
                    .get(&item.name)
                    .is_some_and(|c| c.value.is_none());

                if pending {
                    if let Some(init) = &item.value {
                        if let Some(value) = fold(self.tree, self.current, init)? {
                            trace!("const {} = {}", item.name, value);
                            if let Some(symbol) = self.tree.get_mut(self.current).consts.get_mut(&item.name) {
                                symbol.value = Some(value);
                            }
                            self.folded += 1;
                        }
                    }
                }
            }
            Phase::Types => {
                let ty = self.lower(&item.ty)?;
                if let Some(symbol) = self.tree.get_mut(self.current).consts.get_mut(&item.name) {
                    symbol.ty = ty;
                }
            }
        }
        visit::walk_const(self, item)
    }

    fn visit_struct(&mut self, def: &StructDef) -> RxResult<()> {
        if self.phase == Phase::Types {
            let mut fields = IndexMap::new();
            for field in &def.fields {
                fields.insert(field.name.clone(), self.lower(&field.ty)?);
            }
            if let Some(symbol) = self.tree.get_mut(self.current).structs.get_mut(&def.name) {
                symbol.fields = fields;
            }
        }
        Ok(())
    }

    fn visit_function(&mut self, func: &Function) -> RxResult<()> {
        if self.phase == Phase::Types {
            let return_type = match &func.return_type {
                Some(ty) => self.lower(ty)?,
                None => Ty::Unit,
            };
            let param_types = func
                .params
                .params
                .iter()
                .map(|p| self.lower(&p.ty))
                .collect::<RxResult<Vec<_>>>()?;

            if let Some(symbol) = self.tree.get_mut(self.current).funcs.get_mut(&func.name) {
                symbol.return_type = return_type;
                for (param, (ty, decl)) in symbol
                    .params
                    .iter_mut()
                    .zip(param_types.into_iter().zip(&func.params.params))
                {
                    *param = super::symbol::VariableSymbol::from_pattern(&decl.pattern, ty);
                }
            }
        }
        visit::walk_function(self, func)
    }

    fn visit_trait(&mut self, def: &TraitDef) -> RxResult<()> {
        visit::walk_trait(self, def)?;

        if self.phase == Phase::Types {
            if let Some(trait_scope) = self.tree.scope_of(def.id) {
                let symbol = self.tree.trait_symbol(trait_scope, &def.name);
                self.tree
                    .get_mut(self.current)
                    .traits
                    .insert(def.name.clone(), symbol);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::semantic::collector::SymbolCollector;
    use indoc::indoc;

    fn collect(source: &str) -> (Crate, ScopeTree) {
        let tokens = Lexer::new(source, "test.rx").tokenize().unwrap();
        let krate = Parser::new(tokens).parse().unwrap();
        let mut tree = ScopeTree::new();
        SymbolCollector::new(&mut tree).collect(&krate).unwrap();
        (krate, tree)
    }

    fn evaluated(source: &str) -> RxResult<ScopeTree> {
        let (krate, mut tree) = collect(source);
        ConstEvaluator::new(&mut tree).evaluate(&krate)?;
        Ok(tree)
    }

    fn root_const(tree: &ScopeTree, name: &str) -> Option<ConstValue> {
        tree.get(ScopeId::ROOT).consts[name].value.clone()
    }

    #[test]
    fn test_literals_fold() {
        let tree = evaluated(indoc! {r#"
            const A: i32 = 7;
            const B: bool = true;
            const C: char = 'c';
            const S: &str = "hi";
        "#})
        .unwrap();

        assert_eq!(root_const(&tree, "A"), Some(ConstValue::Int(7)));
        assert_eq!(root_const(&tree, "B"), Some(ConstValue::Bool(true)));
        assert_eq!(root_const(&tree, "C"), Some(ConstValue::Char('c')));
        assert_eq!(root_const(&tree, "S"), Some(ConstValue::Str("hi".into())));
    }

    #[test]
    fn test_forward_reference_and_arithmetic() {
        let tree = evaluated(indoc! {"
            const TOTAL: i32 = (BASE + 2) * 3 - -1;
            const BASE: i32 = 1 << 2;
        "})
        .unwrap();

        assert_eq!(root_const(&tree, "BASE"), Some(ConstValue::Int(4)));
        assert_eq!(root_const(&tree, "TOTAL"), Some(ConstValue::Int(19)));
    }

    #[test]
    fn test_unsupported_expression_has_no_value() {
        let tree = evaluated("const A: i32 = getInt(); fn getInt() -> i32 { 1 }").unwrap();
        assert_eq!(root_const(&tree, "A"), None);
    }

    #[test]
    fn test_division_by_zero_is_type_error() {
        let err = evaluated("const A: i32 = 1 / 0;").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Type);
    }

    #[test]
    fn test_overflow_is_type_error() {
        let err = evaluated("const A: i32 = 2147483647 + 1;").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Type);
    }

    #[test]
    fn test_unknown_name_is_name_error() {
        let err = evaluated("const A: i32 = MISSING;").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Name);
    }

    #[test]
    fn test_array_lengths_repaired() {
        let tree = evaluated(indoc! {"
            const N: usize = 2 + 2;
            struct Grid { cells: [i32; N] }
            fn fill(g: [bool; N * 2]) -> [i32; N] { [0; N] }
        "})
        .unwrap();

        let root = tree.get(ScopeId::ROOT);
        assert_eq!(root.structs["Grid"].fields["cells"], Ty::array(Ty::i32(), 4));
        assert_eq!(root.funcs["fill"].return_type, Ty::array(Ty::i32(), 4));
        assert_eq!(root.funcs["fill"].params[0].ty, Ty::array(Ty::bool(), 8));
    }

    #[test]
    fn test_negative_array_length_rejected() {
        let err = evaluated("struct S { a: [i32; 0 - 1] }").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Type);
    }

    #[test]
    fn test_associated_const_paths() {
        let tree = evaluated(indoc! {"
            struct P;
            impl P { const SIZE: i32 = 3; }
            enum Color { Red, Green }
            const TWICE: i32 = P::SIZE * 2;
            const FAVOURITE: Color = Color::Green;
        "})
        .unwrap();

        assert_eq!(root_const(&tree, "TWICE"), Some(ConstValue::Int(6)));
        assert_eq!(
            root_const(&tree, "FAVOURITE"),
            Some(ConstValue::Enum {
                name: "Color".into(),
                variant: "Green".into()
            })
        );
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let source = indoc! {"
            const A: i32 = 10;
            const B: bool = false;
            struct Buf { data: [i32; 3] }
            fn main() { const LOCAL: i32 = 5; }
        "};
        let (krate, mut tree) = collect(source);

        ConstEvaluator::new(&mut tree).evaluate(&krate).unwrap();
        let first: Vec<_> = tree.iter().map(|(_, s)| (s.consts.clone(), s.structs.clone())).collect();

        ConstEvaluator::new(&mut tree).evaluate(&krate).unwrap();
        let second: Vec<_> = tree.iter().map(|(_, s)| (s.consts.clone(), s.structs.clone())).collect();

        assert_eq!(first, second);
    }
}
