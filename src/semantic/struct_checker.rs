//! Pass 3: type-name resolution and impl merging
//!
//! Every written type must name something that exists. Each `impl` block is
//! folded into its target struct, after trait impls have been checked item by
//! item against the trait declaration.

use log::{debug, trace};

use super::error::SemanticError;
use super::scope::{ScopeId, ScopeKind, ScopeTree};
use super::symbol::{FuncSymbol, TraitSymbol};
use super::types::PRIMITIVE_TYPES;
use super::visit::{self, Visitor};
use crate::error::RxResult;
use crate::lexer::Span;
use crate::parser::ast::*;

pub struct StructChecker<'t> {
    tree: &'t mut ScopeTree,
    current: ScopeId,
}

impl<'t> StructChecker<'t> {
    pub fn new(tree: &'t mut ScopeTree) -> Self {
        Self {
            tree,
            current: ScopeId::ROOT,
        }
    }

    pub fn check(mut self, krate: &Crate) -> RxResult<()> {
        self.tree.reset_all_cursors();
        visit::walk_crate(&mut self, krate)?;
        debug!("struct check: done");
        Ok(())
    }

    fn type_name_exists(&self, name: &str) -> bool {
        PRIMITIVE_TYPES.contains(&name)
            || self.tree.find_struct(self.current, name).is_some()
            || self.tree.find_enum(self.current, name).is_some()
            || self.tree.find_trait(self.current, name).is_some()
    }

    /// Copy the consts and functions declared in `impl_node`'s scope into the struct `target`.
    fn merge(&mut self, impl_node: NodeId, target: &str, span: Span) -> RxResult<()> {
        let impl_scope = self
            .tree
            .scope_of(impl_node)
            .ok_or_else(|| SemanticError::UnknownScopeNode(impl_node.0).at(span))?;
        let consts = self.tree.get(impl_scope).consts.clone();
        let funcs = self.tree.get(impl_scope).funcs.clone();

        let symbol = self
            .tree
            .find_struct_mut(self.current, target)
            .ok_or_else(|| SemanticError::UndefinedStruct(target.to_string()).at(span))?;

        for (name, constant) in consts {
            symbol.assoc_consts.insert(name, constant);
        }
        for func in funcs.into_values() {
            symbol.add_function(func);
        }
        trace!("merged impl into `{}`", target);
        Ok(())
    }

    fn check_inherent(&mut self, imp: &InherentImpl) -> RxResult<()> {
        if self.tree.find_struct(self.current, &imp.self_ty).is_none() {
            let err = if self.type_name_exists(&imp.self_ty) {
                SemanticError::NotAStruct(imp.self_ty.clone())
            } else {
                SemanticError::UndefinedStruct(imp.self_ty.clone())
            };
            return Err(err.at(imp.span));
        }
        self.merge(imp.id, &imp.self_ty, imp.span)
    }

    fn check_trait_impl(&mut self, imp: &TraitImpl) -> RxResult<()> {
        let trait_symbol = self
            .tree
            .find_trait(self.current, &imp.trait_name)
            .cloned()
            .ok_or_else(|| SemanticError::UndefinedTrait(imp.trait_name.clone()).at(imp.span))?;

        if self.tree.find_struct(self.current, &imp.self_ty).is_none() {
            return Err(SemanticError::UndefinedStruct(imp.self_ty.clone()).at(imp.span));
        }

        let impl_scope = self
            .tree
            .scope_of(imp.id)
            .ok_or_else(|| SemanticError::UnknownScopeNode(imp.id.0).at(imp.span))?;

        conform(self.tree, impl_scope, &trait_symbol, &imp.self_ty).map_err(|e| e.at(imp.span))?;
        self.merge(imp.id, &imp.self_ty, imp.span)
    }
}

/// Check that the items of `impl_scope` implement `declared` for `target`.
fn conform(
    tree: &ScopeTree,
    impl_scope: ScopeId,
    declared: &TraitSymbol,
    target: &str,
) -> Result<(), SemanticError> {
    let scope = tree.get(impl_scope);
    let trait_name = declared.name.clone();

    if scope.consts.len() != declared.consts.len() {
        return Err(SemanticError::TraitConstCount {
            trait_name,
            ty: target.to_string(),
            expected: declared.consts.len(),
            found: scope.consts.len(),
        });
    }
    if let Some(missing) = declared.consts.keys().find(|name| !scope.consts.contains_key(*name)) {
        return Err(SemanticError::TraitConstMissing {
            trait_name,
            name: missing.clone(),
        });
    }

    if scope.funcs.len() != declared.function_count() {
        return Err(SemanticError::TraitFunctionCount {
            trait_name,
            ty: target.to_string(),
            expected: declared.function_count(),
            found: scope.funcs.len(),
        });
    }

    for expected in declared.functions() {
        let found = scope
            .funcs
            .get(&expected.name)
            .ok_or_else(|| SemanticError::TraitFunctionMissing {
                trait_name: trait_name.clone(),
                name: expected.name.clone(),
            })?;
        conform_function(&trait_name, expected, found, target)?;
    }
    Ok(())
}

fn conform_function(
    trait_name: &str,
    expected: &FuncSymbol,
    found: &FuncSymbol,
    target: &str,
) -> Result<(), SemanticError> {
    let name = expected.name.clone();

    if expected.method_kind != found.method_kind {
        return Err(SemanticError::TraitMethodKind {
            trait_name: trait_name.to_string(),
            name,
            expected: expected.method_kind.to_string(),
            found: found.method_kind.to_string(),
        });
    }
    if expected.is_const != found.is_const {
        return Err(SemanticError::TraitConstness {
            trait_name: trait_name.to_string(),
            name,
        });
    }

    let expected_ret = expected.return_type.substitute_self(target);
    if expected_ret != found.return_type {
        return Err(SemanticError::TraitReturnType {
            trait_name: trait_name.to_string(),
            name,
            expected: expected_ret,
            found: found.return_type.clone(),
        });
    }

    if expected.params.len() != found.params.len() {
        return Err(SemanticError::TraitParamCount {
            trait_name: trait_name.to_string(),
            name,
            expected: expected.params.len(),
            found: found.params.len(),
        });
    }
    for (index, (want, got)) in expected.params.iter().zip(&found.params).enumerate() {
        let want = want.ty.substitute_self(target);
        if want != got.ty {
            return Err(SemanticError::TraitParamType {
                trait_name: trait_name.to_string(),
                name,
                index,
                expected: want,
                found: got.ty.clone(),
            });
        }
    }
    Ok(())
}

impl Visitor for StructChecker<'_> {
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

    fn visit_impl(&mut self, imp: &Implementation) -> RxResult<()> {
        match imp {
            Implementation::Inherent(inherent) => self.check_inherent(inherent)?,
            Implementation::Trait(trait_impl) => self.check_trait_impl(trait_impl)?,
        }
        visit::walk_impl(self, imp)
    }

    fn visit_type(&mut self, ty: &TypeExpr) -> RxResult<()> {
        match ty {
            TypeExpr::Path { name, span } => {
                if self.type_name_exists(name) {
                    Ok(())
                } else {
                    Err(SemanticError::UndefinedName(name.clone()).at(*span))
                }
            }
            TypeExpr::SelfType { span } => match self.tree.self_type(self.current) {
                Some(_) => Ok(()),
                None => Err(SemanticError::UndefinedName("Self".into()).at(*span)),
            },
            TypeExpr::Reference { inner, .. } => self.visit_type(inner),
            TypeExpr::Array { elem, .. } => self.visit_type(elem),
            TypeExpr::Unit { .. } | TypeExpr::Never { .. } => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::semantic::collector::SymbolCollector;
    use crate::semantic::const_eval::ConstEvaluator;
    use crate::semantic::symbol::MethodKind;
    use crate::semantic::types::Ty;
    use indoc::indoc;

    fn checked(source: &str) -> RxResult<ScopeTree> {
        let tokens = Lexer::new(source, "test.rx").tokenize().unwrap();
        let krate = Parser::new(tokens).parse().unwrap();
        let mut tree = ScopeTree::new();
        SymbolCollector::new(&mut tree).collect(&krate)?;
        crate::semantic::builtins::register(&mut tree);
        ConstEvaluator::new(&mut tree).evaluate(&krate)?;
        StructChecker::new(&mut tree).check(&krate)?;
        Ok(tree)
    }

    const SHAPE: &str = indoc! {"
        trait Shape {
            const SIDES: i32;
            fn area(&self) -> i32;
            fn scale(&mut self, by: i32);
            fn unit() -> Self;
        }
        struct Square { side: i32 }
    "};

    #[test]
    fn test_inherent_impl_merged() {
        let tree = checked(indoc! {"
            struct P { x: i32 }
            impl P {
                const ORIGIN: i32 = 0;
                fn new() -> Self { P { x: 0 } }
                fn get(&self) -> i32 { self.x }
            }
        "})
        .unwrap();

        let p = &tree.get(ScopeId::ROOT).structs["P"];
        assert_eq!(p.assoc_funcs["new"].return_type, Ty::named("P"));
        assert_eq!(p.methods["get"].method_kind, MethodKind::SelfRef);
        assert!(p.assoc_consts.contains_key("ORIGIN"));
    }

    #[test]
    fn test_full_trait_impl_conforms() {
        let source = format!(
            "{}{}",
            SHAPE,
            indoc! {"
                impl Shape for Square {
                    const SIDES: i32 = 4;
                    fn area(&self) -> i32 { self.side * self.side }
                    fn scale(&mut self, by: i32) { self.side *= by; }
                    fn unit() -> Square { Square { side: 1 } }
                }
            "}
        );
        let tree = checked(&source).unwrap();
        let square = &tree.get(ScopeId::ROOT).structs["Square"];
        assert_eq!(square.methods.len(), 2);
        assert_eq!(square.assoc_funcs.len(), 1);
    }

    #[test]
    fn test_trait_subset_is_arity_error() {
        let source = format!(
            "{}{}",
            SHAPE,
            indoc! {"
                impl Shape for Square {
                    const SIDES: i32 = 4;
                    fn area(&self) -> i32 { 1 }
                    fn unit() -> Self { Square { side: 1 } }
                }
            "}
        );
        let err = checked(&source).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Arity);
    }

    #[test]
    fn test_receiver_kind_must_match() {
        let source = format!(
            "{}{}",
            SHAPE,
            indoc! {"
                impl Shape for Square {
                    const SIDES: i32 = 4;
                    fn area(&self) -> i32 { 1 }
                    fn scale(&self, by: i32) { }
                    fn unit() -> Self { Square { side: 1 } }
                }
            "}
        );
        let err = checked(&source).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Arity);
        assert!(err.message.contains("scale"));
    }

    #[test]
    fn test_param_type_must_match_exactly() {
        let source = format!(
            "{}{}",
            SHAPE,
            indoc! {"
                impl Shape for Square {
                    const SIDES: i32 = 4;
                    fn area(&self) -> i32 { 1 }
                    fn scale(&mut self, by: u32) { }
                    fn unit() -> Self { Square { side: 1 } }
                }
            "}
        );
        let err = checked(&source).unwrap_err();
        assert!(err.message.contains("parameter 0"));
    }

    #[test]
    fn test_undefined_type_name() {
        let err = checked("struct A { b: Missing }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Name);
        assert_eq!(err.message, "Undefined Name: Missing");

        let err = checked("fn f() { let x: [Ghost; 2]; }").unwrap_err();
        assert_eq!(err.message, "Undefined Name: Ghost");
    }

    #[test]
    fn test_impl_requires_struct() {
        let err = checked("enum E { A } impl E { }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Type);

        let err = checked("impl Nowhere { }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Name);

        let err = checked("struct S; impl Missing for S { }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Name);
    }

    #[test]
    fn test_self_outside_impl() {
        let err = checked("fn f() -> Self { }").unwrap_err();
        assert_eq!(err.message, "Undefined Name: Self");
    }
}
