//! Pass 1: symbol collection
//!
//! Builds the scope tree in source order and registers every item
//! (function, struct, enum, const, trait) in the scope that declares it.
//! Types are lowered provisionally: array lengths that are not literals are
//! recorded as 0 until the const evaluator repairs them.

use indexmap::IndexMap;
use log::trace;

use super::const_eval::lower_type;
use super::scope::{ScopeId, ScopeKind, ScopeTree};
use super::symbol::{
    ConstSymbol, EnumSymbol, FuncSymbol, MethodKind, StructSymbol, VariableSymbol,
};
use super::types::Ty;
use super::visit::{self, Visitor};
use crate::error::RxResult;
use crate::lexer::Span;
use crate::parser::ast::*;

pub struct SymbolCollector<'t> {
    tree: &'t mut ScopeTree,
    current: ScopeId,
}

impl<'t> SymbolCollector<'t> {
    pub fn new(tree: &'t mut ScopeTree) -> Self {
        Self {
            tree,
            current: ScopeId::ROOT,
        }
    }

    pub fn collect(mut self, krate: &Crate) -> RxResult<()> {
        visit::walk_crate(&mut self, krate)?;
        trace!("collected {} scope(s)", self.tree.len());
        Ok(())
    }

    fn lower(&self, ty: &TypeExpr) -> RxResult<Ty> {
        lower_type(self.tree, self.current, ty, false)
    }

    fn function_symbol(&self, func: &Function) -> RxResult<FuncSymbol> {
        let return_type = match &func.return_type {
            Some(ty) => self.lower(ty)?,
            None => Ty::Unit,
        };

        let mut params = Vec::with_capacity(func.params.params.len());
        for param in &func.params.params {
            let ty = self.lower(&param.ty)?;
            params.push(VariableSymbol::from_pattern(&param.pattern, ty));
        }

        Ok(FuncSymbol {
            name: func.name.clone(),
            return_type,
            is_const: func.is_const,
            method_kind: MethodKind::from_self_param(func.params.self_param.as_ref()),
            params,
        })
    }
}

impl Visitor for SymbolCollector<'_> {
    fn enter_scope(
        &mut self,
        node: NodeId,
        kind: ScopeKind,
        self_type: Option<&str>,
        _span: Span,
    ) -> RxResult<ScopeId> {
        let outer = self.current;
        self.current = self
            .tree
            .add_child(outer, kind, self_type.map(str::to_string), node);
        trace!("scope {} {} for node {}", self.current.0, kind, node);
        Ok(outer)
    }

    fn leave_scope(&mut self, outer: ScopeId) {
        self.current = outer;
    }

    fn visit_function(&mut self, func: &Function) -> RxResult<()> {
        let symbol = self.function_symbol(func)?;
        self.tree
            .get_mut(self.current)
            .funcs
            .insert(func.name.clone(), symbol);

        visit::walk_function(self, func)
    }

    fn visit_struct(&mut self, def: &StructDef) -> RxResult<()> {
        let mut fields = IndexMap::new();
        for field in &def.fields {
            fields.insert(field.name.clone(), self.lower(&field.ty)?);
        }

        let mut symbol = StructSymbol::new(&def.name);
        symbol.fields = fields;
        self.tree
            .get_mut(self.current)
            .structs
            .insert(def.name.clone(), symbol);
        Ok(())
    }

    fn visit_enum(&mut self, def: &EnumDef) -> RxResult<()> {
        self.tree.get_mut(self.current).enums.insert(
            def.name.clone(),
            EnumSymbol {
                name: def.name.clone(),
                variants: def.variants.clone(),
            },
        );
        Ok(())
    }

    fn visit_const(&mut self, item: &ConstItem) -> RxResult<()> {
        let symbol = ConstSymbol {
            name: item.name.clone(),
            ty: self.lower(&item.ty)?,
            value: None,
        };
        self.tree
            .get_mut(self.current)
            .consts
            .insert(item.name.clone(), symbol);

        visit::walk_const(self, item)
    }

    fn visit_trait(&mut self, def: &TraitDef) -> RxResult<()> {
        visit::walk_trait(self, def)?;

        if let Some(trait_scope) = self.tree.scope_of(def.id) {
            let symbol = self.tree.trait_symbol(trait_scope, &def.name);
            self.tree
                .get_mut(self.current)
                .traits
                .insert(def.name.clone(), symbol);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use indoc::indoc;

    fn collect(source: &str) -> ScopeTree {
        let tokens = Lexer::new(source, "test.rx").tokenize().unwrap();
        let krate = Parser::new(tokens).parse().unwrap();
        let mut tree = ScopeTree::new();
        SymbolCollector::new(&mut tree).collect(&krate).unwrap();
        tree
    }

    fn kinds(tree: &ScopeTree, id: ScopeId) -> Vec<ScopeKind> {
        tree.get(id)
            .children
            .iter()
            .map(|child| tree.get(*child).kind)
            .collect()
    }

    #[test]
    fn test_items_registered_in_declaring_scope() {
        let tree = collect(indoc! {"
            const N: usize = 3;
            struct P { x: i32, y: [i32; 2] }
            enum Dir { Up, Down }
            fn main() {
                fn helper(a: &mut i32) -> bool { true }
            }
        "});

        let root = tree.get(ScopeId::ROOT);
        assert!(root.consts.contains_key("N"));
        assert_eq!(root.structs["P"].fields["y"], Ty::array(Ty::i32(), 2));
        assert_eq!(root.enums["Dir"].variants, vec!["Up", "Down"]);
        assert!(root.funcs.contains_key("main"));
        assert!(!root.funcs.contains_key("helper"));

        let main_fn = root.children[0];
        let main_body = tree.get(main_fn).children[0];
        let helper = &tree.get(main_body).funcs["helper"];
        assert_eq!(helper.return_type, Ty::bool());
        assert_eq!(helper.params[0].ty, Ty::reference(true, Ty::i32()));
    }

    #[test]
    fn test_scope_shapes() {
        let tree = collect(indoc! {"
            trait Shape { fn area(&self) -> i32; }
            impl P { fn new() -> P { P {} } }
            fn f() {
                loop { }
                while true { { } }
            }
        "});

        assert_eq!(
            kinds(&tree, ScopeId::ROOT),
            vec![ScopeKind::Trait, ScopeKind::Impl, ScopeKind::Function]
        );

        let f = tree.get(ScopeId::ROOT).children[2];
        assert_eq!(tree.get(f).self_type.as_deref(), Some("f"));
        assert_eq!(kinds(&tree, f), vec![ScopeKind::Block]);

        let body = tree.get(f).children[0];
        assert_eq!(kinds(&tree, body), vec![ScopeKind::Loop, ScopeKind::Loop]);

        let while_loop = tree.get(body).children[1];
        let while_body = tree.get(while_loop).children[0];
        assert_eq!(kinds(&tree, while_body), vec![ScopeKind::Block]);
    }

    #[test]
    fn test_trait_symbol_splits_functions() {
        let tree = collect(indoc! {"
            trait Counter {
                const START: i32;
                fn bump(&mut self);
                fn zero() -> Self;
            }
        "});

        let counter = &tree.get(ScopeId::ROOT).traits["Counter"];
        assert!(counter.consts.contains_key("START"));
        assert_eq!(counter.methods["bump"].method_kind, MethodKind::SelfMutRef);
        assert_eq!(counter.assoc_funcs["zero"].return_type, Ty::named("Self"));
        assert_eq!(counter.function_count(), 2);
    }

    #[test]
    fn test_impl_functions_resolve_self() {
        let tree = collect("impl P { fn new() -> Self { P {} } }");
        let imp = tree.get(ScopeId::ROOT).children[0];

        assert_eq!(tree.get(imp).self_type.as_deref(), Some("P"));
        assert_eq!(tree.get(imp).funcs["new"].return_type, Ty::named("P"));
    }

    #[test]
    fn test_symbolic_length_is_provisional() {
        let tree = collect("const N: usize = 4; struct B { data: [i32; N] }");
        assert_eq!(
            tree.get(ScopeId::ROOT).structs["B"].fields["data"],
            Ty::array(Ty::i32(), 0)
        );
    }

    #[test]
    fn test_scope_of_matches_creation() {
        let source = "fn a() { } fn b() { { } }";
        let tokens = Lexer::new(source, "test.rx").tokenize().unwrap();
        let krate = Parser::new(tokens).parse().unwrap();
        let mut tree = ScopeTree::new();
        SymbolCollector::new(&mut tree).collect(&krate).unwrap();

        for item in &krate.items {
            if let Item::Function(func) = item {
                let scope = tree.scope_of(func.id).unwrap();
                assert_eq!(tree.get(scope).kind, ScopeKind::Function);
                assert_eq!(tree.get(scope).self_type.as_deref(), Some(func.name.as_str()));
            }
        }
    }
}
