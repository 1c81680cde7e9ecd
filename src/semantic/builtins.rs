//! Builtin functions and primitive methods
//!
//! Registered into the global scope before constant evaluation, so user
//! programs can call them like ordinary items.

use lazy_static::lazy_static;

use super::scope::{ScopeId, ScopeTree};
use super::symbol::{FuncSymbol, MethodKind, StructSymbol, VariableSymbol};
use super::types::Ty;

fn str_ref() -> Ty {
    Ty::reference(false, Ty::named("str"))
}

fn builtin(name: &str, kind: MethodKind, params: Vec<(&str, Ty)>, ret: Ty) -> FuncSymbol {
    FuncSymbol {
        name: name.to_string(),
        return_type: ret,
        is_const: false,
        method_kind: kind,
        params: params
            .into_iter()
            .map(|(n, ty)| VariableSymbol::new(n, ty, false))
            .collect(),
    }
}

lazy_static! {
    /// Free functions available everywhere
    pub static ref BUILTIN_FUNCTIONS: Vec<FuncSymbol> = vec![
        builtin("print", MethodKind::NotMethod, vec![("s", str_ref())], Ty::Unit),
        builtin("println", MethodKind::NotMethod, vec![("s", str_ref())], Ty::Unit),
        builtin("printInt", MethodKind::NotMethod, vec![("n", Ty::i32())], Ty::Unit),
        builtin("printlnInt", MethodKind::NotMethod, vec![("n", Ty::i32())], Ty::Unit),
        builtin("getString", MethodKind::NotMethod, vec![], Ty::named("String")),
        builtin("getInt", MethodKind::NotMethod, vec![], Ty::i32()),
        builtin("exit", MethodKind::NotMethod, vec![("code", Ty::i32())], Ty::Unit),
    ];

    /// Primitive-like types that carry methods
    pub static ref BUILTIN_STRUCTS: Vec<StructSymbol> = {
        let to_string = builtin("to_string", MethodKind::SelfRef, vec![], Ty::named("String"));
        let len = builtin("len", MethodKind::SelfRef, vec![], Ty::usize());

        let mut u32_ty = StructSymbol::new("u32");
        u32_ty.add_function(to_string.clone());

        let mut usize_ty = StructSymbol::new("usize");
        usize_ty.add_function(to_string);

        let mut string = StructSymbol::new("String");
        string.add_function(builtin("as_str", MethodKind::SelfRef, vec![], str_ref()));
        string.add_function(len.clone());
        string.add_function(builtin(
            "from",
            MethodKind::NotMethod,
            vec![("s", str_ref())],
            Ty::named("String"),
        ));

        let mut str_ty = StructSymbol::new("str");
        str_ty.add_function(len);

        vec![u32_ty, usize_ty, string, str_ty]
    };
}

/// Add every builtin to the global scope. User items with the same name win.
pub fn register(tree: &mut ScopeTree) {
    let root = tree.get_mut(ScopeId::ROOT);

    for func in BUILTIN_FUNCTIONS.iter() {
        if !root.funcs.contains_key(&func.name) {
            root.funcs.insert(func.name.clone(), func.clone());
        }
    }
    for def in BUILTIN_STRUCTS.iter() {
        if !root.structs.contains_key(&def.name) {
            root.structs.insert(def.name.clone(), def.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_builtins() {
        let mut tree = ScopeTree::new();
        register(&mut tree);

        let root = tree.get(ScopeId::ROOT);
        assert_eq!(root.funcs["exit"].params[0].ty, Ty::i32());
        assert_eq!(root.funcs["getString"].return_type, Ty::named("String"));
        assert!(root.structs["String"].methods.contains_key("as_str"));
        assert!(root.structs["String"].assoc_funcs.contains_key("from"));
        assert_eq!(root.structs["str"].methods["len"].return_type, Ty::usize());
    }

    #[test]
    fn test_user_items_are_not_replaced() {
        let mut tree = ScopeTree::new();
        tree.get_mut(ScopeId::ROOT).funcs.insert(
            "print".into(),
            builtin("print", MethodKind::NotMethod, vec![], Ty::i32()),
        );
        register(&mut tree);

        assert_eq!(tree.get(ScopeId::ROOT).funcs["print"].return_type, Ty::i32());
    }
}
