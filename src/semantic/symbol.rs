//! Symbols registered in scopes

use indexmap::IndexMap;
use std::fmt;

use super::const_value::ConstValue;
use super::types::Ty;
use crate::parser::ast::{Pattern, SelfParam};

/// How a function receives `self`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    NotMethod,
    SelfByValue,
    SelfRef,
    SelfMutRef,
    SelfMutValue,
}

impl MethodKind {
    pub fn from_self_param(param: Option<&SelfParam>) -> MethodKind {
        match param {
            None => MethodKind::NotMethod,
            Some(SelfParam::Shorthand {
                is_ref: true,
                is_mut: true,
                ..
            }) => MethodKind::SelfMutRef,
            Some(SelfParam::Shorthand { is_ref: true, .. }) => MethodKind::SelfRef,
            Some(SelfParam::Shorthand { is_mut: true, .. }) => MethodKind::SelfMutValue,
            Some(SelfParam::Shorthand { .. }) => MethodKind::SelfByValue,
            Some(SelfParam::Typed { is_mut: true, .. }) => MethodKind::SelfMutValue,
            Some(SelfParam::Typed { .. }) => MethodKind::SelfByValue,
        }
    }

    pub fn is_method(&self) -> bool {
        *self != MethodKind::NotMethod
    }

    /// Calling the method requires a mutable receiver place.
    pub fn needs_mutable_receiver(&self) -> bool {
        matches!(self, MethodKind::SelfMutRef | MethodKind::SelfMutValue)
    }

    /// Type and mutability of the `self` binding inside the body.
    pub fn self_binding(&self, owner: &str) -> Option<(Ty, bool)> {
        let owner = Ty::named(owner);
        match self {
            MethodKind::NotMethod => None,
            MethodKind::SelfByValue => Some((owner, false)),
            MethodKind::SelfMutValue => Some((owner, true)),
            MethodKind::SelfRef => Some((Ty::reference(false, owner), false)),
            MethodKind::SelfMutRef => Some((Ty::reference(true, owner), false)),
        }
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MethodKind::NotMethod => "no self",
            MethodKind::SelfByValue => "self",
            MethodKind::SelfRef => "&self",
            MethodKind::SelfMutRef => "&mut self",
            MethodKind::SelfMutValue => "mut self",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstSymbol {
    pub name: String,
    pub ty: Ty,
    pub value: Option<ConstValue>,
}

/// A named binding: function parameter, `let` variable or `self`
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSymbol {
    pub name: String,
    pub ty: Ty,
    pub is_ref: bool,
    pub is_mut: bool,
}

impl VariableSymbol {
    pub fn new(name: &str, ty: Ty, is_mut: bool) -> Self {
        Self {
            name: name.to_string(),
            ty,
            is_ref: false,
            is_mut,
        }
    }

    /// Binding introduced by `pattern` matched against a value of type `ty`.
    ///
    /// `&x` strips one reference from `ty`; `ref x` adds one.
    pub fn from_pattern(pattern: &Pattern, ty: Ty) -> Self {
        match pattern {
            Pattern::Identifier {
                name,
                is_ref,
                is_mut,
                ..
            } => Self {
                name: name.clone(),
                ty: if *is_ref { Ty::reference(*is_mut, ty) } else { ty },
                is_ref: *is_ref,
                is_mut: *is_mut && !*is_ref,
            },
            Pattern::Reference { inner, .. } => Self::from_pattern(inner, ty.auto_deref().clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructSymbol {
    pub name: String,
    pub fields: IndexMap<String, Ty>,
    pub assoc_consts: IndexMap<String, ConstSymbol>,
    pub methods: IndexMap<String, FuncSymbol>,
    pub assoc_funcs: IndexMap<String, FuncSymbol>,
}

impl StructSymbol {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: IndexMap::new(),
            assoc_consts: IndexMap::new(),
            methods: IndexMap::new(),
            assoc_funcs: IndexMap::new(),
        }
    }

    /// Methods and associated functions live in disjoint maps.
    pub fn add_function(&mut self, func: FuncSymbol) {
        if func.method_kind.is_method() {
            self.methods.insert(func.name.clone(), func);
        } else {
            self.assoc_funcs.insert(func.name.clone(), func);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumSymbol {
    pub name: String,
    pub variants: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncSymbol {
    pub name: String,
    pub return_type: Ty,
    pub is_const: bool,
    pub method_kind: MethodKind,
    pub params: Vec<VariableSymbol>,
}

impl fmt::Display for FuncSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_const {
            write!(f, "const ")?;
        }
        write!(f, "fn {}(", self.name)?;
        let mut first = true;
        if self.method_kind.is_method() {
            write!(f, "{}", self.method_kind)?;
            first = false;
        }
        for param in &self.params {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", param.name, param.ty)?;
            first = false;
        }
        write!(f, ") -> {}", self.return_type)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraitSymbol {
    pub name: String,
    pub consts: IndexMap<String, ConstSymbol>,
    pub methods: IndexMap<String, FuncSymbol>,
    pub assoc_funcs: IndexMap<String, FuncSymbol>,
}

impl TraitSymbol {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            consts: IndexMap::new(),
            methods: IndexMap::new(),
            assoc_funcs: IndexMap::new(),
        }
    }

    pub fn function_count(&self) -> usize {
        self.methods.len() + self.assoc_funcs.len()
    }

    /// Trait functions in declaration order, methods first.
    pub fn functions(&self) -> impl Iterator<Item = &FuncSymbol> {
        self.methods.values().chain(self.assoc_funcs.values())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArraySymbol {
    pub name: String,
    pub element_type: Ty,
    pub length: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Span;

    fn shorthand(is_ref: bool, is_mut: bool) -> SelfParam {
        SelfParam::Shorthand {
            is_ref,
            is_mut,
            span: Span::default(),
        }
    }

    #[test]
    fn test_method_kind_from_self_param() {
        assert_eq!(MethodKind::from_self_param(None), MethodKind::NotMethod);
        assert_eq!(
            MethodKind::from_self_param(Some(&shorthand(true, true))),
            MethodKind::SelfMutRef
        );
        assert_eq!(
            MethodKind::from_self_param(Some(&shorthand(true, false))),
            MethodKind::SelfRef
        );
        assert_eq!(
            MethodKind::from_self_param(Some(&shorthand(false, true))),
            MethodKind::SelfMutValue
        );
        assert_eq!(
            MethodKind::from_self_param(Some(&shorthand(false, false))),
            MethodKind::SelfByValue
        );
    }

    #[test]
    fn test_struct_splits_methods_from_assoc_funcs() {
        let mut sym = StructSymbol::new("P");
        sym.add_function(FuncSymbol {
            name: "len".into(),
            return_type: Ty::usize(),
            is_const: false,
            method_kind: MethodKind::SelfRef,
            params: vec![],
        });
        sym.add_function(FuncSymbol {
            name: "new".into(),
            return_type: Ty::named("P"),
            is_const: false,
            method_kind: MethodKind::NotMethod,
            params: vec![],
        });

        assert!(sym.methods.contains_key("len"));
        assert!(sym.assoc_funcs.contains_key("new"));
        assert!(!sym.methods.contains_key("new"));
    }

    #[test]
    fn test_reference_pattern_strips_one_layer() {
        let pattern = Pattern::Reference {
            is_mut: false,
            inner: Box::new(Pattern::Identifier {
                name: "x".into(),
                is_ref: false,
                is_mut: true,
                span: Span::default(),
            }),
            span: Span::default(),
        };
        let var = VariableSymbol::from_pattern(&pattern, Ty::reference(false, Ty::i32()));

        assert_eq!(var.name, "x");
        assert_eq!(var.ty, Ty::i32());
        assert!(var.is_mut);
    }

    #[test]
    fn test_func_display() {
        let func = FuncSymbol {
            name: "push".into(),
            return_type: Ty::Unit,
            is_const: false,
            method_kind: MethodKind::SelfMutRef,
            params: vec![VariableSymbol::new("v", Ty::i32(), false)],
        };
        assert_eq!(func.to_string(), "fn push(&mut self, v: i32) -> ()");
    }
}
