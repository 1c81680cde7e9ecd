//! Shared AST traversal for the analysis passes
//!
//! Every `walk_*` function visits children in source order and brackets each
//! scope-introducing node with [`Visitor::enter_scope`] / [`Visitor::leave_scope`].
//! The collector creates scopes in that order, so any pass built on these
//! walkers re-enters them in the same order. Array-length expressions inside
//! type annotations are never walked.

use super::scope::{ScopeId, ScopeKind};
use crate::error::RxResult;
use crate::lexer::Span;
use crate::parser::ast::*;

pub trait Visitor: Sized {
    /// Make the scope of `node` current; returns the scope that was current before.
    fn enter_scope(
        &mut self,
        node: NodeId,
        kind: ScopeKind,
        self_type: Option<&str>,
        span: Span,
    ) -> RxResult<ScopeId>;

    /// Restore the scope returned by the matching `enter_scope`.
    fn leave_scope(&mut self, outer: ScopeId);

    fn visit_item(&mut self, item: &Item) -> RxResult<()> {
        walk_item(self, item)
    }

    fn visit_function(&mut self, func: &Function) -> RxResult<()> {
        walk_function(self, func)
    }

    fn visit_struct(&mut self, def: &StructDef) -> RxResult<()> {
        walk_struct(self, def)
    }

    fn visit_enum(&mut self, _def: &EnumDef) -> RxResult<()> {
        Ok(())
    }

    fn visit_const(&mut self, item: &ConstItem) -> RxResult<()> {
        walk_const(self, item)
    }

    fn visit_trait(&mut self, def: &TraitDef) -> RxResult<()> {
        walk_trait(self, def)
    }

    fn visit_impl(&mut self, imp: &Implementation) -> RxResult<()> {
        walk_impl(self, imp)
    }

    fn visit_block(&mut self, block: &BlockExpr) -> RxResult<()> {
        walk_block(self, block)
    }

    fn visit_statement(&mut self, stmt: &Statement) -> RxResult<()> {
        walk_statement(self, stmt)
    }

    fn visit_expr(&mut self, expr: &Expression) -> RxResult<()> {
        walk_expr(self, expr)
    }

    fn visit_type(&mut self, _ty: &TypeExpr) -> RxResult<()> {
        Ok(())
    }
}

pub fn walk_crate<V: Visitor>(visitor: &mut V, krate: &Crate) -> RxResult<()> {
    for item in &krate.items {
        visitor.visit_item(item)?;
    }
    Ok(())
}

pub fn walk_item<V: Visitor>(visitor: &mut V, item: &Item) -> RxResult<()> {
    match item {
        Item::Function(func) => visitor.visit_function(func),
        Item::Struct(def) => visitor.visit_struct(def),
        Item::Enum(def) => visitor.visit_enum(def),
        Item::Const(item) => visitor.visit_const(item),
        Item::Trait(def) => visitor.visit_trait(def),
        Item::Impl(imp) => visitor.visit_impl(imp),
    }
}

pub fn walk_function<V: Visitor>(visitor: &mut V, func: &Function) -> RxResult<()> {
    let outer = visitor.enter_scope(func.id, ScopeKind::Function, Some(&func.name), func.span)?;

    if let Some(SelfParam::Typed { ty, .. }) = &func.params.self_param {
        visitor.visit_type(ty)?;
    }
    for param in &func.params.params {
        visitor.visit_type(&param.ty)?;
    }
    if let Some(ty) = &func.return_type {
        visitor.visit_type(ty)?;
    }
    if let Some(body) = &func.body {
        visitor.visit_block(body)?;
    }

    visitor.leave_scope(outer);
    Ok(())
}

pub fn walk_struct<V: Visitor>(visitor: &mut V, def: &StructDef) -> RxResult<()> {
    for field in &def.fields {
        visitor.visit_type(&field.ty)?;
    }
    Ok(())
}

pub fn walk_const<V: Visitor>(visitor: &mut V, item: &ConstItem) -> RxResult<()> {
    visitor.visit_type(&item.ty)?;
    if let Some(value) = &item.value {
        visitor.visit_expr(value)?;
    }
    Ok(())
}

fn walk_associated_items<V: Visitor>(visitor: &mut V, items: &[AssociatedItem]) -> RxResult<()> {
    for item in items {
        match item {
            AssociatedItem::Const(c) => visitor.visit_const(c)?,
            AssociatedItem::Function(f) => visitor.visit_function(f)?,
        }
    }
    Ok(())
}

pub fn walk_trait<V: Visitor>(visitor: &mut V, def: &TraitDef) -> RxResult<()> {
    let outer = visitor.enter_scope(def.id, ScopeKind::Trait, Some(&def.name), def.span)?;
    walk_associated_items(visitor, &def.items)?;
    visitor.leave_scope(outer);
    Ok(())
}

pub fn walk_impl<V: Visitor>(visitor: &mut V, imp: &Implementation) -> RxResult<()> {
    let (id, self_ty, items, span) = match imp {
        Implementation::Inherent(i) => (i.id, &i.self_ty, &i.items, i.span),
        Implementation::Trait(t) => (t.id, &t.self_ty, &t.items, t.span),
    };

    let outer = visitor.enter_scope(id, ScopeKind::Impl, Some(self_ty), span)?;
    walk_associated_items(visitor, items)?;
    visitor.leave_scope(outer);
    Ok(())
}

pub fn walk_block<V: Visitor>(visitor: &mut V, block: &BlockExpr) -> RxResult<()> {
    let outer = visitor.enter_scope(block.id, ScopeKind::Block, None, block.span)?;

    for stmt in &block.statements {
        visitor.visit_statement(stmt)?;
    }
    if let Some(tail) = &block.tail {
        visitor.visit_expr(tail)?;
    }

    visitor.leave_scope(outer);
    Ok(())
}

pub fn walk_statement<V: Visitor>(visitor: &mut V, stmt: &Statement) -> RxResult<()> {
    match stmt {
        Statement::Let { ty, init, .. } => {
            if let Some(ty) = ty {
                visitor.visit_type(ty)?;
            }
            if let Some(init) = init {
                visitor.visit_expr(init)?;
            }
            Ok(())
        }
        Statement::Expr { expr, .. } => visitor.visit_expr(expr),
        Statement::Item(item) => visitor.visit_item(item),
        Statement::Empty { .. } => Ok(()),
    }
}

pub fn walk_expr<V: Visitor>(visitor: &mut V, expr: &Expression) -> RxResult<()> {
    match expr {
        Expression::Int { .. }
        | Expression::Bool { .. }
        | Expression::Char { .. }
        | Expression::Str { .. }
        | Expression::Unit { .. }
        | Expression::Path { .. }
        | Expression::Continue { .. } => Ok(()),

        Expression::Field { object, .. } => visitor.visit_expr(object),
        Expression::Call { callee, args, .. } => {
            visitor.visit_expr(callee)?;
            args.iter().try_for_each(|arg| visitor.visit_expr(arg))
        }
        Expression::MethodCall { receiver, args, .. } => {
            visitor.visit_expr(receiver)?;
            args.iter().try_for_each(|arg| visitor.visit_expr(arg))
        }
        Expression::Index { object, index, .. } => {
            visitor.visit_expr(object)?;
            visitor.visit_expr(index)
        }
        Expression::StructLit { fields, .. } => fields
            .iter()
            .try_for_each(|field| visitor.visit_expr(&field.value)),
        Expression::Array { elements, .. } => match elements {
            ArrayElements::List(items) => items.iter().try_for_each(|item| visitor.visit_expr(item)),
            ArrayElements::Repeat { value, len } => {
                visitor.visit_expr(value)?;
                visitor.visit_expr(len)
            }
        },
        Expression::Binary { left, right, .. } => {
            visitor.visit_expr(left)?;
            visitor.visit_expr(right)
        }
        Expression::Unary { operand, .. } => visitor.visit_expr(operand),
        Expression::Borrow { value, .. } | Expression::Deref { value, .. } => {
            visitor.visit_expr(value)
        }
        Expression::Assign { target, value, .. }
        | Expression::CompoundAssign { target, value, .. } => {
            visitor.visit_expr(target)?;
            visitor.visit_expr(value)
        }
        Expression::Cast { value, ty, .. } => {
            visitor.visit_expr(value)?;
            visitor.visit_type(ty)
        }
        Expression::Grouped { inner, .. } => visitor.visit_expr(inner),
        Expression::Block(block) => visitor.visit_block(block),
        Expression::If {
            condition,
            then_block,
            else_branch,
            ..
        } => {
            visitor.visit_expr(condition)?;
            visitor.visit_block(then_block)?;
            match else_branch {
                Some(else_branch) => visitor.visit_expr(else_branch),
                None => Ok(()),
            }
        }
        Expression::Loop { id, body, span } => {
            let outer = visitor.enter_scope(*id, ScopeKind::Loop, None, *span)?;
            visitor.visit_block(body)?;
            visitor.leave_scope(outer);
            Ok(())
        }
        Expression::While {
            id,
            condition,
            body,
            span,
        } => {
            let outer = visitor.enter_scope(*id, ScopeKind::Loop, None, *span)?;
            visitor.visit_expr(condition)?;
            visitor.visit_block(body)?;
            visitor.leave_scope(outer);
            Ok(())
        }
        Expression::Break { value, .. } | Expression::Return { value, .. } => match value {
            Some(value) => visitor.visit_expr(value),
            None => Ok(()),
        },
    }
}
