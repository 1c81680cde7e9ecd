//! Pass 4: type checking
//!
//! Synthesizes a type for every expression bottom-up and enforces the
//! assignment, mutability and control-flow rules. Scopes are re-entered in
//! exactly the order the collector created them; `let` bindings, parameters
//! and `self` are declared here as variables.

use std::collections::{HashMap, HashSet};

use log::{debug, trace};

use super::const_eval::{array_length, fold, lower_type};
use super::const_value::ConstValue;
use super::error::SemanticError;
use super::scope::{ScopeId, ScopeTree};
use super::symbol::{ArraySymbol, FuncSymbol, VariableSymbol};
use super::types::{can_assign, unify, Ty};
use crate::error::RxResult;
use crate::lexer::Span;
use crate::parser::ast::*;

/// Type of an expression, and whether it denotes a mutable place.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprType {
    pub ty: Ty,
    pub mutable: bool,
}

impl ExprType {
    fn value(ty: Ty) -> Self {
        Self { ty, mutable: false }
    }

    fn place(ty: Ty, mutable: bool) -> Self {
        Self { ty, mutable }
    }

    /// Mutability of a place projected out of this one (field or element).
    fn projected_mutability(&self) -> bool {
        match &self.ty {
            Ty::Reference { mutable, .. } => *mutable,
            _ => self.mutable,
        }
    }
}

pub struct TypeChecker<'t> {
    tree: &'t mut ScopeTree,
    current: ScopeId,
    node_types: HashMap<NodeId, Ty>,
    exit_calls: Vec<Span>,
}

impl<'t> TypeChecker<'t> {
    pub fn new(tree: &'t mut ScopeTree) -> Self {
        Self {
            tree,
            current: ScopeId::ROOT,
            node_types: HashMap::new(),
            exit_calls: Vec::new(),
        }
    }

    /// Check the whole crate; returns the recorded block/loop types and the number of `exit` calls.
    pub fn check(mut self, krate: &Crate) -> RxResult<(HashMap<NodeId, Ty>, usize)> {
        self.tree.reset_all_cursors();
        for item in &krate.items {
            self.check_item(item)?;
        }

        if self.exit_calls.len() > 1 {
            return Err(SemanticError::MultipleExit(self.exit_calls.len()).at(self.exit_calls[1]));
        }

        debug!(
            "type check: {} typed node(s), {} exit call(s)",
            self.node_types.len(),
            self.exit_calls.len()
        );
        let exits = self.exit_calls.len();
        Ok((self.node_types, exits))
    }

    fn enter(&mut self, node: NodeId, span: Span) -> RxResult<ScopeId> {
        let outer = self.current;
        self.current = self.tree.enter(outer, node).map_err(|e| e.at(span))?;
        Ok(outer)
    }

    fn leave(&mut self, outer: ScopeId) {
        self.current = outer;
    }

    fn lower(&self, ty: &TypeExpr) -> RxResult<Ty> {
        lower_type(self.tree, self.current, ty, true)
    }

    fn declare(&mut self, var: VariableSymbol) {
        trace!("let {}: {}", var.name, var.ty);
        self.tree
            .get_mut(self.current)
            .variables
            .insert(var.name.clone(), var);
    }

    // ===== Items =====

    fn check_item(&mut self, item: &Item) -> RxResult<()> {
        match item {
            Item::Function(func) => self.check_function(func),
            Item::Struct(_) | Item::Enum(_) => Ok(()),
            Item::Const(item) => self.check_const(item),
            Item::Trait(def) => {
                let outer = self.enter(def.id, def.span)?;
                self.check_associated(&def.items)?;
                self.leave(outer);
                Ok(())
            }
            Item::Impl(Implementation::Inherent(imp)) => {
                let outer = self.enter(imp.id, imp.span)?;
                self.check_associated(&imp.items)?;
                self.leave(outer);
                Ok(())
            }
            Item::Impl(Implementation::Trait(imp)) => {
                let outer = self.enter(imp.id, imp.span)?;
                self.check_associated(&imp.items)?;
                self.leave(outer);
                Ok(())
            }
        }
    }

    fn check_associated(&mut self, items: &[AssociatedItem]) -> RxResult<()> {
        for item in items {
            match item {
                AssociatedItem::Const(c) => self.check_const(c)?,
                AssociatedItem::Function(f) => self.check_function(f)?,
            }
        }
        Ok(())
    }

    fn check_const(&mut self, item: &ConstItem) -> RxResult<()> {
        let declared = self.lower(&item.ty)?;
        if let Some(value) = &item.value {
            let found = self.expr(value)?.ty;
            if !can_assign(&declared, &found) {
                return Err(SemanticError::Mismatch {
                    context: format!("constant `{}`", item.name),
                    expected: declared,
                    found,
                }
                .at(value.span()));
            }
        }
        Ok(())
    }

    fn check_function(&mut self, func: &Function) -> RxResult<()> {
        let symbol: FuncSymbol = self
            .tree
            .get(self.current)
            .funcs
            .get(&func.name)
            .cloned()
            .ok_or_else(|| SemanticError::UndefinedFunction(func.name.clone()).at(func.span))?;

        let is_main = func.name == "main" && self.current.is_root();
        if is_main && symbol.return_type != Ty::Unit {
            return Err(SemanticError::MainReturnType(symbol.return_type).at(func.span));
        }

        trace!("checking {}", symbol);
        let outer = self.enter(func.id, func.span)?;

        match &func.params.self_param {
            Some(SelfParam::Typed { is_mut, ty, .. }) => {
                let ty = self.lower(ty)?;
                self.declare(VariableSymbol::new("self", ty, *is_mut));
            }
            Some(SelfParam::Shorthand { .. }) => {
                let owner = self.tree.self_type(self.current).unwrap_or("Self").to_string();
                if let Some((ty, is_mut)) = symbol.method_kind.self_binding(&owner) {
                    self.declare(VariableSymbol::new("self", ty, is_mut));
                }
            }
            None => {}
        }
        for param in &symbol.params {
            self.declare(param.clone());
        }

        if let Some(body) = &func.body {
            let found = self.block(body)?;
            if !can_assign(&symbol.return_type, &found) && !self.ends_in_endless_loop(body) {
                return Err(SemanticError::Mismatch {
                    context: format!("body of `{}`", func.name),
                    expected: symbol.return_type,
                    found,
                }
                .at(body.span));
            }
            if is_main && !ends_with_exit(body) {
                return Err(SemanticError::MainMissingExit.at(body.span));
            }
        }

        self.leave(outer);
        Ok(())
    }

    /// The block's final expression is a `loop` that no `break` targets.
    fn ends_in_endless_loop(&self, block: &BlockExpr) -> bool {
        let last = match (&block.tail, block.statements.last()) {
            (Some(tail), _) => Some(tail.as_ref()),
            (None, Some(Statement::Expr { expr, .. })) => Some(expr),
            _ => None,
        };
        match last {
            Some(Expression::Loop { id, .. }) => self
                .tree
                .scope_of(*id)
                .is_some_and(|scope| self.tree.get(scope).break_type.is_none()),
            _ => false,
        }
    }

    // ===== Blocks and statements =====

    fn block(&mut self, block: &BlockExpr) -> RxResult<Ty> {
        let outer = self.enter(block.id, block.span)?;

        let mut last = Ty::Unit;
        for stmt in &block.statements {
            last = self.statement(stmt)?;
        }
        let ty = match &block.tail {
            Some(tail) => self.expr(tail)?.ty,
            None if last.is_never() => Ty::Never,
            None => Ty::Unit,
        };

        self.leave(outer);
        self.node_types.insert(block.id, ty.clone());
        Ok(ty)
    }

    fn statement(&mut self, stmt: &Statement) -> RxResult<Ty> {
        match stmt {
            Statement::Let {
                pattern,
                ty,
                init,
                span,
            } => self.let_statement(pattern, ty.as_ref(), init.as_ref(), *span),
            Statement::Expr { expr, .. } => Ok(self.expr(expr)?.ty),
            Statement::Item(item) => {
                self.check_item(item)?;
                Ok(Ty::Unit)
            }
            Statement::Empty { .. } => Ok(Ty::Unit),
        }
    }

    fn let_statement(
        &mut self,
        pattern: &Pattern,
        annotation: Option<&TypeExpr>,
        init: Option<&Expression>,
        span: Span,
    ) -> RxResult<Ty> {
        let declared = annotation.map(|ty| self.lower(ty)).transpose()?;
        let found = match init {
            Some(init) => Some(self.expr(init)?.ty),
            None => None,
        };

        let binding = match (declared, &found) {
            (Some(declared), Some(found)) => {
                if !can_assign(&declared, found) {
                    return Err(SemanticError::Mismatch {
                        context: "`let` binding".to_string(),
                        expected: declared,
                        found: found.clone(),
                    }
                    .at(span));
                }
                declared
            }
            (Some(declared), None) => declared,
            (None, Some(found)) => found.default_integer(),
            (None, None) => {
                return Err(SemanticError::AnnotationNeeded(pattern_name(pattern).to_string()).at(span))
            }
        };

        self.declare(VariableSymbol::from_pattern(pattern, binding));
        Ok(match found {
            Some(Ty::Never) => Ty::Never,
            _ => Ty::Unit,
        })
    }

    // ===== Expressions =====

    fn expr(&mut self, expr: &Expression) -> RxResult<ExprType> {
        match expr {
            Expression::Int { suffix, .. } => Ok(ExprType::value(match suffix {
                Some(suffix) => Ty::named(suffix),
                None => Ty::IntegerLiteral,
            })),
            Expression::Bool { .. } => Ok(ExprType::value(Ty::bool())),
            Expression::Char { .. } => Ok(ExprType::value(Ty::named("char"))),
            Expression::Str { .. } => Ok(ExprType::value(Ty::named("str"))),
            Expression::Unit { .. } => Ok(ExprType::value(Ty::Unit)),

            Expression::Path { path, span } => self.path(path, *span),

            Expression::Field {
                object,
                field,
                span,
            } => {
                let object = self.expr(object)?;
                let ty = self.field_type(&object.ty, field, *span)?;
                Ok(ExprType::place(ty, object.projected_mutability()))
            }

            Expression::Call { callee, args, span } => self.call(callee, args, *span),

            Expression::MethodCall {
                receiver,
                method,
                args,
                span,
            } => self.method_call(receiver, method, args, *span),

            Expression::Index {
                object,
                index,
                span,
            } => self.index(object, index, *span),

            Expression::StructLit { path, fields, span } => self.struct_literal(path, fields, *span),

            Expression::Array { elements, span } => self.array(elements, *span),

            Expression::Binary {
                left,
                operator,
                right,
                span,
            } => {
                let lhs = self.expr(left)?.ty;
                let rhs = self.expr(right)?.ty;
                Ok(ExprType::value(binary_type(*operator, &lhs, &rhs, *span)?))
            }

            Expression::Unary {
                operator,
                operand,
                span,
            } => {
                let ty = self.expr(operand)?.ty;
                let inner = ty.auto_deref();
                let ok = match operator {
                    UnaryOp::Negate => inner.is_integer(),
                    UnaryOp::Not => inner.is_integer() || inner.is_bool(),
                };
                if !ok && !inner.is_never() {
                    return Err(SemanticError::InvalidUnary {
                        op: operator.to_string(),
                        ty: ty.clone(),
                    }
                    .at(*span));
                }
                Ok(ExprType::value(inner.clone()))
            }

            Expression::Borrow {
                mutable,
                double,
                value,
                span,
            } => {
                let inner = self.expr(value)?;
                if *mutable && is_place(value) && !inner.mutable {
                    return Err(SemanticError::ImmutableBorrow.at(*span));
                }
                let ty = Ty::reference(*mutable, inner.ty);
                Ok(ExprType::value(if *double {
                    Ty::reference(false, ty)
                } else {
                    ty
                }))
            }

            Expression::Deref { value, span } => match self.expr(value)?.ty {
                Ty::Reference { mutable, inner } => Ok(ExprType::place(*inner, mutable)),
                other => Err(SemanticError::DerefNonReference(other).at(*span)),
            },

            Expression::Assign {
                target,
                value,
                span,
            } => {
                let place = self.assignable(target)?;
                let found = self.expr(value)?.ty;
                if !can_assign(&place.ty, &found) {
                    return Err(SemanticError::Mismatch {
                        context: "assignment".to_string(),
                        expected: place.ty,
                        found,
                    }
                    .at(*span));
                }
                Ok(ExprType::value(Ty::Unit))
            }

            Expression::CompoundAssign {
                target,
                operator,
                value,
                span,
            } => {
                let place = self.assignable(target)?;
                let rhs = self.expr(value)?.ty;
                binary_type(*operator, &place.ty, &rhs, *span)?;
                Ok(ExprType::value(Ty::Unit))
            }

            Expression::Cast { value, ty, span } => {
                let from = self.expr(value)?.ty;
                let to = self.lower(ty)?;
                let castable = (from.is_integer() || from.is_bool() || from.is_named("char"))
                    && to.is_integer();
                if !castable && !can_assign(&to, &from) {
                    return Err(SemanticError::InvalidCast { from, to }.at(*span));
                }
                Ok(ExprType::value(to))
            }

            Expression::Grouped { inner, .. } => self.expr(inner),

            Expression::Block(block) => Ok(ExprType::value(self.block(block)?)),

            Expression::If {
                condition,
                then_block,
                else_branch,
                span,
            } => {
                self.condition(condition)?;
                let then_ty = self.block(then_block)?;
                let else_ty = match else_branch {
                    Some(branch) => self.expr(branch)?.ty,
                    None => Ty::Unit,
                };
                unify(&then_ty, &else_ty)
                    .map(ExprType::value)
                    .ok_or_else(|| SemanticError::IncompatibleBranches { then_ty, else_ty }.at(*span))
            }

            Expression::Loop { id, body, span } => {
                let outer = self.enter(*id, *span)?;
                let loop_scope = self.current;
                self.block(body)?;
                self.leave(outer);

                let ty = self.tree.get(loop_scope).break_type.clone().unwrap_or(Ty::Unit);
                self.node_types.insert(*id, ty.clone());
                Ok(ExprType::value(ty))
            }

            Expression::While {
                id,
                condition,
                body,
                span,
            } => {
                let outer = self.enter(*id, *span)?;
                // `break` inside `while` carries no value.
                self.tree.get_mut(self.current).break_type = Some(Ty::Unit);
                self.condition(condition)?;
                self.block(body)?;
                self.leave(outer);

                self.node_types.insert(*id, Ty::Unit);
                Ok(ExprType::value(Ty::Unit))
            }

            Expression::Break { value, span } => {
                let found = match value {
                    Some(value) => self.expr(value)?.ty,
                    None => Ty::Unit,
                };
                let loop_scope = self
                    .tree
                    .enclosing_loop(self.current)
                    .ok_or_else(|| SemanticError::BreakOutsideLoop.at(*span))?;

                let scope = self.tree.get_mut(loop_scope);
                let merged = match &scope.break_type {
                    None => found,
                    Some(expected) => unify(expected, &found).ok_or_else(|| {
                        SemanticError::BreakMismatch {
                            expected: expected.clone(),
                            found,
                        }
                        .at(*span)
                    })?,
                };
                scope.break_type = Some(merged);
                Ok(ExprType::value(Ty::Never))
            }

            Expression::Continue { span } => {
                if self.tree.enclosing_loop(self.current).is_none() {
                    return Err(SemanticError::ContinueOutsideLoop.at(*span));
                }
                Ok(ExprType::value(Ty::Never))
            }

            Expression::Return { value, span } => {
                let found = match value {
                    Some(value) => self.expr(value)?.ty,
                    None => Ty::Unit,
                };
                let expected = self
                    .current_return_type()
                    .ok_or_else(|| SemanticError::ReturnOutsideFunction.at(*span))?;
                if !can_assign(&expected, &found) {
                    return Err(SemanticError::Mismatch {
                        context: "return value".to_string(),
                        expected,
                        found,
                    }
                    .at(*span));
                }
                Ok(ExprType::value(Ty::Never))
            }
        }
    }

    fn condition(&mut self, condition: &Expression) -> RxResult<()> {
        let ty = self.expr(condition)?.ty;
        if can_assign(&Ty::bool(), &ty) {
            Ok(())
        } else {
            Err(SemanticError::Mismatch {
                context: "condition".to_string(),
                expected: Ty::bool(),
                found: ty,
            }
            .at(condition.span()))
        }
    }

    /// Return type of the function enclosing the current scope.
    fn current_return_type(&self) -> Option<Ty> {
        let func_scope = self.tree.enclosing_function(self.current)?;
        let name = self.tree.get(func_scope).self_type.as_deref()?;
        let parent = self.tree.parent(func_scope)?;
        self.tree
            .get(parent)
            .funcs
            .get(name)
            .map(|f| f.return_type.clone())
    }

    fn owner_name(&self, segment: &PathSegment, span: Span) -> RxResult<String> {
        match segment {
            PathSegment::Ident(name) => Ok(name.clone()),
            PathSegment::SelfType => self
                .tree
                .self_type(self.current)
                .map(str::to_string)
                .ok_or_else(|| SemanticError::UndefinedName("Self".into()).at(span)),
            PathSegment::SelfValue => Err(SemanticError::UndefinedName("self".into()).at(span)),
        }
    }

    fn path(&mut self, path: &PathExpr, span: Span) -> RxResult<ExprType> {
        match (&path.first, &path.second) {
            (PathSegment::Ident(name), None) => {
                if let Some(var) = self.tree.find_variable(self.current, name) {
                    return Ok(ExprType::place(var.ty.clone(), var.is_mut));
                }
                if let Some(constant) = self.tree.find_const(self.current, name) {
                    return Ok(ExprType::value(constant.ty.clone()));
                }
                Err(SemanticError::UndefinedVariable(name.clone()).at(span))
            }
            (PathSegment::SelfValue, None) => self
                .tree
                .find_variable(self.current, "self")
                .map(|var| ExprType::place(var.ty.clone(), var.is_mut))
                .ok_or_else(|| SemanticError::UndefinedVariable("self".into()).at(span)),
            (owner, Some(PathSegment::Ident(item))) => {
                let owner = self.owner_name(owner, span)?;
                if let Some(def) = self.tree.find_enum(self.current, &owner) {
                    if def.variants.contains(item) {
                        return Ok(ExprType::value(Ty::Named(owner)));
                    }
                }
                self.tree
                    .find_struct(self.current, &owner)
                    .and_then(|s| s.assoc_consts.get(item))
                    .map(|c| ExprType::value(c.ty.clone()))
                    .ok_or_else(|| {
                        SemanticError::UnknownAssociated {
                            owner,
                            item: item.clone(),
                        }
                        .at(span)
                    })
            }
            _ => Err(SemanticError::UndefinedName(path.to_string()).at(span)),
        }
    }

    fn field_type(&self, object: &Ty, field: &str, span: Span) -> RxResult<Ty> {
        let unknown = || SemanticError::UnknownField {
            ty: object.to_string(),
            field: field.to_string(),
        };
        let name = object.base_name().ok_or_else(|| unknown().at(span))?;
        self.tree
            .find_struct(self.current, name)
            .and_then(|s| s.fields.get(field))
            .cloned()
            .ok_or_else(|| unknown().at(span))
    }

    /// Type-check `target` as the left side of an assignment.
    fn assignable(&mut self, target: &Expression) -> RxResult<ExprType> {
        let place = self.expr(target)?;
        if place.mutable {
            Ok(place)
        } else {
            Err(self.immutable_target(target).at(target.span()))
        }
    }

    fn immutable_target(&self, target: &Expression) -> SemanticError {
        match target {
            Expression::Path { path, .. } => match (&path.first, &path.second) {
                (PathSegment::Ident(name), None) if self.tree.find_variable(self.current, name).is_none() => {
                    SemanticError::AssignToConstant(name.clone())
                }
                (_, None) => SemanticError::ImmutableAssign(path.to_string()),
                _ => SemanticError::InvalidAssignTarget,
            },
            Expression::Field { .. } => SemanticError::ImmutableField,
            Expression::Index { .. } => SemanticError::ImmutableIndex,
            Expression::Deref { .. } => SemanticError::ImmutableDeref,
            Expression::Grouped { inner, .. } => self.immutable_target(inner),
            _ => SemanticError::InvalidAssignTarget,
        }
    }

    fn call(&mut self, callee: &Expression, args: &[Expression], span: Span) -> RxResult<ExprType> {
        let path = match callee {
            Expression::Path { path, .. } => path,
            _ => return Err(SemanticError::NotCallable.at(span)),
        };

        let func = match (&path.first, &path.second) {
            (PathSegment::Ident(name), None) => {
                let func = self
                    .tree
                    .find_func(self.current, name)
                    .cloned()
                    .ok_or_else(|| SemanticError::UndefinedFunction(name.clone()).at(span))?;
                if name == "exit" {
                    self.record_exit(span)?;
                }
                func
            }
            (owner, Some(PathSegment::Ident(item))) => {
                let owner = self.owner_name(owner, span)?;
                let def = self
                    .tree
                    .find_struct(self.current, &owner)
                    .ok_or_else(|| SemanticError::UndefinedStruct(owner.clone()).at(span))?;
                match def.assoc_funcs.get(item) {
                    Some(func) => func.clone(),
                    None if def.methods.contains_key(item) => {
                        return Err(SemanticError::MethodAsFunction(item.clone()).at(span))
                    }
                    None => {
                        return Err(SemanticError::UnknownAssociated {
                            owner,
                            item: item.clone(),
                        }
                        .at(span))
                    }
                }
            }
            _ => return Err(SemanticError::NotCallable.at(span)),
        };

        if func.method_kind.is_method() {
            return Err(SemanticError::MethodAsFunction(func.name.clone()).at(span));
        }
        self.arguments(&func, args, span)?;
        Ok(ExprType::value(func.return_type))
    }

    fn record_exit(&mut self, span: Span) -> RxResult<()> {
        let in_main = self
            .tree
            .enclosing_function(self.current)
            .and_then(|scope| self.tree.get(scope).self_type.as_deref())
            == Some("main");
        if !in_main {
            return Err(SemanticError::ExitOutsideMain.at(span));
        }
        self.exit_calls.push(span);
        Ok(())
    }

    fn method_call(
        &mut self,
        receiver: &Expression,
        method: &str,
        args: &[Expression],
        span: Span,
    ) -> RxResult<ExprType> {
        let recv = self.expr(receiver)?;
        let unknown = || SemanticError::UnknownMethod {
            ty: recv.ty.to_string(),
            method: method.to_string(),
        };

        let owner = recv.ty.base_name().ok_or_else(|| unknown().at(span))?;
        let def = self
            .tree
            .find_struct(self.current, owner)
            .ok_or_else(|| unknown().at(span))?;
        let func = match def.methods.get(method) {
            Some(func) => func.clone(),
            None if def.assoc_funcs.contains_key(method) => {
                return Err(SemanticError::NotAMethod(method.to_string()).at(span))
            }
            None => return Err(unknown().at(span)),
        };

        if func.method_kind.needs_mutable_receiver() && !recv.projected_mutability() {
            return Err(SemanticError::ImmutableReceiver(method.to_string()).at(receiver.span()));
        }

        self.arguments(&func, args, span)?;
        Ok(ExprType::value(func.return_type))
    }

    fn arguments(&mut self, func: &FuncSymbol, args: &[Expression], span: Span) -> RxResult<()> {
        if func.params.len() != args.len() {
            return Err(SemanticError::ArgumentCount {
                name: func.name.clone(),
                expected: func.params.len(),
                found: args.len(),
            }
            .at(span));
        }

        for (index, (param, arg)) in func.params.iter().zip(args).enumerate() {
            let actual = self.expr(arg)?;
            let found = actual.ty;
            // A `mut` binding named directly stands in for a mutable borrow of itself.
            if let Ty::Reference { mutable: true, inner } = &param.ty {
                if is_variable_path(arg) && can_assign(inner, &found) {
                    if actual.mutable {
                        continue;
                    }
                    return Err(SemanticError::ImmutableArgument {
                        name: func.name.clone(),
                        index,
                    }
                    .at(arg.span()));
                }
            }
            if !can_assign(&param.ty, &found) {
                return Err(SemanticError::Mismatch {
                    context: format!("argument {} of `{}`", index, func.name),
                    expected: param.ty.clone(),
                    found,
                }
                .at(arg.span()));
            }
            let wants_mut = matches!(param.ty, Ty::Reference { mutable: true, .. });
            let gives_mut = matches!(found, Ty::Reference { mutable: true, .. } | Ty::Never);
            if wants_mut && !gives_mut {
                return Err(SemanticError::ImmutableArgument {
                    name: func.name.clone(),
                    index,
                }
                .at(arg.span()));
            }
        }
        Ok(())
    }

    fn index(&mut self, object: &Expression, index: &Expression, span: Span) -> RxResult<ExprType> {
        let base = self.expr(object)?;
        let index_ty = self.expr(index)?.ty;

        let index_inner = index_ty.auto_deref();
        if !matches!(index_inner, Ty::IntegerLiteral | Ty::Never) && !index_inner.is_named("usize") {
            return Err(SemanticError::InvalidIndex(index_ty).at(index.span()));
        }

        let array = match base.ty.auto_deref() {
            Ty::Array { elem, len } => ArraySymbol {
                name: describe(object),
                element_type: (**elem).clone(),
                length: Some(*len),
            },
            _ => return Err(SemanticError::NotIndexable(base.ty.clone()).at(span)),
        };

        let constant = match int_literal(index) {
            Some(n) => Some(n),
            None => match fold(self.tree, self.current, index)? {
                Some(ConstValue::Int(n)) => Some(i64::from(n)),
                _ => None,
            },
        };
        if let (Some(n), Some(len)) = (constant, array.length) {
            if usize::try_from(n).map_or(true, |n| n >= len) {
                return Err(SemanticError::IndexOutOfBounds {
                    name: array.name,
                    index: n,
                    len,
                }
                .at(index.span()));
            }
        }

        Ok(ExprType::place(array.element_type, base.projected_mutability()))
    }

    fn struct_literal(&mut self, path: &PathExpr, fields: &[FieldInit], span: Span) -> RxResult<ExprType> {
        let name = match (&path.first, &path.second) {
            (segment, None) => self.owner_name(segment, span)?,
            _ => return Err(SemanticError::NotAStruct(path.to_string()).at(span)),
        };
        let declared = self
            .tree
            .find_struct(self.current, &name)
            .map(|s| s.fields.clone())
            .ok_or_else(|| SemanticError::UndefinedStruct(name.clone()).at(span))?;

        if declared.len() != fields.len() {
            return Err(SemanticError::StructFieldCount {
                name,
                expected: declared.len(),
                found: fields.len(),
            }
            .at(span));
        }

        let mut seen = HashSet::new();
        for init in fields {
            if !seen.insert(init.name.as_str()) {
                return Err(SemanticError::DuplicateField {
                    ty: name,
                    field: init.name.clone(),
                }
                .at(init.span));
            }
            let expected = declared.get(&init.name).cloned().ok_or_else(|| {
                SemanticError::UnknownField {
                    ty: name.clone(),
                    field: init.name.clone(),
                }
                .at(init.span)
            })?;
            let found = self.expr(&init.value)?.ty;
            if !can_assign(&expected, &found) {
                return Err(SemanticError::Mismatch {
                    context: format!("field `{}`", init.name),
                    expected,
                    found,
                }
                .at(init.span));
            }
        }
        if let Some(field) = declared.keys().find(|field| !seen.contains(field.as_str())) {
            return Err(SemanticError::MissingField {
                ty: name,
                field: field.clone(),
            }
            .at(span));
        }
        Ok(ExprType::value(Ty::Named(name)))
    }

    fn array(&mut self, elements: &ArrayElements, span: Span) -> RxResult<ExprType> {
        match elements {
            ArrayElements::List(items) => {
                let mut elem = Ty::Never;
                for item in items {
                    let found = self.expr(item)?.ty;
                    elem = unify(&elem, &found).ok_or_else(|| {
                        SemanticError::Mismatch {
                            context: "array element".to_string(),
                            expected: elem.clone(),
                            found,
                        }
                        .at(item.span())
                    })?;
                }
                Ok(ExprType::value(Ty::array(elem, items.len())))
            }
            ArrayElements::Repeat { value, len } => {
                let elem = self.expr(value)?.ty;
                let len_ty = self.expr(len)?.ty;
                if !len_ty.is_integer() {
                    return Err(SemanticError::Mismatch {
                        context: "array length".to_string(),
                        expected: Ty::usize(),
                        found: len_ty,
                    }
                    .at(span));
                }
                let n = array_length(self.tree, self.current, len)?;
                Ok(ExprType::value(Ty::array(elem, n)))
            }
        }
    }
}

/// Result type of `lhs op rhs`.
fn binary_type(op: BinaryOp, lhs: &Ty, rhs: &Ty, span: Span) -> RxResult<Ty> {
    let (l, r) = (lhs.auto_deref(), rhs.auto_deref());
    if l.is_never() || r.is_never() {
        return Ok(if op.is_comparison() || matches!(op, BinaryOp::And | BinaryOp::Or) {
            Ty::bool()
        } else {
            Ty::Never
        });
    }

    let invalid = || {
        SemanticError::InvalidOperands {
            op: op.to_string(),
            left: lhs.clone(),
            right: rhs.clone(),
        }
        .at(span)
    };
    let integers = || {
        if l.is_integer() && r.is_integer() {
            unify(l, r).ok_or_else(invalid)
        } else {
            Err(invalid())
        }
    };

    match op {
        BinaryOp::Add => match (l, r) {
            (Ty::Named(a), Ty::Named(b)) if a == "str" && b == "str" => Ok(Ty::named("str")),
            (Ty::Named(a), Ty::Named(b)) if a == "String" && b == "str" => Ok(Ty::named("String")),
            _ => integers(),
        },
        BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => integers(),
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
            if l.is_bool() && r.is_bool() {
                Ok(Ty::bool())
            } else {
                integers()
            }
        }
        BinaryOp::Shl | BinaryOp::Shr => {
            if l.is_integer() && r.is_integer() {
                Ok(l.clone())
            } else {
                Err(invalid())
            }
        }
        BinaryOp::Equal
        | BinaryOp::NotEqual
        | BinaryOp::Less
        | BinaryOp::LessEqual
        | BinaryOp::Greater
        | BinaryOp::GreaterEqual => unify(l, r).map(|_| Ty::bool()).ok_or_else(invalid),
        BinaryOp::And | BinaryOp::Or => {
            if l.is_bool() && r.is_bool() {
                Ok(Ty::bool())
            } else {
                Err(invalid())
            }
        }
    }
}

fn pattern_name(pattern: &Pattern) -> &str {
    match pattern {
        Pattern::Identifier { name, .. } => name,
        Pattern::Reference { inner, .. } => pattern_name(inner),
    }
}

/// Expressions that name a memory location.
fn is_place(expr: &Expression) -> bool {
    match expr {
        Expression::Path { .. }
        | Expression::Field { .. }
        | Expression::Index { .. }
        | Expression::Deref { .. } => true,
        Expression::Grouped { inner, .. } => is_place(inner),
        _ => false,
    }
}

/// Integer literal value, including ones too wide to fold as `i32`.
fn int_literal(expr: &Expression) -> Option<i64> {
    match expr {
        Expression::Int { value, .. } => Some(*value),
        Expression::Grouped { inner, .. } => int_literal(inner),
        _ => None,
    }
}

fn is_variable_path(expr: &Expression) -> bool {
    match expr {
        Expression::Path { path, .. } => path.second.is_none(),
        Expression::Grouped { inner, .. } => is_variable_path(inner),
        _ => false,
    }
}

/// Short name of an indexed expression for diagnostics.
fn describe(expr: &Expression) -> String {
    match expr {
        Expression::Path { path, .. } => path.to_string(),
        Expression::Field { object, field, .. } => format!("{}.{}", describe(object), field),
        Expression::Grouped { inner, .. } | Expression::Deref { value: inner, .. } => describe(inner),
        _ => "array".to_string(),
    }
}

/// `main` must finish with a call to `exit`.
fn ends_with_exit(body: &BlockExpr) -> bool {
    match (&body.tail, body.statements.last()) {
        (Some(tail), _) => tail.is_call_to("exit"),
        (None, Some(Statement::Expr { expr, .. })) => expr.is_call_to("exit"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::semantic::{builtins, collector::SymbolCollector, const_eval::ConstEvaluator};
    use crate::semantic::struct_checker::StructChecker;
    use indoc::indoc;

    fn check(source: &str) -> RxResult<(ScopeTree, HashMap<NodeId, Ty>, usize)> {
        let tokens = Lexer::new(source, "test.rx").tokenize().unwrap();
        let krate = Parser::new(tokens).parse().unwrap();
        let mut tree = ScopeTree::new();
        SymbolCollector::new(&mut tree).collect(&krate)?;
        builtins::register(&mut tree);
        ConstEvaluator::new(&mut tree).evaluate(&krate)?;
        StructChecker::new(&mut tree).check(&krate)?;
        let (types, exits) = TypeChecker::new(&mut tree).check(&krate)?;
        Ok((tree, types, exits))
    }

    fn kind_of(source: &str) -> ErrorKind {
        match check(source) {
            Ok(_) => panic!("expected an error for:\n{}", source),
            Err(err) => err.kind,
        }
    }

    #[test]
    fn test_let_integer_defaults_to_i32() {
        let (tree, _, _) = check("fn f() { let x = 5; let y: usize = 7; }").unwrap();
        let body = tree.get(tree.get(ScopeId::ROOT).children[0]).children[0];
        let vars = &tree.get(body).variables;
        assert_eq!(vars["x"].ty, Ty::i32());
        assert_eq!(vars["y"].ty, Ty::usize());
    }

    #[test]
    fn test_let_mismatch() {
        assert_eq!(kind_of("fn f() { let x: bool = 1; }"), ErrorKind::Type);
        assert_eq!(kind_of("fn f() { let x: u32 = 1usize; }"), ErrorKind::Type);
    }

    #[test]
    fn test_loop_break_value_typing() {
        let source = "fn f() -> i32 { let x: i32 = loop { break 5; }; x }";
        let (_, types, _) = check(source).unwrap();
        assert!(types.values().any(|ty| *ty == Ty::IntegerLiteral));

        let source = "fn f() { let x = loop { break 5; break true; }; }";
        assert_eq!(kind_of(source), ErrorKind::Type);
    }

    #[test]
    fn test_endless_loop_body_diverges() {
        check("fn spin() -> i32 { loop { } }").unwrap();
        assert_eq!(kind_of("fn f() -> i32 { loop { break; } }"), ErrorKind::Type);
    }

    #[test]
    fn test_break_and_continue_placement() {
        assert_eq!(kind_of("fn f() { break; }"), ErrorKind::ControlFlow);
        assert_eq!(kind_of("fn f() { continue; }"), ErrorKind::ControlFlow);
        assert_eq!(
            kind_of("fn f() { loop { fn g() { break; } break; } }"),
            ErrorKind::ControlFlow
        );
        check("fn f() { while true { if false { continue; } break; } }").unwrap();
    }

    #[test]
    fn test_field_assignment_mutability() {
        let program = |binding: &str| {
            format!(
                "struct S {{ f: i32 }} fn g() {{ let {} = S {{ f: 0 }}; x.f = 1; }}",
                binding
            )
        };
        assert_eq!(kind_of(&program("x")), ErrorKind::Mutability);
        check(&program("mut x")).unwrap();
    }

    #[test]
    fn test_assignment_targets() {
        assert_eq!(kind_of("fn f() { let x = 1; x = 2; }"), ErrorKind::Mutability);
        assert_eq!(
            kind_of("const C: i32 = 1; fn f() { C = 2; }"),
            ErrorKind::Mutability
        );
        check("fn f(r: &mut i32) { *r = 3; *r += 1; }").unwrap();
        assert_eq!(kind_of("fn f(r: &i32) { *r = 3; }"), ErrorKind::Mutability);
        check("fn f() { let mut a = [0; 3]; a[1] = 4; }").unwrap();
        assert_eq!(kind_of("fn f() { let a = [0; 3]; a[1] = 4; }"), ErrorKind::Mutability);
    }

    #[test]
    fn test_mutable_reference_arguments() {
        let callee = "fn bump(n: &mut i32) { *n += 1; }";
        check(&format!("{} fn f() {{ let mut x = 1; bump(&mut x); }}", callee)).unwrap();
        assert_eq!(
            kind_of(&format!("{} fn f() {{ let x = 1; bump(&mut x); }}", callee)),
            ErrorKind::Mutability
        );
        assert_eq!(
            kind_of(&format!("{} fn f() {{ let mut x = 1; bump(&x); }}", callee)),
            ErrorKind::Mutability
        );
    }

    #[test]
    fn test_mutable_binding_as_argument() {
        let callee = "fn bump(n: &mut i32) { *n += 1; }";
        check(&format!("{} fn f() {{ let mut x = 1; bump(x); }}", callee)).unwrap();
        check(&format!("{} fn f() {{ let mut x = 1; bump((x)); }}", callee)).unwrap();
        assert_eq!(
            kind_of(&format!("{} fn f() {{ let x = 1; bump(x); }}", callee)),
            ErrorKind::Mutability
        );
        assert_eq!(
            kind_of(&format!("{} fn f() {{ let mut x = true; bump(x); }}", callee)),
            ErrorKind::Type
        );
    }

    #[test]
    fn test_method_calls() {
        let source = indoc! {"
            struct C { n: i32 }
            impl C {
                fn new() -> Self { C { n: 0 } }
                fn get(&self) -> i32 { self.n }
                fn inc(&mut self) { self.n += 1; }
            }
            fn f() -> i32 {
                let mut c = C::new();
                c.inc();
                c.get()
            }
        "};
        check(source).unwrap();

        let frozen = source.replace("let mut c", "let c");
        assert_eq!(kind_of(&frozen), ErrorKind::Mutability);

        let as_function = source.replace("c.get()", "C::get()");
        assert_eq!(kind_of(&as_function), ErrorKind::Type);

        let missing = source.replace("c.get()", "c.size()");
        assert_eq!(kind_of(&missing), ErrorKind::Name);
    }

    #[test]
    fn test_builtin_methods() {
        check(indoc! {r#"
            fn f() -> usize {
                let s: String = String::from("hi");
                let t: &str = s.as_str();
                let n: u32 = 4;
                let text: String = n.to_string();
                t.len() + text.len()
            }
        "#})
        .unwrap();
    }

    #[test]
    fn test_call_arity() {
        assert_eq!(
            kind_of("fn add(a: i32, b: i32) -> i32 { a + b } fn f() { add(1); }"),
            ErrorKind::Arity
        );
        assert_eq!(kind_of("fn f() { nothing(); }"), ErrorKind::Name);
    }

    #[test]
    fn test_operators() {
        check("fn f() -> bool { let a = 1 + 2 * 3; let b = a << 2; b > 4 && !false }").unwrap();
        assert_eq!(kind_of("fn f() { let a = true + 1; }"), ErrorKind::Type);
        assert_eq!(kind_of("fn f() { let a = 1u32 + 1usize; }"), ErrorKind::Type);
        assert_eq!(kind_of("fn f() { let a = -true; }"), ErrorKind::Type);
        check("fn f() -> i32 { let c = 'a'; c as i32 + true as i32 }").unwrap();
        assert_eq!(kind_of("fn f() { let a = true as char; }"), ErrorKind::Type);
    }

    #[test]
    fn test_if_branches() {
        check("fn f(c: bool) -> i32 { if c { 1 } else { 2 } }").unwrap();
        check("fn f(c: bool) -> i32 { if c { return 1; } else { 2 } }").unwrap();
        assert_eq!(
            kind_of("fn f(c: bool) -> i32 { if c { 1 } else { true } }"),
            ErrorKind::Type
        );
        assert_eq!(kind_of("fn f() { if 1 { } }"), ErrorKind::Type);
    }

    #[test]
    fn test_arrays_and_indexing() {
        check(indoc! {"
            const N: usize = 3;
            fn f() -> i32 {
                let a: [i32; N] = [1, 2, 3];
                let i: usize = 1;
                a[i] + a[2]
            }
        "})
        .unwrap();

        assert_eq!(
            kind_of("fn f() { let a: [i32; 2] = [1, 2, 3]; }"),
            ErrorKind::Type
        );
        assert_eq!(kind_of("fn f() { let a = [1, 2]; let b = a[5]; }"), ErrorKind::Type);
        assert_eq!(
            kind_of("fn f() { let a = [1, 2]; let b = a[3000000000]; }"),
            ErrorKind::Type
        );
        assert_eq!(
            kind_of("fn f() { let a = [1, 2]; let i: i32 = 0; let b = a[i]; }"),
            ErrorKind::Type
        );
    }

    #[test]
    fn test_struct_literals() {
        let decl = "struct P { x: i32, y: i32 }";
        check(&format!("{} fn f() -> P {{ P {{ x: 1, y: 2 }} }}", decl)).unwrap();
        assert_eq!(
            kind_of(&format!("{} fn f() -> P {{ P {{ x: 1 }} }}", decl)),
            ErrorKind::Arity
        );
        assert_eq!(
            kind_of(&format!("{} fn f() -> P {{ P {{ x: 1, y: true }} }}", decl)),
            ErrorKind::Type
        );
    }

    #[test]
    fn test_struct_literal_field_set() {
        let decl = "struct P { x: i32, y: i32 }";
        let err = check(&format!("{} fn f() -> P {{ P {{ x: 1, x: 2 }} }}", decl))
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::Arity);
        assert!(err.message.contains("more than once"));

        check(&format!("{} fn f() -> P {{ P {{ y: 2, x: 1 }} }}", decl)).unwrap();
        assert_eq!(
            kind_of(&format!("{} fn f() -> P {{ P {{ x: 1, z: 2 }} }}", decl)),
            ErrorKind::Name
        );
    }

    #[test]
    fn test_return_checks() {
        check("fn f() -> i32 { return 3; }").unwrap();
        assert_eq!(kind_of("fn f() -> i32 { return true; }"), ErrorKind::Type);
        assert_eq!(kind_of("const C: i32 = return 1;"), ErrorKind::ControlFlow);
    }

    #[test]
    fn test_exit_rules() {
        let (_, _, exits) = check("fn main() { exit(0); }").unwrap();
        assert_eq!(exits, 1);

        check("fn helper() -> i32 { 1 }").unwrap();
        assert_eq!(kind_of("fn main() { printInt(1); }"), ErrorKind::ControlFlow);
        assert_eq!(kind_of("fn main() -> i32 { exit(0); 1 }"), ErrorKind::ControlFlow);
        assert_eq!(
            kind_of("fn stop() { exit(1); } fn main() { exit(0); }"),
            ErrorKind::ControlFlow
        );
        assert_eq!(
            kind_of("fn main() { if true { exit(1); } exit(0); }"),
            ErrorKind::ControlFlow
        );
    }

    #[test]
    fn test_self_and_enum_paths() {
        check(indoc! {"
            enum Mode { Fast, Slow }
            struct Car { speed: i32 }
            impl Car {
                const LIMIT: i32 = 100;
                fn mode(&self) -> Mode { if self.speed > Self::LIMIT { Mode::Fast } else { Mode::Slow } }
                fn stopped() -> Self { Self { speed: 0 } }
            }
        "})
        .unwrap();
    }
}
