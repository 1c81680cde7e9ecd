//! Rx Parser
//!
//! Recursive descent for items and statements, precedence climbing for
//! expressions. Every scope-introducing node receives a fresh [`NodeId`]
//! in source order.

pub mod ast;

pub use ast::*;

use crate::error::{RxError, RxResult, SourceLocation};
use crate::lexer::{Span, Token, TokenKind};

/// Parser for Rx source code
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    next_id: u32,
    /// Set while parsing `if`/`while` conditions, where `Name {` opens the body.
    no_struct_literal: bool,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            next_id: 0,
            no_struct_literal: false,
        }
    }

    /// Parse the token stream into an AST
    pub fn parse(&mut self) -> RxResult<Crate> {
        let mut items = Vec::new();

        while !self.is_at_end() {
            items.push(self.parse_item()?);
        }

        Ok(Crate { items })
    }

    fn fresh_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    // ===== Item Parsing =====

    fn is_item_start(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Fn
                | TokenKind::Const
                | TokenKind::Struct
                | TokenKind::Enum
                | TokenKind::Trait
                | TokenKind::Impl
        )
    }

    fn parse_item(&mut self) -> RxResult<Item> {
        match self.peek().kind {
            TokenKind::Fn => Ok(Item::Function(self.parse_function(false)?)),
            TokenKind::Const if self.peek_at(1).kind == TokenKind::Fn => {
                Ok(Item::Function(self.parse_function(false)?))
            }
            TokenKind::Const => Ok(Item::Const(self.parse_const()?)),
            TokenKind::Struct => Ok(Item::Struct(self.parse_struct()?)),
            TokenKind::Enum => Ok(Item::Enum(self.parse_enum()?)),
            TokenKind::Trait => Ok(Item::Trait(self.parse_trait()?)),
            TokenKind::Impl => Ok(Item::Impl(self.parse_impl()?)),
            _ => Err(self.error("Expected item (fn, const, struct, enum, trait or impl)")),
        }
    }

    // [const] fn name(params) [-> Type] { body }
    // Inside a trait the body may be replaced by `;`.
    fn parse_function(&mut self, allow_signature: bool) -> RxResult<Function> {
        let start_span = self.peek().span;
        let is_const = if self.check(&TokenKind::Const) {
            self.advance();
            true
        } else {
            false
        };
        self.expect(&TokenKind::Fn, "Expected 'fn'")?;

        let id = self.fresh_id();
        let name = self.expect_identifier("Expected function name after 'fn'")?;

        self.expect(&TokenKind::LeftParen, "Expected '(' after function name")?;
        let params = self.parse_parameters()?;
        self.expect(&TokenKind::RightParen, "Expected ')' after parameters")?;

        let return_type = if self.check(&TokenKind::Arrow) {
            self.advance();
            Some(self.parse_type()?)
        } else {
            None
        };

        let body = if self.check(&TokenKind::LeftBrace) {
            Some(self.parse_block()?)
        } else if allow_signature {
            self.expect(&TokenKind::Semicolon, "Expected ';' or '{' after signature")?;
            None
        } else {
            return Err(self.error("Expected '{' to start function body"));
        };

        Ok(Function {
            id,
            is_const,
            name,
            params,
            return_type,
            body,
            span: start_span.to(self.previous().span),
        })
    }

    fn parse_parameters(&mut self) -> RxResult<FunctionParameters> {
        let mut parameters = FunctionParameters::default();

        if self.check(&TokenKind::RightParen) {
            return Ok(parameters);
        }

        parameters.self_param = self.parse_self_param()?;
        if parameters.self_param.is_some() {
            if !self.check(&TokenKind::Comma) {
                return Ok(parameters);
            }
            self.advance();
        }

        while !self.check(&TokenKind::RightParen) && !self.is_at_end() {
            let start = self.peek().span;
            let pattern = self.parse_pattern()?;
            self.expect(&TokenKind::Colon, "Expected ':' after parameter pattern")?;
            let ty = self.parse_type()?;

            parameters.params.push(FunctionParam {
                pattern,
                ty,
                span: start.to(self.previous().span),
            });

            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }

        Ok(parameters)
    }

    /// `self`, `mut self`, `&self`, `&mut self`, `[mut] self: Type`
    fn parse_self_param(&mut self) -> RxResult<Option<SelfParam>> {
        let start = self.peek().span;
        let kinds = (
            self.peek().kind.clone(),
            self.peek_at(1).kind.clone(),
            self.peek_at(2).kind.clone(),
        );

        let (is_ref, is_mut, consumed) = match kinds {
            (TokenKind::Ampersand, TokenKind::SelfValue, _) => (true, false, 2),
            (TokenKind::Ampersand, TokenKind::Mut, TokenKind::SelfValue) => (true, true, 3),
            (TokenKind::Mut, TokenKind::SelfValue, _) => (false, true, 2),
            (TokenKind::SelfValue, _, _) => (false, false, 1),
            _ => return Ok(None),
        };
        for _ in 0..consumed {
            self.advance();
        }

        if !is_ref && self.check(&TokenKind::Colon) {
            self.advance();
            let ty = self.parse_type()?;
            return Ok(Some(SelfParam::Typed {
                is_mut,
                ty,
                span: start.to(self.previous().span),
            }));
        }

        Ok(Some(SelfParam::Shorthand {
            is_ref,
            is_mut,
            span: start.to(self.previous().span),
        }))
    }

    fn parse_pattern(&mut self) -> RxResult<Pattern> {
        let start = self.peek().span;

        if self.check(&TokenKind::Ampersand) {
            self.advance();
            let is_mut = if self.check(&TokenKind::Mut) {
                self.advance();
                true
            } else {
                false
            };
            let inner = self.parse_pattern()?;
            return Ok(Pattern::Reference {
                is_mut,
                inner: Box::new(inner),
                span: start.to(self.previous().span),
            });
        }

        let is_ref = if self.check(&TokenKind::Ref) {
            self.advance();
            true
        } else {
            false
        };
        let is_mut = if self.check(&TokenKind::Mut) {
            self.advance();
            true
        } else {
            false
        };
        let name = self.expect_identifier("Expected identifier in pattern")?;

        Ok(Pattern::Identifier {
            name,
            is_ref,
            is_mut,
            span: start.to(self.previous().span),
        })
    }

    // const NAME: Type [= value];
    fn parse_const(&mut self) -> RxResult<ConstItem> {
        let start_span = self.advance().span; // Consume 'const'

        let name = self.expect_identifier("Expected constant name after 'const'")?;
        self.expect(&TokenKind::Colon, "Expected ':' after constant name")?;
        let ty = self.parse_type()?;

        let value = if self.check(&TokenKind::Equal) {
            self.advance();
            Some(self.parse_expression()?)
        } else {
            None
        };

        self.expect(&TokenKind::Semicolon, "Expected ';' after constant")?;

        Ok(ConstItem {
            name,
            ty,
            value,
            span: start_span.to(self.previous().span),
        })
    }

    // struct Name { field: Type, ... }  |  struct Name;
    fn parse_struct(&mut self) -> RxResult<StructDef> {
        let start_span = self.advance().span; // Consume 'struct'

        let name = self.expect_identifier("Expected struct name")?;
        let mut fields = Vec::new();

        if self.check(&TokenKind::Semicolon) {
            self.advance();
            return Ok(StructDef {
                name,
                fields,
                span: start_span.to(self.previous().span),
            });
        }

        self.expect(&TokenKind::LeftBrace, "Expected '{' after struct name")?;

        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            let field_span = self.peek().span;
            let field_name = self.expect_identifier("Expected field name")?;
            self.expect(&TokenKind::Colon, "Expected ':' after field name")?;
            let ty = self.parse_type()?;

            fields.push(StructField {
                name: field_name,
                ty,
                span: field_span,
            });

            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }

        self.expect(&TokenKind::RightBrace, "Expected '}' after struct fields")?;

        Ok(StructDef {
            name,
            fields,
            span: start_span.to(self.previous().span),
        })
    }

    // enum Name { A, B, C }
    fn parse_enum(&mut self) -> RxResult<EnumDef> {
        let start_span = self.advance().span; // Consume 'enum'

        let name = self.expect_identifier("Expected enum name")?;
        self.expect(&TokenKind::LeftBrace, "Expected '{' after enum name")?;

        let mut variants = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            variants.push(self.expect_identifier("Expected variant name")?);

            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }

        self.expect(&TokenKind::RightBrace, "Expected '}' after enum variants")?;

        Ok(EnumDef {
            name,
            variants,
            span: start_span.to(self.previous().span),
        })
    }

    // trait Name { fn sig(&self) -> T; const N: usize; }
    fn parse_trait(&mut self) -> RxResult<TraitDef> {
        let start_span = self.advance().span; // Consume 'trait'

        let id = self.fresh_id();
        let name = self.expect_identifier("Expected trait name")?;
        self.expect(&TokenKind::LeftBrace, "Expected '{' after trait name")?;
        let items = self.parse_associated_items(true)?;
        self.expect(&TokenKind::RightBrace, "Expected '}' after trait body")?;

        Ok(TraitDef {
            id,
            name,
            items,
            span: start_span.to(self.previous().span),
        })
    }

    // impl Name { ... }  |  impl Trait for Name { ... }
    fn parse_impl(&mut self) -> RxResult<Implementation> {
        let start_span = self.advance().span; // Consume 'impl'

        let id = self.fresh_id();
        let first_name = self.expect_identifier("Expected type or trait name after 'impl'")?;

        let trait_name = if self.check(&TokenKind::For) {
            self.advance();
            Some(first_name.clone())
        } else {
            None
        };
        let self_ty = match trait_name {
            Some(_) => self.expect_identifier("Expected type name after 'for'")?,
            None => first_name,
        };

        self.expect(&TokenKind::LeftBrace, "Expected '{' after impl declaration")?;
        let items = self.parse_associated_items(false)?;
        self.expect(&TokenKind::RightBrace, "Expected '}' after impl body")?;

        let span = start_span.to(self.previous().span);
        Ok(match trait_name {
            Some(trait_name) => Implementation::Trait(TraitImpl {
                id,
                trait_name,
                self_ty,
                items,
                span,
            }),
            None => Implementation::Inherent(InherentImpl {
                id,
                self_ty,
                items,
                span,
            }),
        })
    }

    fn parse_associated_items(&mut self, in_trait: bool) -> RxResult<Vec<AssociatedItem>> {
        let mut items = Vec::new();

        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            match self.peek().kind {
                TokenKind::Fn => items.push(AssociatedItem::Function(self.parse_function(in_trait)?)),
                TokenKind::Const if self.peek_at(1).kind == TokenKind::Fn => {
                    items.push(AssociatedItem::Function(self.parse_function(in_trait)?))
                }
                TokenKind::Const => items.push(AssociatedItem::Const(self.parse_const()?)),
                _ => return Err(self.error("Only functions and constants are allowed here")),
            }
        }

        Ok(items)
    }

    // ===== Statement Parsing =====

    fn parse_block(&mut self) -> RxResult<BlockExpr> {
        let start_span = self
            .expect(&TokenKind::LeftBrace, "Expected '{' to start block")?
            .span;
        let id = self.fresh_id();

        // A block re-enables struct literals, even inside a condition
        let saved = std::mem::replace(&mut self.no_struct_literal, false);

        let mut statements = Vec::new();
        let mut tail = None;

        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            let stmt_start = self.peek().span;

            if self.check(&TokenKind::Semicolon) {
                self.advance();
                statements.push(Statement::Empty { span: stmt_start });
                continue;
            }
            if self.check(&TokenKind::Let) {
                statements.push(self.parse_let_statement()?);
                continue;
            }
            if self.is_item_start() {
                statements.push(Statement::Item(Box::new(self.parse_item()?)));
                continue;
            }

            let expr = if self.is_block_like_start() {
                self.parse_expression_with_block()?
            } else {
                self.parse_expression()?
            };

            if self.check(&TokenKind::Semicolon) {
                self.advance();
                statements.push(Statement::Expr {
                    expr,
                    has_semi: true,
                    span: stmt_start.to(self.previous().span),
                });
            } else if self.check(&TokenKind::RightBrace) {
                tail = Some(Box::new(expr));
            } else if expr.is_block_like() {
                let span = expr.span();
                statements.push(Statement::Expr {
                    expr,
                    has_semi: false,
                    span,
                });
            } else {
                self.no_struct_literal = saved;
                return Err(self.error("Expected ';' or '}' after expression"));
            }
        }

        self.no_struct_literal = saved;
        self.expect(&TokenKind::RightBrace, "Expected '}' to end block")?;

        Ok(BlockExpr {
            id,
            statements,
            tail,
            span: start_span.to(self.previous().span),
        })
    }

    // let pattern [: Type] [= init];
    fn parse_let_statement(&mut self) -> RxResult<Statement> {
        let start_span = self.advance().span; // Consume 'let'

        let pattern = self.parse_pattern()?;

        let ty = if self.check(&TokenKind::Colon) {
            self.advance();
            Some(self.parse_type()?)
        } else {
            None
        };

        let init = if self.check(&TokenKind::Equal) {
            self.advance();
            Some(self.parse_expression()?)
        } else {
            None
        };

        self.expect(&TokenKind::Semicolon, "Expected ';' after let statement")?;

        Ok(Statement::Let {
            pattern,
            ty,
            init,
            span: start_span.to(self.previous().span),
        })
    }

    fn is_block_like_start(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::LeftBrace | TokenKind::If | TokenKind::Loop | TokenKind::While
        )
    }

    /// Statement-position `if`/`loop`/`while`/`{}`; never continues into a binary operator.
    fn parse_expression_with_block(&mut self) -> RxResult<Expression> {
        match self.peek().kind {
            TokenKind::LeftBrace => Ok(Expression::Block(self.parse_block()?)),
            TokenKind::If => self.parse_if(),
            TokenKind::Loop => self.parse_loop(),
            TokenKind::While => self.parse_while(),
            _ => Err(self.error("Expected block expression")),
        }
    }

    // ===== Expression Parsing (precedence climbing) =====

    pub fn parse_expression(&mut self) -> RxResult<Expression> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> RxResult<Expression> {
        let expr = self.parse_or()?;

        if self.check(&TokenKind::Equal) {
            self.advance();
            let value = self.parse_assignment()?;
            let span = expr.span().to(value.span());

            return Ok(Expression::Assign {
                target: Box::new(expr),
                value: Box::new(value),
                span,
            });
        }

        let compound_op = match self.peek().kind {
            TokenKind::PlusAssign => Some(BinaryOp::Add),
            TokenKind::MinusAssign => Some(BinaryOp::Subtract),
            TokenKind::StarAssign => Some(BinaryOp::Multiply),
            TokenKind::SlashAssign => Some(BinaryOp::Divide),
            TokenKind::PercentAssign => Some(BinaryOp::Modulo),
            TokenKind::CaretAssign => Some(BinaryOp::BitXor),
            TokenKind::AmpAssign => Some(BinaryOp::BitAnd),
            TokenKind::PipeAssign => Some(BinaryOp::BitOr),
            TokenKind::ShlAssign => Some(BinaryOp::Shl),
            TokenKind::ShrAssign => Some(BinaryOp::Shr),
            _ => None,
        };

        if let Some(operator) = compound_op {
            self.advance();
            let value = self.parse_assignment()?;
            let span = expr.span().to(value.span());

            return Ok(Expression::CompoundAssign {
                target: Box::new(expr),
                operator,
                value: Box::new(value),
                span,
            });
        }

        Ok(expr)
    }

    /// One left-associative precedence level.
    fn parse_binary_level(
        &mut self,
        next: fn(&mut Self) -> RxResult<Expression>,
        operator_for: fn(&TokenKind) -> Option<BinaryOp>,
    ) -> RxResult<Expression> {
        let mut left = next(self)?;

        while let Some(operator) = operator_for(&self.peek().kind) {
            self.advance();
            let right = next(self)?;
            let span = left.span().to(right.span());

            left = Expression::Binary {
                left: Box::new(left),
                operator,
                right: Box::new(right),
                span,
            };
        }

        Ok(left)
    }

    fn parse_or(&mut self) -> RxResult<Expression> {
        self.parse_binary_level(Self::parse_and, |kind| match kind {
            TokenKind::Or => Some(BinaryOp::Or),
            _ => None,
        })
    }

    fn parse_and(&mut self) -> RxResult<Expression> {
        self.parse_binary_level(Self::parse_comparison, |kind| match kind {
            TokenKind::And => Some(BinaryOp::And),
            _ => None,
        })
    }

    fn parse_comparison(&mut self) -> RxResult<Expression> {
        self.parse_binary_level(Self::parse_bit_or, |kind| match kind {
            TokenKind::EqualEqual => Some(BinaryOp::Equal),
            TokenKind::NotEqual => Some(BinaryOp::NotEqual),
            TokenKind::Less => Some(BinaryOp::Less),
            TokenKind::LessEqual => Some(BinaryOp::LessEqual),
            TokenKind::Greater => Some(BinaryOp::Greater),
            TokenKind::GreaterEqual => Some(BinaryOp::GreaterEqual),
            _ => None,
        })
    }

    fn parse_bit_or(&mut self) -> RxResult<Expression> {
        self.parse_binary_level(Self::parse_bit_xor, |kind| match kind {
            TokenKind::Pipe => Some(BinaryOp::BitOr),
            _ => None,
        })
    }

    fn parse_bit_xor(&mut self) -> RxResult<Expression> {
        self.parse_binary_level(Self::parse_bit_and, |kind| match kind {
            TokenKind::Caret => Some(BinaryOp::BitXor),
            _ => None,
        })
    }

    fn parse_bit_and(&mut self) -> RxResult<Expression> {
        self.parse_binary_level(Self::parse_shift, |kind| match kind {
            TokenKind::Ampersand => Some(BinaryOp::BitAnd),
            _ => None,
        })
    }

    fn parse_shift(&mut self) -> RxResult<Expression> {
        self.parse_binary_level(Self::parse_term, |kind| match kind {
            TokenKind::Shl => Some(BinaryOp::Shl),
            TokenKind::Shr => Some(BinaryOp::Shr),
            _ => None,
        })
    }

    fn parse_term(&mut self) -> RxResult<Expression> {
        self.parse_binary_level(Self::parse_factor, |kind| match kind {
            TokenKind::Plus => Some(BinaryOp::Add),
            TokenKind::Minus => Some(BinaryOp::Subtract),
            _ => None,
        })
    }

    fn parse_factor(&mut self) -> RxResult<Expression> {
        self.parse_binary_level(Self::parse_cast, |kind| match kind {
            TokenKind::Star => Some(BinaryOp::Multiply),
            TokenKind::Slash => Some(BinaryOp::Divide),
            TokenKind::Percent => Some(BinaryOp::Modulo),
            _ => None,
        })
    }

    fn parse_cast(&mut self) -> RxResult<Expression> {
        let mut expr = self.parse_unary()?;

        while self.check(&TokenKind::As) {
            self.advance();
            let ty = self.parse_type()?;
            let span = expr.span().to(self.previous().span);

            expr = Expression::Cast {
                value: Box::new(expr),
                ty,
                span,
            };
        }

        Ok(expr)
    }

    fn parse_unary(&mut self) -> RxResult<Expression> {
        let start_span = self.peek().span;

        match self.peek().kind {
            TokenKind::Minus | TokenKind::Not => {
                let operator = if self.advance().kind == TokenKind::Minus {
                    UnaryOp::Negate
                } else {
                    UnaryOp::Not
                };
                let operand = self.parse_unary()?;

                Ok(Expression::Unary {
                    operator,
                    span: start_span.to(operand.span()),
                    operand: Box::new(operand),
                })
            }
            TokenKind::Ampersand | TokenKind::And => {
                let double = self.advance().kind == TokenKind::And;
                let mutable = if self.check(&TokenKind::Mut) {
                    self.advance();
                    true
                } else {
                    false
                };
                let value = self.parse_unary()?;

                Ok(Expression::Borrow {
                    mutable,
                    double,
                    span: start_span.to(value.span()),
                    value: Box::new(value),
                })
            }
            TokenKind::Star => {
                self.advance();
                let value = self.parse_unary()?;

                Ok(Expression::Deref {
                    span: start_span.to(value.span()),
                    value: Box::new(value),
                })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> RxResult<Expression> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.check(&TokenKind::LeftParen) {
                self.advance();
                let args = self.parse_arguments()?;
                self.expect(&TokenKind::RightParen, "Expected ')' after arguments")?;

                let span = expr.span().to(self.previous().span);
                expr = Expression::Call {
                    callee: Box::new(expr),
                    args,
                    span,
                };
            } else if self.check(&TokenKind::Dot) {
                self.advance();
                let name = self.expect_identifier("Expected field or method name after '.'")?;

                if self.check(&TokenKind::LeftParen) {
                    self.advance();
                    let args = self.parse_arguments()?;
                    self.expect(&TokenKind::RightParen, "Expected ')' after arguments")?;

                    let span = expr.span().to(self.previous().span);
                    expr = Expression::MethodCall {
                        receiver: Box::new(expr),
                        method: name,
                        args,
                        span,
                    };
                } else {
                    let span = expr.span().to(self.previous().span);
                    expr = Expression::Field {
                        object: Box::new(expr),
                        field: name,
                        span,
                    };
                }
            } else if self.check(&TokenKind::LeftBracket) {
                self.advance();
                let index = self.with_struct_literals(Self::parse_expression)?;
                self.expect(&TokenKind::RightBracket, "Expected ']' after index")?;

                let span = expr.span().to(self.previous().span);
                expr = Expression::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                    span,
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn parse_arguments(&mut self) -> RxResult<Vec<Expression>> {
        let mut args = Vec::new();

        while !self.check(&TokenKind::RightParen) && !self.is_at_end() {
            args.push(self.with_struct_literals(Self::parse_expression)?);

            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }

        Ok(args)
    }

    fn parse_primary(&mut self) -> RxResult<Expression> {
        let span = self.peek().span;

        match self.peek().kind.clone() {
            TokenKind::Int(value, suffix) => {
                self.advance();
                Ok(Expression::Int {
                    value,
                    suffix,
                    span,
                })
            }
            TokenKind::True | TokenKind::False => {
                let value = self.advance().kind == TokenKind::True;
                Ok(Expression::Bool { value, span })
            }
            TokenKind::Char(value) => {
                self.advance();
                Ok(Expression::Char { value, span })
            }
            TokenKind::String(value) => {
                self.advance();
                Ok(Expression::Str { value, span })
            }

            TokenKind::Identifier(_) | TokenKind::SelfValue | TokenKind::SelfType => {
                let path = self.parse_path()?;

                let can_be_struct = !self.no_struct_literal && path.first != PathSegment::SelfValue;
                if can_be_struct && self.check(&TokenKind::LeftBrace) {
                    return self.parse_struct_literal(path, span);
                }

                Ok(Expression::Path {
                    path,
                    span: span.to(self.previous().span),
                })
            }

            TokenKind::LeftParen => {
                self.advance();
                if self.check(&TokenKind::RightParen) {
                    self.advance();
                    return Ok(Expression::Unit {
                        span: span.to(self.previous().span),
                    });
                }

                let inner = self.with_struct_literals(Self::parse_expression)?;
                self.expect(&TokenKind::RightParen, "Expected ')' after expression")?;

                Ok(Expression::Grouped {
                    inner: Box::new(inner),
                    span: span.to(self.previous().span),
                })
            }

            TokenKind::LeftBracket => self.parse_array(),

            TokenKind::LeftBrace | TokenKind::If | TokenKind::Loop | TokenKind::While => {
                self.parse_expression_with_block()
            }

            TokenKind::Break => {
                self.advance();
                let value = if self.can_start_expression() {
                    Some(Box::new(self.parse_expression()?))
                } else {
                    None
                };
                Ok(Expression::Break {
                    value,
                    span: span.to(self.previous().span),
                })
            }

            TokenKind::Continue => {
                self.advance();
                Ok(Expression::Continue { span })
            }

            TokenKind::Return => {
                self.advance();
                let value = if self.can_start_expression() {
                    Some(Box::new(self.parse_expression()?))
                } else {
                    None
                };
                Ok(Expression::Return {
                    value,
                    span: span.to(self.previous().span),
                })
            }

            _ => Err(self.error(&format!("Expected expression, found '{}'", self.peek().kind))),
        }
    }

    fn parse_path(&mut self) -> RxResult<PathExpr> {
        let first = self.parse_path_segment()?;

        let second = if self.check(&TokenKind::ColonColon) {
            self.advance();
            Some(self.parse_path_segment()?)
        } else {
            None
        };

        Ok(PathExpr { first, second })
    }

    fn parse_path_segment(&mut self) -> RxResult<PathSegment> {
        match self.peek().kind.clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(PathSegment::Ident(name))
            }
            TokenKind::SelfValue => {
                self.advance();
                Ok(PathSegment::SelfValue)
            }
            TokenKind::SelfType => {
                self.advance();
                Ok(PathSegment::SelfType)
            }
            _ => Err(self.error("Expected path segment")),
        }
    }

    // Name { field: value, other, ... }
    fn parse_struct_literal(&mut self, path: PathExpr, start: Span) -> RxResult<Expression> {
        self.advance(); // Consume {
        let mut fields = Vec::new();

        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            let field_span = self.peek().span;
            let name = self.expect_identifier("Expected field name in struct literal")?;

            // Shorthand `Point { x, y }`
            let value = if self.check(&TokenKind::Colon) {
                self.advance();
                self.parse_expression()?
            } else {
                Expression::Path {
                    path: PathExpr {
                        first: PathSegment::Ident(name.clone()),
                        second: None,
                    },
                    span: field_span,
                }
            };

            fields.push(FieldInit {
                name,
                value,
                span: field_span.to(self.previous().span),
            });

            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }

        self.expect(&TokenKind::RightBrace, "Expected '}' after struct literal")?;

        Ok(Expression::StructLit {
            path,
            fields,
            span: start.to(self.previous().span),
        })
    }

    // [a, b, c]  |  [value; len]
    fn parse_array(&mut self) -> RxResult<Expression> {
        let start = self.advance().span; // Consume [

        if self.check(&TokenKind::RightBracket) {
            self.advance();
            return Ok(Expression::Array {
                elements: ArrayElements::List(Vec::new()),
                span: start.to(self.previous().span),
            });
        }

        let first = self.with_struct_literals(Self::parse_expression)?;

        let elements = if self.check(&TokenKind::Semicolon) {
            self.advance();
            let len = self.with_struct_literals(Self::parse_expression)?;
            ArrayElements::Repeat {
                value: Box::new(first),
                len: Box::new(len),
            }
        } else {
            let mut items = vec![first];
            while self.check(&TokenKind::Comma) {
                self.advance();
                if self.check(&TokenKind::RightBracket) {
                    break;
                }
                items.push(self.with_struct_literals(Self::parse_expression)?);
            }
            ArrayElements::List(items)
        };

        self.expect(&TokenKind::RightBracket, "Expected ']' after array elements")?;

        Ok(Expression::Array {
            elements,
            span: start.to(self.previous().span),
        })
    }

    fn parse_condition(&mut self) -> RxResult<Expression> {
        let saved = std::mem::replace(&mut self.no_struct_literal, true);
        let condition = self.parse_expression();
        self.no_struct_literal = saved;
        condition
    }

    fn parse_if(&mut self) -> RxResult<Expression> {
        let start_span = self.advance().span; // Consume 'if'

        let condition = self.parse_condition()?;
        let then_block = self.parse_block()?;

        let else_branch = if self.check(&TokenKind::Else) {
            self.advance();
            if self.check(&TokenKind::If) {
                Some(Box::new(self.parse_if()?))
            } else {
                Some(Box::new(Expression::Block(self.parse_block()?)))
            }
        } else {
            None
        };

        Ok(Expression::If {
            condition: Box::new(condition),
            then_block,
            else_branch,
            span: start_span.to(self.previous().span),
        })
    }

    fn parse_loop(&mut self) -> RxResult<Expression> {
        let start_span = self.advance().span; // Consume 'loop'
        let id = self.fresh_id();
        let body = self.parse_block()?;

        Ok(Expression::Loop {
            id,
            body,
            span: start_span.to(self.previous().span),
        })
    }

    fn parse_while(&mut self) -> RxResult<Expression> {
        let start_span = self.advance().span; // Consume 'while'
        let id = self.fresh_id();
        let condition = self.parse_condition()?;
        let body = self.parse_block()?;

        Ok(Expression::While {
            id,
            condition: Box::new(condition),
            body,
            span: start_span.to(self.previous().span),
        })
    }

    // ===== Type Parsing =====

    fn parse_type(&mut self) -> RxResult<TypeExpr> {
        let start = self.peek().span;

        match self.peek().kind.clone() {
            TokenKind::Ampersand | TokenKind::And => {
                let double = self.advance().kind == TokenKind::And;
                let mutable = if self.check(&TokenKind::Mut) {
                    self.advance();
                    true
                } else {
                    false
                };
                let inner = self.parse_type()?;
                let span = start.to(self.previous().span);

                let reference = TypeExpr::Reference {
                    mutable,
                    inner: Box::new(inner),
                    span,
                };
                if double {
                    Ok(TypeExpr::Reference {
                        mutable: false,
                        inner: Box::new(reference),
                        span,
                    })
                } else {
                    Ok(reference)
                }
            }
            TokenKind::LeftBracket => {
                self.advance();
                let elem = self.parse_type()?;
                self.expect(&TokenKind::Semicolon, "Expected ';' in array type")?;
                let len = self.with_struct_literals(Self::parse_expression)?;
                self.expect(&TokenKind::RightBracket, "Expected ']' after array type")?;

                Ok(TypeExpr::Array {
                    elem: Box::new(elem),
                    len: Box::new(len),
                    span: start.to(self.previous().span),
                })
            }
            TokenKind::LeftParen => {
                self.advance();
                self.expect(&TokenKind::RightParen, "Expected ')' for unit type")?;
                Ok(TypeExpr::Unit {
                    span: start.to(self.previous().span),
                })
            }
            TokenKind::Not => {
                self.advance();
                Ok(TypeExpr::Never { span: start })
            }
            TokenKind::SelfType => {
                self.advance();
                Ok(TypeExpr::SelfType { span: start })
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(TypeExpr::Path { name, span: start })
            }
            _ => Err(self.error("Expected type")),
        }
    }

    // ===== Helper Methods =====

    fn with_struct_literals<T>(&mut self, f: fn(&mut Self) -> RxResult<T>) -> RxResult<T> {
        let saved = std::mem::replace(&mut self.no_struct_literal, false);
        let result = f(self);
        self.no_struct_literal = saved;
        result
    }

    fn can_start_expression(&self) -> bool {
        !matches!(
            self.peek().kind,
            TokenKind::Semicolon
                | TokenKind::RightBrace
                | TokenKind::RightParen
                | TokenKind::RightBracket
                | TokenKind::Comma
                | TokenKind::Eof
        )
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    /// Lookahead; clamps to the trailing EOF token.
    fn peek_at(&self, offset: usize) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.current + offset).min(last)]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.is_at_end() {
            self.current += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        if self.is_at_end() {
            false
        } else {
            std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
        }
    }

    fn expect(&mut self, kind: &TokenKind, message: &str) -> RxResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(message))
        }
    }

    fn expect_identifier(&mut self, message: &str) -> RxResult<String> {
        if let TokenKind::Identifier(name) = &self.peek().kind {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.error(message))
        }
    }

    fn error(&self, message: &str) -> RxError {
        let token = self.peek();
        RxError::syntax_error(
            message,
            SourceLocation::new("", token.span.line, token.span.column).with_snippet(&token.lexeme),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(source: &str) -> RxResult<Crate> {
        let mut lexer = Lexer::new(source, "test.rx");
        let tokens = lexer.tokenize()?;
        let mut parser = Parser::new(tokens);
        parser.parse()
    }

    fn main_body(krate: &Crate) -> &BlockExpr {
        if let Item::Function(f) = &krate.items[0] {
            f.body.as_ref().unwrap()
        } else {
            panic!("Expected function item");
        }
    }

    #[test]
    fn test_function() {
        let krate = parse("fn add(a: i32, b: i32) -> i32 { a + b }").unwrap();

        if let Item::Function(f) = &krate.items[0] {
            assert_eq!(f.name, "add");
            assert_eq!(f.params.params.len(), 2);
            assert!(f.params.self_param.is_none());
            assert!(matches!(&f.return_type, Some(TypeExpr::Path { name, .. }) if name == "i32"));
            assert!(f.body.as_ref().unwrap().tail.is_some());
        } else {
            panic!("Expected Function item");
        }
    }

    #[test]
    fn test_let_statement() {
        let krate = parse("fn main() { let mut x: [i32; 3] = [0; 3]; }").unwrap();
        let body = main_body(&krate);

        if let Statement::Let {
            pattern, ty, init, ..
        } = &body.statements[0]
        {
            assert!(matches!(pattern, Pattern::Identifier { name, is_mut: true, .. } if name == "x"));
            assert!(matches!(ty, Some(TypeExpr::Array { .. })));
            assert!(matches!(
                init,
                Some(Expression::Array {
                    elements: ArrayElements::Repeat { .. },
                    ..
                })
            ));
        } else {
            panic!("Expected Let statement");
        }
    }

    #[test]
    fn test_binary_precedence() {
        let krate = parse("fn main() { 1 + 2 * 3 << 1 }").unwrap();
        let tail = main_body(&krate).tail.as_ref().unwrap();

        // (1 + (2 * 3)) << 1
        if let Expression::Binary { operator, left, .. } = tail.as_ref() {
            assert_eq!(*operator, BinaryOp::Shl);
            assert!(matches!(left.as_ref(), Expression::Binary { operator: BinaryOp::Add, .. }));
        } else {
            panic!("Expected Binary expression");
        }
    }

    #[test]
    fn test_self_params() {
        let krate = parse(
            "impl P { fn a(&self) {} fn b(&mut self) {} fn c(mut self) {} fn d(self: Self, n: i32) {} }",
        )
        .unwrap();

        let Item::Impl(Implementation::Inherent(imp)) = &krate.items[0] else {
            panic!("Expected inherent impl");
        };
        let receivers: Vec<_> = imp
            .items
            .iter()
            .map(|item| match item {
                AssociatedItem::Function(f) => f.params.self_param.clone(),
                AssociatedItem::Const(_) => None,
            })
            .collect();

        assert!(matches!(receivers[0], Some(SelfParam::Shorthand { is_ref: true, is_mut: false, .. })));
        assert!(matches!(receivers[1], Some(SelfParam::Shorthand { is_ref: true, is_mut: true, .. })));
        assert!(matches!(receivers[2], Some(SelfParam::Shorthand { is_ref: false, is_mut: true, .. })));
        assert!(matches!(receivers[3], Some(SelfParam::Typed { is_mut: false, .. })));
    }

    #[test]
    fn test_struct_literal_not_in_condition() {
        let krate = parse("fn main() { if x { P { a: 1 } } else { P { a: 2 } } }").unwrap();
        let tail = main_body(&krate).tail.as_ref().unwrap();

        if let Expression::If {
            condition,
            then_block,
            ..
        } = tail.as_ref()
        {
            assert!(matches!(condition.as_ref(), Expression::Path { .. }));
            assert!(matches!(
                then_block.tail.as_deref(),
                Some(Expression::StructLit { .. })
            ));
        } else {
            panic!("Expected If expression");
        }
    }

    #[test]
    fn test_block_like_statements_need_no_semicolon() {
        let krate = parse("fn main() { loop { break; } while c { } let y = 1; y }").unwrap();
        let body = main_body(&krate);

        assert_eq!(body.statements.len(), 3);
        assert!(matches!(
            &body.statements[0],
            Statement::Expr { expr: Expression::Loop { .. }, has_semi: false, .. }
        ));
        assert!(matches!(body.tail.as_deref(), Some(Expression::Path { .. })));
    }

    #[test]
    fn test_node_ids_in_source_order() {
        let krate = parse("fn f() { loop { } } trait T { } impl P { }").unwrap();

        let Item::Function(f) = &krate.items[0] else {
            panic!("Expected function");
        };
        let body = f.body.as_ref().unwrap();
        assert_eq!(f.id, NodeId(0));
        assert_eq!(body.id, NodeId(1));
        if let Statement::Expr { expr: Expression::Loop { id, body, .. }, .. } = &body.statements[0] {
            assert_eq!(*id, NodeId(2));
            assert_eq!(body.id, NodeId(3));
        } else {
            panic!("Expected loop statement");
        }
        assert!(matches!(&krate.items[1], Item::Trait(t) if t.id == NodeId(4)));
        assert!(matches!(&krate.items[2], Item::Impl(Implementation::Inherent(i)) if i.id == NodeId(5)));
    }

    #[test]
    fn test_trait_signatures_and_paths() {
        let krate = parse(indoc::indoc! {"
            trait Shape {
                const SIDES: usize;
                fn area(&self) -> i32;
                fn new() -> Self;
            }
            fn main() { let s = Square::new(); exit(0); }
        "})
        .unwrap();

        let Item::Trait(t) = &krate.items[0] else {
            panic!("Expected trait");
        };
        assert_eq!(t.items.len(), 3);
        assert!(matches!(&t.items[1], AssociatedItem::Function(f) if f.body.is_none()));

        let Item::Function(main) = &krate.items[1] else {
            panic!("Expected main");
        };
        let body = main.body.as_ref().unwrap();
        if let Statement::Let { init: Some(Expression::Call { callee, .. }), .. } = &body.statements[0] {
            assert!(matches!(
                callee.as_ref(),
                Expression::Path { path: PathExpr { second: Some(_), .. }, .. }
            ));
        } else {
            panic!("Expected call initializer");
        }
        assert!(matches!(&body.statements[1], Statement::Expr { expr, .. } if expr.is_call_to("exit")));
    }

    #[test]
    fn test_missing_semicolon_is_error() {
        let err = parse("fn main() { let x = 1 let y = 2; }").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Syntax);
    }
}
