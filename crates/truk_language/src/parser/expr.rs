//! Expression parsing.
//!
//! Precedence climbing, loosest binding first:
//!
//! ```text
//! logical-or   ||
//! logical-and  &&
//! bitwise-or   |
//! bitwise-xor  ^
//! bitwise-and  &
//! equality     == !=
//! relational   < <= > >=
//! shift        << >>
//! additive     + -
//! multiplicative * / %
//! unary        - ! ~ & *
//! cast         expr as type
//! postfix      call, index, member
//! primary      literal, identifier, (expr), Name{..}, [..], @type, lambda
//! ```
//!
//! Assignment is handled at statement level (see `stmt.rs`); `*` and `&`
//! are unary in prefix position and binary otherwise, which falls out of
//! the climb structure.

use crate::ast::{BinaryOp, Expr, FieldInit, Ident, LambdaExpr, LiteralKind, UnaryOp};
use crate::keywords::Keyword;
use crate::parser::{ParseResult, Parser};
use crate::token::{Token, TokenKind};

impl Parser<'_, '_> {
    pub(crate) fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.parse_logical_or()
    }

    fn binary_loop(
        &mut self,
        next: fn(&mut Self) -> ParseResult<Expr>,
        classify: fn(TokenKind) -> Option<BinaryOp>,
    ) -> ParseResult<Expr> {
        let mut lhs = next(self)?;
        while let Some(op) = classify(self.current().kind) {
            let op_token = self.advance();
            let rhs = next(self)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                source_index: op_token.source_index,
            };
        }
        Ok(lhs)
    }

    fn parse_logical_or(&mut self) -> ParseResult<Expr> {
        self.binary_loop(Self::parse_logical_and, |k| match k {
            TokenKind::PipePipe => Some(BinaryOp::Or),
            _ => None,
        })
    }

    fn parse_logical_and(&mut self) -> ParseResult<Expr> {
        self.binary_loop(Self::parse_bitwise_or, |k| match k {
            TokenKind::AmpAmp => Some(BinaryOp::And),
            _ => None,
        })
    }

    fn parse_bitwise_or(&mut self) -> ParseResult<Expr> {
        self.binary_loop(Self::parse_bitwise_xor, |k| match k {
            TokenKind::Pipe => Some(BinaryOp::BitOr),
            _ => None,
        })
    }

    fn parse_bitwise_xor(&mut self) -> ParseResult<Expr> {
        self.binary_loop(Self::parse_bitwise_and, |k| match k {
            TokenKind::Caret => Some(BinaryOp::BitXor),
            _ => None,
        })
    }

    fn parse_bitwise_and(&mut self) -> ParseResult<Expr> {
        self.binary_loop(Self::parse_equality, |k| match k {
            TokenKind::Amp => Some(BinaryOp::BitAnd),
            _ => None,
        })
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        self.binary_loop(Self::parse_relational, |k| match k {
            TokenKind::EqualEqual => Some(BinaryOp::Eq),
            TokenKind::BangEqual => Some(BinaryOp::Ne),
            _ => None,
        })
    }

    fn parse_relational(&mut self) -> ParseResult<Expr> {
        self.binary_loop(Self::parse_shift, |k| match k {
            TokenKind::Less => Some(BinaryOp::Lt),
            TokenKind::LessEqual => Some(BinaryOp::Le),
            TokenKind::Greater => Some(BinaryOp::Gt),
            TokenKind::GreaterEqual => Some(BinaryOp::Ge),
            _ => None,
        })
    }

    fn parse_shift(&mut self) -> ParseResult<Expr> {
        self.binary_loop(Self::parse_additive, |k| match k {
            TokenKind::LessLess => Some(BinaryOp::Shl),
            TokenKind::GreaterGreater => Some(BinaryOp::Shr),
            _ => None,
        })
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        self.binary_loop(Self::parse_multiplicative, |k| match k {
            TokenKind::Plus => Some(BinaryOp::Add),
            TokenKind::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        self.binary_loop(Self::parse_unary, |k| match k {
            TokenKind::Star => Some(BinaryOp::Mul),
            TokenKind::Slash => Some(BinaryOp::Div),
            TokenKind::Percent => Some(BinaryOp::Mod),
            _ => None,
        })
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let op = match self.current().kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Amp => Some(UnaryOp::AddressOf),
            TokenKind::Star => Some(UnaryOp::Deref),
            _ => None,
        };

        if let Some(op) = op {
            let op_token = self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
                source_index: op_token.source_index,
            });
        }

        self.parse_cast()
    }

    fn parse_cast(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_postfix()?;
        while self.check_keyword(Keyword::As) {
            let as_token = self.advance();
            let target = self.parse_type()?;
            expr = Expr::Cast {
                expr: Box::new(expr),
                target,
                source_index: as_token.source_index,
            };
        }
        Ok(expr)
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.current().kind {
                TokenKind::LeftParen => {
                    let paren = self.advance();
                    let mut args = Vec::new();
                    let saved = self.no_struct_literal;
                    self.no_struct_literal = false;
                    while !self.check(TokenKind::RightParen) {
                        args.push(self.parse_expression()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                    self.no_struct_literal = saved;
                    self.expect(TokenKind::RightParen, "')'")?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        source_index: paren.source_index,
                    };
                }
                TokenKind::LeftBracket => {
                    let bracket = self.advance();
                    let saved = self.no_struct_literal;
                    self.no_struct_literal = false;
                    let index = self.parse_expression()?;
                    self.no_struct_literal = saved;
                    self.expect(TokenKind::RightBracket, "']'")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        source_index: bracket.source_index,
                    };
                }
                TokenKind::Dot => {
                    self.advance();
                    let field_token = self.expect(TokenKind::Identifier, "field name")?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        field: Ident::new(field_token.lexeme, field_token.source_index),
                        source_index: field_token.source_index,
                    };
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn literal(&mut self, kind: LiteralKind, token: Token) -> Expr {
        Expr::Literal {
            kind,
            lexeme: token.lexeme,
            source_index: token.source_index,
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let token = self.current();

        match token.kind {
            TokenKind::IntegerLiteral => {
                self.advance();
                Ok(self.literal(LiteralKind::Integer, token))
            }
            TokenKind::FloatLiteral => {
                self.advance();
                Ok(self.literal(LiteralKind::Float, token))
            }
            TokenKind::StringLiteral => {
                self.advance();
                Ok(self.literal(LiteralKind::String, token))
            }
            TokenKind::CharLiteral => {
                self.advance();
                Ok(self.literal(LiteralKind::Char, token))
            }
            TokenKind::Keyword => {
                let kw = token.keyword.expect("keyword token carries its tag");
                match kw {
                    Keyword::True | Keyword::False => {
                        self.advance();
                        Ok(self.literal(LiteralKind::Bool, token))
                    }
                    Keyword::Nil => {
                        self.advance();
                        Ok(self.literal(LiteralKind::Nil, token))
                    }
                    Keyword::Fn | Keyword::Lambda => self.parse_lambda(),
                    _ => Err(self.error_here(&format!(
                        "unexpected keyword '{}' in expression",
                        kw.as_str()
                    ))),
                }
            }
            TokenKind::Identifier => {
                self.advance();
                let name = Ident::new(token.lexeme, token.source_index);
                if self.check(TokenKind::LeftBrace) && !self.no_struct_literal {
                    self.parse_struct_literal(name)
                } else {
                    Ok(Expr::Identifier(name))
                }
            }
            TokenKind::LeftParen => {
                self.advance();
                let saved = self.no_struct_literal;
                self.no_struct_literal = false;
                let expr = self.parse_expression();
                self.no_struct_literal = saved;
                let expr = expr?;
                self.expect(TokenKind::RightParen, "')'")?;
                Ok(expr)
            }
            TokenKind::LeftBracket => {
                self.advance();
                let saved = self.no_struct_literal;
                self.no_struct_literal = false;
                let mut elements = Vec::new();
                while !self.check(TokenKind::RightBracket) {
                    elements.push(self.parse_expression()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.no_struct_literal = saved;
                self.expect(TokenKind::RightBracket, "']'")?;
                Ok(Expr::ArrayLiteral {
                    elements,
                    source_index: token.source_index,
                })
            }
            TokenKind::At => {
                self.advance();
                let ty = self.parse_type()?;
                Ok(Expr::TypeParam {
                    ty,
                    source_index: token.source_index,
                })
            }
            TokenKind::Unknown => Err(self.error_here(&format!(
                "unexpected character {}",
                self.describe_current()
            ))),
            _ => Err(self.error_here(&format!(
                "unexpected token {} in expression",
                self.describe_current()
            ))),
        }
    }

    fn parse_struct_literal(&mut self, name: Ident) -> ParseResult<Expr> {
        self.expect(TokenKind::LeftBrace, "'{'")?;
        let saved = self.no_struct_literal;
        self.no_struct_literal = false;
        let mut fields = Vec::new();
        while !self.check(TokenKind::RightBrace) {
            let field_token = self.expect(TokenKind::Identifier, "field name")?;
            self.expect(TokenKind::Colon, "':'")?;
            let value = self.parse_expression()?;
            fields.push(FieldInit {
                name: Ident::new(field_token.lexeme, field_token.source_index),
                value,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.no_struct_literal = saved;
        self.expect(TokenKind::RightBrace, "'}'")?;
        Ok(Expr::StructLiteral {
            name,
            fields,
            source_index: name.source_index,
        })
    }

    fn parse_lambda(&mut self) -> ParseResult<Expr> {
        let intro = self.advance(); // 'fn' or 'lambda'
        let (params, variadic) = self.parse_params()?;
        if variadic {
            return Err(self.error_at(intro, "lambdas cannot be variadic"));
        }
        let return_type = self.parse_return_type()?;
        let saved = self.no_struct_literal;
        self.no_struct_literal = false;
        let body = self.parse_block();
        self.no_struct_literal = saved;
        Ok(Expr::Lambda(LambdaExpr {
            params,
            return_type,
            body: body?,
            source_index: intro.source_index,
        }))
    }
}
