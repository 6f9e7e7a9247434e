//! Statement and block parsing.

use crate::ast::{AssignOp, Block, Expr, MatchArm, Stmt};
use crate::keywords::Keyword;
use crate::parser::{ParseResult, Parser};
use crate::token::TokenKind;

impl Parser<'_, '_> {
    pub(crate) fn parse_block(&mut self) -> ParseResult<Block> {
        let open = self.expect(TokenKind::LeftBrace, "'{'")?;
        let mut statements = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.current().is_eof() {
            statements.push(self.parse_statement()?);
        }
        self.expect(TokenKind::RightBrace, "'}'")?;
        Ok(Block { statements, source_index: open.source_index })
    }

    pub(crate) fn parse_statement(&mut self) -> ParseResult<Stmt> {
        let token = self.current();

        if token.kind == TokenKind::LeftBrace {
            return Ok(Stmt::Block(self.parse_block()?));
        }

        if let Some(kw) = token.keyword {
            match kw {
                Keyword::If => return self.parse_if(),
                Keyword::While => return self.parse_while(),
                Keyword::For => return self.parse_for(),
                Keyword::Return => return self.parse_return(),
                Keyword::Break => {
                    self.advance();
                    self.expect(TokenKind::Semicolon, "';'")?;
                    return Ok(Stmt::Break { source_index: token.source_index });
                }
                Keyword::Continue => {
                    self.advance();
                    self.expect(TokenKind::Semicolon, "';'")?;
                    return Ok(Stmt::Continue { source_index: token.source_index });
                }
                Keyword::Defer => return self.parse_defer(),
                Keyword::Match => return self.parse_match(),
                Keyword::Var => return Ok(Stmt::Var(self.parse_var()?)),
                Keyword::Const => return Ok(Stmt::Const(self.parse_const()?)),
                Keyword::Let => return Ok(Stmt::Let(self.parse_let()?)),
                _ => {}
            }
        }

        let stmt = self.parse_simple_statement()?;
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(stmt)
    }

    /// An expression statement or an assignment, without the terminator.
    ///
    /// Shared with `for` clauses, which delimit with `;` and `{` instead.
    fn parse_simple_statement(&mut self) -> ParseResult<Stmt> {
        let target = self.parse_expression()?;

        let op = match self.current().kind {
            TokenKind::Equal => Some(AssignOp::Assign),
            TokenKind::PlusEqual => Some(AssignOp::AddAssign),
            TokenKind::MinusEqual => Some(AssignOp::SubAssign),
            TokenKind::StarEqual => Some(AssignOp::MulAssign),
            TokenKind::SlashEqual => Some(AssignOp::DivAssign),
            TokenKind::PercentEqual => Some(AssignOp::ModAssign),
            _ => None,
        };

        if let Some(op) = op {
            let op_token = self.advance();
            // Keep struct literals available on the right-hand side even in
            // for-clause position; the value ends at ';' or '{' of the body.
            let value = self.parse_expression()?;
            Ok(Stmt::Assign {
                target,
                op,
                value,
                source_index: op_token.source_index,
            })
        } else {
            Ok(Stmt::Expr(target))
        }
    }

    fn parse_if(&mut self) -> ParseResult<Stmt> {
        let if_token = self.expect_keyword(Keyword::If)?;
        let condition = self.in_condition(|p| p.parse_expression())?;
        let then_block = self.parse_block()?;

        let else_block = if self.eat_keyword(Keyword::Else) {
            if self.check_keyword(Keyword::If) {
                Some(Box::new(self.parse_if()?))
            } else {
                Some(Box::new(Stmt::Block(self.parse_block()?)))
            }
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_block,
            else_block,
            source_index: if_token.source_index,
        })
    }

    fn parse_while(&mut self) -> ParseResult<Stmt> {
        let while_token = self.expect_keyword(Keyword::While)?;
        let condition = self.in_condition(|p| p.parse_expression())?;
        let body = self.parse_block()?;
        Ok(Stmt::While {
            condition,
            body,
            source_index: while_token.source_index,
        })
    }

    fn parse_for(&mut self) -> ParseResult<Stmt> {
        let for_token = self.expect_keyword(Keyword::For)?;

        let init = if self.eat(TokenKind::Semicolon) {
            None
        } else if self.check_keyword(Keyword::Var) {
            // parse_var consumes its own ';'.
            Some(Box::new(Stmt::Var(self.parse_var()?)))
        } else {
            let stmt = self.parse_simple_statement()?;
            self.expect(TokenKind::Semicolon, "';'")?;
            Some(Box::new(stmt))
        };

        let condition = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.in_condition(|p| p.parse_expression())?)
        };
        self.expect(TokenKind::Semicolon, "';'")?;

        let post = if self.check(TokenKind::LeftBrace) {
            None
        } else {
            Some(Box::new(self.in_condition(|p| p.parse_simple_statement())?))
        };

        let body = self.parse_block()?;

        Ok(Stmt::For {
            init,
            condition,
            post,
            body,
            source_index: for_token.source_index,
        })
    }

    fn parse_return(&mut self) -> ParseResult<Stmt> {
        let return_token = self.expect_keyword(Keyword::Return)?;
        let mut values = Vec::new();
        if !self.check(TokenKind::Semicolon) {
            values.push(self.parse_expression()?);
            while self.eat(TokenKind::Comma) {
                values.push(self.parse_expression()?);
            }
        }
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(Stmt::Return {
            values,
            source_index: return_token.source_index,
        })
    }

    fn parse_defer(&mut self) -> ParseResult<Stmt> {
        let defer_token = self.expect_keyword(Keyword::Defer)?;
        let body = if self.check(TokenKind::LeftBrace) {
            Stmt::Block(self.parse_block()?)
        } else {
            let stmt = self.parse_simple_statement()?;
            self.expect(TokenKind::Semicolon, "';'")?;
            stmt
        };
        Ok(Stmt::Defer {
            body: Box::new(body),
            source_index: defer_token.source_index,
        })
    }

    fn parse_match(&mut self) -> ParseResult<Stmt> {
        let match_token = self.expect_keyword(Keyword::Match)?;
        let scrutinee = self.in_condition(|p| p.parse_expression())?;
        self.expect(TokenKind::LeftBrace, "'{'")?;

        let mut arms = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.current().is_eof() {
            let arm_token = self.current();
            let pattern: Option<Expr> = if self.eat_keyword(Keyword::Else) {
                None
            } else {
                Some(self.in_condition(|p| p.parse_expression())?)
            };
            self.expect(TokenKind::FatArrow, "'=>'")?;
            let body = self.parse_block()?;
            arms.push(MatchArm {
                pattern,
                body,
                source_index: arm_token.source_index,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RightBrace, "'}'")?;

        Ok(Stmt::Match {
            scrutinee,
            arms,
            source_index: match_token.source_index,
        })
    }
}
