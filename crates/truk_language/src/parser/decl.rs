//! Top-level declaration parsing.

use crate::ast::{
    CImport, ConstDecl, Decl, EnumDecl, EnumVariant, Field, FnDecl, Ident, LetDecl, Param,
    StructDecl, TypeNode, VarDecl,
};
use crate::keywords::Keyword;
use crate::parser::{parse_int_lexeme, unquote, ParseResult, Parser};
use crate::token::TokenKind;

/// Function names with this prefix are test functions.
pub const TEST_FN_PREFIX: &str = "test_";

impl Parser<'_, '_> {
    pub(crate) fn parse_top_level(
        &mut self,
        declarations: &mut Vec<Decl>,
        c_imports: &mut Vec<CImport>,
    ) -> ParseResult<()> {
        let token = self.current();
        let Some(kw) = token.keyword else {
            return Err(self.error_here(&format!(
                "expected declaration, found {}",
                self.describe_current()
            )));
        };

        match kw {
            Keyword::Import => {
                declarations.push(self.parse_import()?);
            }
            Keyword::Cimport => {
                c_imports.push(self.parse_cimport()?);
            }
            Keyword::Shard => {
                declarations.push(self.parse_shard(c_imports)?);
            }
            Keyword::Fn => declarations.push(Decl::Fn(self.parse_fn()?)),
            Keyword::Struct => declarations.push(Decl::Struct(self.parse_struct()?)),
            Keyword::Enum => declarations.push(Decl::Enum(self.parse_enum()?)),
            Keyword::Var => declarations.push(Decl::Var(self.parse_var()?)),
            Keyword::Const => declarations.push(Decl::Const(self.parse_const()?)),
            Keyword::Let => declarations.push(Decl::Let(self.parse_let()?)),
            _ => {
                return Err(self.error_here(&format!(
                    "expected declaration, found keyword '{}'",
                    kw.as_str()
                )));
            }
        }
        Ok(())
    }

    fn parse_import(&mut self) -> ParseResult<Decl> {
        let import_token = self.expect_keyword(Keyword::Import)?;
        let path_token = self.expect(TokenKind::StringLiteral, "import path string")?;
        let path = unquote(self.interner().resolve(path_token.lexeme));
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(Decl::Import { path, source_index: import_token.source_index })
    }

    fn parse_cimport(&mut self) -> ParseResult<CImport> {
        let cimport_token = self.expect_keyword(Keyword::Cimport)?;
        let header_token = self.expect(TokenKind::StringLiteral, "header path string")?;
        let header = unquote(self.interner().resolve(header_token.lexeme));

        self.expect(TokenKind::LeftBrace, "'{'")?;
        let mut symbols = Vec::new();
        while !self.check(TokenKind::RightBrace) {
            let sym_token = self.expect(TokenKind::Identifier, "symbol name")?;
            symbols.push(Ident::new(sym_token.lexeme, sym_token.source_index));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RightBrace, "'}'")?;
        self.eat(TokenKind::Semicolon);

        Ok(CImport { header, symbols, source_index: cimport_token.source_index })
    }

    fn parse_shard(&mut self, c_imports: &mut Vec<CImport>) -> ParseResult<Decl> {
        let shard_token = self.expect_keyword(Keyword::Shard)?;
        let name_token = self.expect(TokenKind::Identifier, "shard name")?;
        let name = Ident::new(name_token.lexeme, name_token.source_index);

        self.expect(TokenKind::LeftBrace, "'{'")?;
        let mut declarations = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.current().is_eof() {
            if self.check_keyword(Keyword::Shard) {
                return Err(self.error_here("shards do not nest"));
            }
            self.parse_top_level(&mut declarations, c_imports)?;
        }
        self.expect(TokenKind::RightBrace, "'}'")?;

        Ok(Decl::Shard { name, declarations, source_index: shard_token.source_index })
    }

    pub(crate) fn parse_fn(&mut self) -> ParseResult<FnDecl> {
        let fn_token = self.expect_keyword(Keyword::Fn)?;
        let name_token = self.expect(TokenKind::Identifier, "function name")?;
        let name = Ident::new(name_token.lexeme, name_token.source_index);
        let is_test = self
            .interner()
            .resolve(name.name)
            .starts_with(TEST_FN_PREFIX);

        let type_params = if self.check(TokenKind::LeftBracket) {
            self.parse_type_params()?
        } else {
            Vec::new()
        };

        let (params, variadic) = self.parse_params()?;
        let return_type = self.parse_return_type()?;

        let (body, is_extern) = if self.eat(TokenKind::Semicolon) {
            (None, true)
        } else {
            (Some(self.parse_block()?), false)
        };

        Ok(FnDecl {
            name,
            type_params,
            params,
            return_type,
            body,
            variadic,
            is_extern,
            is_test,
            source_index: fn_token.source_index,
        })
    }

    fn parse_type_params(&mut self) -> ParseResult<Vec<Ident>> {
        self.expect(TokenKind::LeftBracket, "'['")?;
        let mut params = Vec::new();
        loop {
            let token = self.expect(TokenKind::Identifier, "type parameter name")?;
            params.push(Ident::new(token.lexeme, token.source_index));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RightBracket, "']'")?;
        Ok(params)
    }

    pub(crate) fn parse_params(&mut self) -> ParseResult<(Vec<Param>, bool)> {
        self.expect(TokenKind::LeftParen, "'('")?;
        let mut params = Vec::new();
        let mut variadic = false;

        while !self.check(TokenKind::RightParen) {
            if self.check(TokenKind::DotDotDot) {
                self.advance();
                variadic = true;
                break;
            }
            let name_token = self.expect(TokenKind::Identifier, "parameter name")?;
            self.expect(TokenKind::Colon, "':'")?;
            let ty = self.parse_type()?;
            params.push(Param {
                name: Ident::new(name_token.lexeme, name_token.source_index),
                ty,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }

        self.expect(TokenKind::RightParen, "')'")?;
        Ok((params, variadic))
    }

    /// Parses `: type` after a parameter list; absent means void.
    pub(crate) fn parse_return_type(&mut self) -> ParseResult<Option<TypeNode>> {
        if self.eat(TokenKind::Colon) {
            let ty = self.parse_type()?;
            if ty.is_void() {
                Ok(None)
            } else {
                Ok(Some(ty))
            }
        } else {
            Ok(None)
        }
    }

    fn parse_struct(&mut self) -> ParseResult<StructDecl> {
        let struct_token = self.expect_keyword(Keyword::Struct)?;
        let name_token = self.expect(TokenKind::Identifier, "struct name")?;
        let name = Ident::new(name_token.lexeme, name_token.source_index);

        let type_params = if self.check(TokenKind::LeftBracket) {
            self.parse_type_params()?
        } else {
            Vec::new()
        };

        self.expect(TokenKind::LeftBrace, "'{'")?;
        let mut fields = Vec::new();
        while !self.check(TokenKind::RightBrace) {
            let field_token = self.expect(TokenKind::Identifier, "field name")?;
            self.expect(TokenKind::Colon, "':'")?;
            let ty = self.parse_type()?;
            fields.push(Field {
                name: Ident::new(field_token.lexeme, field_token.source_index),
                ty,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RightBrace, "'}'")?;

        Ok(StructDecl {
            name,
            type_params,
            fields,
            source_index: struct_token.source_index,
        })
    }

    fn parse_enum(&mut self) -> ParseResult<EnumDecl> {
        let enum_token = self.expect_keyword(Keyword::Enum)?;
        let name_token = self.expect(TokenKind::Identifier, "enum name")?;
        let name = Ident::new(name_token.lexeme, name_token.source_index);

        let backing = if self.eat(TokenKind::Colon) {
            let ty = self.parse_type()?;
            match &ty {
                TypeNode::Primitive { keyword, .. } if keyword.is_integer_type() => ty,
                _ => {
                    return Err(self.error_at(
                        self.current(),
                        "enum backing type must be an integer primitive",
                    ));
                }
            }
        } else {
            TypeNode::Primitive {
                keyword: Keyword::I32,
                source_index: enum_token.source_index,
            }
        };

        self.expect(TokenKind::LeftBrace, "'{'")?;
        let mut variants = Vec::new();
        while !self.check(TokenKind::RightBrace) {
            let variant_token = self.expect(TokenKind::Identifier, "enum variant name")?;
            let value = if self.eat(TokenKind::Equal) {
                let negative = self.eat(TokenKind::Minus);
                let value_token = self.expect(TokenKind::IntegerLiteral, "integer value")?;
                let text = self.interner().resolve(value_token.lexeme).to_string();
                let parsed = parse_int_lexeme(&text).ok_or_else(|| {
                    self.error_at(value_token, &format!("invalid enum value '{}'", text))
                })?;
                Some(if negative { -parsed } else { parsed })
            } else {
                None
            };
            variants.push(EnumVariant {
                name: Ident::new(variant_token.lexeme, variant_token.source_index),
                value,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RightBrace, "'}'")?;

        Ok(EnumDecl {
            name,
            backing,
            variants,
            source_index: enum_token.source_index,
        })
    }

    pub(crate) fn parse_var(&mut self) -> ParseResult<VarDecl> {
        let var_token = self.expect_keyword(Keyword::Var)?;
        let name_token = self.expect(TokenKind::Identifier, "variable name")?;
        self.expect(TokenKind::Colon, "':'")?;
        let ty = self.parse_type()?;
        let initializer = if self.eat(TokenKind::Equal) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(VarDecl {
            name: Ident::new(name_token.lexeme, name_token.source_index),
            ty,
            initializer,
            source_index: var_token.source_index,
        })
    }

    pub(crate) fn parse_const(&mut self) -> ParseResult<ConstDecl> {
        let const_token = self.expect_keyword(Keyword::Const)?;
        let name_token = self.expect(TokenKind::Identifier, "constant name")?;
        self.expect(TokenKind::Colon, "':'")?;
        let ty = self.parse_type()?;
        self.expect(TokenKind::Equal, "'='")?;
        let value = self.parse_expression()?;
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(ConstDecl {
            name: Ident::new(name_token.lexeme, name_token.source_index),
            ty,
            value,
            source_index: const_token.source_index,
        })
    }

    pub(crate) fn parse_let(&mut self) -> ParseResult<LetDecl> {
        let let_token = self.expect_keyword(Keyword::Let)?;
        let name_token = self.expect(TokenKind::Identifier, "binding name")?;
        self.expect(TokenKind::Equal, "'='")?;
        let initializer = self.parse_expression()?;
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(LetDecl {
            name: Ident::new(name_token.lexeme, name_token.source_index),
            initializer,
            source_index: let_token.source_index,
        })
    }
}
