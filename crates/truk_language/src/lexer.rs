//! On-demand tokenizer for truk source text.
//!
//! The tokenizer walks a byte buffer and produces one [`Token`] per call,
//! with a one-slot peek buffer for lookahead. It never fails: bytes it
//! cannot classify become [`TokenKind::Unknown`] tokens, which the parser
//! surfaces as syntax errors.
//!
//! Position tracking: 0-based byte `pos`, 1-based `line` and `column`.
//! `\n`, `\r`, and `\r\n` each count as a single line break.
//!
//! Lexical shape:
//!
//! - comments: `//` to end of line, `/* ... */` (non-nesting)
//! - identifiers: `[A-Za-z_][A-Za-z0-9_]*`, checked against the keyword catalog
//! - integers: decimal, `0x`/`0b`/`0o` prefixed
//! - floats: decimal with a fractional part and/or an exponent
//! - strings: `"..."` with backslash escaping, quotes retained in the lexeme
//! - chars: `'...'` with backslash escaping, quotes retained in the lexeme

use truk_base::{Interner, Symbol};

use crate::keywords::Keyword;
use crate::token::{Token, TokenKind};

/// Streaming tokenizer over one file's source text.
pub struct Tokenizer<'src, 'int> {
    source: &'src str,
    bytes: &'src [u8],
    pos: usize,
    line: usize,
    column: usize,
    peeked: Option<Token>,
    interner: &'int mut Interner,
}

impl<'src, 'int> Tokenizer<'src, 'int> {
    pub fn new(source: &'src str, interner: &'int mut Interner) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            peeked: None,
            interner,
        }
    }

    /// Read access to the interner behind this tokenizer's lexemes.
    pub fn interner(&self) -> &Interner {
        self.interner
    }

    /// Returns the next token without consuming it.
    pub fn peek_token(&mut self) -> Token {
        if self.peeked.is_none() {
            self.peeked = Some(self.scan_token());
        }
        self.peeked.unwrap()
    }

    /// Consumes and returns the next token.
    ///
    /// After the end of input this keeps returning `EndOfFile` tokens whose
    /// `source_index` equals the source length.
    pub fn next_token(&mut self) -> Token {
        if let Some(token) = self.peeked.take() {
            return token;
        }
        self.scan_token()
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn current(&self) -> u8 {
        if self.is_at_end() {
            0
        } else {
            self.bytes[self.pos]
        }
    }

    fn peek_byte(&self, offset: usize) -> u8 {
        if self.pos + offset >= self.bytes.len() {
            0
        } else {
            self.bytes[self.pos + offset]
        }
    }

    fn advance(&mut self) {
        if self.is_at_end() {
            return;
        }
        match self.bytes[self.pos] {
            b'\n' => {
                self.line += 1;
                self.column = 1;
                self.pos += 1;
            }
            b'\r' => {
                self.line += 1;
                self.column = 1;
                self.pos += 1;
                // CRLF is one line break.
                if !self.is_at_end() && self.bytes[self.pos] == b'\n' {
                    self.pos += 1;
                }
            }
            _ => {
                self.column += 1;
                self.pos += 1;
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() {
            match self.current() {
                b' ' | b'\t' | b'\r' | b'\n' => self.advance(),
                _ => break,
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while !self.is_at_end() && self.current() != b'\n' && self.current() != b'\r' {
            self.advance();
        }
    }

    fn skip_block_comment(&mut self) {
        self.advance(); // '/'
        self.advance(); // '*'
        while !self.is_at_end() {
            if self.current() == b'*' && self.peek_byte(1) == b'/' {
                self.advance();
                self.advance();
                break;
            }
            self.advance();
        }
    }

    fn is_digit(c: u8) -> bool {
        c.is_ascii_digit()
    }

    fn is_alpha(c: u8) -> bool {
        c.is_ascii_alphabetic() || c == b'_'
    }

    fn is_alphanumeric(c: u8) -> bool {
        Self::is_alpha(c) || Self::is_digit(c)
    }

    fn make_token(
        &mut self,
        kind: TokenKind,
        start_pos: usize,
        start_line: usize,
        start_column: usize,
    ) -> Token {
        let lexeme = self.interner.intern(&self.source[start_pos..self.pos]);
        Token::new(kind, lexeme, start_line, start_column, start_pos)
    }

    fn scan_number(&mut self, start_line: usize, start_column: usize) -> Token {
        let start_pos = self.pos;
        let mut is_float = false;

        if self.current() == b'0' && matches!(self.peek_byte(1), b'x' | b'X') {
            self.advance();
            self.advance();
            while !self.is_at_end() && self.current().is_ascii_hexdigit() {
                self.advance();
            }
        } else if self.current() == b'0' && matches!(self.peek_byte(1), b'b' | b'B') {
            self.advance();
            self.advance();
            while !self.is_at_end() && matches!(self.current(), b'0' | b'1') {
                self.advance();
            }
        } else if self.current() == b'0' && matches!(self.peek_byte(1), b'o' | b'O') {
            self.advance();
            self.advance();
            while !self.is_at_end() && (b'0'..=b'7').contains(&self.current()) {
                self.advance();
            }
        } else {
            while !self.is_at_end() && Self::is_digit(self.current()) {
                self.advance();
            }

            if !self.is_at_end() && self.current() == b'.' && Self::is_digit(self.peek_byte(1)) {
                is_float = true;
                self.advance();
                while !self.is_at_end() && Self::is_digit(self.current()) {
                    self.advance();
                }
            }

            if !self.is_at_end() && matches!(self.current(), b'e' | b'E') {
                is_float = true;
                self.advance();
                if !self.is_at_end() && matches!(self.current(), b'+' | b'-') {
                    self.advance();
                }
                while !self.is_at_end() && Self::is_digit(self.current()) {
                    self.advance();
                }
            }
        }

        let kind = if is_float {
            TokenKind::FloatLiteral
        } else {
            TokenKind::IntegerLiteral
        };
        self.make_token(kind, start_pos, start_line, start_column)
    }

    fn scan_quoted(
        &mut self,
        quote: u8,
        kind: TokenKind,
        start_line: usize,
        start_column: usize,
    ) -> Token {
        let start_pos = self.pos;
        self.advance(); // opening quote

        while !self.is_at_end() && self.current() != quote {
            if self.current() == b'\\' {
                self.advance();
                if !self.is_at_end() {
                    self.advance();
                }
            } else {
                self.advance();
            }
        }

        if !self.is_at_end() {
            self.advance(); // closing quote
        }

        self.make_token(kind, start_pos, start_line, start_column)
    }

    fn scan_identifier(&mut self, start_line: usize, start_column: usize) -> Token {
        let start_pos = self.pos;
        while !self.is_at_end() && Self::is_alphanumeric(self.current()) {
            self.advance();
        }

        let text = &self.source[start_pos..self.pos];
        if let Some(kw) = Keyword::from_str(text) {
            let lexeme = self.interner.intern(text);
            return Token::keyword(kw, lexeme, start_line, start_column, start_pos);
        }

        self.make_token(TokenKind::Identifier, start_pos, start_line, start_column)
    }

    /// Consumes one more byte if it equals `expected`.
    fn matches(&mut self, expected: u8) -> bool {
        if !self.is_at_end() && self.current() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn scan_token(&mut self) -> Token {
        self.skip_whitespace();

        // Comment runs may alternate with whitespace before the next token.
        while !self.is_at_end() && self.current() == b'/' {
            if self.peek_byte(1) == b'/' {
                self.skip_line_comment();
                self.skip_whitespace();
            } else if self.peek_byte(1) == b'*' {
                self.skip_block_comment();
                self.skip_whitespace();
            } else {
                break;
            }
        }

        if self.is_at_end() {
            return Token::new(
                TokenKind::EndOfFile,
                Symbol::EMPTY,
                self.line,
                self.column,
                self.pos,
            );
        }

        let start_line = self.line;
        let start_column = self.column;
        let start_pos = self.pos;
        let c = self.current();

        if Self::is_digit(c) {
            return self.scan_number(start_line, start_column);
        }
        if Self::is_alpha(c) {
            return self.scan_identifier(start_line, start_column);
        }
        if c == b'"' {
            return self.scan_quoted(b'"', TokenKind::StringLiteral, start_line, start_column);
        }
        if c == b'\'' {
            return self.scan_quoted(b'\'', TokenKind::CharLiteral, start_line, start_column);
        }

        self.advance();
        let kind = match c {
            b'+' => {
                if self.matches(b'=') {
                    TokenKind::PlusEqual
                } else {
                    TokenKind::Plus
                }
            }
            b'-' => {
                if self.matches(b'>') {
                    TokenKind::Arrow
                } else if self.matches(b'=') {
                    TokenKind::MinusEqual
                } else {
                    TokenKind::Minus
                }
            }
            b'*' => {
                if self.matches(b'=') {
                    TokenKind::StarEqual
                } else {
                    TokenKind::Star
                }
            }
            b'/' => {
                if self.matches(b'=') {
                    TokenKind::SlashEqual
                } else {
                    TokenKind::Slash
                }
            }
            b'%' => {
                if self.matches(b'=') {
                    TokenKind::PercentEqual
                } else {
                    TokenKind::Percent
                }
            }
            b'=' => {
                if self.matches(b'=') {
                    TokenKind::EqualEqual
                } else if self.matches(b'>') {
                    TokenKind::FatArrow
                } else {
                    TokenKind::Equal
                }
            }
            b'!' => {
                if self.matches(b'=') {
                    TokenKind::BangEqual
                } else {
                    TokenKind::Bang
                }
            }
            b'<' => {
                if self.matches(b'=') {
                    TokenKind::LessEqual
                } else if self.matches(b'<') {
                    TokenKind::LessLess
                } else {
                    TokenKind::Less
                }
            }
            b'>' => {
                if self.matches(b'=') {
                    TokenKind::GreaterEqual
                } else if self.matches(b'>') {
                    TokenKind::GreaterGreater
                } else {
                    TokenKind::Greater
                }
            }
            b'&' => {
                if self.matches(b'&') {
                    TokenKind::AmpAmp
                } else {
                    TokenKind::Amp
                }
            }
            b'|' => {
                if self.matches(b'|') {
                    TokenKind::PipePipe
                } else {
                    TokenKind::Pipe
                }
            }
            b'^' => TokenKind::Caret,
            b'~' => TokenKind::Tilde,
            b'(' => TokenKind::LeftParen,
            b')' => TokenKind::RightParen,
            b'{' => TokenKind::LeftBrace,
            b'}' => TokenKind::RightBrace,
            b'[' => TokenKind::LeftBracket,
            b']' => TokenKind::RightBracket,
            b',' => TokenKind::Comma,
            b';' => TokenKind::Semicolon,
            b':' => TokenKind::Colon,
            b'.' => {
                if self.current() == b'.' && self.peek_byte(1) == b'.' {
                    self.advance();
                    self.advance();
                    TokenKind::DotDotDot
                } else {
                    TokenKind::Dot
                }
            }
            b'@' => TokenKind::At,
            _ => TokenKind::Unknown,
        };

        self.make_token(kind, start_pos, start_line, start_column)
    }
}

/// Tokenizes a whole buffer, ending with the `EndOfFile` token.
pub fn tokenize(source: &str, interner: &mut Interner) -> Vec<Token> {
    let mut tokenizer = Tokenizer::new(source, interner);
    let mut tokens = Vec::new();
    loop {
        let token = tokenizer.next_token();
        let done = token.is_eof();
        tokens.push(token);
        if done {
            break;
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> (Vec<Token>, Interner) {
        let mut interner = Interner::new();
        let tokens = tokenize(source, &mut interner);
        (tokens, interner)
    }

    #[test]
    fn simple_function_token_positions() {
        let (tokens, interner) = lex("fn main() {}");
        assert_eq!(tokens.len(), 7);

        assert_eq!(tokens[0].kind, TokenKind::Keyword);
        assert!(tokens[0].is_keyword(Keyword::Fn));
        assert_eq!(interner.resolve(tokens[0].lexeme), "fn");
        assert_eq!((tokens[0].line, tokens[0].column, tokens[0].source_index), (1, 1, 0));

        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(interner.resolve(tokens[1].lexeme), "main");
        assert_eq!((tokens[1].line, tokens[1].column, tokens[1].source_index), (1, 4, 3));

        assert_eq!(tokens[2].kind, TokenKind::LeftParen);
        assert_eq!(tokens[2].source_index, 7);
        assert_eq!(tokens[3].kind, TokenKind::RightParen);
        assert_eq!(tokens[3].source_index, 8);
        assert_eq!(tokens[4].kind, TokenKind::LeftBrace);
        assert_eq!(tokens[4].source_index, 10);
        assert_eq!(tokens[5].kind, TokenKind::RightBrace);
        assert_eq!(tokens[5].source_index, 11);

        assert_eq!(tokens[6].kind, TokenKind::EndOfFile);
        assert_eq!((tokens[6].line, tokens[6].column, tokens[6].source_index), (1, 13, 12));
    }

    #[test]
    fn numeric_literals() {
        let (tokens, interner) = lex("123 0x1A 0b101 0o77 3.14 2.5e10");
        assert_eq!(tokens.len(), 7);

        let expect = [
            (TokenKind::IntegerLiteral, "123", 0),
            (TokenKind::IntegerLiteral, "0x1A", 4),
            (TokenKind::IntegerLiteral, "0b101", 9),
            (TokenKind::IntegerLiteral, "0o77", 15),
            (TokenKind::FloatLiteral, "3.14", 20),
            (TokenKind::FloatLiteral, "2.5e10", 25),
        ];
        for (i, (kind, text, index)) in expect.iter().enumerate() {
            assert_eq!(tokens[i].kind, *kind, "token {}", i);
            assert_eq!(interner.resolve(tokens[i].lexeme), *text);
            assert_eq!(tokens[i].source_index, *index);
        }
        assert_eq!(tokens[6].source_index, 31);
    }

    #[test]
    fn exponent_with_sign() {
        let (tokens, interner) = lex("1e-3 2E+4");
        assert_eq!(tokens[0].kind, TokenKind::FloatLiteral);
        assert_eq!(interner.resolve(tokens[0].lexeme), "1e-3");
        assert_eq!(tokens[1].kind, TokenKind::FloatLiteral);
        assert_eq!(interner.resolve(tokens[1].lexeme), "2E+4");
    }

    #[test]
    fn string_literals_retain_quotes() {
        let (tokens, interner) = lex(r#""hello world" "escaped \"quote\"""#);
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
        assert_eq!(interner.resolve(tokens[0].lexeme), "\"hello world\"");
        assert_eq!(tokens[1].kind, TokenKind::StringLiteral);
        assert_eq!(interner.resolve(tokens[1].lexeme), "\"escaped \\\"quote\\\"\"");
    }

    #[test]
    fn char_literals_retain_quotes() {
        let (tokens, interner) = lex(r"'a' '\n' '\''");
        assert_eq!(tokens.len(), 4);
        for token in &tokens[..3] {
            assert_eq!(token.kind, TokenKind::CharLiteral);
        }
        assert_eq!(interner.resolve(tokens[0].lexeme), "'a'");
        assert_eq!(interner.resolve(tokens[1].lexeme), "'\\n'");
        assert_eq!(interner.resolve(tokens[2].lexeme), "'\\''");
    }

    #[test]
    fn operator_set() {
        let (tokens, _) = lex("+ - * / % == != < <= > >= && || ! & | ^ ~ << >>");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Percent,
                TokenKind::EqualEqual,
                TokenKind::BangEqual,
                TokenKind::Less,
                TokenKind::LessEqual,
                TokenKind::Greater,
                TokenKind::GreaterEqual,
                TokenKind::AmpAmp,
                TokenKind::PipePipe,
                TokenKind::Bang,
                TokenKind::Amp,
                TokenKind::Pipe,
                TokenKind::Caret,
                TokenKind::Tilde,
                TokenKind::LessLess,
                TokenKind::GreaterGreater,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn compound_assignment_and_arrows() {
        let (tokens, _) = lex("+= -= *= /= %= -> => ... @");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::PlusEqual,
                TokenKind::MinusEqual,
                TokenKind::StarEqual,
                TokenKind::SlashEqual,
                TokenKind::PercentEqual,
                TokenKind::Arrow,
                TokenKind::FatArrow,
                TokenKind::DotDotDot,
                TokenKind::At,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        let (tokens, interner) = lex("a // line comment\n/* block\ncomment */ b");
        assert_eq!(tokens.len(), 3);
        assert_eq!(interner.resolve(tokens[0].lexeme), "a");
        assert_eq!(interner.resolve(tokens[1].lexeme), "b");
        assert_eq!(tokens[1].line, 3);
    }

    #[test]
    fn unterminated_block_comment_reaches_eof() {
        let (tokens, _) = lex("a /* never closed");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].kind, TokenKind::EndOfFile);
    }

    #[test]
    fn crlf_counts_one_line_break() {
        let (tokens, _) = lex("a\r\nb\rc\nd");
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[1].line, 2);
        assert_eq!(tokens[2].line, 3);
        assert_eq!(tokens[3].line, 4);
    }

    #[test]
    fn unknown_byte_becomes_unknown_token() {
        let (tokens, interner) = lex("a $ b");
        assert_eq!(tokens[1].kind, TokenKind::Unknown);
        assert_eq!(interner.resolve(tokens[1].lexeme), "$");
    }

    #[test]
    fn eof_index_equals_source_length() {
        for source in ["", "x", "fn main() {}", "a b c // trailing"] {
            let (tokens, _) = lex(source);
            assert_eq!(tokens.last().unwrap().source_index, source.len());
        }
    }

    #[test]
    fn token_indices_are_monotonic() {
        let (tokens, interner) = lex("fn add(a: i32, b: i32) : i32 { return a + b; }");
        for pair in tokens.windows(2) {
            let width = interner.resolve(pair[0].lexeme).len();
            assert!(pair[1].source_index >= pair[0].source_index + width);
        }
    }

    #[test]
    fn peek_does_not_consume() {
        let mut interner = Interner::new();
        let mut tokenizer = Tokenizer::new("x y", &mut interner);
        let peeked = tokenizer.peek_token();
        let next = tokenizer.next_token();
        assert_eq!(peeked.source_index, next.source_index);
        assert_eq!(peeked.kind, next.kind);
        let second = tokenizer.next_token();
        assert_eq!(second.source_index, 2);
    }

    #[test]
    fn keywords_versus_identifiers() {
        let (tokens, _) = lex("var variable if iffy map mapping");
        assert!(tokens[0].is_keyword(Keyword::Var));
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert!(tokens[2].is_keyword(Keyword::If));
        assert_eq!(tokens[3].kind, TokenKind::Identifier);
        assert!(tokens[4].is_keyword(Keyword::Map));
        assert_eq!(tokens[5].kind, TokenKind::Identifier);
    }
}
