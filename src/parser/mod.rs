mod error_node;
mod expr_parsing;
mod item_parsing;
pub mod spans_table;
mod stmt_parsing;

use self::error_node::ErrorNode;
use crate::{
    ast::{Ast, Field, Id, Name},
    error::{CinderError, SyntaxErrorKind},
    lexer::Token,
};
use lasso::Spur;
use logos::{Lexer, Span};
use spans_table::SpanTable;

/// Consumes the token stream and builds a best-effort AST. Parsing never
/// aborts: malformed constructs become `Error` nodes and the parser skips to
/// the next synchronization token.
pub fn parse(lexer: Lexer<'_, Token>) -> Ast {
    let mut parser = Parser::new(lexer);
    let mut items = vec![];

    while parser.curr_token != Token::EOF {
        items.push(parser.parse_item());
    }

    Ast {
        items,
        rodeo: parser.lexer.extras.into_reader(),
        spans: parser.spans,
        errors: parser.errors,
    }
}

/// Interned names the grammar treats as declaration keywords even though the
/// lexer sees plain identifiers.
struct ResourceNames {
    texture2d: Spur,
    texture3d: Spur,
    texture_cube: Spur,
    sampler_state: Spur,
}

struct Parser<'a> {
    lexer: Lexer<'a, Token>,
    spans: SpanTable,
    errors: Vec<CinderError>,
    res_names: ResourceNames,

    curr_token: Token,
    curr_span: Span,
    peek_token: Token,
    peek_span: Span,
}

impl<'a> Parser<'a> {
    const ITEM_SYNC: [Token; 6] = [
        Token::Struct,
        Token::CBuffer,
        Token::HashBracket,
        Token::Semicolon,
        Token::RightBrace,
        Token::EOF,
    ];
    const STMT_SYNC: [Token; 5] = [
        Token::Semicolon,
        Token::RightBrace,
        Token::Struct,
        Token::CBuffer,
        Token::EOF,
    ];
    const EXPR_SYNC: [Token; 8] = [
        Token::Semicolon,
        Token::RightBrace,
        Token::RightParen,
        Token::RightBracket,
        Token::Comma,
        Token::Struct,
        Token::CBuffer,
        Token::EOF,
    ];

    fn new(mut lexer: Lexer<'a, Token>) -> Self {
        let res_names = ResourceNames {
            texture2d: lexer.extras.get_or_intern_static("Texture2D"),
            texture3d: lexer.extras.get_or_intern_static("Texture3D"),
            texture_cube: lexer.extras.get_or_intern_static("TextureCube"),
            sampler_state: lexer.extras.get_or_intern_static("SamplerState"),
        };

        let mut parser = Parser {
            lexer,
            spans: SpanTable::new(),
            errors: vec![],
            res_names,
            curr_token: Token::EOF,
            curr_span: Span::default(),
            peek_token: Token::EOF,
            peek_span: Span::default(),
        };
        // Fill the two-token window.
        parser.advance();
        parser.advance();
        parser
    }

    /// Shouldn't be called directly. A `Poisoned` token becomes a single
    /// `LexError` and is skipped so one bad character never cascades.
    fn advance(&mut self) {
        self.curr_token = self.peek_token;
        self.curr_span = self.peek_span.clone();

        loop {
            self.peek_token = self.lexer.next().unwrap_or(Token::EOF);
            self.peek_span = self.lexer.span();
            if self.peek_token == Token::Poisoned {
                self.errors
                    .push(CinderError::LexError(self.peek_span.clone()));
            } else {
                break;
            }
        }
    }

    /// Advances to the next token and returns the previous span.
    fn skip(&mut self) -> Span {
        let span = self.curr_span.clone();
        self.advance();
        span
    }

    /// Advances to the next token, records the span and returns its id.
    fn consume(&mut self) -> Id {
        let span = self.curr_span.clone();
        self.advance();
        self.spans.push(span)
    }

    /// Like `consume`, but panics if the current token isn't the expected
    /// one. Used where the caller already matched on the token.
    fn consume_expect(&mut self, token: Token) -> Id {
        assert!(
            self.curr_token == token,
            "compiler error: expected '{:?}' token",
            token
        );
        self.consume()
    }

    fn expect<T: From<ErrorNode>>(&mut self, token: Token, sync: &[Token]) -> Result<Id, T> {
        if self.curr_token == token {
            Ok(self.consume())
        } else {
            Err(self.err_consume(SyntaxErrorKind::ExpectedToken(token, self.curr_token), sync))
        }
    }

    fn expect_identifier<T: From<ErrorNode>>(&mut self, sync: &[Token]) -> Result<Name, T> {
        match self.curr_token {
            Token::Identifier(spur) => Ok(Name {
                id: self.consume(),
                spur,
            }),
            _ => Err(self.err_consume(
                SyntaxErrorKind::ExpectedToken(Token::Identifier(Spur::default()), self.curr_token),
                sync,
            )),
        }
    }

    /// Records `err` at the current position and skips forward until one of
    /// `sync_tokens`. The returned error node's span covers everything that
    /// was skipped.
    fn err_consume_with<T>(
        &mut self,
        err: impl FnOnce(Span) -> CinderError,
        sync_tokens: &[Token],
    ) -> T
    where
        T: From<ErrorNode>,
    {
        let err_span = self.curr_span.clone();
        let ast_node_id = self.spans.push(err_span.clone());
        self.errors.push(err(err_span));

        while !sync_tokens.contains(&self.curr_token) {
            self.spans[ast_node_id].end = self.curr_span.end;
            self.advance();
        }

        ErrorNode(ast_node_id).into()
    }

    fn err_consume<T>(&mut self, kind: SyntaxErrorKind, sync_tokens: &[Token]) -> T
    where
        T: From<ErrorNode>,
    {
        self.err_consume_with(|span| CinderError::SyntaxError(kind, span), sync_tokens)
    }

    /// Consumes a trailing statement terminator after error recovery so the
    /// next construct starts cleanly.
    fn sync_terminator(&mut self) {
        if self.curr_token == Token::Semicolon {
            self.skip();
        }
    }

    /// Parses `type name [n] [: SEMANTIC] ;`. Semantics on cbuffer fields
    /// are a syntax error but parsing continues.
    fn parse_field<T: From<ErrorNode>>(&mut self, allow_semantic: bool) -> Result<Field, T> {
        let ty = self.expect_identifier(&Self::ITEM_SYNC)?;
        let name = self.expect_identifier(&Self::ITEM_SYNC)?;

        let array = if self.curr_token == Token::LeftBracket {
            let bracket_id = self.consume();
            let len = match self.curr_token {
                Token::Int(n) if n > 0 => {
                    self.spans[bracket_id].end = self.curr_span.end;
                    self.advance();
                    n as u32
                }
                _ => {
                    return Err(
                        self.err_consume(SyntaxErrorKind::BadArrayLength, &Self::ITEM_SYNC)
                    )
                }
            };
            self.expect::<T>(Token::RightBracket, &Self::ITEM_SYNC)?;
            Some((bracket_id, len))
        } else {
            None
        };

        let semantic = if self.curr_token == Token::Colon {
            let colon_span = self.skip();
            if !allow_semantic {
                self.errors.push(CinderError::SyntaxError(
                    SyntaxErrorKind::SemanticOnCBufferField,
                    colon_span,
                ));
            }
            Some(self.expect_identifier(&Self::ITEM_SYNC)?)
        } else {
            None
        };

        self.expect::<T>(Token::Semicolon, &Self::ITEM_SYNC)?;

        Ok(Field {
            ty,
            name,
            array,
            semantic,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{ast::Item, error::CinderError, lexer};

    #[test]
    fn empty_source_parses_to_empty_ast() {
        let ast = super::parse(lexer::lex(""));
        assert!(ast.items.is_empty());
        assert!(ast.errors.is_empty());
    }

    #[test]
    fn lex_error_is_reported_once_and_parsing_continues() {
        let ast = super::parse(lexer::lex("struct A { float x; }\n@\nstruct B { float y; }"));
        let lex_errors = ast
            .errors
            .iter()
            .filter(|e| matches!(e, CinderError::LexError(_)))
            .count();
        assert_eq!(lex_errors, 1);
        let structs = ast
            .items
            .iter()
            .filter(|i| matches!(i, Item::Struct { .. }))
            .count();
        assert_eq!(structs, 2);
    }

    #[test]
    fn error_recovery_reaches_later_declarations() {
        let src = "struct Broken { float4 }\nstruct Fine { float4 color : COLOR0; }";
        let ast = super::parse(lexer::lex(src));
        assert!(!ast.errors.is_empty());
        assert!(ast
            .items
            .iter()
            .any(|i| matches!(i, Item::Struct { name, .. } if ast.resolve(name.spur) == "Fine")));
    }
}
