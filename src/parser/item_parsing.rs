use super::Parser;
use crate::{
    ast::{Attr, Attrs, FunDecl, Id, Item, Name, TextureDim},
    error::{CinderError, SyntaxErrorKind},
    lexer::Token,
};

impl Parser<'_> {
    pub(super) fn parse_item(&mut self) -> Item {
        let attrs = match self.curr_token {
            Token::HashBracket => self.parse_attributes(),
            _ => Attrs::None,
        };

        match self.curr_token {
            Token::Struct => self.parse_struct(attrs),
            Token::CBuffer => self.parse_cbuffer(attrs),
            Token::Void => {
                let void_id = self.consume_expect(Token::Void);
                self.parse_fun_header(attrs, None, Some(void_id))
            }
            Token::Identifier(_) => self.parse_global_or_fun(attrs),
            _ => {
                let item = self.err_consume(
                    SyntaxErrorKind::ExpectedDeclaration(self.curr_token),
                    &Self::ITEM_SYNC,
                );
                // A stray terminator is consumed so the next iteration makes
                // progress instead of reporting the same token forever.
                if matches!(self.curr_token, Token::Semicolon | Token::RightBrace) {
                    self.skip();
                }
                item
            }
        }
    }

    fn parse_attributes(&mut self) -> Attrs {
        let brackets_id = self.consume_expect(Token::HashBracket);
        let mut attrs = vec![];

        while self.curr_token != Token::RightBracket {
            let name = match self.expect_identifier(&Self::ITEM_SYNC) {
                Ok(name) => name,
                Err(err) => return err,
            };

            attrs.push(Attr(name, self.parse_delimited_tokens()));

            if self.curr_token == Token::Comma {
                self.skip();
            } else if self.curr_token != Token::RightBracket {
                return self.err_consume(
                    SyntaxErrorKind::ExpectedToken(Token::RightBracket, self.curr_token),
                    &Self::ITEM_SYNC,
                );
            }
        }

        self.spans[brackets_id].end = self.skip().end;
        Attrs::Ok(brackets_id, attrs)
    }

    /// If the current token isn't one of '(', '{', '[' returns an empty vec,
    /// otherwise collects everything up to the matching delimiter.
    fn parse_delimited_tokens(&mut self) -> Vec<(Id, Token)> {
        let delimiter = match self.curr_token {
            Token::LeftBrace => Token::RightBrace,
            Token::LeftBracket => Token::RightBracket,
            Token::LeftParen => Token::RightParen,
            _ => return vec![],
        };

        let mut vec = vec![];
        while self.curr_token != delimiter && self.curr_token != Token::EOF {
            let token = self.curr_token;
            let id = self.consume();
            vec.push((id, token));
        }

        let token = self.curr_token;
        let id = self.consume();
        vec.push((id, token));

        vec
    }

    fn parse_struct(&mut self, attrs: Attrs) -> Item {
        if let Attrs::Ok(id, _) | Attrs::Error(id) = attrs {
            self.errors.push(CinderError::SyntaxError(
                SyntaxErrorKind::MalformedAttribute("attributes are not valid on structs".into()),
                self.spans[id].clone(),
            ));
        }

        let struct_id = self.consume_expect(Token::Struct);

        let name = match self.expect_identifier(&Self::ITEM_SYNC) {
            Ok(name) => name,
            Err(err) => return err,
        };

        let fields = match self.parse_field_block(true) {
            Ok(fields) => fields,
            Err(err) => return err,
        };

        Item::Struct {
            struct_id,
            name,
            fields,
        }
    }

    fn parse_cbuffer(&mut self, attrs: Attrs) -> Item {
        let cbuffer_id = self.consume_expect(Token::CBuffer);

        let name = match self.expect_identifier(&Self::ITEM_SYNC) {
            Ok(name) => name,
            Err(err) => return err,
        };

        let fields = match self.parse_field_block(false) {
            Ok(fields) => fields,
            Err(err) => return err,
        };

        Item::CBuffer {
            cbuffer_id,
            attrs,
            name,
            fields,
        }
    }

    fn parse_field_block<T: From<super::ErrorNode>>(
        &mut self,
        allow_semantic: bool,
    ) -> Result<Vec<crate::ast::Field>, T> {
        self.expect::<T>(Token::LeftBrace, &Self::ITEM_SYNC)?;

        let mut fields = vec![];
        while self.curr_token != Token::RightBrace && self.curr_token != Token::EOF {
            fields.push(self.parse_field(allow_semantic)?);
        }

        self.expect::<T>(Token::RightBrace, &Self::ITEM_SYNC)?;
        // C habit: a semicolon after the closing brace is accepted.
        self.sync_terminator();
        Ok(fields)
    }

    fn parse_global_or_fun(&mut self, attrs: Attrs) -> Item {
        let ty = match self.curr_token {
            Token::Identifier(spur) => Name {
                id: self.consume(),
                spur,
            },
            _ => unreachable!("caller matched an identifier"),
        };

        let name = match self.expect_identifier(&Self::ITEM_SYNC) {
            Ok(name) => name,
            Err(err) => return err,
        };

        match self.curr_token {
            Token::Semicolon => {
                self.skip();
                let dim = if ty.spur == self.res_names.texture2d {
                    Some(TextureDim::Two)
                } else if ty.spur == self.res_names.texture3d {
                    Some(TextureDim::Three)
                } else if ty.spur == self.res_names.texture_cube {
                    Some(TextureDim::Cube)
                } else {
                    None
                };

                if let Some(dim) = dim {
                    Item::Texture {
                        decl_id: ty.id,
                        attrs,
                        dim,
                        name,
                    }
                } else if ty.spur == self.res_names.sampler_state {
                    Item::Sampler {
                        decl_id: ty.id,
                        attrs,
                        name,
                    }
                } else {
                    self.errors.push(CinderError::SyntaxError(
                        SyntaxErrorKind::BadGlobalDeclaration,
                        self.spans[ty.id].clone(),
                    ));
                    Item::Error(ty.id)
                }
            }
            Token::LeftParen => self.parse_fun_body(attrs, Some(ty), None, name),
            _ => self.err_consume(
                SyntaxErrorKind::ExpectedToken(Token::LeftParen, self.curr_token),
                &Self::ITEM_SYNC,
            ),
        }
    }

    fn parse_fun_header(&mut self, attrs: Attrs, ret: Option<Name>, ret_void_id: Option<Id>) -> Item {
        let name = match self.expect_identifier(&Self::ITEM_SYNC) {
            Ok(name) => name,
            Err(err) => return err,
        };
        self.parse_fun_body(attrs, ret, ret_void_id, name)
    }

    fn parse_fun_body(
        &mut self,
        attrs: Attrs,
        ret: Option<Name>,
        ret_void_id: Option<Id>,
        name: Name,
    ) -> Item {
        let paren_id = match self.expect(Token::LeftParen, &Self::ITEM_SYNC) {
            Ok(id) => id,
            Err(err) => return err,
        };

        let mut params = vec![];
        while self.curr_token != Token::RightParen && self.curr_token != Token::EOF {
            let param = match self.parse_param() {
                Ok(param) => param,
                Err(err) => return err,
            };
            params.push(param);

            if self.curr_token == Token::Comma {
                self.skip();
            } else if self.curr_token != Token::RightParen {
                return self.err_consume(
                    SyntaxErrorKind::ExpectedToken(Token::RightParen, self.curr_token),
                    &Self::ITEM_SYNC,
                );
            }
        }

        self.spans[paren_id].end = match self.curr_token {
            Token::RightParen => self.skip().end,
            _ => {
                return self.err_consume(
                    SyntaxErrorKind::ExpectedToken(Token::RightParen, self.curr_token),
                    &Self::ITEM_SYNC,
                )
            }
        };

        let body = match self.curr_token {
            Token::LeftBrace => self.parse_block(),
            _ => {
                return self.err_consume(
                    SyntaxErrorKind::ExpectedToken(Token::LeftBrace, self.curr_token),
                    &Self::ITEM_SYNC,
                )
            }
        };

        Item::Fun(Box::new(FunDecl {
            fun_id: name.id,
            attrs,
            ret,
            ret_void_id,
            name,
            paren_id,
            params,
            body,
        }))
    }

    fn parse_param<T: From<super::ErrorNode>>(&mut self) -> Result<crate::ast::Param, T> {
        let ty = self.expect_identifier(&Self::ITEM_SYNC)?;
        let name = self.expect_identifier(&Self::ITEM_SYNC)?;

        let semantic = if self.curr_token == Token::Colon {
            self.skip();
            Some(self.expect_identifier(&Self::ITEM_SYNC)?)
        } else {
            None
        };

        Ok(crate::ast::Param { ty, name, semantic })
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        ast::{Item, TextureDim},
        lexer, parser,
    };

    #[test]
    fn parses_struct_with_semantics() {
        let ast = parser::parse(lexer::lex(
            "struct VSOut { float4 position : SV_Position; float2 uv : TEXCOORD0; }",
        ));
        assert!(ast.errors.is_empty());
        match &ast.items[0] {
            Item::Struct { fields, .. } => {
                assert_eq!(fields.len(), 2);
                assert!(fields[0].semantic.is_some());
            }
            other => panic!("expected struct, got {:?}", other),
        }
    }

    #[test]
    fn parses_resources_and_attributes() {
        let src = "#[binding(1)]\nTexture2D albedo;\nSamplerState linear_sampler;\ncbuffer Params { float4x4 mvp; }";
        let ast = parser::parse(lexer::lex(src));
        assert!(ast.errors.is_empty(), "{:?}", ast.errors);
        assert!(matches!(
            ast.items[0],
            Item::Texture {
                dim: TextureDim::Two,
                ..
            }
        ));
        assert!(matches!(ast.items[1], Item::Sampler { .. }));
        assert!(matches!(ast.items[2], Item::CBuffer { .. }));
    }

    #[test]
    fn parses_function_with_params() {
        let src = "float4 shade(float4 color, float amount) { return color * amount; }";
        let ast = parser::parse(lexer::lex(src));
        assert!(ast.errors.is_empty(), "{:?}", ast.errors);
        match &ast.items[0] {
            Item::Fun(fun) => {
                assert_eq!(fun.params.len(), 2);
                assert!(fun.ret.is_some());
            }
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn semantic_on_cbuffer_field_is_rejected() {
        let ast = parser::parse(lexer::lex("cbuffer P { float4 tint : COLOR0; }"));
        assert_eq!(ast.errors.len(), 1);
    }

    #[test]
    fn plain_global_variable_is_rejected() {
        let ast = parser::parse(lexer::lex("float4 g;"));
        assert_eq!(ast.errors.len(), 1);
    }
}
