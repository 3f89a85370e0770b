use super::Parser;
use crate::{
    ast::{BinOpKind, LocalVar, Name, Stmt},
    error::{CinderError, ScopeErrorKind, SyntaxErrorKind},
    lexer::Token,
};

impl Parser<'_> {
    pub(super) fn parse_block(&mut self) -> Stmt {
        let id = self.consume_expect(Token::LeftBrace);

        let mut stmts = vec![];
        while self.curr_token != Token::RightBrace && self.curr_token != Token::EOF {
            stmts.push(self.parse_stmt());
        }

        match self.curr_token {
            Token::RightBrace => self.spans[id].end = self.skip().end,
            _ => {
                let _: Stmt = self.err_consume(
                    SyntaxErrorKind::ExpectedToken(Token::RightBrace, self.curr_token),
                    &Self::STMT_SYNC,
                );
            }
        }

        Stmt::Block(id, stmts)
    }

    pub(super) fn parse_stmt(&mut self) -> Stmt {
        match self.curr_token {
            Token::LeftBrace => self.parse_block(),
            Token::If => self.parse_if(),
            Token::For => self.parse_for(),
            Token::Return => self.parse_return(),
            Token::Struct | Token::CBuffer => {
                // Consume the keyword first: it is its own sync token and
                // recovery has to move past it.
                self.skip();
                let stmt = self.err_consume_with(
                    |span| CinderError::ScopeError(ScopeErrorKind::NestedDeclaration, span),
                    &Self::STMT_SYNC,
                );
                self.sync_terminator();
                stmt
            }
            Token::Semicolon => {
                // Empty statement.
                let id = self.consume();
                Stmt::Block(id, vec![])
            }
            Token::Identifier(_) if matches!(self.peek_token, Token::Identifier(_)) => {
                self.parse_local_var()
            }
            _ => self.parse_assign_or_expr(true),
        }
    }

    fn parse_if(&mut self) -> Stmt {
        let if_id = self.consume_expect(Token::If);

        if let Err(err) = self.expect::<Stmt>(Token::LeftParen, &Self::STMT_SYNC) {
            return err;
        }
        let cond = self.parse_expr(0);
        if let Err(err) = self.expect::<Stmt>(Token::RightParen, &Self::STMT_SYNC) {
            return err;
        }

        let then_branch = Box::new(self.parse_stmt());

        let else_branch = if self.curr_token == Token::Else {
            let else_id = self.consume();
            Some((else_id, Box::new(self.parse_stmt())))
        } else {
            None
        };

        Stmt::If {
            if_id,
            cond,
            then_branch,
            else_branch,
        }
    }

    fn parse_for(&mut self) -> Stmt {
        let for_id = self.consume_expect(Token::For);

        if let Err(err) = self.expect::<Stmt>(Token::LeftParen, &Self::STMT_SYNC) {
            return err;
        }

        let init = match self.curr_token {
            Token::Identifier(_) if matches!(self.peek_token, Token::Identifier(_)) => {
                self.parse_local_var()
            }
            _ => self.parse_assign_or_expr(true),
        };

        let cond = self.parse_expr(0);
        if let Err(err) = self.expect::<Stmt>(Token::Semicolon, &Self::STMT_SYNC) {
            return err;
        }

        let step = self.parse_assign_or_expr(false);

        if let Err(err) = self.expect::<Stmt>(Token::RightParen, &Self::STMT_SYNC) {
            return err;
        }

        let body = Box::new(self.parse_stmt());

        Stmt::For {
            for_id,
            init: Box::new(init),
            cond,
            step: Box::new(step),
            body,
        }
    }

    fn parse_return(&mut self) -> Stmt {
        let id = self.consume_expect(Token::Return);

        let expr = if self.curr_token == Token::Semicolon {
            None
        } else {
            Some(self.parse_expr(0))
        };

        match self.expect::<Stmt>(Token::Semicolon, &Self::STMT_SYNC) {
            Ok(_) => {}
            Err(err) => {
                self.sync_terminator();
                return err;
            }
        }

        Stmt::Return(id, expr)
    }

    fn parse_local_var(&mut self) -> Stmt {
        let ty = match self.curr_token {
            Token::Identifier(spur) => Name {
                id: self.consume(),
                spur,
            },
            _ => unreachable!("caller matched an identifier"),
        };

        let name = match self.expect_identifier(&Self::STMT_SYNC) {
            Ok(name) => name,
            Err(err) => {
                self.sync_terminator();
                return err;
            }
        };

        // `float g(` inside a body is a nested function, not a local.
        if self.curr_token == Token::LeftParen {
            let stmt = self.err_consume_with(
                |span| CinderError::ScopeError(ScopeErrorKind::NestedDeclaration, span),
                &Self::STMT_SYNC,
            );
            self.sync_terminator();
            return stmt;
        }

        let array = if self.curr_token == Token::LeftBracket {
            let bracket_id = self.consume();
            let len = match self.curr_token {
                Token::Int(n) if n > 0 => {
                    self.advance();
                    n as u32
                }
                _ => {
                    let stmt: Stmt =
                        self.err_consume(SyntaxErrorKind::BadArrayLength, &Self::STMT_SYNC);
                    self.sync_terminator();
                    return stmt;
                }
            };
            if let Err(err) = self.expect::<Stmt>(Token::RightBracket, &Self::STMT_SYNC) {
                self.sync_terminator();
                return err;
            }
            Some((bracket_id, len))
        } else {
            None
        };

        let init = if self.curr_token == Token::Equal {
            self.skip();
            Some(self.parse_expr(0))
        } else {
            None
        };

        if let Err(err) = self.expect::<Stmt>(Token::Semicolon, &Self::STMT_SYNC) {
            self.sync_terminator();
            return err;
        }

        Stmt::LocalVar(LocalVar {
            ty,
            name,
            array,
            init,
        })
    }

    /// Parses `lvalue op= expr` or a bare expression. With `terminated` the
    /// statement must end in a semicolon (for-loop steps have none).
    fn parse_assign_or_expr(&mut self, terminated: bool) -> Stmt {
        let expr = match self.curr_token {
            Token::Identifier(_)
            | Token::Int(_)
            | Token::Float(_)
            | Token::True
            | Token::False
            | Token::Minus
            | Token::Bang
            | Token::LeftParen => self.parse_expr(0),
            _ => {
                let stmt: Stmt = self.err_consume(
                    SyntaxErrorKind::ExpectedStatement(self.curr_token),
                    &Self::STMT_SYNC,
                );
                self.sync_terminator();
                return stmt;
            }
        };

        let stmt = if self.curr_token.is_assignment() {
            let op = match self.curr_token {
                Token::Equal => None,
                Token::PlusEqual => Some(BinOpKind::Add),
                Token::MinusEqual => Some(BinOpKind::Sub),
                Token::StarEqual => Some(BinOpKind::Mul),
                Token::SlashEqual => Some(BinOpKind::Div),
                _ => unreachable!(),
            };
            let eq_id = self.consume();
            let rhs = self.parse_expr(0);
            Stmt::Assign {
                eq_id,
                op,
                lhs: expr,
                rhs,
            }
        } else {
            Stmt::Expr(expr)
        };

        if terminated {
            if let Err(err) = self.expect::<Stmt>(Token::Semicolon, &Self::STMT_SYNC) {
                self.sync_terminator();
                return err;
            }
        }

        stmt
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        ast::{BinOpKind, Item, Stmt},
        lexer, parser,
    };

    fn body_of(src: &str) -> Vec<Stmt> {
        let ast = parser::parse(lexer::lex(src));
        assert!(ast.errors.is_empty(), "{:?}", ast.errors);
        match ast.items.into_iter().next().unwrap() {
            Item::Fun(fun) => match fun.body {
                Stmt::Block(_, stmts) => stmts,
                other => panic!("expected block, got {:?}", other),
            },
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn local_declaration_and_assignment() {
        let stmts = body_of("void f() { float4 c = x; c.x += 1.0; }");
        assert!(matches!(stmts[0], Stmt::LocalVar(_)));
        assert!(matches!(
            stmts[1],
            Stmt::Assign {
                op: Some(BinOpKind::Add),
                ..
            }
        ));
    }

    #[test]
    fn if_else_and_for() {
        let stmts = body_of(
            "void f() { if (a < b) { return; } else { b = a; } for (int i = 0; i < 4; i += 1) { b = b + i; } }",
        );
        assert!(matches!(stmts[0], Stmt::If { else_branch: Some(_), .. }));
        assert!(matches!(stmts[1], Stmt::For { .. }));
    }

    #[test]
    fn nested_struct_is_a_scope_error() {
        let ast = parser::parse(lexer::lex("void f() { struct S { float x; } }"));
        assert!(ast
            .errors
            .iter()
            .any(|e| matches!(e, crate::error::CinderError::ScopeError(_, _))));
    }

    #[test]
    fn missing_semicolon_recovers_at_next_statement() {
        let ast = parser::parse(lexer::lex("void f() { float x = 1.0\nfloat y = 2.0; }"));
        assert_eq!(ast.errors.len(), 1);
    }
}
