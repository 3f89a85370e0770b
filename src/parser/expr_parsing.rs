use super::Parser;
use crate::{
    ast::{BinOpKind, Expr, Name, UnOpKind},
    error::SyntaxErrorKind,
    lexer::Token,
};

impl Parser<'_> {
    pub(super) fn parse_expr(&mut self, min_binding_power: u8) -> Expr {
        let lhs = self.parse_prefix();
        self.parse_infix(lhs, min_binding_power)
    }

    fn parse_prefix(&mut self) -> Expr {
        match self.curr_token {
            Token::Int(i) => Expr::Int(self.consume(), i),
            Token::Float(f) => Expr::Float(self.consume(), f),
            Token::True => Expr::Bool(self.consume(), true),
            Token::False => Expr::Bool(self.consume(), false),
            Token::Identifier(spur) => {
                let name = Name {
                    id: self.consume(),
                    spur,
                };
                if self.curr_token == Token::LeftParen {
                    self.parse_call(name)
                } else {
                    Expr::Identifier(name)
                }
            }
            Token::Minus => {
                let id = self.consume();
                let operand = self.parse_expr(Token::PREFIX_BINDING_POWER);
                Expr::Unary(id, UnOpKind::Neg, Box::new(operand))
            }
            Token::Bang => {
                let id = self.consume();
                let operand = self.parse_expr(Token::PREFIX_BINDING_POWER);
                Expr::Unary(id, UnOpKind::Not, Box::new(operand))
            }
            Token::LeftParen => {
                self.skip();
                let expr = self.parse_expr(0);
                if let Err(err) = self.expect::<Expr>(Token::RightParen, &Self::EXPR_SYNC) {
                    return err;
                }
                expr
            }
            _ => self.err_consume(
                SyntaxErrorKind::ExpectedExpression(self.curr_token),
                &Self::EXPR_SYNC,
            ),
        }
    }

    fn parse_call(&mut self, name: Name) -> Expr {
        let call_id = self.consume_expect(Token::LeftParen);

        let mut args = vec![];
        while self.curr_token != Token::RightParen && self.curr_token != Token::EOF {
            args.push(self.parse_expr(0));

            if self.curr_token == Token::Comma {
                self.skip();
            } else if self.curr_token != Token::RightParen {
                return self.err_consume(
                    SyntaxErrorKind::ExpectedToken(Token::RightParen, self.curr_token),
                    &Self::EXPR_SYNC,
                );
            }
        }

        match self.curr_token {
            Token::RightParen => self.spans[call_id].end = self.skip().end,
            _ => {
                return self.err_consume(
                    SyntaxErrorKind::ExpectedToken(Token::RightParen, self.curr_token),
                    &Self::EXPR_SYNC,
                )
            }
        }

        Expr::Call(call_id, name, args)
    }

    fn parse_infix(&mut self, mut tree: Expr, min_binding_power: u8) -> Expr {
        loop {
            let binding_power = match self.curr_token.check_infix_binding_power(min_binding_power)
            {
                Some(bp) => bp,
                None => break,
            };

            tree = match self.curr_token {
                Token::Dot => {
                    let id = self.consume();
                    match self.expect_identifier::<Expr>(&Self::EXPR_SYNC) {
                        Ok(member) => Expr::Member(id, Box::new(tree), member),
                        Err(err) => return err,
                    }
                }
                Token::LeftBracket => {
                    let id = self.consume();
                    let index = self.parse_expr(0);
                    match self.curr_token {
                        Token::RightBracket => {
                            self.spans[id].end = self.skip().end;
                            Expr::Index(id, Box::new(tree), Box::new(index))
                        }
                        _ => {
                            return self.err_consume(
                                SyntaxErrorKind::ExpectedToken(
                                    Token::RightBracket,
                                    self.curr_token,
                                ),
                                &Self::EXPR_SYNC,
                            )
                        }
                    }
                }
                token => {
                    let kind = match token {
                        Token::Plus => BinOpKind::Add,
                        Token::Minus => BinOpKind::Sub,
                        Token::Star => BinOpKind::Mul,
                        Token::Slash => BinOpKind::Div,
                        Token::Percent => BinOpKind::Rem,
                        Token::DoubleEqual => BinOpKind::Eq,
                        Token::BangEqual => BinOpKind::Neq,
                        Token::Less => BinOpKind::Less,
                        Token::LessEqual => BinOpKind::LessEq,
                        Token::Greater => BinOpKind::Greater,
                        Token::GreaterEqual => BinOpKind::GreaterEq,
                        Token::AndAnd => BinOpKind::And,
                        Token::OrOr => BinOpKind::Or,
                        _ => unreachable!("token has a binding power but no operator kind"),
                    };
                    let id = self.consume();
                    let rhs = self.parse_expr(binding_power);
                    Expr::Binary(id, kind, Box::new(tree), Box::new(rhs))
                }
            };
        }

        tree
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        ast::{BinOpKind, Expr, Item, Stmt},
        lexer, parser,
    };

    fn expr_of(src: &str) -> Expr {
        let full = format!("void f() {{ return {}; }}", src);
        let ast = parser::parse(lexer::lex(&full));
        assert!(ast.errors.is_empty(), "{:?}", ast.errors);
        match ast.items.into_iter().next().unwrap() {
            Item::Fun(fun) => match fun.body {
                Stmt::Block(_, mut stmts) => match stmts.remove(0) {
                    Stmt::Return(_, Some(expr)) => expr,
                    other => panic!("expected return, got {:?}", other),
                },
                other => panic!("expected block, got {:?}", other),
            },
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn precedence_mul_over_add() {
        match expr_of("a + b * c") {
            Expr::Binary(_, BinOpKind::Add, _, rhs) => {
                assert!(matches!(*rhs, Expr::Binary(_, BinOpKind::Mul, _, _)));
            }
            other => panic!("expected +, got {:?}", other),
        }
    }

    #[test]
    fn same_precedence_is_left_associative() {
        match expr_of("a - b - c") {
            Expr::Binary(_, BinOpKind::Sub, lhs, _) => {
                assert!(matches!(*lhs, Expr::Binary(_, BinOpKind::Sub, _, _)));
            }
            other => panic!("expected -, got {:?}", other),
        }
    }

    #[test]
    fn member_and_index_chain() {
        match expr_of("verts[i].position.xy") {
            Expr::Member(_, inner, _) => {
                assert!(matches!(*inner, Expr::Member(_, _, _)));
            }
            other => panic!("expected member access, got {:?}", other),
        }
    }

    #[test]
    fn call_with_arguments() {
        match expr_of("lerp(a, b, 0.5)") {
            Expr::Call(_, _, args) => assert_eq!(args.len(), 3),
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn comparison_binds_looser_than_arithmetic() {
        match expr_of("a + b < c * d") {
            Expr::Binary(_, BinOpKind::Less, lhs, rhs) => {
                assert!(matches!(*lhs, Expr::Binary(_, BinOpKind::Add, _, _)));
                assert!(matches!(*rhs, Expr::Binary(_, BinOpKind::Mul, _, _)));
            }
            other => panic!("expected <, got {:?}", other),
        }
    }

    #[test]
    fn unary_binds_tighter_than_binary() {
        match expr_of("-a * b") {
            Expr::Binary(_, BinOpKind::Mul, lhs, _) => {
                assert!(matches!(*lhs, Expr::Unary(_, _, _)));
            }
            other => panic!("expected *, got {:?}", other),
        }
    }
}
