use lasso::{Rodeo, Spur};
use logos::{Lexer, Logos};
use std::fmt::Display;

pub fn lex(source: &str) -> Lexer<'_, Token> {
    Token::lexer(source)
}

#[derive(Debug, PartialEq, Clone, Copy, Logos)]
#[logos(extras = Rodeo)]
pub enum Token {
    /// (
    #[token("(")]
    LeftParen,
    /// )
    #[token(")")]
    RightParen,
    /// {
    #[token("{")]
    LeftBrace,
    /// }
    #[token("}")]
    RightBrace,
    /// [
    #[token("[")]
    LeftBracket,
    /// ]
    #[token("]")]
    RightBracket,
    /// #[
    #[token("#[")]
    HashBracket,
    /// ,
    #[token(",")]
    Comma,
    /// .
    #[token(".")]
    Dot,
    /// :
    #[token(":")]
    Colon,
    /// ;
    #[token(";")]
    Semicolon,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    #[token("+=")]
    PlusEqual,
    #[token("-=")]
    MinusEqual,
    #[token("*=")]
    StarEqual,
    #[token("/=")]
    SlashEqual,

    #[token("!")]
    Bang,
    #[token("!=")]
    BangEqual,
    #[token("=")]
    Equal,
    #[token("==")]
    DoubleEqual,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEqual,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEqual,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,

    #[regex(r"[_a-zA-Z][_a-zA-Z0-9]*", |lex| lex.extras.get_or_intern(lex.slice()))]
    Identifier(Spur),
    #[regex(r"[0-9]+", |lex| lex.slice().parse())]
    Int(i32),
    #[regex(r"[0-9]+\.[0-9]*", |lex| lex.slice().parse())]
    Float(f32),

    #[token("struct")]
    Struct,
    #[token("cbuffer")]
    CBuffer,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("return")]
    Return,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("void")]
    Void,

    /// End of input sentinel, installed by the parser rather than the lexer.
    #[token("\0")]
    EOF,

    #[error]
    #[regex(r"[ \r\n\t\f]+", logos::skip)]
    #[regex(r"//[^\n]*", logos::skip)]
    #[regex(r"/\*([^*]|\*+[^*/])*\*+/", logos::skip)]
    Poisoned,
}

impl Token {
    /// Infix binding power and associativity. Returns the power only if it
    /// beats `min_binding_power`, following the precedence-climbing loop.
    pub fn check_infix_binding_power(&self, min_binding_power: u8) -> Option<u8> {
        const LEFT: u8 = 0;
        let (binding_power, assoc) = match self {
            Token::OrOr => (10, LEFT),
            Token::AndAnd => (20, LEFT),
            Token::DoubleEqual | Token::BangEqual => (30, LEFT),
            Token::Greater | Token::GreaterEqual | Token::Less | Token::LessEqual => (40, LEFT),
            Token::Plus | Token::Minus => (50, LEFT),
            Token::Star | Token::Slash | Token::Percent => (60, LEFT),
            Token::Dot | Token::LeftBracket => (80, LEFT),
            _ => return None,
        };
        if binding_power + assoc > min_binding_power {
            Some(binding_power)
        } else {
            None
        }
    }

    /// Binding power of unary prefix operators, stronger than any binary
    /// operator but weaker than postfix access.
    pub const PREFIX_BINDING_POWER: u8 = 70;

    pub fn is_assignment(&self) -> bool {
        matches!(
            self,
            Token::Equal
                | Token::PlusEqual
                | Token::MinusEqual
                | Token::StarEqual
                | Token::SlashEqual
        )
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Token::LeftParen => "(",
            Token::RightParen => ")",
            Token::LeftBrace => "{",
            Token::RightBrace => "}",
            Token::LeftBracket => "[",
            Token::RightBracket => "]",
            Token::HashBracket => "#[",
            Token::Comma => ",",
            Token::Dot => ".",
            Token::Colon => ":",
            Token::Semicolon => ";",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::PlusEqual => "+=",
            Token::MinusEqual => "-=",
            Token::StarEqual => "*=",
            Token::SlashEqual => "/=",
            Token::Bang => "!",
            Token::BangEqual => "!=",
            Token::Equal => "=",
            Token::DoubleEqual => "==",
            Token::Greater => ">",
            Token::GreaterEqual => ">=",
            Token::Less => "<",
            Token::LessEqual => "<=",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Identifier(_) => "identifier",
            Token::Int(_) => "integer literal",
            Token::Float(_) => "float literal",
            Token::Struct => "struct",
            Token::CBuffer => "cbuffer",
            Token::If => "if",
            Token::Else => "else",
            Token::For => "for",
            Token::Return => "return",
            Token::True => "true",
            Token::False => "false",
            Token::Void => "void",
            Token::EOF => "end of input",
            Token::Poisoned => "unrecognized character",
        };
        write!(f, "{}", text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        lex(src).collect()
    }

    #[test]
    fn punctuation_and_operators() {
        let tokens = kinds("a += b * 2;");
        assert!(matches!(tokens[0], Token::Identifier(_)));
        assert_eq!(tokens[1], Token::PlusEqual);
        assert!(matches!(tokens[2], Token::Identifier(_)));
        assert_eq!(tokens[3], Token::Star);
        assert_eq!(tokens[4], Token::Int(2));
        assert_eq!(tokens[5], Token::Semicolon);
    }

    #[test]
    fn literals() {
        assert_eq!(kinds("42")[0], Token::Int(42));
        assert_eq!(kinds("4.25")[0], Token::Float(4.25));
        assert_eq!(kinds("1.")[0], Token::Float(1.0));
        assert_eq!(kinds("true false"), vec![Token::True, Token::False]);
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("1 // line\n2 /* block\nstill block */ 3"),
            vec![Token::Int(1), Token::Int(2), Token::Int(3)]
        );
    }

    #[test]
    fn illegal_character_is_poisoned() {
        let tokens = kinds("a @ b");
        assert_eq!(tokens[1], Token::Poisoned);
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn keywords_and_identifiers() {
        let tokens = kinds("struct cbuffer position");
        assert_eq!(tokens[0], Token::Struct);
        assert_eq!(tokens[1], Token::CBuffer);
        assert!(matches!(tokens[2], Token::Identifier(_)));
    }
}
