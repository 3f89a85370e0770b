use crate::lexer::Token;
use codespan_reporting::diagnostic::{Diagnostic, Label};
use logos::Span;
use std::io;

/// Every diagnostic the compiler can produce. Errors suppress later stages
/// for the compile unit, warnings never do.
#[derive(Debug, thiserror::Error)]
pub enum CinderError {
    #[error("IO error \"{0}\"")]
    IoError(#[from] io::Error),

    #[error("unrecognized character sequence")]
    LexError(Span),

    #[error("{0}")]
    SyntaxError(SyntaxErrorKind, Span),

    #[error("{0}")]
    ScopeError(ScopeErrorKind, Span),

    #[error("{0}")]
    TypeError(TypeErrorKind, Span),

    #[error("no overload of '{name}' matches argument types ({args})")]
    NoMatchingOverload { name: String, args: String, span: Span },

    #[error("call to '{name}' is ambiguous, {candidates} overloads match")]
    AmbiguousCall {
        name: String,
        candidates: usize,
        span: Span,
    },

    #[error("{0}")]
    StageContractError(StageContractErrorKind, Span),

    #[error("binding slot {slot} is claimed by both '{first}' and '{second}'")]
    BindingConflict {
        slot: u32,
        first: String,
        second: String,
        span: Span,
    },

    #[error("intrinsic '{name}' has no mapping for the {target} target")]
    UnsupportedIntrinsic {
        name: String,
        target: &'static str,
        span: Span,
    },

    #[error("global resource '{0}' is never referenced by an entry point")]
    UnusedResource(String, Span),

    #[error("internal compiler error: {0}")]
    InternalError(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SyntaxErrorKind {
    #[error("expected expression, found '{0}'")]
    ExpectedExpression(Token),
    #[error("expected '{0}', found '{1}'")]
    ExpectedToken(Token, Token),
    #[error("expected a declaration, found '{0}'")]
    ExpectedDeclaration(Token),
    #[error("expected a statement, found '{0}'")]
    ExpectedStatement(Token),
    #[error("expected a type name, found '{0}'")]
    ExpectedTypeName(Token),
    #[error("cbuffer fields cannot carry a semantic")]
    SemanticOnCBufferField,
    #[error("malformed attribute '{0}'")]
    MalformedAttribute(String),
    #[error("array length must be a positive integer literal")]
    BadArrayLength,
    #[error("only texture and sampler resources may be declared as bare globals")]
    BadGlobalDeclaration,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ScopeErrorKind {
    #[error("undeclared identifier '{0}'")]
    UndeclaredIdentifier(String),
    #[error("unknown type name '{0}'")]
    UndeclaredType(String),
    #[error("'{0}' is declared twice at file scope")]
    DuplicateDeclaration(String),
    #[error("struct '{0}' contains itself")]
    RecursiveStruct(String),
    #[error("declarations are only allowed at file scope")]
    NestedDeclaration,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeErrorKind {
    #[error("operator '{op}' cannot be applied to '{left}' and '{right}'")]
    BinaryMismatch {
        op: &'static str,
        left: String,
        right: String,
    },
    #[error("operator '{op}' cannot be applied to '{operand}'")]
    UnaryMismatch { op: &'static str, operand: String },
    #[error("'{ty}' has no field '{field}'")]
    UnknownField { ty: String, field: String },
    #[error("invalid swizzle '{swizzle}' on '{ty}'")]
    BadSwizzle { swizzle: String, ty: String },
    #[error("a swizzle with repeated components cannot be assigned to")]
    RepeatedSwizzleWrite,
    #[error("'{0}' cannot be indexed")]
    NotIndexable(String),
    #[error("index must be an integer, found '{0}'")]
    NonIntegerIndex(String),
    #[error("cannot assign '{from}' to '{to}'")]
    AssignMismatch { from: String, to: String },
    #[error("'{0}' is not assignable")]
    NotAssignable(String),
    #[error("expected '{expected}', found '{found}'")]
    Expected { expected: String, found: String },
    #[error("constructor '{ty}' expects {expected} components, found {found}")]
    BadConstructor {
        ty: String,
        expected: u32,
        found: u32,
    },
    #[error("return type is '{expected}' but the returned value is '{found}'")]
    ReturnMismatch { expected: String, found: String },
    #[error("condition must be 'bool', found '{0}'")]
    NonBoolCondition(String),
    #[error("'{0}' is not callable")]
    NotCallable(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StageContractErrorKind {
    #[error("vertex entry point '{0}' must return a struct with an SV_Position field")]
    MissingPosition(String),
    #[error("vertex entry point '{0}' declares more than one SV_Position field")]
    DuplicatePosition(String),
    #[error("fragment input field '{field}' uses vertex-only semantic '{semantic}'")]
    VertexOnlySemantic { field: String, semantic: String },
    #[error("fragment entry point '{0}' must return float4 or a struct of SV_Target fields")]
    BadFragmentOutput(String),
    #[error("compute entry point '{0}' must declare a thread-group size: #[compute(x, y, z)]")]
    MissingThreadGroupSize(String),
    #[error("compute entry point '{0}' must return void")]
    ComputeReturnsValue(String),
    #[error("parameter '{param}' of '{entry}' is not valid for the {stage} stage")]
    BadStageParameter {
        entry: String,
        param: String,
        stage: &'static str,
    },
    #[error("unknown semantic '{0}'")]
    UnknownSemantic(String),
    #[error("field '{0}' of a stage IO struct needs a semantic")]
    MissingSemantic(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl CinderError {
    pub fn severity(&self) -> Severity {
        match self {
            CinderError::UnusedResource(_, _) => Severity::Warning,
            _ => Severity::Error,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            CinderError::IoError(_) | CinderError::InternalError(_) => None,
            CinderError::LexError(span)
            | CinderError::SyntaxError(_, span)
            | CinderError::ScopeError(_, span)
            | CinderError::TypeError(_, span)
            | CinderError::NoMatchingOverload { span, .. }
            | CinderError::AmbiguousCall { span, .. }
            | CinderError::StageContractError(_, span)
            | CinderError::BindingConflict { span, .. }
            | CinderError::UnsupportedIntrinsic { span, .. }
            | CinderError::UnusedResource(_, span) => Some(span.clone()),
        }
    }

    pub fn report(&self) -> Diagnostic<()> {
        let text = format!("{}", self);
        let diagnostic = match self.severity() {
            Severity::Error => Diagnostic::error(),
            Severity::Warning => Diagnostic::warning(),
        };
        match self.span() {
            Some(span) => diagnostic
                .with_message(text.clone())
                .with_labels(vec![Label::primary((), span).with_message(text)]),
            None => diagnostic.with_message(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_mismatch_names_both_types_and_operator() {
        let err = CinderError::TypeError(
            TypeErrorKind::BinaryMismatch {
                op: "+",
                left: "float4".to_string(),
                right: "int".to_string(),
            },
            4..9,
        );
        let text = format!("{}", err);
        assert!(text.contains("float4"));
        assert!(text.contains("int"));
        assert!(text.contains('+'));
    }

    #[test]
    fn unused_resource_is_a_warning() {
        let err = CinderError::UnusedResource("albedo".to_string(), 0..6);
        assert_eq!(err.severity(), Severity::Warning);
        assert_eq!(err.span(), Some(0..6));
    }
}
