use crate::ast::{Attrs, Expr, Id, Item, Stmt};

/// Result of parser error recovery; converts into whichever node kind the
/// surrounding grammar production needs.
pub struct ErrorNode(pub Id);

impl From<ErrorNode> for Item {
    fn from(node: ErrorNode) -> Self {
        Item::Error(node.0)
    }
}

impl From<ErrorNode> for Stmt {
    fn from(node: ErrorNode) -> Self {
        Stmt::Error(node.0)
    }
}

impl From<ErrorNode> for Expr {
    fn from(node: ErrorNode) -> Self {
        Expr::Error(node.0)
    }
}

impl From<ErrorNode> for Attrs {
    fn from(node: ErrorNode) -> Self {
        Attrs::Error(node.0)
    }
}

impl From<ErrorNode> for Id {
    fn from(node: ErrorNode) -> Self {
        node.0
    }
}
