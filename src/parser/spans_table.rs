use crate::ast::Id;
use logos::Span;
use std::ops::{Index, IndexMut};

/// Source spans for every AST node, indexed by `Id`.
#[derive(Debug, Clone)]
pub struct SpanTable(Vec<Span>);

impl SpanTable {
    pub fn new() -> Self {
        Self(vec![])
    }

    pub fn push(&mut self, value: Span) -> Id {
        self.0.push(value);
        Id::new(self.0.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for SpanTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<Id> for SpanTable {
    type Output = Span;

    fn index(&self, index: Id) -> &Self::Output {
        &self.0[usize::from(index)]
    }
}

impl IndexMut<Id> for SpanTable {
    fn index_mut(&mut self, index: Id) -> &mut Self::Output {
        &mut self.0[usize::from(index)]
    }
}
