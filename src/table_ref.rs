//! Table references
//!
//! A `TableRef` names a position in the nested structure of a document: the
//! root, an object field, or one dimension of a multi-dimensional array. Every
//! distinct `TableRef` seen in a collection becomes one doc-part table.
//!
//! Nodes are shared through an `Arc`, so cloning is cheap and the parent chain
//! is never copied. Equality and hashing compare the whole path structurally.
//!
//! ```rust
//! use photondb_d2r::table_ref::TableRef;
//!
//! let root = TableRef::root();
//! let nested = root.child("matrix").array_child(2);
//! assert_eq!(nested.name(), "matrix");
//! assert!(nested.is_in_array());
//! assert_eq!(nested.depth(), 2);
//! ```

use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Step {
    Root,
    Field(String),
    ArrayDimension(u32),
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct Node {
    step: Step,
    parent: Option<TableRef>,
    depth: usize,
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TableRef(Arc<Node>);

impl TableRef {
    pub fn root() -> Self {
        TableRef(Arc::new(Node {
            step: Step::Root,
            parent: None,
            depth: 0,
        }))
    }

    /// The doc part holding the value of field `name` of this doc part.
    pub fn child(&self, name: impl Into<String>) -> Self {
        self.push(Step::Field(name.into()))
    }

    /// The doc part holding the elements of an array nested `dimension`
    /// levels deep inside the field this doc part belongs to.
    pub fn array_child(&self, dimension: u32) -> Self {
        self.push(Step::ArrayDimension(dimension))
    }

    /// The doc part for array elements of this doc part that are arrays
    /// themselves: dimension 2 below a field, one more below a dimension.
    pub fn nested_array_child(&self) -> Self {
        let dimension = if self.is_in_array() {
            self.array_dimension() + 1
        } else {
            2
        };
        self.array_child(dimension)
    }

    fn push(&self, step: Step) -> Self {
        TableRef(Arc::new(Node {
            step,
            parent: Some(self.clone()),
            depth: self.0.depth + 1,
        }))
    }

    pub fn is_root(&self) -> bool {
        self.0.parent.is_none()
    }

    pub fn parent(&self) -> Option<&TableRef> {
        self.0.parent.as_ref()
    }

    /// The field name of this step. Array dimensions report the name of the
    /// field they are nested in; the root has the empty name.
    pub fn name(&self) -> &str {
        let mut current = self;
        loop {
            match &current.0.step {
                Step::Root => return "",
                Step::Field(name) => return name,
                Step::ArrayDimension(_) => match current.parent() {
                    Some(parent) => current = parent,
                    None => return "",
                },
            }
        }
    }

    pub fn is_in_array(&self) -> bool {
        matches!(self.0.step, Step::ArrayDimension(_))
    }

    /// Array dimension of this step, 0 when the step is not an array dimension.
    pub fn array_dimension(&self) -> u32 {
        match self.0.step {
            Step::ArrayDimension(dimension) => dimension,
            _ => 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.0.depth
    }

    /// Iterate from this node up to (and including) the root.
    pub fn ancestors(&self) -> impl Iterator<Item = &TableRef> {
        std::iter::successors(Some(self), |current| current.parent())
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.0.step, self.parent()) {
            (Step::Root, _) | (_, None) => write!(f, "<root>"),
            (Step::Field(name), Some(parent)) if parent.is_root() => write!(f, "{}", name),
            (Step::Field(name), Some(parent)) => write!(f, "{}.{}", parent, name),
            (Step::ArrayDimension(dimension), Some(parent)) => {
                write!(f, "{}[{}]", parent, dimension)
            }
        }
    }
}

impl fmt::Debug for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableRef({})", self)
    }
}
