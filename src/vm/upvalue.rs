use std::fmt::Display;

use super::Value;

/// A reference cell implementing lexical capture: open while the captured
/// variable still lives on the value stack, closed (owning the value)
/// once that stack slot is gone.
#[derive(Debug, Clone)]
pub enum Upvalue {
    Open(usize),
    Closed(Value),
}

impl Upvalue {
    /// The stack index of an open upvalue.
    pub fn stack_index(&self) -> Option<usize> {
        match self {
            Upvalue::Open(index) => Some(*index),
            Upvalue::Closed(_) => None,
        }
    }
}

impl Display for Upvalue {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Upvalue::Open(index) => write!(f, "open upvalue [{}]", *index),
            Upvalue::Closed(value) => write!(f, "closed upvalue [{}]", value),
        }
    }
}
