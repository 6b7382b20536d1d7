use std::{
    cell::RefCell,
    fmt::{Debug, Display},
    rc::Rc,
};

use crate::{compiler::Function, LoxError};

use super::{Upvalue, Value};

/// A function paired with the upvalues it captured when `OP_CLOSURE` ran.
/// The upvalue vector length always equals the function's upvalue count.
pub struct Closure {
    pub function: Rc<Function>,
    pub upvalues: Vec<Rc<RefCell<Upvalue>>>,
}

impl Closure {
    pub fn new(function: Rc<Function>, upvalues: Vec<Rc<RefCell<Upvalue>>>) -> Self {
        Self { function, upvalues }
    }
}

impl Display for Closure {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.function)
    }
}

impl Debug for Closure {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.function)
    }
}

/// A method closure pinned to the instance it was read off of.
pub struct BoundMethod {
    pub receiver: Value,
    pub method: Rc<Closure>,
}

impl Display for BoundMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.method)
    }
}

/// A host-provided callable surfaced as a global.
pub struct Native {
    pub name: String,
    pub arity: usize,
    #[allow(clippy::type_complexity)]
    pub fun: Box<dyn Fn(&[Value]) -> Result<Value, LoxError>>,
}

impl Native {
    pub fn new<N, F>(name: N, arity: usize, fun: F) -> Self
    where
        N: Into<String>,
        F: Fn(&[Value]) -> Result<Value, LoxError> + 'static,
    {
        Self {
            name: name.into(),
            arity,
            fun: Box::new(fun),
        }
    }
}

impl Display for Native {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "<native fn>")
    }
}

impl Debug for Native {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "<native {}>", self.name)
    }
}
