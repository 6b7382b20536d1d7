use std::cell::RefCell;
use std::fmt::Display;
use std::rc::Rc;

use super::{LoxString, Table};

/// A class: a name and a table from method names to closures. Methods
/// accumulate while the class body executes, and `OP_INHERIT` copies a
/// superclass's table in before the subclass declares its own.
#[derive(Debug)]
pub struct Class {
    pub name: Rc<LoxString>,
    pub methods: RefCell<Table>,
}

impl Class {
    pub fn new(name: Rc<LoxString>) -> Self {
        Self {
            name,
            methods: RefCell::new(Table::default()),
        }
    }
}

impl Display for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// An instance: its class is fixed for life, its field table mutates
/// freely.
#[derive(Debug)]
pub struct Instance {
    pub class: Rc<Class>,
    pub fields: RefCell<Table>,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Self {
        Self {
            class,
            fields: RefCell::new(Table::default()),
        }
    }
}

impl Display for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} instance", self.class)
    }
}
