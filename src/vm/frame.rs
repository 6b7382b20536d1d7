use std::fmt::{Debug, Display};
use std::rc::Rc;

use crate::compiler::Chunk;

use super::Closure;

/// One entry of the call stack: the executing closure, its instruction
/// pointer, and the base of its locals on the value stack. Slot zero of
/// the window holds the callee (or the receiver, for methods).
#[derive(Clone)]
pub struct Frame {
    pub closure: Rc<Closure>,
    pub ip: usize,
    pub offset: usize,
}

impl Frame {
    pub fn new(closure: Rc<Closure>, offset: usize) -> Self {
        Self {
            closure,
            ip: 0,
            offset,
        }
    }

    pub fn chunk(&self) -> &Chunk {
        &self.closure.function.chunk
    }

    /// The source line of the instruction the frame is executing. The ip
    /// has already moved past the instruction's bytes when this is asked
    /// for, so it looks one byte back.
    pub fn line(&self) -> usize {
        self.chunk().line(self.ip.saturating_sub(1))
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.closure.function.name {
            Some(name) => write!(f, "[line {}] in {}()", self.line(), name),
            None => write!(f, "[line {}] in script", self.line()),
        }
    }
}

impl Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} at ip {} (offset {})",
            self.closure.function, self.ip, self.offset
        )
    }
}
