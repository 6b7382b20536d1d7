use std::rc::Rc;

use crate::{vm::StringPool, LoxError};

mod chunk;
mod comp;
mod fun;
mod ops;
mod value;

pub use chunk::Chunk;
pub use fun::Function;
pub use ops::OpCode;
pub use value::{Constant, VarRef};

/// Compiles a source string into the top-level script function. Strings
/// and identifiers are interned through `strings`, which the caller keeps
/// so that every compilation (and the runtime) shares one pool.
pub fn compile(source: &str, strings: &mut StringPool) -> Result<Rc<Function>, Vec<LoxError>> {
    comp::Parser::new(source, strings).compile()
}
