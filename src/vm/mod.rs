mod class;
mod frame;
mod fun;
mod machine;
mod stringpool;
mod table;
mod upvalue;
mod value;

pub use class::{Class, Instance};
pub use frame::Frame;
pub use fun::{BoundMethod, Closure, Native};
pub use machine::{FRAMES_MAX, VM};
pub use stringpool::{hash_of, LoxString, StringPool};
pub use table::Table;
pub use upvalue::Upvalue;
pub use value::Value;
