pub mod errors;
mod loc;
mod output;

pub use errors::*;
pub use loc::Loc;
pub use output::CaptureOutput;
