use super::Loc;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LoxError {
    System(String, String),
    Compile(Loc, Near, String),
    Runtime(String, Vec<String>),
}

/// The position a compile diagnostic is anchored to: a concrete lexeme,
/// the end of the file, or (for lexical faults) the bare location.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Near {
    Lexeme(String),
    Eof,
    Here,
}

impl LoxError {
    pub fn description(&self) -> &str {
        match self {
            LoxError::System(msg, ..) => msg,
            LoxError::Compile(_, _, msg) => msg,
            LoxError::Runtime(msg, ..) => msg,
        }
    }
}

pub fn system<M: Into<String>, A: Into<String>>(msg: M, advice: A) -> LoxError {
    LoxError::System(msg.into(), advice.into())
}

pub fn parse<L: Into<String>, M: Into<String>>(loc: Loc, lexeme: L, message: M) -> LoxError {
    LoxError::Compile(loc, Near::Lexeme(lexeme.into()), message.into())
}

pub fn parse_at_end<M: Into<String>>(loc: Loc, message: M) -> LoxError {
    LoxError::Compile(loc, Near::Eof, message.into())
}

pub fn lexical<M: Into<String>>(loc: Loc, message: M) -> LoxError {
    LoxError::Compile(loc, Near::Here, message.into())
}

pub fn runtime<M: Into<String>>(message: M) -> LoxError {
    LoxError::Runtime(message.into(), Vec::new())
}

pub fn runtime_stacktrace<M: Into<String>, S: Into<Vec<String>>>(
    message: M,
    stacktrace: S,
) -> LoxError {
    LoxError::Runtime(message.into(), stacktrace.into())
}

impl std::error::Error for LoxError {}

impl std::fmt::Display for LoxError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            LoxError::System(message, advice) => write!(f, "{}\n{}", message, advice),
            LoxError::Compile(loc, Near::Lexeme(lexeme), msg) => {
                write!(f, "[{}] Error at '{}': {}", loc, lexeme, msg)
            }
            LoxError::Compile(loc, Near::Eof, msg) => write!(f, "[{}] Error at end: {}", loc, msg),
            LoxError::Compile(loc, Near::Here, msg) => write!(f, "[{}] Error: {}", loc, msg),
            LoxError::Runtime(msg, stacktrace) => {
                write!(f, "{}", msg)?;
                for frame in stacktrace {
                    write!(f, "\n{}", frame)?;
                }
                Ok(())
            }
        }
    }
}

impl From<std::io::Error> for LoxError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => system(
                "We could not find the file you provided.",
                "Make sure that the file exists and that you have permissions to access it.",
            ),
            std::io::ErrorKind::PermissionDenied => system(
                "You do not have permissions to access the file you provided.",
                "Make sure that you have permissions to access the file.",
            ),
            kind => system(
                format!(
                    "We were unable to open the file you provided due to a {} error.",
                    kind
                ),
                "Check the internal error message and try searching for a solution online.",
            ),
        }
    }
}
