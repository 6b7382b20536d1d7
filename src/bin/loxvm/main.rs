use std::io::Write;
use std::process::ExitCode;

use loxvm::{errors, vm::VM, LoxError};

// sysexits-style status codes.
const EX_USAGE: u8 = 64;
const EX_DATAERR: u8 = 65;
const EX_SOFTWARE: u8 = 70;
const EX_IOERR: u8 = 74;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [] => run_prompt(),
        [path] => run_file(path),
        _ => {
            eprintln!("Usage: loxvm [path]");
            ExitCode::from(EX_USAGE)
        }
    }
}

fn run_file(path: &str) -> ExitCode {
    let content = match std::fs::read(path) {
        Ok(content) => content,
        Err(err) => {
            eprintln!("{}", LoxError::from(err));
            return ExitCode::from(EX_IOERR);
        }
    };

    let source = match std::str::from_utf8(&content) {
        Ok(source) => source,
        Err(_) => {
            eprintln!(
                "{}",
                errors::system(
                    "The file you provided is not a valid UTF-8 file.",
                    "Make sure that the file is a valid UTF-8 file.",
                )
            );
            return ExitCode::from(EX_IOERR);
        }
    };

    let mut vm = VM::default();
    run(source, &mut vm)
}

fn run_prompt() -> ExitCode {
    // One VM for the whole session, so globals and interned strings
    // persist from line to line.
    let mut vm = VM::default();
    let mut buffer = String::new();

    loop {
        print!("> ");
        if std::io::stdout().flush().is_err() {
            return ExitCode::from(EX_IOERR);
        }

        buffer.clear();
        match std::io::stdin().read_line(&mut buffer) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                // Errors are already reported; the session keeps going.
                let _ = run(&buffer, &mut vm);
            }
        }
    }

    ExitCode::SUCCESS
}

fn run(source: &str, vm: &mut VM) -> ExitCode {
    let function = match vm.compile(source) {
        Ok(function) => function,
        Err(errs) => {
            for err in errs {
                eprintln!("{}", err);
            }
            return ExitCode::from(EX_DATAERR);
        }
    };

    match vm.call(function) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err);
            ExitCode::from(EX_SOFTWARE)
        }
    }
}
