use loxvm::{vm::VM, CaptureOutput, LoxError};

/// Runs one `.lox` fixture. Expected output lines are marked with
/// `// expect:`; fixtures that should fail carry a single
/// `// expect compile error:` or `// expect runtime error:` marker whose
/// payload must match the reported message.
fn run_file(path: &str) -> Result<(), LoxError> {
    let content = std::fs::read(path)?;
    let content = std::str::from_utf8(&content).expect("fixtures are UTF-8");

    let expect_re = regex::Regex::new(r"//\s*expect: (.*)").expect("regex should compile");
    let compile_err_re =
        regex::Regex::new(r"//\s*expect compile error: (.*)").expect("regex should compile");
    let runtime_err_re =
        regex::Regex::new(r"//\s*expect runtime error: (.*)").expect("regex should compile");

    let expected: String = expect_re
        .captures_iter(content)
        .map(|m| m.get(1).expect("expect marker should have a value").as_str())
        .collect::<Vec<&str>>()
        .join("\n");
    let expected_compile_err = compile_err_re
        .captures_iter(content)
        .map(|m| m.get(1).expect("marker should have a value").as_str())
        .next();
    let expected_runtime_err = runtime_err_re
        .captures_iter(content)
        .map(|m| m.get(1).expect("marker should have a value").as_str())
        .next();

    let output = CaptureOutput::default();
    let mut vm = VM::default().with_output(Box::new(output.clone()));

    let function = match vm.compile(content) {
        Ok(function) => {
            assert!(
                expected_compile_err.is_none(),
                "expected a compile error, but compilation succeeded"
            );
            function
        }
        Err(errs) => {
            let expected = expected_compile_err
                .unwrap_or_else(|| panic!("unexpected compile errors: {:?}", errs));
            assert!(
                errs.iter().any(|err| err.description() == expected),
                "expected compile error {:?}, got {:?}",
                expected,
                errs
            );
            return Ok(());
        }
    };

    match vm.call(function) {
        Ok(()) => {
            assert!(
                expected_runtime_err.is_none(),
                "expected a runtime error, but the script succeeded"
            );
        }
        Err(err) => {
            let expected = expected_runtime_err
                .unwrap_or_else(|| panic!("unexpected runtime error: {}", err));
            assert_eq!(err.description(), expected);
        }
    }

    assert_eq!(expected.trim(), output.to_string().trim());
    Ok(())
}

#[test]
fn run_suite() {
    let mut ran = 0;
    for test_file in walkdir::WalkDir::new("tests/lang").sort_by_file_name() {
        let test_file = test_file.expect("No issues opening the test file");
        if test_file.file_type().is_file()
            && test_file
                .path()
                .extension()
                .map(|e| e == "lox")
                .unwrap_or_default()
        {
            let path = test_file.path();
            let path = path.to_str().expect("fixture paths are UTF-8");
            println!("Running test: {}", path);
            run_file(path).unwrap_or_else(|e| panic!("{} failed with error: {}", path, e));
            ran += 1;
        }
    }

    assert!(ran > 0, "no fixtures found under tests/lang");
}
