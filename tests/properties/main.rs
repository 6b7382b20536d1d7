use std::collections::HashMap;
use std::rc::Rc;

use proptest::prelude::*;

use loxvm::compiler::{compile, Chunk, Constant, OpCode};
use loxvm::vm::{hash_of, StringPool, Table, Value};

// =============================================================================
// Strategies
// =============================================================================

/// Identifiers prefixed so they can never collide with a keyword.
fn arb_ident() -> impl Strategy<Value = String> {
    "[a-z]{0,5}".prop_map(|suffix| format!("x{}", suffix))
}

fn arb_expr() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        (0..100i32).prop_map(|n| n.to_string()),
        Just("true".to_string()),
        Just("false".to_string()),
        Just("nil".to_string()),
        "[a-z]{0,6}".prop_map(|s| format!("\"{}\"", s)),
    ];

    leaf.prop_recursive(3, 16, 2, |inner| {
        let operator = prop::sample::select(vec![
            "+", "-", "*", "/", "==", "!=", "<", "<=", ">", ">=", "and", "or",
        ]);
        prop_oneof![
            (inner.clone(), operator, inner.clone())
                .prop_map(|(left, op, right)| format!("({} {} {})", left, op, right)),
            inner.clone().prop_map(|operand| format!("(-{})", operand)),
            inner.prop_map(|operand| format!("(!{})", operand)),
        ]
    })
}

fn arb_stmt() -> impl Strategy<Value = String> {
    prop_oneof![
        arb_expr().prop_map(|e| format!("print {};", e)),
        arb_expr().prop_map(|e| format!("{};", e)),
        (arb_ident(), arb_expr()).prop_map(|(name, e)| format!("var {} = {};", name, e)),
        (arb_expr(), arb_expr())
            .prop_map(|(cond, body)| format!("if ({}) {{ print {}; }}", cond, body)),
        (arb_expr(), arb_expr())
            .prop_map(|(cond, body)| format!("while ({}) {{ print {}; }}", cond, body)),
    ]
}

/// Syntactically valid programs. They are compiled, never run, so the
/// generated conditions and operand types do not matter.
fn arb_program() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_stmt(), 1..6).prop_map(|stmts| stmts.join("\n"))
}

// =============================================================================
// Bytecode well-formedness checks
// =============================================================================

/// The offset of every opcode byte in the chunk. Panics when a byte in
/// instruction position is not a valid opcode.
fn instruction_starts(chunk: &Chunk) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut ip = 0;

    while ip < chunk.len() {
        offsets.push(ip);
        let op = OpCode::from_byte(chunk.byte(ip).expect("a code byte"))
            .expect("every instruction starts with a valid opcode");
        ip += 1;

        ip += match op {
            OpCode::Constant
            | OpCode::GetLocal
            | OpCode::SetLocal
            | OpCode::GetGlobal
            | OpCode::DefineGlobal
            | OpCode::SetGlobal
            | OpCode::GetUpvalue
            | OpCode::SetUpvalue
            | OpCode::GetProperty
            | OpCode::SetProperty
            | OpCode::GetSuper
            | OpCode::Call
            | OpCode::Class
            | OpCode::Method => 1,
            OpCode::Jump | OpCode::JumpIfFalse | OpCode::Loop => 2,
            OpCode::Invoke | OpCode::SuperInvoke => 2,
            OpCode::Closure => {
                let index = chunk.byte(ip).expect("a constant operand") as usize;
                let upvalues = match chunk.constant(index) {
                    Some(Constant::Function(function)) => function.upvalue_count,
                    _ => panic!("OP_CLOSURE must reference a function constant"),
                };
                1 + 2 * upvalues
            }
            _ => 0,
        };
    }

    offsets
}

/// Chunk invariants, applied recursively to nested function constants:
/// the code ends in OP_RETURN, decodes cleanly, and every jump or loop
/// lands on an instruction boundary.
fn check_chunk(chunk: &Chunk) {
    assert!(!chunk.is_empty(), "compiled chunks are never empty");
    assert_eq!(
        chunk.byte(chunk.len() - 1),
        Some(OpCode::Return as u8),
        "chunks end with OP_RETURN"
    );

    let starts = instruction_starts(chunk);
    for &start in &starts {
        let op =
            OpCode::from_byte(chunk.byte(start).expect("a code byte")).expect("a valid opcode");
        let operand = |at: usize| {
            let high = chunk.byte(at).expect("a jump operand") as usize;
            let low = chunk.byte(at + 1).expect("a jump operand") as usize;
            (high << 8) | low
        };

        match op {
            OpCode::Jump | OpCode::JumpIfFalse => {
                let target = start + 3 + operand(start + 1);
                assert!(
                    target == chunk.len() || starts.contains(&target),
                    "jump from {} lands mid-instruction at {}",
                    start,
                    target
                );
            }
            OpCode::Loop => {
                let target = start + 3 - operand(start + 1);
                assert!(
                    starts.contains(&target),
                    "loop from {} lands mid-instruction at {}",
                    start,
                    target
                );
            }
            _ => {}
        }
    }

    for constant in chunk.constants() {
        if let Constant::Function(function) = constant {
            check_chunk(&function.chunk);
        }
    }
}

// =============================================================================
// Interning
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// intern(s) == intern(s), by pointer.
    #[test]
    fn intern_is_idempotent(s in "\\PC{0,32}") {
        let mut pool = StringPool::default();
        let first = pool.intern(&s);
        let second = pool.intern(&s);

        prop_assert!(Rc::ptr_eq(&first, &second));
        prop_assert_eq!(&first.chars, &s);
    }

    /// Two interned strings share an allocation exactly when their
    /// characters match, so value equality can compare pointers.
    #[test]
    fn interning_reduces_equality_to_identity(s in "[a-z]{0,12}", t in "[a-z]{0,12}") {
        let mut pool = StringPool::default();
        let a = pool.intern(&s);
        let b = pool.intern(&t);

        prop_assert_eq!(Rc::ptr_eq(&a, &b), s == t);
        prop_assert_eq!(Value::String(a) == Value::String(b), s == t);
    }

    /// The stored hash is the FNV-1a hash of the characters.
    #[test]
    fn interned_hash_is_fnv1a(s in "\\PC{0,32}") {
        let mut pool = StringPool::default();
        prop_assert_eq!(pool.intern(&s).hash, hash_of(&s));
    }
}

// =============================================================================
// Table vs. a HashMap model
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// A random mix of set/delete/get over a small key universe (so
    /// probe chains, tombstones, and growth all come into play) behaves
    /// exactly like a HashMap.
    #[test]
    fn table_matches_hashmap_model(
        ops in prop::collection::vec((0u8..3u8, 0usize..16usize, -100i32..100i32), 1..64)
    ) {
        let mut strings = StringPool::default();
        let keys: Vec<_> = (0..16).map(|i| strings.intern(format!("k{}", i))).collect();

        let mut table = Table::default();
        let mut model: HashMap<String, f64> = HashMap::new();

        for (op, key_index, value) in ops {
            let key = &keys[key_index];
            match op {
                0 => {
                    let was_new = table.set(Rc::clone(key), Value::Number(value as f64));
                    let model_new = model.insert(key.chars.clone(), value as f64).is_none();
                    prop_assert_eq!(was_new, model_new);
                }
                1 => {
                    let removed = table.delete(key);
                    let model_removed = model.remove(&key.chars).is_some();
                    prop_assert_eq!(removed, model_removed);
                }
                _ => {
                    let got = table.get(key).cloned();
                    let expected = model.get(&key.chars).map(|n| Value::Number(*n));
                    prop_assert_eq!(got, expected);
                }
            }
        }

        prop_assert_eq!(table.len(), model.len());
        for key in &keys {
            let got = table.get(key).cloned();
            let expected = model.get(&key.chars).map(|n| Value::Number(*n));
            prop_assert_eq!(got, expected);
        }
    }
}

// =============================================================================
// Compiled output
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Every generated program compiles to a script function with arity
    /// zero whose chunks are well formed all the way down.
    #[test]
    fn compiled_programs_are_well_formed(program in arb_program()) {
        let mut strings = StringPool::default();
        let function = compile(&program, &mut strings)
            .unwrap_or_else(|errs| panic!("{:?} failed to compile: {:?}", program, errs));

        prop_assert_eq!(function.arity, 0);
        prop_assert!(function.name.is_none());
        check_chunk(&function.chunk);
    }
}

/// The same invariants over hand-picked programs that exercise the
/// codegen paths the generator does not reach (functions, closures,
/// classes, inheritance, for loops).
#[test]
fn representative_programs_are_well_formed() {
    let sources = [
        "fun fib(n){ if (n<2) return n; return fib(n-1)+fib(n-2); } print fib(10);",
        "fun mk(){ var i=0; fun inc(){ i=i+1; return i; } return inc; } var c=mk(); print c();",
        "for (var i = 0; i < 10; i = i + 1) { print i; }",
        "class Cake { init(f){ this.f=f; } taste(){ print \"The \"+this.f+\" cake\"; } } Cake(\"lemon\").taste();",
        "class A { greet(){ print \"hi\"; } } class B < A { greet(){ super.greet(); } } B().greet();",
        "var a=1; { var a=2; { var a=3; print a; } print a; } print a;",
    ];

    for source in sources {
        let mut strings = StringPool::default();
        let function = compile(source, &mut strings)
            .unwrap_or_else(|errs| panic!("{:?} failed to compile: {:?}", source, errs));
        assert_eq!(function.arity, 0);
        check_chunk(&function.chunk);
    }
}
