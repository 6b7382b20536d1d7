use criterion::{black_box, criterion_group, criterion_main, Criterion};

use loxvm::vm::VM;

const FIB: &str = r#"
fun fib(n) {
  if (n < 2) return n;
  return fib(n - 1) + fib(n - 2);
}
print fib(18);
"#;

const LOOP: &str = r#"
var sum = 0;
for (var i = 0; i < 100000; i = i + 1) {
  sum = sum + i;
}
print sum;
"#;

const METHODS: &str = r#"
class Counter {
  init() { this.count = 0; }
  bump() { this.count = this.count + 1; }
}
var counter = Counter();
for (var i = 0; i < 10000; i = i + 1) {
  counter.bump();
}
print counter.count;
"#;

fn run(source: &str) {
    let mut vm = VM::default().with_output(Box::new(std::io::sink()));
    let function = vm.compile(source).expect("benchmark sources compile");
    vm.call(function).expect("benchmark sources run cleanly");
}

fn bench_compile_fib(c: &mut Criterion) {
    c.bench_function("compile_fib", |b| {
        b.iter(|| {
            let mut vm = VM::default();
            vm.compile(black_box(FIB)).expect("benchmark sources compile")
        });
    });
}

fn bench_run_fib(c: &mut Criterion) {
    c.bench_function("run_fib_18", |b| {
        b.iter(|| run(black_box(FIB)));
    });
}

fn bench_run_loop(c: &mut Criterion) {
    c.bench_function("run_sum_loop", |b| {
        b.iter(|| run(black_box(LOOP)));
    });
}

fn bench_run_methods(c: &mut Criterion) {
    c.bench_function("run_method_calls", |b| {
        b.iter(|| run(black_box(METHODS)));
    });
}

criterion_group!(
    benches,
    bench_compile_fib,
    bench_run_fib,
    bench_run_loop,
    bench_run_methods
);
criterion_main!(benches);
