use criterion::{criterion_group, criterion_main, Criterion};
use rill_parser::parse;
use rill_passes::analyze::SemanticAnalyzer;
use rill_source::Source;
use rill_value::module::Module;
use rill_vm::{CodeGenerator, CompileOptions, Vm};
use std::io;

fn compile(text: &str) -> Module {
    let source = Source::new(text);
    let mut program = parse(&source);
    let table = SemanticAnalyzer::new(&source).analyze(&mut program);
    assert!(source.has_no_errors());
    CodeGenerator::new(&source, &table, CompileOptions::default())
        .generate(&program)
        .unwrap()
}

fn fib(c: &mut Criterion) {
    let module = compile(
        "fn fib(n: Int) -> Int {
            if (n < 2) return n;
            return fib(n - 1) + fib(n - 2);
        }
        let result = fib(20);",
    );
    c.bench_function("fib-20", |b| {
        b.iter(|| Vm::interpret(&module, &mut io::sink()).unwrap())
    });
}

fn loop_sum(c: &mut Criterion) {
    let module = compile(
        "let total = 0.0;
        let i = 0;
        while (i < 100000) {
            total = total + i * 0.5;
            i = i + 1;
        }",
    );
    c.bench_function("loop-sum", |b| {
        b.iter(|| Vm::interpret(&module, &mut io::sink()).unwrap())
    });
}

criterion_group!(benches, fib, loop_sum);
criterion_main!(benches);
