use criterion::{black_box, criterion_group, criterion_main, Criterion};
use reg_nfa::{RegexFlags, RegexNFA};

// `.` is an ordinary byte for RegexNFA, so the reference pattern escapes it
const PATTERN: &str = "[a-z0-9_]+@([a-z0-9]+.)+[a-z]{2,4}";
const REFERENCE: &str = r"^(?:[a-z0-9_]+@([a-z0-9]+\.)+[a-z]{2,4})$";

fn inputs() -> Vec<String> {
    vec![
        "someone@example.com".to_string(),
        "first_last@mail.server.example.org".to_string(),
        "not-an-address".to_string(),
        format!("{}@{}.io", "a".repeat(40), "b".repeat(40)),
    ]
}

fn do_the_work(reg: &RegexNFA, inputs: &[String], expected: &[bool]) {
    let actual: Vec<bool> = inputs.iter().map(|input| reg.is_match(input)).collect();
    assert_eq!(expected, actual.as_slice())
}

fn criterion_benchmark_regex_nfa(c: &mut Criterion) {
    let inputs = inputs();
    let anchored = regex::Regex::new(REFERENCE).unwrap();
    let expected: Vec<bool> = inputs.iter().map(|input| anchored.is_match(input)).collect();

    let plain = RegexNFA::new(PATTERN).unwrap();
    c.bench_function("match addresses", |b| {
        b.iter(|| do_the_work(black_box(&plain), black_box(&inputs), &expected))
    });

    let optimized = RegexNFA::with_flags(PATTERN, RegexFlags::OPTIMIZE).unwrap();
    c.bench_function("match addresses memoized", |b| {
        b.iter(|| do_the_work(black_box(&optimized), black_box(&inputs), &expected))
    });

    c.bench_function("compile", |b| {
        b.iter(|| RegexNFA::new(black_box(PATTERN)).unwrap())
    });
}

criterion_group!(benches, criterion_benchmark_regex_nfa);
criterion_main!(benches);
