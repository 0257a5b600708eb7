//! Criterion benchmarks for apkpipe critical paths
//!
//! Benchmarks the operations that run on every line or byte of tool output:
//! - Diagnostics: parsing javac, aapt and dx logs
//! - Lines: assembling raw output chunks into lines
//! - Signer: entry digests

use apkpipe::build::lines::LineAssembler;
use apkpipe::diagnostic::{DiagnosticParser, Tool};
use apkpipe::signer::manifest::digest_base64;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

// =============================================================================
// Test Data Generators
// =============================================================================

/// Generate a javac log with n errors, each with source echo and symbol detail
fn make_javac_log(n: usize) -> String {
    let mut log = String::new();
    for i in 0..n {
        log.push_str(&format!("src/com/example/Class{}.java:{}: error: cannot find symbol\n", i, i + 1));
        log.push_str("        Foo foo = new Foo();\n");
        log.push_str("        ^\n");
        log.push_str("  symbol:   class Foo\n");
        log.push_str(&format!("  location: class Class{}\n", i));
    }
    log.push_str(&format!("{} errors\n", n));
    log
}

/// Generate an aapt log mixing noise, errors and warnings
fn make_aapt_log(n: usize) -> String {
    (0..n)
        .map(|i| match i % 3 {
            0 => format!("    (skipping hidden file 'res/drawable/.file{}')\n", i),
            1 => format!("res/layout/layout{}.xml:{}: error: No resource found\n", i, i),
            _ => format!("res/values/strings.xml:{}: warning: string 's{}' has no default translation.\n", i, i),
        })
        .collect()
}

/// Generate raw output split into fixed-size chunks
fn make_chunks(lines: usize, chunk: usize) -> Vec<Vec<u8>> {
    let text: String = (0..lines).map(|i| format!("processing file number {}\n", i)).collect();
    text.as_bytes().chunks(chunk).map(<[u8]>::to_vec).collect()
}

// =============================================================================
// Diagnostics Benchmarks
// =============================================================================

fn bench_diagnostics(c: &mut Criterion) {
    let mut group = c.benchmark_group("diagnostics");

    let javac = DiagnosticParser::new(Tool::Javac);
    for size in [10usize, 100, 1000].iter() {
        let log = make_javac_log(*size);
        group.throughput(Throughput::Bytes(log.len() as u64));
        group.bench_with_input(BenchmarkId::new("javac", size), &log, |b, log| {
            b.iter(|| javac.parse_text(black_box(log)))
        });
    }

    let aapt = DiagnosticParser::new(Tool::Aapt);
    let log = make_aapt_log(300);
    group.throughput(Throughput::Bytes(log.len() as u64));
    group.bench_function("aapt_300", |b| b.iter(|| aapt.parse_text(black_box(&log))));

    let dex = DiagnosticParser::new(Tool::Dex);
    group.bench_function("dex_unmatched_line", |b| {
        b.iter(|| dex.parse_text(black_box("processing archive libs/util.jar...\n")))
    });

    group.finish();
}

// =============================================================================
// Line Assembly Benchmarks
// =============================================================================

fn bench_lines(c: &mut Criterion) {
    let mut group = c.benchmark_group("lines");

    for chunk in [64usize, 4096].iter() {
        let chunks = make_chunks(1000, *chunk);
        let total: usize = chunks.iter().map(Vec::len).sum();
        group.throughput(Throughput::Bytes(total as u64));
        group.bench_with_input(BenchmarkId::new("assemble", chunk), &chunks, |b, chunks| {
            b.iter(|| {
                let mut assembler = LineAssembler::new();
                let mut count = 0;
                for chunk in chunks {
                    count += assembler.push(black_box(chunk)).len();
                }
                count
            })
        });
    }

    group.finish();
}

// =============================================================================
// Signer Benchmarks
// =============================================================================

fn bench_digest(c: &mut Criterion) {
    let mut group = c.benchmark_group("digest");

    for size in [1024usize, 1024 * 1024].iter() {
        let data = vec![0xA5u8; *size];
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("sha1_base64", size), &data, |b, data| {
            b.iter(|| digest_base64(black_box(data)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_diagnostics, bench_lines, bench_digest);
criterion_main!(benches);
