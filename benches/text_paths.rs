//! Text-processing path benchmarks
//!
//! Run with: cargo bench

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use cujit::{extract_symbols, parse_line, Demangle, PrefixLengthDemangler};

fn synthetic_ptx(kernels: usize) -> String {
    let mut ptx = String::from(".version 8.3\n.target sm_80\n.address_size 64\n\n");
    for i in 0..kernels {
        let mangled = format!("_Z7kernel{i}PfS_");
        ptx.push_str(&format!(
            "\t// .globl\t{mangled}\n.visible .entry {mangled}()\n{{\n\tret;\n}}\n"
        ));
    }
    ptx
}

fn bench_extract_symbols(c: &mut Criterion) {
    let ptx = synthetic_ptx(64);
    let mut group = c.benchmark_group("extract_symbols");
    group.throughput(Throughput::Bytes(ptx.len() as u64));
    group.bench_function("ptx_64_kernels", |b| {
        b.iter(|| black_box(extract_symbols(black_box(&ptx))));
    });
    group.finish();
}

fn bench_demangle(c: &mut Criterion) {
    c.bench_function("demangle_prefix_length", |b| {
        b.iter(|| black_box(PrefixLengthDemangler.demangle(black_box("_Z12reduceKernelPfiS_"))));
    });
}

fn bench_parse_line(c: &mut Criterion) {
    let line = "-GPUInfo -co -O3 -co --use_fast_math -cudaPath /usr/local/cuda/lib64";
    c.bench_function("parse_invocation_line", |b| {
        b.iter(|| black_box(parse_line(black_box(line))));
    });
}

criterion_group!(benches, bench_extract_symbols, bench_demangle, bench_parse_line);
criterion_main!(benches);
