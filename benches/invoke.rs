//! Benchmarks for the call path above the native hosting interfaces.
//!
//! Measures the fixed cost the loader adds to every call and resolution:
//! - Invocation through a resolved function for several buffer sizes
//! - Resolution through the backend interface
//! - Splitting joined `Type.Method` names

extern crate clrloader;

use std::{ffi::c_void, hint::black_box, path::Path};

use clrloader::{
    split_name, Backend, BackendKind, Error, NativeCallable, RawEntryPoint, Result, Runtime,
    RuntimeInfo,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

unsafe extern "system" fn touch(buffer: *mut c_void, length: i32) -> i32 {
    if length > 0 {
        unsafe { *buffer.cast::<u8>() ^= 1 };
    }
    length
}

#[derive(Debug)]
struct NativeBackend;

impl Backend for NativeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::CoreClr
    }

    fn resolve_callable(
        &self,
        assembly_path: &Path,
        type_name: &str,
        method_name: &str,
    ) -> Result<Box<dyn NativeCallable>> {
        if (type_name, method_name) == ("Lib", "Touch") {
            Ok(Box::new(RawEntryPoint::new(touch)))
        } else {
            Err(Error::MemberResolution {
                backend: self.kind(),
                path: assembly_path.to_path_buf(),
                type_name: type_name.to_string(),
                method_name: method_name.to_string(),
                message: "not found".to_string(),
            })
        }
    }

    fn info(&self) -> RuntimeInfo {
        RuntimeInfo {
            kind: self.kind(),
            version: None,
            initialized: true,
            properties: Default::default(),
        }
    }
}

/// Benchmark invoking a resolved function with growing buffers.
/// The callee touches one byte, so the numbers show per-call overhead only.
fn bench_invoke(c: &mut Criterion) {
    let runtime = Runtime::from_backend(NativeBackend);
    let function = runtime
        .get_assembly("Lib.dll")
        .get_function("Lib.Touch", None)
        .unwrap();

    let mut group = c.benchmark_group("invoke");
    for size in [0usize, 64, 4096, 1 << 20] {
        let mut buffer = vec![0u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(function.invoke(black_box(&mut buffer))));
        });
    }
    group.finish();
}

/// Benchmark resolving a function, successfully and unsuccessfully.
fn bench_resolve(c: &mut Criterion) {
    let runtime = Runtime::from_backend(NativeBackend);
    let assembly = runtime.get_assembly("Lib.dll");

    c.bench_function("resolve_hit", |b| {
        b.iter(|| black_box(assembly.get_function(black_box("Lib.Touch"), None).unwrap()));
    });

    c.bench_function("resolve_miss", |b| {
        b.iter(|| black_box(assembly.get_function(black_box("Lib.Missing"), None).is_err()));
    });
}

/// Benchmark splitting a deeply namespaced name.
fn bench_split_name(c: &mut Criterion) {
    let name = "Company.Product.Feature.Subsystem.Outer+Inner.Handle";

    c.bench_function("split_name", |b| {
        b.iter(|| black_box(split_name(black_box(name), '.').unwrap()));
    });
}

criterion_group!(benches, bench_invoke, bench_resolve, bench_split_name);
criterion_main!(benches);
