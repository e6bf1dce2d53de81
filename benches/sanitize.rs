//! Performance benchmarks for a3s-metasafe
//!
//! Run with: cargo bench

use a3s_metasafe::{
    strip_jpeg, FileRecord, HostDocument, MemoryDocument, Sanitizer, Shield, ShieldConfig,
};
use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;

fn segment(marker: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0xFF, marker];
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// JPEG with an Exif block and `scan_len` bytes of entropy data
fn photo(scan_len: usize) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8];
    data.extend(segment(0xE0, b"JFIF\0\x01\x01\0\0\x01\0\x01\0\0"));
    data.extend(segment(0xE1, &[0x45u8; 4096]));
    data.extend(segment(0xFE, b"camera comment"));
    data.extend(segment(0xDB, &[0u8; 65]));
    data.extend(segment(0xDA, &[1, 1, 0, 0, 63, 0]));
    data.extend(std::iter::repeat(0x5A).take(scan_len));
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

fn bench_strip_jpeg(c: &mut Criterion) {
    let mut group = c.benchmark_group("strip_jpeg");
    for (label, size) in [("16 KiB", 16 << 10), ("1 MiB", 1 << 20), ("8 MiB", 8 << 20)] {
        let data = photo(size);
        group.bench_function(label, |b| b.iter(|| strip_jpeg(&data).unwrap()));
    }
    group.finish();
}

fn bench_sanitize_batch(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let sanitizer = Sanitizer::jpeg(ShieldConfig::default());

    let mut group = c.benchmark_group("sanitize_batch");
    for count in [1, 10, 50] {
        let files: Vec<FileRecord> = (0..count)
            .map(|i| {
                if i % 3 == 1 {
                    FileRecord::new(format!("{}.pdf", i), "application/pdf", 0, vec![0u8; 1024])
                } else {
                    FileRecord::new(format!("{}.jpg", i), "image/jpeg", 0, photo(64 << 10))
                }
            })
            .collect();
        group.bench_function(format!("{} files", count), |b| {
            b.to_async(&rt)
                .iter(|| async { sanitizer.sanitize_batch(&files).await });
        });
    }
    group.finish();
}

fn bench_selection_roundtrip(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let (doc, shield, input) = rt.block_on(async {
        let doc = Arc::new(MemoryDocument::new());
        let input = doc.create_file_input();
        doc.append_child(doc.body(), input).unwrap();
        let shield = Shield::with_defaults(doc.clone()).unwrap();
        (doc, shield, input)
    });
    let file = FileRecord::new("photo.jpg", "image/jpeg", 0, photo(64 << 10));

    c.bench_function("select + substitute (1 jpeg)", |b| {
        b.to_async(&rt).iter(|| async {
            doc.select_files(input, vec![file.clone()]).unwrap();
            shield.settled().await;
            doc.files(input).unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_strip_jpeg,
    bench_sanitize_batch,
    bench_selection_roundtrip,
);
criterion_main!(benches);
