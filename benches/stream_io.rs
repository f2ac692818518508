use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::io::SeekFrom;
use tempfile::TempDir;
use vaultfs::{ContainerConfig, Volume};

fn bench_sequential_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_write");

    for size in [4 * 1024, 64 * 1024, 1024 * 1024] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("sequential", size), &size, |b, &size| {
            let dir = TempDir::new().unwrap();
            let mut volume =
                Volume::create(dir.path().join("bench.vfs"), "BENCH", &ContainerConfig::default()).unwrap();
            let data = vec![0xA5u8; size];

            b.iter(|| {
                volume.copy(&mut data.as_slice(), "bench.bin").unwrap();
            });
        });
    }
    group.finish();
}

fn bench_sequential_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_read");

    for size in [4 * 1024, 64 * 1024, 1024 * 1024] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("sequential", size), &size, |b, &size| {
            let dir = TempDir::new().unwrap();
            let mut volume =
                Volume::create(dir.path().join("bench.vfs"), "BENCH", &ContainerConfig::default()).unwrap();
            volume.copy(&mut vec![0x5Au8; size].as_slice(), "bench.bin").unwrap();

            b.iter(|| {
                let data = volume.read_file("bench.bin").unwrap();
                assert_eq!(data.len(), size);
            });
        });
    }
    group.finish();
}

fn bench_random_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_random");

    // Small clusters and cache make the chain walk dominate
    let config = ContainerConfig::default()
        .with_cluster_size(4096)
        .with_cache_capacity(8);
    let dir = TempDir::new().unwrap();
    let mut volume = Volume::create(dir.path().join("random.vfs"), "RANDOM", &config).unwrap();
    let size = 2 * 1024 * 1024u64;
    volume.copy(&mut vec![1u8; size as usize].as_slice(), "random.bin").unwrap();

    group.bench_function("seek_and_read_4k", |b| {
        let mut stream = volume.file_stream("random.bin").unwrap();
        let mut buf = vec![0u8; 4096];
        let mut offset = 0u64;
        b.iter(|| {
            offset = (offset + 7 * 4096 + 123) % (size - 4096);
            stream.seek(SeekFrom::Start(offset)).unwrap();
            stream.read(&mut buf).unwrap();
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_sequential_write,
    bench_sequential_read,
    bench_random_access
);
criterion_main!(benches);
