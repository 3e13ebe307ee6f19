use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tzip::{WriteStatus, WriterConfig, ZipArchive};

const ENTRY_COUNT: usize = 32;
const ENTRY_SIZE: usize = 256 * 1024;

fn compressible_data(size: usize, seed: usize) -> Vec<u8> {
    let line = format!("{} the quick brown fox jumps over the lazy dog\n", seed);
    let mut data = line.repeat(size / line.len() + 1).into_bytes();
    data.truncate(size);
    data
}

fn prepare_sources() -> (TempDir, Vec<String>, Vec<PathBuf>) {
    let dir = tempfile::tempdir().unwrap();
    let mut names = Vec::with_capacity(ENTRY_COUNT);
    let mut paths = Vec::with_capacity(ENTRY_COUNT);
    for i in 0..ENTRY_COUNT {
        let path = dir.path().join(format!("source_{}.txt", i));
        std::fs::write(&path, compressible_data(ENTRY_SIZE, i)).unwrap();
        names.push(format!("batch/file_{}.txt", i));
        paths.push(path);
    }
    (dir, names, paths)
}

fn run_batch(dir: &TempDir, config: WriterConfig, names: &[String], paths: &[PathBuf]) {
    let mut zip = ZipArchive::open_with(dir.path().join("bench.zip"), config).unwrap();
    let handler = zip.write_files(names, paths, names.len()).unwrap();
    let status = zip.wait(handler, Some(Duration::from_secs(120))).unwrap();
    assert_eq!(status, WriteStatus::Ok);
    zip.close().unwrap();
}

fn bench_batch_jobs(c: &mut Criterion) {
    let (dir, names, paths) = prepare_sources();
    let mut group = c.benchmark_group("batch_32x256KB");
    group.throughput(Throughput::Bytes((ENTRY_COUNT * ENTRY_SIZE) as u64));
    group.sample_size(20);

    for level in [0, 1, 6, 9] {
        group.bench_with_input(BenchmarkId::new("sequential_level", level), &level, |b, &level| {
            b.iter(|| {
                let config = WriterConfig::from_level(black_box(level)).unwrap();
                run_batch(&dir, config, &names, &paths);
            });
        });
    }

    #[cfg(feature = "parallel")]
    for threads in [2, 4, 8] {
        group.bench_with_input(BenchmarkId::new("parallel_threads", threads), &threads, |b, &threads| {
            b.iter(|| {
                let config = WriterConfig::default().with_max_concurrent(threads);
                run_batch(&dir, config, &names, &paths);
            });
        });
    }

    group.finish();
}

fn bench_poll_vs_wait(c: &mut Criterion) {
    let (dir, names, paths) = prepare_sources();
    let mut group = c.benchmark_group("completion");
    group.sample_size(20);

    group.bench_function("poll_1ms", |b| {
        b.iter(|| {
            let mut zip = ZipArchive::open(dir.path().join("poll.zip"), 6, 'w').unwrap();
            let handler = zip.write_files(&names, &paths, names.len()).unwrap();
            let status =
                tzip::client::poll_until_done(&zip, handler, Duration::from_millis(1)).unwrap();
            assert_eq!(status, WriteStatus::Ok);
            zip.close().unwrap();
        });
    });

    group.bench_function("condvar_wait", |b| {
        b.iter(|| run_batch(&dir, WriterConfig::default(), &names, &paths));
    });

    group.finish();
}

criterion_group!(benches, bench_batch_jobs, bench_poll_vs_wait);
criterion_main!(benches);
