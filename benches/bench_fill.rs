use criterion::{ black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput };

use iotools::fill::{ init_block, FillMode, Lcg };

fn bench_init_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("init_block");
    for &size in &[512usize, 4096, 65536] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("ascii", size), &size, |b, &size| {
            let mut buf = vec![0u8; size];
            let mut rng = Lcg::new(1);
            let mut block = 0u64;
            b.iter(|| {
                init_block(black_box(&mut buf), FillMode::Ascii, block, &mut rng);
                block = block.wrapping_add(1);
            });
        });
        group.bench_with_input(BenchmarkId::new("rand", size), &size, |b, &size| {
            let mut buf = vec![0u8; size];
            let mut rng = Lcg::new(1);
            b.iter(|| {
                init_block(black_box(&mut buf), FillMode::Rand, 0, &mut rng);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_init_block);
criterion_main!(benches);
