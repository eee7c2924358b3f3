use criterion::{black_box, criterion_group, criterion_main, Criterion};

use crfpp::FeatureDict;

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("dictionary");

    group.bench_function("get_id", |b| {
        let keys: Vec<String> = (0..1000)
            .map(|i| format!("U{:02}:tok{}", i % 20, i))
            .collect();
        b.iter(|| {
            let mut dict = FeatureDict::new(4);
            for key in &keys {
                black_box(dict.get_id(key));
            }
        })
    });

    group.bench_function("shrink", |b| {
        let mut dict = FeatureDict::new(4);
        for i in 0..1000 {
            let key = format!("U{:02}:tok{}", i % 20, i);
            for _ in 0..(i % 3 + 1) {
                dict.get_id(&key);
            }
        }
        b.iter(|| {
            let mut dict = dict.clone();
            black_box(dict.shrink(2));
        })
    });

    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
