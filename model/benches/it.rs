use criterion::{black_box, criterion_group, criterion_main, Criterion};
use model::{CowMetric, Metric};

fn sample_metric() -> Metric {
    Metric::new([
        ("__name__", "zo_http_incoming_requests"),
        ("cluster", "zo1"),
        ("namespace", "ziox-alpha1"),
        ("organization", "default"),
        ("instance", "10.0.0.12:5080"),
        ("job", "ziox"),
        ("le", "0.25"),
        ("method", "GET"),
    ])
}

fn bench_fingerprint(c: &mut Criterion) {
    let metric = sample_metric();
    c.bench_function("fingerprint", |b| {
        b.iter(|| black_box(&metric).fingerprint())
    });
    c.bench_function("fast_fingerprint", |b| {
        b.iter(|| black_box(&metric).fast_fingerprint())
    });
}

fn bench_render(c: &mut Criterion) {
    let metric = sample_metric();
    c.bench_function("to_string", |b| b.iter(|| black_box(&metric).to_string()));
}

fn bench_cow(c: &mut Criterion) {
    let metric = sample_metric();
    c.bench_function("cow_relabel", |b| {
        b.iter(|| {
            let mut cow = CowMetric::borrowed(black_box(&metric));
            cow.set("cluster", "zo2");
            cow.del("le");
            cow.set("env", "prod");
            black_box(cow)
        })
    });
}

criterion_group!(benches, bench_fingerprint, bench_render, bench_cow);
criterion_main!(benches);
