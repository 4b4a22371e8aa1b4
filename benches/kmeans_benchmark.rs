use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::Array2;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use roundkmeans_rs::{KMeans, KMeansConfig};
use std::time::Duration;

fn benchmark_kmeans_varying_samples(c: &mut Criterion) {
    let mut group = c.benchmark_group("kmeans_samples");
    group.sample_size(10);
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_secs(2));

    let n_features = 64;
    let k = 32;
    let sample_sizes = [1_000, 5_000, 10_000];

    for n_samples in sample_sizes.iter() {
        group.throughput(Throughput::Elements(*n_samples as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(n_samples),
            n_samples,
            |b, &n_samples| {
                let data = Array2::random((n_samples, n_features), Uniform::new(-1.0, 1.0));
                let kmeans =
                    KMeans::with_config(KMeansConfig::new(k).with_max_iters(5).with_seed(42));

                b.iter(|| kmeans.fit(black_box(&data.view())).unwrap());
            },
        );
    }
    group.finish();
}

fn benchmark_kmeans_varying_partitions(c: &mut Criterion) {
    let mut group = c.benchmark_group("kmeans_partitions");
    group.sample_size(10);
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_secs(2));

    let n_samples = 10_000;
    let n_features = 32;
    let partition_counts = [1, 4, 16];

    for parallelism in partition_counts.iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(parallelism),
            parallelism,
            |b, &parallelism| {
                let data = Array2::random((n_samples, n_features), Uniform::new(-1.0, 1.0));
                let config = KMeansConfig::new(20)
                    .with_max_iters(5)
                    .with_seed(42)
                    .with_parallelism(parallelism);
                let kmeans = KMeans::with_config(config);

                b.iter(|| kmeans.fit(black_box(&data.view())).unwrap());
            },
        );
    }
    group.finish();
}

fn benchmark_predict(c: &mut Criterion) {
    let mut group = c.benchmark_group("kmeans_predict");
    group.sample_size(10);
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_secs(2));

    let n_features = 64;
    let predict_sizes = [1_000, 5_000];

    let train_data = Array2::random((5_000, n_features), Uniform::new(-1.0, 1.0));
    let model = KMeans::with_config(KMeansConfig::new(50).with_max_iters(10).with_seed(42))
        .fit(&train_data.view())
        .unwrap();

    for n_predict in predict_sizes.iter() {
        group.throughput(Throughput::Elements(*n_predict as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(n_predict),
            n_predict,
            |b, &n_predict| {
                let test_data = Array2::random((n_predict, n_features), Uniform::new(-1.0, 1.0));

                b.iter(|| model.predict(black_box(&test_data.view())).unwrap());
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_kmeans_varying_samples,
    benchmark_kmeans_varying_partitions,
    benchmark_predict,
);

criterion_main!(benches);
