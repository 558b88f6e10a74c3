use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Binomial, Distribution};
use snplrt::calibrate::model::ModelType;
use snplrt::pipeline::{ScanOptions, scan_variants};
use snplrt::progress::NoopScanProgress;
use snplrt::types::{FeatureSet, SnpFeatureMap, SnpLabel};

const N_VARIANTS: usize = 64;

fn random_feature_set(n_samples: usize) -> FeatureSet {
    let mut rng = StdRng::seed_from_u64(0x5EED_5CA4 + n_samples as u64);
    let dosage = Binomial::new(2, 0.25).expect("valid binomial");
    let feature_matrix =
        Array2::from_shape_fn((n_samples, 2 * N_VARIANTS), |_| dosage.sample(&mut rng) as f64);
    let class_labels = Array1::from_shape_fn(n_samples, |_| {
        if rng.gen_bool(0.35) { 1.0 } else { 0.0 }
    });
    let snp_feature_map: SnpFeatureMap = (0..N_VARIANTS)
        .map(|v| (SnpLabel::new("1", 1_000 + v as u64), vec![2 * v, 2 * v + 1]))
        .collect();
    FeatureSet {
        feature_matrix,
        class_labels,
        snp_feature_map,
    }
}

fn benchmark_scan(c: &mut Criterion) {
    let sizes = [200_usize, 1_000, 5_000];
    let feature_sets: Vec<_> = sizes
        .iter()
        .map(|&size| (size, random_feature_set(size)))
        .collect();

    let mut group = c.benchmark_group("variant_scan");
    group.sample_size(10);
    for (size, features) in feature_sets.iter() {
        group.throughput(Throughput::Elements(N_VARIANTS as u64));

        for model_type in [ModelType::ProbSolver, ModelType::Lr] {
            let options = ScanOptions::new(model_type);
            group.bench_with_input(
                BenchmarkId::new(model_type.as_str(), size),
                features,
                |b, input| {
                    b.iter(|| {
                        let outcome = scan_variants(black_box(input), &options, &NoopScanProgress)
                            .expect("scan succeeds");
                        black_box(outcome);
                    });
                },
            );
        }
    }
    group.finish();
}

criterion_group!(variant_scan, benchmark_scan);
criterion_main!(variant_scan);
