use cogvideo_nodes::tensor::{normalize_value, DEFAULT_JPEG_QUALITY};
use cogvideo_nodes::ImageTensor;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn gradient(height: usize, width: usize) -> ImageTensor {
    let data = (0..height * width * 3)
        .map(|i| (i % 256) as f32 / 255.0)
        .collect();
    ImageTensor::new(vec![1, height, width, 3], data).unwrap()
}

/// Benchmark pixel conversion and JPEG encoding at typical node sizes
fn bench_encode_jpeg(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_jpeg");

    for (height, width) in [(256, 256), (512, 768), (1080, 1920)] {
        let tensor = gradient(height, width);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", width, height)),
            &tensor,
            |b, tensor| b.iter(|| black_box(tensor).encode_jpeg(DEFAULT_JPEG_QUALITY)),
        );
    }

    group.finish();
}

/// Benchmark channels-first input, which needs a transpose
fn bench_channels_first(c: &mut Criterion) {
    let (height, width) = (512, 512);
    let data: Vec<f32> = (0..height * width * 3)
        .map(|i| (i % 200) as f32 / 100.0 - 1.0)
        .collect();
    let tensor = ImageTensor::new(vec![3, height, width], data).unwrap();

    c.bench_function("to_pixels_chw_signed", |b| b.iter(|| black_box(&tensor).to_pixels()));
}

fn bench_normalize(c: &mut Criterion) {
    let values: Vec<f32> = (0..65_536).map(|i| i as f32 / 65_536.0).collect();

    c.bench_function("normalize_value", |b| {
        b.iter(|| {
            values
                .iter()
                .map(|&v| normalize_value(black_box(v), false) as u32)
                .sum::<u32>()
        })
    });
}

criterion_group!(benches, bench_encode_jpeg, bench_channels_first, bench_normalize);
criterion_main!(benches);
