use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use voxserve::audio::wav::{encode_wav, f32_to_i16};
use voxserve::tts::chunker::split_text;

const PARAGRAPH: &str = "The quick brown fox jumps over the lazy dog. \
    Meanwhile, in a distant village, the baker was preparing bread: rye, \
    sourdough and a few experimental loaves! Would anyone notice the \
    difference? Probably not, but he kept trying anyway. ";

/// Generate a 220 Hz tone of `secs` seconds at 24 kHz.
fn tone(secs: usize) -> Vec<f32> {
    let rate = 24000;
    let step = 2.0 * std::f32::consts::PI * 220.0 / rate as f32;
    (0..rate * secs).map(|i| 0.3 * (i as f32 * step).sin()).collect()
}

fn bench_split_text(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_text");
    for repeats in [1usize, 10, 40] {
        let text = PARAGRAPH.repeat(repeats);
        group.bench_with_input(
            BenchmarkId::from_parameter(text.chars().count()),
            &text,
            |b, text| b.iter(|| split_text(black_box(text), 250)),
        );
    }
    group.finish();
}

fn bench_encode_wav(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_wav");
    for secs in [1usize, 10, 60] {
        let samples = f32_to_i16(&tone(secs));
        group.bench_with_input(BenchmarkId::new("seconds", secs), &samples, |b, samples| {
            b.iter(|| encode_wav(black_box(samples), 24000))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_split_text, bench_encode_wav);
criterion_main!(benches);
