//! PCM payload decode throughput
//!
//! A narration segment is a few seconds of 24 kHz speech; decoding has to
//! stay far below real time so the producer never starves the scheduler.

use clara_ap::audio::{pcm, DecodedAudioBuffer, EncodedAudioPayload, SYNTHESIS_SAMPLE_RATE};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// Base64 payload of `secs` seconds of a 220 Hz tone
fn tone_payload(secs: f64) -> EncodedAudioPayload {
    let frames = (secs * SYNTHESIS_SAMPLE_RATE as f64) as usize;
    let samples: Vec<f32> = (0..frames)
        .map(|i| {
            let t = i as f32 / SYNTHESIS_SAMPLE_RATE as f32;
            0.4 * (2.0 * std::f32::consts::PI * 220.0 * t).sin()
        })
        .collect();
    pcm::encode_samples(&samples)
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("pcm_decode");

    for secs in [1.0, 5.0, 20.0] {
        let payload = tone_payload(secs);
        let frames = (secs * SYNTHESIS_SAMPLE_RATE as f64) as u64;
        group.throughput(Throughput::Elements(frames));
        group.bench_with_input(BenchmarkId::from_parameter(format!("{}s", secs)), &payload, |b, payload| {
            b.iter(|| pcm::decode(black_box(payload)))
        });
    }

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("pcm_encode");

    let payload = tone_payload(5.0);
    let buffer: DecodedAudioBuffer = match pcm::decode(&payload) {
        Ok(buffer) => buffer,
        Err(e) => panic!("tone payload failed to decode: {}", e),
    };
    group.throughput(Throughput::Elements(buffer.sample_count() as u64));
    group.bench_function("5s", |b| b.iter(|| pcm::encode(black_box(&buffer))));

    group.finish();
}

criterion_group!(benches, bench_decode, bench_encode);
criterion_main!(benches);
