//! Benchmarks for caption timing and subtitle rendering at varying narration lengths.
//!
//! Run with: `cargo bench --bench caption_bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use versereel::captions::segment;
use versereel::captions::subtitle::{AssGenerator, SrtGenerator, SubtitleEntry, SubtitleGenerator};

/// Narration of roughly `words` words built from a repeating verse passage.
fn narration(words: usize) -> String {
    let passage = "The Lord is my shepherd; I shall not want. He makes me lie down in green \
        pastures. He leads me beside still waters. He restores my soul, and His love \
        gives me strength and hope and peace for today.";
    passage
        .split_whitespace()
        .cycle()
        .take(words)
        .collect::<Vec<_>>()
        .join(" ")
}

fn bench_segment(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment");

    for words in [40, 120, 400] {
        let text = narration(words);
        #[allow(clippy::cast_precision_loss)]
        let audio_secs = words as f64 / 2.5;
        group.throughput(Throughput::Elements(words as u64));
        group.bench_with_input(BenchmarkId::from_parameter(words), &text, |b, text| {
            b.iter(|| segment(black_box(text), audio_secs, 6, true));
        });
    }

    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("subtitle_render");
    let text = narration(120);
    let entries: Vec<SubtitleEntry> = segment(&text, 48.0, 6, true)
        .iter()
        .map(|s| SubtitleEntry::from_secs(s.start_secs, s.end_secs, s.display_text()))
        .collect();

    group.bench_function("ass", |b| {
        let generator = AssGenerator::new();
        b.iter(|| generator.generate(black_box(&entries)));
    });
    group.bench_function("srt", |b| {
        b.iter(|| SrtGenerator.generate(black_box(&entries)));
    });

    group.finish();
}

criterion_group!(benches, bench_segment, bench_render);
criterion_main!(benches);
