//! Performance benchmarks for DualPOV composition
//!
//! Run with: cargo bench --bench composition_benchmarks
//!
//! Finalization runs planning, poster composition and export back to back
//! once both cameras stop, so these set the floor for stop-to-asset latency.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dualpov::composition::{compose_poster, plan_composition, Layout, MediaAsset, OverlayCorner};
use dualpov::session::FinishedRecording;
use dualpov::testing::synthetic_video_frame;
use dualpov::types::{CameraPosition, Size};
use std::path::PathBuf;
use std::time::Duration;

fn asset(position: CameraPosition, seconds: f64) -> MediaAsset {
    MediaAsset::from_recording(&FinishedRecording {
        path: PathBuf::from(format!("/work/bench-{}.mp4", position)),
        duration: Duration::from_secs_f64(seconds),
        video_size: Size::new(1080.0, 1920.0),
        has_audio: true,
        poster: None,
    })
}

fn layouts() -> [(&'static str, Layout); 2] {
    [
        (
            "pip",
            Layout::PictureInPicture {
                scale: 0.3,
                margin: 24.0,
                corner: OverlayCorner::TopRight,
            },
        ),
        ("stacked", Layout::Stacked),
    ]
}

fn bench_plan_composition(c: &mut Criterion) {
    let mut group = c.benchmark_group("Composition Planning");
    let front = asset(CameraPosition::Front, 15.0);
    let back = asset(CameraPosition::Back, 14.96);

    for (name, layout) in layouts() {
        group.bench_with_input(BenchmarkId::new("plan", name), &layout, |b, layout| {
            b.iter(|| plan_composition(black_box(&front), black_box(&back), layout))
        });
    }
    group.finish();
}

fn bench_compose_poster(c: &mut Criterion) {
    let mut group = c.benchmark_group("Poster Composition");
    let canvas = Size::new(1080.0, 1920.0);

    for (width, height) in [(180u32, 320u32), (360, 640), (720, 1280)] {
        let back = synthetic_video_frame(CameraPosition::Back, 7, width, height);
        let front = synthetic_video_frame(CameraPosition::Front, 7, width, height);
        let transform = layouts()[0].1.front_transform(canvas, canvas);

        group.bench_with_input(
            BenchmarkId::new("pip", format!("{}x{}", width, height)),
            &(back, front),
            |b, (back, front)| {
                b.iter(|| compose_poster(black_box(back), black_box(front), canvas, canvas, &transform))
            },
        );
    }
    group.finish();
}

/// Full render of one second of 64x112 video per camera
#[cfg(feature = "recording")]
fn bench_movie_export(c: &mut Criterion) {
    use dualpov::composition::{AssetExporter, AssetLoader, ExportPreset, ExportRequest};
    use dualpov::recording::{EncoderSettings, MovieExporter, MovieWriter, Mp4AssetLoader};

    let dir = tempfile::tempdir().expect("temp dir");
    let settings = EncoderSettings::new(64, 112, 30.0);
    let loader = Mp4AssetLoader::new();
    let load = |position: CameraPosition| {
        let path = dir.path().join(format!("{}.mp4", position));
        let mut writer = MovieWriter::create(&path, settings.clone()).expect("writer");
        for n in 0..30 {
            writer
                .write_frame(&synthetic_video_frame(position, n, 64, 112))
                .expect("frame");
        }
        writer.finish().expect("finish");
        loader.load(&path).expect("load")
    };
    let front = load(CameraPosition::Front);
    let back = load(CameraPosition::Back);

    let plan = plan_composition(&front, &back, &layouts()[0].1).expect("plan");
    let request = ExportRequest {
        plan,
        destination: dir.path().join("composed.mp4"),
        preset: ExportPreset::HighestQuality,
    };
    let exporter = MovieExporter::new(settings);

    let mut group = c.benchmark_group("Movie Export");
    group.sample_size(10);
    group.bench_function("pip_1s", |b| {
        b.iter(|| exporter.export(black_box(&request)).expect("export"))
    });
    group.finish();
}

#[cfg(feature = "recording")]
criterion_group!(
    benches,
    bench_plan_composition,
    bench_compose_poster,
    bench_movie_export
);
#[cfg(not(feature = "recording"))]
criterion_group!(benches, bench_plan_composition, bench_compose_poster);
criterion_main!(benches);
