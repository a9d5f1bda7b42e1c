//! Full pipeline runs in debug-artifact mode: no encoder binary, each frame
//! persisted as a numbered JPEG next to a per-movie log.

use std::collections::BTreeMap;

use dailies::{Config, DailyPipeline, PipelineOptions};

fn sample_config(movie_location: &str) -> Config {
    let yaml = format!(
        r#"
globals:
  width: 320
  height: 180
  framerate: 24
  fit: true
  input_image_formats: [png]
  movie_ext: mov
  movie_location: "{movie_location}"
  movie_append_codec: true
output_codecs:
  avchq:
    name: avchq
    bitdepth: 10
    codec: libx264
dailies_profiles:
  delivery:
    font: /no/such/font.ttf
    font_size: 0.02
    font_color: [0.8, 0.8, 0.8, 1.0]
    leading: 0.2
    text_elements:
      artist:
        box: [0.02, 0.02, 0.4, 0.1]
      framecounter:
        box: [0.9, 0.02, 0.98, 0.1]
        padding: 4
    cropmask:
      enable: true
      aspect: 2.39
      opacity: 0.75
"#
    );
    Config::from_yaml(&yaml).unwrap()
}

fn write_frames(dir: &std::path::Path, base: &str, numbers: &[u32]) {
    for n in numbers {
        let img = image::RgbImage::from_fn(640, 360, |x, _| {
            image::Rgb([(*n % 256) as u8, (x % 256) as u8, 64])
        });
        img.save(dir.join(format!("{base}.{n:04}.png"))).unwrap();
    }
}

#[test]
fn debug_run_writes_stills_and_log() {
    let seq_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    write_frames(seq_dir.path(), "shot", &[1001, 1002, 1003]);

    let config = sample_config(&out_dir.path().display().to_string());
    let resolved = config.resolve(Some("avchq"), Some("delivery"), None).unwrap();

    let mut texts = BTreeMap::new();
    texts.insert("artist".to_string(), "Jed Smith".to_string());
    let pipeline = DailyPipeline::new(
        resolved,
        PipelineOptions {
            output_override: None,
            texts,
            debug: true,
        },
    );

    let movies = pipeline.run(seq_dir.path()).unwrap();
    assert_eq!(movies.len(), 1);
    assert_eq!(
        movies[0].file_name().unwrap().to_string_lossy(),
        "shot_avchq.mov"
    );

    for n in [1001u32, 1002, 1003] {
        assert!(
            out_dir.path().join(format!("shot_avchq.{n:05}.jpg")).is_file(),
            "missing still for frame {n}"
        );
    }

    let log = std::fs::read_to_string(out_dir.path().join("shot_avchq.log")).unwrap();
    assert!(log.contains("processing frame 1001"));
    assert!(log.contains("output resolution 320x180"));
}

#[test]
fn relative_output_override_lands_next_to_sequence() {
    let seq_dir = tempfile::tempdir().unwrap();
    write_frames(seq_dir.path(), "plate", &[1, 2]);

    let config = sample_config("/unused");
    let resolved = config.resolve(None, None, None).unwrap();
    let pipeline = DailyPipeline::new(
        resolved,
        PipelineOptions {
            output_override: Some("dailies".into()),
            texts: BTreeMap::new(),
            debug: true,
        },
    );

    pipeline.run(seq_dir.path()).unwrap();
    assert!(seq_dir.path().join("dailies/plate_avchq.00001.jpg").is_file());
    assert!(seq_dir.path().join("dailies/plate_avchq.00002.jpg").is_file());
}

#[test]
fn run_with_no_sequences_is_fatal() {
    let seq_dir = tempfile::tempdir().unwrap();
    std::fs::write(seq_dir.path().join("notes.txt"), "x").unwrap();

    let out_dir = tempfile::tempdir().unwrap();
    let config = sample_config(&out_dir.path().display().to_string());
    let resolved = config.resolve(None, None, None).unwrap();
    let pipeline = DailyPipeline::new(resolved, PipelineOptions::default());

    assert!(pipeline.run(seq_dir.path()).is_err());
}

#[test]
fn unreadable_frame_is_skipped_and_run_continues() {
    let seq_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    write_frames(seq_dir.path(), "shot", &[1, 3]);
    // Frame 2 exists but is not a decodable image.
    std::fs::write(seq_dir.path().join("shot.0002.png"), b"not a png").unwrap();

    let config = sample_config(&out_dir.path().display().to_string());
    let resolved = config.resolve(None, None, None).unwrap();
    let pipeline = DailyPipeline::new(
        resolved,
        PipelineOptions {
            debug: true,
            ..Default::default()
        },
    );

    pipeline.run(seq_dir.path()).unwrap();
    assert!(out_dir.path().join("shot_avchq.00001.jpg").is_file());
    assert!(!out_dir.path().join("shot_avchq.00002.jpg").exists());
    assert!(out_dir.path().join("shot_avchq.00003.jpg").is_file());

    let log = std::fs::read_to_string(out_dir.path().join("shot_avchq.log")).unwrap();
    assert!(log.contains("skipping frame"));
}
