//! End-to-end checks of the frame-stream protocol: ordered writes of exact
//! byte lengths into a capture sink, one close, no encoder binary needed.

use dailies::{
    CodecConfig, CropAmount, FrameStreamEncoder, GeometrySpec, PixelBuffer, normalize,
    resolve_sequences,
};

fn codec(name: &str, bitdepth: u32) -> CodecConfig {
    serde_yaml::from_str(&format!("{{ name: {name}, bitdepth: {bitdepth} }}")).unwrap()
}

fn write_png(path: &std::path::Path, width: u32, height: u32, tint: u8) {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([tint, (x % 256) as u8, (y % 256) as u8])
    });
    img.save(path).unwrap();
}

#[test]
fn three_frame_sequence_streams_in_order() {
    let dir = tempfile::tempdir().unwrap();
    for (i, n) in (1001u32..=1003).enumerate() {
        write_png(&dir.path().join(format!("shot.{n}.png")), 1920, 1080, i as u8);
    }

    let sequences = resolve_sequences(dir.path(), &["png".to_string()]).unwrap();
    assert_eq!(sequences.len(), 1);
    let sequence = &sequences[0];
    assert_eq!(sequence.start(), 1001);
    assert_eq!(sequence.end(), 1003);

    let spec = GeometrySpec {
        width: 640,
        height: 360,
        fit: true,
        filter: None,
        crop_width: None,
        crop_height: None,
    };

    let mut encoder = FrameStreamEncoder::capture(&codec("avchq", 8), 640, 360);
    for frame in sequence.frames() {
        let buf = PixelBuffer::load(&frame.path).unwrap().drop_alpha();
        let out = normalize(&buf, &spec).unwrap();
        encoder.write_frame(&out, frame.number).unwrap();
    }
    let report = encoder.finish().unwrap();

    assert_eq!(report.frames_written, 3);
    assert_eq!(report.captured_frames.len(), 3);
    for payload in &report.captured_frames {
        assert_eq!(payload.len(), 640 * 360 * 3);
    }
}

#[test]
fn ten_bit_codec_streams_sixteen_bit_payloads() {
    let dir = tempfile::tempdir().unwrap();
    write_png(&dir.path().join("shot.0001.png"), 640, 360, 128);

    let sequences = resolve_sequences(dir.path(), &["png".to_string()]).unwrap();
    let frame = &sequences[0].frames()[0];

    let mut encoder = FrameStreamEncoder::capture(&codec("avchq", 10), 640, 360);
    let buf = PixelBuffer::load(&frame.path).unwrap().drop_alpha();
    encoder.write_frame(&buf, frame.number).unwrap();
    let report = encoder.finish().unwrap();

    assert_eq!(report.captured_frames[0].len(), 640 * 360 * 3 * 2);
}

#[test]
fn photo_codec_streams_jpeg_payloads() {
    let dir = tempfile::tempdir().unwrap();
    write_png(&dir.path().join("shot.0001.png"), 64, 64, 10);

    let sequences = resolve_sequences(dir.path(), &["png".to_string()]).unwrap();
    let frame = &sequences[0].frames()[0];

    let mut encoder = FrameStreamEncoder::capture(&codec("mjpeg", 8), 64, 64);
    let buf = PixelBuffer::load(&frame.path).unwrap().drop_alpha();
    encoder.write_frame(&buf, frame.number).unwrap();
    let report = encoder.finish().unwrap();

    // JPEG magic, not raw samples.
    assert_eq!(&report.captured_frames[0][..2], &[0xFF, 0xD8]);
}

#[test]
fn crop_then_resize_chain_produces_target_bytes() {
    let dir = tempfile::tempdir().unwrap();
    write_png(&dir.path().join("plate.0001.png"), 2000, 1000, 200);

    let sequences = resolve_sequences(dir.path(), &["png".to_string()]).unwrap();
    let frame = &sequences[0].frames()[0];

    // "10%" crop removes 200px of width; the remaining 1800x1000 is resized
    // to 900x500 and fit is a no-op at the matching height.
    let spec = GeometrySpec {
        width: 900,
        height: 500,
        fit: true,
        filter: None,
        crop_width: Some(CropAmount::Text("10%".to_string())),
        crop_height: None,
    };
    let buf = PixelBuffer::load(&frame.path).unwrap().drop_alpha();
    let out = normalize(&buf, &spec).unwrap();
    assert_eq!(out.canvas_width(), 900);
    assert_eq!(out.canvas_height(), 500);
    assert_eq!(out.to_bytes(dailies::BitDepth::Eight).len(), 900 * 500 * 3);
}
