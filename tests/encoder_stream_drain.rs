//! Streaming against a chatty encoder binary: the subprocess's progress
//! output must be drained while frames are written, or a full output pipe
//! stalls the encoder and blocks the stream.

#![cfg(unix)]

use dailies::{CodecConfig, FrameStreamEncoder, PixelBuffer};

// Floods stderr with far more than a pipe buffer of progress lines before
// consuming any input, the way a verbose encoder reports while working.
const CHATTY_ENCODER: &str = r#"#!/bin/sh
i=0
while [ $i -lt 4000 ]; do
  echo "frame=$i fps=0.0 q=-0.0 size=0kB time=00:00:00.00 bitrate=N/A" >&2
  i=$((i+1))
done
cat > /dev/null
exit 0
"#;

fn fake_encoder(dir: &std::path::Path) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("ffmpeg");
    std::fs::write(&path, CHATTY_ENCODER).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn codec() -> CodecConfig {
    serde_yaml::from_str("{ name: avchq, bitdepth: 8 }").unwrap()
}

#[test]
fn chatty_encoder_output_is_drained_while_streaming() {
    let dir = tempfile::tempdir().unwrap();
    let program = fake_encoder(dir.path());

    let args = vec!["-i".to_string(), "pipe:0".to_string()];
    let mut encoder = FrameStreamEncoder::spawn(&program, &codec(), 256, 256, &args).unwrap();

    // 40 raw frames of 192 KiB each, written while the encoder is still
    // spraying stderr; without continuous draining this wedges on the first
    // few frames.
    let buf = PixelBuffer::new(256, 256, 3).unwrap();
    for n in 1..=40u64 {
        encoder.write_frame(&buf, n).unwrap();
    }
    let report = encoder.finish().unwrap();

    assert!(report.success);
    assert_eq!(report.frames_written, 40);
    assert!(report.stderr.contains("frame=3999"));
}
