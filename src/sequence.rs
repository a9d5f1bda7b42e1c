use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use regex::Regex;
use tracing::debug;

use crate::error::{DailiesError, DailiesResult};

/// A single image file belonging to a sequence.
#[derive(Clone, Debug)]
pub struct Frame {
    pub path: PathBuf,
    pub number: u64,
}

/// An ordered set of numbered frame files sharing a `<head><digits><tail>`
/// naming pattern within one directory.
///
/// Frame numbers are strictly increasing with no duplicates; gaps are
/// allowed and iteration follows membership order, never gap filling.
#[derive(Clone, Debug)]
pub struct FrameSequence {
    pub directory: PathBuf,
    pub head: String,
    pub tail: String,
    pub padding: usize,
    frames: Vec<Frame>,
}

impl FrameSequence {
    fn from_members(
        directory: PathBuf,
        head: String,
        tail: String,
        members: BTreeMap<u64, (usize, PathBuf)>,
    ) -> Option<Self> {
        if members.is_empty() {
            return None;
        }
        let widths: Vec<usize> = members.values().map(|(w, _)| *w).collect();
        let padding = if widths.iter().all(|w| *w == widths[0]) {
            widths[0]
        } else {
            0
        };
        let frames = members
            .into_iter()
            .map(|(number, (_, path))| Frame { path, number })
            .collect();
        Some(Self {
            directory,
            head,
            tail,
            padding,
            frames,
        })
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn first(&self) -> &Frame {
        &self.frames[0]
    }

    pub fn start(&self) -> u64 {
        self.frames[0].number
    }

    pub fn end(&self) -> u64 {
        self.frames[self.frames.len() - 1].number
    }

    /// Sequence base name with any trailing separator character removed
    /// (`shot.` becomes `shot`). Used for naming the output movie.
    pub fn base_name(&self) -> &str {
        self.head.trim_end_matches(['.', '_', '-'])
    }

    /// File extension shared by all members, without the leading dot.
    pub fn extension(&self) -> Option<&str> {
        let (_, ext) = self.tail.rsplit_once('.')?;
        if ext.is_empty() { None } else { Some(ext) }
    }

    /// Human-readable pattern, e.g. `shot.####.exr`.
    pub fn pattern(&self) -> String {
        let hashes = "#".repeat(self.padding.max(1));
        format!("{}{}{}", self.head, hashes, self.tail)
    }
}

/// Split a file name into `(head, number, digits-width, tail)` around its
/// last run of digits.
fn split_frame_token(file_name: &str) -> Option<(String, u64, usize, String)> {
    // Last digit run, then only non-digits to the end (the extension).
    let re = Regex::new(r"^(.*?)(\d+)(\D*)$").expect("frame token pattern is valid");
    let caps = re.captures(file_name)?;
    let digits = caps.get(2)?.as_str();
    let number: u64 = digits.parse().ok()?;
    Some((
        caps.get(1)?.as_str().to_string(),
        number,
        digits.len(),
        caps.get(3)?.as_str().to_string(),
    ))
}

/// Split a printf-style (`%04d`) or hash-padded (`####`) template into head
/// and tail.
fn split_template_token(file_name: &str) -> Option<(String, String)> {
    let re = Regex::new(r"^(.*?)(%0?\d*d|#+)(.*)$").expect("template pattern is valid");
    let caps = re.captures(file_name)?;
    Some((
        caps.get(1)?.as_str().to_string(),
        caps.get(3)?.as_str().to_string(),
    ))
}

fn extension_of(file_name: &str) -> Option<&str> {
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() { None } else { Some(ext) }
}

/// Group the files of one directory into sequences keyed by head/tail.
fn group_directory(
    directory: &Path,
    file_names: impl IntoIterator<Item = String>,
    formats: &[String],
) -> Vec<FrameSequence> {
    let mut groups: BTreeMap<(String, String), BTreeMap<u64, (usize, PathBuf)>> = BTreeMap::new();
    for name in file_names {
        let Some(ext) = extension_of(&name) else {
            continue;
        };
        if !formats.iter().any(|f| f.eq_ignore_ascii_case(ext)) {
            continue;
        }
        let Some((head, number, width, tail)) = split_frame_token(&name) else {
            continue;
        };
        groups
            .entry((head, tail))
            .or_default()
            .insert(number, (width, directory.join(&name)));
    }
    groups
        .into_iter()
        .filter_map(|((head, tail), members)| {
            FrameSequence::from_members(directory.to_path_buf(), head, tail, members)
        })
        .collect()
}

fn list_file_names(directory: &Path) -> DailiesResult<Vec<String>> {
    let mut names = Vec::new();
    let entries = std::fs::read_dir(directory).map_err(|e| {
        DailiesError::sequence(format!("read directory '{}': {e}", directory.display()))
    })?;
    for entry in entries {
        let entry =
            entry.map_err(|e| DailiesError::sequence(format!("read directory entry: {e}")))?;
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Default allow-list applied when the config leaves `input_image_formats`
/// unset.
pub const DEFAULT_FORMATS: &[&str] = &["exr"];

/// Discover frame sequences from an input path.
///
/// The input may be a directory (searched recursively), a single frame file
/// (siblings matching the same head/tail template are collected), or a
/// `%04d` / `####` template (resolved against its parent directory).
///
/// A missing input path is an error; an input that exists but matches no
/// files yields an empty vec.
pub fn resolve_sequences(input: &Path, formats: &[String]) -> DailiesResult<Vec<FrameSequence>> {
    let formats: Vec<String> = if formats.is_empty() {
        DEFAULT_FORMATS.iter().map(|s| s.to_string()).collect()
    } else {
        formats.to_vec()
    };

    if input.is_dir() {
        let mut sequences = Vec::new();
        for entry in walkdir::WalkDir::new(input)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_dir() {
                continue;
            }
            let names = list_file_names(entry.path())?;
            sequences.extend(group_directory(entry.path(), names, &formats));
        }
        debug!(
            input = %input.display(),
            found = sequences.len(),
            "resolved sequences from directory"
        );
        return Ok(sequences);
    }

    if input.is_file() {
        let directory = input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some((head, _, _, tail)) = split_frame_token(&name) else {
            return Err(DailiesError::sequence(format!(
                "'{name}' has no frame number to infer a sequence from"
            )));
        };
        let names = list_file_names(&directory)?;
        let sequences = group_directory(&directory, names, &formats)
            .into_iter()
            .filter(|s| s.head == head && s.tail == tail)
            .collect();
        return Ok(sequences);
    }

    // Neither file nor directory: treat as a numeric-placeholder template.
    let directory = input.parent().unwrap_or_else(|| Path::new("."));
    if !directory.is_dir() {
        return Err(DailiesError::sequence(format!(
            "input path does not exist: {}",
            input.display()
        )));
    }
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let template = split_template_token(&name);
    let names = list_file_names(directory)?;
    let mut sequences = group_directory(directory, names, &formats);
    if let Some((head, tail)) = template {
        sequences.retain(|s| s.head == head && s.tail == tail);
    }
    Ok(sequences)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn split_finds_last_digit_run() {
        let (head, number, width, tail) = split_frame_token("shot_v002.1001.exr").unwrap();
        assert_eq!(head, "shot_v002.");
        assert_eq!(number, 1001);
        assert_eq!(width, 4);
        assert_eq!(tail, ".exr");
    }

    #[test]
    fn split_rejects_numberless_names() {
        assert!(split_frame_token("readme.txt").is_none());
    }

    #[test]
    fn template_token_variants() {
        assert_eq!(
            split_template_token("shot.%05d.exr").unwrap(),
            ("shot.".to_string(), ".exr".to_string())
        );
        assert_eq!(
            split_template_token("shot.####.exr").unwrap(),
            ("shot.".to_string(), ".exr".to_string())
        );
    }

    #[test]
    fn directory_resolution_groups_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for n in [3u32, 1, 2, 7] {
            touch(&dir.path().join(format!("shot.{n:04}.exr")));
        }
        touch(&dir.path().join("other.0001.exr"));
        touch(&dir.path().join("notes.txt"));

        let seqs = resolve_sequences(dir.path(), &[]).unwrap();
        assert_eq!(seqs.len(), 2);
        let shot = seqs.iter().find(|s| s.head == "shot.").unwrap();
        let numbers: Vec<u64> = shot.frames().iter().map(|f| f.number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 7]);
        assert_eq!(shot.padding, 4);
        assert_eq!(shot.base_name(), "shot");
        assert_eq!(shot.extension(), Some("exr"));
    }

    #[test]
    fn numbers_strictly_increasing_no_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        for n in 1..=5u32 {
            touch(&dir.path().join(format!("a.{n:04}.exr")));
        }
        let seqs = resolve_sequences(dir.path(), &[]).unwrap();
        let numbers: Vec<u64> = seqs[0].frames().iter().map(|f| f.number).collect();
        for pair in numbers.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn empty_directory_yields_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("notes.txt"));
        let seqs = resolve_sequences(dir.path(), &[]).unwrap();
        assert!(seqs.is_empty());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let err = resolve_sequences(Path::new("/nonexistent/seq.%04d.exr"), &[]);
        assert!(err.is_err());
    }

    #[test]
    fn extension_allow_list_filters_sequences() {
        let dir = tempfile::tempdir().unwrap();
        for n in 1..=3u32 {
            touch(&dir.path().join(format!("a.{n:04}.exr")));
            touch(&dir.path().join(format!("a.{n:04}.jpg")));
        }
        let seqs = resolve_sequences(dir.path(), &["jpg".to_string()]).unwrap();
        assert_eq!(seqs.len(), 1);
        assert_eq!(seqs[0].extension(), Some("jpg"));
    }

    #[test]
    fn single_file_input_infers_siblings() {
        let dir = tempfile::tempdir().unwrap();
        for n in 10..=14u32 {
            touch(&dir.path().join(format!("plate.{n:04}.exr")));
        }
        touch(&dir.path().join("unrelated.0001.exr"));
        let seqs = resolve_sequences(&dir.path().join("plate.0012.exr"), &[]).unwrap();
        assert_eq!(seqs.len(), 1);
        assert_eq!(seqs[0].len(), 5);
        assert_eq!(seqs[0].start(), 10);
        assert_eq!(seqs[0].end(), 14);
    }

    #[test]
    fn template_input_resolves_against_parent() {
        let dir = tempfile::tempdir().unwrap();
        for n in 1..=3u32 {
            touch(&dir.path().join(format!("plate.{n:05}.exr")));
        }
        let seqs = resolve_sequences(&dir.path().join("plate.%05d.exr"), &[]).unwrap();
        assert_eq!(seqs.len(), 1);
        assert_eq!(seqs[0].pattern(), "plate.#####.exr");
    }

    #[test]
    fn gaps_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        for n in [1u32, 5, 9] {
            touch(&dir.path().join(format!("gap.{n:04}.exr")));
        }
        let seqs = resolve_sequences(dir.path(), &[]).unwrap();
        assert_eq!(seqs[0].len(), 3);
        assert_eq!(seqs[0].end(), 9);
    }
}
