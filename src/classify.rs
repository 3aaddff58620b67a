use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{CompressError, Result};

/// Extensions recognized as optical disc images
const IMAGE_EXTENSIONS: [&str; 2] = ["iso", "img"];

const VTS_PATTERN: &str = r"^VTS_([0-9]+)_([0-9]+)\.VOB$";

/// Processing strategy selected for a dequeued path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Disc image that has to be mounted before encoding
    OpticalImage,
    /// Directory holding a VIDEO_TS structure (or bare VOB files)
    DvdFolder,
    /// Regular video file
    PlainFile,
}

/// Classify a path by its filesystem shape: image-container suffix first,
/// then directory, then plain file.
pub fn classify(path: &Path) -> JobKind {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    if let Some(ext) = extension {
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            return JobKind::OpticalImage;
        }
    }

    if path.is_dir() {
        JobKind::DvdFolder
    } else {
        JobKind::PlainFile
    }
}

/// Resolve the directory holding the title-set stream files: a nested
/// VIDEO_TS directory when present, otherwise the submitted directory itself.
pub fn video_ts_dir(path: &Path) -> PathBuf {
    let nested = path.join("VIDEO_TS");
    if nested.is_dir() { nested } else { path.to_path_buf() }
}

/// Select the stream files of the main movie inside a VIDEO_TS directory.
///
/// Title-set files are named `VTS_<major>_<minor>.VOB`. The sizes of each
/// major number's files are summed and the major with the biggest total is
/// taken to be the main movie (ties go to the first major seen). Its files
/// are returned in ascending minor order, excluding the minor-0 overview
/// file.
pub fn find_main_title(video_ts: &Path) -> Result<Vec<PathBuf>> {
    let vts_regex = Regex::new(VTS_PATTERN)
        .map_err(|e| CompressError::Classify(format!("Invalid VTS pattern: {}", e)))?;

    // (major, minor, path) for every title-set stream file, directory order
    let mut streams: Vec<(String, u32, PathBuf)> = Vec::new();
    let mut totals: Vec<(String, u64)> = Vec::new();

    let mut entries: Vec<PathBuf> = std::fs::read_dir(video_ts)
        .map_err(|e| CompressError::Classify(format!("Failed to read {:?}: {}", video_ts, e)))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    entries.sort();

    for path in entries {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };
        let captures = match vts_regex.captures(name) {
            Some(captures) => captures,
            None => continue,
        };
        let major = captures[1].to_string();
        let minor: u32 = captures[2]
            .parse()
            .map_err(|e| CompressError::Classify(format!("Bad minor number in {}: {}", name, e)))?;
        let size = std::fs::metadata(&path)
            .map_err(|e| CompressError::Classify(format!("Failed to stat {:?}: {}", path, e)))?
            .len();

        match totals.iter_mut().find(|(m, _)| *m == major) {
            Some((_, total)) => *total += size,
            None => totals.push((major.clone(), size)),
        }
        streams.push((major, minor, path));
    }

    // strictly-greater comparison keeps the first-seen major on ties
    let mut best: Option<(&str, u64)> = None;
    for (major, total) in &totals {
        if best.map(|(_, t)| *total > t).unwrap_or(true) {
            best = Some((major, *total));
        }
    }
    let main_major = match best {
        Some((major, total)) => {
            debug!("Main title-set is VTS_{} with {} bytes", major, total);
            major.to_string()
        }
        None => {
            return Err(CompressError::Classify(format!(
                "No title-set stream files in {:?}",
                video_ts
            )));
        }
    };

    let mut selected: Vec<(u32, PathBuf)> = streams
        .into_iter()
        .filter(|(major, minor, _)| *major == main_major && *minor != 0)
        .map(|(_, minor, path)| (minor, path))
        .collect();
    selected.sort_by_key(|(minor, _)| *minor);

    if selected.is_empty() {
        return Err(CompressError::Classify(format!(
            "Main title-set VTS_{} has no content streams",
            main_major
        )));
    }

    Ok(selected.into_iter().map(|(_, path)| path).collect())
}

/// Join stream files into the encoder's virtual concatenated input
/// descriptor, `concat:<a>|<b>|...`.
pub fn concat_input(parts: &[PathBuf]) -> String {
    let joined: Vec<String> = parts
        .iter()
        .map(|p| p.to_string_lossy().to_string())
        .collect();
    format!("concat:{}", joined.join("|"))
}

/// Pick the largest file below a disc-image stream directory. Used for
/// mounted images without a VIDEO_TS tree, where the biggest stream is taken
/// to be the feature content.
pub fn largest_stream(dir: &Path) -> Result<PathBuf> {
    let mut best: Option<(u64, PathBuf)> = None;

    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let size = match entry.metadata() {
            Ok(metadata) => metadata.len(),
            Err(_) => continue,
        };
        if best.as_ref().map(|(s, _)| size > *s).unwrap_or(true) {
            best = Some((size, entry.path().to_path_buf()));
        }
    }

    best.map(|(_, path)| path)
        .ok_or_else(|| CompressError::Classify(format!("No stream files found in {:?}", dir)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, size: usize) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, vec![0u8; size]).expect("write fixture");
        path
    }

    #[test]
    fn test_classify_by_extension_and_shape() {
        let dir = TempDir::new().expect("tempdir");
        let folder = dir.path().join("movie");
        fs::create_dir(&folder).expect("mkdir");
        let file = write_file(dir.path(), "movie.avi", 1);

        assert_eq!(classify(Path::new("/films/disc.iso")), JobKind::OpticalImage);
        assert_eq!(classify(Path::new("/films/disc.IMG")), JobKind::OpticalImage);
        assert_eq!(classify(&folder), JobKind::DvdFolder);
        assert_eq!(classify(&file), JobKind::PlainFile);
        // nonexistent non-image paths fall through to plain file
        assert_eq!(classify(Path::new("/gone/movie.mkv")), JobKind::PlainFile);
    }

    #[test]
    fn test_main_title_picks_biggest_major_and_drops_overview() {
        let dir = TempDir::new().expect("tempdir");
        write_file(dir.path(), "VTS_01_0.VOB", 50);
        let one = write_file(dir.path(), "VTS_01_1.VOB", 700);
        let two = write_file(dir.path(), "VTS_01_2.VOB", 700);
        write_file(dir.path(), "VTS_02_1.VOB", 100);
        write_file(dir.path(), "VIDEO_TS.IFO", 10);

        let vobs = find_main_title(dir.path()).expect("main title");
        assert_eq!(vobs, vec![one, two]);
    }

    #[test]
    fn test_main_title_tie_goes_to_first_seen_major() {
        let dir = TempDir::new().expect("tempdir");
        write_file(dir.path(), "VTS_01_1.VOB", 500);
        write_file(dir.path(), "VTS_02_1.VOB", 500);

        let vobs = find_main_title(dir.path()).expect("main title");
        assert_eq!(vobs.len(), 1);
        assert!(vobs[0].ends_with("VTS_01_1.VOB"));
    }

    #[test]
    fn test_main_title_orders_by_minor_number() {
        let dir = TempDir::new().expect("tempdir");
        let ten = write_file(dir.path(), "VTS_01_10.VOB", 10);
        let two = write_file(dir.path(), "VTS_01_2.VOB", 10);
        let one = write_file(dir.path(), "VTS_01_1.VOB", 10);

        let vobs = find_main_title(dir.path()).expect("main title");
        assert_eq!(vobs, vec![one, two, ten]);
    }

    #[test]
    fn test_main_title_fails_without_streams() {
        let dir = TempDir::new().expect("tempdir");
        write_file(dir.path(), "README.txt", 10);
        assert!(find_main_title(dir.path()).is_err());
    }

    #[test]
    fn test_concat_input_descriptor() {
        let parts = vec![PathBuf::from("/a/VTS_01_1.VOB"), PathBuf::from("/a/VTS_01_2.VOB")];
        assert_eq!(concat_input(&parts), "concat:/a/VTS_01_1.VOB|/a/VTS_01_2.VOB");

        let single = vec![PathBuf::from("/a/VTS_01_1.VOB")];
        assert_eq!(concat_input(&single), "concat:/a/VTS_01_1.VOB");
    }

    #[test]
    fn test_largest_stream_walks_nested_directories() {
        let dir = TempDir::new().expect("tempdir");
        let nested = dir.path().join("STREAM");
        fs::create_dir(&nested).expect("mkdir");
        write_file(dir.path(), "index.bdmv", 10);
        let feature = write_file(&nested, "00001.m2ts", 900);
        write_file(&nested, "00002.m2ts", 100);

        assert_eq!(largest_stream(dir.path()).expect("largest"), feature);
    }
}
