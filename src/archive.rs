//! Packaging of the segment output directory as a gzipped tarball.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use log::info;

use crate::error::{Result, SegmentError};

/// File name of the archive produced by [`create_segments_tarball`].
pub const TARBALL_NAME: &str = "road_segments.tar.gz";

/// Directory name the output is stored under inside the archive.
const ARCHIVE_ROOT: &str = "segments";

/// Archive `segments_dir` into `<tar_dir>/road_segments.tar.gz`.
///
/// The directory contents are stored under `segments/`. `tar_dir` is created
/// if needed. Returns the archive path.
pub fn create_segments_tarball(
    segments_dir: impl AsRef<Path>,
    tar_dir: impl AsRef<Path>,
) -> Result<PathBuf> {
    let segments_dir = segments_dir.as_ref();
    let tar_dir = tar_dir.as_ref();

    if !segments_dir.is_dir() {
        return Err(SegmentError::io(
            segments_dir,
            std::io::Error::new(std::io::ErrorKind::NotFound, "segments directory not found"),
        ));
    }
    fs::create_dir_all(tar_dir).map_err(|e| SegmentError::io(tar_dir, e))?;

    let tar_path = tar_dir.join(TARBALL_NAME);
    info!(
        "[Archive] Packing {} -> {}",
        segments_dir.display(),
        tar_path.display()
    );

    let file = File::create(&tar_path).map_err(|e| SegmentError::io(&tar_path, e))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder
        .append_dir_all(ARCHIVE_ROOT, segments_dir)
        .map_err(|e| SegmentError::io(segments_dir, e))?;

    let encoder = builder
        .into_inner()
        .map_err(|e| SegmentError::io(&tar_path, e))?;
    encoder
        .finish()
        .map_err(|e| SegmentError::io(&tar_path, e))?;

    Ok(tar_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;

    #[test]
    fn test_tarball_layout() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("combined_segments.geojson"), "{}").unwrap();
        let out = tempfile::tempdir().unwrap();

        let tar_path = create_segments_tarball(src.path(), out.path().join("nested")).unwrap();
        assert_eq!(tar_path.file_name().unwrap(), TARBALL_NAME);

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&tar_path).unwrap()));
        let names: Vec<PathBuf> = archive
            .entries()
            .unwrap()
            .map(|entry| entry.unwrap().path().unwrap().into_owned())
            .collect();
        assert!(names.contains(&PathBuf::from("segments/combined_segments.geojson")));
    }

    #[test]
    fn test_missing_directory() {
        let out = tempfile::tempdir().unwrap();
        let err = create_segments_tarball(out.path().join("absent"), out.path()).unwrap_err();
        assert!(matches!(err, SegmentError::Io { .. }));
    }
}
