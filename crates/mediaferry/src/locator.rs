// Copyright 2026 Mediaferry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Artifact Locator: resolve the real output file of an extraction.
//!
//! The extractor's final filename depends on the negotiated format and
//! container, so the expected name is only a hint. Resolution order:
//!
//! 1. exact `<expected_stem>.<expected_ext>`
//! 2. any file whose name starts with `<expected_stem>` (sorted, first wins)
//! 3. the only file in the directory, whatever its name
//!
//! Anything else is [`LocateError::NotFound`].

use std::path::{Path, PathBuf};

use crate::error::LocateError;
use crate::job::{Artifact, MediaKind};

/// Resolve the artifact in `work_dir`. Subdirectories are ignored.
pub async fn locate(
    work_dir: &Path,
    expected_stem: &str,
    expected_ext: &str,
) -> Result<PathBuf, LocateError> {
    let mut files = list_files(work_dir).await?;
    files.sort();

    let exact = format!("{expected_stem}.{expected_ext}");
    if let Some(path) = files.iter().find(|p| file_name(p) == Some(exact.as_str())) {
        return Ok(path.clone());
    }

    if let Some(path) = files
        .iter()
        .find(|p| file_name(p).is_some_and(|n| n.starts_with(expected_stem) && !is_partial(n)))
    {
        tracing::debug!(dir = %work_dir.display(), file = %path.display(), "artifact matched by prefix");
        return Ok(path.clone());
    }

    if files.len() == 1 {
        tracing::debug!(dir = %work_dir.display(), file = %files[0].display(), "artifact is the only file");
        return Ok(files.remove(0));
    }

    Err(LocateError::NotFound {
        dir: work_dir.to_path_buf(),
        candidates: files.len(),
    })
}

/// Stat a located file into an [`Artifact`]. A file that vanished or cannot
/// be read is an I/O error, never a zero-length artifact.
pub async fn describe(path: PathBuf, media_kind: MediaKind) -> Result<Artifact, LocateError> {
    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|source| LocateError::Io {
            dir: path.clone(),
            source,
        })?;
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Artifact {
        path,
        extension,
        byte_len: metadata.len(),
        media_kind,
    })
}

async fn list_files(dir: &Path) -> Result<Vec<PathBuf>, LocateError> {
    let io_err = |source| LocateError::Io {
        dir: dir.to_path_buf(),
        source,
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let file_type = entry.file_type().await.map_err(io_err)?;
        if file_type.is_file() {
            files.push(entry.path());
        }
    }
    Ok(files)
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

// Leftovers of an interrupted download never count as a prefix match.
fn is_partial(name: &str) -> bool {
    name.ends_with(".part") || name.ends_with(".ytdl") || name.contains(".part-Frag")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, b"x").unwrap();
        p
    }

    #[tokio::test]
    async fn test_describe_reports_size_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job-1.m4a");
        std::fs::write(&path, vec![0u8; 300]).unwrap();

        let artifact = describe(path.clone(), MediaKind::Audio).await.unwrap();
        assert_eq!(artifact.path, path);
        assert_eq!(artifact.extension, "m4a");
        assert_eq!(artifact.byte_len, 300);
    }

    #[tokio::test]
    async fn test_describe_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = describe(dir.path().join("gone.mp3"), MediaKind::Audio)
            .await
            .unwrap_err();
        assert!(matches!(err, LocateError::Io { .. }));
    }

    #[tokio::test]
    async fn test_exact_match_preferred() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "job-1.webm");
        let want = touch(dir.path(), "job-1.mp3");
        touch(dir.path(), "cover.jpg");

        let got = locate(dir.path(), "job-1", "mp3").await.unwrap();
        assert_eq!(got, want);
    }

    #[tokio::test]
    async fn test_prefix_match_when_extension_differs() {
        let dir = tempfile::tempdir().unwrap();
        let want = touch(dir.path(), "job-1.m4a");
        touch(dir.path(), "thumbnail.jpg");

        let got = locate(dir.path(), "job-1", "mp3").await.unwrap();
        assert_eq!(got, want);
    }

    #[tokio::test]
    async fn test_partial_files_are_not_prefix_matches() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "job-1.mp4.part");
        touch(dir.path(), "other.txt");

        let err = locate(dir.path(), "job-1", "mp4").await.unwrap_err();
        assert!(matches!(err, LocateError::NotFound { candidates: 2, .. }));
    }

    #[tokio::test]
    async fn test_single_file_accepted_regardless_of_name() {
        let dir = tempfile::tempdir().unwrap();
        let want = touch(dir.path(), "Some Title [abc123].opus");

        let first = locate(dir.path(), "job-1", "mp3").await.unwrap();
        let second = locate(dir.path(), "job-1", "mp3").await.unwrap();
        assert_eq!(first, want);
        assert_eq!(second, want);
    }

    #[tokio::test]
    async fn test_ambiguous_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.mp3");
        touch(dir.path(), "b.mp3");

        let err = locate(dir.path(), "job-1", "mp3").await.unwrap_err();
        assert!(matches!(err, LocateError::NotFound { candidates: 2, .. }));
    }

    #[tokio::test]
    async fn test_empty_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let err = locate(dir.path(), "job-1", "mp3").await.unwrap_err();
        assert!(matches!(err, LocateError::NotFound { candidates: 0, .. }));
    }

    #[tokio::test]
    async fn test_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone");
        let err = locate(&gone, "job-1", "mp3").await.unwrap_err();
        assert!(matches!(err, LocateError::Io { .. }));
    }
}
