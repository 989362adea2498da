/// Artifact packing
///
/// Local files and directories are packed into a tar+zstd blob before upload.
/// Every entry is rooted at [`ARCHIVE_ROOT`], so an artifact can be mounted at
/// any path regardless of its original name. Packing is deterministic: the
/// same tree always yields the same bytes, and therefore the same content
/// hash in the cache.
use std::fs;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder, HeaderMode};
use zstd::{decode_all, encode_all};

use crate::error::{GalaxyError, Result};

pub const ARCHIVE_ROOT: &str = "artifact";

const COMPRESSION_LEVEL: i32 = 3;

/// Pack a file or directory into a tar+zstd blob
pub fn pack_path(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(GalaxyError::artifact(
            path.display().to_string(),
            "path does not exist",
        ));
    }

    let mut tar_data = Vec::new();
    {
        let mut tar = Builder::new(&mut tar_data);
        tar.mode(HeaderMode::Deterministic);

        if path.is_dir() {
            for entry in walkdir::WalkDir::new(path).sort_by_file_name() {
                let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
                let relative = entry.path().strip_prefix(path).map_err(|e| {
                    GalaxyError::artifact(path.display().to_string(), e.to_string())
                })?;
                let name = Path::new(ARCHIVE_ROOT).join(relative);
                tar.append_path_with_name(entry.path(), &name)?;
            }
        } else {
            tar.append_path_with_name(path, ARCHIVE_ROOT)?;
        }

        tar.finish()?;
    }

    Ok(encode_all(tar_data.as_slice(), COMPRESSION_LEVEL)?)
}

/// Unpack a blob produced by [`pack_path`] so that its root lands at `dest`
///
/// An existing `dest` is replaced.
pub fn unpack_to(data: &[u8], dest: &Path) -> Result<()> {
    let tar_data = decode_all(data).map_err(|e| {
        GalaxyError::artifact(
            dest.display().to_string(),
            format!("failed to decompress archive: {}", e),
        )
    })?;

    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let staging = tempfile::Builder::new()
        .prefix(".galaxy-unpack")
        .tempdir_in(&parent)?;
    Archive::new(tar_data.as_slice()).unpack(staging.path())?;

    let root = staging.path().join(ARCHIVE_ROOT);
    if !root.exists() {
        return Err(GalaxyError::artifact(
            dest.display().to_string(),
            format!("archive has no '{}' entry", ARCHIVE_ROOT),
        ));
    }

    if dest.is_dir() {
        fs::remove_dir_all(dest)?;
    } else if dest.exists() {
        fs::remove_file(dest)?;
    }
    fs::rename(&root, dest)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_pack_and_unpack_directory() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("dist");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("file1.txt"), "content1").unwrap();
        fs::write(src.join("nested/file2.txt"), "content2").unwrap();

        let blob = pack_path(&src).unwrap();

        let dest = temp.path().join("mounted/input-artifacts/dir");
        unpack_to(&blob, &dest).unwrap();

        assert_eq!(fs::read_to_string(dest.join("file1.txt")).unwrap(), "content1");
        assert_eq!(
            fs::read_to_string(dest.join("nested/file2.txt")).unwrap(),
            "content2"
        );
    }

    #[test]
    fn test_pack_single_file_mounts_under_new_name() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("result.txt");
        fs::write(&src, "42").unwrap();

        let blob = pack_path(&src).unwrap();
        let dest = temp.path().join("input-artifacts/result_file");
        unpack_to(&blob, &dest).unwrap();

        assert_eq!(fs::read_to_string(&dest).unwrap(), "42");
    }

    #[test]
    fn test_packing_is_deterministic() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("dir");
        fs::create_dir(&src).unwrap();
        for name in ["b.txt", "a.txt", "c.txt"] {
            fs::write(src.join(name), name).unwrap();
        }

        assert_eq!(pack_path(&src).unwrap(), pack_path(&src).unwrap());
    }

    #[test]
    fn test_unpack_replaces_existing_destination() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("new.txt"), "new").unwrap();

        let dest = temp.path().join("dest");
        fs::create_dir(&dest).unwrap();
        fs::write(dest.join("old.txt"), "old").unwrap();

        unpack_to(&pack_path(&src).unwrap(), &dest).unwrap();
        assert!(dest.join("new.txt").exists());
        assert!(!dest.join("old.txt").exists());
    }

    #[test]
    fn test_missing_path() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            pack_path(&temp.path().join("missing")),
            Err(GalaxyError::ArtifactResolution { .. })
        ));
    }
}
