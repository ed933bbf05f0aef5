//! Unpack and repack the outer `.ipa` container.
//!
//! Grounded on the teacher's use of the `zip` crate (see
//! `apple-codesign`'s notarization archive handling) generalized to
//! preserve Unix permission bits and symlinks on both unpack and repack,
//! which notarization archives don't need but signed `.ipa`s do.

use std::fs;
use std::io::{Read, Write};
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use zip::read::ZipArchive;
use zip::write::{FileOptions, ZipWriter};

use crate::error::Result;

const SYMLINK_MODE_BITS: u32 = 0o120000;

/// Unpack `ipa_path` into a freshly-created scratch directory under
/// `parent`, mode `0700`. Returns the scratch directory path.
pub fn unpack(ipa_path: &Path, parent: &Path) -> Result<PathBuf> {
    fs::create_dir_all(parent)?;
    let scratch = tempfile_dir(parent)?;

    let file = fs::File::open(ipa_path)?;
    let mut archive = ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let out_path = match entry.enclosed_name() {
            Some(path) => scratch.join(path),
            None => continue,
        };

        let unix_mode = entry.unix_mode();

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        if let Some(mode) = unix_mode {
            if mode & SYMLINK_MODE_BITS == SYMLINK_MODE_BITS {
                let mut target = String::new();
                entry.read_to_string(&mut target)?;
                let _ = fs::remove_file(&out_path);
                symlink(&target, &out_path)?;
                continue;
            }
        }

        let mut out_file = fs::File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out_file)?;

        if let Some(mode) = unix_mode {
            fs::set_permissions(&out_path, fs::Permissions::from_mode(mode & 0o7777))?;
        }
    }

    Ok(scratch)
}

fn tempfile_dir(parent: &Path) -> Result<PathBuf> {
    let dir = parent.join(format!("warpsign-{}", uuid::Uuid::new_v4()));
    fs::create_dir(&dir)?;
    fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))?;
    Ok(dir)
}

/// Repack `scratch_dir` (whose contents are the archive root, i.e. it
/// contains `Payload/Whatever.app`) into `out_path`, preserving symlinks
/// and permission bits, and case sensitivity of entry names.
pub fn repack(scratch_dir: &Path, out_path: &Path) -> Result<()> {
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(out_path)?;
    let mut writer = ZipWriter::new(file);

    for entry in WalkDir::new(scratch_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        let rel_path = entry
            .path()
            .strip_prefix(scratch_dir)
            .expect("walked entry is under scratch_dir");
        let name = rel_path.to_string_lossy().replace('\\', "/");

        let metadata = entry.path().symlink_metadata()?;

        if metadata.file_type().is_symlink() {
            let target = fs::read_link(entry.path())?;
            let options: FileOptions<()> = FileOptions::default()
                .unix_permissions(SYMLINK_MODE_BITS | 0o777);
            writer.start_file(name, options)?;
            writer.write_all(target.to_string_lossy().as_bytes())?;
            continue;
        }

        if metadata.is_dir() {
            let options: FileOptions<()> = FileOptions::default()
                .unix_permissions(metadata.permissions().mode() & 0o7777);
            writer.add_directory(format!("{name}/"), options)?;
            continue;
        }

        let mode = metadata.permissions().mode() & 0o7777;
        let options: FileOptions<()> = FileOptions::default()
            .unix_permissions(mode)
            .compression_method(zip::CompressionMethod::Deflated);
        writer.start_file(name, options)?;
        let mut data = Vec::new();
        fs::File::open(entry.path())?.read_to_end(&mut data)?;
        writer.write_all(&data)?;
    }

    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_simple_tree() {
        let src = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("Payload/Hello.app")).unwrap();
        fs::write(src.path().join("Payload/Hello.app/Hello"), b"binary").unwrap();

        let zip_path = src.path().join("out.ipa");
        repack(src.path(), &zip_path).unwrap();

        let unpack_parent = tempfile::tempdir().unwrap();
        let scratch = unpack(&zip_path, unpack_parent.path()).unwrap();
        let round_tripped = fs::read(scratch.join("Payload/Hello.app/Hello")).unwrap();
        assert_eq!(round_tripped, b"binary");
    }
}
