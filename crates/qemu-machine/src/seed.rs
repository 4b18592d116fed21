//! Seed disk for boot2docker guests.
//!
//! The guest's automount script looks for a tar stream at the start of the
//! first disk. When the stream opens with [`FORMAT_MARKER`] it formats the disk
//! and then unpacks the remaining entries into the docker user's home, which
//! is how the SSH public key gets installed on first boot.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tar::{Builder, EntryType, Header};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::process::CommandRunner;

pub const FORMAT_MARKER: &str = "boot2docker, please format-me";
pub const QEMU_IMG: &str = "qemu-img";

const SSH_DIR: &str = ".ssh";
// Older guest init scripts read the second name.
const AUTHORIZED_KEY_FILES: [&str; 2] = [".ssh/authorized_keys", ".ssh/authorized_keys2"];

/// Build the seed tar stream in memory.
///
/// Entry order matters: marker, `.ssh` directory, then both authorized key
/// files. The returned bytes include the end-of-archive blocks.
pub fn build_seed_archive(public_key: &[u8]) -> Result<Vec<u8>> {
    let mut builder = Builder::new(Vec::new());

    append_file(&mut builder, FORMAT_MARKER, FORMAT_MARKER.as_bytes(), 0o644)?;

    let mut header = Header::new_ustar();
    header.set_entry_type(EntryType::Directory);
    header.set_mode(0o700);
    header.set_size(0);
    builder
        .append_data(&mut header, SSH_DIR, io::empty())
        .map_err(Error::ArchiveWrite)?;

    for name in AUTHORIZED_KEY_FILES {
        append_file(&mut builder, name, public_key, 0o644)?;
    }

    builder.into_inner().map_err(Error::ArchiveWrite)
}

fn append_file(builder: &mut Builder<Vec<u8>>, name: &str, data: &[u8], mode: u32) -> Result<()> {
    let mut header = Header::new_ustar();
    header.set_entry_type(EntryType::Regular);
    header.set_mode(mode);
    header.set_size(data.len() as u64);
    builder
        .append_data(&mut header, name, data)
        .map_err(Error::ArchiveWrite)
}

/// Path of the transient raw image written next to the final disk.
pub fn raw_image_path(disk_path: &Path) -> PathBuf {
    let mut raw: OsString = disk_path.as_os_str().to_owned();
    raw.push(".raw");
    PathBuf::from(raw)
}

/// Write the seed archive as a raw image, convert it to qcow2 at `disk_path`
/// and grow it by `size_mb`.
///
/// Not idempotent. Calling it again for a machine that already has a disk
/// lets `qemu-img` overwrite the existing image.
pub fn build_seed_disk(
    runner: &dyn CommandRunner,
    public_key_path: &Path,
    disk_path: &Path,
    size_mb: u64,
) -> Result<()> {
    let public_key = fs::read(public_key_path).map_err(|source| Error::KeyRead {
        path: public_key_path.to_path_buf(),
        source,
    })?;

    let archive = build_seed_archive(&public_key)?;
    let raw_path = raw_image_path(disk_path);

    debug!(
        path = %raw_path.display(),
        bytes = archive.len(),
        "writing raw seed image"
    );
    fs::write(&raw_path, &archive)?;

    let convert_args = vec![
        "convert".to_string(),
        "-f".to_string(),
        "raw".to_string(),
        "-O".to_string(),
        "qcow2".to_string(),
        raw_path.display().to_string(),
        disk_path.display().to_string(),
    ];
    let output = runner.run(QEMU_IMG, &convert_args)?;
    if output.reports_error() || !output.success() {
        return Err(Error::Conversion {
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }
    info!(path = %disk_path.display(), "converted seed image to qcow2");

    let resize_args = vec![
        "resize".to_string(),
        disk_path.display().to_string(),
        format!("+{}MB", size_mb),
    ];
    let output = runner.run(QEMU_IMG, &resize_args)?;
    if output.reports_error() || !output.success() {
        return Err(Error::Resize {
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }
    info!(path = %disk_path.display(), size_mb, "resized disk image");

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use tar::Archive;

    use super::*;
    use crate::process::testing::{ok_output, RecordingRunner};
    use crate::process::CommandOutput;

    const KEY: &[u8] = b"ssh-rsa AAAAB3NzaC1yc2EAAAADAQABAAABAQC7 docker@host\n";

    struct Entry {
        path: String,
        kind: EntryType,
        mode: u32,
        size: u64,
        body: Vec<u8>,
    }

    fn read_entries(bytes: &[u8]) -> Vec<Entry> {
        let mut archive = Archive::new(bytes);
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let mut body = Vec::new();
                entry.read_to_end(&mut body).unwrap();
                let header = entry.header();
                Entry {
                    path: entry.path().unwrap().to_string_lossy().into_owned(),
                    kind: header.entry_type(),
                    mode: header.mode().unwrap(),
                    size: header.size().unwrap(),
                    body,
                }
            })
            .collect()
    }

    #[test]
    fn archive_has_marker_dir_and_both_key_files_in_order() {
        let bytes = build_seed_archive(KEY).unwrap();
        let entries = read_entries(&bytes);

        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            [
                FORMAT_MARKER,
                ".ssh",
                ".ssh/authorized_keys",
                ".ssh/authorized_keys2"
            ]
        );

        assert_eq!(entries[0].kind, EntryType::Regular);
        assert_eq!(entries[0].body, FORMAT_MARKER.as_bytes());
        assert_eq!(entries[0].size, FORMAT_MARKER.len() as u64);

        assert_eq!(entries[1].kind, EntryType::Directory);
        assert_eq!(entries[1].mode & 0o777, 0o700);
        assert_eq!(entries[1].size, 0);

        for key in &entries[2..] {
            assert_eq!(key.kind, EntryType::Regular);
            assert_eq!(key.mode & 0o777, 0o644);
            assert_eq!(key.size, KEY.len() as u64);
            assert_eq!(key.body, KEY);
        }
    }

    #[test]
    fn archive_starts_with_marker_header() {
        let bytes = build_seed_archive(KEY).unwrap();
        assert!(bytes.starts_with(FORMAT_MARKER.as_bytes()));
        assert_eq!(bytes.len() % 512, 0);
    }

    #[test]
    fn empty_key_still_produces_all_entries() {
        let entries = read_entries(&build_seed_archive(b"").unwrap());
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[3].size, 0);
    }

    #[test]
    fn missing_public_key_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let disk = dir.path().join("disk.qcow2");
        let runner = RecordingRunner::succeeding();
        let calls = runner.calls();

        let err =
            build_seed_disk(&runner, &dir.path().join("id_rsa.pub"), &disk, 20000).unwrap_err();

        assert!(matches!(err, Error::KeyRead { .. }));
        assert!(!raw_image_path(&disk).exists());
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn converts_then_resizes_by_delta() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("id_rsa.pub");
        fs::write(&key, KEY).unwrap();
        let disk = dir.path().join("disk.qcow2");
        let runner = RecordingRunner::succeeding();
        let calls = runner.calls();

        build_seed_disk(&runner, &key, &disk, 30000).unwrap();

        let raw = raw_image_path(&disk);
        assert_eq!(raw, dir.path().join("disk.qcow2.raw"));
        assert_eq!(fs::read(&raw).unwrap(), build_seed_archive(KEY).unwrap());

        let raw = raw.display().to_string();
        let disk = disk.display().to_string();
        let calls = calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, QEMU_IMG);
        assert_eq!(
            calls[0].1,
            ["convert", "-f", "raw", "-O", "qcow2", raw.as_str(), disk.as_str()]
        );
        assert_eq!(calls[1].0, QEMU_IMG);
        assert_eq!(calls[1].1, ["resize", disk.as_str(), "+30000MB"]);
    }

    #[test]
    fn failed_conversion_skips_resize_and_leaves_disk_alone() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("id_rsa.pub");
        fs::write(&key, KEY).unwrap();
        let disk = dir.path().join("disk.qcow2");
        let runner = RecordingRunner::new(|_, _| {
            Ok(CommandOutput {
                code: Some(1),
                stdout: "Could not open".to_string(),
                stderr: "Image is corrupt".to_string(),
            })
        });
        let calls = runner.calls();

        let err = build_seed_disk(&runner, &key, &disk, 20000).unwrap_err();

        match err {
            Error::Conversion { stdout, stderr } => {
                assert_eq!(stdout, "Could not open");
                assert_eq!(stderr, "Image is corrupt");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(calls.borrow().len(), 1);
        assert!(!disk.exists());
    }

    #[test]
    fn conversion_error_line_with_zero_exit_fails() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("id_rsa.pub");
        fs::write(&key, KEY).unwrap();
        let runner = RecordingRunner::new(|_, _| {
            Ok(CommandOutput {
                code: Some(0),
                stdout: String::new(),
                stderr: "qemu-img: error: unknown format".to_string(),
            })
        });

        let err = build_seed_disk(&runner, &key, &dir.path().join("disk.qcow2"), 1).unwrap_err();
        assert!(matches!(err, Error::Conversion { .. }));
    }

    #[test]
    fn failed_resize_reports_resize_error() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("id_rsa.pub");
        fs::write(&key, KEY).unwrap();
        let runner = RecordingRunner::new(|_, args| {
            if args[0] == "resize" {
                Ok(CommandOutput {
                    code: Some(1),
                    stdout: "qemu-img: Image format does not support resize".to_string(),
                    stderr: String::new(),
                })
            } else {
                Ok(ok_output())
            }
        });

        let err = build_seed_disk(&runner, &key, &dir.path().join("disk.qcow2"), 1).unwrap_err();
        match err {
            Error::Resize { stdout, .. } => assert!(stdout.contains("does not support resize")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_qemu_img_is_reported_as_such() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("id_rsa.pub");
        fs::write(&key, KEY).unwrap();
        let runner = RecordingRunner::new(|program, _| {
            Err(Error::ExecutableNotFound {
                program: program.to_string(),
            })
        });

        let err = build_seed_disk(&runner, &key, &dir.path().join("disk.qcow2"), 1).unwrap_err();
        assert!(matches!(err, Error::ExecutableNotFound { .. }));
    }
}
