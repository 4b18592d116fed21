use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

const BOOT2DOCKER_REPO: &str = "boot2docker/boot2docker";
const ISO_ASSET: &str = "boot2docker.iso";
const MIB: u64 = 1024 * 1024;
const PROGRESS_STEP: u64 = 10 * MIB;

/// Where a machine's boot ISO comes from, decided by the configured URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootImageSource {
    /// No URL configured: newest boot2docker release on GitHub.
    LatestRelease,
    Remote(String),
    Local(PathBuf),
}

impl BootImageSource {
    pub fn from_url(url: &str) -> Self {
        let url = url.trim();
        if url.is_empty() {
            BootImageSource::LatestRelease
        } else if url.starts_with("http://") || url.starts_with("https://") {
            BootImageSource::Remote(url.to_string())
        } else if let Some(path) = url.strip_prefix("file://") {
            BootImageSource::Local(PathBuf::from(path))
        } else {
            BootImageSource::Local(PathBuf::from(url))
        }
    }
}

/// Place the boot ISO for `url` at `dest`. An ISO already at `dest` is kept.
pub fn ensure_boot_image(url: &str, dest: &Path) -> Result<()> {
    if dest.exists() {
        debug!(path = %dest.display(), "boot image already present");
        return Ok(());
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    match BootImageSource::from_url(url) {
        BootImageSource::LatestRelease => {
            let url = latest_release_url()?;
            download(&url, dest)
        }
        BootImageSource::Remote(url) => download(&url, dest),
        BootImageSource::Local(path) => {
            info!("copying boot image from {}", path.display());
            fs::copy(&path, dest).map_err(|e| {
                Error::BootImage(format!("failed to copy {}: {}", path.display(), e))
            })?;
            Ok(())
        }
    }
}

#[derive(Deserialize)]
struct GithubRelease {
    tag_name: String,
}

fn latest_release_url() -> Result<String> {
    info!("looking up latest boot2docker release...");

    let api_url = format!(
        "https://api.github.com/repos/{}/releases/latest",
        BOOT2DOCKER_REPO
    );

    let response = ureq::get(&api_url)
        .header("Accept", "application/vnd.github+json")
        .header("User-Agent", "qemu-machine")
        .call()
        .map_err(|e| Error::BootImage(format!("failed to query latest release: {}", e)))?;

    let release: GithubRelease = response
        .into_body()
        .read_json()
        .map_err(|e| Error::BootImage(format!("failed to parse release info: {}", e)))?;

    Ok(release_iso_url(&release.tag_name))
}

fn release_iso_url(tag: &str) -> String {
    format!(
        "https://github.com/{}/releases/download/{}/{}",
        BOOT2DOCKER_REPO, tag, ISO_ASSET
    )
}

/// Stream `url` into `dest` through a sibling temp file so an interrupted
/// download never leaves a truncated ISO behind.
fn download(url: &str, dest: &Path) -> Result<()> {
    info!("downloading boot image from {}", url);

    let response = ureq::get(url)
        .call()
        .map_err(|e| Error::BootImage(format!("download of {} failed: {}", url, e)))?;

    let total_bytes = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let total_mb = total_bytes.map(|b| b / MIB);
    let mut reader = ProgressReader::new(
        response.into_body().into_reader(),
        PROGRESS_STEP,
        |bytes| match total_mb {
            Some(total_mb) => {
                info!(downloaded_mb = bytes / MIB, total_mb, "downloading boot image")
            }
            None => info!(downloaded_mb = bytes / MIB, "downloading boot image"),
        },
    );

    let tmp_path = dest.with_extension("iso.download");
    let mut out = fs::File::create(&tmp_path)?;
    if let Err(e) = io::copy(&mut reader, &mut out) {
        let _ = fs::remove_file(&tmp_path);
        return Err(Error::BootImage(format!("download of {} failed: {}", url, e)));
    }
    drop(out);

    persist_download(&tmp_path, dest)?;
    info!(path = %dest.display(), bytes = reader.bytes_read, "boot image ready");
    Ok(())
}

/// Move a finished download into place, dropping the temp file if that fails.
fn persist_download(tmp_path: &Path, dest: &Path) -> Result<()> {
    if let Err(e) = fs::rename(tmp_path, dest) {
        let _ = fs::remove_file(tmp_path);
        return Err(Error::BootImage(format!(
            "failed to move download into {}: {}",
            dest.display(),
            e
        )));
    }
    Ok(())
}

/// Wraps a reader and calls `on_progress` with the running byte count each
/// time another `step` bytes have gone through.
struct ProgressReader<R, F> {
    inner: R,
    step: u64,
    bytes_read: u64,
    next_report: u64,
    on_progress: F,
}

impl<R, F: FnMut(u64)> ProgressReader<R, F> {
    fn new(inner: R, step: u64, on_progress: F) -> Self {
        Self {
            inner,
            step,
            bytes_read: 0,
            next_report: step,
            on_progress,
        }
    }
}

impl<R: Read, F: FnMut(u64)> Read for ProgressReader<R, F> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bytes_read += n as u64;

        if self.bytes_read >= self.next_report {
            (self.on_progress)(self.bytes_read);
            while self.next_report <= self.bytes_read {
                self.next_report += self.step;
            }
        }

        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_follows_url_shape() {
        assert_eq!(BootImageSource::from_url(""), BootImageSource::LatestRelease);
        assert_eq!(BootImageSource::from_url("  "), BootImageSource::LatestRelease);
        assert_eq!(
            BootImageSource::from_url("https://example.com/b2d.iso"),
            BootImageSource::Remote("https://example.com/b2d.iso".to_string())
        );
        assert_eq!(
            BootImageSource::from_url("file:///tmp/b2d.iso"),
            BootImageSource::Local(PathBuf::from("/tmp/b2d.iso"))
        );
        assert_eq!(
            BootImageSource::from_url("/tmp/b2d.iso"),
            BootImageSource::Local(PathBuf::from("/tmp/b2d.iso"))
        );
    }

    #[test]
    fn release_url_points_at_iso_asset() {
        assert_eq!(
            release_iso_url("v19.03.12"),
            "https://github.com/boot2docker/boot2docker/releases/download/v19.03.12/boot2docker.iso"
        );
    }

    #[test]
    fn local_iso_is_copied_into_store() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("cache.iso");
        fs::write(&src, b"iso bytes").unwrap();
        let dest = dir.path().join("machine").join("boot2docker.iso");

        ensure_boot_image(&format!("file://{}", src.display()), &dest).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"iso bytes");
    }

    #[test]
    fn existing_iso_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("boot2docker.iso");
        fs::write(&dest, b"already here").unwrap();

        // A missing source would fail if it were consulted.
        ensure_boot_image("/does/not/exist.iso", &dest).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"already here");
    }

    #[test]
    fn missing_local_iso_is_boot_image_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ensure_boot_image(
            &dir.path().join("missing.iso").display().to_string(),
            &dir.path().join("boot2docker.iso"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::BootImage(_)));
    }

    #[test]
    fn progress_is_reported_once_per_step() {
        let data = vec![7u8; 3000];
        let mut reports = Vec::new();
        let mut out = Vec::new();
        {
            let mut reader = ProgressReader::new(&data[..], 1000, |bytes| reports.push(bytes));
            let mut buf = [0u8; 250];
            loop {
                let n = reader.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                out.extend_from_slice(&buf[..n]);
            }
            assert_eq!(reader.bytes_read, 3000);
        }
        assert_eq!(out, data);
        assert_eq!(reports, [1000, 2000, 3000]);
    }

    #[test]
    fn failed_move_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join("boot2docker.iso.download");
        fs::write(&tmp, b"partial").unwrap();
        let dest = dir.path().join("missing").join("boot2docker.iso");

        let err = persist_download(&tmp, &dest).unwrap_err();

        assert!(matches!(err, Error::BootImage(_)));
        assert!(!tmp.exists());
        assert!(!dest.exists());
    }

    #[test]
    fn finished_download_lands_at_destination() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join("boot2docker.iso.download");
        fs::write(&tmp, b"iso").unwrap();
        let dest = dir.path().join("boot2docker.iso");

        persist_download(&tmp, &dest).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"iso");
        assert!(!tmp.exists());
    }
}
