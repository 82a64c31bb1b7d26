//! Content-addressed artifact store
//!
//! Every entry lives at `<root>/<digest>-<name>-<version>` and is never
//! modified after it is published. Entries are assembled in a staging
//! directory under `<root>/.tmp` and moved into place with a single rename,
//! so a reader either sees a complete entry or none at all. When two
//! evaluations race on the same entry the loser discards its copy.

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::core::digest::Sha256Digest;
use crate::error::StoreError;

const STAGING_DIR: &str = ".tmp";
const COMPONENTS_FILE: &str = "components";
/// Installer bookkeeping shipped inside component directories
const INSTALLER_FILES: &[&str] = &["manifest.in"];
/// Length of the digest prefix used in entry names
const KEY_LEN: usize = 32;

/// Summary of the store contents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreUsage {
    pub entries: usize,
    pub files: usize,
    pub size_bytes: u64,
}

impl StoreUsage {
    /// Human-readable size
    #[allow(clippy::cast_precision_loss)]
    pub fn format_size(&self) -> String {
        if self.size_bytes < 1024 {
            format!("{} bytes", self.size_bytes)
        } else if self.size_bytes < 1024 * 1024 {
            format!("{:.1} KB", self.size_bytes as f64 / 1024.0)
        } else if self.size_bytes < 1024 * 1024 * 1024 {
            format!("{:.1} MB", self.size_bytes as f64 / (1024.0 * 1024.0))
        } else {
            format!(
                "{:.1} GB",
                self.size_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
            )
        }
    }
}

/// Whether `part` can be used as the name or version in an entry name
pub fn is_entry_component(part: &str) -> bool {
    !part.is_empty()
        && !part.starts_with('.')
        && !part.contains(['/', '\\', '\0'])
        && !part.contains("..")
}

/// Handle to a store directory
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an artifact is published at
    pub fn entry_path(&self, digest: &Sha256Digest, name: &str, version: &str) -> PathBuf {
        self.root
            .join(format!("{}-{name}-{version}", &digest.hex()[..KEY_LEN]))
    }

    /// Published entry, if present
    pub fn lookup(&self, digest: &Sha256Digest, name: &str, version: &str) -> Option<PathBuf> {
        let path = self.entry_path(digest, name, version);
        path.is_dir().then_some(path)
    }

    /// Create a staging directory inside the store
    ///
    /// Staging on the same filesystem keeps the final rename atomic.
    pub fn stage(&self) -> Result<tempfile::TempDir, StoreError> {
        let staging = self.root.join(STAGING_DIR);
        fs::create_dir_all(&staging).map_err(|e| StoreError::CreateDir {
            path: staging.clone(),
            error: e.to_string(),
        })?;
        tempfile::Builder::new()
            .prefix("stage-")
            .tempdir_in(&staging)
            .map_err(|e| StoreError::CreateDir {
                path: staging,
                error: e.to_string(),
            })
    }

    /// Unpack a package tarball and publish it
    ///
    /// A tarball holding a single top-level directory is published with
    /// that directory as the entry root.
    pub fn install_package(
        &self,
        archive: &Path,
        digest: &Sha256Digest,
        name: &str,
        version: &str,
    ) -> Result<PathBuf, StoreError> {
        let target = self.entry_path(digest, name, version);
        if target.is_dir() {
            return Ok(target);
        }

        let staging = self.stage()?;
        let unpacked = staging.path().join("unpacked");
        unpack_tar_gz(archive, &unpacked)?;
        let root = single_child_dir(&unpacked)?.unwrap_or(unpacked);

        self.publish(&root, &target)
    }

    /// Merge component tarballs into one toolchain entry and publish it
    ///
    /// Each tarball has one top directory with a `components` file naming
    /// the subdirectories to merge; without the file every subdirectory is
    /// merged.
    pub fn install_toolchain(
        &self,
        archives: &[PathBuf],
        key: &Sha256Digest,
        version: &str,
    ) -> Result<PathBuf, StoreError> {
        let target = self.entry_path(key, "rust", version);
        if target.is_dir() {
            return Ok(target);
        }

        let staging = self.stage()?;
        let merged = staging.path().join("toolchain");
        fs::create_dir_all(&merged).map_err(|e| StoreError::CreateDir {
            path: merged.clone(),
            error: e.to_string(),
        })?;

        for (n, archive) in archives.iter().enumerate() {
            let unpacked = staging.path().join(format!("component-{n}"));
            unpack_tar_gz(archive, &unpacked)?;
            let top = single_child_dir(&unpacked)?.ok_or_else(|| StoreError::Layout {
                archive: archive.clone(),
                message: "expected a single top-level directory".to_string(),
            })?;

            for component in component_dirs(archive, &top)? {
                tracing::debug!("Merging component '{}'", component.display());
                merge_tree(&component, &merged)?;
            }
        }

        self.publish(&merged, &target)
    }

    /// Move a staged directory to its final path
    fn publish(&self, staged: &Path, target: &Path) -> Result<PathBuf, StoreError> {
        match fs::rename(staged, target) {
            Ok(()) => {
                tracing::info!("Published {}", target.display());
                Ok(target.to_path_buf())
            }
            // Another evaluation published the same content first
            Err(_) if target.is_dir() => {
                tracing::debug!("Store entry {} already published", target.display());
                Ok(target.to_path_buf())
            }
            Err(e) => Err(StoreError::Publish {
                path: target.to_path_buf(),
                error: e.to_string(),
            }),
        }
    }

    /// Published entries (staging area excluded), sorted
    pub fn entries(&self) -> Vec<PathBuf> {
        let Ok(read_dir) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut entries: Vec<PathBuf> = read_dir
            .filter_map(Result::ok)
            .filter(|e| e.file_name() != STAGING_DIR)
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        entries.sort();
        entries
    }

    /// Size and entry count
    pub fn usage(&self) -> StoreUsage {
        let entries = self.entries();
        let mut usage = StoreUsage {
            entries: entries.len(),
            ..StoreUsage::default()
        };
        for entry in entries {
            for file in walkdir::WalkDir::new(entry)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
            {
                usage.files += 1;
                usage.size_bytes += file.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }
        usage
    }

    /// Remove the whole store
    pub fn clean(&self) -> Result<(), StoreError> {
        if !self.root.exists() {
            return Ok(());
        }
        fs::remove_dir_all(&self.root).map_err(|e| StoreError::Remove {
            path: self.root.clone(),
            error: e.to_string(),
        })
    }
}

/// Extract a tar.gz archive into `dest`
///
/// Entries that would land outside `dest` are rejected by `unpack_in`.
pub fn unpack_tar_gz(archive: &Path, dest: &Path) -> Result<(), StoreError> {
    let extract_error = |e: std::io::Error| StoreError::Extract {
        archive: archive.to_path_buf(),
        error: e.to_string(),
    };

    fs::create_dir_all(dest).map_err(|e| StoreError::CreateDir {
        path: dest.to_path_buf(),
        error: e.to_string(),
    })?;

    let file = File::open(archive).map_err(extract_error)?;
    let mut tar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    for entry in tar.entries().map_err(extract_error)? {
        let mut entry = entry.map_err(extract_error)?;
        let unpacked = entry.unpack_in(dest).map_err(extract_error)?;
        if !unpacked {
            let path = entry
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            return Err(StoreError::Layout {
                archive: archive.to_path_buf(),
                message: format!("entry '{path}' escapes the archive root"),
            });
        }
    }
    Ok(())
}

/// The only child of `dir` when it is a directory
fn single_child_dir(dir: &Path) -> Result<Option<PathBuf>, StoreError> {
    let children: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| StoreError::Extract {
            archive: dir.to_path_buf(),
            error: e.to_string(),
        })?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .collect();
    match children.as_slice() {
        [only] if only.is_dir() => Ok(Some(only.clone())),
        _ => Ok(None),
    }
}

/// Component directories listed by an unpacked component tarball
fn component_dirs(archive: &Path, top: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let listing = top.join(COMPONENTS_FILE);
    if listing.is_file() {
        let content = fs::read_to_string(&listing).map_err(|e| StoreError::Extract {
            archive: archive.to_path_buf(),
            error: e.to_string(),
        })?;
        return content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|name| {
                let dir = top.join(name);
                if dir.is_dir() {
                    Ok(dir)
                } else {
                    Err(StoreError::Layout {
                        archive: archive.to_path_buf(),
                        message: format!("listed component '{name}' is missing"),
                    })
                }
            })
            .collect();
    }

    let mut dirs: Vec<PathBuf> = fs::read_dir(top)
        .map_err(|e| StoreError::Extract {
            archive: archive.to_path_buf(),
            error: e.to_string(),
        })?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Move every file of `src` into the same relative location under `dest`
fn merge_tree(src: &Path, dest: &Path) -> Result<(), StoreError> {
    for entry in walkdir::WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(|e| StoreError::Extract {
            archive: src.to_path_buf(),
            error: e.to_string(),
        })?;
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| StoreError::CreateDir {
                path: target.clone(),
                error: e.to_string(),
            })?;
            continue;
        }

        if entry
            .file_name()
            .to_str()
            .is_some_and(|name| INSTALLER_FILES.contains(&name))
        {
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::CreateDir {
                path: parent.to_path_buf(),
                error: e.to_string(),
            })?;
        }
        fs::rename(entry.path(), &target).map_err(|e| StoreError::Publish {
            path: target.clone(),
            error: e.to_string(),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::tarball;
    use tempfile::TempDir;

    fn write_archive(dir: &Path, name: &str, files: &[(&str, &str)]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, tarball(files)).unwrap();
        path
    }

    #[test]
    fn test_entry_path_is_content_addressed() {
        let store = Store::new("/store");
        let digest = Sha256Digest::of(b"mold");
        let path = store.entry_path(&digest, "mold", "1.4.2");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(&digest.hex()[..32]));
        assert!(name.ends_with("-mold-1.4.2"));
    }

    #[test]
    fn test_entry_components() {
        assert!(is_entry_component("1.4.2"));
        assert!(is_entry_component("3.0.5-r1+build"));
        for bad in ["", "..", "../../bin", "1.0/evil", "a\\b", ".hidden", "1..2"] {
            assert!(!is_entry_component(bad), "{bad}");
        }
    }

    #[test]
    fn test_install_package_strips_single_top_dir() {
        let temp = TempDir::new().unwrap();
        let archive = write_archive(
            temp.path(),
            "mold.tar.gz",
            &[("mold-1.4.2/bin/mold", "#!/bin/sh\n")],
        );
        let store = Store::new(temp.path().join("store"));
        let digest = Sha256Digest::of(b"mold");

        let entry = store
            .install_package(&archive, &digest, "mold", "1.4.2")
            .unwrap();
        assert!(entry.join("bin").join("mold").is_file());
        assert_eq!(store.lookup(&digest, "mold", "1.4.2"), Some(entry));
    }

    #[test]
    fn test_install_package_keeps_flat_layout() {
        let temp = TempDir::new().unwrap();
        let archive = write_archive(
            temp.path(),
            "ssl.tar.gz",
            &[("bin/openssl", "x"), ("include/openssl/ssl.h", "y")],
        );
        let store = Store::new(temp.path().join("store"));
        let entry = store
            .install_package(&archive, &Sha256Digest::of(b"ssl"), "openssl", "3.0.5")
            .unwrap();
        assert!(entry.join("bin/openssl").is_file());
        assert!(entry.join("include/openssl/ssl.h").is_file());
    }

    #[test]
    fn test_install_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let archive = write_archive(temp.path(), "a.tar.gz", &[("a/bin/a", "1")]);
        let store = Store::new(temp.path().join("store"));
        let digest = Sha256Digest::of(b"a");

        let first = store.install_package(&archive, &digest, "a", "1").unwrap();
        let second = store.install_package(&archive, &digest, "a", "1").unwrap();
        assert_eq!(first, second);
        assert_eq!(store.entries(), vec![first]);
    }

    #[test]
    fn test_install_toolchain_merges_components() {
        let temp = TempDir::new().unwrap();
        let rustc = write_archive(
            temp.path(),
            "rustc.tar.gz",
            &[
                ("rustc-1.63.0-x86_64-unknown-linux-gnu/components", "rustc\n"),
                ("rustc-1.63.0-x86_64-unknown-linux-gnu/install.sh", "#!/bin/sh\n"),
                ("rustc-1.63.0-x86_64-unknown-linux-gnu/rustc/bin/rustc", "rustc"),
                ("rustc-1.63.0-x86_64-unknown-linux-gnu/rustc/manifest.in", "file:bin/rustc"),
            ],
        );
        let cargo = write_archive(
            temp.path(),
            "cargo.tar.gz",
            &[
                ("cargo-0.64.0-x86_64-unknown-linux-gnu/components", "cargo\n"),
                ("cargo-0.64.0-x86_64-unknown-linux-gnu/cargo/bin/cargo", "cargo"),
            ],
        );
        let store = Store::new(temp.path().join("store"));
        let key = Sha256Digest::of(b"toolchain");

        let entry = store
            .install_toolchain(&[rustc, cargo], &key, "1.63.0")
            .unwrap();
        assert!(entry.join("bin/rustc").is_file());
        assert!(entry.join("bin/cargo").is_file());
        assert!(!entry.join("manifest.in").exists());
        assert!(!entry.join("install.sh").exists());
    }

    #[test]
    fn test_install_toolchain_missing_listed_component() {
        let temp = TempDir::new().unwrap();
        let broken = write_archive(
            temp.path(),
            "broken.tar.gz",
            &[("rustc-x/components", "rustc\n"), ("rustc-x/other/bin/x", "x")],
        );
        let store = Store::new(temp.path().join("store"));
        let err = store
            .install_toolchain(&[broken], &Sha256Digest::of(b"k"), "1.0.0")
            .unwrap_err();
        assert!(matches!(err, StoreError::Layout { .. }));
        assert!(store.entries().is_empty());
    }

    #[test]
    fn test_corrupt_archive_publishes_nothing() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("bad.tar.gz");
        fs::write(&archive, b"definitely not gzip").unwrap();
        let store = Store::new(temp.path().join("store"));
        assert!(store
            .install_package(&archive, &Sha256Digest::of(b"bad"), "bad", "0")
            .is_err());
        assert!(store.entries().is_empty());
    }

    #[test]
    fn test_usage_and_clean() {
        let temp = TempDir::new().unwrap();
        let archive = write_archive(temp.path(), "a.tar.gz", &[("a/bin/a", "12345")]);
        let store = Store::new(temp.path().join("store"));
        store
            .install_package(&archive, &Sha256Digest::of(b"a"), "a", "1")
            .unwrap();

        let usage = store.usage();
        assert_eq!(usage.entries, 1);
        assert_eq!(usage.files, 1);
        assert_eq!(usage.size_bytes, 5);
        assert_eq!(usage.format_size(), "5 bytes");

        store.clean().unwrap();
        assert!(!store.root().exists());
        assert_eq!(store.usage(), StoreUsage::default());
    }

    #[test]
    fn test_format_size() {
        let usage = |size_bytes| StoreUsage {
            size_bytes,
            ..StoreUsage::default()
        };
        assert_eq!(usage(0).format_size(), "0 bytes");
        assert_eq!(usage(1536).format_size(), "1.5 KB");
        assert_eq!(usage(5 * 1024 * 1024).format_size(), "5.0 MB");
        assert_eq!(usage(3 * 1024 * 1024 * 1024).format_size(), "3.0 GB");
    }
}
