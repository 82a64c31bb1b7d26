//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests: a temporary
//! project directory and a fake toolchain distribution server plus package
//! index, both served by wiremock.

#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Test project context
///
/// Creates a temporary directory for test projects and provides
/// utilities for setting up test scenarios.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
    /// Separate home for milenv's store, cache and config
    pub home: TempDir,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
            home: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Check if a file exists in the test project
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the test project
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Run the milenv binary in the project with an isolated home
    pub async fn milenv(&self, args: &[&str]) -> std::process::Output {
        tokio::process::Command::new(env!("CARGO_BIN_EXE_milenv"))
            .current_dir(self.dir.path())
            .args(args)
            .env("MILENV_DATA_DIR", self.home.path().join("data"))
            .env("MILENV_CACHE_DIR", self.home.path().join("cache"))
            .env("MILENV_CONFIG_DIR", self.home.path().join("config"))
            .env_remove("MILENV_INDEX_URL")
            .env_remove("MILENV_DIST_URL")
            .env_remove("RUST_LOG")
            .output()
            .await
            .expect("Failed to execute milenv")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a gzip-compressed tarball from `(path, contents)` pairs
///
/// Files under a `bin/` directory are executable.
pub fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(if path.contains("bin/") { 0o755 } else { 0o644 });
        header.set_mtime(0);
        header.set_cksum();
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .expect("append tar entry");
    }
    builder
        .into_inner()
        .and_then(GzEncoder::finish)
        .expect("finish tarball")
}

/// Lowercase hex SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Platforms the fake upstream publishes
pub const PUBLISHED: &[(&str, &str)] = &[
    ("x86_64-linux", "x86_64-unknown-linux-gnu"),
    ("aarch64-darwin", "aarch64-apple-darwin"),
];

/// Index revision served by the fake upstream
pub const REVISION: &str = "nixos-22.05";

/// A published artifact
pub struct Artifact {
    pub name: &'static str,
    pub version: &'static str,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn sha256(&self) -> String {
        sha256_hex(&self.bytes)
    }
}

fn components() -> Vec<Artifact> {
    vec![
        Artifact {
            name: "rustc",
            version: "1.63.0 (4b91a6ea7 2022-08-08)",
            bytes: tarball(&[
                ("rustc-1.63.0/components", "rustc\n"),
                ("rustc-1.63.0/rustc/manifest.in", "file:bin/rustc\n"),
                ("rustc-1.63.0/rustc/bin/rustc", "#!/bin/sh\necho rustc 1.63.0\n"),
                ("rustc-1.63.0/rustc/lib/librustc_driver.so", "ELF"),
            ]),
        },
        Artifact {
            name: "cargo",
            version: "0.64.0 (387270bc7 2022-08-03)",
            bytes: tarball(&[
                ("cargo-0.64.0/components", "cargo\n"),
                ("cargo-0.64.0/cargo/bin/cargo", "#!/bin/sh\necho cargo 1.63.0\n"),
            ]),
        },
        Artifact {
            name: "rust-std",
            version: "1.63.0 (4b91a6ea7 2022-08-08)",
            bytes: tarball(&[
                ("rust-std-1.63.0/components", "rust-std\n"),
                ("rust-std-1.63.0/rust-std/lib/rustlib/libstd.rlib", "rlib"),
            ]),
        },
    ]
}

fn packages() -> Vec<(Artifact, &'static str)> {
    vec![
        (
            Artifact {
                name: "clang",
                version: "14.0.6",
                bytes: tarball(&[
                    ("clang-14.0.6/bin/clang", "#!/bin/sh\necho clang 14.0.6\n"),
                    ("clang-14.0.6/bin/clang++", "#!/bin/sh\necho clang++ 14.0.6\n"),
                ]),
            },
            r#""bin": ["bin"]"#,
        ),
        (
            Artifact {
                name: "mold",
                version: "1.4.2",
                bytes: tarball(&[("mold-1.4.2/bin/mold", "#!/bin/sh\necho mold 1.4.2\n")]),
            },
            r#""bin": ["bin"]"#,
        ),
        (
            Artifact {
                name: "openssl",
                version: "3.0.5",
                bytes: tarball(&[
                    ("openssl-3.0.5/bin/openssl", "#!/bin/sh\necho OpenSSL 3.0.5\n"),
                    ("openssl-3.0.5/include/openssl/ssl.h", "/* ssl */\n"),
                    ("openssl-3.0.5/lib/libssl.a", "ar"),
                    ("openssl-3.0.5/lib/pkgconfig/openssl.pc", "Name: OpenSSL\n"),
                ]),
            },
            r#""bin": ["bin"], "include": ["include"], "lib": ["lib"]"#,
        ),
    ]
}

/// Fake distribution server and package index
pub struct FakeUpstream {
    pub server: MockServer,
    /// Digest of `channel-rust-1.63.0.toml`
    pub manifest_digest: String,
    /// Digest of `channel-rust-stable.toml`
    pub stable_digest: String,
    /// Digest of the x86_64-linux index document
    pub index_digest: String,
}

impl FakeUpstream {
    /// Start the server and publish every document and artifact
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let base = server.uri();

        let components = components();
        let mut manifest = String::from("manifest-version = \"2\"\ndate = \"2022-08-11\"\n");
        for component in &components {
            let url_path = format!("/dist/{}.tar.gz", component.name);
            manifest.push_str(&format!(
                "\n[pkg.{}]\nversion = \"{}\"\n",
                component.name, component.version
            ));
            for (_, triple) in PUBLISHED {
                manifest.push_str(&format!(
                    "\n[pkg.{}.target.{triple}]\navailable = true\nurl = \"{base}{url_path}\"\nhash = \"{}\"\n",
                    component.name,
                    component.sha256()
                ));
            }
            serve(&server, &url_path, component.bytes.clone()).await;
        }
        serve(&server, "/dist/channel-rust-1.63.0.toml", manifest.clone().into_bytes()).await;

        // The floating channel currently points at the same release
        let stable = format!("{manifest}\n# published for stable\n");
        serve(&server, "/dist/channel-rust-stable.toml", stable.clone().into_bytes()).await;

        let packages = packages();
        let mut index_digest = String::new();
        for (platform, _) in PUBLISHED {
            let entries: Vec<String> = packages
                .iter()
                .map(|(artifact, dirs)| {
                    format!(
                        r#""{}": {{ "version": "{}", "url": "{base}/artifacts/{}.tar.gz", "sha256": "{}", {dirs} }}"#,
                        artifact.name,
                        artifact.version,
                        artifact.name,
                        artifact.sha256()
                    )
                })
                .collect();
            let document = format!(
                r#"{{ "revision": "{REVISION}", "platform": "{platform}", "packages": {{ {} }} }}"#,
                entries.join(", ")
            );
            if *platform == "x86_64-linux" {
                index_digest = sha256_hex(document.as_bytes());
            }
            serve(
                &server,
                &format!("/index/{REVISION}/{platform}.json"),
                document.into_bytes(),
            )
            .await;
        }
        for (artifact, _) in &packages {
            serve(
                &server,
                &format!("/artifacts/{}.tar.gz", artifact.name),
                artifact.bytes.clone(),
            )
            .await;
        }

        Self {
            server,
            manifest_digest: sha256_hex(manifest.as_bytes()),
            stable_digest: sha256_hex(stable.as_bytes()),
            index_digest,
        }
    }

    /// Descriptor pinned to the published 1.63.0 manifest
    pub fn descriptor(&self) -> String {
        self.descriptor_with(&self.manifest_digest, &["clang", "mold", "openssl"])
    }

    /// Descriptor with a chosen manifest digest and package list
    pub fn descriptor_with(&self, digest: &str, packages: &[&str]) -> String {
        let base = self.server.uri();
        let packages = packages
            .iter()
            .map(|p| format!("\"{p}\""))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            r#"
[project]
name = "mil"
description = "Mel Intermediate Lisp"

[index]
revision = "{REVISION}"
url = "{base}/index"

[toolchain]
channel = "1.63.0"
digest = "sha256:{digest}"
components = ["rustc", "cargo", "rust-std"]
dist_url = "{base}/dist"

[platforms]
supported = ["x86_64-linux", "aarch64-darwin"]

[shell]
packages = [{packages}]

[shell.env]
RUSTFLAGS = "-C link-arg=-fuse-ld=mold"
"#
        )
    }

    /// Number of artifact downloads the server has answered
    pub async fn artifact_requests(&self) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path().ends_with(".tar.gz"))
            .count()
    }

    /// Number of requests of any kind
    pub async fn total_requests(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map_or(0, |r| r.len())
    }
}

async fn serve(server: &MockServer, url_path: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}
