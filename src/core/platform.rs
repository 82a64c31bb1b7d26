//! Target platform identifiers
//!
//! The set of platforms is closed: any identifier outside it is rejected
//! with [`ResolveError::PlatformUnsupported`] before any I/O happens.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ResolveError;

/// OS/architecture pair an environment can be resolved for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Platform {
    /// Linux on x86_64
    X86_64Linux,
    /// Linux on aarch64
    Aarch64Linux,
    /// macOS on x86_64 (Intel)
    X86_64Darwin,
    /// macOS on aarch64 (Apple Silicon)
    Aarch64Darwin,
}

impl Platform {
    /// Every known platform, in display order
    pub const ALL: [Platform; 4] = [
        Platform::X86_64Linux,
        Platform::Aarch64Linux,
        Platform::X86_64Darwin,
        Platform::Aarch64Darwin,
    ];

    /// Identifier as written in descriptors (`<arch>-<os>`)
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::X86_64Linux => "x86_64-linux",
            Platform::Aarch64Linux => "aarch64-linux",
            Platform::X86_64Darwin => "x86_64-darwin",
            Platform::Aarch64Darwin => "aarch64-darwin",
        }
    }

    /// Rust target triple published by the toolchain distribution
    pub fn rust_triple(self) -> &'static str {
        match self {
            Platform::X86_64Linux => "x86_64-unknown-linux-gnu",
            Platform::Aarch64Linux => "aarch64-unknown-linux-gnu",
            Platform::X86_64Darwin => "x86_64-apple-darwin",
            Platform::Aarch64Darwin => "aarch64-apple-darwin",
        }
    }

    /// Detect the platform this process runs on
    ///
    /// Returns the raw `<arch>-<os>` string when the host is not a known
    /// platform, so callers can report it.
    pub fn host() -> Result<Self, String> {
        let os = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        let raw = format!("{}-{os}", std::env::consts::ARCH);
        raw.parse().map_err(|_| raw)
    }

    /// Parse an identifier, failing with `PlatformUnsupported` if unknown
    pub fn parse_supported(raw: &str, supported: &[Platform]) -> Result<Self, ResolveError> {
        let unsupported = || ResolveError::PlatformUnsupported {
            platform: raw.to_string(),
            supported: supported.iter().map(ToString::to_string).collect(),
        };
        let platform: Platform = raw.parse().map_err(|()| unsupported())?;
        if supported.contains(&platform) {
            Ok(platform)
        } else {
            Err(unsupported())
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == s.trim())
            .ok_or(())
    }
}

impl Serialize for Platform {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Platform {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|()| serde::de::Error::custom(format!("unknown platform '{s}'")))
    }
}
