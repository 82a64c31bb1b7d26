//! Toolchain channels and pins
//!
//! A channel names a release track on the toolchain distribution server.
//! A pin couples the channel with the digest of its manifest so the exact
//! release is fixed at authoring time.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::core::digest::Sha256Digest;

static DATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(stable|beta|nightly)-(\d{4}-\d{2}-\d{2})$").expect("valid dated channel regex")
});

/// Release track without a date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Track {
    Stable,
    Beta,
    Nightly,
}

impl Track {
    fn as_str(self) -> &'static str {
        match self {
            Track::Stable => "stable",
            Track::Beta => "beta",
            Track::Nightly => "nightly",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "stable" => Some(Track::Stable),
            "beta" => Some(Track::Beta),
            "nightly" => Some(Track::Nightly),
            _ => None,
        }
    }
}

/// Toolchain channel selector
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Latest release on a track (`stable`, `beta`, `nightly`)
    Latest(Track),
    /// Archived release of a track (`nightly-2022-08-01`)
    Dated { track: Track, date: String },
    /// Exact stable release (`1.63.0`)
    Version(semver::Version),
}

impl Channel {
    /// URL of the channel manifest below `dist_url`
    pub fn manifest_url(&self, dist_url: &str) -> String {
        let base = dist_url.trim_end_matches('/');
        match self {
            Channel::Latest(track) => format!("{base}/channel-rust-{}.toml", track.as_str()),
            Channel::Dated { track, date } => {
                format!("{base}/{date}/channel-rust-{}.toml", track.as_str())
            }
            Channel::Version(version) => format!("{base}/channel-rust-{version}.toml"),
        }
    }

    /// File name of the manifest, used when reporting integrity failures
    pub fn manifest_name(&self) -> String {
        let url = self.manifest_url("");
        url.trim_start_matches('/').to_string()
    }

    /// Whether the channel moves over time
    ///
    /// Floating channels still resolve deterministically because the pinned
    /// digest rejects any manifest other than the one recorded.
    pub fn is_floating(&self) -> bool {
        matches!(self, Channel::Latest(_))
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Latest(track) => f.write_str(track.as_str()),
            Channel::Dated { track, date } => write!(f, "{}-{date}", track.as_str()),
            Channel::Version(version) => write!(f, "{version}"),
        }
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(track) = Track::parse(s) {
            return Ok(Channel::Latest(track));
        }
        if let Some(caps) = DATED.captures(s) {
            let track = Track::parse(&caps[1]).ok_or_else(|| format!("unknown track in '{s}'"))?;
            return Ok(Channel::Dated {
                track,
                date: caps[2].to_string(),
            });
        }
        // "1.63" is accepted as shorthand for "1.63.0"
        let normalized = if s.matches('.').count() == 1 {
            format!("{s}.0")
        } else {
            s.to_string()
        };
        semver::Version::parse(&normalized)
            .map(Channel::Version)
            .map_err(|_| {
                format!(
                    "invalid channel '{s}': expected stable, beta, nightly, <track>-YYYY-MM-DD or a version like 1.63.0"
                )
            })
    }
}

impl Serialize for Channel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Channel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Channel together with the digest its manifest must have
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainPin {
    pub channel: Channel,
    pub digest: Option<Sha256Digest>,
}

impl ToolchainPin {
    pub fn new(channel: Channel, digest: Sha256Digest) -> Self {
        Self {
            channel,
            digest: Some(digest),
        }
    }
}

impl fmt::Display for ToolchainPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.digest {
            Some(digest) => write!(f, "{} ({})", self.channel, digest.short()),
            None => write!(f, "{} (unpinned)", self.channel),
        }
    }
}
