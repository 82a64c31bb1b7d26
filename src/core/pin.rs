//! Toolchain pinning
//!
//! Fetches the channel manifest once, trusting it, and records its digest
//! in the descriptor. Every later resolution verifies against that digest.
//! Only the `[toolchain]` pin is rewritten; the rest of the file stays as
//! written.

use std::path::Path;

use crate::core::channel::{Channel, ToolchainPin};
use crate::core::descriptor::Descriptor;
use crate::core::digest::Sha256Digest;
use crate::error::{DescriptorError, MilenvError, ResolveError};
use crate::infra::dist::{ChannelManifest, DistClient};

/// Result of pinning
#[derive(Debug)]
pub struct PinResult {
    pub channel: Channel,
    pub previous: Option<Sha256Digest>,
    pub digest: Sha256Digest,
    /// rustc version the manifest publishes
    pub version: Option<String>,
}

impl PinResult {
    pub fn changed(&self) -> bool {
        self.previous.as_ref() != Some(&self.digest)
    }
}

/// Pin the descriptor at `path` to the current manifest of its channel
///
/// With `channel` set, the descriptor moves to that channel first.
pub async fn pin(
    path: &Path,
    channel: Option<Channel>,
    dist: &DistClient,
) -> Result<PinResult, MilenvError> {
    let descriptor = Descriptor::load(path)?;
    let previous = descriptor.toolchain.digest.clone();
    let channel = channel.unwrap_or_else(|| descriptor.toolchain.channel.clone());

    let unpinned = ToolchainPin {
        channel: channel.clone(),
        digest: None,
    };
    let (content, digest) = dist.fetch_unverified(&unpinned).await?;
    let text = String::from_utf8(content).map_err(|e| ResolveError::InvalidChannelManifest {
        channel: channel.to_string(),
        error: e.to_string(),
    })?;
    // Refuse to record a digest for something that is not a manifest
    let manifest = ChannelManifest::parse(&channel.to_string(), &text)?;
    let version = manifest.rustc_version().map(ToString::to_string);

    let raw = std::fs::read_to_string(path).map_err(|e| DescriptorError::Io {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    let rewritten =
        Descriptor::rewrite_pin(&raw, &ToolchainPin::new(channel.clone(), digest.clone()))?;
    std::fs::write(path, rewritten).map_err(|e| DescriptorError::Io {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    tracing::info!("Pinned '{channel}' to {digest}");

    Ok(PinResult {
        channel,
        previous,
        digest,
        version,
    })
}
