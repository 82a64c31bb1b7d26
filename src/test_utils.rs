//! Test utilities
//!
//! Generators for property-based testing and in-memory archive fixtures.

use flate2::write::GzEncoder;
use flate2::Compression;

/// Build a gzip-compressed tarball from `(path, contents)` pairs
///
/// Files under a `bin/` directory are marked executable.
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

pub mod generators {
    use proptest::prelude::*;

    /// Generate a valid package name
    pub fn package_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,20}[a-z0-9]?".prop_filter("Name must not be empty", |s| !s.is_empty())
    }

    /// Generate a valid SHA256 hash (64 hex characters)
    pub fn sha256_hash() -> impl Strategy<Value = String> {
        "[0-9a-f]{64}"
    }

    /// Generate a channel name the descriptor accepts
    pub fn channel() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("stable".to_string()),
            Just("beta".to_string()),
            Just("nightly".to_string()),
            (2015u32..2030, 1u32..13, 1u32..29)
                .prop_map(|(y, m, d)| format!("nightly-{y:04}-{m:02}-{d:02}")),
            (1u64..2, 0u64..100, 0u64..10).prop_map(|(a, b, c)| format!("{a}.{b}.{c}")),
        ]
    }

    /// Generate an environment variable value
    pub fn env_value() -> impl Strategy<Value = String> {
        "[ -~]{0,40}"
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use super::*;
    use crate::config::defaults::MIN_PROPTEST_ITERATIONS;
    use crate::core::channel::Channel;
    use crate::core::descriptor::Descriptor;
    use crate::core::digest::Sha256Digest;
    use proptest::prelude::*;

    #[test]
    fn test_tarball_is_gzip() {
        let bytes = tarball(&[("a/bin/a", "x")]);
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_tarball_is_deterministic() {
        let files = [("a/bin/a", "x"), ("a/lib/liba.a", "y")];
        assert_eq!(tarball(&files), tarball(&files));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(MIN_PROPTEST_ITERATIONS))]

        #[test]
        fn prop_generated_channels_parse(channel in channel()) {
            prop_assert!(channel.parse::<Channel>().is_ok(), "channel {} should parse", channel);
        }

        #[test]
        fn prop_generated_hashes_parse(hash in sha256_hash()) {
            prop_assert!(Sha256Digest::parse(&hash).is_ok());
        }

        #[test]
        fn prop_generated_package_names_validate(name in package_name()) {
            let mut descriptor = Descriptor::new("p", "stable".parse().unwrap());
            descriptor.shell.packages = vec![name];
            prop_assert!(descriptor.validate().is_ok());
        }
    }
}
