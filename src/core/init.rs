//! Descriptor initialization logic
//!
//! Writes a commented starter `milenv.toml` for a project directory.

use std::path::{Path, PathBuf};

use crate::config::defaults;
use crate::core::channel::Channel;
use crate::core::descriptor::Descriptor;
use crate::error::DescriptorError;

/// Options for descriptor initialization
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Project name (defaults to the directory name)
    pub name: Option<String>,
    /// Toolchain channel (defaults to stable)
    pub channel: Option<Channel>,
    /// Overwrite an existing descriptor
    pub force: bool,
}

/// Result of initialization
#[derive(Debug)]
pub struct InitResult {
    /// Path to created descriptor
    pub descriptor_path: PathBuf,
    /// Project name written to the descriptor
    pub name: String,
}

/// Generate the default descriptor content with comments
pub fn generate_descriptor_content(project_name: &str, channel: &Channel) -> String {
    let packages = defaults::DEFAULT_PACKAGES
        .iter()
        .map(|p| format!("\"{p}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let components = defaults::DEFAULT_COMPONENTS
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"# milenv environment descriptor

[project]
name = "{project_name}"
# description = "Mel Intermediate Lisp"

[index]
name = "{index_name}"
revision = "{index_revision}"
# digest = "sha256:..."

[toolchain]
channel = "{channel}"
# Run 'milenv pin' to record the digest of the channel manifest
components = [{components}]

[platforms]
supported = ["x86_64-linux", "aarch64-linux", "x86_64-darwin", "aarch64-darwin"]

[shell]
packages = [{packages}]

[shell.env]
# RUSTFLAGS = "-C link-arg=-fuse-ld=mold"
"#,
        index_name = defaults::DEFAULT_INDEX_NAME,
        index_revision = defaults::DEFAULT_INDEX_REVISION,
    )
}

/// Derive project name from directory
pub fn derive_project_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or_else(|| "my-project".to_string(), ToString::to_string)
}

/// Write a starter descriptor into `dir`
pub fn init(dir: &Path, options: &InitOptions) -> Result<InitResult, DescriptorError> {
    if !dir.is_dir() {
        return Err(DescriptorError::Io {
            path: dir.to_path_buf(),
            error: "directory does not exist".to_string(),
        });
    }

    let descriptor_path = dir.join(defaults::DESCRIPTOR_FILE);
    if descriptor_path.exists() && !options.force {
        return Err(DescriptorError::AlreadyExists {
            path: descriptor_path,
        });
    }

    let name = options
        .name
        .clone()
        .unwrap_or_else(|| derive_project_name(dir));
    let channel = match &options.channel {
        Some(channel) => channel.clone(),
        None => defaults::DEFAULT_CHANNEL
            .parse()
            .map_err(|e: String| DescriptorError::Parse { error: e })?,
    };

    let content = generate_descriptor_content(&name, &channel);
    // The generated text must describe a valid descriptor
    Descriptor::from_toml(&content)?.validate()?;

    std::fs::write(&descriptor_path, content).map_err(|e| DescriptorError::Io {
        path: descriptor_path.clone(),
        error: e.to_string(),
    })?;
    tracing::info!("Created {}", descriptor_path.display());

    Ok(InitResult {
        descriptor_path,
        name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::channel::Track;
    use tempfile::TempDir;

    #[test]
    fn test_generate_descriptor_content() {
        let content = generate_descriptor_content("mil", &Channel::Latest(Track::Stable));
        assert!(content.contains("name = \"mil\""));
        assert!(content.contains("[toolchain]"));
        assert!(content.contains("\"mold\""));
        assert!(content.contains('#'));

        let descriptor = Descriptor::from_toml(&content).unwrap();
        assert!(descriptor.validate().is_ok());
        assert!(descriptor.toolchain.digest.is_none());
    }

    #[test]
    fn test_init_writes_descriptor() {
        let temp = TempDir::new().unwrap();
        let result = init(
            temp.path(),
            &InitOptions {
                name: Some("mil".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(result.name, "mil");
        let descriptor = Descriptor::load(&result.descriptor_path).unwrap();
        assert_eq!(descriptor.project.name, "mil");
        assert_eq!(descriptor.shell.packages, vec!["clang", "mold", "openssl"]);
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let temp = TempDir::new().unwrap();
        init(temp.path(), &InitOptions::default()).unwrap();
        assert!(matches!(
            init(temp.path(), &InitOptions::default()),
            Err(DescriptorError::AlreadyExists { .. })
        ));
        assert!(init(
            temp.path(),
            &InitOptions {
                force: true,
                ..Default::default()
            }
        )
        .is_ok());
    }

    #[test]
    fn test_init_with_channel() {
        let temp = TempDir::new().unwrap();
        let result = init(
            temp.path(),
            &InitOptions {
                channel: Some("nightly-2022-08-01".parse().unwrap()),
                ..Default::default()
            },
        )
        .unwrap();
        let descriptor = Descriptor::load(&result.descriptor_path).unwrap();
        assert_eq!(descriptor.toolchain.channel.to_string(), "nightly-2022-08-01");
    }

    #[test]
    fn test_derive_project_name() {
        let path = Path::new("/home/user/mil");
        assert_eq!(derive_project_name(path), "mil");
    }
}
