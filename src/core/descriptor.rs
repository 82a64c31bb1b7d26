//! Descriptor (milenv.toml) parsing and validation
//!
//! The descriptor is the declarative file that fixes the toolchain pin, the
//! upstream package index revision, the supported platforms and the
//! dependencies requested in the shell.
//! Supports environment variable substitution using ${VAR} syntax.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use toml_edit::{DocumentMut, TableLike};

use crate::config::defaults;
use crate::core::channel::{Channel, ToolchainPin};
use crate::core::digest::Sha256Digest;
use crate::core::platform::Platform;
use crate::error::{DescriptorError, ResolveError};

static VAR_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid variable reference regex")
});

static PACKAGE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._+-]*$").expect("valid package regex"));

static INDEX_REVISION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid revision regex"));

static ENV_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid env name regex"));

/// Variables the environment computes itself and descriptors may not set
pub const RESERVED_VARS: &[&str] = &["PATH", "C_INCLUDE_PATH", "LIBRARY_PATH", "PKG_CONFIG_PATH"];

/// The environment descriptor (milenv.toml)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Descriptor {
    /// Project metadata
    pub project: ProjectSection,

    /// Upstream package index
    #[serde(default)]
    pub index: IndexSection,

    /// Toolchain pin
    pub toolchain: ToolchainSection,

    /// Platforms the descriptor can be resolved for
    #[serde(default)]
    pub platforms: PlatformsSection,

    /// Shell contents
    #[serde(default)]
    pub shell: ShellSection,
}

/// Project metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectSection {
    /// Project name
    pub name: String,

    /// Project description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Package index reference
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexSection {
    /// Display name of the index
    #[serde(default = "default_index_name")]
    pub name: String,

    /// Index revision dependencies are resolved against
    #[serde(default = "default_index_revision")]
    pub revision: String,

    /// Index base URL (overrides global config)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Digest the index document must have
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<Sha256Digest>,
}

fn default_index_name() -> String {
    defaults::DEFAULT_INDEX_NAME.to_string()
}

fn default_index_revision() -> String {
    defaults::DEFAULT_INDEX_REVISION.to_string()
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            name: default_index_name(),
            revision: default_index_revision(),
            url: None,
            digest: None,
        }
    }
}

/// Toolchain channel, digest and components
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolchainSection {
    /// Release channel
    pub channel: Channel,

    /// Digest of the channel manifest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<Sha256Digest>,

    /// Components merged into the toolchain
    #[serde(default = "default_components")]
    pub components: Vec<String>,

    /// Distribution server (overrides global config)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dist_url: Option<String>,
}

fn default_components() -> Vec<String> {
    defaults::DEFAULT_COMPONENTS
        .iter()
        .map(ToString::to_string)
        .collect()
}

/// Supported platform list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlatformsSection {
    /// Platform identifiers
    #[serde(default = "default_supported")]
    pub supported: Vec<String>,
}

fn default_supported() -> Vec<String> {
    Platform::ALL.iter().map(ToString::to_string).collect()
}

impl Default for PlatformsSection {
    fn default() -> Self {
        Self {
            supported: default_supported(),
        }
    }
}

/// Packages and variables of the shell
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ShellSection {
    /// Dependency names looked up in the package index
    #[serde(default)]
    pub packages: Vec<String>,

    /// Extra environment variables
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Substitute environment variables in a string
///
/// Replaces `${VAR_NAME}` with the value of the environment variable.
/// Unset variables are an error so a descriptor never silently resolves
/// differently on another machine.
pub fn substitute_env_vars(input: &str) -> Result<String, DescriptorError> {
    let mut last_end = 0;
    let mut output = String::new();

    for cap in VAR_REF.captures_iter(input) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        let var_name = &cap[1];

        output.push_str(&input[last_end..full_match.start()]);
        let value = std::env::var(var_name).map_err(|_| DescriptorError::UndefinedVariable {
            name: var_name.to_string(),
        })?;
        output.push_str(&value);

        last_end = full_match.end();
    }

    output.push_str(&input[last_end..]);
    Ok(output)
}

/// Recursively substitute environment variables in a TOML value
fn substitute_in_value(value: &mut toml::Value) -> Result<(), DescriptorError> {
    match value {
        toml::Value::String(s) => *s = substitute_env_vars(s)?,
        toml::Value::Array(items) => {
            for item in items {
                substitute_in_value(item)?;
            }
        }
        toml::Value::Table(table) => {
            for (_, v) in table.iter_mut() {
                substitute_in_value(v)?;
            }
        }
        _ => {}
    }
    Ok(())
}

impl Descriptor {
    /// Create a descriptor with the default shell for a project
    pub fn new(name: &str, channel: Channel) -> Self {
        Self {
            project: ProjectSection {
                name: name.to_string(),
                description: None,
            },
            index: IndexSection::default(),
            toolchain: ToolchainSection {
                channel,
                digest: None,
                components: default_components(),
                dist_url: None,
            },
            platforms: PlatformsSection::default(),
            shell: ShellSection {
                packages: defaults::DEFAULT_PACKAGES
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
                env: BTreeMap::new(),
            },
        }
    }

    /// Parse from TOML string, substituting `${VAR}` references
    pub fn from_toml(content: &str) -> Result<Self, DescriptorError> {
        let mut value: toml::Value = toml::from_str(content).map_err(|e| DescriptorError::Parse {
            error: e.to_string(),
        })?;
        substitute_in_value(&mut value)?;
        value.try_into().map_err(|e: toml::de::Error| DescriptorError::Parse {
            error: e.to_string(),
        })
    }

    /// Load and validate a descriptor file
    pub fn load(path: &Path) -> Result<Self, DescriptorError> {
        if !path.exists() {
            return Err(DescriptorError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| DescriptorError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        let descriptor = Self::from_toml(&content)?;
        descriptor.validate()?;
        tracing::debug!("Loaded descriptor for '{}'", descriptor.project.name);
        Ok(descriptor)
    }

    /// Rewrite the toolchain pin in descriptor text
    ///
    /// Only `toolchain.channel` and `toolchain.digest` change. Comments and
    /// `${VAR}` references elsewhere are kept as written. The result must
    /// still load.
    pub fn rewrite_pin(content: &str, pin: &ToolchainPin) -> Result<String, DescriptorError> {
        let mut doc = content
            .parse::<DocumentMut>()
            .map_err(|e| DescriptorError::Parse {
                error: e.to_string(),
            })?;
        let toolchain = doc["toolchain"]
            .as_table_like_mut()
            .ok_or_else(|| DescriptorError::Invalid {
                field: "toolchain".to_string(),
                message: "must be a table".to_string(),
            })?;

        set_string(toolchain, "channel", pin.channel.to_string());
        match &pin.digest {
            Some(digest) => set_string(toolchain, "digest", digest.to_string()),
            None => {
                toolchain.remove("digest");
            }
        }

        let text = doc.to_string();
        Self::from_toml(&text)?.validate()?;
        Ok(text)
    }

    /// Find the descriptor in `start` or any of its parents
    pub fn find(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(defaults::DESCRIPTOR_FILE))
            .find(|candidate| candidate.is_file())
    }

    /// Every validation problem, in file order
    pub fn problems(&self) -> Vec<DescriptorError> {
        let mut problems = Vec::new();
        let invalid = |field: &str, message: String| DescriptorError::Invalid {
            field: field.to_string(),
            message,
        };

        if self.project.name.trim().is_empty() {
            problems.push(invalid("project.name", "must not be empty".to_string()));
        }

        if self.index.revision.trim().is_empty() {
            problems.push(invalid("index.revision", "must not be empty".to_string()));
        } else if !INDEX_REVISION.is_match(&self.index.revision) {
            // The revision becomes a URL path segment
            problems.push(invalid(
                "index.revision",
                format!(
                    "invalid revision '{}' (letters, digits, '.', '_' and '-' only)",
                    self.index.revision
                ),
            ));
        }

        if self.toolchain.components.is_empty() {
            problems.push(invalid(
                "toolchain.components",
                "must list at least one component".to_string(),
            ));
        } else if !self.toolchain.components.iter().any(|c| c == "rustc") {
            problems.push(invalid(
                "toolchain.components",
                "must include 'rustc'".to_string(),
            ));
        }

        if self.platforms.supported.is_empty() {
            problems.push(invalid(
                "platforms.supported",
                "must list at least one platform".to_string(),
            ));
        }
        for raw in &self.platforms.supported {
            if raw.parse::<Platform>().is_err() {
                problems.push(invalid(
                    "platforms.supported",
                    format!(
                        "unknown platform '{raw}' (known: {})",
                        Platform::ALL.map(Platform::as_str).join(", ")
                    ),
                ));
            }
        }

        for name in &self.shell.packages {
            if !PACKAGE_NAME.is_match(name) {
                problems.push(invalid(
                    "shell.packages",
                    format!("invalid package name '{name}'"),
                ));
            }
        }

        for key in self.shell.env.keys() {
            if !ENV_NAME.is_match(key) {
                problems.push(invalid("shell.env", format!("invalid variable name '{key}'")));
            } else if RESERVED_VARS.contains(&key.as_str()) || key.starts_with("MILENV_") {
                problems.push(invalid(
                    "shell.env",
                    format!("'{key}' is computed by milenv and cannot be set"),
                ));
            }
        }

        problems
    }

    /// Validate, failing on the first problem
    pub fn validate(&self) -> Result<(), DescriptorError> {
        match self.problems().into_iter().next() {
            Some(problem) => Err(problem),
            None => Ok(()),
        }
    }

    /// Supported platforms
    ///
    /// An unknown identifier in the list is reported as unsupported rather
    /// than silently dropped.
    pub fn supported_platforms(&self) -> Result<Vec<Platform>, ResolveError> {
        let mut platforms = Vec::with_capacity(self.platforms.supported.len());
        for raw in &self.platforms.supported {
            let platform = raw.parse::<Platform>().map_err(|()| ResolveError::PlatformUnsupported {
                platform: raw.clone(),
                supported: Platform::ALL.iter().map(ToString::to_string).collect(),
            })?;
            if !platforms.contains(&platform) {
                platforms.push(platform);
            }
        }
        Ok(platforms)
    }

    /// Declared dependency set (duplicates collapse)
    pub fn dependencies(&self) -> BTreeSet<String> {
        self.shell.packages.iter().cloned().collect()
    }

    /// Current toolchain pin
    pub fn pin(&self) -> ToolchainPin {
        ToolchainPin {
            channel: self.toolchain.channel.clone(),
            digest: self.toolchain.digest.clone(),
        }
    }

    /// Copy of this descriptor with a substituted toolchain pin
    pub fn override_toolchain(&self, pin: ToolchainPin) -> Self {
        let mut descriptor = self.clone();
        descriptor.toolchain.channel = pin.channel;
        descriptor.toolchain.digest = pin.digest;
        descriptor
    }
}

/// Replace a string value, keeping the key's trailing comment
fn set_string(table: &mut dyn TableLike, key: &str, new: String) {
    match table.get_mut(key).and_then(toml_edit::Item::as_value_mut) {
        Some(existing) => {
            let decor = existing.decor().clone();
            *existing = new.into();
            *existing.decor_mut() = decor;
        }
        None => {
            table.insert(key, toml_edit::value(new));
        }
    }
}
