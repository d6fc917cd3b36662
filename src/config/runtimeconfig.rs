//! `*.runtimeconfig.json` handling.
//!
//! `hostfxr` only starts a runtime from a runtime configuration file. Hosts that do not ship
//! one can describe the runtime they want as a [`DotnetCoreRuntimeSpec`] (usually obtained from
//! [`crate::locate::find_runtimes`]) and let the loader write the file.

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Name of the base shared framework.
pub const NETCORE_APP: &str = "Microsoft.NETCore.App";

/// An installed shared runtime, e.g. `Microsoft.NETCore.App 8.0.4`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DotnetCoreRuntimeSpec {
    /// Framework name
    pub name: String,
    /// Full version string, including any pre-release suffix
    pub version: String,
    /// Directory holding the runtime files (`<root>/shared/<name>/<version>`)
    pub path: PathBuf,
}

impl DotnetCoreRuntimeSpec {
    /// Target framework moniker matching this runtime, e.g. `net8.0` or `netcoreapp3.1`.
    #[must_use]
    pub fn tfm(&self) -> String {
        match version_key(&self.version).as_slice() {
            [major, minor, ..] if *major >= 5 => format!("net{major}.{minor}"),
            [major, minor, ..] => format!("netcoreapp{major}.{minor}"),
            _ => format!("net{}", self.version),
        }
    }

    /// The `major.minor.0` version, so that roll-forward picks the newest patch.
    #[must_use]
    pub fn floor_version(&self) -> String {
        match version_key(&self.version).as_slice() {
            [major, minor, ..] => format!("{major}.{minor}.0"),
            _ => self.version.clone(),
        }
    }

    /// The `.NET` installation root this runtime belongs to, if the layout is standard.
    #[must_use]
    pub fn dotnet_root(&self) -> Option<&Path> {
        // <root>/shared/<name>/<version>
        self.path.parent()?.parent()?.parent()
    }

    /// A runtime configuration selecting this runtime.
    #[must_use]
    pub fn runtime_config(&self) -> RuntimeConfigFile {
        RuntimeConfigFile {
            runtime_options: RuntimeConfigOptions {
                tfm: Some(self.tfm()),
                framework: Some(FrameworkReference {
                    name: self.name.clone(),
                    version: self.floor_version(),
                }),
                frameworks: Vec::new(),
                config_properties: BTreeMap::new(),
            },
        }
    }
}

impl fmt::Display for DotnetCoreRuntimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [{}]", self.name, self.version, self.path.display())
    }
}

/// A framework reference inside `runtimeOptions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkReference {
    /// Framework name, e.g. `Microsoft.NETCore.App`
    pub name: String,
    /// Minimum version
    pub version: String,
}

/// The `runtimeOptions` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfigOptions {
    /// Target framework moniker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tfm: Option<String>,
    /// Single framework reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<FrameworkReference>,
    /// Multiple framework references
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frameworks: Vec<FrameworkReference>,
    /// Runtime properties baked into the file
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config_properties: BTreeMap<String, serde_json::Value>,
}

/// A `*.runtimeconfig.json` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfigFile {
    /// The `runtimeOptions` section
    pub runtime_options: RuntimeConfigOptions,
}

impl RuntimeConfigFile {
    /// Reads a runtime configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be read and
    /// [`crate::Error::JsonError`] if it is malformed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Writes the configuration as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be written.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Version requested for the base framework (`Microsoft.NETCore.App`), or of the single
    /// framework reference when only one is present.
    #[must_use]
    pub fn framework_version(&self) -> Option<&str> {
        let options = &self.runtime_options;
        options
            .framework
            .iter()
            .chain(options.frameworks.iter())
            .find(|framework| framework.name == NETCORE_APP)
            .or(options.framework.as_ref())
            .map(|framework| framework.version.as_str())
    }
}

/// Numeric sort key of a version string: `"8.0.10-rc.1"` becomes `[8, 0, 10]`.
pub(crate) fn version_key(version: &str) -> Vec<u64> {
    let release = version.split(['-', '+']).next().unwrap_or_default();
    release
        .split('.')
        .map_while(|part| part.parse().ok())
        .collect()
}
