//! Backend configuration.
//!
//! Each backend is configured by a plain struct with public fields, a [`Default`] where one
//! makes sense, and builder-style setters. [`RuntimeOptions`] wraps the three of them in one
//! serde-deserializable enum tagged by `backend`, so a host can keep its runtime selection in a
//! file:
//!
//! ```json
//! {
//!     "backend": "coreclr",
//!     "runtime_config": { "file": "Lib.runtimeconfig.json" },
//!     "properties": { "System.GC.Server": "false" }
//! }
//! ```
//!
//! # Key Components
//!
//! - [`MonoConfig`] - domain, config files, install path, garbage collector, JIT options
//! - [`CoreClrConfig`] - runtime configuration (file or generated from a runtime spec),
//!   `DOTNET_ROOT` override, runtime properties
//! - [`NetFxConfig`] - app-domain name, app config file, loader library
//! - [`runtimeconfig`] - `*.runtimeconfig.json` model and [`DotnetCoreRuntimeSpec`]
//! - [`xml`] - sanity checks for Mono and .NET Framework XML configuration files

pub mod runtimeconfig;
pub mod xml;

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

pub use runtimeconfig::{DotnetCoreRuntimeSpec, FrameworkReference, RuntimeConfigFile};

use crate::{backend::BackendKind, Result};

/// Garbage collector flavour of a Mono installation.
///
/// Mono ships the collector as part of the runtime library, so the mode selects which library
/// is loaded: `libmonosgen-2.0` for [`GcMode::Sgen`], `libmono-2.0` for [`GcMode::Boehm`].
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum GcMode {
    /// The generational SGen collector
    #[default]
    Sgen,
    /// The conservative Boehm collector
    Boehm,
}

/// Configuration of the Mono backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonoConfig {
    /// App-domain to create and use; `None` uses the root domain
    pub domain: Option<String>,
    /// Domain configuration file (`App.config` style XML)
    pub config_file: Option<PathBuf>,
    /// Machine configuration file, e.g. `/etc/mono/config`; `None` uses Mono's default
    pub global_config_file: Option<PathBuf>,
    /// Directory containing the Mono runtime library (`<prefix>/lib`); `None` searches the
    /// platform's default locations
    pub path: Option<PathBuf>,
    /// Garbage collector selection; `None` means [`GcMode::Sgen`]
    pub gc: Option<GcMode>,
    /// Options passed to `mono_jit_parse_options` before startup
    pub jit_options: Vec<String>,
    /// Enable Mono's debugging support (`mono_debug_init`)
    pub debug: bool,
}

impl MonoConfig {
    /// Creates a configuration using the root domain and default library search.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses the named app-domain instead of the root domain.
    #[must_use]
    pub fn domain(mut self, name: impl Into<String>) -> Self {
        self.domain = Some(name.into());
        self
    }

    /// Sets the domain configuration file.
    #[must_use]
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Sets the machine configuration file.
    #[must_use]
    pub fn global_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_file = Some(path.into());
        self
    }

    /// Overrides the directory the Mono library is loaded from.
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Selects the garbage collector.
    #[must_use]
    pub fn gc(mut self, gc: GcMode) -> Self {
        self.gc = Some(gc);
        self
    }

    /// Adds a JIT option, e.g. `--debug` or `--soft-breakpoints`.
    #[must_use]
    pub fn jit_option(mut self, option: impl Into<String>) -> Self {
        self.jit_options.push(option.into());
        self
    }

    /// Enables Mono's debugging support.
    #[must_use]
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// The effective garbage collector.
    #[must_use]
    pub fn gc_mode(&self) -> GcMode {
        self.gc.unwrap_or_default()
    }
}

/// Where the CoreCLR backend takes its runtime configuration from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeConfigSource {
    /// An existing `*.runtimeconfig.json`
    File(PathBuf),
    /// A runtime description, from which a `runtimeconfig.json` is generated
    Spec(DotnetCoreRuntimeSpec),
}

/// Configuration of the CoreCLR backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreClrConfig {
    /// Runtime configuration, required
    pub runtime_config: RuntimeConfigSource,
    /// Root of the .NET installation; `None` runs [`crate::locate::find_dotnet_root`]
    #[serde(default)]
    pub dotnet_root: Option<PathBuf>,
    /// Runtime properties applied before the runtime starts
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl CoreClrConfig {
    /// Creates a configuration from an existing `*.runtimeconfig.json`.
    #[must_use]
    pub fn new(runtime_config: impl Into<PathBuf>) -> Self {
        CoreClrConfig {
            runtime_config: RuntimeConfigSource::File(runtime_config.into()),
            dotnet_root: None,
            properties: BTreeMap::new(),
        }
    }

    /// Creates a configuration targeting an installed runtime, see
    /// [`crate::locate::find_runtimes`].
    ///
    /// The runtime's install root is used as `DOTNET_ROOT` unless overridden.
    #[must_use]
    pub fn for_runtime(spec: DotnetCoreRuntimeSpec) -> Self {
        CoreClrConfig {
            runtime_config: RuntimeConfigSource::Spec(spec),
            dotnet_root: None,
            properties: BTreeMap::new(),
        }
    }

    /// Overrides the root of the .NET installation.
    #[must_use]
    pub fn dotnet_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.dotnet_root = Some(path.into());
        self
    }

    /// Adds a runtime property.
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Configuration of the .NET Framework backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetFxConfig {
    /// App-domain to create; `None` uses the default domain
    pub name: Option<String>,
    /// Application configuration file for the domain
    pub config_file: Option<PathBuf>,
    /// Path of `ClrLoader.dll`; `None` checks `CLRLOADER_NETFX_LOADER`, then the directory of
    /// the current executable
    pub loader: Option<PathBuf>,
}

impl NetFxConfig {
    /// Creates a configuration using the default app-domain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and uses a named app-domain.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the application configuration file.
    #[must_use]
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Sets the path of the loader library.
    #[must_use]
    pub fn loader(mut self, path: impl Into<PathBuf>) -> Self {
        self.loader = Some(path.into());
        self
    }
}

/// A backend selection together with its configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum RuntimeOptions {
    /// Host Mono
    Mono(MonoConfig),
    /// Host .NET through `hostfxr`
    #[serde(rename = "coreclr")]
    CoreClr(CoreClrConfig),
    /// Host the .NET Framework
    #[serde(rename = "netfx")]
    NetFx(NetFxConfig),
}

impl RuntimeOptions {
    /// The backend these options select.
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        match self {
            RuntimeOptions::Mono(_) => BackendKind::Mono,
            RuntimeOptions::CoreClr(_) => BackendKind::CoreClr,
            RuntimeOptions::NetFx(_) => BackendKind::NetFx,
        }
    }

    /// Parses options from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::JsonError`] for malformed input.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads options from a JSON file.
    ///
    /// Relative paths inside the file are resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be read and
    /// [`crate::Error::JsonError`] if it is malformed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let options = Self::from_json(&content)?;
        match path.parent() {
            Some(base) => Ok(options.relative_to(base)),
            None => Ok(options),
        }
    }

    /// Rewrites relative paths to be relative to `base`.
    #[must_use]
    pub fn relative_to(self, base: &Path) -> Self {
        let rebase = |path: PathBuf| {
            if path.is_relative() {
                base.join(path)
            } else {
                path
            }
        };
        let rebase_opt = |path: Option<PathBuf>| path.map(rebase);

        match self {
            RuntimeOptions::Mono(config) => RuntimeOptions::Mono(MonoConfig {
                config_file: rebase_opt(config.config_file),
                global_config_file: rebase_opt(config.global_config_file),
                path: rebase_opt(config.path),
                ..config
            }),
            RuntimeOptions::CoreClr(config) => RuntimeOptions::CoreClr(CoreClrConfig {
                runtime_config: match config.runtime_config {
                    RuntimeConfigSource::File(path) => RuntimeConfigSource::File(rebase(path)),
                    spec => spec,
                },
                dotnet_root: rebase_opt(config.dotnet_root),
                ..config
            }),
            RuntimeOptions::NetFx(config) => RuntimeOptions::NetFx(NetFxConfig {
                config_file: rebase_opt(config.config_file),
                loader: rebase_opt(config.loader),
                ..config
            }),
        }
    }
}

impl From<MonoConfig> for RuntimeOptions {
    fn from(config: MonoConfig) -> Self {
        RuntimeOptions::Mono(config)
    }
}

impl From<CoreClrConfig> for RuntimeOptions {
    fn from(config: CoreClrConfig) -> Self {
        RuntimeOptions::CoreClr(config)
    }
}

impl From<NetFxConfig> for RuntimeOptions {
    fn from(config: NetFxConfig) -> Self {
        RuntimeOptions::NetFx(config)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn mono_builder() {
        let config = MonoConfig::new()
            .domain("plugins")
            .config_file("app.config")
            .gc(GcMode::Boehm)
            .jit_option("--debug")
            .debug(true);

        assert_eq!(config.domain.as_deref(), Some("plugins"));
        assert_eq!(config.gc_mode(), GcMode::Boehm);
        assert_eq!(config.jit_options, vec!["--debug".to_string()]);
        assert!(config.debug);
        assert_eq!(MonoConfig::new().gc_mode(), GcMode::Sgen);
    }

    #[test]
    fn gc_mode_strings() {
        assert_eq!(GcMode::from_str("boehm").unwrap(), GcMode::Boehm);
        assert_eq!(GcMode::from_str("SGen").unwrap(), GcMode::Sgen);
        assert_eq!(GcMode::Sgen.to_string(), "sgen");
        assert!(GcMode::from_str("generational").is_err());
    }

    #[test]
    fn options_from_json() {
        let options = RuntimeOptions::from_json(
            r#"{
                "backend": "coreclr",
                "runtime_config": { "file": "Lib.runtimeconfig.json" },
                "properties": { "System.GC.Server": "false" }
            }"#,
        )
        .unwrap();

        assert_eq!(options.kind(), BackendKind::CoreClr);
        let RuntimeOptions::CoreClr(config) = options else {
            panic!("expected CoreCLR options");
        };
        assert_eq!(
            config.runtime_config,
            RuntimeConfigSource::File(PathBuf::from("Lib.runtimeconfig.json"))
        );
        assert_eq!(config.dotnet_root, None);
        assert_eq!(
            config.properties.get("System.GC.Server").map(String::as_str),
            Some("false")
        );
    }

    #[test]
    fn mono_and_netfx_options_default_fields() {
        let options = RuntimeOptions::from_json(r#"{ "backend": "mono", "gc": "boehm" }"#).unwrap();
        assert_eq!(
            options,
            RuntimeOptions::Mono(MonoConfig::new().gc(GcMode::Boehm))
        );

        let options = RuntimeOptions::from_json(r#"{ "backend": "netfx" }"#).unwrap();
        assert_eq!(options, RuntimeOptions::NetFx(NetFxConfig::new()));
    }

    #[test]
    fn options_require_runtime_config() {
        let result = RuntimeOptions::from_json(r#"{ "backend": "coreclr" }"#);
        assert!(matches!(result, Err(crate::Error::JsonError(_))));

        let result = RuntimeOptions::from_json(r#"{ "backend": "jvm" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn options_relative_paths() {
        let base = tempfile::tempdir().unwrap();
        let dotnet_root = base.path().join("dotnet");

        let options = RuntimeOptions::CoreClr(
            CoreClrConfig::new("Lib.runtimeconfig.json").dotnet_root(&dotnet_root),
        )
        .relative_to(&base.path().join("app"));

        let RuntimeOptions::CoreClr(config) = options else {
            panic!("expected CoreCLR options");
        };
        assert_eq!(
            config.runtime_config,
            RuntimeConfigSource::File(base.path().join("app").join("Lib.runtimeconfig.json"))
        );
        assert_eq!(config.dotnet_root, Some(dotnet_root));
    }

    #[test]
    fn options_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.json");
        std::fs::write(
            &path,
            r#"{ "backend": "netfx", "name": "plugins", "config_file": "app.config" }"#,
        )
        .unwrap();

        let options = RuntimeOptions::from_file(&path).unwrap();
        assert_eq!(
            options,
            RuntimeOptions::NetFx(
                NetFxConfig::new()
                    .name("plugins")
                    .config_file(dir.path().join("app.config"))
            )
        );

        let missing = RuntimeOptions::from_file(&dir.path().join("missing.json"));
        assert!(matches!(missing, Err(crate::Error::FileError(_))));
    }
}
