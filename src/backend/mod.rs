//! Runtime backends and the interface they share.
//!
//! A backend adapts one native hosting interface to the single operation the loader needs:
//! resolve `(assembly path, type name, method name)` to an entry point with the
//! `int32 (*)(void*, int32)` convention. The three backends differ in everything else:
//!
//! | Backend | Hosting interface | Runtime scope |
//! |---|---|---|
//! | [`mono::Mono`] | Mono embedding API (`libmono`) | one per process, shared by all instances |
//! | [`coreclr::CoreClr`] | `hostfxr` + `load_assembly_and_get_function_pointer` | one host context per instance |
//! | [`netfx::NetFx`] | `ClrLoader.dll` native exports (`pyclr_*`) | one per process, one app-domain per instance |
//!
//! The backend is chosen once, when the [`crate::Runtime`] is created. After that every call
//! goes through [`Backend::resolve_callable`] without looking at the variant again.

pub mod coreclr;
pub(crate) mod global;
pub mod mono;
pub mod netfx;

use std::{collections::BTreeMap, fmt, path::Path};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{function::NativeCallable, Result};

/// The closed set of supported runtime kinds.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// The Mono runtime, hosted through its embedding API
    #[strum(to_string = "Mono", serialize = "mono")]
    Mono,
    /// .NET (Core), hosted through `hostfxr`
    #[strum(to_string = "CoreCLR", serialize = "coreclr")]
    CoreClr,
    /// The classic .NET Framework, Windows only
    #[strum(to_string = "NetFx", serialize = "netfx")]
    NetFx,
}

/// Introspection data about a live runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeInfo {
    /// The backend hosting the runtime
    pub kind: BackendKind,
    /// Runtime version, when the backend can tell
    pub version: Option<String>,
    /// Whether the runtime has passed its point of no return (started executing managed code)
    pub initialized: bool,
    /// Runtime properties, as far as the hosting interface exposes them
    pub properties: BTreeMap<String, String>,
}

/// A native runtime adapter.
///
/// Implementations own exactly one initialized runtime context and must be usable from
/// several threads at once; any initialization they defer has to be guarded internally.
pub trait Backend: Send + Sync + fmt::Debug {
    /// Which runtime this backend hosts.
    fn kind(&self) -> BackendKind;

    /// Resolves `type_name.method_name` in the assembly at `assembly_path`.
    ///
    /// The managed method must be static with the signature `int M(IntPtr buffer, int length)`.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::AssemblyLoad`] if the assembly cannot be loaded
    /// - [`crate::Error::MemberResolution`] if the type or method cannot be found, or the
    ///   method has the wrong signature
    /// - [`crate::Error::RuntimeInitialization`] if deferred runtime startup fails
    fn resolve_callable(
        &self,
        assembly_path: &Path,
        type_name: &str,
        method_name: &str,
    ) -> Result<Box<dyn NativeCallable>>;

    /// Describes the runtime behind this backend.
    fn info(&self) -> RuntimeInfo;
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn kind_names() {
        assert_eq!(BackendKind::CoreClr.to_string(), "CoreCLR");
        assert_eq!(BackendKind::from_str("coreclr").unwrap(), BackendKind::CoreClr);
        assert_eq!(BackendKind::from_str("CoreCLR").unwrap(), BackendKind::CoreClr);
        assert_eq!(BackendKind::from_str("MONO").unwrap(), BackendKind::Mono);
        assert!(BackendKind::from_str("jvm").is_err());
        assert_eq!(BackendKind::iter().count(), 3);
    }

    #[test]
    fn kind_serde() {
        let json = serde_json::to_string(&BackendKind::NetFx).unwrap();
        assert_eq!(json, "\"netfx\"");
        let kind: BackendKind = serde_json::from_str("\"coreclr\"").unwrap();
        assert_eq!(kind, BackendKind::CoreClr);
    }
}
