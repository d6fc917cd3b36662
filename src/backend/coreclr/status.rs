//! Decoding of `hostfxr` status codes and CLR `HRESULT`s.
//!
//! `hostfxr` and the `load_assembly_and_get_function_pointer` delegate both report failures as
//! negative 32-bit codes. Codes in the `0x8000_80xx` range are the host's own; anything else is
//! an `HRESULT` produced by the runtime while loading the assembly or binding the method.

use strum::{Display, FromRepr, IntoStaticStr};

/// Status codes defined by the .NET host (`hostfxr` / `hostpolicy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromRepr, IntoStaticStr)]
#[repr(u32)]
#[allow(missing_docs)]
pub enum StatusCode {
    Success = 0x0000_0000,
    SuccessHostAlreadyInitialized = 0x0000_0001,
    SuccessDifferentRuntimeProperties = 0x0000_0002,
    InvalidArgFailure = 0x8000_8081,
    CoreHostLibLoadFailure = 0x8000_8082,
    CoreHostLibMissingFailure = 0x8000_8083,
    CoreHostEntryPointFailure = 0x8000_8084,
    CoreHostCurHostFindFailure = 0x8000_8085,
    CoreClrResolveFailure = 0x8000_8087,
    CoreClrBindFailure = 0x8000_8088,
    CoreClrInitFailure = 0x8000_8089,
    CoreClrExeFailure = 0x8000_808a,
    ResolverInitFailure = 0x8000_808b,
    ResolverResolveFailure = 0x8000_808c,
    LibHostCurExeFindFailure = 0x8000_808d,
    LibHostInitFailure = 0x8000_808e,
    LibHostSdkFindFailure = 0x8000_8091,
    LibHostInvalidArgs = 0x8000_8092,
    InvalidConfigFile = 0x8000_8093,
    AppArgNotRunnable = 0x8000_8094,
    AppHostExeNotBoundFailure = 0x8000_8095,
    FrameworkMissingFailure = 0x8000_8096,
    HostApiFailed = 0x8000_8097,
    HostApiBufferTooSmall = 0x8000_8098,
    LibHostUnknownCommand = 0x8000_8099,
    LibHostAppRootFindFailure = 0x8000_809a,
    SdkResolverResolveFailure = 0x8000_809b,
    FrameworkCompatFailure = 0x8000_809c,
    FrameworkCompatRetry = 0x8000_809d,
    BundleExtractionFailure = 0x8000_809f,
    BundleExtractionIOError = 0x8000_80a0,
    LibHostDuplicateProperty = 0x8000_80a1,
    HostApiUnsupportedVersion = 0x8000_80a2,
    HostInvalidState = 0x8000_80a3,
    HostPropertyNotFound = 0x8000_80a4,
    CoreHostIncompatibleConfig = 0x8000_80a5,
    HostApiUnsupportedScenario = 0x8000_80a6,
    HostFeatureDisabled = 0x8000_80a7,
}

/// `HRESULT`s the runtime returns from assembly loading and method binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromRepr, IntoStaticStr)]
#[repr(u32)]
pub enum ClrHResult {
    /// `E_POINTER`
    #[strum(to_string = "NullReferenceException")]
    NullReference = 0x8000_4003,
    /// `COR_E_FILENOTFOUND`
    #[strum(to_string = "FileNotFoundException")]
    FileNotFound = 0x8007_0002,
    /// `COR_E_DIRECTORYNOTFOUND`
    #[strum(to_string = "DirectoryNotFoundException")]
    DirectoryNotFound = 0x8007_0003,
    /// `COR_E_BADIMAGEFORMAT`
    #[strum(to_string = "BadImageFormatException")]
    BadImageFormat = 0x8007_000B,
    /// `E_INVALIDARG`, raised when the method does not match the delegate signature
    #[strum(to_string = "ArgumentException")]
    Argument = 0x8007_0057,
    /// `COR_E_INVALIDOPERATION`
    #[strum(to_string = "InvalidOperationException")]
    InvalidOperation = 0x8013_1509,
    /// `COR_E_MISSINGMEMBER`
    #[strum(to_string = "MissingMemberException")]
    MissingMember = 0x8013_1512,
    /// `COR_E_MISSINGMETHOD`
    #[strum(to_string = "MissingMethodException")]
    MissingMethod = 0x8013_1513,
    /// `COR_E_TYPELOAD`
    #[strum(to_string = "TypeLoadException")]
    TypeLoad = 0x8013_1522,
    /// `COR_E_FILELOAD`
    #[strum(to_string = "FileLoadException")]
    FileLoad = 0x8013_1621,
}

/// Which caller-facing error a failed resolution maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResolutionFailure {
    AssemblyLoad,
    MemberResolution,
}

/// `true` for the success codes, including the "already initialized" variants.
pub(crate) fn succeeded(code: i32) -> bool {
    code >= 0
}

/// Human readable form of `code`, e.g. `TypeLoadException (0x80131522)`.
pub fn describe(code: i32) -> String {
    let raw = code as u32;
    let name: Option<&'static str> = StatusCode::from_repr(raw)
        .map(Into::into)
        .or_else(|| ClrHResult::from_repr(raw).map(Into::into));

    match name {
        Some(name) => format!("{name} (0x{raw:08X})"),
        None => format!("0x{raw:08X}"),
    }
}

/// Maps a failed `load_assembly_and_get_function_pointer` code to the error taxonomy.
pub(crate) fn classify(code: i32) -> ResolutionFailure {
    match ClrHResult::from_repr(code as u32) {
        Some(
            ClrHResult::FileNotFound
            | ClrHResult::DirectoryNotFound
            | ClrHResult::BadImageFormat
            | ClrHResult::FileLoad,
        ) => ResolutionFailure::AssemblyLoad,
        _ => ResolutionFailure::MemberResolution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_codes() {
        assert!(succeeded(StatusCode::Success as i32));
        assert!(succeeded(StatusCode::SuccessHostAlreadyInitialized as i32));
        assert!(succeeded(StatusCode::SuccessDifferentRuntimeProperties as i32));
        assert!(!succeeded(StatusCode::CoreClrInitFailure as u32 as i32));
    }

    #[test]
    fn describe_known_and_unknown() {
        assert_eq!(
            describe(0x8000_8096u32 as i32),
            "FrameworkMissingFailure (0x80008096)"
        );
        assert_eq!(
            describe(0x8013_1522u32 as i32),
            "TypeLoadException (0x80131522)"
        );
        assert_eq!(describe(0x8123_4567u32 as i32), "0x81234567");
    }

    #[test]
    fn classification() {
        assert_eq!(
            classify(0x8007_0002u32 as i32),
            ResolutionFailure::AssemblyLoad
        );
        assert_eq!(
            classify(0x8007_000Bu32 as i32),
            ResolutionFailure::AssemblyLoad
        );
        assert_eq!(
            classify(0x8013_1522u32 as i32),
            ResolutionFailure::MemberResolution
        );
        assert_eq!(
            classify(0x8013_1513u32 as i32),
            ResolutionFailure::MemberResolution
        );
        assert_eq!(
            classify(0x8007_0057u32 as i32),
            ResolutionFailure::MemberResolution
        );
    }

    #[test]
    fn display_names() {
        assert_eq!(StatusCode::InvalidConfigFile.to_string(), "InvalidConfigFile");
        assert_eq!(ClrHResult::MissingMethod.to_string(), "MissingMethodException");
    }
}
