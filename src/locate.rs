//! Discovery of runtime installations.
//!
//! The backends only need a library to load. This module finds one when the caller did not
//! say where:
//!
//! - [`find_dotnet_root`] - the .NET installation root (`DOTNET_ROOT`, `%ProgramFiles%\dotnet`,
//!   the directory of the `dotnet` executable on `PATH`, platform defaults)
//! - [`find_hostfxr`] - the newest `hostfxr` library below a root
//! - [`find_runtimes`] - all shared runtimes below a root
//! - [`find_libmono`] - the Mono runtime library for a garbage collector flavour

use std::{
    env,
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
};

use crate::{
    backend::BackendKind,
    config::{runtimeconfig::version_key, DotnetCoreRuntimeSpec, GcMode},
    Result,
};

#[cfg(windows)]
const HOSTFXR_NAME: &str = "hostfxr.dll";
#[cfg(target_os = "macos")]
const HOSTFXR_NAME: &str = "libhostfxr.dylib";
#[cfg(not(any(windows, target_os = "macos")))]
const HOSTFXR_NAME: &str = "libhostfxr.so";

#[cfg(windows)]
const DOTNET_EXE: &str = "dotnet.exe";
#[cfg(not(windows))]
const DOTNET_EXE: &str = "dotnet";

#[cfg(target_os = "macos")]
const DOTNET_DEFAULT_ROOTS: &[&str] = &["/usr/local/share/dotnet"];
#[cfg(not(any(windows, target_os = "macos")))]
const DOTNET_DEFAULT_ROOTS: &[&str] = &["/usr/share/dotnet", "/usr/lib/dotnet", "/usr/lib64/dotnet"];
#[cfg(windows)]
const DOTNET_DEFAULT_ROOTS: &[&str] = &[];

#[cfg(not(any(windows, target_os = "macos")))]
const MONO_LIBRARY_DIRS: &[&str] = &[
    "/usr/lib",
    "/usr/lib64",
    "/usr/local/lib",
    "/usr/lib/x86_64-linux-gnu",
    "/usr/lib/aarch64-linux-gnu",
];

/// Finds the root of the .NET installation.
///
/// Looks at, in order: the `DOTNET_ROOT` environment variable, `%ProgramFiles%\dotnet` on
/// Windows, the (symlink-resolved) directory of the `dotnet` executable on `PATH`, and the
/// platform's default install locations.
///
/// # Errors
///
/// Returns [`crate::Error::RuntimeInitialization`] if none of them exists.
pub fn find_dotnet_root() -> Result<PathBuf> {
    if let Some(root) = env::var_os("DOTNET_ROOT").filter(|root| !root.is_empty()) {
        return Ok(PathBuf::from(root));
    }

    #[cfg(windows)]
    {
        if let Some(program_files) = env::var_os("ProgramFiles") {
            let root = PathBuf::from(program_files).join("dotnet");
            if root.is_dir() {
                return Ok(root);
            }
        }
    }

    if let Some(root) = find_in_path(OsStr::new(DOTNET_EXE))
        .and_then(|exe| fs::canonicalize(exe).ok())
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        return Ok(root);
    }

    DOTNET_DEFAULT_ROOTS
        .iter()
        .map(PathBuf::from)
        .find(|root| root.is_dir())
        .ok_or_else(|| {
            init_error!(
                BackendKind::CoreClr,
                "cannot determine the .NET root; set DOTNET_ROOT or put dotnet on PATH"
            )
        })
}

/// Finds `hostfxr` libraries below `dotnet_root`, newest version first.
///
/// # Errors
///
/// Returns [`crate::Error::RuntimeInitialization`] if there is none.
pub fn find_hostfxr(dotnet_root: &Path) -> Result<Vec<PathBuf>> {
    let fxr_dir = dotnet_root.join("host").join("fxr");
    let mut candidates: Vec<(Vec<u64>, PathBuf)> = fs::read_dir(&fxr_dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .filter_map(|entry| {
                    let version = entry.file_name().to_string_lossy().into_owned();
                    let library = entry.path().join(HOSTFXR_NAME);
                    library.is_file().then(|| (version_key(&version), library))
                })
                .collect()
        })
        .unwrap_or_default();

    if candidates.is_empty() {
        return Err(init_error!(
            BackendKind::CoreClr,
            "no {} found in '{}'",
            HOSTFXR_NAME,
            fxr_dir.display()
        ));
    }

    candidates.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(candidates.into_iter().map(|(_, path)| path).collect())
}

/// Lists the shared runtimes installed below `dotnet_root`, sorted by name and version.
///
/// A missing `shared` directory yields an empty list.
///
/// # Errors
///
/// Returns [`crate::Error::FileError`] if a directory exists but cannot be read.
pub fn find_runtimes(dotnet_root: &Path) -> Result<Vec<DotnetCoreRuntimeSpec>> {
    let shared = dotnet_root.join("shared");
    if !shared.is_dir() {
        return Ok(Vec::new());
    }

    let mut runtimes = Vec::new();
    for framework in fs::read_dir(&shared)? {
        let framework = framework?;
        if !framework.file_type()?.is_dir() {
            continue;
        }
        let name = framework.file_name().to_string_lossy().into_owned();

        for version in fs::read_dir(framework.path())? {
            let version = version?;
            if !version.file_type()?.is_dir() {
                continue;
            }
            runtimes.push(DotnetCoreRuntimeSpec {
                name: name.clone(),
                version: version.file_name().to_string_lossy().into_owned(),
                path: version.path(),
            });
        }
    }

    runtimes.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| version_key(&a.version).cmp(&version_key(&b.version)))
    });
    Ok(runtimes)
}

/// Finds the Mono runtime library.
///
/// With `path`, the library is expected directly in that directory (`<prefix>/lib`; on Windows
/// `<prefix>/bin`). Without, the platform's default Mono locations are searched, falling back to
/// the bare library name so the system loader can resolve it.
///
/// [`GcMode::Sgen`] selects `monosgen-2.0`, [`GcMode::Boehm`] selects `mono-2.0`. Windows
/// installations only ship the SGen flavour.
///
/// # Errors
///
/// Returns [`crate::Error::RuntimeInitialization`] if an explicit `path` does not contain the
/// library.
pub fn find_libmono(path: Option<&Path>, gc: GcMode) -> Result<PathBuf> {
    let file_name = libmono_name(gc);

    if let Some(dir) = path {
        let candidate = dir.join(&file_name);
        return if candidate.is_file() {
            Ok(candidate)
        } else {
            Err(init_error!(
                BackendKind::Mono,
                "'{}' does not contain {}",
                dir.display(),
                file_name
            ))
        };
    }

    Ok(default_mono_dirs()
        .into_iter()
        .map(|dir| dir.join(&file_name))
        .find(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(file_name)))
}

#[cfg(windows)]
fn libmono_name(_gc: GcMode) -> String {
    "mono-2.0-sgen.dll".to_string()
}

#[cfg(target_os = "macos")]
fn libmono_name(gc: GcMode) -> String {
    match gc {
        GcMode::Sgen => "libmonosgen-2.0.dylib".to_string(),
        GcMode::Boehm => "libmono-2.0.dylib".to_string(),
    }
}

#[cfg(not(any(windows, target_os = "macos")))]
fn libmono_name(gc: GcMode) -> String {
    match gc {
        GcMode::Sgen => "libmonosgen-2.0.so.1".to_string(),
        GcMode::Boehm => "libmono-2.0.so.1".to_string(),
    }
}

#[cfg(windows)]
fn default_mono_dirs() -> Vec<PathBuf> {
    env::var_os("ProgramFiles")
        .map(|program_files| vec![PathBuf::from(program_files).join("Mono").join("bin")])
        .unwrap_or_default()
}

#[cfg(target_os = "macos")]
fn default_mono_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from(
        "/Library/Frameworks/Mono.framework/Versions/Current/lib",
    )]
}

#[cfg(not(any(windows, target_os = "macos")))]
fn default_mono_dirs() -> Vec<PathBuf> {
    let from_env = env::var_os("LD_LIBRARY_PATH")
        .map(|paths| env::split_paths(&paths).collect::<Vec<_>>())
        .unwrap_or_default();
    from_env
        .into_iter()
        .chain(MONO_LIBRARY_DIRS.iter().map(PathBuf::from))
        .collect()
}

/// Looks `program` up in the directories of `PATH`.
fn find_in_path(program: &OsStr) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn hostfxr_newest_first() {
        let root = tempfile::tempdir().unwrap();
        for version in ["6.0.0", "8.0.10", "8.0.9"] {
            touch(&root.path().join("host/fxr").join(version).join(HOSTFXR_NAME));
        }
        fs::create_dir_all(root.path().join("host/fxr/9.0.0")).unwrap();

        let found = find_hostfxr(root.path()).unwrap();
        let versions: Vec<_> = found
            .iter()
            .map(|path| {
                path.parent()
                    .unwrap()
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(versions, vec!["8.0.10", "8.0.9", "6.0.0"]);
    }

    #[test]
    fn hostfxr_missing() {
        let root = tempfile::tempdir().unwrap();
        assert!(matches!(
            find_hostfxr(root.path()),
            Err(crate::Error::RuntimeInitialization {
                backend: BackendKind::CoreClr,
                ..
            })
        ));
    }

    #[test]
    fn runtimes_sorted() {
        let root = tempfile::tempdir().unwrap();
        for (name, version) in [
            ("Microsoft.NETCore.App", "8.0.10"),
            ("Microsoft.NETCore.App", "6.0.25"),
            ("Microsoft.NETCore.App", "8.0.2"),
            ("Microsoft.AspNetCore.App", "8.0.10"),
        ] {
            fs::create_dir_all(root.path().join("shared").join(name).join(version)).unwrap();
        }
        touch(&root.path().join("shared/Microsoft.NETCore.App/.version"));

        let runtimes = find_runtimes(root.path()).unwrap();
        let listed: Vec<_> = runtimes
            .iter()
            .map(|spec| format!("{} {}", spec.name, spec.version))
            .collect();
        assert_eq!(
            listed,
            vec![
                "Microsoft.AspNetCore.App 8.0.10",
                "Microsoft.NETCore.App 6.0.25",
                "Microsoft.NETCore.App 8.0.2",
                "Microsoft.NETCore.App 8.0.10",
            ]
        );
        assert_eq!(runtimes[3].dotnet_root(), Some(root.path()));
    }

    #[test]
    fn runtimes_without_shared_dir() {
        let root = tempfile::tempdir().unwrap();
        assert!(find_runtimes(root.path()).unwrap().is_empty());
    }

    #[test]
    fn libmono_explicit_path() {
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            find_libmono(Some(dir.path()), GcMode::Sgen),
            Err(crate::Error::RuntimeInitialization {
                backend: BackendKind::Mono,
                ..
            })
        ));

        let library = dir.path().join(libmono_name(GcMode::Boehm));
        touch(&library);
        assert_eq!(find_libmono(Some(dir.path()), GcMode::Boehm).unwrap(), library);
    }

    #[test]
    fn libmono_falls_back_to_name() {
        let found = find_libmono(None, GcMode::Sgen).unwrap();
        assert!(found.ends_with(libmono_name(GcMode::Sgen)));
    }
}
