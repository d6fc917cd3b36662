//! PE/CLI image probe.
//!
//! Before a backend hands an assembly path to its runtime, the file is mapped and checked for
//! what every runtime will insist on anyway: a PE image with a CLR runtime header directory.
//! Catching a missing file or a native DLL here yields a precise
//! [`crate::Error::AssemblyLoad`] instead of a runtime-specific status code, and keeps obviously
//! wrong input away from the process-wide runtime.

use std::{fs::File, path::Path};

use goblin::pe::PE;
use memmap2::Mmap;

use crate::{backend::BackendKind, Result};

/// Summary of a probed assembly image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    /// `true` for PE32+ images
    pub is_64: bool,
    /// RVA of the CLR runtime header
    pub clr_header_rva: u32,
    /// Size of the CLR runtime header
    pub clr_header_size: u32,
}

/// Checks that `path` is a managed assembly image.
///
/// # Errors
///
/// Returns [`crate::Error::AssemblyLoad`] for `backend` if the file cannot be opened or mapped,
/// is not a PE image, or carries no CLR runtime header.
pub fn probe_assembly(path: &Path, backend: BackendKind) -> Result<ImageInfo> {
    let file = File::open(path).map_err(|e| load_error!(backend, path, "cannot open: {}", e))?;
    let metadata = file
        .metadata()
        .map_err(|e| load_error!(backend, path, "cannot stat: {}", e))?;
    if metadata.len() == 0 {
        return Err(load_error!(backend, path, "file is empty"));
    }

    // SAFETY: the mapping is read-only and dropped before returning; a concurrent writer can at
    // worst make goblin see garbage, which it reports as a parse error.
    let data = unsafe { Mmap::map(&file) }
        .map_err(|e| load_error!(backend, path, "cannot map: {}", e))?;

    let pe = PE::parse(&data)
        .map_err(|e| load_error!(backend, path, "not a PE image: {}", e))?;

    let Some(optional_header) = pe.header.optional_header else {
        return Err(load_error!(backend, path, "PE image has no optional header"));
    };

    match optional_header.data_directories.get_clr_runtime_header() {
        Some(directory) if directory.virtual_address != 0 && directory.size != 0 => Ok(ImageInfo {
            is_64: pe.is_64,
            clr_header_rva: directory.virtual_address,
            clr_header_size: directory.size,
        }),
        _ => Err(load_error!(
            backend,
            path,
            "native image without a CLR runtime header"
        )),
    }
}
