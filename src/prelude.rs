//! # clrloader Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and functions
//! of the clrloader library. Import it to get quick access to everything needed to start a
//! runtime and call into an assembly.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all clrloader operations
pub use crate::Error;

/// The result type used throughout clrloader
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// The runtime handle and its constructors
pub use crate::{get_coreclr, get_mono, get_netfx, Runtime};

/// Assemblies and resolved functions
pub use crate::{Assembly, ClrFunction};

// ================================================================================================
// Configuration
// ================================================================================================

/// Per-backend configuration
pub use crate::{CoreClrConfig, GcMode, MonoConfig, NetFxConfig, RuntimeOptions};

/// Runtime descriptions for generated runtime configurations
pub use crate::DotnetCoreRuntimeSpec;

// ================================================================================================
// Backends
// ================================================================================================

/// The backend interface and its kinds
pub use crate::{Backend, BackendKind, RuntimeInfo};

/// Buffer calling convention
pub use crate::{BufferView, NativeCallable, RawEntryPoint};
