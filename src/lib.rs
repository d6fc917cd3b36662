// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
// unsafe is confined to the native boundary:
// - 'native.rs' loads libraries and copies out symbols
// - 'backend/*/api.rs' and the backends call into the hosting interfaces
// - 'function.rs' calls resolved entry points
// - 'image.rs' uses mmap to map an assembly into memory

//! # clrloader
//!
//! Load managed .NET assemblies into a native process and call into them through one uniform
//! native calling convention, whichever runtime hosts them:
//!
//! ```text
//! int32 function(void* buffer, int32 length)
//! ```
//!
//! Three runtimes are supported behind one interface:
//!
//! - **Mono**, through the Mono embedding API
//! - **.NET (Core)**, through `hostfxr` and `load_assembly_and_get_function_pointer`
//! - **.NET Framework** (Windows), through the `ClrLoader.dll` native exports
//!
//! ## Architecture
//!
//! The public surface is three types that form a borrow chain:
//!
//! - [`Runtime`] - owns one initialized [`Backend`], selected once at construction from
//!   [`RuntimeOptions`]
//! - [`Assembly`] - an assembly path inside a runtime; creating one does no I/O
//! - [`ClrFunction`] - a resolved entry point, invoked with a `&mut [u8]`
//!
//! Each borrows the previous one, so a function can never be called after its runtime is gone.
//! Arguments and results travel through the one byte buffer, encoded however the caller and the
//! managed code agree. The `i32` result is theirs to interpret as well.
//!
//! Mono and the .NET Framework can only be started once per process. Their backends share a
//! process-wide runtime that is initialized under a lock and never torn down. CoreCLR backends
//! each own a `hostfxr` host context; `hostfxr` itself allows one runtime per process and
//! rejects incompatible configurations.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use clrloader::prelude::*;
//!
//! let runtime = get_coreclr(CoreClrConfig::new("Lib.runtimeconfig.json"))?;
//! let assembly = runtime.get_assembly("Lib.dll");
//! let echo = assembly.get_function("Lib.Echo", None)?;
//!
//! let mut buffer = *b"hello";
//! assert_eq!(echo.invoke(&mut buffer), 5);
//! # Ok::<(), clrloader::Error>(())
//! ```
//!
//! ## Threading
//!
//! [`Runtime`], [`Assembly`] and [`ClrFunction`] are `Send + Sync`. Resolution and invocation
//! run synchronously on the caller's thread and block until the native call returns; there is
//! no cancellation. Whether concurrent calls into managed code are safe is decided by the
//! hosted runtime and the managed code, not by this crate. The Mono backend attaches every
//! calling thread to its domain before calling in.
//!
//! ## Errors
//!
//! Every fallible operation returns [`Result`]. Resolution errors name the backend, the
//! assembly path and, where relevant, the type and method. Faults inside an invoked function
//! (an unhandled managed exception, a misbehaving callee) are not errors: they end the process
//! the same way a bad native function pointer would.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

pub(crate) mod native;

/// Assemblies and name splitting.
pub mod assembly;

/// Runtime backends.
pub mod backend;

/// Backend configuration and runtime configuration files.
pub mod config;

/// Resolved functions and the buffer calling convention.
pub mod function;

/// PE/CLI image checks.
pub mod image;

/// Discovery of runtime installations.
pub mod locate;

/// Convenient re-exports of the most commonly used types.
pub mod prelude;

/// The [`Runtime`] handle.
pub mod runtime;

/// `clrloader` Result type.
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`]. Used consistently throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// `clrloader` Error type.
///
/// See [`Error`] for the variants and what they carry.
pub use error::Error;

pub use assembly::{split_name, Assembly, DEFAULT_SEPARATOR};
pub use backend::{Backend, BackendKind, RuntimeInfo};
pub use config::{
    CoreClrConfig, DotnetCoreRuntimeSpec, GcMode, MonoConfig, NetFxConfig, RuntimeConfigSource,
    RuntimeOptions,
};
pub use function::{BufferView, ClrFunction, EntryPointFn, NativeCallable, RawEntryPoint};
pub use runtime::{get_coreclr, get_mono, get_netfx, Runtime};
