//! # cujit: runtime CUDA compile sessions
//!
//! Turn a snippet of CUDA source into loaded, callable device kernels inside
//! a long-lived host process. A [`CompileSession`] resolves textual
//! includes, compiles the source to PTX through NVRTC, loads the PTX into a
//! module on every discovered device, and hands back stable per-device
//! kernel handles the host can launch repeatedly without recompiling.
//!
//! ## Pipeline
//!
//! ```text
//! invocation line + cell source
//!   → option parsing → include resolution
//!   → (first call) driver loading + device discovery
//!   → NVRTC compile → PTX symbol extraction → per-device kernel binding
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use cujit::CompileSession;
//!
//! let mut session = CompileSession::native();
//! let out = session.invoke(
//!     "-co -O3",
//!     "__global__ void add(float* a, float* b) { /* ... */ }",
//! )?;
//! println!("{out}");
//! ```
//!
//! Registration is idempotent across invocations: recompiling a cell that
//! declares an already-known kernel refreshes its per-device function
//! pointers instead of creating duplicate handles.
//!
//! The native drivers (`libnvrtc`, `libcuda`) are loaded dynamically at
//! first use, behind the `cuda` feature; both sit behind capability traits
//! ([`driver::CompilerApi`], [`driver::DeviceApi`]) so hosts and tests can
//! substitute their own implementations.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod binder;
pub mod compile;
pub mod demangle;
pub mod device;
pub mod driver;
pub mod include;
pub mod options;
pub mod session;
pub mod symbols;

/// Error types for session operations
pub mod error;

pub use binder::{BoundKernel, KernelBinding, KernelHandle};
pub use compile::{CompiledArtifact, VIRTUAL_FILENAME};
pub use demangle::{Demangle, PrefixLengthDemangler};
pub use device::{DeviceContext, DeviceListing, DeviceReport};
pub use error::{Result, SessionError};
pub use include::{FsLoader, IncludeSet, SourceLoader};
pub use options::{parse_line, CompileOptions, ParsedLine};
pub use session::{CompileSession, Invocation, SessionState};
pub use symbols::extract_symbols;
