//! Native driver boundary
//!
//! The session drives two result-code domains: the NVRTC compiler runtime and
//! the CUDA driver. Each is modeled as a capability trait ([`CompilerApi`],
//! [`DeviceApi`]) so the compile→load→bind pipeline makes direct structured
//! calls instead of going through an intermediary, and so tests can
//! substitute in-memory fakes.
//!
//! Production implementations ([`NvrtcDriver`], [`CudaDriver`], behind the
//! `cuda` feature) load `libnvrtc` / `libcuda` dynamically and resolve only
//! the entry points the session needs.

pub mod sys;

#[cfg(feature = "cuda")]
mod cuda;
#[cfg(feature = "cuda")]
mod nvrtc;

#[cfg(feature = "cuda")]
pub use cuda::CudaDriver;
#[cfg(feature = "cuda")]
pub use nvrtc::NvrtcDriver;

use std::ffi::c_void;
use std::path::Path;

use crate::error::Result;
use crate::include::IncludeSet;

// ============================================================================
// Opaque Handles
// ============================================================================

macro_rules! opaque_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub struct $name(*mut c_void);

        impl $name {
            /// Wrap a raw handle value
            #[must_use]
            pub fn from_raw(raw: *mut c_void) -> Self {
                Self(raw)
            }

            /// Raw handle value; only meaningful to the driver that issued it
            #[must_use]
            pub fn as_raw(self) -> *mut c_void {
                self.0
            }
        }
    };
}

opaque_handle!(
    /// A device-bound execution scope. Device-scoped driver calls act on
    /// whichever context is current for the calling thread, so the binder
    /// makes a context current before every device-scoped call sequence.
    Context
);

opaque_handle!(
    /// A loaded compiled-code unit bound to one context. Replaced wholesale
    /// on every recompile; never patched in place.
    Module
);

opaque_handle!(
    /// A kernel entry point resolved from a module. Stable for as long as
    /// the module it was resolved from stays loaded.
    Function
);

opaque_handle!(
    /// An in-flight compilation unit owned by the compiler runtime.
    Program
);

/// A compute device ordinal as issued by the driver
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Device(sys::CUdevice);

impl Device {
    /// Wrap a raw device handle
    #[must_use]
    pub fn from_raw(raw: sys::CUdevice) -> Self {
        Self(raw)
    }

    /// Raw device handle
    #[must_use]
    pub fn as_raw(self) -> sys::CUdevice {
        self.0
    }
}

// ============================================================================
// Compiler Runtime Capability (NVRTC domain)
// ============================================================================

/// Outcome of the compile step.
///
/// The compiler protocol distinguishes "the source failed to compile" (the
/// program log is retrievable) from protocol breakdowns, which surface as
/// `Err` like every other call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompileStatus {
    /// Compilation succeeded; PTX is retrievable
    Success,
    /// Compilation failed with the given result code; the log explains why
    Failed {
        /// Raw compiler result code
        code: i32,
    },
}

/// The compiler-runtime protocol: program creation, compilation, diagnostic
/// retrieval, binary extraction.
pub trait CompilerApi {
    /// Create a compilation unit from source text.
    ///
    /// `name` is the virtual filename diagnostics refer to. `includes`
    /// carries the flattened header names and contents; an empty set takes
    /// the headerless fast path.
    ///
    /// # Errors
    ///
    /// Returns an error if program creation fails.
    fn create_program(&self, source: &str, name: &str, includes: &IncludeSet) -> Result<Program>;

    /// Compile the program with the given raw options (possibly empty).
    ///
    /// # Errors
    ///
    /// Returns an error only on protocol breakdown; an ordinary failed
    /// compile reports `Ok(CompileStatus::Failed { .. })`.
    fn compile_program(&self, program: Program, options: &[String]) -> Result<CompileStatus>;

    /// Retrieve the program log (size query, then text).
    ///
    /// # Errors
    ///
    /// Returns an error if either retrieval step fails.
    fn program_log(&self, program: Program) -> Result<String>;

    /// Retrieve the compiled PTX (size query, then bytes).
    ///
    /// The buffer is size-bounded and may carry a trailing NUL.
    ///
    /// # Errors
    ///
    /// Returns an error if either retrieval step fails.
    fn ptx(&self, program: Program) -> Result<Vec<u8>>;

    /// Destroy the program and release compiler-side resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is invalid.
    fn destroy_program(&self, program: Program) -> Result<()>;
}

// ============================================================================
// Device Runtime Capability (CUDA driver domain)
// ============================================================================

/// The device-runtime protocol: discovery, context/module lifecycle, and
/// entry-point resolution.
pub trait DeviceApi {
    /// Initialize the driver. Safe to call once per process.
    ///
    /// # Errors
    ///
    /// Returns an error if driver initialization fails.
    fn init(&self) -> Result<()>;

    /// Number of compute devices visible to the driver.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn device_count(&self) -> Result<i32>;

    /// Bind a device handle for the given ordinal.
    ///
    /// # Errors
    ///
    /// Returns an error if the ordinal is out of range.
    fn device(&self, ordinal: i32) -> Result<Device>;

    /// Human-readable device name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn device_name(&self, device: Device) -> Result<String>;

    /// Compute capability as a (major, minor) pair.
    ///
    /// # Errors
    ///
    /// Returns an error if either attribute query fails.
    fn compute_capability(&self, device: Device) -> Result<(i32, i32)>;

    /// Create a context bound to the device.
    ///
    /// # Errors
    ///
    /// Returns an error if context creation fails.
    fn create_context(&self, device: Device) -> Result<Context>;

    /// Make a context current for the calling thread. Must precede every
    /// device-scoped call sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if activation fails.
    fn make_current(&self, context: Context) -> Result<()>;

    /// JIT-load PTX text into a module bound to the current context.
    ///
    /// # Errors
    ///
    /// Returns an error if the PTX is rejected by the loader.
    fn load_module(&self, ptx: &str) -> Result<Module>;

    /// Unload a module, invalidating every function resolved from it.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is invalid.
    fn unload_module(&self, module: Module) -> Result<()>;

    /// Resolve a kernel entry point by its exported (mangled) symbol.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol is not present in the module.
    fn get_function(&self, module: Module, symbol: &str) -> Result<Function>;
}

// ============================================================================
// Driver Loading
// ============================================================================

/// The pair of loaded capability implementations a session runs against
pub struct LoadedDrivers {
    /// Compiler-runtime implementation
    pub compiler: Box<dyn CompilerApi>,
    /// Device-runtime implementation
    pub device: Box<dyn DeviceApi>,
}

/// Loads (or fabricates) the two drivers during one-time session setup.
///
/// Loading happens inside setup rather than at session construction so that
/// a failed load leaves the session uninitialized and the next invocation
/// retries from scratch.
pub trait DriverProvider {
    /// Load both drivers, honoring an optional toolkit directory override
    /// for locating the native libraries.
    ///
    /// # Errors
    ///
    /// Returns an error if either library or any of its symbols fails to
    /// load; no partially loaded state is handed out.
    fn load(&self, toolkit_dir: Option<&Path>) -> Result<LoadedDrivers>;
}

/// Loads the real NVRTC and CUDA driver libraries
#[cfg(feature = "cuda")]
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeDriverProvider;

#[cfg(feature = "cuda")]
impl DriverProvider for NativeDriverProvider {
    fn load(&self, toolkit_dir: Option<&Path>) -> Result<LoadedDrivers> {
        let compiler = NvrtcDriver::load(toolkit_dir)?;
        let device = CudaDriver::load(toolkit_dir)?;
        Ok(LoadedDrivers {
            compiler: Box::new(compiler),
            device: Box::new(device),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
