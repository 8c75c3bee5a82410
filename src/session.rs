//! The persistent compile session
//!
//! One `CompileSession` lives for the whole host process and threads the
//! pipeline together: option parsing → include resolution → (first call
//! only) driver loading + device discovery → compile → symbol extraction →
//! kernel binding.
//!
//! Durable state (artifact counter, registered kernels, device contexts)
//! survives across invocations; everything else is rebuilt per call. The
//! session takes `&mut self` per invocation, so at most one invocation can
//! be in flight.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use tracing::debug;

use crate::binder::{bind_artifact, BoundKernel, KernelHandle};
use crate::compile;
use crate::demangle::{Demangle, PrefixLengthDemangler};
use crate::device::{self, DeviceContext, DeviceListing, DeviceReport};
use crate::driver::{CompilerApi, DeviceApi, DriverProvider};
use crate::error::Result;
use crate::include::{resolve_includes, FsLoader, SourceLoader};
use crate::options::parse_line;
use crate::symbols::extract_symbols;

// ============================================================================
// State Machine
// ============================================================================

/// Top-level session state.
///
/// `Initializing` is only observable from within setup itself; a failure at
/// any setup step falls back to `Uninitialized` so the next invocation
/// retries the whole setup. `Ready` is terminal for the process lifetime:
/// compile failures within it never change the top-level state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No drivers loaded, no devices discovered
    Uninitialized,
    /// One-time setup in progress
    Initializing,
    /// Drivers loaded and devices discovered; compiles may run
    Ready,
}

/// Loaded drivers plus the discovered device list, present iff `Ready`
struct Runtime {
    compiler: Box<dyn CompilerApi>,
    device: Box<dyn DeviceApi>,
    devices: Vec<DeviceContext>,
}

// ============================================================================
// Invocation Outcome
// ============================================================================

/// Everything one successful invocation produced.
///
/// The `Display` impl renders the console-style report: inventory (when
/// requested), the multi-device listing, and every bound handle name.
#[derive(Debug)]
pub struct Invocation {
    /// Artifact index consumed by this invocation's compile
    pub artifact_index: u64,
    /// Per-symbol binding outcomes, in extraction order
    pub kernels: Vec<BoundKernel>,
    /// Device listing, present when more than one device exists
    pub device_listing: Option<DeviceListing>,
    /// Inventory report, present when `-GPUInfo` was given
    pub device_report: Option<DeviceReport>,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(report) = &self.device_report {
            write!(f, "{report}")?;
        }
        if let Some(listing) = &self.device_listing {
            write!(f, "{listing}")?;
        }
        for kernel in &self.kernels {
            for binding in &kernel.bindings {
                writeln!(f, "{}", binding.name)?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Session
// ============================================================================

/// The process-lifetime compile session
pub struct CompileSession {
    provider: Box<dyn DriverProvider>,
    loader: Box<dyn SourceLoader>,
    demangler: Box<dyn Demangle>,
    state: SessionState,
    runtime: Option<Runtime>,
    artifact_index: u64,
    registered: HashSet<String>,
    kernels: Vec<KernelHandle>,
}

impl CompileSession {
    /// Create a session over the given driver provider, reading includes
    /// from the filesystem and demangling with the simplified length-prefix
    /// scheme.
    #[must_use]
    pub fn new(provider: Box<dyn DriverProvider>) -> Self {
        Self {
            provider,
            loader: Box::new(FsLoader),
            demangler: Box::new(PrefixLengthDemangler),
            state: SessionState::Uninitialized,
            runtime: None,
            artifact_index: 0,
            registered: HashSet::new(),
            kernels: Vec::new(),
        }
    }

    /// Create a session against the real NVRTC and CUDA driver libraries
    #[cfg(feature = "cuda")]
    #[must_use]
    pub fn native() -> Self {
        Self::new(Box::new(crate::driver::NativeDriverProvider))
    }

    /// Replace the include loader
    #[must_use]
    pub fn with_source_loader(mut self, loader: Box<dyn SourceLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Replace the demangler
    #[must_use]
    pub fn with_demangler(mut self, demangler: Box<dyn Demangle>) -> Self {
        self.demangler = demangler;
        self
    }

    /// Current top-level state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Value of the artifact counter; the next compile consumes the next one
    #[must_use]
    pub fn artifact_index(&self) -> u64 {
        self.artifact_index
    }

    /// Whether a mangled symbol has ever been registered in this session
    #[must_use]
    pub fn is_registered(&self, mangled: &str) -> bool {
        self.registered.contains(mangled)
    }

    /// All registered kernels in registration order
    #[must_use]
    pub fn kernels(&self) -> &[KernelHandle] {
        &self.kernels
    }

    /// Discovered devices; empty until the first successful setup
    #[must_use]
    pub fn devices(&self) -> &[DeviceContext] {
        self.runtime.as_ref().map_or(&[], |rt| rt.devices.as_slice())
    }

    /// Run one invocation: compile the cell and bind its kernels.
    ///
    /// # Errors
    ///
    /// Returns the first failure of any pipeline step. Setup failures leave
    /// the session `Uninitialized` (the next call retries setup); compile
    /// and bind failures leave it `Ready`. Durable state from prior
    /// successful invocations is never rolled back, and a failed compile
    /// still consumes its artifact index.
    pub fn invoke(&mut self, line: &str, cell: &str) -> Result<Invocation> {
        let parsed = parse_line(line);
        let includes = resolve_includes(cell, &*self.loader)?;

        self.ensure_ready(parsed.toolkit_dir.as_deref().map(Path::new))?;
        let Some(runtime) = self.runtime.as_mut() else {
            unreachable!("runtime present once setup succeeded")
        };

        let device_report = parsed
            .options
            .report_device_info
            .then(|| DeviceReport::new(&runtime.devices));
        let device_listing = DeviceListing::new(&runtime.devices);

        self.artifact_index += 1;
        let index = self.artifact_index;

        let artifact = compile::compile(
            &*runtime.compiler,
            index,
            cell,
            &includes,
            &parsed.options,
        )?;
        let symbols = extract_symbols(&artifact.ptx_text());
        debug!(index, kernels = symbols.len(), "compiled cell, binding kernels");

        let kernels = bind_artifact(
            &*runtime.device,
            &mut runtime.devices,
            &mut self.registered,
            &mut self.kernels,
            &*self.demangler,
            &symbols,
            &artifact,
        )?;

        Ok(Invocation {
            artifact_index: index,
            kernels,
            device_listing,
            device_report,
        })
    }

    /// Run one-time setup if it has not succeeded yet: load both drivers,
    /// then discover devices. Any failure drops everything loaded so far.
    fn ensure_ready(&mut self, toolkit_dir: Option<&Path>) -> Result<()> {
        if self.state == SessionState::Ready {
            return Ok(());
        }

        self.state = SessionState::Initializing;
        debug!("running one-time session setup");

        let loaded = match self.provider.load(toolkit_dir) {
            Ok(loaded) => loaded,
            Err(e) => {
                self.state = SessionState::Uninitialized;
                return Err(e);
            }
        };
        let devices = match device::discover(&*loaded.device) {
            Ok(devices) => devices,
            Err(e) => {
                self.state = SessionState::Uninitialized;
                return Err(e);
            }
        };

        self.runtime = Some(Runtime {
            compiler: loaded.compiler,
            device: loaded.device,
            devices,
        });
        self.state = SessionState::Ready;
        Ok(())
    }
}
