//! Dynamically loaded NVRTC compiler runtime
//!
//! Resolves the seven NVRTC entry points that make up the compile protocol:
//! program creation, compilation, log retrieval (size then text), PTX
//! retrieval (size then bytes), and destruction.

use std::ffi::CString;
use std::os::raw::{c_char, c_int};
use std::path::Path;
use std::ptr;

use libloading::{Library, Symbol};

use super::cuda::{open_library, resolve_sym};
use super::sys::{nvrtc_result_name, NvrtcProgram, NvrtcResult, NVRTC_ERROR_INVALID_INPUT, NVRTC_SUCCESS};
use super::{CompileStatus, CompilerApi, Program};
use crate::error::{Result, SessionError};
use crate::include::IncludeSet;

/// Library file name used in diagnostics and toolkit-path joins
const LIBRARY: &str = "libnvrtc.so";

/// Sonames tried in order when no toolkit path override is given
const CANDIDATES: &[&str] = &["libnvrtc.so", "libnvrtc.so.12"];

// ============================================================================
// Function Pointer Table
// ============================================================================

#[allow(non_snake_case)]
struct NvrtcFns {
    nvrtcCreateProgram: unsafe extern "C" fn(
        prog: *mut NvrtcProgram,
        src: *const c_char,
        name: *const c_char,
        num_headers: c_int,
        headers: *const *const c_char,
        include_names: *const *const c_char,
    ) -> NvrtcResult,
    nvrtcCompileProgram: unsafe extern "C" fn(
        prog: NvrtcProgram,
        num_options: c_int,
        options: *const *const c_char,
    ) -> NvrtcResult,
    nvrtcGetProgramLogSize: unsafe extern "C" fn(prog: NvrtcProgram, size: *mut usize) -> NvrtcResult,
    nvrtcGetProgramLog: unsafe extern "C" fn(prog: NvrtcProgram, log: *mut c_char) -> NvrtcResult,
    nvrtcGetPTXSize: unsafe extern "C" fn(prog: NvrtcProgram, size: *mut usize) -> NvrtcResult,
    nvrtcGetPTX: unsafe extern "C" fn(prog: NvrtcProgram, ptx: *mut c_char) -> NvrtcResult,
    nvrtcDestroyProgram: unsafe extern "C" fn(prog: *mut NvrtcProgram) -> NvrtcResult,
}

/// Compiler-runtime implementation backed by `libnvrtc`
pub struct NvrtcDriver {
    fns: NvrtcFns,
    /// Keeps the resolved function pointers valid
    _lib: Library,
}

impl NvrtcDriver {
    /// Load `libnvrtc` and resolve the required entry points.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LibraryLoad`] if the library or any symbol
    /// cannot be resolved.
    pub fn load(toolkit_dir: Option<&Path>) -> Result<Self> {
        let lib = open_library(toolkit_dir, LIBRARY, CANDIDATES)?;
        let fns = resolve_fns(&lib)?;
        Ok(Self { fns, _lib: lib })
    }

    /// Map an NVRTC result code onto the session error taxonomy
    fn check(call: &'static str, code: NvrtcResult) -> Result<()> {
        if code == NVRTC_SUCCESS {
            Ok(())
        } else {
            Err(SessionError::Nvrtc {
                call,
                name: nvrtc_result_name(code),
                code,
            })
        }
    }

    fn invalid_input(call: &'static str) -> SessionError {
        SessionError::Nvrtc {
            call,
            name: nvrtc_result_name(NVRTC_ERROR_INVALID_INPUT),
            code: NVRTC_ERROR_INVALID_INPUT,
        }
    }
}

fn resolve_fns(lib: &Library) -> Result<NvrtcFns> {
    type FnCreateProgram = unsafe extern "C" fn(
        *mut NvrtcProgram,
        *const c_char,
        *const c_char,
        c_int,
        *const *const c_char,
        *const *const c_char,
    ) -> NvrtcResult;
    type FnCompileProgram =
        unsafe extern "C" fn(NvrtcProgram, c_int, *const *const c_char) -> NvrtcResult;
    type FnGetSize = unsafe extern "C" fn(NvrtcProgram, *mut usize) -> NvrtcResult;
    type FnGetText = unsafe extern "C" fn(NvrtcProgram, *mut c_char) -> NvrtcResult;
    type FnDestroyProgram = unsafe extern "C" fn(*mut NvrtcProgram) -> NvrtcResult;

    Ok(NvrtcFns {
        nvrtcCreateProgram: resolve_sym!(lib, LIBRARY, nvrtcCreateProgram, FnCreateProgram),
        nvrtcCompileProgram: resolve_sym!(lib, LIBRARY, nvrtcCompileProgram, FnCompileProgram),
        nvrtcGetProgramLogSize: resolve_sym!(lib, LIBRARY, nvrtcGetProgramLogSize, FnGetSize),
        nvrtcGetProgramLog: resolve_sym!(lib, LIBRARY, nvrtcGetProgramLog, FnGetText),
        nvrtcGetPTXSize: resolve_sym!(lib, LIBRARY, nvrtcGetPTXSize, FnGetSize),
        nvrtcGetPTX: resolve_sym!(lib, LIBRARY, nvrtcGetPTX, FnGetText),
        nvrtcDestroyProgram: resolve_sym!(lib, LIBRARY, nvrtcDestroyProgram, FnDestroyProgram),
    })
}

/// Build the parallel C-string arrays for a header set
fn header_arrays(includes: &IncludeSet) -> Result<(Vec<CString>, Vec<CString>)> {
    let mut names = Vec::with_capacity(includes.len());
    let mut contents = Vec::with_capacity(includes.len());
    for (name, content) in includes.iter() {
        names.push(CString::new(name).map_err(|_| NvrtcDriver::invalid_input("nvrtcCreateProgram"))?);
        contents
            .push(CString::new(content).map_err(|_| NvrtcDriver::invalid_input("nvrtcCreateProgram"))?);
    }
    Ok((names, contents))
}

// ============================================================================
// CompilerApi
// ============================================================================

impl CompilerApi for NvrtcDriver {
    fn create_program(&self, source: &str, name: &str, includes: &IncludeSet) -> Result<Program> {
        let source_c =
            CString::new(source).map_err(|_| Self::invalid_input("nvrtcCreateProgram"))?;
        let name_c = CString::new(name).map_err(|_| Self::invalid_input("nvrtcCreateProgram"))?;

        let mut prog: NvrtcProgram = ptr::null_mut();
        let code = if includes.is_empty() {
            // SAFETY: no headers, both arrays may be null per the NVRTC contract
            unsafe {
                (self.fns.nvrtcCreateProgram)(
                    &mut prog,
                    source_c.as_ptr(),
                    name_c.as_ptr(),
                    0,
                    ptr::null(),
                    ptr::null(),
                )
            }
        } else {
            let (names, contents) = header_arrays(includes)?;
            let name_ptrs: Vec<*const c_char> = names.iter().map(|s| s.as_ptr()).collect();
            let content_ptrs: Vec<*const c_char> = contents.iter().map(|s| s.as_ptr()).collect();
            // SAFETY: pointer arrays parallel the owned CStrings above, which
            // outlive the call
            unsafe {
                (self.fns.nvrtcCreateProgram)(
                    &mut prog,
                    source_c.as_ptr(),
                    name_c.as_ptr(),
                    includes.len() as c_int,
                    content_ptrs.as_ptr(),
                    name_ptrs.as_ptr(),
                )
            }
        };
        Self::check("nvrtcCreateProgram", code)?;
        Ok(Program::from_raw(prog))
    }

    fn compile_program(&self, program: Program, options: &[String]) -> Result<CompileStatus> {
        let code = if options.is_empty() {
            // SAFETY: zero options, null array per the NVRTC contract
            unsafe { (self.fns.nvrtcCompileProgram)(program.as_raw(), 0, ptr::null()) }
        } else {
            let mut owned = Vec::with_capacity(options.len());
            for opt in options {
                owned.push(
                    CString::new(opt.as_str())
                        .map_err(|_| Self::invalid_input("nvrtcCompileProgram"))?,
                );
            }
            let ptrs: Vec<*const c_char> = owned.iter().map(|s| s.as_ptr()).collect();
            // SAFETY: ptrs parallels the owned CStrings, which outlive the call
            unsafe {
                (self.fns.nvrtcCompileProgram)(program.as_raw(), owned.len() as c_int, ptrs.as_ptr())
            }
        };
        if code == NVRTC_SUCCESS {
            Ok(CompileStatus::Success)
        } else {
            Ok(CompileStatus::Failed { code })
        }
    }

    fn program_log(&self, program: Program) -> Result<String> {
        let mut size: usize = 0;
        // SAFETY: size is a valid out-pointer
        let code = unsafe { (self.fns.nvrtcGetProgramLogSize)(program.as_raw(), &mut size) };
        Self::check("nvrtcGetProgramLogSize", code)?;

        let mut buf = vec![0u8; size];
        // SAFETY: buf holds exactly the reported size
        let code =
            unsafe { (self.fns.nvrtcGetProgramLog)(program.as_raw(), buf.as_mut_ptr().cast()) };
        Self::check("nvrtcGetProgramLog", code)?;

        while buf.last() == Some(&0) {
            buf.pop();
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn ptx(&self, program: Program) -> Result<Vec<u8>> {
        let mut size: usize = 0;
        // SAFETY: size is a valid out-pointer
        let code = unsafe { (self.fns.nvrtcGetPTXSize)(program.as_raw(), &mut size) };
        Self::check("nvrtcGetPTXSize", code)?;

        let mut buf = vec![0u8; size];
        // SAFETY: buf holds exactly the reported size
        let code = unsafe { (self.fns.nvrtcGetPTX)(program.as_raw(), buf.as_mut_ptr().cast()) };
        Self::check("nvrtcGetPTX", code)?;
        Ok(buf)
    }

    fn destroy_program(&self, program: Program) -> Result<()> {
        let mut prog: NvrtcProgram = program.as_raw();
        // SAFETY: prog came from nvrtcCreateProgram
        let code = unsafe { (self.fns.nvrtcDestroyProgram)(&mut prog) };
        Self::check("nvrtcDestroyProgram", code)
    }
}

// ============================================================================
// Tests
// ============================================================================
