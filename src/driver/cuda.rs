//! Dynamically loaded CUDA driver
//!
//! Resolves the ten driver entry points the session needs from `libcuda`,
//! loaded at setup time rather than link time so the crate builds and runs
//! on machines without the driver installed.
//!
//! The library handle lives inside [`CudaDriver`] (not a process-global) so
//! a failed setup drops everything and the next invocation can retry the
//! load from scratch.

use std::ffi::CStr;
use std::ffi::CString;
use std::os::raw::{c_char, c_int, c_uint, c_void};
use std::path::Path;
use std::ptr;

use libloading::{Library, Symbol};

use super::sys::{
    cuda_result_name, CUcontext, CUdevice, CUfunction, CUmodule, CUresult, CUDA_ERROR_INVALID_VALUE,
    CUDA_SUCCESS, CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MAJOR,
    CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MINOR,
};
use super::{Context, Device, DeviceApi, Function, Module};
use crate::error::{Result, SessionError};

/// Library file name used in diagnostics and toolkit-path joins
const LIBRARY: &str = "libcuda.so";

/// Sonames tried in order when no toolkit path override is given
const CANDIDATES: &[&str] = &["libcuda.so.1", "libcuda.so"];

// ============================================================================
// Function Pointer Table
// ============================================================================

#[allow(non_snake_case)]
struct CudaFns {
    cuInit: unsafe extern "C" fn(flags: c_uint) -> CUresult,
    cuDeviceGetCount: unsafe extern "C" fn(count: *mut c_int) -> CUresult,
    cuDeviceGet: unsafe extern "C" fn(device: *mut CUdevice, ordinal: c_int) -> CUresult,
    cuDeviceGetName: unsafe extern "C" fn(name: *mut c_char, len: c_int, device: CUdevice) -> CUresult,
    cuDeviceGetAttribute:
        unsafe extern "C" fn(value: *mut c_int, attrib: c_int, device: CUdevice) -> CUresult,
    cuCtxCreate: unsafe extern "C" fn(ctx: *mut CUcontext, flags: c_uint, device: CUdevice) -> CUresult,
    cuCtxSetCurrent: unsafe extern "C" fn(ctx: CUcontext) -> CUresult,
    cuModuleLoadData: unsafe extern "C" fn(module: *mut CUmodule, image: *const c_void) -> CUresult,
    cuModuleUnload: unsafe extern "C" fn(module: CUmodule) -> CUresult,
    cuModuleGetFunction:
        unsafe extern "C" fn(func: *mut CUfunction, module: CUmodule, name: *const c_char) -> CUresult,
}

/// Device-runtime implementation backed by `libcuda`
pub struct CudaDriver {
    fns: CudaFns,
    /// Keeps the resolved function pointers valid
    _lib: Library,
}

impl CudaDriver {
    /// Load `libcuda` and resolve the required entry points.
    ///
    /// With a toolkit directory override the library is taken from exactly
    /// that directory; otherwise well-known sonames are tried in order.
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

    /// Map a driver result code onto the session error taxonomy
    fn check(call: &'static str, code: CUresult) -> Result<()> {
        if code == CUDA_SUCCESS {
            Ok(())
        } else {
            Err(SessionError::Driver {
                call,
                name: cuda_result_name(code),
                code,
            })
        }
    }
}

/// Open a native library from a toolkit override or a soname candidate list
pub(super) fn open_library(
    toolkit_dir: Option<&Path>,
    file_name: &str,
    candidates: &[&str],
) -> Result<Library> {
    match toolkit_dir {
        Some(dir) => {
            let path = dir.join(file_name);
            // SAFETY: loading a driver library; its initializers are trusted
            unsafe { Library::new(&path) }.map_err(|e| SessionError::LibraryLoad {
                library: path.display().to_string(),
                reason: e.to_string(),
            })
        }
        None => {
            let mut last_error = None;
            for name in candidates {
                // SAFETY: loading a well-known system library
                match unsafe { Library::new(name) } {
                    Ok(lib) => return Ok(lib),
                    Err(e) => last_error = Some(e.to_string()),
                }
            }
            Err(SessionError::LibraryLoad {
                library: file_name.to_string(),
                reason: last_error.unwrap_or_else(|| "no candidate names".to_string()),
            })
        }
    }
}

macro_rules! resolve_sym {
    ($lib:expr, $library:expr, $symbol:ident, $ty:ty) => {{
        // SAFETY: the symbol signature matches the driver's documented ABI
        let sym: Symbol<'_, $ty> = unsafe { $lib.get(stringify!($symbol).as_bytes()) }.map_err(
            |e| SessionError::LibraryLoad {
                library: $library.to_string(),
                reason: format!("missing symbol {}: {}", stringify!($symbol), e),
            },
        )?;
        *sym
    }};
}

pub(super) use resolve_sym;

fn resolve_fns(lib: &Library) -> Result<CudaFns> {
    type FnInit = unsafe extern "C" fn(c_uint) -> CUresult;
    type FnDeviceGetCount = unsafe extern "C" fn(*mut c_int) -> CUresult;
    type FnDeviceGet = unsafe extern "C" fn(*mut CUdevice, c_int) -> CUresult;
    type FnDeviceGetName = unsafe extern "C" fn(*mut c_char, c_int, CUdevice) -> CUresult;
    type FnDeviceGetAttribute = unsafe extern "C" fn(*mut c_int, c_int, CUdevice) -> CUresult;
    type FnCtxCreate = unsafe extern "C" fn(*mut CUcontext, c_uint, CUdevice) -> CUresult;
    type FnCtxSetCurrent = unsafe extern "C" fn(CUcontext) -> CUresult;
    type FnModuleLoadData = unsafe extern "C" fn(*mut CUmodule, *const c_void) -> CUresult;
    type FnModuleUnload = unsafe extern "C" fn(CUmodule) -> CUresult;
    type FnModuleGetFunction =
        unsafe extern "C" fn(*mut CUfunction, CUmodule, *const c_char) -> CUresult;

    Ok(CudaFns {
        cuInit: resolve_sym!(lib, LIBRARY, cuInit, FnInit),
        cuDeviceGetCount: resolve_sym!(lib, LIBRARY, cuDeviceGetCount, FnDeviceGetCount),
        cuDeviceGet: resolve_sym!(lib, LIBRARY, cuDeviceGet, FnDeviceGet),
        cuDeviceGetName: resolve_sym!(lib, LIBRARY, cuDeviceGetName, FnDeviceGetName),
        cuDeviceGetAttribute: resolve_sym!(lib, LIBRARY, cuDeviceGetAttribute, FnDeviceGetAttribute),
        cuCtxCreate: resolve_sym!(lib, LIBRARY, cuCtxCreate_v2, FnCtxCreate),
        cuCtxSetCurrent: resolve_sym!(lib, LIBRARY, cuCtxSetCurrent, FnCtxSetCurrent),
        cuModuleLoadData: resolve_sym!(lib, LIBRARY, cuModuleLoadData, FnModuleLoadData),
        cuModuleUnload: resolve_sym!(lib, LIBRARY, cuModuleUnload, FnModuleUnload),
        cuModuleGetFunction: resolve_sym!(lib, LIBRARY, cuModuleGetFunction, FnModuleGetFunction),
    })
}

// ============================================================================
// DeviceApi
// ============================================================================

impl DeviceApi for CudaDriver {
    fn init(&self) -> Result<()> {
        // SAFETY: cuInit is safe to call repeatedly
        let code = unsafe { (self.fns.cuInit)(0) };
        Self::check("cuInit", code)
    }

    fn device_count(&self) -> Result<i32> {
        let mut count: c_int = 0;
        // SAFETY: count is a valid out-pointer
        let code = unsafe { (self.fns.cuDeviceGetCount)(&mut count) };
        Self::check("cuDeviceGetCount", code)?;
        Ok(count)
    }

    fn device(&self, ordinal: i32) -> Result<Device> {
        let mut device: CUdevice = 0;
        // SAFETY: device is a valid out-pointer
        let code = unsafe { (self.fns.cuDeviceGet)(&mut device, ordinal) };
        Self::check("cuDeviceGet", code)?;
        Ok(Device::from_raw(device))
    }

    fn device_name(&self, device: Device) -> Result<String> {
        let mut name = [0 as c_char; 256];
        // SAFETY: buffer is valid for 256 bytes
        let code = unsafe { (self.fns.cuDeviceGetName)(name.as_mut_ptr(), 256, device.as_raw()) };
        Self::check("cuDeviceGetName", code)?;
        // SAFETY: the driver NUL-terminates within the buffer
        let name = unsafe { CStr::from_ptr(name.as_ptr()) };
        Ok(name.to_string_lossy().into_owned())
    }

    fn compute_capability(&self, device: Device) -> Result<(i32, i32)> {
        let mut major: c_int = 0;
        let mut minor: c_int = 0;
        // SAFETY: out-pointers are valid, attribute selectors are constants
        let code = unsafe {
            (self.fns.cuDeviceGetAttribute)(
                &mut major,
                CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MAJOR,
                device.as_raw(),
            )
        };
        Self::check("cuDeviceGetAttribute", code)?;
        // SAFETY: as above
        let code = unsafe {
            (self.fns.cuDeviceGetAttribute)(
                &mut minor,
                CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MINOR,
                device.as_raw(),
            )
        };
        Self::check("cuDeviceGetAttribute", code)?;
        Ok((major, minor))
    }

    fn create_context(&self, device: Device) -> Result<Context> {
        let mut ctx: CUcontext = ptr::null_mut();
        // SAFETY: ctx is a valid out-pointer, device came from cuDeviceGet
        let code = unsafe { (self.fns.cuCtxCreate)(&mut ctx, 0, device.as_raw()) };
        Self::check("cuCtxCreate", code)?;
        Ok(Context::from_raw(ctx))
    }

    fn make_current(&self, context: Context) -> Result<()> {
        // SAFETY: context came from cuCtxCreate
        let code = unsafe { (self.fns.cuCtxSetCurrent)(context.as_raw()) };
        Self::check("cuCtxSetCurrent", code)
    }

    fn load_module(&self, ptx: &str) -> Result<Module> {
        let image = CString::new(ptx).map_err(|_| SessionError::Driver {
            call: "cuModuleLoadData",
            name: cuda_result_name(CUDA_ERROR_INVALID_VALUE),
            code: CUDA_ERROR_INVALID_VALUE,
        })?;
        let mut module: CUmodule = ptr::null_mut();
        // SAFETY: image is NUL-terminated PTX text
        let code =
            unsafe { (self.fns.cuModuleLoadData)(&mut module, image.as_ptr().cast::<c_void>()) };
        Self::check("cuModuleLoadData", code)?;
        Ok(Module::from_raw(module))
    }

    fn unload_module(&self, module: Module) -> Result<()> {
        // SAFETY: module came from cuModuleLoadData
        let code = unsafe { (self.fns.cuModuleUnload)(module.as_raw()) };
        Self::check("cuModuleUnload", code)
    }

    fn get_function(&self, module: Module, symbol: &str) -> Result<Function> {
        let symbol_c = CString::new(symbol).map_err(|_| SessionError::Driver {
            call: "cuModuleGetFunction",
            name: cuda_result_name(CUDA_ERROR_INVALID_VALUE),
            code: CUDA_ERROR_INVALID_VALUE,
        })?;
        let mut func: CUfunction = ptr::null_mut();
        // SAFETY: module is loaded, symbol_c is NUL-terminated
        let code =
            unsafe { (self.fns.cuModuleGetFunction)(&mut func, module.as_raw(), symbol_c.as_ptr()) };
        Self::check("cuModuleGetFunction", code)?;
        Ok(Function::from_raw(func))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_missing_toolkit_dir_fails() {
        let result = CudaDriver::load(Some(Path::new("/nonexistent/toolkit")));
        match result {
            Err(SessionError::LibraryLoad { library, .. }) => {
                assert!(library.contains("libcuda.so"));
            }
            Ok(_) => panic!("load from a missing directory must fail"),
            Err(other) => panic!("unexpected error kind: {other}"),
        }
    }

    #[test]
    fn test_check_maps_codes() {
        assert!(CudaDriver::check("cuInit", CUDA_SUCCESS).is_ok());
        let err = CudaDriver::check("cuInit", 100);
        match err {
            Err(SessionError::Driver { call, name, code }) => {
                assert_eq!(call, "cuInit");
                assert_eq!(name, "CUDA_ERROR_NO_DEVICE");
                assert_eq!(code, 100);
            }
            _ => panic!("expected a driver error"),
        }
    }
}
