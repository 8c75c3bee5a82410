//! Raw CUDA driver and NVRTC type definitions
//!
//! Hand-written declarations for the handful of entry points the session
//! needs. No external binding generator; dynamic loading happens in the
//! sibling `cuda` / `nvrtc` modules.

use std::ffi::c_void;
use std::os::raw::c_int;

// ============================================================================
// CUDA Driver Types (from cuda.h)
// ============================================================================

/// CUDA driver result code
pub type CUresult = c_int;

/// CUDA device handle
pub type CUdevice = c_int;

/// CUDA context handle (opaque pointer)
pub type CUcontext = *mut c_void;

/// CUDA module handle (opaque pointer)
pub type CUmodule = *mut c_void;

/// CUDA function handle (opaque pointer)
pub type CUfunction = *mut c_void;

/// CUDA success
pub const CUDA_SUCCESS: CUresult = 0;
/// Invalid value passed
pub const CUDA_ERROR_INVALID_VALUE: CUresult = 1;
/// Out of memory
pub const CUDA_ERROR_OUT_OF_MEMORY: CUresult = 2;
/// CUDA not initialized
pub const CUDA_ERROR_NOT_INITIALIZED: CUresult = 3;
/// No CUDA device
pub const CUDA_ERROR_NO_DEVICE: CUresult = 100;
/// Invalid device ordinal
pub const CUDA_ERROR_INVALID_DEVICE: CUresult = 101;
/// Invalid PTX passed to the module loader
pub const CUDA_ERROR_INVALID_PTX: CUresult = 218;
/// Invalid context
pub const CUDA_ERROR_INVALID_CONTEXT: CUresult = 201;
/// Named symbol not found in module
pub const CUDA_ERROR_NOT_FOUND: CUresult = 500;

/// cuDeviceGetAttribute selector: compute capability major
pub const CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MAJOR: c_int = 75;
/// cuDeviceGetAttribute selector: compute capability minor
pub const CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MINOR: c_int = 76;

/// Convert a CUDA driver result code to its symbolic name
#[must_use]
pub fn cuda_result_name(code: CUresult) -> &'static str {
    match code {
        CUDA_SUCCESS => "CUDA_SUCCESS",
        CUDA_ERROR_INVALID_VALUE => "CUDA_ERROR_INVALID_VALUE",
        CUDA_ERROR_OUT_OF_MEMORY => "CUDA_ERROR_OUT_OF_MEMORY",
        CUDA_ERROR_NOT_INITIALIZED => "CUDA_ERROR_NOT_INITIALIZED",
        CUDA_ERROR_NO_DEVICE => "CUDA_ERROR_NO_DEVICE",
        CUDA_ERROR_INVALID_DEVICE => "CUDA_ERROR_INVALID_DEVICE",
        CUDA_ERROR_INVALID_CONTEXT => "CUDA_ERROR_INVALID_CONTEXT",
        CUDA_ERROR_INVALID_PTX => "CUDA_ERROR_INVALID_PTX",
        CUDA_ERROR_NOT_FOUND => "CUDA_ERROR_NOT_FOUND",
        _ => "CUDA_ERROR_UNKNOWN",
    }
}

// ============================================================================
// NVRTC Types (from nvrtc.h)
// ============================================================================

/// NVRTC result code
pub type NvrtcResult = c_int;

/// NVRTC program handle (opaque pointer)
pub type NvrtcProgram = *mut c_void;

/// NVRTC success
pub const NVRTC_SUCCESS: NvrtcResult = 0;
/// Out of memory
pub const NVRTC_ERROR_OUT_OF_MEMORY: NvrtcResult = 1;
/// Program creation failed
pub const NVRTC_ERROR_PROGRAM_CREATION_FAILURE: NvrtcResult = 2;
/// Invalid input to an NVRTC call
pub const NVRTC_ERROR_INVALID_INPUT: NvrtcResult = 3;
/// Invalid program handle
pub const NVRTC_ERROR_INVALID_PROGRAM: NvrtcResult = 4;
/// Invalid compiler option
pub const NVRTC_ERROR_INVALID_OPTION: NvrtcResult = 5;
/// Source failed to compile (program log available)
pub const NVRTC_ERROR_COMPILATION: NvrtcResult = 6;

/// Convert an NVRTC result code to its symbolic name
#[must_use]
pub fn nvrtc_result_name(code: NvrtcResult) -> &'static str {
    match code {
        NVRTC_SUCCESS => "NVRTC_SUCCESS",
        NVRTC_ERROR_OUT_OF_MEMORY => "NVRTC_ERROR_OUT_OF_MEMORY",
        NVRTC_ERROR_PROGRAM_CREATION_FAILURE => "NVRTC_ERROR_PROGRAM_CREATION_FAILURE",
        NVRTC_ERROR_INVALID_INPUT => "NVRTC_ERROR_INVALID_INPUT",
        NVRTC_ERROR_INVALID_PROGRAM => "NVRTC_ERROR_INVALID_PROGRAM",
        NVRTC_ERROR_INVALID_OPTION => "NVRTC_ERROR_INVALID_OPTION",
        NVRTC_ERROR_COMPILATION => "NVRTC_ERROR_COMPILATION",
        _ => "NVRTC_ERROR_UNKNOWN",
    }
}

// ============================================================================
// Tests
// ============================================================================
