//! Error types for compile-session operations
//!
//! Failures fall into two native result-code domains (NVRTC vs CUDA driver)
//! plus the host-side failures that can happen before any native call is made
//! (include file I/O, dynamic library loading).

use thiserror::Error;

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors that can occur while compiling device source and binding kernels
#[derive(Error, Debug)]
pub enum SessionError {
    /// An `#include`d file could not be read.
    ///
    /// Always fatal to the current invocation; a partially resolved include
    /// set is never handed to the compiler.
    #[error("could not open include file {path}")]
    Include {
        /// Header identifier exactly as written in the source
        path: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// A native library or one of its symbols failed to load.
    ///
    /// Occurs only during one-time setup. The session stays uninitialized so
    /// the next invocation retries the whole setup from scratch.
    #[error("could not load {library}: {reason}")]
    LibraryLoad {
        /// Library file name that failed
        library: String,
        /// Loader error text
        reason: String,
    },

    /// Device source failed to compile.
    ///
    /// Carries the full program log retrieved from the compiler. The
    /// invocation aborts; no kernel registration occurs.
    #[error("device compilation failed:\n{log}")]
    Compile {
        /// Compiler diagnostic log, status line first
        log: String,
    },

    /// A CUDA driver call returned a non-success code.
    #[error("{call}: {name} (code {code})")]
    Driver {
        /// Driver entry point that failed
        call: &'static str,
        /// Symbolic name of the result code
        name: &'static str,
        /// Numeric result code
        code: i32,
    },

    /// An NVRTC protocol call other than the compile itself failed
    /// (program creation, log or PTX retrieval).
    #[error("{call}: {name} (code {code})")]
    Nvrtc {
        /// NVRTC entry point that failed
        call: &'static str,
        /// Symbolic name of the result code
        name: &'static str,
        /// Numeric result code
        code: i32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_include_error_names_path() {
        let err = SessionError::Include {
            path: "helpers.cuh".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.to_string().contains("helpers.cuh"));
    }

    #[test]
    fn test_compile_error_carries_log() {
        let err = SessionError::Compile {
            log: "kernel.cu(3): error: identifier \"foo\" is undefined".to_string(),
        };
        assert!(err.to_string().contains("identifier \"foo\""));
    }

    #[test]
    fn test_driver_error_display() {
        let err = SessionError::Driver {
            call: "cuModuleLoadData",
            name: "CUDA_ERROR_INVALID_PTX",
            code: 218,
        };
        let text = err.to_string();
        assert!(text.contains("cuModuleLoadData"));
        assert!(text.contains("218"));
    }
}
