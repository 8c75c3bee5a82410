//! The compile protocol
//!
//! One artifact per invocation: create a program under a fixed virtual
//! filename, compile with the accumulated raw options, and either retrieve
//! the PTX or surface the program log. Failed compiles retain nothing on the
//! compiler side; the consumed artifact index is the only durable trace.

use tracing::debug;

use crate::driver::{sys::nvrtc_result_name, CompileStatus, CompilerApi, Program};
use crate::error::{Result, SessionError};
use crate::include::IncludeSet;
use crate::options::CompileOptions;

/// Virtual filename compiler diagnostics refer to
pub const VIRTUAL_FILENAME: &str = "cujit_cell.cu";

/// One invocation's compiled output
#[derive(Debug)]
pub struct CompiledArtifact {
    /// Session-unique artifact index, consumed even by failed compiles
    pub index: u64,
    /// Raw PTX bytes as returned by the compiler (may carry a trailing NUL)
    ptx: Vec<u8>,
    /// The cell source this artifact was compiled from
    pub source: String,
}

impl CompiledArtifact {
    /// PTX as text, size-bounded with trailing NULs trimmed
    #[must_use]
    pub fn ptx_text(&self) -> String {
        let mut end = self.ptx.len();
        while end > 0 && self.ptx[end - 1] == 0 {
            end -= 1;
        }
        String::from_utf8_lossy(&self.ptx[..end]).into_owned()
    }

    /// Size of the raw PTX buffer in bytes
    #[must_use]
    pub fn size(&self) -> usize {
        self.ptx.len()
    }

    #[cfg(test)]
    pub(crate) fn from_ptx_bytes(index: u64, ptx: &[u8]) -> Self {
        Self {
            index,
            ptx: ptx.to_vec(),
            source: String::new(),
        }
    }
}

/// Run the compile protocol for one invocation.
///
/// `index` has already been allocated by the session; it is consumed whether
/// or not the compile succeeds.
///
/// # Errors
///
/// Returns [`SessionError::Compile`] with the program log when the source
/// fails to compile, or the underlying protocol error when any other step
/// fails. The program is destroyed on every path.
pub fn compile(
    api: &dyn CompilerApi,
    index: u64,
    source: &str,
    includes: &IncludeSet,
    options: &CompileOptions,
) -> Result<CompiledArtifact> {
    debug!(index, headers = includes.len(), options = options.raw.len(), "compiling cell");
    let program = api.create_program(source, VIRTUAL_FILENAME, includes)?;

    let outcome = run_protocol(api, program, source, options, index);
    // Destroy on every path; a failed destroy must not mask the real outcome
    let destroyed = api.destroy_program(program);
    let artifact = outcome?;
    destroyed?;
    Ok(artifact)
}

fn run_protocol(
    api: &dyn CompilerApi,
    program: Program,
    source: &str,
    options: &CompileOptions,
    index: u64,
) -> Result<CompiledArtifact> {
    match api.compile_program(program, &options.raw)? {
        CompileStatus::Success => {}
        CompileStatus::Failed { code } => {
            let log = api
                .program_log(program)
                .unwrap_or_else(|e| format!("(program log unavailable: {e})"));
            return Err(SessionError::Compile {
                log: format!("{}\n{log}", nvrtc_result_name(code)),
            });
        }
    }

    let ptx = api.ptx(program)?;
    Ok(CompiledArtifact {
        index,
        ptx,
        source: source.to_string(),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{CompileStatus, Program};
    use std::cell::RefCell;

    /// Scripted compiler for protocol tests
    struct ScriptedCompiler {
        status: CompileStatus,
        log: &'static str,
        ptx: &'static [u8],
        destroyed: RefCell<Vec<Program>>,
        seen_options: RefCell<Vec<String>>,
    }

    impl ScriptedCompiler {
        fn succeeding(ptx: &'static [u8]) -> Self {
            Self {
                status: CompileStatus::Success,
                log: "",
                ptx,
                destroyed: RefCell::new(Vec::new()),
                seen_options: RefCell::new(Vec::new()),
            }
        }

        fn failing(log: &'static str) -> Self {
            Self {
                status: CompileStatus::Failed { code: 6 },
                log,
                ptx: b"",
                destroyed: RefCell::new(Vec::new()),
                seen_options: RefCell::new(Vec::new()),
            }
        }
    }

    impl CompilerApi for ScriptedCompiler {
        fn create_program(
            &self,
            _source: &str,
            _name: &str,
            _includes: &IncludeSet,
        ) -> Result<Program> {
            Ok(Program::from_raw(0x10 as *mut _))
        }

        fn compile_program(&self, _program: Program, options: &[String]) -> Result<CompileStatus> {
            self.seen_options.borrow_mut().extend(options.iter().cloned());
            Ok(self.status)
        }

        fn program_log(&self, _program: Program) -> Result<String> {
            Ok(self.log.to_string())
        }

        fn ptx(&self, _program: Program) -> Result<Vec<u8>> {
            Ok(self.ptx.to_vec())
        }

        fn destroy_program(&self, program: Program) -> Result<()> {
            self.destroyed.borrow_mut().push(program);
            Ok(())
        }
    }

    #[test]
    fn test_success_yields_artifact_and_destroys_program() {
        let api = ScriptedCompiler::succeeding(b".version 8.3\0");
        let artifact = compile(
            &api,
            1,
            "__global__ void k() {}",
            &IncludeSet::default(),
            &CompileOptions::default(),
        )
        .unwrap();
        assert_eq!(artifact.index, 1);
        assert_eq!(artifact.ptx_text(), ".version 8.3");
        assert_eq!(api.destroyed.borrow().len(), 1);
    }

    #[test]
    fn test_failure_surfaces_log_and_destroys_program() {
        let api = ScriptedCompiler::failing("cujit_cell.cu(1): error: expected a \";\"");
        let err = compile(
            &api,
            2,
            "__global__ void broken(",
            &IncludeSet::default(),
            &CompileOptions::default(),
        )
        .unwrap_err();
        match err {
            SessionError::Compile { log } => {
                assert!(log.starts_with("NVRTC_ERROR_COMPILATION"));
                assert!(log.contains("expected a \";\""));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(api.destroyed.borrow().len(), 1);
    }

    #[test]
    fn test_options_passed_through_in_order() {
        let api = ScriptedCompiler::succeeding(b"");
        let options = CompileOptions {
            raw: vec!["-O3".to_string(), "--use_fast_math".to_string()],
            report_device_info: false,
        };
        compile(&api, 1, "", &IncludeSet::default(), &options).unwrap();
        assert_eq!(*api.seen_options.borrow(), ["-O3", "--use_fast_math"]);
    }

    #[test]
    fn test_ptx_text_trims_only_trailing_nuls() {
        let api = ScriptedCompiler::succeeding(b".target\0sm_80\0\0");
        let artifact = compile(&api, 1, "", &IncludeSet::default(), &CompileOptions::default())
            .unwrap();
        assert_eq!(artifact.ptx_text(), ".target\u{0}sm_80");
        assert_eq!(artifact.size(), 15);
    }
}
