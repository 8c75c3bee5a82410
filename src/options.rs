//! Invocation-line parsing
//!
//! The line in front of a cell carries whitespace-delimited flags in any
//! order: `-GPUInfo`, repeatable `-co <value>` pairs, and an optional
//! `-cudaPath <dir>` toolkit override. Unrecognized tokens are silently
//! ignored and option values are passed through to the compiler unvalidated.

/// Per-invocation compile options, rebuilt from the raw line every time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Raw compiler options in encounter order, duplicates preserved
    pub raw: Vec<String>,
    /// Whether to emit the device inventory report this invocation
    pub report_device_info: bool,
}

/// Result of scanning one invocation line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLine {
    /// Compiler options and flags
    pub options: CompileOptions,
    /// Normalized toolkit directory override, if `-cudaPath` was given
    pub toolkit_dir: Option<String>,
}

/// Scan an invocation line. Never fails.
#[must_use]
pub fn parse_line(line: &str) -> ParsedLine {
    let mut parsed = ParsedLine::default();
    let mut tokens = line.split_whitespace();

    while let Some(token) = tokens.next() {
        match token {
            "-GPUInfo" => parsed.options.report_device_info = true,
            "-co" => {
                if let Some(value) = tokens.next() {
                    parsed.options.raw.push(value.to_string());
                }
            }
            "-cudaPath" => {
                if let Some(dir) = tokens.next() {
                    parsed.toolkit_dir = Some(normalize_toolkit_dir(dir));
                }
            }
            _ => {}
        }
    }
    parsed
}

/// Normalize a toolkit directory to start and end with a path separator
fn normalize_toolkit_dir(dir: &str) -> String {
    let mut path = String::new();
    if !dir.starts_with('/') {
        path.push('/');
    }
    path.push_str(dir);
    if !path.ends_with('/') {
        path.push('/');
    }
    path
}

// ============================================================================
// Tests
// ============================================================================


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Parsing never panics on arbitrary input
        #[test]
        fn prop_parse_total(line in ".*") {
            let _ = parse_line(&line);
        }

        /// Every parsed option came verbatim from the line
        #[test]
        fn prop_options_are_line_tokens(line in "[ a-zA-Z0-9_=-]*") {
            let parsed = parse_line(&line);
            let tokens: Vec<&str> = line.split_whitespace().collect();
            for opt in &parsed.options.raw {
                prop_assert!(tokens.contains(&opt.as_str()));
            }
        }
    }
}
