//! Kernel symbol extraction from PTX
//!
//! The compiler marks every exported kernel with a `// .globl <symbol>`
//! directive comment. Scanning those lines recovers the entry points to
//! bind, in the order the compiler emitted them.

use std::sync::OnceLock;

use regex::Regex;

fn globl_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"// \.globl\s+(\w+)").expect("globl pattern"))
}

/// Extract exported kernel symbols from PTX text, in encounter order.
///
/// No deduplication is performed; compiler output carries one directive per
/// kernel.
#[must_use]
pub fn extract_symbols(ptx: &str) -> Vec<String> {
    let mut symbols = Vec::new();
    for line in ptx.lines() {
        if let Some(caps) = globl_pattern().captures(line) {
            if let Some(m) = caps.get(1) {
                symbols.push(m.as_str().to_string());
            }
        }
    }
    symbols
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_PTX: &str = "\
//
// Generated by NVIDIA NVVM Compiler
//
.version 8.3
.target sm_80
.address_size 64

	// .globl	_Z3addPfS_

.visible .entry _Z3addPfS_(
	.param .u64 _Z3addPfS__param_0,
	.param .u64 _Z3addPfS__param_1
)
{
	ret;
}
	// .globl	_Z5scalePff
.visible .entry _Z5scalePff()
{
	ret;
}
";

    #[test]
    fn test_extracts_in_emission_order() {
        let symbols = extract_symbols(SAMPLE_PTX);
        assert_eq!(symbols, ["_Z3addPfS_", "_Z5scalePff"]);
    }

    #[test]
    fn test_no_directives() {
        assert!(extract_symbols(".version 8.3\n.target sm_80\n").is_empty());
    }

    #[test]
    fn test_entry_lines_are_not_matched() {
        // Only the directive comment counts, not the .entry declaration
        let ptx = ".visible .entry _Z3addPfS_()\n";
        assert!(extract_symbols(ptx).is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(extract_symbols("").is_empty());
    }
}
