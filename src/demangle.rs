//! Kernel symbol demangling
//!
//! Compiled kernels export Itanium-mangled symbols (`_Z3addPfS_`). Handles
//! need a host-visible display name, so the mangled base name and the
//! argument encoding are folded into `base__encoding`.
//!
//! Only the simplified length-prefix convention is decoded here; this is
//! deliberately not a full ABI demangler. The [`Demangle`] trait is the seam
//! for swapping in a complete one.

use tracing::warn;

/// Produces a display name for a mangled kernel symbol.
///
/// Implementations must be total: a malformed symbol degrades to a
/// best-effort (possibly empty) name rather than failing the invocation.
pub trait Demangle {
    /// Decode `mangled` into a display name
    fn demangle(&self, mangled: &str) -> String;
}

/// The simplified length-prefix scheme: strip the two-character `_Z`
/// prefix, consume decimal digits as the base-name length, take that many
/// characters as the base name, and treat the rest as the argument
/// encoding. Output is `base__encoding`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrefixLengthDemangler;

impl Demangle for PrefixLengthDemangler {
    fn demangle(&self, mangled: &str) -> String {
        let Some(rest) = mangled.get(2..) else {
            warn!(symbol = mangled, "symbol too short to demangle");
            return String::new();
        };

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let length = match rest[..digits].parse::<usize>() {
            Ok(n) => n,
            Err(_) => {
                warn!(symbol = mangled, "symbol has no length prefix");
                0
            }
        };

        let tail = &rest[digits..];
        let take = length.min(tail.len());
        if take < length {
            warn!(symbol = mangled, length, "length prefix overruns symbol");
        }
        format!("{}__{}", &tail[..take], &tail[take..])
    }
}

// ============================================================================
// Tests
// ============================================================================


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Demangling is total over ASCII symbol-like inputs
        #[test]
        fn prop_demangle_total(s in "[_A-Za-z0-9]{0,40}") {
            let _ = PrefixLengthDemangler.demangle(&s);
        }

        /// Well-formed symbols round-trip their base name
        #[test]
        fn prop_well_formed_base_recovered(
            base in "[a-zA-Z][a-zA-Z0-9]{0,20}",
            encoding in "[A-Za-z_]{0,8}",
        ) {
            let mangled = format!("_Z{}{}{}", base.len(), base, encoding);
            let display = PrefixLengthDemangler.demangle(&mangled);
            prop_assert_eq!(display, format!("{}__{}", base, encoding));
        }
    }
}
