//! Consensus name normalization.
//!
//! At and after the normalization fork, name keys are NFD-decomposed and
//! case-folded (C/F full folding). Invalid UTF-8 sequences pass through
//! undecomposed and suppress the fold for the whole name, matching the
//! reference behavior for malformed historical names.

use std::borrow::Cow;

use unicode_normalization::UnicodeNormalization;

use crate::params::Params;
use crate::types::Height;

/// Normalize `name` only when `height` has reached the normalization fork.
pub fn normalize_if_necessary(name: &[u8], height: Height) -> Cow<'_, [u8]> {
    if height < Params::active().normalized_name_fork_height {
        return Cow::Borrowed(name);
    }
    normalize(name)
}

/// NFD-decompose and case-fold a name.
///
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(name: &[u8]) -> Cow<'_, [u8]> {
    if name.is_ascii() && !name.iter().any(u8::is_ascii_uppercase) {
        // Lowercase ASCII is a fixed point; skip the allocation.
        return Cow::Borrowed(name);
    }

    let mut decomposed = Vec::with_capacity(name.len());
    let mut fully_valid = true;
    for chunk in name.utf8_chunks() {
        decomposed.extend(chunk.valid().nfd().collect::<String>().into_bytes());
        let invalid = chunk.invalid();
        if !invalid.is_empty() {
            fully_valid = false;
            decomposed.extend_from_slice(invalid);
        }
    }

    if !fully_valid {
        // Mixed or malformed encodings keep their decomposed bytes unfolded.
        return Cow::Owned(decomposed);
    }

    match std::str::from_utf8(&decomposed) {
        Ok(s) => Cow::Owned(caseless::default_case_fold_str(s).into_bytes()),
        Err(_) => Cow::Owned(decomposed),
    }
}
