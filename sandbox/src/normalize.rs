//! Phase 0: canonicalization of candidate commands.
//!
//! Every later phase sees only the string produced here. Homoglyph and
//! zero-width-splitting evasions are dead on arrival: NFKD folds compatibility
//! characters onto their ASCII skeletons, invisible format characters are
//! deleted, and anything still outside ASCII is refused.

use unicode_normalization::UnicodeNormalization;

use crate::SandboxError;

/// Produce the canonical ASCII form of a raw command string.
///
/// Steps, in order: Unicode NFKD, deletion of zero-width/format characters,
/// rejection of any residual non-ASCII character.
pub fn normalize_command(raw: &str) -> Result<String, SandboxError> {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.nfkd() {
        if is_invisible_format(ch) {
            continue;
        }
        if !ch.is_ascii() {
            return Err(SandboxError::NonAsciiCommand {
                detail: format!("U+{:04X}", ch as u32),
            });
        }
        out.push(ch);
    }
    Ok(out)
}

/// Zero-width and directional-format characters that survive NFKD.
fn is_invisible_format(c: char) -> bool {
    matches!(
        c,
        '\u{00ad}'                    // soft hyphen
            | '\u{061c}'              // Arabic letter mark
            | '\u{200b}'..='\u{200f}' // ZWSP, ZWNJ, ZWJ, LRM, RLM
            | '\u{202a}'..='\u{202e}' // LRE..RLO
            | '\u{2060}'..='\u{2064}' // word joiner, invisible operators
            | '\u{2066}'..='\u{2069}' // LRI..PDI
            | '\u{feff}'              // BOM
    )
}
