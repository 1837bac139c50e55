//! Gnosis Safe `getOwners()` call shape.
//!
//! The return value is a dynamic `address[]`: one word of offset, one word of
//! length, then one word per owner with the address in the low 20 bytes.

use anyhow::{bail, Result};

/// Pre-encoded calldata for `getOwners()` — selector only, no arguments.
pub const GET_OWNERS_CALLDATA: &str = "0xa0e67e2b";

const WORD_HEX: usize = 64;

/// Decode the `address[]` returned by `getOwners()` into lowercased
/// `0x`-prefixed addresses.
pub fn decode_owners(result: &str) -> Result<Vec<String>> {
    let bare = result.trim_start_matches("0x");
    if bare.is_empty() {
        return Ok(vec![]);
    }
    if bare.len() % WORD_HEX != 0 || !bare.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("malformed getOwners return data");
    }
    let words: Vec<&str> = (0..bare.len())
        .step_by(WORD_HEX)
        .map(|i| &bare[i..i + WORD_HEX])
        .collect();
    if words.len() < 2 {
        bail!("getOwners return data too short");
    }

    // words[0] is the array offset (always 0x20 for a single return value);
    // words[1] is the element count.
    let count = usize::from_str_radix(words[1].trim_start_matches('0'), 16).unwrap_or(0);
    if words.len() < 2 + count {
        bail!(
            "getOwners return data truncated: {} owners declared, {} words present",
            count,
            words.len() - 2
        );
    }

    let mut owners = Vec::with_capacity(count);
    for word in &words[2..2 + count] {
        // Address occupies the low 20 bytes (last 40 hex chars) of the word.
        let addr = &word[WORD_HEX - 40..];
        owners.push(format!("0x{}", addr.to_ascii_lowercase()));
    }
    Ok(owners)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_for(addr: &str) -> String {
        format!("{:0>64}", addr.trim_start_matches("0x"))
    }

    #[test]
    fn decodes_two_owner_safe() {
        let a = "d8da6bf26964af9d7eed9e03e53415d37aa96045";
        let b = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
        let data = format!(
            "0x{:064x}{:064x}{}{}",
            0x20,
            2,
            word_for(a),
            word_for(b)
        );
        let owners = decode_owners(&data).unwrap();
        assert_eq!(owners, vec![format!("0x{a}"), format!("0x{b}")]);
    }

    #[test]
    fn decodes_empty_owner_set() {
        let data = format!("0x{:064x}{:064x}", 0x20, 0);
        assert_eq!(decode_owners(&data).unwrap(), Vec::<String>::new());
        assert_eq!(decode_owners("0x").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn rejects_truncated_data() {
        // Declares 3 owners but carries only 1 word of them.
        let data = format!(
            "0x{:064x}{:064x}{}",
            0x20,
            3,
            word_for("d8da6bf26964af9d7eed9e03e53415d37aa96045")
        );
        assert!(decode_owners(&data).is_err());
    }

    #[test]
    fn rejects_unaligned_data() {
        assert!(decode_owners("0xabcdef").is_err());
    }
}
