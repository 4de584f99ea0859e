//! Decoding of the text log the PDC002 firmware keeps in its memory.
//!
//! Messages are NUL-terminated strings. Unwritten flash reads back as `0xff`, which is treated as
//! a terminator as well.

/// Splits a raw memory read into the non-empty messages it contains.
///
/// # Examples
///
/// ```rust
/// let raw = b"boot\0pd attach\0\xff\xff";
/// assert_eq!(pdc002::messages::decode(raw), vec!["boot", "pd attach"]);
/// ```
pub fn decode(data: &[u8]) -> Vec<String> {
    data.split(|&byte| byte == 0x00 || byte == 0xff)
        .filter(|message| !message.is_empty())
        .map(|message| String::from_utf8_lossy(message).into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_both_terminators() {
        let raw = b"\xff\xffone\0\0two\xffthree";
        assert_eq!(decode(raw), vec!["one", "two", "three"]);
    }

    #[test]
    fn erased_memory_has_no_messages() {
        assert!(decode(&[0xff; 64]).is_empty());
        assert!(decode(&[]).is_empty());
    }
}
