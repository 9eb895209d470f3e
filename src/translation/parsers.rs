/// Whether `pattern` occurs in `bytes` at `idx`.
pub(super) fn at(bytes: &[u8], idx: usize, pattern: &[u8]) -> bool {
    bytes.get(idx..).is_some_and(|rest| rest.starts_with(pattern))
}

/// The tag of a dollar-quote opener at `start` (`$$` or `$tag$`), with the index of its
/// closing `$`.
pub(super) fn dollar_tag(bytes: &[u8], start: usize) -> Option<(&str, usize)> {
    let body = bytes.get(start + 1..)?;
    // `$1` is a positional parameter
    if body.first().is_some_and(u8::is_ascii_digit) {
        return None;
    }
    let len = body
        .iter()
        .position(|b| !(b.is_ascii_alphanumeric() || *b == b'_'))?;
    if body[len] != b'$' {
        return None;
    }
    let tag = std::str::from_utf8(&body[..len]).ok()?;
    Some((tag, start + 1 + len))
}

/// End of the digit run right after the sigil at `idx`, or `None` when no digit follows.
pub(super) fn digits_after(bytes: &[u8], idx: usize) -> Option<usize> {
    let body = bytes.get(idx + 1..)?;
    let len = body.iter().take_while(|b| b.is_ascii_digit()).count();
    (len > 0).then_some(idx + 1 + len)
}

/// Whether the `$` at `idx` starts the closer `$tag$`.
pub(super) fn closes_dollar_tag(bytes: &[u8], idx: usize, tag: &str) -> bool {
    let end = idx + 1 + tag.len();
    at(bytes, idx + 1, tag.as_bytes()) && bytes.get(end) == Some(&b'$')
}
