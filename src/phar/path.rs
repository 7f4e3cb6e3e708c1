//! Lexical cleaning of entry names.

/// Clean a `/`-separated archive path without touching the filesystem.
///
/// Repeated separators and `.` elements are dropped, and each `..` removes
/// the element before it. A `..` with nothing to remove is kept for relative
/// paths and dropped at the root. A trailing separator is removed; an empty
/// result becomes `"."`.
pub fn clean_path(path: &str) -> String {
    String::from_utf8_lossy(&clean_path_bytes(path.as_bytes())).into_owned()
}

/// [`clean_path`] over raw bytes; only `/` and `.` are interpreted, so
/// names that are not UTF-8 come through unchanged.
pub fn clean_path_bytes(path: &[u8]) -> Vec<u8> {
    let rooted = path.starts_with(b"/");
    let mut parts: Vec<&[u8]> = Vec::new();

    for part in path.split(|&b| b == b'/') {
        match part {
            b"" | b"." => {}
            b".." => match parts.last() {
                Some(&last) if last != b".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(b".."),
            },
            _ => parts.push(part),
        }
    }

    let joined = parts.join(&b'/');
    match (rooted, joined.is_empty()) {
        (true, _) => [b"/".as_slice(), joined.as_slice()].concat(),
        (false, true) => b".".to_vec(),
        (false, false) => joined,
    }
}
