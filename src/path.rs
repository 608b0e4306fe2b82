use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

use crate::error::{FormatError, Result};

/// UTF-8 form of a name taken from the local filesystem.  Invalid bytes are
/// replaced and the substitution is logged: the restored name will differ.
pub fn utf8_name(part: &OsStr) -> String {
    match part.to_str() {
        Some(s) => s.to_owned(),
        None => {
            let lossy = part.to_string_lossy().into_owned();
            warn!(name = %lossy, "name is not valid UTF-8; storing a lossy copy");
            lossy
        }
    }
}

/// Archive-relative form of `file_path` below `base`: components joined by
/// `/` regardless of platform.
pub fn normalize_rel_path(base: &Path, file_path: &Path) -> Result<String> {
    let rel = file_path
        .strip_prefix(base)
        .map_err(|_| FormatError::UnsafePath(file_path.to_string_lossy().into_owned()))?;

    let mut out = String::new();
    for comp in rel.components() {
        if let Component::Normal(part) = comp {
            if !out.is_empty() {
                out.push('/');
            }
            out.push_str(&utf8_name(part));
        }
    }

    if out.is_empty() {
        return Err(FormatError::UnsafePath(file_path.to_string_lossy().into_owned()).into());
    }
    Ok(out)
}

/// Map a stored relative path onto the local filesystem.
///
/// Rejects anything that could land outside the extraction root: empty
/// paths, `.`/`..` segments and drive prefixes.  Backslashes are separators
/// on Windows and are refused there.
pub fn to_local_path(rel: &str) -> Result<PathBuf> {
    let unsafe_path = || FormatError::UnsafePath(rel.to_owned());
    if rel.is_empty() || rel.starts_with('/') || (cfg!(windows) && rel.contains('\\')) {
        return Err(unsafe_path().into());
    }

    let mut out = PathBuf::new();
    for segment in rel.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(unsafe_path().into());
        }
        let mut comps = Path::new(segment).components();
        match (comps.next(), comps.next()) {
            (Some(Component::Normal(part)), None) => out.push(part),
            _ => return Err(unsafe_path().into()),
        }
    }
    Ok(out)
}

/// A stored extension is a single name fragment appended after a dot.  It
/// may be empty but never contains a separator or NUL, and is never `.` or
/// `..`.
pub fn validate_extension(ext: &str) -> Result<()> {
    if ext == "." || ext == ".." || ext.contains(['/', '\\', '\0']) {
        return Err(FormatError::UnsafePath(format!("extension {ext:?}")).into());
    }
    Ok(())
}

/// Leading segment of a stored relative path, or `""` for a bare filename.
pub fn top_segment(rel: &str) -> &str {
    match rel.find('/') {
        Some(pos) => &rel[..pos],
        None      => "",
    }
}

/// Final segment of a stored relative path.
pub fn file_name(rel: &str) -> &str {
    rel.rsplit('/').next().unwrap_or(rel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn normalizes_nested_paths_with_forward_slashes() {
        let base = Path::new("/data/in");
        let file = Path::new("/data/in/photos/2024/cat.jpg");
        assert_eq!(normalize_rel_path(base, file).unwrap(), "photos/2024/cat.jpg");
        assert!(normalize_rel_path(base, Path::new("/elsewhere/x")).is_err());
        assert!(normalize_rel_path(base, base).is_err());
    }

    #[test]
    fn rejects_paths_that_escape_the_root() {
        for bad in ["", "/etc/passwd", "a/../../b", "..", "a//b", "./a", "a/"] {
            assert!(to_local_path(bad).is_err(), "{bad:?} should be rejected");
        }
        assert_eq!(to_local_path("a/b/c.txt").unwrap(), Path::new("a").join("b").join("c.txt"));
        assert_eq!(to_local_path("ünïcødé/文件.md").unwrap(), Path::new("ünïcødé").join("文件.md"));
    }

    #[test]
    fn extensions_cannot_carry_path_syntax() {
        for bad in ["/..", "x/../../../pwned", "a\\b", "nul\0", ".", ".."] {
            let err = validate_extension(bad).unwrap_err();
            assert!(matches!(err, Error::Format(FormatError::UnsafePath(_))), "{bad:?}");
        }
        for ok in ["", "txt", "tar.gz", "文"] {
            validate_extension(ok).unwrap();
        }
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_names_are_replaced() {
        use std::os::unix::ffi::OsStrExt;
        assert_eq!(utf8_name(OsStr::from_bytes(b"ok.txt")), "ok.txt");
        assert_eq!(utf8_name(OsStr::from_bytes(b"\xffcat.txt")), "\u{fffd}cat.txt");
    }

    #[test]
    fn segments() {
        assert_eq!(top_segment("a/b/c"), "a");
        assert_eq!(top_segment("c"), "");
        assert_eq!(file_name("a/b/c.txt"), "c.txt");
        assert_eq!(file_name("c.txt"), "c.txt");
    }
}
