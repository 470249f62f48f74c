use std::borrow::Cow;
use std::path::Path;

use anyhow::{Context, Result};

/// `Some(contents)` if the baseline exists, `None` if it does not.
pub fn read_baseline(path: &Path) -> Result<Option<String>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("read baseline: {}", path.display())),
    }
}

pub fn write_baseline(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents.as_bytes())
        .with_context(|| format!("write baseline: {}", path.display()))?;
    log::info!("updated baseline {}", path.display());
    Ok(())
}

pub fn normalize_line_endings(text: &str, crlf_to_lf: bool) -> Cow<'_, str> {
    if crlf_to_lf && text.contains("\r\n") {
        Cow::Owned(text.replace("\r\n", "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Byte-for-byte equality after optional CRLF folding of both sides.
pub fn matches(expected: &str, actual: &str, crlf_to_lf: bool) -> bool {
    normalize_line_endings(expected, crlf_to_lf) == normalize_line_endings(actual, crlf_to_lf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crlf_folding_only_when_requested() {
        assert!(matches("a\nb\n", "a\r\nb\r\n", true));
        assert!(!matches("a\nb\n", "a\r\nb\r\n", false));
        assert!(!matches("a\n", "a", true));
    }

    #[test]
    fn missing_baseline_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_baseline(&dir.path().join("x.expect")).unwrap(), None);

        let p = dir.path().join("y.expect");
        write_baseline(&p, "int x;\n").unwrap();
        assert_eq!(read_baseline(&p).unwrap().as_deref(), Some("int x;\n"));
    }
}
