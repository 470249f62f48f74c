use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use insights_contracts::SOURCE_EXTENSION;
use walkdir::WalkDir;

/// Candidate sources in lexicographic order: the explicit list when given, else every
/// `*.cpp` directly inside `dir`.
pub fn discover(dir: &Path, explicit: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut out: Vec<PathBuf> = if explicit.is_empty() {
        scan_dir(dir)?
    } else {
        for p in explicit {
            if !p.is_file() {
                anyhow::bail!("test file not found: {}", p.display());
            }
        }
        explicit.to_vec()
    };
    out.sort();
    out.dedup();
    Ok(out)
}

fn scan_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("scan test dir: {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some(SOURCE_EXTENSION) {
            out.push(path.to_path_buf());
        }
    }
    log::debug!("discovered {} tests under {}", out.len(), dir.display());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_only_top_level_cpp_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.cpp", "a.cpp", "a.expect", "notes.txt", "c.cpp.orig"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("d.cpp"), "").unwrap();

        let found = discover(dir.path(), &[]).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.cpp", "b.cpp"]);
    }

    #[test]
    fn unreadable_dir_is_an_error() {
        let err = discover(Path::new("/definitely/not/a/test/dir"), &[]).unwrap_err();
        assert!(format!("{err:#}").contains("scan test dir"), "{err:#}");
    }

    #[test]
    fn explicit_files_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.cpp");
        std::fs::write(&a, "").unwrap();
        assert_eq!(discover(dir.path(), &[a.clone(), a.clone()]).unwrap(), vec![a]);
        assert!(discover(dir.path(), &[dir.path().join("missing.cpp")]).is_err());
    }
}
