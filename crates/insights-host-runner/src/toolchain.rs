use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use clap::ValueEnum;

const ARCH_FLAG: &str = "-m64";
const USE_LIBCXX_FLAG: &str = "-use-libc++";

/// Defines that stub out constructs the compiler cannot parse when the transformed output
/// is compiled in isolation (static-local guard intrinsics emitted by the transformer).
const GUARD_WORKAROUND_DEFINES: &[&str] = &[
    "-D__cxa_guard_acquire(x)=true",
    "-D__cxa_guard_release(x)",
    "-D__cxa_guard_abort(x)",
];
const CXX98_STANDARD: &str = "-std=c++98";
const CXX98_ALIGNAS_DEFINE: &str = "-Dalignas(x)=";

// C4335: mac file format detected. /EHsc: assume only C++ functions throw.
const MSVC_FLAGS: &[&str] = &["/nologo", "/EHsc", "/IGNORE:C4335"];
const MSVC_KNOWN_STANDARDS: &[&str] = &["c++14", "c++17", "c++20", "c++latest", "c11", "c17"];
const MSVC_LATEST_STANDARD: &str = "c++latest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
#[clap(rename_all = "kebab_case")]
pub enum PlatformFamily {
    Unix,
    Windows,
}

impl PlatformFamily {
    pub fn host() -> Self {
        if cfg!(windows) {
            PlatformFamily::Windows
        } else {
            PlatformFamily::Unix
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlatformFamily::Unix => "unix",
            PlatformFamily::Windows => "windows",
        }
    }

    pub fn default_compiler(self) -> &'static str {
        match self {
            PlatformFamily::Unix => "clang++",
            PlatformFamily::Windows => "cl.exe",
        }
    }
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TransformRequest<'a> {
    pub source: &'a Path,
    pub standard: &'a str,
    pub extra_options: &'a [String],
    pub use_libcxx: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    pub source: &'a Path,
    pub standard: &'a str,
    pub extra_args: &'a [String],
}

/// Builds argument vectors for the two external tools. One implementation per platform
/// family, chosen once per run.
pub trait Toolchain: Send + Sync {
    fn family(&self) -> PlatformFamily;

    /// `<source> [-use-libc++] [extra…] -- <standard> <arch>`
    fn transform_args(&self, req: &TransformRequest<'_>) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![req.source.as_os_str().to_os_string()];
        if req.use_libcxx {
            args.push(USE_LIBCXX_FLAG.into());
        }
        args.extend(req.extra_options.iter().map(OsString::from));
        args.push("--".into());
        args.push(req.standard.into());
        args.push(ARCH_FLAG.into());
        args
    }

    fn compile_args(&self, req: &CompileRequest<'_>) -> Vec<OsString>;

    /// Name of the object file a `-c` compile of `source` drops into its working directory.
    fn object_file_name(&self, source: &Path) -> PathBuf;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnixToolchain;

impl Toolchain for UnixToolchain {
    fn family(&self) -> PlatformFamily {
        PlatformFamily::Unix
    }

    fn compile_args(&self, req: &CompileRequest<'_>) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![req.standard.into()];
        args.extend(GUARD_WORKAROUND_DEFINES.iter().map(OsString::from));
        args.push(ARCH_FLAG.into());
        if req.standard == CXX98_STANDARD {
            args.push(CXX98_ALIGNAS_DEFINE.into());
        }
        args.extend(req.extra_args.iter().map(OsString::from));
        args.push("-c".into());
        args.push(req.source.as_os_str().to_os_string());
        args
    }

    fn object_file_name(&self, source: &Path) -> PathBuf {
        object_name(source, "o")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsToolchain;

impl Toolchain for WindowsToolchain {
    fn family(&self) -> PlatformFamily {
        PlatformFamily::Windows
    }

    fn compile_args(&self, req: &CompileRequest<'_>) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![translate_standard_for_msvc(req.standard).into()];
        args.extend(MSVC_FLAGS.iter().map(OsString::from));
        args.extend(req.extra_args.iter().map(OsString::from));
        args.push("-c".into());
        args.push(req.source.as_os_str().to_os_string());
        args
    }

    fn object_file_name(&self, source: &Path) -> PathBuf {
        object_name(source, "obj")
    }
}

pub fn toolchain_for(family: PlatformFamily) -> Box<dyn Toolchain> {
    match family {
        PlatformFamily::Unix => Box::new(UnixToolchain),
        PlatformFamily::Windows => Box::new(WindowsToolchain),
    }
}

/// `-std=c++17` → `/std:c++17`; versions MSVC does not accept become `/std:c++latest`.
/// Flags that are not a `-std=` flag pass through untouched.
pub fn translate_standard_for_msvc(standard: &str) -> String {
    let version = match standard
        .strip_prefix("-std=")
        .or_else(|| standard.strip_prefix("/std:"))
    {
        Some(v) => v,
        None => return standard.to_string(),
    };

    if MSVC_KNOWN_STANDARDS.contains(&version) {
        format!("/std:{version}")
    } else {
        format!("/std:{MSVC_LATEST_STANDARD}")
    }
}

fn object_name(source: &Path, ext: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    PathBuf::from(format!("{stem}.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(v: &[OsString]) -> Vec<String> {
        v.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn msvc_standard_translation() {
        assert_eq!(translate_standard_for_msvc("-std=c++17"), "/std:c++17");
        assert_eq!(translate_standard_for_msvc("-std=c++2a"), "/std:c++latest");
        assert_eq!(translate_standard_for_msvc("-std=c++98"), "/std:c++latest");
        assert_eq!(translate_standard_for_msvc("/std:c++20"), "/std:c++20");
        assert_eq!(translate_standard_for_msvc("-fno-rtti"), "-fno-rtti");
    }

    #[test]
    fn cxx98_gets_alignas_noop_on_unix_only() {
        let req = CompileRequest {
            source: Path::new("/tmp/x/a.cpp"),
            standard: "-std=c++98",
            extra_args: &[],
        };
        let unix = strs(&UnixToolchain.compile_args(&req));
        assert!(unix.iter().any(|a| a == "-Dalignas(x)="));
        let win = strs(&WindowsToolchain.compile_args(&req));
        assert!(!win.iter().any(|a| a.starts_with("-D")));
    }

    #[test]
    fn object_names_follow_platform() {
        let src = Path::new("/tmp/x/Issue1.cpp");
        assert_eq!(UnixToolchain.object_file_name(src), PathBuf::from("Issue1.o"));
        assert_eq!(
            WindowsToolchain.object_file_name(src),
            PathBuf::from("Issue1.obj")
        );
    }
}
