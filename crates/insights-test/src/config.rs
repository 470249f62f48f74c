use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use insights_contracts::{ENV_CXX, ENV_CXX_ARGS};
use insights_host_runner::{resolve_program, toolchain_for, PlatformFamily, Toolchain};

use crate::normalize::Normalizer;

#[derive(Parser, Debug, Clone)]
#[command(name = "insights-test")]
#[command(about = "Golden-file regression runner for the C++ Insights transformer.", long_about = None)]
#[command(version)]
pub struct TestArgs {
    /// Transformation binary under test.
    #[arg(long, value_name = "PATH")]
    pub insights: PathBuf,

    /// Compiler used to validate transformed output (default: $INSIGHTS_CXX, else the
    /// platform compiler).
    #[arg(long, value_name = "PATH")]
    pub cxx: Option<PathBuf>,

    /// Default language standard, passed as `-std=<STD>`.
    #[arg(long, value_name = "STD", default_value = "c++17")]
    pub std: String,

    /// Exit 0 even if tests fail.
    #[arg(long)]
    pub failure_is_ok: bool,

    /// Rewrite baselines that no longer match.
    #[arg(long)]
    pub update_tests: bool,

    /// Pass `-use-libc++` to the transformer.
    #[arg(long = "use-libc++", alias = "use-libcpp")]
    pub use_libcxx: bool,

    /// Per-invocation timeout in milliseconds (0 disables).
    #[arg(long, value_name = "N", default_value_t = 60_000)]
    pub timeout_ms: u64,

    #[arg(long, value_name = "N", default_value_t = 1)]
    pub jobs: usize,

    /// Directory scanned for `*.cpp` when no files are given.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,

    /// Invocation strategy (default: host).
    #[arg(long, value_enum)]
    pub platform: Option<PlatformFamily>,

    /// Write a JSON report to this path.
    #[arg(long, value_name = "PATH")]
    pub report_out: Option<PathBuf>,

    #[arg(long)]
    pub verbose: bool,

    /// Explicit test sources. When empty, `--dir` is scanned.
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,
}

/// Immutable run configuration, shared by reference with every worker.
pub struct HarnessConfig {
    pub insights: PathBuf,
    pub cxx: PathBuf,
    pub default_standard: String,
    pub failure_is_ok: bool,
    pub update_tests: bool,
    pub use_libcxx: bool,
    pub timeout: Option<Duration>,
    pub jobs: usize,
    pub extra_compile_args: Vec<String>,
    pub toolchain: Box<dyn Toolchain>,
    pub normalizer: Normalizer,
}

impl HarnessConfig {
    pub fn from_args(args: &TestArgs) -> Result<Self> {
        Self::from_args_with_env(args, |key| std::env::var(key).ok())
    }

    pub fn from_args_with_env(
        args: &TestArgs,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        if args.jobs == 0 {
            anyhow::bail!("--jobs must be >= 1");
        }

        let insights = resolve_program(&args.insights).with_context(|| {
            format!("insights binary not found: {}", args.insights.display())
        })?;

        let family = args.platform.unwrap_or_else(PlatformFamily::host);
        let cxx = match &args.cxx {
            Some(p) => p.clone(),
            None => env(ENV_CXX)
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(family.default_compiler())),
        };
        // A missing compiler is reported per test, not as a setup failure.
        let cxx = resolve_program(&cxx).unwrap_or(cxx);

        let extra_compile_args = env(ENV_CXX_ARGS)
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let timeout = (args.timeout_ms > 0).then(|| Duration::from_millis(args.timeout_ms));

        let cfg = HarnessConfig {
            insights,
            cxx,
            default_standard: format!("-std={}", args.std),
            failure_is_ok: args.failure_is_ok,
            update_tests: args.update_tests,
            use_libcxx: args.use_libcxx,
            timeout,
            jobs: args.jobs,
            extra_compile_args,
            toolchain: toolchain_for(family),
            normalizer: Normalizer::new()?,
        };
        log::debug!(
            "config: insights={} cxx={} std={} platform={} timeout={:?} jobs={}",
            cfg.insights.display(),
            cfg.cxx.display(),
            cfg.default_standard,
            family,
            cfg.timeout,
            cfg.jobs
        );
        Ok(cfg)
    }

    pub fn family(&self) -> PlatformFamily {
        self.toolchain.family()
    }

    /// Windows output may carry CRLF line endings; baselines are stored with LF.
    pub fn fold_crlf(&self) -> bool {
        self.family() == PlatformFamily::Windows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> TestArgs {
        let mut argv = vec!["insights-test"];
        argv.extend_from_slice(extra);
        TestArgs::parse_from(argv)
    }

    fn fake_tool(dir: &std::path::Path) -> PathBuf {
        let p = dir.join("insights");
        std::fs::write(&p, b"").unwrap();
        p
    }

    #[test]
    fn defaults() {
        let a = args(&["--insights", "/x/insights"]);
        assert_eq!(a.std, "c++17");
        assert_eq!(a.timeout_ms, 60_000);
        assert_eq!(a.jobs, 1);
        assert_eq!(a.dir, PathBuf::from("."));
        assert!(!a.use_libcxx && !a.update_tests && !a.failure_is_ok);
        assert!(a.files.is_empty());
    }

    #[test]
    fn libcpp_alias_is_accepted() {
        assert!(args(&["--insights", "i", "--use-libcpp"]).use_libcxx);
        assert!(args(&["--insights", "i", "--use-libc++"]).use_libcxx);
    }

    #[test]
    fn missing_insights_binary_is_fatal() {
        let a = args(&["--insights", "/definitely/not/here/insights"]);
        let err = HarnessConfig::from_args_with_env(&a, |_| None)
            .err()
            .expect("expected error");
        assert!(format!("{err:#}").contains("insights binary not found"));
    }

    #[test]
    fn compiler_and_extra_args_come_from_env() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(dir.path());
        let a = args(&[
            "--insights",
            tool.to_str().unwrap(),
            "--platform",
            "unix",
            "--timeout-ms",
            "0",
            "--std",
            "c++20",
        ]);
        let cfg = HarnessConfig::from_args_with_env(&a, |k| match k {
            "INSIGHTS_CXX" => Some("/opt/llvm/bin/clang++".to_string()),
            "INSIGHTS_CXX_ARGS" => Some(" -stdlib=libc++  -Wno-everything ".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.cxx, PathBuf::from("/opt/llvm/bin/clang++"));
        assert_eq!(cfg.extra_compile_args, vec!["-stdlib=libc++", "-Wno-everything"]);
        assert_eq!(cfg.default_standard, "-std=c++20");
        assert_eq!(cfg.timeout, None);
        assert_eq!(cfg.family(), PlatformFamily::Unix);
        assert!(!cfg.fold_crlf());
    }

    #[test]
    fn explicit_cxx_beats_env() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(dir.path());
        let a = args(&[
            "--insights",
            tool.to_str().unwrap(),
            "--cxx",
            "/usr/bin/g++-13",
            "--platform",
            "windows",
        ]);
        let cfg =
            HarnessConfig::from_args_with_env(&a, |_| Some("/ignored".to_string())).unwrap();
        assert_eq!(cfg.cxx, PathBuf::from("/usr/bin/g++-13"));
        assert!(cfg.fold_crlf());
    }
}
