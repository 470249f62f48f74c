//! Per-test decision tree: transform, compare, compile, classify, optionally self-heal.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use insights_contracts::{
    EXPECT_EXTENSION, IGNORE_EXTENSION, PRIMARY_ERROR_EXTENSION, SECONDARY_ERROR_EXTENSION,
    TOOL_SOURCE_ERROR_EXIT_CODE,
};
use insights_host_runner::{
    run_process, CompileRequest, Interrupted, Invocation, ProcessOutput, TempDir,
    TransformRequest,
};

use crate::baseline;
use crate::config::HarnessConfig;
use crate::diff;
use crate::directive::Directives;

#[derive(Debug, Clone)]
pub struct TestCase {
    pub id: String,
    pub source: PathBuf,
    pub standard: String,
    pub extra_tool_options: Vec<String>,
    pub ignored: bool,
    pub expected_output_path: PathBuf,
    pub primary_error_path: PathBuf,
    pub secondary_error_path: PathBuf,
}

impl TestCase {
    pub fn load(source: &Path, default_standard: &str) -> Result<Self> {
        let bytes =
            std::fs::read(source).with_context(|| format!("read test: {}", source.display()))?;
        let directives = Directives::parse(&String::from_utf8_lossy(&bytes));
        let id = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .with_context(|| format!("test file has no name: {}", source.display()))?;

        Ok(Self {
            id,
            source: source.to_path_buf(),
            standard: directives
                .standard
                .unwrap_or_else(|| default_standard.to_string()),
            extra_tool_options: directives.tool_options,
            ignored: source.with_extension(IGNORE_EXTENSION).exists(),
            expected_output_path: source.with_extension(EXPECT_EXTENSION),
            primary_error_path: source.with_extension(PRIMARY_ERROR_EXTENSION),
            secondary_error_path: source.with_extension(SECONDARY_ERROR_EXTENSION),
        })
    }

    fn display_name(&self) -> String {
        self.source
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.id.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    MismatchFailed,
    CrashExpected,
    CrashUnexpected,
    CompileFailed,
    CompilePassed,
    Ignored,
    Incomplete,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Passed => "passed",
            Outcome::MismatchFailed => "mismatch_failed",
            Outcome::CrashExpected => "crash_expected",
            Outcome::CrashUnexpected => "crash_unexpected",
            Outcome::CompileFailed => "compile_failed",
            Outcome::CompilePassed => "compile_passed",
            Outcome::Ignored => "ignored",
            Outcome::Incomplete => "incomplete",
        }
    }

    /// Counts towards "Tests passed".
    pub fn is_pass(self) -> bool {
        matches!(
            self,
            Outcome::Passed | Outcome::CrashExpected | Outcome::Ignored | Outcome::CompilePassed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineKind {
    Primary,
    Secondary,
}

impl BaselineKind {
    pub fn extension(self) -> &'static str {
        match self {
            BaselineKind::Primary => PRIMARY_ERROR_EXTENSION,
            BaselineKind::Secondary => SECONDARY_ERROR_EXTENSION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileVerdict {
    /// Clean compile (`None`) or a failure accepted by a stored compile-error baseline.
    Passed(Option<BaselineKind>),
    Failed,
}

impl CompileVerdict {
    pub fn outcome(self) -> Outcome {
        match self {
            CompileVerdict::Passed(_) => Outcome::CompilePassed,
            CompileVerdict::Failed => Outcome::CompileFailed,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TransformSection {
    pub exit_code: i32,
    pub timed_out: bool,
    pub duration_ms: u64,
    pub stdout_bytes: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

impl TransformSection {
    fn from_output(out: &ProcessOutput) -> Self {
        Self {
            exit_code: out.exit_status,
            timed_out: out.timed_out,
            duration_ms: duration_ms(out.duration),
            stdout_bytes: out.stdout.len() as u64,
            stderr: out.stderr.clone(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CompileSection {
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_baseline: Option<BaselineKind>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

/// Result of one test. Built fresh per run; never mutated after classification.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunResult {
    pub id: String,
    pub source: String,
    pub outcome: Outcome,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<TransformSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_matches: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile: Option<CompileSection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updated: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_error: Option<String>,
    /// Human-readable output lines, printed by the reporter.
    #[serde(skip)]
    pub messages: Vec<String>,
}

impl RunResult {
    fn new(case: &TestCase, outcome: Outcome) -> Self {
        Self {
            id: case.id.clone(),
            source: case.source.display().to_string(),
            outcome,
            duration_ms: 0,
            transform: None,
            content_matches: None,
            compile: None,
            updated: Vec::new(),
            environment_error: None,
            messages: Vec::new(),
        }
    }

    /// A test whose processing hit a harness-side error (unreadable baseline, temp file,
    /// baseline write). The run goes on; the test fails with the error recorded.
    pub fn harness_error(source: &Path, err: &anyhow::Error) -> Self {
        let id = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());
        let name = source
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| id.clone());
        let text = format!("{err:#}");
        Self {
            id,
            source: source.display().to_string(),
            outcome: Outcome::CrashUnexpected,
            duration_ms: 0,
            transform: None,
            content_matches: None,
            compile: None,
            updated: Vec::new(),
            environment_error: Some(text.clone()),
            messages: vec![format!("[ERROR] {name}: {text}")],
        }
    }

    fn finish(mut self, started: Instant) -> Self {
        self.duration_ms = duration_ms(started.elapsed());
        self
    }
}

/// Run one test to completion. Errors are reserved for interrupts and harness-level I/O
/// failures; every tool behaviour maps to an [`Outcome`].
pub fn run_test(cfg: &HarnessConfig, case: &TestCase) -> Result<RunResult> {
    let started = Instant::now();
    let name = case.display_name();

    if case.ignored {
        let mut r = RunResult::new(case, Outcome::Ignored);
        r.messages.push(format!("Ignoring: {name}"));
        return Ok(r.finish(started));
    }

    let Some(expected) = baseline::read_baseline(&case.expected_output_path)? else {
        let mut r = RunResult::new(case, Outcome::Incomplete);
        r.messages.push(format!("Missing expect/ignore for: {name}"));
        return Ok(r.finish(started));
    };

    let transform_args = cfg.toolchain.transform_args(&TransformRequest {
        source: &case.source,
        standard: &case.standard,
        extra_options: &case.extra_tool_options,
        use_libcxx: cfg.use_libcxx,
    });
    let inv = Invocation::new(&cfg.insights, transform_args).with_timeout(cfg.timeout);
    let transformed = run_process(&inv)?;

    let mut r = RunResult::new(case, Outcome::Passed);
    r.transform = Some(TransformSection::from_output(&transformed));

    if transformed.truncated() {
        r.outcome = Outcome::CrashUnexpected;
        r.messages.push(format!(
            "Insight crashed for: {name} with: {}",
            transformed.exit_status
        ));
        r.messages.push(format!(
            "output exceeded capture limit (stdout {} bytes, stderr {} bytes)",
            transformed.stdout_total_bytes, transformed.stderr_total_bytes
        ));
        return Ok(r.finish(started));
    }

    let mut crashed = false;
    if !transformed.success() {
        let refusal_baseline = baseline::read_baseline(&case.primary_error_path)?;
        let is_refusal =
            !transformed.timed_out && transformed.exit_status == TOOL_SOURCE_ERROR_EXIT_CODE;

        if let Some(ce) = refusal_baseline.as_deref().filter(|_| is_refusal) {
            let norm = &cfg.normalizer;
            if baseline::matches(
                &norm.refusal_baseline(ce),
                &norm.tool_refusal(&transformed.stderr),
                cfg.fold_crlf(),
            ) {
                r.outcome = Outcome::CrashExpected;
                r.messages.push(format!("[PASSED] Compile: {name}"));
                return Ok(r.finish(started));
            }
            r.messages.push(format!("[ERROR] Compile: {name}"));
            if cfg.update_tests {
                let refreshed = norm.tool_refusal(&transformed.stderr);
                baseline::write_baseline(&case.primary_error_path, &refreshed)?;
                r.updated.push(case.primary_error_path.display().to_string());
                r.messages.push("Updating test cerr".to_string());
            }
        }

        r.outcome = Outcome::CrashUnexpected;
        r.messages.push(format!(
            "Insight crashed for: {name} with: {}",
            transformed.exit_status
        ));
        if transformed.timed_out {
            r.messages.push(format!(
                "timed out after {} ms",
                duration_ms(transformed.duration)
            ));
        }
        r.messages.push(transformed.stderr.clone());

        let usable = !transformed.timed_out && !transformed.stdout.is_empty();
        if !(cfg.update_tests && usable) {
            return Ok(r.finish(started));
        }
        crashed = true;
    }

    let tmp = TempDir::new("insights_test")?;
    let tmp_file = tmp.path().join(format!("{}.cpp", case.id));
    std::fs::write(&tmp_file, transformed.stdout.as_bytes())
        .with_context(|| format!("write transformed output: {}", tmp_file.display()))?;

    let content_matches = baseline::matches(&expected, &transformed.stdout, cfg.fold_crlf());
    let elapsed = format_seconds(transformed.duration);
    if content_matches {
        if !crashed {
            r.messages.push(format!("[PASSED] {name:<50} - {elapsed}"));
        }
    } else {
        r.messages.push(format!("[FAILED] {name} - {elapsed}"));
        let actual = baseline::normalize_line_endings(&transformed.stdout, cfg.fold_crlf());
        let d = diff::unified_diff(
            &expected,
            &actual,
            &case.expected_output_path.display().to_string(),
            "stdout",
            diff::DEFAULT_CONTEXT,
        );
        r.messages.extend(d.lines().map(|l| l.strip_prefix(' ').unwrap_or(l).to_string()));
    }
    r.content_matches = Some(content_matches);

    let compiled = compile_output(cfg, case, &tmp, &tmp_file, &mut r)?;

    if cfg.update_tests {
        let update = BaselineUpdate {
            stdout: &transformed.stdout,
            content_matches,
            compiled: &compiled,
            // The refusal baseline was already refreshed above.
            error_baselines: !crashed,
        };
        update_baselines(cfg, case, &update, &mut r)?;
    }

    r.outcome = if crashed {
        Outcome::CrashUnexpected
    } else {
        match (content_matches, compiled.verdict) {
            (true, CompileVerdict::Passed(_)) => Outcome::Passed,
            (false, CompileVerdict::Passed(_)) => Outcome::MismatchFailed,
            (_, CompileVerdict::Failed) => Outcome::CompileFailed,
        }
    };
    drop(tmp);
    Ok(r.finish(started))
}

struct Compiled {
    verdict: CompileVerdict,
    /// Compiler output exceeded the capture cap; nothing may be stored from it.
    truncated: bool,
    /// Fully normalized compiler stderr (empty on a clean compile).
    primary_stderr: String,
    secondary_stderr: String,
}

fn compile_output(
    cfg: &HarnessConfig,
    case: &TestCase,
    tmp: &TempDir,
    tmp_file: &Path,
    r: &mut RunResult,
) -> Result<Compiled> {
    let name = case.display_name();
    let args = cfg.toolchain.compile_args(&CompileRequest {
        source: tmp_file,
        standard: &case.standard,
        extra_args: &cfg.extra_compile_args,
    });
    let inv = Invocation::new(&cfg.cxx, args)
        .with_cwd(tmp.path())
        .with_timeout(cfg.timeout);

    let out = match run_process(&inv) {
        Ok(out) => out,
        Err(err) if err.downcast_ref::<Interrupted>().is_some() => return Err(err),
        Err(err) => {
            log::warn!("{}: compiler did not start: {err:#}", case.id);
            let text = format!("{err:#}");
            r.messages.push(format!("[ERROR] Compile failed: {name}"));
            r.messages.push(text.clone());
            r.compile = Some(CompileSection {
                outcome: Outcome::CompileFailed,
                exit_code: None,
                timed_out: false,
                duration_ms: 0,
                matched_baseline: None,
                stderr: text,
            });
            return Ok(Compiled {
                verdict: CompileVerdict::Failed,
                truncated: false,
                primary_stderr: String::new(),
                secondary_stderr: String::new(),
            });
        }
    };

    let mut compiled = Compiled {
        verdict: CompileVerdict::Failed,
        truncated: out.truncated(),
        primary_stderr: String::new(),
        secondary_stderr: String::new(),
    };

    if out.success() {
        let object = tmp.path().join(cfg.toolchain.object_file_name(tmp_file));
        if let Err(err) = std::fs::remove_file(&object) {
            let msg = format!("remove object artifact {}: {err}", object.display());
            log::warn!("{}: {msg}", case.id);
            r.environment_error = Some(msg);
        }
        if case.primary_error_path.exists() {
            r.messages
                .push(format!("unused file: {}", case.primary_error_path.display()));
        }
        compiled.verdict = CompileVerdict::Passed(None);
    } else {
        let tmp_name = tmp_file.display().to_string();
        let norm = &cfg.normalizer;
        compiled.primary_stderr = norm.compiler_diagnostics(&out.stderr, Some(&tmp_name));
        compiled.secondary_stderr = norm.filename_only(&out.stderr, &tmp_name);

        let candidates = [
            (BaselineKind::Primary, &case.primary_error_path, &compiled.primary_stderr),
            (BaselineKind::Secondary, &case.secondary_error_path, &compiled.secondary_stderr),
        ];
        for (kind, path, actual) in candidates {
            if out.timed_out || compiled.truncated {
                break;
            }
            let Some(stored) = baseline::read_baseline(path)? else {
                continue;
            };
            if baseline::matches(&stored, actual, cfg.fold_crlf()) {
                compiled.verdict = CompileVerdict::Passed(Some(kind));
                r.messages.push(format!("[PASSED] Compile: {name}"));
                break;
            }
        }

        if compiled.verdict == CompileVerdict::Failed {
            r.messages.push(format!("[ERROR] Compile failed: {name}"));
            if compiled.truncated {
                r.messages.push(format!(
                    "compiler output exceeded capture limit ({} bytes)",
                    out.stderr_total_bytes
                ));
            }
            r.messages.push(compiled.primary_stderr.clone());
        }
    }

    let matched_baseline = match compiled.verdict {
        CompileVerdict::Passed(kind) => kind,
        CompileVerdict::Failed => None,
    };
    r.compile = Some(CompileSection {
        outcome: compiled.verdict.outcome(),
        exit_code: Some(out.exit_status),
        timed_out: out.timed_out,
        duration_ms: duration_ms(out.duration),
        matched_baseline,
        stderr: if compiled.verdict == CompileVerdict::Passed(None) {
            String::new()
        } else {
            compiled.primary_stderr.clone()
        },
    });
    Ok(compiled)
}

struct BaselineUpdate<'a> {
    stdout: &'a str,
    content_matches: bool,
    compiled: &'a Compiled,
    error_baselines: bool,
}

/// Self-healing: a passing compile with stale content rewrites `.expect`; a failing compile
/// rewrites `.expect` together with whichever compile-error baseline already exists.
fn update_baselines(
    cfg: &HarnessConfig,
    case: &TestCase,
    update: &BaselineUpdate<'_>,
    r: &mut RunResult,
) -> Result<()> {
    let stdout = baseline::normalize_line_endings(update.stdout, cfg.fold_crlf());
    let compiled = update.compiled;
    match compiled.verdict {
        CompileVerdict::Passed(_) if !update.content_matches => {
            baseline::write_baseline(&case.expected_output_path, &stdout)?;
            r.updated
                .push(case.expected_output_path.display().to_string());
            r.messages.push("Updating test".to_string());
        }
        CompileVerdict::Passed(_) => {}
        CompileVerdict::Failed if !update.error_baselines || compiled.truncated => {}
        CompileVerdict::Failed => {
            let target = if case.primary_error_path.exists() {
                Some((&case.primary_error_path, &compiled.primary_stderr))
            } else if case.secondary_error_path.exists() {
                Some((&case.secondary_error_path, &compiled.secondary_stderr))
            } else {
                None
            };
            let Some((path, contents)) = target else {
                return Ok(());
            };
            baseline::write_baseline(&case.expected_output_path, &stdout)?;
            baseline::write_baseline(path, contents)?;
            r.updated
                .push(case.expected_output_path.display().to_string());
            r.updated.push(path.display().to_string());
            r.messages.push("Updating test cerr".to_string());
        }
    }
    Ok(())
}

fn duration_ms(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}

fn format_seconds(d: Duration) -> String {
    format!("{:.3}s", d.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_paths_follow_the_source_stem() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("Issue42.cpp");
        std::fs::write(&src, "// cmdline:-std=c++20\nint x;\n").unwrap();
        std::fs::write(dir.path().join("Issue42.ignore"), "").unwrap();

        let case = TestCase::load(&src, "-std=c++17").unwrap();
        assert_eq!(case.id, "Issue42");
        assert_eq!(case.standard, "-std=c++20");
        assert!(case.ignored);
        assert_eq!(case.expected_output_path, dir.path().join("Issue42.expect"));
        assert_eq!(case.primary_error_path, dir.path().join("Issue42.cerr"));
        assert_eq!(case.secondary_error_path, dir.path().join("Issue42.ccerr"));
    }

    #[test]
    fn default_standard_applies_without_directive() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.cpp");
        std::fs::write(&src, "int x;\n").unwrap();
        let case = TestCase::load(&src, "-std=c++17").unwrap();
        assert_eq!(case.standard, "-std=c++17");
        assert!(case.extra_tool_options.is_empty());
        assert!(!case.ignored);
    }

    #[test]
    fn passing_outcomes() {
        let passing: Vec<_> = [
            Outcome::Passed,
            Outcome::MismatchFailed,
            Outcome::CrashExpected,
            Outcome::CrashUnexpected,
            Outcome::CompileFailed,
            Outcome::Ignored,
            Outcome::Incomplete,
        ]
        .into_iter()
        .filter(|o| o.is_pass())
        .collect();
        assert_eq!(
            passing,
            vec![Outcome::Passed, Outcome::CrashExpected, Outcome::Ignored]
        );
    }

    #[test]
    fn harness_error_fails_only_its_own_test() {
        let err = anyhow::anyhow!("Is a directory (os error 21)")
            .context("read baseline: /t/B.expect");
        let r = RunResult::harness_error(Path::new("/t/B.cpp"), &err);
        assert_eq!(r.id, "B");
        assert_eq!(r.outcome, Outcome::CrashUnexpected);
        assert!(!r.outcome.is_pass());
        let env = r.environment_error.as_deref().unwrap();
        assert!(env.starts_with("read baseline: /t/B.expect: Is a directory"), "{env}");
        assert_eq!(r.messages, vec![format!("[ERROR] B.cpp: {env}")]);
    }

    #[test]
    fn compile_verdict_maps_to_component_outcome() {
        assert_eq!(
            CompileVerdict::Passed(Some(BaselineKind::Secondary)).outcome(),
            Outcome::CompilePassed
        );
        assert_eq!(CompileVerdict::Failed.outcome(), Outcome::CompileFailed);
        assert_eq!(BaselineKind::Primary.extension(), "cerr");
    }
}
