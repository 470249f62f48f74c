use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use insights_contracts::{INSIGHTS_TEST_REPORT_SCHEMA_VERSION, NORMALIZE_RULES_VERSION};

use crate::classify::RunResult;
use crate::config::HarnessConfig;
use crate::summary::RunSummary;

#[derive(Debug, Clone, serde::Serialize)]
pub struct TestReport {
    pub schema_version: String,
    pub tool: ToolInfo,
    pub invocation: InvocationInfo,
    pub summary: RunSummary,
    pub ok: bool,
    pub exit_code: u8,
    pub tests: Vec<RunResult>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
    pub normalize_rules: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct InvocationInfo {
    pub argv: Vec<String>,
    pub cwd: String,
    pub insights: String,
    pub cxx: String,
    pub platform: String,
    pub default_standard: String,
    pub update_tests: bool,
    pub failure_is_ok: bool,
    pub jobs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

pub fn finalize_report(
    cfg: &HarnessConfig,
    elapsed: std::time::Duration,
    tests: Vec<RunResult>,
) -> TestReport {
    let mut summary = RunSummary::fold(&tests);
    summary.duration_ms = elapsed.as_millis() as u64;

    let invocation = InvocationInfo {
        argv: std::env::args().collect(),
        cwd: std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .display()
            .to_string(),
        insights: cfg.insights.display().to_string(),
        cxx: cfg.cxx.display().to_string(),
        platform: cfg.family().as_str().to_string(),
        default_standard: cfg.default_standard.clone(),
        update_tests: cfg.update_tests,
        failure_is_ok: cfg.failure_is_ok,
        jobs: cfg.jobs,
        timeout_ms: cfg.timeout.map(|t| t.as_millis() as u64),
    };

    TestReport {
        schema_version: INSIGHTS_TEST_REPORT_SCHEMA_VERSION.to_string(),
        tool: ToolInfo {
            name: "insights-test".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            normalize_rules: NORMALIZE_RULES_VERSION.to_string(),
        },
        invocation,
        ok: summary.ok(),
        exit_code: summary.exit_code(cfg.failure_is_ok),
        summary,
        tests,
    }
}

/// Per-test human lines, in the order the classifier produced them.
pub fn print_result(out: &mut impl Write, r: &RunResult) -> std::io::Result<()> {
    for m in &r.messages {
        if m.ends_with('\n') {
            write!(out, "{m}")?;
        } else {
            writeln!(out, "{m}")?;
        }
    }
    Ok(())
}

pub fn print_summary(out: &mut impl Write, report: &TestReport) -> std::io::Result<()> {
    let s = &report.summary;
    writeln!(
        out,
        "-----------------------------------------------------------------"
    )?;
    writeln!(out, "Tests passed: {}/{}", s.passed, s.expected_to_pass())?;
    if report.invocation.failure_is_ok {
        return Ok(());
    }
    writeln!(out, "Insights crashed: {}", s.crashed)?;
    writeln!(out, "Missing expected files: {}", s.incomplete)?;
    Ok(())
}

pub fn write_report(path: &Path, report: &TestReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)? + "\n";
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create report dir: {}", parent.display()))?;
    }
    std::fs::write(path, json.as_bytes())
        .with_context(|| format!("write report: {}", path.display()))?;
    eprintln!(
        "insights-test: passed={} crashed={} incomplete={} (exit={})",
        report.summary.passed, report.summary.crashed, report.summary.incomplete, report.exit_code
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Outcome;

    fn report(failure_is_ok: bool, summary: RunSummary) -> TestReport {
        TestReport {
            schema_version: INSIGHTS_TEST_REPORT_SCHEMA_VERSION.to_string(),
            tool: ToolInfo {
                name: "insights-test".to_string(),
                version: "0.0.0".to_string(),
                normalize_rules: NORMALIZE_RULES_VERSION.to_string(),
            },
            invocation: InvocationInfo {
                argv: Vec::new(),
                cwd: ".".to_string(),
                insights: "insights".to_string(),
                cxx: "clang++".to_string(),
                platform: "unix".to_string(),
                default_standard: "-std=c++17".to_string(),
                update_tests: false,
                failure_is_ok,
                jobs: 1,
                timeout_ms: None,
            },
            ok: summary.ok(),
            exit_code: summary.exit_code(failure_is_ok),
            summary,
            tests: Vec::new(),
        }
    }

    #[test]
    fn summary_lines() {
        let s = RunSummary {
            total: 3,
            passed: 1,
            incomplete: 1,
            crashed: 1,
            ..RunSummary::default()
        };
        let mut buf = Vec::new();
        print_summary(&mut buf, &report(false, s.clone())).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Tests passed: 1/2\n"), "{text}");
        assert!(text.contains("Insights crashed: 1\n"), "{text}");
        assert!(text.contains("Missing expected files: 1\n"), "{text}");

        let mut buf = Vec::new();
        print_summary(&mut buf, &report(true, s)).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(!text.contains("Insights crashed"), "{text}");
    }

    #[test]
    fn report_json_shape() {
        let r = report(false, RunSummary::default());
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["schema_version"], "insights.test.report@0.1.0");
        assert_eq!(v["tool"]["normalize_rules"], NORMALIZE_RULES_VERSION);
        assert_eq!(v["ok"], true);
        assert_eq!(v["exit_code"], 0);
        assert!(v["invocation"].get("timeout_ms").is_none());
        assert_eq!(
            serde_json::to_value(Outcome::CrashExpected).unwrap(),
            "crash_expected"
        );
    }
}
