use crate::classify::{Outcome, RunResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RunSummary {
    pub total: u64,
    /// Passed + CrashExpected + Ignored.
    pub passed: u64,
    pub incomplete: u64,
    /// CrashUnexpected only; expected refusals are passes.
    pub crashed: u64,
    pub mismatch_failed: u64,
    pub compile_failed: u64,
    pub crash_expected: u64,
    pub ignored: u64,
    pub environment_errors: u64,
    pub baselines_updated: u64,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn fold<'a>(results: impl IntoIterator<Item = &'a RunResult>) -> Self {
        results.into_iter().fold(Self::default(), |mut s, r| {
            s.total += 1;
            if r.outcome.is_pass() {
                s.passed += 1;
            }
            match r.outcome {
                Outcome::Incomplete => s.incomplete += 1,
                Outcome::CrashUnexpected => s.crashed += 1,
                Outcome::MismatchFailed => s.mismatch_failed += 1,
                Outcome::CompileFailed => s.compile_failed += 1,
                Outcome::CrashExpected => s.crash_expected += 1,
                Outcome::Ignored => s.ignored += 1,
                Outcome::Passed | Outcome::CompilePassed => {}
            }
            if r.environment_error.is_some() {
                s.environment_errors += 1;
            }
            s.baselines_updated += r.updated.len() as u64;
            s
        })
    }

    pub fn expected_to_pass(&self) -> u64 {
        self.total - self.incomplete
    }

    pub fn ok(&self) -> bool {
        self.incomplete == 0 && self.passed == self.expected_to_pass()
    }

    pub fn exit_code(&self, failure_is_ok: bool) -> u8 {
        if failure_is_ok || self.ok() {
            0
        } else {
            1
        }
    }
}
