use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use insights_host_runner::{interrupted, Interrupted};

use crate::classify::{run_test, RunResult, TestCase};
use crate::config::HarnessConfig;

/// Run every source in `sources`, sequentially for `jobs == 1`, otherwise on a scoped pool
/// pulling from a shared cursor. `on_result` sees each result as it completes. The returned
/// list is sorted by id whatever the completion order.
///
/// Only an interrupt stops the run; any other error stays on the test that raised it.
pub fn run_tests(
    cfg: &HarnessConfig,
    sources: &[PathBuf],
    on_result: &(dyn Fn(&RunResult) + Sync),
) -> Result<Vec<RunResult>> {
    let mut out: Vec<RunResult> = Vec::with_capacity(sources.len());

    if cfg.jobs == 1 {
        for source in sources {
            let result = run_one(cfg, source)?;
            on_result(&result);
            out.push(result);
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        return Ok(out);
    }

    let next = AtomicUsize::new(0);
    let stop = AtomicBool::new(false);
    let results: Mutex<Vec<RunResult>> = Mutex::new(Vec::with_capacity(sources.len()));

    std::thread::scope(|scope| {
        let workers = cfg.jobs.min(sources.len().max(1));
        for _ in 0..workers {
            scope.spawn(|| {
                while !stop.load(Ordering::Relaxed) {
                    let idx = next.fetch_add(1, Ordering::Relaxed);
                    let Some(source) = sources.get(idx) else {
                        return;
                    };
                    match run_one(cfg, source) {
                        Ok(r) => {
                            let mut guard = results.lock().unwrap_or_else(|e| e.into_inner());
                            on_result(&r);
                            guard.push(r);
                        }
                        Err(Interrupted) => stop.store(true, Ordering::Relaxed),
                    }
                }
            });
        }
    });

    if stop.into_inner() {
        return Err(Interrupted.into());
    }
    out = results.into_inner().unwrap_or_else(|e| e.into_inner());

    out.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(out)
}

fn run_one(cfg: &HarnessConfig, source: &Path) -> Result<RunResult, Interrupted> {
    if interrupted() {
        return Err(Interrupted);
    }
    log::debug!("test: {}", source.display());
    let run = TestCase::load(source, &cfg.default_standard).and_then(|case| run_test(cfg, &case));
    match run {
        Ok(r) => Ok(r),
        Err(err) if err.downcast_ref::<Interrupted>().is_some() => Err(Interrupted),
        Err(err) => {
            log::warn!("{}: {err:#}", source.display());
            Ok(RunResult::harness_error(source, &err))
        }
    }
}
