use std::io::Write;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use insights_host_runner::{install_interrupt_handler, Interrupted};
use insights_test::config::{HarnessConfig, TestArgs};
use insights_test::{discovery, report, runner};

const EXIT_FATAL: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

fn main() -> std::process::ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) if err.downcast_ref::<Interrupted>().is_some() => {
            eprintln!("insights-test: interrupted");
            std::process::ExitCode::from(EXIT_INTERRUPTED)
        }
        Err(err) => {
            eprintln!("{err:#}");
            std::process::ExitCode::from(EXIT_FATAL)
        }
    }
}

fn try_main() -> Result<std::process::ExitCode> {
    let args = TestArgs::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    install_interrupt_handler()?;

    let cfg = HarnessConfig::from_args(&args)?;
    let sources = discovery::discover(&args.dir, &args.files)?;

    let start = Instant::now();
    let print = |r: &insights_test::classify::RunResult| {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let _ = report::print_result(&mut lock, r);
        let _ = lock.flush();
    };
    let results = runner::run_tests(&cfg, &sources, &print)?;
    let test_report = report::finalize_report(&cfg, start.elapsed(), results);

    {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        report::print_summary(&mut lock, &test_report)?;
    }
    if let Some(path) = &args.report_out {
        report::write_report(path, &test_report)?;
    }

    Ok(std::process::ExitCode::from(test_report.exit_code))
}
