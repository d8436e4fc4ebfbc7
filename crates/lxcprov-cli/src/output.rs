//! Human-readable progress and summary output on stderr.

use std::time::Duration;

use lxcprov_runtime::batch::BatchReport;
use lxcprov_runtime::engine::{Outcome, ProvisionReport};

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Prints the banner before provisioning starts.
pub fn print_header(count: usize) {
    eprintln!();
    eprintln!(
        "  {BOLD}lxcprov{RESET} {DIM}v{}{RESET}  provisioning {count} container(s)",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!();
}

/// Warns that the LXC tools were not found on `PATH`.
pub fn print_backend_notice() {
    eprintln!("  {YELLOW}Note:{RESET} lxc-create was not found on PATH.");
    eprintln!("        Install the LXC userspace tools; every container will fail to define.");
    eprintln!();
}

/// Prints one line per record and the totals.
pub fn print_summary(report: &BatchReport, elapsed: Duration) {
    eprintln!();
    for r in &report.reports {
        eprintln!("    {}", summary_line(r));
    }
    eprintln!();
    let color = if report.is_clean() { GREEN } else { RED };
    eprintln!(
        "  {color}{BOLD}{} ok{RESET}, {} with warnings, {} failed in {}",
        report.succeeded(),
        report.warned(),
        report.failed(),
        format_duration(elapsed)
    );
}

fn summary_line(report: &ProvisionReport) -> String {
    let (marker, detail) = match &report.outcome {
        Outcome::Success => (format!("{GREEN}●{RESET}"), String::new()),
        Outcome::SuccessWithPackageWarning { detail } => {
            (format!("{YELLOW}●{RESET}"), format!(" {DIM}{detail}{RESET}"))
        }
        Outcome::Failed { stage, cause } => (
            format!("{RED}✗{RESET}"),
            format!(" {RED}{stage}:{RESET} {cause}"),
        ),
    };
    format!(
        "{marker} {BOLD}{}{RESET} {DIM}[{}] {}{RESET}{detail}",
        report.name, report.state, report.finished_at
    )
}

/// Formats a duration as seconds with one decimal, or minutes past a minute.
#[must_use]
pub fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", elapsed.as_secs_f64())
    }
}
