//! Console output for command results.

use console::{Style, StyledObject};
use forgeup::report::BatchReport;
use forgeup::supervisor::SupervisorReport;
use forgeup::telemetry::{format_bytes, TelemetrySnapshot};

/// Styled `error:` prefix for fatal messages.
pub fn error_prefix() -> StyledObject<&'static str> {
    Style::new().red().bold().apply_to("error:")
}

/// One line per batch, followed by each failed item.
pub fn print_batch(report: &BatchReport) {
    let style = if report.has_failures() {
        Style::new().red().bold()
    } else {
        Style::new().green().bold()
    };
    println!("{}", style.apply_to(report));
    if report.bytes > 0 {
        println!("  Transferred: {}", format_bytes(report.bytes));
    }
    for failure in &report.failures {
        println!(
            "  {} {}: {}",
            Style::new().red().apply_to("✗"),
            failure.item,
            failure.reason
        );
    }
}

/// Final state of a supervised run.
pub fn print_supervisor(report: &SupervisorReport) {
    let style = if report.is_success() {
        Style::new().green().bold()
    } else {
        Style::new().red().bold()
    };
    println!(
        "{} (restarts: {}, reached healthy: {})",
        style.apply_to(format!("server: {}", report.final_state)),
        report.restarts,
        if report.healthy { "yes" } else { "no" }
    );
    for event in &report.remediations {
        let package = event.package.as_deref().unwrap_or_default();
        let result = if !event.allowed() {
            "not allowed".to_string()
        } else if event.installed {
            format!("installed {}", package)
        } else {
            format!("failed to install {}", package)
        };
        println!("  missing module {}: {}", event.module, result);
    }
    if let Some(error) = &report.error {
        println!("  {}", Style::new().red().apply_to(error));
    }
}

/// Counters of the whole session.
pub fn print_session_summary(snapshot: &TelemetrySnapshot) {
    println!();
    println!("{}", Style::new().bold().apply_to("Session Summary"));
    println!("───────────────");
    for stage in snapshot.stages.iter().filter(|s| !s.is_idle()) {
        println!(
            "  {:<8} {} ok, {} skipped, {} failed",
            format!("{}:", stage.stage),
            stage.succeeded,
            stage.skipped,
            stage.failed
        );
    }
    println!("  Data downloaded: {}", snapshot.bytes_fetched_human());
    println!("  Uptime: {}", snapshot.uptime_human());
}
