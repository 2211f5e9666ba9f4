//! Run command handler.

use dircull::config::DircullConfig;
use dircull::{BatchRunner, SystemClock};

/// Run command implementation.
///
/// Runs every unit, prints the batch summary and fails if any unit failed.
/// A configuration that does not join runs nothing.
pub fn cmd_run(config: &DircullConfig) -> Result<(), Box<dyn std::error::Error>> {
    let units = super::build_units(config)?;
    if units.is_empty() {
        println!("No search paths configured; nothing to do.");
        return Ok(());
    }

    let report = BatchRunner::new(units, SystemClock).run();
    println!("{}", report.summary());

    if report.is_success() {
        Ok(())
    } else {
        let total = report.failed.len() + report.completed.len();
        Err(format!("{} of {total} unit(s) failed", report.failed.len()).into())
    }
}
