//! Command handlers module.
//!
//! - `run.rs`: joins the configuration and runs every retention unit
//! - `check.rs`: validates the configuration without deleting anything

mod check;
mod run;

pub use check::cmd_check;
pub use run::cmd_run;

use dircull::RetentionUnit;
use dircull::config::DircullConfig;

/// Joins the configuration into runnable units.
fn build_units(config: &DircullConfig) -> dircull::Result<Vec<RetentionUnit>> {
    let settings = config.run_settings();
    Ok(config
        .join()?
        .into_iter()
        .map(|unit| RetentionUnit::from_config(unit, &settings))
        .collect())
}
