//! Check command handler.
//!
//! Provides a dry validation of the configuration: the join, the patterns
//! and the search roots are checked, nothing is scanned or deleted.

use dircull::config::DircullConfig;

/// Check command implementation.
///
/// # Examples
///
/// ```bash
/// # Validate the default configuration
/// dircull check
///
/// # Print the joined units for another tool
/// dircull --config /etc/dircull.toml check --json
/// ```
pub fn cmd_check(config: &DircullConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let units = super::build_units(config)?;

    let mut unresolved = 0;
    let mut rows = Vec::with_capacity(units.len());
    for unit in &units {
        let resolved = unit.resolve();
        if resolved.is_err() {
            unresolved += 1;
        }
        rows.push((unit, resolved));
    }

    if json {
        let value: Vec<_> = rows
            .iter()
            .map(|(unit, resolved)| {
                serde_json::json!({
                    "key": unit.key(),
                    "search_path": unit.search_root(),
                    "resolved": resolved.as_ref().ok(),
                    "error": resolved.as_ref().err().map(ToString::to_string),
                    "match_pattern": unit.match_pattern(),
                    "exclude_pattern": unit.policy().exclude(),
                    "keep_days": unit.policy().window(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("Dircull Configuration");
        println!("=====================");
        if let Some(source) = &config.source {
            println!("Source: {}", source.display());
        }
        println!(
            "Policies: scan on_error={}, delete on_error={}",
            config.scan_policy.as_str(),
            config.deletion_policy.as_str()
        );
        println!();

        for (unit, resolved) in &rows {
            println!("[{}]", unit.key());
            println!("  search path:     {}", unit.search_root().display());
            match resolved {
                Ok(root) => println!("  resolved:        {}", root.display()),
                Err(e) => println!("  resolved:        ERROR - {e}"),
            }
            println!("  match pattern:   {}", unit.match_pattern());
            println!("  exclude pattern: {}", unit.policy().exclude());
            println!("  keep days:       {}", unit.policy().window().as_days());
        }
        println!();
        println!("{} unit(s), {} unresolved", rows.len(), unresolved);
    }

    if unresolved == 0 {
        Ok(())
    } else {
        Err(format!("{unresolved} search root(s) cannot be resolved").into())
    }
}
