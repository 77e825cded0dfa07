//! Check config command handler

use crate::config::Config;

pub fn cmd_check_config(config: &Config) -> anyhow::Result<()> {
    config.validate()?;

    println!("Configuration OK");
    println!("{:-<70}", "");
    // Secrets are skipped by the serializer.
    println!("{}", toml::to_string_pretty(config)?);

    Ok(())
}
