//! Create admin command handler

use crate::config::{Config, DEFAULT_ADMIN_PASSWORD};
use crate::state::SharedState;

pub async fn cmd_create_admin(config: Config, username: &str, email: &str) -> anyhow::Result<()> {
    let password = admin_password(&config)?;

    let state = SharedState::new(config).await?;
    let user = state
        .auth_service
        .create_admin(username, email, &password)
        .await?;

    println!("Administrator created");
    println!("  ID:       {}", user.id);
    println!("  Username: {}", user.username);
    println!("  Email:    {}", user.email);

    Ok(())
}

/// The configured admin password, refusing blank values and the built-in default.
fn admin_password(config: &Config) -> anyhow::Result<String> {
    let password = config.admin.password.trim();
    if password.is_empty() || password == DEFAULT_ADMIN_PASSWORD {
        anyhow::bail!(
            "Set admin.password (or ADMIN_PASSWORD) to the new administrator's password"
        );
    }
    Ok(config.admin.password.clone())
}
