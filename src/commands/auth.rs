//! `auth login` and `auth status`

use chrono::Utc;

use crate::{auth::CredentialStore, config::Config, Result};

use super::CommandContext;

/// Run a fresh grant regardless of what is stored.
pub async fn handle_auth_login(ctx: &CommandContext, manual: bool) -> Result<()> {
    let credential = ctx.authorize(manual).await?;

    println!("✓ Authorized");
    println!("  Token file: {}", ctx.config.token_file.display());
    println!("  Expires at: {}", credential.expires_at);
    Ok(())
}

/// Report the stored credential without touching the network.
pub fn handle_auth_status(config: &Config) -> Result<()> {
    let store = CredentialStore::new(&config.token_file);
    println!("Token file: {}", store.path().display());

    let Some(credential) = store.load()? else {
        println!("No credential stored; run `yahoo-fantasy auth login`");
        return Ok(());
    };

    let now = Utc::now();
    let margin = chrono::Duration::seconds(crate::auth::DEFAULT_SAFETY_MARGIN_SECS);
    println!("Scope:      {}", credential.scope);
    println!("Issued at:  {}", credential.issued_at);
    println!("Expires at: {}", credential.expires_at);
    if credential.is_usable(now, margin) {
        let remaining = credential.expires_at - now;
        println!("Status:     usable ({} min left)", remaining.num_minutes());
    } else if credential.has_refresh_token() {
        println!("Status:     expired; it will be refreshed on the next request");
    } else {
        println!("Status:     expired with no refresh token; run `yahoo-fantasy auth login`");
    }
    Ok(())
}
