//! Confirmation prompt with CI fallback

use super::context::UiContext;
use crate::error::{RbpackError, RbpackResult};

/// Ask for confirmation. Auto-yes approves; a non-interactive session
/// answers `default` without asking.
pub async fn confirm(ctx: &UiContext, message: &str, default: bool) -> RbpackResult<bool> {
    if ctx.auto_yes() {
        println!("{} (auto-approved)", message);
        return Ok(true);
    }
    if !ctx.is_interactive() {
        return Ok(default);
    }

    // cliclack blocks on the terminal
    let message = message.to_string();
    tokio::task::spawn_blocking(move || {
        cliclack::confirm(&message)
            .initial_value(default)
            .interact()
    })
    .await
    .map_err(|e| RbpackError::Internal(format!("prompt task failed: {}", e)))?
    .map_err(|e| RbpackError::User(format!("Prompt failed: {}", e)))
}
