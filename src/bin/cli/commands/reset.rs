use anyhow::{bail, Context, Result};

use helix_lib::persistence::StatePersistence;

use crate::app::App;
use crate::OutputFormat;

pub async fn run(app: &App, yes: bool, format: &OutputFormat) -> Result<()> {
    let user = &app.config().user_id;
    if !yes {
        bail!(
            "This deletes all progress for '{}'. Re-run with --yes to confirm.",
            user
        );
    }

    app.state
        .store
        .delete(user)
        .await
        .with_context(|| format!("Failed to delete progress for '{}'", user))?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "reset": true, "user": user }));
        }
        OutputFormat::Plain => println!("Progress for '{}' deleted", user),
    }

    Ok(())
}
