use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::app::App;
use crate::OutputFormat;

pub async fn run(app: &App, window: Option<usize>, format: &OutputFormat) -> Result<()> {
    let window = window.unwrap_or(app.config().prefetch_window);

    let session = app.session().await?;
    let tube = session.active_tube().await;
    let current = session.current().await?;
    // Stops the session's own background prefetch
    session.shutdown().await?;

    let token = CancellationToken::new();
    let ctrl_c = {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        })
    };

    let report = app
        .state
        .resolver
        .prefetch_now(tube, &current.stitch.id, window, &token)
        .await;
    ctrl_c.abort();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Plain => {
            println!(
                "Tube {} after {}: {} requested, {} already cached, {} fetched, {} unavailable{}",
                tube,
                current.stitch.id,
                report.requested,
                report.already_cached,
                report.resolved,
                report.failed,
                if report.cancelled { " (cancelled)" } else { "" }
            );
        }
    }

    Ok(())
}
