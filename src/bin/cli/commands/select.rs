use anyhow::Result;

use crate::app::App;
use crate::OutputFormat;

pub async fn run(app: &App, tube: u8, format: &OutputFormat) -> Result<()> {
    let tube = crate::parse_tube(tube)?;

    let session = app.session().await?;
    session.select_tube(tube).await?;
    let presented = session.current().await?;
    session.shutdown().await?;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "activeTube": tube,
                "currentStitch": presented.stitch.id,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            println!(
                "Tube {} is active; next up {} ({})",
                tube, presented.stitch.title, presented.stitch.id
            );
        }
    }

    Ok(())
}
