use anyhow::Result;

use crate::app::App;
use crate::OutputFormat;

pub fn run_clear(app: &App, format: &OutputFormat) -> Result<()> {
    let resolver = &app.state.resolver;
    let before = resolver.cached_ids().len();
    resolver.invalidate();
    let after = resolver.cached_ids().len();

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "cleared": true,
                "bundledStitches": after,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            println!(
                "Content cache cleared ({} in memory before, {} bundled stitches kept)",
                before, after
            );
        }
    }

    Ok(())
}
