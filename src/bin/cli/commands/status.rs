use anyhow::Result;

use helix_lib::scheduler::TubeIndex;

use crate::app::App;
use crate::render::terminal;
use crate::OutputFormat;

pub async fn run(app: &App, format: &OutputFormat, use_color: bool) -> Result<()> {
    let session = app.session().await?;
    let presented = session.current().await?;
    let summary = session.summary().await;

    let mut tubes = Vec::new();
    for tube in TubeIndex::ALL {
        let positions = session.tube_stitches(tube).await;
        let retired = positions.iter().filter(|p| p.is_retired()).count();
        tubes.push((tube, positions.len(), retired, positions.first().cloned()));
    }

    let resolver = app.state.resolver.clone();
    session.shutdown().await?;
    let stats = resolver.stats();
    let config = app.config();

    match format {
        OutputFormat::Json => {
            let tube_list: Vec<_> = tubes
                .iter()
                .map(|(tube, len, retired, head)| {
                    serde_json::json!({
                        "tube": tube,
                        "stitches": len,
                        "retired": retired,
                        "current": head.as_ref().map(|p| &p.stitch_id),
                    })
                })
                .collect();
            let output = serde_json::json!({
                "user": config.user_id,
                "activeTube": presented.tube,
                "currentStitch": presented.stitch.id,
                "currentTitle": presented.stitch.title,
                "contentSource": presented.source,
                "cycleCount": summary.cycle_count,
                "tubes": tube_list,
                "cachedStitches": resolver.cached_ids().len(),
                "persistence": config.persistence,
                "contentAccess": config.content_access(),
                "resolver": stats,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            println!("{}", terminal::heading(&format!("Learner {}", config.user_id), use_color));
            println!(
                "  Up next:  tube {} · {} ({}) {}",
                presented.tube,
                presented.stitch.title,
                presented.stitch.id,
                terminal::source_badge(presented.source, use_color)
            );
            println!("  Cycles:   {}", summary.cycle_count);
            for (tube, len, retired, head) in &tubes {
                let current = head.as_ref().map_or("-", |p| p.stitch_id.as_str());
                println!(
                    "  Tube {}:   {} stitches, {} retired, current {}",
                    tube, len, retired, current
                );
            }
            println!(
                "  Content:  {} cached, access {:?}, persistence {}",
                resolver.cached_ids().len(),
                config.content_access(),
                config.persistence
            );
        }
    }

    Ok(())
}
