use anyhow::Result;

use helix_lib::scheduler::TubeIndex;

use crate::app::App;
use crate::render::terminal;
use crate::OutputFormat;

pub async fn run(
    app: &App,
    tube: Option<u8>,
    format: &OutputFormat,
    use_color: bool,
) -> Result<()> {
    let tubes = match tube {
        Some(t) => vec![crate::parse_tube(t)?],
        None => TubeIndex::ALL.to_vec(),
    };

    let session = app.session().await?;
    let active = session.active_tube().await;
    let mut listing = Vec::new();
    for tube in tubes {
        listing.push((tube, session.tube_stitches(tube).await));
    }
    session.shutdown().await?;

    match format {
        OutputFormat::Json => {
            let output: Vec<_> = listing
                .iter()
                .map(|(tube, positions)| {
                    serde_json::json!({
                        "tube": tube,
                        "active": *tube == active,
                        "positions": positions,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            for (tube, positions) in &listing {
                let title = if *tube == active {
                    format!("Tube {} (active)", tube)
                } else {
                    format!("Tube {}", tube)
                };
                println!("{}", terminal::heading(&title, use_color));
                if positions.is_empty() {
                    println!("    (not seeded)");
                }
                for p in positions {
                    println!("  {}", terminal::position_row(p, use_color));
                }
                println!();
            }
        }
    }

    Ok(())
}
