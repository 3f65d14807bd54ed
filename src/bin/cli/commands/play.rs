use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;

use helix_lib::session::{build_drill, DrillItem};

use crate::app::App;
use crate::render::terminal::{self, Color};
use crate::OutputFormat;

pub async fn run(app: &App, stitches: usize, format: &OutputFormat, use_color: bool) -> Result<()> {
    let session = app.session().await?;
    let mut rng = StdRng::from_entropy();
    let stdin = std::io::stdin();
    let mut input = stdin.lock();

    'stitches: for _ in 0..stitches {
        let presented = session.current().await?;
        let stitch = &presented.stitch;

        println!();
        println!(
            "{} {} {}",
            terminal::paint(&format!("Tube {}", presented.tube), Color::CYAN, use_color),
            terminal::heading(&stitch.title, use_color),
            terminal::source_badge(presented.source, use_color)
        );
        for line in terminal::wrap_lines(&stitch.body, "  ", 80) {
            println!("{}", terminal::paint(&line, Color::DIM, use_color));
        }

        let items = build_drill(stitch, presented.distractor_level, &mut rng);
        let mut correct = 0u32;
        for (i, item) in items.iter().enumerate() {
            let Some(choice) = ask(&mut input, i + 1, item)? else {
                println!("Stopping.");
                break 'stitches;
            };
            if item.is_correct(choice) {
                correct += 1;
                println!("  {}", terminal::paint("✓ correct", Color::GREEN, use_color));
            } else {
                let msg = format!("✗ the answer was {}", item.correct_answer());
                println!("  {}", terminal::paint(&msg, Color::RED, use_color));
            }
        }

        let total = items.len() as u32;
        match session.complete(&stitch.id, correct, total).await? {
            Some(outcome) => {
                let verdict = if outcome.perfect { "Perfect!" } else { "Keep practising." };
                println!(
                    "{}/{} {} Back in {} stitches (level {}).",
                    correct, total, verdict, outcome.new_position, outcome.new_distractor_level
                );
            }
            None => println!("{}/{}", correct, total),
        }
    }

    let summary = session.shutdown().await.context("Failed to save progress")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Plain => {
            println!();
            println!("{}", terminal::heading("Session summary", use_color));
            println!(
                "  Stitches: {} ({} perfect)",
                summary.stitches_completed, summary.perfect_stitches
            );
            match summary.accuracy() {
                Some(acc) => println!(
                    "  Answers:  {}/{} ({:.0}%)",
                    summary.questions_correct,
                    summary.questions_answered,
                    acc * 100.0
                ),
                None => println!("  Answers:  none"),
            }
            println!("  Cycles:   {}", summary.cycle_count);
        }
    }

    Ok(())
}

/// Prompt for one item; `None` when the learner quits or input ends
fn ask(input: &mut impl BufRead, number: usize, item: &DrillItem) -> Result<Option<usize>> {
    println!("Q{}: {}", number, item.prompt);
    for (n, option) in item.options.iter().enumerate() {
        println!("  {}) {}", n + 1, option);
    }

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let answer = line.trim();
        if answer.eq_ignore_ascii_case("q") {
            return Ok(None);
        }

        match answer.parse::<usize>() {
            Ok(n) if (1..=item.options.len()).contains(&n) => return Ok(Some(n - 1)),
            _ => {
                // Typing the answer itself counts too
                if let Some(idx) = item.options.iter().position(|o| o == answer) {
                    return Ok(Some(idx));
                }
                println!("Enter 1-{} (or q to stop)", item.options.len());
            }
        }
    }
}
