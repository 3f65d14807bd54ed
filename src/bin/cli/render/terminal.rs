use helix_lib::content::SourceTier;
use helix_lib::scheduler::StitchPosition;

/// ANSI color codes
#[allow(dead_code)]
pub struct Color;

#[allow(dead_code)]
impl Color {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";
}

/// Wrap `text` in a color when color is on
pub fn paint(text: &str, color: &str, use_color: bool) -> String {
    if use_color {
        format!("{}{}{}", color, text, Color::RESET)
    } else {
        text.to_string()
    }
}

pub fn heading(text: &str, use_color: bool) -> String {
    paint(text, Color::BOLD, use_color)
}

/// Short label for where content came from; empty for the usual tiers
pub fn source_badge(source: SourceTier, use_color: bool) -> String {
    match source {
        SourceTier::Synthetic => paint("[placeholder]", Color::YELLOW, use_color),
        SourceTier::Network => paint("[downloaded]", Color::GRAY, use_color),
        _ => String::new(),
    }
}

/// One row of a tube listing
pub fn position_row(p: &StitchPosition, use_color: bool) -> String {
    let marker = if p.position == 0 { "▶" } else { " " };
    let retired = if p.is_retired() { " retired" } else { "" };
    let stats = format!(
        "skip {:>3}  level {}  perfect {}{}",
        p.skip_number, p.distractor_level, p.perfect_completion_count, retired
    );
    format!(
        "{} {:>3}  {:<16} {}",
        marker,
        p.position,
        p.stitch_id,
        paint(&stats, Color::DIM, use_color)
    )
}

/// Simple word-wrapping for terminal output
pub fn wrap_lines(text: &str, prefix: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let effective_width = max_width.saturating_sub(prefix.len());

    for line in text.lines() {
        if line.len() <= effective_width {
            lines.push(format!("{}{}", prefix, line));
        } else {
            let mut current_line = String::new();
            for word in line.split_whitespace() {
                if current_line.is_empty() {
                    current_line = word.to_string();
                } else if current_line.len() + 1 + word.len() <= effective_width {
                    current_line.push(' ');
                    current_line.push_str(word);
                } else {
                    lines.push(format!("{}{}", prefix, current_line));
                    current_line = word.to_string();
                }
            }
            if !current_line.is_empty() {
                lines.push(format!("{}{}", prefix, current_line));
            }
        }
    }

    lines
}
