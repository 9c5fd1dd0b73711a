use crate::types::Program;

const HEADER: [&str; 4] = ["Program title", "Foreign title", "Episodes", "Program ID"];

fn pad(text: &str, width: usize) -> String {
    let len = text.chars().count();
    format!("{}{}", text, " ".repeat(width.saturating_sub(len)))
}

/// Format programs as an aligned plain-text table
pub fn format_program_table<'a>(programs: impl IntoIterator<Item = &'a Program>) -> String {
    let rows: Vec<[String; 4]> = programs
        .into_iter()
        .map(|p| {
            [
                p.title.clone(),
                p.foreign_title.clone().unwrap_or_default(),
                p.episodes.len().to_string(),
                p.id.clone(),
            ]
        })
        .collect();

    let mut widths = HEADER.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let format_row = |cells: [&str; 4]| {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| pad(cell, width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut output = String::new();
    output.push_str(&format_row(HEADER));
    output.push('\n');
    output.push_str(&format_row(widths.map(|w| "-".repeat(w)).each_ref().map(String::as_str)));
    output.push('\n');
    for row in &rows {
        output.push_str(&format_row(row.each_ref().map(String::as_str)));
        output.push('\n');
    }
    output
}

/// Format one program with its description and episode list
pub fn format_program_details(program: &Program) -> String {
    let mut output = String::new();

    output.push_str(&program.title);
    if let Some(foreign) = &program.foreign_title {
        output.push_str(&format!(" ({})", foreign));
    }
    output.push_str(&format!(" [{}]\n", program.id));

    if let Some(description) = &program.short_description {
        output.push_str(&format!("{}\n", description.trim()));
    }

    output.push('\n');
    for episode in &program.episodes {
        let title = if episode.title.is_empty() {
            "(untitled)"
        } else {
            &episode.title
        };
        output.push_str(&format!("  {}  {}\n", episode.id, title));
    }

    output
}
