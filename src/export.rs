//! Reporting over `list_all`: a fixed-width table for the terminal and CSV
//! for spreadsheets.

use std::io::Write;

use crate::types::{format_entities, Escalation};

const CSV_HEADER: [&str; 8] = [
    "id",
    "subject",
    "body",
    "status",
    "urgency",
    "entities",
    "created_at",
    "resolved_at",
];

/// Subject column width in the table view.
const SUBJECT_WIDTH: usize = 40;

pub fn write_csv<W: Write>(writer: W, escalations: &[Escalation]) -> Result<(), csv::Error> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(CSV_HEADER)?;
    for e in escalations {
        out.write_record([
            e.id.to_string().as_str(),
            e.subject.as_str(),
            e.body.as_str(),
            e.status.as_str(),
            e.urgency.as_str(),
            format_entities(&e.entities).as_str(),
            e.created_at.as_str(),
            e.resolved_at.as_deref().unwrap_or(""),
        ])?;
    }
    out.flush()?;
    Ok(())
}

fn fit(text: &str, width: usize) -> String {
    let single_line: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    if single_line.chars().count() <= width {
        return single_line;
    }
    let mut cut: String = single_line.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

pub fn render_table(escalations: &[Escalation]) -> String {
    if escalations.is_empty() {
        return "No escalations logged.\n".to_string();
    }

    let mut out = format!(
        "{:>5}  {:<width$}  {:<8}  {:<7}  {}\n",
        "ID",
        "SUBJECT",
        "STATUS",
        "URGENCY",
        "LOGGED",
        width = SUBJECT_WIDTH
    );
    for e in escalations {
        out.push_str(&format!(
            "{:>5}  {:<width$}  {:<8}  {:<7}  {}\n",
            e.id,
            fit(&e.subject, SUBJECT_WIDTH),
            e.status.as_str(),
            e.urgency.as_str(),
            if e.created_at.is_empty() { "-" } else { e.created_at.as_str() },
            width = SUBJECT_WIDTH
        ));
    }
    out
}
