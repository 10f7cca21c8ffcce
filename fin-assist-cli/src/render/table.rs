use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use unicode_width::UnicodeWidthStr;

const CELL_SEPARATOR: &str = " │ ";

/// Lay out rows as aligned columns, one line per row, first row as header.
///
/// Ragged rows are padded with empty cells; the last column is not padded.
pub(crate) fn table_lines(rows: &[Vec<String>]) -> Vec<Line<'static>> {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    if columns == 0 {
        return Vec::new();
    }

    let mut widths = vec![0usize; columns];
    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(cell.width());
        }
    }

    rows.iter()
        .enumerate()
        .map(|(row_idx, row)| {
            let style = if row_idx == 0 && rows.len() > 1 {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };

            let mut spans = Vec::with_capacity(columns * 2);
            for (idx, width) in widths.iter().enumerate() {
                let cell = row.get(idx).map(String::as_str).unwrap_or("");
                if idx > 0 {
                    spans.push(Span::raw(CELL_SEPARATOR));
                }
                let text = if idx + 1 == columns {
                    cell.to_string()
                } else {
                    format!("{}{}", cell, " ".repeat(width.saturating_sub(cell.width())))
                };
                spans.push(Span::styled(text, style));
            }
            Line::from(spans)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::line_text;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_columns_are_aligned() {
        let lines = table_lines(&rows(&[&["Name", "Owes"], &["Alexandra", "$12.50"]]));
        let text: Vec<String> = lines.iter().map(line_text).collect();
        assert_eq!(text, vec!["Name      │ Owes", "Alexandra │ $12.50"]);
    }

    #[test]
    fn test_ragged_rows_are_padded() {
        let lines = table_lines(&rows(&[&["a", "b", "c"], &["d"]]));
        let text: Vec<String> = lines.iter().map(line_text).collect();
        assert_eq!(text[1], "d │   │ ");
    }

    #[test]
    fn test_empty_table() {
        assert!(table_lines(&[]).is_empty());
        assert!(table_lines(&[Vec::new()]).is_empty());
    }
}
