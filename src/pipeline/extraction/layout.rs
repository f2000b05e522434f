//! Row assembly: turn positioned OCR fragments into reading-order lines.
//!
//! Tabular lab reports are often segmented column by column, so the name
//! cell, value cell and range cell of one row come back as separate
//! fragments. Fragments whose vertical extents overlap are merged into a
//! single line, left to right.

use super::sanitize::sanitize_line;
use super::types::{OcrPageResult, OcrWordResult, RecognizedLine};

struct Row<'a> {
    top: u32,
    bottom: u32,
    cells: Vec<&'a OcrWordResult>,
}

impl Row<'_> {
    fn center(&self) -> f32 {
        (self.top as f32 + self.bottom as f32) / 2.0
    }
}

/// Lines of one page in top-to-bottom order, numbered from `first_index`.
///
/// Falls back to the engine's plain text when any fragment lacks a box.
pub fn assemble_lines(
    page: &OcrPageResult,
    page_number: usize,
    first_index: usize,
) -> Vec<RecognizedLine> {
    let positioned = !page.fragments.is_empty()
        && page.fragments.iter().all(|f| f.bounding_box.is_some());
    if !positioned {
        return lines_from_text(&page.text, page_number, first_index);
    }

    let mut fragments: Vec<&OcrWordResult> = page.fragments.iter().collect();
    fragments.sort_by(|a, b| {
        let (a, b) = (a.bounding_box.unwrap_or_default(), b.bounding_box.unwrap_or_default());
        a.center_y().total_cmp(&b.center_y()).then(a.x.cmp(&b.x))
    });

    let mut rows: Vec<Row<'_>> = Vec::new();
    for fragment in fragments {
        let bbox = fragment.bounding_box.unwrap_or_default();
        let (top, bottom) = (bbox.y, bbox.y + bbox.height);

        let joins_last = rows.last().is_some_and(|row| {
            let c = bbox.center_y();
            (c >= row.top as f32 && c <= row.bottom as f32)
                || (row.center() >= top as f32 && row.center() <= bottom as f32)
        });

        match rows.last_mut() {
            Some(row) if joins_last => {
                row.top = row.top.min(top);
                row.bottom = row.bottom.max(bottom);
                row.cells.push(fragment);
            }
            _ => rows.push(Row {
                top,
                bottom,
                cells: vec![fragment],
            }),
        }
    }

    rows.iter_mut()
        .map(|row| {
            row.cells
                .sort_by_key(|c| c.bounding_box.map(|b| b.x).unwrap_or_default());
            let text = row
                .cells
                .iter()
                .map(|c| c.text.trim())
                .collect::<Vec<_>>()
                .join(" ");
            let x = row
                .cells
                .iter()
                .filter_map(|c| c.bounding_box.map(|b| b.x))
                .min()
                .unwrap_or_default();
            (sanitize_line(&text), x, row.top)
        })
        .filter(|(text, _, _)| !text.is_empty())
        .enumerate()
        .map(|(i, (text, x, y))| RecognizedLine {
            text,
            index: first_index + i,
            x,
            y,
            page: page_number,
        })
        .collect()
}

/// One line per non-blank source line; `x` is the indentation in columns
/// and `y` the source line number.
pub fn lines_from_text(text: &str, page_number: usize, first_index: usize) -> Vec<RecognizedLine> {
    text.lines()
        .enumerate()
        .filter_map(|(row, raw)| {
            let indent = raw
                .chars()
                .take_while(|c| c.is_whitespace())
                .map(|c| if c == '\t' { 4 } else { 1 })
                .sum::<u32>();
            let clean = sanitize_line(raw);
            (!clean.is_empty()).then_some((clean, indent, row as u32))
        })
        .enumerate()
        .map(|(i, (text, x, y))| RecognizedLine {
            text,
            index: first_index + i,
            x,
            y,
            page: page_number,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::BoundingBox;

    fn cell(text: &str, x: u32, y: u32, height: u32) -> OcrWordResult {
        OcrWordResult {
            text: text.into(),
            confidence: 0.9,
            bounding_box: Some(BoundingBox {
                x,
                y,
                width: text.len() as u32 * 10,
                height,
            }),
        }
    }

    fn page(fragments: Vec<OcrWordResult>) -> OcrPageResult {
        OcrPageResult {
            text: String::new(),
            confidence: 0.9,
            fragments,
        }
    }

    #[test]
    fn table_cells_merge_into_rows() {
        // Column-major order, as a page segmenter returns table columns.
        let lines = assemble_lines(
            &page(vec![
                cell("Glucose", 10, 100, 20),
                cell("Cholesterol", 10, 130, 20),
                cell("6.8", 200, 102, 18),
                cell("5.2", 200, 131, 18),
                cell("mmol/L (3.9-5.5)", 300, 99, 22),
                cell("mmol/L (3.0-5.5)", 300, 129, 22),
            ]),
            0,
            0,
        );
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["Glucose 6.8 mmol/L (3.9-5.5)", "Cholesterol 5.2 mmol/L (3.0-5.5)"]
        );
        assert_eq!(lines[0].x, 10);
        assert!(lines[0].y < lines[1].y);
    }

    #[test]
    fn indices_continue_from_first_index() {
        let lines = assemble_lines(
            &page(vec![cell("a", 0, 0, 10), cell("b", 0, 50, 10)]),
            2,
            7,
        );
        assert_eq!(lines[0].index, 7);
        assert_eq!(lines[1].index, 8);
        assert!(lines.iter().all(|l| l.page == 2));
    }

    #[test]
    fn unpositioned_fragments_fall_back_to_text() {
        let result = OcrPageResult {
            text: "first\n\n  second".into(),
            confidence: 0.8,
            fragments: vec![OcrWordResult {
                text: "first".into(),
                confidence: 0.8,
                bounding_box: None,
            }],
        };
        let lines = assemble_lines(&result, 0, 0);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].text, "second");
        assert_eq!(lines[1].x, 2);
        assert_eq!(lines[1].y, 2);
    }

    #[test]
    fn blank_fragments_dropped() {
        let lines = assemble_lines(&page(vec![cell("\x01", 0, 0, 10), cell("x", 0, 40, 10)]), 0, 0);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].index, 0);
    }
}
