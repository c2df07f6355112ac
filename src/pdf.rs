//! Page layout for the tabular exports, rendered through printpdf with the
//! built-in Helvetica fonts.

use anyhow::anyhow;
use printpdf::{BuiltinFont, Mm, PdfDocument, Pt};

const MARGIN: f32 = 40.0;
const TITLE_SIZE: f32 = 14.0;
const BODY_SIZE: f32 = 11.0;
const LEADING: f32 = 16.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    fn media_box(self) -> (f32, f32) {
        match self {
            Orientation::Portrait => (595.0, 842.0),
            Orientation::Landscape => (842.0, 595.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TableDoc {
    pub title: String,
    pub subtitle: String,
    pub orientation: Orientation,
    /// Column headers; empty means each row is a free-text paragraph.
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

struct Op {
    bold: bool,
    size: f32,
    x: f32,
    y: f32,
    text: String,
}

impl TableDoc {
    fn column_xs(&self, width: f32) -> Vec<f32> {
        let n = self.headers.len().max(1);
        let usable = width - 2.0 * MARGIN;
        (0..n).map(|i| MARGIN + usable * i as f32 / n as f32).collect()
    }

    fn max_chars(&self, width: f32) -> usize {
        let n = self.headers.len().max(1) as f32;
        let col = (width - 2.0 * MARGIN) / n;
        // Helvetica averages about half an em per glyph.
        ((col - 6.0) / (BODY_SIZE * 0.5)).max(4.0) as usize
    }

    fn layout(&self) -> Vec<Vec<Op>> {
        let (width, height) = self.orientation.media_box();
        let xs = self.column_xs(width);
        let max_chars = self.max_chars(width);
        let bottom = MARGIN;

        let mut pages: Vec<Vec<Op>> = Vec::new();
        let mut ops: Vec<Op> = Vec::new();
        let mut y = height - MARGIN - TITLE_SIZE;

        ops.push(Op { bold: true, size: TITLE_SIZE, x: MARGIN, y, text: self.title.clone() });
        y -= LEADING;
        ops.push(Op { bold: false, size: BODY_SIZE, x: MARGIN, y, text: self.subtitle.clone() });
        y -= LEADING * 2.0;

        let header_ops = |y: f32| -> Vec<Op> {
            self.headers
                .iter()
                .zip(&xs)
                .map(|(h, x)| Op { bold: true, size: BODY_SIZE, x: *x, y, text: h.clone() })
                .collect()
        };
        if !self.headers.is_empty() {
            ops.extend(header_ops(y));
            y -= LEADING;
        }

        let lines: Vec<Vec<String>> = if self.headers.is_empty() {
            let width_chars = ((width - 2.0 * MARGIN) / (BODY_SIZE * 0.5)) as usize;
            self.rows
                .iter()
                .flat_map(|r| wrap(&r.join(" "), width_chars).into_iter().map(|l| vec![l]))
                .collect()
        } else {
            self.rows
                .iter()
                .map(|r| r.iter().map(|c| truncate(c, max_chars)).collect())
                .collect()
        };

        for line in lines {
            if y < bottom {
                pages.push(std::mem::take(&mut ops));
                y = height - MARGIN - BODY_SIZE;
                if !self.headers.is_empty() {
                    ops.extend(header_ops(y));
                    y -= LEADING;
                }
            }
            for (cell, x) in line.into_iter().zip(&xs) {
                ops.push(Op { bold: false, size: BODY_SIZE, x: *x, y, text: cell });
            }
            y -= LEADING;
        }
        pages.push(ops);
        pages
    }

    pub fn render(&self) -> anyhow::Result<Vec<u8>> {
        let (width, height) = self.orientation.media_box();
        let (page_w, page_h) = (Mm::from(Pt(width)), Mm::from(Pt(height)));
        let (doc, first_page, first_layer) = PdfDocument::new(self.title.as_str(), page_w, page_h, "Layer 1");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| anyhow!("load Helvetica: {e}"))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| anyhow!("load Helvetica-Bold: {e}"))?;

        for (i, ops) in self.layout().into_iter().enumerate() {
            let (page, layer) = if i == 0 {
                (first_page, first_layer)
            } else {
                doc.add_page(page_w, page_h, "Layer 1")
            };
            let layer = doc.get_page(page).get_layer(layer);
            for op in ops {
                let font = if op.bold { &bold } else { &regular };
                layer.use_text(op.text, op.size, Mm::from(Pt(op.x)), Mm::from(Pt(op.y)), font);
            }
        }
        doc.save_to_bytes().map_err(|e| anyhow!("write pdf: {e}"))
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

fn wrap(s: &str, max: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut cur = String::new();
    for word in s.split_whitespace() {
        let needed = if cur.is_empty() { word.chars().count() } else { cur.chars().count() + 1 + word.chars().count() };
        if needed > max && !cur.is_empty() {
            lines.push(std::mem::take(&mut cur));
        }
        if !cur.is_empty() {
            cur.push(' ');
        }
        cur.push_str(word);
    }
    if !cur.is_empty() || lines.is_empty() {
        lines.push(cur);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(rows: usize) -> TableDoc {
        TableDoc {
            title: "Tlinky Crèche - Attendance Summary".to_string(),
            subtitle: "Generated on: 18 Oct 2026 09:00 UTC".to_string(),
            orientation: Orientation::Portrait,
            headers: vec!["Class".to_string(), "Present".to_string(), "Absent".to_string()],
            rows: (0..rows)
                .map(|i| vec![format!("Room {}", i), "3".to_string(), "1".to_string()])
                .collect(),
        }
    }

    #[test]
    fn renders_a_pdf_document() {
        let bytes = doc(3).render().expect("render");
        assert!(bytes.starts_with(b"%PDF-"));
        assert!(bytes.windows(5).any(|w| w == b"%%EOF"));
    }

    #[test]
    fn first_page_carries_title_and_headers() {
        let pages = doc(2).layout();
        assert_eq!(pages.len(), 1);
        let texts: Vec<&str> = pages[0].iter().map(|op| op.text.as_str()).collect();
        assert_eq!(texts[0], "Tlinky Crèche - Attendance Summary");
        assert!(pages[0][0].bold);
        assert_eq!(&texts[2..5], &["Class", "Present", "Absent"]);
        assert!(texts.contains(&"Room 1"));
    }

    #[test]
    fn long_tables_spill_onto_more_pages() {
        let pages = doc(120).layout();
        assert!(pages.len() > 1);
        let last = pages.last().expect("page");
        // Headers repeat at the top of each continuation page.
        assert_eq!(last[0].text, "Class");
        assert!(last.iter().any(|op| op.text == "Room 119"));
        assert!(pages.iter().flatten().all(|op| op.y >= MARGIN - LEADING));
    }

    #[test]
    fn paragraphs_wrap_on_word_boundaries() {
        assert_eq!(wrap("one two three", 7), vec!["one two", "three"]);
        assert_eq!(wrap("", 10), vec![""]);
        assert_eq!(truncate("abcdefghij", 6), "abc...");
        assert_eq!(truncate("abc", 6), "abc");

        let mut notes = doc(0);
        notes.headers.clear();
        notes.rows = vec![vec!["word ".repeat(200)]];
        let pages = notes.layout();
        assert!(pages[0].len() > 3);
    }
}
