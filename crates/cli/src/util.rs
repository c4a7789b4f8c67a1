use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use freightrecon_core::format_cents;

/// Cut `s` to at most `width` display columns, ending in ".." when cut.
/// Customer names and service labels can be CJK, so this counts columns, not bytes.
pub(crate) fn truncate_display(s: &str, width: usize) -> String {
    if UnicodeWidthStr::width(s) <= width {
        return s.to_string();
    }
    if width < 3 {
        return s
            .chars()
            .find(|ch| ch.width().unwrap_or(0) <= width)
            .map(String::from)
            .unwrap_or_default();
    }

    let budget = width - 2;
    let mut used = 0;
    let mut out = String::new();
    for ch in s.chars() {
        let cw = ch.width().unwrap_or(0);
        if used + cw > budget {
            break;
        }
        used += cw;
        out.push(ch);
    }
    out.push_str("..");
    out
}

fn pad(s: &str, width: usize, right_align: bool) -> String {
    let cell = truncate_display(s, width);
    let fill = " ".repeat(width.saturating_sub(UnicodeWidthStr::width(cell.as_str())));
    if right_align {
        format!("{fill}{cell}")
    } else {
        format!("{cell}{fill}")
    }
}

/// Amount with currency, e.g. `12.50 GBP`.
pub(crate) fn money(cents: i64, currency: &str) -> String {
    format!("{} {}", format_cents(cents), currency)
}

/// Signed difference, e.g. `+1.25`.
pub(crate) fn signed_cents(cents: i64) -> String {
    if cents > 0 {
        format!("+{}", format_cents(cents))
    } else {
        format_cents(cents)
    }
}

#[derive(Clone, Copy)]
pub(crate) enum Align {
    Left,
    Right,
}

/// Plain-text table. Columns size to their widest cell, capped at `max`.
pub(crate) struct Table {
    columns: Vec<(&'static str, Align, usize)>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub(crate) fn new(columns: &[(&'static str, Align, usize)]) -> Self {
        Self { columns: columns.to_vec(), rows: Vec::new() }
    }

    pub(crate) fn row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    pub(crate) fn render(&self) -> String {
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, (title, _, max))| {
                self.rows
                    .iter()
                    .filter_map(|r| r.get(i))
                    .map(|c| UnicodeWidthStr::width(c.as_str()))
                    .chain(std::iter::once(title.len()))
                    .max()
                    .unwrap_or(0)
                    .min(*max)
            })
            .collect();

        let line = |cells: Vec<&str>| -> String {
            let parts: Vec<String> = cells
                .iter()
                .zip(&self.columns)
                .zip(&widths)
                .map(|((cell, (_, align, _)), w)| pad(cell, *w, matches!(align, Align::Right)))
                .collect();
            parts.join("  ").trim_end().to_string()
        };

        let mut out = line(self.columns.iter().map(|(t, _, _)| *t).collect());
        out.push('\n');
        for r in &self.rows {
            out.push_str(&line(r.iter().map(String::as_str).collect()));
            out.push('\n');
        }
        out
    }
}
