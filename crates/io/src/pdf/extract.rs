//! Positioned text extraction on top of `pdf-extract`'s output device.

use std::panic::{self, AssertUnwindSafe};

use pdf_extract::{Document, MediaBox, OutputDev, OutputError, Transform};

use super::layout::TextFragment;
use crate::error::FormatError;

/// Gap between glyphs, in glyph heights, that starts a new fragment.
const WORD_GAP: f64 = 0.6;

/// Load a PDF and collect its text fragments in document order.
pub fn extract_fragments(bytes: &[u8]) -> Result<Vec<TextFragment>, FormatError> {
    let doc = match Document::load_mem(bytes) {
        Ok(doc) => doc,
        Err(e) => {
            if looks_encrypted(bytes) {
                return Err(FormatError::EncryptedPdf);
            }
            return Err(FormatError::Pdf(e.to_string()));
        }
    };
    if doc.is_encrypted() {
        return Err(FormatError::EncryptedPdf);
    }

    let mut collector = FragmentCollector::default();
    // pdf-extract panics on some malformed content streams
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::output_doc(&doc, &mut collector)));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(FormatError::Pdf(e.to_string())),
        Err(_) => return Err(FormatError::Pdf("text extraction aborted on malformed page content".into())),
    }

    collector.flush();
    log::debug!("pdf: {} fragment(s) from {} page(s)", collector.fragments.len(), collector.pages);
    Ok(collector.fragments)
}

fn looks_encrypted(bytes: &[u8]) -> bool {
    bytes.windows(8).any(|w| w == b"/Encrypt")
}

struct Pending {
    text: String,
    x: f64,
    y: f64,
    height: f64,
    end_x: f64,
    trailing_spaces: usize,
}

#[derive(Default)]
struct FragmentCollector {
    fragments: Vec<TextFragment>,
    pending: Option<Pending>,
    page_height: f64,
    page_offset: f64,
    pages: u32,
}

impl FragmentCollector {
    fn flush(&mut self) {
        if let Some(p) = self.pending.take() {
            let text = p.text.trim().to_string();
            if !text.is_empty() {
                self.fragments.push(TextFragment::new(text, p.x, p.y, p.height));
            }
        }
    }
}

impl OutputDev for FragmentCollector {
    fn begin_page(&mut self, _page_num: u32, media_box: &MediaBox, _art_box: Option<(f64, f64, f64, f64)>) -> Result<(), OutputError> {
        self.flush();
        self.page_height = media_box.ury - media_box.lly;
        Ok(())
    }

    fn end_page(&mut self) -> Result<(), OutputError> {
        self.flush();
        self.page_offset += self.page_height;
        self.pages += 1;
        Ok(())
    }

    fn output_character(&mut self, trm: &Transform, width: f64, _spacing: f64, font_size: f64, char: &str) -> Result<(), OutputError> {
        // Flip to top-down coordinates and stack pages
        let x = trm.m31;
        let y = self.page_offset + (self.page_height - trm.m32);
        let sx = font_size * (trm.m11 + trm.m21);
        let sy = font_size * (trm.m12 + trm.m22);
        let height = (sx * sy).abs().sqrt();
        let advance = width * height;

        let is_space = char.chars().all(char::is_whitespace);

        let continues = match &self.pending {
            Some(p) => {
                (y - p.y).abs() <= height * 0.5
                    && x >= p.end_x - height
                    && x <= p.end_x + height * WORD_GAP
                    && p.trailing_spaces < 2
            }
            None => false,
        };

        if !continues {
            self.flush();
            if is_space {
                return Ok(());
            }
            self.pending = Some(Pending {
                text: String::new(),
                x,
                y,
                height,
                end_x: x,
                trailing_spaces: 0,
            });
        }

        if let Some(p) = self.pending.as_mut() {
            if is_space {
                p.trailing_spaces += 1;
            } else {
                p.trailing_spaces = 0;
            }
            p.text.push_str(char);
            p.end_x = x + advance;
            p.height = p.height.max(height);
        }
        Ok(())
    }

    fn begin_word(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn end_word(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn end_line(&mut self) -> Result<(), OutputError> {
        self.flush();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_is_a_pdf_error() {
        let err = extract_fragments(b"%PDF-1.4\nnot really").unwrap_err();
        assert!(matches!(err, FormatError::Pdf(_)), "{err:?}");
    }

    #[test]
    fn unreadable_with_encrypt_marker_is_encrypted() {
        let err = extract_fragments(b"%PDF-1.4\n<< /Encrypt 5 0 R >>").unwrap_err();
        assert!(matches!(err, FormatError::EncryptedPdf), "{err:?}");
    }
}
