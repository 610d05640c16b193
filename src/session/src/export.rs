// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (C) 2025 Jonathan D.A. Jewell

//! Transcript export
//!
//! The conversation log becomes a [`TranscriptDocument`], is laid out into
//! wrapped lines and fixed-height pages, and is rendered to PDF bytes.

use crate::{ConversationLog, SessionError};
use chrono::{DateTime, Local};
use model_gateway::Role;
use printpdf::{BuiltinFont, Color, IndirectFontRef, Mm, PdfDocument, Rgb};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const EXPORT_FILENAME: &str = "basketballiq_chat.pdf";
pub const EXPORT_TITLE: &str = "BasketballIQ Chat History";
pub const EMPTY_NOTICE: &str = "No chat history available.";

const PAGE_WIDTH_MM: f32 = 215.9;
const PAGE_HEIGHT_MM: f32 = 279.4;
const MARGIN_MM: f32 = 20.0;
const LINE_HEIGHT_MM: f32 = 4.8;
const BODY_FONT_SIZE: f32 = 10.0;

// ============================================================================
// DOCUMENT MODEL
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptEntry {
    /// Sequential, starting at 1
    pub number: usize,
    pub role: Role,
    pub content: String,
}

impl TranscriptEntry {
    pub fn label(&self) -> &'static str {
        match self.role {
            Role::User => "You",
            Role::Assistant => "BasketballIQ",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptDocument {
    pub title: String,
    pub generated_on: String,
    pub entries: Vec<TranscriptEntry>,
}

impl TranscriptDocument {
    pub fn from_log(log: &ConversationLog, generated_at: DateTime<Local>) -> Self {
        Self {
            title: EXPORT_TITLE.to_string(),
            generated_on: generated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            entries: log
                .iter()
                .enumerate()
                .map(|(i, message)| TranscriptEntry {
                    number: i + 1,
                    role: message.role,
                    content: message.content.clone(),
                })
                .collect(),
        }
    }
}

// ============================================================================
// LAYOUT
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LineStyle {
    Title,
    Meta,
    Notice,
    UserLabel,
    User,
    AssistantLabel,
    Assistant,
    Blank,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Line {
    pub text: String,
    pub style: LineStyle,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Page {
    pub lines: Vec<Line>,
}

#[derive(Debug, Clone, Copy)]
pub struct PageLayout {
    /// Usable line width in thousandths of an em of the body font
    pub line_width: u32,
    pub lines_per_page: usize,
}

impl Default for PageLayout {
    fn default() -> Self {
        let usable_height = PAGE_HEIGHT_MM - 2.0 * MARGIN_MM;
        let usable_width_pt = (PAGE_WIDTH_MM - 2.0 * MARGIN_MM) * 72.0 / 25.4;
        Self {
            line_width: (usable_width_pt / BODY_FONT_SIZE * 1000.0) as u32,
            lines_per_page: (usable_height / LINE_HEIGHT_MM) as usize,
        }
    }
}

/// Upper-bound Helvetica advance width, in thousandths of an em.
///
/// Characters outside ASCII count as a full em.
pub fn glyph_width(c: char) -> u32 {
    match c {
        'i' | 'j' | 'l' | '\'' | '|' | '.' | ',' | ':' | ';' | '!' => 278,
        ' ' | 'f' | 'r' | 't' | 'I' | '/' | '\\' | '[' | ']' | '(' | ')' | '-' | '"' => 333,
        'm' | 'M' | 'W' | '@' | '%' => 1015,
        'w' => 722,
        'A'..='Z' => 778,
        'a'..='z' | '0'..='9' => 556,
        c if c.is_ascii() => 667,
        _ => 1000,
    }
}

pub fn text_width(text: &str) -> u32 {
    text.chars().map(glyph_width).sum()
}

/// Greedy word wrap by glyph width; words wider than `max_width` are split.
pub fn wrap_text(text: &str, max_width: u32) -> Vec<String> {
    let space = glyph_width(' ');
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut current = String::new();
        let mut current_width = 0;

        for word in paragraph.split_whitespace() {
            let mut word = word.to_string();
            let mut word_width = text_width(&word);
            while word_width > max_width {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                    current_width = 0;
                }
                // At least one glyph per line, even if it alone overflows
                let mut split = 0;
                let mut taken = 0;
                for (index, c) in word.char_indices() {
                    if split > 0 && taken + glyph_width(c) > max_width {
                        break;
                    }
                    taken += glyph_width(c);
                    split = index + c.len_utf8();
                }
                let rest = word.split_off(split);
                lines.push(word);
                word = rest;
                word_width -= taken;
            }
            if word.is_empty() {
                continue;
            }

            let extra = if current.is_empty() { word_width } else { word_width + space };
            if !current.is_empty() && current_width + extra > max_width {
                lines.push(std::mem::take(&mut current));
                current_width = 0;
            }
            if !current.is_empty() {
                current.push(' ');
                current_width += space;
            }
            current_width += word_width;
            current.push_str(&word);
        }
        lines.push(current);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn style_pair(role: Role) -> (LineStyle, LineStyle) {
    match role {
        Role::User => (LineStyle::UserLabel, LineStyle::User),
        Role::Assistant => (LineStyle::AssistantLabel, LineStyle::Assistant),
    }
}

/// Flow the document into pages. An entry may continue onto the next page.
pub fn layout(document: &TranscriptDocument, page_layout: &PageLayout) -> Vec<Page> {
    let mut lines = vec![
        Line {
            text: document.title.clone(),
            style: LineStyle::Title,
        },
        Line {
            text: String::new(),
            style: LineStyle::Blank,
        },
        Line {
            text: format!("Generated on: {}", document.generated_on),
            style: LineStyle::Meta,
        },
        Line {
            text: String::new(),
            style: LineStyle::Blank,
        },
    ];

    if document.entries.is_empty() {
        lines.push(Line {
            text: EMPTY_NOTICE.to_string(),
            style: LineStyle::Notice,
        });
    }

    for entry in &document.entries {
        let (label_style, body_style) = style_pair(entry.role);
        lines.push(Line {
            text: format!("{}. {}:", entry.number, entry.label()),
            style: label_style,
        });
        for text in wrap_text(&entry.content, page_layout.line_width) {
            lines.push(Line {
                text,
                style: body_style,
            });
        }
        lines.push(Line {
            text: String::new(),
            style: LineStyle::Blank,
        });
    }

    let per_page = page_layout.lines_per_page.max(1);
    let mut pages = Vec::new();
    let mut lines = lines.into_iter().peekable();
    while lines.peek().is_some() {
        pages.push(Page {
            lines: lines.by_ref().take(per_page).collect(),
        });
    }
    pages
}

// ============================================================================
// PDF RENDERING
// ============================================================================

fn rgb(r: f32, g: f32, b: f32) -> Color {
    Color::Rgb(Rgb::new(r, g, b, None))
}

fn export_error(e: impl std::fmt::Display) -> SessionError {
    SessionError::Export(e.to_string())
}

pub fn render_pdf(title: &str, pages: &[Page]) -> Result<Vec<u8>, SessionError> {
    let (doc, first_page, first_layer) = PdfDocument::new(
        title,
        Mm(PAGE_WIDTH_MM),
        Mm(PAGE_HEIGHT_MM),
        "Layer 1",
    );
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(export_error)?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(export_error)?;

    for (index, page) in pages.iter().enumerate() {
        let (page_index, layer_index) = if index == 0 {
            (first_page, first_layer)
        } else {
            doc.add_page(
                Mm(PAGE_WIDTH_MM),
                Mm(PAGE_HEIGHT_MM),
                format!("Layer {}", index + 1),
            )
        };
        let layer = doc.get_page(page_index).get_layer(layer_index);

        let mut y = PAGE_HEIGHT_MM - MARGIN_MM;
        for line in &page.lines {
            let (font, size, color): (&IndirectFontRef, f32, Color) = match line.style {
                LineStyle::Title => (&bold, 18.0, rgb(0.0, 0.0, 0.0)),
                LineStyle::Meta | LineStyle::Notice => {
                    (&regular, BODY_FONT_SIZE, rgb(0.2, 0.2, 0.2))
                }
                LineStyle::UserLabel => (&bold, BODY_FONT_SIZE, rgb(0.09, 0.56, 1.0)),
                LineStyle::User => (&regular, BODY_FONT_SIZE, rgb(0.0, 0.2, 0.5)),
                LineStyle::AssistantLabel => (&bold, BODY_FONT_SIZE, rgb(1.0, 0.29, 0.29)),
                LineStyle::Assistant => (&regular, BODY_FONT_SIZE, rgb(0.25, 0.25, 0.25)),
                LineStyle::Blank => {
                    y -= LINE_HEIGHT_MM;
                    continue;
                }
            };
            layer.set_fill_color(color);
            layer.use_text(line.text.clone(), size, Mm(MARGIN_MM), Mm(y), font);
            y -= if line.style == LineStyle::Title {
                LINE_HEIGHT_MM * 2.0
            } else {
                LINE_HEIGHT_MM
            };
        }
    }

    let bytes = doc.save_to_bytes().map_err(export_error)?;
    info!(pages = pages.len(), bytes = bytes.len(), "rendered transcript PDF");
    Ok(bytes)
}

/// Lay out and render the log in one step
pub fn export_transcript(
    log: &ConversationLog,
    generated_at: DateTime<Local>,
) -> Result<Vec<u8>, SessionError> {
    let document = TranscriptDocument::from_log(log, generated_at);
    let pages = layout(&document, &PageLayout::default());
    render_pdf(&document.title, &pages)
}
