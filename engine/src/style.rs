//! FILENAME: engine/src/style.rs
//! PURPOSE: Cell style data and a Flyweight registry for it.
//! CONTEXT: A cell's style is `(fg-colour, bg-colour, bold, italic,
//! underline)` — a small, highly-repeated tuple across a sheet — so
//! instead of storing it inline on every cell, cells keep a `style_index`
//! pointing into a shared `StyleRegistry` that deduplicates by value.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b }
    }

    pub fn black() -> Self {
        Color::new(0, 0, 0)
    }

    pub fn bright_white() -> Self {
        Color::new(255, 255, 255)
    }

    pub fn to_css(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// `(fg-colour, bg-colour, bold, italic, underline)` per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellStyle {
    pub foreground: Color,
    pub background: Color,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

impl CellStyle {
    pub fn new(foreground: Color, background: Color) -> Self {
        CellStyle { foreground, background, bold: false, italic: false, underline: false }
    }

    pub fn with_bold(mut self, bold: bool) -> Self {
        self.bold = bold;
        self
    }

    pub fn with_italic(mut self, italic: bool) -> Self {
        self.italic = italic;
        self
    }

    pub fn with_underline(mut self, underline: bool) -> Self {
        self.underline = underline;
        self
    }
}

/// Flyweight store: cells carry a `usize` index into `styles` rather than
/// a full `CellStyle`, and identical styles share one slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleRegistry {
    styles: Vec<CellStyle>,
    #[serde(skip)]
    style_to_index: HashMap<CellStyle, usize>,
    default_style: CellStyle,
}

impl StyleRegistry {
    pub fn new(default_style: CellStyle) -> Self {
        let mut registry = StyleRegistry { styles: Vec::new(), style_to_index: HashMap::new(), default_style };
        registry.get_or_create(default_style);
        registry
    }

    pub fn get_or_create(&mut self, style: CellStyle) -> usize {
        if let Some(&idx) = self.style_to_index.get(&style) {
            return idx;
        }
        let idx = self.styles.len();
        self.styles.push(style);
        self.style_to_index.insert(style, idx);
        idx
    }

    pub fn get(&self, index: usize) -> CellStyle {
        self.styles.get(index).copied().unwrap_or(self.default_style)
    }

    pub fn default_index(&self) -> usize {
        0
    }

    pub fn default_style(&self) -> CellStyle {
        self.default_style
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    /// Rebuilds the dedup index after deserializing (`style_to_index` is
    /// not persisted; see the `skip` attribute above).
    pub fn rebuild_index(&mut self) {
        self.style_to_index.clear();
        for (idx, style) in self.styles.iter().enumerate() {
            self.style_to_index.entry(*style).or_insert(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn factory_default() -> CellStyle {
        CellStyle::new(Color::bright_white(), Color::black())
    }

    #[test]
    fn identical_styles_share_one_slot() {
        let mut registry = StyleRegistry::new(factory_default());
        let a = registry.get_or_create(CellStyle::new(Color::black(), Color::bright_white()).with_bold(true));
        let b = registry.get_or_create(CellStyle::new(Color::black(), Color::bright_white()).with_bold(true));
        assert_eq!(a, b);
        assert_eq!(registry.len(), 2); // default + the one distinct style
    }

    #[test]
    fn distinct_styles_get_distinct_slots() {
        let mut registry = StyleRegistry::new(factory_default());
        let a = registry.get_or_create(CellStyle::new(Color::black(), Color::black()));
        let b = registry.get_or_create(CellStyle::new(Color::black(), Color::black()).with_italic(true));
        assert_ne!(a, b);
    }

    #[test]
    fn rebuild_index_restores_dedup_after_deserialize() {
        let mut registry = StyleRegistry::new(factory_default());
        registry.get_or_create(CellStyle::new(Color::black(), Color::black()));
        registry.style_to_index.clear();
        registry.rebuild_index();
        let again = registry.get_or_create(CellStyle::new(Color::black(), Color::black()));
        assert_eq!(registry.len(), 2);
        assert_eq!(again, 1);
    }
}
