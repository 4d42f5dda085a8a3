//! Character based text chunking with overlap.

/// Iterator over overlapping windows of `size` characters.
///
/// Each window after the first starts `overlap` characters before the end of the
/// previous one. Iteration ends with the window that reaches the end of the text.
#[derive(Debug, Clone)]
pub struct Chunks<'text> {
    text: &'text str,
    /// Byte offset of every char boundary, plus `text.len()`.
    boundaries: Vec<usize>,
    size: usize,
    overlap: usize,
    /// Char index of the next window, `None` once exhausted.
    next_start: Option<usize>,
}

impl<'text> Chunks<'text> {
    /// `size` must be positive; an `overlap >= size` is clamped so every step advances.
    pub fn new(text: &'text str, size: usize, overlap: usize) -> Self {
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(core::iter::once(text.len()))
            .collect();
        Self {
            text,
            next_start: (!text.is_empty()).then_some(0),
            boundaries,
            size: size.max(1),
            overlap,
        }
    }

    fn char_count(&self) -> usize {
        self.boundaries.len().saturating_sub(1)
    }
}

impl<'text> Iterator for Chunks<'text> {
    type Item = &'text str;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next_start?;
        let len = self.char_count();
        let end = start.saturating_add(self.size).min(len);

        self.next_start = (end < len).then(|| end.saturating_sub(self.overlap).max(start + 1));

        let from = *self.boundaries.get(start)?;
        let to = *self.boundaries.get(end)?;
        self.text.get(from..to)
    }
}

/// Splits `text` into overlapping chunks; see [`Chunks`].
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Chunks<'_> {
    Chunks::new(text, size, overlap)
}
