// Recursive character text splitter.
//
// Splits on the coarsest separator that yields pieces within the chunk
// size, recursing into finer separators for oversized pieces, then merges
// adjacent pieces back up to the chunk size with a sliding overlap.

const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
        }
    }

    /// Split text into chunks of at most `chunk_size` characters with
    /// `chunk_overlap` characters carried between adjacent chunks
    pub fn split(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        if text.chars().count() <= self.chunk_size {
            return vec![text.to_string()];
        }
        self.split_recursive(text, &SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (separator, remaining) = match separators.split_first() {
            Some((sep, rest)) => (*sep, rest),
            None => return self.split_fixed(text),
        };

        let pieces: Vec<&str> = text.split(separator).collect();
        if pieces.len() == 1 {
            // Separator absent, try the next finer one
            return self.split_recursive(text, remaining);
        }

        let mut expanded: Vec<String> = Vec::new();
        for piece in pieces {
            if piece.is_empty() {
                continue;
            }
            if piece.chars().count() > self.chunk_size {
                expanded.extend(if remaining.is_empty() {
                    self.split_fixed(piece)
                } else {
                    self.split_recursive(piece, remaining)
                });
            } else {
                expanded.push(piece.to_string());
            }
        }

        self.merge_pieces(expanded, separator)
    }

    /// Merge small pieces into chunks up to the size limit, carrying overlap
    /// pieces forward between chunks
    fn merge_pieces(&self, pieces: Vec<String>, separator: &str) -> Vec<String> {
        let sep_len = separator.chars().count();
        let mut chunks: Vec<String> = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_len = 0usize;

        for piece in pieces {
            let piece_len = piece.chars().count();
            let added = piece_len + if current.is_empty() { 0 } else { sep_len };

            if current_len + added > self.chunk_size && !current.is_empty() {
                chunks.push(current.join(separator));

                // Retain trailing pieces as overlap for the next chunk
                while current_len > self.chunk_overlap
                    || (current_len + piece_len + sep_len > self.chunk_size && !current.is_empty())
                {
                    let removed = current.remove(0);
                    current_len -= removed.chars().count()
                        + if current.is_empty() { 0 } else { sep_len };
                    if current.is_empty() {
                        current_len = 0;
                        break;
                    }
                }
            }

            if !current.is_empty() {
                current_len += sep_len;
            }
            current_len += piece_len;
            current.push(piece);
        }

        if !current.is_empty() {
            chunks.push(current.join(separator));
        }

        chunks.into_iter().filter(|c| !c.trim().is_empty()).collect()
    }

    /// Last resort: hard split at the character level with overlap
    fn split_fixed(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let step = self.chunk_size.saturating_sub(self.chunk_overlap).max(1);
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            chunks.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }
        chunks
    }
}
