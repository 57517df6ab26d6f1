//! Splitting input into simulated stream chunks.

/// Split `input` into pieces of at most `size` bytes, never cutting through a
/// UTF-8 sequence. A piece may exceed `size` only when a single character is
/// wider than `size`.
pub fn chunks(input: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut pieces = Vec::new();
    let mut start = 0;

    while start < input.len() {
        let mut end = (start + size).min(input.len());
        while !input.is_char_boundary(end) {
            end += 1;
        }
        pieces.push(&input[start..end]);
        start = end;
    }
    pieces
}
