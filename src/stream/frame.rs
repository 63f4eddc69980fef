/// Literal prefix of a data frame.
pub const DATA_PREFIX: &str = "data: ";

/// Literal line that ends a completion stream.
pub const DONE_LINE: &str = "data: [DONE]";

/// Classification of one wire line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    /// Blank line between events.
    Separator,
    /// `data: [DONE]`.
    Terminator,
    /// Payload following `data: `.
    Data(&'a str),
    /// Comments, keep-alives, `event:`/`id:` fields and anything else.
    Unrecognized,
}

/// Classify a single line. Surrounding whitespace is ignored.
#[must_use]
pub fn classify_line(line: &str) -> Frame<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Frame::Separator;
    }
    if line == DONE_LINE {
        return Frame::Terminator;
    }
    match line.strip_prefix(DATA_PREFIX) {
        Some(payload) => Frame::Data(payload),
        None => Frame::Unrecognized,
    }
}
