use codespan_reporting::files::SimpleFiles;

/// Byte offset into a script file.
pub type ByteOffset = usize;

/// 1-based line number in a script file.
pub type LineNo = usize;

/// A span of script text, represented as a byte range into the whole file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: ByteOffset,
    pub end: ByteOffset,
}

impl Span {
    pub fn new(start: ByteOffset, end: ByteOffset) -> Self {
        Self { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Move a line-relative span so it is relative to the start of the file.
    pub fn offset(self, by: ByteOffset) -> Span {
        Span {
            start: self.start + by,
            end: self.end + by,
        }
    }

    pub fn to_range(self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

impl From<std::ops::Range<usize>> for Span {
    fn from(range: std::ops::Range<usize>) -> Self {
        Span {
            start: range.start,
            end: range.end,
        }
    }
}

impl From<Span> for std::ops::Range<usize> {
    fn from(span: Span) -> Self {
        span.start..span.end
    }
}

/// File id for codespan-reporting.
pub type FileId = usize;

/// Script file database using codespan-reporting.
pub type SourceDb = SimpleFiles<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_covers_both() {
        let a = Span::new(4, 8);
        let b = Span::new(2, 5);
        assert_eq!(a.merge(b), Span::new(2, 8));
    }

    #[test]
    fn offset_shifts_both_ends() {
        assert_eq!(Span::new(1, 3).offset(10), Span::new(11, 13));
        assert_eq!(Span::new(1, 3).to_range(), 1..3);
    }
}
