/// A line of a newline delimited request body.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Line<'a> {
    /// The 1-based line number within the body.
    pub number: usize,
    /// The contents of the line without the line terminator.
    pub data: &'a [u8],
}

/// Iterator over the non-blank lines of a body, returned by [`lines`].
#[derive(Clone, Debug)]
pub struct Lines<'a> {
    rest: &'a [u8],
    number: usize,
}

/// Splits a body into lines at `\n` or `\r\n`, skipping lines that only contain whitespace.
///
/// ```
/// use ingest_ourlogs::lines;
///
/// let numbers: Vec<_> = lines(b"{}\r\n\n  \n{}").map(|line| line.number).collect();
/// assert_eq!(numbers, [1, 4]);
/// ```
pub fn lines(data: &[u8]) -> Lines<'_> {
    Lines {
        rest: data,
        number: 0,
    }
}

impl<'a> Iterator for Lines<'a> {
    type Item = Line<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.rest.is_empty() {
            let (line, rest) = match self.rest.iter().position(|&b| b == b'\n') {
                Some(end) => (&self.rest[..end], &self.rest[end + 1..]),
                None => (self.rest, &self.rest[self.rest.len()..]),
            };

            self.rest = rest;
            self.number += 1;

            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if !line.iter().all(u8::is_ascii_whitespace) {
                return Some(Line {
                    number: self.number,
                    data: line,
                });
            }
        }

        None
    }
}
