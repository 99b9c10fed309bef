//! Source positions for YAML test files.
//!
//! `serde_yaml` does not expose node marks, so the text is parsed a second
//! time with `yaml-rust2`'s marked event stream. Every mapping value and
//! sequence item, in block or flow style, gets a range keyed by its
//! [`StructuralPath`]. A mapping value's range starts at its key.

use super::path::StructuralPath;
use serde::Serialize;
use std::collections::BTreeMap;
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser};
use yaml_rust2::scanner::{Marker, TScalarStyle};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceRange {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Default)]
pub struct PositionIndex {
    ranges: BTreeMap<StructuralPath, SourceRange>,
    document: SourceRange,
}

impl PositionIndex {
    pub fn build(source: &str) -> Self {
        let lines: Vec<&str> = source.lines().collect();
        let mut indexer = Indexer {
            lines: &lines,
            stack: Vec::new(),
            last_end: Cursor::default(),
            ranges: BTreeMap::new(),
        };
        let mut parser = Parser::new_from_str(source);
        if let Err(error) = parser.load(&mut indexer, false) {
            tracing::debug!("Position index is partial: {error}");
        }

        let last_line = lines.len().saturating_sub(1);
        Self {
            ranges: indexer.ranges,
            document: SourceRange {
                start: Position::default(),
                end: point(last_line, line_len(&lines, last_line)),
            },
        }
    }

    pub fn get(&self, path: &StructuralPath) -> Option<SourceRange> {
        if path.is_root() {
            return Some(self.document);
        }
        self.ranges.get(path).copied()
    }

    /// Range of `path`, or of its closest indexed ancestor.
    pub fn nearest(&self, path: &StructuralPath) -> SourceRange {
        (0..=path.segments().len())
            .rev()
            .find_map(|len| self.get(&path.prefix(len)))
            .unwrap_or(self.document)
    }

    pub fn document(&self) -> SourceRange {
        self.document
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

fn point(line: usize, character: usize) -> Position {
    Position {
        line: u32::try_from(line).unwrap_or(u32::MAX),
        character: u32::try_from(character).unwrap_or(u32::MAX),
    }
}

fn line_len(lines: &[&str], line: usize) -> usize {
    lines
        .get(line)
        .map(|text| text.trim_end().chars().count())
        .unwrap_or(0)
}

/// Zero-based line and character.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Cursor {
    line: usize,
    col: usize,
}

impl From<Marker> for Cursor {
    fn from(mark: Marker) -> Self {
        Self {
            line: mark.line().saturating_sub(1),
            col: mark.col(),
        }
    }
}

enum FrameKind {
    Mapping { pending_key: Option<(String, Cursor)> },
    Sequence { next_index: usize },
}

struct Frame {
    path: StructuralPath,
    start: Cursor,
    flow: bool,
    /// False for complex keys and everything nested in them.
    record: bool,
    is_key: bool,
    kind: FrameKind,
}

/// Where the next node lands in the tree being built.
enum Slot {
    Key,
    Value { path: StructuralPath, start: Cursor },
    Ignored,
}

struct Indexer<'l, 's> {
    lines: &'l [&'s str],
    stack: Vec<Frame>,
    /// End of the last scalar or collection seen; block collections end here.
    last_end: Cursor,
    ranges: BTreeMap<StructuralPath, SourceRange>,
}

impl Indexer<'_, '_> {
    fn claim(&mut self, at: Cursor) -> Slot {
        let Some(frame) = self.stack.last_mut() else {
            return Slot::Value {
                path: StructuralPath::root(),
                start: at,
            };
        };
        let slot = match &mut frame.kind {
            FrameKind::Sequence { next_index } => {
                let path = frame.path.index(*next_index);
                *next_index += 1;
                Slot::Value { path, start: at }
            }
            FrameKind::Mapping { pending_key } => match pending_key.take() {
                Some((key, key_start)) => Slot::Value {
                    path: frame.path.key(key),
                    start: key_start,
                },
                None => Slot::Key,
            },
        };
        match slot {
            Slot::Value { .. } if !frame.record => Slot::Ignored,
            slot => slot,
        }
    }

    fn set_pending_key(&mut self, key: String, start: Cursor) {
        if let Some(Frame {
            kind: FrameKind::Mapping { pending_key },
            ..
        }) = self.stack.last_mut()
        {
            *pending_key = Some((key, start));
        }
    }

    fn record(&mut self, path: StructuralPath, start: Cursor, end: Cursor) {
        if path.is_root() {
            return;
        }
        self.ranges.insert(
            path,
            SourceRange {
                start: point(start.line, start.col),
                end: point(end.line, end.col),
            },
        );
    }

    fn scalar(&mut self, at: Cursor, value: String, style: TScalarStyle) {
        let end = self.scalar_end(at, &value, style);
        self.last_end = end;
        match self.claim(at) {
            Slot::Key => self.set_pending_key(value, at),
            Slot::Value { path, start } => self.record(path, start, end),
            Slot::Ignored => {}
        }
    }

    fn open(&mut self, at: Cursor, kind: FrameKind) {
        let flow = self.char_at(at).is_some_and(|c| c == '[' || c == '{');
        let parent_records = self.stack.last().map_or(true, |frame| frame.record);
        let (path, start, record, is_key) = match self.claim(at) {
            Slot::Value { path, start } => (path, start, parent_records, false),
            Slot::Key => (StructuralPath::root(), at, false, true),
            Slot::Ignored => (StructuralPath::root(), at, false, false),
        };
        self.stack.push(Frame {
            path,
            start,
            flow,
            record,
            is_key,
            kind,
        });
    }

    fn close(&mut self, at: Cursor) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        let end = if frame.flow {
            Cursor {
                line: at.line,
                col: at.col + 1,
            }
        } else {
            self.last_end
        };
        self.last_end = end;
        if frame.is_key {
            self.set_pending_key(String::new(), frame.start);
        } else if frame.record {
            self.record(frame.path, frame.start, end);
        }
    }

    fn char_at(&self, at: Cursor) -> Option<char> {
        self.lines.get(at.line)?.chars().nth(at.col)
    }

    fn scalar_end(&self, at: Cursor, value: &str, style: TScalarStyle) -> Cursor {
        match style {
            TScalarStyle::SingleQuoted | TScalarStyle::DoubleQuoted => {
                self.quoted_end(at).unwrap_or(self.last_end)
            }
            TScalarStyle::Literal | TScalarStyle::Folded => {
                let line = at.line + value.lines().count();
                Cursor {
                    line,
                    col: line_len(self.lines, line),
                }
            }
            _ => {
                let first = value.lines().next().unwrap_or_default();
                let rest: String = self
                    .lines
                    .get(at.line)
                    .map(|text| text.chars().skip(at.col).collect())
                    .unwrap_or_default();
                if first.is_empty() || !rest.starts_with(first) {
                    // Empty (null) scalars are reported at the next token.
                    return self.last_end;
                }
                Cursor {
                    line: at.line,
                    col: at.col + first.chars().count(),
                }
            }
        }
    }

    /// Position just past the closing quote of the scalar opening at `at`.
    fn quoted_end(&self, at: Cursor) -> Option<Cursor> {
        let quote = self.char_at(at)?;
        let mut skip = at.col + 1;
        for (line, text) in self.lines.iter().enumerate().skip(at.line) {
            let chars: Vec<char> = text.chars().collect();
            let mut col = skip;
            while col < chars.len() {
                let c = chars[col];
                if quote == '"' && c == '\\' {
                    col += 2;
                    continue;
                }
                if c == quote {
                    if quote == '\'' && chars.get(col + 1) == Some(&'\'') {
                        col += 2;
                        continue;
                    }
                    return Some(Cursor { line, col: col + 1 });
                }
                col += 1;
            }
            skip = 0;
        }
        None
    }
}

impl MarkedEventReceiver for Indexer<'_, '_> {
    fn on_event(&mut self, event: Event, mark: Marker) {
        let at = Cursor::from(mark);
        match event {
            Event::Scalar(value, style, ..) => self.scalar(at, value, style),
            Event::Alias(_) => self.scalar(at, String::new(), TScalarStyle::Plain),
            Event::MappingStart(..) => self.open(at, FrameKind::Mapping { pending_key: None }),
            Event::SequenceStart(..) => self.open(at, FrameKind::Sequence { next_index: 0 }),
            Event::MappingEnd | Event::SequenceEnd => self.close(at),
            _ => {}
        }
    }
}
