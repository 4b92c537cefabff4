// Span-based text editing with position tracking, plus helpers to turn the
// recorded positions into v3 source maps and to chain maps together.

use sourcemap::{SourceMap, SourceMapBuilder};

/// One generated-to-original position pair. Lines and columns are 0-based,
/// columns count UTF-16 code units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub dst_line: u32,
    pub dst_col: u32,
    pub src_line: u32,
    pub src_col: u32,
    pub name: Option<String>,
}

/// Line/column cursor advanced over text as it is walked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub line: u32,
    pub col: u32,
}

impl Cursor {
    pub fn advance_char(&mut self, c: char) {
        if c == '\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += c.len_utf16() as u32;
        }
    }

    pub fn advance(&mut self, text: &str) {
        for c in text.chars() {
            self.advance_char(c);
        }
    }
}

/// Position of `offset` inside `text`
pub fn position_of(text: &str, offset: usize) -> Cursor {
    let mut cursor = Cursor::default();
    cursor.advance(&text[..offset.min(text.len())]);
    cursor
}

pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[derive(Debug, Clone)]
struct Edit {
    start: u32,
    end: u32,
    text: String,
    name: Option<String>,
}

/// Output of [`SourceEditor::render`]
#[derive(Debug, Clone, Default)]
pub struct Rendered {
    pub code: String,
    pub mappings: Vec<Mapping>,
}

/// Collects non-overlapping span edits over a source text and renders the
/// result together with fine-grained position mappings.
pub struct SourceEditor<'s> {
    source: &'s str,
    edits: Vec<Edit>,
}

impl<'s> SourceEditor<'s> {
    pub fn new(source: &'s str) -> Self {
        Self {
            source,
            edits: Vec::new(),
        }
    }

    pub fn source(&self) -> &'s str {
        self.source
    }

    pub fn overwrite(&mut self, start: u32, end: u32, text: impl Into<String>) {
        self.edits.push(Edit {
            start,
            end,
            text: text.into(),
            name: None,
        });
    }

    /// Overwrite an identifier, keeping its original name in the map
    pub fn rename(&mut self, start: u32, end: u32, text: impl Into<String>) {
        let name = self.source.get(start as usize..end as usize).map(str::to_string);
        self.edits.push(Edit {
            start,
            end,
            text: text.into(),
            name,
        });
    }

    pub fn insert(&mut self, pos: u32, text: impl Into<String>) {
        self.overwrite(pos, pos, text);
    }

    pub fn remove(&mut self, start: u32, end: u32) {
        self.overwrite(start, end, String::new());
    }

    pub fn has_edits(&self) -> bool {
        !self.edits.is_empty()
    }

    /// Apply all edits. Edits starting inside an already applied range are
    /// dropped; inserts at the same offset keep their insertion order.
    pub fn render(mut self) -> Rendered {
        self.edits.sort_by_key(|e| (e.start, e.end));

        let mut out = Rendered {
            code: String::with_capacity(self.source.len()),
            mappings: Vec::new(),
        };
        let mut dst = Cursor::default();
        let mut src = Cursor::default();
        let mut pos = 0usize;

        for edit in &self.edits {
            let start = edit.start as usize;
            let end = edit.end as usize;
            if start < pos || end > self.source.len() {
                continue;
            }
            copy_segment(&self.source[pos..start], &mut out, &mut dst, &mut src);

            if !edit.text.is_empty() {
                out.mappings.push(Mapping {
                    dst_line: dst.line,
                    dst_col: dst.col,
                    src_line: src.line,
                    src_col: src.col,
                    name: edit.name.clone(),
                });
                out.code.push_str(&edit.text);
                dst.advance(&edit.text);
            }
            src.advance(&self.source[start..end]);
            pos = end;
        }
        copy_segment(&self.source[pos..], &mut out, &mut dst, &mut src);
        out
    }
}

/// Copy unchanged text, recording a mapping at every token start
fn copy_segment(text: &str, out: &mut Rendered, dst: &mut Cursor, src: &mut Cursor) {
    let mut prev: Option<char> = None;
    for c in text.chars() {
        if !c.is_whitespace() {
            let boundary = match prev {
                None => true,
                Some(p) => p.is_whitespace() || is_word_char(p) != is_word_char(c) || !is_word_char(c),
            };
            if boundary {
                out.mappings.push(Mapping {
                    dst_line: dst.line,
                    dst_col: dst.col,
                    src_line: src.line,
                    src_col: src.col,
                    name: None,
                });
            }
        }
        out.code.push(c);
        dst.advance_char(c);
        src.advance_char(c);
        prev = Some(c);
    }
}

/// Original position for a generated position, looked up in `map`.
/// Only tokens on the same generated line count; the column delta from the
/// token start is carried over.
pub fn lookup_original<'m>(map: &'m SourceMap, line: u32, col: u32) -> Option<OriginalPosition<'m>> {
    let token = map.lookup_token(line, col)?;
    if token.get_dst_line() != line {
        return None;
    }
    let delta = col.saturating_sub(token.get_dst_col());
    Some(OriginalPosition {
        source: token.get_source()?,
        line: token.get_src_line(),
        col: token.get_src_col() + delta,
        name: token.get_name(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OriginalPosition<'m> {
    pub source: &'m str,
    pub line: u32,
    pub col: u32,
    pub name: Option<&'m str>,
}

/// Accumulates mappings from several sources into one output map
pub struct BundleMapBuilder {
    builder: SourceMapBuilder,
}

impl BundleMapBuilder {
    pub fn new(file: &str) -> Self {
        Self {
            builder: SourceMapBuilder::new(Some(file)),
        }
    }

    pub fn add_source(&mut self, name: &str, contents: &str) {
        let id = self.builder.add_source(name);
        self.builder.set_source_contents(id, Some(contents));
    }

    /// Append mappings of a rendered chunk placed at `line_offset` in the
    /// output. When `input_map` is given, source positions are translated
    /// through it first.
    pub fn add_chunk(
        &mut self,
        source: &str,
        mappings: &[Mapping],
        line_offset: u32,
        input_map: Option<&SourceMap>,
    ) {
        for m in mappings {
            match input_map {
                Some(input) => {
                    if let Some(orig) = lookup_original(input, m.src_line, m.src_col) {
                        self.builder.add(
                            m.dst_line + line_offset,
                            m.dst_col,
                            orig.line,
                            orig.col,
                            Some(source),
                            m.name.as_deref().or(orig.name),
                            false,
                        );
                    }
                }
                None => {
                    self.builder.add(
                        m.dst_line + line_offset,
                        m.dst_col,
                        m.src_line,
                        m.src_col,
                        Some(source),
                        m.name.as_deref(),
                        false,
                    );
                }
            }
        }
    }

    pub fn finish(self) -> SourceMap {
        self.builder.into_sourcemap()
    }
}

/// Chain `mappings` (output -> intermediate) with `inner` (intermediate ->
/// original) into a single output -> original map.
pub fn compose(file: &str, mappings: &[Mapping], inner: &SourceMap) -> SourceMap {
    let mut builder = SourceMapBuilder::new(Some(file));
    for (idx, source) in inner.sources().enumerate() {
        let id = builder.add_source(source);
        builder.set_source_contents(id, inner.get_source_contents(idx as u32));
    }
    for m in mappings {
        if let Some(orig) = lookup_original(inner, m.src_line, m.src_col) {
            builder.add(
                m.dst_line,
                m.dst_col,
                orig.line,
                orig.col,
                Some(orig.source),
                m.name.as_deref().or(orig.name),
                false,
            );
        }
    }
    builder.into_sourcemap()
}

/// Chain two maps: `outer` maps output -> intermediate, `inner` maps
/// intermediate -> original.
pub fn chain(file: &str, outer: &SourceMap, inner: &SourceMap) -> SourceMap {
    let mappings: Vec<Mapping> = outer
        .tokens()
        .map(|t| Mapping {
            dst_line: t.get_dst_line(),
            dst_col: t.get_dst_col(),
            src_line: t.get_src_line(),
            src_col: t.get_src_col(),
            name: t.get_name().map(str::to_string),
        })
        .collect();
    compose(file, &mappings, inner)
}

/// Build a standalone map for a rendered edit of `source_name`
pub fn map_from_rendered(file: &str, source_name: &str, contents: &str, rendered: &Rendered) -> SourceMap {
    let mut builder = BundleMapBuilder::new(file);
    builder.add_source(source_name, contents);
    builder.add_chunk(source_name, &rendered.mappings, 0, None);
    builder.finish()
}

pub fn to_json(map: &SourceMap) -> std::result::Result<String, sourcemap::Error> {
    let mut buf = Vec::new();
    map.to_writer(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
