use crate::core::interfaces::FileSystemService;
use crate::utils::{PackError, Result, Timer};
use lightningcss::{
    printer::PrinterOptions,
    rules::{CssRule, Location},
    stylesheet::{MinifyOptions, ParserOptions as CssParserOptions, StyleSheet},
    traits::ToCss,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A concatenated stylesheet artifact
#[derive(Debug, Clone, Default)]
pub struct CssBundle {
    pub code: String,
    /// Every stylesheet that contributed, in emission order
    pub sources: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
struct ImportRule {
    specifier: String,
    /// At-rule preludes the imported sheet is wrapped in, outermost first
    wrappers: Vec<String>,
    /// Source text of the rule
    rule: String,
}

fn is_remote(specifier: &str) -> bool {
    specifier.starts_with("http://") || specifier.starts_with("https://") || specifier.starts_with("//")
}

/// Byte offset of a parser location (0-based line, 1-based UTF-16 column)
fn offset_of(content: &str, loc: &Location) -> usize {
    let line_start: usize = content
        .split_inclusive('\n')
        .take(loc.line as usize)
        .map(str::len)
        .sum();
    let mut column = 1;
    for (i, ch) in content[line_start..].char_indices() {
        if column >= loc.column {
            return line_start + i;
        }
        column += ch.len_utf16() as u32;
    }
    content.len()
}

/// End of the statement at-rule starting at `start`, past its `;`
fn statement_end(content: &str, start: usize) -> usize {
    let mut quote = None;
    let mut depth = 0usize;
    for (i, ch) in content[start..].char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ';') if depth == 0 => return start + i + 1,
            _ => {}
        }
    }
    content.len()
}

fn printed<T: ToCss>(value: &T, path: &Path) -> Result<String> {
    value
        .to_css_string(PrinterOptions::default())
        .map_err(|e| PackError::transform(path, format!("stylesheet printing failed: {}", e)))
}

/// Split `@import` rules off a stylesheet body
fn split_imports(content: &str, path: &Path) -> Result<(Vec<ImportRule>, String)> {
    let options = CssParserOptions {
        filename: path.display().to_string(),
        ..CssParserOptions::default()
    };
    let stylesheet = StyleSheet::parse(content, options)
        .map_err(|e| PackError::transform(path, format!("invalid stylesheet: {}", e)))?;

    let mut imports = Vec::new();
    let mut spans = Vec::new();
    for rule in &stylesheet.rules.0 {
        let CssRule::Import(import) = rule else {
            continue;
        };

        let mut wrappers = Vec::new();
        if !import.media.media_queries.is_empty() {
            wrappers.push(format!("@media {}", printed(&import.media, path)?));
        }
        if let Some(supports) = &import.supports {
            wrappers.push(format!("@supports {}", printed(supports, path)?));
        }
        match &import.layer {
            Some(Some(name)) => wrappers.push(format!("@layer {}", printed(name, path)?)),
            Some(None) => wrappers.push("@layer".to_string()),
            None => {}
        }

        let start = offset_of(content, &import.loc);
        let end = statement_end(content, start);
        spans.push((start, end));
        imports.push(ImportRule {
            specifier: import.url.to_string(),
            wrappers,
            rule: content[start..end].to_string(),
        });
    }

    let mut body = String::with_capacity(content.len());
    let mut last = 0;
    for (start, end) in spans {
        body.push_str(&content[last..start]);
        last = end;
    }
    body.push_str(&content[last..]);
    Ok((imports, body.trim().to_string()))
}

struct Frame {
    path: PathBuf,
    body: String,
    wrappers: Vec<String>,
    imports: Vec<ImportRule>,
    next: usize,
    out: String,
}

/// Validates, optionally minifies, and concatenates extracted stylesheets
pub struct LightningCssProcessor {
    fs: Arc<dyn FileSystemService>,
    minify: bool,
}

impl LightningCssProcessor {
    pub fn new(fs: Arc<dyn FileSystemService>, minify: bool) -> Self {
        Self { fs, minify }
    }

    /// Parse a stylesheet body. The original text is returned unless
    /// minification is on.
    pub fn process_css(&self, content: &str, path: &Path) -> Result<String> {
        tracing::debug!("processing stylesheet {}", path.display());

        let options = CssParserOptions {
            filename: path.display().to_string(),
            ..CssParserOptions::default()
        };
        let mut stylesheet = StyleSheet::parse(content, options)
            .map_err(|e| PackError::transform(path, format!("invalid stylesheet: {}", e)))?;

        if !self.minify {
            return Ok(content.trim().to_string());
        }

        stylesheet
            .minify(MinifyOptions::default())
            .map_err(|e| PackError::transform(path, format!("stylesheet minification failed: {}", e)))?;
        let printed = stylesheet
            .to_css(PrinterOptions {
                minify: true,
                ..PrinterOptions::default()
            })
            .map_err(|e| PackError::transform(path, format!("stylesheet printing failed: {}", e)))?;
        Ok(printed.code)
    }

    /// Parse check for a whole stylesheet, `@import` rules included
    pub fn validate(&self, content: &str, path: &Path) -> Result<()> {
        split_imports(content, path).map(|_| ())
    }

    async fn load(&self, path: &Path, preloaded: &HashMap<PathBuf, String>) -> Result<String> {
        match preloaded.get(path) {
            Some(content) => Ok(content.clone()),
            None => self.fs.read_file(path).await,
        }
    }

    async fn locate(&self, importer: &Path, specifier: &str) -> Result<PathBuf> {
        let base = importer.parent().unwrap_or_else(|| Path::new("."));
        let candidate = base.join(specifier);
        if self.fs.file_exists(&candidate) {
            return Ok(tokio::fs::canonicalize(&candidate).await.unwrap_or(candidate));
        }
        Err(PackError::resolution(importer, specifier))
    }

    fn open(&self, path: PathBuf, content: &str, wrappers: Vec<String>) -> Result<Frame> {
        let (imports, body) = split_imports(content, &path)?;
        Ok(Frame {
            path,
            body,
            wrappers,
            imports,
            next: 0,
            out: String::new(),
        })
    }

    /// Concatenate `entries` in order, inlining nested `@import`s depth-first.
    /// A stylesheet reached twice is emitted at its first occurrence only.
    pub async fn bundle_css(
        &self,
        entries: &[PathBuf],
        preloaded: &HashMap<PathBuf, String>,
    ) -> Result<CssBundle> {
        let _timer = Timer::start("Bundling stylesheets");

        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut remote: Vec<String> = Vec::new();
        let mut bundle = CssBundle::default();
        let mut body = String::new();

        for entry in entries {
            if !seen.insert(entry.clone()) {
                continue;
            }
            let content = self.load(entry, preloaded).await?;
            let mut stack = vec![self.open(entry.clone(), &content, Vec::new())?];

            while let Some(frame) = stack.last_mut() {
                if let Some(import) = frame.imports.get(frame.next).cloned() {
                    frame.next += 1;
                    if is_remote(&import.specifier) {
                        if !remote.contains(&import.rule) {
                            remote.push(import.rule);
                        }
                        continue;
                    }
                    let importer = frame.path.clone();
                    let child = self.locate(&importer, &import.specifier).await?;
                    if !seen.insert(child.clone()) {
                        continue;
                    }
                    tracing::debug!("inlining {} into {}", child.display(), importer.display());
                    let content = self.load(&child, preloaded).await?;
                    stack.push(self.open(child, &content, import.wrappers)?);
                    continue;
                }

                let Some(mut frame) = stack.pop() else { break };
                let own = self.process_css(&frame.body, &frame.path)?;
                if !own.is_empty() {
                    frame.out.push_str(&own);
                    frame.out.push('\n');
                }
                bundle.sources.push(frame.path.clone());

                let mut text = frame.out;
                if !text.is_empty() {
                    for wrapper in frame.wrappers.iter().rev() {
                        text = format!("{} {{\n{}}}\n", wrapper, text);
                    }
                }
                match stack.last_mut() {
                    Some(parent) => parent.out.push_str(&text),
                    None => body.push_str(&text),
                }
            }
        }

        for rule in &remote {
            bundle.code.push_str(rule);
            bundle.code.push('\n');
        }
        bundle.code.push_str(&body);
        Ok(bundle)
    }
}
