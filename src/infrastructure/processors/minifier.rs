use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions, CommentOptions, LegalComment};
use oxc_minifier::{CompressOptions, MangleOptions, Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;
use sourcemap::SourceMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::models::Chunk;
use crate::utils::{chain, PackError, Result};

#[derive(Debug, Clone)]
pub struct MinifyOptions {
    /// Shorten non-exported bindings, top level included
    pub mangle: bool,
    /// Run the compressor (dead branches, `debugger`, constant folding)
    pub compress: bool,
    /// Keep `/*! */`, `@license` and `@preserve` comments
    pub legal_comments: bool,
}

impl Default for MinifyOptions {
    fn default() -> Self {
        Self {
            mangle: true,
            compress: true,
            legal_comments: true,
        }
    }
}

#[derive(Debug)]
pub struct MinifiedOutput {
    pub code: String,
    /// Minified position -> input position, present when asked for
    pub map: Option<SourceMap>,
    pub stats: MinificationStats,
}

/// JavaScript minification using oxc
pub struct OxcMinifier {
    options: MinifyOptions,
}

impl OxcMinifier {
    pub fn new(options: MinifyOptions) -> Self {
        Self { options }
    }

    fn minifier_options(&self) -> MinifierOptions {
        MinifierOptions {
            // Exported bindings keep their names under top-level mangling
            mangle: self.options.mangle.then(|| MangleOptions {
                top_level: true,
                ..MangleOptions::default()
            }),
            compress: self.options.compress.then(CompressOptions::default),
        }
    }

    fn codegen_options(&self, source_map_path: Option<PathBuf>) -> CodegenOptions {
        let legal = if self.options.legal_comments {
            LegalComment::Inline
        } else {
            LegalComment::None
        };
        CodegenOptions {
            minify: true,
            comments: CommentOptions {
                normal: false,
                jsdoc: false,
                annotation: true,
                legal,
            },
            source_map_path,
            ..CodegenOptions::default()
        }
    }

    /// Minify an ES module. With `with_map`, the returned map points from
    /// minified positions back into `code`.
    pub fn minify(&self, path: &Path, code: &str, with_map: bool) -> Result<MinifiedOutput> {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, code, SourceType::mjs()).parse();
        if ret.panicked || !ret.errors.is_empty() {
            let errors: Vec<String> = ret.errors.iter().map(|e| format!("Parse error: {}", e)).collect();
            return Err(PackError::transform(path, errors.join("\n")));
        }

        let mut program = ret.program;
        let minified = Minifier::new(self.minifier_options()).minify(&allocator, &mut program);
        tracing::debug!(
            "minified {} in {} compressor iterations",
            path.display(),
            minified.iterations
        );

        let output = Codegen::new()
            .with_options(self.codegen_options(with_map.then(|| path.to_path_buf())))
            .with_scoping(minified.scoping)
            .with_private_member_mappings(minified.class_private_mappings)
            .build(&program);

        let map = match output.map {
            Some(map) => Some(
                SourceMap::from_slice(map.to_json_string().as_bytes()).map_err(|e| {
                    PackError::transform(path, format!("unreadable minifier source map: {}", e))
                })?,
            ),
            None => None,
        };

        Ok(MinifiedOutput {
            stats: MinificationStats::new(code.len(), output.code.len()),
            code: output.code,
            map,
        })
    }

    /// Minify a rendered chunk, composing its map through the new positions
    pub fn minify_chunk(&self, chunk: &Chunk) -> Result<(Chunk, MinificationStats)> {
        let output = self.minify(Path::new(&chunk.file_name), &chunk.code, chunk.map.is_some())?;
        let map = match (&output.map, &chunk.map) {
            (Some(outer), Some(inner)) => Some(chain(&chunk.file_name, outer, inner)),
            _ => None,
        };
        Ok((
            Chunk {
                file_name: chunk.file_name.clone(),
                code: output.code,
                map,
                exports: chunk.exports.clone(),
            },
            output.stats,
        ))
    }
}

impl Default for OxcMinifier {
    fn default() -> Self {
        Self::new(MinifyOptions::default())
    }
}

/// Async wrapper for minification in the build pipeline
pub struct MinificationService {
    minifier: Arc<OxcMinifier>,
}

impl MinificationService {
    pub fn new(options: MinifyOptions) -> Self {
        Self {
            minifier: Arc::new(OxcMinifier::new(options)),
        }
    }

    pub async fn minify_chunk(&self, chunk: Chunk) -> Result<(Chunk, MinificationStats)> {
        let minifier = self.minifier.clone();
        let file_name = chunk.file_name.clone();

        // Run minification in a blocking task since oxc is CPU-intensive
        tokio::task::spawn_blocking(move || minifier.minify_chunk(&chunk))
            .await
            .map_err(|e| {
                PackError::transform(Path::new(&file_name), format!("minification task failed: {}", e))
            })?
    }
}

impl Default for MinificationService {
    fn default() -> Self {
        Self::new(MinifyOptions::default())
    }
}

#[derive(Debug, Clone)]
pub struct MinificationStats {
    pub original_size: usize,
    pub minified_size: usize,
    pub reduction_percentage: f64,
    pub saved_bytes: usize,
}

impl MinificationStats {
    pub fn new(original_size: usize, minified_size: usize) -> Self {
        let reduction_percentage = if original_size == 0 {
            0.0
        } else {
            (original_size as f64 - minified_size as f64) / original_size as f64 * 100.0
        };
        Self {
            original_size,
            minified_size,
            reduction_percentage,
            saved_bytes: original_size.saturating_sub(minified_size),
        }
    }
}

impl std::fmt::Display for MinificationStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Minification: {:.1}% reduction ({} → {} bytes, saved {})",
            self.reduction_percentage, self.original_size, self.minified_size, self.saved_bytes
        )
    }
}
