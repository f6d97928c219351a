use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::files::FileTreeStrategy;
use crate::error::RouteError;
use crate::router::loader::ModuleLoader;
use crate::router::pattern::FilePattern;

/// Conventional build output directories, in lookup order.
pub const OUTPUT_DIRS: [&str; 4] = ["dist", "build", "out", "lib"];

/// Extension a compiled artifact has for a given source extension.
pub fn compiled_extension(source: &str) -> Option<&'static str> {
    match source {
        "ts" | "tsx" => Some("js"),
        "mts" => Some("mjs"),
        "cts" => Some("cjs"),
        _ => None,
    }
}

/// Base directories to try under each output directory: the base as given,
/// then without a leading `src/`.
fn output_bases(base: &str) -> Vec<String> {
    let mut bases = vec![base.to_string()];
    let stripped = if base == "src" {
        Some(".")
    } else {
        base.strip_prefix("src/")
    };
    if let Some(stripped) = stripped {
        bases.push(stripped.to_string());
    }
    bases
}

fn join_base(out: &str, base: &str) -> String {
    if base == "." {
        out.to_string()
    } else {
        format!("{out}/{base}")
    }
}

/// Locate the handlers a pattern describes.
///
/// Compiled output wins over sources: every directory in [`OUTPUT_DIRS`] is
/// tried with the pattern base, then the source base itself. If none exists
/// the error lists every location that was checked.
pub fn locate(root: &Path, pattern: &FilePattern) -> Result<(FilePattern, PathBuf), RouteError> {
    let mut attempted = Vec::new();
    for out in OUTPUT_DIRS {
        for base in output_bases(pattern.base()) {
            let relative = join_base(out, &base);
            let dir = root.join(&relative);
            if dir.is_dir() {
                info!(pattern = %pattern.source(), dir = %dir.display(), "Using compiled handlers");
                return Ok((pattern.compiled(&relative, compiled_extension), dir));
            }
            attempted.push(dir);
        }
    }

    let source = root.join(pattern.base());
    if source.is_dir() {
        warn!(pattern = %pattern.source(), dir = %source.display(), "No compiled output found, using handler sources");
        return Ok((pattern.clone(), source));
    }
    attempted.push(source);
    Err(RouteError::HandlersNotFound {
        pattern: pattern.source().to_string(),
        attempted,
    })
}

/// One glob-like pattern gives both the base directory and the file naming
/// convention.
pub fn pattern(
    root: &Path,
    pattern: &str,
    loader: Arc<dyn ModuleLoader>,
) -> Result<FileTreeStrategy, RouteError> {
    let parsed = FilePattern::parse(pattern)?;
    let (resolved, dir) = locate(root, &parsed)?;
    Ok(FileTreeStrategy::new("pattern", resolved, dir, false, loader))
}
