use std::path::Path;
use std::sync::Arc;

use super::files::FileTreeStrategy;
use crate::router::loader::ModuleLoader;
use crate::router::pattern::FilePattern;

/// Handler files mirror the URL tree one-to-one under `base`.
///
/// Only `index.<ext>` files and files named after their directory
/// (`users/users.<ext>`) are routes; anything else in the tree is a helper.
pub fn directory(
    base: &Path,
    extensions: &[String],
    loader: Arc<dyn ModuleLoader>,
) -> FileTreeStrategy {
    let extensions: Vec<String> = if extensions.is_empty() {
        vec!["js".to_string()]
    } else {
        extensions.to_vec()
    };
    let pattern = FilePattern::for_extensions(&base.to_string_lossy(), &extensions);
    FileTreeStrategy::new("directory", pattern, base.to_path_buf(), true, loader)
}
