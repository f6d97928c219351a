//! Handler file patterns.
//!
//! A pattern such as `src/api/**/*.handler.{ts,js}` carries two things:
//!
//! - the **base directory** (`src/api`), made of the leading glob-free
//!   components, and whether discovery is recursive (`**`);
//! - the **file naming convention** (`*.handler.ts`, then `*.handler.js`),
//!   which turns a file name into a route segment.
//!
//! A convention with one `*` keeps the part the star matched
//! (`users.handler.ts` → `users`). A convention without a star is an exact
//! file name and serves its directory as `index` (`route.ts` → `index`).

use once_cell::sync::Lazy;
use regex::Regex;
use smallvec::SmallVec;
use std::borrow::Cow;

use crate::error::RouteError;

static ALTERNATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^{}]*)\{([^{}]+)\}([^{}]*)$").expect("alternation regex should be valid")
});

static TEMPLATE_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\{([A-Za-z_][A-Za-z0-9_\-]*)\}$").expect("template regex should be valid")
});

/// Parameter name of a `{name}` segment.
pub fn template_name(segment: &str) -> Option<&str> {
    TEMPLATE_SEGMENT
        .captures(segment)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

pub fn is_template(segment: &str) -> bool {
    TEMPLATE_SEGMENT.is_match(segment)
}

/// Split a request path or route template into segments.
///
/// Both `/` and `\` separate segments; empty segments are dropped.
pub fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\']).filter(|s| !s.is_empty())
}

/// Split and percent-decode a request path.
///
/// A segment that does not decode to UTF-8 cannot name a route, so the whole
/// path is treated as not found.
pub fn decode_segments(path: &str) -> Result<SmallVec<[Cow<'_, str>; 8]>, RouteError> {
    split_segments(path)
        .map(|segment| {
            urlencoding::decode(segment).map_err(|_| RouteError::not_found(path))
        })
        .collect()
}

/// How one file name maps to a route segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileConvention {
    /// Only this exact file name; it serves its directory as `index`
    Exact(String),
    /// `prefix` + segment + `suffix`
    Affix { prefix: String, suffix: String },
}

impl FileConvention {
    fn parse(pattern: &str, source: &str) -> Result<Self, RouteError> {
        if pattern.contains(['?', '[', ']']) {
            return Err(invalid(source, "only `*` and one `{a,b}` group are supported in file names"));
        }
        match pattern.matches('*').count() {
            0 => Ok(FileConvention::Exact(pattern.to_string())),
            1 => {
                let (prefix, suffix) = pattern.split_once('*').unwrap_or((pattern, ""));
                Ok(FileConvention::Affix {
                    prefix: prefix.to_string(),
                    suffix: suffix.to_string(),
                })
            }
            _ => Err(invalid(source, "a file name may contain at most one `*`")),
        }
    }

    /// Route segment for `file_name`, if the convention matches it.
    pub fn normalize(&self, file_name: &str) -> Option<String> {
        match self {
            FileConvention::Exact(name) => (file_name == name).then(|| "index".to_string()),
            FileConvention::Affix { prefix, suffix } => {
                let rest = file_name.strip_prefix(prefix.as_str())?;
                let name = rest.strip_suffix(suffix.as_str())?;
                (!name.is_empty()).then(|| name.to_string())
            }
        }
    }

    /// Extension of the files this convention matches, e.g. `ts`.
    pub fn extension(&self) -> Option<&str> {
        let tail = match self {
            FileConvention::Exact(name) => name.as_str(),
            FileConvention::Affix { suffix, .. } => suffix.as_str(),
        };
        tail.rsplit_once('.').map(|(_, ext)| ext).filter(|e| !e.is_empty())
    }

    /// The same convention with its extension swapped.
    #[must_use]
    pub fn with_extension(&self, ext: &str) -> Self {
        fn swap(tail: &str, ext: &str) -> String {
            match tail.rsplit_once('.') {
                Some((stem, _)) => format!("{stem}.{ext}"),
                None => tail.to_string(),
            }
        }
        match self {
            FileConvention::Exact(name) => FileConvention::Exact(swap(name, ext)),
            FileConvention::Affix { prefix, suffix } => FileConvention::Affix {
                prefix: prefix.clone(),
                suffix: swap(suffix, ext),
            },
        }
    }
}

/// A parsed handler file pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePattern {
    source: String,
    base: String,
    recursive: bool,
    conventions: Vec<FileConvention>,
}

fn invalid(pattern: &str, reason: &str) -> RouteError {
    RouteError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    }
}

fn has_glob(component: &str) -> bool {
    component.contains(['*', '?', '[', '{'])
}

impl FilePattern {
    pub fn parse(pattern: &str) -> Result<Self, RouteError> {
        let normalized = pattern.replace('\\', "/");
        let components: Vec<&str> = normalized
            .split('/')
            .filter(|c| !c.is_empty() && *c != ".")
            .collect();
        let Some((file_part, dirs)) = components.split_last() else {
            return Err(invalid(pattern, "pattern is empty"));
        };
        if *file_part == "**" {
            return Err(invalid(pattern, "pattern must end with a file name"));
        }

        let base_len = dirs.iter().take_while(|c| !has_glob(c)).count();
        let (base, rest) = dirs.split_at(base_len);
        if let Some(bad) = rest.iter().find(|c| **c != "**") {
            return Err(invalid(
                pattern,
                &format!("unsupported directory component '{bad}'; only `**` may follow the base"),
            ));
        }

        let alternatives: Vec<String> = match file_part.matches('{').count() {
            0 => vec![file_part.to_string()],
            1 => {
                let caps = ALTERNATION
                    .captures(file_part)
                    .ok_or_else(|| invalid(pattern, "malformed `{a,b}` group"))?;
                let (head, tail) = (&caps[1], &caps[3]);
                caps[2]
                    .split(',')
                    .map(str::trim)
                    .filter(|alt| !alt.is_empty())
                    .map(|alt| format!("{head}{alt}{tail}"))
                    .collect()
            }
            _ => return Err(invalid(pattern, "only one `{a,b}` group is supported")),
        };
        if alternatives.is_empty() {
            return Err(invalid(pattern, "empty `{a,b}` group"));
        }

        let conventions = alternatives
            .iter()
            .map(|alt| FileConvention::parse(alt, pattern))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            source: pattern.to_string(),
            base: if base.is_empty() {
                ".".to_string()
            } else {
                base.join("/")
            },
            recursive: !rest.is_empty(),
            conventions,
        })
    }

    /// Pattern for a plain directory tree: `{base}/**/*.{ext}` per extension.
    pub fn for_extensions(base: &str, extensions: &[String]) -> Self {
        let conventions = extensions
            .iter()
            .map(|ext| FileConvention::Affix {
                prefix: String::new(),
                suffix: format!(".{}", ext.trim_start_matches('.')),
            })
            .collect();
        Self {
            source: format!("{base}/**/*.{{{}}}", extensions.join(",")),
            base: base.to_string(),
            recursive: true,
            conventions,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Glob-free base directory, `/`-separated.
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn recursive(&self) -> bool {
        self.recursive
    }

    pub fn conventions(&self) -> &[FileConvention] {
        &self.conventions
    }

    /// Route segment and rank for a file name. The rank is the index of the
    /// first matching convention; lower ranks win name clashes.
    pub fn normalize(&self, file_name: &str) -> Option<(String, usize)> {
        self.conventions
            .iter()
            .enumerate()
            .find_map(|(rank, conv)| conv.normalize(file_name).map(|name| (name, rank)))
    }

    /// The same pattern with every convention's extension mapped through `map`
    /// (e.g. `ts` → `js`) and rooted at `base`.
    #[must_use]
    pub fn compiled(&self, base: &str, map: impl Fn(&str) -> Option<&'static str>) -> Self {
        let mut conventions: Vec<FileConvention> = Vec::with_capacity(self.conventions.len());
        for conv in &self.conventions {
            let mapped = match conv.extension().and_then(&map) {
                Some(ext) => conv.with_extension(ext),
                None => conv.clone(),
            };
            if !conventions.contains(&mapped) {
                conventions.push(mapped);
            }
        }
        Self {
            source: self.source.clone(),
            base: base.to_string(),
            recursive: self.recursive,
            conventions,
        }
    }
}
