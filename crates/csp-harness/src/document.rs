//! Document variants: a fixture with a policy declaration injected.
//!
//! Building a variant is pure text surgery. The policy is placed in a
//! `<meta http-equiv="Content-Security-Policy">` element immediately after the
//! opening `<head>` tag, ahead of any script in the document, so the engine
//! sees it before anything it governs.

use crate::error::{HarnessError, Result};
use memchr::memmem;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// A named template document that variants are built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureDocument {
    name: String,
    html: String,
}

impl FixtureDocument {
    /// Creates a fixture from in-memory HTML.
    pub fn new(name: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            html: html.into(),
        }
    }

    /// Reads a UTF-8 fixture from disk. The file name becomes the fixture name.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read or is not UTF-8.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let html = std::fs::read_to_string(path)?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self::new(name, html))
    }

    /// The fixture's name, used in reports and errors.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw template HTML.
    #[must_use]
    pub fn html(&self) -> &str {
        &self.html
    }

    /// Returns true if the fixture has an anchor for policy injection.
    #[must_use]
    pub fn has_head(&self) -> bool {
        head_insertion_point(&self.html).is_some()
    }
}

/// A CSP directive string, normalized for use as a `<meta>` content value.
///
/// Comment text (`#` to end of line) and line breaks never reach the active
/// directive string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDeclaration {
    directives: String,
}

impl PolicyDeclaration {
    /// Uses a literal directive set as-is (after line folding).
    pub fn literal(directives: impl AsRef<str>) -> Self {
        Self {
            directives: fold_lines(split_lines(directives.as_ref())),
        }
    }

    /// Normalizes a policy-source artifact: strips `#` comments and folds
    /// every line onto one, separated by single spaces.
    pub fn from_source(source: impl AsRef<str>) -> Self {
        let lines = split_lines(source.as_ref()).map(|line| match line.find('#') {
            Some(comment) => &line[..comment],
            None => line,
        });
        Self {
            directives: fold_lines(lines),
        }
    }

    /// Reads and normalizes a policy-source file.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Ok(Self::from_source(source))
    }

    /// The normalized directive string.
    #[must_use]
    pub fn directives(&self) -> &str {
        &self.directives
    }

    /// Renders the `<meta>` element carrying this policy.
    #[must_use]
    pub fn meta_tag(&self) -> String {
        format!(
            r#"<meta http-equiv="Content-Security-Policy" content="{}">"#,
            escape_attribute(&self.directives)
        )
    }
}

impl fmt::Display for PolicyDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.directives)
    }
}

/// An immutable, complete HTML document ready to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentVariant {
    fixture: String,
    html: Arc<str>,
}

impl DocumentVariant {
    /// Name of the fixture this variant was derived from.
    #[must_use]
    pub fn fixture_name(&self) -> &str {
        &self.fixture
    }

    /// The full document text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.html
    }

    /// Encodes the document as a `data:` URL.
    ///
    /// Navigating to it replaces the whole document, window globals
    /// included.
    #[must_use]
    pub fn to_data_url(&self) -> String {
        format!(
            "data:text/html;charset=utf-8,{}",
            urlencoding::encode(&self.html)
        )
    }
}

/// Builds a variant by inserting `policy` right after the fixture's opening
/// `<head>` tag.
///
/// Deterministic: identical inputs yield byte-identical variants.
///
/// # Errors
///
/// Returns `MalformedFixture` if the fixture has no `<head>` element.
pub fn build_variant(
    fixture: &FixtureDocument,
    policy: &PolicyDeclaration,
) -> Result<DocumentVariant> {
    let at = head_insertion_point(&fixture.html).ok_or_else(|| HarnessError::MalformedFixture {
        fixture: fixture.name.clone(),
    })?;

    let meta = policy.meta_tag();
    let mut html = String::with_capacity(fixture.html.len() + meta.len() + 10);
    html.push_str(&fixture.html[..at]);
    html.push_str("\n    ");
    html.push_str(&meta);
    html.push('\n');
    html.push_str(&fixture.html[at..]);

    Ok(DocumentVariant {
        fixture: fixture.name.clone(),
        html: html.into(),
    })
}

/// Finds the byte offset just past the first opening `<head>` tag.
///
/// Matches `<head>` and `<head attr=...>` case-insensitively, but not
/// `<header>`.
fn head_insertion_point(html: &str) -> Option<usize> {
    // ASCII lowercasing keeps byte offsets aligned with the original.
    let lower = html.to_ascii_lowercase();
    let bytes = lower.as_bytes();

    for start in memmem::find_iter(bytes, b"<head") {
        let after = start + b"<head".len();
        match bytes.get(after) {
            Some(b'>') => return Some(after + 1),
            Some(b) if b.is_ascii_whitespace() || *b == b'/' => {
                let close = memchr::memchr(b'>', &bytes[after..])?;
                return Some(after + close + 1);
            }
            _ => {}
        }
    }
    None
}

/// Splits on every line break, a lone `\r` included.
fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split(['\n', '\r'])
}

fn fold_lines<'a>(lines: impl Iterator<Item = &'a str>) -> String {
    lines
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
