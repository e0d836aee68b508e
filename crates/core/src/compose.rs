//! SVG composition engine.
//!
//! Merges many part/bin source SVGs, each possibly repeated, into one
//! namespaced canvas document. Every source fragment gets a prefix
//! derived from its position in the request, so generic ids exported
//! by drawing tools (`part1`, `path3`, ...) can never collide between
//! fragments from different sources.
//!
//! A descriptor whose blob cannot be fetched is skipped and logged;
//! composition only fails outright when no fragment at all could be
//! produced.

use std::sync::LazyLock;

use regex::Regex;

use crate::job::PartDescriptor;
use crate::store::{part_key, AssetStore};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Canvas width of every composed document. The remote nesting page
/// expects a known, fixed canvas size.
pub const CANVAS_WIDTH: u32 = 3000;

/// Canvas height of every composed document.
pub const CANVAS_HEIGHT: u32 = 3000;

static XML_DECL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\?xml[^>]+\?>").expect("valid regex"));
static SVG_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<svg[^>]*>").expect("valid regex"));
static SVG_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</svg>").expect("valid regex"));
static ID_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"id="([^"]+)""#).expect("valid regex"));
static HREF_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r##"href="#([^"]+)""##).expect("valid regex"));

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One composed SVG document plus its canvas dimensions.
///
/// Owned by the caller that requested composition; recomputed fresh
/// per job, never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedAsset {
    pub content: String,
    pub canvas_width: u32,
    pub canvas_height: u32,
}

/// Errors from the composition engine.
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    /// Every source fetch failed; no fragment could be produced.
    #[error("no fragment could be composed: all {attempted} source fetches failed")]
    NoFragments { attempted: usize },
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

/// Compose the given descriptors, in request order, into one canvas
/// document.
///
/// Zero descriptors produce a valid empty-canvas document. A
/// descriptor whose fetch fails is skipped without aborting the rest;
/// only a total failure (at least one descriptor, zero fragments)
/// returns [`ComposeError::NoFragments`].
pub async fn compose(
    store: &dyn AssetStore,
    descriptors: &[PartDescriptor],
) -> Result<ComposedAsset, ComposeError> {
    let mut body = String::new();
    let mut produced = 0usize;

    for (ordinal, descriptor) in descriptors.iter().enumerate() {
        let key = part_key(&descriptor.owner_id, &descriptor.part_id);
        let raw = match store.get(&key).await {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(key = %key, error = %error, "Skipping source SVG: fetch failed");
                continue;
            }
        };
        let raw = match String::from_utf8(raw) {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(key = %key, error = %error, "Skipping source SVG: not valid UTF-8");
                continue;
            }
        };

        // The prefix is positional, so identical input order always
        // yields identical output.
        let fragment = sanitize_fragment(&raw, &fragment_prefix(ordinal));
        for _ in 0..descriptor.quantity {
            body.push_str(&fragment);
            body.push('\n');
        }
        produced += 1;
    }

    if produced == 0 && !descriptors.is_empty() {
        return Err(ComposeError::NoFragments {
            attempted: descriptors.len(),
        });
    }

    tracing::debug!(
        descriptors = descriptors.len(),
        fragments = produced,
        "Composed SVG document",
    );

    Ok(ComposedAsset {
        content: wrap_canvas(&body),
        canvas_width: CANVAS_WIDTH,
        canvas_height: CANVAS_HEIGHT,
    })
}

/// Unique textual prefix for the descriptor at `ordinal` (0-based
/// request position).
pub fn fragment_prefix(ordinal: usize) -> String {
    format!("file{}", ordinal + 1)
}

/// Strip a source SVG down to its inner markup and namespace its
/// identifiers.
///
/// Removes the XML declaration and the outer `<svg ...>` open/close
/// pair, then rewrites every `id="X"` to `id="{prefix}-X"` and every
/// `href="#X"` to `href="#{prefix}-X"`.
pub fn sanitize_fragment(svg: &str, prefix: &str) -> String {
    let stripped = XML_DECL_RE.replace_all(svg, "");
    let stripped = SVG_OPEN_RE.replace(&stripped, "");
    let stripped = SVG_CLOSE_RE.replace(&stripped, "");

    let renamed = ID_ATTR_RE.replace_all(&stripped, format!(r#"id="{prefix}-${{1}}""#));
    HREF_REF_RE
        .replace_all(&renamed, format!(r##"href="#{prefix}-${{1}}""##))
        .into_owned()
}

/// Wrap concatenated fragments in the fixed-size root element.
fn wrap_canvas(body: &str) -> String {
    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" height=\"{CANVAS_HEIGHT}\" width=\"{CANVAS_WIDTH}\" \
         viewBox=\"0 0 {CANVAS_WIDTH} {CANVAS_HEIGHT}\" style=\"background-color:white\">\n{body}</svg>\n"
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
