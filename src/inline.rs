//! Narrow seam over the external CSS transformer.
//!
//! Email clients widely ignore `<style>` blocks, so markup is rewritten with the rules inlined
//! into `style` attributes before preview or dispatch. The transformation itself is delegated to
//! [css-inline](https://crates.io/crates/css-inline).

use css_inline::CSSInliner;
use once_cell::sync::Lazy;

pub use css_inline::InlineError;

// Remote stylesheet fetching is disabled; the output depends only on the submitted markup.
static INLINER: Lazy<CSSInliner<'static>> = Lazy::new(|| {
    CSSInliner::options()
        .keep_style_tags(false)
        .load_remote_stylesheets(false)
        .build()
});

/// Rewrite `html` with all `<style>` rules inlined into `style` attributes.
pub fn inline_styles(html: &str) -> Result<String, InlineError> {
    INLINER.inline(html)
}
