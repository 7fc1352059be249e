//! Per-locale title/description resolution.
//!
//! Each field is resolved by walking an ordered list of [`Field`] selectors
//! over the dataset row; the first value that is present, not a placeholder
//! and non-empty after sanitizing wins. A row without a usable title yields
//! [`Resolution::Skip`] and leaves no trace in the ledger, so it is retried on
//! a later run once the dataset is fixed.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::contract::PublishMetadata;
use crate::dataset::Row;
use crate::locale::Locale;

pub const TITLE_MAX_CHARS: usize = 100;
pub const DESCRIPTION_MAX_CHARS: usize = 5000;
pub const ELLIPSIS: &str = "...";
pub const DESCRIPTION_FALLBACK: &str = "Product details available on our website.";

/// Values that mean "nothing here" in exported spreadsheets.
const PLACEHOLDERS: [&str; 3] = ["nan", "none", "null"];

/// One step of a fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// `<base>_<locale>`, e.g. `title_fr`.
    Localized(String),
    /// `<base>` as-is.
    Generic(String),
}

impl Field {
    pub fn column(&self, locale: &str) -> String {
        match self {
            Field::Localized(base) => format!("{base}_{locale}"),
            Field::Generic(base) => base.clone(),
        }
    }

    /// Expands base names into `localized, generic` pairs, in order.
    pub fn chain<S: AsRef<str>>(bases: &[S]) -> Vec<Field> {
        bases
            .iter()
            .flat_map(|b| {
                let b = b.as_ref().to_string();
                [Field::Localized(b.clone()), Field::Generic(b)]
            })
            .collect()
    }
}

/// Builds the landing-page URL an uploaded video links back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandingPage {
    /// Locale served from the site root (no locale path segment).
    pub default_locale: String,
    /// Path below the site root; `{id}` is replaced by the item key.
    pub path_template: String,
}

impl Default for LandingPage {
    fn default() -> Self {
        Self {
            default_locale: "en".to_string(),
            path_template: "page_html/products/produit-{id}.html".to_string(),
        }
    }
}

impl LandingPage {
    pub fn url(&self, locale: &Locale, item_key: &str) -> String {
        let path = self
            .path_template
            .trim_start_matches('/')
            .replace("{id}", item_key);
        if locale.code.is_empty() || locale.code.eq_ignore_ascii_case(&self.default_locale) {
            format!("{}/{}", locale.site_url, path)
        } else {
            format!("{}/{}/{}", locale.site_url, locale.code, path)
        }
    }
}

/// Outcome of resolving one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Publish(PublishMetadata),
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No title column yielded text.
    MissingTitle,
}

#[derive(Debug, Clone)]
pub struct MetadataResolver {
    title_chain: Vec<Field>,
    description_chain: Vec<Field>,
    landing: LandingPage,
}

impl Default for MetadataResolver {
    fn default() -> Self {
        Self::new(
            Field::chain(&["title"]),
            Field::chain(&["description_short", "description"]),
            LandingPage::default(),
        )
    }
}

impl MetadataResolver {
    pub fn new(title_chain: Vec<Field>, description_chain: Vec<Field>, landing: LandingPage) -> Self {
        Self {
            title_chain,
            description_chain,
            landing,
        }
    }

    pub fn landing(&self) -> &LandingPage {
        &self.landing
    }

    pub fn resolve(&self, row: &Row, locale: &Locale, item_key: &str) -> Resolution {
        let Some(title) = first_value(row, &self.title_chain, &locale.code) else {
            return Resolution::Skip(SkipReason::MissingTitle);
        };
        let title = truncate_with_ellipsis(&title, TITLE_MAX_CHARS);

        let body = first_value(row, &self.description_chain, &locale.code)
            .unwrap_or_else(|| DESCRIPTION_FALLBACK.to_string());
        let link = self.landing.url(locale, item_key);
        let description = truncate_with_ellipsis(&format!("{link}\n\n{body}"), DESCRIPTION_MAX_CHARS);

        Resolution::Publish(PublishMetadata { title, description })
    }
}

fn first_value(row: &Row, chain: &[Field], locale: &str) -> Option<String> {
    chain.iter().find_map(|field| {
        let raw = row.get(&field.column(locale))?;
        if is_placeholder(raw) {
            return None;
        }
        let clean = sanitize(raw);
        (!clean.is_empty()).then_some(clean)
    })
}

fn is_placeholder(raw: &str) -> bool {
    let t = raw.trim();
    t.is_empty() || PLACEHOLDERS.iter().any(|p| t.eq_ignore_ascii_case(p))
}

/// Strips tags, decodes the common entities and collapses whitespace.
pub fn sanitize(raw: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();
    static ENTITY: OnceLock<Regex> = OnceLock::new();
    let tag = TAG.get_or_init(|| Regex::new(r"<[^>]+>").expect("static regex"));
    let entity = ENTITY
        .get_or_init(|| Regex::new(r"&(nbsp|amp|lt|gt|quot|apos|#39);").expect("static regex"));

    let stripped = tag.replace_all(raw, "");
    let decoded = entity.replace_all(&stripped, |caps: &Captures<'_>| match &caps[1] {
        "nbsp" => " ",
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        _ => "'",
    });
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Caps `text` at `max` characters, ending in [`ELLIPSIS`] when cut.
pub fn truncate_with_ellipsis(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(ELLIPSIS.chars().count());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_tags_and_decodes_once() {
        assert_eq!(sanitize("<b>Rapide</b>&nbsp;et\n fiable"), "Rapide et fiable");
        assert_eq!(sanitize("a &amp;lt; b"), "a &lt; b");
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let text = "é".repeat(150);
        let cut = truncate_with_ellipsis(&text, TITLE_MAX_CHARS);
        assert_eq!(cut.chars().count(), 100);
        assert!(cut.ends_with(ELLIPSIS));
    }

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(truncate_with_ellipsis("abc", 3), "abc");
    }

    #[test]
    fn landing_url_omits_default_locale_segment() {
        let landing = LandingPage::default();
        let en = Locale::new("en", "https://shop.example");
        let fr = Locale::new("fr", "https://shop.example");
        assert_eq!(
            landing.url(&en, "42"),
            "https://shop.example/page_html/products/produit-42.html"
        );
        assert_eq!(
            landing.url(&fr, "42"),
            "https://shop.example/fr/page_html/products/produit-42.html"
        );
    }
}
