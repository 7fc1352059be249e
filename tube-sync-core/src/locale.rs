//! Locale descriptors and deterministic locale ordering.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// One language/market variant of the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locale {
    /// Locale code as discovered (e.g. `fr`, `pt-br`).
    pub code: String,
    /// Landing site base URL for this locale, without trailing slash.
    pub site_url: String,
}

impl Locale {
    pub fn new(code: impl Into<String>, site_url: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            site_url: site_url.into().trim_end_matches('/').to_string(),
        }
    }
}

/// Which locales a run should process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocaleSelection {
    /// Every discovered locale.
    All,
    /// Only these codes (matched case-insensitively), in the given order.
    Only(Vec<String>),
}

impl LocaleSelection {
    /// An empty list means "all", matching how the selection file stores it.
    pub fn from_codes(codes: Vec<String>) -> Self {
        if codes.is_empty() {
            LocaleSelection::All
        } else {
            LocaleSelection::Only(codes)
        }
    }
}

/// Orders discovered locales and applies the selection.
///
/// `All` yields every locale in natural order. `Only` yields the matching
/// locales in the order the codes were given, dropping unknown codes and
/// repeated ones.
pub fn select_locales(discovered: &[Locale], selection: &LocaleSelection) -> Vec<Locale> {
    match selection {
        LocaleSelection::All => {
            let mut all = discovered.to_vec();
            all.sort_by(|a, b| natural_cmp(&a.code, &b.code));
            all
        }
        LocaleSelection::Only(codes) => {
            let mut picked: Vec<Locale> = Vec::new();
            for code in codes {
                let wanted = code.trim().to_lowercase();
                if picked.iter().any(|l| l.code.to_lowercase() == wanted) {
                    continue;
                }
                if let Some(found) = discovered.iter().find(|l| l.code.to_lowercase() == wanted) {
                    picked.push(found.clone());
                }
            }
            picked
        }
    }
}

/// Natural string ordering: runs of ASCII digits compare by numeric value,
/// everything else compares case-insensitively, then byte-wise as a tiebreak.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let xs = take_digits(&mut left);
                let ys = take_digits(&mut right);
                let xt = xs.trim_start_matches('0');
                let yt = ys.trim_start_matches('0');
                let ord = xt.len().cmp(&yt.len()).then_with(|| xt.cmp(yt));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                let ord = x.to_lowercase().cmp(y.to_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits
}
