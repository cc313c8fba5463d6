//! Polymarket URL parsing.
//!
//! Market references in config may be full Polymarket URLs, bare slugs,
//! or numeric ids. This module extracts the reference kind and slug from
//! URLs like:
//!
//! - `https://polymarket.com/event/fed-decision-in-october`
//! - `https://polymarket.com/event/fed-decision-in-october?tid=1758818660485`
//! - `https://polymarket.com/market/will-bitcoin-reach-100k`

/// Kind of page a Polymarket URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlKind {
    /// An event page aggregating one or more markets.
    Event,
    /// A single market page.
    Market,
}

/// A parsed Polymarket URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMarketUrl {
    /// Event or market page.
    pub kind: UrlKind,
    /// The URL slug identifying the event/market.
    pub slug: String,
}

/// Parse a Polymarket URL into its kind and slug.
///
/// Returns `None` for anything that is not a `polymarket.com` event or
/// market URL with a slug.
pub fn parse_market_url(url: &str) -> Option<ParsedMarketUrl> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;

    let (host, path) = rest.split_once('/')?;
    if host != "polymarket.com" && !host.ends_with(".polymarket.com") {
        return None;
    }

    // Drop query string and fragment before splitting the path.
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let mut parts = path.split('/').filter(|p| !p.is_empty());

    let kind = match parts.next()? {
        "event" => UrlKind::Event,
        "market" => UrlKind::Market,
        _ => return None,
    };
    let slug = parts.next()?;
    if slug.is_empty() {
        return None;
    }

    Some(ParsedMarketUrl {
        kind,
        slug: slug.to_string(),
    })
}

/// Whether a string looks like a Polymarket URL at all.
pub fn is_market_url(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}
