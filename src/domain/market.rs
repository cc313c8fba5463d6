//! Market model - Polymarket prediction market state.
//!
//! A market pairs two outcome tokens (YES and NO) under one condition id.
//! Identity fields are immutable after load; only the last-known outcome
//! prices mutate as stream events arrive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One side of a binary prediction market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Yes,
    No,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yes => write!(f, "YES"),
            Self::No => write!(f, "NO"),
        }
    }
}

/// A Polymarket prediction market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    /// Stable market identifier from the metadata API.
    pub id: String,
    /// Condition id grouping the outcome token pair (user-channel key).
    pub condition_id: String,
    /// Market question text.
    pub question: String,
    /// URL slug.
    pub slug: String,
    /// Token id for the YES outcome.
    pub token_id_yes: String,
    /// Token id for the NO outcome.
    pub token_id_no: String,
    /// Last known YES price in [0, 1].
    pub price_yes: f64,
    /// Last known NO price in [0, 1].
    pub price_no: f64,
    /// Lifetime traded volume.
    pub volume: f64,
    /// Current liquidity.
    pub liquidity: f64,
    /// Whether the market is accepting orders.
    pub active: bool,
    /// Whether the market has closed.
    pub closed: bool,
    /// When this metadata snapshot was fetched.
    pub fetched_at: DateTime<Utc>,
}

impl Market {
    /// Which outcome a token id belongs to, if it belongs to this market.
    pub fn outcome_for(&self, token_id: &str) -> Option<Outcome> {
        if token_id == self.token_id_yes {
            Some(Outcome::Yes)
        } else if token_id == self.token_id_no {
            Some(Outcome::No)
        } else {
            None
        }
    }

    /// Token id for the given outcome.
    pub fn token_id(&self, outcome: Outcome) -> &str {
        match outcome {
            Outcome::Yes => &self.token_id_yes,
            Outcome::No => &self.token_id_no,
        }
    }

    /// Last known price for the given outcome.
    pub fn price(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Yes => self.price_yes,
            Outcome::No => self.price_no,
        }
    }

    /// Update the last known price for the given outcome.
    pub fn set_price(&mut self, outcome: Outcome, price: f64) {
        match outcome {
            Outcome::Yes => self.price_yes = price,
            Outcome::No => self.price_no = price,
        }
    }

    /// Last known price for a token id, if the token belongs here.
    pub fn price_for_token(&self, token_id: &str) -> Option<f64> {
        self.outcome_for(token_id).map(|o| self.price(o))
    }

    /// Both outcome token ids, YES first.
    pub fn token_ids(&self) -> [&str; 2] {
        [&self.token_id_yes, &self.token_id_no]
    }

    /// Public Polymarket URL for this market.
    pub fn url(&self) -> String {
        format!("https://polymarket.com/event/{}", self.slug)
    }
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Market(id={}, slug={}, yes={:.2})",
            self.id, self.slug, self.price_yes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market() -> Market {
        Market {
            id: "123".to_string(),
            condition_id: "0xcond".to_string(),
            question: "Will it rain tomorrow?".to_string(),
            slug: "will-it-rain-tomorrow".to_string(),
            token_id_yes: "tok_yes".to_string(),
            token_id_no: "tok_no".to_string(),
            price_yes: 0.62,
            price_no: 0.38,
            volume: 1000.0,
            liquidity: 250.0,
            active: true,
            closed: false,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn outcome_for_maps_both_tokens() {
        let m = market();
        assert_eq!(m.outcome_for("tok_yes"), Some(Outcome::Yes));
        assert_eq!(m.outcome_for("tok_no"), Some(Outcome::No));
        assert_eq!(m.outcome_for("other"), None);
    }

    #[test]
    fn set_price_mutates_only_one_side() {
        let mut m = market();
        m.set_price(Outcome::Yes, 0.70);
        assert_eq!(m.price_yes, 0.70);
        assert_eq!(m.price_no, 0.38);
    }

    #[test]
    fn price_for_token_follows_outcome() {
        let m = market();
        assert_eq!(m.price_for_token("tok_no"), Some(0.38));
        assert_eq!(m.price_for_token("unknown"), None);
    }
}
