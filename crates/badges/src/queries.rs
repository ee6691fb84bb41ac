//! Badge read paths.
//!
//! Each query race-reads its inputs from the configured relays and reconciles
//! awards against acceptance declarations locally. Every race read takes the
//! first relay, in configured order, that returned data; nothing is merged
//! across relays.

use crate::error::{BadgeError, Result};
use crate::reconcile::{ExtendedAward, extend_awards};
use crate::relays::RelayRegistry;
use nostr::{
    Event, KIND_BADGE_AWARD, KIND_BADGE_DEFINITION, KIND_PROFILE_BADGES, PROFILE_BADGES_D_TAG,
    is_hex32, sort_events,
};
use nostr_client::{Filter, RelayPool};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Optional inclusive time bounds for the all-awards queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub since: Option<u64>,
    pub until: Option<u64>,
}

impl TimeRange {
    /// Parse raw query parameters. A value that is not an unsigned integer
    /// is treated as absent.
    pub fn parse(since: Option<&str>, until: Option<&str>) -> Self {
        let parse = |raw: Option<&str>| raw.and_then(|value| value.trim().parse::<u64>().ok());
        Self {
            since: parse(since),
            until: parse(until),
        }
    }

    fn apply(&self, mut filter: Filter) -> Filter {
        if let Some(since) = self.since {
            filter = filter.since(since);
        }
        if let Some(until) = self.until {
            filter = filter.until(until);
        }
        filter
    }
}

/// Filter for the acceptance declarations of the given authors.
pub fn declarations_filter(authors: impl IntoIterator<Item = impl Into<String>>) -> Filter {
    Filter::new()
        .kinds([KIND_PROFILE_BADGES])
        .authors(authors)
        .identifiers([PROFILE_BADGES_D_TAG])
}

pub(crate) fn require_pubkey(pubkey: &str) -> Result<()> {
    if is_hex32(pubkey) {
        Ok(())
    } else {
        Err(BadgeError::Validation(
            "Please provide valid public key.".to_string(),
        ))
    }
}

/// Pubkeys named by the awards, each once, in first-seen order.
fn distinct_recipients(awards: &[Event]) -> Vec<&str> {
    let mut seen = HashSet::new();
    awards
        .iter()
        .flat_map(|award| award.tag_values("p"))
        .filter(|pubkey| seen.insert(*pubkey))
        .collect()
}

#[derive(Clone)]
pub struct BadgeQueries {
    pool: RelayPool,
    relays: Arc<RelayRegistry>,
}

impl BadgeQueries {
    pub fn new(pool: RelayPool, relays: Arc<RelayRegistry>) -> Self {
        Self { pool, relays }
    }

    /// Badge definitions authored by `pubkey`, newest first.
    pub async fn definitions_by_author(&self, pubkey: &str) -> Result<Vec<Event>> {
        require_pubkey(pubkey)?;
        let relays = self.relays.snapshot()?;

        let filter = Filter::new()
            .kinds([KIND_BADGE_DEFINITION])
            .authors([pubkey]);
        let mut definitions = self
            .pool
            .race_query(&relays, vec![filter])
            .await?
            .unwrap_or_default();
        sort_events(&mut definitions);
        Ok(definitions)
    }

    /// Awards naming `pubkey`, each flagged with whether it was accepted.
    pub async fn awards_for_pubkey(&self, pubkey: &str) -> Result<Vec<ExtendedAward>> {
        self.for_pubkey(pubkey, false).await
    }

    /// Awards naming `pubkey` that `pubkey` has accepted.
    pub async fn accepted_for_pubkey(&self, pubkey: &str) -> Result<Vec<ExtendedAward>> {
        self.for_pubkey(pubkey, true).await
    }

    async fn for_pubkey(&self, pubkey: &str, accepted_only: bool) -> Result<Vec<ExtendedAward>> {
        require_pubkey(pubkey)?;
        let relays = self.relays.snapshot()?;

        let awards_filter = Filter::new()
            .kinds([KIND_BADGE_AWARD])
            .pubkey_refs([pubkey]);
        let read_awards = self.pool.race_query(&relays, vec![awards_filter]);
        let read_declaration = self
            .pool
            .race_first(&relays, vec![declarations_filter([pubkey])]);

        let (awards, declaration) = if accepted_only {
            // nothing can be accepted without a declaration
            let Some(declaration) = read_declaration.await? else {
                debug!("No acceptance declaration for {}", pubkey);
                return Ok(Vec::new());
            };
            (read_awards.await?, Some(declaration))
        } else {
            futures::try_join!(read_awards, read_declaration)?
        };

        let mut awards = awards.unwrap_or_default();
        sort_events(&mut awards);
        let declarations: Vec<Event> = declaration.into_iter().collect();
        Ok(extend_awards(awards, &declarations, accepted_only))
    }

    /// All awards in the time range, each flagged with whether any recipient
    /// accepted it.
    pub async fn all_awards(&self, range: TimeRange) -> Result<Vec<ExtendedAward>> {
        self.all(range, false).await
    }

    /// All accepted awards in the time range.
    pub async fn all_accepted(&self, range: TimeRange) -> Result<Vec<ExtendedAward>> {
        self.all(range, true).await
    }

    async fn all(&self, range: TimeRange, accepted_only: bool) -> Result<Vec<ExtendedAward>> {
        let relays = self.relays.snapshot()?;

        let awards_filter = range.apply(Filter::new().kinds([KIND_BADGE_AWARD]));
        let Some(mut awards) = self.pool.race_query(&relays, vec![awards_filter]).await? else {
            return Ok(Vec::new());
        };
        sort_events(&mut awards);

        let recipients = distinct_recipients(&awards);

        let declarations = if recipients.is_empty() {
            Vec::new()
        } else {
            debug!("Reading declarations for {} recipients", recipients.len());
            self.pool
                .race_query(&relays, vec![declarations_filter(recipients)])
                .await?
                .unwrap_or_default()
        };

        Ok(extend_awards(awards, &declarations, accepted_only))
    }
}
