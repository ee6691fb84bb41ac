//! Badge write paths: definitions, awards and acceptance declarations.
//!
//! Every operation builds and signs one event, then publishes it to all
//! configured relays. The report lists every relay in configured order.

use crate::error::{BadgeError, Result};
use crate::identity::{Identities, Role};
use crate::queries::require_pubkey;
use crate::relays::RelayRegistry;
use nostr::{
    BadgeAward, BadgeDefinition, EventTemplate, KIND_BADGE_AWARD, KIND_BADGE_DEFINITION,
    ProfileBadgePair, ProfileBadges, badge_coordinate, finalize_event, get_public_key_hex,
    is_hex32, parse_secret_key,
};
use nostr_client::{Filter, RelayOutcome, RelayPool};
use std::sync::Arc;
use tracing::{info, warn};

/// Per-relay result of publishing one event.
pub type PublishReport = Vec<RelayOutcome<bool>>;

#[derive(Clone)]
pub struct BadgeIssuer {
    pool: RelayPool,
    relays: Arc<RelayRegistry>,
    identities: Arc<Identities>,
}

fn require_text<'a>(value: Option<&'a str>, message: &str) -> Result<&'a str> {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text),
        _ => Err(BadgeError::Validation(message.to_string())),
    }
}

fn require_event_id(id: &str, message: &str) -> Result<()> {
    if is_hex32(id) {
        Ok(())
    } else {
        Err(BadgeError::Validation(message.to_string()))
    }
}

impl BadgeIssuer {
    pub fn new(pool: RelayPool, relays: Arc<RelayRegistry>, identities: Arc<Identities>) -> Self {
        Self {
            pool,
            relays,
            identities,
        }
    }

    /// Secret key to sign with: the caller's, or the service identity for
    /// `role` when none was given.
    fn signer(&self, sk: Option<&str>, role: Role) -> Result<[u8; 32]> {
        match sk.filter(|sk| !sk.is_empty()) {
            Some(sk) => parse_secret_key(sk)
                .map_err(|_| BadgeError::Validation("Please provide valid secret key.".to_string())),
            None => self
                .identities
                .get(role)
                .map(|identity| *identity.secret_key())
                .ok_or_else(|| {
                    BadgeError::Validation(format!(
                        "Please provide valid secret key or set up the {} first.",
                        role
                    ))
                }),
        }
    }

    async fn publish(
        &self,
        relays: &[String],
        template: &EventTemplate,
        sk: &[u8; 32],
    ) -> Result<PublishReport> {
        let event = finalize_event(template, sk)?;
        info!("Publishing kind {} event {}", event.kind, event.id);
        Ok(self.pool.broadcast_publish(relays, event).await?)
    }

    /// Publish a badge definition with the given unique name (`d`) and short
    /// name (`name`).
    pub async fn create_definition(
        &self,
        sk: Option<&str>,
        unique_name: Option<&str>,
        short_name: Option<&str>,
        content: &str,
    ) -> Result<PublishReport> {
        let relays = self.relays.snapshot()?;
        let sk = self.signer(sk, Role::Issuer)?;
        let unique_name = require_text(
            unique_name,
            "Please provide unique name for the badge definition.",
        )?;
        let short_name = require_text(
            short_name,
            "Please provide short name for the badge definition.",
        )?;

        let template = BadgeDefinition::new(unique_name)
            .with_name(short_name)
            .to_template(content);
        self.publish(&relays, &template, &sk).await
    }

    /// Award the badge defined by event `badge_id` to `award_pk`. The
    /// definition must have been authored by the signer.
    pub async fn award_badge(
        &self,
        sk: Option<&str>,
        award_pk: Option<&str>,
        badge_id: Option<&str>,
        content: &str,
    ) -> Result<PublishReport> {
        let relays = self.relays.snapshot()?;
        let sk = self.signer(sk, Role::Issuer)?;
        let award_pk = require_text(award_pk, "Please provide public key to award.")?;
        require_pubkey(award_pk)?;
        let badge_id = require_text(badge_id, "Please provide valid badge id to be rewarded.")?;
        require_event_id(badge_id, "Please provide valid badge id to be rewarded.")?;

        let issuer_pk = get_public_key_hex(&sk)?;
        let filter = Filter::new()
            .kinds([KIND_BADGE_DEFINITION])
            .authors([issuer_pk.as_str()])
            .ids([badge_id]);
        let definition = self
            .pool
            .race_first(&relays, vec![filter])
            .await?
            .ok_or_else(|| BadgeError::NotFound("Invalid badge id provided.".to_string()))?;
        let definition = BadgeDefinition::from_event(&definition)
            .map_err(|e| BadgeError::NotFound(format!("Invalid badge definition: {}", e)))?;

        let template = BadgeAward::new(badge_coordinate(&issuer_pk, &definition.identifier))
            .add_pubkey(award_pk)
            .to_template(content);
        self.publish(&relays, &template, &sk).await
    }

    /// Publish the signer's acceptance declaration for the given awards.
    /// Only awards that exist and name the signer are included.
    pub async fn accept_badges(
        &self,
        sk: Option<&str>,
        award_ids: Option<&[String]>,
        content: &str,
    ) -> Result<PublishReport> {
        let relays = self.relays.snapshot()?;
        let sk = self.signer(sk, Role::Receiver)?;
        let award_ids = award_ids.filter(|ids| !ids.is_empty()).ok_or_else(|| {
            BadgeError::Validation(
                "Please provide list of award event ids to be accepted.".to_string(),
            )
        })?;
        for id in award_ids {
            require_event_id(id, "Please provide valid award event ids.")?;
        }

        let receiver_pk = get_public_key_hex(&sk)?;
        let filter = Filter::new()
            .kinds([KIND_BADGE_AWARD])
            .ids(award_ids.iter().cloned())
            .pubkey_refs([receiver_pk.as_str()]);
        let awards = self
            .pool
            .race_query(&relays, vec![filter])
            .await?
            .unwrap_or_default();

        let mut profile = ProfileBadges::new();
        for id in award_ids {
            let Some(award) = awards.iter().find(|award| &award.id == id) else {
                warn!("Award {} not found for {}", id, receiver_pk);
                continue;
            };
            match BadgeAward::from_event(award) {
                Ok(parsed) => {
                    profile =
                        profile.add_badge(ProfileBadgePair::new(parsed.badge_definition, id.clone()));
                }
                Err(e) => warn!("Skipping malformed award {}: {}", id, e),
            }
        }

        self.publish(&relays, &profile.to_template(content), &sk)
            .await
    }
}
