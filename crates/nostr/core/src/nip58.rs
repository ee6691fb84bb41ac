//! NIP-58: Badges
//!
//! Three event kinds make up the badge lifecycle:
//! - Badge Definition (kind 30009): an issuer declares a badge type
//! - Badge Award (kind 8): an issuer grants a badge to one or more pubkeys
//! - Profile Badges (kind 30008): a recipient declares which awards it accepts
//!
//! See: <https://github.com/nostr-protocol/nips/blob/master/58.md>

use crate::nip01::{Event, EventTemplate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event kind for badge definitions (addressable)
pub const KIND_BADGE_DEFINITION: u16 = 30009;

/// Event kind for badge awards
pub const KIND_BADGE_AWARD: u16 = 8;

/// Event kind for profile badges (addressable)
pub const KIND_PROFILE_BADGES: u16 = 30008;

/// Fixed d tag value for profile badges
pub const PROFILE_BADGES_D_TAG: &str = "profile_badges";

/// Errors that can occur during NIP-58 operations
#[derive(Debug, Error)]
pub enum Nip58Error {
    #[error("expected kind {expected}, got {found}")]
    WrongKind { expected: u16, found: u16 },

    #[error("missing required tag: {0}")]
    MissingTag(String),

    #[error("invalid tag format: {0}")]
    InvalidTagFormat(String),
}

/// The role an event plays in the badge lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeKind {
    Definition,
    Award,
    /// Acceptance declaration published by the recipient.
    ProfileBadges,
}

impl BadgeKind {
    pub fn kind(self) -> u16 {
        match self {
            BadgeKind::Definition => KIND_BADGE_DEFINITION,
            BadgeKind::Award => KIND_BADGE_AWARD,
            BadgeKind::ProfileBadges => KIND_PROFILE_BADGES,
        }
    }

    pub fn from_kind(kind: u16) -> Option<Self> {
        match kind {
            KIND_BADGE_DEFINITION => Some(BadgeKind::Definition),
            KIND_BADGE_AWARD => Some(BadgeKind::Award),
            KIND_PROFILE_BADGES => Some(BadgeKind::ProfileBadges),
            _ => None,
        }
    }

    fn ensure(self, event: &Event) -> Result<(), Nip58Error> {
        if event.kind == self.kind() {
            Ok(())
        } else {
            Err(Nip58Error::WrongKind {
                expected: self.kind(),
                found: event.kind,
            })
        }
    }
}

/// Address of a badge definition: `30009:<issuer pubkey>:<identifier>`.
pub fn badge_coordinate(issuer_pubkey: &str, identifier: &str) -> String {
    format!("{}:{}:{}", KIND_BADGE_DEFINITION, issuer_pubkey, identifier)
}

/// Badge definition (kind 30009)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeDefinition {
    /// Unique identifier (d tag)
    pub identifier: String,
    /// Short display name
    pub name: Option<String>,
    pub description: Option<String>,
    /// High-resolution image URL
    pub image: Option<String>,
}

impl BadgeDefinition {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            name: None,
            description: None,
            image: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image = Some(url.into());
        self
    }

    /// Convert to event tags. The d tag always comes first.
    pub fn to_tags(&self) -> Vec<Vec<String>> {
        let mut tags = vec![vec!["d".to_string(), self.identifier.clone()]];
        let optional = [
            ("name", &self.name),
            ("description", &self.description),
            ("image", &self.image),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                tags.push(vec![key.to_string(), value.clone()]);
            }
        }
        tags
    }

    /// Parse from event tags
    pub fn from_tags(tags: &[Vec<String>]) -> Result<Self, Nip58Error> {
        let mut definition: Option<Self> = None;
        let mut name = None;
        let mut description = None;
        let mut image = None;

        for tag in tags {
            let Some(key) = tag.first() else { continue };
            let value = tag.get(1).cloned();
            match key.as_str() {
                "d" => {
                    let identifier = value.ok_or_else(|| {
                        Nip58Error::InvalidTagFormat("d tag requires identifier".to_string())
                    })?;
                    definition = Some(Self::new(identifier));
                }
                "name" => name = value.or(name),
                "description" => description = value.or(description),
                "image" => image = value.or(image),
                _ => {}
            }
        }

        let mut definition =
            definition.ok_or_else(|| Nip58Error::MissingTag("d tag required".to_string()))?;
        definition.name = name;
        definition.description = description;
        definition.image = image;
        Ok(definition)
    }

    pub fn from_event(event: &Event) -> Result<Self, Nip58Error> {
        BadgeKind::Definition.ensure(event)?;
        Self::from_tags(&event.tags)
    }

    pub fn to_template(&self, content: impl Into<String>) -> EventTemplate {
        EventTemplate::new(KIND_BADGE_DEFINITION, content).with_tags(self.to_tags())
    }
}

/// Badge award (kind 8)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeAward {
    /// Badge definition coordinate (30009:pubkey:identifier)
    pub badge_definition: String,
    pub awarded_pubkeys: Vec<String>,
}

impl BadgeAward {
    pub fn new(badge_definition: impl Into<String>) -> Self {
        Self {
            badge_definition: badge_definition.into(),
            awarded_pubkeys: Vec::new(),
        }
    }

    pub fn add_pubkey(mut self, pubkey: impl Into<String>) -> Self {
        self.awarded_pubkeys.push(pubkey.into());
        self
    }

    pub fn to_tags(&self) -> Vec<Vec<String>> {
        std::iter::once(vec!["a".to_string(), self.badge_definition.clone()])
            .chain(
                self.awarded_pubkeys
                    .iter()
                    .map(|pubkey| vec!["p".to_string(), pubkey.clone()]),
            )
            .collect()
    }

    /// Parse from event tags. Requires an a tag and at least one p tag.
    pub fn from_tags(tags: &[Vec<String>]) -> Result<Self, Nip58Error> {
        let mut badge_definition = None;
        let mut awarded_pubkeys = Vec::new();

        for tag in tags {
            match (tag.first().map(String::as_str), tag.get(1)) {
                (Some("a"), Some(coordinate)) => {
                    badge_definition.get_or_insert_with(|| coordinate.clone());
                }
                (Some("p"), Some(pubkey)) => awarded_pubkeys.push(pubkey.clone()),
                (Some(key @ ("a" | "p")), None) => {
                    return Err(Nip58Error::InvalidTagFormat(format!(
                        "{} tag requires a value",
                        key
                    )));
                }
                _ => {}
            }
        }

        let badge_definition =
            badge_definition.ok_or_else(|| Nip58Error::MissingTag("a tag required".to_string()))?;
        if awarded_pubkeys.is_empty() {
            return Err(Nip58Error::MissingTag(
                "at least one p tag required".to_string(),
            ));
        }

        Ok(Self {
            badge_definition,
            awarded_pubkeys,
        })
    }

    pub fn from_event(event: &Event) -> Result<Self, Nip58Error> {
        BadgeKind::Award.ensure(event)?;
        Self::from_tags(&event.tags)
    }

    pub fn to_template(&self, content: impl Into<String>) -> EventTemplate {
        EventTemplate::new(KIND_BADGE_AWARD, content).with_tags(self.to_tags())
    }
}

/// One accepted award: the definition it refers to plus the award event id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileBadgePair {
    pub badge_definition: String,
    pub award_event_id: String,
}

impl ProfileBadgePair {
    pub fn new(badge_definition: impl Into<String>, award_event_id: impl Into<String>) -> Self {
        Self {
            badge_definition: badge_definition.into(),
            award_event_id: award_event_id.into(),
        }
    }
}

/// Profile badges (kind 30008), the recipient's acceptance declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileBadges {
    /// Ordered list of accepted badges
    pub badges: Vec<ProfileBadgePair>,
}

impl ProfileBadges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_badge(mut self, pair: ProfileBadgePair) -> Self {
        self.badges.push(pair);
        self
    }

    /// Award event ids in display order.
    pub fn accepted_ids(&self) -> impl Iterator<Item = &str> {
        self.badges.iter().map(|pair| pair.award_event_id.as_str())
    }

    /// Convert to event tags: the fixed d tag followed by a/e pairs.
    pub fn to_tags(&self) -> Vec<Vec<String>> {
        let mut tags = vec![vec!["d".to_string(), PROFILE_BADGES_D_TAG.to_string()]];
        for pair in &self.badges {
            tags.push(vec!["a".to_string(), pair.badge_definition.clone()]);
            tags.push(vec!["e".to_string(), pair.award_event_id.clone()]);
        }
        tags
    }

    /// Parse from event tags. An e tag pairs with the closest preceding
    /// unpaired a tag; anything unpaired is ignored.
    pub fn from_tags(tags: &[Vec<String>]) -> Result<Self, Nip58Error> {
        let mut has_d_tag = false;
        let mut pending_a: Option<&String> = None;
        let mut badges = Vec::new();

        for tag in tags {
            match (tag.first().map(String::as_str), tag.get(1)) {
                (Some("d"), Some(value)) if value == PROFILE_BADGES_D_TAG => has_d_tag = true,
                (Some("a"), Some(coordinate)) => pending_a = Some(coordinate),
                (Some("e"), Some(award_id)) => {
                    if let Some(coordinate) = pending_a.take() {
                        badges.push(ProfileBadgePair::new(coordinate.clone(), award_id.clone()));
                    }
                }
                _ => {}
            }
        }

        if !has_d_tag {
            return Err(Nip58Error::MissingTag(format!(
                "d tag with value '{}' required",
                PROFILE_BADGES_D_TAG
            )));
        }

        Ok(Self { badges })
    }

    pub fn from_event(event: &Event) -> Result<Self, Nip58Error> {
        BadgeKind::ProfileBadges.ensure(event)?;
        Self::from_tags(&event.tags)
    }

    pub fn to_template(&self, content: impl Into<String>) -> EventTemplate {
        EventTemplate::new(KIND_PROFILE_BADGES, content).with_tags(self.to_tags())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nip01::{finalize_event, generate_secret_key};

    fn tags(raw: &[&[&str]]) -> Vec<Vec<String>> {
        raw.iter()
            .map(|tag| tag.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_badge_kind_mapping() {
        for kind in [BadgeKind::Definition, BadgeKind::Award, BadgeKind::ProfileBadges] {
            assert_eq!(BadgeKind::from_kind(kind.kind()), Some(kind));
        }
        assert_eq!(BadgeKind::from_kind(1), None);
        assert_eq!(BadgeKind::Definition.kind(), 30009);
        assert_eq!(BadgeKind::Award.kind(), 8);
        assert_eq!(BadgeKind::ProfileBadges.kind(), 30008);
    }

    #[test]
    fn test_badge_coordinate() {
        assert_eq!(badge_coordinate("alice", "bravery"), "30009:alice:bravery");
    }

    #[test]
    fn test_definition_tags_roundtrip() {
        let def = BadgeDefinition::new("bravery")
            .with_name("Medal of Bravery")
            .with_image("https://example.com/bravery.png");

        let tags = def.to_tags();
        assert_eq!(tags[0], vec!["d", "bravery"]);
        assert_eq!(tags[1], vec!["name", "Medal of Bravery"]);
        assert_eq!(BadgeDefinition::from_tags(&tags).unwrap(), def);
    }

    #[test]
    fn test_definition_requires_d_tag() {
        let result = BadgeDefinition::from_tags(&tags(&[&["name", "Test"]]));
        assert!(matches!(result, Err(Nip58Error::MissingTag(_))));
        let result = BadgeDefinition::from_tags(&tags(&[&["d"]]));
        assert!(matches!(result, Err(Nip58Error::InvalidTagFormat(_))));
    }

    #[test]
    fn test_award_from_tags() {
        let award = BadgeAward::from_tags(&tags(&[
            &["a", "30009:alice:bravery"],
            &["p", "bob", "wss://relay1"],
            &["p", "charlie"],
        ]))
        .unwrap();

        assert_eq!(award.badge_definition, "30009:alice:bravery");
        assert_eq!(award.awarded_pubkeys, vec!["bob", "charlie"]);
    }

    #[test]
    fn test_award_requires_a_and_p() {
        assert!(BadgeAward::from_tags(&tags(&[&["p", "bob"]])).is_err());
        assert!(BadgeAward::from_tags(&tags(&[&["a", "30009:alice:bravery"]])).is_err());
        assert!(BadgeAward::from_tags(&tags(&[&["a", "x"], &["p"]])).is_err());
    }

    #[test]
    fn test_award_to_tags() {
        let award = BadgeAward::new("30009:alice:bravery").add_pubkey("bob");
        assert_eq!(
            award.to_tags(),
            tags(&[&["a", "30009:alice:bravery"], &["p", "bob"]])
        );
    }

    #[test]
    fn test_profile_badges_pairs_a_and_e() {
        let badges = ProfileBadges::from_tags(&tags(&[
            &["d", "profile_badges"],
            &["a", "30009:alice:bravery"],
            &["a", "30009:alice:honor"],
            &["e", "event2"],
            &["e", "event3"],
        ]))
        .unwrap();

        assert_eq!(badges.badges.len(), 1);
        assert_eq!(badges.badges[0].badge_definition, "30009:alice:honor");
        assert_eq!(badges.accepted_ids().collect::<Vec<_>>(), vec!["event2"]);
    }

    #[test]
    fn test_profile_badges_requires_fixed_d_tag() {
        let result = ProfileBadges::from_tags(&tags(&[&["d", "other"], &["a", "x"], &["e", "y"]]));
        assert!(result.is_err());
    }

    #[test]
    fn test_profile_badges_template() {
        let template = ProfileBadges::new()
            .add_badge(ProfileBadgePair::new("30009:alice:bravery", "event1"))
            .to_template("");

        assert_eq!(template.kind, KIND_PROFILE_BADGES);
        assert_eq!(
            template.tags,
            tags(&[
                &["d", "profile_badges"],
                &["a", "30009:alice:bravery"],
                &["e", "event1"],
            ])
        );
    }

    #[test]
    fn test_from_event_checks_kind() {
        let sk = generate_secret_key();
        let award = BadgeAward::new("30009:alice:bravery").add_pubkey("bob");
        let event = finalize_event(&award.to_template(""), &sk).unwrap();

        assert_eq!(BadgeAward::from_event(&event).unwrap(), award);
        assert!(matches!(
            BadgeDefinition::from_event(&event),
            Err(Nip58Error::WrongKind { expected: 30009, found: 8 })
        ));
    }
}
