//! Acceptance reconciliation.
//!
//! Awards and acceptance declarations are read independently, possibly from
//! different relays. An award counts as accepted when any pubkey it names has
//! declared the award's id in its profile badges event.

use nostr::{Event, KIND_PROFILE_BADGES};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// An award event with its derived acceptance flag. Serializes as the event's
/// fields plus `accepted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtendedAward {
    #[serde(flatten)]
    pub event: Event,
    pub accepted: bool,
}

/// Pubkey to accepted award ids, built once per query.
///
/// When an author has several declarations the newest one is used; on equal
/// timestamps the first one seen wins.
#[derive(Debug, Default)]
pub struct AcceptanceIndex {
    by_author: HashMap<String, (u64, HashSet<String>)>,
}

impl AcceptanceIndex {
    pub fn build<'a>(declarations: impl IntoIterator<Item = &'a Event>) -> Self {
        let mut by_author: HashMap<String, (u64, HashSet<String>)> = HashMap::new();

        for declaration in declarations {
            if declaration.kind != KIND_PROFILE_BADGES {
                continue;
            }
            if let Some((created_at, _)) = by_author.get(&declaration.pubkey)
                && *created_at >= declaration.created_at
            {
                continue;
            }
            let accepted = declaration.tag_values("e").map(str::to_string).collect();
            by_author.insert(
                declaration.pubkey.clone(),
                (declaration.created_at, accepted),
            );
        }

        Self { by_author }
    }

    pub fn is_empty(&self) -> bool {
        self.by_author.is_empty()
    }

    /// Whether `pubkey` has declared `award_id` as accepted.
    pub fn has_accepted(&self, pubkey: &str, award_id: &str) -> bool {
        self.by_author
            .get(pubkey)
            .is_some_and(|(_, accepted)| accepted.contains(award_id))
    }

    /// Whether any pubkey the award names has accepted it. An award naming
    /// nobody is never accepted.
    pub fn is_accepted(&self, award: &Event) -> bool {
        award
            .tag_values("p")
            .any(|pubkey| self.has_accepted(pubkey, &award.id))
    }

    pub fn extend(&self, award: Event) -> ExtendedAward {
        let accepted = self.is_accepted(&award);
        ExtendedAward {
            event: award,
            accepted,
        }
    }
}

/// Acceptance flag per award id.
pub fn reconcile(awards: &[Event], declarations: &[Event]) -> HashMap<String, bool> {
    let index = AcceptanceIndex::build(declarations);
    awards
        .iter()
        .map(|award| (award.id.clone(), index.is_accepted(award)))
        .collect()
}

/// Extend every award with its acceptance flag, optionally keeping only the
/// accepted ones. Order is preserved.
pub fn extend_awards(
    awards: Vec<Event>,
    declarations: &[Event],
    accepted_only: bool,
) -> Vec<ExtendedAward> {
    let index = AcceptanceIndex::build(declarations);
    awards
        .into_iter()
        .map(|award| index.extend(award))
        .filter(|award| award.accepted || !accepted_only)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr::KIND_BADGE_AWARD;
    use proptest::prelude::*;

    fn event(id: &str, pubkey: &str, kind: u16, created_at: u64, tags: Vec<Vec<String>>) -> Event {
        Event {
            id: id.to_string(),
            pubkey: pubkey.to_string(),
            created_at,
            kind,
            tags,
            content: String::new(),
            sig: String::new(),
        }
    }

    fn award(id: &str, pubkeys: &[&str]) -> Event {
        let mut tags = vec![vec!["a".to_string(), "30009:issuer:bravery".to_string()]];
        tags.extend(pubkeys.iter().map(|pk| vec!["p".to_string(), pk.to_string()]));
        event(id, "issuer", KIND_BADGE_AWARD, 1, tags)
    }

    fn declaration(author: &str, created_at: u64, accepted: &[&str]) -> Event {
        let mut tags = vec![vec!["d".to_string(), "profile_badges".to_string()]];
        for id in accepted {
            tags.push(vec!["a".to_string(), "30009:issuer:bravery".to_string()]);
            tags.push(vec!["e".to_string(), id.to_string()]);
        }
        event(
            &format!("decl-{}-{}", author, created_at),
            author,
            KIND_PROFILE_BADGES,
            created_at,
            tags,
        )
    }

    #[test]
    fn test_any_named_pubkey_can_accept() {
        let awards = vec![award("award1", &["pkX", "pkY"]), award("award2", &["pkZ"])];
        let declarations = vec![declaration("pkY", 10, &["award1"])];

        let result = reconcile(&awards, &declarations);
        assert_eq!(result["award1"], true);
        assert_eq!(result["award2"], false);
    }

    #[test]
    fn test_award_without_pubkeys_is_never_accepted() {
        let awards = vec![award("award1", &[])];
        let declarations = vec![declaration("pkX", 10, &["award1"])];

        assert_eq!(reconcile(&awards, &declarations)["award1"], false);
    }

    #[test]
    fn test_declaration_by_unnamed_pubkey_does_not_count() {
        let awards = vec![award("award1", &["pkX"])];
        let declarations = vec![declaration("pkY", 10, &["award1"])];

        assert_eq!(reconcile(&awards, &declarations)["award1"], false);
    }

    #[test]
    fn test_newest_declaration_wins() {
        let awards = vec![award("award1", &["pkX"]), award("award2", &["pkX"])];
        let declarations = vec![
            declaration("pkX", 20, &["award2"]),
            declaration("pkX", 10, &["award1"]),
        ];

        let result = reconcile(&awards, &declarations);
        assert_eq!(result["award1"], false);
        assert_eq!(result["award2"], true);
    }

    #[test]
    fn test_first_declaration_wins_on_equal_timestamps() {
        let awards = vec![award("award1", &["pkX"])];
        let declarations = vec![
            declaration("pkX", 10, &["award1"]),
            declaration("pkX", 10, &[]),
        ];

        assert_eq!(reconcile(&awards, &declarations)["award1"], true);
    }

    #[test]
    fn test_non_declaration_events_are_ignored() {
        let awards = vec![award("award1", &["pkX"])];
        let mut not_a_declaration = declaration("pkX", 10, &["award1"]);
        not_a_declaration.kind = 30009;

        assert!(AcceptanceIndex::build(&[not_a_declaration]).is_empty());
        assert_eq!(reconcile(&awards, &[])["award1"], false);
    }

    #[test]
    fn test_extend_awards_filters_and_keeps_order() {
        let awards = vec![
            award("award1", &["pkX"]),
            award("award2", &["pkX"]),
            award("award3", &["pkX"]),
        ];
        let declarations = vec![declaration("pkX", 10, &["award3", "award1"])];

        let all = extend_awards(awards.clone(), &declarations, false);
        let flags: Vec<(&str, bool)> = all
            .iter()
            .map(|a| (a.event.id.as_str(), a.accepted))
            .collect();
        assert_eq!(
            flags,
            vec![("award1", true), ("award2", false), ("award3", true)]
        );

        let accepted = extend_awards(awards, &declarations, true);
        let ids: Vec<&str> = accepted.iter().map(|a| a.event.id.as_str()).collect();
        assert_eq!(ids, vec!["award1", "award3"]);
    }

    #[test]
    fn test_extended_award_serializes_flat() {
        let extended = AcceptanceIndex::default().extend(award("award1", &["pkX"]));
        let json = serde_json::to_value(&extended).unwrap();

        assert_eq!(json["id"], "award1");
        assert_eq!(json["kind"], 8);
        assert_eq!(json["accepted"], false);
        assert!(json.get("event").is_none());
    }

    /// Per-award walk over the raw declarations, newest per author.
    fn brute_force(awards: &[Event], declarations: &[Event]) -> HashMap<String, bool> {
        awards
            .iter()
            .map(|award| {
                let accepted = award.tag_values("p").any(|pubkey| {
                    let mut newest: Option<&Event> = None;
                    for declaration in declarations.iter().filter(|d| d.pubkey == pubkey) {
                        if newest.is_none_or(|n| declaration.created_at > n.created_at) {
                            newest = Some(declaration);
                        }
                    }
                    newest.is_some_and(|d| d.tag_values("e").any(|id| id == award.id))
                });
                (award.id.clone(), accepted)
            })
            .collect()
    }

    const PUBKEYS: [&str; 4] = ["pkA", "pkB", "pkC", "pkD"];

    fn awards_strategy() -> impl Strategy<Value = Vec<Event>> {
        prop::collection::vec(prop::collection::vec(0..PUBKEYS.len(), 0..3), 0..8).prop_map(
            |named| {
                named
                    .iter()
                    .enumerate()
                    .map(|(i, pks)| {
                        let pks: Vec<&str> = pks.iter().map(|&p| PUBKEYS[p]).collect();
                        award(&format!("award{}", i), &pks)
                    })
                    .collect()
            },
        )
    }

    fn declarations_strategy() -> impl Strategy<Value = Vec<Event>> {
        prop::collection::vec(
            (0..PUBKEYS.len(), 0u64..4, prop::collection::vec(0usize..8, 0..5)),
            0..8,
        )
        .prop_map(|decls| {
            decls
                .into_iter()
                .map(|(author, created_at, accepted)| {
                    let ids: Vec<String> = accepted.iter().map(|i| format!("award{}", i)).collect();
                    let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
                    declaration(PUBKEYS[author], created_at, &ids)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn test_reconcile_matches_brute_force(
            awards in awards_strategy(),
            declarations in declarations_strategy(),
        ) {
            prop_assert_eq!(
                reconcile(&awards, &declarations),
                brute_force(&awards, &declarations)
            );
        }
    }
}
