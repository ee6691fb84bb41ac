//! Nostr protocol types for the badge service.
//!
//! This crate provides:
//! - NIP-01: Basic protocol (events, signing, verification)
//! - NIP-58: Badges (definitions, awards, profile badges)

mod nip01;
mod nip58;

// NIP-01: Basic protocol
pub use nip01::{
    Event, EventTemplate, Nip01Error, UnsignedEvent, finalize_event, generate_secret_key,
    get_event_hash, get_public_key, get_public_key_hex, is_hex32, parse_secret_key,
    serialize_event, sort_events, unix_now, validate_event, verify_event,
};

// NIP-58: Badges
pub use nip58::{
    BadgeAward, BadgeDefinition, BadgeKind, KIND_BADGE_AWARD, KIND_BADGE_DEFINITION,
    KIND_PROFILE_BADGES, Nip58Error, PROFILE_BADGES_D_TAG, ProfileBadgePair, ProfileBadges,
    badge_coordinate,
};
