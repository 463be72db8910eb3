// Stateless predicates applied to every inbound wire field before it
// reaches a room or a session. Anything rejected here is dropped silently;
// no state may be mutated on the rejection path.

use crate::domain::entity::PlayerState;

pub const MAX_ID_LEN: usize = 32;
pub const MIN_USERNAME_LEN: usize = 3;
pub const MAX_USERNAME_LEN: usize = 24;
pub const MAX_CHAT_LEN: usize = 240;
pub const MAX_ZONE_ID: u32 = 32;
/// Ceiling for a single client damage claim; anything above is implausible
/// for any weapon the game ships.
pub const MAX_DAMAGE_CLAIM: i32 = 200;
/// Zone-space coordinate bound; positions beyond this are malformed.
pub const MAX_COORD: f32 = 20_000.0;

const CHARACTERS: &[&str] = &["knight", "ranger", "mage", "rogue"];

fn valid_id_charset(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
}

/// Room and player ids share one shape: short, ASCII, safe to log and to
/// use as map keys.
pub fn valid_id(value: &str) -> bool {
    !value.is_empty() && value.len() <= MAX_ID_LEN && valid_id_charset(value)
}

/// Keep names compact and readable for game UI and logs.
pub fn valid_username(value: &str) -> bool {
    let len = value.chars().count();
    if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len) {
        return false;
    }
    if value.trim() != value {
        return false;
    }
    value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-'))
}

pub fn valid_character(value: &str) -> bool {
    CHARACTERS.contains(&value)
}

pub fn valid_zone_id(zone_id: u32) -> bool {
    zone_id <= MAX_ZONE_ID
}

pub fn valid_damage(amount: i32) -> bool {
    amount > 0 && amount <= MAX_DAMAGE_CLAIM
}

pub fn valid_coord(value: f32) -> bool {
    value.is_finite() && value.abs() <= MAX_COORD
}

pub fn valid_chat_text(value: &str) -> bool {
    let len = value.chars().count();
    (1..=MAX_CHAT_LEN).contains(&len) && !value.chars().any(char::is_control)
}

/// Rejects non-finite fields and clamps the rest into plausible ranges.
/// Returns `None` when the state cannot be salvaged.
pub fn sanitize_player_state(mut state: PlayerState) -> Option<PlayerState> {
    if !valid_coord(state.x) || !valid_coord(state.y) {
        return None;
    }
    if !state.angle.is_finite() || !state.speed.is_finite() {
        return None;
    }
    if !valid_zone_id(state.zone_level) {
        return None;
    }

    state.speed = state.speed.clamp(0.0, 1_000.0);
    state.hp = state.hp.clamp(0, 1_000);
    Some(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_id_is_well_formed_then_it_is_accepted() {
        assert!(valid_id("room-1"));
        assert!(valid_id("p_42"));
    }

    #[test]
    fn when_id_is_empty_oversized_or_odd_then_it_is_rejected() {
        assert!(!valid_id(""));
        assert!(!valid_id(&"x".repeat(MAX_ID_LEN + 1)));
        assert!(!valid_id("no spaces"));
        assert!(!valid_id("semi;colon"));
    }

    #[test]
    fn when_username_breaks_the_rules_then_it_is_rejected() {
        assert!(valid_username("Pilot_42"));
        assert!(!valid_username("ab"));
        assert!(!valid_username(" padded "));
        assert!(!valid_username("emoji🦀name"));
    }

    #[test]
    fn when_character_is_not_whitelisted_then_it_is_rejected() {
        assert!(valid_character("knight"));
        assert!(!valid_character("dragonlord"));
    }

    #[test]
    fn when_damage_is_out_of_bounds_then_it_is_rejected() {
        assert!(valid_damage(1));
        assert!(valid_damage(MAX_DAMAGE_CLAIM));
        assert!(!valid_damage(0));
        assert!(!valid_damage(-5));
        assert!(!valid_damage(MAX_DAMAGE_CLAIM + 1));
    }

    #[test]
    fn when_state_has_nan_then_sanitize_returns_none() {
        let state = PlayerState {
            x: f32::NAN,
            ..PlayerState::default()
        };
        assert!(sanitize_player_state(state).is_none());
    }

    #[test]
    fn when_state_is_plausible_then_sanitize_clamps_ranges() {
        let state = PlayerState {
            x: 10.0,
            y: -20.0,
            angle: 1.0,
            speed: 5_000.0,
            zone_level: 1,
            stunned: false,
            hp: 90,
            is_dead: false,
        };
        let cleaned = sanitize_player_state(state).expect("state should pass");
        assert_eq!(cleaned.speed, 1_000.0);
        assert_eq!(cleaned.hp, 90);
    }

    #[test]
    fn when_chat_text_has_control_chars_then_it_is_rejected() {
        assert!(valid_chat_text("gg wp"));
        assert!(!valid_chat_text(""));
        assert!(!valid_chat_text("line\nbreak"));
        assert!(!valid_chat_text(&"y".repeat(MAX_CHAT_LEN + 1)));
    }
}
