//! Helpers for the plain-text side of console responses.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref COLOR_CODE: Regex = Regex::new(r"§.").expect("invalid color code pattern");
    static ref PLAYER_COUNT: Regex =
        Regex::new(r"(\d+)\s+(?:of a max of|out of maximum|of|/)\s+(\d+)")
            .expect("invalid player count pattern");
    static ref NUMBER: Regex = Regex::new(r"\d+").expect("invalid number pattern");
}

/// Remove `§x` formatting codes.
pub fn strip_color_codes(text: &str) -> String {
    COLOR_CODE.replace_all(text, "").into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerCount {
    pub online: u32,
    pub max: u32,
}

/// Parse the response of the `list` command.
///
/// Understands the vanilla "There are 3 of a max of 20 players online", the
/// Paper "3 out of maximum 20" and "3/20". Anything else falls back to the
/// first two numbers in the response, read as `(online, max)`.
pub fn parse_player_list(response: &str) -> Option<PlayerCount> {
    let clean = strip_color_codes(response);

    if let Some(caps) = PLAYER_COUNT.captures(&clean) {
        let online = caps[1].parse().ok()?;
        let max = caps[2].parse().ok()?;
        return Some(PlayerCount { online, max });
    }

    let numbers: Vec<u32> = NUMBER
        .find_iter(&clean)
        .filter_map(|m| m.as_str().parse().ok())
        .take(2)
        .collect();
    match numbers.as_slice() {
        [online, max] => Some(PlayerCount {
            online: *online,
            max: *max,
        }),
        _ => None,
    }
}
