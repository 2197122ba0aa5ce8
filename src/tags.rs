//! IRCv3 tag parsing and the typed projections used by chat events.
//!
//! Twitch conveys message metadata (bits, badges, colors, emote positions,
//! message ids, subscription details) as `name=value` tags. Well-known
//! names are decoded into typed fields; everything, known or not, is also
//! kept raw in [`Tags::all`].

use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Tags attached to one message.
///
/// Numeric projections never fail: a missing or unparseable value leaves
/// the field at 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tags {
    /// Raw name → value for every tag on the message.
    pub all: HashMap<String, String>,

    /// Badges to display in front of the user's name.
    pub badges: BTreeSet<String>,

    /// Color for the user's display name, as 24-bit RRGGBB.
    pub color: u32,

    /// The user's name as it should be displayed, with capitalization.
    pub display_name: String,

    /// Emote id → `(first, last)` character ranges within the message body.
    pub emotes: BTreeMap<u64, Vec<(usize, usize)>>,

    /// Seconds past the UNIX epoch when the message was sent.
    pub timestamp: u64,

    /// Milliseconds past [`Tags::timestamp`] (0-999).
    pub time_milliseconds: u32,

    /// Id of the channel the message concerns (`room-id`).
    pub channel_id: u64,

    /// Id of the user the message concerns (`user-id` / `target-user-id`).
    pub user_id: u64,

    /// Server-assigned id of this message.
    pub id: String,
}

impl Tags {
    /// Parses a raw tag string (the part between `@` and the first space).
    pub(crate) fn parse(unparsed: &str) -> Tags {
        let mut tags = Tags::default();
        if unparsed.is_empty() {
            return tags;
        }
        for fragment in unparsed.split(';') {
            let (name, value) = split_name_value(fragment);
            tags.all.insert(name.to_string(), value.to_string());
            match name {
                "badges" => {
                    for badge in value.split(',') {
                        if !badge.is_empty() {
                            tags.badges.insert(badge.to_string());
                        }
                    }
                }
                "color" => {
                    tags.color = value
                        .strip_prefix('#')
                        .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                        .unwrap_or(0);
                }
                "display-name" => tags.display_name = value.to_string(),
                "emotes" => tags.emotes = parse_emotes(value),
                "tmi-sent-ts" => match value.parse::<u64>() {
                    Ok(milliseconds) => {
                        tags.timestamp = milliseconds / 1000;
                        tags.time_milliseconds = (milliseconds % 1000) as u32;
                    }
                    Err(_) => {
                        tags.timestamp = 0;
                        tags.time_milliseconds = 0;
                    }
                },
                "room-id" => tags.channel_id = value.parse().unwrap_or(0),
                "user-id" | "target-user-id" => {
                    tags.user_id = value.parse().unwrap_or(0);
                }
                "id" => tags.id = value.to_string(),
                _ => {}
            }
        }
        tags
    }
}

/// Splits a tag fragment at the first `=` not preceded by an odd number of
/// backslashes. A fragment without one has an empty value.
fn split_name_value(fragment: &str) -> (&str, &str) {
    let mut escape = false;
    for (index, ch) in fragment.char_indices() {
        if escape {
            escape = false;
        } else if ch == '\\' {
            escape = true;
        } else if ch == '=' {
            return (&fragment[..index], &fragment[index + 1..]);
        }
    }
    (fragment, "")
}

/// Parses the `emotes` tag value: `id:first-last,first-last/id:first-last`.
/// Entries that do not fit the shape are skipped.
fn parse_emotes(value: &str) -> BTreeMap<u64, Vec<(usize, usize)>> {
    let mut emotes = BTreeMap::new();
    for emote in value.split('/') {
        let Some((id, instances)) = emote.split_once(':') else {
            continue;
        };
        let Ok(id) = id.parse::<u64>() else {
            continue;
        };
        let ranges: &mut Vec<(usize, usize)> = emotes.entry(id).or_default();
        for instance in instances.split(',') {
            let Some((begin, end)) = instance.split_once('-') else {
                continue;
            };
            let (Ok(begin), Ok(end)) = (begin.parse(), end.parse()) else {
                continue;
            };
            ranges.push((begin, end));
        }
    }
    emotes
}

/// Replaces the tag-value escapes `\s` (space), `\n` (newline), `\:` (`;`),
/// and `\\` (`\`) used in human-readable tag values such as `system-msg`.
/// Unrecognized escapes are dropped.
pub fn unescape_tag_value(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            output.push(ch);
            continue;
        }
        match chars.next() {
            Some('s') => output.push(' '),
            Some('n') => output.push('\n'),
            Some(':') => output.push(';'),
            Some('\\') => output.push('\\'),
            _ => {}
        }
    }
    output
}
