use std::collections::BTreeSet;

use serenity::model::id::ChannelId;

use super::platform::VoiceChannel;

/// Where a newcomer should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotChoice {
    /// An existing room with no human occupants.
    Reuse { slot: u32, channel: ChannelId },
    /// No empty room exists; create one carrying this number.
    Create { slot: u32 },
}

impl SlotChoice {
    pub fn slot(&self) -> u32 {
        match *self {
            Self::Reuse { slot, .. } | Self::Create { slot } => slot,
        }
    }
}

pub fn slot_name(prefix: &str, slot: u32) -> String {
    format!("{prefix} {slot}")
}

/// Parses the slot out of a room name, or `None` if the name is not a room name.
pub fn parse_slot(prefix: &str, name: &str) -> Option<u32> {
    let digits = name.strip_prefix(prefix)?.strip_prefix(' ')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u32>().ok().filter(|slot| *slot >= 1)
}

/// Lowest empty `<prefix> <n>` room if there is one, otherwise the lowest unused number.
pub fn choose_slot(prefix: &str, channels: &[VoiceChannel]) -> SlotChoice {
    let mut taken = BTreeSet::new();
    let mut lowest_empty: Option<(u32, ChannelId)> = None;

    for channel in channels {
        let Some(slot) = parse_slot(prefix, &channel.name) else {
            continue;
        };
        taken.insert(slot);

        if channel.is_empty() && lowest_empty.map_or(true, |(best, _)| slot < best) {
            lowest_empty = Some((slot, channel.id));
        }
    }

    if let Some((slot, channel)) = lowest_empty {
        return SlotChoice::Reuse { slot, channel };
    }

    SlotChoice::Create {
        slot: first_gap(&taken),
    }
}

fn first_gap(taken: &BTreeSet<u32>) -> u32 {
    let mut candidate = 1;
    for &slot in taken {
        if slot != candidate {
            break;
        }
        candidate += 1;
    }
    candidate
}
