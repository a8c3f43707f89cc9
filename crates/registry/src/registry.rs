//! `resolveChannels`/`channelIndex` — channel-name addressing (spec.md
//! §4.1). Families maintain globally-unique channel names so callers
//! can request arbitrary subsets without naming the family explicitly.

use std::collections::HashMap;
use std::sync::OnceLock;

use metricsd_core::{Error, Result};

use crate::descriptor::descriptor;
use crate::family::Family;

fn channel_table() -> &'static HashMap<&'static str, Family> {
    static TABLE: OnceLock<HashMap<&'static str, Family>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut map = HashMap::new();
        for family in Family::ALL {
            for channel in descriptor(family).channels {
                map.insert(*channel, family);
            }
        }
        map
    })
}

/// Resolves a list of requested channel names to the single family all
/// of them belong to, and each name's index within that family's
/// channel list, preserving the caller's requested order.
///
/// Errors: [`Error::NoChannels`] (empty request), [`Error::ChannelInvalid`]
/// (unknown name), [`Error::MixingTypes`] (names from different
/// families), [`Error::Nonunique`] (duplicate name in the request).
pub fn resolve_channels(names: &[String]) -> Result<(Family, Vec<usize>)> {
    if names.is_empty() {
        return Err(Error::NoChannels);
    }

    let table = channel_table();
    let family = *table
        .get(names[0].as_str())
        .ok_or_else(|| Error::ChannelInvalid(names[0].clone()))?;

    let mut seen = std::collections::HashSet::new();
    let mut indices = Vec::with_capacity(names.len());
    for name in names {
        let found = *table
            .get(name.as_str())
            .ok_or_else(|| Error::ChannelInvalid(name.clone()))?;
        if found != family {
            return Err(Error::MixingTypes);
        }
        if !seen.insert(name.as_str()) {
            return Err(Error::Nonunique);
        }
        indices.push(channel_index(family, name).expect("resolved above"));
    }
    Ok((family, indices))
}

/// Linear lookup of a channel's index within a family's channel list.
pub fn channel_index(family: Family, name: &str) -> Option<usize> {
    descriptor(family).channels.iter().position(|c| *c == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(s: &[&str]) -> Vec<String> {
        s.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(resolve_channels(&names(&[])), Err(Error::NoChannels)));
    }

    #[test]
    fn rejects_unknown_channel() {
        assert!(matches!(
            resolve_channels(&names(&["xyz"])),
            Err(Error::ChannelInvalid(_))
        ));
    }

    #[test]
    fn resolves_single_family() {
        let (family, idx) = resolve_channels(&names(&["avg"])).unwrap();
        assert_eq!(family, Family::Averager);
        assert_eq!(idx, vec![0]);
    }

    #[test]
    fn rejects_mixed_families() {
        assert!(matches!(
            resolve_channels(&names(&["avg", "counter"])),
            Err(Error::MixingTypes)
        ));
    }

    #[test]
    fn resolves_multi_channel_subset_in_order() {
        let (family, idx) = resolve_channels(&names(&["avg-cnt", "avg"])).unwrap();
        assert_eq!(family, Family::Averager);
        assert_eq!(idx, vec![1, 0]);
    }

    #[test]
    fn rejects_duplicate_channel() {
        assert!(matches!(
            resolve_channels(&names(&["avg", "avg"])),
            Err(Error::Nonunique)
        ));
    }

    #[test]
    fn channel_index_lookup() {
        assert_eq!(channel_index(Family::Counter, "counter"), Some(0));
        assert_eq!(channel_index(Family::Timer, "timer-min"), Some(0));
        assert_eq!(channel_index(Family::Counter, "timer-min"), None);
    }
}
