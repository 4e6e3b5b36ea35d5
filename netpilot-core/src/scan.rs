//! Wireless scanning and the generation-stamped scan snapshot.

use crate::profile::{NetworkProfile, ProfileStore, read_wireless_profile};
use crate::traits::WirelessInterface;
use crate::types::{AccessPoint, NetworkId};
use crate::{Error, Result};
use serde::Serialize;
use std::cmp::Ordering;

/// Removes duplicate bssids, keeping first-seen order.
///
/// When the same bssid shows up both hidden and with its name revealed, the
/// revealed record replaces the hidden one in place.
pub fn dedup_by_bssid(aps: Vec<AccessPoint>) -> Vec<AccessPoint> {
    let mut out: Vec<AccessPoint> = Vec::with_capacity(aps.len());
    for ap in aps {
        match out.iter_mut().find(|seen| seen.bssid == ap.bssid) {
            Some(seen) if seen.hidden && !ap.hidden => *seen = ap,
            Some(_) => {}
            None => out.push(ap),
        }
    }
    out
}

/// Strongest first: by quality when both sides have one, else by dBm.
fn signal_order(a: &AccessPoint, b: &AccessPoint) -> Ordering {
    match (a.quality, b.quality) {
        (Some(qa), Some(qb)) => qb.cmp(&qa),
        _ => b.strength.cmp(&a.strength),
    }
}

/// Sorts strongest first, keeping scan order for ties.
///
/// The pairwise rule is not a total order when some records lack a quality,
/// so this is a plain insertion sort rather than `sort_by`.
pub fn sort_by_signal<T>(items: &mut [T], ap: impl Fn(&T) -> &AccessPoint) {
    for i in 1..items.len() {
        let mut j = i;
        while j > 0 && signal_order(ap(&items[j]), ap(&items[j - 1])) == Ordering::Less {
            items.swap(j, j - 1);
            j -= 1;
        }
    }
}

/// Brings the interface up, optionally targets a hidden essid, and returns
/// the deduplicated scan.
pub async fn scan(
    wireless: &dyn WirelessInterface,
    hidden_essid: Option<&str>,
) -> Result<Vec<AccessPoint>> {
    wireless.up().await?;
    if let Some(essid) = hidden_essid.filter(|e| !e.is_empty()) {
        tracing::debug!(iface = wireless.name(), essid, "Scanning for hidden network");
        wireless.set_essid(essid).await?;
    }
    let aps = wireless.get_networks().await?;
    Ok(dedup_by_bssid(aps))
}

/// A scanned access point together with its saved settings, if any.
#[derive(Debug, Clone, Serialize)]
pub struct ScannedNetwork {
    pub id: NetworkId,
    pub access_point: AccessPoint,
    pub profile: Option<NetworkProfile>,
}

impl ScannedNetwork {
    /// Saved settings, or a fresh profile built from the scan record.
    pub fn profile_or_default(&self) -> NetworkProfile {
        self.profile
            .clone()
            .unwrap_or_else(|| NetworkProfile::from_access_point(&self.access_point))
    }
}

/// One completed scan, replaced wholesale by the next.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSnapshot {
    pub generation: u64,
    pub networks: Vec<ScannedNetwork>,
}

impl ScanSnapshot {
    /// Sorts the scan strongest first and attaches saved profiles.
    pub fn build(generation: u64, aps: Vec<AccessPoint>, store: &dyn ProfileStore) -> Self {
        let mut aps = aps;
        sort_by_signal(&mut aps, |ap| ap);
        let networks = aps
            .into_iter()
            .enumerate()
            .map(|(index, access_point)| ScannedNetwork {
                id: NetworkId { generation, index },
                profile: read_wireless_profile(store, &access_point),
                access_point,
            })
            .collect();
        Self {
            generation,
            networks,
        }
    }

    pub fn get(&self, id: NetworkId) -> Result<&ScannedNetwork> {
        if id.generation != self.generation {
            return Err(Error::StaleScan {
                held: id.generation,
                current: self.generation,
            });
        }
        self.networks
            .get(id.index)
            .ok_or(Error::UnknownNetwork(id.index))
    }

    /// Looks a network up by bssid first, then by essid.
    pub fn find(&self, bssid: Option<&str>, essid: Option<&str>) -> Option<&ScannedNetwork> {
        bssid
            .and_then(|b| {
                self.networks
                    .iter()
                    .find(|n| n.access_point.bssid.eq_ignore_ascii_case(b))
            })
            .or_else(|| {
                essid.and_then(|e| self.networks.iter().find(|n| n.access_point.essid == e))
            })
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{TomlProfileStore, save_wireless_profile};
    use crate::types::{Encryption, HIDDEN_ESSID};

    fn ap(essid: &str, bssid: &str, quality: Option<i32>, strength: Option<i32>) -> AccessPoint {
        AccessPoint {
            essid: essid.to_string(),
            hidden: essid == HIDDEN_ESSID,
            bssid: bssid.to_string(),
            channel: Some(1),
            mode: "Master".into(),
            encryption: Encryption::NONE,
            quality,
            strength,
            bitrates: vec![],
        }
    }

    #[test]
    fn test_dedup_revealed_beats_hidden() {
        let aps = vec![
            ap(HIDDEN_ESSID, "aa", Some(10), None),
            ap("first", "bb", Some(20), None),
            ap("revealed", "aa", Some(30), None),
            ap("second", "bb", Some(40), None),
        ];
        let out = dedup_by_bssid(aps);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].essid, "revealed");
        assert_eq!(out[1].essid, "first", "otherwise the first record wins");
    }

    #[test]
    fn test_dedup_hidden_never_replaces_revealed() {
        let out = dedup_by_bssid(vec![
            ap("named", "aa", None, None),
            ap(HIDDEN_ESSID, "aa", None, None),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].essid, "named");
    }

    #[test]
    fn test_sort_by_signal_is_stable() {
        let mut aps = vec![
            ap("a", "1", Some(40), None),
            ap("b", "2", Some(80), None),
            ap("c", "3", Some(40), None),
            ap("d", "4", Some(90), None),
        ];
        sort_by_signal(&mut aps, |a| a);
        let order: Vec<_> = aps.iter().map(|a| a.essid.as_str()).collect();
        assert_eq!(order, vec!["d", "b", "a", "c"]);
    }

    #[test]
    fn test_sort_falls_back_to_strength() {
        let mut aps = vec![
            ap("weak", "1", None, Some(-80)),
            ap("strong", "2", None, Some(-40)),
            ap("mid", "3", None, Some(-60)),
        ];
        sort_by_signal(&mut aps, |a| a);
        let order: Vec<_> = aps.iter().map(|a| a.essid.as_str()).collect();
        assert_eq!(order, vec!["strong", "mid", "weak"]);
    }

    #[test]
    fn test_snapshot_rejects_stale_ids() {
        let store = TomlProfileStore::in_memory();
        let snapshot = ScanSnapshot::build(3, vec![ap("a", "1", Some(50), None)], &store);
        assert!(snapshot.get(NetworkId { generation: 3, index: 0 }).is_ok());
        assert!(matches!(
            snapshot.get(NetworkId { generation: 2, index: 0 }),
            Err(Error::StaleScan { held: 2, current: 3 })
        ));
        assert!(matches!(
            snapshot.get(NetworkId { generation: 3, index: 7 }),
            Err(Error::UnknownNetwork(7))
        ));
    }

    #[test]
    fn test_snapshot_attaches_profiles_and_sorts() {
        let store = TomlProfileStore::in_memory();
        let saved = ap("saved", "00:aa", Some(10), None);
        let mut profile = NetworkProfile::from_access_point(&saved);
        profile.automatic = true;
        save_wireless_profile(&store, &profile).unwrap();

        let snapshot = ScanSnapshot::build(
            1,
            vec![saved.clone(), ap("other", "00:bb", Some(90), None)],
            &store,
        );
        assert_eq!(snapshot.networks[0].access_point.essid, "other");
        assert!(snapshot.networks[0].profile.is_none());
        assert_eq!(snapshot.networks[1].id, NetworkId { generation: 1, index: 1 });
        assert!(snapshot.networks[1].profile.as_ref().unwrap().automatic);

        assert_eq!(
            snapshot.find(Some("00:AA"), None).unwrap().access_point.essid,
            "saved"
        );
        assert_eq!(
            snapshot.find(Some("ff:ff"), Some("other")).unwrap().access_point.bssid,
            "00:bb"
        );
    }
}
