use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use actix::prelude::*;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::chain::{Chain, LocateNode};
use crate::types::{NodeId, NodeLocation};

/// How long a resolved (or negative) cache entry stays valid.
const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// How much past its TTL an entry may linger before an opportunistic sweep
/// (triggered on cache writes) reclaims it.
const SWEEP_GRACE: Duration = Duration::from_secs(60 * 60);

struct CacheEntry {
    location: Option<Arc<NodeLocation>>,
    inserted_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) > CACHE_TTL
    }

    fn is_sweepable(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) > CACHE_TTL + SWEEP_GRACE
    }
}

type Cache = Arc<RwLock<FxHashMap<Ipv4Addr, CacheEntry>>>;

#[derive(Clone)]
pub struct Locator {
    client: reqwest::blocking::Client,
    cache: Cache,
}

pub struct LocatorFactory {
    cache: Cache,
}

impl LocatorFactory {
    pub fn new() -> Self {
        let mut cache = FxHashMap::default();

        // Default entry for localhost, so that local development doesn't
        // spend an HTTP round trip resolving 127.0.0.1 every time.
        cache.insert(
            Ipv4Addr::new(127, 0, 0, 1),
            CacheEntry {
                location: Some(Arc::new(NodeLocation {
                    latitude: 52.516_6667,
                    longitude: 13.4,
                    city: "Berlin".into(),
                })),
                inserted_at: Instant::now(),
            },
        );

        LocatorFactory {
            cache: Arc::new(RwLock::new(cache)),
        }
    }

    pub fn create(&self) -> Locator {
        Locator {
            client: reqwest::blocking::Client::new(),
            cache: self.cache.clone(),
        }
    }
}

impl Actor for Locator {
    type Context = SyncContext<Self>;
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct LocateRequest {
    pub ip: Ipv4Addr,
    pub nid: NodeId,
    pub chain: Addr<Chain>,
}

#[derive(Deserialize)]
pub struct IPApiLocate {
    city: Box<str>,
    loc: Box<str>,
}

impl IPApiLocate {
    fn into_node_location(self) -> Option<NodeLocation> {
        let IPApiLocate { city, loc } = self;

        let mut loc = loc.split(',').map(|n| n.parse());

        let latitude = loc.next()?.ok()?;
        let longitude = loc.next()?.ok()?;

        // Guarantee that the iterator has been exhausted
        if loc.next().is_some() {
            return None;
        }

        Some(NodeLocation {
            latitude,
            longitude,
            city,
        })
    }
}

impl Handler<LocateRequest> for Locator {
    type Result = ();

    fn handle(&mut self, msg: LocateRequest, _: &mut Self::Context) {
        let LocateRequest { ip, nid, chain } = msg;
        let now = Instant::now();

        if let Some(entry) = self.cache.read().get(&ip) {
            if !entry.is_expired(now) {
                if let Some(location) = &entry.location {
                    chain.do_send(LocateNode {
                        nid,
                        location: location.clone(),
                    });
                }

                return;
            }
        }

        let location = match self.iplocate(ip) {
            Ok(location) => location,
            Err(err) => {
                log::debug!("GET error for ip location: {:?}", err);
                // A transient lookup error is cached as a negative result
                // too, so a flaky upstream can't be hammered every request.
                None
            }
        };

        self.insert(ip, location.clone());

        if let Some(location) = location {
            chain.do_send(LocateNode { nid, location });
        }
    }
}

impl Locator {
    fn insert(&self, ip: Ipv4Addr, location: Option<Arc<NodeLocation>>) {
        let now = Instant::now();
        let mut cache = self.cache.write();

        cache.insert(
            ip,
            CacheEntry {
                location,
                inserted_at: now,
            },
        );

        // Opportunistic sweep: a dedicated timer isn't worth it for a cache
        // this small, so every write takes the chance to drop anything well
        // past its TTL.
        cache.retain(|_, entry| !entry.is_sweepable(now));
    }

    fn iplocate(&self, ip: Ipv4Addr) -> Result<Option<Arc<NodeLocation>>, reqwest::Error> {
        let location = self.iplocate_ipapi_co(ip)?;

        match location {
            Some(location) => Ok(Some(location)),
            None => self.iplocate_ipinfo_io(ip),
        }
    }

    fn iplocate_ipapi_co(&self, ip: Ipv4Addr) -> Result<Option<Arc<NodeLocation>>, reqwest::Error> {
        let location = self
            .query(&format!("https://ipapi.co/{}/json", ip))?
            .map(Arc::new);

        Ok(location)
    }

    fn iplocate_ipinfo_io(
        &self,
        ip: Ipv4Addr,
    ) -> Result<Option<Arc<NodeLocation>>, reqwest::Error> {
        let location = self
            .query(&format!("https://ipinfo.io/{}/json", ip))?
            .and_then(|loc: IPApiLocate| loc.into_node_location().map(Arc::new));

        Ok(location)
    }

    fn query<T>(&self, url: &str) -> Result<Option<T>, reqwest::Error>
    where
        for<'de> T: Deserialize<'de>,
    {
        match self.client.get(url).send()?.json::<T>() {
            Ok(result) => Ok(Some(result)),
            Err(err) => {
                log::debug!("JSON error for ip location: {:?}", err);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipapi_locate_to_node_location() {
        let ipapi = IPApiLocate {
            loc: "12.5,56.25".into(),
            city: "Foobar".into(),
        };

        let location = ipapi.into_node_location().unwrap();

        assert_eq!(location.latitude, 12.5);
        assert_eq!(location.longitude, 56.25);
        assert_eq!(&*location.city, "Foobar");
    }

    #[test]
    fn ipapi_locate_to_node_location_too_many() {
        let ipapi = IPApiLocate {
            loc: "12.5,56.25,1.0".into(),
            city: "Foobar".into(),
        };

        let location = ipapi.into_node_location();

        assert!(location.is_none());
    }

    #[test]
    fn cache_entry_expires_after_ttl() {
        let entry = CacheEntry {
            location: None,
            inserted_at: Instant::now() - CACHE_TTL - Duration::from_secs(1),
        };

        assert!(entry.is_expired(Instant::now()));
    }
}
