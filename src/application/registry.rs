// Registry of known monitors, reconciled across fetches
use crate::domain::classifier::{MonitorClassifier, VisibilityConfig};
use crate::domain::monitor::{Device, Location, Monitor, MonitorId, MonitorRecord};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared handle to a monitor. Updates happen in place, so every holder sees them.
pub type MonitorHandle = Arc<RwLock<Monitor>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    SjvairPurple,
    SjvairInactive,
    SjvairBam,
    PurpleAir,
    PurpleAirInside,
    AirNow,
}

impl Category {
    pub fn of(record: &MonitorRecord) -> Option<Category> {
        if !record.is_active {
            return Some(Category::SjvairInactive);
        }
        match record.device {
            Device::PurpleAir if record.is_sjvair => Some(Category::SjvairPurple),
            Device::PurpleAir if record.location == Location::Inside => Some(Category::PurpleAirInside),
            Device::PurpleAir => Some(Category::PurpleAir),
            Device::AirNow => Some(Category::AirNow),
            Device::BAM1022 => Some(Category::SjvairBam),
            Device::Unknown => None,
        }
    }
}

/// Lookup key. Name and county lookups return the first match in id order.
#[derive(Debug, Clone, Copy)]
pub enum MonitorQuery<'a> {
    Id(&'a str),
    Name(&'a str),
    County(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
}

pub struct MonitorRegistry {
    classifier: MonitorClassifier,
    monitors: BTreeMap<MonitorId, MonitorHandle>,
}

impl MonitorRegistry {
    pub fn new(classifier: MonitorClassifier) -> Self {
        Self {
            classifier,
            monitors: BTreeMap::new(),
        }
    }

    pub fn classifier(&self) -> &MonitorClassifier {
        &self.classifier
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.monitors.contains_key(id)
    }

    /// Merge a fetch into the registry. Known ids are updated in place; ids
    /// missing from `records` are kept.
    pub fn upsert(&mut self, records: Vec<MonitorRecord>) -> UpsertSummary {
        let mut summary = UpsertSummary::default();

        for record in records {
            match self.monitors.get(&record.id) {
                Some(handle) => {
                    handle.write().update(record, &self.classifier);
                    summary.updated += 1;
                }
                None => {
                    let id = record.id.clone();
                    let monitor = Monitor::new(record, &self.classifier);
                    self.monitors.insert(id, Arc::new(RwLock::new(monitor)));
                    summary.inserted += 1;
                }
            }
        }

        tracing::debug!(
            inserted = summary.inserted,
            updated = summary.updated,
            total = self.monitors.len(),
            "Reconciled monitors"
        );
        summary
    }

    pub fn get(&self, id: &str) -> Option<MonitorHandle> {
        self.monitors.get(id).cloned()
    }

    pub fn find(&self, query: MonitorQuery<'_>) -> Option<MonitorHandle> {
        match query {
            MonitorQuery::Id(id) => {
                let found = self.get(id);
                if found.is_none() {
                    tracing::warn!(monitor = id, "Monitor was requested but not found");
                }
                found
            }
            MonitorQuery::Name(name) => self.find_by(|m| m.data.name == name),
            MonitorQuery::County(county) => self.find_by(|m| m.data.county.as_deref() == Some(county)),
        }
    }

    fn find_by(&self, predicate: impl Fn(&Monitor) -> bool) -> Option<MonitorHandle> {
        self.monitors
            .values()
            .find(|handle| predicate(&handle.read()))
            .cloned()
    }

    /// Visit every monitor, or only those in `category`.
    pub fn for_each(&self, category: Option<Category>, mut visitor: impl FnMut(&Monitor)) {
        for handle in self.monitors.values() {
            let monitor = handle.read();
            if category.is_none() || Category::of(&monitor.data) == category {
                visitor(&*monitor);
            }
        }
    }

    pub fn category(&self, category: Category) -> Vec<MonitorHandle> {
        self.monitors
            .values()
            .filter(|handle| Category::of(&handle.read().data) == Some(category))
            .cloned()
            .collect()
    }

    pub fn visible(&self, config: &VisibilityConfig) -> Vec<MonitorHandle> {
        self.monitors
            .values()
            .filter(|handle| config.is_visible(&handle.read().data))
            .cloned()
            .collect()
    }

    /// Bounding box of every positioned monitor.
    pub fn bounds(&self) -> Option<Bounds> {
        let mut bounds: Option<Bounds> = None;
        self.for_each(None, |monitor| {
            let Some(position) = &monitor.data.position else {
                return;
            };
            let (lon, lat) = (position.lon(), position.lat());
            bounds = Some(match bounds {
                None => Bounds {
                    min_lon: lon,
                    min_lat: lat,
                    max_lon: lon,
                    max_lat: lat,
                },
                Some(b) => Bounds {
                    min_lon: b.min_lon.min(lon),
                    min_lat: b.min_lat.min(lat),
                    max_lon: b.max_lon.max(lon),
                    max_lat: b.max_lat.max(lat),
                },
            });
        });
        bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::color::Color;
    use crate::domain::monitor::fixtures::{record, with_latest};
    use crate::domain::monitor::Position;

    fn registry() -> MonitorRegistry {
        MonitorRegistry::new(MonitorClassifier::default())
    }

    #[test]
    fn test_upsert_preserves_identity() {
        let mut registry = registry();
        registry.upsert(vec![record("m1", Device::PurpleAir)]);
        let held = registry.get("m1").unwrap();
        assert_eq!(held.read().marker_params.fill_color, Color::GRAY);

        let updated = with_latest(record("m1", Device::PurpleAir), "pm25_avg_15", "300");
        let summary = registry.upsert(vec![updated]);

        assert_eq!(summary, UpsertSummary { inserted: 0, updated: 1 });
        let again = registry.get("m1").unwrap();
        assert!(Arc::ptr_eq(&held, &again));
        assert_eq!(held.read().marker_params.fill_color, Color::MAROON);
    }

    #[test]
    fn test_upsert_never_removes() {
        let mut registry = registry();
        registry.upsert(vec![record("m1", Device::AirNow), record("m2", Device::BAM1022)]);
        let summary = registry.upsert(vec![record("m3", Device::PurpleAir)]);

        assert_eq!(summary.inserted, 1);
        assert_eq!(registry.len(), 3);
        assert!(registry.contains("m1"));
    }

    #[test]
    fn test_find_by_name_and_county() {
        let mut registry = registry();
        let mut visalia = record("m2", Device::AirNow);
        visalia.name = "Visalia".to_string();
        visalia.county = Some("Tulare".to_string());
        let mut porterville = record("m3", Device::PurpleAir);
        porterville.county = Some("Tulare".to_string());
        registry.upsert(vec![porterville, record("m1", Device::PurpleAir), visalia]);

        let by_name = registry.find(MonitorQuery::Name("Visalia")).unwrap();
        assert_eq!(by_name.read().id(), "m2");
        // Two monitors share the county; the lower id wins regardless of upsert order.
        let by_county = registry.find(MonitorQuery::County("Tulare")).unwrap();
        assert_eq!(by_county.read().id(), "m2");
        assert!(registry.find(MonitorQuery::Id("missing")).is_none());
        assert!(registry.find(MonitorQuery::County("Kern")).is_none());
    }

    #[test]
    fn test_categories_follow_updates() {
        let mut registry = registry();
        let mut sjvair = record("m1", Device::PurpleAir);
        sjvair.is_sjvair = true;
        let mut inside = record("m2", Device::PurpleAir);
        inside.location = Location::Inside;
        registry.upsert(vec![sjvair.clone(), inside, record("m3", Device::AirNow)]);

        assert_eq!(registry.category(Category::SjvairPurple).len(), 1);
        assert_eq!(registry.category(Category::PurpleAirInside).len(), 1);
        assert_eq!(registry.category(Category::AirNow).len(), 1);

        sjvair.is_active = false;
        registry.upsert(vec![sjvair]);
        assert!(registry.category(Category::SjvairPurple).is_empty());
        assert_eq!(registry.category(Category::SjvairInactive).len(), 1);

        let mut visited = Vec::new();
        registry.for_each(Some(Category::AirNow), |m| visited.push(m.id().to_string()));
        assert_eq!(visited, vec!["m3"]);

        let mut all = 0;
        registry.for_each(None, |_| all += 1);
        assert_eq!(all, 3);
    }

    #[test]
    fn test_visible_and_bounds() {
        let mut registry = registry();
        let mut west = record("m1", Device::AirNow);
        west.position = Some(Position::new(-120.5, 36.0));
        let mut east = record("m2", Device::PurpleAir);
        east.position = Some(Position::new(-119.0, 37.5));
        let mut hidden = record("m3", Device::PurpleAir);
        hidden.is_active = false;
        hidden.position = None;
        registry.upsert(vec![west, east, hidden]);

        assert_eq!(registry.visible(&VisibilityConfig::default()).len(), 2);
        assert_eq!(
            registry.bounds(),
            Some(Bounds {
                min_lon: -120.5,
                min_lat: 36.0,
                max_lon: -119.0,
                max_lat: 37.5,
            })
        );
        assert_eq!(MonitorRegistry::new(MonitorClassifier::default()).bounds(), None);
    }
}
