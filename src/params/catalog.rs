//! Query catalogue: declared parameters and time-window classes of Q1–Q13

use crate::model::{NodeKind, Scale};

/// How wide a query's time window is, by scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowClass {
    /// Recent values for a live view
    Dashboard,
    /// Aggregates over a working period
    Analytics,
    /// Day-over-day trends
    Trend,
}

const HOUR: i64 = 3_600;
const DAY: i64 = 24 * HOUR;

impl WindowClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowClass::Dashboard => "dashboard",
            WindowClass::Analytics => "analytics",
            WindowClass::Trend => "trend",
        }
    }

    /// Window length in seconds before clamping to the available range
    pub fn seconds(&self, scale: Scale) -> i64 {
        match (self, scale) {
            (WindowClass::Dashboard, Scale::Small) => HOUR,
            (WindowClass::Dashboard, Scale::Medium) => 6 * HOUR,
            (WindowClass::Dashboard, Scale::Large) => DAY,
            (WindowClass::Analytics, Scale::Small) => 6 * HOUR,
            (WindowClass::Analytics, Scale::Medium) => DAY,
            (WindowClass::Analytics, Scale::Large) => 7 * DAY,
            (WindowClass::Trend, Scale::Small) => DAY,
            (WindowClass::Trend, Scale::Medium) => 7 * DAY,
            (WindowClass::Trend, Scale::Large) => 28 * DAY,
        }
    }
}

/// Placeholder name bound to an id of the given kind
pub fn id_placeholder(kind: NodeKind) -> String {
    format!("{}_ID", kind.as_str().to_ascii_uppercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuerySpec {
    pub id: &'static str,
    pub name: &'static str,
    /// Node kinds whose ids the query takes, one placeholder each
    pub ids: &'static [NodeKind],
    pub window: Option<WindowClass>,
}

impl QuerySpec {
    pub fn placeholders(&self) -> Vec<String> {
        let mut names: Vec<String> = self.ids.iter().map(|k| id_placeholder(*k)).collect();
        if self.window.is_some() {
            names.extend(TIME_PLACEHOLDERS.iter().map(|s| s.to_string()));
        }
        names
    }
}

/// Placeholders every windowed query receives
pub const TIME_PLACEHOLDERS: [&str; 4] = ["DATE_START", "DATE_END", "DAY_START", "DAY_END"];

pub const CATALOG: [QuerySpec; 13] = [
    QuerySpec {
        id: "Q1",
        name: "building_inventory",
        ids: &[NodeKind::Building],
        window: None,
    },
    QuerySpec {
        id: "Q2",
        name: "space_equipment",
        ids: &[NodeKind::Space],
        window: None,
    },
    QuerySpec {
        id: "Q3",
        name: "meter_tree",
        ids: &[NodeKind::Meter],
        window: None,
    },
    QuerySpec {
        id: "Q4",
        name: "equipment_points",
        ids: &[NodeKind::Equipment],
        window: None,
    },
    QuerySpec {
        id: "Q5",
        name: "point_last_value",
        ids: &[NodeKind::Point],
        window: Some(WindowClass::Dashboard),
    },
    QuerySpec {
        id: "Q6",
        name: "building_energy",
        ids: &[NodeKind::Building],
        window: Some(WindowClass::Analytics),
    },
    QuerySpec {
        id: "Q7",
        name: "floor_temperature",
        ids: &[NodeKind::Floor],
        window: Some(WindowClass::Analytics),
    },
    QuerySpec {
        id: "Q8",
        name: "equipment_hourly",
        ids: &[NodeKind::Equipment],
        window: Some(WindowClass::Analytics),
    },
    QuerySpec {
        id: "Q9",
        name: "meter_feed_equipment",
        ids: &[NodeKind::Building],
        window: None,
    },
    QuerySpec {
        id: "Q10",
        name: "tenant_spaces_co2",
        ids: &[NodeKind::Tenant],
        window: Some(WindowClass::Analytics),
    },
    QuerySpec {
        id: "Q11",
        name: "daily_trend",
        ids: &[NodeKind::Point],
        window: Some(WindowClass::Trend),
    },
    QuerySpec {
        id: "Q12",
        name: "zone_temperature",
        ids: &[NodeKind::Zone],
        window: Some(WindowClass::Dashboard),
    },
    QuerySpec {
        id: "Q13",
        name: "alarm_count",
        ids: &[NodeKind::Building],
        window: Some(WindowClass::Trend),
    },
];

pub fn lookup(query_id: &str) -> Option<&'static QuerySpec> {
    CATALOG.iter().find(|q| q.id == query_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let q6 = lookup("Q6").unwrap();
        assert_eq!(q6.name, "building_energy");
        assert_eq!(q6.window, Some(WindowClass::Analytics));
        assert!(lookup("Q14").is_none());
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(lookup("Q1").unwrap().placeholders(), vec!["BUILDING_ID"]);
        assert_eq!(
            lookup("Q12").unwrap().placeholders(),
            vec!["ZONE_ID", "DATE_START", "DATE_END", "DAY_START", "DAY_END"]
        );
        assert_eq!(id_placeholder(NodeKind::Equipment), "EQUIPMENT_ID");
    }

    #[test]
    fn test_windows_grow_with_scale() {
        for class in [WindowClass::Dashboard, WindowClass::Analytics, WindowClass::Trend] {
            assert!(class.seconds(Scale::Small) < class.seconds(Scale::Medium));
            assert!(class.seconds(Scale::Medium) < class.seconds(Scale::Large));
        }
        assert_eq!(WindowClass::Analytics.seconds(Scale::Medium), 86_400);
    }
}
