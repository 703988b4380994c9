//! Structural graph generator
//!
//! Builds the site → building → floor → space → equipment → point spine, the
//! HVAC zones, the metering tree and the tenants from a [`ProfileCounts`] and
//! a seed. Single-threaded; one `ChaCha8Rng` drives every choice, so the
//! output is a pure function of `(counts, seed)`.

pub mod allocation;
pub mod equipment;
pub mod timeseries;

use rand::seq::SliceRandom;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::{info, warn};

use bosbench_timeseries::{derive_seed, PointType};

use crate::model::{Dataset, Edge, Node, NodeKind, ProfileCounts, Relation};
use allocation::allocate;
use equipment::{EquipmentType, MAX_POINTS_PER_EQUIPMENT};

pub use timeseries::PointSeries;

/// Probability that a command-class point also controls its host equipment
pub const CONTROLS_PROBABILITY: f64 = 0.3;

/// Probability that a fan is modelled as part of an AHU in its building
pub const FAN_PART_PROBABILITY: f64 = 0.5;

/// Children per meter when growing the metering tree
pub const METER_FANOUT: (usize, usize) = (2, 4);

/// Equipment fed by each leaf meter
pub const LEAF_METER_LOADS: (usize, usize) = (1, 3);

/// Spaces occupied by each tenant
pub const SPACES_PER_TENANT: usize = 3;

/// Spaces per HVAC zone before another zone is added to a floor
pub const SPACES_PER_ZONE: usize = 8;

const SPACE_TYPES: [(&str, f64); 8] = [
    ("office", 5.0),
    ("meeting_room", 2.0),
    ("corridor", 1.5),
    ("lobby", 0.5),
    ("plant_room", 0.5),
    ("restroom", 1.0),
    ("kitchen", 0.5),
    ("storage", 1.0),
];

const BUILDING_TYPES: [&str; 4] = ["office", "mixed_use", "laboratory", "retail"];

const TENANT_INDUSTRIES: [&str; 6] = ["finance", "legal", "technology", "healthcare", "retail", "education"];

/// Counts and warnings produced alongside the graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub warnings: Vec<String>,
    pub node_counts: BTreeMap<String, usize>,
    pub edge_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct GeneratedGraph {
    pub dataset: Dataset,
    pub report: GenerationReport,
}

struct SpaceRef {
    id: String,
    building: usize,
    floor_id: String,
}

struct EquipmentRef {
    id: String,
    building: usize,
    space: usize,
    kind: EquipmentType,
}

pub struct StructuralGenerator {
    counts: ProfileCounts,
    rng: ChaCha8Rng,
    dataset: Dataset,
    warnings: Vec<String>,
    ordinals: BTreeMap<NodeKind, usize>,
}

impl StructuralGenerator {
    pub fn new(counts: ProfileCounts, seed: u64) -> Self {
        Self {
            counts,
            rng: ChaCha8Rng::seed_from_u64(derive_seed(seed, "structure", 0)),
            dataset: Dataset::default(),
            warnings: Vec::new(),
            ordinals: BTreeMap::new(),
        }
    }

    pub fn generate(mut self) -> GeneratedGraph {
        let site = self.add_node(NodeKind::Site, "Campus".to_string(), None, Vec::new());
        let buildings = self.generate_buildings(&site);
        let floors = self.generate_floors(&buildings);
        let spaces = self.generate_spaces(&buildings, &floors);
        let equipment = self.generate_equipment(&buildings, &spaces);
        self.generate_points(&buildings, &spaces, &equipment);
        self.generate_meters(&buildings, &equipment);
        self.generate_tenants(&buildings, &spaces);

        self.dataset.sort();
        let report = GenerationReport {
            warnings: self.warnings,
            node_counts: self.dataset.node_counts(),
            edge_counts: self.dataset.edge_counts(),
        };
        info!(
            nodes = self.dataset.nodes.len(),
            edges = self.dataset.edges.len(),
            warnings = report.warnings.len(),
            "Generated structural graph"
        );
        GeneratedGraph {
            dataset: self.dataset,
            report,
        }
    }

    fn next_id(&mut self, kind: NodeKind) -> String {
        let ordinal = self.ordinals.entry(kind).or_insert(0);
        let id = kind.make_id(*ordinal);
        *ordinal += 1;
        id
    }

    fn add_node(
        &mut self,
        kind: NodeKind,
        name: String,
        building_id: Option<&str>,
        properties: Vec<(&str, crate::model::PropertyValue)>,
    ) -> String {
        let id = self.next_id(kind);
        let mut node = Node::new(id.clone(), kind, name);
        node.building_id = building_id.map(str::to_string);
        for (k, v) in properties {
            node.set_property(k, v);
        }
        self.dataset.nodes.push(node);
        id
    }

    fn add_edge(&mut self, source: &str, target: &str, relation: Relation) {
        self.dataset.edges.push(Edge::new(source, target, relation));
    }

    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }

    fn generate_buildings(&mut self, site: &str) -> Vec<String> {
        let mut ids = Vec::with_capacity(self.counts.buildings);
        for i in 0..self.counts.buildings {
            let id = self.next_id(NodeKind::Building);
            let building_type = BUILDING_TYPES[self.rng.gen_range(0..BUILDING_TYPES.len())];
            let year: i64 = self.rng.gen_range(1965..=2022);
            let area: f64 = (self.rng.gen_range(4_000.0..60_000.0_f64) * 10.0).round() / 10.0;
            let node = Node::new(id.clone(), NodeKind::Building, format!("Building {}", i + 1))
                .with_building(id.clone())
                .with_property("building_type", building_type)
                .with_property("year_built", year)
                .with_property("gross_area_m2", area);
            self.dataset.nodes.push(node);
            self.add_edge(site, &id, Relation::Contains);
            ids.push(id);
        }
        ids
    }

    /// Floors as `(floor_id, building index, level)`
    fn generate_floors(&mut self, buildings: &[String]) -> Vec<(String, usize, usize)> {
        if buildings.is_empty() && self.counts.floors > 0 {
            self.warn(format!("{} floors requested but no buildings exist", self.counts.floors));
            return Vec::new();
        }
        let per_building = allocate(&mut self.rng, self.counts.floors, buildings.len(), None);
        let mut floors = Vec::new();
        for (b, &n) in per_building.iter().enumerate() {
            for level in 0..n {
                let id = self.add_node(
                    NodeKind::Floor,
                    format!("Level {}", level),
                    Some(buildings[b].as_str()),
                    vec![("level", level.into())],
                );
                self.add_edge(&buildings[b], &id, Relation::Contains);
                floors.push((id, b, level));
            }
        }
        floors
    }

    fn generate_spaces(&mut self, buildings: &[String], floors: &[(String, usize, usize)]) -> Vec<SpaceRef> {
        if floors.is_empty() && self.counts.spaces > 0 {
            self.warn(format!("{} spaces requested but no floors exist", self.counts.spaces));
            return Vec::new();
        }
        let per_floor = allocate(&mut self.rng, self.counts.spaces, floors.len(), None);
        let type_weights: Vec<f64> = SPACE_TYPES.iter().map(|(_, w)| *w).collect();
        let mut spaces = Vec::new();

        for ((floor_id, b, level), &n) in floors.iter().zip(&per_floor) {
            let building_id = &buildings[*b];
            let n_zones = 1 + n / SPACES_PER_ZONE;
            let mut zones = Vec::with_capacity(n_zones);
            for z in 0..n_zones {
                let id = self.add_node(
                    NodeKind::Zone,
                    format!("Zone {}-{}", level, z + 1),
                    Some(building_id.as_str()),
                    vec![("floor_id", floor_id.as_str().into())],
                );
                zones.push(id);
            }

            for j in 0..n {
                let space_type = SPACE_TYPES[weighted_index(&mut self.rng, &type_weights)].0;
                let area: f64 = (self.rng.gen_range(8.0..250.0_f64) * 10.0).round() / 10.0;
                let zone_id = &zones[j * n_zones / n.max(1)];
                let id = self.add_node(
                    NodeKind::Space,
                    format!("{} {}.{:02}", title_case(space_type), level, j + 1),
                    Some(building_id.as_str()),
                    vec![
                        ("space_type", space_type.into()),
                        ("area_m2", area.into()),
                        ("floor_id", floor_id.as_str().into()),
                        ("zone_id", zone_id.as_str().into()),
                    ],
                );
                self.add_edge(floor_id, &id, Relation::Contains);
                spaces.push(SpaceRef {
                    id,
                    building: *b,
                    floor_id: floor_id.clone(),
                });
            }
        }
        spaces
    }

    fn generate_equipment(&mut self, buildings: &[String], spaces: &[SpaceRef]) -> Vec<EquipmentRef> {
        if spaces.is_empty() && self.counts.equipment > 0 {
            self.warn(format!("{} equipment requested but no spaces exist", self.counts.equipment));
            return Vec::new();
        }
        let per_space = allocate(&mut self.rng, self.counts.equipment, spaces.len(), None);
        let type_weights: Vec<f64> = EquipmentType::ALL.iter().map(|t| t.weight()).collect();
        let mut equipment = Vec::new();

        for (s, &n) in per_space.iter().enumerate() {
            let space = &spaces[s];
            for _ in 0..n {
                let kind = EquipmentType::ALL[weighted_index(&mut self.rng, &type_weights)];
                let ordinal = equipment.len() + 1;
                let id = self.add_node(
                    NodeKind::Equipment,
                    format!("{} {}", kind.as_str(), ordinal),
                    Some(buildings[space.building].as_str()),
                    vec![
                        ("equipment_type", kind.as_str().into()),
                        ("domain", kind.domain().into()),
                        ("space_id", space.id.as_str().into()),
                        ("floor_id", space.floor_id.as_str().into()),
                    ],
                );
                self.add_edge(&id, &space.id, Relation::LocatedIn);
                self.add_edge(&id, &space.id, Relation::Serves);
                equipment.push(EquipmentRef {
                    id,
                    building: space.building,
                    space: s,
                    kind,
                });
            }
        }

        // Fans hang off an AHU of the same building
        let mut ahus_by_building: Vec<Vec<usize>> = vec![Vec::new(); buildings.len()];
        for (i, e) in equipment.iter().enumerate() {
            if e.kind == EquipmentType::Ahu {
                ahus_by_building[e.building].push(i);
            }
        }
        for i in 0..equipment.len() {
            if equipment[i].kind != EquipmentType::Fan {
                continue;
            }
            let ahus = &ahus_by_building[equipment[i].building];
            if ahus.is_empty() || !self.rng.gen_bool(FAN_PART_PROBABILITY) {
                continue;
            }
            let ahu = ahus[self.rng.gen_range(0..ahus.len())];
            let (parent, child) = (equipment[ahu].id.clone(), equipment[i].id.clone());
            self.add_edge(&parent, &child, Relation::HasPart);
        }
        equipment
    }

    fn generate_points(&mut self, buildings: &[String], spaces: &[SpaceRef], equipment: &[EquipmentRef]) {
        let cap = equipment.len() * MAX_POINTS_PER_EQUIPMENT;
        if self.counts.points > cap {
            self.warn(format!(
                "{} points requested but {} equipment carry at most {}; capped",
                self.counts.points,
                equipment.len(),
                cap
            ));
        }
        let per_equipment = allocate(
            &mut self.rng,
            self.counts.points,
            equipment.len(),
            Some(MAX_POINTS_PER_EQUIPMENT),
        );

        for (e, &n) in equipment.iter().zip(&per_equipment) {
            let building_id = &buildings[e.building];
            let space = &spaces[e.space];
            for (name, class) in e.kind.point_template().iter().take(n) {
                let quantity = PointType::classify(name, Some(e.kind.as_str()));
                let id = self.add_node(
                    NodeKind::Point,
                    name.to_string(),
                    Some(building_id.as_str()),
                    vec![
                        ("quantity", quantity.as_str().into()),
                        ("unit", quantity.unit().into()),
                        ("point_class", class.as_str().into()),
                        ("equipment_id", e.id.as_str().into()),
                        ("equipment_type", e.kind.as_str().into()),
                        ("space_id", space.id.as_str().into()),
                        ("floor_id", space.floor_id.as_str().into()),
                    ],
                );
                self.add_edge(&e.id, &id, Relation::HasPoint);
                if class.is_command_class() && self.rng.gen_bool(CONTROLS_PROBABILITY) {
                    self.add_edge(&id, &e.id, Relation::Controls);
                }
            }
        }
    }

    fn generate_meters(&mut self, buildings: &[String], equipment: &[EquipmentRef]) {
        if buildings.is_empty() && self.counts.meters > 0 {
            self.warn(format!("{} meters requested but no buildings exist", self.counts.meters));
            return;
        }
        let per_building = allocate(&mut self.rng, self.counts.meters, buildings.len(), None);

        for (b, &n) in per_building.iter().enumerate() {
            if n == 0 {
                continue;
            }
            let building_id = &buildings[b];
            let loads: Vec<&EquipmentRef> = equipment.iter().filter(|e| e.building == b).collect();

            let root = self.add_node(
                NodeKind::Meter,
                format!("Main Meter {}", b + 1),
                Some(building_id.as_str()),
                vec![
                    ("meter_type", "main".into()),
                    ("utility", "electricity".into()),
                    ("level", 0i64.into()),
                ],
            );
            let mut created = 1;
            let mut has_children: Vec<(String, bool)> = vec![(root.clone(), false)];
            let mut queue: VecDeque<(usize, i64)> = VecDeque::from([(0, 0)]);

            // Breadth-first growth with bounded fan-out
            while created < n {
                let Some((parent, depth)) = queue.pop_front() else {
                    break;
                };
                let fanout = self.rng.gen_range(METER_FANOUT.0..=METER_FANOUT.1).min(n - created);
                for _ in 0..fanout {
                    let child = self.add_node(
                        NodeKind::Meter,
                        format!("Submeter {}.{}", b + 1, created),
                        Some(building_id.as_str()),
                        vec![
                            ("meter_type", "sub".into()),
                            ("utility", "electricity".into()),
                            ("level", (depth + 1).into()),
                        ],
                    );
                    let parent_id = has_children[parent].0.clone();
                    self.add_edge(&parent_id, &child, Relation::Feeds);
                    has_children[parent].1 = true;
                    has_children.push((child, false));
                    queue.push_back((has_children.len() - 1, depth + 1));
                    created += 1;
                }
            }

            if loads.is_empty() {
                continue;
            }
            let leaves: Vec<String> = has_children
                .into_iter()
                .filter(|(_, fed)| !fed)
                .map(|(id, _)| id)
                .collect();
            for leaf in leaves {
                let k = self
                    .rng
                    .gen_range(LEAF_METER_LOADS.0..=LEAF_METER_LOADS.1)
                    .min(loads.len());
                for target in sample_distinct(&mut self.rng, loads.len(), k) {
                    self.add_edge(&leaf, &loads[target].id, Relation::Feeds);
                }
            }
        }
    }

    fn generate_tenants(&mut self, buildings: &[String], spaces: &[SpaceRef]) {
        if self.counts.tenants == 0 {
            return;
        }
        let mut spaces_by_building: Vec<Vec<usize>> = vec![Vec::new(); buildings.len()];
        for (i, s) in spaces.iter().enumerate() {
            spaces_by_building[s.building].push(i);
        }
        let hosts: Vec<usize> = (0..buildings.len())
            .filter(|&b| !spaces_by_building[b].is_empty())
            .collect();
        if hosts.is_empty() {
            self.warn(format!("{} tenants requested but no spaces exist", self.counts.tenants));
            return;
        }

        for t in 0..self.counts.tenants {
            let b = hosts[self.rng.gen_range(0..hosts.len())];
            let candidates = &spaces_by_building[b];
            let k = SPACES_PER_TENANT.min(candidates.len());
            let industry = *TENANT_INDUSTRIES.choose(&mut self.rng).unwrap_or(&TENANT_INDUSTRIES[0]);
            let id = self.add_node(
                NodeKind::Tenant,
                format!("Tenant {}", t + 1),
                Some(buildings[b].as_str()),
                vec![("industry", industry.into())],
            );
            for c in sample_distinct(&mut self.rng, candidates.len(), k) {
                let space_id = spaces[candidates[c]].id.clone();
                self.add_edge(&id, &space_id, Relation::Occupies);
            }
        }
    }
}

/// Generate the structural graph for `counts` and `seed`.
pub fn generate_structure(counts: &ProfileCounts, seed: u64) -> GeneratedGraph {
    StructuralGenerator::new(*counts, seed).generate()
}

fn weighted_index<R: Rng>(rng: &mut R, weights: &[f64]) -> usize {
    let total: f64 = weights.iter().sum();
    let mut x = rng.gen_range(0.0..total);
    for (i, w) in weights.iter().enumerate() {
        if x < *w {
            return i;
        }
        x -= w;
    }
    weights.len() - 1
}

/// `k` distinct indices below `n` in draw order; duplicates are rejected and redrawn.
fn sample_distinct<R: Rng>(rng: &mut R, n: usize, k: usize) -> Vec<usize> {
    let k = k.min(n);
    let mut out = Vec::with_capacity(k);
    while out.len() < k {
        let i = rng.gen_range(0..n);
        if !out.contains(&i) {
            out.push(i);
        }
    }
    out
}

fn title_case(s: &str) -> String {
    s.split('_')
        .map(|w| {
            let mut c = w.chars();
            match c.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + c.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Duration, Profile, Scale};
    use std::collections::{HashMap, HashSet};

    fn small() -> GeneratedGraph {
        generate_structure(&Profile::new(Scale::Small, Duration::TwoDays).counts(), 42)
    }

    #[test]
    fn test_counts_match_profile() {
        let g = small();
        let c = &g.report.node_counts;
        assert_eq!(c.get("Site"), Some(&1));
        assert_eq!(c.get("Building"), Some(&2));
        assert_eq!(c.get("Floor"), Some(&10));
        assert_eq!(c.get("Space"), Some(&100));
        assert_eq!(c.get("Equipment"), Some(&200));
        assert_eq!(c.get("Point"), Some(&1000));
        assert_eq!(c.get("Meter"), Some(&20));
        assert_eq!(c.get("Tenant"), Some(&10));
        assert!(g.report.warnings.is_empty());
    }

    #[test]
    fn test_same_seed_same_graph() {
        let a = small();
        let b = small();
        assert_eq!(a.dataset, b.dataset);
        let c = generate_structure(&Profile::new(Scale::Small, Duration::TwoDays).counts(), 43);
        assert_ne!(a.dataset, c.dataset);
    }

    #[test]
    fn test_every_edge_respects_schema() {
        let g = small();
        let kinds: HashMap<&str, NodeKind> = g.dataset.nodes.iter().map(|n| (n.id.as_str(), n.kind)).collect();
        for e in &g.dataset.edges {
            let s = kinds[e.source_id.as_str()];
            let t = kinds[e.target_id.as_str()];
            assert!(e.relation.allows(s, t), "{:?} {} {:?}", s, e.relation, t);
            assert_ne!(e.source_id, e.target_id);
        }
    }

    #[test]
    fn test_building_id_propagates_through_containment() {
        let g = small();
        let by_id: HashMap<&str, &Node> = g.dataset.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        for e in g.dataset.edges.iter().filter(|e| e.relation == Relation::Contains) {
            let target = by_id[e.target_id.as_str()];
            match target.kind {
                NodeKind::Building => assert_eq!(target.building_id.as_deref(), Some(target.id.as_str())),
                _ => assert_eq!(target.building_id, by_id[e.source_id.as_str()].building_id),
            }
        }
        for e in g.dataset.edges.iter().filter(|e| e.relation == Relation::HasPoint) {
            assert_eq!(
                by_id[e.source_id.as_str()].building_id,
                by_id[e.target_id.as_str()].building_id
            );
        }
    }

    #[test]
    fn test_every_point_has_host_and_quantity() {
        let g = small();
        let hosted: HashSet<&str> = g
            .dataset
            .edges
            .iter()
            .filter(|e| e.relation == Relation::HasPoint)
            .map(|e| e.target_id.as_str())
            .collect();
        for p in g.dataset.nodes_of(NodeKind::Point) {
            assert!(hosted.contains(p.id.as_str()), "{}", p.id);
            assert!(p.property_str("quantity").is_some());
        }
    }

    #[test]
    fn test_meter_tree_is_a_forest_fed_from_roots() {
        let g = small();
        let mut parents: HashMap<&str, usize> = HashMap::new();
        for e in g.dataset.edges.iter().filter(|e| e.relation == Relation::Feeds) {
            if e.target_id.starts_with("meter-") {
                *parents.entry(e.target_id.as_str()).or_insert(0) += 1;
            }
        }
        let mut roots = 0;
        for m in g.dataset.nodes_of(NodeKind::Meter) {
            match m.property_str("meter_type") {
                Some("main") => {
                    roots += 1;
                    assert!(!parents.contains_key(m.id.as_str()));
                }
                _ => assert_eq!(parents.get(m.id.as_str()), Some(&1)),
            }
        }
        assert_eq!(roots, 2);
        assert!(g.dataset.edges.iter().any(|e| e.relation == Relation::Feeds && e.target_id.starts_with("equip-")));
    }

    #[test]
    fn test_tenants_occupy_three_spaces_of_their_building() {
        let g = small();
        let by_id: HashMap<&str, &Node> = g.dataset.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        for t in g.dataset.nodes_of(NodeKind::Tenant) {
            let occupied: Vec<&Edge> = g
                .dataset
                .edges
                .iter()
                .filter(|e| e.relation == Relation::Occupies && e.source_id == t.id)
                .collect();
            assert_eq!(occupied.len(), 3);
            for e in occupied {
                assert_eq!(by_id[e.target_id.as_str()].building_id, t.building_id);
            }
        }
    }

    #[test]
    fn test_spaces_reference_zones_on_their_floor() {
        let g = small();
        let by_id: HashMap<&str, &Node> = g.dataset.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        for s in g.dataset.nodes_of(NodeKind::Space) {
            let zone = by_id[s.property_str("zone_id").unwrap()];
            assert_eq!(zone.kind, NodeKind::Zone);
            assert_eq!(zone.property_str("floor_id"), s.property_str("floor_id"));
        }
    }

    #[test]
    fn test_point_cap_is_a_warning() {
        let counts = ProfileCounts {
            buildings: 1,
            floors: 1,
            spaces: 2,
            equipment: 3,
            points: 100,
            meters: 1,
            tenants: 1,
            duration_days: 0,
        };
        let g = generate_structure(&counts, 1);
        assert_eq!(g.report.node_counts.get("Point"), Some(&30));
        assert_eq!(g.report.warnings.len(), 1);
    }

    #[test]
    fn test_empty_and_single_point_profiles() {
        let zero = ProfileCounts {
            buildings: 0,
            floors: 0,
            spaces: 0,
            equipment: 0,
            points: 0,
            meters: 0,
            tenants: 0,
            duration_days: 0,
        };
        let g = generate_structure(&zero, 42);
        assert_eq!(g.dataset.nodes.len(), 1);
        assert!(g.dataset.edges.is_empty());

        let single = ProfileCounts {
            buildings: 1,
            floors: 1,
            spaces: 1,
            equipment: 1,
            points: 1,
            ..zero
        };
        let g = generate_structure(&single, 42);
        assert_eq!(g.report.node_counts.get("Point"), Some(&1));
    }
}
