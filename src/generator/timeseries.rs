//! Bridge from the structural graph to the trajectory generator

use bosbench_timeseries::{EmittedSample, PointType, TimeseriesConfig, TimeseriesGenerator};
use tracing::debug;

use crate::error::BenchResult;
use crate::model::{step_to_micros, Dataset, NodeKind, Sample};

/// The points that carry telemetry, in id order
#[derive(Debug, Clone, Default)]
pub struct PointSeries {
    pub point_ids: Vec<String>,
    pub building_ids: Vec<String>,
    pub types: Vec<PointType>,
}

impl PointSeries {
    /// Collect points in id order. The quantity label decides the type; a
    /// point without one is classified from its name and host equipment.
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let mut points: Vec<_> = dataset.nodes_of(NodeKind::Point).collect();
        points.sort_by(|a, b| a.id.cmp(&b.id));

        let mut series = PointSeries::default();
        for p in points {
            let point_type = p
                .property_str("quantity")
                .and_then(|q| q.parse::<PointType>().ok())
                .unwrap_or_else(|| PointType::classify(&p.name, p.property_str("equipment_type")));
            series.point_ids.push(p.id.clone());
            series.building_ids.push(p.building_id.clone().unwrap_or_default());
            series.types.push(point_type);
        }
        debug!(points = series.len(), "Collected telemetry points");
        series
    }

    pub fn len(&self) -> usize {
        self.point_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.point_ids.is_empty()
    }

    pub fn generator(&self, seed: u64, n_steps: usize, memory_budget_bytes: usize) -> BenchResult<TimeseriesGenerator> {
        let config = TimeseriesConfig {
            seed,
            n_steps,
            memory_budget_bytes,
        };
        Ok(TimeseriesGenerator::new(config, self.types.clone())?)
    }

    /// Attach ids, timestamps and buildings to emitted samples.
    pub fn resolve(&self, emitted: &[EmittedSample]) -> Vec<Sample> {
        emitted
            .iter()
            .map(|s| Sample {
                point_id: self.point_ids[s.point].clone(),
                time_micros: step_to_micros(s.step),
                value: s.value,
                building_id: self.building_ids[s.point].clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::generate_structure;
    use crate::model::{Duration, Profile, Scale};

    #[test]
    fn test_points_in_id_order_with_buildings() {
        let g = generate_structure(&Profile::new(Scale::Small, Duration::TwoDays).counts(), 42);
        let series = PointSeries::from_dataset(&g.dataset);
        assert_eq!(series.len(), 1000);
        assert!(series.point_ids.windows(2).all(|w| w[0] < w[1]));
        assert!(series.building_ids.iter().all(|b| b.starts_with("building-")));
        assert!(series.types.contains(&PointType::Energy));
    }

    #[test]
    fn test_resolve_maps_steps_to_time() {
        let series = PointSeries {
            point_ids: vec!["point-0000000".into()],
            building_ids: vec!["building-0000".into()],
            types: vec![PointType::Temperature],
        };
        let samples = series.resolve(&[EmittedSample { point: 0, step: 60, value: 21.0 }]);
        assert_eq!(samples[0].time_micros, step_to_micros(0) + 3_600_000_000);
        assert_eq!(samples[0].building_id, "building-0000");
    }
}
