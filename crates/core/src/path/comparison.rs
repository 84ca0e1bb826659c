//! Pairing of predicted and simulated path costs.

use std::collections::HashMap;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::warn;

use crate::events::EventChannel;

use super::model::{CostMetrics, Path};

/// Marker meaning "not simulated yet" in the simulation-cost scalars.
pub const NOT_SIMULATED: f64 = -1.0;

/// Change notifications emitted by the comparison model.
#[derive(Debug, Clone, PartialEq)]
pub enum PathModelEvent {
    /// Paths were inserted, listed in their insertion order.
    PathsAdded(Vec<i64>),
    /// Prediction costs of one path changed.
    PredictionUpdated(i64),
    /// Simulation costs of one path changed.
    SimulationUpdated(i64),
    /// All entries were dropped.
    Cleared,
}

/// A path paired with its simulated aggregates.
///
/// Move-only: the record exclusively owns its [`Path`]. Simulation scalars
/// use [`NOT_SIMULATED`] until a simulation reconciles them.
#[derive(Debug)]
pub struct PathData {
    path: Path,
    total_simulation_path_cost: f64,
    total_simulation_edge_costs: f64,
    total_simulation_terminal_costs: f64,
    is_visible: bool,
}

impl PathData {
    fn new(path: Path) -> Self {
        Self {
            path,
            total_simulation_path_cost: NOT_SIMULATED,
            total_simulation_edge_costs: NOT_SIMULATED,
            total_simulation_terminal_costs: NOT_SIMULATED,
            is_visible: true,
        }
    }

    /// The owned path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Simulated total path cost, or [`NOT_SIMULATED`].
    pub fn total_simulation_path_cost(&self) -> f64 {
        self.total_simulation_path_cost
    }

    /// Simulated edge-cost sum, or [`NOT_SIMULATED`].
    pub fn total_simulation_edge_costs(&self) -> f64 {
        self.total_simulation_edge_costs
    }

    /// Simulated terminal-cost sum, or [`NOT_SIMULATED`].
    pub fn total_simulation_terminal_costs(&self) -> f64 {
        self.total_simulation_terminal_costs
    }

    /// Whether a simulation has reported a total for this path.
    pub fn is_simulated(&self) -> bool {
        self.total_simulation_path_cost >= 0.0
    }

    /// Visibility flag stored for the GUI (checked-state is a GUI selection
    /// set, not part of the model).
    pub fn is_visible(&self) -> bool {
        self.is_visible
    }
}

/// Holds every [`PathData`] of the session, keyed by path id, iterated in
/// insertion order (ascending predicted total cost for one `add_paths`
/// batch).
#[derive(Debug, Default)]
pub struct PathComparisonModel {
    order: Vec<i64>,
    entries: HashMap<i64, PathData>,
    events: EventChannel<PathModelEvent>,
}

impl PathComparisonModel {
    /// Empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&mut self) -> UnboundedReceiver<PathModelEvent> {
        self.events.subscribe()
    }

    /// Insert paths sorted ascending by predicted total cost. A duplicate
    /// path id replaces the existing entry (keeping its position).
    pub fn add_paths(&mut self, mut paths: Vec<Path>) {
        if paths.is_empty() {
            return;
        }
        paths.sort_by(|left, right| {
            left.total_path_cost()
                .total_cmp(&right.total_path_cost())
        });

        let mut inserted = Vec::with_capacity(paths.len());
        for path in paths {
            let id = path.path_id();
            if self.entries.insert(id, PathData::new(path)).is_none() {
                self.order.push(id);
            }
            inserted.push(id);
        }
        self.events.emit(PathModelEvent::PathsAdded(inserted));
    }

    /// Update prediction aggregates; any argument `< 0` leaves the matching
    /// field unchanged. Unknown ids are a logged no-op.
    pub fn update_prediction_costs(&mut self, path_id: i64, total: f64, edge: f64, terminal: f64) {
        let Some(data) = self.entries.get_mut(&path_id) else {
            warn!("prediction update for unknown path {path_id}");
            return;
        };
        data.path.set_prediction_costs(total, edge, terminal);
        self.events.emit(PathModelEvent::PredictionUpdated(path_id));
    }

    /// Update simulation aggregates; any argument `< 0` leaves the matching
    /// field unchanged. Unknown ids are a logged no-op.
    pub fn update_simulation_costs(&mut self, path_id: i64, total: f64, edge: f64, terminal: f64) {
        let Some(data) = self.entries.get_mut(&path_id) else {
            warn!("simulation update for unknown path {path_id}");
            return;
        };
        if total >= 0.0 {
            data.total_simulation_path_cost = total;
        }
        if edge >= 0.0 {
            data.total_simulation_edge_costs = edge;
        }
        if terminal >= 0.0 {
            data.total_simulation_terminal_costs = terminal;
        }
        self.events.emit(PathModelEvent::SimulationUpdated(path_id));
    }

    /// Record one simulated segment and refresh the path's simulated
    /// aggregates: edge sum over reconciled segments, terminal sum
    /// maintained separately, total = edge + terminal. Returns `false` for
    /// unknown ids or segment indices (logged no-op).
    pub fn record_segment_result(
        &mut self,
        path_id: i64,
        segment_index: usize,
        metrics: CostMetrics,
        terminal_cost: Option<f64>,
    ) -> bool {
        let Some(data) = self.entries.get_mut(&path_id) else {
            warn!("segment result for unknown path {path_id}");
            return false;
        };
        let Some(segment) = data.path.segment_mut(segment_index) else {
            warn!("segment result for unknown segment {segment_index} of path {path_id}");
            return false;
        };
        segment.record_actual(metrics);

        if let Some(cost) = terminal_cost {
            if data.total_simulation_terminal_costs < 0.0 {
                data.total_simulation_terminal_costs = 0.0;
            }
            data.total_simulation_terminal_costs += cost;
        }
        data.total_simulation_edge_costs = data.path.simulated_edge_cost_sum();
        data.total_simulation_path_cost = data.total_simulation_edge_costs
            + data.total_simulation_terminal_costs.max(0.0);
        self.events.emit(PathModelEvent::SimulationUpdated(path_id));
        true
    }

    /// Non-owning lookup by path id.
    pub fn get_data_by_path_id(&self, path_id: i64) -> Option<&PathData> {
        self.entries.get(&path_id)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &PathData> {
        self.order
            .iter()
            .filter_map(move |id| self.entries.get(id))
    }

    /// Entries flagged visible, in insertion order. No ownership transfer;
    /// used by the comparison view and report export.
    pub fn visible_data(&self) -> Vec<&PathData> {
        self.iter().filter(|data| data.is_visible()).collect()
    }

    /// Flip the visibility flag of one entry.
    pub fn set_visible(&mut self, path_id: i64, visible: bool) -> bool {
        match self.entries.get_mut(&path_id) {
            Some(data) => {
                data.is_visible = visible;
                true
            }
            None => false,
        }
    }

    /// Every entry, in insertion order, for reporting.
    pub fn export(&self) -> Vec<&PathData> {
        self.iter().collect()
    }

    /// Number of paths held.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the model holds no paths.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
        self.events.emit(PathModelEvent::Cleared);
    }
}

// Report formatting -----------------------------------------------------------

/// Cost-like fields: fixed-point, 2 decimals.
pub fn format_cost(value: f64) -> String {
    format!("{value:.2}")
}

/// Risk-like fields: fixed-point, 6 decimals.
pub fn format_risk(value: f64) -> String {
    format!("{value:.6}")
}

/// Emission fields: fixed-point, 3 decimals.
pub fn format_emissions(value: f64) -> String {
    format!("{value:.3}")
}

/// Percentage difference `((simulated − predicted) / predicted) × 100`, or
/// `None` when `predicted <= 0`.
pub fn percent_difference(predicted: f64, simulated: f64) -> Option<f64> {
    if predicted <= 0.0 {
        return None;
    }
    Some((simulated - predicted) / predicted * 100.0)
}

/// Display form of the percentage difference: leading `+` for positive
/// values, `"N/A"` when undefined.
pub fn format_percent_difference(predicted: f64, simulated: f64) -> String {
    match percent_difference(predicted, simulated) {
        Some(diff) if diff > 0.0 => format!("+{diff:.2}%"),
        Some(diff) => format!("{diff:.2}%"),
        None => "N/A".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::model::{Segment, Terminal, TransportationMode};

    fn path(id: i64, total: f64) -> Path {
        let edge = total * 0.7;
        Path::new(
            id,
            vec![Terminal::new("a", "A"), Terminal::new("b", "B")],
            vec![Segment::new(
                "a",
                "b",
                TransportationMode::Truck,
                CostMetrics {
                    cost: edge,
                    ..CostMetrics::default()
                },
                edge,
            )],
            total,
            edge,
            total - edge,
        )
        .expect("valid path")
    }

    #[test]
    fn add_paths_orders_ascending_by_predicted_cost() {
        let mut model = PathComparisonModel::new();
        model.add_paths(vec![path(3, 300.0), path(1, 100.0), path(2, 200.0)]);

        let ids: Vec<i64> = model.iter().map(|data| data.path().path_id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        let costs: Vec<f64> = model.iter().map(|data| data.path().total_path_cost()).collect();
        assert!(costs.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn duplicate_path_id_replaces_the_entry() {
        let mut model = PathComparisonModel::new();
        model.add_paths(vec![path(7, 100.0)]);
        model.update_simulation_costs(7, 110.0, 80.0, 30.0);
        model.add_paths(vec![path(7, 90.0)]);

        assert_eq!(model.len(), 1);
        let data = model.get_data_by_path_id(7).unwrap();
        assert_eq!(data.path().total_path_cost(), 90.0);
        // Replacement resets the simulation sentinels.
        assert_eq!(data.total_simulation_path_cost(), NOT_SIMULATED);
    }

    #[test]
    fn simulation_costs_honor_the_sentinel_semantics() {
        let mut model = PathComparisonModel::new();
        model.add_paths(vec![path(7, 100.0)]);

        model.update_simulation_costs(7, 110.0, 80.0, 30.0);
        let data = model.get_data_by_path_id(7).unwrap();
        assert_eq!(data.total_simulation_path_cost(), 110.0);
        assert_eq!(data.total_simulation_edge_costs(), 80.0);
        assert_eq!(data.total_simulation_terminal_costs(), 30.0);
        assert!(data.is_simulated());

        // Negative arguments leave fields unchanged.
        model.update_simulation_costs(7, -1.0, 85.0, -1.0);
        let data = model.get_data_by_path_id(7).unwrap();
        assert_eq!(data.total_simulation_path_cost(), 110.0);
        assert_eq!(data.total_simulation_edge_costs(), 85.0);
        assert_eq!(data.total_simulation_terminal_costs(), 30.0);
    }

    #[test]
    fn unknown_path_id_is_a_no_op() {
        let mut model = PathComparisonModel::new();
        model.add_paths(vec![path(1, 100.0)]);
        let mut events = model.subscribe();

        model.update_simulation_costs(99, 1.0, 1.0, 1.0);
        model.update_prediction_costs(99, 1.0, 1.0, 1.0);
        assert!(!model.record_segment_result(99, 0, CostMetrics::default(), None));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn segment_results_rebuild_the_simulated_aggregates() {
        let mut model = PathComparisonModel::new();
        model.add_paths(vec![path(5, 100.0)]);

        let metrics = CostMetrics {
            cost: 80.0,
            ..CostMetrics::default()
        };
        assert!(model.record_segment_result(5, 0, metrics, Some(30.0)));

        let data = model.get_data_by_path_id(5).unwrap();
        assert_eq!(data.total_simulation_edge_costs(), 80.0);
        assert_eq!(data.total_simulation_terminal_costs(), 30.0);
        assert_eq!(data.total_simulation_path_cost(), 110.0);
        assert_eq!(
            data.path().segments()[0].actual_cost(),
            Some(80.0)
        );
    }

    #[test]
    fn visibility_filters_the_exported_set() {
        let mut model = PathComparisonModel::new();
        model.add_paths(vec![path(1, 100.0), path(2, 200.0)]);
        assert!(model.set_visible(2, false));
        assert!(!model.set_visible(9, false));

        assert_eq!(model.visible_data().len(), 1);
        assert_eq!(model.export().len(), 2);
    }

    #[test]
    fn reconciliation_scenario_reports_plus_ten_percent() {
        let mut model = PathComparisonModel::new();
        model.add_paths(vec![path(7, 100.0)]);
        model.update_simulation_costs(7, 110.0, 80.0, 30.0);

        let data = model.get_data_by_path_id(7).unwrap();
        assert_eq!(
            format_percent_difference(
                data.path().total_path_cost(),
                data.total_simulation_path_cost()
            ),
            "+10.00%"
        );
    }

    #[test]
    fn formatting_conventions() {
        assert_eq!(format_cost(110.0), "110.00");
        assert_eq!(format_risk(0.0015), "0.001500");
        assert_eq!(format_emissions(12.3456), "12.346");
        assert_eq!(format_percent_difference(0.0, 50.0), "N/A");
        assert_eq!(format_percent_difference(100.0, 90.0), "-10.00%");
    }
}
