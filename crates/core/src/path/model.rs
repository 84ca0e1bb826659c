//! Immutable path objects.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Mode of one path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportationMode {
    /// Road freight.
    Truck,
    /// Rail freight.
    Rail,
    /// Sea freight.
    Ship,
    /// Anything the core does not dispatch itself.
    Other,
}

/// The six per-segment cost attributes. The same keys describe both the
/// estimated and the actual side of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostMetrics {
    /// kg CO₂ for the segment.
    pub carbon_emissions: f64,
    /// Monetary cost.
    pub cost: f64,
    /// Distance in km.
    pub distance: f64,
    /// Energy in kWh.
    pub energy_consumption: f64,
    /// Risk factor, 0..1.
    pub risk: f64,
    /// Travel time in hours.
    pub travel_time: f64,
}

impl CostMetrics {
    /// The attribute keys, in their serialized spelling.
    pub const KEYS: [&'static str; 6] = [
        "carbonEmissions",
        "cost",
        "distance",
        "energyConsumption",
        "risk",
        "travelTime",
    ];

    /// Look up one attribute by its serialized key.
    pub fn get(&self, key: &str) -> Option<f64> {
        match key {
            "carbonEmissions" => Some(self.carbon_emissions),
            "cost" => Some(self.cost),
            "distance" => Some(self.distance),
            "energyConsumption" => Some(self.energy_consumption),
            "risk" => Some(self.risk),
            "travelTime" => Some(self.travel_time),
            _ => None,
        }
    }
}

/// Reference to a terminal along a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terminal {
    /// Unique terminal identifier.
    pub id: String,
    /// Display name shown in reports.
    pub display_name: String,
    /// Region the terminal belongs to, when known.
    #[serde(default)]
    pub region: Option<String>,
}

impl Terminal {
    /// Convenience constructor.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            region: None,
        }
    }
}

/// One leg of a path using exactly one mode.
///
/// `estimated` is always present; `actual` appears only after a successful
/// simulation reconciled this segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    start: String,
    end: String,
    mode: TransportationMode,
    estimated_values: CostMetrics,
    estimated_cost: f64,
    #[serde(default)]
    actual_values: Option<CostMetrics>,
    #[serde(default)]
    actual_cost: Option<f64>,
}

impl Segment {
    /// Build a segment with its predicted attributes.
    pub fn new(
        start: impl Into<String>,
        end: impl Into<String>,
        mode: TransportationMode,
        estimated_values: CostMetrics,
        estimated_cost: f64,
    ) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            mode,
            estimated_values,
            estimated_cost,
            actual_values: None,
            actual_cost: None,
        }
    }

    /// Terminal id this segment starts at.
    pub fn start(&self) -> &str {
        &self.start
    }

    /// Terminal id this segment ends at.
    pub fn end(&self) -> &str {
        &self.end
    }

    /// Segment mode.
    pub fn mode(&self) -> TransportationMode {
        self.mode
    }

    /// Predicted attributes.
    pub fn estimated_values(&self) -> &CostMetrics {
        &self.estimated_values
    }

    /// Predicted segment cost.
    pub fn estimated_cost(&self) -> f64 {
        self.estimated_cost
    }

    /// Simulated attributes, once reconciled.
    pub fn actual_values(&self) -> Option<&CostMetrics> {
        self.actual_values.as_ref()
    }

    /// Simulated segment cost, once reconciled.
    pub fn actual_cost(&self) -> Option<f64> {
        self.actual_cost
    }

    pub(crate) fn record_actual(&mut self, metrics: CostMetrics) {
        self.actual_cost = Some(metrics.cost);
        self.actual_values = Some(metrics);
    }
}

/// An ordered alternation of terminals and segments, immutable through its
/// public API after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    path_id: i64,
    terminals: Vec<Terminal>,
    segments: Vec<Segment>,
    total_path_cost: f64,
    total_edge_costs: f64,
    total_terminal_costs: f64,
}

impl Path {
    /// Build a path, validating its structural invariants: one segment per
    /// consecutive terminal pair, each segment's endpoints matching the
    /// terminals it spans.
    pub fn new(
        path_id: i64,
        terminals: Vec<Terminal>,
        segments: Vec<Segment>,
        total_path_cost: f64,
        total_edge_costs: f64,
        total_terminal_costs: f64,
    ) -> CoreResult<Self> {
        if terminals.len() < 2 {
            return Err(CoreError::InvalidPath(format!(
                "path {path_id} needs at least two terminals"
            )));
        }
        if segments.len() + 1 != terminals.len() {
            return Err(CoreError::InvalidPath(format!(
                "path {path_id} has {} segments for {} terminals",
                segments.len(),
                terminals.len()
            )));
        }
        for (index, segment) in segments.iter().enumerate() {
            if segment.start() != terminals[index].id || segment.end() != terminals[index + 1].id
            {
                return Err(CoreError::InvalidPath(format!(
                    "segment {index} of path {path_id} does not join its terminals"
                )));
            }
        }
        Ok(Self {
            path_id,
            terminals,
            segments,
            total_path_cost,
            total_edge_costs,
            total_terminal_costs,
        })
    }

    /// Session-unique path identifier.
    pub fn path_id(&self) -> i64 {
        self.path_id
    }

    /// Ordered terminals from origin to destination.
    pub fn terminals(&self) -> &[Terminal] {
        &self.terminals
    }

    /// Ordered segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Predicted total path cost.
    pub fn total_path_cost(&self) -> f64 {
        self.total_path_cost
    }

    /// Predicted sum of segment costs.
    pub fn total_edge_costs(&self) -> f64 {
        self.total_edge_costs
    }

    /// Predicted sum of terminal costs.
    pub fn total_terminal_costs(&self) -> f64 {
        self.total_terminal_costs
    }

    /// Sum of simulated segment costs over the reconciled segments.
    pub fn simulated_edge_cost_sum(&self) -> f64 {
        self.segments
            .iter()
            .filter_map(Segment::actual_cost)
            .sum()
    }

    pub(crate) fn segment_mut(&mut self, index: usize) -> Option<&mut Segment> {
        self.segments.get_mut(index)
    }

    pub(crate) fn set_prediction_costs(&mut self, total: f64, edge: f64, terminal: f64) {
        if total >= 0.0 {
            self.total_path_cost = total;
        }
        if edge >= 0.0 {
            self.total_edge_costs = edge;
        }
        if terminal >= 0.0 {
            self.total_terminal_costs = terminal;
        }
    }
}
