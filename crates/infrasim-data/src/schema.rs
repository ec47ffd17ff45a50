//! Serde data file structs for scenario and run definitions.
//!
//! These structs define the on-disk format. Quantities are plain `f64`
//! keyed by resource kind name; references between entries are by name.
//! They are deserialized from RON, JSON, or TOML data files and then
//! resolved into kernel types by the loader.

use std::collections::BTreeMap;

use serde::Deserialize;

use infrasim_core::fixed::Ticks;
use infrasim_core::resource::ResourceKind;

/// Quantity per resource kind name. Kinds left out are zero.
pub type QuantitiesData = BTreeMap<String, f64>;

// ===========================================================================
// Scenario
// ===========================================================================

/// A scenario definition: nodes, elements and the exchanges between them.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioData {
    pub name: String,
    #[serde(default)]
    pub start_time: Ticks,
    pub nodes: Vec<String>,
    #[serde(default)]
    pub elements: Vec<ElementData>,
    #[serde(default)]
    pub exchanges: Vec<ExchangeData>,
}

/// An element definition. Elements may only refer to elements defined
/// before them, except through `parent`.
#[derive(Debug, Clone, Deserialize)]
pub struct ElementData {
    pub name: String,
    pub location: LocationData,
    #[serde(default)]
    pub stock: QuantitiesData,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub state: StateData,
}

/// A node name, or an origin and destination for moving elements.
#[derive(Debug, Clone, Deserialize)]
pub struct LocationData {
    pub origin: String,
    #[serde(default)]
    pub destination: Option<String>,
}

/// Behaviour of an element.
#[derive(Debug, Clone, Default, Deserialize)]
pub enum StateData {
    #[default]
    Idle,
    Process {
        #[serde(default)]
        production: QuantitiesData,
        #[serde(default)]
        consumption: QuantitiesData,
        #[serde(default)]
        storage: QuantitiesData,
        #[serde(default)]
        retrieval: QuantitiesData,
    },
    Source,
    Relay,
    Consumer {
        demand: QuantitiesData,
    },
    Storage {
        #[serde(default)]
        reserve: QuantitiesData,
        #[serde(default)]
        target: QuantitiesData,
    },
    Transport {
        kind: ResourceKind,
        capacity: f64,
        from: String,
        to: String,
    },
    Remote,
}

/// One supplier serving one customer with one resource kind.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeData {
    pub supplier: String,
    pub customer: String,
    pub kind: ResourceKind,
}

// ===========================================================================
// Run configuration
// ===========================================================================

/// Run parameters. Every field is optional and falls back to the kernel
/// defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigData {
    pub duration: Option<Ticks>,
    pub time_step: Option<Ticks>,
    pub rounds_per_step: Option<u32>,
    /// Verification tolerance.
    pub epsilon: Option<f64>,
}
