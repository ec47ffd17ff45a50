//! Resolution: turns schema structs into a built [`Scenario`] and a
//! [`SimConfig`].
//!
//! Names are resolved in file order. A transport may only name depots
//! defined before it; parents may name any element.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use infrasim_core::element::Element;
use infrasim_core::exchange::ExchangingState;
use infrasim_core::fixed::{Fixed64, NumericContext, checked_f64_to_fixed64};
use infrasim_core::id::{ElementId, NodeId};
use infrasim_core::location::Location;
use infrasim_core::resource::{ResourceKind, ResourceVector};
use infrasim_core::scenario::{Scenario, ScenarioBuilder, ScenarioError};
use infrasim_core::sim::SimConfig;
use infrasim_core::state::{ElementState, ProcessState, RemoteState};
use infrasim_core::transport::{StorageState, TransportState};

use crate::loader::{DataLoadError, check_duplicate, resolve_name};
use crate::schema::{ConfigData, LocationData, QuantitiesData, ScenarioData, StateData};

fn invalid(file: &Path, detail: impl Into<String>) -> DataLoadError {
    DataLoadError::InvalidValue {
        file: file.to_path_buf(),
        detail: detail.into(),
    }
}

fn scenario_error(file: &Path) -> impl Fn(ScenarioError) -> DataLoadError + '_ {
    move |source| DataLoadError::Scenario {
        file: file.to_path_buf(),
        source,
    }
}

// ===========================================================================
// Values
// ===========================================================================

/// Quantities must be finite and fit the Q32.32 range (about ±2.1e9).
fn quantity(value: f64, file: &Path, what: &str) -> Result<Fixed64, DataLoadError> {
    if !value.is_finite() {
        return Err(invalid(file, format!("{what} must be finite, got {value}")));
    }
    checked_f64_to_fixed64(value)
        .ok_or_else(|| invalid(file, format!("{what} is out of range, got {value}")))
}

/// Build a vector from a kind-name map. Unknown kind names are errors.
pub fn resolve_quantities(
    quantities: &QuantitiesData,
    file: &Path,
) -> Result<ResourceVector, DataLoadError> {
    let mut vector = ResourceVector::ZERO;
    for (name, &value) in quantities {
        let kind = ResourceKind::from_str(name).map_err(|_| DataLoadError::UnresolvedRef {
            file: file.to_path_buf(),
            name: name.clone(),
            expected_kind: "resource kind",
        })?;
        vector = vector.add(&ResourceVector::of(kind, quantity(value, file, name)?));
    }
    Ok(vector)
}

fn resolve_location(
    location: &LocationData,
    nodes: &HashMap<String, NodeId>,
    file: &Path,
) -> Result<Location, DataLoadError> {
    let origin = *resolve_name(nodes, &location.origin, file, "node")?;
    match &location.destination {
        Some(destination) => Ok(Location::between(
            origin,
            *resolve_name(nodes, destination, file, "node")?,
        )),
        None => Ok(Location::at(origin)),
    }
}

fn resolve_state(
    state: &StateData,
    elements: &HashMap<String, ElementId>,
    file: &Path,
) -> Result<ElementState, DataLoadError> {
    Ok(match state {
        StateData::Idle => ElementState::Idle,
        StateData::Process {
            production,
            consumption,
            storage,
            retrieval,
        } => ElementState::Process(ProcessState {
            production: resolve_quantities(production, file)?,
            consumption: resolve_quantities(consumption, file)?,
            storage: resolve_quantities(storage, file)?,
            retrieval: resolve_quantities(retrieval, file)?,
        }),
        StateData::Source => ElementState::Exchanging(ExchangingState::source()),
        StateData::Relay => ElementState::Exchanging(ExchangingState::relay()),
        StateData::Consumer { demand } => {
            ElementState::Exchanging(ExchangingState::consumer(resolve_quantities(demand, file)?))
        }
        StateData::Storage { reserve, target } => ElementState::Storage(StorageState::new(
            resolve_quantities(reserve, file)?,
            resolve_quantities(target, file)?,
        )),
        StateData::Transport {
            kind,
            capacity,
            from,
            to,
        } => {
            if *capacity < 0.0 {
                return Err(invalid(file, format!("transport capacity {capacity} is negative")));
            }
            ElementState::Transport(TransportState::new(
                *kind,
                quantity(*capacity, file, "capacity")?,
                *resolve_name(elements, from, file, "depot")?,
                *resolve_name(elements, to, file, "depot")?,
            ))
        }
        StateData::Remote => ElementState::Remote(RemoteState::new()),
    })
}

// ===========================================================================
// Scenario
// ===========================================================================

/// Resolve every name in `data` and build the scenario.
pub fn resolve_scenario(data: &ScenarioData, file: &Path) -> Result<Scenario, DataLoadError> {
    let mut builder = ScenarioBuilder::new(data.name.clone(), data.start_time);

    let mut nodes: HashMap<String, NodeId> = HashMap::new();
    for name in &data.nodes {
        check_duplicate(&nodes, name, file)?;
        let id = builder
            .add_node(name.clone())
            .map_err(scenario_error(file))?;
        nodes.insert(name.clone(), id);
    }

    let mut elements: HashMap<String, ElementId> = HashMap::new();
    for def in &data.elements {
        check_duplicate(&elements, &def.name, file)?;
        let element = Element::new(
            def.name.clone(),
            resolve_location(&def.location, &nodes, file)?,
            resolve_quantities(&def.stock, file)?,
            resolve_state(&def.state, &elements, file)?,
        );
        let id = builder.add_element(element).map_err(scenario_error(file))?;
        elements.insert(def.name.clone(), id);
    }

    for def in &data.elements {
        if let Some(parent) = &def.parent {
            let child = *resolve_name(&elements, &def.name, file, "element")?;
            let parent = *resolve_name(&elements, parent, file, "parent element")?;
            builder
                .set_parent(child, parent)
                .map_err(scenario_error(file))?;
        }
    }

    for exchange in &data.exchanges {
        let supplier = *resolve_name(&elements, &exchange.supplier, file, "supplier")?;
        let customer = *resolve_name(&elements, &exchange.customer, file, "customer")?;
        builder
            .connect_exchange(supplier, customer, exchange.kind)
            .map_err(scenario_error(file))?;
    }

    tracing::debug!(
        file = %file.display(),
        scenario = %data.name,
        nodes = nodes.len(),
        elements = elements.len(),
        exchanges = data.exchanges.len(),
        "scenario resolved"
    );
    Ok(builder.build())
}

// ===========================================================================
// Config
// ===========================================================================

/// Fill unset fields from [`SimConfig::default`] and check ranges.
pub fn resolve_config(data: &ConfigData, file: &Path) -> Result<SimConfig, DataLoadError> {
    let defaults = SimConfig::default();
    let time_step = data.time_step.unwrap_or(defaults.time_step);
    if time_step == 0 {
        return Err(invalid(file, "time_step must be non-zero"));
    }
    let numeric = match data.epsilon {
        Some(epsilon) => NumericContext::new(quantity(epsilon, file, "epsilon")?),
        None => defaults.numeric,
    };
    Ok(SimConfig {
        duration: data.duration.unwrap_or(defaults.duration),
        time_step,
        rounds_per_step: data.rounds_per_step.unwrap_or(defaults.rounds_per_step),
        numeric,
    })
}
