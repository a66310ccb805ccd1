use crate::error::GraphError;
use crate::installer::graph::DependencyGraph;
use crate::installer::registry::UnitRegistry;
use crate::installer::unit::InstallableUnit;
use std::sync::Arc;

/// Thread the units into one install chain following `graph`'s order:
/// `order[i].then_install(order[i + 1])`. Units outside the graph (tool-only entries) are unlinked.
/// Returns the chain in order.
pub fn wire_install_chain(
    units: &UnitRegistry,
    graph: &DependencyGraph,
) -> Result<Vec<Arc<InstallableUnit>>, GraphError> {
    for unit in units.iter() {
        unit.clear_install_after();
    }

    let chain = graph
        .overall_order()
        .iter()
        .map(|id| {
            units
                .get(id)
                .cloned()
                .ok_or_else(|| GraphError::UnknownUnit(id.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    for pair in chain.windows(2) {
        pair[0].then_install(&pair[1]);
    }

    log::info!(
        "Install chain: {}",
        chain
            .iter()
            .map(|u| u.id())
            .collect::<Vec<_>>()
            .join(" -> ")
    );
    Ok(chain)
}
