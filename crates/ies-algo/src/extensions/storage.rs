//! Terminal storage requirement.

use super::{ConstraintExtension, ExtensionContext};
use crate::builder::{ConstraintBuilder, Operand, RowTemplate};
use crate::config::StorageBoundary;
use crate::constraints::{ExtraConstraint, Sense};
use crate::error::ConstraintError;
use ies_core::{Network, SnapshotWindow};
use tracing::warn;

/// `e(last) == target` for the configured store, where `last` is the final
/// snapshot of the window.
pub fn build_storage_boundary(
    network: &Network,
    window: SnapshotWindow,
    boundary: &StorageBoundary,
    builder: &dyn ConstraintBuilder,
) -> Result<Vec<ExtraConstraint>, ConstraintError> {
    let store = network.store_by_name(&boundary.store).ok_or_else(|| {
        ConstraintError::MissingBoundaryStore {
            store: boundary.store.clone(),
        }
    })?;
    let Some(last) = window.last() else {
        return Ok(Vec::new());
    };
    if !store.e_nom_extendable && boundary.target > store.e_nom.value() {
        warn!(
            "Boundary target {} MWh exceeds the fixed capacity of store '{}' ({})",
            boundary.target, store.name, store.e_nom
        );
    }

    let template = RowTemplate::new("storage_boundary", store.name.clone(), Sense::Eq, boundary.target)
        .term(1.0, Operand::StoreEnergy(store.id));
    Ok(builder.per_snapshot(&template, &[last]))
}

#[derive(Debug, Clone)]
pub struct StorageBoundaryExtension {
    pub boundary: StorageBoundary,
}

impl ConstraintExtension for StorageBoundaryExtension {
    fn id(&self) -> &str {
        "storage_boundary"
    }

    fn build(
        &self,
        ctx: &ExtensionContext<'_>,
        builder: &dyn ConstraintBuilder,
    ) -> Result<Vec<ExtraConstraint>, ConstraintError> {
        build_storage_boundary(ctx.network, ctx.window, &self.boundary, builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::LinearExpressionBuilder;
    use crate::constraints::VarRef;

    fn boundary(store: &str) -> StorageBoundary {
        StorageBoundary {
            store: store.into(),
            target: 2976.0,
        }
    }

    #[test]
    fn test_pins_last_snapshot() {
        let network = super::super::tests::chp_network();
        let window = SnapshotWindow::new(0, 3).unwrap();
        let rows =
            build_storage_boundary(&network, window, &boundary("TA"), &LinearExpressionBuilder)
                .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "storage_boundary:TA[2]");
        let store = network.store_by_name("TA").unwrap().id;
        assert_eq!(rows[0].terms, vec![(1.0, VarRef::StoreE { store, snapshot: 2 })]);
        assert_eq!(rows[0].rhs, 2976.0);
    }

    #[test]
    fn test_missing_store() {
        let network = super::super::tests::chp_network();
        assert_eq!(
            build_storage_boundary(
                &network,
                network.snapshots.full_window(),
                &boundary("TB"),
                &LinearExpressionBuilder
            ),
            Err(ConstraintError::MissingBoundaryStore { store: "TB".into() })
        );
    }
}
