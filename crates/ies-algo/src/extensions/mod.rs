//! Constraint extensions.
//!
//! Each extension turns one piece of domain knowledge (CHP coupling, a
//! terminal storage requirement) into [`ExtraConstraint`] rows for a snapshot
//! window. The [`ConstraintRegistry`] runs the enabled extensions in
//! registration order and collects their rows into one [`ConstraintSet`].

pub mod chp;
pub mod storage;

use crate::builder::{builder_for, ConstraintBuilder};
use crate::config::RunConfig;
use crate::constraints::{ConstraintSet, ExtraConstraint};
use crate::error::ConstraintError;
use ies_core::{Network, SnapshotWindow};
use std::sync::Arc;
use tracing::debug;

pub use chp::{
    build_backpressure, build_capacity_coupling, build_top_iso_fuel_line,
    derive_heat_efficiency, ChpBackpressure, ChpCapacityCoupling, ChpTopIsoFuelLine,
    HeatEfficiency,
};
pub use storage::{build_storage_boundary, StorageBoundaryExtension};

/// Read-only view handed to every extension.
#[derive(Debug, Clone, Copy)]
pub struct ExtensionContext<'a> {
    pub network: &'a Network,
    pub window: SnapshotWindow,
}

impl<'a> ExtensionContext<'a> {
    pub fn new(network: &'a Network, window: SnapshotWindow) -> Self {
        Self { network, window }
    }

    pub fn snapshots(&self) -> Vec<usize> {
        self.window.iter().collect()
    }
}

/// A source of extra constraints.
pub trait ConstraintExtension: Send + Sync {
    /// Stable identifier, also the row-name prefix of the rows it emits.
    fn id(&self) -> &str;

    fn build(
        &self,
        ctx: &ExtensionContext<'_>,
        builder: &dyn ConstraintBuilder,
    ) -> Result<Vec<ExtraConstraint>, ConstraintError>;
}

/// Ordered set of extensions sharing one builder strategy.
pub struct ConstraintRegistry {
    builder: Arc<dyn ConstraintBuilder>,
    extensions: Vec<Arc<dyn ConstraintExtension>>,
}

impl ConstraintRegistry {
    pub fn new(builder: Arc<dyn ConstraintBuilder>) -> Self {
        Self {
            builder,
            extensions: Vec::new(),
        }
    }

    /// Register the extensions enabled by `config`.
    ///
    /// CHP rows come first (backpressure, fuel line, capacity coupling),
    /// followed by the storage boundary.
    pub fn from_config(config: &RunConfig) -> Self {
        let mut registry = Self::new(builder_for(config.builder));
        if let Some(chp) = &config.chp {
            registry.register(Arc::new(ChpBackpressure {
                c_m: chp.c_m,
                grouping: chp.grouping,
            }));
            registry.register(Arc::new(ChpTopIsoFuelLine {
                grouping: chp.grouping,
            }));
            registry.register(Arc::new(ChpCapacityCoupling { nom_r: chp.nom_r }));
        }
        if let Some(boundary) = &config.storage_boundary {
            registry.register(Arc::new(StorageBoundaryExtension {
                boundary: boundary.clone(),
            }));
        }
        registry
    }

    pub fn register(&mut self, extension: Arc<dyn ConstraintExtension>) {
        self.extensions.push(extension);
    }

    pub fn ids(&self) -> Vec<&str> {
        self.extensions.iter().map(|e| e.id()).collect()
    }

    pub fn builder(&self) -> &dyn ConstraintBuilder {
        self.builder.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Run every extension and collect the rows.
    pub fn build_all(&self, ctx: &ExtensionContext<'_>) -> Result<ConstraintSet, ConstraintError> {
        let mut set = ConstraintSet::new();
        for extension in &self.extensions {
            let rows = extension.build(ctx, self.builder.as_ref())?;
            debug!(
                "Extension '{}' emitted {} rows over window {}",
                extension.id(),
                rows.len(),
                ctx.window
            );
            set.extend(rows).map_err(ConstraintError::DuplicateName)?;
        }
        Ok(set)
    }
}
