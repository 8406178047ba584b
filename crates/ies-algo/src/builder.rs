//! Constraint-builder strategies.
//!
//! Extensions describe a constraint once, as a [`RowTemplate`], and hand it to
//! a [`ConstraintBuilder`] that expands it over the snapshot axis. Two
//! strategies exist:
//!
//! - [`LinearExpressionBuilder`] works column-wise: each term becomes a
//!   coefficient column and a variable column broadcast along the window,
//!   and rows are read off the columns afterwards.
//! - [`RuleBuilder`] evaluates the template as a rule, one snapshot at a time.
//!
//! Both produce identical rows for identical templates; the choice only
//! changes how the rows are assembled.

use crate::config::BuilderKind;
use crate::constraints::{ExtraConstraint, Sense, VarRef};
use crate::error::ConstraintError;
use ies_core::{LinkId, StoreId};
use std::sync::Arc;

/// Model variable named without its snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// Link power at `bus0` (time-indexed)
    LinkFlow(LinkId),
    /// Link nominal capacity (static)
    LinkCapacity(LinkId),
    /// Store energy content (time-indexed)
    StoreEnergy(StoreId),
}

impl Operand {
    pub fn is_time_indexed(&self) -> bool {
        !matches!(self, Operand::LinkCapacity(_))
    }

    /// Bind the operand to a snapshot. Static operands ignore it.
    pub fn at(&self, snapshot: usize) -> VarRef {
        match *self {
            Operand::LinkFlow(link) => VarRef::LinkP { link, snapshot },
            Operand::LinkCapacity(link) => VarRef::LinkPNom(link),
            Operand::StoreEnergy(store) => VarRef::StoreE { store, snapshot },
        }
    }
}

/// `Σ coef · operand  (sense)  rhs`, before it is bound to snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct RowTemplate {
    /// Constraint family, e.g. `backpressure`
    pub group: &'static str,
    /// Unit, fuel bus or store the row belongs to
    pub component: String,
    pub terms: Vec<(f64, Operand)>,
    pub sense: Sense,
    pub rhs: f64,
}

impl RowTemplate {
    pub fn new(group: &'static str, component: impl Into<String>, sense: Sense, rhs: f64) -> Self {
        Self {
            group,
            component: component.into(),
            terms: Vec::new(),
            sense,
            rhs,
        }
    }

    pub fn term(mut self, coef: f64, operand: Operand) -> Self {
        self.terms.push((coef, operand));
        self
    }

    pub fn is_time_indexed(&self) -> bool {
        self.terms.iter().any(|(_, op)| op.is_time_indexed())
    }

    /// `group:component[t]` for snapshot rows, `group:component` for static ones.
    pub fn row_name(&self, snapshot: Option<usize>) -> String {
        match snapshot {
            Some(t) => format!("{}:{}[{}]", self.group, self.component, t),
            None => format!("{}:{}", self.group, self.component),
        }
    }
}

/// Expands row templates into concrete constraints.
pub trait ConstraintBuilder: Send + Sync {
    fn kind(&self) -> BuilderKind;

    /// One row per listed snapshot, in the order given.
    fn per_snapshot(&self, template: &RowTemplate, snapshots: &[usize]) -> Vec<ExtraConstraint>;

    /// A single row without a snapshot axis.
    ///
    /// Fails if the template references a time-indexed variable.
    fn single(&self, template: &RowTemplate) -> Result<ExtraConstraint, ConstraintError> {
        if template.is_time_indexed() {
            return Err(ConstraintError::MissingSnapshot(template.row_name(None)));
        }
        Ok(ExtraConstraint::new(
            template.row_name(None),
            template.terms.iter().map(|(c, op)| (*c, op.at(0))),
            template.sense,
            template.rhs,
        ))
    }
}

/// Column-wise assembly over the snapshot axis.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinearExpressionBuilder;

impl ConstraintBuilder for LinearExpressionBuilder {
    fn kind(&self) -> BuilderKind {
        BuilderKind::Linear
    }

    fn per_snapshot(&self, template: &RowTemplate, snapshots: &[usize]) -> Vec<ExtraConstraint> {
        let n = snapshots.len();
        let columns: Vec<(Vec<f64>, Vec<VarRef>)> = template
            .terms
            .iter()
            .map(|(coef, op)| (vec![*coef; n], snapshots.iter().map(|&t| op.at(t)).collect()))
            .collect();
        let rhs = vec![template.rhs; n];

        (0..n)
            .map(|k| {
                ExtraConstraint::new(
                    template.row_name(Some(snapshots[k])),
                    columns.iter().map(|(coefs, vars)| (coefs[k], vars[k])),
                    template.sense,
                    rhs[k],
                )
            })
            .collect()
    }
}

/// Row-wise assembly, one rule evaluation per snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBuilder;

impl RuleBuilder {
    fn rule(template: &RowTemplate, t: usize) -> ExtraConstraint {
        ExtraConstraint::new(
            template.row_name(Some(t)),
            template.terms.iter().map(|(c, op)| (*c, op.at(t))),
            template.sense,
            template.rhs,
        )
    }
}

impl ConstraintBuilder for RuleBuilder {
    fn kind(&self) -> BuilderKind {
        BuilderKind::Rule
    }

    fn per_snapshot(&self, template: &RowTemplate, snapshots: &[usize]) -> Vec<ExtraConstraint> {
        snapshots.iter().map(|&t| Self::rule(template, t)).collect()
    }
}

pub fn builder_for(kind: BuilderKind) -> Arc<dyn ConstraintBuilder> {
    match kind {
        BuilderKind::Linear => Arc::new(LinearExpressionBuilder),
        BuilderKind::Rule => Arc::new(RuleBuilder),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> RowTemplate {
        RowTemplate::new("top_iso_fuel_line", "chp", Sense::Le, 40.0)
            .term(1.0, Operand::LinkFlow(LinkId::new(1)))
            .term(1.0, Operand::LinkFlow(LinkId::new(0)))
            .term(-1.0, Operand::LinkCapacity(LinkId::new(0)))
    }

    #[test]
    fn test_strategies_agree() {
        let snapshots: Vec<usize> = (3..9).collect();
        let linear = LinearExpressionBuilder.per_snapshot(&template(), &snapshots);
        let rule = RuleBuilder.per_snapshot(&template(), &snapshots);
        assert_eq!(linear.len(), 6);
        assert_eq!(linear, rule);
    }

    #[test]
    fn test_row_names_carry_snapshot() {
        let rows = builder_for(BuilderKind::Rule).per_snapshot(&template(), &[0, 1]);
        assert_eq!(rows[0].name, "top_iso_fuel_line:chp[0]");
        assert_eq!(rows[1].name, "top_iso_fuel_line:chp[1]");
        assert_eq!(
            rows[1].terms[0].1,
            VarRef::LinkP {
                link: LinkId::new(1),
                snapshot: 1
            }
        );
        assert_eq!(rows[1].terms[2].1, VarRef::LinkPNom(LinkId::new(0)));
    }

    #[test]
    fn test_empty_window_yields_no_rows() {
        assert!(LinearExpressionBuilder.per_snapshot(&template(), &[]).is_empty());
    }

    #[test]
    fn test_single_row() {
        let coupling = RowTemplate::new("chp_capacity", "chp", Sense::Eq, 0.0)
            .term(0.4, Operand::LinkCapacity(LinkId::new(0)))
            .term(-2.6, Operand::LinkCapacity(LinkId::new(1)));
        let row = LinearExpressionBuilder.single(&coupling).unwrap();
        assert_eq!(row.name, "chp_capacity:chp");
        assert_eq!(row.terms.len(), 2);

        assert!(matches!(
            RuleBuilder.single(&template()),
            Err(ConstraintError::MissingSnapshot(_))
        ));
    }
}
