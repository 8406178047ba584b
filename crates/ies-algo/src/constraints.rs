//! Extra-constraint descriptors.
//!
//! Extensions never touch the solver. They return [`ExtraConstraint`] values
//! that reference model variables symbolically through [`VarRef`]; the LOPF
//! backend resolves the references when it assembles the model.

use ies_core::{LinkId, StoreId};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Symbolic reference to a variable of the LOPF model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum VarRef {
    /// Power drawn by a link at its `bus0` in one snapshot
    LinkP { link: LinkId, snapshot: usize },
    /// Nominal capacity of a link
    LinkPNom(LinkId),
    /// Energy content of a store at the end of one snapshot
    StoreE { store: StoreId, snapshot: usize },
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarRef::LinkP { link, snapshot } => write!(f, "link_p[{}, {}]", link.value(), snapshot),
            VarRef::LinkPNom(link) => write!(f, "link_p_nom[{}]", link.value()),
            VarRef::StoreE { store, snapshot } => {
                write!(f, "store_e[{}, {}]", store.value(), snapshot)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Sense {
    Le,
    Eq,
    Ge,
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Sense::Le => "<=",
            Sense::Eq => "==",
            Sense::Ge => ">=",
        })
    }
}

/// `Σ coef · var  (sense)  rhs`, with a name unique across the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtraConstraint {
    pub name: String,
    pub terms: Vec<(f64, VarRef)>,
    pub sense: Sense,
    pub rhs: f64,
}

impl ExtraConstraint {
    /// Build a row, merging repeated variables and dropping zero coefficients.
    ///
    /// Terms keep the order in which each variable first appears.
    pub fn new(
        name: impl Into<String>,
        terms: impl IntoIterator<Item = (f64, VarRef)>,
        sense: Sense,
        rhs: f64,
    ) -> Self {
        let mut merged: Vec<(f64, VarRef)> = Vec::new();
        for (coef, var) in terms {
            match merged.iter_mut().find(|(_, v)| *v == var) {
                Some((c, _)) => *c += coef,
                None => merged.push((coef, var)),
            }
        }
        merged.retain(|(c, _)| *c != 0.0);
        Self {
            name: name.into(),
            terms: merged,
            sense,
            rhs,
        }
    }

    /// Left-hand side evaluated with the given variable values.
    pub fn lhs(&self, value: impl Fn(&VarRef) -> f64) -> f64 {
        self.terms.iter().map(|(c, v)| c * value(v)).sum()
    }

    /// Whether the row holds for the given values within an absolute tolerance.
    pub fn is_satisfied(&self, value: impl Fn(&VarRef) -> f64, tol: f64) -> bool {
        let lhs = self.lhs(value);
        match self.sense {
            Sense::Le => lhs <= self.rhs + tol,
            Sense::Eq => (lhs - self.rhs).abs() <= tol,
            Sense::Ge => lhs >= self.rhs - tol,
        }
    }
}

impl fmt::Display for ExtraConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.name)?;
        if self.terms.is_empty() {
            write!(f, "0")?;
        }
        for (i, (coef, var)) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, " + ")?;
            }
            write!(f, "{coef} {var}")?;
        }
        write!(f, " {} {}", self.sense, self.rhs)
    }
}

/// Ordered collection of extra constraints with unique names.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConstraintSet {
    rows: Vec<ExtraConstraint>,
    #[serde(skip)]
    names: HashSet<String>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rows. Returns the name of the first duplicate, if any.
    pub fn extend(&mut self, rows: Vec<ExtraConstraint>) -> Result<(), String> {
        for row in rows {
            if !self.names.insert(row.name.clone()) {
                return Err(row.name);
            }
            self.rows.push(row);
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtraConstraint> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ExtraConstraint> {
        self.rows.iter().find(|r| r.name == name)
    }

    /// Rows whose name starts with `group:`.
    pub fn group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a ExtraConstraint> {
        self.rows
            .iter()
            .filter(move |r| r.name.split(':').next() == Some(group))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(link: usize, t: usize) -> VarRef {
        VarRef::LinkP {
            link: LinkId::new(link),
            snapshot: t,
        }
    }

    #[test]
    fn test_terms_are_merged() {
        let row = ExtraConstraint::new(
            "fuel:gas[0]",
            [(1.0, p(0, 0)), (2.0, p(1, 0)), (0.5, p(0, 0)), (0.0, p(2, 0))],
            Sense::Le,
            10.0,
        );
        assert_eq!(row.terms, vec![(1.5, p(0, 0)), (2.0, p(1, 0))]);
    }

    #[test]
    fn test_satisfaction() {
        let row = ExtraConstraint::new("b:u[3]", [(0.75, p(1, 3)), (-0.4, p(0, 3))], Sense::Le, 0.0);
        let values = |v: &VarRef| match v {
            VarRef::LinkP { link, .. } if link.value() == 0 => 100.0,
            _ => 40.0,
        };
        assert!(row.is_satisfied(values, 1e-9));
        assert!((row.lhs(values) - (30.0 - 40.0)).abs() < 1e-12);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut set = ConstraintSet::new();
        let row = ExtraConstraint::new("x:a", [(1.0, p(0, 0))], Sense::Eq, 1.0);
        set.extend(vec![row.clone()]).unwrap();
        assert_eq!(set.extend(vec![row]), Err("x:a".to_string()));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_group_filter() {
        let mut set = ConstraintSet::new();
        set.extend(vec![
            ExtraConstraint::new("backpressure:u[0]", [(1.0, p(0, 0))], Sense::Le, 0.0),
            ExtraConstraint::new("top_iso_fuel_line:u[0]", [(1.0, p(0, 0))], Sense::Le, 5.0),
        ])
        .unwrap();
        assert_eq!(set.group("backpressure").count(), 1);
        assert!(set.get("top_iso_fuel_line:u[0]").is_some());
    }

    #[test]
    fn test_display() {
        let row = ExtraConstraint::new("s:TA", [(1.0, VarRef::StoreE { store: StoreId::new(0), snapshot: 23 })], Sense::Eq, 2976.0);
        assert_eq!(row.to_string(), "s:TA: 1 store_e[0, 23] == 2976");
    }
}
