use crate::{
    clock::{Clock, SystemClock},
    constraints::{Constraint, ConstraintKind},
    error::ConstraintError,
    model::RawConstraint,
};
use std::{collections::HashMap, sync::Arc};

/// The registry of the known constraint kinds, keyed by their wire name.
///
/// It is the only way to turn a [`RawConstraint`] into an evaluable [`Constraint`]: the name is
/// looked up, the parameters decoded and the resulting constraint validated. The clock is
/// handed to the time-dependent constraints it builds.
#[derive(Clone, Debug)]
pub struct ConstraintRegistry {
    kinds: HashMap<&'static str, ConstraintKind>,
    clock: Arc<dyn Clock>,
}

impl ConstraintRegistry {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let kinds = ConstraintKind::ALL
            .into_iter()
            .map(|kind| (kind.name(), kind))
            .collect();
        Self { kinds, clock }
    }

    #[inline]
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn find(&self, name: &str) -> Result<ConstraintKind, ConstraintError> {
        self.kinds
            .get(name)
            .copied()
            .ok_or_else(|| ConstraintError::InvalidName(name.to_owned()))
    }

    /// The kinds that can be used as named operands.
    pub fn basic_kinds(&self) -> impl Iterator<Item = ConstraintKind> + '_ {
        self.kinds.values().copied().filter(ConstraintKind::is_basic)
    }

    /// Build a validated constraint out of its raw representation.
    pub fn new_constraint(&self, raw: &RawConstraint) -> Result<Constraint, ConstraintError> {
        let kind = self.find(&raw.name)?;
        let constraint = kind.initialize(&raw.parameters, self)?;
        constraint.validate()?;
        Ok(constraint)
    }

    #[inline]
    pub fn validate(&self, raw: &RawConstraint) -> Result<(), ConstraintError> {
        self.new_constraint(raw).map(|_| ())
    }

    /// Validate a raw constraint that is meant to be used as a named operand.
    pub fn validate_basic(&self, raw: &RawConstraint) -> Result<(), ConstraintError> {
        let kind = self.find(&raw.name)?;
        if !kind.is_basic() {
            return Err(ConstraintError::Validation {
                name: kind.name(),
                reason: "only basic constraints can be named".to_owned(),
            });
        }
        self.validate(raw)
    }
}

impl Default for ConstraintRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{constraints::raw, entities::entity};

    #[test]
    fn can_find_a_registered_kind() {
        let registry = ConstraintRegistry::default();

        assert_eq!(ConstraintKind::Intersection, registry.find("∩").unwrap());
        assert_eq!(ConstraintKind::LessThanEqual, registry.find("<=").unwrap());
    }

    #[test]
    fn return_an_error_on_unknown_name() {
        let registry = ConstraintRegistry::default();

        assert!(matches!(
            registry.find("≠"),
            Err(ConstraintError::InvalidName(name)) if name == "≠"
        ));
    }

    #[test]
    fn list_every_leaf_kind_as_basic() {
        let registry = ConstraintRegistry::default();

        let mut names: Vec<_> = registry.basic_kinds().map(|kind| kind.name()).collect();
        names.sort_unstable();

        assert_eq!(
            vec![
                "%", "<", "<=", ">", ">=", "always", "contains", "cron", "excludes", "match",
                "random", "rollout"
            ],
            names
        );
    }

    #[test]
    fn can_build_a_nested_constraint() {
        let registry = ConstraintRegistry::default();

        let constraint = registry
            .new_constraint(&raw!("∩", {"constraints": [
                {"name": "!", "parameters": {"constraint": {"name": "%", "parameters": {"value": 2}}}},
                {"name": "<", "parameters": {"value": 10}}
            ]}))
            .unwrap();

        assert!(constraint.evaluate(&entity!(7)));
        assert!(!constraint.evaluate(&entity!(8)));
    }

    #[test]
    fn validate_the_built_constraint() {
        let registry = ConstraintRegistry::default();

        assert!(registry.validate(&raw!("%", {"value": 3})).is_ok());
        assert!(registry.validate(&raw!("%", {"value": 1})).is_err());
        assert!(registry.validate(&raw!("unknown")).is_err());
    }

    #[test]
    fn only_accept_basic_constraints_as_operands() {
        let registry = ConstraintRegistry::default();

        assert!(registry.validate_basic(&raw!("always")).is_ok());
        assert!(matches!(
            registry.validate_basic(&raw!("∪", {"constraints": [{"name": "always"}, {"name": "always"}]})),
            Err(ConstraintError::Validation { name: "∪", .. })
        ));
    }
}
