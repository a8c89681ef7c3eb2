use crate::{
    clock::Clock,
    entity::Entity,
    error::ConstraintError,
    model::RawConstraint,
    registry::ConstraintRegistry,
    schedule,
};
use chrono::{Duration, Timelike};
use itertools::Itertools;
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    collections::HashSet,
    fmt::{Display, Formatter},
    str::FromStr,
    sync::Arc,
};

const MIN_VALUES: usize = 1;
const MIN_CONSTRAINTS: usize = 2;
const MIN_MODULUS: i64 = 2;
const MIN_BOUND: i64 = 0;
const MAX_BOUND: i64 = 99;
const BUCKETS: i64 = 100;

/// The closed set of constraint kinds, identified by their wire name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    Always,
    Contains,
    Excludes,
    Match,
    Random,
    Rollout,
    Cron,
    LessThan,
    LessThanEqual,
    BiggerThan,
    BiggerThanEqual,
    Mod,
    Not,
    Intersection,
    Union,
}

impl ConstraintKind {
    pub const ALL: [Self; 15] = [
        Self::Always,
        Self::Contains,
        Self::Excludes,
        Self::Match,
        Self::Random,
        Self::Rollout,
        Self::Cron,
        Self::LessThan,
        Self::LessThanEqual,
        Self::BiggerThan,
        Self::BiggerThanEqual,
        Self::Mod,
        Self::Not,
        Self::Intersection,
        Self::Union,
    ];

    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Contains => "contains",
            Self::Excludes => "excludes",
            Self::Match => "match",
            Self::Random => "random",
            Self::Rollout => "rollout",
            Self::Cron => "cron",
            Self::LessThan => "<",
            Self::LessThanEqual => "<=",
            Self::BiggerThan => ">",
            Self::BiggerThanEqual => ">=",
            Self::Mod => "%",
            Self::Not => "!",
            Self::Intersection => "∩",
            Self::Union => "∪",
        }
    }

    /// Whether the kind is a leaf, i.e. it can be used as a named operand of a segment.
    #[inline]
    pub const fn is_basic(&self) -> bool {
        !matches!(self, Self::Not | Self::Intersection | Self::Union)
    }

    /// Decode the parameters and derive the internal state of a constraint of this kind.
    ///
    /// The nested constraints of the composite kinds are built through the registry, which
    /// means they are fully validated before the parent is.
    pub(crate) fn initialize(
        self,
        parameters: &Value,
        registry: &ConstraintRegistry,
    ) -> Result<Constraint, ConstraintError> {
        let constraint = match self {
            Self::Always => Constraint::Always,
            Self::Random => Constraint::Random,
            Self::Contains => Constraint::Contains(decode::<MembershipParameters>(self, parameters)?.into()),
            Self::Excludes => Constraint::Excludes(decode::<MembershipParameters>(self, parameters)?.into()),
            Self::Match => {
                let parameters: PatternParameters = decode(self, parameters)?;
                Constraint::Match(Pattern {
                    regex: Regex::new(&parameters.expression)?,
                    property: parameters.property,
                })
            }
            Self::Rollout => Constraint::Rollout(decode(self, parameters)?),
            Self::Cron => {
                let parameters: CronParameters = decode(self, parameters)?;
                Constraint::Cron(Recurrence {
                    schedule: schedule::parse_minutely(&parameters.expression)?,
                    expression: parameters.expression,
                    clock: registry.clock(),
                })
            }
            Self::LessThan => Constraint::LessThan(decode(self, parameters)?),
            Self::LessThanEqual => Constraint::LessThanEqual(decode(self, parameters)?),
            Self::BiggerThan => Constraint::BiggerThan(decode(self, parameters)?),
            Self::BiggerThanEqual => Constraint::BiggerThanEqual(decode(self, parameters)?),
            Self::Mod => Constraint::Mod(decode(self, parameters)?),
            Self::Not => {
                let parameters: NotParameters = decode(self, parameters)?;
                Constraint::Not(Box::new(registry.new_constraint(&parameters.constraint)?))
            }
            Self::Intersection => {
                let parameters: CompositeParameters = decode(self, parameters)?;
                Constraint::Intersection(build_all(&parameters.constraints, registry)?)
            }
            Self::Union => {
                let parameters: CompositeParameters = decode(self, parameters)?;
                Constraint::Union(build_all(&parameters.constraints, registry)?)
            }
        };

        Ok(constraint)
    }
}

impl FromStr for ConstraintKind {
    type Err = ConstraintError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| ConstraintError::InvalidName(name.to_owned()))
    }
}

impl Display for ConstraintKind {
    fn fmt(&self, formatter: &mut Formatter) -> std::fmt::Result {
        write!(formatter, "{}", self.name())
    }
}

fn decode<T: DeserializeOwned>(
    kind: ConstraintKind,
    parameters: &Value,
) -> Result<T, ConstraintError> {
    let decoded = if parameters.is_null() {
        T::deserialize(&Value::Object(Map::new()))
    } else {
        T::deserialize(parameters)
    };
    decoded.map_err(|source| ConstraintError::InvalidParameters {
        name: kind.name(),
        source,
    })
}

fn build_all(
    constraints: &[RawConstraint],
    registry: &ConstraintRegistry,
) -> Result<Vec<Constraint>, ConstraintError> {
    constraints
        .iter()
        .map(|raw| registry.new_constraint(raw))
        .collect()
}

/// The parameters of the `contains` and `excludes` constraints.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MembershipParameters {
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub property: String,
}

/// The parameters of the `match` constraint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternParameters {
    #[serde(rename = "expresion", alias = "expression", default)]
    pub expression: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub property: String,
}

/// The parameters of the `cron` constraint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CronParameters {
    #[serde(default)]
    pub expression: String,
}

/// The parameters of the `!` constraint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotParameters {
    pub constraint: RawConstraint,
}

/// The parameters of the `∩` and `∪` constraints.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeParameters {
    #[serde(default)]
    pub constraints: Vec<RawConstraint>,
}

/// An evaluable constraint.
///
/// Constraints are only produced by [`ConstraintRegistry::new_constraint()`], which decodes,
/// initializes and validates them. The composite kinds own their children, so a constraint is
/// always a tree.
#[derive(Clone, Debug)]
pub enum Constraint {
    Always,
    Contains(Membership),
    Excludes(Membership),
    Match(Pattern),
    Random,
    Rollout(Rollout),
    Cron(Recurrence),
    LessThan(Threshold),
    LessThanEqual(Threshold),
    BiggerThan(Threshold),
    BiggerThanEqual(Threshold),
    Mod(Modulo),
    Not(Box<Constraint>),
    Intersection(Vec<Constraint>),
    Union(Vec<Constraint>),
}

impl Constraint {
    pub const fn kind(&self) -> ConstraintKind {
        match self {
            Self::Always => ConstraintKind::Always,
            Self::Contains(_) => ConstraintKind::Contains,
            Self::Excludes(_) => ConstraintKind::Excludes,
            Self::Match(_) => ConstraintKind::Match,
            Self::Random => ConstraintKind::Random,
            Self::Rollout(_) => ConstraintKind::Rollout,
            Self::Cron(_) => ConstraintKind::Cron,
            Self::LessThan(_) => ConstraintKind::LessThan,
            Self::LessThanEqual(_) => ConstraintKind::LessThanEqual,
            Self::BiggerThan(_) => ConstraintKind::BiggerThan,
            Self::BiggerThanEqual(_) => ConstraintKind::BiggerThanEqual,
            Self::Mod(_) => ConstraintKind::Mod,
            Self::Not(_) => ConstraintKind::Not,
            Self::Intersection(_) => ConstraintKind::Intersection,
            Self::Union(_) => ConstraintKind::Union,
        }
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Check the parameters beyond what decoding them guarantees.
    pub fn validate(&self) -> Result<(), ConstraintError> {
        let invalid = |reason: String| {
            Err(ConstraintError::Validation {
                name: self.name(),
                reason,
            })
        };

        match self {
            Self::Contains(membership) | Self::Excludes(membership)
                if membership.values.len() < MIN_VALUES =>
            {
                invalid(format!("values must contain at least {MIN_VALUES} value"))
            }
            Self::Match(pattern) if pattern.regex.as_str().is_empty() => {
                invalid("expresion is required".to_owned())
            }
            Self::Rollout(rollout) if rollout.lower_bound >= rollout.upper_bound => {
                invalid("invalid rollout bound".to_owned())
            }
            Self::Rollout(rollout)
                if !(MIN_BOUND..=MAX_BOUND).contains(&rollout.lower_bound)
                    || !(MIN_BOUND..=MAX_BOUND).contains(&rollout.upper_bound) =>
            {
                invalid(format!(
                    "rollout bounds must be between {MIN_BOUND} and {MAX_BOUND}"
                ))
            }
            Self::Mod(modulo) if modulo.value < MIN_MODULUS => {
                invalid(format!("value must be at least {MIN_MODULUS}"))
            }
            Self::Intersection(constraints) | Self::Union(constraints)
                if constraints.len() < MIN_CONSTRAINTS =>
            {
                invalid(format!(
                    "constraints must contain at least {MIN_CONSTRAINTS} constraints"
                ))
            }
            _ => Ok(()),
        }
    }

    /// Evaluate the entity against the constraint.
    ///
    /// Evaluation is total: an unresolved property or a value that cannot be parsed as a number
    /// makes the constraint evaluate to `false`.
    pub fn evaluate(&self, entity: &Entity) -> bool {
        match self {
            Self::Always => true,
            Self::Random => rand::random(),
            Self::Contains(membership) => membership.resolve(entity) == Some(true),
            Self::Excludes(membership) => membership.resolve(entity) == Some(false),
            Self::Match(pattern) => pattern.evaluate(entity),
            Self::Rollout(rollout) => rollout.evaluate(entity),
            Self::Cron(recurrence) => recurrence.is_due(),
            Self::LessThan(threshold) => threshold.compare(entity, |actual, value| actual < value),
            Self::LessThanEqual(threshold) => {
                threshold.compare(entity, |actual, value| actual <= value)
            }
            Self::BiggerThan(threshold) => threshold.compare(entity, |actual, value| actual > value),
            Self::BiggerThanEqual(threshold) => {
                threshold.compare(entity, |actual, value| actual >= value)
            }
            Self::Mod(modulo) => modulo.evaluate(entity),
            Self::Not(constraint) => !constraint.evaluate(entity),
            Self::Intersection(constraints) => constraints.iter().all(|c| c.evaluate(entity)),
            Self::Union(constraints) => constraints.iter().any(|c| c.evaluate(entity)),
        }
    }
}

impl Display for Constraint {
    fn fmt(&self, formatter: &mut Formatter) -> std::fmt::Result {
        match self {
            Self::Always | Self::Random => write!(formatter, "{}", self.name()),
            Self::Contains(membership) | Self::Excludes(membership) => {
                write!(formatter, "{} {} {membership}", Property(&membership.property), self.name())
            }
            Self::Match(pattern) => {
                write!(formatter, "{} ~ /{}/", Property(&pattern.property), pattern.regex)
            }
            Self::Rollout(rollout) => write!(
                formatter,
                "rollout [{}, {}]",
                rollout.lower_bound, rollout.upper_bound
            ),
            Self::Cron(recurrence) => write!(formatter, "cron '{}'", recurrence.expression),
            Self::LessThan(threshold)
            | Self::LessThanEqual(threshold)
            | Self::BiggerThan(threshold)
            | Self::BiggerThanEqual(threshold) => write!(
                formatter,
                "{} {} {}",
                Property(&threshold.property),
                self.name(),
                threshold.value
            ),
            Self::Mod(modulo) => {
                write!(formatter, "{} % {} = 0", Property(&modulo.property), modulo.value)
            }
            Self::Not(constraint) => write!(formatter, "!{constraint}"),
            Self::Intersection(constraints) | Self::Union(constraints) => {
                let separator = format!(" {} ", self.name());
                write!(formatter, "({})", constraints.iter().join(&separator))
            }
        }
    }
}

struct Property<'a>(&'a str);

impl Display for Property<'_> {
    fn fmt(&self, formatter: &mut Formatter) -> std::fmt::Result {
        match self.0 {
            "" => write!(formatter, "id"),
            property => write!(formatter, "{property}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Membership {
    values: HashSet<String>,
    property: String,
}

impl Membership {
    /// Whether the resolved property is one of the values, `None` when it is unresolved.
    #[inline]
    fn resolve(&self, entity: &Entity) -> Option<bool> {
        entity
            .property(&self.property)
            .map(|value| self.values.contains(&*value))
    }
}

impl From<MembershipParameters> for Membership {
    fn from(parameters: MembershipParameters) -> Self {
        Self {
            values: parameters.values.into_iter().collect(),
            property: parameters.property,
        }
    }
}

impl Display for Membership {
    fn fmt(&self, formatter: &mut Formatter) -> std::fmt::Result {
        write!(formatter, "[{}]", self.values.iter().sorted().join(", "))
    }
}

#[derive(Clone, Debug)]
pub struct Pattern {
    regex: Regex,
    property: String,
}

impl Pattern {
    #[inline]
    fn evaluate(&self, entity: &Entity) -> bool {
        entity
            .property(&self.property)
            .is_some_and(|value| self.regex.is_match(&value))
    }
}

/// Deterministic percentage bucketing: the entity falls in the rollout when `id mod 100` is
/// within the inclusive bounds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rollout {
    #[serde(default)]
    pub lower_bound: i64,
    #[serde(default)]
    pub upper_bound: i64,
}

impl Rollout {
    #[inline]
    fn evaluate(&self, entity: &Entity) -> bool {
        let bucket = entity.id % BUCKETS;
        self.lower_bound <= bucket && bucket <= self.upper_bound
    }
}

/// A cron schedule that holds for the whole minute in which it fires.
#[derive(Clone, Debug)]
pub struct Recurrence {
    expression: String,
    schedule: cron::Schedule,
    clock: Arc<dyn Clock>,
}

impl Recurrence {
    fn is_due(&self) -> bool {
        let Some(now) = self
            .clock
            .now()
            .with_second(0)
            .and_then(|now| now.with_nanosecond(0))
        else {
            return false;
        };

        schedule::next_after(&self.schedule, &(now - Duration::minutes(1)))
            .is_some_and(|next| next == now)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub value: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub property: String,
}

impl Threshold {
    #[inline]
    fn compare<F>(&self, entity: &Entity, operator: F) -> bool
    where
        F: FnOnce(f64, f64) -> bool,
    {
        entity
            .property(&self.property)
            .and_then(|value| value.parse::<f64>().ok())
            .is_some_and(|actual| operator(actual, self.value))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Modulo {
    #[serde(default)]
    pub value: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub property: String,
}

impl Modulo {
    #[inline]
    fn evaluate(&self, entity: &Entity) -> bool {
        entity
            .property(&self.property)
            .and_then(|value| value.parse::<i64>().ok())
            .and_then(|actual| actual.checked_rem(self.value))
            .is_some_and(|remainder| remainder == 0)
    }
}
