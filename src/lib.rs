//! A feature flag evaluation engine built on a small constraint expression language.
//!
//! A flag is an ordered list of segments. Each segment names a few constraints (`A`, `B`, ...),
//! combines them with an expression and assigns a variant to the entities matching it. The
//! [`Engine`] periodically loads the flags from a [`FlagRepository`], builds their constraint
//! trees once and then evaluates entities against them: the first matching segment of a flag
//! gives the entity its variant.
//!
//! # Examples
//!
//! ```
//! use flag_engine::{Engine, Entity, Flag, InMemoryFlagRepository, NoopResultLogger};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let segments = json!([
//!     {
//!         "description": "beta testers in Canada",
//!         "constraints": {
//!             "A": {"name": "contains", "parameters": {"values": ["CA"], "property": "country"}},
//!             "B": {"name": "rollout", "parameters": {"lower_bound": 0, "upper_bound": 49}}
//!         },
//!         "expression": "A ∩ B",
//!         "variant": {"variant_key": "enabled"}
//!     }
//! ]);
//! let flag = Flag {
//!     id: 1,
//!     tags: None,
//!     description: "new checkout".to_owned(),
//!     flag: "checkout.v2".to_owned(),
//!     segments: segments.to_string(),
//!     created_at: chrono::Utc::now(),
//!     deleted_at: None,
//! };
//!
//! let repository = Arc::new(InMemoryFlagRepository::new(vec![flag]));
//! let engine = Engine::new(repository, Arc::new(NoopResultLogger));
//! engine.fetch().await?;
//!
//! let entity = Entity::new(142, "user").with_context("country", "CA");
//! let result = engine.evaluate(&["checkout.v2"], &entity)?;
//! assert_eq!(Some("enabled"), result.variant("checkout.v2").map(|v| v.key.as_str()));
//!
//! let entity = Entity::new(175, "user").with_context("country", "CA");
//! let result = engine.evaluate(&["checkout.v2"], &entity)?;
//! assert!(result.evaluations.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! # Expressions
//!
//! Operands are single uppercase letters defined by the segment. The operators are:
//!
//! * `∩`: both constraints hold;
//! * `∪`: any of the constraints holds;
//! * `!` (or `¬`): the constraint does not hold.
//!
//! `!` binds tighter than `∩` which binds tighter than `∪`, and parentheses group
//! sub-expressions: `¬(A ∩ B) ∪ C`.
//!
//! # Constraints
//!
//! | Name | Parameters | Holds when |
//! |---|---|---|
//! | `always` | | always |
//! | `random` | | on a random draw |
//! | `contains` | `values`, `property` | the property is one of the values |
//! | `excludes` | `values`, `property` | the property is resolved and is not one of the values |
//! | `match` | `expresion`, `property` | the property matches the regular expression |
//! | `rollout` | `lower_bound`, `upper_bound` | `id mod 100` is within the bounds |
//! | `cron` | `expression` | the current minute is scheduled by the cron expression |
//! | `<`, `<=`, `>`, `>=` | `value`, `property` | the property compares with the value |
//! | `%` | `value`, `property` | the property is a multiple of the value |
//! | `!` | `constraint` | the nested constraint does not hold |
//! | `∩`, `∪` | `constraints` | all or any of the nested constraints hold |
//!
//! An empty property resolves to the entity ID, `type` to the entity type and any other name to
//! the entity context. A constraint on an unresolved property does not hold.
mod clock;
mod config;
mod constraints;
mod definition;
mod engine;
mod entity;
mod error;
mod evaluation;
mod lexer;
mod model;
mod parser;
mod registry;
mod repository;
mod schedule;
mod scheduler;
#[cfg(test)]
mod test_utils;

pub use crate::{
    clock::{Clock, FixedClock, SystemClock},
    config::{
        ConfigError, EngineConfig, EngineConfigLayer, EvaluationLogConfig,
        EvaluationLogConfigLayer,
    },
    constraints::{
        CompositeParameters, Constraint, ConstraintKind, CronParameters, Membership,
        MembershipParameters, Modulo, NotParameters, Pattern, PatternParameters, Recurrence,
        Rollout, Threshold,
    },
    definition::FlagDefinition,
    engine::{Engine, FetchSummary, Snapshot},
    entity::{Entity, ENTITY_TYPE_PROPERTY},
    error::{ConstraintError, DefinitionError, EngineError, ExpressionError},
    evaluation::{
        Evaluation, EvaluationResult, JsonLinesResultLogger, NoopResultLogger, ResultLogger,
    },
    lexer::LexicalError,
    model::{Flag, RawConstraint, Segment, Variant},
    parser::parse,
    registry::ConstraintRegistry,
    repository::{FlagRepository, InMemoryFlagRepository, JsonFileFlagRepository, RepositoryError},
    schedule::ScheduleError,
    scheduler::RefreshScheduler,
};
