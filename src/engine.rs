use crate::{
    clock::Clock,
    constraints::Constraint,
    entity::Entity,
    error::EngineError,
    evaluation::{Evaluation, EvaluationResult, ResultLogger},
    model::{Flag, Variant},
    parser,
    registry::ConstraintRegistry,
    repository::FlagRepository,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};
use tracing::{error, info, instrument, warn};

#[derive(Debug)]
struct FlagSegment {
    constraint: Constraint,
    variant: Variant,
}

#[derive(Debug, Default)]
struct FlagItem {
    segments: Vec<FlagSegment>,
}

impl FlagItem {
    /// The variant of the first segment matching the entity.
    #[inline]
    fn evaluate(&self, entity: &Entity) -> Option<&Variant> {
        self.segments
            .iter()
            .find(|segment| segment.constraint.evaluate(entity))
            .map(|segment| &segment.variant)
    }
}

/// An immutable view of every built flag, as of one fetch.
#[derive(Debug)]
pub struct Snapshot {
    flags: HashMap<String, FlagItem>,
    fetched_at: DateTime<Utc>,
}

impl Snapshot {
    #[inline]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn contains(&self, flag: &str) -> bool {
        self.flags.contains_key(flag)
    }

    /// The number of segments that were successfully built for the flag.
    pub fn segment_count(&self, flag: &str) -> Option<usize> {
        self.flags.get(flag).map(|item| item.segments.len())
    }

    pub fn flag_names(&self) -> impl Iterator<Item = &str> {
        self.flags.keys().map(String::as_str)
    }

    #[inline]
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

/// Counters of a successful fetch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub flags: usize,
    pub segments: usize,
    pub skipped_flags: usize,
    pub skipped_segments: usize,
}

/// Evaluate entities against the flags of a periodically rebuilt snapshot.
///
/// [`Engine::fetch()`] builds a complete snapshot from the repository before publishing it, so
/// evaluations only ever see a whole snapshot. Evaluations share the snapshot and only hold the
/// lock long enough to clone its reference.
pub struct Engine {
    repository: Arc<dyn FlagRepository>,
    logger: Arc<dyn ResultLogger>,
    registry: ConstraintRegistry,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
}

impl Engine {
    pub fn new(repository: Arc<dyn FlagRepository>, logger: Arc<dyn ResultLogger>) -> Self {
        Self::with_registry(repository, logger, ConstraintRegistry::default())
    }

    pub fn with_registry(
        repository: Arc<dyn FlagRepository>,
        logger: Arc<dyn ResultLogger>,
        registry: ConstraintRegistry,
    ) -> Self {
        Self {
            repository,
            logger,
            registry,
            snapshot: RwLock::new(None),
        }
    }

    /// Load every flag from the repository and replace the snapshot.
    ///
    /// Flags whose segments cannot be decoded are skipped, as are the segments whose expression
    /// cannot be parsed or whose constraint cannot be built. A failing repository leaves the
    /// current snapshot in place.
    #[instrument(skip(self))]
    pub async fn fetch(&self) -> Result<FetchSummary, EngineError> {
        let flags = self.repository.find_all().await?;

        let mut summary = FetchSummary::default();
        let mut items = HashMap::with_capacity(flags.len());
        for flag in &flags {
            match self.build_flag(flag, &mut summary) {
                Some(item) => {
                    summary.segments += item.segments.len();
                    items.insert(flag.flag.clone(), item);
                }
                None => summary.skipped_flags += 1,
            }
        }
        summary.flags = items.len();

        let snapshot = Snapshot {
            flags: items,
            fetched_at: self.registry.clock().now(),
        };
        *self.snapshot.write() = Some(Arc::new(snapshot));

        info!(
            flags = summary.flags,
            segments = summary.segments,
            skipped_flags = summary.skipped_flags,
            skipped_segments = summary.skipped_segments,
            "flags fetched"
        );
        Ok(summary)
    }

    fn build_flag(&self, flag: &Flag, summary: &mut FetchSummary) -> Option<FlagItem> {
        let segments = match flag.decode_segments() {
            Ok(segments) => segments,
            Err(error) => {
                error!(
                    flag = %flag.flag,
                    flag_id = flag.id,
                    %error,
                    "failed to decode the flag segments"
                );
                return None;
            }
        };

        let mut item = FlagItem::default();
        for (index, segment) in segments.into_iter().enumerate() {
            let constraint = match parser::parse(&segment.expression, &segment.constraints) {
                Ok(raw) => self.registry.new_constraint(&raw),
                Err(error) => {
                    error!(
                        flag = %flag.flag,
                        flag_id = flag.id,
                        segment = index,
                        %error,
                        "failed to parse the segment expression"
                    );
                    summary.skipped_segments += 1;
                    continue;
                }
            };

            match constraint {
                Ok(constraint) => item.segments.push(FlagSegment {
                    constraint,
                    variant: segment.variant,
                }),
                Err(error) => {
                    error!(
                        flag = %flag.flag,
                        flag_id = flag.id,
                        segment = index,
                        %error,
                        "failed to build the segment constraint"
                    );
                    summary.skipped_segments += 1;
                }
            }
        }

        Some(item)
    }

    /// The clock used to stamp the results and to evaluate the time-dependent constraints.
    #[inline]
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.registry.clock()
    }

    /// The current snapshot, `None` until the first successful fetch.
    #[inline]
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.read().clone()
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.snapshot.read().is_some()
    }

    /// Evaluate the entity against the requested flags, or every flag when none is requested.
    ///
    /// The segments of a flag are evaluated in order and the first match gives the flag its
    /// variant. Flags that are unknown or that no segment matched are left out of the result.
    pub fn evaluate<S>(&self, flags: &[S], entity: &Entity) -> Result<EvaluationResult, EngineError>
    where
        S: AsRef<str>,
    {
        let snapshot = self.snapshot().ok_or(EngineError::NotReady)?;
        let result = self.evaluate_snapshot(&snapshot, flags, entity);
        self.logger.log(&result);
        Ok(result)
    }

    /// Evaluate each entity independently against the same snapshot.
    pub fn evaluate_batch<S>(
        &self,
        flags: &[S],
        entities: &[Entity],
    ) -> Result<Vec<EvaluationResult>, EngineError>
    where
        S: AsRef<str>,
    {
        let snapshot = self.snapshot().ok_or(EngineError::NotReady)?;
        Ok(entities
            .iter()
            .map(|entity| {
                let result = self.evaluate_snapshot(&snapshot, flags, entity);
                self.logger.log(&result);
                result
            })
            .collect())
    }

    fn evaluate_snapshot<S>(&self, snapshot: &Snapshot, flags: &[S], entity: &Entity) -> EvaluationResult
    where
        S: AsRef<str>,
    {
        let mut evaluations = Vec::new();
        let mut evaluate = |name: &str, item: &FlagItem| {
            if let Some(variant) = item.evaluate(entity) {
                evaluations.push(Evaluation {
                    flag: name.to_owned(),
                    variant: variant.clone(),
                });
            }
        };

        if flags.is_empty() {
            for (name, item) in &snapshot.flags {
                evaluate(name.as_str(), item);
            }
        } else {
            for name in flags {
                let name: &str = name.as_ref();
                match snapshot.flags.get(name) {
                    Some(item) => evaluate(name, item),
                    None => warn!(flag = name, "failed to find the flag for evaluation"),
                }
            }
        }

        EvaluationResult {
            entity: entity.clone(),
            evaluations,
            timestamp: self.registry.clock().now(),
        }
    }
}
