use crate::{entity::Entity, model::Variant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{io, path::Path};
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc::{self, error::TrySendError, Receiver, Sender},
    task::JoinHandle,
};
use tracing::{error, warn};

/// The variant an entity got for one flag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub flag: String,
    pub variant: Variant,
}

/// The outcome of evaluating one entity against a set of flags.
///
/// Only the flags for which a segment matched have an evaluation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub entity: Entity,
    pub evaluations: Vec<Evaluation>,
    pub timestamp: DateTime<Utc>,
}

impl EvaluationResult {
    /// The variant assigned for the flag, if any segment matched.
    pub fn variant(&self, flag: &str) -> Option<&Variant> {
        self.evaluations
            .iter()
            .find(|evaluation| evaluation.flag == flag)
            .map(|evaluation| &evaluation.variant)
    }
}

/// Sink for the evaluation results.
///
/// Logging is fire and forget: implementations must neither block nor report failures to
/// the caller.
pub trait ResultLogger: Send + Sync {
    fn log(&self, result: &EvaluationResult);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopResultLogger;

impl ResultLogger for NoopResultLogger {
    #[inline]
    fn log(&self, _: &EvaluationResult) {}
}

/// Write each evaluation result as a JSON line from a background task.
///
/// Results are handed to the task through a bounded queue; when it is full the result is
/// dropped. The task stops once the logger is dropped and returns the writer.
#[derive(Clone, Debug)]
pub struct JsonLinesResultLogger {
    sender: Sender<EvaluationResult>,
}

impl JsonLinesResultLogger {
    /// Spawn the writing task on the current Tokio runtime.
    pub fn spawn<W>(writer: W, capacity: usize) -> (Self, JoinHandle<W>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(write_lines(writer, receiver));
        (Self { sender }, handle)
    }

    /// Append the results to the file at `path`, creating it and its parent directories.
    pub async fn open(
        path: impl AsRef<Path>,
        capacity: usize,
    ) -> io::Result<(Self, JoinHandle<File>)> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self::spawn(file, capacity))
    }
}

impl ResultLogger for JsonLinesResultLogger {
    fn log(&self, result: &EvaluationResult) {
        match self.sender.try_send(result.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(result)) => warn!(
                entity_id = result.entity.id,
                "evaluation log queue is full, dropping the result"
            ),
            Err(TrySendError::Closed(_)) => error!("evaluation log writer has stopped"),
        }
    }
}

async fn write_lines<W>(mut writer: W, mut receiver: Receiver<EvaluationResult>) -> W
where
    W: AsyncWrite + Unpin,
{
    while let Some(result) = receiver.recv().await {
        let mut line = match serde_json::to_vec(&result) {
            Ok(line) => line,
            Err(error) => {
                error!(%error, "failed to serialize the evaluation result");
                continue;
            }
        };
        line.push(b'\n');

        if let Err(error) = writer.write_all(&line).await {
            error!(%error, "failed to write the evaluation result");
            continue;
        }
        if let Err(error) = writer.flush().await {
            error!(%error, "failed to flush the evaluation log");
        }
    }

    writer
}
