//! Relationship tuples and the non-transactional batched writer.

use crate::backend::RelationshipStore;
use crate::error::{OpenFgaError, TupleFailure};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

/// A `(user, relation, object)` relationship tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleKey {
    pub user: String,
    pub relation: String,
    pub object: String,
}

impl TupleKey {
    pub fn new(
        user: impl Into<String>,
        relation: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            relation: relation.into(),
            object: object.into(),
        }
    }
}

/// Tuning for [`write_tuples`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Maximum number of write requests in flight at once.
    pub max_parallel_requests: usize,
    /// Maximum number of tuples sent in a single write request.
    pub max_per_chunk: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            max_parallel_requests: 5,
            max_per_chunk: 50,
        }
    }
}

enum Batch {
    Write(Vec<TupleKey>),
    Delete(Vec<TupleKey>),
}

impl Batch {
    fn failures(self, message: &str) -> Vec<TupleFailure> {
        let (operation, tuples) = match self {
            Batch::Write(tuples) => ("write", tuples),
            Batch::Delete(tuples) => ("delete", tuples),
        };

        tuples
            .into_iter()
            .map(|tuple| TupleFailure {
                operation,
                user: tuple.user,
                relation: tuple.relation,
                object: tuple.object,
                message: message.to_string(),
            })
            .collect()
    }
}

/// Apply `writes` and `deletes` without a transaction.
///
/// Tuples are split into chunks of at most `max_per_chunk`; each chunk is a
/// separate write request and at most `max_parallel_requests` run at once.
/// A rejected chunk does not stop the others. Every tuple of every rejected
/// chunk is reported in the returned [`OpenFgaError::TupleFailures`].
pub async fn write_tuples(
    store: &dyn RelationshipStore,
    writes: Vec<TupleKey>,
    deletes: Vec<TupleKey>,
    options: WriteOptions,
) -> Result<(), OpenFgaError> {
    let chunk_size = options.max_per_chunk.max(1);
    let parallel = options.max_parallel_requests.max(1);

    let batches: Vec<Batch> = writes
        .chunks(chunk_size)
        .map(|chunk| Batch::Write(chunk.to_vec()))
        .chain(deletes.chunks(chunk_size).map(|chunk| Batch::Delete(chunk.to_vec())))
        .collect();

    let results: Vec<(Batch, Result<(), OpenFgaError>)> = stream::iter(batches)
        .map(|batch| async move {
            let result = match &batch {
                Batch::Write(tuples) => store.write(tuples, &[]).await,
                Batch::Delete(tuples) => store.write(&[], tuples).await,
            };
            (batch, result)
        })
        .buffer_unordered(parallel)
        .collect()
        .await;

    let failures: Vec<TupleFailure> = results
        .into_iter()
        .filter_map(|(batch, result)| result.err().map(|err| batch.failures(&err.to_string())))
        .flatten()
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(OpenFgaError::TupleFailures(failures))
    }
}
