// Path: crates/consensus/src/operation.rs
//! Applies one operation to the state pool of the block being built.

use isaac_api::state::StateReader;
use isaac_state::pool::{PoolError, StatePool};
use isaac_types::app::{Number, Operation, OperationFact, Value};
use isaac_types::error::ProcessorError;

/// Applies `op` to `pool`.
///
/// Returns `Ok(false)` when the operation is rejected; the block still
/// lists it, outside of the state. Storage failures abort the block.
pub async fn process_operation<R: StateReader>(
    pool: &StatePool<R>,
    op: &Operation,
) -> Result<bool, ProcessorError> {
    let fact = op.fact_hash();
    let current = match pool.get(op.fact().key()).await {
        Ok(st) => st,
        Err(PoolError::Storage(e)) => return Err(e.into()),
        Err(PoolError::State(e)) => {
            tracing::debug!(target: "processor", fact = %fact, error = %e, "operation rejected");
            return Ok(false);
        }
    };

    let value = match op.fact() {
        OperationFact::KeyValue { value, .. } => Value::bytes(value.clone()),
        OperationFact::Increment { amount, .. } => {
            let base = match current.value() {
                None => 0,
                Some(Value::Number(n)) => match n.value() {
                    Number::Int(v) => v,
                    _ => return Ok(reject(op, "not a signed number")),
                },
                Some(_) => return Ok(reject(op, "not a number")),
            };
            match base.checked_add(*amount) {
                Some(v) => Value::int(v),
                None => return Ok(reject(op, "overflow")),
            }
        }
    };

    match pool.set(fact, vec![current.set_value(Some(value))]).await {
        Ok(()) => Ok(true),
        Err(PoolError::Storage(e)) => Err(e.into()),
        Err(PoolError::State(e)) => {
            tracing::debug!(target: "processor", fact = %fact, error = %e, "operation rejected");
            Ok(false)
        }
    }
}

fn reject(op: &Operation, reason: &str) -> bool {
    tracing::debug!(
        target: "processor",
        fact = %op.fact_hash(),
        key = op.fact().key(),
        reason,
        "operation rejected"
    );
    false
}
