//! Instance ID allocation.
//!
//! A single counter cell at [`keys::instance_max_key`] holds the next
//! unallocated ID. A missing cell means no ID was ever handed out.

use crate::context::WriteContext;
use crate::error::CoreResult;
use crate::keys;
use crate::types::InstanceId;
use crate::value::{decode_counter, encode_counter};
use nestdb_storage::Snapshot;
use tracing::debug;

/// Hands out the next instance ID and advances the counter.
///
/// This is a plain read-modify-write through `ctx`. It is only safe while the
/// caller holds the database writer lock, which both context kinds do.
pub(crate) fn allocate(ctx: &mut dyn WriteContext) -> CoreResult<InstanceId> {
    let key = keys::instance_max_key();
    let id = match ctx.get(&key)? {
        Some(bytes) => InstanceId::new(decode_counter(&bytes, "instance counter")?),
        None => InstanceId::FIRST,
    };
    ctx.put(key, encode_counter(id.as_u64() + 1))?;
    debug!(instance = %id, "allocated map instance");
    Ok(id)
}

/// Returns the ID the allocator would hand out next, as of `snapshot`.
///
/// # Errors
///
/// Returns an error if the counter cell cannot be read or is malformed.
pub fn next_instance_id(snapshot: &Snapshot) -> CoreResult<InstanceId> {
    match snapshot.get(&keys::instance_max_key())? {
        Some(bytes) => Ok(InstanceId::new(decode_counter(&bytes, "instance counter")?)),
        None => Ok(InstanceId::FIRST),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    #[test]
    fn first_allocation_is_one() {
        let db = Database::open_in_memory();
        let mut ctx = db.direct();
        assert_eq!(allocate(&mut ctx).unwrap(), InstanceId::new(1));
        drop(ctx);

        assert_eq!(
            next_instance_id(&db.snapshot()).unwrap(),
            InstanceId::new(2)
        );
    }

    #[test]
    fn sequential_allocations_strictly_increase() {
        let db = Database::open_in_memory();
        let mut ctx = db.direct();
        let ids: Vec<_> = (0..16).map(|_| allocate(&mut ctx).unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ids.first(), Some(&InstanceId::new(1)));
        assert_eq!(ids.last(), Some(&InstanceId::new(16)));
    }

    #[test]
    fn allocations_in_one_batch_are_distinct() {
        let db = Database::open_in_memory();
        let mut batch = db.batch();
        let a = allocate(&mut batch).unwrap();
        let b = allocate(&mut batch).unwrap();
        assert_ne!(a, b);

        // Nothing is visible before apply.
        assert_eq!(
            next_instance_id(&db.engine().snapshot()).unwrap(),
            InstanceId::FIRST
        );
        batch.apply().unwrap();
        assert_eq!(
            next_instance_id(&db.snapshot()).unwrap(),
            InstanceId::new(3)
        );
    }

    #[test]
    fn stored_counter_is_returned_then_advanced() {
        let db = Database::open_in_memory();
        db.engine()
            .put(&keys::instance_max_key(), &encode_counter(40))
            .unwrap();

        let mut ctx = db.direct();
        assert_eq!(allocate(&mut ctx).unwrap(), InstanceId::new(40));
        drop(ctx);
        assert_eq!(
            next_instance_id(&db.snapshot()).unwrap(),
            InstanceId::new(41)
        );
    }

    #[test]
    fn malformed_counter_is_decode_error() {
        let db = Database::open_in_memory();
        db.engine().put(&keys::instance_max_key(), &[1, 2]).unwrap();

        let mut ctx = db.direct();
        assert!(matches!(
            allocate(&mut ctx),
            Err(crate::CoreError::Decode { .. })
        ));
    }
}
