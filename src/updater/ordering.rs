use crate::channel::Stamped;

/// Keep in `collected` only the records that continue the global sequence at
/// `next_seq`, in sequence order, and move the rest to `deferred`.
///
/// Channels are drained one at a time, so a pass can see record N+1 while N
/// is already submitted to another channel but not yet visible. The gap is
/// always filled by a later pass.
pub(crate) fn take_in_sequence<U>(
    collected: &mut Vec<Stamped<U>>,
    next_seq: &mut u64,
    deferred: &mut Vec<Stamped<U>>,
) {
    collected.sort_unstable_by_key(|record| record.seq);

    let mut expected = *next_seq;
    let mut run = 0;
    for record in collected.iter() {
        if record.seq != expected {
            break;
        }
        expected += 1;
        run += 1;
    }

    deferred.extend(collected.drain(run..));
    *next_seq = expected;
}
