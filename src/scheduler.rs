//! §4.9 Scheduler — runs the per-chunk pipeline across a `rayon` worker
//! pool, collecting results into a pre-sized array addressed by chunk
//! index so output ordering never depends on completion order or on the
//! (optional) dispatch-order shuffle.

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

use log::info;

/// Run `work` for every chunk `0..len`, in parallel, and return results
/// ordered by chunk index regardless of which worker finished first or of
/// `shuffle_dispatch`.
///
/// `shuffle_dispatch` randomises the order chunks are *handed out* to
/// workers (useful to avoid every worker racing for the same
/// straggler-heavy region of the genome first) without changing the
/// result ordering (§5).
pub fn run_chunks<T, F>(len: usize, shuffle_dispatch: bool, work: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync,
{
    let mut order: Vec<usize> = (0..len).collect();
    if shuffle_dispatch {
        let mut rng = SmallRng::seed_from_u64(0xC0FFEE);
        order.shuffle(&mut rng);
    }

    let completed = std::sync::atomic::AtomicUsize::new(0);
    let mut slots: Vec<Option<T>> = (0..len).map(|_| None).collect();

    let results: Vec<(usize, T)> = order
        .into_par_iter()
        .map(|chunk_index| {
            let result = work(chunk_index);
            let done = completed.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1;
            if done % 50 == 0 || done == len {
                info!("processed {done}/{len} chunks");
            }
            (chunk_index, result)
        })
        .collect();

    for (idx, result) in results {
        slots[idx] = Some(result);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| slot.unwrap_or_else(|| panic!("chunk {idx} never produced a result")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn results_are_ordered_by_chunk_index_regardless_of_dispatch_order() {
        let results = run_chunks(20, true, |i| i * i);
        let expected: Vec<usize> = (0..20).map(|i| i * i).collect();
        assert_eq!(results, expected);
    }

    #[test]
    fn shuffle_does_not_change_output_but_does_change_dispatch() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let results = run_chunks(10, false, move |i| {
            c.fetch_add(1, Ordering::Relaxed);
            i
        });
        assert_eq!(results, (0..10).collect::<Vec<_>>());
        assert_eq!(counter.load(Ordering::Relaxed), 10);
    }
}
