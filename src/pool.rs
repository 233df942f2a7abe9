//! Capped fan-out over blocking work

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::channel;
use std::thread;

/// Apply `f` to every item on at most `cap` worker threads
///
/// Results come back in input order. Workers pull the next index from a
/// shared counter, so a slow item never holds up the rest of the batch.
pub fn bounded_map<T, R, F>(items: &[T], cap: usize, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    if items.is_empty() {
        return Vec::new();
    }

    let workers = cap.max(1).min(items.len());
    let next = AtomicUsize::new(0);
    let (sender, receiver) = channel();

    thread::scope(|scope| {
        for _ in 0..workers {
            let sender = sender.clone();
            let next = &next;
            let f = &f;
            scope.spawn(move || loop {
                let index = next.fetch_add(1, Ordering::Relaxed);
                let Some(item) = items.get(index) else {
                    break;
                };
                if sender.send((index, f(item))).is_err() {
                    break;
                }
            });
        }
    });
    drop(sender);

    let mut slots: Vec<Option<R>> = (0..items.len()).map(|_| None).collect();
    for (index, result) in receiver {
        slots[index] = Some(result);
    }
    slots.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_preserves_input_order() {
        let items: Vec<u64> = (0..20).collect();
        let results = bounded_map(&items, 4, |n| {
            // Later items finish first
            thread::sleep(Duration::from_millis(20 - n));
            n * 2
        });
        assert_eq!(results, items.iter().map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_never_exceeds_cap() {
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let items: Vec<u32> = (0..30).collect();

        bounded_map(&items, 5, |_| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            active.fetch_sub(1, Ordering::SeqCst);
        });

        assert!(peak.load(Ordering::SeqCst) <= 5);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_empty_and_zero_cap() {
        let empty: Vec<u8> = Vec::new();
        assert!(bounded_map(&empty, 3, |b| *b).is_empty());
        // A zero cap still makes progress on one worker
        assert_eq!(bounded_map(&[1, 2, 3], 0, |n| n + 1), vec![2, 3, 4]);
    }
}
