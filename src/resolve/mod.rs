// src/resolve/mod.rs
//! Link-resolution stages and the bounded worker pool they share. Workers
//! claim input indexes off an atomic cursor and write results back at the
//! claimed index, so the output sequence mirrors the input sequence no
//! matter which worker finishes first.

pub mod aggregator;
pub mod canonical;

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Apply an async transform to every item with at most `workers` in
/// flight. Every item is processed exactly once; output order equals
/// input order.
pub async fn map_indexed<T, F, Fut>(items: Vec<T>, workers: usize, f: F) -> Vec<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send,
{
    let total = items.len();
    if total == 0 {
        return items;
    }

    let input = Arc::new(items);
    let cursor = Arc::new(AtomicUsize::new(0));
    let slots: Arc<Vec<Mutex<Option<T>>>> =
        Arc::new((0..total).map(|_| Mutex::new(None)).collect());
    let f = Arc::new(f);

    let mut handles = Vec::new();
    for _ in 0..workers.clamp(1, total) {
        let input = Arc::clone(&input);
        let cursor = Arc::clone(&cursor);
        let slots = Arc::clone(&slots);
        let f = Arc::clone(&f);
        handles.push(tokio::spawn(async move {
            loop {
                let i = cursor.fetch_add(1, Ordering::SeqCst);
                if i >= total {
                    break;
                }
                let out = f(input[i].clone()).await;
                *slots[i].lock().expect("result slot poisoned") = Some(out);
            }
        }));
    }
    for h in handles {
        if let Err(e) = h.await {
            tracing::warn!(error = ?e, "resolution worker panicked");
        }
    }

    let input = Arc::clone(&input);
    slots
        .iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.lock()
                .expect("result slot poisoned")
                .take()
                // A panicked worker leaves its claimed slot empty; fall
                // back to the untouched input record.
                .unwrap_or_else(|| input[i].clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn output_order_mirrors_input_order() {
        let items: Vec<usize> = (0..100).collect();
        let out = map_indexed(items.clone(), 7, |i| async move {
            // Vary completion order.
            tokio::time::sleep(std::time::Duration::from_millis((i % 5) as u64)).await;
            i * 2
        })
        .await;
        assert_eq!(out, items.iter().map(|i| i * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn single_worker_and_empty_input_are_fine() {
        let out = map_indexed(Vec::<usize>::new(), 4, |i| async move { i }).await;
        assert!(out.is_empty());
        let out = map_indexed(vec![1, 2, 3], 1, |i| async move { i + 1 }).await;
        assert_eq!(out, vec![2, 3, 4]);
    }
}
