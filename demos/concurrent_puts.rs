use salient::ConcurrentMap;

use std::{sync::Arc, thread};

fn value(n: usize) -> String {
    format!("value {n}")
}

fn main() {
    const NUM_THREADS: usize = 16;
    const NUM_KEYS_PER_THREAD: usize = 1_024;

    // Start small so that the map resizes while the threads are running.
    let map = Arc::new(ConcurrentMap::with_capacity(2));

    let threads: Vec<_> = (0..NUM_THREADS)
        .map(|i| {
            let my_map = Arc::clone(&map);
            let start = i * NUM_KEYS_PER_THREAD;
            let end = (i + 1) * NUM_KEYS_PER_THREAD;

            thread::spawn(move || {
                for key in start..end {
                    my_map.put(key, value(key));
                    // get() returns Option<String>, a clone of the stored value.
                    assert_eq!(my_map.get(&key), Some(value(key)));
                }
            })
        })
        .collect();

    // Wait for all threads to complete.
    threads.into_iter().for_each(|t| t.join().expect("Failed"));

    // Verify the result.
    assert_eq!(map.size(), NUM_THREADS * NUM_KEYS_PER_THREAD);
    for key in 0..(NUM_THREADS * NUM_KEYS_PER_THREAD) {
        assert_eq!(map.get(&key), Some(value(key)));
    }

    println!("{} entries in {} buckets", map.size(), map.capacity());
}
