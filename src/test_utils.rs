use std::sync::mpsc::channel;
use std::thread;
use std::time::Duration;

use crate::tree::TreeStore;

/// Level-order names used by the default configuration and most tests
pub const WORLD: [&str; 7] = ["World", "Asia", "Africa", "China", "India", "SouthAfrica", "Egypt"];

/// Run a closure and return Err if it doesn't complete within `secs` seconds.
/// Intended for use in tests to avoid hanging forever when something deadlocks.
pub fn run_with_timeout<F, T>(secs: u64, f: F) -> Result<T, &'static str>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = channel();
    thread::spawn(move || {
        let res = f();
        let _ = tx.send(res);
    });

    match rx.recv_timeout(Duration::from_secs(secs)) {
        Ok(v) => Ok(v),
        Err(_) => Err("timed out"),
    }
}

/// World -> {Asia, Africa}, Asia -> {China, India}, Africa -> {SouthAfrica, Egypt}
pub fn world_tree() -> TreeStore {
    match TreeStore::from_level_order(&WORLD, 2) {
        Ok(tree) => tree,
        Err(e) => panic!("fixture tree is malformed: {}", e),
    }
}

/// Complete `branching`-ary tree with `n` nodes named `n0`, `n1`, ...
pub fn numbered_tree(n: usize, branching: usize) -> TreeStore {
    let names: Vec<String> = (0..n).map(|i| format!("n{}", i)).collect();
    match TreeStore::from_level_order(&names, branching) {
        Ok(tree) => tree,
        Err(e) => panic!("fixture tree is malformed: {}", e),
    }
}
