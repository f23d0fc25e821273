use std::sync::Mutex;

use tokio::time::{Instant, sleep};

use super::*;

type Calls = Arc<Mutex<Vec<(u32, Instant)>>>;

fn recorder() -> (Calls, impl Fn(u32) + Send + Sync + 'static) {
    let calls: Calls = Arc::default();
    let sink = Arc::clone(&calls);
    (calls, move |n| sink.lock().unwrap().push((n, Instant::now())))
}

#[tokio::test(start_paused = true)]
async fn burst_runs_once_with_last_args() {
    let (calls, f) = recorder();
    let debounced = debounce(f, Duration::from_millis(100));

    let mut last = None;
    for n in 1..=5 {
        debounced.call(n);
        last = Some(Instant::now());
        sleep(Duration::from_millis(2)).await;
    }
    sleep(Duration::from_millis(200)).await;

    let calls = calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    let (arg, at) = calls[0];
    assert_eq!(arg, 5);
    assert!(at.duration_since(last.unwrap()) >= Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn nothing_runs_before_delay() {
    let (calls, f) = recorder();
    let debounced = debounce(f, Duration::from_millis(100));

    debounced.call(1);
    sleep(Duration::from_millis(99)).await;
    assert!(calls.lock().unwrap().is_empty());
    assert!(debounced.is_pending());

    sleep(Duration::from_millis(2)).await;
    assert_eq!(calls.lock().unwrap().len(), 1);
    assert!(!debounced.is_pending());
}

#[tokio::test(start_paused = true)]
async fn separated_calls_each_run() {
    let (calls, f) = recorder();
    let debounced = debounce(f, Duration::from_millis(50));

    debounced.call(1);
    sleep(Duration::from_millis(80)).await;
    debounced.call(2);
    sleep(Duration::from_millis(80)).await;

    let args: Vec<u32> = calls.lock().unwrap().iter().map(|(n, _)| *n).collect();
    assert_eq!(args, vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn cancel_releases_pending_call() {
    let (calls, f) = recorder();
    let debounced = debounce(f, Duration::from_millis(100));

    assert!(!debounced.cancel());
    debounced.call(1);
    assert!(debounced.cancel());
    assert!(!debounced.is_pending());
    sleep(Duration::from_millis(200)).await;
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn drop_cancels_pending_call() {
    let (calls, f) = recorder();
    let debounced = debounce(f, Duration::from_millis(100));
    assert_eq!(debounced.delay(), Duration::from_millis(100));

    debounced.call(1);
    drop(debounced);
    sleep(Duration::from_millis(200)).await;
    assert!(calls.lock().unwrap().is_empty());
}
