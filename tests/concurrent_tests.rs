//! Concurrent styles: ordering, overlap, caps, budgets, shutdown and
//! failure delivery through the SVar.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};
use std::thread;
use std::time::{Duration, Instant};

use rill::{SVar, Step, Stream, StreamOpts, Style, combine, pull_stream, push_stream};

/// A producer that sleeps, then yields a single value.
fn sleepy(value: u32, delay_ms: u64) -> Stream<u32> {
    Stream::from_step(move || {
        thread::sleep(Duration::from_millis(delay_ms));
        Ok(Step::Single(value))
    })
}

fn three_sleepers(style: Style) -> Stream<u32> {
    combine(
        style,
        sleepy(1, 600),
        combine(style, sleepy(2, 400), sleepy(3, 200)),
    )
}

#[test]
fn ahead_restores_source_order_and_overlaps() {
    rill::utils::setup_logging(false);
    let started = Instant::now();
    let vals = three_sleepers(Style::Ahead).to_vec().unwrap();
    let elapsed = started.elapsed();
    assert_eq!(vals, vec![1, 2, 3]);
    // Serial would take 1.2s; the sleeps must have overlapped.
    assert!(elapsed < Duration::from_millis(1100), "took {elapsed:?}");
    assert!(elapsed >= Duration::from_millis(550), "took {elapsed:?}");
}

#[test]
fn async_emits_in_arrival_order() {
    let vals = three_sleepers(Style::Async).to_vec().unwrap();
    let mut sorted = vals.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![1, 2, 3]);
}

#[test]
fn ahead_output_equals_serial_output() {
    let build = |style| {
        combine(
            style,
            Stream::from_iter(0..10),
            combine(style, Stream::from_iter(10..20), Stream::from_iter(20..30)),
        )
    };
    let serial = build(Style::Serial).to_vec().unwrap();
    let ahead = build(Style::Ahead).to_vec().unwrap();
    assert_eq!(ahead, serial);
}

#[test]
fn concurrent_styles_preserve_the_value_multiset() {
    for style in [Style::Async, Style::WAsync, Style::Parallel] {
        let s = combine(
            style,
            Stream::from_iter(0..50),
            Stream::from_iter(50..100),
        );
        let mut vals = s.to_vec().unwrap();
        vals.sort_unstable();
        assert_eq!(vals, (0..100).collect::<Vec<_>>(), "style {style:?}");
    }
}

#[test]
fn parallel_respects_the_thread_cap() {
    let chain = combine(
        Style::Parallel,
        sleepy(1, 400),
        combine(
            Style::Parallel,
            sleepy(2, 400),
            combine(
                Style::Parallel,
                sleepy(3, 400),
                combine(Style::Parallel, sleepy(4, 400), sleepy(5, 400)),
            ),
        ),
    );
    let started = Instant::now();
    let mut vals = chain.max_threads(2).to_vec().unwrap();
    let elapsed = started.elapsed();
    vals.sort_unstable();
    assert_eq!(vals, vec![1, 2, 3, 4, 5]);
    // Five 400ms producers over two workers need three waves.
    assert!(elapsed >= Duration::from_millis(1000), "took {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1900), "took {elapsed:?}");
}

#[test]
fn worker_count_stays_under_the_cap() {
    let live = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let producer = |value: u32| {
        let live = Arc::clone(&live);
        let peak = Arc::clone(&peak);
        Stream::from_step(move || {
            let now = live.fetch_add(1, SeqCst) + 1;
            peak.fetch_max(now, SeqCst);
            thread::sleep(Duration::from_millis(50));
            live.fetch_sub(1, SeqCst);
            Ok(Step::Single(value))
        })
    };
    let mut chain = producer(0);
    for v in 1..6 {
        chain = combine(Style::Async, chain, producer(v));
    }
    let mut vals = chain.max_threads(2).to_vec().unwrap();
    vals.sort_unstable();
    assert_eq!(vals, vec![0, 1, 2, 3, 4, 5]);
    assert!(peak.load(SeqCst) <= 2, "peak workers {}", peak.load(SeqCst));
}

#[test]
fn ahead_survives_a_tiny_buffer() {
    let s = combine(
        Style::Ahead,
        Stream::from_iter(0..40),
        Stream::from_iter(40..80),
    )
    .max_buffer(4);
    assert_eq!(s.to_vec().unwrap(), (0..80).collect::<Vec<_>>());
}

#[test]
fn yield_budget_ends_an_infinite_stream() {
    let s = combine(
        Style::Ahead,
        Stream::unfold(0u64, |n| Some((n, n + 1))),
        Stream::unfold(1_000_000u64, |n| Some((n, n + 1))),
    )
    .max_yields(Some(5));
    assert_eq!(s.to_vec().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn zero_budget_yields_nothing() {
    let s = combine(Style::Async, Stream::once(1), Stream::once(2)).max_yields(Some(0));
    assert_eq!(s.to_vec().unwrap(), Vec::<u32>::new());
}

#[test]
fn failure_arrives_after_the_values_before_it() {
    let failing: Stream<u32> = Stream::try_unfold(0u32, |n| {
        if n >= 2 {
            Err(anyhow::anyhow!("producer exploded"))
        } else {
            Ok(Some((n, n + 1)))
        }
    });
    let s = combine(Style::Async, failing, Stream::empty());
    let mut vals = Vec::new();
    let mut errs = 0;
    for item in s {
        match item {
            Ok(v) => vals.push(v),
            Err(_) => errs += 1,
        }
    }
    assert!(vals.len() <= 2, "saw {vals:?}");
    assert_eq!(vals, (0..vals.len() as u32).collect::<Vec<_>>());
    assert_eq!(errs, 1);
}

#[test]
fn only_one_failure_is_reported() {
    let boom = |tag: &'static str| {
        Stream::<u32>::from_step(move || Err(anyhow::anyhow!("{tag} failed")))
    };
    let s = combine(Style::Async, boom("left"), boom("right"));
    let errs = s.into_iter().filter(|item| item.is_err()).count();
    assert_eq!(errs, 1);
}

#[test]
fn dropping_the_consumer_quiesces_workers() {
    rill::utils::setup_logging(false);
    let polls = Arc::new(AtomicUsize::new(0));
    let producer = || {
        let polls = Arc::clone(&polls);
        Stream::repeat_with(move || {
            polls.fetch_add(1, SeqCst);
            thread::sleep(Duration::from_millis(1));
            0u32
        })
    };
    let s = combine(Style::Async, producer(), producer()).max_buffer(-1);
    let mut iter = s.into_iter();
    for _ in 0..3 {
        assert!(iter.next().is_some());
    }
    drop(iter);
    thread::sleep(Duration::from_millis(200));
    let settled = polls.load(SeqCst);
    thread::sleep(Duration::from_millis(300));
    let later = polls.load(SeqCst);
    assert!(
        later <= settled + 4,
        "workers kept producing after drop: {settled} -> {later}"
    );
}

#[test]
fn push_and_pull_work_directly_on_an_svar() {
    let sv: Arc<SVar<u32>> = SVar::new(Style::WAsync, &StreamOpts::default()).unwrap();
    push_stream(&sv, Stream::from_iter(0..10));
    push_stream(&sv, Stream::from_iter(10..20));
    let mut vals = pull_stream(sv).to_vec().unwrap();
    vals.sort_unstable();
    assert_eq!(vals, (0..20).collect::<Vec<_>>());
}

#[test]
fn ahead_bind_matches_serial_bind() {
    let build = |style| {
        Stream::from_iter(vec![1u32, 2, 3]).concat_map_with(style, move |x| {
            Stream::from_step(move || {
                thread::sleep(Duration::from_millis((4 - x as u64) * 50));
                Ok(Step::Yield(x * 10, Stream::once(x * 10 + 1)))
            })
        })
    };
    let serial = build(Style::Serial).to_vec().unwrap();
    let ahead = build(Style::Ahead).to_vec().unwrap();
    assert_eq!(serial, vec![10, 11, 20, 21, 30, 31]);
    assert_eq!(ahead, serial);
}

#[test]
fn ahead_retires_producers_that_yield_nothing() {
    let s = Stream::from_iter(0..30u32).concat_map_with(Style::Ahead, |x| {
        if x % 7 == 0 {
            Stream::once(x)
        } else {
            Stream::empty()
        }
    });
    assert_eq!(s.to_vec().unwrap(), vec![0, 7, 14, 21, 28]);
}

#[test]
fn wasync_drains_both_branches() {
    let s = combine(
        Style::WAsync,
        Stream::from_iter(vec![1, 2, 3]),
        Stream::from_iter(vec![10, 20, 30]),
    );
    let mut vals = s.to_vec().unwrap();
    vals.sort_unstable();
    assert_eq!(vals, vec![1, 2, 3, 10, 20, 30]);
}

#[test]
fn mixed_styles_nest() {
    let inner = combine(
        Style::Async,
        Stream::from_iter(vec![3, 4]),
        Stream::from_iter(vec![5, 6]),
    );
    let s = combine(Style::Ahead, Stream::from_iter(vec![1, 2]), inner);
    let vals = s.to_vec().unwrap();
    assert_eq!(&vals[..2], &[1, 2]);
    let mut rest = vals[2..].to_vec();
    rest.sort_unstable();
    assert_eq!(rest, vec![3, 4, 5, 6]);
}
