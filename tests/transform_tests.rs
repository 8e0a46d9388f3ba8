use futures_util::FutureExt;
use rs2_flow::*;
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;

#[test]
fn test_map_and_filter() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let result = from_iter(1..=10)
            .map(|x| x * 3)
            .filter(|x| x % 2 == 0)
            .to_vec()
            .await
            .unwrap();
        assert_eq!(result, vec![6, 12, 18, 24, 30]);
    });
}

#[tokio::test]
async fn test_transform_can_emit_many_or_none() {
    let repeated = transform(from_iter(0..4), |value: usize, downstream| {
        async move {
            for _ in 0..value {
                downstream.accept(value).await?;
            }
            Ok(())
        }
        .boxed()
    });

    assert_eq!(repeated.to_vec().await.unwrap(), vec![1, 2, 2, 3, 3, 3]);
}

#[tokio::test]
async fn test_transform_with_state_is_per_collection() {
    let numbered = transform_with_state(
        from_iter(vec!["a", "b", "c"]),
        || 0usize,
        |index, value, downstream| {
            *index += 1;
            downstream.accept(format!("{}{}", value, index))
        },
    );

    let expected = vec!["a1".to_string(), "b2".to_string(), "c3".to_string()];
    assert_eq!(numbered.to_vec().await.unwrap(), expected);
    // A second collection starts from a fresh state
    assert_eq!(numbered.to_vec().await.unwrap(), expected);
}

#[tokio::test]
async fn test_transform_serializes_upstream() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let source_log = Arc::clone(&log);
    let source: Flow<i32> = flow(move |collector| {
        let log = Arc::clone(&source_log);
        async move {
            for i in 0..3 {
                log.lock().unwrap().push(format!("emit {}", i));
                collector.accept(i).await?;
            }
            Ok(())
        }
        .boxed()
    });

    let body_log = Arc::clone(&log);
    let slow = transform(source, move |value: i32, downstream| {
        let log = Arc::clone(&body_log);
        async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            log.lock().unwrap().push(format!("body {}", value));
            downstream.accept(value).await
        }
        .boxed()
    });

    slow.to_vec().await.unwrap();
    let log = log.lock().unwrap().clone();
    assert_eq!(
        log,
        vec!["emit 0", "body 0", "emit 1", "body 1", "emit 2", "body 2"]
    );
}

#[tokio::test]
async fn test_eval_map() {
    let result = from_iter(1..=3)
        .eval_map(|x| async move {
            tokio::task::yield_now().await;
            x * 10
        })
        .to_vec()
        .await
        .unwrap();
    assert_eq!(result, vec![10, 20, 30]);
}

#[tokio::test]
async fn test_filter_not_and_filter_map() {
    let odd = from_iter(1..=6).filter_not(|x| x % 2 == 0).to_vec().await.unwrap();
    assert_eq!(odd, vec![1, 3, 5]);

    let parsed = from_iter(vec!["1", "x", "3"])
        .filter_map(|s| s.parse::<i32>().ok())
        .to_vec()
        .await
        .unwrap();
    assert_eq!(parsed, vec![1, 3]);
}

#[tokio::test]
async fn test_filter_some() {
    let values = from_iter(vec![Some(1), None, Some(3), None]);
    assert_eq!(values.filter_some().to_vec().await.unwrap(), vec![1, 3]);
}

#[tokio::test]
async fn test_filter_downcast_keeps_matching_type() {
    let mixed: Flow<Box<dyn Any + Send>> = flow(|collector| {
        async move {
            collector.accept(Box::new(1i32) as Box<dyn Any + Send>).await?;
            collector.accept(Box::new("two") as Box<dyn Any + Send>).await?;
            collector.accept(Box::new(3i32) as Box<dyn Any + Send>).await
        }
        .boxed()
    });

    assert_eq!(filter_downcast::<i32>(mixed.clone()).to_vec().await.unwrap(), vec![1, 3]);
    assert_eq!(filter_downcast::<&str>(mixed).to_vec().await.unwrap(), vec!["two"]);
}

#[tokio::test]
async fn test_on_each_sees_every_value() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let result = from_iter(1..=4)
        .on_each(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .to_vec()
        .await
        .unwrap();

    assert_eq!(result, vec![1, 2, 3, 4]);
    assert_eq!(seen.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_drop_first_and_drop_while() {
    assert_eq!(
        from_iter(1..=5).drop_first(2).to_vec().await.unwrap(),
        vec![3, 4, 5]
    );
    assert_eq!(
        from_iter(1..=3).drop_first(10).to_vec().await.unwrap(),
        Vec::<i32>::new()
    );
    assert_eq!(
        from_iter(1..=3).drop_first(0).to_vec().await.unwrap(),
        vec![1, 2, 3]
    );
    // Only the leading run is dropped
    assert_eq!(
        from_iter(vec![1, 2, 5, 1, 2])
            .drop_while(|x| *x < 3)
            .to_vec()
            .await
            .unwrap(),
        vec![5, 1, 2]
    );
}

#[tokio::test]
async fn test_concatenate_preserves_order() {
    let flows = from_iter(vec![from_iter(vec![1, 2]), from_iter(vec![3]), from_iter(vec![4, 5])]);
    assert_eq!(flows.concatenate().to_vec().await.unwrap(), vec![1, 2, 3, 4, 5]);

    let expanded = from_iter(1..=3)
        .flat_map_concat(|x| from_iter(vec![x; x as usize]))
        .to_vec()
        .await
        .unwrap();
    assert_eq!(expanded, vec![1, 2, 2, 3, 3, 3]);
}

#[tokio::test]
async fn test_delay_each_waits_per_value() {
    let start = Instant::now();
    let result = from_iter(1..=3)
        .delay_each(Duration::from_millis(20))
        .to_vec()
        .await
        .unwrap();

    assert_eq!(result, vec![1, 2, 3]);
    assert!(start.elapsed() >= Duration::from_millis(60));
}

#[tokio::test]
async fn test_delay_flow_waits_once() {
    let start = Instant::now();
    let result = from_iter(1..=3)
        .delay_flow(Duration::from_millis(30))
        .to_vec()
        .await
        .unwrap();

    assert_eq!(result, vec![1, 2, 3]);
    assert!(start.elapsed() >= Duration::from_millis(30));
}

#[tokio::test]
async fn test_upstream_failure_passes_through_operators() {
    let failing: Flow<i32> = flow(|collector| {
        async move {
            collector.accept(1).await?;
            Err(FlowError::custom("boom"))
        }
        .boxed()
    });

    let mut seen = Vec::new();
    let error = collect_into(&failing.map(|x| x + 1), &mut seen)
        .await
        .unwrap_err();
    assert_eq!(seen, vec![2]);
    assert!(matches!(error, FlowError::Custom(ref msg) if msg == "boom"));
}
