use futures_util::FutureExt;
use rs2_flow::*;
use std::sync::{Arc, Mutex};

#[derive(Debug, thiserror::Error)]
#[error("sensor offline")]
struct SensorOffline;

fn failing_after(values: Vec<i32>) -> Flow<i32> {
    flow(move |collector| {
        let values = values.clone();
        async move {
            for value in values {
                collector.accept(value).await?;
            }
            Err(FlowError::failed(SensorOffline))
        }
        .boxed()
    })
}

fn recorder() -> (Arc<Mutex<Vec<String>>>, Arc<Mutex<Vec<String>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    (Arc::clone(&events), events)
}

#[tokio::test]
async fn test_launch_runs_handlers_in_order() {
    let (events, log) = recorder();
    let each_log = Arc::clone(&log);
    let finally_log = Arc::clone(&log);

    let builder = LaunchBuilder::new()
        .on_each(move |value: i32| {
            let log = Arc::clone(&each_log);
            async move {
                log.lock().unwrap().push(format!("value {}", value));
                Ok(())
            }
        })
        .unwrap()
        .finally(move |cause| {
            finally_log
                .lock()
                .unwrap()
                .push(format!("finally {}", cause.is_some()));
        })
        .unwrap();

    let handle = from_iter(1..=3).launch(builder).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec!["value 1", "value 2", "value 3", "finally false"]
    );
}

#[tokio::test]
async fn test_catch_handles_matching_failure() {
    let (events, log) = recorder();
    let catch_log = Arc::clone(&log);
    let finally_log = Arc::clone(&log);

    let builder = LaunchBuilder::new()
        .on_each(|_: i32| async { Ok(()) })
        .unwrap()
        .catch::<std::io::Error, _>(|_| panic!("wrong handler"))
        .unwrap()
        .catch::<SensorOffline, _>(move |error| {
            catch_log.lock().unwrap().push(format!("caught {}", error));
            Ok(())
        })
        .unwrap()
        .finally(move |cause| {
            let cause = cause.map(|e| e.to_string()).unwrap_or_default();
            finally_log.lock().unwrap().push(format!("finally {}", cause));
        })
        .unwrap();

    let result = launch(failing_after(vec![1, 2]), builder).unwrap().await.unwrap();
    assert!(result.is_ok());
    assert_eq!(
        *events.lock().unwrap(),
        vec!["caught sensor offline", "finally sensor offline"]
    );
}

#[tokio::test]
async fn test_unhandled_failure_is_the_task_result() {
    let builder = LaunchBuilder::new()
        .on_each(|_: i32| async { Ok(()) })
        .unwrap()
        .catch::<std::io::Error, _>(|_| Ok(()))
        .unwrap();

    let result = launch(failing_after(vec![]), builder).unwrap().await.unwrap();
    let error = result.unwrap_err();
    assert!(error.downcast_ref::<SensorOffline>().is_some());
}

#[tokio::test]
async fn test_catch_matches_flow_error_itself() {
    let builder = LaunchBuilder::new()
        .on_each(|value: i32| async move {
            if value == 2 {
                Err(FlowError::Cancelled)
            } else {
                Ok(())
            }
        })
        .unwrap()
        .catch::<FlowError, _>(|error| {
            assert!(error.is_cancelled());
            Err(FlowError::custom("translated"))
        })
        .unwrap();

    let result = launch(from_iter(1..=3), builder).unwrap().await.unwrap();
    assert!(matches!(result, Err(FlowError::Custom(ref msg)) if msg == "translated"));
}

#[test]
fn test_on_each_must_come_first_and_once() {
    let twice = LaunchBuilder::new()
        .on_each(|_: i32| async { Ok(()) })
        .unwrap()
        .on_each(|_: i32| async { Ok(()) });
    assert!(matches!(twice, Err(FlowError::Config(_))));

    let catch_first = LaunchBuilder::<i32>::new().catch::<SensorOffline, _>(|_| Ok(()));
    assert!(matches!(catch_first, Err(FlowError::Config(_))));

    let finally_first = LaunchBuilder::<i32>::new().finally(|_| {});
    assert!(matches!(finally_first, Err(FlowError::Config(_))));
}

#[test]
fn test_catch_after_finally_is_rejected() {
    let result = LaunchBuilder::new()
        .on_each(|_: i32| async { Ok(()) })
        .unwrap()
        .finally(|_| {})
        .unwrap()
        .catch::<SensorOffline, _>(|_| Ok(()));
    assert!(matches!(result, Err(FlowError::Config(_))));
}

#[test]
fn test_duplicate_catch_and_finally_are_rejected() {
    let duplicate_catch = LaunchBuilder::new()
        .on_each(|_: i32| async { Ok(()) })
        .unwrap()
        .catch::<SensorOffline, _>(|_| Ok(()))
        .unwrap()
        .catch::<SensorOffline, _>(|_| Ok(()));
    assert!(matches!(duplicate_catch, Err(FlowError::Config(_))));

    let duplicate_finally = LaunchBuilder::new()
        .on_each(|_: i32| async { Ok(()) })
        .unwrap()
        .finally(|_| {})
        .unwrap()
        .finally(|_| {});
    assert!(matches!(duplicate_finally, Err(FlowError::Config(_))));
}

#[test]
fn test_launch_requires_on_each() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let result = launch(from_iter(vec![1]), LaunchBuilder::new());
        assert!(matches!(result, Err(FlowError::Config(_))));
    });
}

#[test]
fn test_launch_outside_runtime_is_rejected() {
    let builder = LaunchBuilder::new().on_each(|_: i32| async { Ok(()) }).unwrap();
    let result = launch(from_iter(vec![1]), builder);
    assert!(matches!(result, Err(FlowError::Config(_))));
}
