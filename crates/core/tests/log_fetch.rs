use tasklens_core::{
    InMemoryTaskApi, LOG_MAX_LINES, LogLine, TaskApi, TaskStatusSnapshot, fetch_task_log,
};

fn numbered_lines(count: u64) -> Vec<LogLine> {
    (0..count)
        .map(|i| LogLine {
            sequence: i,
            text: format!("line {i}"),
        })
        .collect()
}

fn running_status() -> TaskStatusSnapshot {
    TaskStatusSnapshot {
        status: "running".to_string(),
        exit_status: None,
        task_type: "qmigrate".to_string(),
        start_time: Some(1_717_320_000),
        end_time: None,
    }
}

const UPID: &str = "UPID:pve1:0003C4F2:00A3B2C1:66334455:qmigrate:101:root@pam:";

#[tokio::test]
async fn fetches_pages_in_order_until_short_page() {
    let api = InMemoryTaskApi::new();
    api.insert_task(UPID, running_status(), numbered_lines(1200))
        .await;

    let lines = fetch_task_log(&api, UPID).await.unwrap();
    assert_eq!(lines.len(), 1200);
    for (i, line) in lines.iter().enumerate() {
        assert_eq!(line.sequence, i as u64);
    }
}

#[tokio::test]
async fn exact_page_multiple_terminates() {
    let api = InMemoryTaskApi::new();
    api.insert_task(UPID, running_status(), numbered_lines(1000))
        .await;

    let lines = fetch_task_log(&api, UPID).await.unwrap();
    assert_eq!(lines.len(), 1000);
}

#[tokio::test]
async fn log_fetch_respects_the_hard_cap() {
    let api = InMemoryTaskApi::new();
    api.insert_task(UPID, running_status(), numbered_lines(LOG_MAX_LINES + 500))
        .await;

    let lines = fetch_task_log(&api, UPID).await.unwrap();
    assert_eq!(lines.len() as u64, LOG_MAX_LINES);
}

#[tokio::test]
async fn unknown_task_is_an_api_error() {
    let api = InMemoryTaskApi::new();
    let err = fetch_task_log(&api, UPID).await.unwrap_err();
    assert!(err.to_string().contains("unknown task"));

    let err = api.fetch_status(UPID).await.unwrap_err();
    assert!(err.to_string().contains("unknown task"));
}

#[tokio::test]
async fn log_pages_slice_cleanly_at_the_tail() {
    let api = InMemoryTaskApi::new();
    api.insert_task(UPID, running_status(), numbered_lines(1200))
        .await;

    let page = api.fetch_log_page(UPID, 1100, 500).await.unwrap();
    assert_eq!(page.len(), 100);
    assert_eq!(page[0].sequence, 1100);

    let page = api.fetch_log_page(UPID, 5000, 500).await.unwrap();
    assert!(page.is_empty());
}
