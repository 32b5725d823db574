//! Integration tests for the crawler
//!
//! Most tests drive the scheduler with a scripted fetcher and a manual clock
//! so that staleness can be tested without sleeping. The last ones use
//! wiremock to run the real HTTP fetcher end-to-end.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use driftnet::clock::ManualClock;
use driftnet::config::parse_config;
use driftnet::crawler::{
    run_crawl, ContentFetcher, FetchError, FetchedPage, Scheduler, SchedulerSettings,
};
use driftnet::storage::{
    ClaimCutoffs, RawStore, SqliteStorage, TaskStore, UrlRecord, UrlStore,
};
use driftnet::{RefType, TaskAction, TaskState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A scripted response for one URL
#[derive(Clone)]
enum Stub {
    Page { html: String, links: Vec<String> },
    Connect,
    Timeout,
}

/// Fetcher answering from a fixed table; unknown URLs refuse to connect
#[derive(Default)]
struct StubFetcher {
    responses: HashMap<String, Stub>,
    fetched: Mutex<Vec<String>>,
}

impl StubFetcher {
    fn page(mut self, url: &str, html: &str, links: &[&str]) -> Self {
        self.responses.insert(
            url.to_string(),
            Stub::Page {
                html: html.to_string(),
                links: links.iter().map(|l| l.to_string()).collect(),
            },
        );
        self
    }

    fn fail(mut self, url: &str, stub: Stub) -> Self {
        self.responses.insert(url.to_string(), stub);
        self
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentFetcher for StubFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        self.fetched.lock().unwrap().push(url.to_string());

        match self.responses.get(url.as_str()) {
            Some(Stub::Page { html, links }) => Ok(FetchedPage {
                html: html.clone(),
                links: links.clone(),
                title: None,
            }),
            Some(Stub::Timeout) => Err(FetchError::Timeout("deadline elapsed".to_string())),
            Some(Stub::Connect) | None => {
                Err(FetchError::Connect("connection refused".to_string()))
            }
        }
    }
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()
}

fn settings(window: Duration, max_tasks: Option<u64>) -> SchedulerSettings {
    SchedulerSettings {
        expiration_window: window,
        max_tasks,
        ..SchedulerSettings::default()
    }
}

fn scheduler_with(
    fetcher: StubFetcher,
    settings: SchedulerSettings,
) -> (Scheduler<SqliteStorage, StubFetcher>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start()));
    let storage = SqliteStorage::in_memory_with_clock(clock.clone()).unwrap();
    (Scheduler::new(storage, fetcher, clock.clone(), settings), clock)
}

fn url_record(storage: &SqliteStorage, url: &str) -> UrlRecord {
    storage.get_url_by_address(url).unwrap().unwrap()
}

fn set_state(scheduler: &mut Scheduler<SqliteStorage, StubFetcher>, task_id: i64, state: TaskState) {
    scheduler
        .storage_mut()
        .update_task(task_id, state, TaskAction::Crawl, None)
        .unwrap();
}

fn task_state(storage: &SqliteStorage, url: &str) -> TaskState {
    let record = url_record(storage, url);
    storage
        .get_task(record.id, RefType::Url)
        .unwrap()
        .unwrap()
        .state
}

#[tokio::test]
async fn test_one_pass_registers_discovered_link() {
    let fetcher = StubFetcher::default().page(
        "http://a.test/",
        "<html>home</html>",
        &["http://a.test/b"],
    );
    let (mut scheduler, _) = scheduler_with(fetcher, settings(Duration::days(1), Some(1)));

    let report = scheduler.crawl("http://a.test/").await.unwrap();

    assert_eq!(report.completed, 1);
    assert_eq!(report.discovered, 1);

    let storage = scheduler.storage();
    assert_eq!(storage.count_urls().unwrap(), 2);
    assert!(storage.get_url_by_address("http://a.test/b").unwrap().is_some());
    assert_eq!(task_state(storage, "http://a.test/"), TaskState::Completed);
    assert_eq!(task_state(storage, "http://a.test/b"), TaskState::New);

    let seed = url_record(storage, "http://a.test/");
    let raws = storage.list_raws(seed.id).unwrap();
    assert_eq!(raws.len(), 1);
    assert_eq!(raws[0].content, "<html>home</html>");
    assert_eq!(raws[0].meta, Some(serde_json::json!({ "size": 17 })));
    assert_eq!(storage.count_raws().unwrap(), 1);
}

#[tokio::test]
async fn test_same_seed_twice_is_idempotent() {
    let fetcher = StubFetcher::default().page("http://a.test/", "<p>a</p>", &[]);
    let (mut scheduler, _) = scheduler_with(fetcher, settings(Duration::days(1), None));

    scheduler.crawl("http://a.test/").await.unwrap();
    let second = scheduler.crawl("http://a.test/").await.unwrap();

    assert_eq!(second.processed(), 0);
    assert_eq!(scheduler.fetcher().fetched(), vec!["http://a.test/"]);

    let storage = scheduler.storage();
    assert_eq!(storage.count_urls().unwrap(), 1);
    let counts = storage.count_tasks_by_state(RefType::Url).unwrap();
    assert_eq!(counts.values().sum::<u64>(), 1);
}

#[tokio::test]
async fn test_seed_differing_only_by_fragment_is_same_url() {
    let fetcher = StubFetcher::default().page("http://a.test/", "<p>a</p>", &["/#top"]);
    let (mut scheduler, _) = scheduler_with(fetcher, settings(Duration::days(1), None));

    let report = scheduler.crawl("http://A.test/#intro").await.unwrap();

    assert_eq!(report.completed, 1);
    assert_eq!(report.discovered, 0);
    assert_eq!(scheduler.storage().count_urls().unwrap(), 1);
}

#[tokio::test]
async fn test_running_task_is_resumed_first() {
    let fetcher = StubFetcher::default()
        .page("http://a.test/stale", "<p>stale</p>", &[])
        .page("http://a.test/running", "<p>running</p>", &[])
        .page("http://a.test/new", "<p>new</p>", &[])
        .page("http://a.test/seed", "<p>seed</p>", &[]);
    let (mut scheduler, clock) = scheduler_with(fetcher, settings(Duration::days(1), Some(1)));

    // An expired completed task
    let stale = Url::parse("http://a.test/stale").unwrap();
    let (_, task, _) = scheduler.ensure_url_task(&stale).unwrap();
    set_state(&mut scheduler, task.id, TaskState::Completed);
    clock.advance(Duration::days(2));

    // A task left running by a killed run
    let running = Url::parse("http://a.test/running").unwrap();
    let (_, task, _) = scheduler.ensure_url_task(&running).unwrap();
    set_state(&mut scheduler, task.id, TaskState::Running);
    clock.advance(Duration::seconds(1));

    // A newer task that was never started
    let newer = Url::parse("http://a.test/new").unwrap();
    scheduler.ensure_url_task(&newer).unwrap();
    clock.advance(Duration::seconds(1));

    // A seed that was just crawled
    let seed = Url::parse("http://a.test/seed").unwrap();
    let (_, task, _) = scheduler.ensure_url_task(&seed).unwrap();
    set_state(&mut scheduler, task.id, TaskState::Completed);

    // Inside the resume lease the running task still belongs to its runner
    let next = scheduler.next_work_item().unwrap().unwrap();
    assert_eq!(next.url.url, "http://a.test/new");

    clock.advance(Duration::minutes(1));
    let next = scheduler.next_work_item().unwrap().unwrap();
    assert_eq!(next.url.url, "http://a.test/running");

    let report = scheduler.crawl("http://a.test/seed").await.unwrap();

    assert_eq!(report.completed, 1);
    assert_eq!(scheduler.fetcher().fetched(), vec!["http://a.test/running"]);
    let storage = scheduler.storage();
    assert_eq!(task_state(storage, "http://a.test/running"), TaskState::Completed);
    assert_eq!(task_state(storage, "http://a.test/new"), TaskState::New);
    assert_eq!(task_state(storage, "http://a.test/stale"), TaskState::Completed);
}

#[tokio::test]
async fn test_two_runners_never_share_a_task() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("shared.db");
    let clock = Arc::new(ManualClock::new(start()));
    let runner = |fetcher: StubFetcher| {
        let storage = SqliteStorage::with_clock(&db_path, clock.clone()).unwrap();
        Scheduler::new(
            storage,
            fetcher,
            clock.clone(),
            settings(Duration::days(1), None),
        )
    };

    let mut first = runner(StubFetcher::default().page("http://a.test/", "<p>a</p>", &[]));
    let mut second = runner(StubFetcher::default().page("http://a.test/", "<p>a</p>", &[]));

    // The first runner was killed mid-fetch
    let seed = Url::parse("http://a.test/").unwrap();
    let (_, task, _) = first.ensure_url_task(&seed).unwrap();
    first
        .storage_mut()
        .claim_task(
            &task,
            ClaimCutoffs {
                expired_before: start(),
                resume_before: start(),
            },
        )
        .unwrap()
        .unwrap();

    let report = second.crawl("http://a.test/").await.unwrap();
    assert_eq!(report.processed(), 0);
    assert!(second.fetcher().fetched().is_empty());

    clock.advance(Duration::minutes(1));
    let report = second.crawl("http://a.test/").await.unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(second.fetcher().fetched(), vec!["http://a.test/"]);

    // The resumed task is settled, so the original runner finds nothing to do
    let report = first.crawl("http://a.test/").await.unwrap();
    assert_eq!(report.processed(), 0);
    assert!(first.fetcher().fetched().is_empty());
}

#[tokio::test]
async fn test_connect_error_does_not_abort_crawl() {
    let fetcher = StubFetcher::default()
        .page("http://a.test/", "<p>home</p>", &["/b", "/c"])
        .fail("http://a.test/b", Stub::Connect)
        .page("http://a.test/c", "<p>c</p>", &[]);
    let (mut scheduler, _) = scheduler_with(fetcher, settings(Duration::days(1), None));

    let report = scheduler.crawl("http://a.test/").await.unwrap();

    assert_eq!(report.completed, 2);
    assert_eq!(report.failed, 1);

    let storage = scheduler.storage();
    assert_eq!(task_state(storage, "http://a.test/b"), TaskState::Failed);
    assert_eq!(task_state(storage, "http://a.test/c"), TaskState::Completed);

    let b = url_record(storage, "http://a.test/b");
    assert!(storage.latest_raw(b.id).unwrap().is_none());
    assert_eq!(storage.count_raws().unwrap(), 2);
}

#[tokio::test]
async fn test_timeout_and_empty_content() {
    let fetcher = StubFetcher::default()
        .page("http://a.test/", "<p>home</p>", &["/slow", "/blank"])
        .fail("http://a.test/slow", Stub::Timeout)
        .page("http://a.test/blank", "   ", &[]);
    let (mut scheduler, _) = scheduler_with(fetcher, settings(Duration::days(1), None));

    let report = scheduler.crawl("http://a.test/").await.unwrap();

    assert_eq!(report.completed, 1);
    assert_eq!(report.timed_out, 1);
    assert_eq!(report.failed, 1);

    let storage = scheduler.storage();
    assert_eq!(task_state(storage, "http://a.test/slow"), TaskState::Timeout);
    assert_eq!(task_state(storage, "http://a.test/blank"), TaskState::Failed);
    assert_eq!(storage.count_raws().unwrap(), 1);
}

#[tokio::test]
async fn test_settled_tasks_recrawled_after_expiration() {
    let fetcher = StubFetcher::default()
        .page("http://a.test/", "<p>home</p>", &["/down"])
        .fail("http://a.test/down", Stub::Connect);
    let (mut scheduler, clock) = scheduler_with(fetcher, settings(Duration::hours(6), None));

    scheduler.crawl("http://a.test/").await.unwrap();
    assert_eq!(scheduler.fetcher().fetched().len(), 2);

    clock.advance(Duration::hours(6) - Duration::seconds(1));
    let report = scheduler.crawl("http://a.test/").await.unwrap();
    assert_eq!(report.processed(), 0);
    assert_eq!(scheduler.fetcher().fetched().len(), 2);

    clock.advance(Duration::seconds(2));
    let report = scheduler.crawl("http://a.test/").await.unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(scheduler.fetcher().fetched().len(), 4);

    // Still inside the one-week freshness window: the snapshot is overwritten
    let storage = scheduler.storage();
    let home = url_record(storage, "http://a.test/");
    assert_eq!(storage.list_raws(home.id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_soft_deleted_url_is_skipped() {
    let fetcher = StubFetcher::default()
        .page("http://a.test/", "<p>home</p>", &[])
        .page("http://a.test/gone", "<p>gone</p>", &[]);
    let (mut scheduler, _) = scheduler_with(fetcher, settings(Duration::days(1), None));

    let gone = Url::parse("http://a.test/gone").unwrap();
    let (record, _, _) = scheduler.ensure_url_task(&gone).unwrap();
    scheduler.storage_mut().soft_delete_url(record.id).unwrap();

    scheduler.crawl("http://a.test/").await.unwrap();

    assert_eq!(scheduler.fetcher().fetched(), vec!["http://a.test/"]);
    assert_eq!(task_state(scheduler.storage(), "http://a.test/gone"), TaskState::New);
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html")
}

#[tokio::test]
async fn test_full_crawl_over_http() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><head><title>Home</title></head><body>
               <a href="/page1">Page 1</a>
               <a href="page2#section">Page 2</a>
               <a href="javascript:void(0)">Nothing</a>
               </body></html>"#,
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page1"))
        .respond_with(html(
            r#"<html><head><title>One</title></head><body><a href="/">Home</a></body></html>"#,
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(html(
            r#"<html><body><a href="/missing">Missing</a></body></html>"#,
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crawl.db");
    let config = parse_config(&format!(
        r#"
[crawler]
expiration-window = 3600

[fetcher]
request-timeout = 5
connect-timeout = 2

[storage]
database-path = "{}"
"#,
        db_path.display()
    ))
    .unwrap();

    let seed = format!("{}/", base);
    let report = run_crawl(&config, &seed, std::future::pending::<()>())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.completed, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(report.discovered, 3);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_urls().unwrap(), 4);
    assert_eq!(storage.count_raws().unwrap(), 3);
    assert_eq!(
        url_record(&storage, &seed).title.as_deref(),
        Some("Home")
    );
    assert_eq!(
        task_state(&storage, &format!("{}/page2", base)),
        TaskState::Completed
    );
    assert_eq!(
        task_state(&storage, &format!("{}/missing", base)),
        TaskState::Failed
    );

    // A second run finds nothing stale and fetches nothing
    let report = run_crawl(&config, &seed, std::future::pending::<()>())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.processed(), 0);
}

#[tokio::test]
async fn test_interrupted_crawl_leaves_task_running() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<p>slow</p>").set_delay(std::time::Duration::from_secs(3)))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crawl.db");
    let config = parse_config(&format!(
        "[crawler]\nexpiration-window = 3600\n[storage]\ndatabase-path = \"{}\"\n",
        db_path.display()
    ))
    .unwrap();

    let seed = format!("{}/", mock_server.uri());
    let interrupt = tokio::time::sleep(std::time::Duration::from_millis(300));
    let outcome = run_crawl(&config, &seed, interrupt).await.unwrap();

    assert!(outcome.is_none());
    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(task_state(&storage, &seed), TaskState::Running);
}
