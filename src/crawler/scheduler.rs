//! Scheduler driving the database-resident crawl loop
//!
//! The scheduler keeps no frontier of its own. Every decision is made by
//! asking the task store for the next eligible task:
//! - pending tasks (`New`, `Running`) first, least recently updated first
//! - otherwise the least recently updated expired task
//!
//! A killed crawl leaves its current task `Running`. Once the resume lease has
//! passed without an update, that task is the first thing the next run picks
//! up. Inside the lease it belongs to whichever runner claimed it.

use crate::clock::SharedClock;
use crate::config::Config;
use crate::crawler::fetcher::ContentFetcher;
use crate::state::expiry::{expiry_threshold, is_expired};
use crate::state::{RefType, TaskAction, TaskState};
use crate::storage::{ClaimCutoffs, RawPolicy, Storage, TaskDefaults, TaskRecord, UrlRecord};
use crate::url::{base_url, normalize_url, sanitize_links};
use crate::Result;
use chrono::Duration;
use serde_json::json;
use url::Url;

/// Tunables for one scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// How long a settled task rests before it is crawled again
    pub expiration_window: Duration,

    /// How long a `Running` task is left to its runner before another may resume it
    pub resume_lease: Duration,

    /// Stop after this many processed tasks
    pub max_tasks: Option<u64>,

    pub raw_policy: RawPolicy,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            expiration_window: config.crawler.expiration_window(),
            resume_lease: config.resume_lease(),
            max_tasks: config.crawler.max_tasks,
            raw_policy: config.raw.policy(),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            expiration_window: Duration::days(1),
            resume_lease: Duration::seconds(30),
            max_tasks: None,
            raw_policy: RawPolicy::default(),
        }
    }
}

/// A URL together with the task that schedules it
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub url: UrlRecord,
    pub task: TaskRecord,
}

/// What one `crawl` call did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,

    /// URLs first seen during this crawl
    pub discovered: u64,

    /// Tasks another runner changed between selection and claim
    pub lost_claims: u64,
}

impl CrawlReport {
    /// Number of tasks that reached an outcome
    pub fn processed(&self) -> u64 {
        self.completed + self.failed + self.timed_out
    }

    fn record_outcome(&mut self, state: TaskState) {
        match state {
            TaskState::Completed => self.completed += 1,
            TaskState::Failed => self.failed += 1,
            TaskState::Timeout => self.timed_out += 1,
            TaskState::New | TaskState::Running => {
                tracing::warn!("Ignoring non-final outcome {}", state);
            }
        }
    }
}

/// Crawl scheduler over a store and a fetcher
pub struct Scheduler<S, F> {
    storage: S,
    fetcher: F,
    clock: SharedClock,
    settings: SchedulerSettings,
}

impl<S: Storage, F: ContentFetcher> Scheduler<S, F> {
    /// Creates a new scheduler
    ///
    /// `clock` must be the same clock the store stamps rows with, otherwise
    /// expiration is judged against a different notion of "now".
    pub fn new(storage: S, fetcher: F, clock: SharedClock, settings: SchedulerSettings) -> Self {
        Self {
            storage,
            fetcher,
            clock,
            settings,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Crawls from `seed` until no eligible task remains
    ///
    /// # Process
    ///
    /// 1. Register the seed URL and its task
    /// 2. Start with the seed if it is eligible, otherwise with the next eligible task
    /// 3. Claim, fetch, store content, complete, record discovered links
    /// 4. Repeat with the next eligible task
    ///
    /// Fetch failures are recorded on the task and never end the loop.
    /// Storage failures end it and are returned.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - No eligible work left, or `max_tasks` reached
    /// * `Err(DriftnetError)` - Invalid seed or a storage failure
    pub async fn crawl(&mut self, seed: &str) -> Result<CrawlReport> {
        let seed_url = normalize_url(seed)?;
        let mut report = CrawlReport::default();

        let (url, task, eligible) = self.ensure_url_task(&seed_url)?;
        let mut next = if eligible {
            Some(WorkItem { url, task })
        } else {
            tracing::info!(
                "Seed {} is not eligible (task {} is {}), looking for other work",
                url.url,
                task.id,
                task.state
            );
            self.next_work_item()?
        };

        while let Some(item) = next {
            if let Some(max_tasks) = self.settings.max_tasks {
                if report.processed() >= max_tasks {
                    tracing::info!("Reached max tasks ({}), stopping", max_tasks);
                    break;
                }
            }

            self.process(item, &mut report).await?;
            next = self.next_work_item()?;
        }

        tracing::info!(
            "Crawl finished: {} completed, {} failed, {} timed out, {} discovered",
            report.completed,
            report.failed,
            report.timed_out,
            report.discovered
        );

        Ok(report)
    }

    /// Gets or creates the URL and task for `url`
    ///
    /// # Returns
    ///
    /// The URL, its task, and whether the task may run right away: it was just
    /// created, is still `New`, has expired, or is `Running` with its resume
    /// lease elapsed. A soft-deleted URL is never eligible.
    pub fn ensure_url_task(&mut self, url: &Url) -> Result<(UrlRecord, TaskRecord, bool)> {
        let (url_record, _) = self
            .storage
            .get_or_create_url(url.as_str(), &base_url(url))?;
        let (task, task_created) = self.storage.get_or_create_task(
            url_record.id,
            RefType::Url,
            TaskDefaults::default(),
        )?;

        let now = self.clock.now();
        let eligible = !url_record.is_deleted()
            && (task_created
                || match task.state {
                    TaskState::New => true,
                    TaskState::Running => {
                        is_expired(task.updated_at, now, self.settings.resume_lease)
                    }
                    _ => is_expired(task.updated_at, now, self.settings.expiration_window),
                });

        Ok((url_record, task, eligible))
    }

    /// Finds the next task to run
    ///
    /// Pending tasks come first, least recently updated first, so a task left
    /// `Running` by an interrupted run beats any newer `New` task once its
    /// resume lease has passed. Without pending work, the least recently
    /// updated expired task is returned.
    pub fn next_work_item(&self) -> Result<Option<WorkItem>> {
        let cutoffs = self.claim_cutoffs();
        let task = match self
            .storage
            .find_first_pending(RefType::Url, cutoffs.resume_before)?
        {
            Some(task) => Some(task),
            None => self
                .storage
                .find_first_expired(RefType::Url, cutoffs.expired_before)?,
        };

        let Some(task) = task else {
            return Ok(None);
        };

        match self.storage.get_url(task.ref_id)? {
            Some(url) => Ok(Some(WorkItem { url, task })),
            None => {
                tracing::warn!(
                    "Task {} references URL {} which no longer exists",
                    task.id,
                    task.ref_id
                );
                Ok(None)
            }
        }
    }

    /// Claims and runs one work item
    async fn process(&mut self, item: WorkItem, report: &mut CrawlReport) -> Result<()> {
        let WorkItem { url, task } = item;

        let Some(task) = self.storage.claim_task(&task, self.claim_cutoffs())? else {
            tracing::info!("Task {} for {} was claimed elsewhere", task.id, url.url);
            report.lost_claims += 1;
            return Ok(());
        };

        tracing::info!("Crawling {} (task {})", url.url, task.id);
        let page_url = Url::parse(&url.url)?;

        let page = match self.fetcher.fetch(&page_url).await {
            Ok(page) => page,
            Err(e) => {
                let state = e.task_state();
                tracing::warn!("Fetch failed for {}: {}", url.url, e);
                self.settle(task.id, state, &json!({ "error": e.to_string() }))?;
                report.record_outcome(state);
                return Ok(());
            }
        };

        if page.html.trim().is_empty() {
            tracing::warn!("Empty content from {}", url.url);
            self.settle(
                task.id,
                TaskState::Failed,
                &json!({ "error": "empty content" }),
            )?;
            report.record_outcome(TaskState::Failed);
            return Ok(());
        }

        let meta = json!({ "size": page.html.len() });
        self.storage
            .upsert_latest_raw(url.id, &page.html, &meta, &self.settings.raw_policy)?;

        if let Some(title) = page.title.as_deref() {
            self.storage.update_url_details(url.id, Some(title), None)?;
        }

        let links = sanitize_links(&page_url, &page.links);
        self.settle(
            task.id,
            TaskState::Completed,
            &json!({ "links": links.len() }),
        )?;
        report.record_outcome(TaskState::Completed);

        report.discovered += self.store_discovered_links(&links)?;
        Ok(())
    }

    fn claim_cutoffs(&self) -> ClaimCutoffs {
        let now = self.clock.now();
        ClaimCutoffs {
            expired_before: expiry_threshold(now, self.settings.expiration_window),
            resume_before: expiry_threshold(now, self.settings.resume_lease),
        }
    }

    fn settle(&mut self, task_id: i64, state: TaskState, meta: &serde_json::Value) -> Result<()> {
        let task = self
            .storage
            .update_task(task_id, state, TaskAction::Crawl, Some(meta))?;
        tracing::info!("Task {} -> {}", task.id, task.state);
        Ok(())
    }

    /// Registers each link as a URL with a `New` task, leaving existing tasks alone
    ///
    /// Returns how many URLs were new.
    fn store_discovered_links(&mut self, links: &[Url]) -> Result<u64> {
        let mut discovered = 0;

        for link in links {
            let (url_record, created) = self
                .storage
                .get_or_create_url(link.as_str(), &base_url(link))?;
            self.storage.get_or_create_task(
                url_record.id,
                RefType::Url,
                TaskDefaults::default(),
            )?;

            if created {
                tracing::debug!("Discovered {}", link);
                discovered += 1;
            }
        }

        Ok(discovered)
    }
}
