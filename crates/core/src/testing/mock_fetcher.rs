//! Mock page fetcher and headless renderer.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::searcher::{PageFetcher, PageRenderer, PageRequest, SpiderError};

#[derive(Debug, Clone)]
enum Response {
    Body(String),
    Fail(SpiderError),
    Hang,
}

/// Increments a counter when the owning future is dropped before finishing.
struct CancelGuard<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Mock implementation of [`PageFetcher`].
///
/// Every request is recorded. A fetcher built with
/// [`never_completes`](Self::never_completes) parks forever and counts how
/// many of its pending fetches were dropped, which is what an aborted worker
/// looks like from the inside.
#[derive(Debug)]
pub struct MockFetcher {
    response: Response,
    requests: Mutex<Vec<PageRequest>>,
    /// Fetches that began.
    pub started: AtomicUsize,
    /// Pending fetches that were dropped before completing.
    pub cancelled: AtomicUsize,
}

impl MockFetcher {
    fn with_response(response: Response) -> Self {
        Self {
            response,
            requests: Mutex::new(Vec::new()),
            started: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
        }
    }

    /// Answer every request with `body`.
    pub fn with_body(body: &str) -> Self {
        Self::with_response(Response::Body(body.to_string()))
    }

    /// Fail every request with `error`.
    pub fn failing(error: SpiderError) -> Self {
        Self::with_response(Response::Fail(error))
    }

    /// Never answer.
    pub fn never_completes() -> Self {
        Self::with_response(Response::Hang)
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, request: &PageRequest) -> Result<String, SpiderError> {
        self.requests.lock().push(request.clone());
        self.started.fetch_add(1, Ordering::SeqCst);

        match &self.response {
            Response::Body(body) => Ok(body.clone()),
            Response::Fail(error) => Err(error.clone()),
            Response::Hang => {
                let _guard = CancelGuard {
                    counter: &self.cancelled,
                };
                std::future::pending::<()>().await;
                unreachable!("pending future completed")
            }
        }
    }
}

/// Mock implementation of [`PageRenderer`].
#[derive(Debug)]
pub struct MockRenderer {
    available: bool,
    body: String,
    calls: Mutex<Vec<(PageRequest, Duration)>>,
}

impl MockRenderer {
    pub fn with_body(body: &str) -> Self {
        Self {
            available: true,
            body: body.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A renderer whose browser is missing.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::with_body("")
        }
    }

    /// Every render call with the settle delay it was given.
    pub fn calls(&self) -> Vec<(PageRequest, Duration)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl PageRenderer for MockRenderer {
    fn available(&self) -> bool {
        self.available
    }

    async fn render(&self, request: &PageRequest, settle: Duration) -> Result<String, SpiderError> {
        self.calls.lock().push((request.clone(), settle));
        Ok(self.body.clone())
    }
}
