//! Drives one suite run in a headless browser

use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{
    self, EventLoadingFailed, EventRequestWillBeSent,
};
use chromiumoxide::cdp::browser_protocol::page::{
    self as page_domain, AddScriptToEvaluateOnNewDocumentParams, EventJavascriptDialogOpening,
    HandleJavaScriptDialogParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    self, AddBindingParams, EventBindingCalled, EventConsoleApiCalled, EventExceptionThrown,
    RemoteObject,
};
use chromiumoxide::Page;
use futures::stream::{self, PollNext, Stream};
use futures::StreamExt;
use mocharun_common::config::{BrowserConfig, HarnessConfig};
use mocharun_common::{CoverageEntry, MochaReport};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::console::{decode_args, ConsoleArg, ConsolePrinter, SharedBuffer};
use crate::coverage::CoverageRecorder;
use crate::error::{BrowserError, BrowserResult};
use crate::launcher::BrowserSession;
use crate::shim::ShimConfig;

type Completion = BrowserResult<MochaReport>;

/// What a finished browser run hands back
#[derive(Debug)]
pub struct BrowserRun {
    pub report: MochaReport,
    /// Present when coverage collection was enabled
    pub coverage: Option<Vec<CoverageEntry>>,
}

/// Launches the browser, instruments the page and waits for the suite
#[derive(Debug, Clone)]
pub struct BrowserController {
    browser: BrowserConfig,
    shim: ShimConfig,
    timeout: Duration,
    coverage: bool,
    /// Page console output goes here instead of stdout when set
    console: Option<SharedBuffer>,
}

impl BrowserController {
    pub fn new(config: &HarnessConfig) -> Self {
        Self {
            browser: config.browser.clone(),
            shim: ShimConfig::with_reporter(config.run.reporter.clone()),
            timeout: config.run.completion_timeout(),
            coverage: config.coverage.enabled,
            console: None,
        }
    }

    pub fn with_shim(mut self, shim: ShimConfig) -> Self {
        self.shim = shim;
        self
    }

    pub fn with_console_capture(mut self, buffer: SharedBuffer) -> Self {
        self.console = Some(buffer);
        self
    }

    /// Run the suite at `url`. The browser is closed on every path.
    pub async fn run(&self, url: &str) -> BrowserResult<BrowserRun> {
        let session = BrowserSession::launch(&self.browser).await?;
        let outcome = self.drive(&session, url).await;
        session.close().await;
        outcome
    }

    async fn drive(&self, session: &BrowserSession, url: &str) -> BrowserResult<BrowserRun> {
        let page = session.new_page().await?;
        page.execute(runtime::EnableParams::default()).await?;
        page.execute(page_domain::EnableParams::default()).await?;
        page.execute(network::EnableParams::default()).await?;

        let (tx, mut rx) = mpsc::channel(1);
        let _listeners = self.attach(&page, tx).await?;

        page.execute(AddBindingParams::new(self.shim.binding.clone()))
            .await?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(self.shim.script()?))
            .await?;

        let recorder = if self.coverage {
            Some(CoverageRecorder::start(&page).await?)
        } else {
            None
        };

        info!("Navigating to {}", url);
        page.goto(url).await.map_err(|e| BrowserError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let report = await_completion(&mut rx, self.timeout).await?;
        info!("Suite reported completion");

        let coverage = match recorder {
            Some(recorder) => Some(recorder.stop(&page).await?),
            None => None,
        };

        Ok(BrowserRun { report, coverage })
    }

    /// Attach every page listener; must happen before navigation
    async fn attach(&self, page: &Page, tx: mpsc::Sender<Completion>) -> BrowserResult<Listeners> {
        let mut tasks = Vec::new();

        // Console and binding share one task so a completion can never
        // overtake console output emitted before it
        let console = page
            .event_listener::<EventConsoleApiCalled>()
            .await?
            .map(|event| PageEvent::Console(event.args.clone()));
        let calls = page
            .event_listener::<EventBindingCalled>()
            .await?
            .map(|call| PageEvent::Binding {
                name: call.name.clone(),
                payload: call.payload.clone(),
            });
        let out: Box<dyn Write + Send> = match &self.console {
            Some(buffer) => Box::new(buffer.clone()),
            None => Box::new(std::io::stdout()),
        };
        tasks.push(tokio::spawn(relay(
            merge_page_events(console, calls).boxed(),
            page.clone(),
            ConsolePrinter::new(out, self.shim.sentinel.clone()),
            self.shim.binding.clone(),
            CompletionSlot::new(tx),
        )));

        let mut exceptions = page.event_listener::<EventExceptionThrown>().await?;
        tasks.push(tokio::spawn(async move {
            while let Some(event) = exceptions.next().await {
                let details = &event.exception_details;
                let message = details
                    .exception
                    .as_ref()
                    .and_then(|e| e.description.clone())
                    .unwrap_or_else(|| details.text.clone());
                error!("Page error: {}", message);
            }
        }));

        let mut sent = page.event_listener::<EventRequestWillBeSent>().await?;
        let mut failed = page.event_listener::<EventLoadingFailed>().await?;
        tasks.push(tokio::spawn(async move {
            let mut urls: HashMap<String, String> = HashMap::new();
            loop {
                tokio::select! {
                    biased;
                    Some(event) = sent.next() => {
                        urls.insert(event.request_id.inner().clone(), event.request.url.clone());
                    }
                    Some(event) = failed.next() => {
                        let url = urls
                            .remove(event.request_id.inner())
                            .unwrap_or_else(|| "<unknown url>".to_string());
                        error!("Request failed: {} {}", event.error_text, url);
                    }
                    else => break,
                }
            }
        }));

        let mut dialogs = page.event_listener::<EventJavascriptDialogOpening>().await?;
        let dialog_page = page.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = dialogs.next().await {
                warn!("Dismissing dialog: {}", event.message);
                if let Err(e) = dialog_page
                    .execute(HandleJavaScriptDialogParams::new(false))
                    .await
                {
                    debug!("dialog dismissal failed: {}", e);
                }
            }
        }));

        Ok(Listeners(tasks))
    }
}

/// Page events that must be handled in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent<A> {
    Console(A),
    Binding { name: String, payload: String },
}

/// Turns raw console arguments into printable ones
#[async_trait]
pub trait ArgDecoder: Send + Sync {
    type Args: Send;

    async fn decode(&self, args: Self::Args) -> Vec<ConsoleArg>;
}

#[async_trait]
impl ArgDecoder for Page {
    type Args = Vec<RemoteObject>;

    async fn decode(&self, args: Vec<RemoteObject>) -> Vec<ConsoleArg> {
        decode_args(self, &args).await
    }
}

/// Interleave console and binding streams, draining console events first
pub fn merge_page_events<A, C, B>(console: C, calls: B) -> impl Stream<Item = PageEvent<A>>
where
    C: Stream<Item = PageEvent<A>>,
    B: Stream<Item = PageEvent<A>>,
{
    stream::select_with_strategy(console, calls, |_: &mut ()| PollNext::Left)
}

/// Print console events and forward the completion, one event at a time
pub async fn relay<S, D, W>(
    mut events: S,
    decoder: D,
    mut printer: ConsolePrinter<W>,
    binding: String,
    mut slot: CompletionSlot,
) where
    S: Stream<Item = PageEvent<D::Args>> + Unpin,
    D: ArgDecoder,
    W: Write,
{
    while let Some(event) = events.next().await {
        match event {
            PageEvent::Console(raw) => {
                let args = decoder.decode(raw).await;
                if let Err(e) = printer.print(&args) {
                    debug!("console: write failed: {}", e);
                }
            }
            PageEvent::Binding { name, payload } if name == binding => {
                slot.deliver(parse_report(&payload));
            }
            PageEvent::Binding { name, .. } => debug!("ignoring binding call {}", name),
        }
    }
}

/// Listener tasks, aborted when the run is over
struct Listeners(Vec<JoinHandle<()>>);

impl Drop for Listeners {
    fn drop(&mut self) {
        for task in &self.0 {
            task.abort();
        }
    }
}

/// Forwards the first completion message and ignores the rest
#[derive(Debug)]
pub struct CompletionSlot {
    tx: Option<mpsc::Sender<Completion>>,
}

impl CompletionSlot {
    pub fn new(tx: mpsc::Sender<Completion>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Returns whether this message was the one delivered
    pub fn deliver(&mut self, completion: Completion) -> bool {
        match self.tx.take() {
            Some(tx) => {
                if tx.try_send(completion).is_err() {
                    debug!("completion waiter already gone");
                }
                true
            }
            None => {
                debug!("ignoring repeated completion message");
                false
            }
        }
    }
}

pub fn parse_report(payload: &str) -> Completion {
    MochaReport::from_json(payload).map_err(|e| BrowserError::InvalidReport(e.to_string()))
}

/// Wait for the first completion message, bounded by `timeout`
pub async fn await_completion(
    rx: &mut mpsc::Receiver<Completion>,
    timeout: Duration,
) -> Completion {
    match tokio::time::timeout(timeout, rx.recv()).await {
        Ok(Some(completion)) => completion,
        Ok(None) => Err(BrowserError::Disconnected),
        Err(_) => Err(BrowserError::Timeout {
            ms: timeout.as_millis() as u64,
        }),
    }
}
