//! Background polling of the watch list.
//!
//! [`RunningProcessService`] is the handle side of an actor/handle pair: a
//! single [`Poller`] task owns the cached matches and mutates them only in
//! response to its own timer or to request messages from the handle, so an
//! explicit query never overlaps a scan.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Interval;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::ProcessDefinition;
use crate::ProcessTable;
use crate::ProcessToClose;
use crate::RunningProcessInfo;
use crate::ServiceError;
use crate::SysinfoProcessTable;
use crate::match_processes;
use crate::processes_to_close;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// Published when the descriptions of the processes to close change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessesToCloseChanged {
    pub processes: Arc<[ProcessToClose]>,
}

type Reply<T> = oneshot::Sender<T>;

enum Request {
    Start(Reply<Result<(), ServiceError>>),
    Stop(Reply<Result<(), ServiceError>>),
    IsRunning(Reply<bool>),
    RunningProcesses(Reply<Arc<[RunningProcessInfo]>>),
    ProcessesToClose(Reply<Arc<[ProcessToClose]>>),
}

/// Watches for running processes matching a fixed set of definitions.
///
/// Must be created inside a tokio runtime. Dropping the service cancels its
/// task; [`RunningProcessService::shutdown`] also waits for it.
pub struct RunningProcessService {
    requests: mpsc::UnboundedSender<Request>,
    changes: broadcast::Sender<ProcessesToCloseChanged>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RunningProcessService {
    pub fn new(definitions: Vec<ProcessDefinition>) -> Result<Self, ServiceError> {
        Self::with_table(
            definitions,
            Arc::new(SysinfoProcessTable::new()),
            DEFAULT_POLL_INTERVAL,
        )
    }

    pub fn with_table(
        definitions: Vec<ProcessDefinition>,
        table: Arc<dyn ProcessTable>,
        poll_interval: Duration,
    ) -> Result<Self, ServiceError> {
        if definitions.is_empty() {
            return Err(ServiceError::NoDefinitions);
        }
        let (requests, receiver) = mpsc::unbounded_channel();
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let poller = Poller {
            definitions: definitions.into(),
            table,
            requests: receiver,
            changes: changes.clone(),
            cancel: cancel.clone(),
            poll_interval,
            polling: false,
            running: Arc::from([]),
            to_close: Arc::from([]),
            last_descriptions: Vec::new(),
        };
        let task = tokio::spawn(poller.run());
        Ok(Self {
            requests,
            changes,
            cancel,
            task: Some(task),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProcessesToCloseChanged> {
        self.changes.subscribe()
    }

    /// Starts polling. Fails with [`ServiceError::AlreadyRunning`] if polling
    /// is already active.
    pub async fn start(&self) -> Result<(), ServiceError> {
        self.request(Request::Start).await?
    }

    /// Stops polling. Once this returns no further change events are sent
    /// until the next [`RunningProcessService::start`].
    pub async fn stop(&self) -> Result<(), ServiceError> {
        self.request(Request::Stop).await?
    }

    pub async fn is_running(&self) -> Result<bool, ServiceError> {
        self.request(Request::IsRunning).await
    }

    /// Rescans and returns the current matches.
    pub async fn running_processes(&self) -> Result<Arc<[RunningProcessInfo]>, ServiceError> {
        self.request(Request::RunningProcesses).await
    }

    /// Rescans and returns the current matches, one per executable path.
    pub async fn processes_to_close(&self) -> Result<Arc<[ProcessToClose]>, ServiceError> {
        self.request(Request::ProcessesToClose).await
    }

    /// Cancels the poller and waits for it to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::warn!("running process poller ended abnormally: {err}");
            }
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Request,
    ) -> Result<T, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(make(tx))
            .map_err(|_| ServiceError::Stopped)?;
        rx.await.map_err(|_| ServiceError::Stopped)
    }
}

impl Drop for RunningProcessService {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Poller {
    definitions: Arc<[ProcessDefinition]>,
    table: Arc<dyn ProcessTable>,
    requests: mpsc::UnboundedReceiver<Request>,
    changes: broadcast::Sender<ProcessesToCloseChanged>,
    cancel: CancellationToken,
    poll_interval: Duration,
    polling: bool,
    running: Arc<[RunningProcessInfo]>,
    to_close: Arc<[ProcessToClose]>,
    last_descriptions: Vec<String>,
}

impl Poller {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                request = self.requests.recv() => {
                    let Some(request) = request else {
                        break;
                    };
                    self.handle(request, &mut ticker).await;
                }
                _ = ticker.tick(), if self.polling => self.poll().await,
            }
        }
        tracing::debug!("running process poller exited");
    }

    async fn handle(&mut self, request: Request, ticker: &mut Interval) {
        match request {
            Request::Start(reply) => {
                let result = if self.polling {
                    Err(ServiceError::AlreadyRunning)
                } else {
                    self.polling = true;
                    ticker.reset_immediately();
                    tracing::debug!(interval = ?self.poll_interval, "polling started");
                    Ok(())
                };
                let _ = reply.send(result);
            }
            Request::Stop(reply) => {
                let result = if self.polling {
                    self.polling = false;
                    tracing::debug!("polling stopped");
                    Ok(())
                } else {
                    Err(ServiceError::NotRunning)
                };
                let _ = reply.send(result);
            }
            Request::IsRunning(reply) => {
                let _ = reply.send(self.polling);
            }
            Request::RunningProcesses(reply) => {
                self.refresh().await;
                let _ = reply.send(Arc::clone(&self.running));
            }
            Request::ProcessesToClose(reply) => {
                self.refresh().await;
                let _ = reply.send(Arc::clone(&self.to_close));
            }
        }
    }

    async fn refresh(&mut self) {
        let definitions = Arc::clone(&self.definitions);
        let table = Arc::clone(&self.table);
        let scanned =
            tokio::task::spawn_blocking(move || match_processes(&definitions, table.as_ref()))
                .await;
        match scanned {
            Ok(Ok(running)) => {
                self.to_close = processes_to_close(&running).into();
                self.running = running.into();
            }
            Ok(Err(err)) => tracing::warn!("process scan failed: {err}"),
            Err(err) => tracing::warn!("process scan task failed: {err}"),
        }
    }

    async fn poll(&mut self) {
        self.refresh().await;
        let descriptions: Vec<String> = self
            .to_close
            .iter()
            .map(|process| process.description().to_string())
            .collect();
        if descriptions == self.last_descriptions {
            return;
        }
        tracing::info!(count = descriptions.len(), "processes to close changed");
        self.last_descriptions = descriptions;
        let _ = self.changes.send(ProcessesToCloseChanged {
            processes: Arc::clone(&self.to_close),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTable;
    use crate::testing::process;
    use pretty_assertions::assert_eq;
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::time::timeout;

    const INTERVAL: Duration = Duration::from_millis(20);
    const SETTLE: Duration = Duration::from_millis(150);

    fn app_definition() -> Vec<ProcessDefinition> {
        vec![ProcessDefinition::new("app").with_description("App")]
    }

    fn descriptions(event: &ProcessesToCloseChanged) -> Vec<&str> {
        event
            .processes
            .iter()
            .map(ProcessToClose::description)
            .collect()
    }

    #[tokio::test]
    async fn empty_definitions_are_rejected() {
        let table = Arc::new(FakeTable::default());
        assert!(matches!(
            RunningProcessService::with_table(Vec::new(), table, INTERVAL),
            Err(ServiceError::NoDefinitions)
        ));
    }

    #[tokio::test]
    async fn start_and_stop_are_guarded() {
        let table = Arc::new(FakeTable::default());
        let service =
            RunningProcessService::with_table(app_definition(), table, INTERVAL).expect("service");

        assert_eq!(service.stop().await, Err(ServiceError::NotRunning));
        service.start().await.expect("start");
        assert_eq!(service.start().await, Err(ServiceError::AlreadyRunning));
        assert!(service.is_running().await.expect("running"));
        service.stop().await.expect("stop");
        assert!(!service.is_running().await.expect("running"));
        service.start().await.expect("restart");
        service.shutdown().await;
    }

    #[tokio::test]
    async fn changes_are_published_only_when_descriptions_differ() {
        let table = Arc::new(FakeTable::new(vec![process(
            1,
            "app.exe",
            r"C:\App\app.exe",
            None,
        )]));
        let service =
            RunningProcessService::with_table(app_definition(), table.clone(), INTERVAL)
                .expect("service");
        let mut changes = service.subscribe();
        service.start().await.expect("start");

        let first = timeout(Duration::from_secs(5), changes.recv())
            .await
            .expect("first change")
            .expect("channel open");
        assert_eq!(descriptions(&first), vec!["App"]);

        // A second instance of the same executable does not change the view.
        table.replace(vec![
            process(1, "app.exe", r"C:\App\app.exe", None),
            process(2, "app.exe", r"C:\App\app.exe", None),
        ]);
        tokio::time::sleep(SETTLE).await;
        assert_eq!(changes.try_recv(), Err(TryRecvError::Empty));

        table.replace(vec![
            process(1, "app.exe", r"C:\App\app.exe", None),
            process(3, "app.exe", r"D:\Portable\app.exe", None),
        ]);
        let second = timeout(Duration::from_secs(5), changes.recv())
            .await
            .expect("second change")
            .expect("channel open");
        assert_eq!(descriptions(&second), vec!["App", "App"]);

        service.stop().await.expect("stop");
        table.replace(Vec::new());
        tokio::time::sleep(SETTLE).await;
        assert_eq!(changes.try_recv(), Err(TryRecvError::Empty));
        service.shutdown().await;
    }

    #[tokio::test]
    async fn queries_rescan_without_polling() {
        let table = Arc::new(FakeTable::default());
        let service =
            RunningProcessService::with_table(app_definition(), table.clone(), INTERVAL)
                .expect("service");
        assert!(service.running_processes().await.expect("query").is_empty());

        table.replace(vec![
            process(1, "app.exe", r"C:\App\app.exe", None),
            process(2, "app.exe", r"C:\App\app.exe", None),
        ]);
        let running = service.running_processes().await.expect("query");
        assert_eq!(running.len(), 2);
        let to_close = service.processes_to_close().await.expect("query");
        assert_eq!(to_close.len(), 1);
        assert_eq!(to_close[0].path(), r"C:\App\app.exe");
        assert_eq!(to_close[0].name(), "app");
        service.shutdown().await;
    }
}
