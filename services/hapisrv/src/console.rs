//! Admin console - line-oriented TCP shell
//!
//! Each connection gets a [`Session`]; the number of concurrent sessions is
//! bounded by a semaphore. Command handling is socket-free
//! ([`Console::handle_line`]) so it can be driven directly.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use errors::{HapiError, HapiResult};
use hapi_model::{ControlSignal, IntervalJob, JobKind, JobTarget, Rtu, Site, TimeUnit};
use hapi_store::Store;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::device::link::ENVIRONMENT;
use crate::scheduler::{ControlHandle, FireOutcome, JobExecutor, SchedulerState};
use crate::status::StatusReporter;

const PROMPT: &str = "HAPI> ";

const HELP: &str = "\
Commands:\r
  connect <rtu>          select a device and read its environment\r
  cmd <command>          send a command to the selected device\r
  run command <command>  run an ad-hoc job on the selected device\r
  run sequence <name>    run a stored sequence on the selected device\r
  rtus                   list online devices\r
  status                 show node status\r
  continue | pause | stop  control the scheduler\r
  help                   this text\r
  quit                   close the session\r
";

/// Per-connection state
#[derive(Debug, Default)]
pub struct Session {
    pub selected: Option<Rtu>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleReply {
    pub text: String,
    pub close: bool,
}

impl ConsoleReply {
    fn text(text: impl Into<String>) -> Self {
        let mut text = text.into();
        if !text.is_empty() && !text.ends_with("\r\n") {
            text.push_str("\r\n");
        }
        Self { text, close: false }
    }

    fn close(text: impl Into<String>) -> Self {
        Self {
            close: true,
            ..Self::text(text)
        }
    }
}

pub struct Console {
    site: Site,
    store: Store,
    executor: Arc<JobExecutor>,
    control: Option<ControlHandle>,
    status: Arc<StatusReporter>,
    command_timeout: Duration,
}

impl Console {
    pub fn new(
        site: Site,
        store: Store,
        executor: Arc<JobExecutor>,
        control: Option<ControlHandle>,
        status: Arc<StatusReporter>,
        command_timeout: Duration,
    ) -> Self {
        Self {
            site,
            store,
            executor,
            control,
            status,
            command_timeout,
        }
    }

    pub fn welcome(&self) -> String {
        self.site.welcome_banner()
    }

    pub async fn handle_line(&self, session: &mut Session, line: &str) -> ConsoleReply {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word.to_lowercase().as_str() {
            "" => ConsoleReply::text(""),
            "help" | "?" => ConsoleReply::text(HELP),
            "quit" | "exit" => ConsoleReply::close("Bye."),
            "connect" => self.connect(session, rest).await,
            "cmd" => self.command(session, rest).await,
            "run" => self.run(session, rest).await,
            "rtus" => self.rtus(),
            "status" => self.status(),
            "continue" => self.control(ControlSignal::Run),
            "pause" => self.control(ControlSignal::Pause),
            "stop" => self.control(ControlSignal::Stop),
            other => ConsoleReply::text(format!("Unknown command '{}'. Type 'help'.", other)),
        }
    }

    async fn connect(&self, session: &mut Session, rtuid: &str) -> ConsoleReply {
        if rtuid.is_empty() {
            return ConsoleReply::text("Usage: connect <rtu>");
        }
        let Some(rtu) = self.executor.registry().find(rtuid) else {
            return ConsoleReply::text(format!("{} is not online.", rtuid));
        };
        let reply = match self.send(&rtu, ENVIRONMENT).await {
            Ok(response) => format!("Connected to {}.\r\n{}", rtu.rtuid, response.trim()),
            Err(e) => format!("Selected {}, but it did not answer: {}", rtu.rtuid, e),
        };
        session.selected = Some(rtu);
        ConsoleReply::text(reply)
    }

    async fn command(&self, session: &Session, command: &str) -> ConsoleReply {
        let Some(rtu) = session.selected.as_ref() else {
            return ConsoleReply::text("No device selected. Use 'connect <rtu>' first.");
        };
        if command.is_empty() {
            return ConsoleReply::text("Usage: cmd <command>");
        }
        match self.send(rtu, command).await {
            Ok(response) => {
                if let Err(e) = self
                    .store
                    .insert_command_log(&rtu.rtuid, command, Utc::now())
                    .await
                {
                    warn!("Failed to log console command: {}", e);
                }
                ConsoleReply::text(response.trim().to_string())
            },
            Err(e) => ConsoleReply::text(format!("Error: {}", e)),
        }
    }

    async fn run(&self, session: &Session, args: &str) -> ConsoleReply {
        let Some(rtu) = session.selected.as_ref() else {
            return ConsoleReply::text("No device selected. Use 'connect <rtu>' first.");
        };
        let (what, name) = match args.split_once(char::is_whitespace) {
            Some((what, name)) => (what, name.trim()),
            None => (args, ""),
        };
        if name.is_empty() {
            return ConsoleReply::text("Usage: run command <command> | run sequence <name>");
        }

        let (target, sequence) = match what {
            "command" => (JobTarget::Command(name.to_string()), None),
            "sequence" => match self.store.load_sequence(name).await {
                Ok(seq) if !seq.is_empty() => (JobTarget::Sequence(name.to_string()), Some(seq)),
                Ok(_) => return ConsoleReply::text(format!("Sequence '{}' has no steps.", name)),
                Err(e) => return ConsoleReply::text(format!("Error: {}", e)),
            },
            other => {
                return ConsoleReply::text(format!("Cannot run '{}'; use command or sequence.", other))
            },
        };

        let job = IntervalJob {
            job_id: 0,
            job_name: format!("console {} {}", what, name),
            rtuid: rtu.rtuid.clone(),
            target,
            kind: JobKind::Command,
            time_unit: TimeUnit::Minute,
            interval: 0,
            at_time: None,
            enabled: true,
            timeout_secs: self.command_timeout.as_secs().max(1),
        };
        // Ad-hoc runs are operator actions and ignore the pause flag
        let outcome = self
            .executor
            .fire(&job, sequence.as_ref(), SchedulerState::Running)
            .await;

        let text = match outcome {
            FireOutcome::Completed {
                response,
                failed_steps,
            } => {
                let mut text = String::from("Done.");
                if failed_steps > 0 {
                    text = format!("Done with {} failed steps.", failed_steps);
                }
                if let Some(response) = response {
                    text.push_str("\r\n");
                    text.push_str(response.trim());
                }
                text
            },
            FireOutcome::RtuOffline => format!("{} is no longer online.", rtu.rtuid),
            FireOutcome::Failed => "Failed; see log.".to_string(),
            FireOutcome::Skipped => "Skipped.".to_string(),
        };
        ConsoleReply::text(text)
    }

    fn rtus(&self) -> ConsoleReply {
        let online = self.executor.registry().online();
        if online.is_empty() {
            return ConsoleReply::text("No RTUs online.");
        }
        let lines: Vec<String> = online
            .iter()
            .map(|r| format!("{:<12} {:<16} {:<6} {}", r.rtuid, r.address, r.protocol, r.version))
            .collect();
        ConsoleReply::text(lines.join("\r\n"))
    }

    fn status(&self) -> ConsoleReply {
        let snapshot = self
            .status
            .snapshot(self.executor.registry().online_count());
        let scheduler = match &self.control {
            Some(control) => control.state().to_string(),
            None => "not running".to_string(),
        };
        ConsoleReply::text(format!(
            "Version:   {}\r\nHost:      {} ({})\r\nUptime:    {}s (host {}s)\r\nCPU:       {:.1}%\r\nMemory:    {:.1}%\r\nRTUs:      {}\r\nClients:   {}\r\nScheduler: {}",
            snapshot.software_version,
            snapshot.host,
            snapshot.platform,
            snapshot.uptime_secs,
            snapshot.host_uptime_secs,
            snapshot.cpu_percent,
            snapshot.memory_percent,
            snapshot.rtus_online,
            snapshot.broker_clients,
            scheduler
        ))
    }

    fn control(&self, signal: ControlSignal) -> ConsoleReply {
        let Some(control) = &self.control else {
            return ConsoleReply::text("The scheduler is not running on this node.");
        };
        match control.send(signal) {
            Ok(()) => ConsoleReply::text(format!("Sent '{}'; takes effect on the next tick.", signal)),
            Err(e) => ConsoleReply::text(format!("Error: {}", e)),
        }
    }

    async fn send(&self, rtu: &Rtu, command: &str) -> HapiResult<String> {
        let registry = self.executor.registry();
        registry
            .link()
            .send(&rtu.address, registry.device_port(), self.command_timeout, command)
            .await
    }
}

/// Bind the console listener; failure here is a startup failure
pub async fn bind(addr: &str) -> HapiResult<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| HapiError::StartupFailed(format!("Console cannot bind {}: {}", addr, e)))
}

/// Accept sessions until cancelled
pub async fn serve(
    listener: TcpListener,
    console: Arc<Console>,
    max_sessions: usize,
    cancel: CancellationToken,
) {
    let sessions = Arc::new(Semaphore::new(max_sessions));
    if let Ok(addr) = listener.local_addr() {
        info!("Console listening on {}", addr);
    }

    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        let (mut stream, peer) = match accepted {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Console accept failed: {}", e);
                continue;
            },
        };

        let Ok(permit) = Arc::clone(&sessions).try_acquire_owned() else {
            debug!("Rejecting console session from {}: pool full", peer);
            let _ = stream.write_all(b"Too many sessions; try again later.\r\n").await;
            continue;
        };

        let console = Arc::clone(&console);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            info!("Console session from {}", peer);
            if let Err(e) = run_session(stream, &console, cancel).await {
                debug!("Console session {} ended: {}", peer, e);
            }
            drop(permit);
        });
    }
    info!("Console stopped");
}

async fn run_session(
    stream: TcpStream,
    console: &Console,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut session = Session::default();

    writer.write_all(console.welcome().as_bytes()).await?;
    writer.write_all(PROMPT.as_bytes()).await?;

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };

        let reply = console.handle_line(&mut session, &line).await;
        writer.write_all(reply.text.as_bytes()).await?;
        if reply.close {
            break;
        }
        writer.write_all(PROMPT.as_bytes()).await?;
    }
    writer.shutdown().await
}
