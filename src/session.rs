use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

use crate::export::{self, ExportFormat, ResultRegion};
use crate::handlers::commands::{help_text, parse_command, Command};
use crate::handlers::form::{load_image, FormError};
use crate::llm::{AnalysisBackend, AnalysisError};
use crate::state::AppState;
use crate::ui::{derive_view, render, LoadingTick, LoadingTicker, ViewState};
use crate::utils::timing::{complete_action_timer, start_action_timer, ActionTimer};

pub const PENDING_NOTICE: &str = "분석이 진행 중이에요. 잠시만 기다려주세요.";
pub const FORM_LOCKED_NOTICE: &str = "지금은 입력을 바꿀 수 없어요. `reset` 후 다시 시도해주세요.";
pub const NO_RESULT_NOTICE: &str = "저장할 분석 결과가 없어요.";
pub const UNREADABLE_INPUT_NOTICE: &str =
    "입력을 읽을 수 없어요. UTF-8 문자로 다시 입력해주세요.";
pub const GOODBYE_NOTICE: &str = "안녕히 가세요! 🌱";

#[derive(Debug)]
struct Completion {
    seq: u64,
    outcome: Result<String, AnalysisError>,
}

/// What the loop should do after handling an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionFlow {
    Redraw,
    Notice(String),
    Unchanged,
    Quit,
}

pub struct Session<B: AnalysisBackend> {
    state: AppState,
    backend: Arc<B>,
    ticker: LoadingTicker,
    loading_interval: Duration,
    export_dir: PathBuf,
    request_seq: u64,
    request_timer: Option<ActionTimer>,
    completion_tx: UnboundedSender<Completion>,
    completion_rx: UnboundedReceiver<Completion>,
    tick_tx: UnboundedSender<LoadingTick>,
    tick_rx: UnboundedReceiver<LoadingTick>,
}

impl<B: AnalysisBackend> Session<B> {
    pub fn new(backend: B, loading_interval: Duration, export_dir: &Path) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        Session {
            state: AppState::default(),
            backend: Arc::new(backend),
            ticker: LoadingTicker::default(),
            loading_interval,
            export_dir: export_dir.to_path_buf(),
            request_seq: 0,
            request_timer: None,
            completion_tx,
            completion_rx,
            tick_tx,
            tick_rx,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    fn form_editable(&self) -> bool {
        matches!(derive_view(&self.state), ViewState::Idle)
    }

    pub async fn handle_line(&mut self, line: &str) -> Result<SessionFlow> {
        match parse_command(line) {
            Ok(Some(command)) => self.handle_command(command).await,
            Ok(None) => Ok(SessionFlow::Unchanged),
            Err(err) => Ok(SessionFlow::Notice(err.to_string())),
        }
    }

    async fn handle_raw_line(&mut self, raw: Vec<u8>) -> Result<SessionFlow> {
        match String::from_utf8(raw) {
            Ok(line) => self.handle_line(&line).await,
            Err(err) => {
                warn!(
                    "Ignoring input line that is not valid UTF-8 ({} bytes): {}",
                    err.as_bytes().len(),
                    err.utf8_error()
                );
                Ok(SessionFlow::Notice(UNREADABLE_INPUT_NOTICE.to_string()))
            }
        }
    }

    pub async fn handle_command(&mut self, command: Command) -> Result<SessionFlow> {
        let flow = match command {
            Command::Photo(path) => self.select_photo(Path::new(&path)).await,
            Command::Name(value) => self.edit_field(|state| state.form.set_name(&value)),
            Command::Age(value) => self.edit_field(|state| state.form.set_age(&value)),
            Command::Traits(value) => self.edit_field(|state| state.form.set_traits(&value)),
            Command::Analyze => self.submit(),
            Command::ExportPng => self.export(ExportFormat::Png).await?,
            Command::ExportPdf => self.export(ExportFormat::Pdf).await?,
            Command::Reset => self.reset(),
            Command::Show => SessionFlow::Redraw,
            Command::Help => SessionFlow::Notice(help_text().to_string()),
            Command::Quit => SessionFlow::Quit,
        };
        Ok(flow)
    }

    async fn select_photo(&mut self, path: &Path) -> SessionFlow {
        if !self.form_editable() {
            return SessionFlow::Notice(FORM_LOCKED_NOTICE.to_string());
        }
        let mut timer = start_action_timer("select_photo", Some(path.display().to_string()));
        let selection = load_image(path).await;
        let status = if selection.is_ok() { "success" } else { "rejected" };
        self.state.apply_image_selection(selection);
        complete_action_timer(&mut timer, status, None);
        SessionFlow::Redraw
    }

    fn edit_field(&mut self, apply: impl FnOnce(&mut AppState)) -> SessionFlow {
        if !self.form_editable() {
            return SessionFlow::Notice(FORM_LOCKED_NOTICE.to_string());
        }
        apply(&mut self.state);
        SessionFlow::Redraw
    }

    /// Starts an analysis unless one is already pending. The backend call
    /// runs on its own task and reports back through the completion channel.
    pub fn submit(&mut self) -> SessionFlow {
        if self.state.is_in_flight() {
            debug!("Ignoring submission while a request is in flight");
            return SessionFlow::Notice(PENDING_NOTICE.to_string());
        }
        if !self.form_editable() {
            return SessionFlow::Notice(FORM_LOCKED_NOTICE.to_string());
        }

        let request = match self.state.begin_request() {
            Ok(request) => request,
            Err(FormError::RequestPending) => {
                return SessionFlow::Notice(PENDING_NOTICE.to_string());
            }
            Err(err) => {
                info!("Submission rejected: {}", err);
                return SessionFlow::Redraw;
            }
        };

        self.request_seq += 1;
        let seq = self.request_seq;
        self.request_timer = Some(start_action_timer(
            "analyze",
            Some(format!(
                "seq={} mime={} image_len={}",
                seq,
                request.mime_type,
                request.encoded_image.len()
            )),
        ));

        let backend = Arc::clone(&self.backend);
        let completion_tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let outcome = backend.analyze(request).await;
            if completion_tx.send(Completion { seq, outcome }).is_err() {
                debug!(seq, "Session closed before analysis completed");
            }
        });

        self.ticker.start(self.loading_interval, self.tick_tx.clone());
        SessionFlow::Redraw
    }

    fn on_completion(&mut self, completion: Completion) -> SessionFlow {
        if completion.seq != self.request_seq {
            debug!(seq = completion.seq, "Dropping completion from an earlier request");
            return SessionFlow::Unchanged;
        }
        self.ticker.stop();

        let status = if completion.outcome.is_ok() { "success" } else { "error" };
        if !self.state.finish_request(completion.outcome) {
            debug!(seq = completion.seq, "Discarding completion with nothing in flight");
            return SessionFlow::Unchanged;
        }
        if let Some(mut timer) = self.request_timer.take() {
            complete_action_timer(&mut timer, status, None);
        }
        SessionFlow::Redraw
    }

    fn on_tick(&mut self, tick: LoadingTick) -> SessionFlow {
        if !self.ticker.is_current(&tick) || !self.state.is_in_flight() {
            return SessionFlow::Unchanged;
        }
        self.state.set_loading_message(tick.index);
        SessionFlow::Redraw
    }

    /// Writes the result card to the export directory. Failures are
    /// returned to the caller untouched.
    pub async fn export(&mut self, format: ExportFormat) -> Result<SessionFlow> {
        let Some(mut region) = ResultRegion::from_state(&self.state) else {
            return Ok(SessionFlow::Notice(NO_RESULT_NOTICE.to_string()));
        };

        let mut timer = start_action_timer("export", Some(format.as_str().to_string()));
        let export_dir = self.export_dir.clone();
        let written = tokio::task::spawn_blocking(move || {
            export::export_result(&mut region, format, &export_dir)
        })
        .await
        .map_err(anyhow::Error::from)
        .and_then(|result| result);

        match written {
            Ok(path) => {
                complete_action_timer(&mut timer, "success", Some(path.display().to_string()));
                Ok(SessionFlow::Notice(format!("저장했어요: {}", path.display())))
            }
            Err(err) => {
                complete_action_timer(&mut timer, "error", None);
                Err(err)
            }
        }
    }

    pub fn reset(&mut self) -> SessionFlow {
        if self.state.is_in_flight() {
            return SessionFlow::Notice(PENDING_NOTICE.to_string());
        }
        self.ticker.stop();
        self.state.reset();
        info!("Session reset");
        SessionFlow::Redraw
    }

    fn draw<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(out)?;
        writeln!(out, "{}", render(&self.state))
    }

    pub async fn run<R, W>(&mut self, mut input: R, out: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        // Partial reads stay in the buffer across select! cancellations.
        let mut pending = Vec::new();
        self.draw(out)?;
        out.flush()?;

        loop {
            let flow = tokio::select! {
                read = input.read_until(b'\n', &mut pending) => {
                    if read? == 0 && pending.is_empty() {
                        Ok(SessionFlow::Quit)
                    } else {
                        let raw = std::mem::take(&mut pending);
                        self.handle_raw_line(raw).await
                    }
                }
                Some(completion) = self.completion_rx.recv() => Ok(self.on_completion(completion)),
                Some(tick) = self.tick_rx.recv() => Ok(self.on_tick(tick)),
                _ = tokio::signal::ctrl_c() => {
                    warn!("Interrupted");
                    Ok(SessionFlow::Quit)
                }
            };

            match flow {
                Ok(SessionFlow::Redraw) => self.draw(out)?,
                Ok(SessionFlow::Notice(text)) => writeln!(out, "{text}")?,
                Ok(SessionFlow::Unchanged) => {}
                Ok(SessionFlow::Quit) => {
                    writeln!(out, "{GOODBYE_NOTICE}")?;
                    out.flush()?;
                    break;
                }
                Err(err) => {
                    error!("Unhandled error: {:#}", err);
                    writeln!(out, "Error: {err:#}")?;
                }
            }
            out.flush()?;
        }

        self.ticker.stop();
        Ok(())
    }

    #[cfg(test)]
    async fn next_background_event(&mut self) -> SessionFlow {
        tokio::select! {
            Some(completion) = self.completion_rx.recv() => self.on_completion(completion),
            Some(tick) = self.tick_rx.recv() => self.on_tick(tick),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Notify;

    use super::*;
    use crate::config::{LOADING_MESSAGES, MISSING_IMAGE_MESSAGE, REQUEST_FAILURE_MESSAGE};
    use crate::handlers::form::tests::tiny_png;
    use crate::llm::gemini::AnalysisFuture;
    use crate::llm::AnalysisRequest;

    const INTERVAL: Duration = Duration::from_millis(2500);

    #[derive(Clone)]
    struct StubBackend {
        calls: Arc<AtomicUsize>,
        release: Arc<Notify>,
        outcome: Result<String, String>,
    }

    impl StubBackend {
        fn new(outcome: Result<&str, &str>) -> Self {
            StubBackend {
                calls: Arc::new(AtomicUsize::new(0)),
                release: Arc::new(Notify::new()),
                outcome: outcome.map(str::to_string).map_err(str::to_string),
            }
        }
    }

    impl AnalysisBackend for StubBackend {
        fn analyze(&self, _request: AnalysisRequest) -> AnalysisFuture {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let release = Arc::clone(&self.release);
            let outcome = self.outcome.clone();
            Box::pin(async move {
                release.notified().await;
                outcome.map_err(AnalysisError)
            })
        }
    }

    async fn session_with_photo(
        backend: StubBackend,
        export_dir: &Path,
    ) -> Session<StubBackend> {
        let photo = export_dir.join("kid.png");
        std::fs::write(&photo, tiny_png()).expect("write photo");
        let mut session = Session::new(backend, INTERVAL, export_dir);
        let flow = session
            .handle_command(Command::Photo(photo.display().to_string()))
            .await
            .expect("photo");
        assert_eq!(flow, SessionFlow::Redraw);
        assert!(session.state().can_submit());
        session
    }

    #[tokio::test(start_paused = true)]
    async fn second_submission_does_not_call_backend_again() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = StubBackend::new(Ok("Bright. Kind. Curious"));
        let calls = Arc::clone(&backend.calls);
        let release = Arc::clone(&backend.release);
        let mut session = session_with_photo(backend, dir.path()).await;

        assert_eq!(session.submit(), SessionFlow::Redraw);
        tokio::task::yield_now().await;
        assert_eq!(
            session.submit(),
            SessionFlow::Notice(PENDING_NOTICE.to_string())
        );
        tokio::task::yield_now().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        release.notify_one();
        loop {
            if session.next_background_event().await == SessionFlow::Redraw
                && !session.state().is_in_flight()
            {
                break;
            }
        }
        assert_eq!(
            derive_view(session.state()),
            ViewState::Result(vec![
                "Bright.".to_string(),
                "Kind.".to_string(),
                "Curious".to_string()
            ])
        );
        assert!(!session.ticker.is_running());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn loading_message_rotates_then_stops_on_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = StubBackend::new(Err("boom"));
        let release = Arc::clone(&backend.release);
        let mut session = session_with_photo(backend, dir.path()).await;

        session.submit();
        assert_eq!(
            derive_view(session.state()),
            ViewState::Loading(LOADING_MESSAGES[0])
        );

        assert_eq!(session.next_background_event().await, SessionFlow::Redraw);
        assert_eq!(
            derive_view(session.state()),
            ViewState::Loading(LOADING_MESSAGES[1])
        );

        release.notify_one();
        while session.state().is_in_flight() {
            session.next_background_event().await;
        }
        assert!(!session.ticker.is_running());
        assert_eq!(derive_view(session.state()), ViewState::Idle);
        assert_eq!(session.state().result.error(), Some(REQUEST_FAILURE_MESSAGE));

        tokio::time::sleep(INTERVAL * 4).await;
        while let Ok(tick) = session.tick_rx.try_recv() {
            assert_eq!(session.on_tick(tick), SessionFlow::Unchanged);
        }
        assert_eq!(session.state().loading_message(), LOADING_MESSAGES[1]);
    }

    #[tokio::test]
    async fn submit_without_photo_shows_inline_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = StubBackend::new(Ok("unused"));
        let calls = Arc::clone(&backend.calls);
        let mut session = Session::new(backend, INTERVAL, dir.path());

        assert_eq!(session.submit(), SessionFlow::Redraw);
        assert_eq!(session.state().result.error(), Some(MISSING_IMAGE_MESSAGE));
        assert!(!session.state().is_in_flight());
        assert!(!session.ticker.is_running());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_is_refused_while_loading_and_total_afterwards() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = StubBackend::new(Ok("Done"));
        let release = Arc::clone(&backend.release);
        let mut session = session_with_photo(backend, dir.path()).await;
        session.handle_command(Command::Name("Mina".to_string())).await.expect("name");

        session.submit();
        assert_eq!(session.reset(), SessionFlow::Notice(PENDING_NOTICE.to_string()));
        assert!(session.state().is_in_flight());
        assert_eq!(
            session.handle_command(Command::Age("7".to_string())).await.expect("age"),
            SessionFlow::Notice(FORM_LOCKED_NOTICE.to_string())
        );

        release.notify_one();
        while session.state().is_in_flight() {
            session.next_background_event().await;
        }
        assert_eq!(session.reset(), SessionFlow::Redraw);
        assert_eq!(session.state(), &AppState::default());
        assert_eq!(session.reset(), SessionFlow::Redraw);
        assert_eq!(session.state(), &AppState::default());
    }

    #[tokio::test]
    async fn export_requires_a_result_then_writes_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = StubBackend::new(Ok("Mina shares. Mina laughs"));
        let release = Arc::clone(&backend.release);
        let mut session = session_with_photo(backend, dir.path()).await;

        assert_eq!(
            session.export(ExportFormat::Png).await.expect("no-op"),
            SessionFlow::Notice(NO_RESULT_NOTICE.to_string())
        );

        release.notify_one();
        session.submit();
        while session.state().is_in_flight() {
            session.next_background_event().await;
        }

        let flow = session.export(ExportFormat::Pdf).await.expect("pdf");
        assert!(matches!(flow, SessionFlow::Notice(text) if text.contains("mindsprout-analysis.pdf")));
        assert!(dir.path().join("mindsprout-analysis.pdf").exists());
        assert!(matches!(derive_view(session.state()), ViewState::Result(_)));
    }

    #[tokio::test]
    async fn run_reads_commands_until_quit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut session = Session::new(StubBackend::new(Ok("unused")), INTERVAL, dir.path());
        let input: &[u8] = b"name Mina\n\nbogus\nquit\nname Ignored\n";
        let mut out = Vec::new();

        session.run(input, &mut out).await.expect("run");

        let screen = String::from_utf8(out).expect("utf8");
        assert!(screen.contains("Mina"));
        assert!(screen.contains("bogus"));
        assert!(screen.contains(GOODBYE_NOTICE));
        assert_eq!(session.state().form.name, "Mina");
    }

    #[tokio::test]
    async fn undecodable_line_is_reported_and_loop_continues() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut session = Session::new(StubBackend::new(Ok("unused")), INTERVAL, dir.path());
        let input: &[u8] = b"name \xC0\xAE\r\nname Mina";
        let mut out = Vec::new();

        session.run(input, &mut out).await.expect("run");

        let screen = String::from_utf8(out).expect("utf8");
        assert!(screen.contains(UNREADABLE_INPUT_NOTICE));
        assert!(screen.contains(GOODBYE_NOTICE));
        assert_eq!(session.state().form.name, "Mina");
    }

    #[tokio::test]
    async fn export_failure_is_reported_and_keeps_result_view() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("not-a-directory");
        std::fs::write(&blocker, b"occupied").expect("write blocker");
        let photo = dir.path().join("kid.png");
        std::fs::write(&photo, tiny_png()).expect("write photo");

        let backend = StubBackend::new(Ok("Mina shares. Mina laughs"));
        backend.release.notify_one();
        let mut session = Session::new(backend, INTERVAL, &blocker);
        session
            .handle_command(Command::Photo(photo.display().to_string()))
            .await
            .expect("photo");
        session.submit();
        while session.state().is_in_flight() {
            session.next_background_event().await;
        }
        let finished = session.state().clone();

        assert!(session.handle_command(Command::ExportPng).await.is_err());
        assert_eq!(session.state(), &finished);

        let input: &[u8] = b"pdf\nquit\n";
        let mut out = Vec::new();
        session.run(input, &mut out).await.expect("loop survives export failure");

        let screen = String::from_utf8(out).expect("utf8");
        assert!(screen.contains("Error: "));
        assert!(screen.contains(GOODBYE_NOTICE));
        assert_eq!(session.state(), &finished);
        assert!(matches!(derive_view(session.state()), ViewState::Result(_)));
    }
}
