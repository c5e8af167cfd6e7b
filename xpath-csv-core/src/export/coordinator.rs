//! Run a set of XPath specs over every XML file in a folder

use std::any::Any;
use std::fs::File;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, error, info, warn};
use rayon::ThreadPoolBuilder;

use super::{
    generate_headers, process_file, CancellationFlag, CsvSink, EventSink, ExportError, ExportEvent,
    FileResult, RunTotals, XPathSpec,
};
use crate::files::list_xml_files;
use crate::xpath::timing_stats;

/// How long the coordinator waits for a result before looking at the stop flag again
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Everything a run needs from its caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportRequest {
    pub folder: PathBuf,
    /// XPath expressions, one per report column
    pub expressions: Vec<String>,
    /// Column headers, same length as `expressions`
    pub headers: Vec<String>,
    pub output_path: PathBuf,
    /// Join multiple values of a file into a single `;`-separated cell
    pub group_matches: bool,
    /// Worker threads; `None` uses all available cores
    pub max_workers: Option<usize>,
}

impl ExportRequest {
    pub fn new(folder: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        ExportRequest {
            folder: folder.into(),
            output_path: output_path.into(),
            ..Self::default()
        }
    }

    /// Add a report column
    pub fn column(mut self, expression: impl Into<String>, header: impl Into<String>) -> Self {
        self.expressions.push(expression.into());
        self.headers.push(header.into());
        self
    }

    pub fn with_specs(mut self, specs: impl IntoIterator<Item = XPathSpec>) -> Self {
        for spec in specs {
            self.expressions.push(spec.expression);
            self.headers.push(spec.header);
        }
        self
    }

    pub fn group_matches(mut self, group: bool) -> Self {
        self.group_matches = group;
        self
    }

    pub fn max_workers(mut self, workers: usize) -> Self {
        self.max_workers = Some(workers);
        self
    }

    /// Size of the worker pool, at least one
    pub fn worker_count(&self) -> usize {
        self.max_workers.unwrap_or_else(num_cpus::get).max(1)
    }

    fn validate(&self) -> Result<Vec<XPathSpec>, ExportError> {
        if !self.folder.is_dir() {
            return Err(ExportError::FolderNotFound(self.folder.clone()));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(ExportError::NoOutputPath);
        }
        XPathSpec::zip(&self.expressions, &self.headers)
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every file was processed
    Completed,
    /// Stopped on request; rows written so far remain
    Aborted,
    /// The folder holds no XML files; nothing was written
    NoFiles,
}

/// Final state of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub status: RunStatus,
    pub total_files: usize,
    pub totals: RunTotals,
    pub output_path: PathBuf,
}

impl RunSummary {
    pub fn title(&self) -> &'static str {
        match self.status {
            RunStatus::Completed => "Export complete",
            RunStatus::Aborted => "Export aborted",
            RunStatus::NoFiles => "No files",
        }
    }

    pub fn message(&self) -> String {
        match self.status {
            RunStatus::Completed => format!(
                "Files scanned: {}\nTotal matches found: {}\nFiles with matches: {}\nFiles written to CSV: {}\nOutput: {}",
                self.totals.processed_files_count,
                self.totals.total_sum_matches,
                self.totals.total_matching_files,
                self.totals.files_written,
                self.output_path.display(),
            ),
            RunStatus::Aborted => format!(
                "Export aborted after {} of {} files. Rows already written remain in {}",
                self.totals.processed_files_count,
                self.total_files,
                self.output_path.display(),
            ),
            RunStatus::NoFiles => "No XML files to export.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Validating,
    Running,
    Aborting,
    Completing,
    Finished,
}

fn enter(state: &mut State, next: State) {
    debug!("export state {:?} -> {:?}", state, next);
    *state = next;
}

/// A file's outcome as sent back by a worker
type WorkerMessage = (String, std::thread::Result<FileResult>);

/// Run `work` for one file, turning a panic into an `Err` outcome
fn guarded(name: String, work: impl FnOnce() -> FileResult) -> WorkerMessage {
    let outcome = panic::catch_unwind(AssertUnwindSafe(work));
    (name, outcome)
}

/// Runs exports and owns the stop signal for them.
///
/// Each run uses its own flag: the one current when the run starts. A
/// `stop()` that lands before the run picks the flag up still stops that run,
/// and a fresh flag is installed once the run ends, so `stop()` after
/// `Finished` leaves the finished run alone and applies to the next one.
/// Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct Exporter {
    cancel: Arc<Mutex<CancellationFlag>>,
}

impl Exporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag of the current (or next) run
    pub fn cancellation_flag(&self) -> CancellationFlag {
        match self.cancel.lock() {
            Ok(flag) => flag.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Request the current run to stop. Safe to call at any time, any number of times.
    pub fn stop(&self) {
        self.cancellation_flag().cancel();
    }

    fn renew_flag(&self) {
        match self.cancel.lock() {
            Ok(mut flag) => *flag = CancellationFlag::new(),
            Err(poisoned) => *poisoned.into_inner() = CancellationFlag::new(),
        }
    }

    /// Run one export, reporting to `events`.
    ///
    /// `Finished` is always the last event, emitted exactly once. Configuration
    /// problems are reported as a warning and fatal output errors as an error;
    /// both are also returned. Stopping is not an error.
    pub fn run<S: EventSink>(&self, request: &ExportRequest, events: S) -> Result<RunSummary, ExportError> {
        self.run_with(request, events, CsvSink::<File>::open)
    }

    fn run_with<W, S, F>(&self, request: &ExportRequest, events: S, open_sink: F) -> Result<RunSummary, ExportError>
    where
        W: Write,
        S: EventSink,
        F: FnOnce(&Path, Vec<String>) -> Result<CsvSink<W>, ExportError>,
    {
        let cancel = self.cancellation_flag();
        let mut state = State::Idle;

        let result = execute(request, &cancel, &events, &mut state, open_sink);
        match &result {
            Ok(summary) => {
                info!("{}: {}", summary.title(), summary.message().replace('\n', "; "));
                events.emit(ExportEvent::info(summary.title(), summary.message()));
            }
            Err(e) if e.is_configuration() => {
                warn!("{}", e);
                events.emit(ExportEvent::warning(configuration_title(e), e.to_string()));
            }
            Err(e) => {
                error!("Export failed: {}", e);
                events.emit(ExportEvent::error("Export failed", e.to_string()));
            }
        }

        self.renew_flag();
        enter(&mut state, State::Finished);
        debug!("{}", timing_stats());
        events.emit(ExportEvent::Finished);
        result
    }
}

fn execute<W, S, F>(
    request: &ExportRequest,
    cancel: &CancellationFlag,
    events: &S,
    state: &mut State,
    open_sink: F,
) -> Result<RunSummary, ExportError>
where
    W: Write,
    S: EventSink,
    F: FnOnce(&Path, Vec<String>) -> Result<CsvSink<W>, ExportError>,
{
    enter(state, State::Validating);
    let specs = request.validate()?;
    let files = list_xml_files(&request.folder).map_err(|e| ExportError::Listing(e.to_string()))?;

    let mut summary = RunSummary {
        status: RunStatus::NoFiles,
        total_files: files.len(),
        totals: RunTotals::default(),
        output_path: request.output_path.clone(),
    };
    if files.is_empty() {
        return Ok(summary);
    }

    enter(state, State::Running);
    let mut csv = open_sink(&request.output_path, generate_headers(&specs))?;
    let workers = request.worker_count();
    info!(
        "Exporting {} files from {} with {} expressions on {} workers",
        files.len(),
        request.folder.display(),
        specs.len(),
        workers
    );

    let pool = ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("xpath-csv-worker-{}", i))
        .build()?;
    let (tx, rx) = crossbeam_channel::unbounded::<WorkerMessage>();
    let specs = Arc::new(specs);
    let folder: Arc<Path> = Arc::from(request.folder.as_path());

    for name in files.iter().cloned() {
        let tx = tx.clone();
        let specs = Arc::clone(&specs);
        let folder = Arc::clone(&folder);
        let cancel = cancel.clone();
        let group = request.group_matches;
        pool.spawn(move || {
            let message = guarded(name.clone(), || process_file(&name, &folder, &specs, group, &cancel));
            // The coordinator stops listening once a run is aborted
            let _ = tx.send(message);
        });
    }
    drop(tx);

    let drained = drain(&rx, files.len(), &mut csv, &mut summary.totals, cancel, events);
    if drained.is_err() {
        // Let queued files skip their work
        cancel.cancel();
    }
    let aborted = drained?;

    csv.close()?;
    if aborted {
        enter(state, State::Aborting);
        summary.status = RunStatus::Aborted;
    } else {
        enter(state, State::Completing);
        summary.status = RunStatus::Completed;
    }
    Ok(summary)
}

/// Handle results in completion order. Returns whether the run was stopped.
fn drain<W: Write, S: EventSink>(
    rx: &Receiver<WorkerMessage>,
    total_files: usize,
    csv: &mut CsvSink<W>,
    totals: &mut RunTotals,
    cancel: &CancellationFlag,
    events: &S,
) -> Result<bool, ExportError> {
    while totals.processed_files_count < total_files {
        if cancel.is_cancelled() {
            return Ok(true);
        }

        let (name, outcome) = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(message) => message,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                warn!(
                    "Workers stopped after {} of {} files",
                    totals.processed_files_count, total_files
                );
                break;
            }
        };

        let result = match outcome {
            Ok(result) => result,
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                error!("{}: processing failed: {}", name, reason);
                events.emit(ExportEvent::FileStatus(format!("Error processing {}: {}", name, reason)));
                FileResult::empty()
            }
        };

        for diagnostic in &result.diagnostics {
            events.emit(ExportEvent::FileStatus(diagnostic.clone()));
        }
        if !result.rows.is_empty() {
            csv.write_rows(&result.rows)?;
        }
        totals.record(&result);

        let processed = totals.processed_files_count;
        events.emit(ExportEvent::FileStatus(format!(
            "Processing file {} of {}: {}",
            processed, total_files, name
        )));
        events.emit(ExportEvent::Progress((processed * 100 / total_files) as u8));
    }

    Ok(cancel.is_cancelled() && totals.processed_files_count < total_files)
}

fn configuration_title(error: &ExportError) -> &'static str {
    match error {
        ExportError::FolderNotFound(_) => "Folder not found",
        ExportError::NoOutputPath => "No output path",
        ExportError::HeaderMismatch { .. } => "Header mismatch",
        _ => "Invalid export",
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::EventLog;
    use std::fs;

    fn two_file_folder() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("a.xml"),
            r#"<root><item id="1">foo</item><item id="2">bar</item></root>"#,
        )
        .unwrap();
        fs::write(dir.path().join("b.xml"), r#"<root><item id="3">baz</item></root>"#).unwrap();
        dir
    }

    fn finished_count(log: &EventLog) -> usize {
        log.count(|e| matches!(e, ExportEvent::Finished))
    }

    #[test]
    fn test_worker_count_at_least_one() {
        let request = ExportRequest::new("in", "out.csv").max_workers(0);
        assert_eq!(request.worker_count(), 1);
        assert!(ExportRequest::new("in", "out.csv").worker_count() >= 1);
    }

    #[test]
    fn test_missing_folder_is_warning() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.csv");
        let request = ExportRequest::new(dir.path().join("nope"), &out).column("//a", "A");
        let log = EventLog::new();

        let err = Exporter::new().run(&request, &log).unwrap_err();
        assert!(matches!(err, ExportError::FolderNotFound(_)));
        assert!(!out.exists());
        let events = log.events();
        assert!(matches!(&events[0], ExportEvent::Warning { title, .. } if title == "Folder not found"));
        assert_eq!(events.last(), Some(&ExportEvent::Finished));
        assert_eq!(finished_count(&log), 1);
    }

    #[test]
    fn test_empty_output_path_rejected() {
        let dir = two_file_folder();
        let request = ExportRequest::new(dir.path(), "").column("//a", "A");
        let err = Exporter::new().run(&request, EventLog::new()).unwrap_err();
        assert!(matches!(err, ExportError::NoOutputPath));
    }

    #[test]
    fn test_header_count_mismatch_rejected() {
        let dir = two_file_folder();
        let out = dir.path().join("out.csv");
        let mut request = ExportRequest::new(dir.path(), &out).column("//a", "A");
        request.headers.push("Extra".to_string());
        let log = EventLog::new();

        let err = Exporter::new().run(&request, &log).unwrap_err();
        assert!(matches!(err, ExportError::HeaderMismatch { expressions: 1, headers: 2 }));
        assert!(!out.exists());
        assert_eq!(finished_count(&log), 1);
    }

    #[test]
    fn test_no_files_is_informational() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.csv");
        let request = ExportRequest::new(dir.path(), &out).column("//a", "A");
        let log = EventLog::new();

        let summary = Exporter::new().run(&request, &log).unwrap();
        assert_eq!(summary.status, RunStatus::NoFiles);
        assert!(!out.exists());
        assert!(matches!(&log.events()[0], ExportEvent::Info { title, .. } if title == "No files"));
        assert_eq!(finished_count(&log), 1);
    }

    #[test]
    fn test_progress_reaches_hundred() {
        let dir = two_file_folder();
        let out = dir.path().join("out.csv");
        let request = ExportRequest::new(dir.path(), &out)
            .column("//item/text()", "Text")
            .max_workers(2);
        let log = EventLog::new();

        let summary = Exporter::new().run(&request, &log).unwrap();
        assert_eq!(summary.status, RunStatus::Completed);

        let progress: Vec<u8> = log
            .events()
            .iter()
            .filter_map(|e| match e {
                ExportEvent::Progress(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![50, 100]);
        assert_eq!(
            log.count(|e| matches!(e, ExportEvent::FileStatus(m) if m.starts_with("Processing file"))),
            2
        );
    }

    #[test]
    fn test_stop_before_run_starts_aborts_that_run() {
        let dir = two_file_folder();
        let out = dir.path().join("out.csv");
        let request = ExportRequest::new(dir.path(), &out).column("//item", "Items");
        let exporter = Exporter::new();
        let run_flag = exporter.cancellation_flag();

        exporter.clone().stop();
        let log = EventLog::new();
        let summary = exporter.run(&request, &log).unwrap();
        assert_eq!(summary.status, RunStatus::Aborted);
        assert_eq!(summary.totals.processed_files_count, 0);
        assert!(matches!(&log.events()[0], ExportEvent::Info { title, .. } if title == "Export aborted"));
        assert_eq!(finished_count(&log), 1);

        // The next run gets a fresh flag; the aborted run's flag stays set for its stragglers
        let summary = exporter.run(&request, EventLog::new()).unwrap();
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.totals.processed_files_count, 2);
        assert!(run_flag.is_cancelled());
    }

    #[test]
    fn test_stop_after_finish_leaves_finished_run_alone() {
        let dir = two_file_folder();
        let out = dir.path().join("out.csv");
        let request = ExportRequest::new(dir.path(), &out).column("//item", "Items");
        let exporter = Exporter::new();
        let run_flag = exporter.cancellation_flag();

        let summary = exporter.run(&request, EventLog::new()).unwrap();
        exporter.stop();
        exporter.stop();
        assert_eq!(summary.status, RunStatus::Completed);
        assert!(!run_flag.is_cancelled());
        assert!(exporter.cancellation_flag().is_cancelled());
    }

    #[test]
    fn test_worker_panic_counts_as_processed() {
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(guarded("a.xml".to_string(), || panic!("boom"))).unwrap();
        let rows = vec![[("Filename", "b"), ("Text", "x")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()];
        tx.send(guarded("b.xml".to_string(), || FileResult {
            rows,
            total_matches: 1,
            had_matches: true,
            diagnostics: Vec::new(),
        }))
        .unwrap();
        drop(tx);

        let headers = vec!["Filename".to_string(), "Text".to_string()];
        let mut csv = CsvSink::from_writer(Vec::new(), headers).unwrap();
        let mut totals = RunTotals::default();
        let log = EventLog::new();
        let aborted = drain(&rx, 2, &mut csv, &mut totals, &CancellationFlag::new(), &log).unwrap();

        assert!(!aborted);
        assert_eq!(totals.processed_files_count, 2);
        assert_eq!(totals.total_sum_matches, 1);
        assert_eq!(totals.files_written, 1);
        assert_eq!(
            log.count(|e| matches!(e, ExportEvent::FileStatus(m) if m == "Error processing a.xml: boom")),
            1
        );
        assert_eq!(log.count(|e| *e == ExportEvent::Progress(100)), 1);
        let written = String::from_utf8(csv.close().unwrap()).unwrap();
        assert_eq!(written, "\"Filename\",\"Text\"\n\"b\",\"x\"\n");
    }

    /// Accepts `limit` bytes, then fails every write
    struct FailingWriter {
        written: usize,
        limit: usize,
    }

    impl Write for FailingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.written + buf.len() > self.limit {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
            }
            self.written += buf.len();
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_mid_run_is_error() {
        let dir = two_file_folder();
        let request = ExportRequest::new(dir.path(), dir.path().join("out.csv")).column("//item/text()", "Text");
        let exporter = Exporter::new();
        let run_flag = exporter.cancellation_flag();
        let log = EventLog::new();

        let err = exporter
            .run_with(&request, &log, |_, headers| {
                CsvSink::from_writer(FailingWriter { written: 0, limit: 20 }, headers)
            })
            .unwrap_err();

        assert!(matches!(err, ExportError::Io(_)));
        assert!(run_flag.is_cancelled());
        let events = log.events();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, ExportEvent::Error { title, .. } if title == "Export failed"))
                .count(),
            1
        );
        assert_eq!(events.last(), Some(&ExportEvent::Finished));
        assert_eq!(finished_count(&log), 1);
    }

    #[test]
    fn test_unwritable_output_is_error() {
        let dir = two_file_folder();
        let out = dir.path().join("missing-dir").join("out.csv");
        let request = ExportRequest::new(dir.path(), &out).column("//item", "Items");
        let log = EventLog::new();

        let err = Exporter::new().run(&request, &log).unwrap_err();
        assert!(matches!(err, ExportError::Io(_)));
        assert!(!err.is_configuration());
        let events = log.events();
        assert!(matches!(&events[0], ExportEvent::Error { .. }));
        assert_eq!(events.last(), Some(&ExportEvent::Finished));
    }

    #[test]
    fn test_summary_messages() {
        let summary = RunSummary {
            status: RunStatus::Completed,
            total_files: 3,
            totals: RunTotals {
                total_sum_matches: 6,
                total_matching_files: 2,
                processed_files_count: 3,
                files_written: 2,
            },
            output_path: PathBuf::from("out.csv"),
        };
        let message = summary.message();
        assert!(message.contains("Files scanned: 3"));
        assert!(message.contains("Total matches found: 6"));
        assert!(message.contains("Files with matches: 2"));
        assert!(message.contains("Files written to CSV: 2"));

        let aborted = RunSummary {
            status: RunStatus::Aborted,
            ..summary
        };
        assert_eq!(aborted.title(), "Export aborted");
        assert!(aborted.message().contains("aborted after 3 of 3"));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u32);
        assert_eq!(panic_message(payload.as_ref()), "worker panicked");
    }
}
