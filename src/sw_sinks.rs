use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::info;
use serde::Serialize;

use crate::sw_engine::SimulationRun;
use crate::sw_error::SinkError;
use crate::sw_interface::{EventSink, PeerId, SimTime, SwarmEvent};

// ============================================================================
// Result Sinks
// ============================================================================

/// Destination for finished simulation runs
pub trait ResultSink {
    fn write_run(&mut self, run: &SimulationRun) -> Result<(), SinkError>;

    /// Write a batch of runs (a sweep). Defaults to one `write_run` per run.
    fn write_runs(&mut self, runs: &[SimulationRun]) -> Result<(), SinkError> {
        for run in runs {
            self.write_run(run)?;
        }
        Ok(())
    }
}

/// Keeps runs in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub runs: Vec<SimulationRun>,
}

impl ResultSink for MemorySink {
    fn write_run(&mut self, run: &SimulationRun) -> Result<(), SinkError> {
        self.runs.push(run.clone());
        Ok(())
    }
}

/// Pretty-printed JSON file. A single run is written as an object, a batch
/// as an array; each write replaces the file.
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), SinkError> {
        let mut writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        info!("results written to {}", self.path.display());
        Ok(())
    }
}

impl ResultSink for JsonFileSink {
    fn write_run(&mut self, run: &SimulationRun) -> Result<(), SinkError> {
        self.write_value(run)
    }

    fn write_runs(&mut self, runs: &[SimulationRun]) -> Result<(), SinkError> {
        self.write_value(runs)
    }
}

pub const CSV_HEADER: &str =
    "run,peer_id,time_ms,bandwidth_kbps,latency_ms,jitter_pct,contribution_ratio,network_condition,churn_rate";

/// One CSV row per peer snapshot. The file is truncated on the first write
/// and appended to afterwards, so a sweep lands in one table.
pub struct CsvFileSink {
    path: PathBuf,
    started: bool,
}

impl CsvFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            started: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&mut self) -> Result<BufWriter<File>, SinkError> {
        let file = if self.started {
            OpenOptions::new().append(true).open(&self.path)?
        } else {
            File::create(&self.path)?
        };
        let mut writer = BufWriter::new(file);
        if !self.started {
            writeln!(writer, "{}", CSV_HEADER)?;
            self.started = true;
        }
        Ok(writer)
    }
}

impl ResultSink for CsvFileSink {
    fn write_run(&mut self, run: &SimulationRun) -> Result<(), SinkError> {
        let label = csv_field(&run.display_label());
        let mut writer = self.open()?;
        let mut rows = 0usize;
        for sample in &run.samples {
            for peer in &sample.active_peers {
                writeln!(
                    writer,
                    "{},{},{},{:.3},{:.3},{:.3},{:.6},{},{:.6}",
                    label,
                    peer.peer_id,
                    sample.timestamp_ms,
                    peer.bandwidth,
                    peer.latency,
                    peer.jitter,
                    peer.contribution_ratio,
                    peer.label,
                    peer.churn_probability
                )?;
                rows += 1;
            }
        }
        writer.flush()?;
        info!("{} rows written to {}", rows, self.path.display());
        Ok(())
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// ============================================================================
// Event Sinks
// ============================================================================

/// Prints every event to stdout
pub struct ConsoleEventSink;

impl EventSink for ConsoleEventSink {
    fn log(&mut self, time: SimTime, peer: PeerId, event: SwarmEvent) {
        match event {
            SwarmEvent::PeerJoined {
                label,
                rejoin,
                churn_probability,
            } => {
                let verb = if rejoin { "rejoined" } else { "joined" };
                println!(
                    "[{:>8}ms] peer {:>4} {} as {} (churn p={:.3})",
                    time, peer, verb, label, churn_probability
                );
            }
            SwarmEvent::PeerLeft { churn_probability } => {
                println!("[{:>8}ms] peer {:>4} left (churn p={:.3})", time, peer, churn_probability);
            }
            SwarmEvent::BandwidthMeasured {
                bandwidth_kbps,
                latency_ms,
            } => {
                println!(
                    "[{:>8}ms] peer {:>4} measured {:.1} kbps after {:.0}ms",
                    time, peer, bandwidth_kbps, latency_ms
                );
            }
        }
    }
}

/// Appends events as CSV rows. Write errors are counted, never propagated,
/// since event logging must not stop a run.
pub struct CsvEventSink<W: Write> {
    writer: W,
    failed_writes: usize,
}

impl<W: Write> CsvEventSink<W> {
    pub fn new(mut writer: W) -> Self {
        let failed_writes = match writeln!(writer, "time_ms,peer_id,event,label,churn_probability,bandwidth_kbps,latency_ms") {
            Ok(()) => 0,
            Err(_) => 1,
        };
        Self {
            writer,
            failed_writes,
        }
    }

    pub fn failed_writes(&self) -> usize {
        self.failed_writes
    }

    pub fn into_inner(mut self) -> W {
        let _ = self.writer.flush();
        self.writer
    }
}

impl CsvEventSink<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> EventSink for CsvEventSink<W> {
    fn log(&mut self, time: SimTime, peer: PeerId, event: SwarmEvent) {
        let result = match event {
            SwarmEvent::PeerJoined {
                label,
                rejoin,
                churn_probability,
            } => {
                let kind = if rejoin { "rejoined" } else { "joined" };
                writeln!(self.writer, "{},{},{},{},{},,", time, peer, kind, label, churn_probability)
            }
            SwarmEvent::PeerLeft { churn_probability } => {
                writeln!(self.writer, "{},{},left,,{},,", time, peer, churn_probability)
            }
            SwarmEvent::BandwidthMeasured {
                bandwidth_kbps,
                latency_ms,
            } => writeln!(
                self.writer,
                "{},{},measured,,,{},{}",
                time, peer, bandwidth_kbps, latency_ms
            ),
        };
        if result.is_err() {
            self.failed_writes += 1;
        }
    }
}

/// One logged event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedEvent {
    pub time: SimTime,
    pub peer: PeerId,
    pub event: SwarmEvent,
}

/// Collects events into a shared buffer. Clones share the buffer, so a
/// handle kept outside the engine can read what the engine logged.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self.events.lock() {
            Ok(events) => events.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for CollectingSink {
    fn log(&mut self, time: SimTime, peer: PeerId, event: SwarmEvent) {
        let record = RecordedEvent { time, peer, event };
        match self.events.lock() {
            Ok(mut events) => events.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}
