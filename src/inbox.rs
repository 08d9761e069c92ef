//! Line-delimited event intake.
//!
//! Each non-blank input line is one event envelope. Valid events are handed
//! to a fixed set of scoped worker threads through a bounded channel, so at
//! most `max_in_flight` events are being provisioned at once and the reader
//! blocks instead of buffering the whole input. Invalid lines are logged and
//! counted; they never reach the workflow and produce no notification.
use crate::model::{HrEvent, WorkflowOutcome};
use crate::workflow::Provisioner;
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Mutex;
use std::thread;

/// Counters for one intake session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InboxSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub rejected: usize,
}

impl InboxSummary {
    fn record(&mut self, outcome: &WorkflowOutcome) {
        self.processed += 1;
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    fn absorb(&mut self, other: InboxSummary) {
        self.processed += other.processed;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.rejected += other.rejected;
    }
}

struct Job {
    line: usize,
    event: HrEvent,
}

/// Parse one envelope and run it to completion.
pub fn process_event(text: &str, provisioner: &Provisioner<'_>) -> Result<WorkflowOutcome> {
    let event = HrEvent::parse(text)?;
    tracing::info!(event = event.label(), person = %event.person_name(), "event accepted");
    Ok(provisioner.run(&event))
}

/// Drain `reader` and provision every valid event on up to `max_in_flight` workers.
pub fn serve<R: BufRead>(
    reader: R,
    provisioner: &Provisioner<'_>,
    max_in_flight: usize,
) -> Result<InboxSummary> {
    let workers = max_in_flight.max(1);
    let (sender, receiver) = mpsc::sync_channel::<Job>(workers);
    let receiver = Mutex::new(receiver);
    let receiver = &receiver;

    thread::scope(|scope| {
        let handles = (0..workers)
            .map(|worker| scope.spawn(move || work(worker, receiver, provisioner)))
            .collect::<Vec<_>>();

        let mut summary = InboxSummary::default();
        let fed = feed(reader, sender, &mut summary);
        for handle in handles {
            let tally = handle
                .join()
                .map_err(|_| anyhow!("inbox worker panicked"))?;
            summary.absorb(tally);
        }
        fed?;
        tracing::info!(
            processed = summary.processed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            rejected = summary.rejected,
            "inbox drained"
        );
        Ok(summary)
    })
}

/// Read envelopes until EOF. Dropping `sender` on return lets the workers finish.
fn feed<R: BufRead>(
    reader: R,
    sender: SyncSender<Job>,
    summary: &mut InboxSummary,
) -> Result<()> {
    for (index, bytes) in reader.split(b'\n').enumerate() {
        let line_number = index + 1;
        let bytes = bytes.with_context(|| format!("read event line {line_number}"))?;
        let Ok(line) = String::from_utf8(bytes) else {
            summary.rejected += 1;
            tracing::warn!(line = line_number, "event rejected: line is not UTF-8");
            continue;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        match HrEvent::parse(text) {
            Ok(event) => sender
                .send(Job {
                    line: line_number,
                    event,
                })
                .map_err(|_| anyhow!("inbox workers stopped before line {line_number}"))?,
            Err(err) => {
                summary.rejected += 1;
                tracing::warn!(line = line_number, error = %format!("{err:#}"), "event rejected");
            }
        }
    }
    Ok(())
}

fn work(
    worker: usize,
    receiver: &Mutex<Receiver<Job>>,
    provisioner: &Provisioner<'_>,
) -> InboxSummary {
    let mut tally = InboxSummary::default();
    loop {
        let next = match receiver.lock() {
            Ok(guard) => guard.recv(),
            Err(_) => break,
        };
        let Ok(job) = next else {
            break;
        };
        let outcome = provisioner.run(&job.event);
        tracing::info!(
            worker,
            line = job.line,
            event = job.event.label(),
            success = outcome.is_success(),
            "event processed"
        );
        tally.record(&outcome);
    }
    tally
}
