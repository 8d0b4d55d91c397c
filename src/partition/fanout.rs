//! Fan-out of one scan over every repository of the pool.
//!
//! ```text
//!   dispatcher ──repos──▶ worker 1..n ──rows──▶ RowRepoIter::next_row
//!        ▲                    ▲
//!        └────── done ────────┘   (dropped once: first error or close)
//! ```
//!
//! Rows of different repositories interleave in no particular order.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;

use crate::catalog::Row;
use crate::executor::{ExecuteError, ExecuteResult, RowIter};
use crate::session::Context;
use crate::storage::Repository;

/// Builds the row stream of one repository.
pub type RowIterFactory = Arc<dyn Fn(&Context, &Repository) -> ExecuteResult<Box<dyn RowIter>> + Send + Sync>;

const ROW_BUFFER: usize = 128;

/// Threads of a fan-out, joined on [`WorkerGroup::join`] or drop.
#[derive(Debug, Default)]
pub struct WorkerGroup {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    pub fn spawn<F>(&mut self, name: String, f: F) -> ExecuteResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name)
            .spawn(f)
            .map_err(|e| ExecuteError::Worker(e.to_string()))?;
        self.handles.push(handle);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every thread. Returns false if one of them panicked.
    pub fn join(&mut self) -> bool {
        let mut clean = true;
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!("fan-out worker panicked");
                clean = false;
            }
        }
        clean
    }
}

impl Drop for WorkerGroup {
    fn drop(&mut self) {
        self.join();
    }
}

/// State shared by the consumer and every worker.
struct Shared {
    error: Mutex<Option<ExecuteError>>,
    done: Mutex<Option<Sender<()>>>,
}

impl Shared {
    /// Signal every thread to stop. Only the first call has an effect.
    fn stop(&self) {
        self.done.lock().take();
    }

    /// Record `err` unless an earlier error won, then stop.
    fn fail(&self, err: ExecuteError) {
        {
            let mut slot = self.error.lock();
            if slot.is_none() {
                tracing::error!(error = %err, "fan-out failed");
                *slot = Some(err);
            }
        }
        self.stop();
    }

    fn take_error(&self) -> Option<ExecuteError> {
        self.error.lock().take()
    }
}

struct Worker {
    ctx: Context,
    factory: RowIterFactory,
    shared: Arc<Shared>,
    repos: Receiver<Repository>,
    rows: Sender<Row>,
    done: Receiver<()>,
}

enum Scan {
    Finished,
    Stopped,
}

impl Worker {
    fn run(self) {
        loop {
            select! {
                recv(self.repos) -> repo => match repo {
                    Ok(repo) => {
                        if let Scan::Stopped = self.scan(&repo) {
                            return;
                        }
                    }
                    Err(_) => return,
                },
                recv(self.done) -> _ => return,
            }
        }
    }

    /// Hand back a failed repository's error unless it may be skipped.
    fn skip(&self, repo: &Repository, err: ExecuteError) -> Scan {
        if err.is_skippable() && self.ctx.session().skip_git_errors() {
            tracing::warn!(repo = repo.id(), error = %err, "skipped repository");
            return Scan::Finished;
        }
        self.shared.fail(err);
        Scan::Stopped
    }

    fn scan(&self, repo: &Repository) -> Scan {
        let mut iter = match (self.factory)(&self.ctx, repo) {
            Ok(iter) => iter,
            Err(e) => return self.skip(repo, e),
        };
        let outcome = self.pump(repo, iter.as_mut());
        if let Err(e) = iter.close() {
            tracing::debug!(repo = repo.id(), error = %e, "closing repository rows");
        }
        outcome
    }

    fn stopped(&self) -> bool {
        matches!(self.done.try_recv(), Err(TryRecvError::Disconnected))
    }

    fn pump(&self, repo: &Repository, iter: &mut dyn RowIter) -> Scan {
        loop {
            if self.stopped() {
                return Scan::Stopped;
            }
            if let Err(e) = self.ctx.check() {
                self.shared.fail(e);
                return Scan::Stopped;
            }
            let row = match iter.next_row() {
                Ok(Some(row)) => row,
                Ok(None) => return Scan::Finished,
                Err(e) => return self.skip(repo, e),
            };
            select! {
                send(self.rows, row) -> sent => {
                    if sent.is_err() {
                        return Scan::Stopped;
                    }
                }
                recv(self.done) -> _ => return Scan::Stopped,
            }
        }
    }
}

/// Rows of every repository of the session's pool, produced by
/// `num_cpus::get()` worker threads.
pub struct RowRepoIter {
    ctx: Context,
    shared: Arc<Shared>,
    rows: Receiver<Row>,
    group: WorkerGroup,
    finished: bool,
}

impl RowRepoIter {
    pub fn new(ctx: &Context, factory: RowIterFactory) -> ExecuteResult<Self> {
        Self::with_workers(ctx, factory, num_cpus::get())
    }

    pub fn with_workers(ctx: &Context, factory: RowIterFactory, workers: usize) -> ExecuteResult<Self> {
        let workers = workers.max(1);
        let repos: Vec<Repository> = ctx.session().pool().iter().cloned().collect();

        let (repo_tx, repo_rx) = bounded::<Repository>(workers);
        let (row_tx, row_rx) = bounded::<Row>(ROW_BUFFER);
        let (done_tx, done_rx) = bounded::<()>(0);
        let shared = Arc::new(Shared {
            error: Mutex::new(None),
            done: Mutex::new(Some(done_tx)),
        });

        let mut iter = Self {
            ctx: ctx.clone(),
            shared: shared.clone(),
            rows: row_rx,
            group: WorkerGroup::default(),
            finished: false,
        };
        tracing::debug!(repositories = repos.len(), workers, "starting fan-out");

        let dispatch_done = done_rx.clone();
        let spawned = iter.group.spawn("gitsquash-dispatch".into(), move || {
            for repo in repos {
                select! {
                    send(repo_tx, repo) -> sent => {
                        if sent.is_err() {
                            return;
                        }
                    }
                    recv(dispatch_done) -> _ => return,
                }
            }
        });
        if let Err(e) = spawned {
            iter.shutdown();
            return Err(e);
        }

        for n in 0..workers {
            let worker = Worker {
                ctx: ctx.clone(),
                factory: factory.clone(),
                shared: shared.clone(),
                repos: repo_rx.clone(),
                rows: row_tx.clone(),
                done: done_rx.clone(),
            };
            if let Err(e) = iter.group.spawn(format!("gitsquash-worker-{}", n), move || worker.run()) {
                iter.shutdown();
                return Err(e);
            }
        }
        // only the workers hold row senders: the channel disconnects once
        // all of them exited
        drop(row_tx);

        Ok(iter)
    }

    fn shutdown(&mut self) {
        self.shared.stop();
        // unblock workers waiting on a full row buffer
        while self.rows.try_recv().is_ok() {}
        if !self.group.join() {
            self.shared.fail(ExecuteError::Worker("worker panicked".into()));
        }
        self.finished = true;
    }
}

impl RowIter for RowRepoIter {
    fn next_row(&mut self) -> ExecuteResult<Option<Row>> {
        if let Some(err) = self.shared.take_error() {
            self.shutdown();
            return Err(err);
        }
        if self.finished {
            return Ok(None);
        }
        if let Err(e) = self.ctx.check() {
            self.shutdown();
            return Err(e);
        }

        match self.rows.recv() {
            Ok(row) => Ok(Some(row)),
            Err(_) => {
                self.shutdown();
                match self.shared.take_error() {
                    Some(err) => Err(err),
                    None => Ok(None),
                }
            }
        }
    }

    fn close(&mut self) -> ExecuteResult<()> {
        if !self.finished {
            self.shutdown();
        }
        Ok(())
    }
}

impl Drop for RowRepoIter {
    fn drop(&mut self) {
        if !self.finished {
            self.shutdown();
        }
    }
}
