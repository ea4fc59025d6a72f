// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The single-shot invocation engine.
//!
//! ```text
//!            invoke() accepted
//!   Idle ─────────────────────────► Running
//!    ▲                                 │ worker (or inline caller)
//!    └──────── backend returned ◄──────┘ finishes the backend call
//!
//!   any ──── close() ────► JoinRequested ──► worker exits once not Running
//! ```
//!
//! One [`Single`] owns one [`Backend`] and one worker thread. At most one
//! invocation is in flight; a second caller gets [`SingleError::TryAgain`]
//! immediately. With a non-zero timeout the caller hands its request to the
//! worker and waits on a condition variable; with timeout 0 the caller runs
//! the backend on its own thread.
//!
//! A timeout only detaches the caller. The worker always finishes the
//! backend call; if the backend lent the output memory, the late output is
//! parked in the deferred-release set and handed back to the backend on the
//! next hand-off, at close, or when the caller collects it with
//! [`Single::take_late_output`].
//!
//! The state block and the backend slot share one mutex. The backend is
//! moved out of the state for the duration of a call, so the lock is never
//! held across backend code.

use crate::{
    registry, Backend, InvocationMetrics, SingleError, SingleOptions,
};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tensor_core::{TensorsData, TensorsInfo};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle phase of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    JoinRequested,
}

/// Work handed from a caller to the worker.
struct Request {
    ticket: u64,
    input: TensorsData,
    output: TensorsData,
    allocate_output: bool,
}

/// Result posted by the worker for a caller still waiting.
struct Completion {
    ticket: u64,
    result: Result<TensorsData, SingleError>,
}

struct EngineState {
    valid: bool,
    phase: Phase,
    timeout_ms: u64,
    pending: Option<Request>,
    completed: Option<Completion>,
    invoking: bool,
    next_ticket: u64,
    abandoned: Option<u64>,
    deferred: VecDeque<TensorsData>,
    restore_input: Option<TensorsInfo>,
    backend: Option<Box<dyn Backend>>,
    backend_name: String,
    input_info: TensorsInfo,
    output_info: TensorsInfo,
    metrics: InvocationMetrics,
}

impl EngineState {
    /// Ends a backend call. A rollback parked by a detached
    /// `invoke_dynamic` caller is applied before the engine goes idle.
    fn finish(&mut self, id: u64, ok: bool, latency: Duration) {
        self.invoking = false;
        self.metrics.record_completion(ok, latency);
        if let Some(previous) = self.restore_input.take() {
            if let Err(e) = self.apply_input_info(id, &previous) {
                tracing::error!(id, "cannot restore input info {previous}: {e}");
            }
        }
        if self.phase == Phase::Running {
            self.phase = Phase::Idle;
        }
    }

    /// Empties the deferred-release set, counting what it hands back.
    fn take_late(&mut self) -> Vec<TensorsData> {
        let late: Vec<TensorsData> = self.deferred.drain(..).collect();
        self.metrics.late_outputs_released += late.len() as u64;
        late
    }

    /// Pushes `info` through the backend and adopts the derived output.
    fn apply_input_info(&mut self, id: u64, info: &TensorsInfo) -> Result<(), SingleError> {
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| SingleError::TryAgain.reported())?;
        let output_info = backend
            .set_input_info(info)
            .map_err(|e| SingleError::from(e).reported())?;
        output_info.validate()?;
        tracing::info!(
            id,
            input = %info,
            output = %output_info,
            "input info reconfigured"
        );
        self.input_info = info.clone();
        self.output_info = output_info;
        Ok(())
    }
}

struct Shared {
    id: u64,
    state: Mutex<EngineState>,
    cond: Condvar,
}

/// Caller-side state after validation and the busy check.
struct Accepted<'a> {
    state: MutexGuard<'a, EngineState>,
    input: TensorsData,
    allocate_output: bool,
}

/// A handle that runs one backend on a dedicated worker thread.
///
/// All methods take `&self`; share the handle between threads with an
/// `Arc` or scoped threads. After [`close`](Self::close) every method fails
/// with [`SingleError::InvalidParameter`].
///
/// # Example
/// ```
/// use single_shot::{CustomBackend, Single};
/// use tensor_core::{TensorType, TensorsData, TensorsInfo};
///
/// let info = TensorsInfo::from_specs(&[(TensorType::Uint8, &[4])]).unwrap();
/// let backend = CustomBackend::new("copy", info.clone(), info.clone(), |input, output| {
///     output.set_tensor_data(0, &input.get_tensor_data(0)?)?;
///     Ok(())
/// });
///
/// let single = Single::open(Box::new(backend), None, None)?;
/// single.set_timeout(1000)?;
///
/// let input = TensorsData::from_vecs(&info, vec![vec![1, 2, 3, 4]])?;
/// let output = single.invoke(&input)?;
/// assert_eq!(output.get_tensor_data(0)?, vec![1, 2, 3, 4]);
/// single.close()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Single {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Single {
    /// Opens a handle around `backend`.
    ///
    /// Given descriptors are validated and negotiated with the backend:
    /// a differing input descriptor is pushed through
    /// [`Backend::set_input_info`], and a requested output descriptor must
    /// match what the backend then produces. The backend is started and
    /// the worker thread spawned before the handle is returned.
    pub fn open(
        mut backend: Box<dyn Backend>,
        input_info: Option<&TensorsInfo>,
        output_info: Option<&TensorsInfo>,
    ) -> Result<Self, SingleError> {
        if let Some(info) = input_info {
            info.validate()?;
        }
        if let Some(info) = output_info {
            info.validate()?;
        }

        let (input_info, output_info) = negotiate(backend.as_mut(), input_info, output_info)?;

        backend.start().map_err(|e| {
            SingleError::StreamsPipe(format!("cannot start backend '{}': {e}", backend.name()))
                .reported()
        })?;

        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let backend_name = backend.name().to_string();
        let shared = Arc::new(Shared {
            id,
            state: Mutex::new(EngineState {
                valid: true,
                phase: Phase::Idle,
                timeout_ms: 0,
                pending: None,
                completed: None,
                invoking: false,
                next_ticket: 1,
                abandoned: None,
                deferred: VecDeque::new(),
                restore_input: None,
                backend: Some(backend),
                backend_name: backend_name.clone(),
                input_info,
                output_info,
                metrics: InvocationMetrics::default(),
            }),
            cond: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let spawned = std::thread::Builder::new()
            .name(format!("single-worker-{id}"))
            .spawn(move || worker_loop(&worker_shared));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                if let Some(mut backend) = shared.state.lock().backend.take() {
                    backend.stop();
                }
                return Err(
                    SingleError::StreamsPipe(format!("cannot spawn worker thread: {e}")).reported(),
                );
            }
        };

        {
            let state = shared.state.lock();
            tracing::info!(
                id,
                backend = %backend_name,
                input = %state.input_info,
                output = %state.output_info,
                "single handle opened"
            );
        }

        Ok(Self {
            shared,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Opens a handle from options: the backend is created through the
    /// global [`registry`], model paths must exist.
    pub fn open_with(options: SingleOptions) -> Result<Self, SingleError> {
        let models = options.resolve_models()?;
        let backend = registry::global().create(&options.backend, &models)?;
        let single = Self::open(
            backend,
            options.input_info.as_ref(),
            options.output_info.as_ref(),
        )?;
        single.set_timeout(options.timeout_ms)?;
        Ok(single)
    }

    /// Process-unique id of this handle.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn is_open(&self) -> bool {
        self.shared.state.lock().valid
    }

    /// Current lifecycle phase. `Running` while a call is in flight,
    /// including one whose caller already timed out.
    pub fn phase(&self) -> Phase {
        self.shared.state.lock().phase
    }

    /// Runs one inference and returns a newly produced output buffer.
    ///
    /// Fails with [`SingleError::TryAgain`] if another invocation is in
    /// flight and with [`SingleError::TimedOut`] if the timeout elapses
    /// first. The input is cloned, so the caller may reuse it at once.
    pub fn invoke(&self, input: &TensorsData) -> Result<TensorsData, SingleError> {
        let Accepted {
            mut state,
            input,
            allocate_output,
        } = self.accept(input, None)?;
        let mut output = new_output(&state.output_info, allocate_output)?;
        mark_running(&mut state);

        if state.timeout_ms == 0 {
            self.run_inline(state, input, &mut output, allocate_output)?;
            return Ok(output);
        }
        self.dispatch(state, input, output, allocate_output)
    }

    /// Runs one inference into a caller-owned output buffer.
    ///
    /// Both buffers are checked against the negotiated descriptors before
    /// anything is written. No ownership changes hands: after a timeout the
    /// late result is discarded and `output` is left untouched.
    pub fn invoke_fast(
        &self,
        input: &TensorsData,
        output: &mut TensorsData,
    ) -> Result<(), SingleError> {
        let Accepted {
            mut state,
            input,
            allocate_output,
        } = self.accept(input, Some(&*output))?;

        if state.timeout_ms == 0 && !allocate_output {
            mark_running(&mut state);
            return self.run_inline(state, input, output, false);
        }

        let mut result = new_output(&state.output_info, allocate_output)?;
        mark_running(&mut state);
        if state.timeout_ms == 0 {
            self.run_inline(state, input, &mut result, allocate_output)?;
        } else {
            result = self.dispatch(state, input, result, allocate_output)?;
        }
        output.lock().copy_from(&result.lock())?;
        Ok(())
    }

    /// Invokes with a new input descriptor.
    ///
    /// The backend is reconfigured for `input_info` when it differs from
    /// the current one. If reconfiguring or invoking fails, the previous
    /// input descriptor is restored. When the call is still running on the
    /// worker (timeout, busy), the restore is parked and applied as soon as
    /// that call ends, so the caller is never held past its timeout.
    pub fn invoke_dynamic(
        &self,
        input: &TensorsData,
        input_info: &TensorsInfo,
    ) -> Result<(TensorsData, TensorsInfo), SingleError> {
        input_info.validate()?;
        let previous = self.input_info()?;
        let reshaped = !previous.is_equal(input_info);
        if reshaped {
            self.reconfigure(input_info)?;
        }

        match self.invoke(input) {
            Ok(output) => {
                let output_info = self.output_info()?;
                Ok((output, output_info))
            }
            Err(e) => {
                if reshaped {
                    if let Err(rollback) = self.restore_input_info(&previous) {
                        tracing::error!(
                            id = self.shared.id,
                            "cannot restore input info {previous}: {rollback}"
                        );
                    }
                }
                Err(e)
            }
        }
    }

    /// Sets how long callers wait for the worker, in milliseconds.
    /// Zero makes callers run the backend on their own thread.
    pub fn set_timeout(&self, timeout_ms: u64) -> Result<(), SingleError> {
        let mut state = self.shared.state.lock();
        if !state.valid {
            return Err(SingleError::closed());
        }
        state.timeout_ms = timeout_ms;
        Ok(())
    }

    pub fn timeout(&self) -> Result<u64, SingleError> {
        let state = self.shared.state.lock();
        if !state.valid {
            return Err(SingleError::closed());
        }
        Ok(state.timeout_ms)
    }

    /// The negotiated input descriptor.
    pub fn input_info(&self) -> Result<TensorsInfo, SingleError> {
        let state = self.shared.state.lock();
        if !state.valid {
            return Err(SingleError::closed());
        }
        Ok(state.input_info.clone())
    }

    /// The negotiated output descriptor.
    pub fn output_info(&self) -> Result<TensorsInfo, SingleError> {
        let state = self.shared.state.lock();
        if !state.valid {
            return Err(SingleError::closed());
        }
        Ok(state.output_info.clone())
    }

    /// Reconfigures the backend for a new input descriptor and re-derives
    /// the output descriptor. Fails with [`SingleError::TryAgain`] while an
    /// invocation is in flight.
    pub fn set_input_info(&self, info: &TensorsInfo) -> Result<(), SingleError> {
        self.reconfigure(info)
    }

    pub fn get_property(&self, name: &str) -> Result<String, SingleError> {
        let state = self.shared.state.lock();
        if !state.valid {
            return Err(SingleError::closed());
        }
        if state.phase != Phase::Idle {
            return Err(SingleError::TryAgain.reported());
        }
        let backend = state
            .backend
            .as_ref()
            .ok_or_else(|| SingleError::TryAgain.reported())?;
        backend
            .get_property(name)
            .map_err(|e| SingleError::from(e).reported())
    }

    pub fn set_property(&self, name: &str, value: &str) -> Result<(), SingleError> {
        let mut state = self.shared.state.lock();
        if !state.valid {
            return Err(SingleError::closed());
        }
        if state.phase != Phase::Idle {
            return Err(SingleError::TryAgain.reported());
        }
        let backend = state
            .backend
            .as_mut()
            .ok_or_else(|| SingleError::TryAgain.reported())?;
        backend
            .set_property(name, value)
            .map_err(|e| SingleError::from(e).reported())
    }

    /// Snapshot of this handle's counters.
    pub fn metrics(&self) -> InvocationMetrics {
        self.shared.state.lock().metrics.clone()
    }

    /// Number of late backend-owned outputs waiting to be released.
    pub fn pending_release_count(&self) -> usize {
        self.shared.state.lock().deferred.len()
    }

    /// Collects the oldest late output left behind by a timed-out call.
    pub fn take_late_output(&self) -> Option<TensorsData> {
        self.shared.state.lock().deferred.pop_front()
    }

    /// Stops the worker and releases the backend.
    ///
    /// Blocks until any in-flight invocation has finished. Late outputs
    /// still parked are handed back to the backend before it is stopped.
    pub fn close(&self) -> Result<(), SingleError> {
        let worker = {
            let mut state = self.shared.state.lock();
            if !state.valid {
                return Err(SingleError::closed());
            }
            state.valid = false;
            state.phase = Phase::JoinRequested;
            if let Some(request) = state.pending.take() {
                state.completed = Some(Completion {
                    ticket: request.ticket,
                    result: Err(SingleError::InvalidParameter(
                        "handle closed before the request was dispatched".into(),
                    )
                    .reported()),
                });
            }
            self.shared.cond.notify_all();
            while state.invoking {
                self.shared.cond.wait(&mut state);
            }
            self.worker.lock().take()
        };

        if let Some(handle) = worker {
            if handle.join().is_err() {
                tracing::error!(id = self.shared.id, "worker thread panicked");
            }
        }

        let (backend, deferred) = {
            let mut state = self.shared.state.lock();
            let late = state.take_late();
            (state.backend.take(), late)
        };
        let released = deferred.len();
        if let Some(mut backend) = backend {
            for output in deferred {
                backend.release_output(output);
            }
            backend.stop();
        }
        tracing::info!(id = self.shared.id, released, "single handle closed");
        Ok(())
    }

    /// Validates a request and claims the engine for it.
    fn accept(
        &self,
        input: &TensorsData,
        caller_output: Option<&TensorsData>,
    ) -> Result<Accepted<'_>, SingleError> {
        let mut state = self.shared.state.lock();
        if !state.valid {
            return Err(SingleError::closed());
        }
        input.validate_against(&state.input_info)?;
        if let Some(output) = caller_output {
            output.validate_against(&state.output_info)?;
        }
        if state.phase != Phase::Idle {
            state.metrics.rejected_busy += 1;
            return Err(SingleError::TryAgain.reported());
        }
        let input = input.try_clone()?;
        let allocate_output = state
            .backend
            .as_ref()
            .map_or(false, |backend| backend.allocates_output());
        Ok(Accepted {
            state,
            input,
            allocate_output,
        })
    }

    /// Runs the backend on the calling thread.
    fn run_inline(
        &self,
        mut state: MutexGuard<'_, EngineState>,
        input: TensorsData,
        output: &mut TensorsData,
        allocate_output: bool,
    ) -> Result<(), SingleError> {
        let Some(mut backend) = state.backend.take() else {
            state.phase = Phase::Idle;
            return Err(SingleError::Unknown("backend missing while idle".into()).reported());
        };
        let late = state.take_late();
        state.invoking = true;

        let (result, latency) = MutexGuard::unlocked(&mut state, || {
            for stale in late {
                backend.release_output(stale);
            }
            let started = Instant::now();
            let result = backend.invoke(&input, output, allocate_output);
            (result, started.elapsed())
        });
        drop(input);

        state.backend = Some(backend);
        state.finish(self.shared.id, result.is_ok(), latency);
        self.shared.cond.notify_all();
        drop(state);

        result.map_err(|e| SingleError::StreamsPipe(e.to_string()).reported())
    }

    /// Hands a request to the worker and waits up to the timeout.
    fn dispatch(
        &self,
        mut state: MutexGuard<'_, EngineState>,
        input: TensorsData,
        output: TensorsData,
        allocate_output: bool,
    ) -> Result<TensorsData, SingleError> {
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        let timeout_ms = state.timeout_ms;
        state.pending = Some(Request {
            ticket,
            input,
            output,
            allocate_output,
        });
        tracing::debug!(id = self.shared.id, ticket, "invocation handed to worker");
        self.shared.cond.notify_all();

        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if state.completed.as_ref().map_or(false, |c| c.ticket == ticket) {
                if let Some(done) = state.completed.take() {
                    return done.result;
                }
            }
            if self.shared.cond.wait_until(&mut state, deadline).timed_out() {
                if state.completed.as_ref().map_or(false, |c| c.ticket == ticket) {
                    continue;
                }
                state.abandoned = Some(ticket);
                state.metrics.timed_out += 1;
                return Err(SingleError::TimedOut { timeout_ms }.reported());
            }
        }
    }

    fn reconfigure(&self, info: &TensorsInfo) -> Result<(), SingleError> {
        info.validate()?;
        let mut state = self.shared.state.lock();
        if !state.valid {
            return Err(SingleError::closed());
        }
        if state.phase != Phase::Idle {
            return Err(SingleError::TryAgain.reported());
        }
        state.apply_input_info(self.shared.id, info)
    }

    /// Puts back `previous` now, or parks it for the end of the call that
    /// still occupies the engine.
    fn restore_input_info(&self, previous: &TensorsInfo) -> Result<(), SingleError> {
        let mut state = self.shared.state.lock();
        if !state.valid {
            return Err(SingleError::closed());
        }
        if state.phase == Phase::Running {
            tracing::debug!(id = self.shared.id, "input info restore deferred");
            state.restore_input = Some(previous.clone());
            return Ok(());
        }
        state.apply_input_info(self.shared.id, previous)
    }
}

impl Drop for Single {
    fn drop(&mut self) {
        if self.is_open() {
            let _ = self.close();
        }
    }
}

impl std::fmt::Debug for Single {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Single")
            .field("id", &self.shared.id)
            .field("backend", &state.backend_name)
            .field("phase", &state.phase)
            .field("valid", &state.valid)
            .field("timeout_ms", &state.timeout_ms)
            .field("deferred", &state.deferred.len())
            .finish()
    }
}

/// Works out the input/output descriptors a handle will use.
fn negotiate(
    backend: &mut dyn Backend,
    requested_input: Option<&TensorsInfo>,
    requested_output: Option<&TensorsInfo>,
) -> Result<(TensorsInfo, TensorsInfo), SingleError> {
    let mut input_info = backend.input_info();
    let mut output_info = backend.output_info();

    if let Some(requested) = requested_input {
        let matches = input_info
            .as_ref()
            .map_or(false, |current| current.is_equal(requested));
        if !matches {
            let derived = backend.set_input_info(requested).map_err(|e| {
                SingleError::NotSupported(format!(
                    "backend '{}' rejected input {requested}: {e}",
                    backend.name()
                ))
                .reported()
            })?;
            input_info = Some(requested.clone());
            output_info = Some(derived);
        }
    }

    if let Some(requested) = requested_output {
        match &output_info {
            Some(current) if current.is_equal(requested) => {}
            Some(current) => {
                return Err(SingleError::NotSupported(format!(
                    "backend '{}' produces {current}, requested {requested}",
                    backend.name()
                ))
                .reported());
            }
            None => output_info = Some(requested.clone()),
        }
    }

    let input_info = input_info.ok_or_else(|| {
        SingleError::InvalidParameter("input info is neither given nor known to the backend".into())
            .reported()
    })?;
    let output_info = output_info.ok_or_else(|| {
        SingleError::InvalidParameter("output info is neither given nor known to the backend".into())
            .reported()
    })?;
    input_info.validate()?;
    output_info.validate()?;
    Ok((input_info, output_info))
}

fn new_output(info: &TensorsInfo, allocate_output: bool) -> Result<TensorsData, SingleError> {
    let output = if allocate_output {
        TensorsData::new_no_alloc(info)?
    } else {
        TensorsData::new(info)?
    };
    Ok(output)
}

fn mark_running(state: &mut EngineState) {
    state.metrics.accepted += 1;
    state.phase = Phase::Running;
}

/// Body of the per-handle worker thread.
fn worker_loop(shared: &Shared) {
    let mut state = shared.state.lock();
    loop {
        while state.phase != Phase::JoinRequested
            && !(state.phase == Phase::Running && state.pending.is_some())
        {
            shared.cond.wait(&mut state);
        }
        if state.phase == Phase::JoinRequested {
            break;
        }
        let Some(request) = state.pending.take() else {
            continue;
        };
        let Request {
            ticket,
            input,
            mut output,
            allocate_output,
        } = request;

        let Some(mut backend) = state.backend.take() else {
            state.completed = Some(Completion {
                ticket,
                result: Err(SingleError::Unknown("backend missing on worker".into()).reported()),
            });
            state.phase = Phase::Idle;
            shared.cond.notify_all();
            continue;
        };

        let late = state.take_late();
        state.invoking = true;

        let (result, latency) = MutexGuard::unlocked(&mut state, || {
            for stale in late {
                backend.release_output(stale);
            }
            let started = Instant::now();
            let result = backend.invoke(&input, &mut output, allocate_output);
            let latency = started.elapsed();
            drop(input);
            (result, latency)
        });

        state.backend = Some(backend);
        let ok = result.is_ok();
        if state.abandoned == Some(ticket) {
            state.abandoned = None;
            if ok && allocate_output {
                state.deferred.push_back(output);
            } else {
                drop(output);
            }
            tracing::debug!(id = shared.id, ticket, ok, "late invocation finished");
        } else {
            let result = match result {
                Ok(()) => Ok(output),
                Err(e) => Err(SingleError::StreamsPipe(e.to_string()).reported()),
            };
            state.completed = Some(Completion { ticket, result });
        }
        state.finish(shared.id, ok, latency);
        shared.cond.notify_all();
    }
    tracing::debug!(id = shared.id, "worker exiting");
}
