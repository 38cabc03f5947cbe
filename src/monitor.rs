//! The monitor driver: orchestrates enumeration, refresh, missing-board
//! expiry, callback dispatch, and blocking/parallel wait.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use bitflags::bitflags;

use crate::board::{Board, BoardState, Interface};
use crate::classify::{ClassifiedInterface, ClassifyOutcome};
use crate::error::{CoreError, CoreResult};
use crate::family::FamilyDescriptor;
use crate::platform::{self, DeviceEvent, DeviceHandle, DeviceInfo, DeviceStatus, IterControl, Platform};
use crate::serial::SerialReconciliation;

/// How long a board may sit with zero live interfaces before it is dropped.
pub const DROP_DEADLINE_MS: u64 = 15_000;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MonitorFlags: u8 {
        /// Use condvar-based waiting for callers that refresh from a
        /// separate producer thread.
        const PARALLEL_WAIT = 0b0000_0001;
    }
}

/// Runtime-constructed configuration, replacing the source's global
/// constants and environment-variable feature flags.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub flags: MonitorFlags,
    pub experimental_boards_enabled: bool,
}

impl MonitorConfig {
    /// Build a config, reading `TY_EXPERIMENTAL_BOARDS` once: any non-empty
    /// value enables upload/reset on experimental models.
    pub fn new(flags: MonitorFlags) -> Self {
        let experimental_boards_enabled = std::env::var("TY_EXPERIMENTAL_BOARDS")
            .map(|v| !v.is_empty())
            .unwrap_or(false);
        MonitorConfig { flags, experimental_boards_enabled }
    }

    /// Build a config without touching the environment, for tests.
    pub fn with_experimental_boards(flags: MonitorFlags, enabled: bool) -> Self {
        MonitorConfig { flags, experimental_boards_enabled: enabled }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardEventKind {
    Added,
    Changed,
    Disappeared,
    Dropped,
}

#[derive(Clone)]
pub struct BoardEvent {
    pub kind: BoardEventKind,
    pub board: Arc<Board>,
}

type CallbackFn = dyn FnMut(&BoardEvent) -> i32 + Send;

struct CallbackEntry {
    id: u64,
    f: Box<CallbackFn>,
}

struct MissingEntry {
    board: Arc<Board>,
    deadline_ms: u64,
}

struct State {
    boards: Vec<Arc<Board>>,
    missing: VecDeque<MissingEntry>,
    interfaces: HashMap<DeviceHandle, Arc<Interface>>,
    callbacks: Vec<CallbackEntry>,
    next_callback_id: u64,
    callback_ret: i32,
    initial_enumeration_done: bool,
}

/// Owns the live board set and drives it forward from platform events.
pub struct Monitor {
    config: MonitorConfig,
    family: &'static FamilyDescriptor,
    platform: Mutex<Box<dyn Platform>>,
    state: Mutex<State>,
    condvar: Condvar,
    diag: Option<Box<dyn Fn(&str) + Send + Sync>>,
}

impl Monitor {
    pub fn new(platform: Box<dyn Platform>, family: &'static FamilyDescriptor, config: MonitorConfig) -> Self {
        Monitor {
            config,
            family,
            platform: Mutex::new(platform),
            state: Mutex::new(State {
                boards: Vec::new(),
                missing: VecDeque::new(),
                interfaces: HashMap::with_capacity(64),
                callbacks: Vec::new(),
                next_callback_id: 0,
                callback_ret: 0,
                initial_enumeration_done: false,
            }),
            condvar: Condvar::new(),
            diag: None,
        }
    }

    pub fn with_diagnostic(mut self, diag: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.diag = Some(Box::new(diag));
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    fn log(&self, message: &str) {
        if let Some(diag) = &self.diag {
            diag(message);
        }
    }

    fn millis(&self) -> u64 {
        self.platform.lock().unwrap().millis()
    }

    pub fn register_callback(&self, f: impl FnMut(&BoardEvent) -> i32 + Send + 'static) -> u64 {
        let mut state = self.state.lock().unwrap();
        let id = state.next_callback_id;
        state.next_callback_id += 1;
        state.callbacks.push(CallbackEntry { id, f: Box::new(f) });
        id
    }

    pub fn deregister_callback(&self, id: u64) {
        let mut state = self.state.lock().unwrap();
        state.callbacks.retain(|c| c.id != id);
    }

    /// The most recent negative return seen from callback dispatch, so a
    /// caller driving refresh through a layer that cannot itself propagate
    /// arbitrary errors can retrieve the original cause.
    pub fn last_callback_return(&self) -> i32 {
        self.state.lock().unwrap().callback_ret
    }

    /// Synchronously invoke `f` for every board currently ONLINE, in board
    /// insertion order.
    pub fn list(&self, mut f: impl FnMut(&Arc<Board>)) {
        let state = self.state.lock().unwrap();
        for board in &state.boards {
            if board.state() == BoardState::Online {
                f(board);
            }
        }
    }

    fn dispatch_event(&self, kind: BoardEventKind, board: Arc<Board>) -> CoreResult<()> {
        let event = BoardEvent { kind, board };
        let mut state = self.state.lock().unwrap();
        let mut i = 0;
        while i < state.callbacks.len() {
            let ret = (state.callbacks[i].f)(&event);
            if ret < 0 {
                state.callback_ret = ret;
                return Err(CoreError::System(format!("callback aborted dispatch with code {ret}")));
            }
            if ret > 0 {
                state.callbacks.remove(i);
            } else {
                i += 1;
            }
        }
        Ok(())
    }

    fn create_board(&self, state: &mut State, device: &DeviceInfo) -> Arc<Board> {
        let board = Board::new(device.location.clone(), self.family, device.vid, device.pid);
        state.boards.push(board.clone());
        board
    }

    fn remove_board_from_live_lists(&self, state: &mut State, board: &Arc<Board>) {
        state.boards.retain(|b| !Arc::ptr_eq(b, board));
        state.missing.retain(|e| !Arc::ptr_eq(&e.board, board));
        let mut interfaces = board.interfaces.lock().unwrap();
        for iface in &interfaces.interfaces {
            state.interfaces.remove(&iface.device);
        }
        interfaces.interfaces.clear();
        interfaces.recompute();
    }

    fn detach_from_missing(&self, state: &mut State, board: &Arc<Board>) {
        state.missing.retain(|e| !Arc::ptr_eq(&e.board, board));
    }

    fn merge_interface(&self, board: &Arc<Board>, device: &DeviceInfo, classified: &ClassifiedInterface, state: &mut State) {
        {
            let mut model = board.model.lock().unwrap();
            if model.is_none() {
                *model = classified.model;
            }
        }
        {
            let mut serial = board.serial.lock().unwrap();
            if *serial == 0 && classified.serial != 0 {
                *serial = classified.serial;
            }
        }
        let iface = Arc::new(Interface::new(
            device.handle,
            device.vid,
            device.pid,
            classified.role,
            classified.model,
            classified.capabilities,
        ));
        *iface.board.lock().unwrap() = Arc::downgrade(board);
        board.interfaces.lock().unwrap().push(iface.clone());
        state.interfaces.insert(device.handle, iface);
    }

    /// Apply one device-online event, per the add-interface algorithm.
    pub fn add_interface(&self, device: &DeviceInfo) -> CoreResult<()> {
        let classified = match (self.family.classify_interface)(device) {
            ClassifyOutcome::Rejected => return Ok(()),
            ClassifyOutcome::Transient(err) => {
                let initial = !self.state.lock().unwrap().initial_enumeration_done;
                if initial {
                    self.log(&format!("ignoring transient classification error during initial enumeration: {err}"));
                    return Ok(());
                }
                return Err(err);
            }
            ClassifyOutcome::Accepted(c) => c,
        };

        let mut events: Vec<(BoardEventKind, Arc<Board>)> = Vec::new();
        {
            let mut state = self.state.lock().unwrap();
            let existing = state.boards.iter().find(|b| b.location == device.location).cloned();

            let (board, kind) = match existing {
                Some(board) => {
                    let model_conflict = match (*board.model.lock().unwrap(), classified.model) {
                        (Some(a), Some(b)) => a.usage_id != b.usage_id,
                        _ => false,
                    };
                    let reconciliation = crate::serial::reconcile(*board.serial.lock().unwrap(), classified.serial);
                    let serial_conflict = matches!(reconciliation, SerialReconciliation::Mismatch);

                    if model_conflict || serial_conflict {
                        events.push((BoardEventKind::Disappeared, board.clone()));
                        self.remove_board_from_live_lists(&mut state, &board);
                        events.push((BoardEventKind::Dropped, board.clone()));
                        let created = self.create_board(&mut state, device);
                        (created, BoardEventKind::Added)
                    } else {
                        if matches!(reconciliation, SerialReconciliation::PredatesWorkaround) {
                            self.log(&format!(
                                "board {} reports a serial predating the x10 workaround",
                                board.id()
                            ));
                        }
                        *board.vid.lock().unwrap() = device.vid;
                        *board.pid.lock().unwrap() = device.pid;
                        (board, BoardEventKind::Changed)
                    }
                }
                None => {
                    let created = self.create_board(&mut state, device);
                    (created, BoardEventKind::Added)
                }
            };

            self.merge_interface(&board, device, &classified, &mut state);
            self.detach_from_missing(&mut state, &board);
            *board.state.lock().unwrap() = BoardState::Online;
            events.push((kind, board));
        }

        for (kind, board) in events {
            self.dispatch_event(kind, board)?;
        }
        Ok(())
    }

    /// Apply one device-disconnected event, per the remove-interface
    /// algorithm.
    pub fn remove_interface(&self, device: DeviceHandle) -> CoreResult<()> {
        let mut events: Vec<(BoardEventKind, Arc<Board>)> = Vec::new();
        {
            let mut state = self.state.lock().unwrap();
            let Some(iface) = state.interfaces.remove(&device) else {
                return Ok(());
            };
            let Some(board) = iface.board.lock().unwrap().upgrade() else {
                return Ok(());
            };
            let now_empty = {
                let mut interfaces = board.interfaces.lock().unwrap();
                interfaces.remove_by_device(device);
                interfaces.interfaces.is_empty()
            };
            if now_empty {
                *board.state.lock().unwrap() = BoardState::Missing;
                let now = self.millis();
                *board.missing_since.lock().unwrap() = Some(now);
                state.missing.push_back(MissingEntry { board: board.clone(), deadline_ms: now + DROP_DEADLINE_MS });
                events.push((BoardEventKind::Disappeared, board));
            } else {
                events.push((BoardEventKind::Changed, board));
            }
        }
        for (kind, board) in events {
            self.dispatch_event(kind, board)?;
        }
        Ok(())
    }

    fn expire_missing(&self, now_ms: u64) -> Vec<(BoardEventKind, Arc<Board>)> {
        let mut events = Vec::new();
        let mut state = self.state.lock().unwrap();
        while let Some(front) = state.missing.front() {
            if front.deadline_ms > now_ms {
                break;
            }
            let entry = state.missing.pop_front().unwrap();
            *entry.board.state.lock().unwrap() = BoardState::Dropped;
            state.boards.retain(|b| !Arc::ptr_eq(b, &entry.board));
            events.push((BoardEventKind::Dropped, entry.board));
        }
        events
    }

    /// Drain expired missing boards, then perform an initial enumeration or
    /// an incremental refresh, broadcasting the condvar on success.
    pub fn refresh(&self) -> CoreResult<()> {
        let now = self.millis();
        for (kind, board) in self.expire_missing(now) {
            self.dispatch_event(kind, board)?;
        }

        let first = {
            let mut state = self.state.lock().unwrap();
            let first = !state.initial_enumeration_done;
            state.initial_enumeration_done = true;
            first
        };

        let mut pending: Vec<DeviceEvent> = Vec::new();
        {
            let mut platform = self.platform.lock().unwrap();
            let mut collect = |event: DeviceEvent| {
                pending.push(event);
                IterControl::Continue
            };
            if first {
                platform.list(&mut collect)?;
            } else {
                platform.refresh(&mut collect)?;
            }
        }

        for event in pending {
            match event.status {
                DeviceStatus::Online => self.add_interface(&event.device)?,
                DeviceStatus::Disconnected => self.remove_interface(event.device.handle)?,
            }
        }

        self.condvar.notify_all();
        Ok(())
    }

    /// Block until `predicate` returns `true` or `timeout_ms` elapses
    /// (`-1` blocks indefinitely). Uses condvar-based waiting under
    /// `PARALLEL_WAIT`, otherwise drives its own refresh/poll loop.
    pub fn wait(&self, mut predicate: impl FnMut() -> bool, timeout_ms: i64) -> CoreResult<bool> {
        let start = self.millis();

        if self.config.flags.contains(MonitorFlags::PARALLEL_WAIT) {
            let mut guard = self.state.lock().unwrap();
            loop {
                if predicate() {
                    return Ok(true);
                }
                let elapsed = self.millis() - start;
                let remaining = platform::adjust_timeout(timeout_ms, elapsed);
                if timeout_ms >= 0 && remaining == 0 {
                    return Ok(false);
                }
                let wait_for = if remaining < 0 { Duration::from_secs(3600) } else { Duration::from_millis(remaining as u64) };
                let (next_guard, timed_out) = self.condvar.wait_timeout(guard, wait_for).unwrap();
                guard = next_guard;
                if timed_out.timed_out() && timeout_ms >= 0 {
                    let elapsed = self.millis() - start;
                    if platform::adjust_timeout(timeout_ms, elapsed) == 0 {
                        return Ok(predicate());
                    }
                }
            }
        }

        loop {
            self.refresh()?;
            if predicate() {
                return Ok(true);
            }
            let elapsed = self.millis() - start;
            let remaining = platform::adjust_timeout(timeout_ms, elapsed);
            if timeout_ms >= 0 && remaining == 0 {
                return Ok(false);
            }
            let ready = {
                let mut platform = self.platform.lock().unwrap();
                platform.poll(remaining)?
            };
            if !ready && timeout_ms >= 0 {
                let elapsed = self.millis() - start;
                if platform::adjust_timeout(timeout_ms, elapsed) == 0 {
                    return Ok(false);
                }
            }
        }
    }
}
