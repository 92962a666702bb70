//
// kernel_state.rs
//
// Copyright (C) 2024-2025 Posit Software, PBC. All rights reserved.
//
//

/// The mutable state of the kernel.
///
/// Does not implement the Clone trait; only one instance of the kernel state
/// should exist at a time. It outlives engine restarts.
#[derive(Debug)]
pub struct KernelState {
    /// The session ID for this kernel instance.
    pub session_id: String,

    /// The number of execute requests received so far. Never reset, not even
    /// when the engine restarts.
    pub execution_count: u32,

    /// Whether to suppress results that are just `undefined`.
    pub hide_undefined: bool,

    /// The number of requests currently being handled.
    pub active_requests: usize,

    /// The time at which the kernel last became busy.
    pub busy_since: Option<std::time::Instant>,
}

impl KernelState {
    /// Create a new kernel state.
    pub fn new(session_id: String, hide_undefined: bool) -> Self {
        KernelState {
            session_id,
            execution_count: 0,
            hide_undefined,
            active_requests: 0,
            busy_since: None,
        }
    }

    /// Count an execute request, returning its execution count.
    pub fn next_execution_count(&mut self) -> u32 {
        self.execution_count += 1;
        self.execution_count
    }

    /// Record that a request is being handled.
    pub fn request_started(&mut self, msg_type: &str) {
        if self.active_requests == 0 {
            self.busy_since = Some(std::time::Instant::now());
            log::debug!(
                "[session {}] status 'idle' => 'busy' ({})",
                self.session_id,
                msg_type
            );
        }
        self.active_requests += 1;
    }

    /// Record that a request has been handled.
    pub fn request_finished(&mut self, msg_type: &str) {
        self.active_requests = self.active_requests.saturating_sub(1);
        if self.active_requests == 0 {
            let elapsed = self.busy_since.take().map(|since| since.elapsed());
            log::debug!(
                "[session {}] status 'busy' => 'idle' ({}{})",
                self.session_id,
                msg_type,
                match elapsed {
                    Some(elapsed) => format!(", busy for {}ms", elapsed.as_millis()),
                    None => String::new(),
                }
            );
        }
    }
}
