//! Loop guard for the tool-call loop.
//!
//! `LoopGuard` bounds how many times the model is invoked in one turn and
//! stops the loop as soon as a cycle requests exactly the same tool calls as
//! the cycle before it.

use todoloop_types::llm::ActionCall;

/// Why the tool loop was stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// The same calls (names and normalized inputs) were requested on two
    /// consecutive cycles.
    Repetition { tool: String },
    /// The last permitted cycle still asked for tools.
    CycleLimit { cycles: u32 },
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HaltReason::Repetition { tool } => write!(f, "tool '{tool}' requested repeatedly with the same input"),
            HaltReason::CycleLimit { cycles } => write!(f, "tool loop reached {cycles} cycles"),
        }
    }
}

/// Result of checking a cycle's tool requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardVerdict {
    Continue,
    Halt(HaltReason),
}

#[derive(Debug)]
pub struct LoopGuard {
    max_cycles: u32,
    cycles: u32,
    previous: Option<Vec<(String, String)>>,
}

impl LoopGuard {
    pub fn new(max_cycles: u32) -> Self {
        Self {
            max_cycles: max_cycles.max(1),
            cycles: 0,
            previous: None,
        }
    }

    /// Register the start of a model invocation.
    pub fn begin_cycle(&mut self) -> u32 {
        self.cycles += 1;
        self.cycles
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Check the calls requested by the current cycle and remember them.
    ///
    /// Calls compare by name and normalized input, in request order.
    /// Repetition is checked before the cycle limit.
    pub fn check(&mut self, calls: &[ActionCall]) -> GuardVerdict {
        let signature: Vec<(String, String)> = calls
            .iter()
            .map(|call| (call.name.clone(), call.normalized_input()))
            .collect();
        let first_tool = signature
            .first()
            .map(|(name, _)| name.clone())
            .unwrap_or_default();

        if self.previous.as_ref() == Some(&signature) {
            return GuardVerdict::Halt(HaltReason::Repetition { tool: first_tool });
        }
        self.previous = Some(signature);

        if self.cycles >= self.max_cycles {
            return GuardVerdict::Halt(HaltReason::CycleLimit { cycles: self.cycles });
        }
        GuardVerdict::Continue
    }
}
