//! Deterministic replay of an orchestration over its recorded history
//!
//! An orchestration is a plain function. Each call it makes through
//! [`ReplayContext`] is matched, in order, against the history: a recorded
//! outcome is returned immediately, otherwise the call interrupts the
//! function with the action the engine has to perform next. Nothing here
//! reads the clock or performs I/O, so the same history always yields the
//! same action.

use approvals_models::{
    ActivityOutcome, CompletionResult, HistoryEntry, HistoryEvent, WorkflowInput, WorkflowInstance,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Next step the engine must take for a suspended orchestration
#[derive(Debug, Clone, PartialEq)]
pub enum PendingAction {
    /// Record `ActivityScheduled`
    ScheduleActivity { seq: u32, name: String, input: Value },
    /// Run (or keep running) a scheduled activity
    AwaitActivity {
        seq: u32,
        name: String,
        input: Value,
        attempts_made: u32,
    },
    /// Arm a waiter for an external event
    RegisterWaiter { seq: u32, name: String },
    /// Suspended until the event is raised or the waiter abandoned
    AwaitEvent { seq: u32, name: String },
}

/// Why an orchestration function returned early
#[derive(Debug, Clone, PartialEq)]
pub enum Interrupt {
    Suspend(PendingAction),
    Fail(String),
}

pub type OrchestrationFn = fn(&mut ReplayContext<'_>, &WorkflowInput) -> Result<CompletionResult, Interrupt>;

#[derive(Debug, Clone, PartialEq)]
pub enum ReplayOutcome {
    Completed(CompletionResult),
    Failed(String),
    Pending(PendingAction),
}

pub struct ReplayContext<'a> {
    instance_id: &'a str,
    history: &'a [HistoryEntry],
    next_activity: u32,
    next_wait: u32,
}

impl<'a> ReplayContext<'a> {
    pub fn new(instance_id: &'a str, history: &'a [HistoryEntry]) -> Self {
        Self {
            instance_id,
            history,
            next_activity: 0,
            next_wait: 0,
        }
    }

    pub fn instance_id(&self) -> &str {
        self.instance_id
    }

    /// Calls an activity, returning its recorded result when there is one.
    pub fn call_activity<I, O>(&mut self, name: &str, input: &I) -> Result<O, Interrupt>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        let seq = self.next_activity;
        self.next_activity += 1;

        let scheduled = self.events().find_map(|event| match event {
            HistoryEvent::ActivityScheduled {
                seq: s,
                name: recorded,
                input,
            } if *s == seq => Some((recorded, input)),
            _ => None,
        });

        let Some((recorded, recorded_input)) = scheduled else {
            let input = serde_json::to_value(input)
                .map_err(|e| Interrupt::Fail(format!("failed to encode input for '{}': {}", name, e)))?;
            return Err(Interrupt::Suspend(PendingAction::ScheduleActivity {
                seq,
                name: name.to_string(),
                input,
            }));
        };

        if recorded != name {
            return Err(mismatch("activity", seq, recorded, name));
        }

        let mut attempts_made = 0;
        for event in self.events() {
            match event {
                HistoryEvent::ActivityFailed {
                    seq: s,
                    attempts,
                    error,
                    ..
                } if *s == seq => {
                    return Err(Interrupt::Fail(format!(
                        "activity '{}' failed after {} attempt(s): {}",
                        name, attempts, error
                    )));
                }
                HistoryEvent::ActivityAttempted { seq: s, invocation } if *s == seq => {
                    match &invocation.outcome {
                        ActivityOutcome::Succeeded { result } => {
                            return serde_json::from_value(result.clone()).map_err(|e| {
                                Interrupt::Fail(format!("unexpected output from '{}': {}", name, e))
                            });
                        }
                        ActivityOutcome::Failed { .. } => attempts_made += 1,
                        ActivityOutcome::Pending => {}
                    }
                }
                _ => {}
            }
        }

        Err(Interrupt::Suspend(PendingAction::AwaitActivity {
            seq,
            name: name.to_string(),
            input: recorded_input.clone(),
            attempts_made,
        }))
    }

    /// Waits for an external event and decodes its payload.
    pub fn wait_for_event<T: DeserializeOwned>(&mut self, name: &str) -> Result<T, Interrupt> {
        let seq = self.next_wait;
        self.next_wait += 1;

        let registered = self.events().find_map(|event| match event {
            HistoryEvent::WaiterRegistered { seq: s, name, .. } if *s == seq => Some(name),
            _ => None,
        });

        let Some(recorded) = registered else {
            return Err(Interrupt::Suspend(PendingAction::RegisterWaiter {
                seq,
                name: name.to_string(),
            }));
        };

        if recorded != name {
            return Err(mismatch("event wait", seq, recorded, name));
        }

        for event in self.events() {
            match event {
                HistoryEvent::EventRaised { seq: s, payload, .. } if *s == seq => {
                    return serde_json::from_value(payload.clone()).map_err(|e| {
                        Interrupt::Fail(format!("invalid payload for event '{}': {}", name, e))
                    });
                }
                HistoryEvent::WaiterAbandoned { seq: s, reason, .. } if *s == seq => {
                    return Err(Interrupt::Fail(format!(
                        "wait for event '{}' abandoned: {}",
                        name, reason
                    )));
                }
                _ => {}
            }
        }

        Err(Interrupt::Suspend(PendingAction::AwaitEvent {
            seq,
            name: name.to_string(),
        }))
    }

    fn events(&self) -> impl Iterator<Item = &'a HistoryEvent> {
        self.history.iter().map(|entry| &entry.event)
    }
}

fn mismatch(kind: &str, seq: u32, recorded: &str, requested: &str) -> Interrupt {
    Interrupt::Fail(format!(
        "nondeterministic replay: {} #{} was recorded as '{}' but the orchestration requested '{}'",
        kind, seq, recorded, requested
    ))
}

/// Runs `orchestration` over the instance history.
pub fn replay(orchestration: OrchestrationFn, instance: &WorkflowInstance) -> ReplayOutcome {
    let mut ctx = ReplayContext::new(&instance.id, &instance.history);

    match orchestration(&mut ctx, &instance.input) {
        Ok(result) => ReplayOutcome::Completed(result),
        Err(Interrupt::Fail(error)) => ReplayOutcome::Failed(error),
        Err(Interrupt::Suspend(action)) => ReplayOutcome::Pending(action),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approvals_models::ActivityInvocation;
    use chrono::Utc;

    fn two_steps(ctx: &mut ReplayContext<'_>, input: &WorkflowInput) -> Result<CompletionResult, Interrupt> {
        let n: u32 = ctx.call_activity("first", &1u32)?;
        let approved: bool = ctx.wait_for_event("Decision")?;
        Ok(CompletionResult {
            correlation_id: input.correlation_id.clone(),
            value: format!("{}:{}", n, approved),
        })
    }

    fn renamed(ctx: &mut ReplayContext<'_>, _input: &WorkflowInput) -> Result<CompletionResult, Interrupt> {
        let _: u32 = ctx.call_activity("second", &1u32)?;
        Err(Interrupt::Fail("unreachable".to_string()))
    }

    fn push(instance: &mut WorkflowInstance, event: HistoryEvent) {
        instance.history.push(HistoryEntry {
            sequence_number: instance.history.len() as u64,
            recorded_at: Utc::now(),
            event,
        });
    }

    fn instance() -> WorkflowInstance {
        let input = WorkflowInput {
            correlation_id: "corr-1".to_string(),
            ..Default::default()
        };
        WorkflowInstance::new("i-1", input, Utc::now())
    }

    fn attempt(instance: &mut WorkflowInstance, n: u32, outcome: Result<Value, &str>) {
        let invocation = ActivityInvocation::new("i-1", "first", serde_json::json!(1), n);
        let invocation = match outcome {
            Ok(v) => invocation.succeeded(v),
            Err(e) => invocation.failed(e),
        };
        push(instance, HistoryEvent::ActivityAttempted { seq: 0, invocation });
    }

    #[test]
    fn test_same_history_yields_same_action() {
        let mut instance = instance();
        assert_eq!(
            replay(two_steps, &instance),
            ReplayOutcome::Pending(PendingAction::ScheduleActivity {
                seq: 0,
                name: "first".to_string(),
                input: serde_json::json!(1),
            })
        );

        push(
            &mut instance,
            HistoryEvent::ActivityScheduled {
                seq: 0,
                name: "first".to_string(),
                input: serde_json::json!(1),
            },
        );
        attempt(&mut instance, 1, Err("status 503"));

        let first = replay(two_steps, &instance);
        let second = replay(two_steps, &instance);
        assert_eq!(first, second);
        assert_eq!(
            first,
            ReplayOutcome::Pending(PendingAction::AwaitActivity {
                seq: 0,
                name: "first".to_string(),
                input: serde_json::json!(1),
                attempts_made: 1,
            })
        );
    }

    #[test]
    fn test_recorded_outcomes_drive_completion() {
        let mut instance = instance();
        push(
            &mut instance,
            HistoryEvent::ActivityScheduled {
                seq: 0,
                name: "first".to_string(),
                input: serde_json::json!(1),
            },
        );
        attempt(&mut instance, 1, Ok(serde_json::json!(7)));

        assert_eq!(
            replay(two_steps, &instance),
            ReplayOutcome::Pending(PendingAction::RegisterWaiter {
                seq: 0,
                name: "Decision".to_string(),
            })
        );

        push(
            &mut instance,
            HistoryEvent::WaiterRegistered {
                seq: 0,
                name: "Decision".to_string(),
                deadline: None,
            },
        );
        assert_eq!(
            replay(two_steps, &instance),
            ReplayOutcome::Pending(PendingAction::AwaitEvent {
                seq: 0,
                name: "Decision".to_string(),
            })
        );

        push(
            &mut instance,
            HistoryEvent::EventRaised {
                seq: 0,
                name: "Decision".to_string(),
                payload: serde_json::json!(true),
            },
        );
        assert_eq!(
            replay(two_steps, &instance),
            ReplayOutcome::Completed(CompletionResult {
                correlation_id: "corr-1".to_string(),
                value: "7:true".to_string(),
            })
        );
    }

    #[test]
    fn test_exhausted_activity_fails_replay() {
        let mut instance = instance();
        push(
            &mut instance,
            HistoryEvent::ActivityScheduled {
                seq: 0,
                name: "first".to_string(),
                input: serde_json::json!(1),
            },
        );
        push(
            &mut instance,
            HistoryEvent::ActivityFailed {
                seq: 0,
                name: "first".to_string(),
                attempts: 3,
                error: "status 503".to_string(),
            },
        );

        let ReplayOutcome::Failed(error) = replay(two_steps, &instance) else {
            panic!("expected failure");
        };
        assert!(error.contains("after 3 attempt(s)"));
    }

    #[test]
    fn test_abandoned_wait_fails_replay() {
        let mut instance = instance();
        push(
            &mut instance,
            HistoryEvent::ActivityScheduled {
                seq: 0,
                name: "first".to_string(),
                input: serde_json::json!(1),
            },
        );
        attempt(&mut instance, 1, Ok(serde_json::json!(7)));
        push(
            &mut instance,
            HistoryEvent::WaiterRegistered {
                seq: 0,
                name: "Decision".to_string(),
                deadline: None,
            },
        );
        push(
            &mut instance,
            HistoryEvent::WaiterAbandoned {
                seq: 0,
                name: "Decision".to_string(),
                reason: "deadline exceeded".to_string(),
            },
        );

        assert_eq!(
            replay(two_steps, &instance),
            ReplayOutcome::Failed("wait for event 'Decision' abandoned: deadline exceeded".to_string())
        );
    }

    #[test]
    fn test_history_mismatch_is_detected() {
        let mut instance = instance();
        push(
            &mut instance,
            HistoryEvent::ActivityScheduled {
                seq: 0,
                name: "first".to_string(),
                input: serde_json::json!(1),
            },
        );

        let ReplayOutcome::Failed(error) = replay(renamed, &instance) else {
            panic!("expected failure");
        };
        assert!(error.starts_with("nondeterministic replay"));
    }
}
