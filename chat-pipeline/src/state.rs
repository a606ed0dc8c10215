use common::error::AppError;
use state_machines::{core::GuardError, state_machine};

state_machine! {
    name: TurnMachine,
    state: TurnState,
    initial: Retrieving,
    states: [Retrieving, Generating, Finalizing, Done, Failed],
    events {
        generate { transition: { from: Retrieving, to: Generating } }
        finalize { transition: { from: Generating, to: Finalizing } }
        complete { transition: { from: Finalizing, to: Done } }
        abort {
            transition: { from: Retrieving, to: Failed }
            transition: { from: Generating, to: Failed }
            transition: { from: Finalizing, to: Failed }
        }
    }
}

pub fn retrieving() -> TurnMachine<(), Retrieving> {
    TurnMachine::new(())
}

pub fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!("invalid chat turn transition during {event}: {guard:?}"))
}
