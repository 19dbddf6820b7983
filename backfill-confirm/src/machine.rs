use backfill_domain::{ConfirmationState, ConfirmationTrigger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{trigger} not allowed in state {from}")]
pub struct InvalidTransition {
    pub from: ConfirmationState,
    pub trigger: ConfirmationTrigger,
}

/// The whole confirmation lifecycle as a table. No clock, no storage.
///
/// Terminal states reject every trigger, with one exception: an `Expired`
/// request always cascades to `AutoCancelled`.
pub fn transition(
    from: ConfirmationState,
    trigger: ConfirmationTrigger,
) -> Result<ConfirmationState, InvalidTransition> {
    use ConfirmationState::*;
    use ConfirmationTrigger::*;

    let next = match (from, trigger) {
        (Scheduled, WindowOpened) => AwaitingConfirmation,
        // Early answers and bookings made inside the cutoff
        (Scheduled, CustomerConfirmed) => Confirmed,
        (AwaitingConfirmation, CustomerConfirmed) => Confirmed,
        (AwaitingConfirmation, DeadlinePassed) => Expired,
        (Expired, AutoCancel) => AutoCancelled,
        (Scheduled | AwaitingConfirmation, CustomerCancelled) => CancelledByCustomer,
        _ => return Err(InvalidTransition { from, trigger }),
    };
    Ok(next)
}
