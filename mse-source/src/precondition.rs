//! Gating of media source operations on ready state and buffer activity.

use crate::{DomError, ReadyState};

pub(crate) const NO_ADDITIONAL_SOURCE_BUFFERS: &str =
    "Cannot add any additional SourceBuffer objects.";

/// State the preconditions are evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub ready_state: ReadyState,
    /// Any registered source buffer is updating.
    pub any_updating: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    AddSourceBuffer,
    EndOfStream,
    SetDuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    Satisfied,
    NotOpen,
    Updating,
}

/// Ready state is checked before buffer activity.
pub fn evaluate(operation: Operation, snapshot: Snapshot) -> Precondition {
    if snapshot.ready_state != ReadyState::Open {
        return Precondition::NotOpen;
    }

    match operation {
        Operation::AddSourceBuffer => Precondition::Satisfied,
        Operation::EndOfStream | Operation::SetDuration if snapshot.any_updating => {
            Precondition::Updating
        }
        Operation::EndOfStream | Operation::SetDuration => Precondition::Satisfied,
    }
}

impl Precondition {
    /// The error a script sees when `operation` fails this precondition.
    pub fn check(self, operation: Operation) -> Result<(), DomError> {
        let message = match (self, operation) {
            // Buffer activity never gates admission.
            (Self::Satisfied, _) | (Self::Updating, Operation::AddSourceBuffer) => return Ok(()),
            (Self::NotOpen, Operation::AddSourceBuffer) => {
                return Err(DomError::NotSupported(
                    NO_ADDITIONAL_SOURCE_BUFFERS.to_owned(),
                ));
            }
            (Self::NotOpen, Operation::EndOfStream) => {
                r#"Cannot call endOfStream() unless MediaSource is "open"."#
            }
            (Self::NotOpen, Operation::SetDuration) => {
                r#"Cannot change duration unless MediaSource is "open"."#
            }
            (Self::Updating, Operation::EndOfStream) => {
                "Cannot call endOfStream() when a SourceBuffer is updating."
            }
            (Self::Updating, Operation::SetDuration) => {
                "Cannot change duration when a SourceBuffer is updating."
            }
        };

        Err(DomError::InvalidState(message.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(ready_state: ReadyState, any_updating: bool) -> Snapshot {
        Snapshot {
            ready_state,
            any_updating,
        }
    }

    #[test]
    fn closed_and_ended_are_not_open() {
        for state in [ReadyState::Closed, ReadyState::Ended] {
            for updating in [false, true] {
                for operation in [
                    Operation::AddSourceBuffer,
                    Operation::EndOfStream,
                    Operation::SetDuration,
                ] {
                    assert_eq!(
                        evaluate(operation, snapshot(state, updating)),
                        Precondition::NotOpen
                    );
                }
            }
        }
    }

    #[test]
    fn updating_blocks_end_of_stream_and_duration() {
        let open = snapshot(ReadyState::Open, true);
        assert_eq!(evaluate(Operation::EndOfStream, open), Precondition::Updating);
        assert_eq!(evaluate(Operation::SetDuration, open), Precondition::Updating);
        assert_eq!(
            evaluate(Operation::AddSourceBuffer, open),
            Precondition::Satisfied
        );
    }

    #[test]
    fn errors_carry_operation_messages() {
        assert_eq!(
            Precondition::NotOpen.check(Operation::EndOfStream),
            Err(DomError::InvalidState(
                r#"Cannot call endOfStream() unless MediaSource is "open"."#.to_owned()
            ))
        );
        assert!(matches!(
            Precondition::NotOpen.check(Operation::AddSourceBuffer),
            Err(DomError::NotSupported(_))
        ));
        assert_eq!(
            Precondition::Updating.check(Operation::SetDuration),
            Err(DomError::InvalidState(
                "Cannot change duration when a SourceBuffer is updating.".to_owned()
            ))
        );
        assert_eq!(Precondition::Satisfied.check(Operation::SetDuration), Ok(()));
    }
}
