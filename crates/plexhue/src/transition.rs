use crate::event::PlaybackEvent;

/// Why an incoming event was refused given the last processed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("event '{0}' is the same as the last event")]
    Duplicate(PlaybackEvent),

    #[error("event '{event}' after '{last}' does not change the playback phase")]
    Redundant {
        event: PlaybackEvent,
        last: PlaybackEvent,
    },
}

/// Decide whether `event` may follow `last`.
///
/// Play/resume and pause/stop each form one phase. An exact repeat is a
/// duplicate, and moving to the other member of the current phase is
/// redundant. With no previous event everything is accepted.
pub fn validate_transition(
    event: PlaybackEvent,
    last: Option<PlaybackEvent>,
) -> Result<(), Rejection> {
    let Some(last) = last else {
        return Ok(());
    };

    if event == last {
        return Err(Rejection::Duplicate(event));
    }

    if event.phase() == last.phase() {
        return Err(Rejection::Redundant { event, last });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use PlaybackEvent::*;

    #[test]
    fn test_rejects_exactly_duplicates_and_same_phase_pairs() {
        let rejected = [
            (Play, Play),
            (Resume, Resume),
            (Pause, Pause),
            (Stop, Stop),
            (Stop, Pause),
            (Pause, Stop),
            (Play, Resume),
            (Resume, Play),
        ];

        for event in PlaybackEvent::ALL {
            for last in PlaybackEvent::ALL {
                let result = validate_transition(event, Some(last));
                let expect_reject = rejected.contains(&(event, last));
                assert_eq!(
                    result.is_err(),
                    expect_reject,
                    "{} after {}: {:?}",
                    event,
                    last,
                    result
                );
            }
        }
    }

    #[test]
    fn test_duplicate_wins_over_redundant() {
        assert_eq!(
            validate_transition(Pause, Some(Pause)),
            Err(Rejection::Duplicate(Pause))
        );
        assert_eq!(
            validate_transition(Stop, Some(Pause)),
            Err(Rejection::Redundant {
                event: Stop,
                last: Pause
            })
        );
    }

    #[test]
    fn test_first_event_always_accepted() {
        for event in PlaybackEvent::ALL {
            assert_eq!(validate_transition(event, None), Ok(()));
        }
    }

    #[test]
    fn test_rejection_messages() {
        insta::assert_snapshot!(
            Rejection::Duplicate(Play).to_string(),
            @"event 'media.play' is the same as the last event"
        );
        insta::assert_snapshot!(
            Rejection::Redundant { event: Stop, last: Pause }.to_string(),
            @"event 'media.stop' after 'media.pause' does not change the playback phase"
        );
    }
}
