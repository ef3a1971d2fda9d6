/// Number of machine states, and the row count of every table.
pub const NUM_STATES: usize = 14;

/// States of the escape sequence state machine.
///
/// The initial state is `Ground`; there is no terminal state. The
/// discriminants index the transition and entry/exit action tables.
#[repr(u8)]
#[derive(PartialEq, Eq, Debug, Default, Copy, Clone)]
pub enum State {
    #[default]
    Ground = 0,
    Escape,
    EscapeIntermediate,
    CsiEntry,
    CsiParam,
    CsiIntermediate,
    CsiIgnore,
    DcsEntry,
    DcsParam,
    DcsIntermediate,
    DcsPassthrough,
    DcsIgnore,
    OscString,
    SosPmApcString,
}

/// Actions the state machine can perform.
///
/// `Error` is never written into the tables; it is what an out-of-range
/// action code decodes to, so a malformed table surfaces through
/// [`Perform::error`](crate::Perform::error) instead of being dropped.
#[repr(u8)]
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum Action {
    Print = 0,
    Execute,
    Hook,
    Put,
    OscStart,
    OscPut,
    OscEnd,
    Unhook,
    CsiDispatch,
    EscDispatch,
    Ignore,
    Collect,
    Param,
    Clear,
    Error,
}

/// Unpack a transition byte into its target state and action.
///
/// The low nibble carries the state and the high nibble the action, both
/// offset by one so that zero means "none". The sentinel is decoded to an
/// explicit `None` rather than leaking into the driver as a magic value.
#[inline(always)]
pub const fn unpack(change: u8) -> (Option<State>, Option<Action>) {
    (unpack_state(change & 0x0f), unpack_action(change >> 4))
}

#[inline(always)]
const fn unpack_state(code: u8) -> Option<State> {
    Some(match code {
        1 => State::Ground,
        2 => State::Escape,
        3 => State::EscapeIntermediate,
        4 => State::CsiEntry,
        5 => State::CsiParam,
        6 => State::CsiIntermediate,
        7 => State::CsiIgnore,
        8 => State::DcsEntry,
        9 => State::DcsParam,
        10 => State::DcsIntermediate,
        11 => State::DcsPassthrough,
        12 => State::DcsIgnore,
        13 => State::OscString,
        14 => State::SosPmApcString,
        _ => return None,
    })
}

#[inline(always)]
const fn unpack_action(code: u8) -> Option<Action> {
    Some(match code {
        1 => Action::Print,
        2 => Action::Execute,
        3 => Action::Hook,
        4 => Action::Put,
        5 => Action::OscStart,
        6 => Action::OscPut,
        7 => Action::OscEnd,
        8 => Action::Unhook,
        9 => Action::CsiDispatch,
        10 => Action::EscDispatch,
        11 => Action::Ignore,
        12 => Action::Collect,
        13 => Action::Param,
        14 => Action::Clear,
        15 => Action::Error,
        _ => return None,
    })
}

#[inline(always)]
pub const fn pack(state: Option<State>, action: Option<Action>) -> u8 {
    let state = match state {
        Some(state) => state as u8 + 1,
        None => 0,
    };
    let action = match action {
        Some(action) => action as u8 + 1,
        None => 0,
    };
    (action << 4) | state
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpack_state_action() {
        match unpack(pack(Some(State::Ground), Some(Action::Unhook))) {
            (Some(State::Ground), Some(Action::Unhook)) => (),
            other => panic!("unpack failed: {other:?}"),
        }

        match unpack(pack(Some(State::Ground), None)) {
            (Some(State::Ground), None) => (),
            other => panic!("unpack failed: {other:?}"),
        }

        match unpack(pack(None, Some(Action::Unhook))) {
            (None, Some(Action::Unhook)) => (),
            other => panic!("unpack failed: {other:?}"),
        }

        assert_eq!(unpack(0), (None, None));
    }

    #[test]
    fn pack_round_trips_every_cell() {
        for state in [
            None,
            Some(State::Ground),
            Some(State::CsiParam),
            Some(State::SosPmApcString),
        ] {
            for action in [
                None,
                Some(Action::Print),
                Some(Action::Param),
                Some(Action::Clear),
            ] {
                assert_eq!(unpack(pack(state, action)), (state, action));
            }
        }
    }

    #[test]
    fn out_of_range_action_code_decodes_to_error() {
        // The tables never pack `Error`; a cell carrying action code 15
        // must surface as `Error` rather than be silently dropped.
        assert_eq!(unpack(0xf0), (None, Some(Action::Error)));
    }
}
