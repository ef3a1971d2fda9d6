//! Parser for implementing virtual terminal emulators
//!
//! [`Parser`] is implemented according to [Paul Williams' ANSI parser
//! state machine]. The state machine doesn't assign meaning to the parsed
//! data and is thus not itself sufficient for writing a terminal emulator.
//! Instead, it is expected that an implementation of [`Perform`] is
//! provided which does something useful with the parsed data. The
//! [`Parser`] handles the book keeping, and the [`Perform`] gets to simply
//! handle actions.
//!
//! # Examples
//!
//! For an example of using the [`Parser`] please see the demos folder. The
//! example included there simply logs all the actions [`Perform`] does.
//! One quick way to see it in action is to pipe `vim` into it
//!
//! ```sh
//! cargo build --release --example parselog
//! vim | target/release/examples/parselog
//! ```
//!
//! Just type `:q` to exit.
//!
//! # Differences from original state machine description
//!
//! * UTF-8 is decoded ahead of the state machine; a permissive decoder
//!   mirroring the historical behavior is the default, and a validating
//!   decoder with U+FFFD replacement can be selected at construction.
//! * Runs of printable characters in the ground state are coalesced and
//!   delivered to [`Perform::print`] as a single slice.
//! * OSC strings can be terminated by 0x07.
//!
//! [Paul Williams' ANSI parser state machine]: https://vt100.net/emu/dec_ansi_parser
#![deny(clippy::if_not_else, clippy::enum_glob_use)]

use arrayvec::ArrayVec;

mod definitions;
mod table;

use definitions::{unpack, Action, State};

const MAX_INTERMEDIATES: usize = 2;
const MAX_PARAMS: usize = 16;
const PRINT_BUF_LEN: usize = 64;

/// How the byte-stream entry point decodes UTF-8.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Default)]
pub enum Utf8Mode {
    /// Accept what the wire carries: overlong forms decode to their value,
    /// 5- and 6-byte forms are folded, stray continuation bytes are
    /// swallowed, and any byte arriving inside a sequence contributes its
    /// low six bits. Completed values that are not Unicode scalars become
    /// U+FFFD, which is the only place this mode rejects anything.
    #[default]
    Permissive,
    /// Reject malformed input: overlong forms, surrogates, values above
    /// U+10FFFF, 5- and 6-byte forms and stray continuation bytes are all
    /// replaced by U+FFFD. A byte that cannot continue the sequence it is
    /// in emits the replacement and is then reprocessed on its own.
    Strict,
}

/// Parser for the raw escape sequence protocol which delegates actions to
/// a [`Perform`]
///
/// All storage is fixed capacity and lives inline: intermediates (2),
/// numeric parameters (16) and the print-coalescing buffer (64 code
/// points). The parser never allocates, never fails on input and never
/// performs I/O. Distinct instances may be driven from distinct threads;
/// a single instance must not be shared.
#[derive(Debug)]
pub struct Parser {
    state: State,
    intermediates: [u8; MAX_INTERMEDIATES],
    intermediate_idx: usize,
    params: [u16; MAX_PARAMS],
    num_params: usize,
    params_full: bool,
    ignoring: bool,
    print_buf: ArrayVec<char, PRINT_BUF_LEN>,
    utf8_mode: Utf8Mode,
    utf8_codepoint: u32,
    // Bytes of the current UTF-8 sequence still expected, plus one; the
    // value 1 means the decoder is idle.
    utf8_remaining: u8,
    utf8_len: u8,
}

impl Default for Parser {
    fn default() -> Parser {
        Parser::new()
    }
}

impl Parser {
    /// Create a new Parser with the permissive UTF-8 decoder.
    pub fn new() -> Parser {
        Parser::with_utf8_mode(Utf8Mode::Permissive)
    }

    /// Create a new Parser that validates UTF-8 and substitutes U+FFFD
    /// for malformed input.
    pub fn new_strict() -> Parser {
        Parser::with_utf8_mode(Utf8Mode::Strict)
    }

    /// Create a new Parser with an explicit UTF-8 decoding mode.
    pub fn with_utf8_mode(utf8_mode: Utf8Mode) -> Parser {
        Parser {
            state: State::Ground,
            intermediates: [0; MAX_INTERMEDIATES],
            intermediate_idx: 0,
            params: [0; MAX_PARAMS],
            num_params: 0,
            params_full: false,
            ignoring: false,
            print_buf: ArrayVec::new(),
            utf8_mode,
            utf8_codepoint: 0,
            utf8_remaining: 1,
            utf8_len: 0,
        }
    }

    /// Advance the parser state by a chunk of the byte stream.
    ///
    /// Every resulting action is delivered to `performer` before this
    /// returns, and a pending print run is always flushed on return. The
    /// chunking of the stream is otherwise free: feeding byte by byte
    /// produces the same events as feeding everything at once, except
    /// that print runs may be split differently.
    #[inline]
    pub fn advance<P: Perform>(&mut self, performer: &mut P, bytes: &[u8]) {
        let mut i = 0;
        while i < bytes.len() {
            // Printable ASCII dominates real streams; while the decoder is
            // idle in ground state, coalesce whole runs of it without
            // going through per-byte dispatch.
            if self.state == State::Ground && self.utf8_remaining == 1 {
                let run = printable_run(&bytes[i..]);
                if run > 0 {
                    self.coalesce_ascii(performer, &bytes[i..i + run]);
                    i += run;
                    continue;
                }
            }

            match self.utf8_mode {
                Utf8Mode::Permissive => self.advance_permissive(performer, bytes[i]),
                Utf8Mode::Strict => self.advance_strict(performer, bytes[i]),
            }
            i += 1;
        }

        self.flush_print(performer);
    }

    /// Advance the parser state by pre-decoded code points, bypassing the
    /// UTF-8 front-end. Otherwise identical to [`Self::advance`].
    #[inline]
    pub fn advance_chars<P: Perform>(&mut self, performer: &mut P, chars: &[char]) {
        for &c in chars {
            self.parse_char(performer, c as u32);
        }

        self.flush_print(performer);
    }

    /// One step of the permissive decoder, faithful to the historical
    /// bit-counting scheme: 0xfe and 0xff open a six byte sequence and a
    /// continuation byte outside any sequence is dropped on the floor.
    fn advance_permissive<P: Perform>(&mut self, performer: &mut P, byte: u8) {
        if self.utf8_remaining > 1 {
            self.utf8_codepoint = (self.utf8_codepoint << 6) | u32::from(byte & 0x3f);
            self.utf8_remaining -= 1;
            if self.utf8_remaining == 1 {
                self.parse_char(performer, self.utf8_codepoint);
            }
            return;
        }

        if byte & 0x80 == 0 {
            self.parse_char(performer, u32::from(byte));
            return;
        }

        let ones = byte.leading_ones() as u8;
        if ones == 1 {
            // Stray continuation byte.
            self.utf8_codepoint = 0;
            return;
        }
        self.begin_utf8(byte, ones);
    }

    /// One step of the validating decoder. Sequence length accounting is
    /// shared with the permissive decoder; the difference is that
    /// continuation bytes are checked and completed values are vetted
    /// before delivery.
    fn advance_strict<P: Perform>(&mut self, performer: &mut P, byte: u8) {
        if self.utf8_remaining > 1 {
            if byte & 0xc0 != 0x80 {
                // The sequence cannot be completed; substitute it and give
                // the byte a fresh start.
                self.utf8_remaining = 1;
                self.parse_char(performer, u32::from(char::REPLACEMENT_CHARACTER));
                self.advance_strict(performer, byte);
                return;
            }
            self.utf8_codepoint = (self.utf8_codepoint << 6) | u32::from(byte & 0x3f);
            self.utf8_remaining -= 1;
            if self.utf8_remaining == 1 {
                let cp = vet_scalar(self.utf8_codepoint, self.utf8_len);
                self.parse_char(performer, cp);
            }
            return;
        }

        if byte & 0x80 == 0 {
            self.parse_char(performer, u32::from(byte));
            return;
        }

        let ones = byte.leading_ones() as u8;
        if ones == 1 {
            self.parse_char(performer, u32::from(char::REPLACEMENT_CHARACTER));
            return;
        }
        // 5- and 6-byte leads accumulate like any sequence and fail the
        // completion check.
        self.begin_utf8(byte, ones);
    }

    fn begin_utf8(&mut self, byte: u8, ones: u8) {
        let len = if ones > 6 { 6 } else { ones };
        self.utf8_len = len;
        self.utf8_remaining = len;
        self.utf8_codepoint = u32::from(byte & (0x7f >> len));
    }

    /// Route one code point: coalesce ground-state printables, otherwise
    /// flush the print run and consult the state table.
    fn parse_char<P: Perform>(&mut self, performer: &mut P, cp: u32) {
        if self.state == State::Ground && cp >= 0x20 {
            self.print_buf.push(scalar_or_replacement(cp));
            if self.print_buf.len() >= PRINT_BUF_LEN - 1 {
                self.flush_print(performer);
            }
            return;
        }

        if !self.print_buf.is_empty() {
            self.flush_print(performer);
        }

        // The table is byte indexed; outside ground state a wider code
        // point has no defined transition and is dropped.
        if cp > 0xff {
            return;
        }

        let change = table::STATE_TABLE[self.state as usize][cp as usize];
        self.state_change(performer, change, cp);
    }

    /// Perform up to three actions for one transition: the exit action of
    /// the old state, the action carried by the transition itself, and the
    /// entry action of the new state. Entry and exit actions see code
    /// point 0. This ordering is what guarantees a clear on entering the
    /// entry states and an end-of-string action on leaving the
    /// string-collecting ones.
    fn state_change<P: Perform>(&mut self, performer: &mut P, change: u8, cp: u32) {
        let (next_state, action) = unpack(change);

        match next_state {
            Some(next_state) => {
                if let Some(exit) = table::EXIT_ACTIONS[self.state as usize] {
                    self.do_action(performer, exit, 0);
                }
                if let Some(action) = action {
                    self.do_action(performer, action, cp);
                }
                if let Some(entry) = table::ENTRY_ACTIONS[next_state as usize] {
                    self.do_action(performer, entry, 0);
                }
                self.state = next_state;
            }
            None => {
                if let Some(action) = action {
                    self.do_action(performer, action, cp);
                }
            }
        }
    }

    /// Apply a single action: parameter, intermediate and clear actions
    /// mutate the parser, everything else is handed to the performer.
    fn do_action<P: Perform>(&mut self, performer: &mut P, action: Action, cp: u32) {
        match action {
            Action::Print => performer.print(&self.print_buf),
            Action::Execute => performer.execute(cp as u8),
            Action::Hook => performer.hook(
                &self.params[..self.num_params],
                &self.intermediates[..self.intermediate_idx],
                self.ignoring,
            ),
            Action::Put => performer.put(cp as u8),
            Action::OscStart => performer.osc_start(),
            Action::OscPut => performer.osc_put(cp as u8),
            Action::OscEnd => performer.osc_end(),
            Action::Unhook => performer.unhook(),
            Action::CsiDispatch => performer.csi_dispatch(
                &self.params[..self.num_params],
                &self.intermediates[..self.intermediate_idx],
                self.ignoring,
                cp as u8 as char,
            ),
            Action::EscDispatch => performer.esc_dispatch(
                &self.intermediates[..self.intermediate_idx],
                self.ignoring,
                cp as u8,
            ),
            Action::Ignore => (),
            Action::Collect => {
                if self.intermediate_idx == MAX_INTERMEDIATES {
                    self.ignoring = true;
                } else {
                    self.intermediates[self.intermediate_idx] = cp as u8;
                    self.intermediate_idx += 1;
                }
            }
            Action::Param => {
                if cp == u32::from(b';') {
                    if self.num_params == MAX_PARAMS {
                        // A 17th parameter starts; drop it and everything
                        // after it so late digits cannot bleed into the
                        // last stored parameter.
                        self.params_full = true;
                    } else {
                        self.params[self.num_params] = 0;
                        self.num_params += 1;
                    }
                } else if !self.params_full {
                    if self.num_params == 0 {
                        self.params[0] = 0;
                        self.num_params = 1;
                    }
                    let digit = u16::from(cp as u8 - b'0');
                    let param = &mut self.params[self.num_params - 1];
                    *param = param.saturating_mul(10).saturating_add(digit);
                }
            }
            Action::Clear => {
                self.intermediate_idx = 0;
                self.num_params = 0;
                self.params_full = false;
                self.ignoring = false;
            }
            Action::Error => performer.error(),
        }
    }

    /// Deliver the pending print run, if any. The collection counters are
    /// reset first, mirroring the reference implementation even though in
    /// ground state they are already zero.
    fn flush_print<P: Perform>(&mut self, performer: &mut P) {
        if self.print_buf.is_empty() {
            return;
        }

        self.intermediate_idx = 0;
        self.num_params = 0;
        self.params_full = false;
        self.ignoring = false;
        self.do_action(performer, Action::Print, 0);
        self.print_buf.clear();
    }

    /// Append a run of printable ASCII to the print buffer, flushing
    /// whenever the buffer comes within one slot of capacity, exactly as
    /// the per-byte path does.
    fn coalesce_ascii<P: Perform>(&mut self, performer: &mut P, run: &[u8]) {
        for &byte in run {
            self.print_buf.push(byte as char);
            if self.print_buf.len() >= PRINT_BUF_LEN - 1 {
                self.flush_print(performer);
            }
        }
    }
}

/// Length of the leading run of printable ASCII (0x20..=0x7f).
#[inline]
fn printable_run(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .position(|&byte| !(0x20..=0x7f).contains(&byte))
        .unwrap_or(bytes.len())
}

#[inline]
fn scalar_or_replacement(cp: u32) -> char {
    char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER)
}

/// Reject overlong forms, surrogates, out-of-range values and every 5- or
/// 6-byte sequence. `len` is the byte length the lead byte announced.
#[inline]
fn vet_scalar(cp: u32, len: u8) -> u32 {
    let min = match len {
        2 => 0x80,
        3 => 0x800,
        4 => 0x1_0000,
        _ => 0x20_0000,
    };
    if cp < min || (0xd800..=0xdfff).contains(&cp) || cp > 0x10_ffff {
        u32::from(char::REPLACEMENT_CHARACTER)
    } else {
        cp
    }
}

/// Performs actions requested by the Parser
///
/// Actions in this case mean, for example, handling a CSI escape sequence
/// describing cursor movement, or simply printing characters to the
/// screen.
///
/// The methods on this type correspond to the actions described in
/// <https://vt100.net/emu/dec_ansi_parser>, with two departures: printable
/// characters arrive coalesced into slices, and OSC payload bytes are
/// delivered one at a time between `osc_start` and `osc_end` rather than
/// gathered into a parameter list.
///
/// A performer must not feed more bytes into the parser that invoked it;
/// the borrow rules enforce this for the same parser instance.
pub trait Perform {
    /// Draw a run of characters to the screen and update states.
    ///
    /// The run is never empty and holds at most one slot less than the
    /// print buffer capacity.
    fn print(&mut self, _chars: &[char]) {}

    /// Execute a C0 or C1 control function.
    fn execute(&mut self, _byte: u8) {}

    /// Invoked when the final character of a device control string
    /// introducer arrives, with the accumulated parameters and
    /// intermediates. A handler should be selected for the string; the
    /// handler is subsequently fed by `put` for every payload character.
    ///
    /// The `ignore` flag indicates that more than two intermediates
    /// arrived and subsequent characters were ignored.
    fn hook(&mut self, _params: &[u16], _intermediates: &[u8], _ignore: bool) {}

    /// Pass a byte of the device control string to the handler chosen in
    /// `hook`. C0 controls are passed through as well.
    fn put(&mut self, _byte: u8) {}

    /// Called when a device control string is terminated, whatever the
    /// cause. The handler chosen in `hook` should be notified.
    fn unhook(&mut self) {}

    /// An operating system command string is beginning.
    fn osc_start(&mut self) {}

    /// Pass a byte of the operating system command string. Parameter
    /// splitting on `;` is left to the host.
    fn osc_put(&mut self, _byte: u8) {}

    /// The operating system command string is terminated.
    fn osc_end(&mut self) {}

    /// A final character has arrived for a CSI sequence
    ///
    /// The `ignore` flag indicates that more than two intermediates
    /// arrived and subsequent characters were ignored.
    fn csi_dispatch(
        &mut self,
        _params: &[u16],
        _intermediates: &[u8],
        _ignore: bool,
        _action: char,
    ) {
    }

    /// The final character of an escape sequence has arrived.
    ///
    /// The `ignore` flag indicates that more than two intermediates
    /// arrived and subsequent characters were ignored.
    fn esc_dispatch(&mut self, _intermediates: &[u8], _ignore: bool, _byte: u8) {}

    /// An action code the executor does not know appeared in the tables.
    /// This is a construction-time defect of the tables, not an input
    /// condition; it cannot fire from the tables shipped with the crate.
    fn error(&mut self) {}
}
