//! Parse input from stdin and log events on stdout
use std::io::{self, Read};

use lapa::{Parser, Perform};

/// A type implementing Perform that just logs events
struct Log;

impl Perform for Log {
    fn print(&mut self, chars: &[char]) {
        println!("[print] {:?}", chars.iter().collect::<String>());
    }

    fn execute(&mut self, byte: u8) {
        println!("[execute] byte={byte:02x}");
    }

    fn hook(&mut self, params: &[u16], intermediates: &[u8], ignore: bool) {
        println!("[hook] params={params:?}, intermediates={intermediates:?}, ignore={ignore:?}");
    }

    fn put(&mut self, byte: u8) {
        println!("[put] byte={byte:02x}");
    }

    fn unhook(&mut self) {
        println!("[unhook]");
    }

    fn osc_start(&mut self) {
        println!("[osc_start]");
    }

    fn osc_put(&mut self, byte: u8) {
        println!("[osc_put] byte={byte:02x}");
    }

    fn osc_end(&mut self) {
        println!("[osc_end]");
    }

    fn csi_dispatch(&mut self, params: &[u16], intermediates: &[u8], ignore: bool, action: char) {
        println!(
            "[csi_dispatch] params={params:?}, intermediates={intermediates:?}, ignore={ignore:?}, action={action:?}"
        );
    }

    fn esc_dispatch(&mut self, intermediates: &[u8], ignore: bool, byte: u8) {
        println!("[esc_dispatch] intermediates={intermediates:?}, ignore={ignore:?}, byte={byte:02x}");
    }

    fn error(&mut self) {
        println!("[error]");
    }
}

fn main() -> io::Result<()> {
    let mut stdin = io::stdin().lock();

    let mut parser = Parser::new();
    let mut log = Log;

    let mut buf = [0u8; 2048];

    loop {
        match stdin.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => parser.advance(&mut log, &buf[..n]),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }

    Ok(())
}
