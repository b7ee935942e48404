use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::{debug, info, warn};

use crate::{Fault, Result};

/// Address window the resolver covers, start inclusive, end exclusive.
pub const WINDOW_START: u16 = 0x8000;
pub const WINDOW_END: u16 = 0xC000;

const TABLE_SIZE: usize = (WINDOW_END - WINDOW_START) as usize;

/// Longest field the table stores, after trimming.
pub const SYMBOL_CAPACITY: usize = 31;

/// Bounded symbol text. Fixed capacity keeps the 16 K-entry table a flat,
/// predictable allocation; overflow is signalled at load time instead.
#[derive(Debug, Clone, Copy)]
struct SymbolText {
    buf: [u8; SYMBOL_CAPACITY],
    len: u8,
}

impl SymbolText {
    const EMPTY: Self = Self {
        buf: [0; SYMBOL_CAPACITY],
        len: 0,
    };

    fn store(text: &str) -> Option<Self> {
        let bytes = text.as_bytes();
        if bytes.len() > SYMBOL_CAPACITY {
            return None;
        }
        let mut buf = [0; SYMBOL_CAPACITY];
        buf[..bytes.len()].copy_from_slice(bytes);
        Some(Self {
            buf,
            len: bytes.len() as u8,
        })
    }

    fn as_str(&self) -> &str {
        // Always stored from &str, so this cannot fail.
        std::str::from_utf8(&self.buf[..usize::from(self.len)]).unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy)]
struct SymbolEntry {
    dis: SymbolText,
    src: SymbolText,
}

impl SymbolEntry {
    const EMPTY: Self = Self {
        dis: SymbolText::EMPTY,
        src: SymbolText::EMPTY,
    };
}

/// Address -> (disassembly, source reference) table built from a listing
/// description. Populated once at startup, consulted by the execution
/// monitor, and invalidatable at any point between instruction checks.
pub struct ListingResolver {
    entries: Box<[SymbolEntry]>,
    enabled: bool,
}

impl Default for ListingResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ListingResolver {
    pub fn new() -> Self {
        Self {
            entries: vec![SymbolEntry::EMPTY; TABLE_SIZE].into_boxed_slice(),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Parse a listing description and enable the resolver.
    ///
    /// A line carries a record when it starts with a 4-hex-digit address and
    /// contains a `|`-opened record with exactly one further `|` separating
    /// disassembly from source reference; anything else (including hex-dump
    /// lines, which carry extra separators) is skipped. Only addresses inside
    /// the resolver window are retained, and only the final path segment of
    /// the source reference is kept. A trimmed field beyond capacity is a
    /// fatal load error.
    pub fn load<R: BufRead>(&mut self, reader: R) -> Result<()> {
        self.entries.fill(SymbolEntry::EMPTY);
        self.enabled = false;
        for line in reader.lines() {
            let line = line?;
            let Some(addr) = line
                .get(..4)
                .and_then(|digits| u16::from_str_radix(digits, 16).ok())
            else {
                continue;
            };
            if !(WINDOW_START..WINDOW_END).contains(&addr) {
                continue;
            }
            let Some((_, record)) = line.split_once('|') else {
                continue;
            };
            let Some((dis, src)) = record.split_once('|') else {
                continue;
            };
            if src.contains('|') {
                // Two separators inside the record: a hex-dump line.
                continue;
            }
            let dis = dis.trim();
            let src = src
                .rsplit(['/', '\\'])
                .next()
                .unwrap_or(src)
                .trim();
            let entry = &mut self.entries[usize::from(addr - WINDOW_START)];
            entry.dis = SymbolText::store(dis).ok_or(Fault::ListingFieldTooLong {
                addr,
                field: "assembly",
            })?;
            entry.src = SymbolText::store(src).ok_or(Fault::ListingFieldTooLong {
                addr,
                field: "file reference",
            })?;
        }
        self.enabled = true;
        Ok(())
    }

    /// Convenience wrapper around [`load`](Self::load): a missing path or an
    /// unopenable file leaves the resolver disabled and reports the condition
    /// instead of failing. Returns whether the resolver ended up enabled.
    pub fn load_path(&mut self, path: Option<&Path>) -> Result<bool> {
        let Some(path) = path else {
            debug!("symbol resolver not enabled, no list file given");
            return Ok(false);
        };
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) => {
                self.enabled = false;
                warn!(
                    "cannot open {}, no resolved symbols will be used: {err}",
                    path.display()
                );
                return Ok(false);
            }
        };
        self.load(BufReader::new(file))?;
        Ok(true)
    }

    /// Idempotently disable the resolver.
    pub fn invalidate(&mut self, reason: &str) {
        if self.enabled {
            self.enabled = false;
            info!("symbol resolver disabled: {reason}");
        }
    }

    /// Cached (disassembly, source reference) for `addr`; empty strings when
    /// disabled, out of window, or unknown.
    pub fn lookup(&self, addr: u16) -> (&str, &str) {
        if !self.enabled || !(WINDOW_START..WINDOW_END).contains(&addr) {
            return ("", "");
        }
        let entry = &self.entries[usize::from(addr - WINDOW_START)];
        (entry.dis.as_str(), entry.src.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn load_str(resolver: &mut ListingResolver, text: &str) -> Result<()> {
        resolver.load(Cursor::new(text.to_owned()))
    }

    #[test]
    fn listing_line_parses_into_trimmed_fields() {
        let mut resolver = ListingResolver::new();
        load_str(
            &mut resolver,
            "8000 4C 00 80 |LDA #$01        |main.asm\n",
        )
        .unwrap();
        assert!(resolver.is_enabled());
        assert_eq!(resolver.lookup(0x8000), ("LDA #$01", "main.asm"));
    }

    #[test]
    fn source_reference_keeps_only_the_final_path_segment() {
        let mut resolver = ListingResolver::new();
        load_str(
            &mut resolver,
            "9000 A9 00 |LDA #$00|src/boot/main.asm\n\
             9002 8D 00 D6 |STA $D600  | rom\\kernel\\irq.asm \n",
        )
        .unwrap();
        assert_eq!(resolver.lookup(0x9000), ("LDA #$00", "main.asm"));
        assert_eq!(resolver.lookup(0x9002), ("STA $D600", "irq.asm"));
    }

    #[test]
    fn hex_dump_and_separator_free_lines_are_skipped() {
        let mut resolver = ListingResolver::new();
        load_str(
            &mut resolver,
            "8000 4C 00 80 |4C 00 80 EA|EA EA|dump\n\
             8004 plain text without any separator\n\
             not an address |x|y\n",
        )
        .unwrap();
        assert_eq!(resolver.lookup(0x8000), ("", ""));
        assert_eq!(resolver.lookup(0x8004), ("", ""));
    }

    #[test]
    fn addresses_outside_the_window_are_skipped() {
        let mut resolver = ListingResolver::new();
        load_str(
            &mut resolver,
            "7FFF EA |NOP|a.asm\nC000 EA |NOP|b.asm\n8000 EA |NOP|c.asm\n",
        )
        .unwrap();
        assert_eq!(resolver.lookup(0x7FFF), ("", ""));
        assert_eq!(resolver.lookup(0xC000), ("", ""));
        assert_eq!(resolver.lookup(0x8000), ("NOP", "c.asm"));
    }

    #[test]
    fn overlong_field_is_a_fatal_load_error() {
        let mut resolver = ListingResolver::new();
        let long = "X".repeat(SYMBOL_CAPACITY + 1);
        let err = load_str(&mut resolver, &format!("8000 EA |{long}|ok.asm\n"))
            .expect_err("field beyond capacity must fail the load");
        match err {
            crate::CoreError::Fault(Fault::ListingFieldTooLong { addr, field }) => {
                assert_eq!(addr, 0x8000);
                assert_eq!(field, "assembly");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!resolver.is_enabled());
    }

    #[test]
    fn a_field_at_exact_capacity_loads() {
        let mut resolver = ListingResolver::new();
        let exact = "Y".repeat(SYMBOL_CAPACITY);
        load_str(&mut resolver, &format!("8000 EA |{exact}|ok.asm\n")).unwrap();
        assert_eq!(resolver.lookup(0x8000).0, exact);
    }

    #[test]
    fn invalidate_is_idempotent() {
        let mut resolver = ListingResolver::new();
        load_str(&mut resolver, "8000 EA |NOP|a.asm\n").unwrap();
        resolver.invalidate("test teardown");
        assert!(!resolver.is_enabled());
        assert_eq!(resolver.lookup(0x8000), ("", ""), "lookups go dark once disabled");
        resolver.invalidate("again");
        assert!(!resolver.is_enabled());
    }

    #[test]
    fn reload_replaces_the_previous_table() {
        let mut resolver = ListingResolver::new();
        load_str(&mut resolver, "8000 EA |NOP|a.asm\n").unwrap();
        load_str(&mut resolver, "8004 EA |INX|b.asm\n").unwrap();
        assert_eq!(resolver.lookup(0x8000), ("", ""));
        assert_eq!(resolver.lookup(0x8004), ("INX", "b.asm"));
    }

    #[test]
    fn missing_path_reports_and_stays_disabled() {
        let mut resolver = ListingResolver::new();
        assert!(!resolver.load_path(None).unwrap());
        assert!(!resolver.is_enabled());
        let missing = Path::new("/definitely/not/here.list");
        assert!(!resolver.load_path(Some(missing)).unwrap());
        assert!(!resolver.is_enabled());
    }
}
