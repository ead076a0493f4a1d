//! Output formatting for search results

use crate::entry::{Entry, EntryKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::borrow::Cow;
use std::io::{self, Write};
use std::path::Path;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// One result as printed with `--json`
#[derive(Debug, Serialize)]
pub struct EntryRecord<'a> {
    pub path: &'a Path,
    pub name: Cow<'a, str>,
    pub kind: EntryKind,
    pub size: u64,
    pub mode: u32,
    pub modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub indexed: bool,
}

impl<'a> EntryRecord<'a> {
    pub fn new(entry: &'a Entry) -> Self {
        let image = entry.image_size();
        Self {
            path: entry.path(),
            name: entry.name(),
            kind: entry.kind(),
            size: entry.size(),
            mode: entry.attributes().mode(),
            modified: entry.modified(),
            width: image.map(|i| i.width),
            height: image.map(|i| i.height),
            indexed: entry.is_indexed(),
        }
    }
}

/// Writes results as they arrive, either as colored paths or JSON lines
pub struct ResultPrinter<W> {
    out: W,
    json: bool,
    printed: usize,
}

impl ResultPrinter<StandardStream> {
    pub fn stdout(color: bool, json: bool) -> Self {
        let choice = if color && !json {
            ColorChoice::Auto
        } else {
            ColorChoice::Never
        };
        Self::new(StandardStream::stdout(choice), json)
    }
}

impl<W: WriteColor> ResultPrinter<W> {
    pub fn new(out: W, json: bool) -> Self {
        Self {
            out,
            json,
            printed: 0,
        }
    }

    /// Number of entries printed so far
    pub fn printed(&self) -> usize {
        self.printed
    }

    pub fn print_entry(&mut self, entry: &Entry) -> io::Result<()> {
        self.printed += 1;

        if self.json {
            let line = serde_json::to_string(&EntryRecord::new(entry))
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            return writeln!(self.out, "{}", line);
        }

        if entry.is_dir() {
            self.out
                .set_color(ColorSpec::new().set_fg(Some(Color::Blue)).set_bold(true))?;
            write!(self.out, "{}", entry.path().display())?;
            self.out.reset()?;
            writeln!(self.out, "/")
        } else {
            self.out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
            write!(self.out, "{}", entry.path().display())?;
            self.out.reset()?;
            writeln!(self.out)
        }
    }

    /// Note that the results are incomplete
    pub fn print_timeout(&mut self) -> io::Result<()> {
        if self.json {
            return writeln!(self.out, "{{\"timeout\":true}}");
        }
        self.out
            .set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true))?;
        write!(self.out, "-- index timed out, results may be incomplete --")?;
        self.out.reset()?;
        writeln!(self.out)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
