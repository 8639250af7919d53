//! Interactive operator console.
//!
//! Lines are split on whitespace and the first token is matched against the
//! command table by exact name. A command runs only when the remaining token
//! count equals its argument count; otherwise its usage is printed. Anything
//! unmatched runs the first table entry (`help`).

use anyhow::{bail, Result};
use log::LevelFilter;
use std::collections::HashSet;
use std::io::{BufRead, Write};

use crate::logging;
use crate::pipeline::Pipeline;

pub const PROMPT: &str = "framewatch$ ";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Help,
    StartIngestion,
    StopIngestion,
    /// Level taken from the command's single argument.
    SetLogLevel,
    LogLevel(LevelFilter),
    Status,
}

#[derive(Clone, Debug)]
pub struct Command {
    pub name: &'static str,
    pub args: &'static [&'static str],
    pub description: &'static str,
    pub action: Action,
}

impl Command {
    pub const fn new(
        name: &'static str,
        args: &'static [&'static str],
        description: &'static str,
        action: Action,
    ) -> Self {
        Self {
            name,
            args,
            description,
            action,
        }
    }

    pub fn usage(&self) -> String {
        let mut usage = format!("Usage: {}", self.name);
        for arg in self.args {
            usage.push_str(&format!(" <{}>", arg));
        }
        usage
    }
}

/// Ordered command table. Names are unique; the first entry is the fallback.
#[derive(Clone, Debug)]
pub struct CommandTable {
    commands: Vec<Command>,
}

impl CommandTable {
    pub fn new(commands: Vec<Command>) -> Result<Self> {
        if commands.is_empty() {
            bail!("command table must not be empty");
        }
        let mut seen = HashSet::new();
        for command in &commands {
            if command.name.is_empty() || command.name.contains(char::is_whitespace) {
                bail!("invalid command name '{}'", command.name);
            }
            if !seen.insert(command.name) {
                bail!("duplicate command name '{}'", command.name);
            }
        }
        Ok(Self { commands })
    }

    /// The built-in operator commands, `help` first.
    pub fn standard() -> Result<Self> {
        Self::new(standard_commands())
    }

    pub fn lookup(&self, name: &str) -> Option<&Command> {
        self.commands.iter().find(|command| command.name == name)
    }

    pub fn fallback(&self) -> &Command {
        &self.commands[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }
}

fn standard_commands() -> Vec<Command> {
    vec![
        Command::new("help", &[], "list the available commands", Action::Help),
        Command::new(
            "frames.start",
            &[],
            "start fetching and processing frames",
            Action::StartIngestion,
        ),
        Command::new(
            "frames.stop",
            &[],
            "stop fetching frames; queued work still drains",
            Action::StopIngestion,
        ),
        Command::new(
            "log.level",
            &["level"],
            "set verbosity (off, error, warn, info, debug, trace)",
            Action::SetLogLevel,
        ),
        Command::new(
            "log.error",
            &[],
            "only log errors",
            Action::LogLevel(LevelFilter::Error),
        ),
        Command::new(
            "log.info",
            &[],
            "log informational messages",
            Action::LogLevel(LevelFilter::Info),
        ),
        Command::new(
            "log.debug",
            &[],
            "log debugging messages",
            Action::LogLevel(LevelFilter::Debug),
        ),
        Command::new(
            "status",
            &[],
            "show pipeline counters and queue depths",
            Action::Status,
        ),
    ]
}

/// What a single input line turned into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Blank,
    Executed(Action),
    /// Known command, wrong number of arguments.
    Usage(&'static str),
    /// Unknown command; the fallback ran.
    Fallback,
}

pub struct Console {
    pipeline: Pipeline,
    commands: CommandTable,
}

impl Console {
    pub fn new(pipeline: Pipeline) -> Result<Self> {
        Ok(Self::with_commands(pipeline, CommandTable::standard()?))
    }

    pub fn with_commands(pipeline: Pipeline, commands: CommandTable) -> Self {
        Self { pipeline, commands }
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    /// Read commands until end of input.
    pub fn run<R: BufRead, W: Write>(&self, mut input: R, mut out: W) -> Result<()> {
        let mut line = String::new();
        loop {
            write!(out, "{}", PROMPT)?;
            out.flush()?;
            line.clear();
            if input.read_line(&mut line)? == 0 {
                writeln!(out)?;
                break;
            }
            self.handle_line(&line, &mut out)?;
        }
        Ok(())
    }

    pub fn handle_line<W: Write>(&self, line: &str, out: &mut W) -> Result<Dispatch> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((name, args)) = tokens.split_first() else {
            return Ok(Dispatch::Blank);
        };
        match self.commands.lookup(name) {
            Some(command) if command.args.len() == args.len() => {
                self.execute(command.action, args, out)?;
                Ok(Dispatch::Executed(command.action))
            }
            Some(command) => {
                writeln!(out, "{}", command.usage())?;
                Ok(Dispatch::Usage(command.name))
            }
            None => {
                log::debug!("unknown command '{}'", name);
                let fallback = self.commands.fallback();
                self.execute(fallback.action, &[], out)?;
                Ok(Dispatch::Fallback)
            }
        }
    }

    fn execute<W: Write>(&self, action: Action, args: &[&str], out: &mut W) -> Result<()> {
        match action {
            Action::Help => self.print_help(out)?,
            Action::StartIngestion => match self.pipeline.start_ingestion() {
                Ok(true) => writeln!(out, "fetching frames")?,
                Ok(false) => {
                    log::warn!("frames.start ignored: frames are already being fetched");
                    writeln!(out, "frames are already being fetched")?;
                }
                Err(e) => writeln!(out, "error: {:#}", e)?,
            },
            Action::StopIngestion => {
                if self.pipeline.stop_ingestion() {
                    writeln!(out, "stopping frame fetching")?;
                } else {
                    log::warn!("frames.stop ignored: frames are not being fetched");
                    writeln!(out, "frames are not being fetched")?;
                }
            }
            Action::SetLogLevel => {
                let requested = args.first().copied().unwrap_or_default();
                match logging::parse_level(requested) {
                    Ok(level) => {
                        logging::set_level(level);
                        writeln!(out, "log level set to {}", level)?;
                    }
                    Err(e) => writeln!(out, "error: {:#}", e)?,
                }
            }
            Action::LogLevel(level) => {
                logging::set_level(level);
                writeln!(out, "log level set to {}", level)?;
            }
            Action::Status => self.print_status(out)?,
        }
        Ok(())
    }

    fn print_help<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "Commands:")?;
        for command in self.commands.iter() {
            let args = command
                .args
                .iter()
                .map(|arg| format!("<{}>", arg))
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(
                out,
                "  {:<20} {:<12} - {}",
                command.name, args, command.description
            )?;
        }
        Ok(())
    }

    fn print_status<W: Write>(&self, out: &mut W) -> Result<()> {
        let status = self.pipeline.status();
        writeln!(out, "ingesting:        {}", status.state.ingesting)?;
        writeln!(out, "active workers:   {}", status.state.active_workers)?;
        writeln!(out, "frames processed: {}", status.state.processed_count)?;
        writeln!(
            out,
            "avg latency:      {:.1} ms",
            status.state.average_latency_ms
        )?;
        writeln!(
            out,
            "queued:           {} frames, {} results, {} intermediate",
            status.ingest_queued, status.results_queued, status.intermediate_queued
        )?;
        writeln!(
            out,
            "stages running:   {} (task workers: {})",
            status.stages_running, status.task_workers
        )?;
        writeln!(out, "log level:        {}", logging::current_level())?;
        Ok(())
    }
}
