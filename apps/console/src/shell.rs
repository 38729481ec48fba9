//! Blocking read loop and the single writer for asynchronous notifications.

use std::{
    io::{self, Write},
    thread,
};

use rustyline::{error::ReadlineError, DefaultEditor, ExternalPrinter};
use session_core::{CommandDispatcher, Flow, Terminal};
use tokio::{runtime::Handle, sync::mpsc};
use tracing::{debug, warn};

pub struct ConsoleTerminal {
    editor: DefaultEditor,
}

impl ConsoleTerminal {
    pub fn new(editor: DefaultEditor) -> Self {
        Self { editor }
    }
}

impl Terminal for ConsoleTerminal {
    fn print(&mut self, text: &str) {
        println!("{text}");
    }

    fn read_line(&mut self, prompt: &str) -> Option<String> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                Some(line)
            }
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => None,
            Err(err) => {
                warn!(error = %err, "failed to read operator input");
                None
            }
        }
    }
}

/// Where notifications end up. The external printer redraws the prompt and
/// any half-typed line after each message.
pub enum NotificationSink {
    External(Box<dyn ExternalPrinter + Send>),
    Plain { prompt: String },
}

impl NotificationSink {
    fn print(&mut self, message: String) {
        match self {
            Self::External(printer) => {
                if let Err(err) = printer.print(message) {
                    debug!(error = %err, "external printer rejected notification");
                }
            }
            Self::Plain { prompt } => {
                let mut stdout = io::stdout().lock();
                let _ = write!(stdout, "\n{message}\n{prompt}");
                let _ = stdout.flush();
            }
        }
    }
}

/// Drains notifications on a dedicated thread until every sender is gone.
pub fn spawn_printer(
    mut notifications: mpsc::UnboundedReceiver<String>,
    mut sink: NotificationSink,
) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("console-printer".into())
        .spawn(move || {
            while let Some(message) = notifications.blocking_recv() {
                sink.print(message);
            }
        })
}

/// Reads and dispatches commands until `quit` or end of input.
///
/// Runs on a blocking thread; each command is driven to completion on the
/// runtime before the next line is read.
pub fn run(
    mut terminal: ConsoleTerminal,
    mut dispatcher: CommandDispatcher,
    runtime: Handle,
    prompt: &str,
) {
    terminal.print("(type 'h' or 'help' for a list of possible commands)");
    while let Some(line) = terminal.read_line(prompt) {
        if runtime.block_on(dispatcher.dispatch(&line, &mut terminal)) == Flow::Exit {
            break;
        }
    }
}
