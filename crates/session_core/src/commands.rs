//! Operator command parsing and dispatch.

use std::sync::Arc;

use shared::domain::ConversationUid;
use tracing::{debug, warn};

use crate::{listing, CommandError, SessionController, SessionError};

const HELP_HINT: &str = " (type 'h' or 'help' for a list of possible commands)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Unauthenticated,
    Authenticated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    ListAccounts { table: bool },
    NewAccount,
    RemoveAccount { index: Option<String> },
    SelectAccount { index: Option<String> },
    Call { peer: Option<String>, audio_only: bool },
    ListContacts { table: bool },
    ListConversations { table: bool },
    ListCalls { table: bool },
    SendMessage { uid: Option<String>, body: String },
    Answer,
}

impl Command {
    /// Parses one input line. `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim();
        if let Some(("sms", rest)) = line.split_once(char::is_whitespace) {
            return Self::parse_message(rest).map(Some);
        }
        let tokens = shell_words::split(line).map_err(|_| unbalanced_quotes())?;
        let Some(op) = tokens.first() else {
            return Ok(None);
        };
        let arg = |position: usize| tokens.get(position).cloned();

        let command = match op.as_str() {
            "h" | "help" => Self::Help,
            "q" | "quit" | "exit" => Self::Quit,
            "la" => Self::ListAccounts { table: false },
            "lat" => Self::ListAccounts { table: true },
            "na" => Self::NewAccount,
            "rma" => Self::RemoveAccount { index: arg(1) },
            "log" => Self::SelectAccount { index: arg(1) },
            "c" => Self::Call {
                peer: arg(1),
                audio_only: true,
            },
            "vc" => Self::Call {
                peer: arg(1),
                audio_only: false,
            },
            "lc" => Self::ListContacts { table: false },
            "lct" => Self::ListContacts { table: true },
            "lco" => Self::ListConversations { table: false },
            "lcot" => Self::ListConversations { table: true },
            "lca" => Self::ListCalls { table: false },
            "lcat" => Self::ListCalls { table: true },
            "sms" => Self::SendMessage {
                uid: None,
                body: String::new(),
            },
            "ans" => Self::Answer,
            other => return Err(CommandError::UnknownCommand(other.to_string())),
        };
        Ok(Some(command))
    }

    /// `sms <uid> <body>`: the body is taken verbatim unless it opens with a
    /// double quote, in which case it is unquoted.
    fn parse_message(rest: &str) -> Result<Self, CommandError> {
        let rest = rest.trim_start();
        let (uid, body) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let uid = unquote(uid)?;
        let body = body.trim();
        let body = if body.starts_with('"') {
            unquote(body)?
        } else {
            body.to_string()
        };
        Ok(Self::SendMessage {
            uid: (!uid.is_empty()).then_some(uid),
            body,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Quit => "quit",
            Self::ListAccounts { table: false } => "la",
            Self::ListAccounts { table: true } => "lat",
            Self::NewAccount => "na",
            Self::RemoveAccount { .. } => "rma",
            Self::SelectAccount { .. } => "log",
            Self::Call {
                audio_only: true, ..
            } => "c",
            Self::Call {
                audio_only: false, ..
            } => "vc",
            Self::ListContacts { table: false } => "lc",
            Self::ListContacts { table: true } => "lct",
            Self::ListConversations { table: false } => "lco",
            Self::ListConversations { table: true } => "lcot",
            Self::ListCalls { table: false } => "lca",
            Self::ListCalls { table: true } => "lcat",
            Self::SendMessage { .. } => "sms",
            Self::Answer => "ans",
        }
    }

    pub fn requires_account(&self) -> bool {
        matches!(
            self,
            Self::Call { .. }
                | Self::ListContacts { .. }
                | Self::ListConversations { .. }
                | Self::ListCalls { .. }
                | Self::SendMessage { .. }
                | Self::Answer
        )
    }
}

fn unbalanced_quotes() -> CommandError {
    CommandError::Syntax("unbalanced quotes.".to_string())
}

fn unquote(raw: &str) -> Result<String, CommandError> {
    shell_words::split(raw)
        .map(|words| words.join(" "))
        .map_err(|_| unbalanced_quotes())
}

/// Line-oriented operator console used by interactive commands.
pub trait Terminal {
    fn print(&mut self, text: &str);
    /// `None` on end of input.
    fn read_line(&mut self, prompt: &str) -> Option<String>;
}

fn prompt_new_account(terminal: &mut dyn Terminal) -> Option<(String, String, String)> {
    let alias = terminal.read_line("display name: ")?;
    let username = terminal.read_line("username (leave empty for no username): ")?;
    let password = terminal.read_line("password (leave empty for no password): ")?;
    Some((alias, username, password))
}

fn parse_index(raw: &str) -> Option<usize> {
    raw.split_whitespace().next()?.parse().ok()
}

/// Runs operator commands against the controller, one line at a time.
pub struct CommandDispatcher {
    controller: Arc<SessionController>,
    mode: Mode,
}

impl CommandDispatcher {
    pub fn new(controller: Arc<SessionController>) -> Self {
        Self {
            controller,
            mode: Mode::Unauthenticated,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub async fn dispatch(&mut self, line: &str, terminal: &mut dyn Terminal) -> Flow {
        let command = match Command::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Flow::Continue,
            Err(err) => {
                self.report(err, terminal);
                return Flow::Continue;
            }
        };

        if command.requires_account() && self.mode == Mode::Unauthenticated {
            self.report(
                CommandError::RequiresAccount(command.name().to_string()),
                terminal,
            );
            return Flow::Continue;
        }
        if command == Command::Quit {
            return Flow::Exit;
        }

        debug!(command = command.name(), "dispatching command");
        if let Err(err) = self.execute(command, terminal).await {
            self.report(err, terminal);
        }
        Flow::Continue
    }

    fn report(&self, err: CommandError, terminal: &mut dyn Terminal) {
        match &err {
            CommandError::UnknownCommand(_) | CommandError::RequiresAccount(_) => {
                terminal.print(&err.to_string());
                terminal.print(HELP_HINT);
            }
            CommandError::Session(SessionError::NotFound { index, count }) => {
                debug!(index, count, "account index out of range");
                terminal.print("Invalid choice");
            }
            CommandError::Session(session) => {
                warn!(error = %session, "command failed");
                terminal.print(&err.to_string());
            }
            CommandError::Syntax(_) => terminal.print(&err.to_string()),
        }
    }

    async fn execute(
        &mut self,
        command: Command,
        terminal: &mut dyn Terminal,
    ) -> Result<(), CommandError> {
        match command {
            Command::Help => terminal.print(&listing::help(self.mode == Mode::Authenticated)),
            Command::Quit => {}
            Command::ListAccounts { table } => {
                let rows = self.controller.account_rows().await?;
                if rows.is_empty() {
                    terminal.print("No accounts");
                } else {
                    terminal.print(&listing::accounts(&rows, table));
                }
            }
            Command::NewAccount => self.create_account(terminal).await?,
            Command::RemoveAccount { index } => {
                let Some(index) = self.resolve_index(index.as_deref(), terminal).await? else {
                    return Ok(());
                };
                let removed = self.controller.remove_account(index).await?;
                if removed.was_active {
                    terminal.print("Removing current account");
                }
                if self.controller.account_count().await? == 0 {
                    self.mode = Mode::Unauthenticated;
                }
            }
            Command::SelectAccount { index } => {
                let interactive = index.is_none();
                let Some(index) = self.resolve_index(index.as_deref(), terminal).await? else {
                    return Ok(());
                };
                let display = self.controller.select_account(index).await?;
                self.mode = Mode::Authenticated;
                if interactive {
                    terminal.print(&format!("Logged to {display}"));
                } else {
                    terminal.print(&format!("Switched to account {display}"));
                }
            }
            Command::Call { peer, audio_only } => {
                let peer = peer
                    .filter(|peer| !peer.is_empty())
                    .ok_or_else(|| CommandError::Syntax("invalid hash/username.".to_string()))?;
                if audio_only {
                    terminal.print(&format!("Calling {peer}"));
                } else {
                    terminal.print(&format!("Video calling {peer}"));
                }
                self.controller.place_call(&peer, audio_only).await?;
            }
            Command::ListContacts { table } => {
                let contacts = self.controller.contacts().await?;
                if contacts.is_empty() {
                    terminal.print("no contacts");
                } else {
                    terminal.print(&listing::contacts(&contacts, table));
                }
            }
            Command::ListConversations { table } => {
                let rows = self.controller.conversations().await?;
                if rows.is_empty() {
                    terminal.print("No conversations");
                } else {
                    terminal.print(&listing::conversations(&rows, table));
                }
            }
            Command::ListCalls { table } => {
                if self.controller.current().await.is_none() {
                    return Err(SessionError::NoActiveAccount.into());
                }
                let calls = self.controller.calls().await;
                if calls.is_empty() {
                    terminal.print("No current calls");
                } else {
                    terminal.print(&listing::calls(&calls, table));
                }
            }
            Command::SendMessage { uid, body } => {
                let uid = uid
                    .filter(|uid| !uid.is_empty())
                    .ok_or_else(|| CommandError::Syntax("invalid conversation uid.".to_string()))?;
                if body.is_empty() {
                    return Err(CommandError::Syntax("no message specified.".to_string()));
                }
                let uid = ConversationUid::new(uid);
                if self.controller.send_message(&uid, &body).await? {
                    terminal.print(&format!("Sending message to conversation {uid}"));
                } else {
                    terminal.print("No such conversation");
                }
            }
            Command::Answer => {
                self.controller.accept_incoming().await?;
            }
        }
        Ok(())
    }

    /// Uses the typed index, or asks for one when none was given.
    ///
    /// `Ok(None)` means the command was abandoned and already reported.
    async fn resolve_index(
        &self,
        raw: Option<&str>,
        terminal: &mut dyn Terminal,
    ) -> Result<Option<usize>, CommandError> {
        match raw {
            Some(raw) => match parse_index(raw) {
                Some(index) => Ok(Some(index)),
                None => {
                    terminal.print("Invalid choice");
                    Ok(None)
                }
            },
            None => self.choose_account(terminal).await,
        }
    }

    async fn choose_account(
        &self,
        terminal: &mut dyn Terminal,
    ) -> Result<Option<usize>, CommandError> {
        loop {
            let rows = self.controller.account_rows().await?;
            if rows.is_empty() {
                terminal.print("No accounts");
                return Ok(None);
            }

            terminal.print("Choose the account to connect to ");
            terminal.print(&listing::accounts(&rows, false));
            let Some(line) = terminal.read_line(&format!("[0-{}]: ", rows.len() - 1)) else {
                return Ok(None);
            };
            match parse_index(&line) {
                Some(index) if index < rows.len() => return Ok(Some(index)),
                _ => terminal.print("Invalid choice"),
            }
        }
    }

    async fn create_account(&self, terminal: &mut dyn Terminal) -> Result<(), CommandError> {
        let Some((alias, username, password)) = prompt_new_account(terminal) else {
            terminal.print("Account creation cancelled");
            return Ok(());
        };
        let (alias, username) = (alias.trim().to_string(), username.trim().to_string());
        terminal.print(&format!(
            "Create user: \"alias: {alias} \" \"username: {username}\""
        ));

        let confirmed = loop {
            let Some(line) = terminal.read_line("(y/n)? ") else {
                break false;
            };
            match line.split_whitespace().next() {
                Some("y") => break true,
                Some("n") => break false,
                _ => continue,
            }
        };
        if !confirmed {
            terminal.print("Account creation cancelled");
            return Ok(());
        }

        self.controller
            .create_account(&alias, &username, &password)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
