use std::collections::VecDeque;

use engine_integration::{Engine, LoopbackEngine};
use shared::{
    domain::{ContactUri, ConversationUid},
    protocol::{ContactInfo, ConversationInfo},
};

use super::*;
use crate::{notifications::ChannelNotifier, ControllerOptions};

#[derive(Default)]
struct ScriptedTerminal {
    input: VecDeque<String>,
    prompts: Vec<String>,
    output: Vec<String>,
}

impl ScriptedTerminal {
    fn with_input(lines: &[&str]) -> Self {
        Self {
            input: lines.iter().map(|line| line.to_string()).collect(),
            ..Self::default()
        }
    }

    fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }
}

impl Terminal for ScriptedTerminal {
    fn print(&mut self, text: &str) {
        self.output.push(text.to_string());
    }

    fn read_line(&mut self, prompt: &str) -> Option<String> {
        self.prompts.push(prompt.to_string());
        self.input.pop_front()
    }
}

async fn dispatcher() -> (Arc<LoopbackEngine>, CommandDispatcher) {
    let engine = Arc::new(LoopbackEngine::new());
    let (notifier, _rx) = ChannelNotifier::new();
    let controller = SessionController::new(
        engine.clone(),
        Arc::new(notifier),
        ControllerOptions::default(),
    );
    (engine, CommandDispatcher::new(controller))
}

#[test]
fn parses_quoted_message_and_aliases() {
    assert_eq!(
        Command::parse("sms conv-1 \"hello there\"").expect("parse"),
        Some(Command::SendMessage {
            uid: Some("conv-1".into()),
            body: "hello there".into(),
        })
    );
    assert_eq!(
        Command::parse("sms conv-1 hello there").expect("parse"),
        Some(Command::SendMessage {
            uid: Some("conv-1".into()),
            body: "hello there".into(),
        })
    );
    assert_eq!(Command::parse("exit").expect("parse"), Some(Command::Quit));
    assert_eq!(Command::parse("   ").expect("parse"), None);
    assert!(matches!(
        Command::parse("frobnicate"),
        Err(CommandError::UnknownCommand(op)) if op == "frobnicate"
    ));
    assert!(matches!(
        Command::parse("sms \"unterminated"),
        Err(CommandError::Syntax(_))
    ));
}

#[test]
fn unquoted_message_body_keeps_apostrophes() {
    assert_eq!(
        Command::parse("sms conv-1 can't make it").expect("parse"),
        Some(Command::SendMessage {
            uid: Some("conv-1".into()),
            body: "can't make it".into(),
        })
    );
    assert_eq!(
        Command::parse("sms conv-1   it's   spaced  ").expect("parse"),
        Some(Command::SendMessage {
            uid: Some("conv-1".into()),
            body: "it's   spaced".into(),
        })
    );
}

#[test]
fn quoted_message_body_keeps_embedded_spaces() {
    assert_eq!(
        Command::parse("sms conv-1 \"see  you at  noon\"").expect("parse"),
        Some(Command::SendMessage {
            uid: Some("conv-1".into()),
            body: "see  you at  noon".into(),
        })
    );
    assert_eq!(
        Command::parse("sms conv-1 \"can't wait\"").expect("parse"),
        Some(Command::SendMessage {
            uid: Some("conv-1".into()),
            body: "can't wait".into(),
        })
    );
    assert!(matches!(
        Command::parse("sms conv-1 \"still open"),
        Err(CommandError::Syntax(_))
    ));
}

#[tokio::test]
async fn sms_with_apostrophe_reaches_the_conversation() {
    let (engine, mut dispatcher) = dispatcher().await;
    let a = engine.seed_account("A", "alice").await;
    let conversations = engine.conversation_model(&a).await.expect("conversations");
    conversations
        .add_conversation(ConversationInfo {
            uid: ConversationUid::new("conv-1"),
            participants: vec![ContactUri::new("bobhash")],
            last_interaction: None,
        })
        .await;
    let mut terminal = ScriptedTerminal::default();
    dispatcher.dispatch("log 0", &mut terminal).await;
    terminal.take_output();

    dispatcher
        .dispatch("sms conv-1 can't make it", &mut terminal)
        .await;
    assert_eq!(
        terminal.take_output(),
        vec!["Sending message to conversation conv-1".to_string()]
    );
    assert_eq!(
        conversations.sent_messages().await,
        vec![(ConversationUid::new("conv-1"), "can't make it".to_string())]
    );
}

#[test]
fn only_account_management_is_open_without_login() {
    for line in ["la", "lat", "na", "rma 0", "log", "h"] {
        let command = Command::parse(line).expect("parse").expect("command");
        assert!(!command.requires_account(), "{line} should be open");
    }
    for line in ["c bob", "vc bob", "lc", "lct", "lco", "lcot", "lca", "sms x y", "ans"] {
        let command = Command::parse(line).expect("parse").expect("command");
        assert!(command.requires_account(), "{line} should need an account");
    }
}

#[tokio::test]
async fn call_commands_require_login() {
    let (_engine, mut dispatcher) = dispatcher().await;
    let mut terminal = ScriptedTerminal::default();

    assert_eq!(dispatcher.dispatch("c bob", &mut terminal).await, Flow::Continue);
    let output = terminal.take_output();
    assert_eq!(
        output[0],
        "Command 'c' requires an active account (switch to an account with 'log')"
    );
    assert_eq!(output[1], HELP_HINT);
}

#[tokio::test]
async fn unknown_command_prints_hint() {
    let (_engine, mut dispatcher) = dispatcher().await;
    let mut terminal = ScriptedTerminal::default();

    dispatcher.dispatch("dance", &mut terminal).await;
    assert_eq!(
        terminal.take_output(),
        vec!["Unknown command: dance".to_string(), HELP_HINT.to_string()]
    );
}

#[tokio::test]
async fn quit_ends_the_loop() {
    let (_engine, mut dispatcher) = dispatcher().await;
    let mut terminal = ScriptedTerminal::default();
    assert_eq!(dispatcher.dispatch("q", &mut terminal).await, Flow::Exit);
    assert_eq!(dispatcher.dispatch("quit", &mut terminal).await, Flow::Exit);
}

#[tokio::test]
async fn log_with_index_switches_account_and_mode() {
    let (engine, mut dispatcher) = dispatcher().await;
    engine.seed_account("A", "alice").await;
    engine.seed_account("B", "bert").await;
    let mut terminal = ScriptedTerminal::default();

    dispatcher.dispatch("log 7", &mut terminal).await;
    assert_eq!(terminal.take_output(), vec!["Invalid choice".to_string()]);
    assert_eq!(dispatcher.mode(), Mode::Unauthenticated);

    dispatcher.dispatch("log 1", &mut terminal).await;
    assert_eq!(
        terminal.take_output(),
        vec!["Switched to account bert".to_string()]
    );
    assert_eq!(dispatcher.mode(), Mode::Authenticated);
}

#[tokio::test]
async fn log_without_index_prompts_until_valid_choice() {
    let (engine, mut dispatcher) = dispatcher().await;
    engine.seed_account("A", "alice").await;
    engine.seed_account("B", "bert").await;
    let mut terminal = ScriptedTerminal::with_input(&["nope", "5", "0"]);

    dispatcher.dispatch("log", &mut terminal).await;
    assert_eq!(terminal.prompts, vec!["[0-1]: "; 3]);
    let output = terminal.take_output();
    assert_eq!(
        output.iter().filter(|line| *line == "Invalid choice").count(),
        2
    );
    assert_eq!(output.last().map(String::as_str), Some("Logged to alice"));
    assert_eq!(dispatcher.mode(), Mode::Authenticated);
}

#[tokio::test]
async fn interactive_choice_aborts_on_end_of_input() {
    let (engine, mut dispatcher) = dispatcher().await;
    engine.seed_account("A", "alice").await;
    let mut terminal = ScriptedTerminal::default();

    dispatcher.dispatch("log", &mut terminal).await;
    assert_eq!(dispatcher.mode(), Mode::Unauthenticated);
    assert!(!terminal
        .take_output()
        .iter()
        .any(|line| line.starts_with("Logged to")));
}

#[tokio::test]
async fn listing_without_accounts_says_so() {
    let (_engine, mut dispatcher) = dispatcher().await;
    let mut terminal = ScriptedTerminal::default();

    dispatcher.dispatch("la", &mut terminal).await;
    dispatcher.dispatch("log", &mut terminal).await;
    assert_eq!(
        terminal.take_output(),
        vec!["No accounts".to_string(), "No accounts".to_string()]
    );
}

#[tokio::test]
async fn removing_the_last_account_logs_out() {
    let (engine, mut dispatcher) = dispatcher().await;
    engine.seed_account("A", "alice").await;
    let mut terminal = ScriptedTerminal::default();

    dispatcher.dispatch("log 0", &mut terminal).await;
    terminal.take_output();
    dispatcher.dispatch("rma 0", &mut terminal).await;

    assert_eq!(
        terminal.take_output(),
        vec!["Removing current account".to_string()]
    );
    assert_eq!(dispatcher.mode(), Mode::Unauthenticated);
    assert!(engine.list_accounts().await.expect("list").is_empty());
}

#[tokio::test]
async fn call_and_message_syntax_errors() {
    let (engine, mut dispatcher) = dispatcher().await;
    engine.seed_account("A", "alice").await;
    let mut terminal = ScriptedTerminal::default();
    dispatcher.dispatch("log 0", &mut terminal).await;
    terminal.take_output();

    dispatcher.dispatch("c", &mut terminal).await;
    dispatcher.dispatch("sms", &mut terminal).await;
    dispatcher.dispatch("sms conv-1", &mut terminal).await;
    assert_eq!(
        terminal.take_output(),
        vec![
            "Syntax error: invalid hash/username.".to_string(),
            "Syntax error: invalid conversation uid.".to_string(),
            "Syntax error: no message specified.".to_string(),
        ]
    );
}

#[tokio::test]
async fn sms_reports_unknown_and_known_conversations() {
    let (engine, mut dispatcher) = dispatcher().await;
    let a = engine.seed_account("A", "alice").await;
    let conversations = engine.conversation_model(&a).await.expect("conversations");
    conversations
        .add_conversation(ConversationInfo {
            uid: ConversationUid::new("conv-1"),
            participants: vec![ContactUri::new("bobhash")],
            last_interaction: None,
        })
        .await;
    let mut terminal = ScriptedTerminal::default();
    dispatcher.dispatch("log 0", &mut terminal).await;
    terminal.take_output();

    dispatcher.dispatch("sms ghost \"hi\"", &mut terminal).await;
    dispatcher
        .dispatch("sms conv-1 \"hi bob\"", &mut terminal)
        .await;
    assert_eq!(
        terminal.take_output(),
        vec![
            "No such conversation".to_string(),
            "Sending message to conversation conv-1".to_string(),
        ]
    );
    assert_eq!(
        conversations.sent_messages().await,
        vec![(ConversationUid::new("conv-1"), "hi bob".to_string())]
    );
}

#[tokio::test]
async fn calling_prints_and_dials() {
    let (engine, mut dispatcher) = dispatcher().await;
    let a = engine.seed_account("A", "alice").await;
    let calls = engine.call_model(&a).await.expect("calls");
    let mut terminal = ScriptedTerminal::default();
    dispatcher.dispatch("log 0", &mut terminal).await;
    terminal.take_output();

    dispatcher.dispatch("c bob", &mut terminal).await;
    dispatcher.dispatch("vc carol", &mut terminal).await;
    assert_eq!(
        terminal.take_output(),
        vec!["Calling bob".to_string(), "Video calling carol".to_string()]
    );
    assert_eq!(
        calls.dialed().await,
        vec![
            (ContactUri::new("ring:bob"), true),
            (ContactUri::new("ring:carol"), false),
        ]
    );

    dispatcher.dispatch("lca", &mut terminal).await;
    let listing = terminal.take_output().join("\n");
    assert!(listing.contains("bob"));
    assert!(listing.contains("carol"));
}

#[tokio::test]
async fn empty_listings_after_login() {
    let (engine, mut dispatcher) = dispatcher().await;
    let a = engine.seed_account("A", "alice").await;
    let mut terminal = ScriptedTerminal::default();
    dispatcher.dispatch("log 0", &mut terminal).await;
    terminal.take_output();

    dispatcher.dispatch("lc", &mut terminal).await;
    dispatcher.dispatch("lco", &mut terminal).await;
    dispatcher.dispatch("lca", &mut terminal).await;
    dispatcher.dispatch("ans", &mut terminal).await;
    assert_eq!(
        terminal.take_output(),
        vec![
            "no contacts".to_string(),
            "No conversations".to_string(),
            "No current calls".to_string(),
        ]
    );

    engine
        .contact_model(&a)
        .await
        .expect("contacts")
        .add_contact(ContactInfo {
            uri: ContactUri::new("bobhash"),
            alias: "Bob".into(),
            registered_name: "bob".into(),
        })
        .await;
    dispatcher.dispatch("lct", &mut terminal).await;
    let table = terminal.take_output().join("\n");
    let header = table
        .lines()
        .position(|line| line.contains("username") && line.contains("hash"))
        .expect("header row");
    let body = table
        .lines()
        .position(|line| line.contains("bob ") && line.contains("bobhash"))
        .expect("contact row");
    assert!(header < body);
}

#[tokio::test]
async fn new_account_flow_confirms_before_creating() {
    let (engine, mut dispatcher) = dispatcher().await;

    let mut terminal = ScriptedTerminal::with_input(&["Carol", "", "", "maybe", "n"]);
    dispatcher.dispatch("na", &mut terminal).await;
    assert_eq!(
        terminal.prompts,
        vec![
            "display name: ",
            "username (leave empty for no username): ",
            "password (leave empty for no password): ",
            "(y/n)? ",
            "(y/n)? ",
        ]
    );
    assert_eq!(
        terminal.take_output(),
        vec![
            "Create user: \"alias: Carol \" \"username: \"".to_string(),
            "Account creation cancelled".to_string(),
        ]
    );
    assert!(engine.list_accounts().await.expect("list").is_empty());

    let mut terminal = ScriptedTerminal::with_input(&["Carol", "", "", "y"]);
    dispatcher.dispatch("na", &mut terminal).await;
    let accounts = engine.list_accounts().await.expect("list");
    assert_eq!(accounts.len(), 1);
    let info = engine.account_info(&accounts[0]).await.expect("info");
    assert_eq!(info.alias, "Carol");
}
