//! Column rendering for the listing commands and the help screen.

use comfy_table::{
    presets::{NOTHING, UTF8_FULL},
    ContentArrangement, Table,
};
use shared::protocol::ContactInfo;

use crate::{registry::CallEntry, AccountRow, ConversationRow};

/// Lays `rows` out as columns. Plain listings are borderless; with a header
/// the rows are drawn as a bordered table.
fn render(header: Option<&[&str]>, rows: Vec<Vec<String>>) -> String {
    let mut table = Table::new();
    match header {
        Some(header) => {
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(header.to_vec());
        }
        None => {
            table.load_preset(NOTHING);
        }
    }
    for row in rows {
        table.add_row(row);
    }
    table.to_string()
}

pub fn accounts(rows: &[AccountRow], table: bool) -> String {
    let body: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            let marker = if row.active { "*" } else { " " };
            vec![
                format!("{}{marker}", row.index),
                row.info.id.to_string(),
                row.info.uri.clone(),
                row.info.alias.clone(),
                row.info.registered_name.clone(),
            ]
        })
        .collect();
    let header: &[&str] = &["index", "accountId", "hash", "alias", "username"];
    render(table.then_some(header), body)
}

pub fn contacts(contacts: &[ContactInfo], table: bool) -> String {
    let body: Vec<Vec<String>> = contacts
        .iter()
        .map(|contact| vec![contact.registered_name.clone(), contact.uri.to_string()])
        .collect();
    let header: &[&str] = &["username", "hash"];
    render(table.then_some(header), body)
}

pub fn conversations(rows: &[ConversationRow], table: bool) -> String {
    let body: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            vec![
                row.uid.to_string(),
                row.peer_uri.clone(),
                row.username.clone(),
                row.alias.clone(),
                row.last_message.clone(),
            ]
        })
        .collect();
    let header: &[&str] = &["uid", "hash", "username", "alias", "lastInteraction"];
    render(table.then_some(header), body)
}

pub fn calls(entries: &[CallEntry], table: bool) -> String {
    let body: Vec<Vec<String>> = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            vec![
                index.to_string(),
                entry.call_id.to_string(),
                entry.peer_display_name.clone(),
            ]
        })
        .collect();
    let header: &[&str] = &["index", "callId", "contact"];
    render(table.then_some(header), body)
}

pub fn help(authenticated: bool) -> String {
    let mut commands = vec![
        ["la", "", "Lists all local accounts."],
        ["lat", "", "Lists all local accounts in a table format."],
        ["na", "", "Create a new local ring account interactively"],
        ["rma", "[index(optional)]", "Remove a local ring account"],
        [
            "log",
            "[index(optional)]",
            "Switch to the indexed account or interactively (if no argument provided)",
        ],
    ];
    if authenticated {
        commands.extend([
            ["vc", "[hash/username]", "Video call someone from its hash."],
            ["c", "[hash/username]", "Audio call someone from its hash."],
            ["lc", "", "Lists all contacts."],
            ["lct", "", "Lists all contacts in a table format."],
            ["lco", "", "Lists all conversations."],
            ["lcot", "", "Lists all conversations in a table format."],
            ["lca", "", "Lists current calls."],
            ["lcat", "", "Lists current calls in a table format."],
            [
                "sms",
                "[conversation uid] [message]",
                "Send a message on the conversation uid.",
            ],
            ["ans", "", "Answer the current incoming call."],
        ]);
    }
    let rows: Vec<Vec<String>> = commands
        .iter()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect();

    let hint = if authenticated {
        ""
    } else {
        " \x1B[31m(switch to an account to see more options)\x1B[0m"
    };
    [
        "\x1B[33mJami command line interface (CLI)\x1B[0m".to_string(),
        "\x1B[36mPossible commands:\x1B[0m".to_string(),
        " h,  help   Print this help message.".to_string(),
        " q,  quit   Quit the program.".to_string(),
        String::new(),
        format!("\x1B[36mJami control{hint}:\x1B[0m"),
        render(None, rows),
    ]
    .join("\n")
}
