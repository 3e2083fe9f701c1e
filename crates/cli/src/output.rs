//! Terminal rendering for chats, transcripts and errors.

use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use console::style;
use siteai_client::{ErrorAnnouncer, ErrorState, Navigator};
use siteai_protocol::{ChatDetail, ChatSummary, Message, MessageRole};

pub fn chat_table(chats: &[ChatSummary]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["ID", "Name", "Created", ""]);
    for chat in chats {
        table.add_row(vec![
            chat.id.clone(),
            chat.name.clone(),
            chat.created_at.format("%Y-%m-%d %H:%M").to_string(),
            (if chat.is_processing { "working" } else { "" }).to_string(),
        ]);
    }
    table
}

pub fn print_chats(chats: &[ChatSummary]) {
    if chats.is_empty() {
        println!("  No chats yet. Start one with: siteai create --prompt \"...\"");
        return;
    }
    println!("{}", chat_table(chats));
}

pub fn print_message(message: &Message) {
    let who = match message.role {
        MessageRole::User => style("you").cyan().bold(),
        MessageRole::Assistant => style("ai").magenta().bold(),
    };
    println!("{who}  {}", message.content);
}

pub fn print_chat(chat: &ChatDetail) {
    println!();
    println!(
        "  {} {}",
        style(&chat.name).bold(),
        style(format!("({})", chat.id)).dim()
    );
    println!();
    for message in &chat.messages {
        print_message(message);
    }
    print_code(chat);
}

pub fn print_code(chat: &ChatDetail) {
    for (label, body) in [
        ("html", &chat.code.html),
        ("css", &chat.code.css),
        ("js", &chat.code.js),
    ] {
        if body.is_empty() {
            continue;
        }
        println!();
        println!("{}", style(format!("--- {label} ---")).dim());
        println!("{body}");
    }
}

fn print_error(state: &ErrorState) {
    eprintln!("{} {}", style("error:").red().bold(), state.message());
}

/// Print each store error that has not been shown yet.
#[derive(Default)]
pub struct ErrorReporter {
    directory: ErrorAnnouncer,
    session: ErrorAnnouncer,
    tokens: ErrorAnnouncer,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if anything was printed.
    pub fn report(&mut self, nav: &Navigator) -> bool {
        let directory = nav.directory().error();
        let session = nav.session().error();
        let tokens = nav.tokens().error();
        let shown = [
            self.directory.take_new(directory.as_ref()),
            self.session.take_new(session.as_ref()),
            self.tokens.take_new(tokens.as_ref()),
        ];
        let mut any = false;
        for state in shown.into_iter().flatten() {
            print_error(state);
            any = true;
        }
        any
    }
}
