//! Command handling shared by the chat bots.
//!
//! A message addressed to the bot (`@bot <command> <argument>`) is parsed
//! into a [`Command`], executed against [`RunOperations`] and answered with a
//! transport-neutral [`Reply`] that each bot renders in its own markup.

pub mod matrix;
pub mod slack;

use tracing::{debug, warn};

use crate::model::Run;
use crate::operations::RunOperations;

/// Help text listing the supported commands.
pub const HELP_TEXT: &str = "
create <repoURL> - Create an OrtRun resource with repoURL
list - List all OrtRun resources
show <name> - Show the nitty gritty of an OrtRun";

/// Column headers of the run table.
pub const RUN_TABLE_HEADERS: [&str; 6] = [
    "Name",
    "Scanned Repository",
    "Analyzer Status",
    "Scanner Status",
    "Reporter Status",
    "Report URL",
];

/// A parsed chat command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Help,
    Create(&'a str),
    List,
    Show(&'a str),
    Unknown(&'a str),
}

impl<'a> Command<'a> {
    /// Parse the text following the bot's handle.
    ///
    /// A bare mention with no command parses as [`Command::Help`] rather than
    /// as an unknown empty command.
    #[must_use]
    pub fn parse(body: &'a str) -> Self {
        let body = body.trim();
        let (command, argument) = body
            .split_once(char::is_whitespace)
            .map_or((body, ""), |(c, a)| (c, a.trim()));

        match command {
            "" | "help" => Self::Help,
            "create" => Self::Create(argument),
            "list" => Self::List,
            "show" => Self::Show(argument),
            other => Self::Unknown(other),
        }
    }
}

/// Answer to a chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Plain text, sent as-is.
    Text(String),
    /// Runs to be rendered as a table.
    Runs(Vec<Run>),
}

/// Strip the bot's handle from the start of `message`.
///
/// The match ignores ASCII case and accepts a `:` or `,` right after the
/// handle. Returns `None` when the message is not addressed to the bot.
#[must_use]
pub fn strip_handle<'a>(message: &'a str, handle: &str) -> Option<&'a str> {
    if handle.is_empty() {
        return None;
    }

    let message = message.trim_start();
    let prefix = message.get(..handle.len())?;
    if !prefix.eq_ignore_ascii_case(handle) {
        return None;
    }

    let rest = &message[handle.len()..];
    let rest = rest
        .strip_prefix(':')
        .or_else(|| rest.strip_prefix(','))
        .unwrap_or(rest);

    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest)
    } else {
        None
    }
}

/// Handle one chat message. `None` means the message was not for the bot.
pub async fn dispatch(ops: &RunOperations, handle: &str, message: &str) -> Option<Reply> {
    let body = strip_handle(message, handle)?;
    let command = Command::parse(body);
    debug!(?command, "Dispatching chat command");
    Some(execute(ops, command).await)
}

/// Execute a parsed command. Operation errors become text replies.
pub async fn execute(ops: &RunOperations, command: Command<'_>) -> Reply {
    let result = match command {
        Command::Help => return Reply::Text(HELP_TEXT.to_string()),
        Command::Unknown(token) => {
            return Reply::Text(format!(
                "unknown command '{token}'. Use 'help' to list all available commands"
            ))
        }
        Command::Create("") => return Reply::Text("usage: create <repoURL>".to_string()),
        Command::Show("") => return Reply::Text("usage: show <name>".to_string()),
        Command::Create(repo_url) => ops.create_run(repo_url).await.map(|r| dump_reply(&r)),
        Command::Show(name) => ops.get_run(name).await.map(|r| dump_reply(&r)),
        Command::List => ops.list_runs().await.map(Reply::Runs),
    };

    result.unwrap_or_else(|e| {
        warn!(error = %e, "Chat command failed");
        Reply::Text(e.to_string())
    })
}

fn dump_reply(run: &Run) -> Reply {
    Reply::Text(render_run_dump(run))
}

/// YAML dump of a run: its backing resource when known, else the run itself.
#[must_use]
pub fn render_run_dump(run: &Run) -> String {
    if let Some(raw) = &run.raw_resource {
        return raw.clone();
    }
    serde_yaml::to_string(run).unwrap_or_else(|e| e.to_string())
}

/// Link to the published report of a run.
#[must_use]
pub fn report_url(base_url: &str, run_name: &str) -> String {
    format!("{}/{run_name}", base_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedNames, InMemoryPods, InMemoryRunStore};
    use std::sync::Arc;

    fn operations(store: &Arc<InMemoryRunStore>) -> RunOperations {
        RunOperations::new(
            store.clone(),
            Arc::new(InMemoryPods::default()),
            Arc::new(FixedNames::new(&["brave-turing"])),
        )
    }

    #[test]
    fn test_strip_handle() {
        assert_eq!(strip_handle("@bot list", "@bot"), Some(" list"));
        assert_eq!(strip_handle("  @BOT list", "@bot"), Some(" list"));
        assert_eq!(strip_handle("@bot: list", "@bot"), Some(" list"));
        assert_eq!(strip_handle("@bot", "@bot"), Some(""));
        assert_eq!(strip_handle("@bottle list", "@bot"), None);
        assert_eq!(strip_handle("hey @bot list", "@bot"), None);
        assert_eq!(strip_handle("@bo", "@bot"), None);
        assert_eq!(strip_handle("list", ""), None);
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse(" help me"), Command::Help);
        assert_eq!(Command::parse(""), Command::Help);
        assert_eq!(
            Command::parse(" create   https://example.com/repo  "),
            Command::Create("https://example.com/repo")
        );
        assert_eq!(Command::parse("list everything"), Command::List);
        assert_eq!(Command::parse("show brave-turing"), Command::Show("brave-turing"));
        assert_eq!(Command::parse("show"), Command::Show(""));
        assert_eq!(Command::parse("bogus stuff"), Command::Unknown("bogus"));
        assert_eq!(Command::parse("LIST"), Command::Unknown("LIST"));
    }

    #[tokio::test]
    async fn test_create_invokes_create_run() {
        let store = Arc::new(InMemoryRunStore::default());
        let ops = operations(&store);

        let reply = dispatch(&ops, "@bot", "@bot create https://example.com/repo")
            .await
            .unwrap();

        let stored = store.objects().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0]["spec"]["repoUrl"], "https://example.com/repo");
        let Reply::Text(text) = reply else {
            panic!("expected text reply");
        };
        assert!(text.contains("name: brave-turing"));
        assert!(text.contains("repoUrl: https://example.com/repo"));
    }

    #[tokio::test]
    async fn test_unknown_command_calls_nothing() {
        let store = Arc::new(InMemoryRunStore::default());
        let ops = operations(&store);

        let reply = dispatch(&ops, "@bot", "@bot bogus").await.unwrap();

        assert_eq!(store.calls(), 0);
        let Reply::Text(text) = reply else {
            panic!("expected text reply");
        };
        assert!(text.contains("unknown command 'bogus'"));
    }

    #[tokio::test]
    async fn test_message_for_someone_else_is_ignored() {
        let store = Arc::new(InMemoryRunStore::default());
        let ops = operations(&store);

        assert!(dispatch(&ops, "@bot", "create https://example.com/repo")
            .await
            .is_none());
        assert!(dispatch(&ops, "@bot", "@alice create x").await.is_none());
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_help_and_usage() {
        let store = Arc::new(InMemoryRunStore::default());
        let ops = operations(&store);

        assert_eq!(
            dispatch(&ops, "@bot", "@bot help").await,
            Some(Reply::Text(HELP_TEXT.to_string()))
        );
        assert_eq!(
            dispatch(&ops, "@bot", "@bot create").await,
            Some(Reply::Text("usage: create <repoURL>".to_string()))
        );
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_list_returns_runs() {
        let store = Arc::new(InMemoryRunStore::default());
        let ops = operations(&store);
        ops.create_run("https://example.com/repo").await.unwrap();

        let Some(Reply::Runs(runs)) = dispatch(&ops, "@bot", "@bot list").await else {
            panic!("expected run list");
        };
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].name, "brave-turing");
    }

    #[tokio::test]
    async fn test_errors_are_rendered_as_text() {
        let store = Arc::new(InMemoryRunStore::default());
        let ops = operations(&store);

        let reply = dispatch(&ops, "@bot", "@bot show nobody-home").await;
        assert_eq!(
            reply,
            Some(Reply::Text("run nobody-home not found".to_string()))
        );

        store.set_failing(true);
        let Some(Reply::Text(text)) = dispatch(&ops, "@bot", "@bot list").await else {
            panic!("expected text reply");
        };
        assert!(text.starts_with("resource store error"));
    }

    #[test]
    fn test_report_url() {
        assert_eq!(
            report_url("https://ortruns.inocybe.io/", "brave-turing"),
            "https://ortruns.inocybe.io/brave-turing"
        );
    }
}
