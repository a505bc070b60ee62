// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine subcommands and their JSON output.

use clap::{Args, Subcommand};
use memlayer_core::{Filters, MemlayerError, MemoryType, Message, Metadata};
use memlayer_memory::{AddRequest, ListRequest, MemoryEngine, MemoryUpdate, SearchRequest};
use serde_json::{Value, json};
use tracing::info;

/// Subcommands that operate on the memory store.
#[derive(Subcommand, Debug)]
pub enum EngineCommand {
    /// Extract facts from messages and reconcile them into memory.
    Add(AddArgs),
    /// Semantic search over a user's memories.
    Search(SearchArgs),
    /// Fetch one memory by id.
    Get { id: String },
    /// List a user's memories, most recently updated first.
    List(ListArgs),
    /// Edit a memory's content, metadata or type.
    Update(UpdateArgs),
    /// Delete one memory by id.
    Delete { id: String },
    /// Delete every memory of a user.
    DeleteAll {
        #[arg(long)]
        user: String,
    },
    /// Delete every memory of every user.
    Reset {
        /// Confirm the wipe.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    #[arg(long)]
    pub user: String,
    /// User messages, one per argument.
    #[arg(required_unless_present = "messages_json", conflicts_with = "messages_json")]
    pub text: Vec<String>,
    /// Full conversation as a JSON array of `{"role", "content"}` objects.
    #[arg(long = "messages-json")]
    pub messages_json: Option<String>,
    /// Store the text verbatim instead of extracting facts.
    #[arg(long)]
    pub no_infer: bool,
    /// JSON object merged into every stored fact's metadata.
    #[arg(long)]
    pub metadata: Option<String>,
    #[arg(long = "type")]
    pub memory_type: Option<MemoryType>,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    #[arg(long)]
    pub user: String,
    pub query: String,
    #[arg(long)]
    pub limit: Option<usize>,
    /// Minimum cosine similarity.
    #[arg(long)]
    pub threshold: Option<f32>,
    /// JSON object of metadata equality filters.
    #[arg(long)]
    pub filter: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long)]
    pub user: String,
    #[arg(long)]
    pub limit: Option<usize>,
    #[arg(long)]
    pub filter: Option<String>,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    pub id: String,
    #[arg(long)]
    pub content: Option<String>,
    /// JSON object merged into the memory's metadata.
    #[arg(long)]
    pub metadata: Option<String>,
    #[arg(long = "type")]
    pub memory_type: Option<MemoryType>,
}

/// Run `command` against `engine`, returning the JSON to print.
pub async fn run(command: EngineCommand, engine: &MemoryEngine) -> Result<Value, MemlayerError> {
    match command {
        EngineCommand::Add(args) => {
            let request = add_request(args)?;
            let summary = engine.add(request).await?;
            to_json(&summary)
        }
        EngineCommand::Search(args) => {
            let mut request = SearchRequest::new(args.user, args.query);
            if let Some(limit) = args.limit {
                request = request.with_limit(limit);
            }
            if let Some(threshold) = args.threshold {
                request = request.with_threshold(threshold);
            }
            if let Some(filter) = args.filter {
                request = request.with_filters(parse_object::<Filters>("--filter", &filter)?);
            }
            to_json(&engine.search(request).await?)
        }
        EngineCommand::Get { id } => to_json(&engine.get(&id).await?),
        EngineCommand::List(args) => {
            let mut request = ListRequest::new(args.user);
            if let Some(limit) = args.limit {
                request = request.with_limit(limit);
            }
            if let Some(filter) = args.filter {
                request = request.with_filters(parse_object::<Filters>("--filter", &filter)?);
            }
            to_json(&engine.get_all(request).await?)
        }
        EngineCommand::Update(args) => {
            let update = MemoryUpdate {
                content: args.content,
                metadata: args
                    .metadata
                    .map(|m| parse_object::<Metadata>("--metadata", &m))
                    .transpose()?,
                memory_type: args.memory_type,
            };
            to_json(&engine.update(&args.id, update).await?)
        }
        EngineCommand::Delete { id } => {
            engine.delete(&id).await?;
            Ok(json!({ "deleted": id }))
        }
        EngineCommand::DeleteAll { user } => {
            let deleted = engine.delete_all(&user).await?;
            Ok(json!({ "userId": user, "deleted": deleted }))
        }
        EngineCommand::Reset { yes } => {
            confirm_reset(yes)?;
            engine.reset().await?;
            info!("memory store reset from the command line");
            Ok(json!({ "reset": true }))
        }
    }
}

/// `reset` wipes every user; refuse unless explicitly confirmed.
pub fn confirm_reset(yes: bool) -> Result<(), MemlayerError> {
    if yes {
        Ok(())
    } else {
        Err(MemlayerError::Validation(
            "reset deletes every memory of every user; pass --yes to confirm".into(),
        ))
    }
}

fn add_request(args: AddArgs) -> Result<AddRequest, MemlayerError> {
    let messages = match args.messages_json {
        Some(raw) => serde_json::from_str::<Vec<Message>>(&raw).map_err(|e| {
            MemlayerError::Validation(format!("--messages-json is not a message array: {e}"))
        })?,
        None => args.text.into_iter().map(Message::user).collect(),
    };

    let mut request = AddRequest::new(args.user, messages).with_infer(!args.no_infer);
    if let Some(metadata) = args.metadata {
        request = request.with_metadata(parse_object::<Metadata>("--metadata", &metadata)?);
    }
    if let Some(memory_type) = args.memory_type {
        request = request.with_memory_type(memory_type);
    }
    Ok(request)
}

fn parse_object<T: serde::de::DeserializeOwned>(flag: &str, raw: &str) -> Result<T, MemlayerError> {
    serde_json::from_str(raw)
        .map_err(|e| MemlayerError::Validation(format!("{flag} must be a JSON object: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, MemlayerError> {
    serde_json::to_value(value)
        .map_err(|e| MemlayerError::Internal(format!("failed to serialize output: {e}")))
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use memlayer_test_utils::TestHarness;

    use super::*;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(subcommand)]
        command: EngineCommand,
    }

    fn parse(args: &[&str]) -> EngineCommand {
        TestCli::try_parse_from(std::iter::once("memlayer").chain(args.iter().copied()))
            .unwrap()
            .command
    }

    #[test]
    fn add_requires_text_or_messages() {
        let err = TestCli::try_parse_from(["memlayer", "add", "--user", "alice"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn add_parses_type_case_insensitively() {
        match parse(&["add", "--user", "alice", "--type", "procedural", "hi"]) {
            EngineCommand::Add(args) => {
                assert_eq!(args.memory_type, Some(MemoryType::Procedural));
                assert_eq!(args.text, vec!["hi"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn reset_without_yes_is_refused() {
        let err = confirm_reset(false).unwrap_err();
        assert!(matches!(err, MemlayerError::Validation(_)));
        assert!(confirm_reset(true).is_ok());
    }

    #[test]
    fn non_object_filter_is_validation_error() {
        let err = parse_object::<Filters>("--filter", "[1, 2]").unwrap_err();
        assert!(err.to_string().contains("--filter"));
    }

    #[tokio::test]
    async fn add_then_search_round_trip() {
        let harness = TestHarness::new().await.unwrap();
        let added = run(
            parse(&["add", "--user", "alice", "--no-infer", "User likes green tea"]),
            &harness.engine,
        )
        .await
        .unwrap();
        assert_eq!(added["actions"][0]["action"], "ADD");

        let found = run(
            parse(&["search", "--user", "alice", "green tea"]),
            &harness.engine,
        )
        .await
        .unwrap();
        assert_eq!(found[0]["content"], "User likes green tea");
        assert_eq!(found[0]["userId"], "alice");
    }

    #[tokio::test]
    async fn messages_json_feeds_extractor() {
        let harness = TestHarness::new().await.unwrap();
        harness.extractor.push_facts(&["User is vegetarian"]);

        run(
            parse(&[
                "add",
                "--user",
                "bob",
                "--messages-json",
                r#"[{"role":"user","content":"I stopped eating meat"},{"role":"assistant","content":"Noted"}]"#,
            ]),
            &harness.engine,
        )
        .await
        .unwrap();

        let calls = harness.extractor.calls();
        assert_eq!(calls[0].len(), 2);
        assert_eq!(harness.contents("bob").await.unwrap(), vec!["User is vegetarian"]);
    }

    #[tokio::test]
    async fn reset_command_needs_confirmation() {
        let harness = TestHarness::new().await.unwrap();
        harness.remember("alice", "User owns a bike").await.unwrap();

        let err = run(parse(&["reset"]), &harness.engine).await.unwrap_err();
        assert!(matches!(err, MemlayerError::Validation(_)));
        assert_eq!(harness.all("alice").await.unwrap().len(), 1);

        run(parse(&["reset", "--yes"]), &harness.engine).await.unwrap();
        assert!(harness.all("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_and_delete_report_json() {
        let harness = TestHarness::new().await.unwrap();
        let summary = harness.remember("alice", "User lives in Berlin").await.unwrap();
        let id = summary.added_ids()[0].to_string();

        let updated = run(
            parse(&["update", &id, "--content", "User lives in Munich", "--metadata", r#"{"source":"cli"}"#]),
            &harness.engine,
        )
        .await
        .unwrap();
        assert_eq!(updated["content"], "User lives in Munich");
        assert_eq!(updated["metadata"]["source"], "cli");

        let deleted = run(parse(&["delete", &id]), &harness.engine).await.unwrap();
        assert_eq!(deleted["deleted"], id.as_str());

        let err = run(parse(&["get", &id]), &harness.engine).await.unwrap_err();
        assert!(matches!(err, MemlayerError::NotFound { .. }));
    }
}
