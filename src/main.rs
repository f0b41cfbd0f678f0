use clap::{Parser, Subcommand};
use lexi_rag::Result;
use lexi_rag::commands::{
    build_index, clear_session, list_sessions, log_message, run_query, show_session, show_status,
};
use lexi_rag::config::{Config, resolve_data_dir};
use lexi_rag::conversations::models::Role;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "lexi-rag")]
#[command(about = "Semantic search and conversation memory for a content-authoring assistant")]
#[command(version)]
struct Cli {
    /// Storage directory for the index, config, and conversation database
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed a corpus file and rebuild the vector index
    Build {
        /// Path to the JSON corpus file
        corpus: PathBuf,
    },
    /// Query the index for semantically similar documents
    Query {
        /// Query text
        text: String,
        /// Maximum number of results
        #[arg(short = 'k', long, default_value_t = 10)]
        top_k: usize,
        /// Restrict results to these post types (repeatable)
        #[arg(long = "post-type")]
        post_types: Vec<String>,
        /// Restrict results to entries carrying any of these tags (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Emit the admin API JSON envelope instead of formatted output
        #[arg(long)]
        json: bool,
    },
    /// Show index stats and embedding backend health
    Status,
    /// List conversation sessions
    Sessions,
    /// Print one session's transcript
    ShowSession {
        /// Session identifier
        session_id: String,
    },
    /// Delete one session's messages
    ClearSession {
        /// Session identifier
        session_id: String,
    },
    /// Append a message to a session's log
    Log {
        /// Session identifier
        session_id: String,
        /// Message role: user, assistant, or system
        role: Role,
        /// Message content
        content: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir);
    let config = Config::load(&data_dir)?;

    // Ctrl-C cancels in-flight embedding work instead of killing mid-write.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    match cli.command {
        Commands::Build { corpus } => {
            build_index(&config, &corpus, &cancel).await?;
        }
        Commands::Query {
            text,
            top_k,
            post_types,
            tags,
            json,
        } => {
            run_query(&config, &text, top_k, post_types, tags, json, &cancel).await?;
        }
        Commands::Status => {
            show_status(&config).await?;
        }
        Commands::Sessions => {
            list_sessions(&config).await?;
        }
        Commands::ShowSession { session_id } => {
            show_session(&config, &session_id).await?;
        }
        Commands::ClearSession { session_id } => {
            clear_session(&config, &session_id).await?;
        }
        Commands::Log {
            session_id,
            role,
            content,
        } => {
            log_message(&config, &session_id, role, &content).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["lexi-rag", "status"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::Status);
        }
    }

    #[test]
    fn build_command_with_corpus_path() {
        let cli = Cli::try_parse_from(["lexi-rag", "build", "corpus.json"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Build { corpus } = parsed.command {
                assert_eq!(corpus, PathBuf::from("corpus.json"));
            }
        }
    }

    #[test]
    fn query_command_defaults() {
        let cli = Cli::try_parse_from(["lexi-rag", "query", "borrow checker"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Query {
                text,
                top_k,
                post_types,
                tags,
                json,
            } = parsed.command
            {
                assert_eq!(text, "borrow checker");
                assert_eq!(top_k, 10);
                assert!(post_types.is_empty());
                assert!(tags.is_empty());
                assert!(!json);
            }
        }
    }

    #[test]
    fn query_command_with_filters() {
        let cli = Cli::try_parse_from([
            "lexi-rag",
            "query",
            "garden notes",
            "-k",
            "3",
            "--post-type",
            "fleeting",
            "--tag",
            "garden",
            "--tag",
            "summer",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Query {
                top_k,
                post_types,
                tags,
                ..
            } = parsed.command
            {
                assert_eq!(top_k, 3);
                assert_eq!(post_types, vec!["fleeting".to_string()]);
                assert_eq!(tags, vec!["garden".to_string(), "summer".to_string()]);
            }
        }
    }

    #[test]
    fn log_command_parses_role() {
        let cli = Cli::try_parse_from(["lexi-rag", "log", "s1", "user", "hello there"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Log {
                session_id, role, ..
            } = parsed.command
            {
                assert_eq!(session_id, "s1");
                assert_eq!(role, Role::User);
            }
        }
    }

    #[test]
    fn log_command_rejects_unknown_role() {
        let cli = Cli::try_parse_from(["lexi-rag", "log", "s1", "moderator", "hello"]);
        assert!(cli.is_err());
    }

    #[test]
    fn global_data_dir_flag() {
        let cli = Cli::try_parse_from(["lexi-rag", "status", "--data-dir", "/tmp/rag"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert_eq!(parsed.data_dir, Some(PathBuf::from("/tmp/rag")));
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["lexi-rag", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["lexi-rag", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
