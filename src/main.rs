//! DocQA 命令行入口
//!
//! - `docqa ask [--session <id>] [--docs <path>] [--config <file>] [question...]`：给出问题时单次回答，否则进入交互循环
//! - `docqa ingest <path> [--config <file>]`：导入 .txt / .md / .pdf 并打印每个文件的分块统计
//! - 不带子命令时等同于 `ask`，例如 `docqa --session abc`
//!
//! 交互循环内支持 `/ingest <path>`、`/history`、`/clear`、`/quit`。

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use docqa::{create_service_from_config, QaResponse, QaService};

#[derive(Parser, Debug)]
#[command(name = "docqa")]
#[command(about = "Hybrid document + web question answering", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Extra config file layered over config/default.toml
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,

    /// Without a subcommand, behaves like `ask`
    #[command(flatten)]
    ask: AskArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer one question, or start an interactive session when none is given
    Ask(AskArgs),
    /// Ingest a .txt / .md / .pdf file or a directory of them
    Ingest { path: PathBuf },
}

#[derive(Args, Debug, Default)]
struct AskArgs {
    /// Session id; a fresh one is generated when omitted
    #[arg(long, short = 's')]
    session: Option<String>,

    /// Documents to ingest before answering
    #[arg(long)]
    docs: Option<PathBuf>,

    question: Vec<String>,
}

fn print_response(resp: &QaResponse) {
    println!("\n{}\n", resp.answer);
    if !resp.sources.is_empty() {
        println!("sources: {}", resp.sources.join(", "));
    }
    let plan: Vec<&str> = resp.plan.iter().map(|a| a.tag()).collect();
    println!("plan: {}", plan.join(" -> "));
}

async fn ingest_and_report(service: &QaService, path: &Path) -> anyhow::Result<()> {
    let report = service
        .ingest_path(path)
        .await
        .with_context(|| format!("Failed to ingest {}", path.display()))?;
    for file in &report.files {
        match &file.error {
            None => println!("{:>6} chunks  {} ({})", file.chunks, file.doc_id, file.path.display()),
            Some(e) => println!("{:>6}         {} skipped: {}", "-", file.path.display(), e),
        }
    }
    println!(
        "{} file(s) ingested, {} failed, {} chunks total",
        report.succeeded(),
        report.failed(),
        report.total_chunks
    );
    Ok(())
}

async fn interactive(service: &QaService, session: &str) -> anyhow::Result<()> {
    println!("session: {session}  (/ingest <path>, /history, /clear, /quit)");
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/history" => {
                for (i, turn) in service.history(session).await?.iter().enumerate() {
                    println!("[{}] Q: {}\n    A: {}", i + 1, turn.question, turn.answer);
                }
            }
            "/clear" => {
                service.clear(session).await?;
                println!("session cleared");
            }
            _ if line.starts_with("/ingest ") => {
                if let Err(e) = ingest_and_report(service, Path::new(line["/ingest ".len()..].trim())).await {
                    eprintln!("{e:#}");
                }
            }
            question => match service.ask(session, question).await {
                Ok(resp) => print_response(&resp),
                Err(e) => eprintln!("error: {e}"),
            },
        }
    }
    Ok(())
}

async fn run_ask(service: &QaService, args: AskArgs) -> anyhow::Result<()> {
    if let Some(docs) = &args.docs {
        ingest_and_report(service, docs).await?;
    }
    let session = args
        .session
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    if args.question.is_empty() {
        return interactive(service, &session).await;
    }
    let resp = service
        .ask(&session, &args.question.join(" "))
        .await
        .context("Failed to answer")?;
    print_response(&resp);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    docqa::observability::init();

    let cli = Cli::parse();
    let service = create_service_from_config(cli.config)
        .await
        .context("Failed to build QA service")?;

    match cli.command {
        Some(Command::Ingest { path }) => ingest_and_report(&service, &path).await,
        Some(Command::Ask(args)) => run_ask(&service, args).await,
        None => run_ask(&service, cli.ask).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("docqa").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bare_flags_mean_ask() {
        let cli = parse(&["--session", "abc"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.ask.session.as_deref(), Some("abc"));
        assert!(cli.ask.question.is_empty());
    }

    #[test]
    fn ask_subcommand_with_question() {
        let cli = parse(&["ask", "-s", "s1", "--docs", "notes", "what", "is", "rust?"]);
        match cli.command {
            Some(Command::Ask(args)) => {
                assert_eq!(args.session.as_deref(), Some("s1"));
                assert_eq!(args.docs, Some(PathBuf::from("notes")));
                assert_eq!(args.question, vec!["what", "is", "rust?"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn config_is_global() {
        let cli = parse(&["ingest", "papers", "--config", "local.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("local.toml")));
        assert!(matches!(cli.command, Some(Command::Ingest { ref path }) if path == &PathBuf::from("papers")));
    }

    #[test]
    fn ingest_requires_path() {
        assert!(Cli::try_parse_from(["docqa", "ingest"]).is_err());
    }
}
