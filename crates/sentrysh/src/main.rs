mod approval;
mod cli;
mod config;
mod dispatcher;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use audit_log::{AuditEntry, AuditEventType, AuditSink, AuditSource};
use output_redactor::{PatternSpec, RedactionSet};
use policy_engine::{
    matcher, CompiledPolicy, FileOp, PolicyHandle, SessionContext,
};

use crate::approval::ApprovalResolver;
use crate::cli::{Cli, Command, DebugCommand, OpKind};
use crate::dispatcher::{select_state, Dispatcher, InterceptState};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // The bypass check runs before anything else is set up: exec(2) replaces
    // the process image, so no runtime, no logging, and no buffering may sit
    // between the caller and the real program.
    if let Command::Exec { enforce, argv } = &cli.command {
        let state = select_state(std::io::stdin().is_terminal(), *enforce);
        if state == InterceptState::Bypass {
            let err = dispatcher::bypass(argv);
            // Only reachable when the program could not be spawned.
            eprintln!("sentrysh: cannot execute {}: {err}", argv[0]);
            std::process::exit(127);
        }
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let code = runtime.block_on(run(cli))?;
    drop(runtime);
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    // 1. Load config, then merge CLI overrides.
    let mut cfg = config::load(&cli.config)?;
    if let Some(ref policy) = cli.policy {
        cfg.policy_file = policy.clone();
    }

    // 2. Init tracing with JSON output. Logs go to stderr so the wrapped
    //    program's stdout stays clean.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    // 3. Resolve session context. HOME falls back to the caller's
    //    environment; PROJECT_ROOT only comes from explicit configuration.
    let ctx = SessionContext {
        home: cfg
            .session
            .home
            .clone()
            .or_else(|| std::env::var_os("HOME").map(PathBuf::from)),
        project_root: cfg.session.project_root.clone(),
        session_id: cfg.session.id.clone(),
    };

    // 4. Load and compile the policy snapshot.
    let handle = PolicyHandle::load(&cfg.policy_file, Some(&ctx))
        .with_context(|| format!("failed to load policy {}", cfg.policy_file.display()))?;
    let snapshot = handle.snapshot();

    info!(
        policy_file = %cfg.policy_file.display(),
        commands = snapshot.commands.rules.len(),
        files = snapshot.files.rules.len(),
        network = snapshot.network.rules.len(),
        "policy snapshot loaded"
    );

    // 5. Compile the redaction set: built-ins plus policy-supplied patterns.
    let extra: Vec<PatternSpec> = snapshot
        .dlp_patterns
        .iter()
        .map(|p| PatternSpec {
            name: p.name.clone(),
            regex: p.regex.clone(),
            max_len: p.max_len,
        })
        .collect();
    let redaction = Arc::new(
        RedactionSet::with_extra(extra).context("failed to compile DLP patterns")?,
    );

    match cli.command {
        Command::Exec { argv, .. } => {
            // 6. Start the audit sink only on the enforce path; bypass never
            //    reaches this function.
            let (audit, audit_task) = AuditSink::start(&cfg.logging.audit_log_path)
                .await
                .context("failed to start audit logger")?;

            audit
                .log(AuditEntry::new(
                    AuditEventType::PolicyLoaded,
                    audit_source(&cfg),
                    serde_json::json!({
                        "policy_file": cfg.policy_file.display().to_string(),
                    }),
                ))
                .await;

            let dispatcher = Dispatcher::new(
                Arc::clone(&snapshot),
                redaction,
                audit.clone(),
                ApprovalResolver::new(Duration::from_secs(cfg.approvals.timeout_secs)),
                cfg.shell.denial_exit_code,
                cfg.session.id.clone(),
            );

            let interactive = std::io::stdin().is_terminal();
            let code = dispatcher.run(&argv, interactive).await?;

            // Drop every sink clone so the writer task flushes and exits.
            drop(dispatcher);
            drop(audit);
            let _ = audit_task.await;

            Ok(code)
        }
        Command::Debug { command } => match command {
            DebugCommand::PolicyTest {
                op,
                command,
                path,
                host,
                port,
            } => policy_test(&snapshot, op, command, path, host, port),
        },
    }
}

fn audit_source(cfg: &config::Config) -> AuditSource {
    let source = AuditSource::new("sentrysh");
    match &cfg.session.id {
        Some(id) => source.with_session(id.clone()),
        None => source,
    }
}

/// Evaluate a hypothetical operation and print the decision without
/// executing anything. The `Decision:` line comes first and is stable;
/// operators script against it.
fn policy_test(
    snapshot: &CompiledPolicy,
    op: OpKind,
    command: Option<String>,
    path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<i32> {
    let decision = match op {
        OpKind::CommandExec => {
            let Some(command) = command else {
                bail!("--command is required for --op command_exec");
            };
            snapshot.evaluate_command(&command)
        }
        OpKind::FileRead | OpKind::FileWrite => {
            let Some(path) = path else {
                bail!("--path is required for file operations");
            };
            let resolved = matcher::resolve_path(&path);
            let file_op = match op {
                OpKind::FileRead => FileOp::Read,
                _ => FileOp::Write,
            };
            snapshot.evaluate_file(&resolved.to_string_lossy(), file_op)
        }
        OpKind::NetworkConnect => {
            let Some(host) = host else {
                bail!("--host is required for --op network_connect");
            };
            snapshot.evaluate_network(&host, port)
        }
    };

    println!("Decision: {}", decision.action);
    println!("Reason: {}", decision.reason);
    match &decision.matched_rule {
        Some(m) => println!("Matched rule: {}#{} '{}'", m.domain, m.index, m.pattern),
        None => println!("Matched rule: none (terminal default)"),
    }

    Ok(0)
}
