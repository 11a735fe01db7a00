use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "sentrysh",
    version,
    about = "Policy-mediated shell shim for sandboxed agents"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Path to the policy file (overrides config file setting)
    #[arg(short, long)]
    pub policy: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one invocation through the interception dispatcher
    Exec {
        /// Enforce policy even when stdin is not a terminal.
        /// Without this flag, non-interactive invocations bypass the
        /// dispatcher entirely.
        #[arg(long)]
        enforce: bool,

        /// Program and arguments, after `--`
        #[arg(last = true, required = true)]
        argv: Vec<String>,
    },

    /// Offline diagnostics
    Debug {
        #[command(subcommand)]
        command: DebugCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum DebugCommand {
    /// Evaluate a hypothetical operation against the current policy without
    /// executing anything
    PolicyTest {
        /// The kind of operation to test
        #[arg(long)]
        op: OpKind,

        /// Command line for command_exec
        #[arg(long)]
        command: Option<String>,

        /// Path for file_read / file_write
        #[arg(long)]
        path: Option<PathBuf>,

        /// Host for network_connect
        #[arg(long)]
        host: Option<String>,

        /// Port for network_connect
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[value(rename_all = "snake_case")]
pub enum OpKind {
    CommandExec,
    FileRead,
    FileWrite,
    NetworkConnect,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_parses_trailing_argv() {
        let cli = Cli::try_parse_from(["sentrysh", "exec", "--", "ls", "-la", "/tmp"]).unwrap();
        match cli.command {
            Command::Exec { enforce, argv } => {
                assert!(!enforce);
                assert_eq!(argv, vec!["ls", "-la", "/tmp"]);
            }
            other => panic!("expected exec, got {other:?}"),
        }
    }

    #[test]
    fn enforce_flag_is_explicit_opt_in() {
        let cli =
            Cli::try_parse_from(["sentrysh", "exec", "--enforce", "--", "npm", "install"]).unwrap();
        match cli.command {
            Command::Exec { enforce, .. } => assert!(enforce),
            other => panic!("expected exec, got {other:?}"),
        }
    }

    #[test]
    fn exec_requires_argv() {
        assert!(Cli::try_parse_from(["sentrysh", "exec", "--"]).is_err());
    }

    #[test]
    fn policy_test_parses_snake_case_ops() {
        let cli = Cli::try_parse_from([
            "sentrysh",
            "debug",
            "policy-test",
            "--op",
            "file_read",
            "--path",
            "/etc/shadow",
        ])
        .unwrap();
        match cli.command {
            Command::Debug {
                command: DebugCommand::PolicyTest { op, path, .. },
            } => {
                assert_eq!(op, OpKind::FileRead);
                assert_eq!(path.unwrap(), PathBuf::from("/etc/shadow"));
            }
            other => panic!("expected policy-test, got {other:?}"),
        }
    }
}
