//! Ledger CLI interface.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use hydra_core::{HydraError, Result, UtxoRef};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

/// Default deadline for a single CLI invocation.
pub const DEFAULT_CLI_TIMEOUT: Duration = Duration::from_secs(30);

/// A transaction output as passed to `--tx-out`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: String,
    pub lovelace: u64,
}

impl TxOutput {
    pub fn new(address: impl Into<String>, lovelace: u64) -> Self {
        Self {
            address: address.into(),
            lovelace,
        }
    }

    /// `<addr>+<lovelace>` as expected by the CLI.
    pub fn to_cli_arg(&self) -> String {
        format!("{}+{}", self.address, self.lovelace)
    }
}

/// Body of a fee-less raw head transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub input: UtxoRef,
    pub outputs: Vec<TxOutput>,
    pub fee: u64,
}

/// External ledger CLI.
#[async_trait]
pub trait LedgerCli: Send + Sync {
    /// Derive the network address of a payment verification key.
    async fn build_address(&self, payment_vkey: &Path) -> Result<String>;

    /// Write an unsigned transaction body to `out_file`.
    async fn build_raw(&self, tx: &RawTransaction, out_file: &Path) -> Result<()>;

    /// Sign a transaction body, writing the signed envelope to `out_file`.
    async fn sign(&self, tx_body: &Path, signing_key: &Path, out_file: &Path) -> Result<()>;
}

/// [`LedgerCli`] backed by the `cardano-cli` binary.
#[derive(Debug, Clone)]
pub struct CardanoCli {
    binary: PathBuf,
    testnet_magic: u32,
    timeout: Duration,
}

impl CardanoCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            testnet_magic: 1,
            timeout: DEFAULT_CLI_TIMEOUT,
        }
    }

    pub fn with_testnet_magic(mut self, magic: u32) -> Self {
        self.testnet_magic = magic;
        self
    }

    /// Deadline applied to every invocation; the child is killed when it expires.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn command_line(&self, args: &[String]) -> String {
        let mut line = self.binary.display().to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Run the CLI and return its stdout.
    async fn run(&self, args: Vec<String>) -> Result<String> {
        let command_line = self.command_line(&args);
        debug!(command = %command_line, "invoking ledger CLI");

        let mut command = Command::new(&self.binary);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                return Err(HydraError::CliFailure {
                    command: command_line,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!("failed to spawn: {}", err),
                })
            }
            Err(_) => {
                return Err(HydraError::CliFailure {
                    command: command_line,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!("deadline of {}ms exceeded", self.timeout.as_millis()),
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(HydraError::CliFailure {
                command: command_line,
                exit_code: output.status.code(),
                stdout,
                stderr,
            });
        }

        Ok(stdout)
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

#[async_trait]
impl LedgerCli for CardanoCli {
    async fn build_address(&self, payment_vkey: &Path) -> Result<String> {
        let stdout = self
            .run(vec![
                "address".into(),
                "build".into(),
                "--payment-verification-key-file".into(),
                path_arg(payment_vkey),
                "--testnet-magic".into(),
                self.testnet_magic.to_string(),
            ])
            .await?;

        let address = stdout.trim();
        if address.is_empty() {
            return Err(HydraError::MalformedCliOutput(
                "address build printed nothing".to_string(),
            ));
        }
        Ok(address.to_string())
    }

    async fn build_raw(&self, tx: &RawTransaction, out_file: &Path) -> Result<()> {
        let mut args: Vec<String> = vec![
            "transaction".into(),
            "build-raw".into(),
            "--tx-in".into(),
            tx.input.to_string(),
        ];
        for output in &tx.outputs {
            args.push("--tx-out".into());
            args.push(output.to_cli_arg());
        }
        args.push("--fee".into());
        args.push(tx.fee.to_string());
        args.push("--out-file".into());
        args.push(path_arg(out_file));

        self.run(args).await.map(|_| ())
    }

    async fn sign(&self, tx_body: &Path, signing_key: &Path, out_file: &Path) -> Result<()> {
        self.run(vec![
            "transaction".into(),
            "sign".into(),
            "--tx-body-file".into(),
            path_arg(tx_body),
            "--signing-key-file".into(),
            path_arg(signing_key),
            "--out-file".into(),
            path_arg(out_file),
        ])
        .await
        .map(|_| ())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_address_build_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "cli", r#"echo "addr_test1$*""#);
        let cli = CardanoCli::new(bin).with_testnet_magic(42);

        let address = cli.build_address(Path::new("/k/payment.vkey")).await.unwrap();
        assert_eq!(
            address,
            "addr_test1address build --payment-verification-key-file /k/payment.vkey --testnet-magic 42"
        );
    }

    #[tokio::test]
    async fn test_build_raw_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("args.txt");
        let bin = script(
            dir.path(),
            "cli",
            &format!(r#"echo "$*" > {}"#, log.display()),
        );
        let cli = CardanoCli::new(bin);

        let tx = RawTransaction {
            input: UtxoRef::parse("abcd#0").unwrap(),
            outputs: vec![TxOutput::new("addr_c", 2_500_000), TxOutput::new("addr_b", 2_500_000)],
            fee: 0,
        };
        cli.build_raw(&tx, Path::new("/tmp/tx.raw")).await.unwrap();

        let args = std::fs::read_to_string(log).unwrap();
        assert_eq!(
            args.trim(),
            "transaction build-raw --tx-in abcd#0 --tx-out addr_c+2500000 --tx-out addr_b+2500000 --fee 0 --out-file /tmp/tx.raw"
        );
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_cli_failure() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "cli", "echo partial; echo 'bad key' >&2; exit 3");
        let cli = CardanoCli::new(bin);

        let err = cli
            .sign(Path::new("a"), Path::new("b"), Path::new("c"))
            .await
            .unwrap_err();
        match err {
            HydraError::CliFailure {
                command,
                exit_code,
                stdout,
                stderr,
            } => {
                assert!(command.ends_with("transaction sign --tx-body-file a --signing-key-file b --out-file c"));
                assert_eq!(exit_code, Some(3));
                assert_eq!(stdout.trim(), "partial");
                assert_eq!(stderr.trim(), "bad key");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deadline_kills_slow_cli() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "cli", "sleep 10");
        let cli = CardanoCli::new(bin).with_timeout(Duration::from_millis(100));

        let started = std::time::Instant::now();
        let err = cli.build_address(Path::new("x")).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(err, HydraError::CliFailure { exit_code: None, .. }));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let cli = CardanoCli::new("/nonexistent/cardano-cli");
        let err = cli.build_address(Path::new("x")).await.unwrap_err();
        assert_eq!(err.kind(), hydra_core::ErrorKind::CliFailure);
    }
}
