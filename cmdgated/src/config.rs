// ABOUTME: parses daemon command line flags into a validated runtime configuration.
// ABOUTME: covers the listen address, scratch placement, and execution limits.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "cmdgated", about = "Command approval gateway for chat agents")]
pub struct Args {
    #[arg(long, default_value = "0.0.0.0:8001")]
    pub listen: String,

    #[arg(long, default_value = "cmdgate")]
    pub service_name: String,

    /// Append one json line per chat request to this file.
    #[arg(long)]
    pub audit_path: Option<PathBuf>,

    /// Parent directory for scratch environments. Defaults to the system temp dir.
    #[arg(long)]
    pub scratch_root: Option<PathBuf>,

    /// Per-command timeout in seconds, 0 disables it.
    #[arg(long, default_value_t = 30)]
    pub exec_timeout_sec: u64,

    #[arg(long, default_value_t = 64 * 1024)]
    pub max_output_bytes: usize,

    #[arg(long, default_value = "/bin/sh")]
    pub shell: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub service_name: String,
    pub audit_path: Option<PathBuf>,
    pub scratch_root: Option<PathBuf>,
    pub exec: ExecConfig,
}

#[derive(Debug, Clone)]
pub struct ExecConfig {
    pub shell: PathBuf,
    pub timeout: Option<Duration>,
    pub max_output_bytes: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            shell: PathBuf::from("/bin/sh"),
            timeout: Some(Duration::from_secs(30)),
            max_output_bytes: 64 * 1024,
        }
    }
}

impl TryFrom<Args> for Config {
    type Error = anyhow::Error;

    fn try_from(args: Args) -> anyhow::Result<Self> {
        let listen = args
            .listen
            .parse()
            .with_context(|| format!("invalid listen address {}", args.listen))?;

        if args.service_name.trim().is_empty() {
            anyhow::bail!("service name must be non-empty");
        }
        if args.max_output_bytes == 0 {
            anyhow::bail!("max output bytes must be positive");
        }
        if let Some(root) = &args.scratch_root {
            if !root.is_dir() {
                anyhow::bail!("scratch root {} is not a directory", root.display());
            }
        }

        Ok(Self {
            listen,
            service_name: args.service_name,
            audit_path: args.audit_path,
            scratch_root: args.scratch_root,
            exec: ExecConfig {
                shell: args.shell,
                timeout: (args.exec_timeout_sec > 0)
                    .then(|| Duration::from_secs(args.exec_timeout_sec)),
                max_output_bytes: args.max_output_bytes,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_produce_a_valid_config() {
        let args = Args::parse_from(["cmdgated"]);
        let config = Config::try_from(args).unwrap();
        assert_eq!(config.listen.port(), 8001);
        assert_eq!(config.service_name, "cmdgate");
        assert_eq!(config.exec.timeout, Some(Duration::from_secs(30)));
        assert!(config.audit_path.is_none());
    }

    #[test]
    fn zero_timeout_disables_it() {
        let args = Args::parse_from(["cmdgated", "--exec-timeout-sec", "0"]);
        let config = Config::try_from(args).unwrap();
        assert_eq!(config.exec.timeout, None);
    }

    #[test]
    fn rejects_bad_listen_address() {
        let args = Args::parse_from(["cmdgated", "--listen", "not-an-addr"]);
        let err = Config::try_from(args).unwrap_err();
        assert!(err.to_string().contains("invalid listen address"));
    }

    #[test]
    fn rejects_missing_scratch_root() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let args = Args::parse_from([
            "cmdgated".to_string(),
            "--scratch-root".to_string(),
            missing.to_string_lossy().to_string(),
        ]);
        assert!(Config::try_from(args).is_err());
    }
}
