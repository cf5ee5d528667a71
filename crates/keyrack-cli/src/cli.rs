//! CLI argument definitions for keyrack.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use clap::{Parser, Subcommand};

/// keyrack -- namespaced credential grants from multiple vaults.
#[derive(Parser)]
#[command(
    name = "keyrack",
    version,
    about = "keyrack -- namespaced credential grants from multiple vaults",
    long_about = "Resolves org.env.NAME key slugs into usable credentials: reads the \
                  process environment and the session daemon, keeps everything else \
                  encrypted at rest until explicitly unlocked, and refuses overly \
                  powerful personal credentials outright."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve one key (prints the secret to stdout) or a whole repo.
    Grant {
        /// Full slug, `org.env.NAME`.  Omit when using `--repo`.
        slug: Option<String>,

        /// Resolve every key the repo manifest declares.
        #[arg(long, conflicts_with = "slug")]
        repo: bool,

        /// Restrict `--repo` to one deployment environment.
        #[arg(long, requires = "repo")]
        env: Option<String>,

        /// Path of the repo manifest.
        #[arg(long, default_value = "keyrack.toml", requires = "repo")]
        manifest: String,
    },

    /// Open the vaults behind a key (or the whole repo) and seed the
    /// session daemon with minted credentials.
    Unlock {
        /// Full slug, `org.env.NAME`.  Omit to unlock everything configured.
        slug: Option<String>,
    },

    /// Configure a key on this host: store its value and record where it
    /// lives and how it translates.
    Set {
        /// Full slug, `org.env.NAME`.
        slug: String,

        /// Vault backend: os.envvar, os.direct, os.secure, os.daemon,
        /// 1password, aws.iam.sso.
        #[arg(long)]
        vault: String,

        /// Translation mechanism: PERMANENT_VIA_REPLICA,
        /// EPHEMERAL_VIA_GITHUB_APP, EPHEMERAL_VIA_AWS_SSO.
        #[arg(long, default_value = "PERMANENT_VIA_REPLICA")]
        mechanism: String,

        /// External reference the vault needs (1Password item path, AWS
        /// profile name).
        #[arg(long)]
        exid: Option<String>,

        /// The secret value.  Prompted for when omitted.
        #[arg(long)]
        value: Option<String>,
    },

    /// Remove a key: delete its stored value and forget its configuration.
    Rm {
        /// Full slug, `org.env.NAME`.
        slug: String,
    },

    /// List the keys configured on this host.
    List {
        /// Restrict to one deployment environment.
        #[arg(long)]
        env: Option<String>,
    },
}
