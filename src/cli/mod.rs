//! CLI entry point for schwab-auth.

pub mod commands;

use clap::{Parser, Subcommand};

/// Schwab OAuth helper
#[derive(Parser, Debug)]
#[command(name = "schwab-auth", version, about = "Schwab OAuth token helper")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decode a base64 identity token and print its claims as JSON
    Decode(DecodeArgs),
    /// Exchange an authorization code for tokens
    Exchange(CodeArgs),
    /// Exchange a code, then keep the access token fresh until Ctrl-C
    Watch(CodeArgs),
}

/// Arguments for `schwab-auth decode`.
#[derive(Parser, Debug)]
pub struct DecodeArgs {
    /// Base64 `id_token` value from a token response
    pub token: String,
}

/// Arguments for commands that start from an authorization code.
#[derive(Parser, Debug)]
pub struct CodeArgs {
    /// Authorization code from the redirect (URL-decoded)
    #[arg(short, long)]
    pub code: String,
}
