//! # efivar-cli
//!
//! A small front-end for `efivar-store`.
//!
//! ## Usage
//!
//! ```bash
//! # List every variable
//! efivar --list
//!
//! # Read one
//! efivar --read BootOrder-8be4df61-93ca-11d2-aa0d-00e098032b8c
//!
//! # Write a file into a variable; without a GUID a random one is generated
//! efivar --write MyVar --content ./payload.bin
//!
//! # Delete it again
//! efivar --delete MyVar-<guid>
//! ```
//!
//! Actions can be combined; they run in the order list, read, delete,
//! write.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use efivar_store::{
    Efivars, VariableAttributes, VariableBackend, VariableDescriptor, DEFAULT_MOUNT,
};
use uuid::Uuid;

/// Attributes used for writes unless overridden: NV | BS | RT.
pub const DEFAULT_ATTRIBUTES: u32 = 7;

/// efivar - list, read, write, and delete UEFI variables
#[derive(Parser, Debug)]
#[command(name = "efivar")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// List all variables
    #[arg(long)]
    pub list: bool,

    /// Read the variable Name-GUID
    #[arg(long, value_name = "NAME-GUID")]
    pub read: Option<String>,

    /// Delete the variable Name-GUID
    #[arg(long, value_name = "NAME-GUID")]
    pub delete: Option<String>,

    /// Write to the variable Name-GUID, or Name to generate a GUID
    #[arg(long, value_name = "NAME[-GUID]", requires = "content")]
    pub write: Option<String>,

    /// File whose contents are written by --write
    #[arg(long, value_name = "PATH")]
    pub content: Option<PathBuf>,

    /// Attribute word used by --write
    #[arg(long, default_value_t = DEFAULT_ATTRIBUTES)]
    pub attributes: u32,

    /// Where efivarfs is mounted
    #[arg(long, env = "EFIVARFS_PATH", default_value = DEFAULT_MOUNT)]
    pub mount: PathBuf,

    /// Print machine-readable JSON
    #[arg(long)]
    pub json: bool,

    /// Log backend operations to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error("List failed: {0}")]
    List(#[source] efivar_store::Error),

    #[error("Read failed: {0}")]
    Read(#[source] efivar_store::Error),

    #[error("Delete failed: {0}")]
    Delete(#[source] efivar_store::Error),

    #[error("Write failed: {0}")]
    Write(#[source] efivar_store::Error),

    #[error("Var name malformed: Must be either Name-GUID or just Name")]
    MalformedName,

    #[error("Failed to read file {}: {source}", path.display())]
    Content { path: PathBuf, source: io::Error },

    #[error("Output error: {0}")]
    Output(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Run every action requested in `args` against `vars`, printing to `out`.
pub fn run<B: VariableBackend>(
    args: &Args,
    vars: &Efivars<B>,
    out: &mut impl Write,
) -> Result<(), CliError> {
    if args.list {
        list(args, vars, out)?;
    }
    if let Some(identifier) = &args.read {
        read(args, vars, identifier, out)?;
    }
    if let Some(identifier) = &args.delete {
        vars.simple_remove(identifier).map_err(CliError::Delete)?;
    }
    // clap only accepts --write together with --content.
    if let Some((identifier, content)) = args.write.as_deref().zip(args.content.as_deref()) {
        let identifier = write(args, vars, identifier, content)?;
        tracing::info!(%identifier, "variable written");
    }
    Ok(())
}

fn list<B: VariableBackend>(
    args: &Args,
    vars: &Efivars<B>,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let descriptors = vars.list().map_err(CliError::List)?;
    if args.json {
        serde_json::to_writer_pretty(&mut *out, &descriptors)?;
        writeln!(out)?;
    } else {
        for descriptor in descriptors {
            writeln!(out, "{}", descriptor)?;
        }
    }
    Ok(())
}

fn read<B: VariableBackend>(
    args: &Args,
    vars: &Efivars<B>,
    identifier: &str,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let (attrs, data) = vars.simple_read(identifier).map_err(CliError::Read)?;
    if args.json {
        let value = serde_json::json!({
            "name": identifier,
            "attributes": attrs.bits(),
            "data": data,
        });
        serde_json::to_writer_pretty(&mut *out, &value)?;
        writeln!(out)?;
    } else {
        writeln!(
            out,
            "Name: {}, Attributes: {}, Data: {}",
            identifier,
            attrs.bits(),
            String::from_utf8_lossy(&data)
        )?;
    }
    Ok(())
}

/// Returns the full identifier that was written.
fn write<B: VariableBackend>(
    args: &Args,
    vars: &Efivars<B>,
    identifier: &str,
    content: &Path,
) -> Result<String, CliError> {
    let descriptor = resolve_write_target(identifier)?;

    let data = std::fs::read(content).map_err(|source| CliError::Content {
        path: content.to_path_buf(),
        source,
    })?;

    vars.write(
        &descriptor.name,
        &descriptor.guid,
        VariableAttributes::from_bits_retain(args.attributes),
        &data,
    )
    .map_err(CliError::Write)?;
    Ok(descriptor.to_string())
}

/// `Name-GUID` is used as given, a bare `Name` gets a fresh random GUID.
pub fn resolve_write_target(identifier: &str) -> Result<VariableDescriptor, CliError> {
    if identifier.contains('-') {
        identifier
            .parse()
            .map_err(|_: efivar_store::Error| CliError::MalformedName)
    } else {
        Ok(VariableDescriptor::new(identifier, Uuid::new_v4()))
    }
}
