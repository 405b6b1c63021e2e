use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::{self, Command};

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use log::debug;

/// Compile an ALAN-2022 source file to a JVM class via the Jasmin assembler.
#[derive(Parser)]
#[command(name = "alanc", version, about)]
struct Args {
  /// Path to the ALAN source file
  filename: PathBuf,
}

fn main() {
  env_logger::builder().format_timestamp(None).init();
  let args = Args::parse();

  if let Err(err) = run(&args) {
    eprintln!("alanc: {err:#}");
    process::exit(1);
  }
}

fn run(args: &Args) -> anyhow::Result<()> {
  // the assembler must be reachable before any parsing starts
  let jasmin_jar =
    env::var("JASMIN_JAR").map_err(|_| anyhow!("JASMIN_JAR environment variable not set"))?;

  let source = fs::read_to_string(&args.filename)
    .with_context(|| format!("file '{}' could not be opened", args.filename.display()))?;

  let unit = match alanc::compile(&source) {
    Ok(unit) => unit,
    Err(err) => bail!("{}: {err}", args.filename.display()),
  };

  let listing_path = format!("{}.jasmin", unit.class_name);
  fs::write(&listing_path, &unit.jasmin)
    .with_context(|| format!("could not write code file '{listing_path}'"))?;
  debug!("wrote {listing_path}");

  assemble(&jasmin_jar, &listing_path)
}

/// Run the external assembler over the listing and wait for it to finish.
fn assemble(jasmin_jar: &str, listing_path: &str) -> anyhow::Result<()> {
  let status = Command::new("java")
    .args(["-jar", jasmin_jar, listing_path])
    .status()
    .context("could not spawn the Jasmin assembler")?;

  match status.code() {
    Some(0) => Ok(()),
    Some(_) => bail!("Jasmin reported failure"),
    None => bail!("Jasmin stopped or terminated abnormally"),
  }
}
