//! CLI: check / normalize JSON documents against declared shapes
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use rayon::prelude::*;

use crate::convert::JsonOptions;
use crate::error::Error;
use crate::guard::Guard;
use crate::value::Value;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// check JSON/NDJSON documents against the shapes of a declaration document
#[derive(Parser, Debug)]
#[command(name = "shapeguard", version)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// print a pass/fail line per document; fails if any document fails
    Check(CheckArgs),
    /// create instances and print their normalized JSON, one per line
    Normalize(NormalizeArgs),
}

#[derive(Args, Debug, Clone)]
struct ModelSettings {
    /// JSON declaration document (`{ "models": { ... } }`)
    #[arg(long, short = 'd')]
    declarations: PathBuf,

    /// name of the model documents are checked against
    #[arg(long, short = 'm')]
    model: String,
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// treat input as newline-delimited JSON (NDJSON)
    #[arg(long, default_value_t = false)]
    ndjson: bool,

    /// JSON Pointer to select a subnode in each document (e.g. /data/items/0/payload)
    #[arg(long)]
    json_pointer: Option<String>,

    /// JQ pre-process filter for each document.
    #[arg(long)]
    jq_expr: Option<String>,

    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(clap::Parser, Debug)]
struct CheckArgs {
    #[command(flatten)]
    model_settings: ModelSettings,

    #[command(flatten)]
    input_settings: InputSettings,
}

#[derive(clap::Parser, Debug)]
struct NormalizeArgs {
    #[command(flatten)]
    model_settings: ModelSettings,

    #[command(flatten)]
    input_settings: InputSettings,

    /// pretty-print each JSON text
    #[arg(long)]
    pretty: bool,

    /// output file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

/// One input document, labelled with where it came from.
#[derive(Debug)]
struct Document {
    origin: String,
    value: serde_json::Value,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl ModelSettings {
    fn load_guard(&self) -> Result<Guard> {
        let text = std::fs::read_to_string(&self.declarations)
            .with_context(|| format!("failed to read declarations {}", self.declarations.display()))?;
        let mut guard = Guard::new();
        crate::declaration::load(&mut guard, &text)
            .with_context(|| format!("failed to load declarations {}", self.declarations.display()))?;
        Ok(guard)
    }
}

impl InputSettings {
    fn load_documents(&self) -> Result<Vec<Document>> {
        let source_paths = resolve_file_path_patterns(&self.input).context("failed to resolve input file paths")?;
        let mut documents = Vec::new();
        for source_path in source_paths {
            let origin = source_path.to_string_lossy().to_string();
            let source = std::fs::read_to_string(&source_path)
                .with_context(|| format!("failed to read source file {origin}"))?;
            if self.ndjson {
                for (ix, line) in source.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let value = serde_json::from_str(line)
                        .with_context(|| format!("failed to parse NDJSON line ({origin}:{})", ix + 1))?;
                    self.process(format!("{origin}:{}", ix + 1), value, &mut documents)?;
                }
            } else {
                let value = serde_json::from_str(&source)
                    .with_context(|| format!("failed to parse JSON source file ({origin})"))?;
                self.process(origin, value, &mut documents)?;
            }
        }
        tracing::info!(documents = documents.len(), "loaded input documents");
        Ok(documents)
    }

    fn process(&self, origin: String, value: serde_json::Value, out: &mut Vec<Document>) -> Result<()> {
        let value = match self.json_pointer.as_deref() {
            None => value,
            Some(pointer) => value
                .pointer(pointer)
                .cloned()
                .ok_or_else(|| anyhow!("JSON pointer {pointer} selects nothing in {origin}"))?,
        };
        match self.jq_expr.as_ref() {
            None => out.push(Document { origin, value }),
            Some(jq_expr) => {
                let results = crate::jq_exec::run_jaq(jq_expr, &value)
                    .with_context(|| format!("failed to apply jq expression to {origin}"))?;
                for (ix, value) in results.into_iter().enumerate() {
                    out.push(Document { origin: format!("{origin}#{ix}"), value });
                }
            }
        }
        Ok(())
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn run(&self) -> Result<ExitCode> {
        match &self.cmd {
            Command::Check(target) => {
                let guard = target.model_settings.load_guard()?;
                let shape = guard
                    .get(&target.model_settings.model)
                    .ok_or_else(|| Error::UnknownShape(target.model_settings.model.clone()))?;
                let documents = target.input_settings.load_documents()?;

                let verdicts = documents
                    .par_iter()
                    .map(|document| shape.check(&Value::from(document.value.clone())))
                    .collect::<Vec<_>>();

                let mut failed = 0usize;
                for (document, passed) in documents.iter().zip(&verdicts) {
                    if *passed {
                        println!("{} {}", "pass".green().bold(), document.origin);
                    } else {
                        failed += 1;
                        println!("{} {}", "fail".red().bold(), document.origin);
                    }
                }
                tracing::info!(model = shape.name(), checked = documents.len(), failed, "check finished");
                Ok(if failed == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
            }
            Command::Normalize(target) => {
                let guard = target.model_settings.load_guard()?;
                let shape = guard
                    .get(&target.model_settings.model)
                    .ok_or_else(|| Error::UnknownShape(target.model_settings.model.clone()))?;
                let options = JsonOptions { pretty: target.pretty };

                let mut lines = Vec::new();
                for document in target.input_settings.load_documents()? {
                    let instance = shape
                        .create(document.value)
                        .with_context(|| format!("{} does not match model {}", document.origin, shape.name()))?;
                    lines.push(shape.to_json(&instance, options)?);
                }
                let output = lines.join("\n");

                if let Some(out) = target.out.as_ref() {
                    write_output(out, &output)?;
                } else {
                    println!("{output}");
                }
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn write_output(out: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(out, contents).with_context(|| format!("failed to write {}", out.display()))
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                return Err(anyhow!("glob pattern matched no files: {pattern}"));
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
