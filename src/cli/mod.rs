mod send;
mod serve;
mod template;

use anyhow::{Context, Result, bail};
use console::style;
use std::path::PathBuf;

use crate::core::broadcast::{Button, normalize_recipients};
use crate::core::config::{BlastrConfig, ProviderKind};
use crate::core::terminal::{self, GuideSection, print_error};
use crate::platform;

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Core")
        .command("serve", "Run the broadcast engine behind the HTTP/WebSocket API")
        .command("send", "Run one broadcast in the foreground")
        .command("normalize", "Clean a pasted list of phone numbers")
        .print();

    GuideSection::new("Templates")
        .command("template list", "Show saved message templates")
        .command("template save", "Create or update a template")
        .command("template delete <id>", "Remove a template")
        .print();

    GuideSection::new("serve")
        .command("--host <addr>", "Bind address (default from config, 127.0.0.1)")
        .command("--port <port>", "Bind port (default from config, 4000)")
        .command("--provider <kind>", "dry-run | twilio")
        .print();

    GuideSection::new("send")
        .command("--numbers <list>", "Comma separated recipients")
        .command("--numbers-file <path>", "One recipient per line")
        .command("--message <text>", "Message body")
        .command("--footer <text>", "Footer under the body")
        .command("--button <spec>", "reply:Text | url:Text=https://… | call:Text=+62… (max 3)")
        .command("--image <path>", "Attach an image; the message becomes its caption")
        .command("--delay <secs>", "Pause between recipients (min 1)")
        .command("--template <id>", "Start from a saved template")
        .command("--provider <kind>", "dry-run | twilio")
        .print();

    println!(
        "\n {} {} <command> [options]\n",
        style("Usage:").bold(),
        style("blastr").green()
    );
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ServeArgs {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub provider: Option<ProviderKind>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SendArgs {
    pub numbers: Vec<String>,
    pub numbers_file: Option<PathBuf>,
    pub message: Option<String>,
    pub footer: Option<String>,
    pub buttons: Vec<Button>,
    pub image: Option<PathBuf>,
    pub delay_secs: Option<u64>,
    pub template_id: Option<String>,
    pub provider: Option<ProviderKind>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct TemplateSaveArgs {
    pub id: Option<String>,
    pub name: String,
    pub message: String,
    pub footer: Option<String>,
    pub buttons: Vec<Button>,
}

/// Returns the value following a flag, advancing past both.
fn flag_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str> {
    match args.get(*i + 1) {
        Some(value) => {
            *i += 2;
            Ok(value.as_str())
        }
        None => bail!("{} expects a value", flag),
    }
}

fn parse_provider(value: &str) -> Result<ProviderKind> {
    ProviderKind::parse(value)
        .with_context(|| format!("Unknown provider '{}'. Expected: dry-run, twilio", value))
}

/// `reply:Text`, `url:Text=https://…` or `call:Text=+62…`.
pub(crate) fn parse_button_spec(spec: &str) -> Result<Button> {
    let Some((kind, rest)) = spec.split_once(':') else {
        bail!("Invalid button '{}'. Expected kind:text", spec);
    };
    let rest = rest.trim();
    match kind.trim() {
        "reply" if !rest.is_empty() => Ok(Button::reply(rest)),
        "url" | "call" => {
            let Some((text, payload)) = rest.split_once('=') else {
                bail!("Invalid button '{}'. Expected {}:text=value", spec, kind);
            };
            if text.trim().is_empty() || payload.trim().is_empty() {
                bail!("Invalid button '{}'. Text and value are required", spec);
            }
            if kind.trim() == "url" {
                Ok(Button::url(text.trim(), payload.trim()))
            } else {
                Ok(Button::call(text.trim(), payload.trim()))
            }
        }
        _ => bail!("Invalid button '{}'. Kind must be reply, url or call", spec),
    }
}

pub(crate) fn parse_serve_args(args: &[String], start: usize) -> Result<ServeArgs> {
    let mut parsed = ServeArgs::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--host" => parsed.host = Some(flag_value(args, &mut i, "--host")?.to_string()),
            "--port" => {
                let value = flag_value(args, &mut i, "--port")?;
                parsed.port = Some(
                    value
                        .parse()
                        .with_context(|| format!("Invalid port '{}'", value))?,
                );
            }
            "--provider" => {
                parsed.provider = Some(parse_provider(flag_value(args, &mut i, "--provider")?)?)
            }
            _ => i += 1,
        }
    }
    Ok(parsed)
}

pub(crate) fn parse_send_args(args: &[String], start: usize) -> Result<SendArgs> {
    let mut parsed = SendArgs::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--numbers" | "-n" => {
                let value = flag_value(args, &mut i, "--numbers")?;
                parsed
                    .numbers
                    .extend(value.split(',').map(|n| n.trim().to_string()));
            }
            "--numbers-file" => {
                parsed.numbers_file = Some(PathBuf::from(flag_value(args, &mut i, "--numbers-file")?))
            }
            "--message" | "-m" => {
                parsed.message = Some(flag_value(args, &mut i, "--message")?.to_string())
            }
            "--footer" => parsed.footer = Some(flag_value(args, &mut i, "--footer")?.to_string()),
            "--button" | "-b" => {
                let spec = flag_value(args, &mut i, "--button")?;
                parsed.buttons.push(parse_button_spec(spec)?);
            }
            "--image" => parsed.image = Some(PathBuf::from(flag_value(args, &mut i, "--image")?)),
            "--delay" | "-d" => {
                let value = flag_value(args, &mut i, "--delay")?;
                parsed.delay_secs = Some(
                    value
                        .parse()
                        .with_context(|| format!("Invalid delay '{}'", value))?,
                );
            }
            "--template" | "-t" => {
                parsed.template_id = Some(flag_value(args, &mut i, "--template")?.to_string())
            }
            "--provider" => {
                parsed.provider = Some(parse_provider(flag_value(args, &mut i, "--provider")?)?)
            }
            _ => i += 1,
        }
    }
    Ok(parsed)
}

pub(crate) fn parse_template_save_args(args: &[String], start: usize) -> Result<TemplateSaveArgs> {
    let mut parsed = TemplateSaveArgs::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--id" => parsed.id = Some(flag_value(args, &mut i, "--id")?.to_string()),
            "--name" => parsed.name = flag_value(args, &mut i, "--name")?.to_string(),
            "--message" | "-m" => parsed.message = flag_value(args, &mut i, "--message")?.to_string(),
            "--footer" => parsed.footer = Some(flag_value(args, &mut i, "--footer")?.to_string()),
            "--button" | "-b" => {
                let spec = flag_value(args, &mut i, "--button")?;
                parsed.buttons.push(parse_button_spec(spec)?);
            }
            _ => i += 1,
        }
    }
    if parsed.name.trim().is_empty() {
        bail!("--name is required");
    }
    Ok(parsed)
}

/// Data directory plus its `config.toml`.
pub(crate) async fn load_config() -> Result<(PathBuf, BlastrConfig)> {
    let data_dir = platform::ensure_data_dir().context("Failed to create the data directory")?;
    let config = BlastrConfig::load(&data_dir).await?;
    Ok((data_dir, config))
}

async fn run_normalize(args: &[String]) -> Result<()> {
    let mut file: Option<PathBuf> = None;
    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--file" | "-f" => file = Some(PathBuf::from(flag_value(args, &mut i, "--file")?)),
            _ => i += 1,
        }
    }

    let raw = match file {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            use tokio::io::AsyncReadExt;
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };

    let list = normalize_recipients(&raw);
    for number in &list.numbers {
        println!("{}", number);
    }
    eprintln!("{} valid number(s)", list.len());
    Ok(())
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cmd = args.get(1).map(String::as_str).unwrap_or("help");

    match cmd {
        "serve" => serve::run_serve(parse_serve_args(&args, 2)?).await,
        "send" => send::run_send(parse_send_args(&args, 2)?).await,
        "normalize" => run_normalize(&args).await,
        "template" => template::run_template_command(&args).await,
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        other => {
            print_error(&format!("Unknown command '{}'", other));
            print_help();
            Ok(())
        }
    }
}
