use anyhow::{Result, bail};
use console::style;

use super::{TemplateSaveArgs, load_config, parse_template_save_args};
use crate::core::broadcast::{ButtonKind, Template};
use crate::core::templates::TemplateStore;
use crate::core::terminal::{self, print_error, print_success};

fn describe(template: &Template) -> String {
    let buttons: Vec<String> = template
        .buttons
        .iter()
        .map(|b| match b.kind {
            ButtonKind::Reply => format!("[{}]", b.display_text),
            ButtonKind::Url | ButtonKind::Call => format!(
                "[{} → {}]",
                b.display_text,
                b.payload.as_deref().unwrap_or("")
            ),
        })
        .collect();
    let mut line = format!("{}  {}", template.id, template.name);
    if !buttons.is_empty() {
        line.push_str(&format!("  {}", buttons.join(" ")));
    }
    line
}

fn into_template(args: TemplateSaveArgs) -> Template {
    Template {
        id: args.id.unwrap_or_default(),
        name: args.name,
        message: args.message,
        footer: args.footer,
        buttons: args.buttons,
    }
}

pub async fn run_template_command(args: &[String]) -> Result<()> {
    let sub_cmd = args.get(2).map(String::as_str).unwrap_or("");
    let (data_dir, _) = load_config().await?;
    let store = TemplateStore::open(&data_dir).await?;

    match sub_cmd {
        "list" => {
            let templates = store.list().await?;
            if templates.is_empty() {
                terminal::print_info("No templates saved yet.");
            }
            for template in &templates {
                println!("{}", describe(template));
                if !template.message.is_empty() {
                    println!("    {}", style(&template.message).dim());
                }
            }
        }
        "save" => {
            let saved = store
                .save(into_template(parse_template_save_args(args, 3)?))
                .await?;
            print_success(&format!("Saved template {}", saved.id));
        }
        "delete" => {
            let Some(id) = args.get(3) else {
                bail!("Usage: blastr template delete <id>");
            };
            if store.delete(id).await? {
                print_success(&format!("Deleted template {}", id));
            } else {
                print_error(&format!("Template {} not found", id));
            }
        }
        _ => {
            print_error("Unknown or missing template command. Expected: list, save, delete");
        }
    }
    Ok(())
}
